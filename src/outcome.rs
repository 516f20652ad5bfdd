//! Judged test case outcomes and their canonical JSON mapping.
//!
//! Wire shape of a result payload:
//!
//! ```json
//! {
//!   "result": 0,
//!   "etime": 10,
//!   "pstatus": 0,
//!   "cio": { "stdout": {"content": "", "diff": "", "perm": -1},
//!            "stderr": {"content": "", "diff": "", "perm": -1} },
//!   "fio": { "out.txt": {"content": "", "diff": "", "perm": 420} }
//! }
//! ```
//!
//! Each file is encoded as a single-key object `{name: record}` so a list of
//! files merges into one object keyed by name. `fio` keeps insertion order.

use std::fmt;

use serde::de::{self, MapAccess, Visitor};
use serde::{Deserialize, Deserializer};
use serde_json::{json, Map, Number, Value};

use crate::config::{STDERR_NAME, STDOUT_NAME};
use crate::error::{Result, WireError};
use crate::frame::{Frame, FrameType};

/// Bits accepted in a file permission (`S_IMODE`).
pub const MODE_MASK: u32 = 0o7777;

/// Wire value meaning "no permission recorded".
const PERM_NOT_APPLICABLE: i64 = -1;

/// File permission bits, or "not applicable".
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct Permission(Option<u32>);

impl Permission {
    pub const NOT_APPLICABLE: Self = Self(None);

    /// Wrap mode bits. Anything outside [`MODE_MASK`] is rejected.
    pub fn new(mode: u32) -> Result<Self> {
        if mode & !MODE_MASK != 0 {
            return Err(WireError::InvalidPermission(i64::from(mode)));
        }
        Ok(Self(Some(mode)))
    }

    /// Parse the wire integer; `-1` is the only accepted negative.
    pub fn from_raw(raw: i64) -> Result<Self> {
        if raw == PERM_NOT_APPLICABLE {
            return Ok(Self::NOT_APPLICABLE);
        }
        let mode = u32::try_from(raw).map_err(|_| WireError::InvalidPermission(raw))?;
        Self::new(mode).map_err(|_| WireError::InvalidPermission(raw))
    }

    pub fn to_raw(self) -> i64 {
        self.0.map_or(PERM_NOT_APPLICABLE, i64::from)
    }

    pub const fn mode(self) -> Option<u32> {
        self.0
    }

    pub const fn is_applicable(self) -> bool {
        self.0.is_some()
    }
}

/// Test case level verdict.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum Verdict {
    Success = 0,
    Fail = 1,
    Timeout = 2,
    Error = 3,
}

impl Verdict {
    pub const fn code(self) -> u8 {
        self as u8
    }

    pub fn from_code(code: i64) -> Result<Self> {
        match code {
            0 => Ok(Self::Success),
            1 => Ok(Self::Fail),
            2 => Ok(Self::Timeout),
            3 => Ok(Self::Error),
            other => Err(WireError::InvalidResult(other)),
        }
    }
}

/// The `{content, diff, perm}` record inside a file wrapper.
#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct FileRecord {
    content: String,
    diff: String,
    perm: i64,
}

/// Outcome for one captured or compared file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileOutcome {
    /// `stdout`, `stderr`, or the compared file's name.
    pub name: String,
    /// Captured or expected text.
    pub content: String,
    /// Comparison summary; empty means the file matched.
    pub diff: String,
    pub permission: Permission,
}

impl FileOutcome {
    pub fn new(
        name: impl Into<String>,
        content: impl Into<String>,
        diff: impl Into<String>,
    ) -> Self {
        Self {
            name: name.into(),
            content: content.into(),
            diff: diff.into(),
            permission: Permission::NOT_APPLICABLE,
        }
    }

    #[must_use]
    pub const fn with_permission(mut self, permission: Permission) -> Self {
        self.permission = permission;
        self
    }

    /// Whether the comparison found no difference.
    pub fn is_match(&self) -> bool {
        self.diff.is_empty()
    }

    fn record(&self) -> Value {
        json!({
            "content": self.content,
            "diff": self.diff,
            "perm": self.permission.to_raw(),
        })
    }

    /// `{name: {content, diff, perm}}`
    pub fn to_value(&self) -> Value {
        let mut wrapper = Map::new();
        wrapper.insert(self.name.clone(), self.record());
        Value::Object(wrapper)
    }

    /// Parse a single-key wrapper produced by [`Self::to_value`].
    pub fn from_value(value: Value) -> Result<Self> {
        let Value::Object(wrapper) = value else {
            return Err(WireError::malformed("file wrapper must be an object"));
        };
        if wrapper.len() != 1 {
            return Err(WireError::malformed(format!(
                "file wrapper must have exactly one key, got {}",
                wrapper.len()
            )));
        }
        let mut entries = wrapper.into_iter();
        let Some((name, record)) = entries.next() else {
            return Err(WireError::malformed("file wrapper is empty"));
        };
        Self::from_entry(name, record)
    }

    fn from_entry(name: String, record: Value) -> Result<Self> {
        let record: FileRecord = serde_json::from_value(record)
            .map_err(|e| WireError::malformed(format!("file '{name}': {e}")))?;
        Ok(Self {
            permission: Permission::from_raw(record.perm)?,
            name,
            content: record.content,
            diff: record.diff,
        })
    }
}

/// Object entries in document order. Unlike `serde_json::Map`, a repeated
/// key is an error instead of silently replacing the earlier value.
#[derive(Debug, Default)]
struct Entries(Vec<(String, Value)>);

impl<'de> Deserialize<'de> for Entries {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        struct EntriesVisitor;

        impl<'de> Visitor<'de> for EntriesVisitor {
            type Value = Entries;

            fn expecting(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str("an object keyed by file name")
            }

            fn visit_map<A: MapAccess<'de>>(self, mut map: A) -> std::result::Result<Entries, A::Error> {
                let mut entries: Vec<(String, Value)> = Vec::with_capacity(map.size_hint().unwrap_or(0));
                while let Some((name, record)) = map.next_entry::<String, Value>()? {
                    if entries.iter().any(|(seen, _)| *seen == name) {
                        return Err(de::Error::custom(format!("duplicate entry '{name}'")));
                    }
                    entries.push((name, record));
                }
                Ok(Entries(entries))
            }
        }

        deserializer.deserialize_map(EntriesVisitor)
    }
}

/// Top-level payload shape before console/file validation.
#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct OutcomeRecord {
    result: i64,
    etime: Number,
    pstatus: i32,
    cio: Entries,
    fio: Entries,
}

/// Aggregate result of running one test case.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TestCaseOutcome {
    pub result: Verdict,
    /// Execution time as reported by the runner. Integer or fractional,
    /// carried exactly as it appears on the wire.
    pub elapsed_time: Number,
    /// Raw process exit status.
    pub process_status: i32,
    stdout: FileOutcome,
    stderr: FileOutcome,
    files: Vec<FileOutcome>,
}

impl TestCaseOutcome {
    /// New outcome with empty console captures and no compared files.
    pub fn new(result: Verdict, elapsed_time: impl Into<Number>, process_status: i32) -> Self {
        Self {
            result,
            elapsed_time: elapsed_time.into(),
            process_status,
            stdout: FileOutcome::new(STDOUT_NAME, "", ""),
            stderr: FileOutcome::new(STDERR_NAME, "", ""),
            files: Vec::new(),
        }
    }

    /// Elapsed time as a float, whatever its wire representation.
    pub fn elapsed_f64(&self) -> Option<f64> {
        self.elapsed_time.as_f64()
    }

    pub const fn stdout(&self) -> &FileOutcome {
        &self.stdout
    }

    pub const fn stderr(&self) -> &FileOutcome {
        &self.stderr
    }

    /// Compared files, in comparison order.
    pub fn files(&self) -> &[FileOutcome] {
        &self.files
    }

    pub fn set_stdout(&mut self, outcome: FileOutcome) -> Result<()> {
        self.stdout = expect_name(outcome, STDOUT_NAME)?;
        Ok(())
    }

    pub fn set_stderr(&mut self, outcome: FileOutcome) -> Result<()> {
        self.stderr = expect_name(outcome, STDERR_NAME)?;
        Ok(())
    }

    /// Append a compared file. Names must be unique, since files are merged
    /// into one object keyed by name.
    pub fn push_file(&mut self, outcome: FileOutcome) -> Result<()> {
        if self.files.iter().any(|f| f.name == outcome.name) {
            return Err(WireError::malformed(format!(
                "duplicate file entry '{}'",
                outcome.name
            )));
        }
        self.files.push(outcome);
        Ok(())
    }

    pub fn to_value(&self) -> Value {
        let cio: Map<String, Value> = [&self.stdout, &self.stderr]
            .into_iter()
            .map(|f| (f.name.clone(), f.record()))
            .collect();
        let fio: Map<String, Value> = self
            .files
            .iter()
            .map(|f| (f.name.clone(), f.record()))
            .collect();

        json!({
            "result": self.result.code(),
            "etime": self.elapsed_time,
            "pstatus": self.process_status,
            "cio": cio,
            "fio": fio,
        })
    }

    /// Decode an already parsed payload.
    ///
    /// A `Value` has already merged repeated keys; use [`Self::from_json`] on
    /// raw payload text to have those rejected.
    pub fn from_value(value: Value) -> Result<Self> {
        let record: OutcomeRecord = serde_json::from_value(value)
            .map_err(|e| WireError::malformed(format!("test case outcome: {e}")))?;
        Self::from_record(record)
    }

    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string(&self.to_value())?)
    }

    pub fn from_json(text: &str) -> Result<Self> {
        let record: OutcomeRecord = serde_json::from_str(text).map_err(|e| {
            if e.is_data() {
                WireError::malformed(format!("test case outcome: {e}"))
            } else {
                WireError::Json(e)
            }
        })?;
        Self::from_record(record)
    }

    fn from_record(record: OutcomeRecord) -> Result<Self> {
        let mut outcome = Self::new(
            Verdict::from_code(record.result)?,
            record.etime,
            record.pstatus,
        );

        let mut stdout = None;
        let mut stderr = None;
        for (name, file) in record.cio.0 {
            let slot = match name.as_str() {
                STDOUT_NAME => &mut stdout,
                STDERR_NAME => &mut stderr,
                _ => {
                    return Err(WireError::malformed(format!(
                        "unexpected console entry '{name}'"
                    )))
                }
            };
            *slot = Some(FileOutcome::from_entry(name, file)?);
        }
        outcome.stdout = stdout.ok_or_else(|| missing_console(STDOUT_NAME))?;
        outcome.stderr = stderr.ok_or_else(|| missing_console(STDERR_NAME))?;

        for (name, file) in record.fio.0 {
            outcome.push_file(FileOutcome::from_entry(name, file)?)?;
        }

        Ok(outcome)
    }

    /// Wrap this outcome as the payload of a result data frame.
    pub fn to_frame(&self) -> Result<Frame> {
        Frame::data(FrameType::TestResult, self.to_json()?)
    }

    /// Decode the payload of a fully read result frame.
    pub fn from_frame(frame: &Frame) -> Result<Self> {
        if frame.kind() != FrameType::TestResult {
            return Err(WireError::UnexpectedType {
                expected: FrameType::TestResult.code(),
                actual: frame.kind().code(),
            });
        }
        let payload = frame.payload().ok_or(WireError::MissingPayload)?;
        Self::from_json(payload)
    }
}

fn expect_name(outcome: FileOutcome, name: &str) -> Result<FileOutcome> {
    if outcome.name != name {
        return Err(WireError::malformed(format!(
            "expected console entry '{name}', got '{}'",
            outcome.name
        )));
    }
    Ok(outcome)
}

fn missing_console(name: &str) -> WireError {
    WireError::malformed(format!("missing console entry '{name}'"))
}
