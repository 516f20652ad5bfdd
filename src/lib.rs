//! judge-wire library
//!
//! Wire contract between the sandboxed test case runner, the result validator
//! and the orchestrator:
//! - Binary framing with nibble-tagged control and data frame types
//! - Canonical JSON encoding of judged test case outcomes
//! - Runner environment constants and connection configuration
//! - Async transport with bounded two-phase frame reads

pub mod config;
pub mod error;
pub mod frame;
pub mod outcome;
pub mod transport;

pub use error::{Result, WireError};
pub use frame::{Frame, FrameOptions, FrameType, PING};
pub use outcome::{FileOutcome, Permission, TestCaseOutcome, Verdict};
