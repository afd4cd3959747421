//! # SWEN Ledger
//!
//! Durable append-only logs. The decision log and the health-event log are
//! both [`AppendLog`] instances: records are appended once, read back
//! tail-to-head by consumers, and validated in full when a file-backed log
//! is opened so that a damaged log stops startup instead of silently losing
//! history. A final record cut short by a crash is not history yet and is
//! dropped on open.

pub mod error;
pub mod log;

pub use error::{LedgerError, LedgerResult};
pub use log::{read_tail, AppendLog, FileLog, MemoryLog, Record};
