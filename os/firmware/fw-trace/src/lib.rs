//! # Firmware Trace Backend
//!
//! Routes `log` records emitted by firmware subsystems (the heap manager logs
//! under the `mem` target) to the DSP's trace transport without allocating.
//!
//! ```text
//! log::info!/error!(target: "mem", ..)
//!     ↓
//! TraceLogger (level filter)
//!     ↓
//! LineBuffer (fixed size, truncating fmt::Write)
//!     ↓
//! TraceSink::emit(level, line) → mailbox trace window / DMA trace
//! ```
//!
//! ## Features
//!
//! * `enabled` (default): records are formatted and forwarded.
//! * without `enabled`: the logger accepts records but drops them, so release
//!   images carry no formatting code.
//!
//! ## Usage
//!
//! ```rust,no_run
//! use fw_trace::{TraceLogger, TraceSink};
//! use log::{Level, LevelFilter};
//!
//! struct Mailbox;
//!
//! impl TraceSink for Mailbox {
//!     fn emit(&self, _level: Level, _line: &str) {
//!         // copy into the shared trace window
//!     }
//! }
//!
//! static MAILBOX: Mailbox = Mailbox;
//! static LOGGER: TraceLogger = TraceLogger::new(&MAILBOX, LevelFilter::Info);
//!
//! LOGGER.init().expect("logger initialization");
//! log::info!(target: "mem", "heap: runtime status");
//! ```

#![cfg_attr(not(any(test, doctest)), no_std)]

mod line;
mod logger;

pub use line::{LineBuffer, TRACE_LINE_LEN};
pub use logger::TraceLogger;

use log::Level;

/// Destination of formatted trace lines.
///
/// Implementations must not allocate and must not log themselves.
pub trait TraceSink: Sync {
    /// Emit one complete, already formatted line (without trailing newline).
    fn emit(&self, level: Level, line: &str);
}
