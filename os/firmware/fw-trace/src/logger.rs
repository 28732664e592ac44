use crate::TraceSink;
use crate::line::LineBuffer;
use log::{LevelFilter, Log, Metadata, Record, SetLoggerError};

pub struct TraceLogger {
    #[cfg_attr(not(feature = "enabled"), allow(dead_code))]
    sink: &'static dyn TraceSink,
    max_level: LevelFilter,
}

impl TraceLogger {
    #[must_use]
    pub const fn new(sink: &'static dyn TraceSink, max_level: LevelFilter) -> Self {
        Self { sink, max_level }
    }

    /// Call this once during early init, before the heap is brought up.
    ///
    /// # Errors
    /// Fails if another logger was installed first.
    pub fn init(&'static self) -> Result<(), SetLoggerError> {
        log::set_logger(self)?;
        log::set_max_level(self.max_level);
        Ok(())
    }

    /// Render a record the way it is handed to the sink:
    /// `"[LEVEL] target: message"`.
    #[must_use]
    pub fn format(record: &Record) -> LineBuffer {
        use core::fmt::Write;

        let mut line = LineBuffer::new();
        let _ = write!(
            line,
            "[{}] {}: {}",
            record.level(),
            record.target(),
            record.args()
        );
        line
    }
}

impl Log for TraceLogger {
    fn enabled(&self, metadata: &Metadata) -> bool {
        metadata.level() <= self.max_level
    }

    fn log(&self, record: &Record) {
        if !self.enabled(record.metadata()) {
            return;
        }

        #[cfg(feature = "enabled")]
        {
            let line = Self::format(record);
            self.sink.emit(record.level(), line.as_str());
        }
    }

    fn flush(&self) {
        // lines are emitted whole; nothing is buffered
    }
}
