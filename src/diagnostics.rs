//diagnostic log sink handed to every reader at construction
//
//readers never touch the process-wide logger on their own: the caller picks
//a sink (silent by default, or the global `log` logger) and passes it in

use std::fmt;

use log::{Level, Log, Metadata, Record};

/// Target attached to every record emitted by the readers.
pub const LOG_TARGET: &str = "lithtech";

struct Silent;

impl Log for Silent {
    fn enabled(&self, _: &Metadata<'_>) -> bool {
        false
    }

    fn log(&self, _: &Record<'_>) {}

    fn flush(&self) {}
}

static SILENT: Silent = Silent;

/// Append-only logging capability.
#[derive(Clone, Copy)]
pub struct Diagnostics<'a> {
    sink: &'a dyn Log,
}

impl<'a> Diagnostics<'a> {
    pub fn new(sink: &'a dyn Log) -> Self {
        Self { sink }
    }

    pub fn emit(&self, level: Level, args: fmt::Arguments<'_>) {
        let metadata = Metadata::builder().level(level).target(LOG_TARGET).build();
        if self.sink.enabled(&metadata) {
            self.sink
                .log(&Record::builder().metadata(metadata).args(args).build());
        }
    }
}

impl Diagnostics<'static> {
    /// Drops every record.
    pub fn silent() -> Self {
        Self { sink: &SILENT }
    }

    /// Forwards to whatever logger the process installed.
    pub fn global() -> Self {
        Self {
            sink: log::logger(),
        }
    }
}

impl Default for Diagnostics<'static> {
    fn default() -> Self {
        Self::silent()
    }
}

impl fmt::Debug for Diagnostics<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Diagnostics").finish_non_exhaustive()
    }
}

/// `diag!(self.diag, Debug, "Reading {} nodes", count)`
macro_rules! diag {
    ($diag:expr, $level:ident, $($arg:tt)+) => {
        $diag.emit(::log::Level::$level, format_args!($($arg)+))
    };
}


#[cfg(test)]
mod tests {
    use super::capture::Capture;
    use super::*;

    #[test]
    fn test_records_reach_injected_sink() {
        let sink = Capture::default();
        let diag = Diagnostics::new(&sink);
        diag!(diag, Info, "read {} objects", 3);
        assert!(sink.contains("INFO read 3 objects"));
    }

    #[test]
    fn test_silent_drops_records() {
        let diag = Diagnostics::silent();
        diag!(diag, Error, "nobody hears this");
    }
}
