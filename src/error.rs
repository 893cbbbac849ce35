//error types shared by every LithTech reader
//
//field-level failures abort the whole decode; the file entry points wrap
//them with the path and the cursor offset at the time of failure

use std::fmt;
use std::path::{Path, PathBuf};

use thiserror::Error;

use crate::model::ModelFormat;

#[derive(Error, Debug)]
pub enum Error {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Fewer bytes remain than a field declares.
    #[error("truncated data at 0x{offset:08X}: needed {needed} bytes, {available} available")]
    Truncated {
        offset: u64,
        needed: u64,
        available: u64,
    },

    /// Unrecognized pixel format, property type code, mesh type, etc.
    #[error("unsupported feature: {0}")]
    UnsupportedFeature(String),

    /// An internal consistency check failed.
    #[error("format mismatch: {0}")]
    FormatMismatch(String),

    #[error("failed to decode {} at 0x{offset:08X}: {source}", .path.display())]
    Decode {
        path: PathBuf,
        offset: u64,
        #[source]
        source: Box<Error>,
    },

    /// Every candidate reader of a model family rejected the input.
    #[error("no {family} reader accepted the data ({})", summarize(.failures))]
    NoMatchingReader {
        family: &'static str,
        failures: Vec<CandidateFailure>,
    },
}

pub type Result<T> = std::result::Result<T, Error>;

/// Why one candidate reader gave up, and how far it got.
#[derive(Debug)]
pub struct CandidateFailure {
    pub format: ModelFormat,
    pub offset: u64,
    pub error: Error,
}

impl fmt::Display for CandidateFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {} (at 0x{:08X})", self.format, self.error, self.offset)
    }
}

fn summarize(failures: &[CandidateFailure]) -> String {
    failures
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join("; ")
}

impl Error {
    pub(crate) fn unsupported(what: impl Into<String>) -> Self {
        Error::UnsupportedFeature(what.into())
    }

    pub(crate) fn mismatch(what: impl Into<String>) -> Self {
        Error::FormatMismatch(what.into())
    }

    /// Attach the file path and the offset reached.
    pub(crate) fn in_file(self, path: &Path, offset: u64) -> Self {
        Error::Decode {
            path: path.to_path_buf(),
            offset,
            source: Box::new(self),
        }
    }

    /// Strip any `Decode` context layers.
    pub fn root_cause(&self) -> &Error {
        match self {
            Error::Decode { source, .. } => source.root_cause(),
            other => other,
        }
    }

    pub fn is_truncated(&self) -> bool {
        matches!(self.root_cause(), Error::Truncated { .. })
    }
}
