use std::fmt::{Debug, Display, Formatter, Result as FmtResult};

/// The seven error tags a public operation may report, per the error
/// handling design: no operation swallows a failure, every one is tagged
/// with exactly one of these kinds plus a human-readable context string.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum ErrorKind {
    /// Malformed schema CSV or other textual wire form.
    Parse,
    /// Schema invariant violation.
    Schema,
    /// Filesystem or compression layer failure, including EOF where data
    /// was expected.
    Io,
    /// Cell buffer shorter than its declared size, or a negative
    /// variable-length count.
    Codec,
    /// Bad coordinate type, out-of-range field id, empty range, etc.
    InvalidArgument,
    /// Write on a read-mode descriptor, iterator advanced past end, too
    /// many open arrays.
    State,
    /// Consolidation produced inconsistent tile bookkeeping; fatal for the
    /// affected array.
    Consolidation,
}

impl Display for ErrorKind {
    fn fmt(&self, f: &mut Formatter) -> FmtResult {
        let s = match self {
            ErrorKind::Parse => "parse error",
            ErrorKind::Schema => "schema error",
            ErrorKind::Io => "I/O error",
            ErrorKind::Codec => "codec error",
            ErrorKind::InvalidArgument => "invalid argument",
            ErrorKind::State => "invalid state",
            ErrorKind::Consolidation => "consolidation error",
        };
        f.write_str(s)
    }
}

/// The error type returned by every public operation in this workspace.
///
/// Individual crates define their own granular `thiserror` enums for their
/// domain (codec errors, schema validation errors, ...) and implement
/// `From<TheirError> for Error`, classifying each variant into one
/// [ErrorKind]. This type is the thing callers actually see.
pub struct Error {
    kind: ErrorKind,
    message: String,
    source: Option<Box<dyn std::error::Error + Send + Sync + 'static>>,
}

impl Error {
    pub fn new(kind: ErrorKind, message: impl Into<String>) -> Self {
        Error {
            kind,
            message: message.into(),
            source: None,
        }
    }

    pub fn with_source(
        kind: ErrorKind,
        message: impl Into<String>,
        source: impl std::error::Error + Send + Sync + 'static,
    ) -> Self {
        Error {
            kind,
            message: message.into(),
            source: Some(Box::new(source)),
        }
    }

    pub fn kind(&self) -> ErrorKind {
        self.kind
    }

    pub fn parse(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Parse, message)
    }

    pub fn schema(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Schema, message)
    }

    pub fn io(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Io, message)
    }

    pub fn codec(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Codec, message)
    }

    pub fn invalid_argument(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::InvalidArgument, message)
    }

    pub fn state(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::State, message)
    }

    pub fn consolidation(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Consolidation, message)
    }
}

impl Debug for Error {
    fn fmt(&self, f: &mut Formatter) -> FmtResult {
        write!(f, "{}: {}", self.kind, self.message)
    }
}

impl Display for Error {
    fn fmt(&self, f: &mut Formatter) -> FmtResult {
        write!(f, "{}: {}", self.kind, self.message)
    }
}

impl std::error::Error for Error {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        self.source.as_ref().map(|b| b.as_ref() as _)
    }
}

impl From<std::io::Error> for Error {
    fn from(e: std::io::Error) -> Self {
        Error::with_source(ErrorKind::Io, "filesystem operation failed", e)
    }
}

pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn kind_roundtrips_through_display() {
        let e = Error::invalid_argument("range is empty");
        assert_eq!(e.kind(), ErrorKind::InvalidArgument);
        assert_eq!(e.to_string(), "invalid argument: range is empty");
    }

    #[test]
    fn io_error_classified_as_io() {
        let io = std::io::Error::new(std::io::ErrorKind::UnexpectedEof, "eof");
        let e: Error = io.into();
        assert_eq!(e.kind(), ErrorKind::Io);
    }
}
