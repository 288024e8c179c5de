use std::fmt::Display;

/// SheetDB errors.
#[derive(Clone, Debug, PartialEq)]
pub enum Error {
    /// A file-store call failed. Typically transient; retry is the caller's choice.
    IO(String),
    /// Invalid data, typically decoding errors, corruption, or unexpected on-disk values.
    InvalidData(String),
    /// Invalid caller input, typically a violated precondition (bad cell coordinates,
    /// unknown document, malformed payload).
    InvalidInput(String),
    /// The document's on-disk state breaks the checkpoint-log invariant in a way the
    /// recovery procedure cannot repair. The document is quarantined; no in-memory
    /// sheet is produced.
    Unrecoverable(String),
}

impl std::error::Error for Error {}

impl Display for Error {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        match self {
            Error::IO(msg) => write!(f, "io error: {msg}"),
            Error::InvalidData(msg) => write!(f, "invalid data: {msg}"),
            Error::InvalidInput(msg) => write!(f, "invalid input: {msg}"),
            Error::Unrecoverable(msg) => write!(f, "sheet filesystem unrecoverable: {msg}"),
        }
    }
}

/// Constructs an Error::InvalidData for the given format string.
#[macro_export]
macro_rules! errdata {
    ($($args:tt)*) => { $crate::error::Error::InvalidData(format!($($args)*)).into() };
}

/// Constructs an Error::InvalidInput for the given format string.
#[macro_export]
macro_rules! errinput {
    ($($args:tt)*) => { $crate::error::Error::InvalidInput(format!($($args)*)).into() };
}

/// Constructs an Error::Unrecoverable for the given format string.
#[macro_export]
macro_rules! errunrecoverable {
    ($($args:tt)*) => { $crate::error::Error::Unrecoverable(format!($($args)*)).into() };
}

/// A SheetDB Result returning Error.
pub type Result<T> = std::result::Result<T, Error>;

impl<T> From<Error> for Result<T> {
    fn from(error: Error) -> Self {
        Err(error)
    }
}

impl From<std::io::Error> for Error {
    fn from(err: std::io::Error) -> Self {
        Error::IO(err.to_string())
    }
}

impl From<serde_json::Error> for Error {
    fn from(err: serde_json::Error) -> Self {
        Error::InvalidData(err.to_string())
    }
}

impl<T> From<std::sync::PoisonError<T>> for Error {
    fn from(err: std::sync::PoisonError<T>) -> Self {
        Error::IO(err.to_string())
    }
}

impl Error {
    /// Whether this error quarantines the document.
    pub fn is_unrecoverable(&self) -> bool {
        matches!(self, Error::Unrecoverable(_))
    }
}
