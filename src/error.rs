//! Error types for the SQL Anywhere driver.
//!
//! The native client reports failures as a numeric code plus a message read
//! from the connection; everything else is classified here.

use std::fmt;

use thiserror::Error;

/// A failure reported by the native client library.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NativeError {
    /// Operation context, e.g. "did not exec"
    pub prefix: String,
    /// Message text copied out of the connection's error buffer
    pub message: String,
    /// Native SQLCODE
    pub code: i32,
}

impl fmt::Display for NativeError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {} {}", self.prefix, self.message, self.code)
    }
}

impl std::error::Error for NativeError {}

#[derive(Error, Debug)]
pub enum Error {
    /// The connection is unusable; a pool should discard it and open a new one.
    #[error("bad connection")]
    BadConnection,

    #[error(transparent)]
    Native(#[from] NativeError),

    #[error("unsupported transaction option: {0}")]
    UnsupportedOption(String),

    #[error("did not create param at index {ordinal}: no binding for value type: {kind}")]
    UnsupportedType { ordinal: usize, kind: &'static str },

    #[error("unexpected type {type_code}: {}", String::from_utf8_lossy(.raw))]
    Decode { type_code: u16, raw: Vec<u8> },

    #[error("invalid value: {0}")]
    InvalidValue(String),

    #[error("did not parse {kind} '{text}': {source}")]
    Parse {
        kind: &'static str,
        text: String,
        #[source]
        source: chrono::ParseError,
    },

    /// No more rows or result sets. Never escapes the public cursor API.
    #[error("end of data")]
    EndOfData,

    #[error("context canceled")]
    Canceled,

    #[error("context deadline exceeded")]
    DeadlineExceeded,

    #[error("did not initialise api: {0}")]
    Init(String),

    #[error("driver error: {0}")]
    Driver(String),

    #[error("pool error: {0}")]
    Pool(String),

    #[error("background call failed: {0}")]
    Task(String),
}

impl Error {
    /// True for the caller's own cancellation or deadline.
    pub fn is_cancellation(&self) -> bool {
        matches!(self, Error::Canceled | Error::DeadlineExceeded)
    }

    /// Native SQLCODE, if this error came from the client library.
    pub fn native_code(&self) -> Option<i32> {
        match self {
            Error::Native(e) => Some(e.code),
            _ => None,
        }
    }
}

pub type Result<T> = std::result::Result<T, Error>;
