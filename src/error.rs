//! Store Errors
//!
//! Every fallible keyspace operation returns [`StoreError`]. A failing command
//! never leaves a partial mutation behind: engines validate everything they can
//! before touching an entry.
//!
//! Absent keys and fields are usually *not* errors. Read commands report them as
//! `None` / empty collections; only commands that need an existing key (`LSET`,
//! `RENAME`) surface [`StoreError::NoSuchKey`].

use thiserror::Error;

/// Coarse classification of a [`StoreError`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    /// The key the command requires does not exist.
    Missing,
    /// The key (or field) holds a value the command cannot operate on.
    Type,
    /// An index or numeric result is outside the allowed range, or a
    /// score interval is malformed.
    Range,
    /// The command itself is malformed.
    Argument,
}

/// Errors produced by keyspace operations and the command dispatcher.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum StoreError {
    /// The key holds a different kind of value
    #[error("WRONGTYPE Operation against a key holding the wrong kind of value")]
    WrongType,

    /// Stored or supplied text does not parse as a 64-bit integer
    #[error("ERR value is not an integer or out of range")]
    NotAnInteger,

    /// Stored or supplied text does not parse as a float
    #[error("ERR value is not a valid float")]
    NotAFloat,

    /// An integer increment would overflow
    #[error("ERR increment or decrement would overflow")]
    Overflow,

    /// A float operation would produce NaN or infinity
    #[error("ERR increment would produce NaN or Infinity")]
    NanResult,

    /// List index outside the list
    #[error("ERR index out of range")]
    IndexOutOfRange,

    /// A count argument was negative
    #[error("ERR value is out of range, must be positive")]
    NotPositive,

    /// A blocking timeout too large to schedule
    #[error("ERR timeout is out of range")]
    TimeoutOutOfRange,

    /// Malformed min/max in a score range
    #[error("ERR min or max is not a float")]
    InvalidScoreRange,

    /// The command needs an existing key
    #[error("ERR no such key")]
    NoSuchKey,

    /// Unknown option or misplaced token
    #[error("ERR syntax error")]
    Syntax,

    /// Wrong number of arguments for a command
    #[error("ERR wrong number of arguments for '{0}' command")]
    WrongArity(String),

    /// Command name not recognised by the dispatcher
    #[error("ERR unknown command '{0}'")]
    UnknownCommand(String),
}

impl StoreError {
    /// Returns the error's classification.
    pub fn kind(&self) -> ErrorKind {
        match self {
            StoreError::NoSuchKey => ErrorKind::Missing,
            StoreError::WrongType | StoreError::NotAnInteger | StoreError::NotAFloat => {
                ErrorKind::Type
            }
            StoreError::Overflow
            | StoreError::NanResult
            | StoreError::IndexOutOfRange
            | StoreError::NotPositive
            | StoreError::TimeoutOutOfRange
            | StoreError::InvalidScoreRange => ErrorKind::Range,
            StoreError::Syntax | StoreError::WrongArity(_) | StoreError::UnknownCommand(_) => {
                ErrorKind::Argument
            }
        }
    }
}

/// Result alias used throughout the crate.
pub type Result<T> = std::result::Result<T, StoreError>;
