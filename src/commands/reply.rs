//! Command Replies
//!
//! [`Reply`] is what the dispatcher hands back for every command. It mirrors
//! the shapes a client sees: status `OK`, integers, binary-safe bulk
//! strings, nil, nested arrays and error messages. Encoding it for a wire
//! protocol is left to whatever transport sits on top.
//!
//! `Display` renders replies the way `redis-cli` prints them:
//!
//! ```text
//! OK
//! (integer) 3
//! "hello"
//! (nil)
//! 1) "a"
//! 2) "b"
//! (error) ERR syntax error
//! ```

use crate::error::StoreError;
use bytes::Bytes;
use std::fmt;

/// The result of executing one command.
#[derive(Debug, Clone, PartialEq)]
pub enum Reply {
    /// Status reply for commands that only acknowledge
    Ok,

    /// 64-bit signed integer (counts, lengths, booleans, TTL markers)
    Integer(i64),

    /// Binary-safe string
    Bulk(Bytes),

    /// Absent value
    Nil,

    /// Ordered list of replies
    Array(Vec<Reply>),

    /// Error message, starting with an error code such as `ERR`
    Error(String),
}

impl Reply {
    pub fn ok() -> Self {
        Reply::Ok
    }

    pub fn integer(n: i64) -> Self {
        Reply::Integer(n)
    }

    /// `1` for true, `0` for false.
    pub fn boolean(b: bool) -> Self {
        Reply::Integer(i64::from(b))
    }

    /// Creates a bulk reply.
    ///
    /// # Example
    /// ```
    /// use polykv::commands::Reply;
    /// use bytes::Bytes;
    /// let bulk = Reply::bulk("hello");
    /// assert_eq!(bulk, Reply::Bulk(Bytes::from("hello")));
    /// ```
    pub fn bulk(data: impl Into<Bytes>) -> Self {
        Reply::Bulk(data.into())
    }

    pub fn nil() -> Self {
        Reply::Nil
    }

    pub fn array(values: Vec<Reply>) -> Self {
        Reply::Array(values)
    }

    pub fn error(message: impl Into<String>) -> Self {
        Reply::Error(message.into())
    }

    /// Bulk reply for `Some`, nil for `None`.
    pub fn from_option(value: Option<Bytes>) -> Self {
        value.map_or(Reply::Nil, Reply::Bulk)
    }

    /// Array of bulk replies.
    pub fn from_bulks(values: impl IntoIterator<Item = Bytes>) -> Self {
        Reply::Array(values.into_iter().map(Reply::Bulk).collect())
    }

    /// Integer reply from a count or length.
    pub fn from_len(n: usize) -> Self {
        Reply::Integer(i64::try_from(n).unwrap_or(i64::MAX))
    }

    pub fn is_error(&self) -> bool {
        matches!(self, Reply::Error(_))
    }

    pub fn is_nil(&self) -> bool {
        matches!(self, Reply::Nil)
    }

    /// The payload of a bulk reply.
    pub fn as_bytes(&self) -> Option<&[u8]> {
        match self {
            Reply::Bulk(b) => Some(b),
            _ => None,
        }
    }

    pub fn as_integer(&self) -> Option<i64> {
        match self {
            Reply::Integer(n) => Some(*n),
            _ => None,
        }
    }

    pub fn as_array(&self) -> Option<&[Reply]> {
        match self {
            Reply::Array(values) => Some(values),
            _ => None,
        }
    }

    fn fmt_nested(&self, f: &mut fmt::Formatter<'_>, indent: usize) -> fmt::Result {
        match self {
            Reply::Ok => write!(f, "OK"),
            Reply::Integer(n) => write!(f, "(integer) {}", n),
            Reply::Bulk(data) => match std::str::from_utf8(data) {
                Ok(s) => write!(f, "\"{}\"", s),
                Err(_) => write!(f, "(binary data, {} bytes)", data.len()),
            },
            Reply::Nil => write!(f, "(nil)"),
            Reply::Error(message) => write!(f, "(error) {}", message),
            Reply::Array(values) if values.is_empty() => write!(f, "(empty array)"),
            Reply::Array(values) => {
                for (i, value) in values.iter().enumerate() {
                    if i > 0 {
                        writeln!(f)?;
                        write!(f, "{:indent$}", "", indent = indent)?;
                    }
                    let label = format!("{}) ", i + 1);
                    write!(f, "{}", label)?;
                    value.fmt_nested(f, indent + label.len())?;
                }
                Ok(())
            }
        }
    }
}

impl fmt::Display for Reply {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.fmt_nested(f, 0)
    }
}

impl From<StoreError> for Reply {
    fn from(err: StoreError) -> Self {
        Reply::Error(err.to_string())
    }
}
