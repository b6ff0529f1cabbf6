//! Stored Value Types
//!
//! A key holds exactly one [`Value`]. Engines check the kind before doing any
//! work and report [`StoreError::WrongType`](crate::StoreError::WrongType) on a
//! mismatch instead of reinterpreting the bytes.

use crate::storage::sorted_set::SortedSet;
use bytes::Bytes;
use std::collections::{HashMap, HashSet, VecDeque};
use std::fmt;

/// The kind of a stored value, without its payload.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ValueKind {
    String,
    Hash,
    List,
    Set,
    SortedSet,
}

impl ValueKind {
    /// Returns the name reported by the `TYPE` command.
    pub fn as_str(&self) -> &'static str {
        match self {
            ValueKind::String => "string",
            ValueKind::Hash => "hash",
            ValueKind::List => "list",
            ValueKind::Set => "set",
            ValueKind::SortedSet => "zset",
        }
    }
}

impl fmt::Display for ValueKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A value stored under a key.
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    /// Binary-safe string
    String(Bytes),

    /// Field -> value map
    Hash(HashMap<Bytes, Bytes>),

    /// Ordered sequence, O(1) push/pop on both ends
    List(VecDeque<Bytes>),

    /// Unordered unique members
    Set(HashSet<Bytes>),

    /// Members ordered by (score, member)
    SortedSet(SortedSet),
}

impl Value {
    /// Creates an empty container of the given kind.
    ///
    /// Strings start out empty as well; callers overwrite them immediately.
    pub fn empty(kind: ValueKind) -> Self {
        match kind {
            ValueKind::String => Value::String(Bytes::new()),
            ValueKind::Hash => Value::Hash(HashMap::new()),
            ValueKind::List => Value::List(VecDeque::new()),
            ValueKind::Set => Value::Set(HashSet::new()),
            ValueKind::SortedSet => Value::SortedSet(SortedSet::new()),
        }
    }

    pub fn kind(&self) -> ValueKind {
        match self {
            Value::String(_) => ValueKind::String,
            Value::Hash(_) => ValueKind::Hash,
            Value::List(_) => ValueKind::List,
            Value::Set(_) => ValueKind::Set,
            Value::SortedSet(_) => ValueKind::SortedSet,
        }
    }

    /// Returns true for a container with no elements.
    ///
    /// Empty containers are never left in the keyspace; strings are never
    /// considered empty here, since `SET key ""` is a valid value.
    pub fn is_empty_container(&self) -> bool {
        match self {
            Value::String(_) => false,
            Value::Hash(h) => h.is_empty(),
            Value::List(l) => l.is_empty(),
            Value::Set(s) => s.is_empty(),
            Value::SortedSet(z) => z.is_empty(),
        }
    }

    pub fn as_string(&self) -> Option<&Bytes> {
        match self {
            Value::String(b) => Some(b),
            _ => None,
        }
    }

    pub fn as_hash(&self) -> Option<&HashMap<Bytes, Bytes>> {
        match self {
            Value::Hash(h) => Some(h),
            _ => None,
        }
    }

    pub fn as_hash_mut(&mut self) -> Option<&mut HashMap<Bytes, Bytes>> {
        match self {
            Value::Hash(h) => Some(h),
            _ => None,
        }
    }

    pub fn as_list(&self) -> Option<&VecDeque<Bytes>> {
        match self {
            Value::List(l) => Some(l),
            _ => None,
        }
    }

    pub fn as_list_mut(&mut self) -> Option<&mut VecDeque<Bytes>> {
        match self {
            Value::List(l) => Some(l),
            _ => None,
        }
    }

    pub fn as_set(&self) -> Option<&HashSet<Bytes>> {
        match self {
            Value::Set(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_set_mut(&mut self) -> Option<&mut HashSet<Bytes>> {
        match self {
            Value::Set(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_sorted_set(&self) -> Option<&SortedSet> {
        match self {
            Value::SortedSet(z) => Some(z),
            _ => None,
        }
    }

    pub fn as_sorted_set_mut(&mut self) -> Option<&mut SortedSet> {
        match self {
            Value::SortedSet(z) => Some(z),
            _ => None,
        }
    }

    /// Approximate heap footprint in bytes.
    pub fn memory_usage(&self) -> usize {
        match self {
            Value::String(b) => b.len(),
            Value::Hash(h) => h.iter().map(|(k, v)| k.len() + v.len()).sum(),
            Value::List(l) => l.iter().map(Bytes::len).sum(),
            Value::Set(s) => s.iter().map(Bytes::len).sum(),
            Value::SortedSet(z) => z.iter().map(|(m, _)| m.len() + 8).sum(),
        }
    }
}
