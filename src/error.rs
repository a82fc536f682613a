//! Crate error type.
//!
//! Every failure surfaced by the store, object, collection, queue and rate
//! limiter layers is a `StoreError`. Callers that need to map failures onto a
//! transport (HTTP status codes and the like) switch on [`StoreError::kind`].

use std::fmt;
use std::io::Error as IoError;

/// Coarse failure category, stable across variants.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    NotFound,
    Protocol,
    Type,
    Conflict,
    RateLimitExceeded,
    Unavailable,
    Backend,
    InvalidArgument,
}

/// Business-rule violation reported by a compound script.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Conflict {
    /// Removing the role would leave nobody holding it.
    LastHolder,
    /// The entity is not registered in the index the script maintains.
    MemberMissing,
    /// The entity is already registered.
    AlreadyExists,
}

impl Conflict {
    /// Translate a script status token. `None` for tokens that are not conflicts.
    pub fn from_token(token: &str) -> Option<Conflict> {
        match token {
            "last-holder" => Some(Conflict::LastHolder),
            "member-missing" => Some(Conflict::MemberMissing),
            "already-exists" => Some(Conflict::AlreadyExists),
            _ => None,
        }
    }

    pub fn token(&self) -> &'static str {
        match self {
            Conflict::LastHolder => "last-holder",
            Conflict::MemberMissing => "member-missing",
            Conflict::AlreadyExists => "already-exists",
        }
    }
}

impl fmt::Display for Conflict {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.token())
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum StoreError {
    /// Key absent from the store.
    NotFound(String),
    /// `Orderable::move_item`: the item to move is not a member.
    ItemNotFound(String),
    /// `Orderable::move_item`: the anchor is not a member.
    TargetNotFound(String),
    /// A stored payload is not a well-formed tagged value.
    Protocol(String),
    /// A decoded value failed expected-type narrowing.
    Type {
        key: String,
        expected: &'static str,
        found: String,
    },
    Conflict(Conflict),
    RateLimitExceeded {
        rule: String,
        client: String,
    },
    /// Network or backing-store fault. Never retried transparently.
    Unavailable(String),
    /// The backing store answered with an error reply.
    Backend(String),
    InvalidArgument(String),
}

impl StoreError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            StoreError::NotFound(_) | StoreError::ItemNotFound(_) | StoreError::TargetNotFound(_) => {
                ErrorKind::NotFound
            }
            StoreError::Protocol(_) => ErrorKind::Protocol,
            StoreError::Type { .. } => ErrorKind::Type,
            StoreError::Conflict(_) => ErrorKind::Conflict,
            StoreError::RateLimitExceeded { .. } => ErrorKind::RateLimitExceeded,
            StoreError::Unavailable(_) => ErrorKind::Unavailable,
            StoreError::Backend(_) => ErrorKind::Backend,
            StoreError::InvalidArgument(_) => ErrorKind::InvalidArgument,
        }
    }

    pub(crate) fn protocol(msg: impl Into<String>) -> Self {
        StoreError::Protocol(msg.into())
    }

    pub(crate) fn unavailable(msg: impl Into<String>) -> Self {
        StoreError::Unavailable(msg.into())
    }
}

impl fmt::Display for StoreError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StoreError::NotFound(key) => write!(f, "not found: {}", key),
            StoreError::ItemNotFound(key) => write!(f, "item not found: {}", key),
            StoreError::TargetNotFound(key) => write!(f, "target not found: {}", key),
            StoreError::Protocol(msg) => write!(f, "protocol error: {}", msg),
            StoreError::Type { key, expected, found } => {
                write!(f, "type error for {}: expected {}, found {}", key, expected, found)
            }
            StoreError::Conflict(c) => write!(f, "conflict: {}", c),
            StoreError::RateLimitExceeded { rule, client } => {
                write!(f, "rate limit exceeded: rule {} for client {}", rule, client)
            }
            StoreError::Unavailable(msg) => write!(f, "store unavailable: {}", msg),
            StoreError::Backend(msg) => write!(f, "store error: {}", msg),
            StoreError::InvalidArgument(msg) => write!(f, "invalid argument: {}", msg),
        }
    }
}

impl std::error::Error for StoreError {}

impl From<IoError> for StoreError {
    fn from(e: IoError) -> Self {
        StoreError::Unavailable(e.to_string())
    }
}

impl From<serde_json::Error> for StoreError {
    fn from(e: serde_json::Error) -> Self {
        StoreError::Protocol(e.to_string())
    }
}

pub type Result<T> = std::result::Result<T, StoreError>;
