//! Core types and data structures for the Healthcare Query Orchestration Core

use serde::{Deserialize, Serialize};
use uuid::Uuid;

pub mod agent;
pub mod error;
pub mod query;
pub mod response;
pub mod tool;

pub use agent::*;
pub use error::*;
pub use query::*;
pub use response::*;
pub use tool::*;

/// Unique identifier for a single orchestrated request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct RequestId(pub Uuid);

impl RequestId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for RequestId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for RequestId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Opaque session handle. Sessions scope the response cache (C3) and the
/// tool registry's per-session tool list (C2); they never outlive a single
/// conversation with the caller.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SessionId(pub String);

impl SessionId {
    pub fn new(raw: impl Into<String>) -> Self {
        Self(raw.into())
    }
}

impl std::fmt::Display for SessionId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}
