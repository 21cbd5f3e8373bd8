//! Query admission types (§3 Data Model)

use serde::{Deserialize, Serialize};

use super::SessionId;

/// A caller's role, used only to shape agent selection context — never a
/// security boundary on its own.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum UserRole {
    Clinician,
    Researcher,
    Patient,
    Unspecified,
}

impl Default for UserRole {
    fn default() -> Self {
        Self::Unspecified
    }
}

/// Caller-supplied user context, optional.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UserContext {
    pub id: String,
    pub role: UserRole,
}

/// Caller-supplied options that tune handling of a single query.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct QueryOptions {
    /// A caller hint about the intent of the query (e.g. "drug_interaction").
    /// Advisory only — selection (C7) is not bound by it.
    pub intent: Option<String>,
    /// When true, tool calls are served from a deterministic mock transport
    /// instead of real subprocesses. Used by integration tests and demos.
    #[serde(default)]
    pub mock: bool,
}

/// A natural-language clinical or research query, admitted once and
/// immutable thereafter (§3: "Immutable once admitted").
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Query {
    pub text: String,
    pub session_id: SessionId,
    pub user: Option<UserContext>,
    pub arrival_time: chrono::DateTime<chrono::Utc>,
    pub options: QueryOptions,
}

impl Query {
    pub fn new(text: impl Into<String>, session_id: SessionId) -> Self {
        Self {
            text: text.into(),
            session_id,
            user: None,
            arrival_time: chrono::Utc::now(),
            options: QueryOptions::default(),
        }
    }

    pub fn with_user(mut self, user: UserContext) -> Self {
        self.user = Some(user);
        self
    }

    pub fn with_options(mut self, options: QueryOptions) -> Self {
        self.options = options;
        self
    }

    pub fn user_role(&self) -> &UserRole {
        self.user.as_ref().map(|u| &u.role).unwrap_or(&UserRole::Unspecified)
    }
}
