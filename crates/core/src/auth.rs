use serde::{Deserialize, Serialize};

/// Credential presented by the caller, as resolved by the request pipeline.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CallerCredential {
    /// Anonymous request.
    None,
    /// Session or API token.
    SessionToken,
    /// Alternate accepted credential such as HTTP basic auth.
    BasicAuth,
}

/// Request-scoped identity passed explicitly into limit evaluation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CallerIdentity {
    user_id: Option<i64>,
    role_id: Option<i64>,
    is_admin: bool,
    credential: CallerCredential,
}

impl CallerIdentity {
    /// Creates a caller identity from resolved session data.
    #[must_use]
    pub fn new(
        user_id: Option<i64>,
        role_id: Option<i64>,
        is_admin: bool,
        credential: CallerCredential,
    ) -> Self {
        Self {
            user_id,
            role_id,
            is_admin,
            credential,
        }
    }

    /// Creates an anonymous, unauthenticated caller.
    #[must_use]
    pub fn anonymous() -> Self {
        Self::new(None, None, false, CallerCredential::None)
    }

    /// Returns the authenticated user id, if any.
    #[must_use]
    pub fn user_id(&self) -> Option<i64> {
        self.user_id
    }

    /// Returns the caller's role id, if any.
    #[must_use]
    pub fn role_id(&self) -> Option<i64> {
        self.role_id
    }

    /// Returns whether the caller is a system administrator.
    #[must_use]
    pub fn is_admin(&self) -> bool {
        self.is_admin
    }

    /// Returns the presented credential.
    #[must_use]
    pub fn credential(&self) -> CallerCredential {
        self.credential
    }

    /// Returns whether the caller presented any accepted credential.
    #[must_use]
    pub fn is_authenticated(&self) -> bool {
        !matches!(self.credential, CallerCredential::None)
    }
}
