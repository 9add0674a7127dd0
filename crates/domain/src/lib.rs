//! Domain entities and invariants.

#![forbid(unsafe_code)]

mod endpoint;
mod limit;
mod limit_key;

pub use endpoint::{WILDCARD_MARKER, derive_resource, sanitize_endpoint};
pub use limit::{
    ALLOWED_VERBS, HttpVerb, LimitDraft, LimitId, LimitInput, LimitPeriod, LimitRule, LimitType,
    OverrideLevel, RoleId, ScopeDescriptor, ScopeField, ServiceId, UserId,
};
pub use limit_key::{KeyParts, LimitKey};
