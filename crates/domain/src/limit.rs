//! Limit rule domain types.
//!
//! A limit rule is scoped by its [`LimitType`]. Every scope type carries a
//! [`ScopeDescriptor`] describing which identifiers it requires, which must be
//! stored as null, and how it takes part in override precedence. Validation,
//! key resolution and the evaluator all read the same table.

use std::fmt::{Display, Formatter};
use std::str::FromStr;

use chrono::{DateTime, Utc};
use limitgate_core::{AppError, AppResult, NonEmptyString};
use serde::{Deserialize, Serialize};

use crate::endpoint::sanitize_endpoint;
use crate::limit_key::{KeyParts, LimitKey};

macro_rules! numeric_id {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(i64);

        impl $name {
            /// Wraps a storage identifier.
            #[must_use]
            pub fn new(value: i64) -> Self {
                Self(value)
            }

            /// Returns the raw storage identifier.
            #[must_use]
            pub fn as_i64(&self) -> i64 {
                self.0
            }
        }

        impl Display for $name {
            fn fmt(&self, formatter: &mut Formatter<'_>) -> std::fmt::Result {
                write!(formatter, "{}", self.0)
            }
        }
    };
}

numeric_id!(
    /// Identifier of a persisted limit rule.
    LimitId
);
numeric_id!(
    /// Identifier of a platform user.
    UserId
);
numeric_id!(
    /// Identifier of a platform role.
    RoleId
);
numeric_id!(
    /// Identifier of a platform service.
    ServiceId
);

/// How a scope type treats one of the scoping identifiers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScopeField {
    /// Must be present on the stored rule and is embedded in the key.
    Required,
    /// Stored as null; the key embeds the requesting caller's value instead.
    PerCaller,
    /// Must be null on the stored rule and is not part of the key.
    Forbidden,
}

impl ScopeField {
    /// Returns whether this identifier appears in the cache key.
    #[must_use]
    pub fn in_key(self) -> bool {
        !matches!(self, Self::Forbidden)
    }

    /// Returns whether this identifier must be set on the stored rule.
    #[must_use]
    pub fn is_required(self) -> bool {
        matches!(self, Self::Required)
    }
}

/// Override bucket a user-specific rule populates, or an each-user rule
/// is suppressed by.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum OverrideLevel {
    /// Instance-wide user scope.
    User,
    /// User plus service scope.
    Service,
    /// User plus service plus endpoint scope.
    Endpoint,
}

/// Static description of a scope type.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ScopeDescriptor {
    /// User identifier handling.
    pub user: ScopeField,
    /// Role identifier handling.
    pub role: ScopeField,
    /// Service identifier handling.
    pub service: ScopeField,
    /// Endpoint handling.
    pub endpoint: ScopeField,
    /// Override bucket this type feeds (user types) or checks (each-user types).
    pub override_level: Option<OverrideLevel>,
}

impl ScopeDescriptor {
    /// Returns whether every user gets an independent counter.
    #[must_use]
    pub fn is_each_user(&self) -> bool {
        matches!(self.user, ScopeField::PerCaller)
    }
}

const fn scope(
    user: ScopeField,
    role: ScopeField,
    service: ScopeField,
    endpoint: ScopeField,
    override_level: Option<OverrideLevel>,
) -> ScopeDescriptor {
    ScopeDescriptor {
        user,
        role,
        service,
        endpoint,
        override_level,
    }
}

use ScopeField::{Forbidden, PerCaller, Required};

/// Closed set of limit scope types.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum LimitType {
    /// One shared counter for the whole instance.
    #[serde(rename = "instance")]
    Instance,
    /// One counter for a specific user.
    #[serde(rename = "instance.user")]
    User,
    /// One counter per requesting user.
    #[serde(rename = "instance.each_user")]
    EachUser,
    /// One counter for a specific role.
    #[serde(rename = "instance.role")]
    Role,
    /// One counter for a specific user on a specific service.
    #[serde(rename = "instance.user.service")]
    UserService,
    /// One counter per requesting user on a specific service.
    #[serde(rename = "instance.each_user.service")]
    EachUserService,
    /// One shared counter for a service.
    #[serde(rename = "instance.service")]
    Service,
    /// One shared counter for a service endpoint.
    #[serde(rename = "instance.service.endpoint")]
    ServiceEndpoint,
    /// One counter for a specific user on a service endpoint.
    #[serde(rename = "instance.user.service.endpoint")]
    UserServiceEndpoint,
    /// One counter per requesting user on a service endpoint.
    #[serde(rename = "instance.each_user.service.endpoint")]
    EachUserServiceEndpoint,
}

impl LimitType {
    /// Returns the stable storage value for this type.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Instance => "instance",
            Self::User => "instance.user",
            Self::EachUser => "instance.each_user",
            Self::Role => "instance.role",
            Self::UserService => "instance.user.service",
            Self::EachUserService => "instance.each_user.service",
            Self::Service => "instance.service",
            Self::ServiceEndpoint => "instance.service.endpoint",
            Self::UserServiceEndpoint => "instance.user.service.endpoint",
            Self::EachUserServiceEndpoint => "instance.each_user.service.endpoint",
        }
    }

    /// Returns the scope descriptor for this type.
    #[must_use]
    pub fn scope(&self) -> ScopeDescriptor {
        match self {
            Self::Instance => scope(Forbidden, Forbidden, Forbidden, Forbidden, None),
            Self::User => scope(
                Required,
                Forbidden,
                Forbidden,
                Forbidden,
                Some(OverrideLevel::User),
            ),
            Self::EachUser => scope(
                PerCaller,
                Forbidden,
                Forbidden,
                Forbidden,
                Some(OverrideLevel::User),
            ),
            Self::Role => scope(Forbidden, Required, Forbidden, Forbidden, None),
            Self::UserService => scope(
                Required,
                Forbidden,
                Required,
                Forbidden,
                Some(OverrideLevel::Service),
            ),
            Self::EachUserService => scope(
                PerCaller,
                Forbidden,
                Required,
                Forbidden,
                Some(OverrideLevel::Service),
            ),
            Self::Service => scope(Forbidden, Forbidden, Required, Forbidden, None),
            Self::ServiceEndpoint => scope(Forbidden, Forbidden, Required, Required, None),
            Self::UserServiceEndpoint => scope(
                Required,
                Forbidden,
                Required,
                Required,
                Some(OverrideLevel::Endpoint),
            ),
            Self::EachUserServiceEndpoint => scope(
                PerCaller,
                Forbidden,
                Required,
                Required,
                Some(OverrideLevel::Endpoint),
            ),
        }
    }

    /// Returns whether this is one of the each-user variants.
    #[must_use]
    pub fn is_each_user(&self) -> bool {
        self.scope().is_each_user()
    }

    /// Returns all known scope types.
    #[must_use]
    pub fn all() -> &'static [Self] {
        const ALL: &[LimitType] = &[
            LimitType::Instance,
            LimitType::User,
            LimitType::EachUser,
            LimitType::Role,
            LimitType::UserService,
            LimitType::EachUserService,
            LimitType::Service,
            LimitType::ServiceEndpoint,
            LimitType::UserServiceEndpoint,
            LimitType::EachUserServiceEndpoint,
        ];

        ALL
    }
}

impl FromStr for LimitType {
    type Err = AppError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        Self::all()
            .iter()
            .copied()
            .find(|limit_type| limit_type.as_str() == value)
            .ok_or_else(|| AppError::Validation(format!("unknown limit type '{value}'")))
    }
}

impl Display for LimitType {
    fn fmt(&self, formatter: &mut Formatter<'_>) -> std::fmt::Result {
        formatter.write_str(self.as_str())
    }
}

/// Fixed counting windows, stored by zero-based index.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum LimitPeriod {
    /// One minute.
    Minute,
    /// One hour.
    Hour,
    /// One day.
    Day,
    /// Seven days.
    SevenDay,
    /// Thirty days.
    ThirtyDay,
}

impl LimitPeriod {
    const ORDERED: [Self; 5] = [
        Self::Minute,
        Self::Hour,
        Self::Day,
        Self::SevenDay,
        Self::ThirtyDay,
    ];

    /// Returns the storage index.
    #[must_use]
    pub fn index(&self) -> i16 {
        match self {
            Self::Minute => 0,
            Self::Hour => 1,
            Self::Day => 2,
            Self::SevenDay => 3,
            Self::ThirtyDay => 4,
        }
    }

    /// Resolves a storage index.
    pub fn from_index(index: i64) -> AppResult<Self> {
        usize::try_from(index)
            .ok()
            .and_then(|position| Self::ORDERED.get(position).copied())
            .ok_or_else(|| AppError::Validation(format!("unknown limit period index '{index}'")))
    }

    /// Returns the period name used as the key suffix.
    #[must_use]
    pub fn name(&self) -> &'static str {
        match self {
            Self::Minute => "minute",
            Self::Hour => "hour",
            Self::Day => "day",
            Self::SevenDay => "7-day",
            Self::ThirtyDay => "30-day",
        }
    }

    /// Returns the window length in minutes.
    #[must_use]
    pub fn minutes(&self) -> u32 {
        match self {
            Self::Minute => 1,
            Self::Hour => 60,
            Self::Day => 1_440,
            Self::SevenDay => 10_080,
            Self::ThirtyDay => 43_200,
        }
    }

    /// Parses a transport value given either as an index or as a name.
    pub fn from_transport(value: &str) -> AppResult<Self> {
        let trimmed = value.trim();
        if let Ok(index) = trimmed.parse::<i64>() {
            return Self::from_index(index);
        }

        Self::ORDERED
            .iter()
            .copied()
            .find(|period| period.name() == trimmed)
            .ok_or_else(|| AppError::Validation(format!("unknown limit period '{value}'")))
    }
}

/// HTTP verbs a rule may be restricted to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum HttpVerb {
    /// GET
    Get,
    /// POST
    Post,
    /// PUT
    Put,
    /// PATCH
    Patch,
    /// DELETE
    Delete,
}

/// Verbs accepted on limit rules.
pub const ALLOWED_VERBS: [HttpVerb; 5] = [
    HttpVerb::Get,
    HttpVerb::Post,
    HttpVerb::Put,
    HttpVerb::Patch,
    HttpVerb::Delete,
];

impl HttpVerb {
    /// Returns the upper-case method name.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Get => "GET",
            Self::Post => "POST",
            Self::Put => "PUT",
            Self::Patch => "PATCH",
            Self::Delete => "DELETE",
        }
    }

    /// Returns whether a request method names this verb.
    #[must_use]
    pub fn matches_method(&self, method: &str) -> bool {
        self.as_str().eq_ignore_ascii_case(method)
    }
}

impl FromStr for HttpVerb {
    type Err = AppError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        let upper = value.trim().to_ascii_uppercase();
        ALLOWED_VERBS
            .iter()
            .copied()
            .find(|verb| verb.as_str() == upper)
            .ok_or_else(|| AppError::Validation("verb is invalid or not allowed".to_owned()))
    }
}

/// Unvalidated rule payload, as received from administration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LimitInput {
    /// Scope selector.
    pub limit_type: LimitType,
    /// Specific user for user-scoped types.
    pub user_id: Option<UserId>,
    /// Specific role for role-scoped types.
    pub role_id: Option<RoleId>,
    /// Specific service for service-scoped types.
    pub service_id: Option<ServiceId>,
    /// Endpoint pattern for endpoint-scoped types.
    pub endpoint: Option<String>,
    /// Optional verb restriction, any case.
    pub verb: Option<String>,
    /// Allowed hits per period.
    pub rate: i64,
    /// Counting window.
    pub period: LimitPeriod,
    /// Display name.
    pub name: String,
    /// Optional free text.
    pub description: Option<String>,
    /// Whether the rule is evaluated.
    pub is_active: bool,
}

/// Validated rule ready to be persisted, with its canonical key.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LimitDraft {
    limit_type: LimitType,
    user_id: Option<UserId>,
    role_id: Option<RoleId>,
    service_id: Option<ServiceId>,
    endpoint: Option<String>,
    verb: Option<HttpVerb>,
    rate: u32,
    period: LimitPeriod,
    name: NonEmptyString,
    description: Option<String>,
    is_active: bool,
    key_text: LimitKey,
}

impl LimitDraft {
    /// Validates an input against its scope type and derives the key.
    ///
    /// Identifiers the scope type does not use are forced to null, required
    /// identifiers must be present, endpoints are stripped of surrounding
    /// path separators and verbs must be in [`ALLOWED_VERBS`].
    pub fn from_input(input: LimitInput) -> AppResult<Self> {
        let name = NonEmptyString::new(input.name)
            .map_err(|_| AppError::Validation("limit name must not be empty".to_owned()))?;

        let rate = u32::try_from(input.rate)
            .ok()
            .filter(|rate| *rate > 0)
            .ok_or_else(|| {
                AppError::Validation(format!(
                    "limit rate must be a positive integer, got {}",
                    input.rate
                ))
            })?;

        let verb = input
            .verb
            .as_deref()
            .filter(|value| !value.trim().is_empty())
            .map(HttpVerb::from_str)
            .transpose()?;

        let scope = input.limit_type.scope();
        let user_id = keep_if_required(scope.user, input.user_id, "user_id", name.as_str())?;
        let role_id = keep_if_required(scope.role, input.role_id, "role_id", name.as_str())?;
        let service_id =
            keep_if_required(scope.service, input.service_id, "service_id", name.as_str())?;
        let endpoint = input
            .endpoint
            .as_deref()
            .map(sanitize_endpoint)
            .filter(|endpoint| !endpoint.is_empty());
        let endpoint = keep_if_required(scope.endpoint, endpoint, "endpoint", name.as_str())?;

        let key_text = LimitKey::resolve(
            input.limit_type,
            &KeyParts {
                user_id,
                role_id,
                service_id,
                endpoint: endpoint.as_deref(),
                verb: verb.as_ref().map(HttpVerb::as_str),
            },
            input.period,
        );

        Ok(Self {
            limit_type: input.limit_type,
            user_id,
            role_id,
            service_id,
            endpoint,
            verb,
            rate,
            period: input.period,
            name,
            description: input.description,
            is_active: input.is_active,
            key_text,
        })
    }

    /// Returns the scope type.
    #[must_use]
    pub fn limit_type(&self) -> LimitType {
        self.limit_type
    }

    /// Returns the scoped user.
    #[must_use]
    pub fn user_id(&self) -> Option<UserId> {
        self.user_id
    }

    /// Returns the scoped role.
    #[must_use]
    pub fn role_id(&self) -> Option<RoleId> {
        self.role_id
    }

    /// Returns the scoped service.
    #[must_use]
    pub fn service_id(&self) -> Option<ServiceId> {
        self.service_id
    }

    /// Returns the sanitized endpoint.
    #[must_use]
    pub fn endpoint(&self) -> Option<&str> {
        self.endpoint.as_deref()
    }

    /// Returns the verb restriction.
    #[must_use]
    pub fn verb(&self) -> Option<HttpVerb> {
        self.verb
    }

    /// Returns the allowed hits per period.
    #[must_use]
    pub fn rate(&self) -> u32 {
        self.rate
    }

    /// Returns the counting window.
    #[must_use]
    pub fn period(&self) -> LimitPeriod {
        self.period
    }

    /// Returns the display name.
    #[must_use]
    pub fn name(&self) -> &str {
        self.name.as_str()
    }

    /// Returns the optional description.
    #[must_use]
    pub fn description(&self) -> Option<&str> {
        self.description.as_deref()
    }

    /// Returns whether the rule is evaluated.
    #[must_use]
    pub fn is_active(&self) -> bool {
        self.is_active
    }

    /// Returns the canonical key.
    #[must_use]
    pub fn key_text(&self) -> &LimitKey {
        &self.key_text
    }
}

fn keep_if_required<T>(
    field: ScopeField,
    value: Option<T>,
    field_name: &str,
    limit_name: &str,
) -> AppResult<Option<T>> {
    match field {
        ScopeField::Required => value.map(Some).ok_or_else(|| {
            AppError::Validation(format!(
                "{field_name} must be specified with this limit type. Limit: {limit_name}"
            ))
        }),
        ScopeField::PerCaller | ScopeField::Forbidden => Ok(None),
    }
}

/// Persisted limit rule.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LimitRule {
    /// Immutable identifier.
    pub id: LimitId,
    /// Scope selector.
    pub limit_type: LimitType,
    /// Scoped user.
    pub user_id: Option<UserId>,
    /// Scoped role.
    pub role_id: Option<RoleId>,
    /// Scoped service.
    pub service_id: Option<ServiceId>,
    /// Sanitized endpoint pattern.
    pub endpoint: Option<String>,
    /// Verb restriction.
    pub verb: Option<HttpVerb>,
    /// Allowed hits per period.
    pub rate: u32,
    /// Counting window.
    pub period: LimitPeriod,
    /// Display name.
    pub name: String,
    /// Optional free text.
    pub description: Option<String>,
    /// Whether the rule is evaluated.
    pub is_active: bool,
    /// Canonical key of the stored scope.
    pub key_text: String,
    /// Creation timestamp.
    pub created_at: DateTime<Utc>,
    /// Last modification timestamp.
    pub modified_at: DateTime<Utc>,
}

impl LimitRule {
    /// Materializes a persisted rule from a validated draft.
    #[must_use]
    pub fn from_draft(id: LimitId, draft: LimitDraft, now: DateTime<Utc>) -> Self {
        Self {
            id,
            limit_type: draft.limit_type,
            user_id: draft.user_id,
            role_id: draft.role_id,
            service_id: draft.service_id,
            endpoint: draft.endpoint,
            verb: draft.verb,
            rate: draft.rate,
            period: draft.period,
            name: draft.name.into(),
            description: draft.description,
            is_active: draft.is_active,
            key_text: draft.key_text.into(),
            created_at: now,
            modified_at: now,
        }
    }

    /// Returns the stored rule as an editable input, for patch merging.
    #[must_use]
    pub fn to_input(&self) -> LimitInput {
        LimitInput {
            limit_type: self.limit_type,
            user_id: self.user_id,
            role_id: self.role_id,
            service_id: self.service_id,
            endpoint: self.endpoint.clone(),
            verb: self.verb.map(|verb| verb.as_str().to_owned()),
            rate: i64::from(self.rate),
            period: self.period,
            name: self.name.clone(),
            description: self.description.clone(),
            is_active: self.is_active,
        }
    }

    /// Resolves the cache key for this rule with an explicit user.
    ///
    /// Each-user rules store no user, so counters are addressed per concrete
    /// user; every other rule ignores the argument and uses its stored scope.
    #[must_use]
    pub fn key_for_user(&self, user_id: Option<UserId>) -> LimitKey {
        let user_id = if self.limit_type.is_each_user() {
            user_id
        } else {
            self.user_id
        };

        LimitKey::resolve(
            self.limit_type,
            &KeyParts {
                user_id,
                role_id: self.role_id,
                service_id: self.service_id,
                endpoint: self.endpoint.as_deref(),
                verb: self.verb.as_ref().map(HttpVerb::as_str),
            },
            self.period,
        )
    }
}
