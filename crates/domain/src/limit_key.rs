use std::fmt::{Display, Formatter, Write};

use serde::{Deserialize, Serialize};

use crate::limit::{LimitPeriod, LimitType, RoleId, ServiceId, UserId};

/// Identifiers embedded into a key. Absent values render as empty segments.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct KeyParts<'a> {
    /// User segment value.
    pub user_id: Option<UserId>,
    /// Role segment value.
    pub role_id: Option<RoleId>,
    /// Service segment value.
    pub service_id: Option<ServiceId>,
    /// Endpoint segment value.
    pub endpoint: Option<&'a str>,
    /// Verb suffix, omitted when absent.
    pub verb: Option<&'a str>,
}

/// Canonical counter key for a scope and period.
///
/// Two keys built independently from a stored rule and from an in-flight
/// request compare equal exactly when the rule applies to the request.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct LimitKey(String);

impl LimitKey {
    /// Builds the key for a scope type.
    ///
    /// Layout is `instance[.user:U|.each_user:U][.role:R][.service:S][.endpoint:E][.verb:V].<period>`,
    /// with the segments selected by the type's scope descriptor.
    #[must_use]
    pub fn resolve(limit_type: LimitType, parts: &KeyParts<'_>, period: LimitPeriod) -> Self {
        let scope = limit_type.scope();
        let mut key = String::from("instance");

        if scope.user.in_key() {
            let label = if scope.is_each_user() {
                "each_user"
            } else {
                "user"
            };
            push_segment(&mut key, label, parts.user_id);
        }
        if scope.role.in_key() {
            push_segment(&mut key, "role", parts.role_id);
        }
        if scope.service.in_key() {
            push_segment(&mut key, "service", parts.service_id);
        }
        if scope.endpoint.in_key() {
            push_segment(&mut key, "endpoint", parts.endpoint);
        }
        if let Some(verb) = parts.verb {
            push_segment(&mut key, "verb", Some(verb));
        }

        key.push('.');
        key.push_str(period.name());

        Self(key)
    }

    /// Wraps a stored key.
    #[must_use]
    pub fn from_stored(value: impl Into<String>) -> Self {
        Self(value.into())
    }

    /// Returns the key string.
    #[must_use]
    pub fn as_str(&self) -> &str {
        self.0.as_str()
    }

    /// Returns the parallel lockout marker key.
    #[must_use]
    pub fn lockout_key(&self) -> String {
        format!("{}:lockout", self.0)
    }
}

impl Display for LimitKey {
    fn fmt(&self, formatter: &mut Formatter<'_>) -> std::fmt::Result {
        formatter.write_str(self.0.as_str())
    }
}

impl From<LimitKey> for String {
    fn from(value: LimitKey) -> Self {
        value.0
    }
}

fn push_segment<T: Display>(key: &mut String, label: &str, value: Option<T>) {
    key.push('.');
    key.push_str(label);
    key.push(':');
    if let Some(value) = value {
        // Writing into a String cannot fail.
        let _ = write!(key, "{value}");
    }
}

#[cfg(test)]
mod tests {
    use proptest::prelude::*;

    use super::{KeyParts, LimitKey};
    use crate::limit::{LimitPeriod, LimitType, RoleId, ServiceId, UserId};

    fn full_parts() -> KeyParts<'static> {
        KeyParts {
            user_id: Some(UserId::new(7)),
            role_id: Some(RoleId::new(3)),
            service_id: Some(ServiceId::new(42)),
            endpoint: Some("_schema/contacts"),
            verb: None,
        }
    }

    #[test]
    fn keys_embed_only_scope_fields() {
        let parts = full_parts();
        let expectations = [
            (LimitType::Instance, "instance.minute"),
            (LimitType::User, "instance.user:7.minute"),
            (LimitType::EachUser, "instance.each_user:7.minute"),
            (LimitType::Role, "instance.role:3.minute"),
            (LimitType::UserService, "instance.user:7.service:42.minute"),
            (
                LimitType::EachUserService,
                "instance.each_user:7.service:42.minute",
            ),
            (LimitType::Service, "instance.service:42.minute"),
            (
                LimitType::ServiceEndpoint,
                "instance.service:42.endpoint:_schema/contacts.minute",
            ),
            (
                LimitType::UserServiceEndpoint,
                "instance.user:7.service:42.endpoint:_schema/contacts.minute",
            ),
            (
                LimitType::EachUserServiceEndpoint,
                "instance.each_user:7.service:42.endpoint:_schema/contacts.minute",
            ),
        ];

        for (limit_type, expected) in expectations {
            assert_eq!(
                LimitKey::resolve(limit_type, &parts, LimitPeriod::Minute).as_str(),
                expected
            );
        }
    }

    #[test]
    fn verb_precedes_period_suffix() {
        let parts = KeyParts {
            verb: Some("GET"),
            ..full_parts()
        };

        let key = LimitKey::resolve(LimitType::Service, &parts, LimitPeriod::ThirtyDay);
        assert_eq!(key.as_str(), "instance.service:42.verb:GET.30-day");
        assert_eq!(key.lockout_key(), "instance.service:42.verb:GET.30-day:lockout");
    }

    #[test]
    fn absent_identifiers_render_empty_segments() {
        let key = LimitKey::resolve(
            LimitType::Service,
            &KeyParts::default(),
            LimitPeriod::Hour,
        );
        assert_eq!(key.as_str(), "instance.service:.hour");
    }

    fn any_limit_type() -> impl Strategy<Value = LimitType> {
        prop::sample::select(LimitType::all().to_vec())
    }

    fn any_period() -> impl Strategy<Value = LimitPeriod> {
        (0_i64..5).prop_map(|index| LimitPeriod::from_index(index).unwrap_or(LimitPeriod::Minute))
    }

    proptest! {
        #[test]
        fn resolution_is_deterministic(
            limit_type in any_limit_type(),
            period in any_period(),
            user in proptest::option::of(1_i64..10_000),
            service in proptest::option::of(1_i64..10_000),
            endpoint in proptest::option::of("[a-z_]{1,12}(/[a-z]{1,8})?"),
        ) {
            let parts = KeyParts {
                user_id: user.map(UserId::new),
                role_id: None,
                service_id: service.map(ServiceId::new),
                endpoint: endpoint.as_deref(),
                verb: None,
            };

            prop_assert_eq!(
                LimitKey::resolve(limit_type, &parts, period),
                LimitKey::resolve(limit_type, &parts, period)
            );
        }

        #[test]
        fn differing_scope_field_changes_key(
            limit_type in any_limit_type(),
            period in any_period(),
            left in 1_i64..10_000,
            delta in 1_i64..10_000,
        ) {
            let scope = limit_type.scope();
            let base = KeyParts {
                user_id: Some(UserId::new(left)),
                role_id: Some(RoleId::new(left)),
                service_id: Some(ServiceId::new(left)),
                endpoint: Some("orders"),
                verb: None,
            };
            let shifted = KeyParts {
                user_id: Some(UserId::new(left + delta)),
                role_id: Some(RoleId::new(left + delta)),
                service_id: Some(ServiceId::new(left + delta)),
                endpoint: Some("orders"),
                verb: None,
            };

            let touches_key = scope.user.in_key() || scope.role.in_key() || scope.service.in_key();
            let differs = LimitKey::resolve(limit_type, &base, period)
                != LimitKey::resolve(limit_type, &shifted, period);
            prop_assert_eq!(differs, touches_key);
        }

        #[test]
        fn distinct_types_never_collide(
            left in any_limit_type(),
            right in any_limit_type(),
            period in any_period(),
        ) {
            prop_assume!(left != right);
            let parts = full_parts();
            prop_assert_ne!(
                LimitKey::resolve(left, &parts, period),
                LimitKey::resolve(right, &parts, period)
            );
        }
    }
}
