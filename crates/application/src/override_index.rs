use std::collections::HashSet;

use limitgate_domain::{LimitRule, OverrideLevel, UserId};

/// Per-evaluation view of which users have their own rules.
///
/// A rule naming a specific user at some override level suppresses every
/// each-user rule at the same level for that user. Verb-restricted rules are
/// collected separately so unrestricted rules can yield to them.
#[derive(Debug, Default)]
pub struct OverrideIndex<'a> {
    user: HashSet<UserId>,
    service: HashSet<UserId>,
    endpoint: HashSet<UserId>,
    verb_rules: Vec<&'a LimitRule>,
}

impl<'a> OverrideIndex<'a> {
    /// Indexes a snapshot of active rules.
    #[must_use]
    pub fn build(rules: &'a [LimitRule]) -> Self {
        let mut index = Self::default();

        for rule in rules {
            if rule.verb.is_some() {
                index.verb_rules.push(rule);
            }

            let scope = rule.limit_type.scope();
            if scope.is_each_user() {
                continue;
            }
            if let (Some(level), Some(user_id)) = (scope.override_level, rule.user_id) {
                index.bucket_mut(level).insert(user_id);
            }
        }

        index
    }

    /// Returns whether a user has a specific rule at a level.
    #[must_use]
    pub fn overrides(&self, level: OverrideLevel, user_id: UserId) -> bool {
        self.bucket(level).contains(&user_id)
    }

    /// Returns whether an each-user rule yields to a user-specific rule for
    /// the requesting user.
    #[must_use]
    pub fn suppresses(&self, rule: &LimitRule, requester: Option<UserId>) -> bool {
        let scope = rule.limit_type.scope();
        if !scope.is_each_user() {
            return false;
        }

        match (scope.override_level, requester) {
            (Some(level), Some(user_id)) => self.overrides(level, user_id),
            _ => false,
        }
    }

    /// Returns rules restricted to a verb.
    #[must_use]
    pub fn verb_rules(&self) -> &[&'a LimitRule] {
        &self.verb_rules
    }

    fn bucket(&self, level: OverrideLevel) -> &HashSet<UserId> {
        match level {
            OverrideLevel::User => &self.user,
            OverrideLevel::Service => &self.service,
            OverrideLevel::Endpoint => &self.endpoint,
        }
    }

    fn bucket_mut(&mut self, level: OverrideLevel) -> &mut HashSet<UserId> {
        match level {
            OverrideLevel::User => &mut self.user,
            OverrideLevel::Service => &mut self.service,
            OverrideLevel::Endpoint => &mut self.endpoint,
        }
    }
}
