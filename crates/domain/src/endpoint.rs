/// Suffix marking a rule endpoint as a prefix match.
pub const WILDCARD_MARKER: char = '*';

/// Strips leading and trailing path separators.
#[must_use]
pub fn sanitize_endpoint(endpoint: &str) -> String {
    endpoint.trim_matches('/').to_owned()
}

/// Resolves the effective resource used to build a request's key.
///
/// A matching rule endpoint replaces the request resource, so every
/// sub-resource under a wildcard rule (`_schema/contacts/name` under
/// `_schema*`) collapses onto the rule's own key. When nothing matches the
/// sanitized request resource is returned and the keys will differ.
#[must_use]
pub fn derive_resource(request_resource: &str, rule_endpoint: Option<&str>) -> String {
    let resource = sanitize_endpoint(request_resource);

    let Some(endpoint) = rule_endpoint.filter(|endpoint| !endpoint.is_empty()) else {
        return resource;
    };
    if resource.is_empty() {
        return resource;
    }

    let matched = match endpoint.rfind(WILDCARD_MARKER) {
        Some(position) => resource
            .as_bytes()
            .get(..position)
            .is_some_and(|prefix| prefix == &endpoint.as_bytes()[..position]),
        None => endpoint == resource,
    };

    if matched {
        endpoint.to_owned()
    } else {
        resource
    }
}
