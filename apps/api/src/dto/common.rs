use limitgate_core::AppError;
use limitgate_domain::LimitId;
use serde::Serialize;
use ts_rs::TS;

/// Health response payload.
#[derive(Debug, Serialize, TS)]
#[ts(
    export,
    export_to = "../../../../packages/api-types/src/generated/health-response.ts"
)]
pub struct HealthResponse {
    pub status: &'static str,
}

/// Acknowledgement returned once a request cleared every limit.
#[derive(Debug, Serialize, TS)]
#[ts(
    export,
    export_to = "../../../../packages/api-types/src/generated/passthrough-response.ts"
)]
pub struct PassthroughResponse {
    pub service: String,
    pub resource: String,
    pub method: String,
}

/// Parses a comma separated id list such as `?ids=1,2,3`. Blank entries are
/// ignored.
pub fn parse_limit_ids(value: &str) -> Result<Vec<LimitId>, AppError> {
    value
        .split(',')
        .map(str::trim)
        .filter(|entry| !entry.is_empty())
        .map(|entry| {
            entry
                .parse::<i64>()
                .map(LimitId::new)
                .map_err(|_| AppError::Validation(format!("invalid limit id '{entry}'")))
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use limitgate_domain::LimitId;

    use super::parse_limit_ids;

    #[test]
    fn ids_are_parsed_in_order() {
        assert!(matches!(
            parse_limit_ids("3, 1,,2"),
            Ok(ids) if ids == vec![LimitId::new(3), LimitId::new(1), LimitId::new(2)]
        ));
    }

    #[test]
    fn non_numeric_ids_are_rejected() {
        assert!(parse_limit_ids("1,two").is_err());
    }
}
