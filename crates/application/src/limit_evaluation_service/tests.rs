use std::sync::Arc;

use limitgate_core::{AppError, CallerCredential, CallerIdentity};
use limitgate_domain::{
    LimitDraft, LimitInput, LimitPeriod, LimitRule, LimitType, ServiceId, UserId,
};

use crate::test_support::{
    FakeLimitCacheStore, FakeLimitDirectory, FakeLimitRepository, RecordingEventPublisher,
};
use crate::LimitExceededEvent;

use super::{CacheFailurePolicy, LimitDecision, LimitEvaluationService, LimitRequest};

struct Harness {
    service: LimitEvaluationService,
    repository: Arc<FakeLimitRepository>,
    cache: Arc<FakeLimitCacheStore>,
    events: Arc<RecordingEventPublisher>,
}

async fn harness(inputs: Vec<LimitInput>, policy: CacheFailurePolicy) -> (Harness, Vec<LimitRule>) {
    let repository = Arc::new(FakeLimitRepository::default());
    let drafts = inputs
        .into_iter()
        .map(LimitDraft::from_input)
        .collect::<Result<Vec<_>, _>>();
    assert!(drafts.is_ok());
    let rules = repository.seed(drafts.unwrap_or_default()).await;

    let directory = Arc::new(FakeLimitDirectory::default().with_service("db", 42));
    let cache = Arc::new(FakeLimitCacheStore::default());
    let events = Arc::new(RecordingEventPublisher::default());
    let service = LimitEvaluationService::new(
        repository.clone(),
        directory,
        cache.clone(),
        events.clone(),
        policy,
    );

    (
        Harness {
            service,
            repository,
            cache,
            events,
        },
        rules,
    )
}

fn input(limit_type: LimitType, rate: i64) -> LimitInput {
    LimitInput {
        limit_type,
        user_id: None,
        role_id: None,
        service_id: Some(ServiceId::new(42)),
        endpoint: None,
        verb: None,
        rate,
        period: LimitPeriod::Minute,
        name: format!("{limit_type} limit"),
        description: None,
        is_active: true,
    }
}

fn user(user_id: i64) -> CallerIdentity {
    CallerIdentity::new(Some(user_id), Some(1), false, CallerCredential::SessionToken)
}

fn request(caller: CallerIdentity, service: &str, resource: &str, method: &str) -> LimitRequest {
    LimitRequest {
        caller,
        service: Some(service.to_owned()),
        resource: resource.to_owned(),
        method: method.to_owned(),
    }
}

async fn evaluate(harness: &Harness, request: &LimitRequest) -> LimitDecision {
    let decision = harness.service.evaluate(request).await;
    assert!(decision.is_ok());
    decision.unwrap_or(LimitDecision::Allowed)
}

#[tokio::test]
async fn service_limit_rejects_third_request_with_headers() {
    let (harness, rules) = harness(
        vec![input(LimitType::Service, 2)],
        CacheFailurePolicy::FailOpen,
    )
    .await;
    let request = request(CallerIdentity::anonymous(), "db", "_table/orders", "GET");

    assert!(evaluate(&harness, &request).await.is_allowed());
    assert!(evaluate(&harness, &request).await.is_allowed());
    assert_eq!(harness.cache.value("instance.service:42.minute").await, Some(2));

    let decision = evaluate(&harness, &request).await;
    let LimitDecision::Throttled {
        violations,
        headers,
    } = decision
    else {
        panic!("third request should be throttled");
    };

    assert_eq!(violations.len(), 1);
    assert_eq!(violations[0].id, rules[0].id);
    assert_eq!(violations[0].name, "instance.service limit");
    assert_eq!(headers.limit, 2);
    assert_eq!(headers.remaining, 0);
    assert!(headers.retry_after.is_some_and(|seconds| seconds > 0));
    assert!(headers.reset_at.is_some());
}

#[tokio::test]
async fn lockout_holds_until_expiry_then_counter_restarts() {
    let (harness, _) = harness(
        vec![input(LimitType::Service, 3)],
        CacheFailurePolicy::FailOpen,
    )
    .await;
    let request = request(user(7), "db", "", "POST");
    let key = "instance.service:42.minute";

    for expected in 1..=3 {
        assert!(evaluate(&harness, &request).await.is_allowed());
        assert_eq!(harness.cache.value(key).await, Some(expected));
    }

    assert!(!evaluate(&harness, &request).await.is_allowed());
    assert_eq!(harness.cache.value(key).await, None);
    assert!(!evaluate(&harness, &request).await.is_allowed());
    assert_eq!(harness.cache.value(key).await, None);

    harness.cache.advance_seconds(61).await;

    assert!(evaluate(&harness, &request).await.is_allowed());
    assert_eq!(harness.cache.value(key).await, Some(1));
}

#[tokio::test]
async fn user_specific_limit_suppresses_each_user_limit() {
    let mut each_user = input(LimitType::EachUser, 5);
    each_user.service_id = None;
    let mut specific = input(LimitType::User, 100);
    specific.user_id = Some(UserId::new(7));

    let (harness, _) = harness(vec![each_user, specific], CacheFailurePolicy::FailOpen).await;

    let overridden = request(user(7), "db", "", "GET");
    for _ in 0..6 {
        assert!(evaluate(&harness, &overridden).await.is_allowed());
    }
    assert_eq!(harness.cache.value("instance.user:7.minute").await, Some(6));

    let regular = request(user(8), "db", "", "GET");
    for _ in 0..5 {
        assert!(evaluate(&harness, &regular).await.is_allowed());
    }
    assert!(!evaluate(&harness, &regular).await.is_allowed());
}

#[tokio::test]
async fn each_user_limit_skips_anonymous_callers() {
    let mut each_user = input(LimitType::EachUserService, 1);
    each_user.service_id = Some(ServiceId::new(42));

    let (harness, _) = harness(vec![each_user], CacheFailurePolicy::FailOpen).await;
    let request = request(CallerIdentity::anonymous(), "db", "", "GET");

    for _ in 0..3 {
        assert!(evaluate(&harness, &request).await.is_allowed());
    }
    assert_eq!(harness.cache.writes().await, 0);
}

#[tokio::test]
async fn basic_auth_callers_are_counted_by_each_user_limits() {
    let (harness, _) = harness(
        vec![input(LimitType::EachUserService, 1)],
        CacheFailurePolicy::FailOpen,
    )
    .await;
    let caller = CallerIdentity::new(Some(9), None, false, CallerCredential::BasicAuth);
    let request = request(caller, "db", "", "GET");

    assert!(evaluate(&harness, &request).await.is_allowed());
    assert_eq!(
        harness.cache.value("instance.each_user:9.service:42.minute").await,
        Some(1)
    );
    assert!(!evaluate(&harness, &request).await.is_allowed());
}

#[tokio::test]
async fn verb_specific_limit_overrides_verb_agnostic_limit() {
    let agnostic = input(LimitType::Service, 1);
    let mut for_get = input(LimitType::Service, 10);
    for_get.verb = Some("get".to_owned());

    let (harness, _) = harness(vec![agnostic, for_get], CacheFailurePolicy::FailOpen).await;

    let get = request(user(7), "db", "", "GET");
    for _ in 0..3 {
        assert!(evaluate(&harness, &get).await.is_allowed());
    }
    assert_eq!(
        harness.cache.value("instance.service:42.verb:GET.minute").await,
        Some(3)
    );

    let post = request(user(7), "db", "", "POST");
    let decision = evaluate(&harness, &post).await;
    assert_eq!(decision.violations().len(), 1);
}

#[tokio::test]
async fn wildcard_endpoint_collapses_sub_resources_onto_one_counter() {
    let mut schema = input(LimitType::ServiceEndpoint, 1);
    schema.endpoint = Some("_schema*".to_owned());

    let (harness, _) = harness(vec![schema], CacheFailurePolicy::FailOpen).await;

    let first = request(user(7), "db", "_schema/contacts/name", "GET");
    assert!(evaluate(&harness, &first).await.is_allowed());

    let other = request(user(7), "db", "_proc/contacts", "GET");
    assert!(evaluate(&harness, &other).await.is_allowed());

    let second = request(user(7), "db", "_schema/users", "GET");
    assert!(!evaluate(&harness, &second).await.is_allowed());
}

#[tokio::test]
async fn admin_requests_skip_all_lookups_and_writes() {
    let (harness, _) = harness(
        vec![input(LimitType::Service, 1)],
        CacheFailurePolicy::FailOpen,
    )
    .await;
    let admin = CallerIdentity::new(Some(1), None, true, CallerCredential::SessionToken);
    let request = request(admin, "db", "", "GET");

    for _ in 0..5 {
        assert!(evaluate(&harness, &request).await.is_allowed());
    }
    assert_eq!(harness.cache.writes().await, 0);
    assert_eq!(harness.repository.list_calls().await, 0);
}

#[tokio::test]
async fn unknown_service_does_not_match_service_limits() {
    let (harness, _) = harness(
        vec![input(LimitType::Service, 1), input(LimitType::Instance, 5)],
        CacheFailurePolicy::FailOpen,
    )
    .await;
    let request = request(user(7), "missing", "", "GET");

    for _ in 0..3 {
        assert!(evaluate(&harness, &request).await.is_allowed());
    }
    assert_eq!(harness.cache.value("instance.service:42.minute").await, None);
    assert_eq!(harness.cache.value("instance.minute").await, Some(3));
}

#[tokio::test]
async fn unavailable_cache_follows_failure_policy() {
    let (open, _) = harness(
        vec![input(LimitType::Service, 1)],
        CacheFailurePolicy::FailOpen,
    )
    .await;
    open.cache.set_unavailable(true).await;
    let request = request(user(7), "db", "", "GET");
    assert!(evaluate(&open, &request).await.is_allowed());

    let (closed, _) = harness(
        vec![input(LimitType::Service, 1)],
        CacheFailurePolicy::FailClosed,
    )
    .await;
    closed.cache.set_unavailable(true).await;
    let result = closed.service.evaluate(&request).await;
    assert!(matches!(result, Err(AppError::Unavailable(_))));
}

#[tokio::test]
async fn lockout_transition_publishes_generic_and_specific_events() {
    let (harness, rules) = harness(
        vec![input(LimitType::Service, 1)],
        CacheFailurePolicy::FailOpen,
    )
    .await;
    let request = request(user(7), "db", "_table", "get");

    assert!(evaluate(&harness, &request).await.is_allowed());
    assert!(!evaluate(&harness, &request).await.is_allowed());
    assert!(!evaluate(&harness, &request).await.is_allowed());

    let published = harness.events.published.lock().await;
    let names: Vec<&str> = published.iter().map(|(name, _)| name.as_str()).collect();
    let specific = format!("system.limit.{}.exceeded", rules[0].id);
    assert_eq!(names, vec![LimitExceededEvent::GENERIC_NAME, specific.as_str()]);
    assert_eq!(published[0].1.method, "GET");
    assert_eq!(published[0].1.user_id, Some(UserId::new(7)));
}

#[tokio::test]
async fn headers_report_longest_lockout_among_violations() {
    let short = input(LimitType::Service, 1);
    let mut long = input(LimitType::Instance, 1);
    long.period = LimitPeriod::Hour;

    let (harness, _) = harness(vec![short, long], CacheFailurePolicy::FailOpen).await;
    let request = request(user(7), "db", "", "GET");

    assert!(evaluate(&harness, &request).await.is_allowed());
    let decision = evaluate(&harness, &request).await;
    let LimitDecision::Throttled {
        violations,
        headers,
    } = decision
    else {
        panic!("second request should be throttled");
    };

    assert_eq!(violations.len(), 2);
    assert!(headers.retry_after.is_some_and(|seconds| seconds > 60));
}

#[test]
fn failure_policy_parses_configuration_values() {
    assert_eq!(
        "open".parse::<CacheFailurePolicy>().ok(),
        Some(CacheFailurePolicy::FailOpen)
    );
    assert_eq!(
        " Closed ".parse::<CacheFailurePolicy>().ok(),
        Some(CacheFailurePolicy::FailClosed)
    );
    assert!("sometimes".parse::<CacheFailurePolicy>().is_err());
}
