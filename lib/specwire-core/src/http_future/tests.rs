use std::time::Instant;

use http::header::{CONTENT_TYPE, HeaderValue};
use http::{HeaderMap, StatusCode};
use serde_json::json;

use super::*;
use crate::error::TimeoutError;
use crate::response::BufferedBody;
use crate::spec::SpecConfig;

/// Raw response shape of the mock transport.
struct MockRaw {
    status: StatusCode,
    content_type: Option<&'static str>,
    body: &'static str,
}

impl MockRaw {
    fn json(status: u16, body: &'static str) -> Self {
        Self {
            status: StatusCode::from_u16(status).expect("valid status"),
            content_type: Some("application/json"),
            body,
        }
    }
}

/// Future adapter over a canned response, optionally slowed down to
/// exercise the timeout budget.
struct MockAdapter {
    raw: Option<MockRaw>,
    delay: Duration,
    budget: TimeoutBudget,
}

impl MockAdapter {
    fn new(raw: MockRaw) -> Self {
        Self {
            raw: Some(raw),
            delay: Duration::ZERO,
            budget: TimeoutBudget::new(),
        }
    }

    fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }
}

impl FutureAdapter for MockAdapter {
    type Raw = MockRaw;

    async fn result(
        &mut self,
        timeout: Option<Duration>,
    ) -> Result<TimedResponse<MockRaw>, Error> {
        let started = Instant::now();
        if let Some(budget) = self.budget.effective(timeout) {
            if self.delay > budget {
                tokio::time::sleep(budget).await;
                self.budget.record(started.elapsed());
                return Err(Error::Timeout(TimeoutError::response()));
            }
        }
        tokio::time::sleep(self.delay).await;
        self.budget.record(started.elapsed());

        let raw = self.raw.take().ok_or(Error::RequestCancelled)?;
        Ok(TimedResponse {
            response: raw,
            remaining: self.budget.effective(timeout),
        })
    }
}

struct MockResponseAdapter;

impl ResponseAdapter for MockResponseAdapter {
    type Raw = MockRaw;

    fn adapt(raw: MockRaw, remaining: Option<Duration>) -> IncomingResponse {
        let mut headers = HeaderMap::new();
        if let Some(content_type) = raw.content_type {
            headers.insert(CONTENT_TYPE, HeaderValue::from_static(content_type));
        }
        IncomingResponse::new(
            raw.status,
            raw.status.canonical_reason().unwrap_or_default(),
            headers,
            remaining,
            Box::new(BufferedBody::new(raw.body)),
        )
    }
}

fn future(raw: MockRaw, operation: Option<Operation>) -> HttpFuture<MockAdapter, MockResponseAdapter> {
    HttpFuture::new(MockAdapter::new(raw), operation.map(Arc::new))
}

fn operation(responses: serde_json::Value) -> Operation {
    Operation::parse(
        http::Method::GET,
        "/test_http",
        &json!({"operationId": "testHTTP", "responses": responses}),
        &SpecConfig::default(),
    )
    .expect("operation parses")
}

#[tokio::test]
async fn test_spec_fetch_returns_raw_response() {
    let outcome = future(MockRaw::json(200, "{}"), None)
        .result(None)
        .await
        .expect("raw path");
    match outcome {
        CallValue::Raw(response) => assert_eq!(response.status_code(), StatusCode::OK),
        other => panic!("expected the raw response, got {other:?}"),
    }
}

#[tokio::test]
async fn test_spec_fetch_non_2xx_is_not_an_error() {
    // Probing for a document that is not there: the caller gets the 404
    // response, not an error.
    let outcome = future(MockRaw::json(404, ""), None)
        .result(None)
        .await
        .expect("raw path never raises on status");
    match outcome {
        CallValue::Raw(response) => {
            assert_eq!(response.status_code(), StatusCode::NOT_FOUND);
        }
        other => panic!("expected the raw response, got {other:?}"),
    }
}

#[tokio::test]
async fn test_service_call_returns_decoded_value() {
    let operation = operation(json!({"200": {"schema": {"type": "string"}}}));
    let outcome = future(MockRaw::json(200, r#""hello""#), Some(operation))
        .result(None)
        .await
        .expect("decodes");
    match outcome {
        CallValue::Value(value) => assert_eq!(value, Some(json!("hello"))),
        other => panic!("expected the decoded value, got {other:?}"),
    }
}

#[tokio::test]
async fn test_service_call_surfaces_http_error() {
    let operation = operation(json!({
        "400": {"schema": {"type": "object", "properties": {"error": {"type": "string"}}}}
    }));
    let result = future(MockRaw::json(400, r#"{"error": "Blah"}"#), Some(operation))
        .result(None)
        .await;
    match result {
        Err(Error::Http(error)) => {
            assert_eq!(error.status(), StatusCode::BAD_REQUEST);
            assert_eq!(error.swagger_result, Some(json!({"error": "Blah"})));
        }
        other => panic!("expected an HTTP error, got {other:?}"),
    }
}

#[tokio::test]
async fn test_also_return_response_yields_both() {
    let operation = operation(json!({"200": {"schema": {"type": "integer"}}}));
    let outcome = future(MockRaw::json(200, "42"), Some(operation))
        .with_also_return_response(true)
        .result(None)
        .await
        .expect("decodes");
    match outcome {
        CallValue::ValueAndResponse(value, response) => {
            assert_eq!(value, Some(json!(42)));
            assert_eq!(response.status_code(), StatusCode::OK);
        }
        other => panic!("expected value and response, got {other:?}"),
    }
}

#[tokio::test]
async fn test_result_as_deserializes_the_value() {
    let operation = operation(json!({"200": {"schema": {"type": "integer"}}}));
    let answer: i64 = future(MockRaw::json(200, "42"), Some(operation))
        .result_as(None)
        .await
        .expect("deserializes");
    assert_eq!(answer, 42);
}

#[tokio::test]
async fn test_into_future_awaits_without_deadline() {
    let operation = operation(json!({"200": {"schema": {"type": "integer"}}}));
    let outcome = future(MockRaw::json(200, "7"), Some(operation))
        .await
        .expect("decodes");
    match outcome {
        CallValue::Value(value) => assert_eq!(value, Some(json!(7))),
        other => panic!("expected the decoded value, got {other:?}"),
    }
}

#[tokio::test]
async fn test_callbacks_wired_through_the_future() {
    use std::sync::Mutex;
    use std::sync::atomic::{AtomicUsize, Ordering};

    let operation = operation(json!({"200": {"schema": {"type": "integer"}}}));
    let count = Arc::new(AtomicUsize::new(0));
    let order = Arc::new(Mutex::new(Vec::new()));

    let counter = Arc::clone(&count);
    let first_order = Arc::clone(&order);
    let second_order = Arc::clone(&order);

    future(MockRaw::json(200, "1"), Some(operation))
        .with_response_callback(Box::new(move |_, _| {
            counter.fetch_add(1, Ordering::SeqCst);
            first_order.lock().expect("lock").push("first");
            Ok(())
        }))
        .with_response_callback(Box::new(move |_, _| {
            second_order.lock().expect("lock").push("second");
            Ok(())
        }))
        .result(None)
        .await
        .expect("decodes");

    assert_eq!(count.load(Ordering::SeqCst), 1);
    assert_eq!(*order.lock().expect("lock"), vec!["first", "second"]);
}

#[tokio::test]
async fn test_timeout_budget_decays_into_body_phase() {
    // A 100ms deadline with ~40ms spent waiting for the response leaves
    // the body phase at most ~60ms, never a fresh 100ms.
    let adapter = MockAdapter::new(MockRaw::json(200, "{}"))
        .with_delay(Duration::from_millis(40));
    let outcome = HttpFuture::<_, MockResponseAdapter>::new(adapter, None)
        .result(Some(Duration::from_millis(100)))
        .await
        .expect("fast enough");

    let response = match outcome {
        CallValue::Raw(response) => response,
        other => panic!("expected the raw response, got {other:?}"),
    };
    let remaining = response.remaining_timeout().expect("deadline was set");
    assert!(
        remaining <= Duration::from_millis(60),
        "budget was re-armed: {remaining:?}"
    );
    assert!(remaining > Duration::ZERO);
}

#[tokio::test]
async fn test_deadline_elapse_in_response_phase() {
    let adapter = MockAdapter::new(MockRaw::json(200, "{}"))
        .with_delay(Duration::from_millis(200));
    let result = HttpFuture::<_, MockResponseAdapter>::new(adapter, None)
        .result(Some(Duration::from_millis(30)))
        .await;

    match result {
        Err(Error::Timeout(timeout)) => {
            assert_eq!(timeout.phase, crate::error::TimeoutPhase::Response);
        }
        other => panic!("expected a timeout, got {other:?}"),
    }
}

#[test]
fn test_timeout_budget_arithmetic() {
    let mut budget = TimeoutBudget::new();
    assert_eq!(budget.effective(None), None);
    assert_eq!(
        budget.effective(Some(Duration::from_secs(5))),
        Some(Duration::from_secs(5))
    );

    budget.record(Duration::from_secs(2));
    assert_eq!(
        budget.effective(Some(Duration::from_secs(5))),
        Some(Duration::from_secs(3))
    );

    // Clamped at zero, never negative.
    budget.record(Duration::from_secs(10));
    assert_eq!(
        budget.effective(Some(Duration::from_secs(5))),
        Some(Duration::ZERO)
    );
    assert_eq!(budget.spent(), Duration::from_secs(12));
}
