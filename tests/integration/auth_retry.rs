//! Recovery paths: authentication failures, anti-forgery failures, priming.

// std
use std::sync::{
	Arc,
	atomic::{AtomicUsize, Ordering},
};
// crates.io
use auth_guard::AuthEvent;
use http::StatusCode;
use serde_json::json;
use wiremock::{
	Mock, MockServer, ResponseTemplate,
	matchers::{method, path},
};
// self
use crate::support::{ScriptedProvider, expiring_session, fresh_session, test_client};

#[tokio::test]
async fn unauthorized_call_is_refreshed_and_retried_once() {
	let _ = tracing_subscriber::fmt::try_init();

	let server = MockServer::start().await;
	let hits = Arc::new(AtomicUsize::new(0));
	let counter = hits.clone();

	Mock::given(method("GET"))
		.and(path("/orders"))
		.respond_with(move |request: &wiremock::Request| {
			let idx = counter.fetch_add(1, Ordering::SeqCst);
			let authorization = request
				.headers
				.get("authorization")
				.and_then(|value| value.to_str().ok())
				.unwrap_or_default()
				.to_string();

			match idx {
				0 => {
					assert_eq!(authorization, "Bearer T1");

					ResponseTemplate::new(401)
				},
				_ => {
					assert_eq!(authorization, "Bearer T2", "retry must carry the refreshed token");

					ResponseTemplate::new(200).set_body_json(json!({"orders": []}))
				},
			}
		})
		.expect(2)
		.mount(&server)
		.await;

	let provider = Arc::new(ScriptedProvider::with_refresh_tokens(&["T2"]));

	provider.set_session(fresh_session("T1")).await;

	let client = test_client(&server, provider.clone());
	let reply = client.get("/orders").await.expect("send");

	assert_eq!(reply.status, StatusCode::OK);
	assert_eq!(provider.refreshes.load(Ordering::SeqCst), 1);

	server.verify().await;
}

#[tokio::test]
async fn second_unauthorized_passes_through_unretried() {
	let _ = tracing_subscriber::fmt::try_init();

	let server = MockServer::start().await;

	Mock::given(method("GET"))
		.and(path("/orders"))
		.respond_with(ResponseTemplate::new(401))
		.expect(2)
		.mount(&server)
		.await;

	let provider = Arc::new(ScriptedProvider::with_refresh_tokens(&["T2"]));

	provider.set_session(fresh_session("T1")).await;

	let client = test_client(&server, provider.clone());
	let reply = client.get("/orders").await.expect("send");

	assert_eq!(reply.status, StatusCode::UNAUTHORIZED, "second rejection is not retried");
	assert_eq!(provider.refreshes.load(Ordering::SeqCst), 1);

	server.verify().await;
}

#[tokio::test]
async fn failed_refresh_demands_login_outside_public_routes() {
	let _ = tracing_subscriber::fmt::try_init();

	let server = MockServer::start().await;

	Mock::given(method("GET"))
		.and(path("/orders"))
		.respond_with(ResponseTemplate::new(401))
		.expect(1)
		.mount(&server)
		.await;

	// Empty refresh queue: the exchange fails.
	let provider = Arc::new(ScriptedProvider::new());

	provider.set_session(fresh_session("T1")).await;

	let client = test_client(&server, provider);
	let controller = client.controller().clone();

	controller.set_active_route("/dashboard").await;

	let mut events = controller.subscribe();
	let reply = client.get("/orders").await.expect("send");

	assert_eq!(reply.status, StatusCode::UNAUTHORIZED, "original failure is returned unchanged");
	assert_eq!(events.try_recv().expect("event"), AuthEvent::LoginRequired);

	server.verify().await;
}

#[tokio::test]
async fn failed_refresh_on_public_route_propagates_quietly() {
	let _ = tracing_subscriber::fmt::try_init();

	let server = MockServer::start().await;

	Mock::given(method("GET"))
		.and(path("/orders"))
		.respond_with(ResponseTemplate::new(401))
		.mount(&server)
		.await;

	let provider = Arc::new(ScriptedProvider::new());

	provider.set_session(fresh_session("T1")).await;

	let client = test_client(&server, provider);
	let controller = client.controller().clone();

	controller.set_active_route("/login").await;

	let mut events = controller.subscribe();
	let reply = client.get("/orders").await.expect("send");

	assert_eq!(reply.status, StatusCode::UNAUTHORIZED);
	assert!(events.try_recv().is_err(), "no login demand on a public route");
}

#[tokio::test]
async fn csrf_rejection_fetches_token_and_retries_once() {
	let _ = tracing_subscriber::fmt::try_init();

	let server = MockServer::start().await;
	let hits = Arc::new(AtomicUsize::new(0));
	let counter = hits.clone();

	Mock::given(method("POST"))
		.and(path("/orders"))
		.respond_with(move |request: &wiremock::Request| {
			let idx = counter.fetch_add(1, Ordering::SeqCst);

			match idx {
				0 => {
					assert!(
						!request.headers.contains_key("x-csrf-token"),
						"nothing cached, first attempt goes out bare"
					);

					ResponseTemplate::new(403).set_body_json(json!({"code": "EBADCSRFTOKEN"}))
				},
				_ => {
					let csrf = request
						.headers
						.get("x-csrf-token")
						.and_then(|value| value.to_str().ok())
						.unwrap_or_default();

					assert_eq!(csrf, "fresh-csrf", "retry must carry the fetched token");

					ResponseTemplate::new(201)
				},
			}
		})
		.expect(2)
		.mount(&server)
		.await;

	Mock::given(method("GET"))
		.and(path("/auth/csrf-token"))
		.respond_with(ResponseTemplate::new(200).set_body_json(json!({"csrfToken": "fresh-csrf"})))
		.expect(1)
		.mount(&server)
		.await;

	let provider = Arc::new(ScriptedProvider::new());

	provider.set_session(fresh_session("T1")).await;

	let client = test_client(&server, provider);
	let reply = client.post("/orders", &json!({"item": "widget"})).await.expect("send");

	assert_eq!(reply.status, StatusCode::CREATED);
	assert_eq!(client.controller().csrf_token().await.as_deref(), Some("fresh-csrf"));

	server.verify().await;
}

#[tokio::test]
async fn non_csrf_forbidden_passes_through_untouched() {
	let _ = tracing_subscriber::fmt::try_init();

	let server = MockServer::start().await;

	Mock::given(method("POST"))
		.and(path("/orders"))
		.respond_with(
			ResponseTemplate::new(403).set_body_json(json!({"error": "insufficient permissions"})),
		)
		.expect(1)
		.mount(&server)
		.await;
	Mock::given(method("GET"))
		.and(path("/auth/csrf-token"))
		.respond_with(ResponseTemplate::new(200).set_body_json(json!({"csrfToken": "unused"})))
		.expect(0)
		.mount(&server)
		.await;

	let provider = Arc::new(ScriptedProvider::new());

	provider.set_session(fresh_session("T1")).await;

	let client = test_client(&server, provider);
	let reply = client.post("/orders", &json!({"item": "widget"})).await.expect("send");

	assert_eq!(reply.status, StatusCode::FORBIDDEN);

	server.verify().await;
}

#[tokio::test]
async fn public_paths_never_touch_the_provider() {
	let _ = tracing_subscriber::fmt::try_init();

	let server = MockServer::start().await;

	Mock::given(method("GET"))
		.and(path("/auth/health"))
		.respond_with(move |request: &wiremock::Request| {
			assert!(
				!request.headers.contains_key("authorization"),
				"bootstrap endpoints must not carry a token"
			);

			ResponseTemplate::new(200)
		})
		.expect(1)
		.mount(&server)
		.await;

	let provider = Arc::new(ScriptedProvider::new());
	let client = test_client(&server, provider.clone());
	let reply = client.get("/auth/health").await.expect("send");

	assert_eq!(reply.status, StatusCode::OK);
	assert_eq!(provider.lookups.load(Ordering::SeqCst), 0);
	assert_eq!(provider.refreshes.load(Ordering::SeqCst), 0);

	server.verify().await;
}

#[tokio::test]
async fn successful_read_primes_the_csrf_store_in_background() {
	let _ = tracing_subscriber::fmt::try_init();

	let server = MockServer::start().await;

	Mock::given(method("GET"))
		.and(path("/orders"))
		.respond_with(ResponseTemplate::new(200).set_body_json(json!({"orders": []})))
		.expect(1)
		.mount(&server)
		.await;
	Mock::given(method("GET"))
		.and(path("/auth/csrf-token"))
		.respond_with(ResponseTemplate::new(200).set_body_json(json!({"csrfToken": "primed"})))
		.expect(1)
		.mount(&server)
		.await;

	let provider = Arc::new(ScriptedProvider::new());

	provider.set_session(fresh_session("T1")).await;

	let client = test_client(&server, provider);
	let reply = client.get("/orders").await.expect("send");

	assert_eq!(reply.status, StatusCode::OK);

	// Fire-and-forget fetch; give it a beat to land.
	tokio::time::sleep(std::time::Duration::from_millis(200)).await;

	assert_eq!(client.controller().csrf_token().await.as_deref(), Some("primed"));

	server.verify().await;
}

#[tokio::test]
async fn failed_preflight_refresh_demands_login_before_the_call_leaves() {
	let _ = tracing_subscriber::fmt::try_init();

	let server = MockServer::start().await;

	Mock::given(method("GET"))
		.and(path("/orders"))
		.respond_with(ResponseTemplate::new(200))
		.expect(0)
		.mount(&server)
		.await;

	// Near-expired session with an empty refresh queue: credential
	// resolution itself fails before anything reaches the wire.
	let provider = Arc::new(ScriptedProvider::new());

	provider.set_session(expiring_session("T1")).await;

	let client = test_client(&server, provider);
	let controller = client.controller().clone();

	controller.set_active_route("/dashboard").await;

	let mut events = controller.subscribe();

	assert!(client.get("/orders").await.is_err());
	assert_eq!(events.try_recv().expect("event"), AuthEvent::LoginRequired);

	server.verify().await;
}

#[tokio::test]
async fn near_expired_session_is_refreshed_before_first_use() {
	let _ = tracing_subscriber::fmt::try_init();

	let server = MockServer::start().await;

	Mock::given(method("GET"))
		.and(path("/orders"))
		.respond_with(move |request: &wiremock::Request| {
			let authorization = request
				.headers
				.get("authorization")
				.and_then(|value| value.to_str().ok())
				.unwrap_or_default();

			assert_eq!(authorization, "Bearer T2", "expiring token must be refreshed up front");

			ResponseTemplate::new(200)
		})
		.expect(1)
		.mount(&server)
		.await;

	let provider = Arc::new(ScriptedProvider::with_refresh_tokens(&["T2"]));

	provider.set_session(expiring_session("T1")).await;

	let client = test_client(&server, provider.clone());
	let reply = client.get("/orders").await.expect("send");

	assert_eq!(reply.status, StatusCode::OK);
	assert_eq!(provider.refreshes.load(Ordering::SeqCst), 1);

	server.verify().await;
}
