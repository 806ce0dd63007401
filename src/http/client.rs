//! Authenticated HTTP client: credential attachment on the way out, one-shot
//! recovery on the way back.
//!
//! Every call runs the request interceptor (gate, cache, session lookup,
//! refresh) unless its path is a public bootstrap endpoint. Failed responses
//! get at most one recovery attempt per failure category, tracked by an
//! immutable per-call ledger rather than mutable shared request state.

// std
use std::sync::atomic::{AtomicBool, Ordering};
// crates.io
use http::{HeaderMap, Method, StatusCode};
use reqwest::{Client, redirect::Policy};
use serde::{Deserialize, Serialize, de::DeserializeOwned};
use url::Url;
// self
use crate::{_prelude::*, controller::SessionController, session::SessionProvider};

/// Header carrying the anti-forgery token on state-changing requests.
pub const CSRF_HEADER: &str = "X-CSRF-Token";

#[derive(Debug, Deserialize)]
struct CsrfTokenBody {
	#[serde(rename = "csrfToken")]
	csrf_token: String,
}

/// Response surfaced to callers once recovery is exhausted.
///
/// Transport failures are `Err`; HTTP-level failures pass through as a reply
/// so caller error handling stays uniform: callers observe the original
/// failure, never the recovery failure.
#[derive(Clone, Debug)]
pub struct HttpReply {
	/// HTTP status of the final response.
	pub status: StatusCode,
	/// Response headers of the final response.
	pub headers: HeaderMap,
	/// Raw response body.
	pub body: Vec<u8>,
}
impl HttpReply {
	/// Whether the status is in the 2xx range.
	pub fn is_success(&self) -> bool {
		self.status.is_success()
	}

	/// Body decoded as lossy UTF-8.
	pub fn text(&self) -> String {
		String::from_utf8_lossy(&self.body).into_owned()
	}

	/// Body deserialized as JSON.
	pub fn json<T>(&self) -> Result<T>
	where
		T: DeserializeOwned,
	{
		Ok(serde_json::from_slice(&self.body)?)
	}
}

/// Per-call attempt record: each recovery category fires at most once.
#[derive(Clone, Copy, Debug, Default)]
struct RetryLedger {
	auth: bool,
	csrf: bool,
}

#[derive(Debug)]
struct Call {
	method: Method,
	url: Url,
	path: String,
	body: Option<serde_json::Value>,
}

/// HTTP client that attaches credentials to every outbound call and recovers
/// from credential failures transparently.
pub struct AuthHttpClient<P> {
	controller: Arc<SessionController<P>>,
	http: Client,
	csrf_priming: Arc<AtomicBool>,
}
impl<P> Clone for AuthHttpClient<P> {
	fn clone(&self) -> Self {
		Self {
			controller: self.controller.clone(),
			http: self.http.clone(),
			csrf_priming: self.csrf_priming.clone(),
		}
	}
}
impl<P> AuthHttpClient<P>
where
	P: SessionProvider,
{
	/// Build a client with the default reqwest client.
	pub fn new(controller: Arc<SessionController<P>>) -> Result<Self> {
		let http = Client::builder()
			.redirect(Policy::limited(10))
			.user_agent(format!("auth-guard/{}", env!("CARGO_PKG_VERSION")))
			.connect_timeout(Duration::from_secs(5))
			.build()?;

		Ok(Self::with_client(controller, http))
	}

	/// Build a client using the supplied HTTP client (primarily for tests).
	pub fn with_client(controller: Arc<SessionController<P>>, http: Client) -> Self {
		Self { controller, http, csrf_priming: Arc::new(AtomicBool::new(false)) }
	}

	/// Controller backing this client.
	pub fn controller(&self) -> &Arc<SessionController<P>> {
		&self.controller
	}

	/// Issue a GET request.
	pub async fn get(&self, path: &str) -> Result<HttpReply> {
		self.request::<()>(Method::GET, path, None).await
	}

	/// Issue a DELETE request.
	pub async fn delete(&self, path: &str) -> Result<HttpReply> {
		self.request::<()>(Method::DELETE, path, None).await
	}

	/// Issue a POST request with a JSON body.
	pub async fn post<B>(&self, path: &str, body: &B) -> Result<HttpReply>
	where
		B: Serialize + ?Sized,
	{
		self.request(Method::POST, path, Some(body)).await
	}

	/// Issue a PUT request with a JSON body.
	pub async fn put<B>(&self, path: &str, body: &B) -> Result<HttpReply>
	where
		B: Serialize + ?Sized,
	{
		self.request(Method::PUT, path, Some(body)).await
	}

	/// Issue a PATCH request with a JSON body.
	pub async fn patch<B>(&self, path: &str, body: &B) -> Result<HttpReply>
	where
		B: Serialize + ?Sized,
	{
		self.request(Method::PATCH, path, Some(body)).await
	}

	/// Issue a request with an optional JSON body.
	pub async fn request<B>(&self, method: Method, path: &str, body: Option<&B>) -> Result<HttpReply>
	where
		B: Serialize + ?Sized,
	{
		let url = self.controller.config().base_url.join(path)?;
		// Serialized once so retries reuse the identical payload.
		let body = body.map(serde_json::to_value).transpose()?;
		let call = Call { method, url, path: path.to_string(), body };

		self.execute(call).await
	}

	/// Fetch a fresh anti-forgery token from the issuing endpoint and cache it.
	///
	/// The endpoint is a public bootstrap path, so the call bypasses the
	/// interceptor entirely.
	pub async fn fetch_csrf_token(&self) -> Result<String> {
		let config = self.controller.config();
		let url = config.base_url.join(&config.csrf_token_path)?;
		let response = self.http.get(url.clone()).send().await?;
		let status = response.status();

		if !status.is_success() {
			return Err(Error::HttpStatus { status, url });
		}

		let body: CsrfTokenBody = response.json().await?;

		self.controller.store_csrf(&body.csrf_token).await;

		Ok(body.csrf_token)
	}

	#[tracing::instrument(skip(self, call), fields(method = %call.method, path = %call.path))]
	async fn execute(&self, call: Call) -> Result<HttpReply> {
		let public = self.controller.config().is_public_path(&call.path);
		let mutating = is_mutating(&call.method);
		let mut ledger = RetryLedger::default();
		// A recovery retry carries the credential it resolved; the
		// interceptor must not re-derive it.
		let mut resolved: Option<String> = None;

		loop {
			let token = match (&resolved, public) {
				(Some(token), _) => Some(token.clone()),
				(None, true) => None,
				(None, false) => self.controller.resolve_token().await?,
			};
			let reply = self.dispatch(&call, token.as_deref(), mutating).await?;

			// Mirror any anti-forgery token the response carries.
			if let Some(value) = reply.headers.get(CSRF_HEADER).and_then(|v| v.to_str().ok()) {
				self.controller.store_csrf(value).await;
			}

			if reply.status == StatusCode::UNAUTHORIZED && !public && !ledger.auth {
				ledger.auth = true;

				match self.controller.refresh().await {
					Ok(session) => {
						tracing::debug!("credential rejected; refreshed, retrying once");

						resolved = Some(session.access_token);

						continue;
					},
					Err(err) => {
						tracing::warn!(error = %err, "refresh after rejection failed");

						self.controller.signal_login_required().await;

						return Ok(reply);
					},
				}
			}

			if reply.status == StatusCode::FORBIDDEN
				&& mutating && !ledger.csrf
				&& is_csrf_rejection(&reply)
			{
				ledger.csrf = true;

				self.controller.clear_csrf().await;

				match self.fetch_csrf_token().await {
					Ok(_) => {
						tracing::debug!("anti-forgery token rejected; refetched, retrying once");

						continue;
					},
					Err(err) => {
						tracing::warn!(error = %err, "anti-forgery token fetch failed");

						return Ok(reply);
					},
				}
			}

			if reply.is_success() && !public && !mutating {
				self.prime_csrf(&reply).await;
			}

			return Ok(reply);
		}
	}

	async fn dispatch(&self, call: &Call, token: Option<&str>, mutating: bool) -> Result<HttpReply> {
		let mut builder = self.http.request(call.method.clone(), call.url.clone());

		if let Some(token) = token {
			builder = builder.bearer_auth(token);
		}
		if mutating {
			// Absent token: the call goes out anyway and the server's
			// rejection drives the recovery path.
			if let Some(csrf) = self.controller.csrf_token().await {
				builder = builder.header(CSRF_HEADER, csrf);
			}
		}
		if let Some(body) = &call.body {
			builder = builder.json(body);
		}

		let response = builder.send().await?;
		let status = response.status();
		let headers = response.headers().clone();
		let body = response.bytes().await?.to_vec();

		tracing::debug!(status = %status, "exchange complete");

		Ok(HttpReply { status, headers, body })
	}

	/// Opportunistic priming: after a successful authenticated read with no
	/// cached anti-forgery token, fetch one in the background so the next
	/// state-changing call skips the synchronous round trip.
	async fn prime_csrf(&self, reply: &HttpReply) {
		if reply.headers.contains_key(CSRF_HEADER) || self.controller.csrf_token().await.is_some() {
			return;
		}
		if self.csrf_priming.compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst).is_err()
		{
			return;
		}

		let client = self.clone();

		tokio::spawn(async move {
			if let Err(err) = client.fetch_csrf_token().await {
				tracing::debug!(error = %err, "background anti-forgery priming failed");
			}

			client.csrf_priming.store(false, Ordering::SeqCst);
		});
	}
}

fn is_mutating(method: &Method) -> bool {
	[Method::POST, Method::PUT, Method::PATCH, Method::DELETE].contains(method)
}

/// Whether a 403 reply names an anti-forgery violation.
///
/// The backend flags these with an `EBADCSRFTOKEN` code; match the body
/// loosely so wording changes do not break recovery.
fn is_csrf_rejection(reply: &HttpReply) -> bool {
	reply.text().to_ascii_lowercase().contains("csrf")
}
