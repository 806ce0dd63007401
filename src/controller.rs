//! Session controller: the single choke point for token lifecycle state.
//!
//! Owns the four process-wide singletons (token cache, CSRF store,
//! fresh-login gate, refresh coordinator) and exposes the application-facing
//! lifecycle surface. No external caller mutates the singletons directly.

// crates.io
use tokio::{
	sync::{RwLock, broadcast},
	time,
};
// self
use crate::{
	_prelude::*,
	config::ClientConfig,
	flight::SingleFlight,
	gate::FreshLoginGate,
	refresh::RefreshCoordinator,
	session::{AuthEvent, Session, SessionEvent, SessionProvider},
	token::{
		cache::{CachedToken, TokenCache},
		claims,
		csrf::CsrfStore,
	},
};

const EVENT_CHANNEL_CAPACITY: usize = 16;

/// Coordinates credential resolution and token lifecycle for one session.
pub struct SessionController<P> {
	config: ClientConfig,
	provider: Arc<P>,
	cache: Arc<TokenCache>,
	csrf: Arc<CsrfStore>,
	gate: FreshLoginGate,
	refresh: RefreshCoordinator<P>,
	lookup: SingleFlight<Option<Session>>,
	active_route: RwLock<Option<String>>,
	events: broadcast::Sender<AuthEvent>,
}
impl<P> SessionController<P>
where
	P: SessionProvider,
{
	/// Build a controller over the given provider.
	pub fn new(config: ClientConfig, provider: Arc<P>) -> Result<Self> {
		config.validate()?;

		let cache = Arc::new(TokenCache::new(config.expiry_margin));
		let gate = FreshLoginGate::new(config.gate_timeout);
		let refresh = RefreshCoordinator::new(provider.clone(), cache.clone());
		let (events, _) = broadcast::channel(EVENT_CHANNEL_CAPACITY);

		Ok(Self {
			config,
			provider,
			cache,
			csrf: Arc::new(CsrfStore::new()),
			gate,
			refresh,
			lookup: SingleFlight::new(),
			active_route: RwLock::new(None),
			events,
		})
	}

	/// Configuration the controller was built with.
	pub fn config(&self) -> &ClientConfig {
		&self.config
	}

	/// Subscribe to authentication events emitted by the subsystem.
	pub fn subscribe(&self) -> broadcast::Receiver<AuthEvent> {
		self.events.subscribe()
	}

	/// Record a token obtained by a login or refresh flow.
	///
	/// The expiry baked into the token payload wins over the caller-supplied
	/// instant when the two disagree.
	pub async fn set_token(&self, token: impl Into<String>, expires_at: DateTime<Utc>) {
		let token = token.into();
		let expires_at = claims::token_expiry(&token).unwrap_or(expires_at);

		self.cache.store(token, expires_at).await;
	}

	/// Close the fresh-login gate; called immediately before navigating into
	/// the authenticated area after an interactive login.
	pub async fn begin_fresh_login(&self) {
		self.gate.begin().await;
	}

	/// Open the fresh-login gate; called once the new session is confirmed
	/// queryable.
	pub async fn mark_session_ready(&self) {
		self.gate.signal_ready().await;
	}

	/// Clear all session-scoped state; called on logout.
	pub async fn clear_session(&self) {
		self.cache.clear().await;
		self.csrf.clear().await;
	}

	/// Record the application route currently in the foreground.
	pub async fn set_active_route(&self, route: impl Into<String>) {
		let mut active = self.active_route.write().await;

		*active = Some(route.into());
	}

	/// Current anti-forgery token, if one is cached.
	pub async fn csrf_token(&self) -> Option<String> {
		self.csrf.current().await
	}

	/// Replace the cached anti-forgery token.
	pub async fn store_csrf(&self, value: impl Into<String>) {
		self.csrf.store(value).await;
	}

	/// Drop the cached anti-forgery token.
	pub async fn clear_csrf(&self) {
		self.csrf.clear().await;
	}

	/// Drive the refresh coordinator, joining an in-flight exchange when one
	/// exists.
	pub async fn refresh(&self) -> Result<Session> {
		let session = self.refresh.refresh().await?;
		let _ = self.events.send(AuthEvent::TokenRefreshed);

		Ok(session)
	}

	/// Announce that credential recovery failed and a login is required,
	/// unless the active route already tolerates an unauthenticated state.
	pub async fn signal_login_required(&self) {
		let active = self.active_route.read().await.clone();
		let public = active.as_deref().map(|route| self.config.is_public_route(route));

		if public == Some(true) {
			tracing::debug!(route = active.as_deref(), "refresh failed on a public route; not demanding login");

			return;
		}

		let _ = self.events.send(AuthEvent::LoginRequired);
	}

	/// Resolve a usable access token for an outgoing authenticated call.
	///
	/// Order: fresh-login gate, token cache, deduplicated session polling,
	/// refresh on near-expiry. Resolving to `None` deliberately lets the call
	/// proceed without a credential; the backend's rejection then drives the
	/// recovery path (fail open).
	#[tracing::instrument(skip(self))]
	pub async fn resolve_token(&self) -> Result<Option<String>> {
		self.gate.wait_ready().await;

		if let Some(token) = self.cache.current().await {
			return Ok(Some(token));
		}

		let session = self.lookup.run(self.poll_session()).await?;

		match session {
			None => {
				tracing::debug!("no session found; proceeding without a credential");

				Ok(None)
			},
			Some(session) => {
				let expires_at =
					claims::token_expiry(&session.access_token).unwrap_or(session.expires_at);
				let cached = CachedToken { value: session.access_token, expires_at };

				if cached.is_usable(Utc::now(), self.cache.margin()) {
					self.cache.store(cached.value.clone(), cached.expires_at).await;

					Ok(Some(cached.value))
				} else {
					tracing::debug!("session token expired or near expiry; refreshing");

					match self.refresh().await {
						Ok(refreshed) => Ok(Some(refreshed.access_token)),
						Err(err) => {
							tracing::warn!(error = %err, "pre-flight refresh failed");

							self.signal_login_required().await;

							Err(err)
						},
					}
				}
			},
		}
	}

	/// React to a session-change notification from the identity provider.
	#[tracing::instrument(skip_all)]
	pub async fn handle_session_event(&self, event: SessionEvent) {
		match event {
			SessionEvent::TokenRefreshed(session) => {
				self.set_token(session.access_token, session.expires_at).await;

				let _ = self.events.send(AuthEvent::TokenRefreshed);
			},
			SessionEvent::SignedIn(session) => {
				self.set_token(session.access_token, session.expires_at).await;
			},
			SessionEvent::SignedOut => {
				self.clear_session().await;

				let _ = self.events.send(AuthEvent::SignedOut);
			},
			SessionEvent::SessionLost => self.recover_lost_session().await,
		}
	}

	/// Transient-null recovery: a null-session notification may be a momentary
	/// provider hiccup, so re-query and attempt one refresh before concluding
	/// the user is genuinely signed out.
	async fn recover_lost_session(&self) {
		match self.provider.current_session().await {
			Ok(Some(session)) => {
				tracing::debug!("session reappeared after null-session notification");

				self.set_token(session.access_token, session.expires_at).await;

				return;
			},
			Ok(None) => {},
			Err(err) => {
				tracing::warn!(error = %err, "session re-query failed after null-session notification");
			},
		}

		match self.refresh().await {
			Ok(_) => {
				tracing::debug!("refresh recovered the session after null-session notification");
			},
			Err(err) => {
				tracing::warn!(error = %err, "session could not be recovered; signing out");

				self.clear_session().await;

				let _ = self.events.send(AuthEvent::SignedOut);
			},
		}
	}

	async fn poll_session(&self) -> Result<Option<Session>> {
		let deadline = Instant::now() + self.config.session_poll_window;

		loop {
			if let Some(session) = self.provider.current_session().await? {
				return Ok(Some(session));
			}
			if Instant::now() + self.config.session_poll_interval > deadline {
				return Ok(None);
			}

			tracing::debug!("session not yet visible; polling");

			time::sleep(self.config.session_poll_interval).await;
		}
	}
}
