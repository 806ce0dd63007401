//! Refresh coordinator: single-flight refresh-token exchange.

// self
use crate::{
	_prelude::*,
	flight::SingleFlight,
	session::{Session, SessionProvider},
	token::{cache::TokenCache, claims},
};

/// Serialises refresh exchanges with the identity provider.
///
/// At most one refresh network call exists at any instant; concurrent callers
/// queue behind it and share its outcome. The token cache is updated before
/// any caller observes the new session.
#[derive(Debug)]
pub struct RefreshCoordinator<P> {
	provider: Arc<P>,
	cache: Arc<TokenCache>,
	flight: SingleFlight<Session>,
}
impl<P> RefreshCoordinator<P>
where
	P: SessionProvider,
{
	/// Create a coordinator over the given provider and cache.
	pub fn new(provider: Arc<P>, cache: Arc<TokenCache>) -> Self {
		Self { provider, cache, flight: SingleFlight::new() }
	}

	/// Obtain a freshly refreshed session, joining an in-flight exchange when
	/// one exists.
	#[tracing::instrument(skip(self))]
	pub async fn refresh(&self) -> Result<Session> {
		self.flight.run(self.exchange()).await
	}

	/// Whether a refresh exchange is currently in flight.
	pub async fn in_flight(&self) -> bool {
		self.flight.in_flight().await
	}

	async fn exchange(&self) -> Result<Session> {
		tracing::debug!("starting refresh exchange");

		let session = self.provider.refresh_session().await?;
		// Prefer the expiry baked into the token itself over the provider's
		// bookkeeping; the two can drift.
		let expires_at = claims::token_expiry(&session.access_token).unwrap_or(session.expires_at);

		self.cache.store(session.access_token.clone(), expires_at).await;

		tracing::debug!(expires_at = %expires_at, "refresh exchange succeeded");

		Ok(session)
	}
}
