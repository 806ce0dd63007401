//! In-memory access-token cache.

// crates.io
use tokio::sync::RwLock;
// self
use crate::_prelude::*;

/// Last known access token together with its true expiry.
#[derive(Clone, Debug)]
pub struct CachedToken {
	/// Raw access token value.
	pub value: String,
	/// Wall-clock expiry decoded from the token payload.
	pub expires_at: DateTime<Utc>,
}
impl CachedToken {
	/// Whether the token is still usable at `now`, honouring the safety margin.
	///
	/// A token within the margin of its expiry is treated as already expired
	/// so a request never departs with a credential about to lapse mid-flight.
	pub fn is_usable(&self, now: DateTime<Utc>, margin: Duration) -> bool {
		match chrono::TimeDelta::from_std(margin) {
			Ok(margin) => now + margin < self.expires_at,
			Err(_) => false,
		}
	}
}

/// Process-wide holder for the last known access token.
///
/// Written by login and refresh flows, read by every outgoing call. Writes
/// complete in a single non-suspending step, so readers interleaved between
/// suspension points never observe a torn state.
#[derive(Debug)]
pub struct TokenCache {
	state: RwLock<Option<CachedToken>>,
	margin: Duration,
}
impl TokenCache {
	/// Create an empty cache with the given expiry safety margin.
	pub fn new(margin: Duration) -> Self {
		Self { state: RwLock::new(None), margin }
	}

	/// Safety margin applied when judging expiry.
	pub fn margin(&self) -> Duration {
		self.margin
	}

	/// Overwrite the cached token.
	pub async fn store(&self, value: impl Into<String>, expires_at: DateTime<Utc>) {
		let mut state = self.state.write().await;

		*state = Some(CachedToken { value: value.into(), expires_at });
	}

	/// Retrieve the cached token, or `None` when absent or within the safety
	/// margin of expiry.
	pub async fn current(&self) -> Option<String> {
		let state = self.state.read().await;

		state
			.as_ref()
			.filter(|token| token.is_usable(Utc::now(), self.margin))
			.map(|token| token.value.clone())
	}

	/// Drop the cached token.
	pub async fn clear(&self) {
		let mut state = self.state.write().await;

		*state = None;
	}
}
