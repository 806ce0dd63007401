//! Anti-forgery token store.

// crates.io
use tokio::sync::RwLock;

/// Session-scoped holder for the current anti-forgery token.
///
/// The server deposits the token in a same-site cookie the client cannot
/// read, so the value observed in responses is mirrored here for attaching
/// to state-changing requests. Cleared on logout, repopulated lazily.
#[derive(Debug, Default)]
pub struct CsrfStore {
	state: RwLock<Option<String>>,
}
impl CsrfStore {
	/// Create an empty store.
	pub fn new() -> Self {
		Self::default()
	}

	/// Replace the stored token.
	pub async fn store(&self, value: impl Into<String>) {
		let mut state = self.state.write().await;

		*state = Some(value.into());
	}

	/// Retrieve the stored token, if any.
	pub async fn current(&self) -> Option<String> {
		self.state.read().await.clone()
	}

	/// Drop the stored token.
	pub async fn clear(&self) {
		let mut state = self.state.write().await;

		*state = None;
	}
}
