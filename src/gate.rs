//! One-shot barrier for the post-login propagation window.
//!
//! Immediately after an interactive login the identity provider's session may
//! not yet be queryable by the first authenticated request of the freshly
//! navigated page. The gate converts that race into a bounded wait: requests
//! block between `begin()` and `signal_ready()`, capped by a hard timeout so
//! a missed ready signal degrades into a warning instead of a hung UI.

// crates.io
use tokio::{
	sync::{Mutex, watch},
	time,
};
// self
use crate::_prelude::*;

#[derive(Debug)]
struct GateState {
	pending: bool,
	ready: watch::Sender<bool>,
}

/// Barrier blocking authenticated calls until a fresh session has propagated.
#[derive(Debug)]
pub struct FreshLoginGate {
	state: Mutex<GateState>,
	timeout: Duration,
}
impl FreshLoginGate {
	/// Create an open gate with the given wait bound.
	pub fn new(timeout: Duration) -> Self {
		let (ready, _) = watch::channel(false);

		Self { state: Mutex::new(GateState { pending: false, ready }), timeout }
	}

	/// Close the gate: a login is starting and the session is not yet usable.
	pub async fn begin(&self) {
		let mut state = self.state.lock().await;
		let (ready, _) = watch::channel(false);

		state.pending = true;
		state.ready = ready;

		tracing::debug!("fresh-login gate closed");
	}

	/// Open the gate: the new session is confirmed queryable.
	///
	/// Safe to call when not pending; the signal is then a no-op.
	pub async fn signal_ready(&self) {
		let mut state = self.state.lock().await;

		if !state.pending {
			return;
		}

		state.pending = false;

		let _ = state.ready.send(true);

		tracing::debug!("fresh-login gate opened");
	}

	/// Wait for the gate to open.
	///
	/// Returns immediately when not pending. Otherwise suspends until
	/// `signal_ready()` fires or the timeout elapses; a timeout is logged as a
	/// warning, opens the gate, and the request proceeds (fail open). Opening
	/// on timeout keeps one missed ready signal from taxing every later
	/// request with the full wait.
	pub async fn wait_ready(&self) {
		let mut rx = {
			let state = self.state.lock().await;

			if !state.pending {
				return;
			}

			state.ready.subscribe()
		};
		let opened =
			time::timeout(self.timeout, rx.wait_for(|ready| *ready)).await.map(|r| r.map(drop));

		match opened {
			// A dropped sender means the gate was re-armed or torn down;
			// either way the wait no longer applies.
			Ok(_) => {},
			Err(_) => {
				tracing::warn!(
					timeout = ?self.timeout,
					"fresh-login gate timed out without a ready signal; opening"
				);

				let mut state = self.state.lock().await;

				// Only open the closure that timed out; a gate re-armed by a
				// newer `begin()` keeps its own wait budget.
				if state.pending && state.ready.subscribe().same_channel(&rx) {
					state.pending = false;

					let _ = state.ready.send(true);
				}
			},
		}
	}

	/// Whether the gate is currently closed.
	pub async fn is_pending(&self) -> bool {
		self.state.lock().await.pending
	}
}
