//! Single-flight coordination over asynchronous work.
//!
//! Explicit `idle | in-flight` state machine with a FIFO waiter list: the
//! first caller becomes the leader and runs the supplied future; callers
//! arriving while it is in flight enqueue a waiter and receive the shared
//! outcome. Every waiter is resolved exactly once when the leader settles.

// std
use std::{future::Future, mem};
// crates.io
use tokio::sync::{Mutex, oneshot};
// self
use crate::_prelude::*;

type Waiter<T> = oneshot::Sender<std::result::Result<T, String>>;

#[derive(Debug)]
struct FlightState<T> {
	in_flight: bool,
	waiters: Vec<Waiter<T>>,
}

/// Serialises an expensive asynchronous operation so at most one instance
/// runs at any instant.
///
/// Errors cannot be cloned across waiters, so the leader's error is fanned
/// out as its display message wrapped in [`Error::SingleFlight`]; the leader
/// itself receives the original error. The `run` future must be polled to
/// completion — the waits it coordinates are deliberately not cancellable.
#[derive(Debug)]
pub struct SingleFlight<T> {
	state: Mutex<FlightState<T>>,
}
impl<T> SingleFlight<T>
where
	T: Clone + Send,
{
	/// Create an idle coordinator.
	pub fn new() -> Self {
		Self { state: Mutex::new(FlightState { in_flight: false, waiters: Vec::new() }) }
	}

	/// Run `work` as the leader, or wait for the in-flight leader's outcome.
	pub async fn run<F>(&self, work: F) -> Result<T>
	where
		F: Future<Output = Result<T>> + Send,
	{
		let rx = {
			let mut state = self.state.lock().await;

			if state.in_flight {
				let (tx, rx) = oneshot::channel();

				state.waiters.push(tx);

				Some(rx)
			} else {
				state.in_flight = true;

				None
			}
		};

		if let Some(rx) = rx {
			return match rx.await {
				Ok(Ok(value)) => Ok(value),
				Ok(Err(message)) => Err(Error::SingleFlight(message)),
				Err(_) => Err(Error::SingleFlight("Leader dropped before settling.".into())),
			};
		}

		let outcome = work.await;
		let shared = match &outcome {
			Ok(value) => Ok(value.clone()),
			Err(err) => Err(err.to_string()),
		};
		let waiters = {
			let mut state = self.state.lock().await;

			state.in_flight = false;

			mem::take(&mut state.waiters)
		};

		tracing::debug!(waiters = waiters.len(), ok = shared.is_ok(), "single-flight settled");

		// Vec order is registration order; sends resolve waiters FIFO.
		for waiter in waiters {
			let _ = waiter.send(shared.clone());
		}

		outcome
	}

	/// Whether a leader is currently in flight.
	pub async fn in_flight(&self) -> bool {
		self.state.lock().await.in_flight
	}
}
impl<T> Default for SingleFlight<T>
where
	T: Clone + Send,
{
	fn default() -> Self {
		Self::new()
	}
}
