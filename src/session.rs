//! Identity-provider seam: session snapshots, the provider trait, and
//! session-change events flowing in and out of the subsystem.

// std
use std::future::Future;
// self
use crate::_prelude::*;

/// Snapshot of an identity-provider session.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Session {
	/// Short-lived access token proving the caller's identity.
	pub access_token: String,
	/// Wall-clock instant at which the access token expires.
	pub expires_at: DateTime<Utc>,
}

/// Black-box identity provider consumed by the subsystem.
///
/// `current_session` is a non-blocking lookup; `refresh_session` performs a
/// network exchange producing a new access token. Implementations are shared
/// across tasks, so both take `&self`.
pub trait SessionProvider: Send + Sync + 'static {
	/// Look up the current session, if one exists.
	fn current_session(&self) -> impl Future<Output = Result<Option<Session>>> + Send;

	/// Exchange the provider's longer-lived credential for a new session.
	fn refresh_session(&self) -> impl Future<Output = Result<Session>> + Send;
}

/// Session-change notification delivered by the identity provider.
#[derive(Clone, Debug)]
pub enum SessionEvent {
	/// The provider refreshed the session on its own.
	TokenRefreshed(Session),
	/// The user signed in, or the session was updated in place.
	SignedIn(Session),
	/// The user explicitly signed out.
	SignedOut,
	/// The provider reported no session where one previously existed.
	///
	/// Not trusted immediately: this may be a transient refresh hiccup, so the
	/// controller re-queries and attempts one refresh before concluding the
	/// user is genuinely signed out.
	SessionLost,
}

/// Event emitted by the subsystem for the surrounding application.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum AuthEvent {
	/// A refresh produced a new access token.
	TokenRefreshed,
	/// The session is gone for good; local state has been cleared.
	SignedOut,
	/// Credential recovery failed outside a public route; the application
	/// should navigate to its login entry point.
	LoginRequired,
}
