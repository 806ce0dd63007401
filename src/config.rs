//! Client configuration and validation.

// crates.io
use serde::{Deserialize, Serialize};
use url::Url;
// self
use crate::_prelude::*;

/// Default safety margin subtracted from token expiry.
pub const DEFAULT_EXPIRY_MARGIN: Duration = Duration::from_secs(30);
/// Default upper bound on the fresh-login gate wait.
pub const DEFAULT_GATE_TIMEOUT: Duration = Duration::from_secs(5);
/// Default delay between session lookup attempts after a cache miss.
pub const DEFAULT_SESSION_POLL_INTERVAL: Duration = Duration::from_millis(250);
/// Default overall window for post-login session polling.
pub const DEFAULT_SESSION_POLL_WINDOW: Duration = Duration::from_secs(2);
/// Default endpoint issuing anti-forgery tokens.
pub const DEFAULT_CSRF_TOKEN_PATH: &str = "/auth/csrf-token";

/// Configuration describing how the client reaches the backend API and which
/// surfaces are exempt from authentication.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ClientConfig {
	/// Base URL of the backend API; request paths are joined onto it.
	pub base_url: Url,
	/// Whether HTTPS is required for the backend API.
	#[serde(default = "default_true")]
	pub require_https: bool,
	/// API path prefixes that never carry a token (identity bootstrap
	/// endpoints; requiring a token here would be circular).
	#[serde(default = "default_public_paths")]
	pub public_paths: Vec<String>,
	/// Application routes on which a failed refresh is surfaced to the
	/// caller instead of demanding a login.
	#[serde(default = "default_public_routes")]
	pub public_routes: Vec<String>,
	/// Endpoint path that issues fresh anti-forgery tokens.
	#[serde(default = "default_csrf_token_path")]
	pub csrf_token_path: String,
	/// Tokens within this margin of expiry are treated as already expired.
	#[serde(default = "default_expiry_margin")]
	pub expiry_margin: Duration,
	/// Upper bound on how long requests wait behind the fresh-login gate.
	#[serde(default = "default_gate_timeout")]
	pub gate_timeout: Duration,
	/// Delay between session lookup attempts while polling.
	#[serde(default = "default_session_poll_interval")]
	pub session_poll_interval: Duration,
	/// Overall window allotted to session polling after a cache miss.
	#[serde(default = "default_session_poll_window")]
	pub session_poll_window: Duration,
}
impl ClientConfig {
	/// Construct a configuration with default settings for the given base URL.
	pub fn new(base_url: impl AsRef<str>) -> Result<Self> {
		let base_url = Url::parse(base_url.as_ref())?;

		Ok(Self {
			base_url,
			require_https: true,
			public_paths: default_public_paths(),
			public_routes: default_public_routes(),
			csrf_token_path: default_csrf_token_path(),
			expiry_margin: DEFAULT_EXPIRY_MARGIN,
			gate_timeout: DEFAULT_GATE_TIMEOUT,
			session_poll_interval: DEFAULT_SESSION_POLL_INTERVAL,
			session_poll_window: DEFAULT_SESSION_POLL_WINDOW,
		})
	}

	/// Set HTTPS requirement to the desired value.
	pub fn with_require_https(mut self, require_https: bool) -> Self {
		self.require_https = require_https;

		self
	}

	/// Whether the API path is exempt from credential resolution.
	pub fn is_public_path(&self, path: &str) -> bool {
		self.public_paths.iter().any(|prefix| path.starts_with(prefix.as_str()))
	}

	/// Whether the application route tolerates an unauthenticated state.
	///
	/// Nested routes count only on a segment boundary, so `/login/mfa` is
	/// public while `/loginfoo` is not.
	pub fn is_public_route(&self, route: &str) -> bool {
		self.public_routes.iter().any(|public| {
			route == public
				|| route.strip_prefix(public.as_str()).is_some_and(|rest| rest.starts_with('/'))
		})
	}

	/// Validate the configuration against the documented constraints.
	pub fn validate(&self) -> Result<()> {
		if self.require_https && self.base_url.scheme() != "https" {
			return Err(Error::Validation {
				field: "base_url",
				reason: "Must use the https scheme when require_https is set.".into(),
			});
		}
		if self.base_url.host_str().is_none() {
			return Err(Error::Validation {
				field: "base_url",
				reason: "Must include a host component.".into(),
			});
		}

		for path in self.public_paths.iter().chain([&self.csrf_token_path]) {
			if !path.starts_with('/') {
				return Err(Error::Validation {
					field: "public_paths",
					reason: format!("Path '{path}' must be absolute (start with '/')."),
				});
			}
		}

		if self.gate_timeout.is_zero() {
			return Err(Error::Validation {
				field: "gate_timeout",
				reason: "Must be greater than zero.".into(),
			});
		}
		if self.session_poll_interval.is_zero() {
			return Err(Error::Validation {
				field: "session_poll_interval",
				reason: "Must be greater than zero.".into(),
			});
		}
		if self.session_poll_window < self.session_poll_interval {
			return Err(Error::Validation {
				field: "session_poll_window",
				reason: "Must be greater than or equal to session_poll_interval.".into(),
			});
		}

		Ok(())
	}
}

fn default_true() -> bool {
	true
}

fn default_public_paths() -> Vec<String> {
	vec!["/auth/".into()]
}

fn default_public_routes() -> Vec<String> {
	vec!["/login".into(), "/register".into(), "/forgot-password".into()]
}

fn default_csrf_token_path() -> String {
	DEFAULT_CSRF_TOKEN_PATH.into()
}

fn default_expiry_margin() -> Duration {
	DEFAULT_EXPIRY_MARGIN
}

fn default_gate_timeout() -> Duration {
	DEFAULT_GATE_TIMEOUT
}

fn default_session_poll_interval() -> Duration {
	DEFAULT_SESSION_POLL_INTERVAL
}

fn default_session_poll_window() -> Duration {
	DEFAULT_SESSION_POLL_WINDOW
}
