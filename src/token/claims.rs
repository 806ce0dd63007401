//! Unverified JWT payload inspection.
//!
//! The cache needs the token's true expiry, which lives in the `exp` claim.
//! Signature verification is the backend's job; decoding here is purely for
//! scheduling, so the payload is parsed without validation.

// crates.io
use base64::{Engine, engine::general_purpose::URL_SAFE_NO_PAD};
use serde::Deserialize;
// self
use crate::_prelude::*;

#[derive(Debug, Deserialize)]
struct ExpiryClaim {
	exp: i64,
}

/// Extract the expiry instant from a JWT's payload segment.
///
/// Returns `None` for opaque (non-JWT) tokens or payloads without a numeric
/// `exp` claim; callers fall back to the provider-supplied expiry.
pub fn token_expiry(token: &str) -> Option<DateTime<Utc>> {
	let payload = token.split('.').nth(1)?;
	let bytes = URL_SAFE_NO_PAD.decode(payload).ok()?;
	let claim: ExpiryClaim = serde_json::from_slice(&bytes).ok()?;

	DateTime::from_timestamp(claim.exp, 0)
}
