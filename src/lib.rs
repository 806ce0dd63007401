//! Async authenticated HTTP client with single-flight token refresh, CSRF recovery, and
//! fresh-login race gating — built for modern Rust identity systems.

#![deny(clippy::all, missing_docs, unused_crate_dependencies)]

pub mod config;
pub mod controller;
pub mod flight;
pub mod gate;
pub mod http;
pub mod refresh;
pub mod session;
pub mod token;

mod error;
mod _prelude {
	pub use std::{sync::Arc, time::Duration};

	pub use chrono::{DateTime, Utc};
	pub use tokio::time::Instant;

	pub use crate::{Error, Result};
}

pub use crate::{
	config::ClientConfig,
	controller::SessionController,
	error::{Error, Result},
	http::client::{AuthHttpClient, HttpReply},
	session::{AuthEvent, Session, SessionEvent, SessionProvider},
};
