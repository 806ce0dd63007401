//! HTTP surface: the authenticated client and its retry policy.

pub mod client;
