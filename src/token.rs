//! Token state holders and JWT payload inspection.

pub mod cache;
pub mod claims;
pub mod csrf;
