//! Middleware for the canvas HTTP server.
//!
//! Currently just rate limiting; auth is out of scope (no accounts beyond
//! the username a session joins with).

pub mod rate_limit;
