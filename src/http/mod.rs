//! HTTP layer for the Git Smart HTTP gateway.
//!
//! Provides the axum-based server surface: the gateway route that authorizes
//! a request and bridges it to the backend subprocess, plus the health and
//! metrics endpoints.

pub mod handler;
