//! HTTP/REST API layer for Parley.
//!
//! Axum-based API: the turn endpoint at `/chat/`, read-only history under
//! `/api/v1/`, envelope error format, and CORS support.

pub mod error;
pub mod handlers;
pub mod response;
pub mod router;
