//! Ticket Router - HTTP boundary for the guarded prediction engine
//!
//! Settings, request validation and the axum router live here so the
//! integration tests can drive the service without binding a socket.

pub mod api;
pub mod config;
pub mod error;
pub mod schemas;
