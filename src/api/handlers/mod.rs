//! Request handlers, one module per resource.

/// Conversation listing and inspection.
pub mod conversations;
/// Liveness and provider health.
pub mod health;
/// Message submission.
pub mod messages;
/// Registration management.
pub mod registry;
/// Routing queries.
pub mod routing;
