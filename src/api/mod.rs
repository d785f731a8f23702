//! HTTP API handlers and routes.
//!
//! This module is the REST surface over the platform, built on Axum. It is
//! one possible transport; the behavioral contract lives in the registry,
//! router, conversation manager and orchestrator, and any transport carrying
//! the same envelopes would do.
//!
//! # API Endpoints
//!
//! ## Registry (`/api/registry`)
//! - `POST /api/registry` - Register a provider for a capability
//! - `GET /api/registry` - Export the full registry snapshot
//! - `POST /api/registry/import` - Import a registry snapshot
//! - `GET /api/registry/{capability}` - List registrations for a capability
//! - `DELETE /api/registry/{provider_id}/{capability}` - Unregister
//!
//! ## Routing (`/api/route`)
//! - `POST /api/route` - Resolve a capability to one provider
//!
//! ## Messages (`/api/messages`)
//! - `POST /api/messages` - Submit a message and receive the orchestrated reply
//!
//! ## Conversations (`/api/conversations`)
//! - `GET /api/conversations` - List live conversations
//! - `GET /api/conversations/{id}` - Fetch one conversation with messages
//!
//! ## Health (`/api/health`, `/api/providers/health`)
//! - `GET /api/health` - Liveness check
//! - `GET /api/providers/health` - Status and performance of every registration

/// Request and response handlers for all API endpoints.
pub mod handlers;
/// Router configuration and route definitions.
pub mod routes;
