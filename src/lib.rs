//! RCA System - incident knowledge base with LLM-assisted authoring and
//! troubleshooting.
//!
//! The crate is organized as:
//! - [`store`]: JSON-file-backed record store with filtering, sorting,
//!   pagination, and aggregate stats
//! - [`search`]: tantivy full-text index plus pure fallback search used
//!   when the index is unavailable
//! - [`llm`]: provider gateway (Anthropic or OpenAI-compatible) and
//!   confidence classification
//! - [`api`]: axum handlers for the record CRUD, AI assist, and problem
//!   solver endpoints
//!
//! Every AI-backed feature degrades to a deterministic fallback when no
//! API key is configured, so the service is fully usable offline.

pub mod api;
pub mod config;
pub mod llm;
pub mod models;
pub mod search;
pub mod state;
pub mod store;
