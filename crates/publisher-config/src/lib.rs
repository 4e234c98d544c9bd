// crates/publisher-config/src/lib.rs
// ============================================================================
// Module: Publisher Config Library
// Description: Configuration model, validation, and canonical example.
// Purpose: Single source of truth for publisher.toml semantics.
// Dependencies: publisher-core, serde, toml
// ============================================================================

//! ## Overview
//! `publisher-config` loads `publisher.toml`, enforces size and path limits,
//! and validates cross-field requirements before any client is built.

// ============================================================================
// SECTION: Modules
// ============================================================================

pub mod config;
pub mod examples;

// ============================================================================
// SECTION: Re-Exports
// ============================================================================

pub use config::*;
pub use examples::config_toml_example;
