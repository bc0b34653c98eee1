//! Persistence of serialized settings payloads.
//!
//! # Responsibility
//! - Define the storage contract for settings payloads keyed by owner.
//! - Keep SQL details away from the service layer.
//!
//! # Invariants
//! - Stored payloads are JSON objects; encrypted attributes are already
//!   ciphertext when they reach this layer.

pub mod settings_repo;
