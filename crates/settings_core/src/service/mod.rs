//! Settings use-case services.
//!
//! # Responsibility
//! - Tie typed settings records to payload persistence.
//! - Keep callers decoupled from storage details.

pub mod settings_service;
