#![deny(unused)]
//! Core types, traits, and error definitions for Playgate.
//!
//! This crate provides the foundational building blocks shared by the
//! validator, the sandbox host, the session manager and the gateway:
//! the submission and bridge data model, the fixed ceiling tables, the
//! error taxonomy, configuration, and the traits for external collaborators.

pub mod config;
pub mod error;
pub mod traits;
pub mod types;

pub use error::{Error, Result};
pub use traits::*;
pub use types::*;
