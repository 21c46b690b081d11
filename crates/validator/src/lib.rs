#![deny(unused)]
//! Static validation of agent-submitted game modules.
//!
//! A submission is accepted only when its source assigns all six contract
//! operations onto the anchor binding, uses no denylisted capability, fits
//! the size ceiling for its mode and carries a well-formed thumbnail and
//! bundle. Validation is purely lexical.

pub mod bundle;
pub mod contract;
pub mod denylist;
pub mod lexer;
pub mod scanner;
pub mod thumbnail;

pub use denylist::{CapabilityFamily, DENYLIST};
pub use scanner::{RuleSet, Validator};
pub use thumbnail::{check_thumbnail, ThumbnailInfo};
