//! Foundation types shared by every lab crate.
//!
//! This crate deliberately stays small: the error taxonomy and the common
//! `Result` alias. Everything else lives in the layer that owns it.

pub mod error;

pub use error::{LabError, Result};
