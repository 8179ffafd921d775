//! # WTMK Common Library
//!
//! Shared code for the WTMK watermarking services including:
//! - Batch and item lifecycle types
//! - Event types (WtmkEvent enum) and the EventBus
//! - Progress aggregation (BatchSummary)
//! - Common error types

pub mod error;
pub mod events;

pub use error::{Error, Result};
