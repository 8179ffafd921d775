//! Domain models for wtmk-bo

mod batch;

pub use batch::{Batch, DecodeError, Item};
