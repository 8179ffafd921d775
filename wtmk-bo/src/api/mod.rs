//! HTTP API surface for wtmk-bo

mod batch;
mod health;
mod sse;

pub use batch::{batch_routes, BatchStatusResponse, CancelSessionResponse, StartSessionResponse};
pub use health::{health_routes, HealthResponse};
pub use sse::event_stream;
