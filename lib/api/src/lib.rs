//! The Submission API (C6): idempotent run creation, queue publication, and
//! metering, over HTTP.

pub mod error;
pub mod router;
pub mod state;
pub mod submit;

pub use error::ApiError;
pub use router::router;
pub use state::{ApiConfig, AppState};
pub use submit::{RunStatusView, SubmitRequest};
