pub mod config;
pub mod error;
pub mod observability;
pub mod security;

pub use config::{GuardSettings, PipelineConfig};
pub use error::{GuardError, Result};
pub use security::{Rejection, SharedPipeline, ValidationPipeline, Verdict};
