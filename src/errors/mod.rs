pub mod types;

pub use types::{ApiError, ConfigError, JobError, MediaError};
