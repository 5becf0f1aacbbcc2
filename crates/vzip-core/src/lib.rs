pub mod config;
pub mod error;

pub use config::VzipConfig;
pub use error::{VzipError, VzipResult};
