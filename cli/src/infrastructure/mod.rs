//! Infrastructure layer - external I/O adapters
//!
//! This module contains all code that interacts with external systems:
//! - Google Cloud (via the system gcloud command)
//! - The deployed application (HTTP health probe in `status`)

pub mod gcloud;

// Re-export commonly used types
pub use gcloud::GcloudClient;
