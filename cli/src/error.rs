//! Centralized error types for groundwork
//!
//! Uses thiserror for typed errors that can be matched on,
//! while still being compatible with anyhow for propagation.

use thiserror::Error;

/// Top-level error type for groundwork operations
#[derive(Error, Debug)]
pub enum DeployError {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Graph error: {0}")]
    Graph(#[from] GraphError),

    #[error("gcloud error: {0}")]
    Gcloud(#[from] GcloudError),

    #[error("Template error: {0}")]
    Template(#[from] TemplateError),
}

/// Configuration errors
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Required configuration missing: {field}")]
    MissingField { field: String },

    #[error("Invalid configuration value for {field}: {value}")]
    InvalidValue { field: String, value: String },

    #[error("Config file not found: {path}")]
    FileNotFound { path: String },

    #[error("Failed to parse config: {message}")]
    ParseError { message: String },

    #[error("Required environment variable not set: {var}")]
    MissingEnv { var: String },
}

/// Resource dependency graph errors
#[derive(Error, Debug)]
pub enum GraphError {
    #[error("Duplicate resource role: {role}")]
    DuplicateRole { role: String },

    #[error("Resource {role} depends on unknown role: {dependency}")]
    UnknownDependency { role: String, dependency: String },

    #[error("Dependency cycle among resources: {remaining}")]
    Cycle { remaining: String },

    #[error("Output '{field}' of resource {role} is not available yet")]
    MissingOutput { role: String, field: String },
}

/// gcloud CLI errors
#[derive(Error, Debug)]
pub enum GcloudError {
    #[error("gcloud not found in PATH. Install the Google Cloud SDK and authenticate first")]
    NotInstalled,

    #[error("gcloud {command} failed: {stderr}")]
    CommandFailed { command: String, stderr: String },

    #[error("Failed to parse gcloud {command} output: {message}")]
    ParseFailed { command: String, message: String },
}

/// Bootstrap script template errors
#[derive(Error, Debug)]
pub enum TemplateError {
    #[error("Unresolved build-time placeholder: {{{{{placeholder}}}}}")]
    UnresolvedPlaceholder { placeholder: String },
}
