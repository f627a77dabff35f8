//! # Error Handling
//!
//! This module defines the centralized error type for `chartsmith`. Every
//! component (workspace cache, renderer, tree/commit builder, pull request
//! publisher) returns the first error it encounters as one of the variants
//! below; nothing retries automatically.
//!
//! ## Key Components
//!
//! - **`Error`**: The enum of all failure modes. Each variant carries enough
//!   context (identity, path, operation) to be logged and surfaced verbatim.
//! - **`Result<T>`**: Alias for `std::result::Result<T, Error>`.
//!
//! ## Classification
//!
//! The crate never writes HTTP responses itself. Callers that do can use
//! [`Error::is_client_error`] to separate validation failures (4xx) from
//! everything else (5xx), and [`Error::kind`] for a stable error code.
//!
//! Clone URLs embed the caller's credential. Variants that mention a URL
//! only ever receive the redacted form produced by
//! [`crate::git::redact_url`].

use thiserror::Error;

/// Main error type for chartsmith operations
#[derive(Error, Debug)]
pub enum Error {
    /// The version-control client failed to clone a branch.
    ///
    /// `url` is always redacted.
    #[error("Clone error for {url}@{branch}: {message}")]
    Clone {
        url: String,
        branch: String,
        message: String,
    },

    /// No workspace is registered for the requested identity.
    #[error("Workspace not found: {owner}/{repo}@{branch}")]
    WorkspaceNotFound {
        owner: String,
        repo: String,
        branch: String,
    },

    /// The templating tool failed or produced unusable output.
    #[error("Render error for {chart}: {stderr}")]
    Render { chart: String, stderr: String },

    /// A tree could not be staged, usually because a local file is unreadable.
    #[error("Tree error for {path}: {message}")]
    Tree { path: String, message: String },

    /// The branch reference could not be resolved or created.
    #[error("Reference error for {reference}: {message}")]
    Reference { reference: String, message: String },

    /// The hosting service refused to advance a branch reference.
    #[error("Update error for {reference}: {message}")]
    Update { reference: String, message: String },

    /// The caller supplied an invalid request.
    #[error("Invalid request: {message}")]
    InvalidRequest { message: String },

    /// Catch-all for any failed call to the hosting service.
    #[error("Hosting API error during {operation}: {message}")]
    HostingApi { operation: String, message: String },

    /// Configuration could not be loaded or failed validation.
    #[error("Configuration error: {message}{}", hint.as_ref().map(|h| format!("\n  hint: {}", h)).unwrap_or_default())]
    Config {
        message: String,
        /// Optional hint for how to fix the configuration
        hint: Option<String>,
    },

    /// An I/O error, wrapped from `std::io::Error`.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// A YAML parsing error, wrapped from `serde_yaml::Error`.
    #[error("YAML parsing error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    /// A JSON error, wrapped from `serde_json::Error`.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// A URL parsing error, wrapped from `url::ParseError`.
    #[error("URL parsing error: {0}")]
    UrlParse(#[from] url::ParseError),

    /// A base64 decoding error, wrapped from `base64::DecodeError`.
    #[error("Base64 decoding error: {0}")]
    Base64(#[from] base64::DecodeError),

    /// An invalid path pattern, wrapped from `regex::Error`.
    #[error("Regex error: {0}")]
    Regex(#[from] regex::Error),
}

impl Error {
    /// Shorthand for [`Error::InvalidRequest`].
    pub fn invalid(message: impl Into<String>) -> Self {
        Error::InvalidRequest {
            message: message.into(),
        }
    }

    /// Shorthand for [`Error::HostingApi`].
    pub fn hosting(operation: impl Into<String>, message: impl Into<String>) -> Self {
        Error::HostingApi {
            operation: operation.into(),
            message: message.into(),
        }
    }

    /// Returns true when the failure was caused by the caller's input.
    pub fn is_client_error(&self) -> bool {
        matches!(
            self,
            Error::InvalidRequest { .. } | Error::WorkspaceNotFound { .. }
        )
    }

    /// Stable snake_case name of the variant.
    pub fn kind(&self) -> &'static str {
        match self {
            Error::Clone { .. } => "clone_error",
            Error::WorkspaceNotFound { .. } => "workspace_not_found",
            Error::Render { .. } => "render_error",
            Error::Tree { .. } => "tree_error",
            Error::Reference { .. } => "reference_error",
            Error::Update { .. } => "update_error",
            Error::InvalidRequest { .. } => "invalid_request",
            Error::HostingApi { .. } => "hosting_api_error",
            Error::Config { .. } => "config_error",
            Error::Io(_) => "io_error",
            Error::Yaml(_) => "yaml_error",
            Error::Json(_) => "json_error",
            Error::UrlParse(_) => "url_error",
            Error::Base64(_) => "base64_error",
            Error::Regex(_) => "regex_error",
        }
    }
}

/// A convenient type alias for `Result<T, Error>`.
pub type Result<T> = std::result::Result<T, Error>;
