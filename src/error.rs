//! Crate-level error type.
//!
//! Every variant carries enough context to diagnose the failure without
//! inspecting the originating error.

use thiserror::Error;

/// Errors produced by the backend client, configuration layer and controller.
#[derive(Debug, Error)]
pub enum ClientError {
    /// A TCP-level connection could not be established or the request timed out.
    #[error("connection failed to {url}: {detail}")]
    Connect { url: String, detail: String },

    /// The backend replied with a non-2xx status code.
    #[error("HTTP {status} from {url}{}", detail_suffix(.detail))]
    Http {
        status: u16,
        url: String,
        /// The `error` field of the response body, when the backend sent one.
        detail: Option<String>,
    },

    /// A response body could not be decoded into the expected shape.
    #[error("JSON parse error on field '{field}': {detail}")]
    Json { field: String, detail: String },

    /// The configuration file exists but could not be read or parsed.
    #[error("invalid config at {path}: {detail}")]
    Config { path: String, detail: String },

    /// The persisted client state could not be read or written.
    #[error("state file {path}: {detail}")]
    State { path: String, detail: String },

    /// A model name outside the supported list.
    #[error("unsupported model '{0}'")]
    InvalidModel(String),

    /// The push channel could not be opened.
    #[error("push channel {url} unavailable: {detail}")]
    Push { url: String, detail: String },
}

fn detail_suffix(detail: &Option<String>) -> String {
    match detail {
        Some(d) => format!(": {d}"),
        None => String::new(),
    }
}

pub type Result<T> = std::result::Result<T, ClientError>;
