use reqwest::StatusCode;
use sqlx::Error as SqlxError;
use std::io::ErrorKind;
use std::path::PathBuf;
use thiserror::Error as ThisError;

use crate::instance::ReadinessPhase;

#[derive(Debug, ThisError)]
pub enum SetupError {
    #[error("required files not found in {}: missing {}", dir.display(), missing.join(", "))]
    MissingBinaries { dir: PathBuf, missing: Vec<String> },

    #[error("data directory initialization failed: {reason}\n{output}")]
    DirectoryInitFailed { reason: String, output: String },

    #[error("pg_ctl start failed: {output}")]
    LaunchFailed { output: String, log: Option<String> },

    #[error("server started but not responding ({phase})")]
    StartupTimeout {
        phase: ReadinessPhase,
        log: Option<String>,
    },

    #[error("stop failed: {output}")]
    StopFailed { output: String },

    #[error("password authentication failed for user {user}")]
    AuthenticationFailed { user: String },

    #[error("transient connection error during {step}: {source}")]
    TransientConnection {
        step: String,
        #[source]
        source: SqlxError,
    },

    #[error("failed to {step}: {source}")]
    SchemaStepFailed {
        step: String,
        #[source]
        source: SqlxError,
    },

    #[error("no studies found for {key}")]
    EmptyResultSet { key: String },

    #[error("archive returned status: {0}")]
    UpstreamStatus(StatusCode),

    #[error("invalid SQL identifier: {0:?}")]
    InvalidIdentifier(String),

    #[error("invalid archive credentials: {0}")]
    InvalidCredentials(String),

    #[error("URL cannot be used as a base: {0}")]
    InvalidBaseUrl(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Database error: {0}")]
    Database(#[from] SqlxError),

    #[error("HTTP request error: {0}")]
    Reqwest(#[from] reqwest::Error),

    #[error("URL parse error: {0}")]
    UrlParse(#[from] url::ParseError),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("configuration error: {0}")]
    Config(#[from] Box<figment::Error>),

    #[error("zip error: {0}")]
    Zip(#[from] zip::result::ZipError),
}

impl From<figment::Error> for SetupError {
    fn from(e: figment::Error) -> Self {
        SetupError::Config(Box::new(e))
    }
}

/// How a driver error relates to reaching the server.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionFailure {
    Refused,
    Reset,
    Authentication,
    Other,
}

impl ConnectionFailure {
    pub fn is_transient(self) -> bool {
        matches!(self, ConnectionFailure::Refused | ConnectionFailure::Reset)
    }
}

/// SQLSTATE 28P01 is `invalid_password`, 28000 `invalid_authorization_specification`.
const AUTH_SQLSTATES: [&str; 2] = ["28P01", "28000"];

/// Classify a sqlx error by I/O kind or SQLSTATE rather than message text.
pub fn classify_sqlx(err: &SqlxError) -> ConnectionFailure {
    match err {
        SqlxError::Io(io) => match io.kind() {
            ErrorKind::ConnectionRefused => ConnectionFailure::Refused,
            ErrorKind::ConnectionReset | ErrorKind::ConnectionAborted => ConnectionFailure::Reset,
            _ => ConnectionFailure::Other,
        },
        SqlxError::Database(db) => match db.code() {
            Some(code) if AUTH_SQLSTATES.iter().any(|c| code == *c) => {
                ConnectionFailure::Authentication
            }
            _ => ConnectionFailure::Other,
        },
        _ => ConnectionFailure::Other,
    }
}

impl SetupError {
    /// Wrap a driver error raised while running `step`.
    pub fn at_step(step: impl Into<String>, source: SqlxError, user: &str) -> Self {
        let step = step.into();
        match classify_sqlx(&source) {
            ConnectionFailure::Authentication => SetupError::AuthenticationFailed {
                user: user.to_string(),
            },
            f if f.is_transient() => SetupError::TransientConnection { step, source },
            _ => SetupError::SchemaStepFailed { step, source },
        }
    }

    /// Server log captured alongside a startup failure, if any.
    pub fn server_log(&self) -> Option<&str> {
        match self {
            SetupError::LaunchFailed { log, .. } | SetupError::StartupTimeout { log, .. } => {
                log.as_deref()
            }
            _ => None,
        }
    }
}

pub trait IsRetryable {
    fn is_retryable(&self) -> bool;
}

impl IsRetryable for SetupError {
    fn is_retryable(&self) -> bool {
        match self {
            SetupError::TransientConnection { .. } => true,
            SetupError::Database(e) => classify_sqlx(e).is_transient(),
            _ => false,
        }
    }
}
