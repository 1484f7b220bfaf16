//! Error taxonomy for the orchestration core (spec.md §7).
//!
//! Every public-API operation returns `CoreResult<T>`. Internal helpers may
//! use whatever's convenient, but must map to one of these kinds at the
//! boundary — the core never swallows an error silently.

use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum CoreError {
    #[error("unknown provider: {0}")]
    UnknownProvider(String),

    #[error("no eligible provider for the given requirements")]
    NoEligibleProvider,

    #[error("circuit open for destination: {0}")]
    ShortCircuited(String),

    #[error("deadline exceeded: {0}")]
    Timeout(String),

    #[error("transport error: {0}")]
    TransportError(String),

    #[error("upstream returned a 5xx error: {0}")]
    Upstream5xx(String),

    #[error("upstream returned a 4xx error: {0}")]
    Upstream4xx(String),

    #[error("invalid request: {0}")]
    InvalidRequest(String),

    #[error("cancelled by caller")]
    Cancelled,

    #[error("no successful responses to fuse")]
    FusionEmpty,

    #[error("all endpoints unhealthy for provider: {0}")]
    AllEndpointsUnhealthy(String),

    #[error("configuration error: {0}")]
    Configuration(String),

    #[error("internal error: {0}")]
    Internal(String),
}

impl CoreError {
    /// Whether this error kind counts as a circuit-breaker failure,
    /// per spec.md §4.6 / §7 ("Timeout/TransportError/Upstream5xx ... same
    /// retry policy"; "Upstream4xx/InvalidRequest ... NOT counted").
    pub fn counts_as_circuit_failure(&self) -> bool {
        matches!(
            self,
            CoreError::Timeout(_) | CoreError::TransportError(_) | CoreError::Upstream5xx(_)
        )
    }

    /// Whether this error is eligible for Dispatcher-local retry (spec.md §4.7).
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            CoreError::Timeout(_) | CoreError::TransportError(_) | CoreError::Upstream5xx(_)
        )
    }

    /// Stable machine-readable kind string, used in wire error payloads.
    pub fn kind(&self) -> &'static str {
        match self {
            CoreError::UnknownProvider(_) => "unknown_provider",
            CoreError::NoEligibleProvider => "no_eligible_provider",
            CoreError::ShortCircuited(_) => "short_circuited",
            CoreError::Timeout(_) => "timeout",
            CoreError::TransportError(_) => "transport_error",
            CoreError::Upstream5xx(_) => "upstream_5xx",
            CoreError::Upstream4xx(_) => "upstream_4xx",
            CoreError::InvalidRequest(_) => "invalid_request",
            CoreError::Cancelled => "cancelled",
            CoreError::FusionEmpty => "fusion_empty",
            CoreError::AllEndpointsUnhealthy(_) => "all_endpoints_unhealthy",
            CoreError::Configuration(_) => "configuration_error",
            CoreError::Internal(_) => "internal",
        }
    }
}

impl From<serde_json::Error> for CoreError {
    fn from(err: serde_json::Error) -> Self {
        CoreError::Configuration(err.to_string())
    }
}

impl From<std::io::Error> for CoreError {
    fn from(err: std::io::Error) -> Self {
        CoreError::Configuration(err.to_string())
    }
}

impl From<config::ConfigError> for CoreError {
    fn from(err: config::ConfigError) -> Self {
        CoreError::Configuration(err.to_string())
    }
}

pub type CoreResult<T> = std::result::Result<T, CoreError>;

/// Process exit codes for the CLI harness (spec.md §6).
pub mod exit_code {
    pub const SUCCESS: i32 = 0;
    pub const CONFIGURATION_ERROR: i32 = 2;
    pub const ALL_SHORT_CIRCUITED: i32 = 3;
    pub const NO_ELIGIBLE_PROVIDER: i32 = 4;
}

impl CoreError {
    /// Maps this error to the exit code table in spec.md §6, for the CLI harness.
    pub fn exit_code(&self) -> i32 {
        match self {
            CoreError::Configuration(_) => exit_code::CONFIGURATION_ERROR,
            CoreError::ShortCircuited(_) => exit_code::ALL_SHORT_CIRCUITED,
            CoreError::NoEligibleProvider => exit_code::NO_ELIGIBLE_PROVIDER,
            _ => 1,
        }
    }
}
