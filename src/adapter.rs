//! ProviderAdapter (spec.md §4.7, §9).
//!
//! The single seam between this crate and the outside world: every concrete
//! upstream integration (a vendor SDK, a local model server, a test double)
//! implements this trait. Modeled on the teacher's
//! `#[async_trait] trait LLMProviderClient` in `llm/traits.rs`, narrowed to
//! the one operation the dispatcher needs — token streaming with a
//! deadline and a cancellation signal — instead of the teacher's wider
//! provider-management surface (model listing, cost calculators, registries),
//! which belongs to the catalog and cost-tracking layers here, not the adapter.

use async_trait::async_trait;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use crate::error::CoreError;
use crate::model::Token;

/// Parameters for a single upstream call, independent of any particular
/// vendor wire format.
#[derive(Debug, Clone)]
pub struct CallParams {
    pub model_id: String,
    pub prompt: String,
    pub max_tokens: Option<u32>,
    pub temperature: Option<f32>,
}

/// Classifies a failed upstream call into the taxonomy `Dispatcher` and
/// `CircuitBreaker` react to (spec.md §7). Adapters return this instead of
/// a raw `CoreError` so they never need to know about circuit-breaker or
/// retry policy.
#[derive(Debug, Clone, PartialEq)]
pub enum AdapterError {
    Timeout(String),
    Transport(String),
    Upstream4xx(String),
    Upstream5xx(String),
    InvalidRequest(String),
}

impl From<AdapterError> for CoreError {
    fn from(err: AdapterError) -> Self {
        match err {
            AdapterError::Timeout(m) => CoreError::Timeout(m),
            AdapterError::Transport(m) => CoreError::TransportError(m),
            AdapterError::Upstream4xx(m) => CoreError::Upstream4xx(m),
            AdapterError::Upstream5xx(m) => CoreError::Upstream5xx(m),
            AdapterError::InvalidRequest(m) => CoreError::InvalidRequest(m),
        }
    }
}

/// The pluggable boundary to a single upstream provider endpoint.
///
/// Implementations stream `Token`s over the returned channel and must send
/// exactly one `Token::End` (success) or drop the sender after reporting an
/// error through the return value (failure) — never both. `cancel` fires
/// when the caller abandons the call (spec.md §4.8 fan-out pruning, or an
/// explicit client disconnect); implementations should stop producing
/// tokens promptly once it is signalled, but are not required to guarantee
/// instantaneous cessation of in-flight vendor HTTP calls.
#[async_trait]
pub trait ProviderAdapter: Send + Sync {
    async fn invoke(
        &self,
        params: CallParams,
        deadline: std::time::Instant,
        cancel: CancellationToken,
        tokens: mpsc::Sender<Token>,
    ) -> Result<(), AdapterError>;
}
