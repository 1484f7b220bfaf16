//! Dispatcher (spec.md §4.7).
//!
//! Orchestrates one upstream call through the mesh: circuit check, endpoint
//! selection, health bookkeeping, a per-call deadline, and bounded retry
//! across sibling endpoints of the same provider. This is the generalized,
//! trait-object-adapter descendant of the teacher's `chat_completion` retry
//! loop in `llm/router.rs` (`for retry_count in 0..=max_retries { ... sleep
//! ... }`), reshaped around `ProviderAdapter` instead of concrete vendor
//! clients and around the explicit `CircuitBreaker`/`HealthTracker` here
//! instead of the teacher's inline health map.

use std::sync::Arc;
use std::time::Instant;

use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use crate::adapter::{CallParams, ProviderAdapter};
use crate::balancer::{LoadBalancer, Strategy};
use crate::circuit::CircuitBreaker;
use crate::error::{CoreError, CoreResult};
use crate::health::HealthTracker;
use crate::metrics::CoreMetrics;
use crate::model::{Model, Outcome, Provider, Response, Token};

pub struct Dispatcher {
    balancer: Arc<LoadBalancer>,
    health: Arc<HealthTracker>,
    circuit: Arc<CircuitBreaker>,
    metrics: Arc<CoreMetrics>,
    max_retries: u32,
    default_call_timeout_ms: u64,
}

impl Dispatcher {
    pub fn new(
        balancer: Arc<LoadBalancer>,
        health: Arc<HealthTracker>,
        circuit: Arc<CircuitBreaker>,
        metrics: Arc<CoreMetrics>,
        max_retries: u32,
        default_call_timeout_ms: u64,
    ) -> Self {
        Self {
            balancer,
            health,
            circuit,
            metrics,
            max_retries,
            default_call_timeout_ms,
        }
    }

    fn note_circuit_failure(&self, key: &(String, String)) {
        if self.circuit.on_failure(key) {
            self.metrics.record_circuit_open();
        }
    }

    /// Dispatches a single logical call to `provider`, retrying on a
    /// different endpoint up to `max_retries` times when the failure is
    /// retryable (spec.md §7). `group_deadline` is the caller's own deadline
    /// (already composed with any fan-out group deadline upstream); the
    /// effective per-call timeout is `min(group_deadline - now,
    /// default_call_timeout_ms)`. Returns the last error once retries are
    /// exhausted.
    pub async fn dispatch(
        &self,
        provider: &Provider,
        model: &Model,
        params: CallParams,
        strategy: Strategy,
        adapter: &dyn ProviderAdapter,
        cancel: CancellationToken,
        group_deadline: Instant,
    ) -> Response {
        let mut last_err: Option<CoreError> = None;

        if Instant::now() >= group_deadline {
            return error_response(provider, model, CoreError::Timeout(provider.id.clone()));
        }

        for attempt in 0..=self.max_retries {
            if cancel.is_cancelled() {
                return cancelled_response(provider, model);
            }
            if Instant::now() >= group_deadline {
                last_err = Some(CoreError::Timeout(provider.id.clone()));
                break;
            }

            let endpoint = match self.balancer.choose(provider, strategy, &self.health) {
                Ok(e) => e,
                Err(err) => {
                    last_err = Some(err);
                    continue;
                }
            };
            let key = (provider.id.clone(), endpoint.id.clone());

            if !self.circuit.allow(&key) {
                last_err = Some(CoreError::ShortCircuited(provider.id.clone()));
                continue;
            }

            self.health.begin_call(&key);
            let start = Instant::now();
            let default_deadline = start + std::time::Duration::from_millis(self.default_call_timeout_ms);
            let deadline = default_deadline.min(group_deadline);

            let (tx, mut rx) = mpsc::channel(64);
            let invoke_fut = adapter.invoke(params.clone(), deadline, cancel.clone(), tx);
            let collect_fut = async {
                let mut tokens = Vec::new();
                while let Some(t) = rx.recv().await {
                    tokens.push(t);
                }
                tokens
            };

            let timeout_dur = deadline.saturating_duration_since(Instant::now());
            let outcome_result = tokio::time::timeout(timeout_dur, async {
                tokio::join!(invoke_fut, collect_fut)
            })
            .await;

            let elapsed_ms = start.elapsed().as_millis() as u64;

            let (outcome, response) = match outcome_result {
                Err(_) => {
                    self.health.end_call(&key, Outcome::Timeout, elapsed_ms);
                    self.note_circuit_failure(&key);
                    last_err = Some(CoreError::Timeout(format!(
                        "{} exceeded {}ms",
                        provider.id, self.default_call_timeout_ms
                    )));
                    continue;
                }
                Ok((Err(adapter_err), _tokens)) => {
                    let err: CoreError = adapter_err.into();
                    let outcome = if cancel.is_cancelled() {
                        Outcome::Cancelled
                    } else {
                        Outcome::Error
                    };
                    self.health.end_call(&key, outcome, elapsed_ms);
                    if err.counts_as_circuit_failure() {
                        self.note_circuit_failure(&key);
                    }
                    let retryable = err.is_retryable() && outcome != Outcome::Cancelled;
                    last_err = Some(err);
                    if retryable && attempt < self.max_retries {
                        continue;
                    }
                    (outcome, None)
                }
                Ok((Ok(()), tokens)) => {
                    self.health.end_call(&key, Outcome::Success, elapsed_ms);
                    self.circuit.on_success(&key);
                    (Outcome::Success, Some(assemble_response(provider, model, tokens, elapsed_ms)))
                }
            };

            if let Some(response) = response {
                return response;
            }
            // Reaching here (rather than the `continue` above) means the
            // failure was not retryable, or retries are exhausted: stop.
            let _ = outcome;
            break;
        }

        error_response(provider, model, last_err.unwrap_or(CoreError::Internal("dispatch exhausted with no recorded error".into())))
    }
}

fn assemble_response(provider: &Provider, model: &Model, tokens: Vec<Token>, elapsed_ms: u64) -> Response {
    let mut text = String::new();
    let mut token_count = 0u32;
    for token in tokens {
        match token {
            Token::Text(s) => text.push_str(&s),
            Token::End { total_tokens, .. } => token_count = total_tokens,
            Token::Error { .. } => {}
        }
    }
    let cost = model.cost_per_1k * (token_count as f64 / 1000.0);
    Response {
        text,
        provider_id: provider.id.clone(),
        model_id: model.id.clone(),
        token_count,
        elapsed_ms,
        outcome: Outcome::Success,
        quality_score: model.quality_prior,
        cost,
        error: None,
    }
}

fn error_response(provider: &Provider, model: &Model, err: CoreError) -> Response {
    let outcome = match &err {
        CoreError::Timeout(_) => Outcome::Timeout,
        CoreError::Cancelled => Outcome::Cancelled,
        CoreError::ShortCircuited(_) => Outcome::ShortCircuited,
        _ => Outcome::Error,
    };
    Response {
        text: String::new(),
        provider_id: provider.id.clone(),
        model_id: model.id.clone(),
        token_count: 0,
        elapsed_ms: 0,
        outcome,
        quality_score: 0.0,
        cost: 0.0,
        error: Some(err.to_string()),
    }
}

fn cancelled_response(provider: &Provider, model: &Model) -> Response {
    error_response(provider, model, CoreError::Cancelled)
}

pub fn as_core_result(response: &Response) -> CoreResult<()> {
    match response.outcome {
        Outcome::Success => Ok(()),
        Outcome::Timeout => Err(CoreError::Timeout(response.provider_id.clone())),
        Outcome::Cancelled => Err(CoreError::Cancelled),
        Outcome::ShortCircuited => Err(CoreError::ShortCircuited(response.provider_id.clone())),
        Outcome::Error => Err(CoreError::Internal(
            response.error.clone().unwrap_or_default(),
        )),
    }
}
