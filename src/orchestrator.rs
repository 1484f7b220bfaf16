//! OrchestratorCore — the public façade (spec.md §2, §6).
//!
//! Wires every component together: `ProviderCatalog` supplies candidates,
//! `IntentClassifier` derives required capabilities, `Ranker` orders
//! candidates, `Dispatcher`/`FanOut` perform the upstream call(s), and
//! `Fuser` combines multi-provider results. This is the crate's analogue of
//! the teacher's `CircuitBreakerApiServer`/`LLMRouter` pairing: one facade
//! type the binary and the HTTP layer both hold an `Arc` of.

use std::collections::HashMap;
use std::collections::HashSet;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::time::{Duration, Instant};

use dashmap::DashMap;
use tokio_stream::wrappers::ReceiverStream;
use tokio_util::sync::CancellationToken;

use crate::adapter::{CallParams, ProviderAdapter};
use crate::balancer::LoadBalancer;
use crate::catalog::ProviderCatalog;
use crate::circuit::{CircuitBreaker, CircuitState};
use crate::config::CoreConfig;
use crate::dispatch::Dispatcher;
use crate::error::{CoreError, CoreResult};
use crate::fanout::{self, FanOutMode};
use crate::fuser;
use crate::health::HealthTracker;
use crate::intent;
use crate::metrics::{CoreMetrics, MetricsSnapshot};
use crate::model::{Capability, FusedResponse, Model, Outcome, Preferences, Provider, Ranking, Response, Token};
use crate::ranker;

/// Per-call overrides threaded from the public API surface (spec.md §3's
/// `Request`, beyond prompt/preferences): an explicit provider allow-list,
/// a caller-supplied capability requirement that bypasses the classifier,
/// decoding parameters, and a deadline.
#[derive(Debug, Clone, Default)]
pub struct RequestOptions {
    /// When present, dispatch only to these provider ids instead of
    /// ranking the full catalog (spec.md §4.11).
    pub providers: Option<Vec<String>>,
    /// When present, overrides `IntentClassifier`'s derived capability set.
    pub required_capabilities: Option<HashSet<Capability>>,
    pub temperature: Option<f32>,
    pub max_tokens: Option<u32>,
    /// Milliseconds from now; falls back to `default_call_timeout_ms`.
    pub deadline_ms: Option<u64>,
}

/// Per-provider health snapshot for `GET /health` (spec.md §6.2). Endpoint
/// figures are averaged/summed across a provider's endpoints since the wire
/// contract reports per-provider, not per-endpoint.
#[derive(Debug, Clone, serde::Serialize)]
pub struct ProviderHealth {
    pub circuit_state: CircuitState,
    pub avg_latency_ms: f64,
    pub in_flight: i64,
    pub healthy: bool,
}

fn circuit_severity(state: CircuitState) -> u8 {
    match state {
        CircuitState::Closed => 0,
        CircuitState::HalfOpen => 1,
        CircuitState::Open => 2,
    }
}

/// Everything needed to run the mesh against a registered set of provider
/// adapters. Cheap to clone (every field is already an `Arc`), so handlers
/// hold a plain `OrchestratorCore` rather than wrapping it again.
#[derive(Clone)]
pub struct OrchestratorCore {
    config: Arc<CoreConfig>,
    catalog: Arc<ProviderCatalog>,
    balancer: Arc<LoadBalancer>,
    health: Arc<HealthTracker>,
    circuit: Arc<CircuitBreaker>,
    dispatcher: Arc<Dispatcher>,
    adapters: Arc<DashMap<String, Arc<dyn ProviderAdapter>>>,
    metrics: Arc<CoreMetrics>,
}

impl OrchestratorCore {
    pub fn new(config: CoreConfig, catalog: Arc<ProviderCatalog>) -> Self {
        let balancer = Arc::new(LoadBalancer::new());
        let health = Arc::new(HealthTracker::new(config.health));
        let circuit = Arc::new(CircuitBreaker::new(config.circuit));
        let metrics = Arc::new(CoreMetrics::new());
        let dispatcher = Arc::new(Dispatcher::new(
            balancer.clone(),
            health.clone(),
            circuit.clone(),
            metrics.clone(),
            config.max_retries,
            config.default_call_timeout_ms,
        ));
        Self {
            config: Arc::new(config),
            catalog,
            balancer,
            health,
            circuit,
            dispatcher,
            adapters: Arc::new(DashMap::new()),
            metrics,
        }
    }

    pub fn register_adapter(&self, provider_id: impl Into<String>, adapter: Arc<dyn ProviderAdapter>) {
        self.adapters.insert(provider_id.into(), adapter);
    }

    pub fn metrics(&self) -> MetricsSnapshot {
        self.metrics.snapshot()
    }

    pub fn catalog(&self) -> &Arc<ProviderCatalog> {
        &self.catalog
    }

    /// Per-provider circuit/health breakdown for `GET /health`.
    pub async fn health_report(&self) -> HashMap<String, ProviderHealth> {
        let providers = self.catalog.list().await;
        let mut out = HashMap::new();
        for (id, provider) in providers.iter() {
            if provider.endpoints.is_empty() {
                out.insert(
                    id.clone(),
                    ProviderHealth {
                        circuit_state: CircuitState::Closed,
                        avg_latency_ms: provider.p95_latency_ms as f64,
                        in_flight: 0,
                        healthy: true,
                    },
                );
                continue;
            }
            let mut latency_sum = 0.0;
            let mut in_flight_sum = 0i64;
            let mut healthy = true;
            let mut worst_state = CircuitState::Closed;
            for endpoint in &provider.endpoints {
                let key = (provider.id.clone(), endpoint.id.clone());
                latency_sum += self.health.avg_latency(&key, provider.p95_latency_ms as f64);
                in_flight_sum += self.health.in_flight(&key);
                healthy = healthy && self.health.is_healthy(&key);
                let state = self.circuit.state(&key);
                if circuit_severity(state) > circuit_severity(worst_state) {
                    worst_state = state;
                }
            }
            out.insert(
                id.clone(),
                ProviderHealth {
                    circuit_state: worst_state,
                    avg_latency_ms: latency_sum / provider.endpoints.len() as f64,
                    in_flight: in_flight_sum,
                    healthy,
                },
            );
        }
        out
    }

    async fn candidates(&self) -> Vec<Provider> {
        self.catalog.list().await.values().cloned().collect()
    }

    fn adapter_for(&self, provider_id: &str) -> CoreResult<Arc<dyn ProviderAdapter>> {
        self.adapters
            .get(provider_id)
            .map(|a| a.clone())
            .ok_or_else(|| CoreError::UnknownProvider(provider_id.to_string()))
    }

    fn pick_model<'a>(&self, provider: &'a Provider, required: &HashSet<Capability>) -> Option<&'a Model> {
        provider
            .models
            .iter()
            .find(|m| required.iter().all(|c| m.capabilities.contains(c)))
            .or_else(|| provider.models.first())
    }

    fn required_capabilities(&self, prompt: &str, options: &RequestOptions) -> HashSet<Capability> {
        options
            .required_capabilities
            .clone()
            .unwrap_or_else(|| intent::classify(prompt).required_capabilities)
    }

    fn deadline(&self, options: &RequestOptions) -> Instant {
        Instant::now() + Duration::from_millis(options.deadline_ms.unwrap_or(self.config.default_call_timeout_ms))
    }

    /// Resolves a single `(Provider, Model)` pair: the explicit provider
    /// when `options.providers` names exactly one, otherwise the top-ranked
    /// eligible candidate.
    async fn resolve_single(
        &self,
        preferences: Preferences,
        required: &HashSet<Capability>,
        options: &RequestOptions,
    ) -> CoreResult<(Provider, Model)> {
        let provider = match &options.providers {
            Some(ids) if ids.len() == 1 => self.catalog.get(&ids[0]).await?,
            Some(ids) if ids.len() > 1 => {
                return Err(CoreError::InvalidRequest(
                    "multiple explicit providers requires fan-out".into(),
                ))
            }
            _ => {
                let candidates = self.candidates().await;
                let rankings = ranker::rank(
                    required,
                    preferences,
                    self.config.ranker_weights,
                    &candidates,
                    &self.health,
                    &self.circuit,
                )?;
                self.catalog.get(&rankings[0].provider_id).await?
            }
        };
        let model = self
            .pick_model(&provider, required)
            .ok_or(CoreError::NoEligibleProvider)?
            .clone();
        Ok((provider, model))
    }

    /// Classifies `prompt`, ranks candidates, and returns the ordered
    /// `Ranking` list without dispatching a call (spec.md §4.11's
    /// `auto-select` operation). `options.providers`, when present,
    /// restricts ranking to that subset of the catalog.
    pub async fn auto_select(
        &self,
        prompt: &str,
        preferences: Preferences,
        options: RequestOptions,
    ) -> CoreResult<Vec<Ranking>> {
        let required = self.required_capabilities(prompt, &options);
        let mut candidates = self.candidates().await;
        if let Some(ids) = &options.providers {
            candidates.retain(|p| ids.contains(&p.id));
        }
        ranker::rank(
            &required,
            preferences,
            self.config.ranker_weights,
            &candidates,
            &self.health,
            &self.circuit,
        )
    }

    /// Classifies, selects, and dispatches to a single candidate: the
    /// explicit provider if `options.providers` names exactly one,
    /// otherwise the top-ranked eligible candidate. Callers that pass more
    /// than one explicit provider must use `complete_fanout` instead
    /// (spec.md §4.11).
    pub async fn complete(&self, prompt: &str, preferences: Preferences, options: RequestOptions) -> CoreResult<Response> {
        self.metrics.record_request();
        let required = self.required_capabilities(prompt, &options);
        let (provider, model) = self.resolve_single(preferences, &required, &options).await?;
        let adapter = self.adapter_for(&provider.id)?;

        let params = CallParams {
            model_id: model.id.clone(),
            prompt: prompt.to_string(),
            max_tokens: options.max_tokens,
            temperature: options.temperature,
        };
        let deadline = self.deadline(&options);

        let response = self
            .dispatcher
            .dispatch(
                &provider,
                &model,
                params,
                self.config.load_balancer.default_strategy,
                adapter.as_ref(),
                CancellationToken::new(),
                deadline,
            )
            .await;

        if response.outcome == Outcome::Success {
            self.metrics.record_success(response.elapsed_ms);
            self.metrics.record_cost(response.cost);
        } else {
            self.metrics.record_failure(response.elapsed_ms);
        }

        Ok(response)
    }

    /// Fans a request out across providers and fuses their responses
    /// (spec.md §4.8, §4.10). When `options.providers` is present, dispatches
    /// to exactly those provider ids (in the given order) regardless of
    /// ranking; otherwise dispatches to the `n` top-ranked candidates.
    pub async fn complete_fanout(
        &self,
        prompt: &str,
        preferences: Preferences,
        mode: FanOutMode,
        n: usize,
        options: RequestOptions,
    ) -> CoreResult<FusedResponse> {
        self.metrics.record_request();
        let required = self.required_capabilities(prompt, &options);

        let selected: Vec<Provider> = match &options.providers {
            Some(ids) => {
                let mut out = Vec::with_capacity(ids.len());
                for id in ids {
                    out.push(self.catalog.get(id).await?);
                }
                out
            }
            None => {
                let candidates = self.candidates().await;
                let rankings = ranker::rank(
                    &required,
                    preferences,
                    self.config.ranker_weights,
                    &candidates,
                    &self.health,
                    &self.circuit,
                )?;
                let mut out = Vec::new();
                for ranking in rankings.iter().take(n.max(1)) {
                    out.push(self.catalog.get(&ranking.provider_id).await?);
                }
                out
            }
        };

        let deadline = self.deadline(&options);
        let mut calls = Vec::new();
        for provider in selected {
            let model = match self.pick_model(&provider, &required) {
                Some(m) => m.clone(),
                None => continue,
            };
            let adapter = match self.adapter_for(&provider.id) {
                Ok(a) => a,
                Err(_) => continue,
            };
            let dispatcher = self.dispatcher.clone();
            let strategy = self.config.load_balancer.default_strategy;
            let prompt = prompt.to_string();
            let max_tokens = options.max_tokens;
            let temperature = options.temperature;

            calls.push(Box::pin(async move {
                let params = CallParams {
                    model_id: model.id.clone(),
                    prompt,
                    max_tokens,
                    temperature,
                };
                dispatcher
                    .dispatch(&provider, &model, params, strategy, adapter.as_ref(), CancellationToken::new(), deadline)
                    .await
            }) as Pin<Box<dyn Future<Output = Response> + Send>>);
        }

        if calls.is_empty() {
            return Err(CoreError::NoEligibleProvider);
        }

        let responses = fanout::run(mode, calls).await;
        for response in &responses {
            self.metrics.record_cost(response.cost);
        }
        let fused = fuser::fuse(&responses)?;
        self.metrics.record_fusion();
        Ok(fused)
    }

    /// Streams tokens from a single candidate: the explicit provider if
    /// `options.providers` names exactly one, otherwise the top-ranked
    /// eligible candidate. Fan-out streaming is not supported (spec.md
    /// §4.11 — per-token merge across heterogeneous vocabularies is
    /// ill-defined), so more than one explicit provider is rejected. No
    /// retry is attempted once streaming has begun, since partial text may
    /// already have reached the caller (the same one-shot behavior as the
    /// teacher's `handle_streaming_completion`).
    pub async fn stream(
        &self,
        prompt: &str,
        preferences: Preferences,
        cancel: CancellationToken,
        options: RequestOptions,
    ) -> CoreResult<ReceiverStream<Token>> {
        self.metrics.record_request();
        if matches!(&options.providers, Some(ids) if ids.len() > 1) {
            return Err(CoreError::InvalidRequest(
                "stream does not support fan-out across multiple providers".into(),
            ));
        }

        let required = self.required_capabilities(prompt, &options);
        let (provider, model) = self.resolve_single(preferences, &required, &options).await?;
        let adapter = self.adapter_for(&provider.id)?;

        let deadline = self.deadline(&options);
        if Instant::now() >= deadline {
            return Err(CoreError::Timeout(provider.id.clone()));
        }

        let endpoint = self
            .balancer
            .choose(&provider, self.config.load_balancer.default_strategy, &self.health)?
            .clone();
        let key = (provider.id.clone(), endpoint.id.clone());
        if !self.circuit.allow(&key) {
            return Err(CoreError::ShortCircuited(provider.id.clone()));
        }
        self.health.begin_call(&key);

        let (out_tx, out_rx) = tokio::sync::mpsc::channel(64);
        let params = CallParams {
            model_id: model.id.clone(),
            prompt: prompt.to_string(),
            max_tokens: options.max_tokens,
            temperature: options.temperature,
        };

        let health = self.health.clone();
        let circuit = self.circuit.clone();
        let metrics = self.metrics.clone();
        let start = Instant::now();
        let err_tx = out_tx.clone();

        tokio::spawn(async move {
            let result = adapter.invoke(params, deadline, cancel.clone(), out_tx).await;
            let elapsed_ms = start.elapsed().as_millis() as u64;
            let outcome = match (&result, cancel.is_cancelled()) {
                (_, true) => Outcome::Cancelled,
                (Ok(()), false) => Outcome::Success,
                (Err(_), false) => Outcome::Error,
            };
            health.end_call(&key, outcome, elapsed_ms);
            match outcome {
                Outcome::Success => {
                    circuit.on_success(&key);
                    metrics.record_success(elapsed_ms);
                }
                Outcome::Cancelled => metrics.record_cancelled(),
                _ => {
                    if circuit.on_failure(&key) {
                        metrics.record_circuit_open();
                    }
                    metrics.record_failure(elapsed_ms);
                }
            }
            if let Err(adapter_err) = result {
                if !cancel.is_cancelled() {
                    let err: CoreError = adapter_err.into();
                    let _ = err_tx
                        .send(Token::Error {
                            kind: err.kind().to_string(),
                            message: err.to_string(),
                        })
                        .await;
                }
            }
        });

        Ok(ReceiverStream::new(out_rx))
    }
}
