//! Shared data model for the orchestration core.
//!
//! These types are intentionally plain data — no behavior lives here beyond
//! small constructors and `Display`/comparison impls. Components in sibling
//! modules (`catalog`, `ranker`, `dispatch`, ...) own the operations that act
//! on this data.

use std::collections::HashSet;
use std::time::Instant;

use serde::{Deserialize, Serialize};

/// Closed set of capability tags a provider or model can advertise.
///
/// Extensible only by revising this enum — callers must not invent new
/// variants at runtime.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Capability {
    Streaming,
    Vision,
    Audio,
    FunctionCalling,
    LongContext,
    Fast,
    Reasoning,
    CodeGeneration,
    Local,
    Cheap,
}

impl Capability {
    pub const ALL: [Capability; 10] = [
        Capability::Streaming,
        Capability::Vision,
        Capability::Audio,
        Capability::FunctionCalling,
        Capability::LongContext,
        Capability::Fast,
        Capability::Reasoning,
        Capability::CodeGeneration,
        Capability::Local,
        Capability::Cheap,
    ];
}

/// Closed set of intent labels the classifier can produce.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Intent {
    CodeGeneration,
    ReasoningLogic,
    CreativeTasks,
    SecurityAnalysis,
    MathematicalProofs,
    MultiModal,
    General,
}

impl Intent {
    /// Declared order from spec.md §3, used to break confidence ties.
    pub const DECLARED_ORDER: [Intent; 7] = [
        Intent::CodeGeneration,
        Intent::ReasoningLogic,
        Intent::CreativeTasks,
        Intent::SecurityAnalysis,
        Intent::MathematicalProofs,
        Intent::MultiModal,
        Intent::General,
    ];
}

impl std::fmt::Display for Intent {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Intent::CodeGeneration => "code_generation",
            Intent::ReasoningLogic => "reasoning_logic",
            Intent::CreativeTasks => "creative_tasks",
            Intent::SecurityAnalysis => "security_analysis",
            Intent::MathematicalProofs => "mathematical_proofs",
            Intent::MultiModal => "multi_modal",
            Intent::General => "general",
        };
        write!(f, "{}", s)
    }
}

/// A concrete addressable target within a provider.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Endpoint {
    pub id: String,
    pub url_tag: String,
    pub weight: f64,
}

impl Endpoint {
    pub fn new(id: impl Into<String>, url_tag: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            url_tag: url_tag.into(),
            weight: 1.0,
        }
    }

    pub fn with_weight(mut self, weight: f64) -> Self {
        self.weight = weight;
        self
    }
}

/// A model hosted by a provider.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Model {
    pub id: String,
    pub provider_id: String,
    pub context_window: u32,
    pub capabilities: HashSet<Capability>,
    pub cost_per_1k: f64,
    pub p50_latency_ms: u64,
    pub p95_latency_ms: u64,
    /// Quality prior in [0, 1], used by the ranker's quality component.
    pub quality_prior: f64,
}

/// A provider entry in the catalog: identity, advertised capabilities, the
/// models it hosts, cost/latency priors, and its endpoints.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Provider {
    pub id: String,
    pub name: String,
    pub capabilities: HashSet<Capability>,
    pub models: Vec<Model>,
    pub cost_per_1k: f64,
    pub p50_latency_ms: u64,
    pub p95_latency_ms: u64,
    pub enabled: bool,
    pub endpoints: Vec<Endpoint>,
}

impl Provider {
    /// Union of provider-level and model-level capabilities.
    pub fn all_capabilities(&self) -> HashSet<Capability> {
        let mut caps = self.capabilities.clone();
        for model in &self.models {
            caps.extend(model.capabilities.iter().copied());
        }
        caps
    }
}

/// Caller preference flags biasing ranker weights.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
pub struct Preferences {
    pub prefer_speed: bool,
    pub prefer_cost: bool,
    pub prefer_quality: bool,
}

/// A single provider's entry in a ranking.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Ranking {
    pub provider_id: String,
    pub score: f64,
    pub capability_match: f64,
    pub cost_component: f64,
    pub latency_component: f64,
    pub health_component: f64,
    pub quality_component: f64,
    pub reason: String,
    pub fallback: Vec<String>,
}

/// Outcome of an upstream call or a fused/streamed response.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Outcome {
    Success,
    Timeout,
    Error,
    Cancelled,
    ShortCircuited,
}

impl Outcome {
    /// Whether this outcome counts as a circuit-breaker failure per spec.md §4.6.
    pub fn counts_as_failure(&self) -> bool {
        matches!(self, Outcome::Timeout | Outcome::Error)
    }
}

/// A single upstream call's record, consumed by HealthTracker/metrics.
#[derive(Debug, Clone)]
pub struct UpstreamCall {
    pub provider_id: String,
    pub model_id: String,
    pub endpoint_id: String,
    pub start: Instant,
    pub deadline: Instant,
    pub outcome: Outcome,
    pub total_tokens: u32,
    pub elapsed_ms: u64,
    /// Estimated cost in the same unit as `Model::cost_per_1k`, computed
    /// from `total_tokens`. Zero for calls that never reached an upstream
    /// (short-circuited, pre-dispatch errors).
    pub cost: f64,
}

/// A completed (or failed) response from a single provider.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Response {
    pub text: String,
    pub provider_id: String,
    pub model_id: String,
    pub token_count: u32,
    pub elapsed_ms: u64,
    pub outcome: Outcome,
    pub quality_score: f64,
    /// Estimated cost in the same unit as `Model::cost_per_1k`.
    pub cost: f64,
    pub error: Option<String>,
}

/// A consensus response fused from one or more provider `Response`s.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FusedResponse {
    pub text: String,
    pub contributions: std::collections::HashMap<String, f64>,
    pub fused_confidence: f64,
    pub constituents: Vec<Response>,
}

/// A single token (or terminal marker) emitted by a provider adapter.
#[derive(Debug, Clone)]
pub enum Token {
    Text(String),
    End {
        total_tokens: u32,
        finish_reason: Option<String>,
    },
    /// Terminal: the call failed mid-stream. No further tokens follow.
    Error { kind: String, message: String },
}
