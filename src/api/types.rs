//! Wire types for the HTTP surface (spec.md §6).
//!
//! Kept deliberately thin: request/response shapes that borrow directly
//! from `crate::model` wherever the internal type is already the right
//! public shape, and small wrapper types only where the wire contract needs
//! something the internal model doesn't (e.g. an optional fan-out mode).

use std::collections::HashMap;
use std::collections::HashSet;

use serde::{Deserialize, Serialize};

use crate::error::CoreError;
use crate::fanout::FanOutMode;
use crate::model::{Capability, FusedResponse, Preferences, Ranking, Response};
use crate::orchestrator::{ProviderHealth, RequestOptions};

/// A caller-supplied request, carrying every field spec.md §3/§6.2 define:
/// prompt, preference flags, an optional explicit provider allow-list and
/// capability override, decoding parameters, and a deadline.
#[derive(Debug, Clone, Deserialize)]
pub struct CompleteRequest {
    pub prompt: String,
    #[serde(default)]
    pub preferences: Preferences,
    /// Explicit provider ids to call. A single id bypasses ranking; more
    /// than one forces a fan-out over exactly that set (spec.md §4.11).
    #[serde(default)]
    pub providers: Option<Vec<String>>,
    /// Overrides the capability set `IntentClassifier` would otherwise derive.
    #[serde(default)]
    pub required_capabilities: Option<HashSet<Capability>>,
    #[serde(default)]
    pub temperature: Option<f32>,
    #[serde(default)]
    pub max_tokens: Option<u32>,
    /// Milliseconds from request receipt; falls back to the server's
    /// configured default call timeout.
    #[serde(default)]
    pub deadline_ms: Option<u64>,
    /// When present, dispatches to `fan_out.width` best-ranked candidates
    /// concurrently under `fan_out.mode` and fuses the results instead of
    /// calling only the top-ranked candidate. Ignored when `providers` names
    /// more than one id — that case always fans out across exactly those ids.
    #[serde(default)]
    pub fan_out: Option<FanOutRequest>,
}

impl CompleteRequest {
    pub fn options(&self) -> RequestOptions {
        RequestOptions {
            providers: self.providers.clone(),
            required_capabilities: self.required_capabilities.clone(),
            temperature: self.temperature,
            max_tokens: self.max_tokens,
            deadline_ms: self.deadline_ms,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct FanOutRequest {
    pub mode: FanOutMode,
    #[serde(default = "default_fanout_width")]
    pub width: usize,
}

fn default_fanout_width() -> usize {
    3
}

#[derive(Debug, Clone, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum CompleteResponse {
    Single(Response),
    Fused(FusedResponse),
}

#[derive(Debug, Clone, Deserialize)]
pub struct AutoSelectRequest {
    pub prompt: String,
    #[serde(default)]
    pub preferences: Preferences,
    #[serde(default)]
    pub providers: Option<Vec<String>>,
    #[serde(default)]
    pub required_capabilities: Option<HashSet<Capability>>,
}

impl AutoSelectRequest {
    pub fn options(&self) -> RequestOptions {
        RequestOptions {
            providers: self.providers.clone(),
            required_capabilities: self.required_capabilities.clone(),
            temperature: None,
            max_tokens: None,
            deadline_ms: None,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct AutoSelectResponse {
    pub rankings: Vec<Ranking>,
}

#[derive(Debug, Clone, Serialize)]
pub struct ErrorBody {
    pub kind: String,
    pub message: String,
}

impl From<&CoreError> for ErrorBody {
    fn from(err: &CoreError) -> Self {
        Self {
            kind: err.kind().to_string(),
            message: err.to_string(),
        }
    }
}

/// `GET /health` response (spec.md §6.2): an aggregate status plus a
/// per-provider breakdown of circuit state, latency, in-flight count, and
/// health.
#[derive(Debug, Clone, Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub metrics: crate::metrics::MetricsSnapshot,
    pub providers: HashMap<String, ProviderHealth>,
}
