//! Ranker (spec.md §4.3).
//!
//! Scores and orders candidate providers by a weighted blend of capability
//! match, cost, latency, health, and quality. Pure with respect to its
//! inputs — it reads `HealthTracker`/`CircuitBreaker` snapshots but performs
//! no I/O and has no side effects of its own, the same shape as the
//! teacher's `resolve_virtual_model` strategy switch in `llm/router.rs`,
//! generalized here into a continuous weighted score instead of a strategy
//! enum.

use std::collections::HashSet;

use crate::circuit::CircuitBreaker;
use crate::config::RankerWeights;
use crate::error::{CoreError, CoreResult};
use crate::health::HealthTracker;
use crate::model::{Capability, Preferences, Provider, Ranking};

const DEFAULT_CAPABILITY_WEIGHT: f64 = 0.40;
const DEFAULT_COST_WEIGHT: f64 = 0.15;
const DEFAULT_LATENCY_WEIGHT: f64 = 0.15;
const DEFAULT_HEALTH_WEIGHT: f64 = 0.15;
const DEFAULT_QUALITY_WEIGHT: f64 = 0.15;

/// Preference bias multiplier applied to a single component before
/// renormalizing the full weight vector back to sum to 1.0.
const PREFERENCE_BOOST: f64 = 2.0;

struct Weights {
    capability: f64,
    cost: f64,
    latency: f64,
    health: f64,
    quality: f64,
}

fn effective_weights(overrides: RankerWeights, preferences: Preferences) -> Weights {
    let mut w = Weights {
        capability: overrides.capability.unwrap_or(DEFAULT_CAPABILITY_WEIGHT),
        cost: overrides.cost.unwrap_or(DEFAULT_COST_WEIGHT),
        latency: overrides.latency.unwrap_or(DEFAULT_LATENCY_WEIGHT),
        health: overrides.health.unwrap_or(DEFAULT_HEALTH_WEIGHT),
        quality: overrides.quality.unwrap_or(DEFAULT_QUALITY_WEIGHT),
    };

    if preferences.prefer_speed {
        w.latency *= PREFERENCE_BOOST;
    }
    if preferences.prefer_cost {
        w.cost *= PREFERENCE_BOOST;
    }
    if preferences.prefer_quality {
        w.quality *= PREFERENCE_BOOST;
    }

    let total = w.capability + w.cost + w.latency + w.health + w.quality;
    if total > 0.0 {
        w.capability /= total;
        w.cost /= total;
        w.latency /= total;
        w.health /= total;
        w.quality /= total;
    }
    w
}

fn capability_match(required: &HashSet<Capability>, provider: &Provider) -> f64 {
    if required.is_empty() {
        return 1.0;
    }
    let have = provider.all_capabilities();
    let matched = required.iter().filter(|c| have.contains(c)).count();
    matched as f64 / required.len() as f64
}

/// Min-max normalizes `value` against `(min, max)` into `[0, 1]`, where a
/// *lower* raw value scores higher (used for both cost and latency).
fn inverse_normalize(value: f64, min: f64, max: f64) -> f64 {
    if (max - min).abs() < f64::EPSILON {
        1.0
    } else {
        (max - value) / (max - min)
    }
}

fn average_quality(provider: &Provider) -> f64 {
    if provider.models.is_empty() {
        return 0.5;
    }
    let sum: f64 = provider.models.iter().map(|m| m.quality_prior).sum();
    sum / provider.models.len() as f64
}

fn average_health(provider: &Provider, health: &HealthTracker) -> f64 {
    if provider.endpoints.is_empty() {
        return 1.0;
    }
    let sum: f64 = provider
        .endpoints
        .iter()
        .map(|e| health.health_score(&(provider.id.clone(), e.id.clone())))
        .sum();
    sum / provider.endpoints.len() as f64
}

/// Ranks `candidates` for a request needing `required_capabilities`, biased
/// by `preferences` and optionally overridden `weights`. Excludes disabled
/// providers, zero-capability-match providers, and providers with no
/// endpoint whose circuit would currently accept a call.
///
/// Ties break by lower p95 latency, then lower cost, then provider id
/// (spec.md §3).
pub fn rank(
    required_capabilities: &HashSet<Capability>,
    preferences: Preferences,
    weights: RankerWeights,
    candidates: &[Provider],
    health: &HealthTracker,
    circuit: &CircuitBreaker,
) -> CoreResult<Vec<Ranking>> {
    let w = effective_weights(weights, preferences);

    let eligible: Vec<&Provider> = candidates
        .iter()
        .filter(|p| p.enabled)
        .filter(|p| capability_match(required_capabilities, p) > 0.0)
        .filter(|p| {
            let ids: Vec<String> = p.endpoints.iter().map(|e| e.id.clone()).collect();
            circuit.has_available_endpoint(&p.id, &ids)
        })
        .collect();

    if eligible.is_empty() {
        return Err(CoreError::NoEligibleProvider);
    }

    let (min_cost, max_cost) = eligible.iter().fold((f64::MAX, f64::MIN), |(lo, hi), p| {
        (lo.min(p.cost_per_1k), hi.max(p.cost_per_1k))
    });
    let (min_latency, max_latency) = eligible
        .iter()
        .fold((f64::MAX, f64::MIN), |(lo, hi), p| {
            let l = p.p95_latency_ms as f64;
            (lo.min(l), hi.max(l))
        });

    let mut rankings: Vec<Ranking> = eligible
        .iter()
        .map(|p| {
            let cap = capability_match(required_capabilities, p);
            let cost = inverse_normalize(p.cost_per_1k, min_cost, max_cost);
            let latency = inverse_normalize(p.p95_latency_ms as f64, min_latency, max_latency);
            let healthc = average_health(p, health);
            let quality = average_quality(p);

            let score = w.capability * cap
                + w.cost * cost
                + w.latency * latency
                + w.health * healthc
                + w.quality * quality;

            Ranking {
                provider_id: p.id.clone(),
                score,
                capability_match: cap,
                cost_component: cost,
                latency_component: latency,
                health_component: healthc,
                quality_component: quality,
                reason: format!(
                    "capability={:.2} cost={:.2} latency={:.2} health={:.2} quality={:.2}",
                    cap, cost, latency, healthc, quality
                ),
                fallback: vec![],
            }
        })
        .collect();

    rankings.sort_by(|a, b| {
        b.score
            .partial_cmp(&a.score)
            .unwrap_or(std::cmp::Ordering::Equal)
            .then_with(|| {
                let pa = eligible.iter().find(|p| p.id == a.provider_id).unwrap();
                let pb = eligible.iter().find(|p| p.id == b.provider_id).unwrap();
                pa.p95_latency_ms
                    .cmp(&pb.p95_latency_ms)
                    .then_with(|| pa.cost_per_1k.partial_cmp(&pb.cost_per_1k).unwrap_or(std::cmp::Ordering::Equal))
                    .then_with(|| pa.id.cmp(&pb.id))
            })
    });

    let ordered_ids: Vec<String> = rankings.iter().map(|r| r.provider_id.clone()).collect();
    for (i, ranking) in rankings.iter_mut().enumerate() {
        ranking.fallback = ordered_ids[i + 1..].to_vec();
    }

    Ok(rankings)
}
