//! Fuser (spec.md §4.10).
//!
//! Combines multiple providers' responses to the same prompt into one
//! consensus `FusedResponse`. Each response's weight is driven purely by
//! `entropy::score` of its own text — `w_i = (q_i + epsilon) / sum(q_j +
//! epsilon)` — so a model's self-reported `quality_score` never factors into
//! which response wins fusion, only the text it actually produced. The
//! response with the largest weight wins the final text (winner-takes-all),
//! but every response's weight is preserved in `contributions` so callers can
//! see how close the contest was.

use std::collections::HashMap;

use crate::error::{CoreError, CoreResult};
use crate::model::{FusedResponse, Outcome, Response};

/// Smoothing term preventing a zero-quality response from collapsing its
/// weight to exactly zero.
const EPSILON: f64 = 1e-6;

/// Fuses `responses` into a single consensus answer. Only `Success`
/// responses participate; returns `FusionEmpty` if none are present.
pub fn fuse(responses: &[Response]) -> CoreResult<FusedResponse> {
    let successes: Vec<&Response> = responses
        .iter()
        .filter(|r| r.outcome == Outcome::Success)
        .collect();

    if successes.is_empty() {
        return Err(CoreError::FusionEmpty);
    }

    let quality: Vec<f64> = successes.iter().map(|r| crate::entropy::score(&r.text)).collect();
    let raw: Vec<f64> = quality.iter().map(|q| q + EPSILON).collect();
    let total: f64 = raw.iter().sum();

    let mut contributions = HashMap::new();
    let mut winner_idx = 0;
    let mut winner_weight = f64::MIN;
    let mut fused_confidence = 0.0;

    for (i, ((response, raw_weight), q)) in successes.iter().zip(raw.iter()).zip(quality.iter()).enumerate() {
        let weight = raw_weight / total;
        contributions.insert(response.provider_id.clone(), weight);
        fused_confidence += weight * q;
        if weight > winner_weight {
            winner_weight = weight;
            winner_idx = i;
        }
    }

    Ok(FusedResponse {
        text: successes[winner_idx].text.clone(),
        contributions,
        fused_confidence,
        constituents: successes.into_iter().cloned().collect(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn response(provider_id: &str, text: &str, quality: f64, outcome: Outcome) -> Response {
        Response {
            text: text.to_string(),
            provider_id: provider_id.to_string(),
            model_id: "m1".to_string(),
            token_count: 3,
            elapsed_ms: 5,
            outcome,
            quality_score: quality,
            cost: 0.0,
            error: None,
        }
    }

    #[test]
    fn no_responses_is_fusion_empty() {
        let err = fuse(&[]).unwrap_err();
        assert_eq!(err, CoreError::FusionEmpty);
    }

    #[test]
    fn only_failed_responses_is_fusion_empty() {
        let responses = vec![response("a", "oops", 0.0, Outcome::Error)];
        let err = fuse(&responses).unwrap_err();
        assert_eq!(err, CoreError::FusionEmpty);
    }

    #[test]
    fn higher_quality_response_wins() {
        let responses = vec![
            response("weak", "weak weak weak weak", 0.1, Outcome::Success),
            response("strong", "the quick brown fox jumps", 0.9, Outcome::Success),
        ];
        let fused = fuse(&responses).unwrap();
        assert_eq!(fused.text, "the quick brown fox jumps");
    }

    #[test]
    fn contributions_cover_every_successful_provider() {
        let responses = vec![
            response("a", "alpha beta gamma", 0.5, Outcome::Success),
            response("b", "delta epsilon zeta", 0.5, Outcome::Success),
        ];
        let fused = fuse(&responses).unwrap();
        assert_eq!(fused.contributions.len(), 2);
        assert!(fused.contributions.contains_key("a"));
        assert!(fused.contributions.contains_key("b"));
    }

    #[test]
    fn weights_sum_to_one() {
        let responses = vec![
            response("a", "alpha beta gamma", 0.5, Outcome::Success),
            response("b", "delta epsilon zeta", 0.3, Outcome::Success),
            response("c", "eta theta iota", 0.8, Outcome::Success),
        ];
        let fused = fuse(&responses).unwrap();
        let total: f64 = fused.contributions.values().sum();
        assert!((total - 1.0).abs() < 1e-9);
    }

    #[test]
    fn failed_responses_are_excluded_from_contributions() {
        let responses = vec![
            response("a", "alpha beta gamma", 0.5, Outcome::Success),
            response("b", "", 0.0, Outcome::Error),
        ];
        let fused = fuse(&responses).unwrap();
        assert_eq!(fused.contributions.len(), 1);
        assert!(!fused.contributions.contains_key("b"));
    }

    #[test]
    fn single_response_confidence_equals_its_entropy_score() {
        let text = "aaaa aaaa aaaa aaaa";
        let responses = vec![response("solo", text, 1.0, Outcome::Success)];
        let fused = fuse(&responses).unwrap();
        assert_eq!(fused.contributions["solo"], 1.0);
        let expected = crate::entropy::score(text);
        assert!((fused.fused_confidence - expected).abs() < 1e-9);
        assert!(expected < 0.05, "degenerate repeated text should score near zero entropy");
    }
}
