//! FanOut (spec.md §4.8).
//!
//! Concurrent multi-provider dispatch. `All` waits for every call and
//! preserves candidate order; `FirstSuccess` and `Quorum` race the calls and
//! abort whatever's left once the target is met, the same
//! spawn-then-`JoinHandle::abort()` shape as the racing client in the
//! pack's `toad` example.

use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;

use crate::model::{Outcome, Response};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FanOutMode {
    All,
    FirstSuccess,
    Quorum(usize),
}

/// Runs `calls` (one future per candidate, in candidate order) according to
/// `mode`, returning the collected responses.
///
/// * `All` — every call runs to completion; results preserve the input
///   order regardless of completion order.
/// * `FirstSuccess` — returns as soon as one call succeeds, aborting the
///   rest; if every call fails, returns every failure.
/// * `Quorum(k)` — returns once `k` calls have succeeded (or every call has
///   finished, if fewer than `k` succeed), aborting the remainder.
pub async fn run<F>(mode: FanOutMode, calls: Vec<F>) -> Vec<Response>
where
    F: std::future::Future<Output = Response> + Send + 'static,
{
    match mode {
        FanOutMode::All => run_all(calls).await,
        FanOutMode::FirstSuccess => run_until(calls, 1).await,
        FanOutMode::Quorum(k) => run_until(calls, k.max(1)).await,
    }
}

async fn run_all<F>(calls: Vec<F>) -> Vec<Response>
where
    F: std::future::Future<Output = Response> + Send + 'static,
{
    let handles: Vec<_> = calls.into_iter().map(tokio::spawn).collect();
    let mut results = Vec::with_capacity(handles.len());
    for handle in handles {
        match handle.await {
            Ok(response) => results.push(response),
            Err(_) => results.push(cancelled_response()),
        }
    }
    results
}

async fn run_until<F>(calls: Vec<F>, target_successes: usize) -> Vec<Response>
where
    F: std::future::Future<Output = Response> + Send + 'static,
{
    let (tx, mut rx) = mpsc::channel(calls.len().max(1));
    let handles: Vec<_> = calls
        .into_iter()
        .map(|call| {
            let tx = tx.clone();
            tokio::spawn(async move {
                let response = call.await;
                let _ = tx.send(response).await;
            })
        })
        .collect();
    drop(tx);

    let mut collected = Vec::new();
    let mut successes = 0;
    let total = handles.len();

    while collected.len() < total {
        match rx.recv().await {
            Some(response) => {
                if response.outcome == Outcome::Success {
                    successes += 1;
                }
                collected.push(response);
                if successes >= target_successes {
                    break;
                }
            }
            None => break,
        }
    }

    for handle in handles {
        handle.abort();
    }

    collected
}

fn cancelled_response() -> Response {
    Response {
        text: String::new(),
        provider_id: String::new(),
        model_id: String::new(),
        token_count: 0,
        elapsed_ms: 0,
        outcome: Outcome::Cancelled,
        quality_score: 0.0,
        cost: 0.0,
        error: Some("task aborted before completion".to_string()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn response(provider_id: &str, outcome: Outcome) -> Response {
        Response {
            text: format!("{provider_id} says hi"),
            provider_id: provider_id.to_string(),
            model_id: "m1".to_string(),
            token_count: 3,
            elapsed_ms: 5,
            outcome,
            quality_score: 0.8,
            cost: 0.0,
            error: None,
        }
    }

    #[tokio::test]
    async fn all_mode_preserves_candidate_order() {
        let calls = vec![
            Box::pin(async { response("a", Outcome::Success) }) as std::pin::Pin<Box<dyn std::future::Future<Output = Response> + Send>>,
            Box::pin(async { response("b", Outcome::Success) }),
            Box::pin(async { response("c", Outcome::Success) }),
        ];
        let results = run(FanOutMode::All, calls).await;
        let ids: Vec<_> = results.iter().map(|r| r.provider_id.clone()).collect();
        assert_eq!(ids, vec!["a", "b", "c"]);
    }

    #[tokio::test]
    async fn first_success_stops_after_one_success() {
        let calls = vec![
            Box::pin(async {
                tokio::time::sleep(std::time::Duration::from_millis(50)).await;
                response("slow", Outcome::Success)
            }) as std::pin::Pin<Box<dyn std::future::Future<Output = Response> + Send>>,
            Box::pin(async { response("fast", Outcome::Success) }),
        ];
        let results = run(FanOutMode::FirstSuccess, calls).await;
        assert!(results.iter().any(|r| r.provider_id == "fast"));
    }

    #[tokio::test]
    async fn quorum_waits_for_k_successes() {
        let calls = vec![
            Box::pin(async { response("a", Outcome::Success) }) as std::pin::Pin<Box<dyn std::future::Future<Output = Response> + Send>>,
            Box::pin(async { response("b", Outcome::Success) }),
            Box::pin(async {
                tokio::time::sleep(std::time::Duration::from_millis(50)).await;
                response("c", Outcome::Success)
            }),
        ];
        let results = run(FanOutMode::Quorum(2), calls).await;
        let successes = results.iter().filter(|r| r.outcome == Outcome::Success).count();
        assert!(successes >= 2);
    }

    #[tokio::test]
    async fn all_mode_reports_each_outcome() {
        let calls = vec![
            Box::pin(async { response("a", Outcome::Success) }) as std::pin::Pin<Box<dyn std::future::Future<Output = Response> + Send>>,
            Box::pin(async { response("b", Outcome::Error) }),
        ];
        let results = run(FanOutMode::All, calls).await;
        assert_eq!(results.len(), 2);
        assert!(results.iter().any(|r| r.outcome == Outcome::Error));
    }
}
