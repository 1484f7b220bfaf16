//! End-to-end scenario tests exercising `OrchestratorCore` against scripted
//! adapters, one per seed scenario.

use std::collections::HashSet;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use llm_mesh::adapter::{AdapterError, CallParams, ProviderAdapter};
use llm_mesh::catalog::ProviderCatalog;
use llm_mesh::config::CoreConfig;
use llm_mesh::error::CoreError;
use llm_mesh::fanout::FanOutMode;
use llm_mesh::model::{Capability, Endpoint, Model, Preferences, Provider, Token};
use llm_mesh::orchestrator::{OrchestratorCore, RequestOptions};

fn provider(id: &str, caps: &[Capability], cost: f64, p95: u64, quality: f64) -> Provider {
    let caps: HashSet<Capability> = caps.iter().copied().collect();
    Provider {
        id: id.to_string(),
        name: id.to_string(),
        capabilities: caps.clone(),
        models: vec![Model {
            id: format!("{id}-model"),
            provider_id: id.to_string(),
            context_window: 8_192,
            capabilities: caps,
            cost_per_1k: cost,
            p50_latency_ms: p95 / 2,
            p95_latency_ms: p95,
            quality_prior: quality,
        }],
        cost_per_1k: cost,
        p50_latency_ms: p95 / 2,
        p95_latency_ms: p95,
        enabled: true,
        endpoints: vec![Endpoint::new(format!("{id}-e1"), "test://endpoint")],
    }
}

/// Replies with a fixed token sequence, optionally failing the first `n`
/// calls, optionally pausing before emitting tokens so cancellation tests
/// can interrupt mid-stream.
struct ScriptedAdapter {
    tokens: Vec<String>,
    fail_first_n: AtomicU32,
    pause_before_first_token: Option<std::time::Duration>,
}

impl ScriptedAdapter {
    fn replying(tokens: &[&str]) -> Self {
        Self {
            tokens: tokens.iter().map(|s| s.to_string()).collect(),
            fail_first_n: AtomicU32::new(0),
            pause_before_first_token: None,
        }
    }

    fn failing(n: u32) -> Self {
        Self {
            tokens: vec![],
            fail_first_n: AtomicU32::new(n),
            pause_before_first_token: None,
        }
    }

    fn slow(tokens: &[&str], pause: std::time::Duration) -> Self {
        Self {
            tokens: tokens.iter().map(|s| s.to_string()).collect(),
            fail_first_n: AtomicU32::new(0),
            pause_before_first_token: Some(pause),
        }
    }
}

#[async_trait]
impl ProviderAdapter for ScriptedAdapter {
    async fn invoke(
        &self,
        _params: CallParams,
        _deadline: std::time::Instant,
        cancel: CancellationToken,
        tokens: mpsc::Sender<Token>,
    ) -> Result<(), AdapterError> {
        let remaining = self.fail_first_n.fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| {
            if n > 0 {
                Some(n - 1)
            } else {
                None
            }
        });
        if remaining.is_ok() {
            return Err(AdapterError::Upstream5xx("scripted failure".into()));
        }

        if let Some(pause) = self.pause_before_first_token {
            tokio::select! {
                _ = tokio::time::sleep(pause) => {}
                _ = cancel.cancelled() => return Err(AdapterError::Transport("cancelled".into())),
            }
        }

        for word in &self.tokens {
            if cancel.is_cancelled() {
                return Err(AdapterError::Transport("cancelled mid-stream".into()));
            }
            if tokens.send(Token::Text(word.clone())).await.is_err() {
                return Ok(());
            }
        }
        let _ = tokens
            .send(Token::End {
                total_tokens: self.tokens.len() as u32,
                finish_reason: Some("stop".into()),
            })
            .await;
        Ok(())
    }
}

fn core_with(providers: Vec<Provider>) -> OrchestratorCore {
    OrchestratorCore::new(CoreConfig::default(), Arc::new(ProviderCatalog::from_providers(providers)))
}

#[tokio::test]
async fn scenario_1_single_provider_happy_path() {
    let p_a = provider("pA", &[Capability::CodeGeneration], 1.0, 100, 0.9);
    let core = core_with(vec![p_a]);
    core.register_adapter("pA", Arc::new(ScriptedAdapter::replying(&["def", " foo", "()"])));

    let fused = core
        .complete_fanout(
            "write a Python function",
            Preferences::default(),
            FanOutMode::All,
            1,
            RequestOptions::default(),
        )
        .await
        .expect("single eligible provider should succeed");

    assert_eq!(fused.text, "def foo()");
    assert_eq!(fused.contributions.len(), 1);
    assert!((fused.contributions["pA"] - 1.0).abs() < 1e-9);
}

#[tokio::test]
async fn scenario_2_capability_filter_excludes_all() {
    let p_a = provider("pA", &[Capability::CodeGeneration], 1.0, 100, 0.9);
    let core = core_with(vec![p_a]);
    core.register_adapter("pA", Arc::new(ScriptedAdapter::replying(&["unused"])));

    let err = core
        .auto_select("describe this image", Preferences::default(), RequestOptions::default())
        .await
        .unwrap_err();

    assert_eq!(err, CoreError::NoEligibleProvider);
}

#[tokio::test]
async fn scenario_3_circuit_opens_under_repeated_failure() {
    let mut config = CoreConfig::default();
    config.circuit.failure_threshold = 3;
    config.max_retries = 0;

    let p_a = provider("pA", &[], 1.0, 100, 0.9);
    let catalog = Arc::new(ProviderCatalog::from_providers([p_a]));
    let core = OrchestratorCore::new(config, catalog);
    core.register_adapter("pA", Arc::new(ScriptedAdapter::failing(5)));

    let mut outcomes = Vec::new();
    for _ in 0..5 {
        let response = core
            .complete("anything", Preferences::default(), RequestOptions::default())
            .await
            .expect("pre-dispatch stages never fail in this fixture");
        outcomes.push(response.outcome);
    }

    // Calls 1-3 reach the upstream adapter and fail; the 3rd failure trips
    // the breaker, so calls 4-5 are short-circuited without upstream contact.
    use llm_mesh::model::Outcome;
    assert_eq!(outcomes[0], Outcome::Error);
    assert_eq!(outcomes[1], Outcome::Error);
    assert_eq!(outcomes[2], Outcome::Error);
    assert_eq!(outcomes[3], Outcome::ShortCircuited);
    assert_eq!(outcomes[4], Outcome::ShortCircuited);
}

#[tokio::test]
async fn scenario_4_fan_out_with_fusion() {
    let p_a = provider("pA", &[], 1.0, 100, 0.9);
    let p_b = provider("pB", &[], 1.0, 100, 0.1);
    let p_c = provider("pC", &[], 1.0, 100, 0.5);
    let core = core_with(vec![p_a, p_b, p_c]);
    core.register_adapter("pA", Arc::new(ScriptedAdapter::replying(&["the", " answer", " is", " 42"])));
    core.register_adapter("pB", Arc::new(ScriptedAdapter::replying(&["42", " 42", " 42", " 42"])));
    core.register_adapter("pC", Arc::new(ScriptedAdapter::failing(10)));

    let fused = core
        .complete_fanout(
            "what is the answer",
            Preferences::default(),
            FanOutMode::All,
            3,
            RequestOptions::default(),
        )
        .await
        .expect("two of three providers succeed");

    assert!(!fused.contributions.contains_key("pC"));
    assert_eq!(fused.contributions.len(), 2);
}

#[tokio::test]
async fn scenario_5_streaming_cancel_zeroes_in_flight() {
    let p_a = provider("pA", &[], 1.0, 100, 0.9);
    let catalog = Arc::new(ProviderCatalog::from_providers([p_a]));
    let core = OrchestratorCore::new(CoreConfig::default(), catalog);
    core.register_adapter(
        "pA",
        Arc::new(ScriptedAdapter::slow(&["tok1", "tok2", "tok3"], std::time::Duration::from_secs(5))),
    );

    let cancel = CancellationToken::new();
    let _stream = core
        .stream("anything", Preferences::default(), cancel.clone(), RequestOptions::default())
        .await
        .expect("stream should start");

    tokio::time::sleep(std::time::Duration::from_millis(10)).await;
    cancel.cancel();

    let deadline = tokio::time::Instant::now() + std::time::Duration::from_millis(200);
    loop {
        if core.metrics().cancelled_total >= 1 {
            break;
        }
        assert!(tokio::time::Instant::now() < deadline, "cancellation was not observed in time");
        tokio::time::sleep(std::time::Duration::from_millis(5)).await;
    }

    // A cancelled call must not be counted as a circuit-breaker failure.
    assert_eq!(core.metrics().failures_total, 0);
}

#[tokio::test]
async fn scenario_6_auto_select_without_dispatch() {
    let cheap = provider("cheap", &[], 0.5, 200, 0.7);
    let mid = provider("mid", &[], 2.0, 200, 0.7);
    let expensive = provider("expensive", &[], 5.0, 200, 0.7);
    let core = core_with(vec![mid, expensive, cheap]);

    let invoked = Arc::new(AtomicU32::new(0));
    struct CountingAdapter(Arc<AtomicU32>);
    #[async_trait]
    impl ProviderAdapter for CountingAdapter {
        async fn invoke(
            &self,
            _params: CallParams,
            _deadline: std::time::Instant,
            _cancel: CancellationToken,
            _tokens: mpsc::Sender<Token>,
        ) -> Result<(), AdapterError> {
            self.0.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }
    }
    for id in ["cheap", "mid", "expensive"] {
        core.register_adapter(id, Arc::new(CountingAdapter(invoked.clone())));
    }

    let prefs = Preferences {
        prefer_cost: true,
        ..Default::default()
    };
    let rankings = core
        .auto_select("anything", prefs, RequestOptions::default())
        .await
        .expect("three eligible providers");

    assert_eq!(rankings[0].provider_id, "cheap");
    assert_eq!(invoked.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn scenario_7_explicit_provider_override_bypasses_ranking() {
    let cheap = provider("cheap", &[], 0.5, 200, 0.9);
    let expensive = provider("expensive", &[], 5.0, 200, 0.1);
    let core = core_with(vec![cheap, expensive]);
    core.register_adapter("cheap", Arc::new(ScriptedAdapter::replying(&["cheap", " reply"])));
    core.register_adapter("expensive", Arc::new(ScriptedAdapter::replying(&["expensive", " reply"])));

    // Ranking alone would pick "cheap", but an explicit override must win.
    let response = core
        .complete(
            "anything",
            Preferences::default(),
            RequestOptions {
                providers: Some(vec!["expensive".to_string()]),
                ..Default::default()
            },
        )
        .await
        .expect("explicit provider should be used directly");

    assert_eq!(response.provider_id, "expensive");
    assert_eq!(response.text, "expensive reply");
}

#[tokio::test]
async fn scenario_8_explicit_multi_provider_fanout_ignores_width() {
    let p_a = provider("pA", &[], 1.0, 100, 0.9);
    let p_b = provider("pB", &[], 1.0, 100, 0.5);
    let p_c = provider("pC", &[], 1.0, 100, 0.5);
    let core = core_with(vec![p_a, p_b, p_c]);
    core.register_adapter("pA", Arc::new(ScriptedAdapter::replying(&["alpha"])));
    core.register_adapter("pB", Arc::new(ScriptedAdapter::replying(&["beta"])));
    core.register_adapter("pC", Arc::new(ScriptedAdapter::replying(&["gamma"])));

    let fused = core
        .complete_fanout(
            "anything",
            Preferences::default(),
            FanOutMode::All,
            1,
            RequestOptions {
                providers: Some(vec!["pA".to_string(), "pB".to_string()]),
                ..Default::default()
            },
        )
        .await
        .expect("fan-out should cover exactly the two explicit providers");

    assert_eq!(fused.contributions.len(), 2);
    assert!(!fused.contributions.contains_key("pC"), "pC was never named, so it must not be called");
}

#[tokio::test]
async fn scenario_9_deadline_already_past_times_out_without_upstream_contact() {
    let p_a = provider("pA", &[], 1.0, 100, 0.9);
    let core = core_with(vec![p_a]);
    core.register_adapter("pA", Arc::new(ScriptedAdapter::replying(&["unused"])));

    let response = core
        .complete(
            "anything",
            Preferences::default(),
            RequestOptions {
                deadline_ms: Some(0),
                ..Default::default()
            },
        )
        .await
        .expect("pre-dispatch stages never fail in this fixture");

    use llm_mesh::model::Outcome;
    assert_eq!(response.outcome, Outcome::Timeout);
}
