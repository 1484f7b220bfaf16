//! A scripted, in-memory `ProviderAdapter` for exercising the orchestration
//! core without a real vendor SDK. Each call replies with a canned response
//! after a configurable artificial delay, and can be told to fail a fixed
//! number of times before succeeding — useful for driving the circuit
//! breaker and retry paths from the CLI harness or from scenario tests.

use async_trait::async_trait;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use llm_mesh::adapter::{AdapterError, CallParams, ProviderAdapter};
use llm_mesh::model::Token;

pub struct InMemoryAdapter {
    reply_text: String,
    latency: std::time::Duration,
    fail_next: std::sync::atomic::AtomicU32,
}

impl InMemoryAdapter {
    pub fn new(reply_text: impl Into<String>) -> Self {
        Self {
            reply_text: reply_text.into(),
            latency: std::time::Duration::from_millis(20),
            fail_next: std::sync::atomic::AtomicU32::new(0),
        }
    }

    pub fn with_latency(mut self, latency: std::time::Duration) -> Self {
        self.latency = latency;
        self
    }

    /// Makes the next `n` calls fail with a transport error before
    /// succeeding again.
    pub fn fail_next_n_calls(self, n: u32) -> Self {
        self.fail_next.store(n, std::sync::atomic::Ordering::SeqCst);
        self
    }
}

#[async_trait]
impl ProviderAdapter for InMemoryAdapter {
    async fn invoke(
        &self,
        _params: CallParams,
        _deadline: std::time::Instant,
        cancel: CancellationToken,
        tokens: mpsc::Sender<Token>,
    ) -> Result<(), AdapterError> {
        tokio::select! {
            _ = tokio::time::sleep(self.latency) => {}
            _ = cancel.cancelled() => return Err(AdapterError::Transport("cancelled mid-flight".into())),
        }

        let remaining = self
            .fail_next
            .fetch_update(std::sync::atomic::Ordering::SeqCst, std::sync::atomic::Ordering::SeqCst, |n| {
                if n > 0 {
                    Some(n - 1)
                } else {
                    None
                }
            });
        if remaining.is_ok() {
            return Err(AdapterError::Transport("scripted failure".into()));
        }

        for word in self.reply_text.split_whitespace() {
            if tokens.send(Token::Text(format!("{word} "))).await.is_err() {
                return Ok(());
            }
        }
        let total_tokens = self.reply_text.split_whitespace().count() as u32;
        let _ = tokens
            .send(Token::End {
                total_tokens,
                finish_reason: Some("stop".to_string()),
            })
            .await;
        Ok(())
    }
}
