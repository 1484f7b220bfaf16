//! CLI harness for the orchestration core.
//!
//! Loads configuration, seeds a small in-memory provider catalog backed by
//! `InMemoryAdapter` demo adapters, and serves the HTTP surface. Exit codes
//! follow the table in `llm_mesh::error::exit_code`, the same shape as the
//! teacher's `main()` mapping startup failures to process exit status.

#[path = "../../demos/inmemory_adapter.rs"]
mod inmemory_adapter;

use std::sync::Arc;

use clap::Parser;
use tracing::{error, info};

use inmemory_adapter::InMemoryAdapter;
use llm_mesh::api::{ApiConfig, OrchestratorApiServer};
use llm_mesh::catalog::ProviderCatalog;
use llm_mesh::config::CoreConfig;
use llm_mesh::error::exit_code;
use llm_mesh::model::{Capability, Endpoint, Model, Provider};
use llm_mesh::orchestrator::OrchestratorCore;

#[derive(Parser, Debug)]
#[command(name = "llm-mesh-server", about = "Multi-provider LLM orchestration core")]
struct Args {
    #[arg(long, env = "LLM_MESH_CONFIG_FILE")]
    config_file: Option<String>,

    #[arg(long, env = "LLM_MESH_PORT")]
    port: Option<u16>,
}

fn demo_catalog() -> (ProviderCatalog, Vec<(String, Arc<InMemoryAdapter>)>) {
    let fast_provider = Provider {
        id: "fast-cheap".to_string(),
        name: "Fast & Cheap".to_string(),
        capabilities: [Capability::Fast, Capability::Cheap].into_iter().collect(),
        models: vec![Model {
            id: "fast-cheap-v1".to_string(),
            provider_id: "fast-cheap".to_string(),
            context_window: 8_192,
            capabilities: [Capability::Fast, Capability::Cheap].into_iter().collect(),
            cost_per_1k: 0.2,
            p50_latency_ms: 120,
            p95_latency_ms: 250,
            quality_prior: 0.55,
        }],
        cost_per_1k: 0.2,
        p50_latency_ms: 120,
        p95_latency_ms: 250,
        enabled: true,
        endpoints: vec![Endpoint::new("fast-cheap-e1", "demo://fast-cheap")],
    };

    let reasoning_provider = Provider {
        id: "deep-reasoner".to_string(),
        name: "Deep Reasoner".to_string(),
        capabilities: [Capability::Reasoning, Capability::LongContext].into_iter().collect(),
        models: vec![Model {
            id: "deep-reasoner-v1".to_string(),
            provider_id: "deep-reasoner".to_string(),
            context_window: 128_000,
            capabilities: [Capability::Reasoning, Capability::LongContext].into_iter().collect(),
            cost_per_1k: 3.5,
            p50_latency_ms: 900,
            p95_latency_ms: 2_000,
            quality_prior: 0.9,
        }],
        cost_per_1k: 3.5,
        p50_latency_ms: 900,
        p95_latency_ms: 2_000,
        enabled: true,
        endpoints: vec![Endpoint::new("deep-reasoner-e1", "demo://deep-reasoner")],
    };

    let code_provider = Provider {
        id: "code-specialist".to_string(),
        name: "Code Specialist".to_string(),
        capabilities: [Capability::CodeGeneration, Capability::FunctionCalling].into_iter().collect(),
        models: vec![Model {
            id: "code-specialist-v1".to_string(),
            provider_id: "code-specialist".to_string(),
            context_window: 32_768,
            capabilities: [Capability::CodeGeneration, Capability::FunctionCalling].into_iter().collect(),
            cost_per_1k: 1.2,
            p50_latency_ms: 400,
            p95_latency_ms: 800,
            quality_prior: 0.8,
        }],
        cost_per_1k: 1.2,
        p50_latency_ms: 400,
        p95_latency_ms: 800,
        enabled: true,
        endpoints: vec![Endpoint::new("code-specialist-e1", "demo://code-specialist")],
    };

    let adapters: Vec<(String, Arc<InMemoryAdapter>)> = vec![
        (
            "fast-cheap".to_string(),
            Arc::new(InMemoryAdapter::new("the quick answer is forty two")),
        ),
        (
            "deep-reasoner".to_string(),
            Arc::new(InMemoryAdapter::new(
                "step by step the proof follows from the premises",
            )),
        ),
        (
            "code-specialist".to_string(),
            Arc::new(InMemoryAdapter::new("fn solve() -> Result<(), Error> { Ok(()) }")),
        ),
    ];

    let catalog = ProviderCatalog::from_providers([fast_provider, reasoning_provider, code_provider]);
    (catalog, adapters)
}

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt::init();
    let args = Args::parse();

    let core_config = match CoreConfig::load(args.config_file.as_deref()) {
        Ok(cfg) => cfg,
        Err(err) => {
            error!(error = %err, "failed to load configuration");
            std::process::exit(exit_code::CONFIGURATION_ERROR);
        }
    };

    let (catalog, adapters) = demo_catalog();
    let core = OrchestratorCore::new(core_config, Arc::new(catalog));
    for (provider_id, adapter) in adapters {
        core.register_adapter(provider_id, adapter);
    }

    let mut api_config = ApiConfig::default();
    if let Some(port) = args.port {
        api_config.port = port;
    }

    info!("starting orchestration core");
    let server = OrchestratorApiServer::new(api_config, core);
    if let Err(err) = server.run().await {
        error!(error = %err, "server terminated");
        std::process::exit(1);
    }
}
