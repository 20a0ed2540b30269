//! Process entry point: load configuration, build the three branches and
//! the PII detector, start the `/analyze` + `/healthz` HTTP server, and
//! shut down gracefully on Ctrl-C.

use std::process::ExitCode;
use std::sync::Arc;

use clap::Parser;

use promptwarden::branch_a::catalogue::Catalogue;
use promptwarden::branch_a::{shared_catalogue, HeuristicsBranch};
use promptwarden::branch_b::embeddings::HttpEmbeddings;
use promptwarden::branch_b::vector_store::HttpVectorStore;
use promptwarden::branch_b::{shared_thresholds, SemanticBranch};
use promptwarden::branch_c::{HttpSafetyClassifier, SafetyBranch};
use promptwarden::config::{self, FirewallConfig};
use promptwarden::observability::{self, ObservabilityConfig};
use promptwarden::orchestrator::api::{self, ApiState};
use promptwarden::orchestrator::event_sink::{EventSink, HttpEventWriter};
use promptwarden::orchestrator::Orchestrator;
use promptwarden::pii::patterns::HttpNlpEntityProvider;
use promptwarden::pii::PiiDetector;

const DEFAULT_PORT: u16 = 8080;
const EVENT_SINK_CAPACITY: usize = 1024;

/// Process entrypoint flags. Every field doubles as an environment
/// variable so the same knob works under a supervisor (systemd
/// `Environment=`) or a plain shell invocation.
#[derive(Parser, Debug)]
#[command(name = "promptwarden", version, about = "Three-branch prompt injection / PII firewall")]
struct Cli {
    /// Port the `/analyze` + `/healthz` HTTP server binds to.
    #[arg(long, env = "INGRESS_PORT", default_value_t = DEFAULT_PORT)]
    port: u16,
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .json()
        .init();

    let firewall_config = match FirewallConfig::from_env() {
        Ok(c) => c,
        Err(e) => {
            tracing::error!(error = %e, "fatal: configuration load failed");
            return ExitCode::FAILURE;
        }
    };

    if let Err(e) = firewall_config.validate() {
        tracing::error!(error = %e, "fatal: configuration invalid");
        return ExitCode::FAILURE;
    }

    let observability_config = ObservabilityConfig::from_env().unwrap_or_default();
    let observer: Arc<dyn observability::Observer> = Arc::from(observability::create_observer(&observability_config));

    let catalogue = match Catalogue::load_default() {
        Ok(c) => c,
        Err(e) => {
            tracing::error!(error = %e, "fatal: pattern catalogue failed to load");
            return ExitCode::FAILURE;
        }
    };

    let branch_a = HeuristicsBranch::new(shared_catalogue(catalogue));

    let embeddings = Arc::new(HttpEmbeddings::new(&firewall_config.embeddings));
    let vector_store = Arc::new(HttpVectorStore::new(firewall_config.vector_store.clone()));
    let branch_b = SemanticBranch::new(
        embeddings,
        vector_store,
        shared_thresholds(firewall_config.semantic_thresholds.clone()),
        firewall_config.vector_store.top_k,
        observer.clone(),
    );

    let safety_classifier = Arc::new(HttpSafetyClassifier::new(firewall_config.safety_nlp.clone()));
    let branch_c = SafetyBranch::new(safety_classifier);

    let nlp_provider = Arc::new(HttpNlpEntityProvider::new(firewall_config.pii.clone()));
    let pii_detector = PiiDetector::new(nlp_provider, firewall_config.pii.clone());

    let event_writer = Arc::new(HttpEventWriter::new(firewall_config.event_store.clone()));
    let (event_sink, _event_sink_task) = EventSink::spawn(EVENT_SINK_CAPACITY, event_writer, observer.clone());

    let shared_config = config::shared(firewall_config);

    let orchestrator = Arc::new(Orchestrator::new(
        branch_a,
        branch_b,
        branch_c,
        pii_detector,
        shared_config,
        event_sink,
        observer,
    ));

    let state = ApiState { orchestrator };
    if let Err(e) = api::serve(state, cli.port).await {
        tracing::error!(error = %e, "fatal: server error");
        return ExitCode::FAILURE;
    }

    ExitCode::SUCCESS
}
