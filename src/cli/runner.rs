// Runner - Main node execution logic
// Principle: Orchestrate node startup, request intake, and graceful shutdown

use crate::cli::config::NodeConfig;
use crate::execution::{persisted_state, ManifestVerifier, NativeExecutor, StandardGasCostModel};
use crate::node::{Engine, Node, NodeError};
use crate::storage::{Database, StateBackend};
use crate::types::{StorageReference, TransactionReference, TransactionRequest, TransactionResponse};
use serde::Deserialize;
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing::{debug, error, info, warn};

/// One line of input
#[derive(Debug, Deserialize)]
struct Submission {
    request: TransactionRequest,
    /// Verdict of the signature checker in front of the node
    #[serde(default = "verified")]
    signature_verified: bool,
}

fn verified() -> bool {
    true
}

fn open_store(config: &NodeConfig) -> Result<StateBackend, RunnerError> {
    std::fs::create_dir_all(&config.base_path)
        .map_err(|e| RunnerError::Io(format!("Failed to create data dir: {}", e)))?;
    let db = Database::open(config.db_path())
        .map_err(|e| RunnerError::Storage(e.to_string()))?;
    Ok(StateBackend::new(db))
}

/// Run the node with the given configuration
pub async fn run_node(config: NodeConfig) -> Result<(), RunnerError> {
    info!("🚀 Starting Arbor node");
    info!("📁 Data path: {}", config.base_path.display());
    info!("⛓️  Chain: {}", config.chain.chain_name);

    let engine = Engine::new(
        config.chain.consensus.clone(),
        Box::new(StandardGasCostModel),
        Box::new(ManifestVerifier),
        Box::new(NativeExecutor::base_library()),
    );
    let node = Node::new(open_store(&config)?, engine);
    info!("🔗 Chain id: {}", node.consensus().chain_id);

    if let Some(plan) = node.genesis(config.chain.genesis.clone()).await? {
        info!("🌱 Gamete: {}", plan.gamete_reference());
        info!("📦 Base jar: {}", plan.base_jar_reference());
    }
    info!("✅ Node ready ({} transactions), reading requests from stdin", node.transaction_count().await?);

    let result = read_requests(&node).await;

    info!("🛑 Shutting down...");
    node.stop().await;
    info!("👋 Node stopped cleanly");
    result
}

/// Reads one JSON submission per line and prints one JSON result per line
async fn read_requests(node: &Node<StateBackend>) -> Result<(), RunnerError> {
    let mut lines = BufReader::new(tokio::io::stdin()).lines();

    while let Some(line) = lines
        .next_line()
        .await
        .map_err(|e| RunnerError::Io(e.to_string()))?
    {
        let line = line.trim();
        if line.is_empty() {
            continue;
        }

        let submission: Submission = match serde_json::from_str(line) {
            Ok(submission) => submission,
            Err(e) => {
                warn!("Unreadable request: {}", e);
                println!("{}", serde_json::json!({ "error": format!("unreadable request: {}", e) }));
                continue;
            }
        };

        let reference = submission.request.reference();
        debug!("Received {} {}", submission.request.kind_name(), reference);
        let outcome = node
            .submit(submission.request, submission.signature_verified)
            .await;
        println!("{}", render(&reference, outcome)?);
    }
    Ok(())
}

/// JSON form of the outcome of a submission. Faults end the run.
fn render(
    reference: &TransactionReference,
    outcome: Result<TransactionResponse, NodeError>,
) -> Result<serde_json::Value, RunnerError> {
    match outcome {
        Ok(response) => Ok(serde_json::json!({
            "reference": reference.to_string(),
            "response": response,
        })),
        Err(NodeError::Rejected(reason)) => Ok(serde_json::json!({
            "reference": reference.to_string(),
            "rejected": reason.to_string(),
        })),
        Err(e) => {
            error!("Node error on {}: {}", reference, e);
            Err(RunnerError::Node(e))
        }
    }
}

/// Prints the persisted state of an object
pub fn show_state(config: &NodeConfig, reference: &str) -> Result<(), RunnerError> {
    let reference: StorageReference = reference
        .parse()
        .map_err(|e| RunnerError::Config(format!("{}", e)))?;
    let store = open_store(config)?;

    let object = persisted_state(&store, &reference)
        .map_err(|e| RunnerError::Storage(e.to_string()))?;
    let fields: serde_json::Map<String, serde_json::Value> = object
        .fields
        .iter()
        .map(|(field, value)| {
            serde_json::to_value(value).map(|v| (field.to_string(), v))
        })
        .collect::<Result<_, _>>()
        .map_err(|e| RunnerError::Io(e.to_string()))?;

    let json = serde_json::json!({
        "reference": reference.to_string(),
        "class": object.class_name,
        "jar": object.jar.to_string(),
        "balance": object.balance.map(|b| b.to_string()),
        "fields": fields,
    });
    let output = serde_json::to_string_pretty(&json).map_err(|e| RunnerError::Io(e.to_string()))?;
    println!("{}", output);
    Ok(())
}

/// Runner errors
#[derive(Debug, thiserror::Error)]
pub enum RunnerError {
    #[error("IO error: {0}")]
    Io(String),

    #[error("Node error: {0}")]
    Node(#[from] NodeError),

    #[error("Storage error: {0}")]
    Storage(String),

    #[error("Configuration error: {0}")]
    Config(String),
}
