// Service - Orchestrateur du nœud Arbor
// Principe: les transactions qui modifient l'état passent une à une par un
// worker unique; les vues s'exécutent en parallèle sous verrou de lecture

use crate::execution::{
    persisted_state, DeserializationError, Executor, GasCostModel, PersistedObject, Verifier,
};
use crate::genesis::{ConsensusParams, GenesisBuilder, GenesisPlan, GenesisSpec};
use crate::storage::{Store, StoreError, StoreView};
use crate::transactions::{self, EngineFault, ExecutionContext, RejectionReason, TransactionError};
use crate::types::{
    StorageReference, TransactionReference, TransactionRequest, TransactionResponse,
};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::sync::{mpsc, oneshot, RwLock};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

/// Pending submissions the worker accepts before callers wait
const COMMAND_QUEUE_SIZE: usize = 1024;

/// Rules and pluggable pieces shared by every execution of the node
#[derive(Debug)]
pub struct Engine {
    pub consensus: ConsensusParams,
    pub cost_model: Box<dyn GasCostModel>,
    pub verifier: Box<dyn Verifier>,
    pub executor: Box<dyn Executor>,
}

impl Engine {
    pub fn new(
        consensus: ConsensusParams,
        cost_model: Box<dyn GasCostModel>,
        verifier: Box<dyn Verifier>,
        executor: Box<dyn Executor>,
    ) -> Self {
        Self { consensus, cost_model, verifier, executor }
    }

    pub fn context<'a>(&'a self, store: &'a dyn StoreView) -> ExecutionContext<'a> {
        ExecutionContext::new(
            store,
            &self.consensus,
            self.cost_model.as_ref(),
            self.verifier.as_ref(),
            self.executor.as_ref(),
        )
    }
}

struct Submission {
    request: TransactionRequest,
    signature_verified: bool,
    reply: oneshot::Sender<Result<TransactionResponse, NodeError>>,
}

/// Arbor node state
pub struct Node<S: Store + 'static> {
    /// Committed transactions
    store: Arc<RwLock<S>>,

    engine: Arc<Engine>,

    /// Queue of the commit worker
    submissions: mpsc::Sender<Submission>,

    worker: JoinHandle<()>,

    /// Set once an engine fault was met; never cleared
    halted: Arc<AtomicBool>,
}

impl<S: Store + 'static> Node<S> {
    /// Starts the node over `store`. Must be called inside a tokio runtime.
    pub fn new(store: S, engine: Engine) -> Self {
        let store = Arc::new(RwLock::new(store));
        let engine = Arc::new(engine);
        let halted = Arc::new(AtomicBool::new(false));
        let (submissions, queue) = mpsc::channel(COMMAND_QUEUE_SIZE);

        let worker = tokio::spawn(commit_worker(
            store.clone(),
            engine.clone(),
            halted.clone(),
            queue,
        ));

        info!("Node started, chain {}", engine.consensus.chain_id);
        Self { store, engine, submissions, worker, halted }
    }

    /// Runs the initial transactions of `spec` if the store is empty.
    /// Returns the plan that was run, or `None` if the node was initialized
    /// already.
    pub async fn genesis(&self, spec: GenesisSpec) -> Result<Option<GenesisPlan>, NodeError> {
        if self.store.read().await.is_initialized()? {
            debug!("Store already initialized, skipping genesis");
            return Ok(None);
        }

        let plan = GenesisBuilder::new(spec)
            .build()
            .map_err(|e| NodeError::Genesis(e.to_string()))?;
        for request in plan.requests() {
            self.submit(request, true).await?;
        }

        info!("🌟 Genesis done, gamete {}", plan.gamete_reference());
        Ok(Some(plan))
    }

    /// Executes a request. Views run at once against the committed state and
    /// are never persisted; anything else goes through the commit worker.
    pub async fn submit(
        &self,
        request: TransactionRequest,
        signature_verified: bool,
    ) -> Result<TransactionResponse, NodeError> {
        if self.is_halted() {
            return Err(NodeError::Halted);
        }
        if request.is_view() {
            return self.run_view(&request, signature_verified).await;
        }

        let (reply, response) = oneshot::channel();
        self.submissions
            .send(Submission { request, signature_verified, reply })
            .await
            .map_err(|_| NodeError::Halted)?;
        response.await.map_err(|_| NodeError::Halted)?
    }

    async fn run_view(
        &self,
        request: &TransactionRequest,
        signature_verified: bool,
    ) -> Result<TransactionResponse, NodeError> {
        let store = self.store.read().await;
        let ctx = self.engine.context(&*store);
        let result = transactions::execute(&ctx, request, signature_verified);
        if let Err(TransactionError::Fatal(fault)) = &result {
            halt(&self.halted, fault);
        }
        Ok(result?)
    }

    /// Last persisted state of an object
    pub async fn object(&self, reference: &StorageReference) -> Result<PersistedObject, NodeError> {
        let store = self.store.read().await;
        persisted_state(&*store, reference).map_err(|e| match e {
            DeserializationError::Store(e) => NodeError::Storage(e.to_string()),
            other => NodeError::UnknownObject(other.to_string()),
        })
    }

    pub async fn response(&self, reference: &TransactionReference) -> Result<Option<TransactionResponse>, NodeError> {
        Ok(self.store.read().await.response(reference)?)
    }

    pub async fn manifest(&self) -> Result<Option<StorageReference>, NodeError> {
        Ok(self.store.read().await.manifest()?)
    }

    pub async fn transaction_count(&self) -> Result<usize, NodeError> {
        Ok(self.store.read().await.transactions()?.len())
    }

    pub fn is_halted(&self) -> bool {
        self.halted.load(Ordering::SeqCst)
    }

    pub fn consensus(&self) -> &ConsensusParams {
        &self.engine.consensus
    }

    /// Stops the worker once the submissions already queued are done
    pub async fn stop(self) {
        info!("Stopping node");
        drop(self.submissions);
        if let Err(e) = self.worker.await {
            warn!("Commit worker ended abnormally: {}", e);
        }
    }
}

fn halt(halted: &AtomicBool, fault: &EngineFault) {
    error!("💥 Engine fault, halting the node: {}", fault);
    halted.store(true, Ordering::SeqCst);
}

/// Executes and commits submissions one at a time, each under the write lock
async fn commit_worker<S: Store>(
    store: Arc<RwLock<S>>,
    engine: Arc<Engine>,
    halted: Arc<AtomicBool>,
    mut queue: mpsc::Receiver<Submission>,
) {
    while let Some(Submission { request, signature_verified, reply }) = queue.recv().await {
        let result = {
            let mut store = store.write().await;
            apply(&mut *store, &engine, &request, signature_verified)
        };

        let fault = match &result {
            Err(NodeError::Fault(fault)) => Some(fault.clone()),
            _ => None,
        };
        if reply.send(result).is_err() {
            debug!("Submitter of {} went away", request.reference());
        }
        if let Some(fault) = fault {
            halt(&halted, &fault);
            break;
        }
    }
    debug!("Commit worker stopped");
}

fn apply<S: Store>(
    store: &mut S,
    engine: &Engine,
    request: &TransactionRequest,
    signature_verified: bool,
) -> Result<TransactionResponse, NodeError> {
    let reference = request.reference();
    let response = transactions::execute(&engine.context(&*store), request, signature_verified)?;
    store
        .commit(reference, request, &response)
        .map_err(|e| NodeError::Fault(e.into()))?;
    debug!("Committed {} ({})", reference, response.kind_name());
    Ok(response)
}

/// Node errors
#[derive(Debug, thiserror::Error)]
pub enum NodeError {
    #[error("Rejected: {0}")]
    Rejected(#[from] RejectionReason),

    #[error("Engine fault: {0}")]
    Fault(EngineFault),

    #[error("Node halted after an engine fault")]
    Halted,

    #[error("Genesis error: {0}")]
    Genesis(String),

    #[error("Storage error: {0}")]
    Storage(String),

    #[error("Unknown object: {0}")]
    UnknownObject(String),
}

impl From<TransactionError> for NodeError {
    fn from(error: TransactionError) -> Self {
        match error {
            TransactionError::Rejected(reason) => NodeError::Rejected(reason),
            TransactionError::Fatal(fault) => NodeError::Fault(fault),
        }
    }
}

impl From<StoreError> for NodeError {
    fn from(error: StoreError) -> Self {
        NodeError::Storage(error.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::execution::{
        Classpath, ExecutionOutcome, Invocation, ManifestVerifier, NativeExecutor, Sandbox,
        SandboxError, StandardGasCostModel,
    };
    use crate::storage::{Database, MemoryStore, StateBackend};
    use crate::types::*;
    use num_bigint::BigInt;
    use tempfile::TempDir;

    const CHAIN: &str = "arbor-node-test";

    fn engine(executor: Box<dyn Executor>) -> Engine {
        Engine::new(
            ConsensusParams::development(CHAIN),
            Box::new(StandardGasCostModel),
            Box::new(ManifestVerifier),
            executor,
        )
    }

    fn header(plan: &GenesisPlan, nonce: Nonce) -> RequestHeader {
        RequestHeader {
            caller: plan.gamete_reference(),
            nonce,
            chain_id: CHAIN.to_string(),
            gas_limit: 200_000,
            gas_price: 1,
            classpath: plan.base_jar_reference(),
        }
    }

    fn new_account(plan: &GenesisPlan, nonce: Nonce, amount: u64) -> TransactionRequest {
        TransactionRequest::ConstructorCall(ConstructorCallRequest {
            header: header(plan, nonce),
            constructor: ConstructorSignature::new(
                ACCOUNT_CLASS,
                vec![StorageType::big_integer(), StorageType::string()],
            ),
            actuals: vec![
                StorageValue::BigInteger(BigInt::from(amount)),
                StorageValue::String("new-key".to_string()),
            ],
        })
    }

    /// Every invocation hits a broken disk
    #[derive(Debug)]
    struct BrokenExecutor;

    impl Executor for BrokenExecutor {
        fn execute(&self, _: &Classpath, _: &Invocation, _: &mut Sandbox<'_>) -> ExecutionOutcome {
            ExecutionOutcome::Failed(SandboxError::Store("disk gone".to_string()))
        }
    }

    #[tokio::test]
    async fn test_genesis_runs_once() {
        let node = Node::new(MemoryStore::new(), engine(Box::new(NativeExecutor::base_library())));
        let plan = node.genesis(GenesisSpec::development()).await.unwrap().unwrap();

        assert_eq!(node.manifest().await.unwrap(), Some(plan.gamete_reference()));
        assert_eq!(node.transaction_count().await.unwrap(), 3);
        assert!(node.genesis(GenesisSpec::development()).await.unwrap().is_none());

        let gamete = node.object(&plan.gamete_reference()).await.unwrap();
        assert_eq!(gamete.class_name, GAMETE_CLASS);
        assert_eq!(gamete.balance, Some(GenesisSpec::development().initial_amount));
        node.stop().await;
    }

    #[tokio::test]
    async fn test_commits_advance_nonce_and_views_do_not_persist() {
        let node = Node::new(MemoryStore::new(), engine(Box::new(NativeExecutor::base_library())));
        let plan = node.genesis(GenesisSpec::development()).await.unwrap().unwrap();
        let gamete = plan.gamete_reference();

        let response = node.submit(new_account(&plan, 0, 1_000), true).await.unwrap();
        assert!(matches!(response, TransactionResponse::Successful(_)));

        let replay = node.submit(new_account(&plan, 0, 1_000), true).await;
        assert!(matches!(replay, Err(NodeError::Rejected(RejectionReason::AlreadyCommitted(_)))));

        let view = TransactionRequest::InstanceView(InstanceMethodCallRequest {
            header: header(&plan, 1),
            method: MethodSignature::nonce(),
            receiver: gamete,
            actuals: vec![],
        });
        let count = node.transaction_count().await.unwrap();
        match node.submit(view, true).await.unwrap() {
            TransactionResponse::Successful(r) => {
                assert_eq!(r.outcome, SuccessOutcome::Returned(Some(StorageValue::Long(1))));
                assert!(r.updates.is_empty());
            }
            other => panic!("unexpected {:?}", other),
        }
        assert_eq!(node.transaction_count().await.unwrap(), count);
        node.stop().await;
    }

    #[tokio::test]
    async fn test_unverified_signature_rejected() {
        let node = Node::new(MemoryStore::new(), engine(Box::new(NativeExecutor::base_library())));
        let plan = node.genesis(GenesisSpec::development()).await.unwrap().unwrap();

        let result = node.submit(new_account(&plan, 0, 1), false).await;
        assert!(matches!(result, Err(NodeError::Rejected(RejectionReason::SignatureNotVerified))));
        assert!(!node.is_halted());
        node.stop().await;
    }

    #[tokio::test]
    async fn test_engine_fault_halts_the_node() {
        let node = Node::new(MemoryStore::new(), engine(Box::new(BrokenExecutor)));
        let plan = node.genesis(GenesisSpec::development()).await.unwrap().unwrap();
        let count = node.transaction_count().await.unwrap();

        let result = node.submit(new_account(&plan, 0, 1), true).await;
        assert!(matches!(result, Err(NodeError::Fault(EngineFault::Store(_)))));
        assert!(node.is_halted());
        assert_eq!(node.transaction_count().await.unwrap(), count);

        let again = node.submit(new_account(&plan, 0, 2), true).await;
        assert!(matches!(again, Err(NodeError::Halted)));
        node.stop().await;
    }

    #[tokio::test]
    async fn test_rocksdb_node_survives_restart() {
        let temp_dir = TempDir::new().unwrap();
        let plan = {
            let store = StateBackend::new(Database::open(temp_dir.path()).unwrap());
            let node = Node::new(store, engine(Box::new(NativeExecutor::base_library())));
            let plan = node.genesis(GenesisSpec::development()).await.unwrap().unwrap();
            node.submit(new_account(&plan, 0, 1_000), true).await.unwrap();
            node.stop().await;
            plan
        };

        let store = StateBackend::new(Database::open(temp_dir.path()).unwrap());
        let node = Node::new(store, engine(Box::new(NativeExecutor::base_library())));
        assert!(node.genesis(GenesisSpec::development()).await.unwrap().is_none());
        let gamete = node.object(&plan.gamete_reference()).await.unwrap();
        assert_eq!(gamete.account_state(plan.gamete_reference()).unwrap().nonce, 1);
        node.stop().await;
    }
}
