// Support - Fixtures partagées par les tests
use crate::execution::{
    base_code, persisted_state, Classpath, GasCostModel, Invocation, ManifestVerifier,
    NativeExecutor, RuntimeValue, Sandbox, SandboxError, StandardGasCostModel,
};
use crate::execution::native::{EVENT_CLASS, RUNTIME_EXCEPTION_CLASS};
use crate::genesis::ConsensusParams;
use crate::storage::{MemoryStore, Store};
use crate::transactions::{self, ExecutionContext, TransactionError};
use crate::types::*;

pub const CHAIN_ID: &str = "arbor-test";
pub const COUNTER_CLASS: &str = "app.Counter";
pub const SPINNER_CLASS: &str = "app.Spinner";
pub const WALLET_CLASS: &str = "app.Wallet";

/// Steps burnt by the counter constructor, so that with `TestCostModel` a
/// constructor call costs 20_000 gas in total
pub const COUNTER_CONSTRUCTOR_STEPS: u64 = 9_990;

/// A committed static call touching one object
pub fn sample_commit() -> (TransactionReference, TransactionRequest, TransactionResponse, StorageReference) {
    let creator = TransactionReference::new(Hash::hash(b"creator"));
    let object = StorageReference::new(creator, 0);
    let request = TransactionRequest::StaticMethodCall(StaticMethodCallRequest {
        header: RequestHeader {
            caller: object,
            nonce: 0,
            chain_id: CHAIN_ID.to_string(),
            gas_limit: 50_000,
            gas_price: 1,
            classpath: creator,
        },
        method: MethodSignature::new(SPINNER_CLASS, "spin", vec![], None),
        actuals: vec![],
    });

    let mut updates = UpdateSet::new();
    updates.insert(Update::Balance { object, balance: 42 }).unwrap();
    let response = TransactionResponse::Successful(SuccessfulResponse {
        outcome: SuccessOutcome::Returned(None),
        updates,
        events: vec![],
        gas: GasConsumed { cpu: 10_000, ram: 0, storage: 0 },
    });

    (request.reference(), request, response, object)
}

/// Classpath made of the base library only
pub fn base_classpath() -> (Classpath, TransactionReference) {
    let jar = TransactionReference::new(Hash::hash(b"base"));
    let mut classpath = Classpath::empty();
    classpath.add(jar, base_code()).unwrap();
    (classpath, jar)
}

pub fn counter_count() -> FieldSignature {
    FieldSignature::new(COUNTER_CLASS, "count", StorageType::Int)
}

/// Classes of the application jar used by the scenarios
pub fn app_code() -> CodeUnit {
    CodeUnit::new(vec![
        ClassInfo::new(COUNTER_CLASS, Some(STORAGE_CLASS))
            .with_field("count", StorageType::Int)
            .with_constructor(vec![], &[])
            .with_method(MethodDecl::new("increment", vec![], None))
            .with_method(MethodDecl::new("get", vec![], Some(StorageType::Int)).view())
            .with_method(MethodDecl::new("boom", vec![], None)),
        ClassInfo::new(SPINNER_CLASS, Some(STORAGE_CLASS))
            .with_method(MethodDecl::new("spin", vec![], None).static_method()),
        ClassInfo::new(WALLET_CLASS, Some(CONTRACT_CLASS))
            .with_constructor(vec![], &[])
            .with_method(MethodDecl::new("tick", vec![], None).self_charged()),
    ])
}

fn counter_new(sandbox: &mut Sandbox<'_>, _: &Invocation) -> Result<Option<RuntimeValue>, SandboxError> {
    sandbox.charge_cpu(COUNTER_CONSTRUCTOR_STEPS)?;
    Ok(None)
}

fn receiver(invocation: &Invocation) -> Result<StorageReference, SandboxError> {
    invocation
        .this()
        .ok_or_else(|| SandboxError::Illegal("no receiver".to_string()))
}

fn counter_increment(sandbox: &mut Sandbox<'_>, invocation: &Invocation) -> Result<Option<RuntimeValue>, SandboxError> {
    let counter = receiver(invocation)?;
    let count = match sandbox.get_field(&counter, &counter_count())? {
        RuntimeValue::Int(count) => count,
        other => return Err(SandboxError::Illegal(format!("count is {:?}", other))),
    };
    sandbox.set_field(&counter, &counter_count(), RuntimeValue::Int(count + 1))?;

    let event = sandbox.instantiate(EVENT_CLASS)?;
    sandbox.emit_event(&event)?;
    Ok(None)
}

fn counter_get(sandbox: &mut Sandbox<'_>, invocation: &Invocation) -> Result<Option<RuntimeValue>, SandboxError> {
    sandbox.get_field(&receiver(invocation)?, &counter_count()).map(Some)
}

fn counter_boom(_: &mut Sandbox<'_>, _: &Invocation) -> Result<Option<RuntimeValue>, SandboxError> {
    Err(Sandbox::throw(RUNTIME_EXCEPTION_CLASS, "boom"))
}

fn spinner_spin(sandbox: &mut Sandbox<'_>, _: &Invocation) -> Result<Option<RuntimeValue>, SandboxError> {
    loop {
        sandbox.charge_cpu(1_000)?;
    }
}

fn wallet_tick(sandbox: &mut Sandbox<'_>, _: &Invocation) -> Result<Option<RuntimeValue>, SandboxError> {
    sandbox.charge_cpu(100)?;
    Ok(None)
}

/// Base library plus the handlers of `app_code`
pub fn app_executor() -> NativeExecutor {
    let mut executor = NativeExecutor::base_library();
    executor.register_constructor(COUNTER_CLASS, vec![], counter_new);
    executor.register_method(COUNTER_CLASS, "increment", vec![], counter_increment);
    executor.register_method(COUNTER_CLASS, "get", vec![], counter_get);
    executor.register_method(COUNTER_CLASS, "boom", vec![], counter_boom);
    executor.register_method(SPINNER_CLASS, "spin", vec![], spinner_spin);
    executor.register_method(WALLET_CLASS, "tick", vec![], wallet_tick);
    executor
}

/// Costs only the base transaction and the executed steps
#[derive(Debug, Clone, Copy)]
pub struct TestCostModel;

impl GasCostModel for TestCostModel {
    fn cpu_base_transaction_cost(&self) -> Gas {
        10_000
    }

    fn cpu_cost_of_steps(&self, steps: u64) -> Gas {
        steps
    }

    fn cpu_cost_for_loading_object(&self) -> Gas {
        0
    }

    fn ram_cost_of_words(&self, _words: u64) -> Gas {
        0
    }

    fn storage_cost_of_slots(&self, _slots: u64) -> Gas {
        0
    }

    fn cpu_cost_for_installing_jar(&self, _bytes: usize) -> Gas {
        0
    }

    fn ram_cost_for_installing_jar(&self, _bytes: usize) -> Gas {
        0
    }
}

/// An initialized in-memory node: base jar, application jar, a funded gamete
pub struct TestChain {
    pub store: MemoryStore,
    pub consensus: ConsensusParams,
    pub cost_model: Box<dyn GasCostModel>,
    pub verifier: ManifestVerifier,
    pub executor: NativeExecutor,
    pub base_jar: TransactionReference,
    pub app_jar: TransactionReference,
    pub gamete: StorageReference,
}

impl TestChain {
    pub fn new(initial_amount: Balance) -> Self {
        Self::with_cost_model(initial_amount, Box::new(TestCostModel))
    }

    pub fn standard(initial_amount: Balance) -> Self {
        Self::with_cost_model(initial_amount, Box::new(StandardGasCostModel))
    }

    pub fn with_cost_model(initial_amount: Balance, cost_model: Box<dyn GasCostModel>) -> Self {
        let mut chain = Self {
            store: MemoryStore::new(),
            consensus: ConsensusParams::development(CHAIN_ID),
            cost_model,
            verifier: ManifestVerifier,
            executor: app_executor(),
            base_jar: TransactionReference::new(Hash::ZERO),
            app_jar: TransactionReference::new(Hash::ZERO),
            gamete: StorageReference::new(TransactionReference::new(Hash::ZERO), 0),
        };

        let base = TransactionRequest::JarStoreInitial(JarStoreInitialRequest {
            jar: base_code().encode().unwrap(),
            dependencies: vec![],
        });
        chain.base_jar = base.reference();
        chain.commit(&base).unwrap();

        let app = TransactionRequest::JarStoreInitial(JarStoreInitialRequest {
            jar: app_code().encode().unwrap(),
            dependencies: vec![chain.base_jar],
        });
        chain.app_jar = app.reference();
        chain.commit(&app).unwrap();

        let gamete = TransactionRequest::GameteCreation(GameteCreationRequest {
            classpath: chain.app_jar,
            initial_amount,
            public_key: "gamete-key".to_string(),
        });
        chain.gamete = StorageReference::new(gamete.reference(), 0);
        chain.commit(&gamete).unwrap();

        let initialization = TransactionRequest::Initialization(InitializationRequest {
            classpath: chain.app_jar,
            manifest: chain.gamete,
        });
        chain.commit(&initialization).unwrap();
        chain
    }

    pub fn context(&self) -> ExecutionContext<'_> {
        ExecutionContext::new(
            &self.store,
            &self.consensus,
            self.cost_model.as_ref(),
            &self.verifier,
            &self.executor,
        )
    }

    /// Runs a request without committing it
    pub fn execute(&self, request: &TransactionRequest) -> Result<TransactionResponse, TransactionError> {
        transactions::execute(&self.context(), request, true)
    }

    /// Runs a request and commits its response
    pub fn commit(&mut self, request: &TransactionRequest) -> Result<TransactionResponse, TransactionError> {
        let response = transactions::execute(&self.context(), request, true)?;
        self.store.commit(request.reference(), request, &response).unwrap();
        Ok(response)
    }

    pub fn header(&self, nonce: Nonce, gas_limit: Gas) -> RequestHeader {
        RequestHeader {
            caller: self.gamete,
            nonce,
            chain_id: CHAIN_ID.to_string(),
            gas_limit,
            gas_price: 1,
            classpath: self.app_jar,
        }
    }

    pub fn nonce(&self, account: &StorageReference) -> Nonce {
        persisted_state(&self.store, account)
            .unwrap()
            .account_state(*account)
            .unwrap()
            .nonce
    }

    pub fn balance(&self, contract: &StorageReference) -> Balance {
        persisted_state(&self.store, contract).unwrap().balance.unwrap()
    }

    pub fn field(&self, object: &StorageReference, field: &FieldSignature) -> Option<StorageValue> {
        persisted_state(&self.store, object).unwrap().fields.get(field).cloned()
    }

    pub fn new_counter(&self, nonce: Nonce, gas_limit: Gas) -> TransactionRequest {
        TransactionRequest::ConstructorCall(ConstructorCallRequest {
            header: self.header(nonce, gas_limit),
            constructor: ConstructorSignature::new(COUNTER_CLASS, vec![]),
            actuals: vec![],
        })
    }

    pub fn call(
        &self,
        nonce: Nonce,
        gas_limit: Gas,
        method: MethodSignature,
        receiver: StorageReference,
        actuals: Vec<StorageValue>,
    ) -> TransactionRequest {
        TransactionRequest::InstanceMethodCall(InstanceMethodCallRequest {
            header: self.header(nonce, gas_limit),
            method,
            receiver,
            actuals,
        })
    }

    pub fn static_call(&self, nonce: Nonce, gas_limit: Gas, method: MethodSignature) -> TransactionRequest {
        TransactionRequest::StaticMethodCall(StaticMethodCallRequest {
            header: self.header(nonce, gas_limit),
            method,
            actuals: vec![],
        })
    }

    pub fn view(&self, gas_limit: Gas, method: MethodSignature, receiver: StorageReference) -> TransactionRequest {
        TransactionRequest::InstanceView(InstanceMethodCallRequest {
            header: self.header(0, gas_limit),
            method,
            receiver,
            actuals: vec![],
        })
    }

    /// Creates a counter and returns its reference
    pub fn deploy_counter(&mut self) -> StorageReference {
        let request = self.new_counter(self.nonce(&self.gamete), 50_000);
        self.deploy(&request)
    }

    /// Creates a wallet funded by the gamete
    pub fn deploy_wallet(&mut self, amount: u64) -> StorageReference {
        let request = TransactionRequest::ConstructorCall(ConstructorCallRequest {
            header: self.header(self.nonce(&self.gamete), 50_000),
            constructor: ConstructorSignature::new(WALLET_CLASS, vec![]),
            actuals: vec![],
        });
        let wallet = self.deploy(&request);

        let receive = MethodSignature::new(CONTRACT_CLASS, "receive", vec![StorageType::big_integer()], None);
        let request = self.call(
            self.nonce(&self.gamete),
            50_000,
            receive,
            wallet,
            vec![StorageValue::big_integer(amount)],
        );
        assert!(matches!(self.commit(&request).unwrap(), TransactionResponse::Successful(_)));
        wallet
    }

    fn deploy(&mut self, request: &TransactionRequest) -> StorageReference {
        match self.commit(request).unwrap() {
            TransactionResponse::Successful(SuccessfulResponse {
                outcome: SuccessOutcome::ObjectCreated(counter),
                ..
            }) => counter,
            other => panic!("object not created: {:?}", other),
        }
    }
}

pub fn increment() -> MethodSignature {
    MethodSignature::new(COUNTER_CLASS, "increment", vec![], None)
}

pub fn get() -> MethodSignature {
    MethodSignature::new(COUNTER_CLASS, "get", vec![], Some(StorageType::Int))
}

pub fn boom() -> MethodSignature {
    MethodSignature::new(COUNTER_CLASS, "boom", vec![], None)
}

pub fn spin() -> MethodSignature {
    MethodSignature::new(SPINNER_CLASS, "spin", vec![], None)
}

pub fn tick() -> MethodSignature {
    MethodSignature::new(WALLET_CLASS, "tick", vec![], None)
}
