// Code - Transactions exécutant du code pour le compte d'un appelant
//
// Jar installations, constructor calls, method calls and their views. Each
// one is validated, then run against a fresh heap; whatever happens during
// the run ends as a response, never as a rejection.

use super::context::ExecutionContext;
use super::error::{EngineFault, TransactionError};
use super::validation::{validate, Validated};
use super::{trace_phase, Phase};
use crate::execution::{
    costs, to_runtime, to_storage, Classpath, ExecutionOutcome, GasDimension, GasError, Heap,
    Invocation, RuntimeValue, Sandbox, SandboxError, UpdateSetComputer,
};
use crate::types::{
    values::string_slots, AccountState, ConstructorCallRequest, ExceptionResponse, FailedResponse,
    FailureCause, FieldSignature, InstalledJar, InstanceMethodCallRequest, JarStoreRequest,
    RequestHeader, StaticMethodCallRequest, StorageReference, StorageType, StorageValue,
    SuccessOutcome, SuccessfulResponse, ThrownException, TransactionReference, TransactionRequest,
    TransactionResponse, Update, UpdateSet, BALANCE_UPDATE_SLOTS,
};

/// Why the run stopped early
#[derive(Debug)]
enum Abort {
    /// Billable failure, ends in a Failed response
    Failed(FailureCause),
    Fatal(EngineFault),
}

impl From<FailureCause> for Abort {
    fn from(cause: FailureCause) -> Self {
        Abort::Failed(cause)
    }
}

impl From<EngineFault> for Abort {
    fn from(fault: EngineFault) -> Self {
        Abort::Fatal(fault)
    }
}

impl From<GasError> for Abort {
    fn from(_: GasError) -> Self {
        Abort::Failed(FailureCause::OutOfGas)
    }
}

impl From<SandboxError> for Abort {
    fn from(error: SandboxError) -> Self {
        match error {
            SandboxError::OutOfGas(_) => FailureCause::OutOfGas.into(),
            SandboxError::Thrown(e) => uncaught(e).into(),
            SandboxError::Deserialization(m) => FailureCause::Deserialization(m).into(),
            SandboxError::Codec(e) => FailureCause::IllegalValue(e.to_string()).into(),
            SandboxError::NoSuchCode(m) => FailureCause::NoSuchCode(m).into(),
            SandboxError::Illegal(m) => FailureCause::IllegalCall(m).into(),
            SandboxError::Store(m) => EngineFault::Store(m).into(),
        }
    }
}

fn uncaught(exception: ThrownException) -> FailureCause {
    FailureCause::UncaughtException {
        class_name: exception.class_name,
        message: exception.message,
    }
}

/// How the executed code ended, when it did not fail
enum Ending {
    Success {
        outcome: SuccessOutcome,
        roots: Vec<StorageReference>,
    },
    Declared {
        exception: ThrownException,
        roots: Vec<StorageReference>,
    },
}

pub fn execute(
    ctx: &ExecutionContext<'_>,
    reference: &TransactionReference,
    request: &TransactionRequest,
    signature_verified: bool,
) -> Result<TransactionResponse, TransactionError> {
    let header = request.header().ok_or_else(|| {
        EngineFault::Inconsistent(format!("{} carries no header", request.kind_name()))
    })?;
    let validated = validate(ctx, reference, request, header, signature_verified)?;
    trace_phase(reference, Phase::Validated);

    let response = ResponseBuilder::new(*ctx, *reference, request, header, &validated).build()?;
    trace_phase(reference, Phase::ResponseReady);
    Ok(response)
}

struct ResponseBuilder<'a> {
    ctx: ExecutionContext<'a>,
    reference: TransactionReference,
    request: &'a TransactionRequest,
    header: &'a RequestHeader,
    validated: &'a Validated,
    meter: crate::execution::GasMeter,
    heap: Heap,
}

impl<'a> ResponseBuilder<'a> {
    fn new(
        ctx: ExecutionContext<'a>,
        reference: TransactionReference,
        request: &'a TransactionRequest,
        header: &'a RequestHeader,
        validated: &'a Validated,
    ) -> Self {
        Self {
            ctx,
            reference,
            request,
            header,
            validated,
            meter: crate::execution::GasMeter::new(header.gas_limit),
            heap: Heap::new(reference),
        }
    }

    fn is_view(&self) -> bool {
        self.request.is_view()
    }

    fn classpath(&self) -> &'a Classpath {
        &self.validated.classpath
    }

    fn sandbox(&mut self) -> Sandbox<'_> {
        Sandbox::new(
            self.ctx.store,
            &self.validated.classpath,
            self.ctx.cost_model,
            &mut self.meter,
            &mut self.heap,
            self.validated.caller.reference,
        )
    }

    fn build(mut self) -> Result<TransactionResponse, TransactionError> {
        let ending = match self.run() {
            Ok(ending) => ending,
            Err(Abort::Failed(cause)) => return self.failed(cause),
            Err(Abort::Fatal(fault)) => return Err(fault.into()),
        };

        match self.finalize(ending) {
            Ok(response) => Ok(response),
            Err(Abort::Failed(cause)) => self.failed(cause),
            Err(Abort::Fatal(fault)) => Err(fault.into()),
        }
    }

    fn run(&mut self) -> Result<Ending, Abort> {
        self.prepare()?;

        let request = self.request;
        match request {
            TransactionRequest::JarStore(r) => self.install_jar(r),
            TransactionRequest::ConstructorCall(r) | TransactionRequest::ConstructorView(r) => {
                self.construct(r)
            }
            TransactionRequest::InstanceMethodCall(r) | TransactionRequest::InstanceView(r) => {
                self.call_instance(r)
            }
            TransactionRequest::StaticMethodCall(r) | TransactionRequest::StaticView(r) => {
                self.call_static(r)
            }
            other => Err(EngineFault::Inconsistent(format!(
                "{} is not a code request",
                other.kind_name()
            ))
            .into()),
        }
    }

    /// Charges the base cost, advances the nonce and takes the whole gas
    /// budget from the payer; unused gas is given back at the end
    fn prepare(&mut self) -> Result<(), Abort> {
        self.meter
            .charge(self.ctx.cost_model.cpu_base_transaction_cost(), GasDimension::Cpu)?;

        let caller = self.validated.caller;
        let payer = self.validated.payer;
        {
            let mut sandbox = self.sandbox();
            sandbox.load(&caller.reference)?;
            sandbox.load(&payer)?;
        }

        if !self.is_view() {
            let next = next_nonce(&caller)?;
            let object = self.heap.get_mut(&caller.reference).ok_or_else(|| {
                EngineFault::Inconsistent(format!("caller {} not in the heap", caller.reference))
            })?;
            object.fields.insert(FieldSignature::account_nonce(), RuntimeValue::Long(next));
        }

        let budget = self.budget()?;
        self.adjust_payer_balance(|balance| balance.checked_sub(budget))
    }

    fn budget(&self) -> Result<u128, EngineFault> {
        AccountState::cost_of(self.header.gas_limit, self.header.gas_price)
            .ok_or_else(|| EngineFault::Inconsistent("gas budget overflow".to_string()))
    }

    fn adjust_payer_balance(&mut self, f: impl FnOnce(u128) -> Option<u128>) -> Result<(), Abort> {
        let payer = self.validated.payer;
        let balance = self
            .heap
            .get_mut(&payer)
            .and_then(|o| o.balance.as_mut())
            .ok_or_else(|| EngineFault::Inconsistent(format!("payer {} is not a contract", payer)))?;
        *balance = f(*balance)
            .ok_or_else(|| EngineFault::Inconsistent(format!("balance of {} out of range", payer)))?;
        Ok(())
    }

    /// Converts and type-checks the actual arguments; referenced objects are
    /// loaded and must be instances of the formal class
    fn actuals(
        &mut self,
        formals: &[StorageType],
        actuals: &[StorageValue],
    ) -> Result<(Vec<RuntimeValue>, Vec<StorageReference>), Abort> {
        if formals.len() != actuals.len() {
            return Err(FailureCause::IllegalArgument(format!(
                "{} arguments for {} formals",
                actuals.len(),
                formals.len()
            ))
            .into());
        }

        let classpath = self.classpath();
        let mut values = Vec::with_capacity(actuals.len());
        let mut references = Vec::new();
        for (value, formal) in actuals.iter().zip(formals) {
            let runtime = to_runtime(value, formal, classpath)
                .map_err(|e| FailureCause::IllegalArgument(e.to_string()))?;

            if let StorageValue::Reference(reference) = value {
                let class_name = self.sandbox().class_of(reference)?;
                if let StorageType::Class(expected) = formal {
                    if !classpath.is_subclass_of(&class_name, expected) {
                        return Err(FailureCause::IllegalArgument(format!(
                            "{} is a {}, not a {}",
                            reference, class_name, expected
                        ))
                        .into());
                    }
                }
                references.push(*reference);
            }
            values.push(runtime);
        }
        Ok((values, references))
    }

    fn invoke(&mut self, invocation: &Invocation) -> ExecutionOutcome {
        let executor = self.ctx.executor;
        let classpath = self.classpath();
        let outcome = executor.execute(classpath, invocation, &mut self.sandbox());
        trace_phase(&self.reference, Phase::Executed);
        outcome
    }

    fn declared(&self, throws: &[String], exception: &ThrownException) -> bool {
        throws
            .iter()
            .any(|declared| self.classpath().is_subclass_of(&exception.class_name, declared))
    }

    fn install_jar(&mut self, request: &JarStoreRequest) -> Result<Ending, Abort> {
        let size = request.jar.len();
        self.meter
            .charge(self.ctx.cost_model.cpu_cost_for_installing_jar(size), GasDimension::Cpu)?;
        self.meter
            .charge(self.ctx.cost_model.ram_cost_for_installing_jar(size), GasDimension::Ram)?;

        let dependencies = self
            .validated
            .dependencies
            .as_ref()
            .ok_or_else(|| EngineFault::Inconsistent("dependencies not resolved".to_string()))?;
        trace_phase(&self.reference, Phase::Deserialized);

        let version = self.ctx.consensus.verification_version;
        let instrumented_jar = self
            .ctx
            .verifier
            .verify(&request.jar, dependencies, version)
            .map_err(|e| FailureCause::VerificationFailed(e.to_string()))?;
        trace_phase(&self.reference, Phase::Executed);

        Ok(Ending::Success {
            outcome: SuccessOutcome::JarInstalled(InstalledJar {
                instrumented_jar,
                dependencies: request.dependencies.clone(),
                verification_version: version,
            }),
            roots: vec![],
        })
    }

    fn construct(&mut self, request: &ConstructorCallRequest) -> Result<Ending, Abort> {
        let signature = &request.constructor;
        let classpath = self.classpath();
        let constructor = classpath
            .constructor(signature)
            .ok_or_else(|| FailureCause::NoSuchCode(signature.to_string()))?;
        if !classpath.is_storage(&signature.defining_class) {
            return Err(FailureCause::IllegalCall(format!(
                "{} is not a storage class",
                signature.defining_class
            ))
            .into());
        }
        // Un constructeur n'est jamais déclaré comme vue
        if self.is_view() {
            return Err(FailureCause::IllegalCall(format!("{} is not a view", signature)).into());
        }

        let (actuals, mut roots) = self.actuals(&signature.formals, &request.actuals)?;
        trace_phase(&self.reference, Phase::Deserialized);

        let target = self.sandbox().instantiate(&signature.defining_class)?;

        // L'objet n'est persisté que si le constructeur termine
        let invocation = Invocation::Constructor { signature: signature.clone(), target, actuals };
        match self.invoke(&invocation) {
            ExecutionOutcome::Returned(_) => {
                roots.push(target);
                Ok(Ending::Success { outcome: SuccessOutcome::ObjectCreated(target), roots })
            }
            ExecutionOutcome::Threw(exception) if self.declared(&constructor.throws, &exception) => {
                Ok(Ending::Declared { exception, roots })
            }
            ExecutionOutcome::Threw(exception) => Err(uncaught(exception).into()),
            ExecutionOutcome::Failed(error) => Err(error.into()),
        }
    }

    fn call_instance(&mut self, request: &InstanceMethodCallRequest) -> Result<Ending, Abort> {
        let signature = &request.method;
        let classpath = self.classpath();
        let method = classpath
            .method(signature)
            .ok_or_else(|| FailureCause::NoSuchCode(signature.to_string()))?;
        if method.is_static {
            return Err(FailureCause::IllegalCall(format!("{} is static", signature)).into());
        }
        if self.is_view() && !method.is_view {
            return Err(FailureCause::IllegalCall(format!("{} is not a view", signature)).into());
        }

        let receiver_class = self.sandbox().class_of(&request.receiver)?;
        if !classpath.is_subclass_of(&receiver_class, &signature.defining_class) {
            return Err(FailureCause::IllegalCall(format!(
                "receiver {} is a {}, not a {}",
                request.receiver, receiver_class, signature.defining_class
            ))
            .into());
        }
        let (actuals, mut roots) = self.actuals(&signature.formals, &request.actuals)?;
        roots.push(request.receiver);
        trace_phase(&self.reference, Phase::Deserialized);

        let invocation = Invocation::Instance {
            method: signature.clone(),
            receiver: request.receiver,
            actuals,
        };
        let outcome = self.invoke(&invocation);
        self.ending(outcome, &method.returns, &method.throws, roots)
    }

    fn call_static(&mut self, request: &StaticMethodCallRequest) -> Result<Ending, Abort> {
        let signature = &request.method;
        let classpath = self.classpath();
        let method = classpath
            .method(signature)
            .ok_or_else(|| FailureCause::NoSuchCode(signature.to_string()))?;
        if !method.is_static {
            return Err(FailureCause::IllegalCall(format!("{} is not static", signature)).into());
        }
        if self.is_view() && !method.is_view {
            return Err(FailureCause::IllegalCall(format!("{} is not a view", signature)).into());
        }

        let (actuals, roots) = self.actuals(&signature.formals, &request.actuals)?;
        trace_phase(&self.reference, Phase::Deserialized);

        let invocation = Invocation::Static { method: signature.clone(), actuals };
        let outcome = self.invoke(&invocation);
        self.ending(outcome, &method.returns, &method.throws, roots)
    }

    /// Ending of a method call; the returned value must fit the declared type
    fn ending(
        &self,
        outcome: ExecutionOutcome,
        returns: &Option<StorageType>,
        throws: &[String],
        mut roots: Vec<StorageReference>,
    ) -> Result<Ending, Abort> {
        match outcome {
            ExecutionOutcome::Returned(value) => {
                let result = match (returns, value) {
                    (None, _) => None,
                    (Some(t), Some(v)) => Some(
                        to_storage(&v, t, &self.heap, self.classpath())
                            .map_err(|e| FailureCause::IllegalValue(e.to_string()))?,
                    ),
                    (Some(t), None) => {
                        return Err(FailureCause::IllegalValue(format!("no value of type {} returned", t)).into())
                    }
                };
                if let Some(StorageValue::Reference(r)) = &result {
                    roots.push(*r);
                }
                Ok(Ending::Success { outcome: SuccessOutcome::Returned(result), roots })
            }
            ExecutionOutcome::Threw(exception) if self.declared(throws, &exception) => {
                Ok(Ending::Declared { exception, roots })
            }
            ExecutionOutcome::Threw(exception) => Err(uncaught(exception).into()),
            ExecutionOutcome::Failed(error) => Err(error.into()),
        }
    }

    fn compute_updates(&self, roots: &[StorageReference]) -> Result<UpdateSet, Abort> {
        UpdateSetComputer::new(&self.heap, self.classpath())
            .compute(roots)
            .map_err(|e| FailureCause::IllegalValue(e.to_string()).into())
    }

    /// Charges for storage, gives unused gas back to the payer and computes
    /// the final updates, balance included
    fn finalize(&mut self, ending: Ending) -> Result<TransactionResponse, Abort> {
        let (mut roots, outcome_slots) = match &ending {
            Ending::Success { outcome, roots } => (roots.clone(), outcome_slots(outcome)),
            Ending::Declared { exception, roots } => (
                roots.clone(),
                string_slots(&exception.class_name)
                    + exception.message.as_deref().map(string_slots).unwrap_or(1),
            ),
        };
        roots.push(self.validated.caller.reference);
        roots.push(self.validated.payer);

        let updates = self.compute_updates(&roots)?;
        let events = self.heap.events().to_vec();
        let slots = updates.size_in_slots_without_balance_of(&self.validated.payer)
            + BALANCE_UPDATE_SLOTS
            + costs::RESPONSE_BASE_SLOTS
            + 2 * events.len() as u64
            + outcome_slots;
        self.meter
            .charge(self.ctx.cost_model.storage_cost_of_slots(slots), GasDimension::Storage)?;

        let refund = AccountState::cost_of(self.meter.remaining(), self.header.gas_price)
            .ok_or_else(|| EngineFault::Inconsistent("refund overflow".to_string()))?;
        self.adjust_payer_balance(|balance| balance.checked_add(refund))?;

        let updates = if self.is_view() { UpdateSet::new() } else { self.compute_updates(&roots)? };
        trace_phase(&self.reference, Phase::Diffed);

        let gas = self.meter.consumed();
        Ok(match ending {
            Ending::Success { outcome, .. } => {
                TransactionResponse::Successful(SuccessfulResponse { outcome, updates, events, gas })
            }
            Ending::Declared { exception, .. } => {
                tracing::debug!("Transaction {} a levé {}", self.reference, exception.class_name);
                TransactionResponse::DeclaredException(ExceptionResponse { exception, updates, events, gas })
            }
        })
    }

    /// The Failed response: only the nonce of the caller and the balance of
    /// the payer change, and the payer is charged the whole gas limit
    fn failed(mut self, cause: FailureCause) -> Result<TransactionResponse, TransactionError> {
        let caller = self.validated.caller;
        let payer = self.validated.payer;
        let mut updates = UpdateSet::new();

        if !self.is_view() {
            let next = next_nonce(&caller).map_err(|e| match e {
                Abort::Fatal(fault) => fault,
                Abort::Failed(cause) => EngineFault::Inconsistent(cause.to_string()),
            })?;
            insert(&mut updates, Update::Field {
                object: caller.reference,
                field: FieldSignature::account_nonce(),
                value: StorageValue::Long(next),
            })?;
        }

        let slots = updates.size_in_slots() + BALANCE_UPDATE_SLOTS + costs::RESPONSE_BASE_SLOTS;
        let storage = self
            .ctx
            .cost_model
            .storage_cost_of_slots(slots)
            .min(self.meter.remaining());
        self.meter
            .charge(storage, GasDimension::Storage)
            .map_err(|e| EngineFault::Inconsistent(e.to_string()))?;

        let penalty = self.meter.penalty(&cause, self.ctx.cost_model);
        let charged = AccountState::cost_of(self.meter.used() + penalty, self.header.gas_price)
            .ok_or_else(|| EngineFault::Inconsistent("gas cost overflow".to_string()))?;
        let balance = self
            .validated
            .payer_balance
            .checked_sub(charged)
            .ok_or_else(|| EngineFault::Inconsistent(format!("payer {} cannot pay {}", payer, charged)))?;
        insert(&mut updates, Update::Balance { object: payer, balance })?;

        tracing::info!("❌ Transaction {} échouée: {}", self.reference, cause);
        trace_phase(&self.reference, Phase::ResponseReady);

        Ok(TransactionResponse::Failed(FailedResponse {
            cause,
            updates: if self.is_view() { UpdateSet::new() } else { updates },
            gas: self.meter.consumed(),
            penalty,
        }))
    }
}

fn next_nonce(caller: &AccountState) -> Result<i64, Abort> {
    caller
        .nonce
        .checked_add(1)
        .and_then(|n| i64::try_from(n).ok())
        .ok_or_else(|| FailureCause::IllegalValue(format!("nonce of {} overflows", caller.reference)).into())
}

fn insert(updates: &mut UpdateSet, update: Update) -> Result<(), EngineFault> {
    updates
        .insert(update)
        .map_err(|e| EngineFault::Inconsistent(e.to_string()))
}

/// Storage slots taken by the outcome of a successful response
fn outcome_slots(outcome: &SuccessOutcome) -> u64 {
    match outcome {
        SuccessOutcome::JarInstalled(jar) => {
            1 + (jar.instrumented_jar.len() as u64).div_ceil(8) + 4 * jar.dependencies.len() as u64
        }
        SuccessOutcome::ObjectCreated(_) => 2,
        SuccessOutcome::Returned(Some(value)) => value.size_in_slots(),
        SuccessOutcome::Returned(None) => 1,
    }
}
