// Sandbox - Capacités offertes au code exécuté, sous comptage du gas
//
// Executed code never touches the store directly: it reads and writes objects
// of the transaction heap through the sandbox, and every access is metered.

use super::classpath::Classpath;
use super::codec::{to_storage, CodecError, RuntimeValue};
use super::deserializer::{DeserializationError, ObjectDeserializer};
use super::gas::{GasCostModel, GasDimension, GasError, GasMeter};
use super::heap::Heap;
use crate::storage::StoreView;
use crate::types::{
    Balance, ConstructorSignature, FieldSignature, MethodSignature, StorageReference,
    ThrownException, StorageValue,
};
use std::collections::BTreeMap;
use std::fmt;

pub const INSUFFICIENT_FUNDS_EXCEPTION: &str = "lang.InsufficientFundsException";
pub const ILLEGAL_ARGUMENT_EXCEPTION: &str = "lang.IllegalArgumentException";

/// What the executor is asked to run
#[derive(Debug, Clone, PartialEq)]
pub enum Invocation {
    /// `target` is allocated before the constructor runs
    Constructor {
        signature: ConstructorSignature,
        target: StorageReference,
        actuals: Vec<RuntimeValue>,
    },
    Instance {
        method: MethodSignature,
        receiver: StorageReference,
        actuals: Vec<RuntimeValue>,
    },
    Static {
        method: MethodSignature,
        actuals: Vec<RuntimeValue>,
    },
}

impl Invocation {
    /// `this` of the invoked code, if any
    pub fn this(&self) -> Option<StorageReference> {
        match self {
            Invocation::Constructor { target, .. } => Some(*target),
            Invocation::Instance { receiver, .. } => Some(*receiver),
            Invocation::Static { .. } => None,
        }
    }

    pub fn actuals(&self) -> &[RuntimeValue] {
        match self {
            Invocation::Constructor { actuals, .. }
            | Invocation::Instance { actuals, .. }
            | Invocation::Static { actuals, .. } => actuals,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum ExecutionOutcome {
    /// Normal termination; `None` for constructors and void methods
    Returned(Option<RuntimeValue>),
    Threw(ThrownException),
    Failed(SandboxError),
}

impl From<Result<Option<RuntimeValue>, SandboxError>> for ExecutionOutcome {
    fn from(result: Result<Option<RuntimeValue>, SandboxError>) -> Self {
        match result {
            Ok(value) => ExecutionOutcome::Returned(value),
            Err(SandboxError::Thrown(exception)) => ExecutionOutcome::Threw(exception),
            Err(other) => ExecutionOutcome::Failed(other),
        }
    }
}

/// Runs code on behalf of the engine. Implementations must be deterministic:
/// the same invocation against the same heap and store must charge the same
/// gas and produce the same outcome on every node.
pub trait Executor: Send + Sync + fmt::Debug {
    fn execute(
        &self,
        classpath: &Classpath,
        invocation: &Invocation,
        sandbox: &mut Sandbox<'_>,
    ) -> ExecutionOutcome;
}

pub struct Sandbox<'a> {
    store: &'a dyn StoreView,
    classpath: &'a Classpath,
    cost_model: &'a dyn GasCostModel,
    meter: &'a mut GasMeter,
    heap: &'a mut Heap,
    caller: StorageReference,
}

impl<'a> Sandbox<'a> {
    pub fn new(
        store: &'a dyn StoreView,
        classpath: &'a Classpath,
        cost_model: &'a dyn GasCostModel,
        meter: &'a mut GasMeter,
        heap: &'a mut Heap,
        caller: StorageReference,
    ) -> Self {
        Self { store, classpath, cost_model, meter, heap, caller }
    }

    pub fn caller(&self) -> StorageReference {
        self.caller
    }

    pub fn classpath(&self) -> &'a Classpath {
        self.classpath
    }

    pub fn charge_cpu(&mut self, steps: u64) -> Result<(), SandboxError> {
        let amount = self.cost_model.cpu_cost_of_steps(steps);
        Ok(self.meter.charge(amount, GasDimension::Cpu)?)
    }

    pub fn charge_ram(&mut self, words: u64) -> Result<(), SandboxError> {
        let amount = self.cost_model.ram_cost_of_words(words);
        Ok(self.meter.charge(amount, GasDimension::Ram)?)
    }

    /// Brings an object into the heap, charging for the load the first time
    pub fn load(&mut self, reference: &StorageReference) -> Result<(), SandboxError> {
        if self.heap.contains(reference) {
            return Ok(());
        }
        self.meter
            .charge(self.cost_model.cpu_cost_for_loading_object(), GasDimension::Cpu)?;
        let object = ObjectDeserializer::new(self.store, self.classpath).deserialize(reference)?;
        tracing::trace!("Objet {} chargé ({})", reference, object.class_name);
        self.heap.insert_loaded(*reference, object);
        Ok(())
    }

    pub fn class_of(&mut self, reference: &StorageReference) -> Result<String, SandboxError> {
        self.load(reference)?;
        self.heap
            .get(reference)
            .map(|o| o.class_name.clone())
            .ok_or(SandboxError::Illegal(format!("object {} vanished", reference)))
    }

    pub fn get_field(
        &mut self,
        reference: &StorageReference,
        field: &FieldSignature,
    ) -> Result<RuntimeValue, SandboxError> {
        self.load(reference)?;
        self.heap
            .get(reference)
            .and_then(|o| o.fields.get(field))
            .cloned()
            .ok_or_else(|| SandboxError::Illegal(format!("{} has no field {}", reference, field)))
    }

    /// Assigns a field; the value must fit the declared type of the field
    pub fn set_field(
        &mut self,
        reference: &StorageReference,
        field: &FieldSignature,
        value: RuntimeValue,
    ) -> Result<(), SandboxError> {
        self.load(reference)?;
        self.charge_ram(1)?;
        to_storage(&value, &field.field_type, &*self.heap, self.classpath)?;

        let object = self
            .heap
            .get_mut(reference)
            .ok_or_else(|| SandboxError::Illegal(format!("object {} vanished", reference)))?;
        match object.fields.get_mut(field) {
            Some(slot) => {
                *slot = value;
                Ok(())
            }
            None => Err(SandboxError::Illegal(format!("{} has no field {}", reference, field))),
        }
    }

    pub fn balance(&mut self, reference: &StorageReference) -> Result<Balance, SandboxError> {
        self.load(reference)?;
        self.heap
            .get(reference)
            .and_then(|o| o.balance)
            .ok_or_else(|| SandboxError::Illegal(format!("{} is not a contract", reference)))
    }

    fn set_balance(&mut self, reference: &StorageReference, balance: Balance) -> Result<(), SandboxError> {
        match self.heap.get_mut(reference).and_then(|o| o.balance.as_mut()) {
            Some(slot) => {
                *slot = balance;
                Ok(())
            }
            None => Err(SandboxError::Illegal(format!("{} is not a contract", reference))),
        }
    }

    /// Moves coins between two contracts. Throws
    /// `lang.InsufficientFundsException` if `from` cannot pay.
    pub fn transfer(
        &mut self,
        from: &StorageReference,
        to: &StorageReference,
        amount: Balance,
    ) -> Result<(), SandboxError> {
        self.charge_cpu(1)?;
        let available = self.balance(from)?;
        let receiving = self.balance(to)?;

        if available < amount {
            return Err(SandboxError::Thrown(ThrownException::new(
                INSUFFICIENT_FUNDS_EXCEPTION,
                format!("{} has {} but {} is needed", from, available, amount),
            )));
        }
        if from == to {
            return Ok(());
        }
        let credited = receiving
            .checked_add(amount)
            .ok_or_else(|| SandboxError::Illegal("balance overflow".to_string()))?;

        self.set_balance(from, available - amount)?;
        self.set_balance(to, credited)
    }

    /// Allocates a new object of `class_name` with default field values.
    /// Contracts start with a zero balance.
    pub fn instantiate(&mut self, class_name: &str) -> Result<StorageReference, SandboxError> {
        let class = self
            .classpath
            .class(class_name)
            .ok_or_else(|| SandboxError::NoSuchCode(class_name.to_string()))?;
        let jar = class.jar;
        let layout = self
            .classpath
            .fields_of(class_name)
            .map_err(|e| SandboxError::NoSuchCode(e.to_string()))?;

        self.charge_ram(layout.len() as u64 + 2)?;

        let fields: BTreeMap<FieldSignature, RuntimeValue> = layout
            .into_iter()
            .map(|f| {
                let default = default_runtime(&StorageValue::default_for(&f.field_type));
                (f, default)
            })
            .collect();
        let balance = self.classpath.is_contract(class_name).then_some(0);

        Ok(self.heap.allocate(class_name, jar, fields, balance))
    }

    /// Publishes an event object in the response
    pub fn emit_event(&mut self, event: &StorageReference) -> Result<(), SandboxError> {
        self.load(event)?;
        self.charge_ram(2)?;
        self.heap.add_event(*event);
        Ok(())
    }

    pub fn throw(class_name: &str, message: impl Into<String>) -> SandboxError {
        SandboxError::Thrown(ThrownException::new(class_name, message))
    }
}

fn default_runtime(value: &StorageValue) -> RuntimeValue {
    match value {
        StorageValue::Boolean(b) => RuntimeValue::Boolean(*b),
        StorageValue::Byte(b) => RuntimeValue::Byte(*b),
        StorageValue::Char(c) => RuntimeValue::Char(*c),
        StorageValue::Short(s) => RuntimeValue::Short(*s),
        StorageValue::Int(i) => RuntimeValue::Int(*i),
        StorageValue::Long(l) => RuntimeValue::Long(*l),
        StorageValue::Float(f) => RuntimeValue::Float(f.0),
        StorageValue::Double(d) => RuntimeValue::Double(d.0),
        _ => RuntimeValue::Null,
    }
}

/// Erreurs du sandbox
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum SandboxError {
    #[error("{0}")]
    OutOfGas(#[from] GasError),

    #[error("exception {}", .0.class_name)]
    Thrown(ThrownException),

    #[error("deserialization: {0}")]
    Deserialization(String),

    #[error("{0}")]
    Codec(#[from] CodecError),

    #[error("no such code: {0}")]
    NoSuchCode(String),

    #[error("illegal operation: {0}")]
    Illegal(String),

    /// The store could not be read: not the fault of the executed code
    #[error("store failure: {0}")]
    Store(String),
}

impl From<DeserializationError> for SandboxError {
    fn from(error: DeserializationError) -> Self {
        match error {
            DeserializationError::Store(e) => SandboxError::Store(e.to_string()),
            other => SandboxError::Deserialization(other.to_string()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::execution::gas::StandardGasCostModel;
    use crate::storage::MemoryStore;
    use crate::tests::support::base_classpath;
    use crate::types::{Hash, TransactionReference, ACCOUNT_CLASS, CONTRACT_CLASS};

    fn with_sandbox<R>(gas: u64, f: impl FnOnce(&mut Sandbox<'_>) -> R) -> (R, Heap, GasMeter) {
        let store = MemoryStore::new();
        let (classpath, _) = base_classpath();
        let caller = StorageReference::new(TransactionReference::new(Hash::hash(b"caller")), 0);
        let mut heap = Heap::new(TransactionReference::new(Hash::hash(b"tx")));
        let mut meter = GasMeter::new(gas);
        let result = {
            let mut sandbox =
                Sandbox::new(&store, &classpath, &StandardGasCostModel, &mut meter, &mut heap, caller);
            f(&mut sandbox)
        };
        (result, heap, meter)
    }

    #[test]
    fn test_transfer_between_new_contracts() {
        let ((from, to), heap, _) = with_sandbox(1_000_000, |sandbox| {
            let from = sandbox.instantiate(ACCOUNT_CLASS).unwrap();
            let to = sandbox.instantiate(CONTRACT_CLASS).unwrap();
            sandbox.set_balance(&from, 100).unwrap();
            sandbox.transfer(&from, &to, 40).unwrap();
            (from, to)
        });
        assert_eq!(heap.get(&from).unwrap().balance, Some(60));
        assert_eq!(heap.get(&to).unwrap().balance, Some(40));
    }

    #[test]
    fn test_transfer_throws_insufficient_funds() {
        let (result, _, _) = with_sandbox(1_000_000, |sandbox| {
            let from = sandbox.instantiate(ACCOUNT_CLASS).unwrap();
            let to = sandbox.instantiate(CONTRACT_CLASS).unwrap();
            sandbox.transfer(&from, &to, 1)
        });
        match result {
            Err(SandboxError::Thrown(exception)) => {
                assert_eq!(exception.class_name, INSUFFICIENT_FUNDS_EXCEPTION)
            }
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn test_set_field_checks_type() {
        let (result, _, _) = with_sandbox(1_000_000, |sandbox| {
            let account = sandbox.instantiate(ACCOUNT_CLASS).unwrap();
            sandbox.set_field(&account, &FieldSignature::account_nonce(), RuntimeValue::Int(3))
        });
        assert!(matches!(result, Err(SandboxError::Codec(CodecError::TypeMismatch { .. }))));
    }

    #[test]
    fn test_out_of_gas_is_reported() {
        let (result, _, meter) = with_sandbox(10, |sandbox| sandbox.charge_cpu(11));
        assert!(matches!(result, Err(SandboxError::OutOfGas(_))));
        assert_eq!(meter.used(), 0);
    }

    #[test]
    fn test_loading_missing_object_fails() {
        let (result, _, _) = with_sandbox(1_000_000, |sandbox| {
            let missing = StorageReference::new(TransactionReference::new(Hash::hash(b"gone")), 0);
            sandbox.balance(&missing)
        });
        assert!(matches!(result, Err(SandboxError::Deserialization(_))));
    }
}
