// Native - Exécuteur de code natif Rust et bibliothèque de base
//
// Code is not interpreted: each (class, method) pair of an installed jar is
// bound to a Rust handler. Instance calls dispatch on the runtime class of the
// receiver, walking up its superclasses.

use super::classpath::Classpath;
use super::codec::RuntimeValue;
use super::sandbox::{
    ExecutionOutcome, Executor, Invocation, Sandbox, SandboxError, ILLEGAL_ARGUMENT_EXCEPTION,
    INSUFFICIENT_FUNDS_EXCEPTION,
};
use crate::types::{
    Balance, ClassInfo, CodeUnit, FieldSignature, MethodDecl, StorageType, ACCOUNT_CLASS,
    CONTRACT_CLASS, GAMETE_CLASS, STORAGE_CLASS,
};
use num_bigint::{BigInt, Sign};
use num_traits::ToPrimitive;
use std::collections::BTreeMap;

pub const EXCEPTION_CLASS: &str = "lang.Exception";
pub const RUNTIME_EXCEPTION_CLASS: &str = "lang.RuntimeException";
pub const EVENT_CLASS: &str = "lang.Event";

/// Name under which constructors are registered
const CONSTRUCTOR: &str = "<init>";

/// Steps charged for entering any native code
const CALL_STEPS: u64 = 10;

pub type NativeHandler = fn(&mut Sandbox<'_>, &Invocation) -> Result<Option<RuntimeValue>, SandboxError>;

type HandlerKey = (String, String, Vec<StorageType>);

#[derive(Debug, Clone, Default)]
pub struct NativeExecutor {
    handlers: BTreeMap<HandlerKey, NativeHandler>,
}

impl NativeExecutor {
    pub fn new() -> Self {
        Self::default()
    }

    /// Executor knowing the code of the base library
    pub fn base_library() -> Self {
        let mut executor = Self::new();
        executor.register_method(CONTRACT_CLASS, "getBalance", vec![], contract_get_balance);
        executor.register_method(CONTRACT_CLASS, "receive", vec![StorageType::big_integer()], contract_receive);
        executor.register_constructor(
            ACCOUNT_CLASS,
            vec![StorageType::big_integer(), StorageType::string()],
            account_new,
        );
        executor.register_method(ACCOUNT_CLASS, "nonce", vec![], account_nonce);
        executor.register_method(
            ACCOUNT_CLASS,
            "pay",
            vec![StorageType::class(CONTRACT_CLASS), StorageType::big_integer()],
            account_pay,
        );
        executor
    }

    pub fn register_constructor(&mut self, class_name: &str, formals: Vec<StorageType>, handler: NativeHandler) {
        self.handlers
            .insert((class_name.to_string(), CONSTRUCTOR.to_string(), formals), handler);
    }

    pub fn register_method(
        &mut self,
        class_name: &str,
        name: &str,
        formals: Vec<StorageType>,
        handler: NativeHandler,
    ) {
        self.handlers
            .insert((class_name.to_string(), name.to_string(), formals), handler);
    }

    fn lookup(&self, class_name: &str, name: &str, formals: &[StorageType]) -> Option<NativeHandler> {
        self.handlers
            .get(&(class_name.to_string(), name.to_string(), formals.to_vec()))
            .copied()
    }

    /// Finds the handler of `name` in `class_name` or its closest superclass
    fn resolve_virtual(
        &self,
        classpath: &Classpath,
        class_name: &str,
        name: &str,
        formals: &[StorageType],
    ) -> Option<NativeHandler> {
        classpath
            .ancestors(class_name)
            .find_map(|c| self.lookup(&c.info.name, name, formals))
    }

    fn dispatch(
        &self,
        classpath: &Classpath,
        invocation: &Invocation,
        sandbox: &mut Sandbox<'_>,
    ) -> Result<Option<RuntimeValue>, SandboxError> {
        sandbox.charge_cpu(CALL_STEPS)?;
        sandbox.charge_ram(invocation.actuals().len() as u64 + 1)?;

        match invocation {
            Invocation::Constructor { signature, .. } => {
                // a constructor without code only sets the default values
                match self.lookup(&signature.defining_class, CONSTRUCTOR, &signature.formals) {
                    Some(handler) => handler(sandbox, invocation).map(|_| None),
                    None => Ok(None),
                }
            }
            Invocation::Instance { method, receiver, .. } => {
                let class_name = sandbox.class_of(receiver)?;
                let handler = self
                    .resolve_virtual(classpath, &class_name, &method.name, &method.formals)
                    .ok_or_else(|| SandboxError::NoSuchCode(method.to_string()))?;
                handler(sandbox, invocation)
            }
            Invocation::Static { method, .. } => {
                let handler = self
                    .resolve_virtual(classpath, &method.defining_class, &method.name, &method.formals)
                    .ok_or_else(|| SandboxError::NoSuchCode(method.to_string()))?;
                handler(sandbox, invocation)
            }
        }
    }
}

impl Executor for NativeExecutor {
    fn execute(
        &self,
        classpath: &Classpath,
        invocation: &Invocation,
        sandbox: &mut Sandbox<'_>,
    ) -> ExecutionOutcome {
        self.dispatch(classpath, invocation, sandbox).into()
    }
}

/// Class metadata of the base library jar
pub fn base_code() -> CodeUnit {
    let big_integer = StorageType::big_integer;
    CodeUnit::new(vec![
        ClassInfo::new(STORAGE_CLASS, None),
        ClassInfo::new(CONTRACT_CLASS, Some(STORAGE_CLASS))
            .with_constructor(vec![], &[])
            .with_method(MethodDecl::new("getBalance", vec![], Some(big_integer())).view())
            .with_method(
                MethodDecl::new("receive", vec![big_integer()], None).throws(INSUFFICIENT_FUNDS_EXCEPTION),
            ),
        ClassInfo::new(ACCOUNT_CLASS, Some(CONTRACT_CLASS))
            .with_field("nonce", StorageType::Long)
            .with_field("publicKey", StorageType::string())
            .with_constructor(vec![big_integer(), StorageType::string()], &[INSUFFICIENT_FUNDS_EXCEPTION])
            .with_method(MethodDecl::new("nonce", vec![], Some(StorageType::Long)).view())
            .with_method(
                MethodDecl::new("pay", vec![StorageType::class(CONTRACT_CLASS), big_integer()], None)
                    .throws(INSUFFICIENT_FUNDS_EXCEPTION),
            ),
        ClassInfo::new(GAMETE_CLASS, Some(ACCOUNT_CLASS)),
        ClassInfo::new(EVENT_CLASS, Some(STORAGE_CLASS)).with_constructor(vec![], &[]),
        ClassInfo::new(EXCEPTION_CLASS, None),
        ClassInfo::new(RUNTIME_EXCEPTION_CLASS, Some(EXCEPTION_CLASS)),
        ClassInfo::new(INSUFFICIENT_FUNDS_EXCEPTION, Some(EXCEPTION_CLASS)),
        ClassInfo::new(ILLEGAL_ARGUMENT_EXCEPTION, Some(RUNTIME_EXCEPTION_CLASS)),
    ])
}

fn this(invocation: &Invocation) -> Result<crate::types::StorageReference, SandboxError> {
    invocation
        .this()
        .ok_or_else(|| SandboxError::Illegal("no receiver".to_string()))
}

/// Reads a `lang.BigInteger` argument as an amount of coins
pub fn amount_argument(invocation: &Invocation, index: usize) -> Result<Balance, SandboxError> {
    let value = invocation
        .actuals()
        .get(index)
        .and_then(RuntimeValue::as_big_integer)
        .ok_or_else(|| SandboxError::Illegal(format!("argument {} is not a lang.BigInteger", index)))?;
    if value.sign() == Sign::Minus {
        return Err(Sandbox::throw(ILLEGAL_ARGUMENT_EXCEPTION, "negative amount"));
    }
    value
        .to_u128()
        .ok_or_else(|| Sandbox::throw(ILLEGAL_ARGUMENT_EXCEPTION, "amount too large"))
}

fn contract_get_balance(sandbox: &mut Sandbox<'_>, invocation: &Invocation) -> Result<Option<RuntimeValue>, SandboxError> {
    let balance = sandbox.balance(&this(invocation)?)?;
    Ok(Some(RuntimeValue::BigInteger(BigInt::from(balance))))
}

fn contract_receive(sandbox: &mut Sandbox<'_>, invocation: &Invocation) -> Result<Option<RuntimeValue>, SandboxError> {
    let amount = amount_argument(invocation, 0)?;
    let caller = sandbox.caller();
    sandbox.transfer(&caller, &this(invocation)?, amount)?;
    Ok(None)
}

fn account_new(sandbox: &mut Sandbox<'_>, invocation: &Invocation) -> Result<Option<RuntimeValue>, SandboxError> {
    let target = this(invocation)?;
    let amount = amount_argument(invocation, 0)?;
    let public_key = invocation
        .actuals()
        .get(1)
        .cloned()
        .unwrap_or(RuntimeValue::Null);

    sandbox.set_field(&target, &FieldSignature::account_public_key(), public_key)?;
    let caller = sandbox.caller();
    sandbox.transfer(&caller, &target, amount)?;
    Ok(None)
}

fn account_nonce(sandbox: &mut Sandbox<'_>, invocation: &Invocation) -> Result<Option<RuntimeValue>, SandboxError> {
    sandbox
        .get_field(&this(invocation)?, &FieldSignature::account_nonce())
        .map(Some)
}

fn account_pay(sandbox: &mut Sandbox<'_>, invocation: &Invocation) -> Result<Option<RuntimeValue>, SandboxError> {
    let account = this(invocation)?;
    if sandbox.caller() != account {
        return Err(Sandbox::throw(ILLEGAL_ARGUMENT_EXCEPTION, "only the owner can pay from an account"));
    }
    let to = invocation
        .actuals()
        .first()
        .and_then(RuntimeValue::as_object)
        .ok_or_else(|| Sandbox::throw(ILLEGAL_ARGUMENT_EXCEPTION, "null recipient"))?;
    let amount = amount_argument(invocation, 1)?;
    sandbox.transfer(&account, &to, amount)?;
    Ok(None)
}
