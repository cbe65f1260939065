// Validation - Contrôles préalables à l'exécution d'une requête
use super::context::ExecutionContext;
use super::error::{RejectionReason, TransactionError};
use crate::execution::{costs, persisted_state, Classpath, ClasspathError, DeserializationError, GasCostModel};
use crate::types::{
    AccountState, Balance, FieldSignature, Gas, JarStoreRequest, RequestHeader, StorageReference,
    StorageValue, TransactionReference, TransactionRequest, Update, BALANCE_UPDATE_SLOTS,
};

/// A request that passed validation, with what validation learned
#[derive(Debug, Clone)]
pub struct Validated {
    pub caller: AccountState,
    /// Who pays for gas: the caller, or the receiver of a self-charged method
    pub payer: StorageReference,
    pub payer_balance: Balance,
    pub classpath: Classpath,
    /// Classes visible to a jar being installed
    pub dependencies: Option<Classpath>,
}

/// Slots of a failed response: the nonce update, the payer's balance and
/// the fixed part of any response
pub fn failed_response_slots(caller: &StorageReference) -> u64 {
    let nonce = Update::Field {
        object: *caller,
        field: FieldSignature::account_nonce(),
        value: StorageValue::Long(0),
    };
    nonce.size_in_slots() + BALANCE_UPDATE_SLOTS + costs::RESPONSE_BASE_SLOTS
}

/// Gas needed to at least pay for a failed response
pub fn minimal_gas(cost_model: &dyn GasCostModel, caller: &StorageReference) -> Gas {
    cost_model
        .cpu_base_transaction_cost()
        .saturating_add(cost_model.storage_cost_of_slots(failed_response_slots(caller)))
}

fn reject<T>(reason: RejectionReason) -> Result<T, TransactionError> {
    Err(TransactionError::Rejected(reason))
}

fn classpath_rejection(error: ClasspathError) -> TransactionError {
    match error {
        ClasspathError::Store(e) => e.into(),
        other => RejectionReason::UnresolvedClasspath(other.to_string()).into(),
    }
}

/// Nonce and balance of an account; `None` if the object is missing or is
/// not an account
fn account_state(
    ctx: &ExecutionContext<'_>,
    reference: &StorageReference,
) -> Result<Option<AccountState>, TransactionError> {
    match persisted_state(ctx.store, reference) {
        Ok(object) => Ok(object.account_state(*reference)),
        Err(DeserializationError::Store(e)) => Err(e.into()),
        Err(_) => Ok(None),
    }
}

/// The receiver pays if the node allows it and the method asks for it
fn self_charged_payer(
    ctx: &ExecutionContext<'_>,
    request: &TransactionRequest,
    classpath: Option<&Classpath>,
) -> Result<Option<(StorageReference, Balance)>, TransactionError> {
    if !ctx.consensus.allows_self_charged {
        return Ok(None);
    }
    let (TransactionRequest::InstanceMethodCall(call) | TransactionRequest::InstanceView(call)) = request else {
        return Ok(None);
    };
    let self_charged = classpath
        .and_then(|c| c.method(&call.method))
        .is_some_and(|m| m.self_charged && !m.is_static);
    if !self_charged {
        return Ok(None);
    }

    match persisted_state(ctx.store, &call.receiver) {
        Ok(object) => Ok(object.balance.map(|b| (call.receiver, b))),
        Err(DeserializationError::Store(e)) => Err(e.into()),
        Err(_) => Ok(None),
    }
}

fn check_dependencies(
    ctx: &ExecutionContext<'_>,
    request: &JarStoreRequest,
) -> Result<Classpath, TransactionError> {
    let maximum = ctx.consensus.max_dependencies;
    if request.dependencies.len() > maximum {
        return reject(RejectionReason::TooManyDependencies { maximum, found: request.dependencies.len() });
    }

    let mut size = request.jar.len();
    for dependency in &request.dependencies {
        let jar_size = ctx
            .store
            .response(dependency)?
            .and_then(|r| r.installed_jar().map(|j| j.instrumented_jar.len()));
        match jar_size {
            Some(s) => size = size.saturating_add(s),
            None => {
                return reject(RejectionReason::UnresolvedClasspath(format!("{} did not install a jar", dependency)))
            }
        }
    }

    let maximum = ctx.consensus.max_cumulative_size_of_dependencies;
    if size > maximum {
        return reject(RejectionReason::DependenciesTooLarge { maximum, found: size });
    }

    Classpath::resolve(ctx.store, &request.dependencies).map_err(classpath_rejection)
}

/// Checks a non-initial request, in a fixed order; the first failed check
/// decides the rejection
pub fn validate(
    ctx: &ExecutionContext<'_>,
    reference: &TransactionReference,
    request: &TransactionRequest,
    header: &RequestHeader,
    signature_verified: bool,
) -> Result<Validated, TransactionError> {
    let is_view = request.is_view();

    if !ctx.store.is_initialized()? {
        return reject(RejectionReason::NotInitialized);
    }
    if !signature_verified {
        return reject(RejectionReason::SignatureNotVerified);
    }
    let caller = match account_state(ctx, &header.caller)? {
        Some(state) => state,
        None => return reject(RejectionReason::CallerNotAccount(header.caller)),
    };
    if !is_view && ctx.store.contains(reference)? {
        return reject(RejectionReason::AlreadyCommitted(*reference));
    }

    if header.chain_id != ctx.consensus.chain_id {
        return reject(RejectionReason::ChainIdMismatch {
            expected: ctx.consensus.chain_id.clone(),
            found: header.chain_id.clone(),
        });
    }

    if !is_view && header.nonce != caller.nonce {
        return reject(RejectionReason::NonceMismatch { expected: caller.nonce, found: header.nonce });
    }

    let minimum = minimal_gas(ctx.cost_model, &header.caller);
    if header.gas_limit < minimum {
        return reject(RejectionReason::GasLimitTooLow { minimum, found: header.gas_limit });
    }
    if is_view && header.gas_limit > ctx.consensus.max_gas_per_view {
        return reject(RejectionReason::GasLimitTooHighForView {
            maximum: ctx.consensus.max_gas_per_view,
            found: header.gas_limit,
        });
    }

    let classpath = Classpath::resolve(ctx.store, &[header.classpath]);
    let (payer, payer_balance) = self_charged_payer(ctx, request, classpath.as_ref().ok())?
        .unwrap_or((caller.reference, caller.balance));
    let required = AccountState::cost_of(header.gas_limit, header.gas_price).unwrap_or(Balance::MAX);
    if payer_balance < required {
        return reject(RejectionReason::InsufficientBalance { payer, required, available: payer_balance });
    }

    if !ctx.consensus.ignores_gas_price && header.gas_price < ctx.consensus.min_gas_price {
        return reject(RejectionReason::GasPriceTooLow {
            minimum: ctx.consensus.min_gas_price,
            found: header.gas_price,
        });
    }

    let classpath = classpath.map_err(classpath_rejection)?;
    let dependencies = match request {
        TransactionRequest::JarStore(jar_store) => Some(check_dependencies(ctx, jar_store)?),
        _ => None,
    };

    Ok(Validated { caller, payer, payer_balance, classpath, dependencies })
}
