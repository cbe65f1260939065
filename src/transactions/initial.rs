// Initial - Transactions de mise en place du nœud
//
// These run only on a node that is not initialized yet. They are trusted:
// a payload that cannot be executed is a fault of the node operator, not a
// failure to bill.

use super::context::ExecutionContext;
use super::error::{EngineFault, RejectionReason, TransactionError};
use super::{trace_phase, Phase};
use crate::execution::{
    persisted_state, Classpath, ClasspathError, Heap, RuntimeValue, UpdateSetComputer,
};
use crate::types::{
    FieldSignature, GameteCreationRequest, InitialResponse, InitializationRequest, InstalledJar,
    JarStoreInitialRequest, StorageValue, TransactionReference, TransactionRequest,
    TransactionResponse, GAMETE_CLASS,
};
use std::collections::BTreeMap;

fn malformed(message: impl ToString) -> TransactionError {
    EngineFault::MalformedInitial(message.to_string()).into()
}

fn resolve(ctx: &ExecutionContext<'_>, roots: &[TransactionReference]) -> Result<Classpath, TransactionError> {
    Classpath::resolve(ctx.store, roots).map_err(|e| match e {
        ClasspathError::Store(e) => e.into(),
        other => malformed(other),
    })
}

pub fn execute(
    ctx: &ExecutionContext<'_>,
    reference: &TransactionReference,
    request: &TransactionRequest,
) -> Result<TransactionResponse, TransactionError> {
    if ctx.store.is_initialized()? {
        return Err(RejectionReason::AlreadyInitialized.into());
    }
    if ctx.store.contains(reference)? {
        return Err(RejectionReason::AlreadyCommitted(*reference).into());
    }
    trace_phase(reference, Phase::Validated);

    let response = match request {
        TransactionRequest::JarStoreInitial(r) => jar_store_initial(ctx, r)?,
        TransactionRequest::GameteCreation(r) => gamete_creation(ctx, reference, r)?,
        TransactionRequest::Initialization(r) => initialization(ctx, r)?,
        other => return Err(malformed(format!("{} is not an initial request", other.kind_name()))),
    };

    trace_phase(reference, Phase::ResponseReady);
    Ok(TransactionResponse::Initial(response))
}

fn jar_store_initial(
    ctx: &ExecutionContext<'_>,
    request: &JarStoreInitialRequest,
) -> Result<InitialResponse, TransactionError> {
    let dependencies = resolve(ctx, &request.dependencies)?;
    let version = ctx.consensus.verification_version;
    let instrumented_jar = ctx
        .verifier
        .verify(&request.jar, &dependencies, version)
        .map_err(malformed)?;

    Ok(InitialResponse::JarInstalled(InstalledJar {
        instrumented_jar,
        dependencies: request.dependencies.clone(),
        verification_version: version,
    }))
}

fn gamete_creation(
    ctx: &ExecutionContext<'_>,
    reference: &TransactionReference,
    request: &GameteCreationRequest,
) -> Result<InitialResponse, TransactionError> {
    let classpath = resolve(ctx, &[request.classpath])?;
    let class = classpath
        .class(GAMETE_CLASS)
        .ok_or_else(|| malformed(format!("{} is not in the classpath", GAMETE_CLASS)))?;
    let layout = classpath.fields_of(GAMETE_CLASS).map_err(malformed)?;

    let mut fields = BTreeMap::new();
    for field in layout {
        let value = if field == FieldSignature::account_public_key() {
            RuntimeValue::String(request.public_key.clone())
        } else {
            crate::execution::to_runtime(
                &StorageValue::default_for(&field.field_type),
                &field.field_type,
                &classpath,
            )
            .map_err(malformed)?
        };
        fields.insert(field, value);
    }
    if !fields.contains_key(&FieldSignature::account_nonce()) {
        return Err(malformed(format!("{} has no nonce", GAMETE_CLASS)));
    }

    let mut heap = Heap::new(*reference);
    let gamete = heap.allocate(GAMETE_CLASS, class.jar, fields, Some(request.initial_amount));
    let updates = UpdateSetComputer::new(&heap, &classpath)
        .compute(&[gamete])
        .map_err(malformed)?;

    tracing::info!("🌱 Gamete {} créé avec {} coins", gamete, request.initial_amount);
    Ok(InitialResponse::GameteCreated { gamete, updates })
}

fn initialization(
    ctx: &ExecutionContext<'_>,
    request: &InitializationRequest,
) -> Result<InitialResponse, TransactionError> {
    resolve(ctx, &[request.classpath])?;
    match persisted_state(ctx.store, &request.manifest) {
        Ok(_) => {}
        Err(crate::execution::DeserializationError::Store(e)) => return Err(e.into()),
        Err(e) => return Err(malformed(format!("manifest: {}", e))),
    }

    tracing::info!("✅ Nœud initialisé, manifest {}", request.manifest);
    Ok(InitialResponse::Initialized { manifest: request.manifest })
}
