// Transactions - Construction des réponses
// Principe: une requête validée produit toujours une réponse; seule une
// requête invalide est rejetée, et seul un défaut du nœud est fatal

pub mod code;
pub mod context;
pub mod error;
pub mod initial;
pub mod validation;

pub use context::ExecutionContext;
pub use error::{EngineFault, RejectionReason, TransactionError};
pub use validation::{failed_response_slots, minimal_gas, Validated};

use crate::types::{TransactionReference, TransactionRequest, TransactionResponse};
use std::fmt;

/// Steps a request goes through, traced for debugging
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    Created,
    Validated,
    Deserialized,
    Executed,
    Diffed,
    ResponseReady,
    Rejected,
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        let name = match self {
            Phase::Created => "created",
            Phase::Validated => "validated",
            Phase::Deserialized => "deserialized",
            Phase::Executed => "executed",
            Phase::Diffed => "diffed",
            Phase::ResponseReady => "response-ready",
            Phase::Rejected => "rejected",
        };
        write!(f, "{}", name)
    }
}

pub(crate) fn trace_phase(reference: &TransactionReference, phase: Phase) {
    tracing::trace!("Transaction {} → {}", reference, phase);
}

/// Builds the response of a request against the state seen by `ctx`.
///
/// Nothing is written: the caller commits the response if it wants to. The
/// result depends only on the request, the state and the consensus rules.
/// `signature_verified` is the verdict of the signature checker, which lives
/// outside the engine.
pub fn execute(
    ctx: &ExecutionContext<'_>,
    request: &TransactionRequest,
    signature_verified: bool,
) -> Result<TransactionResponse, TransactionError> {
    let reference = request.reference();
    trace_phase(&reference, Phase::Created);

    let result = if request.is_initial() {
        initial::execute(ctx, &reference, request)
    } else {
        code::execute(ctx, &reference, request, signature_verified)
    };

    match &result {
        Ok(response) => {
            tracing::debug!(
                "📦 {} {} → {} ({} gas)",
                request.kind_name(),
                reference,
                response.kind_name(),
                response.gas_charged()
            )
        }
        Err(TransactionError::Rejected(reason)) => {
            trace_phase(&reference, Phase::Rejected);
            tracing::debug!("🚫 {} {} rejetée: {}", request.kind_name(), reference, reason);
        }
        Err(TransactionError::Fatal(fault)) => {
            tracing::error!("💥 Faute du moteur sur {}: {}", reference, fault);
        }
    }
    result
}
