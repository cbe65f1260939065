// Contexte - Ce dont une transaction a besoin du nœud
use crate::execution::{Executor, GasCostModel, Verifier};
use crate::genesis::ConsensusParams;
use crate::storage::StoreView;

/// Collaborators of one execution: a read-only view of the store, the
/// consensus rules and the pluggable pieces of the engine
#[derive(Clone, Copy)]
pub struct ExecutionContext<'a> {
    pub store: &'a dyn StoreView,
    pub consensus: &'a ConsensusParams,
    pub cost_model: &'a dyn GasCostModel,
    pub verifier: &'a dyn Verifier,
    pub executor: &'a dyn Executor,
}

impl<'a> ExecutionContext<'a> {
    pub fn new(
        store: &'a dyn StoreView,
        consensus: &'a ConsensusParams,
        cost_model: &'a dyn GasCostModel,
        verifier: &'a dyn Verifier,
        executor: &'a dyn Executor,
    ) -> Self {
        Self { store, consensus, cost_model, verifier, executor }
    }
}
