// Gas - Comptabilité du gas sur trois dimensions (CPU, RAM, storage)
use crate::types::{FailureCause, Gas, GasConsumed};
use std::fmt;

/// Coûts en gas du modèle standard
pub mod costs {
    // Opérations de base
    pub const BASE_TRANSACTION: u64 = 10_000;
    pub const CODE_EXECUTION: u64 = 1; // Par step

    // Opérations de stockage
    pub const STORAGE_READ: u64 = 200; // Par objet chargé
    pub const STORAGE_SLOT: u64 = 100; // Par slot de 8 bytes écrit

    // Mémoire
    pub const RAM_WORD: u64 = 2; // Par mot alloué

    // Installation de code
    pub const CODE_COPY: u64 = 3; // Par byte de jar
    pub const CODE_RAM: u64 = 1; // Par byte de jar

    /// Fixed slots of any response (kind tag, gas counters, events length)
    pub const RESPONSE_BASE_SLOTS: u64 = 4;
}

/// Dimension along which gas is consumed
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum GasDimension {
    Cpu,
    Ram,
    Storage,
}

impl fmt::Display for GasDimension {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            GasDimension::Cpu => write!(f, "cpu"),
            GasDimension::Ram => write!(f, "ram"),
            GasDimension::Storage => write!(f, "storage"),
        }
    }
}

/// Pure mapping from resource usage to gas. Must not depend on anything
/// but its arguments: every node has to compute the same costs.
pub trait GasCostModel: Send + Sync + fmt::Debug {
    fn cpu_base_transaction_cost(&self) -> Gas;

    fn cpu_cost_of_steps(&self, steps: u64) -> Gas;

    fn cpu_cost_for_loading_object(&self) -> Gas;

    fn ram_cost_of_words(&self, words: u64) -> Gas;

    fn storage_cost_of_slots(&self, slots: u64) -> Gas;

    fn cpu_cost_for_installing_jar(&self, bytes: usize) -> Gas;

    fn ram_cost_for_installing_jar(&self, bytes: usize) -> Gas;

    /// Extra gas charged on failure, given what is left of the limit.
    /// Default policy: everything that remains.
    fn penalty(&self, _cause: &FailureCause, remaining: Gas) -> Gas {
        remaining
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct StandardGasCostModel;

impl GasCostModel for StandardGasCostModel {
    fn cpu_base_transaction_cost(&self) -> Gas {
        costs::BASE_TRANSACTION
    }

    fn cpu_cost_of_steps(&self, steps: u64) -> Gas {
        steps.saturating_mul(costs::CODE_EXECUTION)
    }

    fn cpu_cost_for_loading_object(&self) -> Gas {
        costs::STORAGE_READ
    }

    fn ram_cost_of_words(&self, words: u64) -> Gas {
        words.saturating_mul(costs::RAM_WORD)
    }

    fn storage_cost_of_slots(&self, slots: u64) -> Gas {
        slots.saturating_mul(costs::STORAGE_SLOT)
    }

    fn cpu_cost_for_installing_jar(&self, bytes: usize) -> Gas {
        (bytes as u64).saturating_mul(costs::CODE_COPY)
    }

    fn ram_cost_for_installing_jar(&self, bytes: usize) -> Gas {
        (bytes as u64).saturating_mul(costs::CODE_RAM)
    }
}

/// Compteur de gas d'une transaction
#[derive(Debug, Clone)]
pub struct GasMeter {
    /// Gas disponible
    gas_limit: Gas,

    /// Gas consommé, par dimension
    cpu: Gas,
    ram: Gas,
    storage: Gas,
}

impl GasMeter {
    /// Crée un nouveau compteur de gas
    pub fn new(gas_limit: Gas) -> Self {
        Self {
            gas_limit,
            cpu: 0,
            ram: 0,
            storage: 0,
        }
    }

    /// Consomme du gas. On error, nothing is consumed.
    pub fn charge(&mut self, amount: Gas, dimension: GasDimension) -> Result<(), GasError> {
        let new_used = self.used().checked_add(amount).ok_or(GasError::Overflow)?;

        if new_used > self.gas_limit {
            return Err(GasError::OutOfGas {
                dimension,
                needed: amount,
                remaining: self.remaining(),
            });
        }

        match dimension {
            GasDimension::Cpu => self.cpu += amount,
            GasDimension::Ram => self.ram += amount,
            GasDimension::Storage => self.storage += amount,
        }
        Ok(())
    }

    /// Gas restant
    pub fn remaining(&self) -> Gas {
        self.gas_limit.saturating_sub(self.used())
    }

    /// Gas utilisé
    pub fn used(&self) -> Gas {
        self.cpu + self.ram + self.storage
    }

    pub fn limit(&self) -> Gas {
        self.gas_limit
    }

    pub fn consumed(&self) -> GasConsumed {
        GasConsumed {
            cpu: self.cpu,
            ram: self.ram,
            storage: self.storage,
        }
    }

    /// Penalty for a failure at the current point, never above what remains
    pub fn penalty(&self, cause: &FailureCause, model: &dyn GasCostModel) -> Gas {
        model.penalty(cause, self.remaining()).min(self.remaining())
    }
}

/// Erreurs de gas
#[derive(Debug, thiserror::Error, Clone, PartialEq, Eq)]
pub enum GasError {
    #[error("out of gas ({dimension}): needed {needed}, remaining {remaining}")]
    OutOfGas {
        dimension: GasDimension,
        needed: Gas,
        remaining: Gas,
    },

    #[error("overflow in gas computation")]
    Overflow,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_gas_meter_consume() {
        let mut meter = GasMeter::new(1000);

        // Consomme 500
        assert!(meter.charge(500, GasDimension::Cpu).is_ok());
        assert_eq!(meter.used(), 500);
        assert_eq!(meter.remaining(), 500);

        // Consomme 300 de plus, en RAM
        assert!(meter.charge(300, GasDimension::Ram).is_ok());
        assert_eq!(meter.used(), 800);
        assert_eq!(meter.remaining(), 200);

        // Essaie de consommer trop
        assert!(matches!(
            meter.charge(300, GasDimension::Storage),
            Err(GasError::OutOfGas { dimension: GasDimension::Storage, .. })
        ));

        // Le gas n'a pas changé après l'erreur
        assert_eq!(meter.used(), 800);
        assert_eq!(
            meter.consumed(),
            GasConsumed { cpu: 500, ram: 300, storage: 0 }
        );
    }

    #[test]
    fn test_gas_meter_exact_limit() {
        let mut meter = GasMeter::new(1000);
        assert!(meter.charge(1000, GasDimension::Cpu).is_ok());
        assert_eq!(meter.remaining(), 0);
        assert!(meter.charge(1, GasDimension::Cpu).is_err());
    }

    #[test]
    fn test_gas_meter_overflow() {
        let mut meter = GasMeter::new(u64::MAX);
        meter.charge(u64::MAX - 1, GasDimension::Cpu).unwrap();
        assert_eq!(meter.charge(2, GasDimension::Ram), Err(GasError::Overflow));
    }

    #[test]
    fn test_default_penalty_takes_what_remains() {
        let mut meter = GasMeter::new(1000);
        meter.charge(250, GasDimension::Cpu).unwrap();
        let penalty = meter.penalty(&FailureCause::OutOfGas, &StandardGasCostModel);
        assert_eq!(penalty, 750);
        assert_eq!(meter.used() + penalty, meter.limit());
    }

    #[test]
    fn test_standard_costs_reasonable() {
        // Vérifier que les coûts sont cohérents
        let model = StandardGasCostModel;
        assert!(model.cpu_cost_of_steps(1) < model.cpu_cost_for_loading_object());
        assert!(model.cpu_cost_for_loading_object() < model.cpu_base_transaction_cost());
        assert_eq!(model.storage_cost_of_slots(3), 3 * costs::STORAGE_SLOT);
    }
}
