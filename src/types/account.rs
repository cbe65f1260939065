// Account - Vue minimale d'un compte en storage
use super::primitives::{Balance, Gas, Nonce};
use super::reference::StorageReference;

/// Nonce and balance of an account, as reconstructed from storage
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AccountState {
    pub reference: StorageReference,
    pub nonce: Nonce,
    pub balance: Balance,
}

impl AccountState {
    /// Coins needed to buy `gas` units at `price`; `None` on overflow
    pub fn cost_of(gas: Gas, price: Balance) -> Option<Balance> {
        (gas as u128).checked_mul(price)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cost_of_gas() {
        assert_eq!(AccountState::cost_of(20_000, 1), Some(20_000));
        assert_eq!(AccountState::cost_of(10, 7), Some(70));
        assert_eq!(AccountState::cost_of(u64::MAX, u128::MAX), None);
    }
}
