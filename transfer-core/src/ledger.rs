//! In-memory account balances
//!
//! The ledger is a plain map owned by the account handler, which lives on
//! the consumer thread. It carries no locks: exclusivity comes from there
//! being exactly one consumer. Business rules (non-negative balances) are
//! enforced by the handler, not here.

use crate::types::AccountId;
use std::collections::HashMap;

/// Account identifier to balance mapping
#[derive(Debug, Default, Clone)]
pub struct Ledger {
    balances: HashMap<AccountId, i64>,
}

impl Ledger {
    /// Create an empty ledger
    pub fn new() -> Self {
        Self::default()
    }

    /// Create an empty ledger with room for `capacity` accounts
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            balances: HashMap::with_capacity(capacity),
        }
    }

    /// Balance of `account`, `None` if it does not exist
    pub fn balance(&self, account: &AccountId) -> Option<i64> {
        self.balances.get(account).copied()
    }

    /// Whether `account` exists
    pub fn contains(&self, account: &AccountId) -> bool {
        self.balances.contains_key(account)
    }

    /// Open an account. Returns false if the identifier is taken.
    pub fn open(&mut self, account: AccountId, balance: i64) -> bool {
        match self.balances.entry(account) {
            std::collections::hash_map::Entry::Occupied(_) => false,
            std::collections::hash_map::Entry::Vacant(entry) => {
                entry.insert(balance);
                true
            }
        }
    }

    /// Overwrite the balance of an existing account
    pub fn set_balance(&mut self, account: &AccountId, balance: i64) -> bool {
        match self.balances.get_mut(account) {
            Some(slot) => {
                *slot = balance;
                true
            }
            None => false,
        }
    }

    /// Number of accounts
    pub fn len(&self) -> usize {
        self.balances.len()
    }

    /// True if no account was ever opened
    pub fn is_empty(&self) -> bool {
        self.balances.is_empty()
    }

    /// Sum of all balances (wide to avoid overflow)
    pub fn total(&self) -> i128 {
        self.balances.values().map(|b| *b as i128).sum()
    }

    /// Iterate over accounts and balances
    pub fn iter(&self) -> impl Iterator<Item = (&AccountId, &i64)> {
        self.balances.iter()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_absent_is_distinct_from_zero() {
        let mut ledger = Ledger::new();
        let zero = AccountId::generate();
        let missing = AccountId::generate();

        assert!(ledger.open(zero, 0));
        assert_eq!(ledger.balance(&zero), Some(0));
        assert_eq!(ledger.balance(&missing), None);
        assert!(!ledger.contains(&missing));
    }

    #[test]
    fn test_open_does_not_overwrite() {
        let mut ledger = Ledger::new();
        let id = AccountId::generate();
        assert!(ledger.open(id, 10));
        assert!(!ledger.open(id, 99));
        assert_eq!(ledger.balance(&id), Some(10));
    }

    #[test]
    fn test_set_balance_only_existing() {
        let mut ledger = Ledger::new();
        let id = AccountId::generate();
        assert!(!ledger.set_balance(&id, 5));
        ledger.open(id, 1);
        assert!(ledger.set_balance(&id, 5));
        assert_eq!(ledger.balance(&id), Some(5));
    }

    #[test]
    fn test_total() {
        let mut ledger = Ledger::with_capacity(2);
        ledger.open(AccountId::generate(), i64::MAX);
        ledger.open(AccountId::generate(), i64::MAX);
        assert_eq!(ledger.len(), 2);
        assert_eq!(ledger.total(), 2 * i64::MAX as i128);
    }
}
