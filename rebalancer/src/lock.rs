//! Per-vault exclusion: at most one cycle per vault at a time.

use std::sync::{Mutex, PoisonError};

use detf::Address;
use rustc_hash::FxHashSet;

use crate::error::{Error, Result};

/// Set of vaults with a cycle in flight.
#[derive(Debug, Default)]
pub struct VaultLocks {
    held: Mutex<FxHashSet<Address>>,
}

impl VaultLocks {
    pub fn new() -> Self {
        Self::default()
    }

    /// Claim `vault`, or fail with [`Error::VaultBusy`] if another cycle
    /// holds it. The claim is released when the lease drops.
    pub fn try_acquire(&self, vault: Address) -> Result<VaultLease<'_>> {
        let mut held = self.held.lock().unwrap_or_else(PoisonError::into_inner);
        if !held.insert(vault) {
            return Err(Error::VaultBusy(vault));
        }
        Ok(VaultLease { locks: self, vault })
    }

    pub fn is_locked(&self, vault: Address) -> bool {
        self.held
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .contains(&vault)
    }
}

/// Exclusive claim on one vault.
#[derive(Debug)]
pub struct VaultLease<'a> {
    locks: &'a VaultLocks,
    vault: Address,
}

impl VaultLease<'_> {
    pub fn vault(&self) -> Address {
        self.vault
    }
}

impl Drop for VaultLease<'_> {
    fn drop(&mut self) {
        self.locks
            .held
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(&self.vault);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn second_acquire_is_busy_until_release() {
        let locks = VaultLocks::new();
        let v = Address::repeat_byte(1);

        let lease = locks.try_acquire(v).unwrap();
        assert!(locks.is_locked(v));
        assert!(matches!(locks.try_acquire(v), Err(Error::VaultBusy(a)) if a == v));

        drop(lease);
        assert!(!locks.is_locked(v));
        assert!(locks.try_acquire(v).is_ok());
    }

    #[test]
    fn distinct_vaults_do_not_conflict() {
        let locks = VaultLocks::new();
        let _a = locks.try_acquire(Address::repeat_byte(1)).unwrap();
        let _b = locks.try_acquire(Address::repeat_byte(2)).unwrap();
    }
}
