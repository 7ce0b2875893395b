use std::{
    collections::HashMap,
    sync::{Arc, Mutex as StdMutex},
};

use tokio::sync::{Mutex, OwnedMutexGuard};

use crate::domain::AccountId;

type Slots = HashMap<i64, Arc<Mutex<()>>>;

/// One async mutex per account.
///
/// Held for the whole handling of an inbound message so that two messages from
/// the same person never interleave their read-modify-write of the state row.
/// An account's entry lives only while someone holds or waits for it.
#[derive(Default)]
pub struct AccountLocks {
    slots: StdMutex<Slots>,
}

/// Releases the account mutex on drop and forgets the account if nobody else wants it.
pub struct AccountGuard<'a> {
    locks: &'a AccountLocks,
    account: i64,
    guard: Option<OwnedMutexGuard<()>>,
}

impl AccountLocks {
    pub async fn lock(&self, account: AccountId) -> AccountGuard<'_> {
        let slot = {
            let mut slots = self.slots();
            slots
                .entry(account.0)
                .or_insert_with(|| Arc::new(Mutex::new(())))
                .clone()
        };
        AccountGuard {
            locks: self,
            account: account.0,
            guard: Some(slot.lock_owned().await),
        }
    }

    /// Number of accounts currently locked or waited on.
    pub fn len(&self) -> usize {
        self.slots().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn slots(&self) -> std::sync::MutexGuard<'_, Slots> {
        // The map is only touched in short non-panicking sections; recover from poison.
        self.slots.lock().unwrap_or_else(|e| e.into_inner())
    }
}

impl Drop for AccountGuard<'_> {
    fn drop(&mut self) {
        drop(self.guard.take());
        let mut slots = self.locks.slots();
        // Only the map's own reference left: no holder, no waiter.
        if slots
            .get(&self.account)
            .is_some_and(|slot| Arc::strong_count(slot) == 1)
        {
            slots.remove(&self.account);
        }
    }
}
