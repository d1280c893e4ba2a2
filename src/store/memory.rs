use std::collections::HashMap;
use std::sync::{RwLock, RwLockReadGuard, RwLockWriteGuard};

use crate::Amount;
use crate::model::{
    Earning, EarningId, MAX_DIRECT_REFERRALS, Transaction, TransactionStatus, TxId, User, UserId,
};

use super::{EarningsDelta, EarningsTotals, NewEarning, NewUser, ReferralStore, StoreError};

/// In-memory reference store.
///
/// All state sits behind one `RwLock`, so every write (in particular
/// `increment_earnings`) is serializable relative to concurrent callers.
#[derive(Debug, Default)]
pub struct InMemoryStore {
    inner: RwLock<Inner>,
}

#[derive(Debug, Default)]
struct Inner {
    users: HashMap<UserId, User>,
    by_username: HashMap<String, UserId>,
    by_email: HashMap<String, UserId>,
    by_code: HashMap<String, UserId>,
    transactions: HashMap<TxId, Transaction>,
    earnings: Vec<Earning>,
    next_user_id: UserId,
    next_tx_id: TxId,
    next_earning_id: EarningId,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn read(&self) -> Result<RwLockReadGuard<'_, Inner>, StoreError> {
        self.inner
            .read()
            .map_err(|_| StoreError::Backend("store lock poisoned".to_string()))
    }

    fn write(&self) -> Result<RwLockWriteGuard<'_, Inner>, StoreError> {
        self.inner
            .write()
            .map_err(|_| StoreError::Backend("store lock poisoned".to_string()))
    }

    /// Flip a user's active flag. Administrative operation, not part of
    /// the engine-facing trait.
    pub fn set_active(&self, user: UserId, active: bool) -> Result<(), StoreError> {
        let mut inner = self.write()?;
        let user = inner
            .users
            .get_mut(&user)
            .ok_or(StoreError::UserNotFound(user))?;
        user.is_active = active;
        Ok(())
    }
}

impl ReferralStore for InMemoryStore {
    fn find_user(&self, id: UserId) -> Result<Option<User>, StoreError> {
        let inner = self.read()?;
        Ok(inner.users.get(&id).cloned())
    }

    fn find_user_by_username(&self, username: &str) -> Result<Option<User>, StoreError> {
        let inner = self.read()?;
        Ok(inner
            .by_username
            .get(username)
            .and_then(|id| inner.users.get(id))
            .cloned())
    }

    fn find_user_by_email(&self, email: &str) -> Result<Option<User>, StoreError> {
        let inner = self.read()?;
        Ok(inner
            .by_email
            .get(email)
            .and_then(|id| inner.users.get(id))
            .cloned())
    }

    fn find_user_by_referral_code(&self, code: &str) -> Result<Option<User>, StoreError> {
        let inner = self.read()?;
        Ok(inner
            .by_code
            .get(code)
            .and_then(|id| inner.users.get(id))
            .cloned())
    }

    fn create_user(&self, user: NewUser) -> Result<User, StoreError> {
        let mut inner = self.write()?;

        // Unique indexes, checked inside the write lock
        if inner.by_username.contains_key(&user.username) {
            return Err(StoreError::Conflict("username"));
        }
        if inner.by_email.contains_key(&user.email) {
            return Err(StoreError::Conflict("email"));
        }
        if inner.by_code.contains_key(&user.referral_code) {
            return Err(StoreError::Conflict("referral_code"));
        }

        // Admission happens under the same write lock as the insert, so
        // the capacity check and the assigned position stay valid until
        // the child lands in the parent's list.
        let (position, level) = match user.parent {
            Some(parent_id) => {
                let parent = inner
                    .users
                    .get(&parent_id)
                    .ok_or(StoreError::UserNotFound(parent_id))?;
                if parent.direct_referrals.len() >= MAX_DIRECT_REFERRALS {
                    return Err(StoreError::ChildCapacity(parent_id));
                }
                (
                    Some(parent.direct_referrals.len() as u8 + 1),
                    parent.level + 1,
                )
            }
            None => (None, 0),
        };

        inner.next_user_id += 1;
        let created = User {
            id: inner.next_user_id,
            username: user.username,
            email: user.email,
            referral_code: user.referral_code,
            parent: user.parent,
            position,
            level,
            direct_referrals: Vec::new(),
            total_earnings: Amount::ZERO,
            total_direct_earnings: Amount::ZERO,
            total_indirect_earnings: Amount::ZERO,
            is_active: true,
        };

        inner
            .by_username
            .insert(created.username.clone(), created.id);
        inner.by_email.insert(created.email.clone(), created.id);
        inner.by_code.insert(created.referral_code.clone(), created.id);
        if let Some(parent_id) = user.parent {
            if let Some(parent) = inner.users.get_mut(&parent_id) {
                parent.direct_referrals.push(created.id);
            }
        }
        inner.users.insert(created.id, created.clone());

        Ok(created)
    }

    fn create_transaction(
        &self,
        purchaser: UserId,
        amount: Amount,
        description: String,
    ) -> Result<Transaction, StoreError> {
        let mut inner = self.write()?;
        if !inner.users.contains_key(&purchaser) {
            return Err(StoreError::UserNotFound(purchaser));
        }

        inner.next_tx_id += 1;
        let transaction = Transaction {
            id: inner.next_tx_id,
            purchaser,
            amount,
            status: TransactionStatus::default(),
            description,
            profit_generated: false,
        };
        inner.transactions.insert(transaction.id, transaction.clone());

        Ok(transaction)
    }

    fn set_profit_generated(&self, tx: TxId) -> Result<(), StoreError> {
        let mut inner = self.write()?;
        let transaction = inner
            .transactions
            .get_mut(&tx)
            .ok_or(StoreError::TransactionNotFound(tx))?;
        transaction.profit_generated = true;
        Ok(())
    }

    fn create_earning(&self, earning: NewEarning) -> Result<Earning, StoreError> {
        let mut inner = self.write()?;
        inner.next_earning_id += 1;
        let created = Earning {
            id: inner.next_earning_id,
            recipient: earning.recipient,
            transaction: earning.transaction,
            level: earning.level,
            amount: earning.amount,
            percentage: earning.percentage,
            from_user: earning.from_user,
            transaction_amount: earning.transaction_amount,
        };
        inner.earnings.push(created.clone());
        Ok(created)
    }

    fn increment_earnings(
        &self,
        user: UserId,
        delta: EarningsDelta,
    ) -> Result<EarningsTotals, StoreError> {
        let mut inner = self.write()?;
        let user = inner
            .users
            .get_mut(&user)
            .ok_or(StoreError::UserNotFound(user))?;

        if let Some(amount) = delta.direct {
            user.total_direct_earnings += amount;
        }
        if let Some(amount) = delta.indirect {
            user.total_indirect_earnings += amount;
        }
        // Recompute inside the critical section so the invariant holds
        user.total_earnings = user.total_direct_earnings + user.total_indirect_earnings;

        Ok(EarningsTotals {
            total: user.total_earnings,
            direct: user.total_direct_earnings,
            indirect: user.total_indirect_earnings,
        })
    }

    fn list_users(&self) -> Result<Vec<User>, StoreError> {
        let inner = self.read()?;
        let mut users: Vec<User> = inner.users.values().cloned().collect();
        users.sort_by_key(|u| u.id);
        Ok(users)
    }
}
