//! Persistence interface consumed by the engine.
//!
//! The engine never talks to a concrete backend; it goes through
//! [`ReferralStore`], which an external collaborator provides. The crate
//! ships [`InMemoryStore`] as the reference implementation.

use thiserror::Error;

use crate::Amount;
use crate::model::{
    Earning, MAX_DIRECT_REFERRALS, ReferralLevel, Transaction, TxId, User, UserId,
};

mod memory;
pub use memory::InMemoryStore;

/// Error raised by a store backend.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("user {0} not found")]
    UserNotFound(UserId),

    #[error("transaction {0} not found")]
    TransactionNotFound(TxId),

    #[error("user {0} already has {MAX_DIRECT_REFERRALS} direct referrals")]
    ChildCapacity(UserId),

    #[error("conflict on unique field {0}")]
    Conflict(&'static str),

    #[error("storage backend failure: {0}")]
    Backend(String),
}

/// Fields for a user about to be created.
///
/// The store assigns the id, and for anchored users also the sibling
/// position and level, as part of the atomic admission performed by
/// [`ReferralStore::create_user`].
#[derive(Debug, Clone)]
pub struct NewUser {
    pub username: String,
    pub email: String,
    pub referral_code: String,
    pub parent: Option<UserId>,
}

/// Fields for an earning about to be created. The store assigns the id.
#[derive(Debug, Clone)]
pub struct NewEarning {
    pub recipient: UserId,
    pub transaction: TxId,
    pub level: ReferralLevel,
    pub amount: Amount,
    pub percentage: u8,
    pub from_user: UserId,
    pub transaction_amount: Amount,
}

/// Increments to apply to a user's earning totals.
///
/// `total_earnings` is always recomputed as direct + indirect by the store,
/// keeping the totals invariant inside the atomic update.
#[derive(Debug, Clone, Copy, Default)]
pub struct EarningsDelta {
    pub direct: Option<Amount>,
    pub indirect: Option<Amount>,
}

impl EarningsDelta {
    pub fn direct(amount: Amount) -> Self {
        Self {
            direct: Some(amount),
            ..Self::default()
        }
    }

    pub fn indirect(amount: Amount) -> Self {
        Self {
            indirect: Some(amount),
            ..Self::default()
        }
    }
}

/// A user's earning totals after an increment.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EarningsTotals {
    pub total: Amount,
    pub direct: Amount,
    pub indirect: Amount,
}

/// Durable record of users, transactions, and earnings.
///
/// Methods take `&self`: implementations use interior mutability (or a
/// connection pool) so the engine can serve concurrent requests.
/// [`increment_earnings`](ReferralStore::increment_earnings) must apply
/// increments to a given user atomically relative to concurrent callers,
/// never as a bare read-then-write.
pub trait ReferralStore {
    fn find_user(&self, id: UserId) -> Result<Option<User>, StoreError>;

    fn find_user_by_username(&self, username: &str) -> Result<Option<User>, StoreError>;

    fn find_user_by_email(&self, email: &str) -> Result<Option<User>, StoreError>;

    fn find_user_by_referral_code(&self, code: &str) -> Result<Option<User>, StoreError>;

    /// Create a user, admitting it under its parent in one atomic step:
    /// the capacity check, position and level assignment, and the append
    /// to the parent's child list must happen in a single critical
    /// section, so concurrent siblings can neither oversubscribe the
    /// parent nor claim the same position. Fails with
    /// [`StoreError::ChildCapacity`] when the parent is full, creating
    /// nothing.
    fn create_user(&self, user: NewUser) -> Result<User, StoreError>;

    fn create_transaction(
        &self,
        purchaser: UserId,
        amount: Amount,
        description: String,
    ) -> Result<Transaction, StoreError>;

    /// Mark a transaction as profit-generating. The only post-creation
    /// mutation a transaction ever receives.
    fn set_profit_generated(&self, tx: TxId) -> Result<(), StoreError>;

    fn create_earning(&self, earning: NewEarning) -> Result<Earning, StoreError>;

    /// Atomically apply `delta` to a user's earning totals and return the
    /// updated totals.
    fn increment_earnings(
        &self,
        user: UserId,
        delta: EarningsDelta,
    ) -> Result<EarningsTotals, StoreError>;

    /// All users in creation order, for read-only summaries.
    fn list_users(&self) -> Result<Vec<User>, StoreError>;
}
