//! Error types for purchase recording and registration.

use thiserror::Error;

use crate::Amount;
use crate::model::{MAX_DIRECT_REFERRALS, UserId};
use crate::store::StoreError;

/// Top-level error returned by [`Engine::apply`](super::Engine::apply).
#[derive(Debug, Error)]
pub enum EngineError {
    #[error("purchase failed: {0}")]
    Purchase(#[from] PurchaseError),

    #[error("registration failed: {0}")]
    Register(#[from] RegisterError),
}

/// Error during purchase recording and commission distribution.
#[derive(Debug, Error)]
pub enum PurchaseError {
    /// Rejected before any write.
    #[error("amount must be positive, got {0}")]
    InvalidAmount(Amount),

    /// Rejected before any write.
    #[error("purchaser {0} not found")]
    PurchaserNotFound(UserId),

    /// Rejected before any write (stream driver path, addressed by username).
    #[error("purchaser {0:?} not found")]
    UnknownPurchaser(String),

    /// A write failed mid-walk. Records persisted before the failure stay
    /// persisted; no compensating rollback is performed.
    #[error("persistence failure: {0}")]
    Store(#[from] StoreError),
}

/// Error during user registration.
#[derive(Debug, Error)]
pub enum RegisterError {
    #[error("username or email already registered")]
    DuplicateIdentity,

    #[error("referral code {0:?} does not resolve to a user")]
    InvalidReferralCode(String),

    #[error("referrer {0} has reached the maximum of {MAX_DIRECT_REFERRALS} direct referrals")]
    CapacityExceeded(UserId),

    /// Stream driver path: the sponsor username does not exist.
    #[error("sponsor {0:?} not found")]
    UnknownSponsor(String),

    #[error("persistence failure: {0}")]
    Store(#[from] StoreError),
}
