//! Core domain types for the referral commission engine.

use crate::Amount;

/// User identifier.
pub type UserId = u32;

/// Transaction identifier.
pub type TxId = u64;

/// Earning identifier.
pub type EarningId = u64;

/// Minimum transaction amount that triggers commission distribution.
/// Amounts must strictly exceed this value to pay out.
pub const PAYOUT_THRESHOLD: Amount = Amount::from_units(1000);

/// Commission rate for the direct (level-1) referrer, in percent.
pub const DIRECT_COMMISSION_PCT: u8 = 5;

/// Commission rate for the indirect (level-2) referrer, in percent.
/// Applied to the original transaction amount, not to the direct payout.
pub const INDIRECT_COMMISSION_PCT: u8 = 1;

/// Maximum number of direct referrals a user may anchor.
pub const MAX_DIRECT_REFERRALS: usize = 8;

/// A request representing the possible inputs of the engine.
#[derive(Debug, Clone)]
pub enum Request {
    /// Register a new user, optionally under a sponsor (parent username).
    Register {
        username: String,
        email: String,
        sponsor: Option<String>,
    },
    /// Record a purchase by username; distributes commissions if eligible.
    Purchase {
        username: String,
        amount: Amount,
        description: Option<String>,
    },
}

/// A node in the referral forest.
///
/// Each user has at most one parent and at most [`MAX_DIRECT_REFERRALS`]
/// insertion-ordered children. Earning totals always satisfy
/// `total_earnings == total_direct_earnings + total_indirect_earnings`.
#[derive(Debug, Clone)]
pub struct User {
    pub id: UserId,
    pub username: String,
    pub email: String,
    pub referral_code: String,
    pub parent: Option<UserId>,
    /// Ordinal position among siblings (1..=8), assigned at registration.
    /// `None` for roots.
    pub position: Option<u8>,
    /// Depth in the forest: 0 for roots, parent.level + 1 otherwise.
    pub level: u32,
    pub direct_referrals: Vec<UserId>,
    pub total_earnings: Amount,
    pub total_direct_earnings: Amount,
    pub total_indirect_earnings: Amount,
    /// Gates *receiving* commissions. An inactive user may still spend.
    pub is_active: bool,
}

/// Settlement status of a transaction. The engine never transitions it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum TransactionStatus {
    Pending,
    #[default]
    Completed,
    Failed,
}

/// An immutable-after-creation record of a purchase.
#[derive(Debug, Clone)]
pub struct Transaction {
    pub id: TxId,
    pub purchaser: UserId,
    pub amount: Amount,
    pub status: TransactionStatus,
    pub description: String,
    /// True iff the amount strictly exceeded [`PAYOUT_THRESHOLD`].
    /// Set exactly once by the engine, never unset.
    pub profit_generated: bool,
}

/// Ancestor level a commission is paid at. No other levels exist.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReferralLevel {
    /// The purchaser's parent.
    Direct = 1,
    /// The purchaser's grandparent.
    Indirect = 2,
}

impl ReferralLevel {
    pub fn commission_pct(self) -> u8 {
        match self {
            ReferralLevel::Direct => DIRECT_COMMISSION_PCT,
            ReferralLevel::Indirect => INDIRECT_COMMISSION_PCT,
        }
    }
}

/// An immutable record of a single commission payment.
#[derive(Debug, Clone)]
pub struct Earning {
    pub id: EarningId,
    pub recipient: UserId,
    pub transaction: TxId,
    pub level: ReferralLevel,
    pub amount: Amount,
    pub percentage: u8,
    /// The purchaser whose spending generated this earning.
    pub from_user: UserId,
    /// Original transaction amount, denormalized for reporting.
    pub transaction_amount: Amount,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn transaction_status_default_is_completed() {
        assert_eq!(TransactionStatus::default(), TransactionStatus::Completed);
    }

    #[test]
    fn referral_level_rates() {
        assert_eq!(ReferralLevel::Direct.commission_pct(), 5);
        assert_eq!(ReferralLevel::Indirect.commission_pct(), 1);
    }

    #[test]
    fn payout_threshold_is_1000_units() {
        assert_eq!(PAYOUT_THRESHOLD, Amount::from_units(1000));
    }
}
