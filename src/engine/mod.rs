//! Referral commission engine.
//!
//! The engine records purchases and distributes commissions up to two
//! ancestor levels when a purchase strictly exceeds the payout threshold:
//! 5% of the amount to the purchaser's parent, 1% to the grandparent.
//! It registers users into the referral forest, talks to a [`ReferralStore`]
//! for persistence and a [`NotificationSink`] for real-time updates.
//! Also supports an async stream of requests.

use rand::Rng;
use tokio_stream::{Stream, StreamExt};
use tracing::{info, warn};

use crate::Amount;
use crate::model::{
    DIRECT_COMMISSION_PCT, Earning, INDIRECT_COMMISSION_PCT, MAX_DIRECT_REFERRALS,
    PAYOUT_THRESHOLD, ReferralLevel, Request, Transaction, User, UserId,
};
use crate::notify::{EarningsUpdate, NotificationSink};
use crate::store::{EarningsDelta, NewEarning, NewUser, ReferralStore, StoreError};

mod error;
pub use error::{EngineError, PurchaseError, RegisterError};

/// Outcome of recording a purchase.
#[derive(Debug)]
pub struct PurchaseOutcome {
    pub transaction: Transaction,
    /// True iff the amount exceeded the threshold, regardless of whether
    /// any ancestor was actually eligible to receive a payout.
    pub distributed: bool,
    /// Zero, one, or two earnings, in payout order (direct first).
    pub earnings: Vec<Earning>,
}

/// The referral commission engine.
///
/// Generic over its persistence store and notification sink so external
/// collaborators can be swapped in; `()` is a no-op sink.
pub struct Engine<S, N = ()> {
    store: S,
    sink: N,
}

/// Public API
impl<S: ReferralStore, N: NotificationSink> Engine<S, N> {
    pub fn new(store: S, sink: N) -> Self {
        Self { store, sink }
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    pub fn sink(&self) -> &N {
        &self.sink
    }

    /// All users in creation order, for read-only summaries.
    pub fn users(&self) -> Result<Vec<User>, StoreError> {
        self.store.list_users()
    }

    /// Run the engine with the given request stream.
    pub async fn run(&self, mut stream: impl Stream<Item = Request> + Unpin) {
        while let Some(request) = stream.next().await {
            // any error should not stop the engine, so we just ignore the
            // application result
            let _ = self.apply(request);
        }
    }

    /// Apply a single request on top of the current state.
    pub fn apply(&self, request: Request) -> Result<(), EngineError> {
        match request {
            Request::Register {
                username,
                email,
                sponsor,
            } => {
                let result = self.apply_register(&username, &email, sponsor.as_deref());
                Self::log_result("register", &username, None, &result);
                result?;
            }
            Request::Purchase {
                username,
                amount,
                description,
            } => {
                let result = self.apply_purchase(&username, amount, description);
                Self::log_result("purchase", &username, Some(amount), &result);
                result?;
            }
        }
        Ok(())
    }

    /// Record a purchase and distribute commissions if eligible.
    ///
    /// Rejects non-positive amounts and unknown purchasers before any
    /// write. The purchaser's active flag gates *receiving* commissions,
    /// not spending, so an inactive purchaser may still buy.
    pub fn record_purchase(
        &self,
        purchaser: UserId,
        amount: Amount,
        description: Option<String>,
    ) -> Result<PurchaseOutcome, PurchaseError> {
        if !amount.is_positive() {
            return Err(PurchaseError::InvalidAmount(amount));
        }
        let user = self
            .store
            .find_user(purchaser)?
            .ok_or(PurchaseError::PurchaserNotFound(purchaser))?;

        let description = description.unwrap_or_else(|| format!("Purchase of {amount}"));
        let mut transaction = self.store.create_transaction(user.id, amount, description)?;

        // The common no-payout path: at or below the threshold nothing
        // pays out and the transaction stays non-profit-generating.
        if amount <= PAYOUT_THRESHOLD {
            return Ok(PurchaseOutcome {
                transaction,
                distributed: false,
                earnings: Vec::new(),
            });
        }

        self.store.set_profit_generated(transaction.id)?;
        transaction.profit_generated = true;

        let earnings = self.distribute(&transaction, &user)?;

        Ok(PurchaseOutcome {
            transaction,
            distributed: true,
            earnings,
        })
    }

    /// Register a new user, optionally anchored under the owner of
    /// `parent_referral_code`. An empty code is treated as absent.
    pub fn register_user(
        &self,
        username: &str,
        email: &str,
        parent_referral_code: Option<&str>,
    ) -> Result<User, RegisterError> {
        if self.store.find_user_by_username(username)?.is_some()
            || self.store.find_user_by_email(email)?.is_some()
        {
            return Err(RegisterError::DuplicateIdentity);
        }

        let parent = match parent_referral_code.filter(|code| !code.is_empty()) {
            Some(code) => Some(
                self.store
                    .find_user_by_referral_code(code)?
                    .ok_or_else(|| RegisterError::InvalidReferralCode(code.to_string()))?,
            ),
            None => None,
        };

        if let Some(parent) = &parent {
            if parent.direct_referrals.len() >= MAX_DIRECT_REFERRALS {
                return Err(RegisterError::CapacityExceeded(parent.id));
            }
        }

        let referral_code = self.generate_referral_code(username)?;

        // The store admits the user atomically: position and level are
        // assigned and the parent's child list grows under one critical
        // section, so a racing sibling cannot slip past the capacity
        // check above.
        match self.store.create_user(NewUser {
            username: username.to_string(),
            email: email.to_string(),
            referral_code,
            parent: parent.as_ref().map(|p| p.id),
        }) {
            Ok(user) => Ok(user),
            Err(StoreError::ChildCapacity(id)) => Err(RegisterError::CapacityExceeded(id)),
            Err(err) => Err(err.into()),
        }
    }
}

/// Private API
impl<S: ReferralStore, N: NotificationSink> Engine<S, N> {
    /// Small helper to log `apply` results
    fn log_result<E: std::fmt::Display>(
        op: &str,
        username: &str,
        amount: Option<Amount>,
        result: &Result<(), E>,
    ) {
        match (result, amount) {
            (Ok(()), Some(amt)) => {
                info!(username, amount = %amt, "{op} applied");
            }
            (Ok(()), None) => {
                info!(username, "{op} applied");
            }
            (Err(e), Some(amt)) => {
                info!(username, amount = %amt, reason = %e, "{op} skipped");
            }
            (Err(e), None) => {
                info!(username, reason = %e, "{op} skipped");
            }
        }
    }

    fn apply_register(
        &self,
        username: &str,
        email: &str,
        sponsor: Option<&str>,
    ) -> Result<(), RegisterError> {
        // The stream layer addresses sponsors by username; resolve to the
        // sponsor's referral code before hitting the core contract
        let code = match sponsor {
            Some(name) => Some(
                self.store
                    .find_user_by_username(name)?
                    .ok_or_else(|| RegisterError::UnknownSponsor(name.to_string()))?
                    .referral_code,
            ),
            None => None,
        };
        self.register_user(username, email, code.as_deref())?;
        Ok(())
    }

    fn apply_purchase(
        &self,
        username: &str,
        amount: Amount,
        description: Option<String>,
    ) -> Result<(), PurchaseError> {
        let user = self
            .store
            .find_user_by_username(username)?
            .ok_or_else(|| PurchaseError::UnknownPurchaser(username.to_string()))?;
        self.record_purchase(user.id, amount, description)?;
        Ok(())
    }

    /// Walk at most two ancestor levels and pay commissions.
    ///
    /// The two-level cap is a domain rule, implemented as two sequential
    /// lookups rather than a general tree walk. An inactive direct parent
    /// terminates the walk entirely: the grandparent is never evaluated
    /// on its own.
    fn distribute(
        &self,
        transaction: &Transaction,
        purchaser: &User,
    ) -> Result<Vec<Earning>, PurchaseError> {
        let mut earnings = Vec::new();

        // Level 1: the purchaser's parent
        let Some(parent) = self.lookup(purchaser.parent)? else {
            return Ok(earnings);
        };
        if !parent.is_active {
            return Ok(earnings);
        }

        let direct_amount = transaction.amount.percent(DIRECT_COMMISSION_PCT);
        let earning = self.store.create_earning(NewEarning {
            recipient: parent.id,
            transaction: transaction.id,
            level: ReferralLevel::Direct,
            amount: direct_amount,
            percentage: DIRECT_COMMISSION_PCT,
            from_user: purchaser.id,
            transaction_amount: transaction.amount,
        })?;
        let totals = self
            .store
            .increment_earnings(parent.id, EarningsDelta::direct(direct_amount))?;
        earnings.push(earning);

        self.sink.notify(
            parent.id,
            EarningsUpdate::Direct {
                amount: direct_amount,
                from_username: purchaser.username.clone(),
                transaction_amount: transaction.amount,
                total_earnings: totals.total,
            },
        );

        // Level 2: the purchaser's grandparent
        let Some(grandparent) = self.lookup(parent.parent)? else {
            return Ok(earnings);
        };
        if !grandparent.is_active {
            return Ok(earnings);
        }

        // 1% of the original transaction amount, not of the direct payout
        let indirect_amount = transaction.amount.percent(INDIRECT_COMMISSION_PCT);
        let earning = self.store.create_earning(NewEarning {
            recipient: grandparent.id,
            transaction: transaction.id,
            level: ReferralLevel::Indirect,
            amount: indirect_amount,
            percentage: INDIRECT_COMMISSION_PCT,
            from_user: purchaser.id,
            transaction_amount: transaction.amount,
        })?;
        let totals = self
            .store
            .increment_earnings(grandparent.id, EarningsDelta::indirect(indirect_amount))?;
        earnings.push(earning);

        self.sink.notify(
            grandparent.id,
            EarningsUpdate::Indirect {
                amount: indirect_amount,
                from_username: purchaser.username.clone(),
                through_username: parent.username.clone(),
                transaction_amount: transaction.amount,
                total_earnings: totals.total,
            },
        );

        Ok(earnings)
    }

    fn lookup(&self, id: Option<UserId>) -> Result<Option<User>, StoreError> {
        match id {
            Some(id) => self.store.find_user(id),
            None => Ok(None),
        }
    }

    /// Uppercased username plus a random suffix. Collisions are retried,
    /// falling back to a longer suffix before giving up.
    fn generate_referral_code(&self, username: &str) -> Result<String, RegisterError> {
        const CHARSET: &[u8] = b"ABCDEFGHIJKLMNOPQRSTUVWXYZ0123456789";

        let prefix = username.to_uppercase();
        let mut rng = rand::thread_rng();
        for suffix_len in [6, 6, 6, 12] {
            let suffix: String = (0..suffix_len)
                .map(|_| CHARSET[rng.gen_range(0..CHARSET.len())] as char)
                .collect();
            let code = format!("{prefix}{suffix}");
            if self.store.find_user_by_referral_code(&code)?.is_none() {
                return Ok(code);
            }
            warn!(%code, "referral code collision, retrying");
        }
        Err(RegisterError::Store(StoreError::Conflict("referral_code")))
    }
}
