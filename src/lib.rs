pub mod amount;
pub mod csv;
pub mod engine;
pub mod model;
pub mod notify;
pub mod store;

pub use amount::Amount;
pub use engine::{Engine, PurchaseOutcome};
pub use model::{Earning, ReferralLevel, Request, Transaction, TxId, User, UserId};
pub use notify::{EarningsUpdate, NotificationHub, NotificationSink};
pub use store::{InMemoryStore, ReferralStore};
