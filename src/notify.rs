//! Real-time earnings notifications.
//!
//! The engine publishes one event per credited earning, addressed to the
//! recipient's user id. Delivery is fire-and-forget: a missing or closed
//! subscriber degrades to a silent drop, never to a failed payout.

use std::collections::HashMap;
use std::sync::Mutex;

use serde::Serialize;
use tokio::sync::mpsc;
use tracing::debug;

use crate::Amount;
use crate::model::UserId;

/// Payload pushed to a recipient when an earning is credited.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum EarningsUpdate {
    /// A level-1 commission from a direct referral's purchase.
    Direct {
        amount: Amount,
        from_username: String,
        transaction_amount: Amount,
        total_earnings: Amount,
    },
    /// A level-2 commission from an indirect referral's purchase,
    /// routed through the intermediary parent.
    Indirect {
        amount: Amount,
        from_username: String,
        through_username: String,
        transaction_amount: Amount,
        total_earnings: Amount,
    },
}

/// Delivers an event to whichever live session is subscribed to a user id.
///
/// Implementations must never block or fail the payout path: at most one
/// delivery attempt per event, no ordering or retry guarantee.
pub trait NotificationSink {
    fn notify(&self, recipient: UserId, update: EarningsUpdate);
}

/// No-op sink for callers that do not need live updates.
impl NotificationSink for () {
    fn notify(&self, _recipient: UserId, _update: EarningsUpdate) {}
}

/// Publish/subscribe hub keyed by user id, backed by unbounded channels.
#[derive(Debug, Default)]
pub struct NotificationHub {
    subscribers: Mutex<HashMap<UserId, mpsc::UnboundedSender<EarningsUpdate>>>,
}

impl NotificationHub {
    pub fn new() -> Self {
        Self::default()
    }

    /// Subscribe to a user's updates. Replaces any previous subscription
    /// for the same user.
    pub fn subscribe(&self, user: UserId) -> mpsc::UnboundedReceiver<EarningsUpdate> {
        let (sender, receiver) = mpsc::unbounded_channel();
        if let Ok(mut subscribers) = self.subscribers.lock() {
            subscribers.insert(user, sender);
        }
        receiver
    }
}

impl NotificationSink for NotificationHub {
    fn notify(&self, recipient: UserId, update: EarningsUpdate) {
        let Ok(mut subscribers) = self.subscribers.lock() else {
            debug!(recipient, "notification dropped: subscriber table poisoned");
            return;
        };
        match subscribers.get(&recipient) {
            Some(sender) => {
                if sender.send(update).is_err() {
                    // Receiver hung up; evict so the entry does not linger
                    subscribers.remove(&recipient);
                    debug!(recipient, "notification dropped: subscriber gone");
                }
            }
            None => debug!(recipient, "notification dropped: no subscriber"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn direct_update(total: i64) -> EarningsUpdate {
        EarningsUpdate::Direct {
            amount: Amount::from_units(250),
            from_username: "piper".to_string(),
            transaction_amount: Amount::from_units(5000),
            total_earnings: Amount::from_units(total),
        }
    }

    #[test]
    fn delivers_to_subscriber() {
        let hub = NotificationHub::new();
        let mut receiver = hub.subscribe(1);

        hub.notify(1, direct_update(250));

        assert_eq!(receiver.try_recv().unwrap(), direct_update(250));
    }

    #[test]
    fn notify_without_subscriber_is_silent() {
        let hub = NotificationHub::new();
        hub.notify(1, direct_update(250));
    }

    #[test]
    fn notify_after_receiver_dropped_is_silent() {
        let hub = NotificationHub::new();
        let receiver = hub.subscribe(1);
        drop(receiver);

        hub.notify(1, direct_update(250));
        hub.notify(1, direct_update(500));
    }

    #[test]
    fn resubscribe_replaces_previous_channel() {
        let hub = NotificationHub::new();
        let mut stale = hub.subscribe(1);
        let mut fresh = hub.subscribe(1);

        hub.notify(1, direct_update(250));

        assert!(stale.try_recv().is_err());
        assert_eq!(fresh.try_recv().unwrap(), direct_update(250));
    }

    #[test]
    fn deliveries_are_per_recipient() {
        let hub = NotificationHub::new();
        let mut first = hub.subscribe(1);
        let mut second = hub.subscribe(2);

        hub.notify(2, direct_update(250));

        assert!(first.try_recv().is_err());
        assert!(second.try_recv().is_ok());
    }
}
