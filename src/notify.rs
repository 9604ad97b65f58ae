//! Outbound notifications.
//!
//! The service pushes typed notes through a [`Notifier`]; the
//! transport decides how to deliver them. Delivery failures are the
//! transport's problem and never fail the originating request.

use async_trait::async_trait;
use tokio::sync::mpsc;
use tracing::{info, warn};

use crate::types::{Chips, UserId};

/// Message for the operator channel.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OperatorNote {
    CashoutRequested {
        request_id: String,
        user_id: UserId,
        amount: Chips,
    },
}

/// Message for a specific user.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UserNote {
    CashoutApproved {
        user_id: UserId,
        request_id: String,
        code: String,
    },
    PromoCredited {
        user_id: UserId,
        code: String,
        amount: Chips,
    },
}

#[async_trait]
pub trait Notifier: Send + Sync {
    async fn notify_operator(&self, note: OperatorNote);
    async fn notify_user(&self, note: UserNote);
}

/// Forwards notes over channels to the transport task.
pub struct ChannelNotifier {
    operator_tx: mpsc::UnboundedSender<OperatorNote>,
    user_tx: mpsc::UnboundedSender<UserNote>,
}

impl ChannelNotifier {
    pub fn new() -> (
        Self,
        mpsc::UnboundedReceiver<OperatorNote>,
        mpsc::UnboundedReceiver<UserNote>,
    ) {
        let (operator_tx, operator_rx) = mpsc::unbounded_channel();
        let (user_tx, user_rx) = mpsc::unbounded_channel();
        (Self { operator_tx, user_tx }, operator_rx, user_rx)
    }
}

#[async_trait]
impl Notifier for ChannelNotifier {
    async fn notify_operator(&self, note: OperatorNote) {
        if self.operator_tx.send(note).is_err() {
            warn!("Operator channel closed, note dropped");
        }
    }

    async fn notify_user(&self, note: UserNote) {
        if self.user_tx.send(note).is_err() {
            warn!("User channel closed, note dropped");
        }
    }
}

/// Logs notes instead of delivering them. Used when no transport is
/// attached.
pub struct LogNotifier;

#[async_trait]
impl Notifier for LogNotifier {
    async fn notify_operator(&self, note: OperatorNote) {
        info!(?note, "Operator notification");
    }

    async fn notify_user(&self, note: UserNote) {
        info!(?note, "User notification");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_channel_notifier_forwards_notes() {
        let (notifier, mut operator_rx, mut user_rx) = ChannelNotifier::new();
        notifier
            .notify_operator(OperatorNote::CashoutRequested {
                request_id: "r1".into(),
                user_id: 7,
                amount: 2000,
            })
            .await;
        notifier
            .notify_user(UserNote::PromoCredited {
                user_id: 7,
                code: "WELCOME".into(),
                amount: 500,
            })
            .await;

        let note = operator_rx.recv().await.unwrap();
        assert!(matches!(note, OperatorNote::CashoutRequested { user_id: 7, .. }));
        let note = user_rx.recv().await.unwrap();
        assert!(matches!(note, UserNote::PromoCredited { amount: 500, .. }));
    }

    #[tokio::test]
    async fn test_closed_channel_does_not_panic() {
        let (notifier, operator_rx, _user_rx) = ChannelNotifier::new();
        drop(operator_rx);
        notifier
            .notify_operator(OperatorNote::CashoutRequested {
                request_id: "r1".into(),
                user_id: 7,
                amount: 2000,
            })
            .await;
    }
}
