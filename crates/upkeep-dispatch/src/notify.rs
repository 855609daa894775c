//! # Notification Dispatcher
//!
//! Fire-and-forget delivery of bus notices to an external channel (push,
//! SMS, email; whichever [`Notifier`] is plugged in). The dispatcher runs
//! on its own task: a slow or failing channel never blocks or fails a
//! transition. Failures are logged with enough context for a manual resend.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde_json::Value;
use thiserror::Error;
use tokio::sync::broadcast::{self, error::RecvError};
use tokio::task::{JoinHandle, JoinSet};

use upkeep_core::RequestId;

use crate::bus::TransitionNotice;

/// A delivery attempt failed.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum NotifyError {
    #[error("notification channel unavailable: {0}")]
    Unavailable(String),

    #[error("notification rejected: {0}")]
    Rejected(String),
}

/// Outbound notification channel.
#[async_trait]
pub trait Notifier: Send + Sync {
    async fn notify(
        &self,
        request_id: RequestId,
        event_type: &str,
        payload: &Value,
    ) -> Result<(), NotifyError>;
}

/// Channel that drops every notice; used when no channel is configured.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoOpNotifier;

#[async_trait]
impl Notifier for NoOpNotifier {
    async fn notify(
        &self,
        _request_id: RequestId,
        _event_type: &str,
        _payload: &Value,
    ) -> Result<(), NotifyError> {
        Ok(())
    }
}

/// Channel that writes each notice to the log.
#[derive(Debug, Clone, Copy, Default)]
pub struct LogNotifier;

#[async_trait]
impl Notifier for LogNotifier {
    async fn notify(
        &self,
        request_id: RequestId,
        event_type: &str,
        payload: &Value,
    ) -> Result<(), NotifyError> {
        tracing::info!(
            request_id = %request_id,
            event_type,
            to_stage = %payload["to_stage"],
            "notification"
        );
        Ok(())
    }
}

/// Upper bound on a single delivery before it is logged as failed.
pub const DELIVERY_TIMEOUT: Duration = Duration::from_secs(30);

/// Background task forwarding bus notices to a [`Notifier`].
///
/// Each notice is delivered on its own task, so one slow delivery does not
/// hold back the notices behind it. Delivery order across notices is not
/// guaranteed. Notices are still dropped (and logged as lagged) when the
/// receive loop itself falls a full bus capacity behind.
pub struct NotificationDispatcher;

impl NotificationDispatcher {
    /// Spawn the forwarding loop. It ends when the bus is dropped, after
    /// in-flight deliveries finish.
    pub fn spawn(
        receiver: broadcast::Receiver<TransitionNotice>,
        notifier: Arc<dyn Notifier>,
    ) -> JoinHandle<()> {
        Self::spawn_with_timeout(receiver, notifier, DELIVERY_TIMEOUT)
    }

    /// [`spawn`](Self::spawn) with an explicit per-delivery timeout.
    pub fn spawn_with_timeout(
        mut receiver: broadcast::Receiver<TransitionNotice>,
        notifier: Arc<dyn Notifier>,
        timeout: Duration,
    ) -> JoinHandle<()> {
        tokio::spawn(async move {
            let mut inflight = JoinSet::new();
            loop {
                tokio::select! {
                    received = receiver.recv() => match received {
                        Ok(notice) => {
                            let notifier = Arc::clone(&notifier);
                            inflight.spawn(async move {
                                deliver(notifier.as_ref(), &notice, timeout).await;
                            });
                        }
                        Err(RecvError::Lagged(skipped)) => {
                            tracing::warn!(skipped, "notification dispatcher lagged; notices dropped");
                        }
                        Err(RecvError::Closed) => break,
                    },
                    Some(_) = inflight.join_next(), if !inflight.is_empty() => {}
                }
            }
            while inflight.join_next().await.is_some() {}
        })
    }
}

async fn deliver(notifier: &dyn Notifier, notice: &TransitionNotice, timeout: Duration) {
    let attempt = notifier.notify(notice.request_id, notice.event_type, &notice.payload);
    let result = match tokio::time::timeout(timeout, attempt).await {
        Ok(result) => result,
        Err(_) => Err(NotifyError::Unavailable(format!(
            "no response within {}ms",
            timeout.as_millis()
        ))),
    };
    if let Err(error) = result {
        tracing::warn!(
            request_id = %notice.request_id,
            from = ?notice.from,
            to = %notice.to,
            actor_id = ?notice.actor_id.map(|a| a.to_string()),
            actor_role = ?notice.actor_role.as_ref().map(|r| r.as_str()),
            sequence = notice.sequence,
            %error,
            "notification failed; manual resend required"
        );
    }
}
