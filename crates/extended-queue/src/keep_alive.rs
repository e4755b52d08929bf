//! # Lease Keeper
//!
//! Background renewal of message visibility while a handler is running.
//!
//! Each message (or batch) handed to a handler gets a [`Lease`]: an async
//! mutex holding the current receipt and next-visible time of every member.
//! Renewal and deletion both go through that mutex, so a renewal can never
//! race the acknowledgement of the same message, and a receipt rotated by a
//! renewal is the one used by the later delete.
//!
//! The renewal task is owned by a [`KeepAliveGuard`]. Dropping the guard, or
//! cancelling the processing token, stops the task.

use crate::client::QueueClient;
use crate::error::QueueError;
use crate::message::{MessageId, QueueMessageWrapper, ReceiptHandle, Timestamp};
use futures::future::join_all;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{Mutex, MutexGuard};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

#[cfg(test)]
#[path = "keep_alive_tests.rs"]
mod tests;

/// Lower bound between two batch renewals
const MIN_RENEWAL_INTERVAL: Duration = Duration::from_secs(1);

/// Current lease on one message
#[derive(Debug, Clone)]
pub struct LeaseEntry {
    pub id: MessageId,
    pub receipt: ReceiptHandle,
    pub next_visible_time: Timestamp,
}

impl From<&QueueMessageWrapper> for LeaseEntry {
    fn from(message: &QueueMessageWrapper) -> Self {
        Self {
            id: message.id().clone(),
            receipt: message.receipt().clone(),
            next_visible_time: message.next_visible_time(),
        }
    }
}

/// Shared lease state of a message or batch
#[derive(Debug, Clone)]
pub struct Lease {
    entries: Arc<Mutex<Vec<LeaseEntry>>>,
}

impl Lease {
    pub fn single(message: &QueueMessageWrapper) -> Self {
        Self::from_entries(vec![LeaseEntry::from(message)])
    }

    pub fn batch<'a>(messages: impl IntoIterator<Item = &'a QueueMessageWrapper>) -> Self {
        Self::from_entries(messages.into_iter().map(LeaseEntry::from).collect())
    }

    fn from_entries(entries: Vec<LeaseEntry>) -> Self {
        Self {
            entries: Arc::new(Mutex::new(entries)),
        }
    }

    /// Acquire the lease for exclusive use
    pub async fn lock(&self) -> MutexGuard<'_, Vec<LeaseEntry>> {
        self.entries.lock().await
    }

    /// Current receipt of a member, if it is still leased
    #[cfg(test)]
    pub(crate) async fn receipt(&self, id: &MessageId) -> Option<ReceiptHandle> {
        self.lock()
            .await
            .iter()
            .find(|entry| &entry.id == id)
            .map(|entry| entry.receipt.clone())
    }

    /// Stop renewing a member without deleting it
    pub async fn release(&self, id: &MessageId) {
        self.lock().await.retain(|entry| &entry.id != id);
    }

    /// Delete a member from the queue with its current receipt.
    ///
    /// Holds the lease for the duration of the call. The member is released
    /// from the lease whether or not the delete succeeds.
    pub async fn delete(&self, client: &dyn QueueClient, id: &MessageId) -> Result<(), QueueError> {
        let mut entries = self.lock().await;
        let position = entries
            .iter()
            .position(|entry| &entry.id == id)
            .ok_or_else(|| QueueError::MessageNotFound {
                message_id: id.to_string(),
            })?;

        let entry = entries.remove(position);
        client.delete(&entry.id, &entry.receipt).await
    }
}

/// How long to wait before the next renewal
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RenewalSchedule {
    /// Renew after 75% of the lease time
    Single,
    /// Renew after half of the time left on the earliest-expiring member
    Batch,
}

impl RenewalSchedule {
    fn next_wait(&self, lease_time: Duration, entries: &[LeaseEntry]) -> Duration {
        match self {
            Self::Single => lease_time.mul_f64(0.75),
            Self::Batch => {
                let earliest = entries
                    .iter()
                    .map(|entry| entry.next_visible_time.remaining())
                    .min()
                    .and_then(|remaining| remaining.to_std().ok())
                    .unwrap_or(lease_time);

                (earliest / 2).max(MIN_RENEWAL_INTERVAL)
            }
        }
    }
}

/// Owner of a running renewal task; dropping it stops the renewals
#[derive(Debug)]
pub struct KeepAliveGuard {
    cancel: CancellationToken,
    handle: Option<JoinHandle<()>>,
}

impl KeepAliveGuard {
    /// Start renewing `lease` until the guard is dropped or `parent` is cancelled
    pub fn spawn(
        client: Arc<dyn QueueClient>,
        queue_name: String,
        lease: Lease,
        lease_time: Duration,
        schedule: RenewalSchedule,
        parent: &CancellationToken,
    ) -> Self {
        let cancel = parent.child_token();
        let handle = tokio::spawn(run_renewal_loop(
            client,
            queue_name,
            lease,
            lease_time,
            schedule,
            cancel.clone(),
        ));

        Self {
            cancel,
            handle: Some(handle),
        }
    }

    /// Check whether the renewal task has exited
    #[cfg(test)]
    pub(crate) fn is_finished(&self) -> bool {
        self.handle
            .as_ref()
            .map(|handle| handle.is_finished())
            .unwrap_or(true)
    }

    /// Stop renewing and wait for the task to exit
    pub async fn stop(mut self) {
        self.cancel.cancel();
        if let Some(handle) = self.handle.take() {
            let _ = handle.await;
        }
    }
}

impl Drop for KeepAliveGuard {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}

async fn run_renewal_loop(
    client: Arc<dyn QueueClient>,
    queue_name: String,
    lease: Lease,
    lease_time: Duration,
    schedule: RenewalSchedule,
    cancel: CancellationToken,
) {
    loop {
        let wait = {
            let entries = lease.lock().await;
            if entries.is_empty() {
                return;
            }
            schedule.next_wait(lease_time, &entries)
        };

        tokio::select! {
            _ = cancel.cancelled() => return,
            _ = tokio::time::sleep(wait) => {}
        }

        let mut entries = lease.lock().await;
        if cancel.is_cancelled() {
            return;
        }

        let updates = join_all(entries.iter().map(|entry| {
            client.update_visibility(&entry.id, &entry.receipt, lease_time)
        }))
        .await;

        let mut stop = false;
        let mut index = 0;
        for result in updates {
            match result {
                Ok(update) => {
                    let entry = &mut entries[index];
                    entry.receipt = update.receipt;
                    entry.next_visible_time = update.next_visible_time;
                    debug!(
                        queue = %queue_name,
                        message_id = %entry.id,
                        next_visible_time = %entry.next_visible_time,
                        "Message lease renewed"
                    );
                    index += 1;
                }
                Err(e) if e.is_message_not_found() => {
                    let entry = entries.remove(index);
                    debug!(
                        queue = %queue_name,
                        message_id = %entry.id,
                        "Message no longer leased, renewal stopped"
                    );
                }
                Err(e) => {
                    warn!(
                        queue = %queue_name,
                        message_id = %entries[index].id,
                        error = %e,
                        "Lease renewal failed, lease will expire"
                    );
                    stop = true;
                    index += 1;
                }
            }
        }

        if stop || entries.is_empty() {
            return;
        }
    }
}
