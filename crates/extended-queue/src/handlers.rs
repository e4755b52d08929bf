//! User callbacks invoked by the processing strategies.
//!
//! Each trait has a blanket implementation for async closures, so a handler
//! can be either a type implementing the trait or a plain closure:
//!
//! ```rust
//! use extended_queue::handlers::MessageHandler;
//! use extended_queue::message::DecodedMessage;
//!
//! fn assert_handler<H: MessageHandler<String>>(_: H) {}
//!
//! assert_handler(|message: DecodedMessage<String>| async move {
//!     println!("received {}", message.contents());
//!     anyhow::Ok(true)
//! });
//! ```

use crate::message::{DecodedMessage, MessageId, QueueMessageWrapper};
use async_trait::async_trait;
use std::future::Future;

/// Handles one decoded message.
///
/// Returning `Ok(true)` acknowledges the message, which deletes it from the
/// queue. `Ok(false)` leaves it for redelivery once the lease expires. An
/// error is routed to the exception handler and also leaves the message.
#[async_trait]
pub trait MessageHandler<T>: Send + Sync {
    async fn handle(&self, message: DecodedMessage<T>) -> anyhow::Result<bool>;
}

#[async_trait]
impl<T, F, Fut> MessageHandler<T> for F
where
    T: Send + 'static,
    F: Fn(DecodedMessage<T>) -> Fut + Send + Sync,
    Fut: Future<Output = anyhow::Result<bool>> + Send,
{
    async fn handle(&self, message: DecodedMessage<T>) -> anyhow::Result<bool> {
        (self)(message).await
    }
}

/// Handles a batch of decoded messages.
///
/// Returns the ids of the messages to acknowledge. Members not listed stay
/// on the queue and are redelivered once their lease expires.
#[async_trait]
pub trait BatchHandler<T>: Send + Sync {
    async fn handle(&self, messages: Vec<DecodedMessage<T>>) -> anyhow::Result<Vec<MessageId>>;
}

#[async_trait]
impl<T, F, Fut> BatchHandler<T> for F
where
    T: Send + 'static,
    F: Fn(Vec<DecodedMessage<T>>) -> Fut + Send + Sync,
    Fut: Future<Output = anyhow::Result<Vec<MessageId>>> + Send,
{
    async fn handle(&self, messages: Vec<DecodedMessage<T>>) -> anyhow::Result<Vec<MessageId>> {
        (self)(messages).await
    }
}

/// Handles a message whose dequeue count crossed the poison threshold.
///
/// Receives the undecoded message since poison messages often fail to
/// decode. Returning `Ok(true)` removes the message from the queue.
#[async_trait]
pub trait PoisonHandler: Send + Sync {
    async fn handle(&self, message: QueueMessageWrapper) -> anyhow::Result<bool>;
}

#[async_trait]
impl<F, Fut> PoisonHandler for F
where
    F: Fn(QueueMessageWrapper) -> Fut + Send + Sync,
    Fut: Future<Output = anyhow::Result<bool>> + Send,
{
    async fn handle(&self, message: QueueMessageWrapper) -> anyhow::Result<bool> {
        (self)(message).await
    }
}
