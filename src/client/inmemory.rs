use std::{
    sync::{
        Arc,
        atomic::{AtomicU64, Ordering},
    },
    time::Duration,
};

use tokio::sync::Mutex;
use tracing_error::SpanTrace;

use crate::{
    client::{BrokerClient, DelayLevel, MessageQueue, SendResult, SendStatus},
    envelope::{Envelope, Headers},
};

/// Broker name reported in in-memory send results.
const IN_MEMORY_BROKER_NAME: &str = "in-memory";

/// A message accepted by the [`InMemoryBroker`].
#[derive(Debug, Clone, PartialEq)]
pub struct SentMessage<M> {
    pub destination: String,
    pub envelope: Envelope<Headers, M>,
    /// Timeout passed with a delayed send.
    pub timeout: Option<Duration>,
    /// Delay level passed with a delayed send.
    pub delay_level: Option<DelayLevel>,
}

/// In-memory broker client for testing or local pipelines.
///
/// Accepted messages are stored in a shared queue, so clones observe the
/// same sends. It is useful for:
/// - Unit and integration testing
/// - Simulating delivery without a real broker
/// - Debugging message flows
///
/// A broker built with [`InMemoryBroker::failing`] rejects every send, which
/// lets callers exercise their error paths.
pub struct InMemoryBroker<M> {
    msg_queue: Arc<Mutex<Vec<SentMessage<M>>>>,
    attempts: Arc<AtomicU64>,
    failure: Option<String>,
}

impl<M> InMemoryBroker<M> {
    /// A broker rejecting every send with `reason`.
    pub fn failing(reason: impl Into<String>) -> Self {
        Self {
            failure: Some(reason.into()),
            ..Self::default()
        }
    }

    /// Return all accepted messages and clear the internal queue.
    pub async fn sent_messages(&self) -> Vec<SentMessage<M>> {
        let mut queue = self.msg_queue.lock().await;
        std::mem::take(&mut *queue)
    }

    /// Number of send calls received, successful or not.
    pub fn attempts(&self) -> u64 {
        self.attempts.load(Ordering::SeqCst)
    }

    async fn accept(
        &self,
        destination: &str,
        envelope: Envelope<Headers, M>,
        timeout: Option<Duration>,
        delay_level: Option<DelayLevel>,
    ) -> Result<SendResult, InMemoryBrokerError> {
        let attempt = self.attempts.fetch_add(1, Ordering::SeqCst);

        if let Some(reason) = &self.failure {
            return Err(InMemoryBrokerError::rejected(destination, reason));
        }

        let mut queue = self.msg_queue.lock().await;
        let queue_offset = i64::try_from(queue.len()).unwrap_or(i64::MAX);
        queue.push(SentMessage {
            destination: destination.to_owned(),
            envelope,
            timeout,
            delay_level,
        });

        let topic = destination
            .split_once(':')
            .map_or(destination, |(topic, _)| topic);

        Ok(SendResult {
            send_status: SendStatus::SendOk,
            msg_id: format!("IM{attempt:016X}"),
            message_queue: Some(MessageQueue {
                topic: topic.to_owned(),
                broker_name: IN_MEMORY_BROKER_NAME.to_owned(),
                queue_id: 0,
            }),
            queue_offset,
        })
    }
}

impl<M> Clone for InMemoryBroker<M> {
    fn clone(&self) -> Self {
        Self {
            msg_queue: Arc::clone(&self.msg_queue),
            attempts: Arc::clone(&self.attempts),
            failure: self.failure.clone(),
        }
    }
}

impl<M> Default for InMemoryBroker<M> {
    /// Create a new empty in-memory broker.
    fn default() -> Self {
        Self {
            msg_queue: Arc::new(Mutex::new(Vec::new())),
            attempts: Arc::new(AtomicU64::new(0)),
            failure: None,
        }
    }
}

#[async_trait::async_trait]
impl<M> BrokerClient<M> for InMemoryBroker<M>
where
    M: Send + 'static,
{
    type Outcome = SendResult;
    type Error = InMemoryBrokerError;

    #[tracing::instrument(skip_all, fields(destination = %destination))]
    async fn sync_send(
        &self,
        destination: &str,
        envelope: Envelope<Headers, M>,
    ) -> Result<SendResult, InMemoryBrokerError> {
        tracing::debug!(headers = ?envelope.headers, "Message sent to in-memory queue");
        self.accept(destination, envelope, None, None).await
    }

    #[tracing::instrument(skip_all, fields(destination = %destination, delay_level = %delay_level))]
    async fn sync_send_delayed(
        &self,
        destination: &str,
        envelope: Envelope<Headers, M>,
        timeout: Duration,
        delay_level: DelayLevel,
    ) -> Result<SendResult, InMemoryBrokerError> {
        tracing::debug!(headers = ?envelope.headers, "Delayed message sent to in-memory queue");
        self.accept(destination, envelope, Some(timeout), Some(delay_level))
            .await
    }
}

/// Error returned by a failing [`InMemoryBroker`].
#[derive(Debug)]
pub struct InMemoryBrokerError {
    context: SpanTrace,
    destination: String,
    reason: String,
}

impl InMemoryBrokerError {
    fn rejected(destination: &str, reason: &str) -> Self {
        Self {
            context: SpanTrace::capture(),
            destination: destination.to_owned(),
            reason: reason.to_owned(),
        }
    }

    /// Destination of the rejected send.
    pub fn destination(&self) -> &str {
        &self.destination
    }

    /// Reason the broker was configured to fail with.
    pub fn reason(&self) -> &str {
        &self.reason
    }
}

impl std::fmt::Display for InMemoryBrokerError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        writeln!(
            f,
            "In-memory broker rejected message for {}: {}",
            self.destination, self.reason
        )?;
        self.context.fmt(f)
    }
}

impl std::error::Error for InMemoryBrokerError {}
