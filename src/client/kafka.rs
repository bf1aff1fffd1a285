use async_trait::async_trait;
use rdkafka::{
    error::KafkaError,
    message::{Header, OwnedHeaders},
    producer::{FutureProducer, FutureRecord},
    util::Timeout,
};
use serde::Serialize;
use std::time::Duration;
use tracing_error::SpanTrace;

use crate::{
    client::{BrokerClient, DelayLevel, MessageQueue, SendResult, SendStatus},
    destination::TAG_SEPARATOR,
    envelope::{Envelope, Headers, KEYS},
};

/// Header carrying the tag part of the destination.
pub const TAGS: &str = "TAGS";

const BROKER_NAME: &str = "kafka";

/// Kafka broker client.
///
/// Publishes envelopes through a `FutureProducer`. The destination is split at
/// its first `:` into the Kafka topic and the tag.
///
/// ## Mapping
///
/// - topic part of the destination → Kafka topic
/// - `KEYS` header → record key (and header)
/// - tag part of the destination → `TAGS` header
/// - `Envelope.message` → JSON payload
///
/// `sync_send` waits for the delivery report without a queue timeout;
/// `sync_send_delayed` waits at most the timeout it is given.
///
/// Kafka has no delivery-delay tiers. `sync_send_delayed` only publishes when
/// the level asks for no delay (zero or below); any real delay is rejected
/// with [`KafkaSendErrorKind::DelayUnsupported`] and nothing is published.
#[derive(Clone)]
pub struct KafkaBroker {
    producer: FutureProducer,
}

impl KafkaBroker {
    /// Create a new client using the given `FutureProducer`.
    pub fn new(producer: FutureProducer) -> Self {
        Self { producer }
    }

    /// The wrapped producer.
    pub fn producer(&self) -> &FutureProducer {
        &self.producer
    }

    async fn publish<M>(
        &self,
        destination: &str,
        envelope: Envelope<Headers, M>,
        timeout: Timeout,
    ) -> Result<SendResult, KafkaSendError>
    where
        M: Serialize,
    {
        let (topic, tag) = split_destination(destination);
        let Envelope { headers, message } = envelope;
        let payload = serde_json::to_vec(&message).map_err(KafkaSendError::serde)?;

        let mut record = FutureRecord::to(topic)
            .payload(&payload)
            .headers(record_headers(&headers, tag));
        if let Some(key) = headers.get(KEYS) {
            record = record.key(key.as_str());
        }

        let (partition, offset) = self
            .producer
            .send(record, timeout)
            .await
            .map_err(|(e, _)| KafkaSendError::kafka(e))?;

        Ok(SendResult {
            send_status: SendStatus::SendOk,
            msg_id: format!("{topic}-{partition}-{offset}"),
            message_queue: Some(MessageQueue {
                topic: topic.to_owned(),
                broker_name: BROKER_NAME.to_owned(),
                queue_id: partition,
            }),
            queue_offset: offset,
        })
    }
}

#[async_trait]
impl<M> BrokerClient<M> for KafkaBroker
where
    M: Serialize + Send + 'static,
{
    type Outcome = SendResult;
    type Error = KafkaSendError;

    async fn sync_send(
        &self,
        destination: &str,
        envelope: Envelope<Headers, M>,
    ) -> Result<SendResult, KafkaSendError> {
        self.publish(destination, envelope, Timeout::Never).await
    }

    async fn sync_send_delayed(
        &self,
        destination: &str,
        envelope: Envelope<Headers, M>,
        timeout: Duration,
        delay_level: DelayLevel,
    ) -> Result<SendResult, KafkaSendError> {
        if delay_level.level() > 0 {
            return Err(KafkaSendError::delay_unsupported(delay_level));
        }
        self.publish(destination, envelope, timeout.into()).await
    }
}

/// Split `topic:tag` into its parts. A destination without a tag is all topic.
fn split_destination(destination: &str) -> (&str, Option<&str>) {
    match destination.split_once(TAG_SEPARATOR) {
        Some((topic, tag)) => (topic, Some(tag)),
        None => (destination, None),
    }
}

fn record_headers(headers: &Headers, tag: Option<&str>) -> OwnedHeaders {
    let mut owned = OwnedHeaders::new_with_capacity(headers.len() + 1);
    for (key, value) in headers {
        owned = owned.insert(Header {
            key: key.as_str(),
            value: Some(value.as_str()),
        });
    }
    if let Some(tag) = tag {
        owned = owned.insert(Header {
            key: TAGS,
            value: Some(tag),
        });
    }
    owned
}

/// Error returned by [`KafkaBroker`].
#[derive(Debug)]
pub struct KafkaSendError {
    context: SpanTrace,
    kind: KafkaSendErrorKind,
}

/// Kafka send error kinds.
#[derive(Debug)]
pub enum KafkaSendErrorKind {
    /// The producer failed to deliver the record.
    Kafka(KafkaError),
    /// The payload could not be serialized.
    Serde(serde_json::Error),
    /// A delayed delivery was requested; Kafka cannot schedule it.
    DelayUnsupported(DelayLevel),
}

impl KafkaSendError {
    fn kafka(err: KafkaError) -> Self {
        Self {
            context: SpanTrace::capture(),
            kind: KafkaSendErrorKind::Kafka(err),
        }
    }

    fn serde(err: serde_json::Error) -> Self {
        Self {
            context: SpanTrace::capture(),
            kind: KafkaSendErrorKind::Serde(err),
        }
    }

    fn delay_unsupported(level: DelayLevel) -> Self {
        Self {
            context: SpanTrace::capture(),
            kind: KafkaSendErrorKind::DelayUnsupported(level),
        }
    }

    /// The kind of send error.
    pub fn kind(&self) -> &KafkaSendErrorKind {
        &self.kind
    }
}

impl std::fmt::Display for KafkaSendError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match &self.kind {
            KafkaSendErrorKind::Kafka(err) => writeln!(f, "Kafka error: {err}"),
            KafkaSendErrorKind::Serde(err) => writeln!(f, "Serde error: {err}"),
            KafkaSendErrorKind::DelayUnsupported(level) => {
                writeln!(f, "Kafka cannot deliver with delay level {level}")
            }
        }?;
        self.context.fmt(f)
    }
}

impl std::error::Error for KafkaSendError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match &self.kind {
            KafkaSendErrorKind::Kafka(err) => Some(err),
            KafkaSendErrorKind::Serde(err) => Some(err),
            KafkaSendErrorKind::DelayUnsupported(_) => None,
        }
    }
}
