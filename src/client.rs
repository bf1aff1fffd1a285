//! Broker client abstraction and bundled backends.
//!
//! The template never talks to a broker directly. It hands a fully built
//! [`Envelope`] to a [`BrokerClient`], which owns the connection, the payload
//! serialization and the broker's own timeouts. The client's outcome and error
//! types flow back to the caller untouched.
//!
//! ## Key components
//!
//! - [`BrokerClient`]: acknowledged send primitives implemented by backends
//! - [`DelayLevel`]: the broker's coarse delivery-delay tiers
//! - [`SendResult`]: outcome type produced by the bundled backends
//! - [`InMemoryBroker`]: recording backend for tests and local pipelines
//! - `KafkaBroker` (feature `kafka`): backend over an rdkafka `FutureProducer`

mod inmemory;

#[cfg(feature = "kafka")]
pub mod kafka;

use std::time::Duration;

use serde::Serialize;

use crate::envelope::{Envelope, Headers};

pub use inmemory::{InMemoryBroker, InMemoryBrokerError, SentMessage};

/// Trait implemented by concrete broker clients.
///
/// Both operations wait until the broker acknowledges the message or the
/// client gives up. `sync_send` is bounded only by whatever timeout the client
/// applies on its own; `sync_send_delayed` receives an explicit one.
///
/// The client's lifecycle (connect, close) is managed by its owner, not by
/// the template.
#[async_trait::async_trait]
pub trait BrokerClient<M>: Send + Sync
where
    M: Send + 'static,
{
    /// Broker-specific send outcome, passed through to the caller.
    type Outcome: std::fmt::Debug + Send;
    /// Backend-specific error type, passed through to the caller.
    type Error: std::error::Error + Send + Sync + 'static;

    /// Send an envelope and wait for the broker acknowledgement.
    async fn sync_send(
        &self,
        destination: &str,
        envelope: Envelope<Headers, M>,
    ) -> Result<Self::Outcome, Self::Error>;

    /// Send an envelope for delayed delivery at `delay_level`, waiting at most
    /// `timeout` for the acknowledgement.
    async fn sync_send_delayed(
        &self,
        destination: &str,
        envelope: Envelope<Headers, M>,
        timeout: Duration,
        delay_level: DelayLevel,
    ) -> Result<Self::Outcome, Self::Error>;
}

#[async_trait::async_trait]
impl<M, C> BrokerClient<M> for std::sync::Arc<C>
where
    M: Send + 'static,
    C: BrokerClient<M> + ?Sized,
{
    type Outcome = C::Outcome;
    type Error = C::Error;

    async fn sync_send(
        &self,
        destination: &str,
        envelope: Envelope<Headers, M>,
    ) -> Result<Self::Outcome, Self::Error> {
        (**self).sync_send(destination, envelope).await
    }

    async fn sync_send_delayed(
        &self,
        destination: &str,
        envelope: Envelope<Headers, M>,
        timeout: Duration,
        delay_level: DelayLevel,
    ) -> Result<Self::Outcome, Self::Error> {
        (**self)
            .sync_send_delayed(destination, envelope, timeout, delay_level)
            .await
    }
}

/// Delivery-delay tier understood by the broker.
///
/// Brokers schedule delayed messages in a fixed set of tiers rather than for
/// arbitrary durations. The tier number is passed to the client unchanged;
/// which duration it maps to is the broker's configuration. The named
/// constants follow the default tier table.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(transparent)]
pub struct DelayLevel(i32);

/// Default tier table, indexed by `level - 1`.
const DEFAULT_DELAYS_SECS: [u64; 18] = [
    1, 5, 10, 30, 60, 120, 180, 240, 300, 360, 420, 480, 540, 600, 1200, 1800, 3600, 7200,
];

impl DelayLevel {
    pub const SECONDS_1: Self = Self(1);
    pub const SECONDS_5: Self = Self(2);
    pub const SECONDS_10: Self = Self(3);
    pub const SECONDS_30: Self = Self(4);
    pub const MINUTES_1: Self = Self(5);
    pub const MINUTES_2: Self = Self(6);
    pub const MINUTES_3: Self = Self(7);
    pub const MINUTES_4: Self = Self(8);
    pub const MINUTES_5: Self = Self(9);
    pub const MINUTES_6: Self = Self(10);
    pub const MINUTES_7: Self = Self(11);
    pub const MINUTES_8: Self = Self(12);
    pub const MINUTES_9: Self = Self(13);
    pub const MINUTES_10: Self = Self(14);
    pub const MINUTES_20: Self = Self(15);
    pub const MINUTES_30: Self = Self(16);
    pub const HOURS_1: Self = Self(17);
    pub const HOURS_2: Self = Self(18);

    /// Wrap a raw tier number. Not validated; the broker decides.
    pub const fn new(level: i32) -> Self {
        Self(level)
    }

    pub const fn level(self) -> i32 {
        self.0
    }

    /// Delay of this tier under the default broker tier table.
    pub fn nominal_delay(self) -> Option<Duration> {
        let index = usize::try_from(self.0).ok()?.checked_sub(1)?;
        DEFAULT_DELAYS_SECS
            .get(index)
            .copied()
            .map(Duration::from_secs)
    }
}

impl From<i32> for DelayLevel {
    fn from(level: i32) -> Self {
        Self(level)
    }
}

impl std::fmt::Display for DelayLevel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Send outcome reported by the bundled backends.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SendResult {
    pub send_status: SendStatus,
    pub msg_id: String,
    pub message_queue: Option<MessageQueue>,
    pub queue_offset: i64,
}

/// Broker-side status of an acknowledged send.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum SendStatus {
    SendOk,
    FlushDiskTimeout,
    FlushSlaveTimeout,
    SlaveNotAvailable,
}

/// Queue that received a message.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MessageQueue {
    pub topic: String,
    pub broker_name: String,
    pub queue_id: i32,
}
