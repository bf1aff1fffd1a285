//! The message contract shared by everything sent through the template.
//!
//! Any type exposing a business key, a source, a send time and a retry count
//! can be sent. [`MessageMeta`] bundles those four fields with their defaults
//! so concrete messages can embed it instead of repeating them:
//!
//! ```rust
//! use mq_enhance::{BaseMessage, MessageMeta};
//! use serde::Serialize;
//!
//! #[derive(Serialize)]
//! struct OrderCreated {
//!     #[serde(flatten)]
//!     meta: MessageMeta,
//!     order_id: u64,
//! }
//!
//! impl AsRef<MessageMeta> for OrderCreated {
//!     fn as_ref(&self) -> &MessageMeta {
//!         &self.meta
//!     }
//! }
//!
//! let msg = OrderCreated {
//!     meta: MessageMeta::new("order-42"),
//!     order_id: 42,
//! };
//! assert_eq!(msg.business_key(), "order-42");
//! assert_eq!(msg.retry_count(), 0);
//! ```

use chrono::{DateTime, Local};
use serde::{Deserialize, Serialize};

/// Accessors every sendable message provides.
pub trait BaseMessage {
    /// Unique business key, used as the broker's `KEYS` header for tracing
    /// a message in the broker console.
    fn business_key(&self) -> &str;

    /// Identifier of the sending component.
    fn source(&self) -> &str;

    /// When the message was created for sending.
    fn sent_at(&self) -> DateTime<Local>;

    /// How many times the caller has retried this message.
    ///
    /// Advisory only; never read or incremented by this crate.
    fn retry_count(&self) -> u32;
}

/// Standard message metadata with the usual defaults.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MessageMeta {
    pub key: String,
    #[serde(default)]
    pub source: String,
    #[serde(default = "Local::now")]
    pub send_time: DateTime<Local>,
    #[serde(default)]
    pub retry_times: u32,
}

impl MessageMeta {
    /// Metadata for `key`, sent now, with an empty source and no retries.
    pub fn new(key: impl Into<String>) -> Self {
        Self {
            key: key.into(),
            source: String::new(),
            send_time: Local::now(),
            retry_times: 0,
        }
    }

    /// Set the producing service.
    pub fn with_source(mut self, source: impl Into<String>) -> Self {
        self.source = source.into();
        self
    }

    /// Set how many times this message has already been retried.
    pub fn with_retry_times(mut self, retry_times: u32) -> Self {
        self.retry_times = retry_times;
        self
    }

    /// Override the creation time, which defaults to now.
    pub fn with_send_time(mut self, send_time: DateTime<Local>) -> Self {
        self.send_time = send_time;
        self
    }
}

impl BaseMessage for MessageMeta {
    fn business_key(&self) -> &str {
        &self.key
    }

    fn source(&self) -> &str {
        &self.source
    }

    fn sent_at(&self) -> DateTime<Local> {
        self.send_time
    }

    fn retry_count(&self) -> u32 {
        self.retry_times
    }
}

/// Messages embedding [`MessageMeta`] get the contract by exposing it.
impl<T> BaseMessage for T
where
    T: AsRef<MessageMeta>,
{
    fn business_key(&self) -> &str {
        &self.as_ref().key
    }

    fn source(&self) -> &str {
        &self.as_ref().source
    }

    fn sent_at(&self) -> DateTime<Local> {
        self.as_ref().send_time
    }

    fn retry_count(&self) -> u32 {
        self.as_ref().retry_times
    }
}
