#![doc = include_str!("../README.md")]

pub mod client;
pub mod config;
pub mod destination;
pub mod envelope;
mod message;
mod service;
mod template;

#[doc(inline)]
pub use envelope::Envelope;

#[doc(inline)]
pub use config::{ConfigError, ConfigErrorKind, EnhanceConfig, IsolationConfig};

#[doc(inline)]
pub use destination::{DestinationResolver, Subscription};

#[doc(inline)]
pub use message::{BaseMessage, MessageMeta};

#[doc(inline)]
pub use client::{BrokerClient, DelayLevel, SendResult, SendStatus};

#[doc(inline)]
pub use template::{DefaultSendHook, EnhanceTemplate, SendAttempt, SendHook};

#[doc(inline)]
pub use service::{SendRequest, Target};
