//! Tower integration.
//!
//! [`EnhanceTemplate`] implements `tower::Service<SendRequest<M>>`, so a
//! template can sit at the bottom of a Tower stack. Middleware such as
//! timeouts, rate limits or caller-side retries is composed around it with
//! ordinary Tower layers; the template itself still performs exactly one
//! send per request.
//!
//! Errors are the broker client's own error type, unchanged.

use std::{
    future::Future,
    pin::Pin,
    task::{Context, Poll},
};

use serde::Serialize;
use tower::Service;

use crate::{
    client::{BrokerClient, DelayLevel},
    message::BaseMessage,
    template::{EnhanceTemplate, SendHook},
};

/// Where a [`SendRequest`] goes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Target {
    /// A destination used verbatim.
    Destination(String),
    /// A logical topic and tag, resolved with environment isolation.
    Topic { topic: String, tag: String },
}

/// A message to send through the template's `Service` implementation.
#[derive(Debug, Clone, PartialEq)]
pub struct SendRequest<M> {
    pub target: Target,
    pub message: M,
    /// Delayed delivery tier; `None` sends immediately.
    pub delay_level: Option<DelayLevel>,
}

impl<M> SendRequest<M> {
    /// Send to a raw destination, which is used verbatim.
    pub fn to_destination(destination: impl Into<String>, message: M) -> Self {
        Self {
            target: Target::Destination(destination.into()),
            message,
            delay_level: None,
        }
    }

    /// Send to a logical topic and tag, isolated before sending.
    pub fn to_topic(topic: impl Into<String>, tag: impl Into<String>, message: M) -> Self {
        Self {
            target: Target::Topic {
                topic: topic.into(),
                tag: tag.into(),
            },
            message,
            delay_level: None,
        }
    }

    /// Deliver after `delay_level` instead of immediately.
    pub fn delayed(mut self, delay_level: DelayLevel) -> Self {
        self.delay_level = Some(delay_level);
        self
    }
}

impl<C, HK> EnhanceTemplate<C, HK>
where
    HK: SendHook,
{
    /// Route a [`SendRequest`] to the matching send operation.
    pub async fn dispatch<M>(&self, request: SendRequest<M>) -> Result<C::Outcome, C::Error>
    where
        M: BaseMessage + Serialize + Send + 'static,
        C: BrokerClient<M>,
    {
        let SendRequest {
            target,
            message,
            delay_level,
        } = request;

        match (target, delay_level) {
            (Target::Destination(destination), None) => self.send(&destination, message).await,
            (Target::Destination(destination), Some(level)) => {
                self.send_delay(&destination, message, level).await
            }
            (Target::Topic { topic, tag }, None) => self.send_to(&topic, &tag, message).await,
            (Target::Topic { topic, tag }, Some(level)) => {
                self.send_delay_to(&topic, &tag, message, level).await
            }
        }
    }
}

/// `tower::Service` implementation delegating to [`EnhanceTemplate::dispatch`].
///
/// The template is always ready; readiness is the broker client's concern.
impl<C, HK, M> Service<SendRequest<M>> for EnhanceTemplate<C, HK>
where
    C: BrokerClient<M> + Clone + 'static,
    C::Outcome: 'static,
    HK: SendHook + Clone + 'static,
    M: BaseMessage + Serialize + Send + 'static,
{
    type Response = C::Outcome;
    type Error = C::Error;
    type Future = Pin<Box<dyn Future<Output = Result<Self::Response, Self::Error>> + Send>>;

    fn poll_ready(&mut self, _cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        Poll::Ready(Ok(()))
    }

    fn call(&mut self, req: SendRequest<M>) -> Self::Future {
        let template = self.clone();
        Box::pin(async move { template.dispatch(req).await })
    }
}
