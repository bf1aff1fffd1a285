//! Environment-aware destination resolution.
//!
//! Several environments (dev, staging, ...) can share one broker cluster by
//! suffixing every topic with the environment name. The resolver applies that
//! rule to outbound destinations and, through [`Subscription`], to the topics
//! consumers subscribe to, so both sides agree on the physical topic.
//!
//! Resolution is a pure function of its inputs and the [`IsolationConfig`]:
//! nothing is cached and nothing is validated. Feeding an already resolved
//! topic back into the resolver appends the suffix a second time, so resolve
//! exactly once per logical send.

use crate::config::IsolationConfig;

/// Separator between topic and environment suffix.
pub const ENVIRONMENT_SEPARATOR: char = '_';
/// Separator between topic and tag in a destination.
pub const TAG_SEPARATOR: char = ':';
/// Selector expression matching every tag.
pub const SELECT_ALL: &str = "*";

/// Builds physical topic and destination names.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DestinationResolver {
    isolation: IsolationConfig,
}

impl DestinationResolver {
    /// Resolver applying the given isolation settings.
    pub fn new(isolation: IsolationConfig) -> Self {
        Self { isolation }
    }

    /// Isolation settings in effect.
    pub fn isolation(&self) -> &IsolationConfig {
        &self.isolation
    }

    /// Apply the environment suffix to `topic` when isolation is in effect.
    ///
    /// An empty topic is not rejected and yields `"_<environment>"`.
    pub fn rebuild_topic(&self, topic: &str) -> String {
        match self.isolation.suffix() {
            Some(environment) => format!("{topic}{ENVIRONMENT_SEPARATOR}{environment}"),
            None => topic.to_owned(),
        }
    }

    /// Build the `<topic>[_<environment>]:<tag>` destination.
    ///
    /// An empty tag is kept as a trailing colon; the broker decides whether
    /// it is acceptable.
    pub fn build_destination(&self, topic: &str, tag: &str) -> String {
        format!("{}{TAG_SEPARATOR}{tag}", self.rebuild_topic(topic))
    }

    /// Rewrite a consumer subscription so it listens on the isolated topic.
    pub fn isolate_subscription(&self, subscription: Subscription) -> Subscription {
        Subscription {
            topic: self.rebuild_topic(&subscription.topic),
            selector_expression: subscription.selector_expression,
        }
    }
}

/// A consumer subscription: a topic and a tag selector expression.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Subscription {
    pub topic: String,
    pub selector_expression: String,
}

impl Subscription {
    /// Subscribe to every tag of `topic`.
    pub fn new(topic: impl Into<String>) -> Self {
        Self {
            topic: topic.into(),
            selector_expression: SELECT_ALL.to_owned(),
        }
    }

    /// Restrict the subscription with a tag selector such as `"created || updated"`.
    pub fn with_selector(mut self, selector_expression: impl Into<String>) -> Self {
        self.selector_expression = selector_expression.into();
        self
    }
}
