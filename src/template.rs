//! Uniform send operations over a broker client.
//!
//! [`EnhanceTemplate`] wraps a [`BrokerClient`] and:
//!
//! - Resolves logical topic and tag pairs into environment-isolated destinations
//! - Builds every envelope the same way (payload plus `KEYS` header)
//! - Waits for the broker acknowledgement, with the configured timeout on
//!   delayed sends
//! - Reports every attempt, successful or not, to a [`SendHook`]
//!
//! The template adds convenience, not resilience: there are no retries and
//! the client's outcome and error are returned exactly as the client produced
//! them.

use std::time::Duration;

use serde::Serialize;

use crate::{
    client::{BrokerClient, DelayLevel},
    config::EnhanceConfig,
    destination::DestinationResolver,
    envelope::Envelope,
    message::BaseMessage,
};

/// Send template over a broker client.
///
/// Generic parameters:
/// - `C`: broker client
/// - `HK`: hook notified of every send attempt
///
/// All operations take `&self`; a template can be shared across tasks.
#[derive(Debug, Clone)]
pub struct EnhanceTemplate<C, HK = DefaultSendHook> {
    client: C,
    resolver: DestinationResolver,
    send_timeout: Duration,
    hook: HK,
}

impl<C> EnhanceTemplate<C, DefaultSendHook> {
    /// Create a template with the default logging hook.
    pub fn new(client: C, config: &EnhanceConfig) -> Self {
        Self {
            client,
            resolver: DestinationResolver::new(config.isolation.clone()),
            send_timeout: config.send_timeout(),
            hook: DefaultSendHook,
        }
    }
}

impl<C, HK> EnhanceTemplate<C, HK> {
    /// Replace the send hook while keeping the client and configuration.
    pub fn with_hook<HK2: SendHook>(self, hook: HK2) -> EnhanceTemplate<C, HK2> {
        EnhanceTemplate {
            client: self.client,
            resolver: self.resolver,
            send_timeout: self.send_timeout,
            hook,
        }
    }

    /// The underlying broker client, for operations the template does not wrap.
    pub fn client(&self) -> &C {
        &self.client
    }

    /// The resolver applying this template's isolation settings.
    pub fn resolver(&self) -> &DestinationResolver {
        &self.resolver
    }

    /// Timeout handed to the client on delayed sends.
    pub fn send_timeout(&self) -> Duration {
        self.send_timeout
    }

    /// See [`DestinationResolver::build_destination`].
    pub fn build_destination(&self, topic: &str, tag: &str) -> String {
        self.resolver.build_destination(topic, tag)
    }
}

impl<C, HK> EnhanceTemplate<C, HK>
where
    HK: SendHook,
{
    /// Send `message` to `topic`, filtered by `tag`, after isolation.
    pub async fn send_to<M>(
        &self,
        topic: &str,
        tag: &str,
        message: M,
    ) -> Result<C::Outcome, C::Error>
    where
        M: BaseMessage + Serialize + Send + 'static,
        C: BrokerClient<M>,
    {
        let destination = self.resolver.build_destination(topic, tag);
        self.send(&destination, message).await
    }

    /// Send `message` to a destination used verbatim.
    #[tracing::instrument(skip_all, fields(destination = %destination))]
    pub async fn send<M>(&self, destination: &str, message: M) -> Result<C::Outcome, C::Error>
    where
        M: BaseMessage + Serialize + Send + 'static,
        C: BrokerClient<M>,
    {
        let content = audit_content(&message);
        let envelope = Envelope::for_message(message);

        let result = self.client.sync_send(destination, envelope).await;
        self.report(destination, None, &content, &result);
        result
    }

    /// Send `message` to `topic`, filtered by `tag`, for delivery after
    /// `delay_level`.
    pub async fn send_delay_to<M>(
        &self,
        topic: &str,
        tag: &str,
        message: M,
        delay_level: DelayLevel,
    ) -> Result<C::Outcome, C::Error>
    where
        M: BaseMessage + Serialize + Send + 'static,
        C: BrokerClient<M>,
    {
        let destination = self.resolver.build_destination(topic, tag);
        self.send_delay(&destination, message, delay_level).await
    }

    /// Send `message` to a destination used verbatim, for delivery after
    /// `delay_level`, waiting at most the configured send timeout.
    #[tracing::instrument(skip_all, fields(destination = %destination, delay_level = %delay_level))]
    pub async fn send_delay<M>(
        &self,
        destination: &str,
        message: M,
        delay_level: DelayLevel,
    ) -> Result<C::Outcome, C::Error>
    where
        M: BaseMessage + Serialize + Send + 'static,
        C: BrokerClient<M>,
    {
        let content = audit_content(&message);
        let envelope = Envelope::for_message(message);

        let result = self
            .client
            .sync_send_delayed(destination, envelope, self.send_timeout, delay_level)
            .await;
        self.report(destination, Some(delay_level), &content, &result);
        result
    }

    fn report<O, E>(
        &self,
        destination: &str,
        delay_level: Option<DelayLevel>,
        content: &str,
        result: &Result<O, E>,
    ) where
        O: std::fmt::Debug,
        E: std::error::Error,
    {
        let attempt = SendAttempt {
            destination,
            delay_level,
            content,
        };
        match result {
            Ok(outcome) => self.hook.on_send_success(&attempt, outcome),
            Err(error) => self.hook.on_send_failure(&attempt, error),
        }
    }
}

/// JSON rendering of the message for the audit record.
///
/// Serialization problems are reported in place of the content; they never
/// fail the send itself.
fn audit_content<M: Serialize>(message: &M) -> String {
    serde_json::to_string(message).unwrap_or_else(|err| format!("<unserializable: {err}>"))
}

/// A single send attempt as seen by a [`SendHook`].
#[derive(Debug, Clone, Copy)]
pub struct SendAttempt<'a> {
    pub destination: &'a str,
    /// Set for delayed sends only.
    pub delay_level: Option<DelayLevel>,
    /// JSON serialization of the message.
    pub content: &'a str,
}

/// Hook trait for observing send attempts.
///
/// Exactly one method is called per attempt. Hooks are invoked synchronously
/// and should avoid heavy or blocking work. Typical use cases include
/// logging, metrics and audit trails.
pub trait SendHook: Send + Sync {
    fn on_send_success(&self, attempt: &SendAttempt<'_>, outcome: &dyn std::fmt::Debug);
    fn on_send_failure(&self, attempt: &SendAttempt<'_>, error: &dyn std::error::Error);
}

/// Default send hook.
///
/// Logs every attempt using `tracing`: successes at info level, failures at
/// error level. Records carry `destination`, `content` (message JSON),
/// `delay_level` for delayed sends, and `outcome` or `error`.
#[derive(Debug, Clone, Copy, Default)]
pub struct DefaultSendHook;

impl SendHook for DefaultSendHook {
    fn on_send_success(&self, attempt: &SendAttempt<'_>, outcome: &dyn std::fmt::Debug) {
        match attempt.delay_level {
            Some(delay_level) => tracing::info!(
                destination = attempt.destination,
                %delay_level,
                content = attempt.content,
                ?outcome,
                "Delayed message sent",
            ),
            None => tracing::info!(
                destination = attempt.destination,
                content = attempt.content,
                ?outcome,
                "Message sent",
            ),
        }
    }

    fn on_send_failure(&self, attempt: &SendAttempt<'_>, error: &dyn std::error::Error) {
        match attempt.delay_level {
            Some(delay_level) => tracing::error!(
                destination = attempt.destination,
                %delay_level,
                content = attempt.content,
                %error,
                "Delayed message send failed",
            ),
            None => tracing::error!(
                destination = attempt.destination,
                content = attempt.content,
                %error,
                "Message send failed",
            ),
        }
    }
}

impl<T> SendHook for std::sync::Arc<T>
where
    T: SendHook + ?Sized,
{
    fn on_send_success(&self, attempt: &SendAttempt<'_>, outcome: &dyn std::fmt::Debug) {
        (**self).on_send_success(attempt, outcome);
    }

    fn on_send_failure(&self, attempt: &SendAttempt<'_>, error: &dyn std::error::Error) {
        (**self).on_send_failure(attempt, error);
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use std::sync::{Arc, Mutex};

    use super::*;
    use crate::{
        client::{InMemoryBroker, SendStatus},
        config::IsolationConfig,
        envelope::KEYS,
        message::MessageMeta,
    };

    #[derive(Debug, Clone, PartialEq, Serialize)]
    pub(crate) struct OrderCreated {
        #[serde(flatten)]
        pub(crate) meta: MessageMeta,
        pub(crate) order_id: u64,
    }

    impl AsRef<MessageMeta> for OrderCreated {
        fn as_ref(&self) -> &MessageMeta {
            &self.meta
        }
    }

    pub(crate) fn order(key: &str) -> OrderCreated {
        OrderCreated {
            meta: MessageMeta::new(key).with_source("checkout"),
            order_id: 42,
        }
    }

    /// What a hook saw for one attempt.
    #[derive(Debug, Clone, PartialEq)]
    pub(crate) enum Recorded {
        Success {
            destination: String,
            delay_level: Option<DelayLevel>,
            content: String,
            outcome: String,
        },
        Failure {
            destination: String,
            delay_level: Option<DelayLevel>,
            error: String,
        },
    }

    #[derive(Clone, Default)]
    pub(crate) struct RecordingHook {
        pub(crate) records: Arc<Mutex<Vec<Recorded>>>,
    }

    impl RecordingHook {
        pub(crate) fn take(&self) -> Vec<Recorded> {
            std::mem::take(&mut *self.records.lock().unwrap())
        }
    }

    impl SendHook for RecordingHook {
        fn on_send_success(&self, attempt: &SendAttempt<'_>, outcome: &dyn std::fmt::Debug) {
            self.records.lock().unwrap().push(Recorded::Success {
                destination: attempt.destination.to_owned(),
                delay_level: attempt.delay_level,
                content: attempt.content.to_owned(),
                outcome: format!("{outcome:?}"),
            });
        }

        fn on_send_failure(&self, attempt: &SendAttempt<'_>, error: &dyn std::error::Error) {
            self.records.lock().unwrap().push(Recorded::Failure {
                destination: attempt.destination.to_owned(),
                delay_level: attempt.delay_level,
                error: error.to_string(),
            });
        }
    }

    fn template(
        isolation: IsolationConfig,
    ) -> (
        EnhanceTemplate<InMemoryBroker<OrderCreated>, RecordingHook>,
        InMemoryBroker<OrderCreated>,
        RecordingHook,
    ) {
        let broker = InMemoryBroker::default();
        let hook = RecordingHook::default();
        let template = EnhanceTemplate::new(broker.clone(), &EnhanceConfig::new(isolation))
            .with_hook(hook.clone());
        (template, broker, hook)
    }

    #[tokio::test]
    async fn send_to_uses_resolved_destination_and_business_key() {
        let (template, broker, _) = template(IsolationConfig::isolated("staging"));

        let outcome = template
            .send_to("orders", "created", order("order-42"))
            .await
            .unwrap();
        assert_eq!(outcome.send_status, SendStatus::SendOk);

        let sent = broker.sent_messages().await;
        assert_eq!(sent.len(), 1);
        assert_eq!(
            sent[0].destination,
            template.build_destination("orders", "created")
        );
        assert_eq!(sent[0].destination, "orders_staging:created");
        assert_eq!(sent[0].envelope.headers.get(KEYS).unwrap(), "order-42");
        assert_eq!(sent[0].envelope.message.order_id, 42);
        assert_eq!(sent[0].envelope.message.meta.source, "checkout");
        assert_eq!(sent[0].timeout, None);
        assert_eq!(sent[0].delay_level, None);
    }

    #[tokio::test]
    async fn send_without_isolation_keeps_topic() {
        let (template, broker, _) = template(IsolationConfig::disabled());

        template
            .send_to("orders", "created", order("order-1"))
            .await
            .unwrap();

        let sent = broker.sent_messages().await;
        assert_eq!(sent[0].destination, "orders:created");
    }

    #[tokio::test]
    async fn send_uses_destination_verbatim() {
        let (template, broker, _) = template(IsolationConfig::isolated("staging"));

        template
            .send("already_resolved:tag", order("order-1"))
            .await
            .unwrap();

        let sent = broker.sent_messages().await;
        assert_eq!(sent[0].destination, "already_resolved:tag");
    }

    #[tokio::test]
    async fn send_delay_passes_timeout_and_level_unmodified() {
        let broker = InMemoryBroker::<OrderCreated>::default();
        let config = EnhanceConfig::new(IsolationConfig::disabled())
            .with_send_timeout(Duration::from_millis(1234));
        let template = EnhanceTemplate::new(broker.clone(), &config);

        template
            .send_delay("orders:remind", order("order-1"), DelayLevel::new(7))
            .await
            .unwrap();
        template
            .send_delay_to("orders", "expire", order("order-2"), DelayLevel::HOURS_2)
            .await
            .unwrap();

        let sent = broker.sent_messages().await;
        assert_eq!(sent[0].destination, "orders:remind");
        assert_eq!(sent[0].timeout, Some(Duration::from_millis(1234)));
        assert_eq!(sent[0].delay_level, Some(DelayLevel::new(7)));
        assert_eq!(sent[1].destination, "orders:expire");
        assert_eq!(sent[1].delay_level, Some(DelayLevel::HOURS_2));
        assert_eq!(sent[1].envelope.business_key(), Some("order-2"));
    }

    #[tokio::test]
    async fn default_send_timeout_is_three_seconds() {
        let template = EnhanceTemplate::new(
            InMemoryBroker::<OrderCreated>::default(),
            &EnhanceConfig::default(),
        );
        assert_eq!(template.send_timeout(), Duration::from_millis(3000));
    }

    #[tokio::test]
    async fn successful_send_reports_once_with_content_and_outcome() {
        let (template, _, hook) = template(IsolationConfig::disabled());

        let outcome = template
            .send_to("orders", "created", order("order-42"))
            .await
            .unwrap();

        let records = hook.take();
        assert_eq!(records.len(), 1);
        match &records[0] {
            Recorded::Success {
                destination,
                delay_level,
                content,
                outcome: logged,
            } => {
                assert_eq!(destination, "orders:created");
                assert_eq!(*delay_level, None);
                let json: serde_json::Value = serde_json::from_str(content).unwrap();
                assert_eq!(json["key"], "order-42");
                assert_eq!(json["source"], "checkout");
                assert_eq!(json["order_id"], 42);
                assert_eq!(logged, &format!("{outcome:?}"));
            }
            other => panic!("unexpected record {other:?}"),
        }
    }

    #[tokio::test]
    async fn broker_error_propagates_unchanged_without_retry() {
        let broker = InMemoryBroker::<OrderCreated>::failing("connection refused");
        let hook = RecordingHook::default();
        let template = EnhanceTemplate::new(broker.clone(), &EnhanceConfig::default())
            .with_hook(hook.clone());

        let err = template
            .send_to("orders", "created", order("order-42"))
            .await
            .unwrap_err();

        assert_eq!(err.reason(), "connection refused");
        assert_eq!(err.destination(), "orders:created");
        assert_eq!(broker.attempts(), 1);

        let records = hook.take();
        assert_eq!(records.len(), 1);
        assert!(matches!(
            &records[0],
            Recorded::Failure { destination, delay_level: None, error }
                if destination == "orders:created" && error.contains("connection refused")
        ));
    }

    #[tokio::test]
    async fn delayed_failure_reports_delay_level() {
        let broker = InMemoryBroker::<OrderCreated>::failing("timeout");
        let hook = RecordingHook::default();
        let template =
            EnhanceTemplate::new(broker, &EnhanceConfig::default()).with_hook(hook.clone());

        let result = template
            .send_delay("orders:remind", order("order-1"), DelayLevel::MINUTES_5)
            .await;
        assert!(result.is_err());

        assert!(matches!(
            hook.take().as_slice(),
            [Recorded::Failure { delay_level: Some(level), .. }] if *level == DelayLevel::MINUTES_5
        ));
    }

    #[tokio::test]
    async fn template_is_shareable_across_tasks() {
        let broker = InMemoryBroker::<OrderCreated>::default();
        let template = Arc::new(EnhanceTemplate::new(
            broker.clone(),
            &EnhanceConfig::new(IsolationConfig::isolated("dev")),
        ));

        let handles: Vec<_> = (0..8)
            .map(|i| {
                let template = Arc::clone(&template);
                tokio::spawn(async move {
                    template
                        .send_to("orders", "created", order(&format!("order-{i}")))
                        .await
                })
            })
            .collect();
        for handle in handles {
            handle.await.unwrap().unwrap();
        }

        let sent = broker.sent_messages().await;
        assert_eq!(sent.len(), 8);
        assert!(sent.iter().all(|m| m.destination == "orders_dev:created"));
    }

    #[test]
    fn audit_content_reports_serialization_failures() {
        struct Broken;

        impl Serialize for Broken {
            fn serialize<S: serde::Serializer>(&self, _: S) -> Result<S::Ok, S::Error> {
                Err(serde::ser::Error::custom("boom"))
            }
        }

        assert_eq!(audit_content(&Broken), "<unserializable: boom>");
    }

    /// Fields of one captured `tracing` event.
    #[derive(Debug, Default)]
    struct CapturedEvent {
        level: Option<tracing::Level>,
        fields: std::collections::BTreeMap<String, String>,
    }

    impl tracing::field::Visit for CapturedEvent {
        fn record_str(&mut self, field: &tracing::field::Field, value: &str) {
            self.fields.insert(field.name().to_owned(), value.to_owned());
        }

        fn record_debug(&mut self, field: &tracing::field::Field, value: &dyn std::fmt::Debug) {
            self.fields
                .insert(field.name().to_owned(), format!("{value:?}"));
        }
    }

    #[derive(Clone, Default)]
    struct CaptureLayer {
        events: Arc<Mutex<Vec<CapturedEvent>>>,
    }

    impl<S: tracing::Subscriber> tracing_subscriber::Layer<S> for CaptureLayer {
        fn on_event(
            &self,
            event: &tracing::Event<'_>,
            _ctx: tracing_subscriber::layer::Context<'_, S>,
        ) {
            let mut captured = CapturedEvent {
                level: Some(*event.metadata().level()),
                ..CapturedEvent::default()
            };
            event.record(&mut captured);
            self.events.lock().unwrap().push(captured);
        }
    }

    fn capture_default_hook(report: impl FnOnce(&DefaultSendHook)) -> Vec<CapturedEvent> {
        use tracing_subscriber::layer::SubscriberExt as _;

        let layer = CaptureLayer::default();
        let subscriber = tracing_subscriber::registry().with(layer.clone());
        tracing::subscriber::with_default(subscriber, || report(&DefaultSendHook));

        std::mem::take(&mut *layer.events.lock().unwrap())
    }

    const CONTENT: &str = r#"{"key":"order-42"}"#;

    #[test]
    fn default_hook_logs_success_at_info() {
        let events = capture_default_hook(|hook| {
            let attempt = SendAttempt {
                destination: "orders_staging:created",
                delay_level: None,
                content: CONTENT,
            };
            hook.on_send_success(&attempt, &"SEND_OK");
        });

        assert_eq!(events.len(), 1);
        let event = &events[0];
        assert_eq!(event.level, Some(tracing::Level::INFO));
        assert_eq!(event.fields["destination"], "orders_staging:created");
        assert_eq!(event.fields["content"], CONTENT);
        assert_eq!(event.fields["outcome"], "\"SEND_OK\"");
        assert_eq!(event.fields["message"], "Message sent");
        assert!(!event.fields.contains_key("delay_level"));
    }

    #[test]
    fn default_hook_logs_delayed_success_with_level() {
        let events = capture_default_hook(|hook| {
            let attempt = SendAttempt {
                destination: "orders:remind",
                delay_level: Some(DelayLevel::MINUTES_30),
                content: CONTENT,
            };
            hook.on_send_success(&attempt, &"SEND_OK");
        });

        assert_eq!(events.len(), 1);
        let event = &events[0];
        assert_eq!(event.level, Some(tracing::Level::INFO));
        assert_eq!(event.fields["destination"], "orders:remind");
        assert_eq!(event.fields["delay_level"], "16");
        assert_eq!(event.fields["content"], CONTENT);
        assert!(event.fields.contains_key("outcome"));
    }

    #[test]
    fn default_hook_logs_failures_at_error() {
        let error = std::io::Error::other("connection refused");

        let events = capture_default_hook(|hook| {
            let attempt = SendAttempt {
                destination: "orders:created",
                delay_level: None,
                content: CONTENT,
            };
            hook.on_send_failure(&attempt, &error);
        });

        assert_eq!(events.len(), 1);
        let event = &events[0];
        assert_eq!(event.level, Some(tracing::Level::ERROR));
        assert_eq!(event.fields["destination"], "orders:created");
        assert_eq!(event.fields["content"], CONTENT);
        assert_eq!(event.fields["error"], "connection refused");
        assert!(!event.fields.contains_key("outcome"));
        assert!(!event.fields.contains_key("delay_level"));
    }

    #[test]
    fn default_hook_logs_delayed_failures_with_level() {
        let error = std::io::Error::other("timeout");

        let events = capture_default_hook(|hook| {
            let attempt = SendAttempt {
                destination: "orders:remind",
                delay_level: Some(DelayLevel::new(3)),
                content: CONTENT,
            };
            hook.on_send_failure(&attempt, &error);
        });

        assert_eq!(events.len(), 1);
        let event = &events[0];
        assert_eq!(event.level, Some(tracing::Level::ERROR));
        assert_eq!(event.fields["delay_level"], "3");
        assert_eq!(event.fields["error"], "timeout");
    }
}
