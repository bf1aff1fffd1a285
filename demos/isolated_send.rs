use mq_enhance::client::InMemoryBroker;
use mq_enhance::{DelayLevel, EnhanceConfig, EnhanceTemplate, MessageMeta, Subscription};
use serde::Serialize;
use tracing_error::ErrorLayer;
use tracing_subscriber::EnvFilter;
use tracing_subscriber::prelude::*;

#[derive(Clone, Debug, Serialize)]
struct OrderCreated {
    #[serde(flatten)]
    meta: MessageMeta,
    order_id: u64,
    amount_cents: u64,
}

impl AsRef<MessageMeta> for OrderCreated {
    fn as_ref(&self) -> &MessageMeta {
        &self.meta
    }
}

impl OrderCreated {
    fn new(order_id: u64, amount_cents: u64) -> Self {
        Self {
            meta: MessageMeta::new(format!("order-{order_id}")).with_source("demo"),
            order_id,
            amount_cents,
        }
    }
}

#[tokio::main]
async fn main() {
    dotenv::dotenv().ok();

    let fmt_layer = tracing_subscriber::fmt::layer().with_target(false);
    tracing_subscriber::registry()
        .with(fmt_layer)
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with(ErrorLayer::default())
        .init();

    let config = EnhanceConfig::from_env().expect("invalid MQ_ENHANCE_* configuration");

    let consumer = mq_enhance::DestinationResolver::new(config.isolation.clone())
        .isolate_subscription(Subscription::new("orders").with_selector("created || remind"));
    tracing::info!(
        topic = %consumer.topic,
        selector = %consumer.selector_expression,
        "Consumer subscription",
    );

    let broker = InMemoryBroker::default();
    let template = EnhanceTemplate::new(broker.clone(), &config);

    for id in 1..=3 {
        template
            .send_to("orders", "created", OrderCreated::new(id, id * 1000))
            .await
            .expect("in-memory send failed");
    }

    template
        .send_delay_to(
            "orders",
            "remind",
            OrderCreated::new(1, 1000),
            DelayLevel::MINUTES_30,
        )
        .await
        .expect("in-memory send failed");

    let failing = EnhanceTemplate::new(InMemoryBroker::failing("broker offline"), &config);
    if let Err(error) = failing
        .send_to("orders", "created", OrderCreated::new(4, 4000))
        .await
    {
        tracing::warn!(%error, "Send failed as expected");
    }

    for sent in broker.sent_messages().await {
        println!(
            "{} keys={:?} delay={:?}",
            sent.destination,
            sent.envelope.business_key(),
            sent.delay_level,
        );
    }
}
