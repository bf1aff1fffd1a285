use std::collections::BTreeMap;

use crate::message::BaseMessage;

/// Header carrying the business key(s) of a message.
pub const KEYS: &str = "KEYS";

/// Routing headers attached to an envelope.
pub type Headers = BTreeMap<String, String>;

/// Wire envelope handed to a broker client.
///
/// `Envelope` bundles a message payload together with its routing headers.
/// The template always builds it the same way: the payload is the message
/// itself and the `KEYS` header carries the message's business key.
///
/// ## Design
///
/// - `H` represents message metadata (routing keys, tags, tracing information)
/// - `M` represents the actual message payload
///
/// Payload serialization is left to the broker client, so the envelope keeps
/// the typed message rather than bytes.
///
/// ## Example
///
/// ```rust
/// use mq_enhance::{Envelope, MessageMeta, envelope::KEYS};
///
/// let envelope = Envelope::for_message(MessageMeta::new("order-42"));
/// assert_eq!(envelope.business_key(), Some("order-42"));
/// assert_eq!(envelope.headers[KEYS], "order-42");
///
/// // or from headers and payload already at hand
/// let envelope: Envelope<_, _> = ("user.created", 42).into();
/// assert_eq!(envelope.message, 42);
/// ```
#[derive(Debug, Clone, PartialEq)]
pub struct Envelope<H, M> {
    /// Message metadata.
    pub headers: H,
    /// Message payload.
    pub message: M,
}

impl<H, M> From<(H, M)> for Envelope<H, M> {
    fn from(value: (H, M)) -> Self {
        Envelope {
            headers: value.0,
            message: value.1,
        }
    }
}

impl<M> Envelope<Headers, M>
where
    M: BaseMessage,
{
    /// Wrap `message` with its business key as the `KEYS` header.
    pub fn for_message(message: M) -> Self {
        let mut headers = Headers::new();
        headers.insert(KEYS.to_owned(), message.business_key().to_owned());
        Envelope { headers, message }
    }
}

impl<M> Envelope<Headers, M> {
    /// The `KEYS` header, if present.
    pub fn business_key(&self) -> Option<&str> {
        self.headers.get(KEYS).map(String::as_str)
    }

    /// Value of an arbitrary header.
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers.get(name).map(String::as_str)
    }
}
