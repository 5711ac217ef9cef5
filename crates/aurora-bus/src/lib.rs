// SPDX-License-Identifier: MIT OR Apache-2.0
//! Inter-daemon messaging over an AMQP broker.
//!
//! Two topologies are used:
//!
//! * a durable **work queue** ([`QUEUE_BUILDS`]) where competing builder
//!   workers each receive a message exactly once and ack after processing;
//! * a **fan-out exchange** ([`EXCHANGE_ARCHIVES`]) where every subscriber
//!   declares its own auto-deleted exclusive queue and receives every
//!   message.
//!
//! Bodies are JSON, published with content-type `text/plain`. Delivery is
//! at-least-once; consumers are expected to be idempotent.
#![deny(unsafe_code)]

mod channel;
mod consumer;
mod publisher;

pub use channel::{Channel, Connection};
pub use consumer::{Consumer, Delivery};
pub use publisher::Publisher;

/// The builder work queue: one consumer receives each build request.
pub const QUEUE_BUILDS: &str = "builds";

/// The archive fan-out exchange: every indexer receives every notice.
pub const EXCHANGE_ARCHIVES: &str = "archives";

/// Failures talking to the broker or (de)serializing message bodies.
#[derive(Debug, thiserror::Error)]
pub enum BusError {
    /// The broker rejected or dropped an operation.
    #[error("broker error")]
    Broker(#[from] lapin::Error),

    /// A message body could not be serialized.
    #[error("unable to encode message body")]
    Encode(#[source] serde_json::Error),

    /// A message body could not be parsed as the expected type.
    #[error("unable to decode message body: {body:?}")]
    Decode {
        /// The raw body, lossily stringified for diagnostics.
        body: String,
        /// Underlying parse error.
        #[source]
        source: serde_json::Error,
    },
}

pub(crate) fn encode_body<T: serde::Serialize>(message: &T) -> Result<Vec<u8>, BusError> {
    serde_json::to_vec(message).map_err(BusError::Encode)
}

pub(crate) fn decode_body<T: serde::de::DeserializeOwned>(body: &[u8]) -> Result<T, BusError> {
    serde_json::from_slice(body).map_err(|source| BusError::Decode {
        body: String::from_utf8_lossy(body).into_owned(),
        source,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::{Deserialize, Serialize};

    #[derive(Debug, PartialEq, Serialize, Deserialize)]
    struct Probe {
        package: String,
    }

    #[test]
    fn bodies_roundtrip_as_json() {
        let body = encode_body(&Probe {
            package: "aa".into(),
        })
        .unwrap();
        assert_eq!(body, br#"{"package":"aa"}"#);

        let probe: Probe = decode_body(&body).unwrap();
        assert_eq!(probe.package, "aa");
    }

    #[test]
    fn decode_failure_preserves_body_for_diagnostics() {
        let err = decode_body::<Probe>(b"not json").unwrap_err();
        match err {
            BusError::Decode { body, .. } => assert_eq!(body, "not json"),
            other => panic!("unexpected error: {other:?}"),
        }
    }
}
