// SPDX-License-Identifier: MIT OR Apache-2.0

use crate::{BusError, encode_body};
use lapin::BasicProperties;
use lapin::options::BasicPublishOptions;

/// Publishes JSON messages to a queue or exchange.
pub struct Publisher {
    channel: lapin::Channel,
    exchange: String,
    routing_key: String,
}

impl Publisher {
    pub(crate) fn to_queue(channel: lapin::Channel, queue: &str) -> Self {
        // Queue publishes go through the default exchange with the queue
        // name as the routing key.
        Self {
            channel,
            exchange: String::new(),
            routing_key: queue.to_string(),
        }
    }

    pub(crate) fn to_exchange(channel: lapin::Channel, exchange: &str) -> Self {
        Self {
            channel,
            exchange: exchange.to_string(),
            routing_key: String::new(),
        }
    }

    /// Serialize `message` and publish it.
    pub async fn publish<T: serde::Serialize>(&self, message: &T) -> Result<(), BusError> {
        let body = encode_body(message)?;

        self.channel
            .basic_publish(
                &self.exchange,
                &self.routing_key,
                BasicPublishOptions::default(),
                &body,
                BasicProperties::default().with_content_type("text/plain".into()),
            )
            .await?
            .await?;

        Ok(())
    }
}
