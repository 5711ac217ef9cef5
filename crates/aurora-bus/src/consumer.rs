// SPDX-License-Identifier: MIT OR Apache-2.0

use crate::{BusError, decode_body};
use futures::StreamExt;
use lapin::options::{BasicAckOptions, BasicRejectOptions};
use tracing::error;

/// Receives deliveries from a queue or a private exchange binding.
pub struct Consumer {
    inner: lapin::Consumer,
}

impl Consumer {
    pub(crate) fn new(inner: lapin::Consumer) -> Self {
        Self { inner }
    }

    /// Wait for the next delivery.
    ///
    /// `None` means the channel is gone; callers treat it as shutdown.
    pub async fn consume(&mut self) -> Option<Delivery> {
        match self.inner.next().await? {
            Ok(delivery) => Some(Delivery { inner: delivery }),
            Err(err) => {
                error!(error = %err, "consumer stream error, treating channel as closed");
                None
            }
        }
    }
}

/// One received message; must be acked or rejected exactly once.
pub struct Delivery {
    inner: lapin::message::Delivery,
}

impl Delivery {
    /// The raw message body.
    pub fn body(&self) -> &[u8] {
        &self.inner.data
    }

    /// Parse the JSON body into `T`.
    pub fn decode<T: serde::de::DeserializeOwned>(&self) -> Result<T, BusError> {
        decode_body(&self.inner.data)
    }

    /// Acknowledge successful processing.
    pub async fn ack(&self) -> Result<(), BusError> {
        self.inner.ack(BasicAckOptions::default()).await?;
        Ok(())
    }

    /// Reject without requeueing; the message is dropped (or dead-lettered
    /// by broker policy).
    pub async fn reject(&self) -> Result<(), BusError> {
        self.inner
            .reject(BasicRejectOptions { requeue: false })
            .await?;
        Ok(())
    }
}
