// SPDX-License-Identifier: MIT OR Apache-2.0

use crate::wire::{RpcRequest, RpcResponse};
use serde::Serialize;
use serde::de::DeserializeOwned;
use serde_json::Value;
use std::sync::atomic::{AtomicI64, Ordering};

/// Failures on the client side of an RPC call.
#[derive(Debug, thiserror::Error)]
pub enum ClientError {
    /// The request could not be delivered.
    #[error("unable to reach rpc server")]
    Transport(#[from] reqwest::Error),

    /// The server answered outside the JSON-RPC envelope.
    #[error("rpc server returned http status {status}")]
    Http {
        /// The offending status code.
        status: u16,
    },

    /// The response envelope or result could not be decoded.
    #[error("unable to decode rpc response")]
    Protocol(#[from] serde_json::Error),

    /// The server returned a JSON-RPC error object.
    #[error("{message}")]
    Server {
        /// JSON-RPC error code.
        code: i64,
        /// Server-provided description.
        message: String,
    },
}

/// A JSON-RPC 2.0 client for the facade.
pub struct RpcClient {
    http: reqwest::Client,
    address: String,
    next_id: AtomicI64,
}

impl RpcClient {
    /// A client calling the facade at `address` (the full `…/rpc/` URL).
    pub fn new(address: impl Into<String>) -> Self {
        Self {
            http: reqwest::Client::new(),
            address: address.into(),
            next_id: AtomicI64::new(1),
        }
    }

    /// Call `method` with `request` and decode the typed response.
    pub async fn call<Req, Resp>(&self, method: &str, request: &Req) -> Result<Resp, ClientError>
    where
        Req: Serialize,
        Resp: DeserializeOwned,
    {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let envelope = RpcRequest {
            jsonrpc: "2.0".into(),
            method: method.to_string(),
            params: serde_json::to_value(request)?,
            id: Value::from(id),
        };

        let response = self
            .http
            .post(&self.address)
            .json(&envelope)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            return Err(ClientError::Http {
                status: status.as_u16(),
            });
        }

        let envelope: RpcResponse = response.json().await?;

        if let Some(error) = envelope.error {
            return Err(ClientError::Server {
                code: error.code,
                message: error.message,
            });
        }

        Ok(serde_json::from_value(envelope.result.unwrap_or(Value::Null))?)
    }
}
