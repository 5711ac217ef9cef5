// SPDX-License-Identifier: MIT OR Apache-2.0
//! The axum side of the facade: one POST route, one dispatch table.

use crate::services::{AuthService, BuildService, PackageService, ServiceError};
use crate::wire::{RpcRequest, RpcResponse, error_codes};
use crate::methods;
use axum::extract::State;
use axum::routing::post;
use axum::{Json, Router};
use serde::Serialize;
use serde_json::Value;
use std::sync::Arc;
use tracing::debug;

/// The wired-up services behind `/rpc/`.
pub struct RpcServer {
    /// Identity resolution.
    pub auth: Arc<AuthService>,
    /// Catalog queries and mutations.
    pub packages: Arc<PackageService>,
    /// Build event ingestion.
    pub builds: Arc<BuildService>,
}

/// Build the router serving `POST /rpc/`.
pub fn router(server: Arc<RpcServer>) -> Router {
    Router::new()
        .route("/rpc/", post(handle_rpc))
        .with_state(server)
}

async fn handle_rpc(State(server): State<Arc<RpcServer>>, body: String) -> Json<RpcResponse> {
    let request: RpcRequest = match serde_json::from_str(&body) {
        Ok(request) => request,
        Err(err) => {
            let code = if serde_json::from_str::<Value>(&body).is_err() {
                error_codes::PARSE_ERROR
            } else {
                error_codes::INVALID_REQUEST
            };
            return Json(RpcResponse::error(Value::Null, code, err.to_string()));
        }
    };

    debug!(method = %request.method, "rpc call");

    Json(dispatch(&server, &request).await)
}

async fn dispatch(server: &RpcServer, request: &RpcRequest) -> RpcResponse {
    let id = request.id.clone();
    let params = request.params_object();

    match request.method.as_str() {
        methods::WHO_AM_I => match parse(id.clone(), params) {
            Ok(req) => ok(id, &server.auth.who_am_i(&req)),
            Err(response) => response,
        },
        methods::LIST_PACKAGES => match parse(id.clone(), params) {
            Ok(req) => respond(id, server.packages.list_packages(&req).await),
            Err(response) => response,
        },
        methods::GET_PACKAGE => match parse(id.clone(), params) {
            Ok(req) => respond(id, server.packages.get_package(&req).await),
            Err(response) => response,
        },
        methods::GET_LOGS => match parse(id.clone(), params) {
            Ok(req) => respond(id, server.packages.get_logs(&req).await),
            Err(response) => response,
        },
        methods::GET_BUS => match parse(id.clone(), params) {
            Ok(req) => respond(id, server.packages.get_bus(&req).await),
            Err(response) => response,
        },
        methods::ADD_PACKAGE => match parse(id.clone(), params) {
            Ok(req) => respond(id, server.packages.add_package(&req).await),
            Err(response) => response,
        },
        methods::REMOVE_PACKAGE => match parse(id.clone(), params) {
            Ok(req) => respond(id, server.packages.remove_package(&req).await),
            Err(response) => response,
        },
        methods::PUSH_BUILD => match parse(id.clone(), params) {
            Ok(req) => respond(id, server.builds.push_build(&req).await),
            Err(response) => response,
        },
        other => RpcResponse::error(
            id,
            error_codes::METHOD_NOT_FOUND,
            format!("method not found: {other}"),
        ),
    }
}

fn parse<T: serde::de::DeserializeOwned>(id: Value, params: Value) -> Result<T, RpcResponse> {
    serde_json::from_value(params)
        .map_err(|err| RpcResponse::error(id, error_codes::INVALID_PARAMS, err.to_string()))
}

fn respond<T: Serialize>(id: Value, result: Result<T, ServiceError>) -> RpcResponse {
    match result {
        Ok(response) => ok(id, &response),
        Err(err) => RpcResponse::error(id, error_codes::SERVER_ERROR, err.to_string()),
    }
}

fn ok<T: Serialize>(id: Value, response: &T) -> RpcResponse {
    match serde_json::to_value(response) {
        Ok(result) => RpcResponse::result(id, result),
        Err(err) => RpcResponse::error(id, error_codes::SERVER_ERROR, err.to_string()),
    }
}
