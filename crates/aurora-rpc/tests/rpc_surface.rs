// SPDX-License-Identifier: MIT OR Apache-2.0
//! Facade-level tests against a real HTTP server.
//!
//! The catalog client connects lazily, so every path exercised here —
//! authentication, dispatch, logs — runs without a database behind it.

use async_trait::async_trait;
use aurora_bus::BusError;
use aurora_catalog::Catalog;
use aurora_proto::{
    Archive, Build, PackageStatus, RequestGetLogs, RequestPushBuild, RequestRemovePackage,
    RequestWhoAmI, ResponseGetLogs, ResponseWhoAmI,
};
use aurora_rpc::{
    ArchiveSink, AuthService, BuildService, ClientError, PackageService, RpcClient, RpcServer,
    methods, router,
};
use aurora_signature::Signer;
use rsa::RsaPrivateKey;
use rsa::pkcs1::{EncodeRsaPrivateKey, EncodeRsaPublicKey, LineEnding};
use std::sync::{Arc, Mutex};

struct RecordingSink {
    published: Mutex<Vec<Archive>>,
}

#[async_trait]
impl ArchiveSink for RecordingSink {
    async fn publish_archive(&self, archive: &Archive) -> Result<(), BusError> {
        self.published.lock().unwrap().push(archive.clone());
        Ok(())
    }
}

struct Harness {
    client: RpcClient,
    signer: Signer,
    _keys_dir: tempfile::TempDir,
    _key_dir: tempfile::TempDir,
    logs_dir: tempfile::TempDir,
}

async fn spawn_harness() -> Harness {
    let key = RsaPrivateKey::new(&mut rand::thread_rng(), 2048).unwrap();

    // The authorized-keys directory holds public keys only; the private
    // key lives elsewhere, like a client's ~/.config/aurora/id_rsa.
    let keys_dir = tempfile::tempdir().unwrap();
    let public = rsa::RsaPublicKey::from(&key)
        .to_pkcs1_pem(LineEnding::LF)
        .unwrap();
    std::fs::write(keys_dir.path().join("builder-1"), public).unwrap();

    let key_dir = tempfile::tempdir().unwrap();
    let key_path = key_dir.path().join("id_rsa");
    std::fs::write(&key_path, key.to_pkcs1_pem(LineEnding::LF).unwrap().as_bytes()).unwrap();
    let signer = Signer::from_key_file(&key_path).unwrap();

    let logs_dir = tempfile::tempdir().unwrap();

    // Nothing listens here; the driver only connects when a query runs.
    let catalog = Catalog::connect("mongodb://127.0.0.1:1/aurora").await.unwrap();

    let auth = Arc::new(AuthService::new(keys_dir.path()).unwrap());
    let server = Arc::new(RpcServer {
        auth: Arc::clone(&auth),
        packages: Arc::new(PackageService::new(
            catalog.clone(),
            Arc::clone(&auth),
            logs_dir.path().to_path_buf(),
            "rpc-1".into(),
            4242,
        )),
        builds: Arc::new(BuildService::new(
            catalog,
            auth,
            Arc::new(RecordingSink {
                published: Mutex::new(Vec::new()),
            }),
        )),
    });

    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, router(server)).await.unwrap();
    });

    Harness {
        client: RpcClient::new(format!("http://{addr}/rpc/")),
        signer,
        _keys_dir: keys_dir,
        _key_dir: key_dir,
        logs_dir,
    }
}

#[tokio::test]
async fn whoami_resolves_signer_from_key_filename() {
    let harness = spawn_harness().await;

    let response: ResponseWhoAmI = harness
        .client
        .call(
            methods::WHO_AM_I,
            &RequestWhoAmI {
                signature: Some(harness.signer.sign().unwrap()),
            },
        )
        .await
        .unwrap();

    assert_eq!(response.name, "builder-1");
}

#[tokio::test]
async fn whoami_is_empty_for_anonymous_callers() {
    let harness = spawn_harness().await;

    let response: ResponseWhoAmI = harness
        .client
        .call(methods::WHO_AM_I, &RequestWhoAmI { signature: None })
        .await
        .unwrap();

    assert_eq!(response.name, "");
}

#[tokio::test]
async fn remove_package_requires_signature() {
    let harness = spawn_harness().await;

    let err = harness
        .client
        .call::<_, serde_json::Value>(
            methods::REMOVE_PACKAGE,
            &RequestRemovePackage {
                signature: None,
                name: "aa".into(),
            },
        )
        .await
        .unwrap_err();

    match err {
        ClientError::Server { code, message } => {
            assert_eq!(code, -32000);
            assert!(message.contains("not authorized"), "message: {message}");
        }
        other => panic!("expected a server error, got {other:?}"),
    }
}

#[tokio::test]
async fn push_build_requires_signature() {
    let harness = spawn_harness().await;

    let err = harness
        .client
        .call::<_, serde_json::Value>(
            methods::PUSH_BUILD,
            &RequestPushBuild {
                signature: None,
                build: Build::new("aa", PackageStatus::Processing),
            },
        )
        .await
        .unwrap_err();

    assert!(matches!(err, ClientError::Server { code: -32000, .. }));
}

#[tokio::test]
async fn get_logs_returns_snapshot_or_empty() {
    let harness = spawn_harness().await;
    std::fs::write(harness.logs_dir.path().join("aa"), "makepkg: done\n").unwrap();

    let response: ResponseGetLogs = harness
        .client
        .call(
            methods::GET_LOGS,
            &RequestGetLogs {
                signature: None,
                name: "aa".into(),
            },
        )
        .await
        .unwrap();
    assert_eq!(response.logs, "makepkg: done\n");

    let response: ResponseGetLogs = harness
        .client
        .call(
            methods::GET_LOGS,
            &RequestGetLogs {
                signature: None,
                name: "never-built".into(),
            },
        )
        .await
        .unwrap();
    assert_eq!(response.logs, "");
}

#[tokio::test]
async fn unknown_method_is_rejected() {
    let harness = spawn_harness().await;

    let err = harness
        .client
        .call::<_, serde_json::Value>("PackageService.Nope", &RequestWhoAmI::default())
        .await
        .unwrap_err();

    assert!(matches!(err, ClientError::Server { code: -32601, .. }));
}

#[tokio::test]
async fn malformed_params_are_rejected() {
    let harness = spawn_harness().await;

    let err = harness
        .client
        .call::<_, serde_json::Value>(
            methods::GET_PACKAGE,
            &serde_json::json!({"name": 5}),
        )
        .await
        .unwrap_err();

    assert!(matches!(err, ClientError::Server { code: -32602, .. }));
}

#[tokio::test]
async fn raw_garbage_body_reports_parse_error() {
    let key = RsaPrivateKey::new(&mut rand::thread_rng(), 2048).unwrap();
    let keys_dir = tempfile::tempdir().unwrap();
    std::fs::write(
        keys_dir.path().join("builder-1"),
        rsa::RsaPublicKey::from(&key)
            .to_pkcs1_pem(LineEnding::LF)
            .unwrap(),
    )
    .unwrap();

    let catalog = Catalog::connect("mongodb://127.0.0.1:1/aurora").await.unwrap();
    let auth = Arc::new(AuthService::new(keys_dir.path()).unwrap());
    let server = Arc::new(RpcServer {
        auth: Arc::clone(&auth),
        packages: Arc::new(PackageService::new(
            catalog.clone(),
            Arc::clone(&auth),
            keys_dir.path().to_path_buf(),
            "rpc-1".into(),
            4242,
        )),
        builds: Arc::new(BuildService::new(
            catalog,
            auth,
            Arc::new(RecordingSink {
                published: Mutex::new(Vec::new()),
            }),
        )),
    });

    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, router(server)).await.unwrap();
    });

    let response = reqwest::Client::new()
        .post(format!("http://{addr}/rpc/"))
        .header("content-type", "application/json")
        .body("not json at all")
        .send()
        .await
        .unwrap();

    assert!(response.status().is_success());
    let envelope: serde_json::Value = response.json().await.unwrap();
    assert_eq!(envelope["error"]["code"], -32700);
}
