// SPDX-License-Identifier: MIT OR Apache-2.0
//! Command implementations, kept library-level so the formatting and
//! validation logic is testable without spawning the binary.

use anyhow::{Context, Result, anyhow, bail};
use aurora_livelog::Frame;
use aurora_proto::{
    Package, RequestAddPackage, RequestGetBus, RequestGetLogs, RequestGetPackage,
    RequestListPackages, RequestRemovePackage, RequestWhoAmI, ResponseAddPackage, ResponseGetBus,
    ResponseGetLogs, ResponseGetPackage, ResponseListPackages, ResponseRemovePackage,
    ResponseWhoAmI,
};
use aurora_rpc::{RpcClient, methods};
use aurora_signature::{Signature, Signer};
use futures::StreamExt;
use tokio_tungstenite::connect_async;
use tokio_tungstenite::tungstenite::Message;

/// Reject addresses the daemon would not be reachable at: the scheme and
/// path are mandatory, and plain http requires the explicit opt-in flag.
pub fn validate_address(address: &str, allow_insecure: bool) -> Result<()> {
    let url = url::Url::parse(address).context("unable to parse URL")?;

    match url.scheme() {
        "https" => {}
        "http" if allow_insecure => {}
        "http" => bail!(
            "insecure URL scheme specified, use https:// instead of http:// \
             or specify --i-use-insecure-address flag"
        ),
        other => bail!("unexpected URL scheme specified: {other:?}://, use https://"),
    }

    if url.path() == "" || url.path() == "/" {
        bail!("URL path is not specified");
    }

    Ok(())
}

fn sign(signer: Option<&Signer>) -> Result<Option<Signature>> {
    signer.map(|signer| signer.sign()).transpose().map_err(Into::into)
}

/// `aurora get [package]`
pub async fn get(client: &RpcClient, package: Option<&str>) -> Result<()> {
    let packages = match package {
        Some(name) => {
            let reply: ResponseGetPackage = client
                .call(
                    methods::GET_PACKAGE,
                    &RequestGetPackage {
                        signature: None,
                        name: name.to_string(),
                    },
                )
                .await?;

            vec![reply.package.ok_or_else(|| anyhow!("package not found"))?]
        }
        None => {
            let reply: ResponseListPackages = client
                .call(methods::LIST_PACKAGES, &RequestListPackages::default())
                .await?;
            reply.packages
        }
    };

    print!("{}", format_packages(&packages));

    Ok(())
}

/// `aurora add <package>`
pub async fn add(client: &RpcClient, signer: Option<&Signer>, package: &str) -> Result<()> {
    let _: ResponseAddPackage = client
        .call(
            methods::ADD_PACKAGE,
            &RequestAddPackage {
                signature: sign(signer)?,
                name: package.to_string(),
                clone_url: None,
                subdir: None,
            },
        )
        .await?;

    println!("package has been queued");

    Ok(())
}

/// `aurora rm <package>`
pub async fn remove(client: &RpcClient, signer: Option<&Signer>, package: &str) -> Result<()> {
    let _: ResponseRemovePackage = client
        .call(
            methods::REMOVE_PACKAGE,
            &RequestRemovePackage {
                signature: sign(signer)?,
                name: package.to_string(),
            },
        )
        .await?;

    println!("package has been removed from the queue");

    Ok(())
}

/// `aurora log <package>`
pub async fn log(client: &RpcClient, signer: Option<&Signer>, package: &str) -> Result<()> {
    let reply: ResponseGetLogs = client
        .call(
            methods::GET_LOGS,
            &RequestGetLogs {
                signature: sign(signer)?,
                name: package.to_string(),
            },
        )
        .await?;

    println!("{}", reply.logs);

    Ok(())
}

/// `aurora whoami`
pub async fn whoami(client: &RpcClient, signer: Option<&Signer>) -> Result<()> {
    let reply: ResponseWhoAmI = client
        .call(
            methods::WHO_AM_I,
            &RequestWhoAmI {
                signature: sign(signer)?,
            },
        )
        .await?;

    if reply.name.is_empty() {
        println!("Unauthorized");
    } else {
        println!("{}", reply.name);
    }

    Ok(())
}

/// `aurora watch <package> [-w]`
pub async fn watch(client: &RpcClient, package: &str, wait: bool) -> Result<()> {
    let reply: ResponseGetBus = client
        .call(
            methods::GET_BUS,
            &RequestGetBus {
                signature: None,
                name: package.to_string(),
            },
        )
        .await?;

    let stream = reply.stream;

    let (mut socket, _) = connect_async(stream.as_str())
        .await
        .with_context(|| format!("unable to connect to logs stream: {stream}"))?;

    eprintln!("connected to logs stream: {stream}");

    while let Some(message) = socket.next().await {
        let message = message.context("logs stream failed")?;

        let Message::Text(text) = message else {
            continue;
        };

        let frame: Frame =
            serde_json::from_str(&text).context("unexpected frame on logs stream")?;

        match frame {
            Frame::Log(data) => print!("{data}"),
            Frame::Status(status) => {
                println!("status: {status}");
                if wait && matches!(status.as_str(), "success" | "failure") {
                    break;
                }
            }
            Frame::EmptyChannel => eprintln!("(no logs published yet)"),
        }
    }

    Ok(())
}

/// Align packages into the NAME/STATUS/VERSION/UPDATED table.
fn format_packages(packages: &[Package]) -> String {
    let mut rows = vec![[
        "NAME".to_string(),
        "STATUS".to_string(),
        "VERSION".to_string(),
        "UPDATED".to_string(),
    ]];

    for package in packages {
        rows.push([
            package.name.clone(),
            package.status.to_string(),
            package.version.clone(),
            package.updated_at.to_rfc3339(),
        ]);
    }

    let mut widths = [0usize; 4];
    for row in &rows {
        for (width, cell) in widths.iter_mut().zip(row) {
            *width = (*width).max(cell.len());
        }
    }

    let mut out = String::new();
    for row in rows {
        let mut line = String::new();
        for (cell, width) in row.iter().zip(widths) {
            line.push_str(cell);
            line.push_str(&" ".repeat(width - cell.len() + 3));
        }
        out.push_str(line.trim_end());
        out.push('\n');
    }

    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use aurora_proto::PackageStatus;
    use chrono::{TimeZone, Utc};

    #[test]
    fn https_addresses_pass() {
        validate_address("https://aurora.example.com/rpc/", false).unwrap();
    }

    #[test]
    fn http_requires_the_insecure_flag() {
        assert!(validate_address("http://aurora.example.com/rpc/", false).is_err());
        validate_address("http://aurora.example.com/rpc/", true).unwrap();
    }

    #[test]
    fn other_schemes_are_rejected() {
        let err = validate_address("ftp://aurora.example.com/rpc/", true).unwrap_err();
        assert!(err.to_string().contains("unexpected URL scheme"));
    }

    #[test]
    fn missing_scheme_is_rejected() {
        assert!(validate_address("aurora.example.com/rpc/", false).is_err());
    }

    #[test]
    fn missing_path_is_rejected() {
        let err = validate_address("https://aurora.example.com", false).unwrap_err();
        assert!(err.to_string().contains("path is not specified"));
    }

    #[test]
    fn table_is_aligned_by_longest_cell() {
        let updated = Utc.with_ymd_and_hms(2026, 1, 2, 3, 4, 5).unwrap();
        let packages = vec![
            Package {
                version: "1.0-1".into(),
                status: PackageStatus::Success,
                updated_at: updated,
                ..Package::queued("aa")
            },
            Package {
                version: "0.20.8-1".into(),
                status: PackageStatus::Queued,
                updated_at: updated,
                ..Package::queued("tree-sitter-cli")
            },
        ];

        let table = format_packages(&packages);
        let lines: Vec<&str> = table.lines().collect();

        assert_eq!(lines.len(), 3);
        assert!(lines[0].starts_with("NAME"));
        assert!(lines[1].starts_with("aa "));
        // All status columns start at the same offset.
        let offset = lines[0].find("STATUS").unwrap();
        assert_eq!(lines[1].find("success"), Some(offset));
        assert_eq!(lines[2].find("queued"), Some(offset));
    }

    #[test]
    fn empty_listing_still_prints_the_header() {
        let table = format_packages(&[]);
        assert_eq!(table, "NAME   STATUS   VERSION   UPDATED\n");
    }
}
