// SPDX-License-Identifier: MIT OR Apache-2.0
//! `aurora` — command-line client for the build farm.
#![deny(unsafe_code)]

mod commands;

use anyhow::{Context, Result};
use aurora_rpc::RpcClient;
use aurora_signature::Signer;
use clap::{Parser, Subcommand};
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(name = "aurora", version, about = "Command line client for the aurora daemon")]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Address of the aurorad rpc server.
    #[arg(
        short = 'a',
        long,
        global = true,
        default_value = "https://aurora.reconquest.io/rpc/"
    )]
    address: String,

    /// Path to the private RSA key (defaults to ~/.config/aurora/id_rsa).
    #[arg(short = 'k', long, global = true)]
    key: Option<PathBuf>,

    /// Allow a plain http:// address; by default only https:// is accepted.
    #[arg(long = "i-use-insecure-address", global = true)]
    allow_insecure: bool,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Query one package, or list all of them.
    Get {
        /// Package name; omit to list every package.
        package: Option<String>,
    },

    /// Add a package to the build queue.
    Add {
        /// Package name.
        package: String,
    },

    /// Remove a package from the build queue.
    Rm {
        /// Package name.
        package: String,
    },

    /// Retrieve the last build log of a package.
    Log {
        /// Package name.
        package: String,
    },

    /// Stream the live build log of a package.
    Watch {
        /// Package name.
        package: String,

        /// Exit once a terminal status (success or failure) arrives.
        #[arg(short = 'w', long)]
        wait: bool,
    },

    /// Show the identity the server resolves for your key.
    Whoami,
}

#[tokio::main]
async fn main() {
    if let Err(err) = run().await {
        eprintln!("{err:#}");
        std::process::exit(1);
    }
}

async fn run() -> Result<()> {
    let cli = Cli::parse();

    commands::validate_address(&cli.address, cli.allow_insecure)
        .with_context(|| format!("invalid address (-a / --address) specified: {}", cli.address))?;

    let client = RpcClient::new(cli.address.clone());
    let signer = load_signer(cli.key.as_deref())?;

    match cli.command {
        Commands::Get { package } => commands::get(&client, package.as_deref()).await,
        Commands::Add { package } => commands::add(&client, signer.as_ref(), &package).await,
        Commands::Rm { package } => commands::remove(&client, signer.as_ref(), &package).await,
        Commands::Log { package } => commands::log(&client, signer.as_ref(), &package).await,
        Commands::Watch { package, wait } => commands::watch(&client, &package, wait).await,
        Commands::Whoami => commands::whoami(&client, signer.as_ref()).await,
    }
}

/// Load the signing key; a missing file means anonymous operation, an
/// unreadable one is an error.
fn load_signer(key: Option<&std::path::Path>) -> Result<Option<Signer>> {
    let path = match key {
        Some(path) => path.to_path_buf(),
        None => match dirs::home_dir() {
            Some(home) => home.join(".config/aurora/id_rsa"),
            None => return Ok(None),
        },
    };

    if !path.exists() {
        return Ok(None);
    }

    let signer = Signer::from_key_file(&path)
        .with_context(|| format!("unable to read key: {}", path.display()))?;

    Ok(Some(signer))
}
