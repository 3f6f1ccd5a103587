use anyhow::{anyhow, Context, Result};
use certkey_core::certificate::CertificateStore;
use certkey_core::metadata::{CERT_KEY, SALT_KEY};
use certkey_core::paths::{config_path, key_dir};
use certkey_core::pem_store::PemDirectoryStore;
use certkey_core::{KeyProvider, KeyQueryContext, ProviderSettings};
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::sync::Arc;
use tracing::info;
use tracing_subscriber::EnvFilter;

mod console;

use crate::console::ConsoleInteraction;

#[derive(Parser, Debug)]
#[command(author, version, about = "Certificate-derived database keys", long_about = None)]
struct Cli {
    /// Settings file (JSON); defaults to the per-user config location
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Directory of PEM-encoded RSA private keys to offer as certificates
    #[arg(long, global = true)]
    keys: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Establish a new key for a database and show its recovery key
    Create { database: PathBuf },
    /// Derive the key of an existing database and print it as hex
    Open { database: PathBuf },
    /// Show the metadata stored next to a database
    Inspect { database: PathBuf },
    /// Remove the certificate binding so the next open asks again
    Forget { database: PathBuf },
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let settings = load_settings(cli.config.as_ref())?;
    let key_root = match cli.keys {
        Some(dir) => dir,
        None => key_dir()?,
    };
    info!(keys = %key_root.display(), "using key directory");
    let store: Arc<dyn CertificateStore> = Arc::new(PemDirectoryStore::new(key_root));
    let provider = KeyProvider::new(settings, store, Arc::new(ConsoleInteraction));

    match cli.command {
        Commands::Create { database } => derive_command(&provider, KeyQueryContext::create(database)),
        Commands::Open { database } => derive_command(&provider, KeyQueryContext::open(database)),
        Commands::Inspect { database } => inspect_command(&provider, database),
        Commands::Forget { database } => forget_command(&provider, database),
    }
}

fn load_settings(path: Option<&PathBuf>) -> Result<ProviderSettings> {
    let path = match path {
        Some(p) => p.clone(),
        None => config_path()?,
    };
    ProviderSettings::load(&path).with_context(|| format!("load settings from {}", path.display()))
}

fn derive_command(provider: &KeyProvider, ctx: KeyQueryContext) -> Result<()> {
    let key = provider
        .get_key(&ctx)
        .map_err(|e| anyhow!("key unavailable for {}: {e}", ctx.database_path.display()))?;
    println!("{}", key.to_hex().as_str());
    Ok(())
}

fn inspect_command(provider: &KeyProvider, database: PathBuf) -> Result<()> {
    let (path, metadata) = provider.inspect(&database)?;
    println!("metadata: {}", path.display());
    println!("{SALT_KEY}: {}", metadata.salt_hex()?);
    match metadata.get(CERT_KEY) {
        Some(hash) => println!("{CERT_KEY}: {hash}"),
        None => println!("{CERT_KEY}: (not bound)"),
    }
    for (key, value) in metadata.entries() {
        if key != SALT_KEY && key != CERT_KEY {
            println!("{key}: {value}");
        }
    }
    Ok(())
}

fn forget_command(provider: &KeyProvider, database: PathBuf) -> Result<()> {
    if provider.forget_certificate(&database)? {
        println!("certificate binding removed for {}", database.display());
    } else {
        println!("no certificate was bound to {}", database.display());
    }
    Ok(())
}
