//! JPEG'd Vault Liquidation Keeper
//!
//! Watches a JPEG'd NFTVault and its price oracles and submits batch
//! liquidations and expired-insurance claims.
//! Features:
//! - Backfill + live event reconciliation of open positions
//! - Evaluation on every oracle price update
//! - Chunked submission with EIP-1559 or legacy gas under a hard ceiling
//! - Encrypted keystore wallet

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use tracing::info;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use jpegd_chain::{keystore, RpcChainClient};
use jpegd_core::{
    ConfigOverrides, LiquidatorConfig, Orchestrator, ReconcilerMode, DEFAULT_CONFIG_PATH,
};

/// Environment variable names.
mod env {
    pub const KEYSTORE_PASSWORD: &str = "KEYSTORE_PASSWORD";
    pub const LOG_FORMAT: &str = "LOG_FORMAT";
}

#[derive(Parser)]
#[command(name = "jpegd-liquidator")]
#[command(about = "Liquidation keeper for JPEG'd NFT vaults", long_about = None)]
struct Cli {
    /// Emit logs as JSON
    #[arg(long, global = true)]
    log_json: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the keeper
    Run {
        /// Path to the TOML config file
        #[arg(short, long, default_value = DEFAULT_CONFIG_PATH)]
        config: PathBuf,

        /// Override the WebSocket RPC endpoint
        #[arg(long, env = "RPC_URL")]
        rpc_url: Option<String>,

        /// Override the first backfill block
        #[arg(long)]
        from_block: Option<u64>,

        /// Override the gas price ceiling (gwei)
        #[arg(long)]
        max_gas_price: Option<f64>,

        /// Override the signing account
        #[arg(long)]
        wallet: Option<String>,

        /// Override the keystore directory
        #[arg(long)]
        keystore_dir: Option<PathBuf>,

        /// Reconciliation mode: incremental or scan
        #[arg(long)]
        mode: Option<String>,
    },

    /// Import a private key into an encrypted keystore
    Keystore {
        /// Directory to write the keystore file to
        #[arg(long, default_value = "./keystores")]
        out_dir: PathBuf,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    // Load environment variables
    dotenvy::dotenv().ok();

    let cli = Cli::parse();
    init_tracing(cli.log_json);

    match cli.command {
        Commands::Run {
            config,
            rpc_url,
            from_block,
            max_gas_price,
            wallet,
            keystore_dir,
            mode,
        } => {
            print_banner();
            let mode = mode
                .map(|m| m.parse::<ReconcilerMode>())
                .transpose()?;
            let overrides = ConfigOverrides {
                rpc_url,
                from_block,
                max_gas_price_gwei: max_gas_price,
                wallet_address: wallet,
                keystore_path: keystore_dir,
                mode,
            };
            run(config, overrides).await
        }
        Commands::Keystore { out_dir } => import_key(out_dir),
    }
}

async fn run(config_path: PathBuf, overrides: ConfigOverrides) -> Result<()> {
    let mut config = LiquidatorConfig::from_file(&config_path)
        .with_context(|| format!("Failed to load {}", config_path.display()))?;
    config.apply_overrides(&overrides);

    let settings = config.validate()?;
    let wallet = config.keystore_settings()?;

    info!(
        mode = %settings.mode,
        from_block = settings.from_block,
        max_gas_price_gwei = settings.max_gas_price as f64 / 1e9,
        chunk_size = settings.chunk_size,
        "Starting JPEG'd liquidation keeper"
    );

    let password = read_password(&format!("Password for {}: ", wallet.wallet))?;
    let signer = keystore::load_signer(&wallet.dir, wallet.wallet, &password)?;

    let client = RpcChainClient::connect(&settings.rpc_url).await?;

    let orchestrator = Orchestrator::new(settings, Arc::new(client), Arc::new(signer));
    orchestrator.run().await?;

    info!("Keeper stopped");
    Ok(())
}

fn import_key(out_dir: PathBuf) -> Result<()> {
    let private_key = rpassword::prompt_password("Private key (hex): ")
        .context("Failed to read private key")?;
    let password = rpassword::prompt_password("Keystore password: ")
        .context("Failed to read password")?;
    let confirm = rpassword::prompt_password("Repeat password: ")
        .context("Failed to read password")?;
    anyhow::ensure!(password == confirm, "Passwords do not match");
    anyhow::ensure!(!password.is_empty(), "Password must not be empty");

    let address = keystore::import_private_key(&out_dir, &private_key, &password)?;
    println!("Imported {address} into {}", out_dir.display());
    Ok(())
}

fn read_password(prompt: &str) -> Result<String> {
    if let Ok(password) = std::env::var(env::KEYSTORE_PASSWORD) {
        return Ok(password);
    }
    rpassword::prompt_password(prompt).context("Failed to read keystore password")
}

fn init_tracing(json: bool) {
    let json = json
        || std::env::var(env::LOG_FORMAT)
            .map(|f| f.eq_ignore_ascii_case("json"))
            .unwrap_or(false);

    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("info,jpegd_core=debug,jpegd_chain=debug"));

    let registry = tracing_subscriber::registry().with(filter);
    if json {
        registry.with(fmt::layer().json()).init();
    } else {
        registry.with(fmt::layer()).init();
    }
}

/// Print startup banner.
fn print_banner() {
    println!(r#"
     ╦╔═╗╔═╗╔═╗'╔╦╗
     ║╠═╝║╣ ║ ╦ ║║
    ╚╝╩  ╚═╝╚═╝═╩╝
    Vault Liquidation Keeper v0.1.0
    "#);
}
