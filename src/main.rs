mod cli;

use anyhow::{Context, Result};
use cli::{Commands, parse_args};
use tracing::info;
use tracing_subscriber::EnvFilter;

use ton_disburser::commands;
use ton_disburser::disburser::shutdown_signal;
use ton_disburser::{ConfigStore, Disburser, HttpLedgerClient, MIN_BALANCE, Settings};

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let cli = parse_args();
    let store = ConfigStore::new(&cli.config);

    match cli.command {
        Commands::Run => {
            let ledger = HttpLedgerClient::new()?;
            // Install signal handlers before the first cycle starts
            let shutdown = shutdown_signal().context("Failed to install signal handlers")?;
            info!(config = ?store.path(), "Starting disburser");
            Disburser::new(store, ledger).run_until(shutdown).await;
        }

        Commands::Balance => {
            let settings = load_settings(&store)?;
            let status = commands::show_balance(&HttpLedgerClient::new()?, &settings).await?;
            println!("Wallet: {}", status.address);
            println!("Balance: {} ({} nano)", status.balance, status.balance.as_nano());
        }

        Commands::Activate => {
            let settings = load_settings(&store)?;
            let activation = commands::activate(&HttpLedgerClient::new()?, &settings).await?;
            println!("Transaction sent: {}", activation.tx.hash_base64());
            if let Some(block) = &activation.tx.block {
                println!("Confirmed at block {}:{}:{}", block.workchain, block.shard, block.seqno);
            }
            println!("Balance: {}", activation.balance_after);
        }

        Commands::Send { file } => {
            let settings = load_settings(&store)?;
            let tx = commands::send_file(&HttpLedgerClient::new()?, &settings, &file, MIN_BALANCE)
                .await?;
            println!("Transaction sent: {}", tx.hash_base64());
        }

        Commands::CreateWallet { qr } => {
            let wallet = commands::create_wallet(&HttpLedgerClient::new()?, &store).await?;
            println!("Wallet address: {}", wallet.address);
            println!("Seed phrase: {}", wallet.mnemonic.phrase());
            println!("Seed and address saved to {:?}", store.path());

            commands::write_address_qr(&wallet.address, &qr)?;
            println!("QR code saved to {:?}", qr);
        }

        Commands::GenerateConfig { output } => {
            commands::generate_config(&output)?;
            info!("Sample configuration file generated at {:?}", output);
            info!("Please edit the file with your actual configuration before starting the service.");
        }
    }

    Ok(())
}

fn load_settings(store: &ConfigStore) -> Result<Settings> {
    Settings::load(store).with_context(|| format!("Failed to load config from {:?}", store.path()))
}
