//! One-shot wallet operations behind the CLI subcommands.

use std::fs::File;
use std::io::Write;
use std::path::Path;
use std::time::Duration;

use anyhow::{Context, Result, bail};
use image::Luma;
use indicatif::{ProgressBar, ProgressStyle};
use qrcode::{EcLevel, QrCode};
use tracing::info;

use crate::address::Address;
use crate::amount::Nanotons;
use crate::batch::{self, Payload, SendMode, TransferInstruction};
use crate::config::{self, ConfigStore, KEY_SEED, KEY_WALLET_ADDRESS, Settings};
use crate::ledger::{Account, LedgerClient, NewWallet, TxResult};
use crate::receivers;

/// Side length of the address QR code in pixels.
const QR_SIZE: u32 = 256;

pub struct WalletStatus {
    pub address: Address,
    pub balance: Nanotons,
}

pub struct Activation {
    pub tx: TxResult,
    pub balance_after: Nanotons,
}

async fn open<L: LedgerClient>(ledger: &L, settings: &Settings) -> Result<(L::Session, Account)> {
    let session = ledger
        .connect(&settings.ledger_url)
        .await
        .with_context(|| format!("Failed to connect to {}", settings.ledger_url))?;
    let account = ledger
        .open_account(&session, &settings.seed)
        .await
        .context("Failed to derive wallet from seed")?;
    Ok((session, account))
}

fn confirmation_spinner() -> ProgressBar {
    let spinner = ProgressBar::new_spinner();
    spinner.set_style(
        ProgressStyle::with_template("{spinner} {msg} [{elapsed}]")
            .unwrap_or_else(|_| ProgressStyle::default_spinner()),
    );
    spinner.set_message("Sending transaction and waiting for confirmation...");
    spinner.enable_steady_tick(Duration::from_millis(120));
    spinner
}

async fn submit_with_spinner<L: LedgerClient>(
    ledger: &L,
    session: &L::Session,
    account: &Account,
    instructions: &[TransferInstruction],
) -> Result<TxResult> {
    let spinner = confirmation_spinner();
    let result = ledger.submit(session, account, instructions).await;
    spinner.finish_and_clear();
    result.context("Transfer failed")
}

pub async fn show_balance<L: LedgerClient>(ledger: &L, settings: &Settings) -> Result<WalletStatus> {
    let (session, account) = open(ledger, settings).await?;
    let balance = ledger
        .balance(&session, &account)
        .await
        .context("Failed to fetch balance")?;
    Ok(WalletStatus {
        address: account.address,
        balance,
    })
}

/// Deploys the wallet contract with a zero-value message to itself.
pub async fn activate<L: LedgerClient>(ledger: &L, settings: &Settings) -> Result<Activation> {
    let (session, account) = open(ledger, settings).await?;
    let balance = ledger
        .balance(&session, &account)
        .await
        .context("Failed to fetch balance")?;
    info!(wallet = %account.address, %balance, "Activating wallet");

    // Zero-value bounceable message to ourselves deploys the contract
    let instruction = TransferInstruction {
        destination: account.address.clone(),
        amount: Nanotons::ZERO,
        bounce: true,
        mode: SendMode::PAY_FEES_SEPARATELY,
        payload: Payload::Empty,
    };
    let tx = submit_with_spinner(ledger, &session, &account, &[instruction]).await?;
    info!(hash = %tx.hash_base64(), "Transaction sent, confirmed at block");

    let balance_after = ledger
        .balance(&session, &account)
        .await
        .context("Failed to fetch balance after activation")?;
    Ok(Activation { tx, balance_after })
}

/// Pays out one receiver file immediately. The file is left in place.
pub async fn send_file<L: LedgerClient>(
    ledger: &L,
    settings: &Settings,
    file: &Path,
    min_balance: Nanotons,
) -> Result<TxResult> {
    let (session, account) = open(ledger, settings).await?;
    let balance = ledger
        .balance(&session, &account)
        .await
        .context("Failed to fetch balance")?;

    // Same gate as the disbursement loop
    let receivers = receivers::parse(file)?;
    if balance < min_balance {
        bail!("Not enough balance: {} ({} nano)", balance, balance.as_nano());
    }

    let batch = batch::build(&receivers, &settings.comment);
    if batch.is_empty() {
        bail!("{} has no valid receiver entries", file.display());
    }

    submit_with_spinner(ledger, &session, &account, &batch.instructions).await
}

/// Creates a wallet and stores its seed and address in the config, keeping other keys.
pub async fn create_wallet<L: LedgerClient>(ledger: &L, store: &ConfigStore) -> Result<NewWallet> {
    let mut config = store.load_or_default()?;
    let endpoint = config::ledger_url(&config);

    let session = ledger
        .connect(&endpoint)
        .await
        .with_context(|| format!("Failed to connect to {endpoint}"))?;
    let wallet = ledger
        .create_wallet(&session)
        .await
        .context("Failed to create wallet")?;

    // Merge into the existing config
    config.insert(KEY_SEED.to_string(), wallet.mnemonic.phrase());
    config.insert(KEY_WALLET_ADDRESS.to_string(), wallet.address.to_string());
    store
        .save(&config)
        .with_context(|| format!("Failed to write config {:?}", store.path()))?;

    Ok(wallet)
}

/// Writes the wallet address as a QR code PNG.
pub fn write_address_qr(address: &Address, output: &Path) -> Result<()> {
    let code = QrCode::with_error_correction_level(address.to_string(), EcLevel::M)
        .context("Failed to encode wallet address as QR code")?;
    let image = code
        .render::<Luma<u8>>()
        .min_dimensions(QR_SIZE, QR_SIZE)
        .build();
    image
        .save(output)
        .with_context(|| format!("Failed to write QR code to {:?}", output))?;
    Ok(())
}

pub fn generate_config(output: &Path) -> Result<()> {
    let mut file = File::create(output)
        .with_context(|| format!("Failed to create config file at {:?}", output))?;
    file.write_all(config::SAMPLE_CONFIG.as_bytes())?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::RawConfig;
    use crate::error::LedgerError;
    use crate::ledger::MockLedgerClient;
    use std::fs;
    use tempfile::TempDir;

    const RECEIVER: &str = "EQAREREREREREREREREREREREREREREREREREREREREREeYT";

    fn settings() -> Settings {
        let mut config = RawConfig::new();
        config.insert("seed".to_string(), "alpha beta gamma".to_string());
        config.insert("comment".to_string(), "Payout".to_string());
        Settings::from_config(&config).unwrap()
    }

    #[tokio::test]
    async fn test_show_balance() {
        let ledger = MockLedgerClient::new(Nanotons::new(2_000_000_000));
        let status = show_balance(&ledger, &settings()).await.unwrap();
        assert_eq!(status.balance, Nanotons::new(2_000_000_000));
        assert_eq!(&status.address, ledger.wallet_address());
    }

    #[tokio::test]
    async fn test_activate_sends_empty_self_transfer() {
        let ledger = MockLedgerClient::new(Nanotons::new(1_000_000_000));
        let activation = activate(&ledger, &settings()).await.unwrap();
        assert_eq!(activation.tx.hash, vec![1; 32]);

        let submissions = ledger.submissions();
        assert_eq!(submissions.len(), 1);
        let instruction = &submissions[0].instructions[0];
        assert_eq!(&instruction.destination, ledger.wallet_address());
        assert_eq!(instruction.amount, Nanotons::ZERO);
        assert!(instruction.bounce);
        assert_eq!(instruction.mode, SendMode::PAY_FEES_SEPARATELY);
        assert_eq!(instruction.payload, Payload::Empty);
        assert_eq!(ledger.balance_query_count(), 2);
    }

    #[tokio::test]
    async fn test_send_file_leaves_file_in_place() {
        let dir = TempDir::new().unwrap();
        let file = dir.path().join("receivers.txt");
        fs::write(&file, format!("{RECEIVER} 1.5\nbroken\n")).unwrap();

        let ledger = MockLedgerClient::new(Nanotons::new(5_000_000_000));
        send_file(&ledger, &settings(), &file, Nanotons::new(300_000))
            .await
            .unwrap();

        assert!(file.exists());
        let submissions = ledger.submissions();
        assert_eq!(submissions[0].instructions.len(), 1);
        assert_eq!(
            submissions[0].instructions[0].payload,
            Payload::Comment("Payout".to_string())
        );
    }

    #[tokio::test]
    async fn test_send_file_refuses_low_balance() {
        let dir = TempDir::new().unwrap();
        let file = dir.path().join("receivers.txt");
        fs::write(&file, format!("{RECEIVER} 1\n")).unwrap();

        let ledger = MockLedgerClient::new(Nanotons::new(299_999));
        let result = send_file(&ledger, &settings(), &file, Nanotons::new(300_000)).await;
        assert!(result.is_err());
        assert_eq!(ledger.submit_count(), 0);
    }

    #[tokio::test]
    async fn test_send_file_reports_submit_error() {
        let dir = TempDir::new().unwrap();
        let file = dir.path().join("receivers.txt");
        fs::write(&file, format!("{RECEIVER} 1\n")).unwrap();

        let ledger = MockLedgerClient::new(Nanotons::new(5_000_000_000));
        ledger.push_submit_result(Err(LedgerError::Timeout));
        let result = send_file(&ledger, &settings(), &file, Nanotons::new(300_000)).await;
        assert!(result.is_err());
    }

    #[tokio::test]
    async fn test_create_wallet_merges_into_config() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("config.txt");
        fs::write(&path, "comment=Payout\nseed=old words\n").unwrap();
        let store = ConfigStore::new(&path);

        let ledger = MockLedgerClient::new(Nanotons::ZERO);
        let wallet = create_wallet(&ledger, &store).await.unwrap();

        let config = store.load().unwrap();
        assert_eq!(config.get("comment").unwrap(), "Payout");
        assert_eq!(config.get("seed").unwrap(), &wallet.mnemonic.phrase());
        assert_eq!(
            config.get("wallet_address").unwrap(),
            &wallet.address.to_string()
        );
        assert_eq!(wallet.mnemonic.words().len(), 24);
    }

    #[tokio::test]
    async fn test_create_wallet_without_config_file() {
        let dir = TempDir::new().unwrap();
        let store = ConfigStore::new(dir.path().join("config.txt"));

        let ledger = MockLedgerClient::new(Nanotons::ZERO);
        create_wallet(&ledger, &store).await.unwrap();

        assert!(store.load().unwrap().contains_key("seed"));
    }

    #[test]
    fn test_write_address_qr_creates_png() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("wallet_qr.png");
        let address: Address = RECEIVER.parse().unwrap();

        write_address_qr(&address, &path).unwrap();

        let bytes = fs::read(&path).unwrap();
        assert_eq!(&bytes[..4], b"\x89PNG");
        let (width, height) = image::image_dimensions(&path).unwrap();
        assert!(width >= QR_SIZE);
        assert_eq!(width, height);
    }

    #[test]
    fn test_generate_config_writes_loadable_sample() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("config.txt");
        generate_config(&path).unwrap();

        let settings = Settings::load(&ConfigStore::new(&path)).unwrap();
        assert_eq!(settings.comment, "Payout");
        assert!(settings.folder().is_ok());
    }
}
