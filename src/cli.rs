use clap::{Parser, Subcommand};
use std::path::PathBuf;

#[derive(Parser)]
#[command(version)]
#[command(about = "Pays out receiver files from a watched folder as batched TON transfers")]
pub struct Cli {
    /// Path to the key=value config file
    #[arg(short, long, global = true, default_value = "config.txt")]
    pub config: PathBuf,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Poll the receiver folder and pay out every pending file
    Run,

    /// Show the wallet address and balance
    Balance,

    /// Deploy the wallet contract with a zero-value self-transfer
    Activate,

    /// Pay out a single receiver file without renaming it
    Send {
        /// Receiver file with one "<address> <amount>" per line
        #[arg(short, long, default_value = "receivers.txt")]
        file: PathBuf,
    },

    /// Create a new wallet and store its seed in the config file
    CreateWallet {
        /// Where to write a QR code of the new wallet address
        #[arg(long, default_value = "wallet_qr.png")]
        qr: PathBuf,
    },

    /// Generate a sample config file
    GenerateConfig {
        /// Path to output config file
        #[arg(short, long, default_value = "config.txt")]
        output: PathBuf,
    },
}

pub fn parse_args() -> Cli {
    Cli::parse()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_send_defaults() {
        let cli = Cli::try_parse_from(["ton-disburser", "send"]).unwrap();
        assert_eq!(cli.config, PathBuf::from("config.txt"));
        match cli.command {
            Commands::Send { file } => assert_eq!(file, PathBuf::from("receivers.txt")),
            _ => panic!("expected send"),
        }
    }

    #[test]
    fn test_global_config_after_subcommand() {
        let cli = Cli::try_parse_from(["ton-disburser", "run", "--config", "/etc/payout.txt"])
            .unwrap();
        assert_eq!(cli.config, PathBuf::from("/etc/payout.txt"));
        assert!(matches!(cli.command, Commands::Run));
    }

    #[test]
    fn test_create_wallet_qr_default() {
        let cli = Cli::try_parse_from(["ton-disburser", "create-wallet"]).unwrap();
        match cli.command {
            Commands::CreateWallet { qr } => assert_eq!(qr, PathBuf::from("wallet_qr.png")),
            _ => panic!("expected create-wallet"),
        }
    }
}
