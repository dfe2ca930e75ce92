use std::collections::BTreeMap;
use std::fmt;
use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use tracing::debug;
use zeroize::{Zeroize, ZeroizeOnDrop};

use crate::error::ConfigError;

pub const KEY_SEED: &str = "seed";
pub const KEY_COMMENT: &str = "comment";
pub const KEY_FOLDER_PATH: &str = "folder_path";
pub const KEY_WALLET_ADDRESS: &str = "wallet_address";
pub const KEY_LEDGER_URL: &str = "ledger_url";

pub const DEFAULT_LEDGER_URL: &str = "http://127.0.0.1:8081";

/// Flat key=value settings as they appear on disk.
pub type RawConfig = BTreeMap<String, String>;

/// Reads and writes the flat settings file.
#[derive(Debug, Clone)]
pub struct ConfigStore {
    path: PathBuf,
}

impl ConfigStore {
    pub fn new<P: AsRef<Path>>(path: P) -> Self {
        Self {
            path: path.as_ref().to_path_buf(),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn load(&self) -> Result<RawConfig, ConfigError> {
        let contents = fs::read_to_string(&self.path).map_err(|source| ConfigError::Io {
            path: self.path.clone(),
            source,
        })?;
        Ok(parse_config(&contents))
    }

    /// Like [`ConfigStore::load`], but a missing file yields an empty config.
    pub fn load_or_default(&self) -> Result<RawConfig, ConfigError> {
        match self.load() {
            Err(ConfigError::Io { source, .. }) if source.kind() == ErrorKind::NotFound => {
                Ok(RawConfig::new())
            }
            other => other,
        }
    }

    /// Replaces the whole file. Callers merge with [`ConfigStore::load_or_default`] first
    /// when unrelated keys must survive.
    pub fn save(&self, config: &RawConfig) -> Result<(), ConfigError> {
        let contents: String = config
            .iter()
            .map(|(key, value)| format!("{key}={value}\n"))
            .collect();
        fs::write(&self.path, contents).map_err(|source| ConfigError::Io {
            path: self.path.clone(),
            source,
        })
    }
}

fn parse_config(contents: &str) -> RawConfig {
    let mut config = RawConfig::new();
    for (index, line) in contents.lines().enumerate() {
        let line = line.strip_suffix('\r').unwrap_or(line);
        match line.split_once('=') {
            Some((key, value)) if !key.is_empty() => {
                config.insert(key.to_string(), value.to_string());
            }
            _ => debug!(line = index + 1, "Ignoring config line without key=value"),
        }
    }
    config
}

/// The secret phrase the sending wallet is derived from.
#[derive(Clone, PartialEq, Eq, Zeroize, ZeroizeOnDrop)]
pub struct Mnemonic(Vec<String>);

impl Mnemonic {
    pub fn from_phrase(phrase: &str) -> Option<Self> {
        let words: Vec<String> = phrase.split_whitespace().map(str::to_string).collect();
        if words.is_empty() {
            None
        } else {
            Some(Self(words))
        }
    }

    pub fn from_words(words: Vec<String>) -> Option<Self> {
        Self::from_phrase(&words.join(" "))
    }

    pub fn words(&self) -> &[String] {
        &self.0
    }

    pub fn phrase(&self) -> String {
        self.0.join(" ")
    }
}

impl fmt::Debug for Mnemonic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Mnemonic([{} words redacted])", self.0.len())
    }
}

/// Typed view of the settings consumed by one disbursement cycle.
#[derive(Debug, Clone)]
pub struct Settings {
    pub seed: Mnemonic,
    pub comment: String,
    /// Only the disbursement loop needs a folder; one-shot commands work without it.
    pub folder_path: Option<PathBuf>,
    pub wallet_address: Option<String>,
    pub ledger_url: String,
}

impl Settings {
    pub fn from_config(config: &RawConfig) -> Result<Self, ConfigError> {
        let seed = config
            .get(KEY_SEED)
            .ok_or(ConfigError::MissingKey(KEY_SEED))?;
        let seed = Mnemonic::from_phrase(seed).ok_or_else(|| ConfigError::InvalidValue {
            key: KEY_SEED,
            reason: "seed phrase is empty".to_string(),
        })?;

        Ok(Self {
            seed,
            comment: config.get(KEY_COMMENT).cloned().unwrap_or_default(),
            folder_path: config
                .get(KEY_FOLDER_PATH)
                .filter(|path| !path.is_empty())
                .map(PathBuf::from),
            wallet_address: config.get(KEY_WALLET_ADDRESS).cloned(),
            ledger_url: ledger_url(config),
        })
    }

    pub fn load(store: &ConfigStore) -> Result<Self, ConfigError> {
        Self::from_config(&store.load()?)
    }

    pub fn folder(&self) -> Result<&Path, ConfigError> {
        self.folder_path
            .as_deref()
            .ok_or(ConfigError::MissingKey(KEY_FOLDER_PATH))
    }
}

/// Wallet gateway endpoint, which is usable even before a wallet exists.
pub fn ledger_url(config: &RawConfig) -> String {
    config
        .get(KEY_LEDGER_URL)
        .filter(|url| !url.is_empty())
        .cloned()
        .unwrap_or_else(|| DEFAULT_LEDGER_URL.to_string())
}

pub const SAMPLE_CONFIG: &str = "\
seed=word1 word2 word3 word4 word5 word6 word7 word8 word9 word10 word11 word12 word13 word14 word15 word16 word17 word18 word19 word20 word21 word22 word23 word24
comment=Payout
folder_path=./receivers
ledger_url=http://127.0.0.1:8081
";
