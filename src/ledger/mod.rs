//! Boundary to the ledger network.
//!
//! The disburser never signs or serializes ledger messages itself. A [`LedgerClient`]
//! derives the wallet, reads balances and submits batches, blocking until the
//! network confirms them.

use async_trait::async_trait;
use base64::Engine;
use base64::engine::general_purpose::{STANDARD, URL_SAFE};

use crate::address::Address;
use crate::amount::Nanotons;
use crate::batch::TransferInstruction;
use crate::config::Mnemonic;
use crate::error::LedgerResult;

pub mod http;
pub mod mock;

pub use http::HttpLedgerClient;
pub use mock::MockLedgerClient;

/// Length of the transaction hash prefix used to tag processed files.
pub const HASH_PREFIX_LEN: usize = 8;

/// The sending wallet, bound to the secret it was derived from.
#[derive(Debug, Clone)]
pub struct Account {
    pub address: Address,
    pub mnemonic: Mnemonic,
}

/// Masterchain block that confirmed a transaction.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BlockRef {
    pub workchain: i32,
    pub shard: i64,
    pub seqno: u32,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TxResult {
    pub hash: Vec<u8>,
    pub block: Option<BlockRef>,
}

impl TxResult {
    /// Standard base64, the form explorers display.
    pub fn hash_base64(&self) -> String {
        STANDARD.encode(&self.hash)
    }

    /// Short path-safe tag derived from the hash.
    pub fn hash_prefix(&self) -> String {
        URL_SAFE.encode(&self.hash).chars().take(HASH_PREFIX_LEN).collect()
    }
}

/// A freshly generated wallet.
#[derive(Debug, Clone)]
pub struct NewWallet {
    pub mnemonic: Mnemonic,
    pub address: Address,
}

#[async_trait]
pub trait LedgerClient: Send + Sync {
    /// Per-cycle connection state.
    type Session: Send + Sync;

    async fn connect(&self, endpoint: &str) -> LedgerResult<Self::Session>;

    async fn open_account(
        &self,
        session: &Self::Session,
        mnemonic: &Mnemonic,
    ) -> LedgerResult<Account>;

    async fn balance(&self, session: &Self::Session, account: &Account) -> LedgerResult<Nanotons>;

    /// Sends all instructions as one transaction and waits for confirmation.
    async fn submit(
        &self,
        session: &Self::Session,
        account: &Account,
        instructions: &[TransferInstruction],
    ) -> LedgerResult<TxResult>;

    async fn create_wallet(&self, session: &Self::Session) -> LedgerResult<NewWallet>;
}
