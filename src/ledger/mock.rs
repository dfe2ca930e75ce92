//! In-memory ledger client for tests.

use std::collections::VecDeque;
use std::sync::Arc;
use std::sync::atomic::{AtomicU8, AtomicUsize, Ordering};

use async_trait::async_trait;
use parking_lot::Mutex;

use super::{Account, LedgerClient, NewWallet, TxResult};
use crate::address::Address;
use crate::amount::Nanotons;
use crate::batch::TransferInstruction;
use crate::config::Mnemonic;
use crate::error::{LedgerError, LedgerResult};

/// Wallet address every mock account resolves to.
pub const MOCK_WALLET_ADDRESS: &str = "EQAAAQIDBAUGBwgJCgsMDQ4PEBESExQVFhcYGRobHB0eHx2j";

/// Record of one `submit` call.
#[derive(Debug, Clone)]
pub struct MockSubmission {
    pub account: Address,
    pub instructions: Vec<TransferInstruction>,
}

/// Scriptable [`LedgerClient`].
///
/// Failures and submit results are consumed in FIFO order. Without a scripted
/// result, `submit` succeeds with hash `[n; 32]` where `n` counts unscripted
/// submissions from 1.
///
/// # Example
/// ```ignore
/// let ledger = MockLedgerClient::new(Nanotons::new(5_000_000_000));
/// ledger.push_submit_result(Err(LedgerError::Submit("busy".into())));
/// ```
#[derive(Clone)]
pub struct MockLedgerClient {
    address: Address,
    balance: Arc<Mutex<Nanotons>>,
    connect_failures: Arc<Mutex<VecDeque<LedgerError>>>,
    balance_failures: Arc<Mutex<VecDeque<LedgerError>>>,
    submit_results: Arc<Mutex<VecDeque<LedgerResult<TxResult>>>>,
    submissions: Arc<Mutex<Vec<MockSubmission>>>,
    connects: Arc<AtomicUsize>,
    balance_queries: Arc<AtomicUsize>,
    last_endpoint: Arc<Mutex<Option<String>>>,
    next_hash: Arc<AtomicU8>,
}

impl MockLedgerClient {
    pub fn new(balance: Nanotons) -> Self {
        let address = MOCK_WALLET_ADDRESS
            .parse()
            .unwrap_or_else(|_| Address::new(0, [0; 32], true));
        Self {
            address,
            balance: Arc::new(Mutex::new(balance)),
            connect_failures: Arc::new(Mutex::new(VecDeque::new())),
            balance_failures: Arc::new(Mutex::new(VecDeque::new())),
            submit_results: Arc::new(Mutex::new(VecDeque::new())),
            submissions: Arc::new(Mutex::new(Vec::new())),
            connects: Arc::new(AtomicUsize::new(0)),
            balance_queries: Arc::new(AtomicUsize::new(0)),
            last_endpoint: Arc::new(Mutex::new(None)),
            next_hash: Arc::new(AtomicU8::new(1)),
        }
    }

    pub fn set_balance(&self, balance: Nanotons) {
        *self.balance.lock() = balance;
    }

    pub fn fail_next_connect(&self, error: LedgerError) {
        self.connect_failures.lock().push_back(error);
    }

    pub fn fail_next_balance(&self, error: LedgerError) {
        self.balance_failures.lock().push_back(error);
    }

    pub fn push_submit_result(&self, result: LedgerResult<TxResult>) {
        self.submit_results.lock().push_back(result);
    }

    pub fn submissions(&self) -> Vec<MockSubmission> {
        self.submissions.lock().clone()
    }

    pub fn submit_count(&self) -> usize {
        self.submissions.lock().len()
    }

    pub fn connect_count(&self) -> usize {
        self.connects.load(Ordering::SeqCst)
    }

    pub fn balance_query_count(&self) -> usize {
        self.balance_queries.load(Ordering::SeqCst)
    }

    pub fn last_endpoint(&self) -> Option<String> {
        self.last_endpoint.lock().clone()
    }

    pub fn wallet_address(&self) -> &Address {
        &self.address
    }
}

#[async_trait]
impl LedgerClient for MockLedgerClient {
    type Session = ();

    async fn connect(&self, endpoint: &str) -> LedgerResult<()> {
        self.connects.fetch_add(1, Ordering::SeqCst);
        *self.last_endpoint.lock() = Some(endpoint.to_string());
        match self.connect_failures.lock().pop_front() {
            Some(error) => Err(error),
            None => Ok(()),
        }
    }

    async fn open_account(&self, _session: &(), mnemonic: &Mnemonic) -> LedgerResult<Account> {
        Ok(Account {
            address: self.address.clone(),
            mnemonic: mnemonic.clone(),
        })
    }

    async fn balance(&self, _session: &(), _account: &Account) -> LedgerResult<Nanotons> {
        self.balance_queries.fetch_add(1, Ordering::SeqCst);
        if let Some(error) = self.balance_failures.lock().pop_front() {
            return Err(error);
        }
        Ok(*self.balance.lock())
    }

    async fn submit(
        &self,
        _session: &(),
        account: &Account,
        instructions: &[TransferInstruction],
    ) -> LedgerResult<TxResult> {
        self.submissions.lock().push(MockSubmission {
            account: account.address.clone(),
            instructions: instructions.to_vec(),
        });

        let scripted = self.submit_results.lock().pop_front();
        match scripted {
            Some(result) => result,
            None => {
                let n = self.next_hash.fetch_add(1, Ordering::SeqCst);
                Ok(TxResult {
                    hash: vec![n; 32],
                    block: None,
                })
            }
        }
    }

    async fn create_wallet(&self, _session: &()) -> LedgerResult<NewWallet> {
        let words = (1..=24).map(|i| format!("word{i}")).collect();
        let mnemonic = Mnemonic::from_words(words)
            .ok_or_else(|| LedgerError::Account("empty mock seed".to_string()))?;
        Ok(NewWallet {
            mnemonic,
            address: self.address.clone(),
        })
    }
}
