//! The disbursement polling loop.
//!
//! Every cycle reloads the settings, opens a fresh ledger session, samples the wallet
//! balance once and then works through the pending receiver files in name order. A
//! receiver file leaves the pending set only when its batch is confirmed (renamed to
//! `.log`), can never succeed (`.failed`) or went out without a readable confirmation
//! (`.unknown`).

use std::future::Future;
use std::io;
use std::path::{Path, PathBuf};
use std::pin::Pin;
use std::time::Duration;

use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use chrono::Utc;
use tracing::{debug, error, info, warn};

use crate::amount::Nanotons;
use crate::batch;
use crate::completion;
use crate::config::{ConfigStore, Settings};
use crate::error::LedgerError;
use crate::journal::{self, Journal, JournalRecord};
use crate::ledger::{Account, LedgerClient, TxResult};
use crate::receivers::{self, ReceiverList};

/// Sleep between cycles and the backoff after a failed cycle.
pub const POLL_INTERVAL: Duration = Duration::from_secs(60);

/// Below this balance no batch is submitted.
pub const MIN_BALANCE: Nanotons = Nanotons::new(300_000);

/// Resolves on Ctrl-C, or SIGTERM on unix.
pub type Shutdown = Pin<Box<dyn Future<Output = ()> + Send>>;

/// Installs the signal handlers right away, so a signal that arrives during the first
/// cycle still lets that cycle finish instead of killing the process.
pub fn shutdown_signal() -> io::Result<Shutdown> {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{SignalKind, signal};

        let mut interrupt = signal(SignalKind::interrupt())?;
        let mut terminate = signal(SignalKind::terminate())?;
        Ok(Box::pin(async move {
            tokio::select! {
                _ = interrupt.recv() => {}
                _ = terminate.recv() => {}
            }
        }))
    }

    #[cfg(not(unix))]
    {
        let mut ctrl_c = tokio::signal::windows::ctrl_c()?;
        Ok(Box::pin(async move {
            ctrl_c.recv().await;
        }))
    }
}

/// Why a cycle stopped before working through every pending file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CycleHalt {
    ConfigUnavailable,
    LedgerUnavailable,
    FolderUnreadable,
    NoFiles,
    InsufficientBalance { balance: Nanotons },
}

/// Outcome of one cycle.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CycleReport {
    pub balance: Option<Nanotons>,
    /// Files paid in this cycle, by their new name.
    pub submitted: Vec<PathBuf>,
    /// Files paid in an earlier cycle whose rename completed now.
    pub recovered: Vec<PathBuf>,
    /// Files moved out of the pending set without payment.
    pub failed: Vec<PathBuf>,
    /// Files submitted with an unreadable confirmation, set aside for an operator.
    pub quarantined: Vec<PathBuf>,
    /// Files left pending for the next cycle.
    pub deferred: Vec<PathBuf>,
    pub halt: Option<CycleHalt>,
}

enum FileOutcome {
    Submitted(PathBuf),
    Recovered(PathBuf),
    Failed(PathBuf),
    Quarantined(PathBuf),
    Deferred,
    Gated,
}

pub struct Disburser<L: LedgerClient> {
    store: ConfigStore,
    ledger: L,
    poll_interval: Duration,
    min_balance: Nanotons,
}

/// Connection state shared by every file of one cycle.
struct CycleContext<'a, S> {
    session: &'a S,
    account: &'a Account,
    settings: &'a Settings,
    journal: &'a Journal,
    balance: Nanotons,
}

impl<L: LedgerClient> Disburser<L> {
    pub fn new(store: ConfigStore, ledger: L) -> Self {
        Self {
            store,
            ledger,
            poll_interval: POLL_INTERVAL,
            min_balance: MIN_BALANCE,
        }
    }

    pub fn with_poll_interval(mut self, poll_interval: Duration) -> Self {
        self.poll_interval = poll_interval;
        self
    }

    pub fn with_min_balance(mut self, min_balance: Nanotons) -> Self {
        self.min_balance = min_balance;
        self
    }

    pub fn ledger(&self) -> &L {
        &self.ledger
    }

    /// Runs cycles until the process is killed.
    pub async fn run(&self) {
        self.run_until(std::future::pending()).await
    }

    /// Runs cycles until `shutdown` resolves. `shutdown` is only checked between cycles,
    /// so a submitted batch is never abandoned before its file is renamed. Pass a future
    /// whose signal handling is already installed, such as [`shutdown_signal`].
    pub async fn run_until<F: Future<Output = ()>>(&self, shutdown: F) {
        tokio::pin!(shutdown);
        loop {
            let report = self.run_cycle().await;
            debug!(?report, "Cycle report");

            tokio::select! {
                _ = tokio::time::sleep(self.poll_interval) => {}
                _ = &mut shutdown => {
                    info!("Received shutdown signal, exiting...");
                    return;
                }
            }
        }
    }

    /// Runs exactly one cycle. Every failure is logged and reflected in the report.
    pub async fn run_cycle(&self) -> CycleReport {
        let mut report = CycleReport::default();

        let settings = match Settings::load(&self.store) {
            Ok(settings) => settings,
            Err(e) => {
                error!(error = %e, "Error reading config");
                report.halt = Some(CycleHalt::ConfigUnavailable);
                return report;
            }
        };

        let folder = match settings.folder() {
            Ok(folder) => folder.to_path_buf(),
            Err(e) => {
                error!(error = %e, "Error reading config");
                report.halt = Some(CycleHalt::ConfigUnavailable);
                return report;
            }
        };

        // Connect and sample the balance once for the whole cycle
        let session = match self.ledger.connect(&settings.ledger_url).await {
            Ok(session) => session,
            Err(e) => {
                error!(error = %e, endpoint = %settings.ledger_url, "Error connecting to ledger");
                report.halt = Some(CycleHalt::LedgerUnavailable);
                return report;
            }
        };

        let account = match self.ledger.open_account(&session, &settings.seed).await {
            Ok(account) => account,
            Err(e) => {
                error!(error = %e, "Error deriving wallet from seed");
                report.halt = Some(CycleHalt::LedgerUnavailable);
                return report;
            }
        };

        let balance = match self.ledger.balance(&session, &account).await {
            Ok(balance) => balance,
            Err(e) => {
                error!(error = %e, wallet = %account.address, "Error fetching balance");
                report.halt = Some(CycleHalt::LedgerUnavailable);
                return report;
            }
        };
        report.balance = Some(balance);
        debug!(wallet = %account.address, %balance, "Fetched wallet balance");

        let files = match receivers::list_pending(&folder) {
            Ok(files) => files,
            Err(e) => {
                error!(error = %e, "Error reading folder");
                report.halt = Some(CycleHalt::FolderUnreadable);
                return report;
            }
        };
        if files.is_empty() {
            info!(folder = %folder.display(), "No receiver files to process");
            report.halt = Some(CycleHalt::NoFiles);
            return report;
        }

        let journal = Journal::in_folder(&folder);
        let ctx = CycleContext {
            session: &session,
            account: &account,
            settings: &settings,
            journal: &journal,
            balance,
        };

        for file in files {
            match self.process_file(&ctx, &file).await {
                FileOutcome::Submitted(path) => report.submitted.push(path),
                FileOutcome::Recovered(path) => report.recovered.push(path),
                FileOutcome::Failed(path) => report.failed.push(path),
                FileOutcome::Quarantined(path) => report.quarantined.push(path),
                FileOutcome::Deferred => report.deferred.push(file),
                FileOutcome::Gated => {
                    report.halt = Some(CycleHalt::InsufficientBalance { balance });
                    break;
                }
            }
        }

        info!(
            submitted = report.submitted.len(),
            recovered = report.recovered.len(),
            failed = report.failed.len(),
            quarantined = report.quarantined.len(),
            deferred = report.deferred.len(),
            "Cycle finished"
        );
        report
    }

    async fn process_file(&self, ctx: &CycleContext<'_, L::Session>, file: &Path) -> FileOutcome {
        let contents = match receivers::read(file) {
            Ok(contents) => contents,
            Err(e) => {
                error!(error = %e, "Error reading receivers");
                return FileOutcome::Deferred;
            }
        };
        let file_name = file
            .file_name()
            .map(|name| name.to_string_lossy().into_owned())
            .unwrap_or_default();
        let digest = journal::content_digest(contents.as_bytes());

        // Paid in an earlier cycle?
        match ctx.journal.find(&file_name, &digest) {
            Ok(Some(record)) => return recover(ctx.journal, file, &file_name, &record),
            Ok(None) => {}
            Err(e) => {
                error!(
                    file = %file.display(),
                    error = %e,
                    "Journal unreadable, cannot rule out an earlier payment"
                );
                return FileOutcome::Deferred;
            }
        }

        if ctx.balance < self.min_balance {
            warn!(
                balance = %ctx.balance,
                nano = ctx.balance.as_nano(),
                minimum = self.min_balance.as_nano(),
                "Not enough balance"
            );
            return FileOutcome::Gated;
        }

        // Build the batch
        let receivers = ReceiverList::parse_str(&contents);
        let batch = batch::build(&receivers, &ctx.settings.comment);
        if batch.is_empty() {
            warn!(file = %file.display(), "Receiver file has no valid entries");
            return mark_failed(file);
        }

        info!(
            file = %file.display(),
            transfers = batch.len(),
            "Sending transaction and waiting for confirmation..."
        );
        let tx = match self
            .ledger
            .submit(ctx.session, ctx.account, &batch.instructions)
            .await
        {
            Ok(tx) => {
                info!(file = %file.display(), hash = %tx.hash_base64(), "Transaction sent");
                Some(tx)
            }
            Err(e @ LedgerError::UnknownOutcome(_)) => {
                error!(file = %file.display(), error = %e, "Batch may have been paid, not resending");
                None
            }
            Err(e) if e.is_retryable() => {
                error!(file = %file.display(), error = %e, "Transfer err, will retry next cycle");
                return FileOutcome::Deferred;
            }
            Err(e) => {
                error!(file = %file.display(), error = %e, "Transfer rejected");
                return mark_failed(file);
            }
        };

        // Journal before the rename so a failed rename is not paid twice
        let record = JournalRecord {
            file_name: file_name.clone(),
            content_digest: digest,
            tx_hash: tx.as_ref().map(TxResult::hash_base64),
            submitted_at: Utc::now(),
        };
        if let Err(e) = ctx.journal.record(&record) {
            error!(
                file = %file.display(),
                error = %e,
                "Could not journal the submission; a failed rename will pay this file again"
            );
        }

        match tx {
            Some(tx) => match complete(ctx.journal, file, &file_name, &tx) {
                Some(path) => FileOutcome::Submitted(path),
                None => FileOutcome::Deferred,
            },
            None => quarantine(ctx.journal, file, &file_name),
        }
    }
}

/// Finishes a file that was submitted in an earlier cycle without submitting it again.
fn recover(journal: &Journal, file: &Path, file_name: &str, record: &JournalRecord) -> FileOutcome {
    let Some(tx_hash) = &record.tx_hash else {
        warn!(
            file = %file.display(),
            submitted_at = %record.submitted_at,
            "Receiver file was submitted with an unknown outcome, completing rename"
        );
        return quarantine(journal, file, file_name);
    };

    warn!(
        file = %file.display(),
        hash = %tx_hash,
        submitted_at = %record.submitted_at,
        "Receiver file was already paid, completing rename"
    );
    let hash = match STANDARD.decode(tx_hash) {
        Ok(hash) => hash,
        Err(e) => {
            error!(file = %file.display(), error = %e, "Journal record has an unreadable hash");
            return FileOutcome::Deferred;
        }
    };
    let tx = TxResult { hash, block: None };

    match complete(journal, file, file_name, &tx) {
        Some(path) => FileOutcome::Recovered(path),
        None => FileOutcome::Deferred,
    }
}

fn complete(journal: &Journal, file: &Path, file_name: &str, tx: &TxResult) -> Option<PathBuf> {
    match completion::mark_processed(file, &tx.hash_prefix()) {
        Ok(path) => {
            info!(file = %path.display(), "File renamed");
            clear(journal, file_name);
            Some(path)
        }
        Err(e) => {
            error!(error = %e, "Error renaming file");
            None
        }
    }
}

fn quarantine(journal: &Journal, file: &Path, file_name: &str) -> FileOutcome {
    match completion::mark_unknown(file) {
        Ok(path) => {
            warn!(file = %path.display(), "Receiver file set aside, check the wallet history");
            clear(journal, file_name);
            FileOutcome::Quarantined(path)
        }
        Err(e) => {
            error!(error = %e, "Error renaming file");
            FileOutcome::Deferred
        }
    }
}

fn clear(journal: &Journal, file_name: &str) {
    if let Err(e) = journal.clear(file_name) {
        warn!(error = %e, "Could not clear journal record");
    }
}

fn mark_failed(file: &Path) -> FileOutcome {
    match completion::mark_failed(file) {
        Ok(path) => {
            warn!(file = %path.display(), "Receiver file moved out of the pending set");
            FileOutcome::Failed(path)
        }
        Err(e) => {
            error!(error = %e, "Error renaming file");
            FileOutcome::Deferred
        }
    }
}
