//! Turns parsed receiver entries into outbound transfer instructions.

use std::ops::BitOr;

use tracing::{error, info};

use crate::address::Address;
use crate::amount::Nanotons;
use crate::receivers::ReceiverList;

/// Message send-mode flags understood by the wallet contract.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SendMode(u8);

impl SendMode {
    /// Fees are paid from the wallet balance on top of the transferred value.
    pub const PAY_FEES_SEPARATELY: SendMode = SendMode(1);
    /// A failing message does not abort the rest of the transaction.
    pub const IGNORE_ERRORS: SendMode = SendMode(2);

    /// Mode shared by every message of a multi-destination batch.
    pub const BATCH: SendMode = SendMode(1 | 2);

    pub const fn bits(&self) -> u8 {
        self.0
    }

    pub const fn contains(&self, other: SendMode) -> bool {
        self.0 & other.0 == other.0
    }
}

impl BitOr for SendMode {
    type Output = SendMode;

    fn bitor(self, rhs: SendMode) -> SendMode {
        SendMode(self.0 | rhs.0)
    }
}

/// Message body attached to a transfer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Payload {
    Empty,
    Comment(String),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransferInstruction {
    pub destination: Address,
    pub amount: Nanotons,
    pub bounce: bool,
    pub mode: SendMode,
    pub payload: Payload,
}

/// Instructions built from one receiver file.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Batch {
    pub instructions: Vec<TransferInstruction>,
    /// Entries dropped because the address or amount did not parse.
    pub rejected: usize,
}

impl Batch {
    pub fn is_empty(&self) -> bool {
        self.instructions.is_empty()
    }

    pub fn len(&self) -> usize {
        self.instructions.len()
    }

    pub fn total(&self) -> Option<Nanotons> {
        self.instructions
            .iter()
            .try_fold(Nanotons::ZERO, |sum, instruction| {
                sum.checked_add(instruction.amount)
            })
    }
}

/// Builds one instruction per valid entry, all carrying the same comment.
pub fn build(receivers: &ReceiverList, comment: &str) -> Batch {
    let payload = Payload::Comment(comment.to_string());
    let mut batch = Batch::default();

    for entry in receivers.entries() {
        let destination = match entry.destination.parse::<Address>() {
            Ok(destination) => destination,
            Err(e) => {
                error!(line = entry.line, address = %entry.destination, error = %e, "Error parsing address");
                batch.rejected += 1;
                continue;
            }
        };

        let amount = match Nanotons::from_ton_str(&entry.amount) {
            Ok(amount) => amount,
            Err(e) => {
                error!(line = entry.line, amount = %entry.amount, error = %e, "Error parsing amount");
                batch.rejected += 1;
                continue;
            }
        };

        batch.instructions.push(TransferInstruction {
            bounce: destination.is_bounceable(),
            destination,
            amount,
            mode: SendMode::BATCH,
            payload: payload.clone(),
        });
    }

    info!(
        instructions = batch.len(),
        rejected = batch.rejected,
        "Built transfer batch"
    );
    batch
}
