/*
    Copyright © 2023, ParallelChain Lab
    Licensed under the Apache License, Version 2.0: http://www.apache.org/licenses/LICENSE-2.0
*/

//! Trait for pluggable ledger readers.
//!
//! The clusterizer never parses raw block files or talks to a node itself. It reads the chain through
//! an implementation of [`Ledger`] provided by the library user, e.g., one backed by a block index on
//! disk or by a node's RPC interface.
//!
//! Ledger reads happen both on the clusterizer's driver thread (blocks and the transactions they
//! contain) and concurrently on [worker pool](crate::worker_pool) threads (the transactions whose
//! outputs are being spent), so implementations must be `Send + Sync`.

use std::{error::Error, fmt::Display};

use crate::types::{
    chain::{Block, Transaction},
    data_types::{BlockHeight, TxId},
};

pub trait Ledger: Send + Sync + 'static {
    /// Height of the newest block the ledger knows about.
    fn last_block_height(&self) -> Result<BlockHeight, LedgerError>;

    fn block_at_height(&self, height: BlockHeight) -> Result<Block, LedgerError>;

    fn transaction(&self, tx_id: &TxId) -> Result<Transaction, LedgerError>;
}

/// Error when reading from a [`Ledger`].
#[derive(Debug)]
pub enum LedgerError {
    BlockNotFound {
        height: BlockHeight,
    },
    TransactionNotFound {
        tx_id: TxId,
    },
    /// An input spends an output index that its previous transaction does not have.
    OutputNotFound {
        tx_id: TxId,
        index: u32,
    },
    /// The ledger's own storage or transport failed.
    Backend {
        source: Box<dyn Error + Send + Sync + 'static>,
    },
}

impl Display for LedgerError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            LedgerError::BlockNotFound { height } => write!(f, "block at height {} not found", height),
            LedgerError::TransactionNotFound { tx_id } => {
                write!(f, "transaction {} not found", tx_id)
            }
            LedgerError::OutputNotFound { tx_id, index } => {
                write!(f, "output {} of transaction {} not found", index, tx_id)
            }
            LedgerError::Backend { source } => write!(f, "ledger backend failure: {}", source),
        }
    }
}

impl Error for LedgerError {}
