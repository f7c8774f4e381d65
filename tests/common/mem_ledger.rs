//! A simple, volatile, in-memory implementation of [`Ledger`].

use std::{
    collections::HashMap,
    sync::{Arc, RwLock},
};

use addr_cluster::{
    ledger::{Ledger, LedgerError},
    types::{
        chain::{Block, OutPoint, Transaction, TxInput, TxOutput},
        data_types::{Address, BlockHeight, TxId},
    },
};

/// An in-memory chain. Clones share the same chain, so tests can keep extending a ledger after handing
/// it to a clusterizer.
#[derive(Clone)]
pub(crate) struct MemLedger(Arc<RwLock<Chain>>);

struct Chain {
    blocks: Vec<Block>,
    transactions: HashMap<TxId, Transaction>,
    // Makes otherwise identical coinbase transactions hash differently.
    nonce: u64,
}

impl MemLedger {
    /// Create a ledger that contains only an empty genesis block at height 0.
    pub(crate) fn new() -> MemLedger {
        let ledger = MemLedger::empty();
        ledger.push_block(Vec::new());
        ledger
    }

    /// Create a ledger without any block, not even a genesis block.
    pub(crate) fn empty() -> MemLedger {
        MemLedger(Arc::new(RwLock::new(Chain {
            blocks: Vec::new(),
            transactions: HashMap::new(),
            nonce: 0,
        })))
    }

    pub(crate) fn tip(&self) -> BlockHeight {
        BlockHeight::new(self.0.read().unwrap().blocks.len() as i32 - 1)
    }

    /// Append a block containing `transactions`, storing each of them, and return its height.
    pub(crate) fn push_block(&self, transactions: Vec<Transaction>) -> BlockHeight {
        let mut chain = self.0.write().unwrap();
        let height = BlockHeight::new(chain.blocks.len() as i32);
        let tx_ids = transactions
            .into_iter()
            .map(|transaction| {
                let tx_id = transaction.id();
                chain.transactions.insert(tx_id, transaction);
                tx_id
            })
            .collect();
        chain.blocks.push(Block::new(height, tx_ids));
        height
    }

    /// Append a block whose transaction ids are listed, without storing the transactions themselves.
    pub(crate) fn push_block_of_ids(&self, tx_ids: Vec<TxId>) -> BlockHeight {
        let mut chain = self.0.write().unwrap();
        let height = BlockHeight::new(chain.blocks.len() as i32);
        chain.blocks.push(Block::new(height, tx_ids));
        height
    }

    /// Store `transaction` without putting it in a block.
    pub(crate) fn insert_transaction(&self, transaction: Transaction) -> TxId {
        let tx_id = transaction.id();
        self.0.write().unwrap().transactions.insert(tx_id, transaction);
        tx_id
    }

    /// Build a coinbase transaction that pays each of `addresses` in its own output.
    pub(crate) fn coinbase(&self, addresses: &[&str]) -> Transaction {
        let mut chain = self.0.write().unwrap();
        chain.nonce += 1;
        Transaction::new(
            vec![TxInput::new(OutPoint::coinbase())],
            addresses
                .iter()
                .map(|address| TxOutput::new(chain.nonce, Some(Address::from(*address))))
                .collect(),
        )
    }

    /// Append a block with one coinbase transaction paying every address in `addresses`, and return
    /// the outpoint of each address's output, in order.
    pub(crate) fn fund(&self, addresses: &[&str]) -> Vec<OutPoint> {
        let coinbase = self.coinbase(addresses);
        let tx_id = coinbase.id();
        self.push_block(vec![coinbase]);
        (0..addresses.len() as u32)
            .map(|index| OutPoint::new(tx_id, index))
            .collect()
    }
}

impl Ledger for MemLedger {
    fn last_block_height(&self) -> Result<BlockHeight, LedgerError> {
        Ok(self.tip())
    }

    fn block_at_height(&self, height: BlockHeight) -> Result<Block, LedgerError> {
        let chain = self.0.read().unwrap();
        usize::try_from(height.int())
            .ok()
            .and_then(|index| chain.blocks.get(index))
            .cloned()
            .ok_or(LedgerError::BlockNotFound { height })
    }

    fn transaction(&self, tx_id: &TxId) -> Result<Transaction, LedgerError> {
        self.0
            .read()
            .unwrap()
            .transactions
            .get(tx_id)
            .cloned()
            .ok_or(LedgerError::TransactionNotFound { tx_id: *tx_id })
    }
}

/// A transaction that spends every outpoint in `inputs` into a single output paying `to`.
pub(crate) fn spend(inputs: &[OutPoint], to: &str) -> Transaction {
    Transaction::new(
        inputs.iter().copied().map(TxInput::new).collect(),
        vec![TxOutput::new(1, Some(Address::from(to)))],
    )
}
