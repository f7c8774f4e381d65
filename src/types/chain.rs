/*
    Copyright © 2023, ParallelChain Lab
    Licensed under the Apache License, Version 2.0: http://www.apache.org/licenses/LICENSE-2.0
*/

//! Definitions for the block and transaction types read from the [ledger](crate::ledger).
//!
//! Only the parts of a transaction that address clustering needs are modelled: which outputs an input
//! spends, and which address owns each output.

use borsh::{BorshDeserialize, BorshSerialize};
pub use sha2::Sha256 as CryptoHasher;
use sha2::Digest;

use super::data_types::{Address, BlockHeight, CryptoHash, TxId};

#[derive(Clone, Debug, PartialEq, Eq, BorshSerialize, BorshDeserialize)]
pub struct Block {
    pub height: BlockHeight,
    pub hash: CryptoHash,
    pub tx_ids: Vec<TxId>,
}

impl Block {
    pub fn new(height: BlockHeight, tx_ids: Vec<TxId>) -> Block {
        Block {
            height,
            hash: Block::hash(height, &tx_ids),
            tx_ids,
        }
    }

    pub fn hash(height: BlockHeight, tx_ids: &[TxId]) -> CryptoHash {
        let mut hasher = CryptoHasher::new();
        hasher.update(height.int().to_le_bytes());
        for tx_id in tx_ids {
            hasher.update(tx_id.bytes());
        }
        CryptoHash::new(hasher.finalize().into())
    }
}

/// Reference to the `index`-th output of the transaction identified by `tx_id`.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, BorshSerialize, BorshDeserialize)]
pub struct OutPoint {
    pub tx_id: TxId,
    pub index: u32,
}

impl OutPoint {
    pub fn new(tx_id: TxId, index: u32) -> OutPoint {
        OutPoint { tx_id, index }
    }

    /// The outpoint that coinbase inputs carry.
    pub fn coinbase() -> OutPoint {
        OutPoint {
            tx_id: CryptoHash::zero(),
            index: u32::MAX,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, BorshSerialize, BorshDeserialize)]
pub struct TxInput {
    pub previous_output: OutPoint,
}

impl TxInput {
    pub fn new(previous_output: OutPoint) -> TxInput {
        TxInput { previous_output }
    }

    /// Coinbase inputs create new coins and spend nothing. They are recognized by an all-zero
    /// previous transaction id.
    pub fn is_coinbase(&self) -> bool {
        self.previous_output.tx_id.is_zero()
    }
}

#[derive(Clone, Debug, PartialEq, Eq, BorshSerialize, BorshDeserialize)]
pub struct TxOutput {
    pub value: u64,
    /// `None` for outputs whose locking script does not decode to an address.
    pub address: Option<Address>,
}

impl TxOutput {
    pub fn new(value: u64, address: Option<Address>) -> TxOutput {
        TxOutput { value, address }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, BorshSerialize, BorshDeserialize)]
pub struct Transaction {
    pub inputs: Vec<TxInput>,
    pub outputs: Vec<TxOutput>,
}

impl Transaction {
    pub fn new(inputs: Vec<TxInput>, outputs: Vec<TxOutput>) -> Transaction {
        Transaction { inputs, outputs }
    }

    /// SHA256 hash over the borsh serialization of the transaction.
    pub fn id(&self) -> TxId {
        let mut hasher = CryptoHasher::new();
        hasher.update(&self.try_to_vec().unwrap());
        CryptoHash::new(hasher.finalize().into())
    }

    /// Whether every input of this transaction is a coinbase input.
    pub fn is_coinbase(&self) -> bool {
        !self.inputs.is_empty() && self.inputs.iter().all(TxInput::is_coinbase)
    }
}
