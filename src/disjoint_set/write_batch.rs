/*
    Copyright © 2023, ParallelChain Lab
    Licensed under the Apache License, Version 2.0: http://www.apache.org/licenses/LICENSE-2.0
*/

//! Typed staging area for disjoint-set writes.

use std::{error::Error, fmt::Display};

use borsh::BorshSerialize;

use crate::types::data_types::{Address, AddressId, BlockHeight};

use super::{
    pluggables::{Key, WriteBatch},
    variables,
};

/// Pending writes accumulated while processing one block.
///
/// A `DisjointSetWriteBatch` is owned by the caller and passed by `&mut` into every
/// [`DisjointSet`](super::DisjointSet) method that changes structure. Nothing in it is durable until it
/// is handed to [`flush`](super::DisjointSet::flush).
pub struct DisjointSetWriteBatch<W: WriteBatch> {
    pub(super) inner: W,
    pub(super) height: Option<BlockHeight>,
}

impl<W: WriteBatch> DisjointSetWriteBatch<W> {
    pub fn new() -> DisjointSetWriteBatch<W> {
        DisjointSetWriteBatch {
            inner: W::new(),
            height: None,
        }
    }

    /// Number of keys staged so far.
    pub fn len(&self) -> usize {
        self.inner.len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.is_empty()
    }

    /// The checkpoint height that this batch will commit, if any.
    pub fn checkpoint(&self) -> Option<BlockHeight> {
        self.height
    }

    /* ↓↓↓ Height ↓↓↓ */

    pub fn set_height(&mut self, height: BlockHeight) -> Result<(), KVSetError> {
        self.inner.set(
            &variables::HEIGHT,
            &(height.int() as i64)
                .try_to_vec()
                .map_err(|err| KVSetError::SerializeValueError {
                    key: Key::Height,
                    source: err,
                })?,
        );
        self.height = Some(height);
        Ok(())
    }

    /* ↓↓↓ Size ↓↓↓ */

    pub fn set_size(&mut self, size: u64) -> Result<(), KVSetError> {
        self.inner.set(
            &variables::SIZE,
            &size
                .try_to_vec()
                .map_err(|err| KVSetError::SerializeValueError {
                    key: Key::Size,
                    source: err,
                })?,
        );
        Ok(())
    }

    /* ↓↓↓ Parent ↓↓↓ */

    pub fn set_parent(&mut self, id: AddressId, parent: AddressId) -> Result<(), KVSetError> {
        self.inner.set(
            &variables::parent_key(id),
            &parent
                .int()
                .try_to_vec()
                .map_err(|err| KVSetError::SerializeValueError {
                    key: Key::Parent { id },
                    source: err,
                })?,
        );
        Ok(())
    }

    /* ↓↓↓ Rank ↓↓↓ */

    pub fn set_rank(&mut self, id: AddressId, rank: u64) -> Result<(), KVSetError> {
        self.inner.set(
            &variables::rank_key(id),
            &rank
                .try_to_vec()
                .map_err(|err| KVSetError::SerializeValueError {
                    key: Key::Rank { id },
                    source: err,
                })?,
        );
        Ok(())
    }

    /* ↓↓↓ Address to Id ↓↓↓ */

    pub fn set_address_id(&mut self, address: &Address, id: AddressId) -> Result<(), KVSetError> {
        self.inner.set(
            &variables::address_id_key(address),
            &id.int()
                .try_to_vec()
                .map_err(|err| KVSetError::SerializeValueError {
                    key: Key::AddressId {
                        address: address.clone(),
                    },
                    source: err,
                })?,
        );
        Ok(())
    }
}

impl<W: WriteBatch> Default for DisjointSetWriteBatch<W> {
    fn default() -> Self {
        Self::new()
    }
}

/// Error when writing a key-value pair to the [write batch][DisjointSetWriteBatch].
/// The error may arise when the value cannot be serialized, and hence cannot be
/// written to the write batch.
#[derive(Debug)]
pub enum KVSetError {
    SerializeValueError { key: Key, source: std::io::Error },
}

impl Display for KVSetError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            KVSetError::SerializeValueError { key, source } => {
                write!(f, "cannot serialize {}: {}", key, source)
            }
        }
    }
}

impl Error for KVSetError {}
