/*
    Copyright © 2023, ParallelChain Lab
    Licensed under the Apache License, Version 2.0: http://www.apache.org/licenses/LICENSE-2.0
*/

//! Traits for pluggable disjoint-set persistence.
//!
//! The disjoint-set does not care how its variables are stored, only that the backing store offers the
//! abstract functionality of a key-value store with batched writes and prefix scans. Library users
//! can use one of the backends in [`crate::stores`], or implement [`KVStore`], [`KVGet`], and
//! [`WriteBatch`] for their own.

use std::{error::Error, fmt::Display};

use borsh::BorshDeserialize;

use crate::types::data_types::{Address, AddressId, BlockHeight};

use super::variables;

pub trait KVStore: KVGet + Send + 'static {
    type WriteBatch: WriteBatch;

    /// Write every change staged in `wb` in one bulk operation.
    fn write(&mut self, wb: Self::WriteBatch) -> Result<(), StoreIOError>;

    fn clear(&mut self) -> Result<(), StoreIOError>;

    /// Write a single key-value pair.
    fn set(&mut self, key: &[u8], value: &[u8]) -> Result<(), StoreIOError> {
        let mut wb = Self::WriteBatch::new();
        wb.set(key, value);
        self.write(wb)
    }
}

pub trait KVGet {
    /// Get the value stored at `key`, or `None` if the key is absent.
    fn get(&self, key: &[u8]) -> Result<Option<Vec<u8>>, StoreIOError>;

    /// Get every key-value pair whose key starts with `prefix`.
    fn get_prefix_with_keys(&self, prefix: &[u8]) -> Result<Vec<(Vec<u8>, Vec<u8>)>, StoreIOError>;

    fn get_prefix(&self, prefix: &[u8]) -> Result<Vec<Vec<u8>>, StoreIOError> {
        Ok(self
            .get_prefix_with_keys(prefix)?
            .into_iter()
            .map(|(_, value)| value)
            .collect())
    }

    fn keys_with_prefix(&self, prefix: &[u8]) -> Result<Vec<Vec<u8>>, StoreIOError> {
        Ok(self
            .get_prefix_with_keys(prefix)?
            .into_iter()
            .map(|(key, _)| key)
            .collect())
    }

    /* ↓↓↓ Height ↓↓↓ */

    fn height(&self) -> Result<Option<BlockHeight>, KVGetError> {
        match self.get(&variables::HEIGHT)? {
            None => Ok(None),
            Some(bytes) => {
                let height = i64::deserialize(&mut bytes.as_slice()).map_err(|err| {
                    KVGetError::DeserializeValueError {
                        key: Key::Height,
                        source: err,
                    }
                })?;
                let height = i32::try_from(height).map_err(|_| KVGetError::ValueOutOfRange {
                    key: Key::Height,
                })?;
                Ok(Some(BlockHeight::new(height)))
            }
        }
    }

    /* ↓↓↓ Size ↓↓↓ */

    fn size(&self) -> Result<Option<u64>, KVGetError> {
        match self.get(&variables::SIZE)? {
            None => Ok(None),
            Some(bytes) => Ok(Some(u64::deserialize(&mut bytes.as_slice()).map_err(
                |err| KVGetError::DeserializeValueError {
                    key: Key::Size,
                    source: err,
                },
            )?)),
        }
    }

    /* ↓↓↓ Parent ↓↓↓ */

    fn parent(&self, id: AddressId) -> Result<AddressId, KVGetError> {
        let bytes = self
            .get(&variables::parent_key(id))?
            .ok_or(KVGetError::ValueExpectedButNotFound {
                key: Key::Parent { id },
            })?;
        Ok(AddressId::new(u64::deserialize(&mut bytes.as_slice()).map_err(
            |err| KVGetError::DeserializeValueError {
                key: Key::Parent { id },
                source: err,
            },
        )?))
    }

    /* ↓↓↓ Rank ↓↓↓ */

    fn rank(&self, id: AddressId) -> Result<u64, KVGetError> {
        let bytes = self
            .get(&variables::rank_key(id))?
            .ok_or(KVGetError::ValueExpectedButNotFound {
                key: Key::Rank { id },
            })?;
        u64::deserialize(&mut bytes.as_slice()).map_err(|err| KVGetError::DeserializeValueError {
            key: Key::Rank { id },
            source: err,
        })
    }

    /* ↓↓↓ Address to Id ↓↓↓ */

    fn address_id(&self, address: &Address) -> Result<Option<AddressId>, KVGetError> {
        match self.get(&variables::address_id_key(address))? {
            None => Ok(None),
            Some(bytes) => Ok(Some(AddressId::new(
                u64::deserialize(&mut bytes.as_slice()).map_err(|err| {
                    KVGetError::DeserializeValueError {
                        key: Key::AddressId {
                            address: address.clone(),
                        },
                        source: err,
                    }
                })?,
            ))),
        }
    }

    /// Scan every address-to-id mapping in the store.
    fn address_ids(&self) -> Result<Vec<(Address, AddressId)>, KVGetError> {
        self.get_prefix_with_keys(&variables::ADDRESS_ID)?
            .into_iter()
            .map(|(key, value)| -> Result<(Address, AddressId), KVGetError> {
                let address = key
                    .strip_prefix(&variables::ADDRESS_ID[..])
                    .and_then(|suffix| String::from_utf8(suffix.to_vec()).ok())
                    .map(Address::new)
                    .ok_or_else(|| KVGetError::MalformedKey { key: key.clone() })?;
                let id = u64::deserialize(&mut value.as_slice()).map_err(|err| {
                    KVGetError::DeserializeValueError {
                        key: Key::AddressId {
                            address: address.clone(),
                        },
                        source: err,
                    }
                })?;
                Ok((address, AddressId::new(id)))
            })
            .collect()
    }
}

pub trait WriteBatch {
    fn new() -> Self;
    fn set(&mut self, key: &[u8], value: &[u8]);
    fn delete(&mut self, key: &[u8]);

    /// Number of operations staged in the batch.
    fn len(&self) -> usize;

    fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Failure of the backing key-value store itself, e.g., an I/O error in an embedded database.
///
/// Absent keys are **not** reported through this type: [`KVGet::get`] returns `Ok(None)` for them.
#[derive(Debug)]
pub struct StoreIOError {
    source: Box<dyn Error + Send + Sync + 'static>,
}

impl StoreIOError {
    pub fn new(source: impl Into<Box<dyn Error + Send + Sync + 'static>>) -> StoreIOError {
        StoreIOError {
            source: source.into(),
        }
    }
}

impl Display for StoreIOError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "key-value store failure: {}", self.source)
    }
}

impl Error for StoreIOError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        Some(self.source.as_ref())
    }
}

/// Error when trying to read a value corresponding to a given key from the [key value store][KVStore].
/// The error may arise in the following circumstances:
/// 1. The store itself failed,
/// 2. The value corresponding to a given key cannot be deserialized into its expected type,
/// 3. The value corresponding to a given key cannot be found although the disjoint-set's invariants
///    say it must exist,
/// 4. A stored value does not fit the in-memory type, or a scanned key cannot be decoded.
#[derive(Debug)]
pub enum KVGetError {
    StoreIOError(StoreIOError),
    DeserializeValueError { key: Key, source: std::io::Error },
    ValueExpectedButNotFound { key: Key },
    ValueOutOfRange { key: Key },
    MalformedKey { key: Vec<u8> },
}

impl From<StoreIOError> for KVGetError {
    fn from(value: StoreIOError) -> Self {
        KVGetError::StoreIOError(value)
    }
}

impl Display for KVGetError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            KVGetError::StoreIOError(err) => write!(f, "{}", err),
            KVGetError::DeserializeValueError { key, source } => {
                write!(f, "cannot deserialize {}: {}", key, source)
            }
            KVGetError::ValueExpectedButNotFound { key } => write!(f, "{} not found", key),
            KVGetError::ValueOutOfRange { key } => write!(f, "{} is out of range", key),
            KVGetError::MalformedKey { key } => write!(f, "malformed key {:?}", key),
        }
    }
}

impl Error for KVGetError {}

/// Identifies a disjoint-set variable in error messages.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Key {
    Height,
    Size,
    Parent { id: AddressId },
    Rank { id: AddressId },
    AddressId { address: Address },
}

impl Display for Key {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Key::Height => write!(f, "Height"),
            Key::Size => write!(f, "Size"),
            Key::Parent { id } => write!(f, "Parent of id {}", id),
            Key::Rank { id } => write!(f, "Rank of id {}", id),
            Key::AddressId { address } => write!(f, "Id of address {}", address),
        }
    }
}

