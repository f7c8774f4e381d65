/*
    Copyright © 2023, ParallelChain Lab
    Licensed under the Apache License, Version 2.0: http://www.apache.org/licenses/LICENSE-2.0
*/

//! Key layout of the disjoint-set variables in the user-provided key-value store.
//!
//! # List of State Variables
//!
//! |Variable|Type|Description|
//! |---|---|---|
//! |Height|`i64`|Height of the last block whose merges were flushed together with this checkpoint.|
//! |Size|`u64`|Number of addresses ever registered. Also the next id to hand out.|
//! |Parent|[`AddressId`] -> `u64`|Union-find parent pointer of each id. Roots point at themselves.|
//! |Rank|[`AddressId`] -> `u64`|Union-by-rank weight of each id.|
//! |Address to Id|[`Address`] -> `u64`|Dense id assigned to each registered address. Append-only.|
//!
//! # Persistence of state variables
//!
//! Keys are UTF-8 strings. Values are **borsh-serialized**, which for the integer types above means
//! 8 little-endian bytes.
//!
//! ## Single values
//!
//! Height and size are stored at the constant keys [`HEIGHT`] and [`SIZE`].
//!
//! ## Mappings
//!
//! Mappings of the form "`A` -> `B`" are stored in one key per entry, formed by concatenating the
//! variable's constant prefix with the textual form of `A`:
//!
//! |Variable|Key|
//! |---|---|
//! |Parent|`p<id>`, e.g., `p42`|
//! |Rank|`r<id>`, e.g., `r42`|
//! |Address to Id|`addr<address>`, e.g., `addr1BoatSLRHtKNngkdXEeobR76b53LETtpyT`|
//!
//! Storing each entry under its own key keeps a flush proportional to the number of entries a block
//! changed, instead of to the size of the whole structure.

use crate::types::data_types::{Address, AddressId};

// State variables
pub const HEIGHT: [u8; 6] = *b"height";
pub const SIZE: [u8; 4] = *b"size";
pub const PARENT: [u8; 1] = *b"p";
pub const RANK: [u8; 1] = *b"r";
pub const ADDRESS_ID: [u8; 4] = *b"addr";

pub fn parent_key(id: AddressId) -> Vec<u8> {
    concat(&PARENT, id.int().to_string().as_bytes())
}

pub fn rank_key(id: AddressId) -> Vec<u8> {
    concat(&RANK, id.int().to_string().as_bytes())
}

pub fn address_id_key(address: &Address) -> Vec<u8> {
    concat(&ADDRESS_ID, address.as_str().as_bytes())
}

/// Concatenate two byteslices into one vector.
pub fn concat(a: &[u8], b: &[u8]) -> Vec<u8> {
    let mut res = Vec::with_capacity(a.len() + b.len());
    res.extend_from_slice(a);
    res.extend_from_slice(b);
    res
}
