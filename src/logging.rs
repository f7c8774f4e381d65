/*
    Copyright © 2023, ParallelChain Lab
    Licensed under the Apache License, Version 2.0: http://www.apache.org/licenses/LICENSE-2.0
*/

//! Functions that log out events.
//!
//! The logs defined in this module are printed if the user enabled them via the clusterizer's
//! [config](crate::clusterizer::Configuration).
//!
//! This crate logs using the [log](https://docs.rs/log/latest/log/) crate. To get these messages
//! printed onto a terminal, either set up a logging implementation of your own or call
//! [`setup_logger`], which installs a [fern](https://docs.rs/fern) dispatcher on stdout.
//!
//! ## Log message format
//!
//! Log messages are CSVs (Comma Separated Values) with at least two values. The first two values are
//! always:
//! 1. The name of the [event](crate::events) in PascalCase (defined in this module as constants).
//! 2. The time the event was emitted (as number of seconds since the Unix Epoch).
//!
//! The rest of the values differ depending on the kind of event. For example, the following snippet
//! is how a [StartBlock](crate::events::StartBlockEvent) is printed:
//!
//! ```text
//! StartBlock, 1701329264, 170, fNGCJyk, 12
//! ```
//!
//! In the snippet:
//! - The third value is the height of the block.
//! - The fourth value is the first seven characters of the Base64 encoding of the block's hash.
//! - The fifth value is the number of transactions in the block.

use std::{sync::Once, time::SystemTime};

use base64::{engine::general_purpose::STANDARD_NO_PAD, Engine as _};
use log::LevelFilter;

use crate::{events::*, types::data_types::BlockHeight};

// Names of each event in PascalCase for printing:
pub const RESTORE: &str = "Restore";
pub const CHECKPOINT: &str = "Checkpoint";

pub const START_BLOCK: &str = "StartBlock";
pub const CAUGHT_UP: &str = "CaughtUp";

pub const FINALIZE: &str = "Finalize";
pub const EXPORT: &str = "Export";

/// Implemented by event types. Used to get a closure that logs the event.
pub(crate) trait Logger {
    /// Returns a pointer to the default logging handler for a given event type.
    fn get_logger() -> Box<dyn Fn(&Self) + Send>;
}

impl Logger for RestoreEvent {
    fn get_logger() -> Box<dyn Fn(&Self) + Send> {
        let logger = |restore_event: &RestoreEvent| {
            log::info!(
                "{}, {}, {}, {}",
                RESTORE,
                secs_since_unix_epoch(restore_event.timestamp),
                checkpointed_height(restore_event.height),
                restore_event.size
            )
        };
        Box::new(logger)
    }
}

impl Logger for StartBlockEvent {
    fn get_logger() -> Box<dyn Fn(&Self) + Send> {
        let logger = |start_block_event: &StartBlockEvent| {
            log::info!(
                "{}, {}, {}, {}, {}",
                START_BLOCK,
                secs_since_unix_epoch(start_block_event.timestamp),
                start_block_event.height,
                first_seven_base64_chars(&start_block_event.block.bytes()),
                start_block_event.transactions
            )
        };
        Box::new(logger)
    }
}

impl Logger for CheckpointEvent {
    fn get_logger() -> Box<dyn Fn(&Self) + Send> {
        let logger = |checkpoint_event: &CheckpointEvent| {
            log::info!(
                "{}, {}, {}, {}, {}",
                CHECKPOINT,
                secs_since_unix_epoch(checkpoint_event.timestamp),
                checkpoint_event.height,
                checkpoint_event.size,
                checkpoint_event.writes
            )
        };
        Box::new(logger)
    }
}

impl Logger for CaughtUpEvent {
    fn get_logger() -> Box<dyn Fn(&Self) + Send> {
        let logger = |caught_up_event: &CaughtUpEvent| {
            log::info!(
                "{}, {}, {}",
                CAUGHT_UP,
                secs_since_unix_epoch(caught_up_event.timestamp),
                checkpointed_height(caught_up_event.height)
            )
        };
        Box::new(logger)
    }
}

impl Logger for FinalizeEvent {
    fn get_logger() -> Box<dyn Fn(&Self) + Send> {
        let logger = |finalize_event: &FinalizeEvent| {
            log::info!(
                "{}, {}, {}",
                FINALIZE,
                secs_since_unix_epoch(finalize_event.timestamp),
                finalize_event.size
            )
        };
        Box::new(logger)
    }
}

impl Logger for ExportEvent {
    fn get_logger() -> Box<dyn Fn(&Self) + Send> {
        let logger = |export_event: &ExportEvent| {
            log::info!(
                "{}, {}, {}, {}, {}",
                EXPORT,
                secs_since_unix_epoch(export_event.timestamp),
                export_event.destination,
                export_event.addresses,
                export_event.clusters
            )
        };
        Box::new(logger)
    }
}

static LOGGER_INIT: Once = Once::new();

/// Install a [fern](https://docs.rs/fern) dispatcher that prints every record at or above `level` to
/// stdout, prefixed by its wall-clock time and level.
///
/// Only the first call has an effect. Later calls, and calls made after another logger has been
/// installed, are no-ops.
pub fn setup_logger(level: LevelFilter) {
    LOGGER_INIT.call_once(|| {
        let _ = fern::Dispatch::new()
            .format(|out, message, record| {
                out.finish(format_args!(
                    "[{:?}][{}] {}",
                    SystemTime::now()
                        .duration_since(SystemTime::UNIX_EPOCH)
                        .unwrap_or_default(),
                    record.level(),
                    message
                ))
            })
            .level(level)
            .chain(std::io::stdout())
            .apply();
    })
}

// Get a more readable representation of a bytesequence by base64-encoding it and taking the first 7 characters.
pub(crate) fn first_seven_base64_chars(bytes: &[u8]) -> String {
    let encoded = STANDARD_NO_PAD.encode(bytes);
    if encoded.len() > 7 {
        encoded[0..7].to_string()
    } else {
        encoded
    }
}

fn secs_since_unix_epoch(timestamp: SystemTime) -> u64 {
    timestamp
        .duration_since(SystemTime::UNIX_EPOCH)
        .map(|duration| duration.as_secs())
        .unwrap_or(0)
}

// "-" stands for a disjoint-set that has never been checkpointed.
fn checkpointed_height(height: Option<BlockHeight>) -> String {
    height.map_or_else(|| String::from("-"), |height| height.to_string())
}
