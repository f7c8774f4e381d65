/*
    Copyright © 2023, ParallelChain Lab
    Licensed under the Apache License, Version 2.0: http://www.apache.org/licenses/LICENSE-2.0
*/

//! Thread that receives published [events](crate::events) and fires the registered handlers.

use std::{
    sync::mpsc::Receiver,
    thread::{self, JoinHandle},
};

use crate::events::*;
use crate::logging::Logger;

pub(crate) type HandlerPtr<T> = Box<dyn Fn(&T) + Send>;

/// Handlers for every event type. Handlers of one type fire in the order they were registered.
pub(crate) struct EventHandlers {
    pub(crate) restore_handlers: Vec<HandlerPtr<RestoreEvent>>,
    pub(crate) start_block_handlers: Vec<HandlerPtr<StartBlockEvent>>,
    pub(crate) checkpoint_handlers: Vec<HandlerPtr<CheckpointEvent>>,
    pub(crate) caught_up_handlers: Vec<HandlerPtr<CaughtUpEvent>>,
    pub(crate) finalize_handlers: Vec<HandlerPtr<FinalizeEvent>>,
    pub(crate) export_handlers: Vec<HandlerPtr<ExportEvent>>,
}

impl EventHandlers {
    /// Create the handler lists, starting with the default loggers if `log_events` is set, followed
    /// by the user-provided handler of each type, if any.
    pub(crate) fn new(
        log_events: bool,
        restore_handler: Option<HandlerPtr<RestoreEvent>>,
        start_block_handler: Option<HandlerPtr<StartBlockEvent>>,
        checkpoint_handler: Option<HandlerPtr<CheckpointEvent>>,
        caught_up_handler: Option<HandlerPtr<CaughtUpEvent>>,
        finalize_handler: Option<HandlerPtr<FinalizeEvent>>,
        export_handler: Option<HandlerPtr<ExportEvent>>,
    ) -> EventHandlers {
        fn handlers<T: Logger>(log_events: bool, user: Option<HandlerPtr<T>>) -> Vec<HandlerPtr<T>> {
            let mut handlers = Vec::new();
            if log_events {
                handlers.push(T::get_logger());
            }
            handlers.extend(user);
            handlers
        }

        EventHandlers {
            restore_handlers: handlers(log_events, restore_handler),
            start_block_handlers: handlers(log_events, start_block_handler),
            checkpoint_handlers: handlers(log_events, checkpoint_handler),
            caught_up_handlers: handlers(log_events, caught_up_handler),
            finalize_handlers: handlers(log_events, finalize_handler),
            export_handlers: handlers(log_events, export_handler),
        }
    }

    pub(crate) fn is_empty(&self) -> bool {
        self.restore_handlers.is_empty()
            && self.start_block_handlers.is_empty()
            && self.checkpoint_handlers.is_empty()
            && self.caught_up_handlers.is_empty()
            && self.finalize_handlers.is_empty()
            && self.export_handlers.is_empty()
    }

    pub(crate) fn fire_handlers(&self, event: Event) {
        match event {
            Event::Restore(restore_event) => self
                .restore_handlers
                .iter()
                .for_each(|handler| handler(&restore_event)),

            Event::StartBlock(start_block_event) => self
                .start_block_handlers
                .iter()
                .for_each(|handler| handler(&start_block_event)),

            Event::Checkpoint(checkpoint_event) => self
                .checkpoint_handlers
                .iter()
                .for_each(|handler| handler(&checkpoint_event)),

            Event::CaughtUp(caught_up_event) => self
                .caught_up_handlers
                .iter()
                .for_each(|handler| handler(&caught_up_event)),

            Event::Finalize(finalize_event) => self
                .finalize_handlers
                .iter()
                .for_each(|handler| handler(&finalize_event)),

            Event::Export(export_event) => self
                .export_handlers
                .iter()
                .for_each(|handler| handler(&export_event)),
        }
    }
}

/// Start the event bus thread. It runs until every publisher has been dropped and every event
/// published before that has been handled.
pub(crate) fn start_event_bus(
    event_handlers: EventHandlers,
    event_subscriber: Receiver<Event>,
) -> JoinHandle<()> {
    thread::spawn(move || {
        for event in event_subscriber {
            event_handlers.fire_handlers(event)
        }
    })
}
