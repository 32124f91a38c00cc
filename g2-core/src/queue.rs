//! Bounded FIFO of outgoing edits from the GUI/host to the session loop.
//!
//! The host thread never blocks on USB (`spec.md` §5): it posts into this
//! queue and returns, and `SessionMachine` drains it with a non-blocking
//! try-receive during its `Poll` state.

use crate::model::{CableKey, Location, Slot};
use std::sync::mpsc;

/// One pending edit, mirroring the `SUB_COMMAND_*` set in `spec.md` §6.
#[derive(Debug, Clone, PartialEq)]
pub enum EditCommand {
    SelectSlot { slot: Slot },
    StartStop { stop: bool },
    SetParam {
        slot: Slot,
        location: Location,
        module_index: u8,
        param_index: u8,
        variation: u8,
        value: u8,
    },
    SetMode {
        slot: Slot,
        location: Location,
        module_index: u8,
        mode_index: u8,
        value: u8,
    },
    WriteCable {
        slot: Slot,
        location: Location,
        module_from_index: u8,
        connector_from_io_count: u8,
        link_type: crate::model::LinkType,
        module_to_index: u8,
        connector_to_io_count: u8,
        colour: u8,
    },
    AddModule {
        slot: Slot,
        location: Location,
        module_type: u8,
        row: u8,
        column: u8,
    },
    MoveModule {
        slot: Slot,
        location: Location,
        module_index: u8,
        row: u8,
        column: u8,
    },
    DeleteModule {
        slot: Slot,
        location: Location,
        module_index: u8,
    },
    DeleteCable {
        slot: Slot,
        key: CableKey,
    },
    SetModuleUpRate {
        slot: Slot,
        location: Location,
        module_index: u8,
        up_rate: bool,
    },
    SetMorphRange {
        slot: Slot,
        location: Location,
        module_index: u8,
        param_index: u8,
        morph: u8,
        range: u8,
    },
    SelectVariation { slot: Slot, variation: u8 },
}

impl EditCommand {
    /// The slot this command carries the patch-version byte for.
    pub fn slot(&self) -> Slot {
        match *self {
            EditCommand::SelectSlot { slot }
            | EditCommand::SetParam { slot, .. }
            | EditCommand::SetMode { slot, .. }
            | EditCommand::WriteCable { slot, .. }
            | EditCommand::AddModule { slot, .. }
            | EditCommand::MoveModule { slot, .. }
            | EditCommand::DeleteModule { slot, .. }
            | EditCommand::DeleteCable { slot, .. }
            | EditCommand::SetModuleUpRate { slot, .. }
            | EditCommand::SetMorphRange { slot, .. }
            | EditCommand::SelectVariation { slot, .. } => slot,
            EditCommand::StartStop { .. } => 0,
        }
    }
}

/// The producer handle: cheap to clone, shareable across GUI threads.
#[derive(Clone)]
pub struct MessageQueueSender(mpsc::SyncSender<EditCommand>);

impl MessageQueueSender {
    /// Enqueue a command without blocking. Returns the command back if
    /// the queue is full or the session loop has shut down — the caller
    /// decides whether to drop it or retry later.
    pub fn post(&self, cmd: EditCommand) -> Result<(), EditCommand> {
        self.0.try_send(cmd).map_err(|e| match e {
            mpsc::TrySendError::Full(c) => c,
            mpsc::TrySendError::Disconnected(c) => c,
        })
    }
}

/// The consumer side, owned by `SessionMachine`.
pub struct MessageQueue {
    sender: mpsc::SyncSender<EditCommand>,
    receiver: mpsc::Receiver<EditCommand>,
}

impl MessageQueue {
    pub fn new(capacity: usize) -> Self {
        let (sender, receiver) = mpsc::sync_channel(capacity);
        MessageQueue { sender, receiver }
    }

    pub fn sender(&self) -> MessageQueueSender {
        MessageQueueSender(self.sender.clone())
    }

    /// Non-blocking dequeue; `None` means the queue was empty (the
    /// normal, expected case in `Poll`, per `spec.md` §7 `QueueEmpty`).
    pub fn try_recv(&self) -> Option<EditCommand> {
        self.receiver.try_recv().ok()
    }
}

impl Default for MessageQueue {
    fn default() -> Self {
        // The GUI can have at most a handful of edits in flight before the
        // session loop drains them; 256 gives generous headroom without
        // ever blocking a real editing session.
        MessageQueue::new(256)
    }
}
