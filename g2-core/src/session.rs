//! The outer state machine: handshake, per-slot fetch, steady-state
//! poll, and reaction to patch-change/disconnect events (`spec.md` §4.6).

use crate::catalog;
use crate::codec::{self, Indication, InterruptFrame, ParsedPatch, SessionState};
use crate::crc16;
use crate::error::{SessionError, SessionResult, TransportError};
use crate::model::{self, Cable, Module, Slot, SlotState, NUM_SLOTS};
use crate::patchdb::PatchDb;
use crate::queue::{EditCommand, MessageQueue};
use crate::transport::{Transport, DEFAULT_TIMEOUT_MS, EP_EXTENDED_IN, EP_INTERRUPT_IN};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

const RECEIVE_RETRIES: u32 = 5;
const RETRY_SLEEP: Duration = Duration::from_millis(1);

/// Hooks the host registers to learn about session events
/// (`spec.md` §4.6 "Observer hooks"). Both fire synchronously on the
/// `SessionMachine` thread; implementations must not block.
pub trait Observer {
    /// Fired after any successful `receive_one` — "something happened,
    /// redraw".
    fn on_wake(&mut self) {}
    /// Fired once after `Stop` clears the DB and once after `Start`
    /// completes a full re-fetch.
    fn on_full_patch_change(&mut self) {}
}

/// An `Observer` that does nothing; useful for tests and headless use.
#[derive(Default)]
pub struct NullObserver;
impl Observer for NullObserver {}

/// The single-threaded USB worker. Owns the `Transport`; the GUI talks
/// to it only through the shared `PatchDb` and a `MessageQueueSender`.
pub struct SessionMachine<T: Transport, O: Observer> {
    transport: T,
    observer: O,
    db: Arc<PatchDb>,
    queue: MessageQueue,
    shutdown: Arc<AtomicBool>,
    state: SessionState,
    slot_version: [u8; NUM_SLOTS],
    slot_state: [SlotState; NUM_SLOTS],
    patch_version_changed: bool,
    /// The slot a slot-less indication (`ParamChange`, `SUB_RESPONSE_VOLUME_INDICATOR`,
    /// etc.) applies to — mirrors the original's single global `gSlot`
    /// (`usbComms.c:517`, `protocol.c:74-89`), updated by the handshake's
    /// `SelectSlot` step and by `EditCommand::SelectSlot`.
    current_slot: Slot,
}

impl<T: Transport, O: Observer> SessionMachine<T, O> {
    pub fn new(transport: T, db: Arc<PatchDb>, queue: MessageQueue, observer: O, shutdown: Arc<AtomicBool>) -> Self {
        SessionMachine {
            transport,
            observer,
            db,
            queue,
            shutdown,
            state: SessionState::FindDevice,
            slot_version: [0; NUM_SLOTS],
            slot_state: std::array::from_fn(|_| SlotState::new()),
            patch_version_changed: false,
            current_slot: 0,
        }
    }

    /// Run until the shutdown flag is set (`spec.md` §5 "Cancellation").
    pub fn run(&mut self) {
        while !self.shutdown.load(Ordering::Relaxed) {
            self.step();
        }
    }

    /// One iteration of the outer loop. Public so tests can single-step.
    pub fn step(&mut self) {
        if self.patch_version_changed && !matches!(self.state, SessionState::FindDevice) {
            self.patch_version_changed = false;
            self.state = SessionState::Stop;
        }

        match self.state {
            SessionState::FindDevice => {
                // Transport is already open by construction in this
                // design (unlike the original, which reopens here); a
                // real reconnect path would call `T::open()` again,
                // which needs an `Open` associated constructor not
                // expressible through the `Transport` trait object used
                // in tests. Advance straight to `Init`.
                self.state = SessionState::Init;
            }
            SessionState::Poll => self.poll_once(),
            state => self.handshake_step(state),
        }
    }

    fn handshake_step(&mut self, state: SessionState) {
        let current_slot = match state {
            SessionState::GetPatch(s) | SessionState::GetPatchName(s) => s,
            _ => 0,
        };
        let sv = self.slot_version;
        let Some(frame) = codec::emit_command(state, |s| sv[s as usize]) else {
            self.state = state.next();
            return;
        };
        if let Err(e) = self.transport.bulk_out(crate::transport::EP_BULK_OUT, &frame, DEFAULT_TIMEOUT_MS) {
            self.handle_transport_error(e);
            return;
        }
        match self.receive_one(current_slot) {
            Ok(indication) => {
                self.observer.on_wake();
                self.apply_indication(state, indication);
                if matches!(state, SessionState::SelectSlot) {
                    // The handshake always requests slot 0 (`emit_command`).
                    self.current_slot = 0;
                }
                self.state = state.next();
                if matches!(state, SessionState::Stop) {
                    self.observer.on_full_patch_change();
                } else if matches!(self.state, SessionState::Poll) {
                    self.observer.on_full_patch_change();
                }
            }
            Err(SessionError::Transport(TransportError::NoDevice)) => {
                self.state = SessionState::FindDevice;
            }
            Err(_) => {
                // Timeout / bad CRC: stay put, the caller's loop retries.
            }
        }
    }

    fn poll_once(&mut self) {
        if let Some(cmd) = self.queue.try_recv() {
            let sv = self.slot_version;
            let frame = codec::emit_edit(&cmd, |s| sv[s as usize]);
            if let Err(e) = self.transport.bulk_out(crate::transport::EP_BULK_OUT, &frame, DEFAULT_TIMEOUT_MS) {
                self.handle_transport_error(e);
                return;
            }
            if let EditCommand::SelectSlot { slot } = cmd {
                self.current_slot = slot;
            }
            return;
        }
        match self.receive_one(self.current_slot) {
            Ok(indication) => {
                self.observer.on_wake();
                self.apply_indication(SessionState::Poll, indication);
            }
            Err(SessionError::Transport(TransportError::NoDevice)) => {
                self.state = SessionState::FindDevice;
            }
            Err(_) => {}
        }
    }

    fn handle_transport_error(&mut self, e: TransportError) {
        if matches!(e, TransportError::NoDevice) {
            self.state = SessionState::FindDevice;
        }
    }

    /// Mutate the DB/slot tables in reaction to one parsed indication.
    fn apply_indication(&mut self, state: SessionState, indication: Indication) {
        match indication {
            Indication::PatchVersionChange => self.patch_version_changed = true,
            Indication::PatchVersion { slot, version } => {
                if (slot as usize) < NUM_SLOTS {
                    self.slot_version[slot as usize] = version;
                    self.slot_state[slot as usize].patch_version = version;
                }
            }
            Indication::ParamChange { location, module_index, param_index, variation, value } => {
                self.apply_param_change(location, module_index, param_index, variation, value);
            }
            Indication::Patch(patch) => {
                let slot = match state {
                    SessionState::GetPatch(s) | SessionState::GetPatchName(s) => s,
                    _ => 0,
                };
                self.apply_patch(slot, *patch);
            }
            Indication::SynthSettings(bytes) => {
                for st in self.slot_state.iter_mut() {
                    st.synth_settings = bytes.clone();
                }
            }
            Indication::PatchName(_name) => {}
            Indication::InitAck | Indication::Ok | Indication::Error | Indication::Volume { .. } | Indication::Led { .. } => {}
            Indication::Unknown(_) => {}
        }

        if matches!(state, SessionState::Stop) {
            for slot in 0..NUM_SLOTS as Slot {
                self.db.clear_modules(slot);
                self.db.clear_cables(slot);
            }
        }
    }

    /// A `ParamChange` indication carries no slot field on the wire — it
    /// applies to `current_slot`, matching the original's single global
    /// `gSlot` (`usbComms.c:517`, `protocol.c:74-89`). Module indices are
    /// assigned independently per slot, so scanning every slot for a
    /// match would silently corrupt another slot's module of the same
    /// index.
    fn apply_param_change(&mut self, location: model::Location, module_index: u8, param_index: u8, variation: u8, value: u8) {
        let key = model::ModuleKey { slot: self.current_slot, location, index: module_index };
        // Silently tolerating a missing module is allowed here
        // (`spec.md` §4.5) — the GUI may be racing the device.
        if let Some(mut m) = self.db.read_module(key) {
            if let Some(cell) = m.params.get_mut(variation as usize).and_then(|v| v.get_mut(param_index as usize)) {
                cell.value = value;
                self.db.write_module(m);
            }
        }
    }

    fn apply_patch(&mut self, slot: Slot, patch: ParsedPatch) {
        if let Some(descr) = patch.descr {
            self.slot_state[slot as usize].patch_descr = descr;
        }
        if !patch.knobs.is_empty() {
            self.slot_state[slot as usize].knobs = patch.knobs;
        }
        if !patch.controllers.is_empty() {
            self.slot_state[slot as usize].controllers = patch.controllers;
        }
        if let Some(note2) = patch.note2 {
            self.slot_state[slot as usize].note2 = note2;
        }
        if let Some(notes) = patch.patch_notes {
            self.slot_state[slot as usize].patch_notes = notes;
        }
        if patch.morph_count != 0 {
            self.slot_state[slot as usize].morph_count = patch.morph_count;
        }
        for module in patch.modules {
            self.write_module(slot, module);
        }
        for cable in patch.cables {
            self.write_cable(slot, cable);
        }
    }

    fn write_module(&self, _slot: Slot, module: Module) {
        self.db.write_module(module);
    }

    fn write_cable(&self, _slot: Slot, cable: Cable) {
        self.db.write_cable(cable);
    }

    /// `spec.md` §4.6 `receive_one()`: an interrupt read with retries,
    /// dispatched to an extended follow-up read when announced.
    fn receive_one(&mut self, slot: Slot) -> SessionResult<Indication> {
        let mut buf = [0u8; 16];
        let n = self.read_with_retries(EP_INTERRUPT_IN, &mut buf)?;
        match codec::parse_interrupt_frame(&buf[..n]) {
            InterruptFrame::Empty => Err(SessionError::Transport(TransportError::Timeout)),
            InterruptFrame::Embedded(payload) => self.dispatch(&payload, slot),
            InterruptFrame::ExtendedFollowUp { data_length } => {
                let mut ext = vec![0u8; data_length.max(16)];
                let read = self.read_with_retries(EP_EXTENDED_IN, &mut ext)?;
                if read != data_length {
                    return Err(SessionError::Codec(crate::error::CodecError::ShortFrame));
                }
                let payload = crc16::split_and_verify(&ext[..data_length])
                    .map_err(|(computed, expected)| SessionError::Codec(crate::error::CodecError::BadCrc { computed, expected }))?;
                self.dispatch(payload, slot)
            }
        }
    }

    fn dispatch(&self, payload: &[u8], slot: Slot) -> SessionResult<Indication> {
        let db = &self.db;
        codec::parse_incoming(
            payload,
            slot,
            catalog::param_count,
            catalog::volume_type,
            catalog::led_type,
            |location, index| {
                db.read_module(model::ModuleKey { slot, location, index })
                    .map(|m| m.module_type)
                    .unwrap_or(0)
            },
        )
        .map_err(SessionError::Codec)
    }

    fn read_with_retries(&mut self, endpoint: u8, buf: &mut [u8]) -> SessionResult<usize> {
        for _ in 0..RECEIVE_RETRIES {
            match self.transport.bulk_in(endpoint, buf, DEFAULT_TIMEOUT_MS) {
                Ok(n) if n > 0 => return Ok(n),
                Ok(_) => std::thread::sleep(RETRY_SLEEP),
                Err(TransportError::NoDevice) => return Err(SessionError::Transport(TransportError::NoDevice)),
                Err(_) => std::thread::sleep(RETRY_SLEEP),
            }
        }
        Ok(0)
    }
}
