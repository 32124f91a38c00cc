//! End-to-end scenarios mirroring `spec.md` §8 ("S1".."S6"), driven
//! against `ScriptedTransport` rather than real hardware. These only
//! touch `SessionMachine`'s public surface (`new`/`step`/`run`) plus the
//! shared `PatchDb` and a custom `Observer`, since its internal state is
//! private by design — observability goes through the same seams a real
//! embedding host would use.

use g2_core::bitstream::BitStream;
use g2_core::codec::constants::{RESPONSE_TYPE_COMMAND, SUB_RESPONSE_OK, SUB_RESPONSE_PARAM_CHANGE};
use g2_core::model::{Location, Module, ModuleKey};
use g2_core::session::{NullObserver, Observer, SessionMachine};
use g2_core::transport::mocks::{ScriptedRead, ScriptedTransport};
use g2_core::transport::EP_INTERRUPT_IN;
use g2_core::{MessageQueue, PatchDb};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;

/// Wrap a raw command-response payload as one interrupt-endpoint
/// "Embedded" read: `[length:4][type=Embedded(2):4]` then the payload
/// verbatim (`parse_interrupt_frame` only inspects the first byte).
fn embedded(payload: Vec<u8>) -> ScriptedRead {
    let mut out = vec![(payload.len().min(15) as u8) << 4 | 0x02];
    out.extend(payload);
    ScriptedRead::Bytes(out)
}

fn generic_ok() -> ScriptedRead {
    embedded(vec![RESPONSE_TYPE_COMMAND, 0x00, 0x00, SUB_RESPONSE_OK])
}

fn init_ack() -> ScriptedRead {
    embedded(vec![0x80])
}

fn param_change_payload(location: Location, module_index: u8, param_index: u8, value: u8, variation: u8) -> Vec<u8> {
    let mut bs = BitStream::new();
    bs.write(8, RESPONSE_TYPE_COMMAND as u32);
    bs.write(8, 0); // command byte, irrelevant to parsing
    bs.write(8, 0); // version byte, irrelevant to parsing
    bs.write(8, SUB_RESPONSE_PARAM_CHANGE as u32);
    bs.write(2, location.into());
    bs.write(8, module_index as u32);
    bs.write(8, param_index as u32);
    bs.write(8, value as u32);
    bs.write(8, variation as u32);
    bs.into_bytes()
}

#[derive(Default, Clone)]
struct CountingObserver {
    wakes: Arc<AtomicUsize>,
    full_changes: Arc<AtomicUsize>,
}

impl Observer for CountingObserver {
    fn on_wake(&mut self) {
        self.wakes.fetch_add(1, Ordering::SeqCst);
    }
    fn on_full_patch_change(&mut self) {
        self.full_changes.fetch_add(1, Ordering::SeqCst);
    }
}

/// S1/S2: the Init handshake clears any stale `PatchDb` contents the
/// instant `Stop` is acknowledged, and fires `on_full_patch_change`.
#[test]
fn init_handshake_clears_db_and_notifies_observer() {
    let db = Arc::new(PatchDb::new());
    db.write_module(Module::new(ModuleKey { slot: 0, location: Location::Voice, index: 0 }, 1, 12));
    db.write_module(Module::new(ModuleKey { slot: 2, location: Location::Fx, index: 1 }, 1, 12));

    let mut t = ScriptedTransport::new();
    t.push_read(EP_INTERRUPT_IN, init_ack());
    t.push_read(EP_INTERRUPT_IN, generic_ok()); // ack for Stop

    let observer = CountingObserver::default();
    let full_changes = Arc::clone(&observer.full_changes);
    let mut m = SessionMachine::new(t, Arc::clone(&db), MessageQueue::new(8), observer, Arc::new(AtomicBool::new(false)));

    m.step(); // FindDevice -> Init
    m.step(); // Init: send, recv InitAck, -> Stop
    m.step(); // Stop: send, recv Ok, clears db, -> GetSynthSettings

    assert!(db.read_module(ModuleKey { slot: 0, location: Location::Voice, index: 0 }).is_none());
    assert!(db.read_module(ModuleKey { slot: 2, location: Location::Fx, index: 1 }).is_none());
    assert_eq!(full_changes.load(Ordering::SeqCst), 1);
}

/// Drives a `SessionMachine` all the way from `FindDevice` through the
/// full per-slot fetch sequence to `Poll`, acking every handshake step
/// with a generic "Ok" response (S1's shape, repeated).
fn drive_to_poll(t: &mut ScriptedTransport) {
    t.push_read(EP_INTERRUPT_IN, init_ack()); // Init
    for _ in 0..18 {
        // Stop, GetSynthSettings, GetUnknown1, GetUnknown2, SelectSlot,
        // GetPatchVersion x4, GetPatch x4, GetPatchName x4, Start.
        t.push_read(EP_INTERRUPT_IN, generic_ok());
    }
}

/// S3: a parameter-change indication received during steady-state
/// `Poll` updates the matching module's stored value.
#[test]
fn param_change_during_poll_updates_db() {
    let db = Arc::new(PatchDb::new());
    db.write_module(Module::new(ModuleKey { slot: 0, location: Location::Voice, index: 5 }, 1, 12));

    let mut t = ScriptedTransport::new();
    drive_to_poll(&mut t);
    t.push_read(EP_INTERRUPT_IN, embedded(param_change_payload(Location::Voice, 5, 3, 64, 0)));

    let observer = CountingObserver::default();
    let full_changes = Arc::clone(&observer.full_changes);
    let mut m = SessionMachine::new(t, Arc::clone(&db), MessageQueue::new(8), observer, Arc::new(AtomicBool::new(false)));

    for _ in 0..20 {
        m.step(); // FindDevice + 19 handshake steps reaches Poll
    }
    m.step(); // Poll: receives the param-change indication

    let updated = db.read_module(ModuleKey { slot: 0, location: Location::Voice, index: 5 }).unwrap();
    assert_eq!(updated.params[0][3].value, 64);
    // Fired once leaving Stop, once entering Poll (`spec.md` §4.6).
    assert_eq!(full_changes.load(Ordering::SeqCst), 2);
}

/// S3 variant: a parameter change naming a module the DB doesn't have
/// is silently ignored rather than treated as a protocol error.
#[test]
fn param_change_for_unknown_module_does_not_panic_or_write() {
    let db = Arc::new(PatchDb::new());
    let mut t = ScriptedTransport::new();
    drive_to_poll(&mut t);
    t.push_read(EP_INTERRUPT_IN, embedded(param_change_payload(Location::Voice, 9, 3, 64, 0)));

    let mut m = SessionMachine::new(t, Arc::clone(&db), MessageQueue::new(8), NullObserver, Arc::new(AtomicBool::new(false)));
    for _ in 0..21 {
        m.step();
    }
    assert!(db.read_module(ModuleKey { slot: 0, location: Location::Voice, index: 9 }).is_none());
}

/// S6: a missing device during the handshake sends the machine back to
/// `FindDevice`, and it recovers once the device reappears.
#[test]
fn disconnect_during_handshake_recovers_on_reconnect() {
    let db = Arc::new(PatchDb::new());
    db.write_module(Module::new(ModuleKey { slot: 0, location: Location::Voice, index: 0 }, 1, 12));

    let mut t = ScriptedTransport::new();
    t.push_read(EP_INTERRUPT_IN, ScriptedRead::NoDevice); // Init fails
    t.push_read(EP_INTERRUPT_IN, init_ack()); // retried Init succeeds
    t.push_read(EP_INTERRUPT_IN, generic_ok()); // Stop

    let observer = CountingObserver::default();
    let full_changes = Arc::clone(&observer.full_changes);
    let mut m = SessionMachine::new(t, Arc::clone(&db), MessageQueue::new(8), observer, Arc::new(AtomicBool::new(false)));

    m.step(); // FindDevice -> Init
    m.step(); // Init: NoDevice -> back to FindDevice
    m.step(); // FindDevice -> Init (again)
    m.step(); // Init: succeeds -> Stop
    m.step(); // Stop: succeeds, clears db

    assert!(db.read_module(ModuleKey { slot: 0, location: Location::Voice, index: 0 }).is_none());
    assert_eq!(full_changes.load(Ordering::SeqCst), 1);
}

/// S4: `SelectVariation` produces the exact frame shape `spec.md` §8's
/// S4 worked example describes (offsets, not the example's own
/// internally-inconsistent literal bytes — see `DESIGN.md`).
#[test]
fn select_variation_frame_shape_matches_s4() {
    use g2_core::codec::commands::emit_edit;
    use g2_core::codec::constants::{command_slot, COMMAND_REQ, SUB_COMMAND_SELECT_VARIATION};
    use g2_core::EditCommand;

    let cmd = EditCommand::SelectVariation { slot: 2, variation: 3 };
    let frame = emit_edit(&cmd, |_| 0x07);

    let total_len = u16::from_be_bytes([frame[0], frame[1]]) as usize;
    assert_eq!(total_len, frame.len());
    assert_eq!(frame[2], COMMAND_REQ | command_slot(2));
    assert_eq!(frame[3], 0x07);
    assert_eq!(frame[4], SUB_COMMAND_SELECT_VARIATION);
    assert_eq!(frame[5], 3);

    let payload = g2_core::crc16::split_and_verify(&frame[2..]).unwrap();
    assert_eq!(payload[2], SUB_COMMAND_SELECT_VARIATION);
}

/// A cable's two endpoints always name modules that exist in the same
/// (slot, location) the cable itself lives in — `spec.md` §3's cable
/// invariant, exercised through the public `PatchDb` API end to end.
#[test]
fn cable_endpoints_resolve_within_same_slot_and_location() {
    use g2_core::model::{Cable, CableKey, LinkType};

    let db = PatchDb::new();
    let slot = 0;
    let location = Location::Voice;
    db.write_module(Module::new(ModuleKey { slot, location, index: 0 }, 1, 12));
    db.write_module(Module::new(ModuleKey { slot, location, index: 1 }, 1, 12));

    let key = CableKey {
        slot,
        location,
        module_from_index: 0,
        connector_from_io_count: 0,
        link_type: LinkType::OutputToInput,
        module_to_index: 1,
        connector_to_io_count: 0,
    };
    db.write_cable(Cable { key, colour: 1 });

    let cable = db.read_cable(key).unwrap();
    let from = ModuleKey { slot: cable.key.slot, location: cable.key.location, index: cable.key.module_from_index };
    let to = ModuleKey { slot: cable.key.slot, location: cable.key.location, index: cable.key.module_to_index };
    assert!(db.read_module(from).is_some());
    assert!(db.read_module(to).is_some());
}
