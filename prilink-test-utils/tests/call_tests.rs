//! Q.931 call lifecycle scenarios: inbound and outbound calls, glare,
//! cause propagation, overlap receiving, and status handling.

use pretty_assertions::assert_eq;
use prilink::{DchanController, SetupParams};
use prilink_test_utils::frames;
use prilink_test_utils::{FakeClock, FakeDchan};
use prilink_types::call::{layer1, transfer_cap, transfer_mode};
use prilink_types::cause::{
    CAUSE_NORMAL_CLEARING, CAUSE_REQUESTED_CHAN_UNAVAIL, CAUSE_RESPONSE_TO_STATUS_ENQUIRY,
    CAUSE_USER_BUSY,
};
use prilink_types::custom::PriError;
use prilink_types::event::Event;
use prilink_types::frame::q931::ie;
use prilink_types::switch::{NodeType, SwitchVariant};

const MSG_CALL_PROCEEDING: u8 = 0x02;
const MSG_ALERTING: u8 = 0x01;
const MSG_CONNECT: u8 = 0x07;
const MSG_CONNECT_ACK: u8 = 0x0f;
const MSG_DISCONNECT: u8 = 0x45;
const MSG_RELEASE: u8 = 0x4d;
const MSG_RELEASE_COMPLETE: u8 = 0x5a;
const MSG_SETUP: u8 = 0x05;
const MSG_STATUS: u8 = 0x7d;
const MSG_STATUS_ENQUIRY: u8 = 0x75;
const MSG_INFORMATION: u8 = 0x7b;

fn establish(switch: SwitchVariant) -> (DchanController, FakeDchan, FakeClock) {
    let mut ctrl = DchanController::new(NodeType::Network, switch).unwrap();
    let mut dev = FakeDchan::new();
    let clock = FakeClock::new();
    ctrl.start(&mut dev, clock.now()).unwrap();
    ctrl.receive(&mut dev, clock.now(), &frames::cpe_ua(0, true))
        .unwrap();
    dev.take_sent();
    (ctrl, dev, clock)
}

fn q931_sent(dev: &FakeDchan) -> Vec<(u8, u16, Vec<u8>)> {
    dev.sent().iter().filter_map(|f| frames::q931_of(f)).collect()
}

fn setup_params<'a>(channel: u8, caller: &'a str, called: &'a str) -> SetupParams<'a> {
    SetupParams {
        transfer_cap: transfer_cap::SPEECH,
        channel,
        exclusive: true,
        non_isdn: false,
        caller: Some(caller),
        caller_plan: 0x21,
        caller_pres: 0,
        called,
        called_plan: 0x21,
        userl1: None,
    }
}

#[test]
fn basic_inbound_call() {
    let (mut ctrl, mut dev, clock) = establish(SwitchVariant::Ni2);

    let setup = frames::setup_payload(0x0001, 1, "5550000", "5551212");
    let ev = ctrl
        .receive(&mut dev, clock.now(), &frames::cpe_iframe(0, 0, 0, &setup))
        .unwrap();
    let ring = match ev {
        Some(Event::Ring(ring)) => ring,
        other => panic!("expected Ring, got {other:?}"),
    };
    assert_eq!(ring.cref, 0x0001);
    assert_eq!(ring.channel, 1);
    assert!(!ring.flexible);
    assert_eq!(ring.calling.number.as_str(), "5550000");
    assert_eq!(ring.called.number.as_str(), "5551212");
    assert_eq!(ring.bearer.transfer_cap, transfer_cap::SPEECH);
    assert_eq!(ring.bearer.mode_rate, transfer_mode::CIRCUIT_64);
    assert_eq!(ring.bearer.userl1, Some(layer1::ULAW));

    ctrl.proceeding(&mut dev, clock.now(), ring.cref, None).unwrap();
    ctrl.alerting(&mut dev, clock.now(), ring.cref, None, false).unwrap();
    ctrl.answer(&mut dev, clock.now(), ring.cref, Some(1), false).unwrap();

    let sent: Vec<u8> = q931_sent(&dev).iter().map(|(msg, _, _)| *msg).collect();
    assert_eq!(sent, vec![MSG_CALL_PROCEEDING, MSG_ALERTING, MSG_CONNECT]);
    // Our responses to the peer's call carry the originator flag
    assert!(q931_sent(&dev).iter().all(|(_, cref, _)| *cref == 0x8001));

    // The peer acknowledges the CONNECT: the call is now answered
    let ack = frames::q931_msg(0x0001, MSG_CONNECT_ACK, &[]);
    let ev = ctrl
        .receive(&mut dev, clock.now(), &frames::cpe_iframe(0, 1, 3, &ack))
        .unwrap();
    assert_eq!(ev, Some(Event::Answer { channel: 1, cref: 0x0001 }));
}

#[test]
fn outbound_call_rejected_with_user_busy() {
    let (mut ctrl, mut dev, clock) = establish(SwitchVariant::Ni2);

    let cref = ctrl.new_call().unwrap();
    ctrl.setup(&mut dev, clock.now(), cref, &setup_params(1, "100", "200"))
        .unwrap();
    let sent = q931_sent(&dev);
    assert_eq!(sent.len(), 1);
    let (msg, wire_cref, payload) = &sent[0];
    assert_eq!(*msg, MSG_SETUP);
    // Originator flag is 0 on the wire for our own calls
    assert_eq!(*wire_cref & 0x8000, 0);
    assert!(frames::find_ie(payload, ie::BEARER_CAPABILITY).is_some());
    assert!(frames::find_ie(payload, ie::CALLED_PARTY_NUMBER).is_some());

    // The peer is busy
    let rc = frames::q931_msg(cref, MSG_RELEASE_COMPLETE, &frames::cause_ie(CAUSE_USER_BUSY));
    let ev = ctrl
        .receive(&mut dev, clock.now(), &frames::cpe_iframe(0, 0, 1, &rc))
        .unwrap();
    assert_eq!(
        ev,
        Some(Event::Hangup { channel: 1, cref, cause: CAUSE_USER_BUSY })
    );
    // The record is gone
    assert_eq!(
        ctrl.hangup(&mut dev, clock.now(), cref, CAUSE_NORMAL_CLEARING),
        Err(PriError::NoSuchCall)
    );
}

#[test]
fn glare_rejects_the_incoming_setup() {
    let (mut ctrl, mut dev, clock) = establish(SwitchVariant::Ni2);

    let ours = ctrl.new_call().unwrap();
    ctrl.setup(&mut dev, clock.now(), ours, &setup_params(3, "100", "200"))
        .unwrap();
    dev.take_sent();

    // The peer asks for B3 exclusively at the same time
    let setup = frames::setup_payload(0x0005, 3, "5550000", "5551212");
    let ev = ctrl
        .receive(&mut dev, clock.now(), &frames::cpe_iframe(0, 0, 1, &setup))
        .unwrap();
    assert_eq!(ev, None, "glare must not ring");

    let sent = q931_sent(&dev);
    assert_eq!(sent.len(), 1);
    let (msg, wire_cref, payload) = &sent[0];
    assert_eq!(*msg, MSG_RELEASE_COMPLETE);
    assert_eq!(*wire_cref, 0x8005);
    let cause = frames::find_ie(payload, ie::CAUSE).expect("cause required");
    assert_eq!(cause[1] & 0x7f, CAUSE_REQUESTED_CHAN_UNAVAIL);

    // Our call is untouched: clearing it still produces a DISCONNECT
    ctrl.hangup(&mut dev, clock.now(), ours, CAUSE_NORMAL_CLEARING).unwrap();
    assert!(q931_sent(&dev).iter().any(|(m, _, _)| *m == MSG_DISCONNECT));
}

/// Bring an inbound call to Active and return its reference.
fn answered_call(ctrl: &mut DchanController, dev: &mut FakeDchan, clock: &FakeClock) -> u16 {
    let setup = frames::setup_payload(0x0001, 1, "5550000", "5551212");
    ctrl.receive(dev, clock.now(), &frames::cpe_iframe(0, 0, 0, &setup))
        .unwrap();
    ctrl.answer(dev, clock.now(), 0x0001, Some(1), false).unwrap();
    let ack = frames::q931_msg(0x0001, MSG_CONNECT_ACK, &[]);
    let ev = ctrl
        .receive(dev, clock.now(), &frames::cpe_iframe(0, 1, 1, &ack))
        .unwrap();
    assert!(matches!(ev, Some(Event::Answer { .. })));
    dev.take_sent();
    0x0001
}

#[test]
fn disconnect_cause_reaches_the_hangup_event() {
    let (mut ctrl, mut dev, clock) = establish(SwitchVariant::Ni2);
    let cref = answered_call(&mut ctrl, &mut dev, &clock);

    let disc = frames::q931_msg(cref, MSG_DISCONNECT, &frames::cause_ie(CAUSE_NORMAL_CLEARING));
    let ev = ctrl
        .receive(&mut dev, clock.now(), &frames::cpe_iframe(0, 2, 1, &disc))
        .unwrap();
    assert_eq!(
        ev,
        Some(Event::Hangup { channel: 1, cref, cause: CAUSE_NORMAL_CLEARING })
    );
    // The stack releases the channel on its own
    assert!(q931_sent(&dev).iter().any(|(m, _, _)| *m == MSG_RELEASE));
}

#[test]
fn disconnect_with_inband_info_defers_to_the_application() {
    let (mut ctrl, mut dev, clock) = establish(SwitchVariant::Ni2);
    let cref = answered_call(&mut ctrl, &mut dev, &clock);

    let mut ies = frames::cause_ie(CAUSE_USER_BUSY);
    ies.extend_from_slice(&frames::progress_ie(0x08));
    let disc = frames::q931_msg(cref, MSG_DISCONNECT, &ies);
    let ev = ctrl
        .receive(&mut dev, clock.now(), &frames::cpe_iframe(0, 2, 1, &disc))
        .unwrap();
    assert_eq!(
        ev,
        Some(Event::HangupReq { channel: 1, cref, cause: CAUSE_USER_BUSY })
    );
    // No RELEASE yet: the announcement is still playing
    assert!(q931_sent(&dev).iter().all(|(m, _, _)| *m != MSG_RELEASE));

    ctrl.hangup(&mut dev, clock.now(), cref, CAUSE_NORMAL_CLEARING).unwrap();
    assert!(q931_sent(&dev).iter().any(|(m, _, _)| *m == MSG_RELEASE));
}

#[test]
fn status_enquiry_is_answered_with_status() {
    let (mut ctrl, mut dev, clock) = establish(SwitchVariant::Ni2);
    let cref = answered_call(&mut ctrl, &mut dev, &clock);

    let enq = frames::q931_msg(cref, MSG_STATUS_ENQUIRY, &[]);
    ctrl.receive(&mut dev, clock.now(), &frames::cpe_iframe(0, 2, 1, &enq))
        .unwrap();
    let sent = q931_sent(&dev);
    let (msg, _, payload) = sent.first().expect("a STATUS reply");
    assert_eq!(*msg, MSG_STATUS);
    let cause = frames::find_ie(payload, ie::CAUSE).unwrap();
    assert_eq!(cause[1] & 0x7f, CAUSE_RESPONSE_TO_STATUS_ENQUIRY);
    let state = frames::find_ie(payload, ie::CALL_STATE).unwrap();
    assert_eq!(state[0] & 0x3f, 10, "reported state must be Active");
}

#[test]
fn overlap_digits_accumulate_into_info_received() {
    let (mut ctrl, mut dev, clock) = establish(SwitchVariant::EuroIsdnE1);

    let mut ies = frames::bearer_ie_speech();
    ies.extend_from_slice(&frames::channel_ie_exclusive(1));
    ies.extend_from_slice(&frames::called_ie("555"));
    let setup = frames::q931_msg(0x0009, MSG_SETUP, &ies);
    let ev = ctrl
        .receive(&mut dev, clock.now(), &frames::cpe_iframe(0, 0, 0, &setup))
        .unwrap();
    assert!(matches!(ev, Some(Event::Ring(_))));

    let info = frames::q931_msg(0x0009, MSG_INFORMATION, &frames::called_ie("1212"));
    let ev = ctrl
        .receive(&mut dev, clock.now(), &frames::cpe_iframe(0, 1, 0, &info))
        .unwrap();
    match ev {
        Some(Event::InfoReceived { cref, digits, complete }) => {
            assert_eq!(cref, 0x0009);
            assert_eq!(digits.as_str(), "5551212");
            assert!(!complete);
        }
        other => panic!("expected InfoReceived, got {other:?}"),
    }
}

#[test]
fn queued_facility_apdu_rides_its_message() {
    let (mut ctrl, mut dev, clock) = establish(SwitchVariant::Ni2);
    let setup = frames::setup_payload(0x0001, 1, "5550000", "5551212");
    ctrl.receive(&mut dev, clock.now(), &frames::cpe_iframe(0, 0, 0, &setup))
        .unwrap();
    dev.take_sent();

    let apdu = [0x91, 0xa1, 0x06, 0x02, 0x01, 0x7b];
    ctrl.facility_enqueue(0x0001, prilink_types::frame::q931::MessageType::Connect, &apdu)
        .unwrap();
    // A message of a different type leaves the queue alone
    ctrl.proceeding(&mut dev, clock.now(), 0x0001, None).unwrap();
    let (_, _, proceeding) = q931_sent(&dev).into_iter().next().unwrap();
    assert!(frames::find_ie(&proceeding, ie::FACILITY).is_none());

    ctrl.answer(&mut dev, clock.now(), 0x0001, Some(1), false).unwrap();
    let connect = q931_sent(&dev)
        .into_iter()
        .find(|(m, _, _)| *m == MSG_CONNECT)
        .unwrap();
    assert_eq!(frames::find_ie(&connect.2, ie::FACILITY), Some(apdu.to_vec()));
}

#[test]
fn display_on_facility_surfaces_the_calling_name() {
    let (mut ctrl, mut dev, clock) = establish(SwitchVariant::Ni2);
    let cref = answered_call(&mut ctrl, &mut dev, &clock);

    let fac = frames::q931_msg(cref, 0x62, &frames::display_ie("Alice"));
    let ev = ctrl
        .receive(&mut dev, clock.now(), &frames::cpe_iframe(0, 2, 1, &fac))
        .unwrap();
    match ev {
        Some(Event::FacName { cref: c, name }) => {
            assert_eq!(c, cref);
            assert_eq!(name.as_str(), "Alice");
        }
        other => panic!("expected FacName, got {other:?}"),
    }
}

#[test]
fn call_references_never_collide_and_survive_wraparound() {
    let mut ctrl = DchanController::new(NodeType::Network, SwitchVariant::Ni2).unwrap();
    let mut last = 0u16;
    for i in 0..40_000u32 {
        let cref = ctrl.new_call().unwrap();
        assert_ne!(cref & 0x7fff, 0, "iteration {i}");
        assert_ne!(cref, last, "iteration {i}");
        last = cref;
        ctrl.destroy_call(cref);
    }
    // A live call's reference is skipped by the allocator
    let keeper = ctrl.new_call().unwrap();
    for _ in 0..0x8000u32 {
        let cref = ctrl.new_call().unwrap();
        assert_ne!(cref, keeper);
        ctrl.destroy_call(cref);
    }
}
