//! RESTART procedures: peer-driven channel restarts and our own reset API
//! with the T316 supervision cycle.

use pretty_assertions::assert_eq;
use prilink::{DchanController, SetupParams};
use prilink_test_utils::frames;
use prilink_test_utils::{FakeClock, FakeDchan};
use prilink_types::call::transfer_cap;
use prilink_types::cause::CAUSE_NORMAL_CLEARING;
use prilink_types::custom::PriError;
use prilink_types::event::Event;
use prilink_types::frame::q931::ie;
use prilink_types::switch::{NodeType, SwitchVariant};

const MSG_SETUP: u8 = 0x05;
const MSG_CONNECT_ACK: u8 = 0x0f;
const MSG_RESTART: u8 = 0x46;
const MSG_RESTART_ACK: u8 = 0x4e;

fn establish() -> (DchanController, FakeDchan, FakeClock) {
    let mut ctrl = DchanController::new(NodeType::Network, SwitchVariant::Ni2).unwrap();
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

#[test]
fn peer_restart_of_the_whole_interface_clears_live_calls() {
    let (mut ctrl, mut dev, clock) = establish();

    // A live answered call
    let setup = frames::setup_payload(0x0001, 1, "5550000", "5551212");
    ctrl.receive(&mut dev, clock.now(), &frames::cpe_iframe(0, 0, 0, &setup))
        .unwrap();
    ctrl.answer(&mut dev, clock.now(), 0x0001, Some(1), false).unwrap();
    let ack = frames::q931_msg(0x0001, MSG_CONNECT_ACK, &[]);
    ctrl.receive(&mut dev, clock.now(), &frames::cpe_iframe(0, 1, 1, &ack))
        .unwrap();
    dev.take_sent();

    // RESTART of all DS1 facilities on the global call reference
    let restart = frames::q931_msg(0x0000, MSG_RESTART, &frames::restart_ie(7));
    let ev = ctrl
        .receive(&mut dev, clock.now(), &frames::cpe_iframe(0, 2, 1, &restart))
        .unwrap();
    assert_eq!(ev, Some(Event::Restart { channel: -1 }));

    let sent = q931_sent(&dev);
    let (msg, _, payload) = sent.first().expect("a RESTART ACKNOWLEDGE");
    assert_eq!(*msg, MSG_RESTART_ACK);
    let ri = frames::find_ie(payload, ie::RESTART_INDICATOR).unwrap();
    assert_eq!(ri[0] & 0x07, 7);

    // The answered call was cleared locally
    assert_eq!(
        ctrl.hangup(&mut dev, clock.now(), 0x0001, CAUSE_NORMAL_CLEARING),
        Err(PriError::NoSuchCall)
    );
}

#[test]
fn reset_sends_restart_and_reports_the_acknowledgement() {
    let (mut ctrl, mut dev, clock) = establish();

    ctrl.reset(&mut dev, clock.now(), 3).unwrap();
    let sent = q931_sent(&dev);
    let (msg, wire_cref, payload) = sent.first().expect("a RESTART");
    assert_eq!(*msg, MSG_RESTART);
    assert_eq!(*wire_cref, 0, "restarts ride the global call reference");
    let ri = frames::find_ie(payload, ie::RESTART_INDICATOR).unwrap();
    assert_eq!(ri[0] & 0x07, 0);
    let chan = frames::find_ie(payload, ie::CHANNEL_IDENT).unwrap();
    assert_eq!(chan.last().copied(), Some(0x83));

    // The peer acknowledges
    let ack_ies: Vec<u8> = {
        let mut v = frames::channel_ie_exclusive(3);
        v.extend_from_slice(&frames::restart_ie(0));
        v
    };
    let ack = frames::q931_msg(0x0000, MSG_RESTART_ACK, &ack_ies);
    let ev = ctrl
        .receive(&mut dev, clock.now(), &frames::cpe_iframe(0, 0, 1, &ack))
        .unwrap();
    assert_eq!(ev, Some(Event::RestartAck { channel: 3 }));
}

#[test]
fn unanswered_restart_retries_then_gives_up() {
    let (mut ctrl, mut dev, mut clock) = establish();
    // Keep T316 well under T200 so the restart cycle is what fires
    ctrl.set_timer(prilink_types::timers::TimerIdx::T316, 100).unwrap();
    ctrl.reset(&mut dev, clock.now(), -1).unwrap();
    dev.take_sent();

    // First T316 expiry: the RESTART goes out again
    clock.advance_ms(101);
    let ev = ctrl.schedule_run(&mut dev, clock.now()).unwrap();
    assert_eq!(ev, None);
    assert!(q931_sent(&dev).iter().any(|(m, _, _)| *m == MSG_RESTART));

    // Second expiry: give up and tell the application
    clock.advance_ms(101);
    let ev = ctrl.schedule_run(&mut dev, clock.now()).unwrap();
    assert_eq!(
        ev,
        Some(Event::ConfigError { message: "restart not acknowledged by peer" })
    );
}

#[test]
fn setup_is_retransmitted_once_on_t303_then_cleared() {
    let (mut ctrl, mut dev, mut clock) = establish();
    // Keep T303 well under T200 so the SETUP supervision is what fires
    ctrl.set_timer(prilink_types::timers::TimerIdx::T303, 100).unwrap();
    let cref = ctrl.new_call().unwrap();
    let params = SetupParams {
        transfer_cap: transfer_cap::SPEECH,
        channel: 1,
        exclusive: true,
        non_isdn: false,
        caller: Some("100"),
        caller_plan: 0x21,
        caller_pres: 0,
        called: "200",
        called_plan: 0x21,
        userl1: None,
    };
    ctrl.setup(&mut dev, clock.now(), cref, &params).unwrap();
    dev.take_sent();

    // First T303 expiry retransmits the SETUP
    clock.advance_ms(101);
    let ev = ctrl.schedule_run(&mut dev, clock.now()).unwrap();
    assert_eq!(ev, None);
    assert!(q931_sent(&dev).iter().any(|(m, _, _)| *m == MSG_SETUP));

    // Second expiry clears the call with recovery-on-timer-expiry
    clock.advance_ms(101);
    let ev = ctrl.schedule_run(&mut dev, clock.now()).unwrap();
    assert_eq!(ev, Some(Event::Hangup { channel: 1, cref, cause: 102 }));
}
