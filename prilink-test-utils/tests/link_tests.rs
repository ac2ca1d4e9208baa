//! Q.921 link establishment, sequencing, and recovery scenarios driven
//! through a fake device and a hand-cranked clock.

use pretty_assertions::assert_eq;
use prilink::q921::Q921State;
use prilink::{DchanController, SetupParams};
use prilink_test_utils::frames;
use prilink_test_utils::frames::FrameView;
use prilink_test_utils::{FakeClock, FakeDchan};
use prilink_types::call::transfer_cap;
use prilink_types::event::Event;
use prilink_types::frame::q921::{SFrame, UFrame, seq_sub};
use prilink_types::switch::{NodeType, SwitchVariant};

/// Bring a network-side point-to-point span to MULTI_FRAME_ESTABLISHED.
fn establish() -> (DchanController, FakeDchan, FakeClock) {
    let mut ctrl = DchanController::new(NodeType::Network, SwitchVariant::Ni2).unwrap();
    let mut dev = FakeDchan::new();
    let clock = FakeClock::new();
    ctrl.start(&mut dev, clock.now()).unwrap();
    assert!(frames::is_u_frame(dev.last_sent().unwrap(), UFrame::Sabme));
    let ev = ctrl
        .receive(&mut dev, clock.now(), &frames::cpe_ua(0, true))
        .unwrap();
    assert_eq!(ev, Some(Event::DchanUp));
    dev.take_sent();
    (ctrl, dev, clock)
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

/// Advance the clock to each deadline in turn until the stack produces an
/// event, or give up after `max_fires` timer firings.
fn run_until_event(
    ctrl: &mut DchanController,
    dev: &mut FakeDchan,
    clock: &mut FakeClock,
    max_fires: usize,
) -> Option<Event> {
    for _ in 0..max_fires {
        let next = ctrl.schedule_next()?;
        let wait = clock.now().ms_until(next) as i32 + 1;
        clock.advance_ms(wait);
        if let Some(ev) = ctrl.schedule_run(dev, clock.now()).unwrap() {
            return Some(ev);
        }
    }
    None
}

#[test]
fn establishment_brings_dchan_up() {
    let (ctrl, _dev, _clock) = establish();
    let status = ctrl.link_status(None).unwrap();
    assert_eq!(status.state, Q921State::MultiFrameEstablished);
    assert_eq!((status.v_s, status.v_a, status.v_r), (0, 0, 0));
}

#[test]
fn t203_runs_alone_when_idle_and_t200_while_sending() {
    let (mut ctrl, mut dev, clock) = establish();
    let idle = ctrl.link_status(None).unwrap();
    assert!(idle.t203_running && !idle.t200_running);

    let cref = ctrl.new_call().unwrap();
    ctrl.setup(&mut dev, clock.now(), cref, &setup_params(1, "100", "200"))
        .unwrap();
    let busy = ctrl.link_status(None).unwrap();
    assert!(busy.t200_running && !busy.t203_running);
}

#[test]
fn out_of_sequence_iframe_triggers_reject() {
    let (mut ctrl, mut dev, clock) = establish();
    let payload = frames::setup_payload(0x0001, 1, "100", "200");
    // N(S)=2 while V(R)=0: a gap
    let ev = ctrl
        .receive(&mut dev, clock.now(), &frames::cpe_iframe(0, 2, 0, &payload))
        .unwrap();
    assert_eq!(ev, None);
    let rej = dev.sent().iter().find_map(|f| match frames::classify(f) {
        Some(FrameView::S { kind, n_r, .. }) => Some((kind, n_r)),
        _ => None,
    });
    assert_eq!(
        rej,
        Some((SFrame::Rej, 0)),
        "gap must be answered with REJ at V(R)"
    );
    // Monotone delivery: V(R) untouched by the out-of-sequence frame
    assert_eq!(ctrl.link_status(None).unwrap().v_r, 0);
}

#[test]
fn in_sequence_payload_is_acknowledged() {
    let (mut ctrl, mut dev, clock) = establish();
    let payload = frames::setup_payload(0x0001, 1, "5550000", "5551212");
    let ev = ctrl
        .receive(&mut dev, clock.now(), &frames::cpe_iframe(0, 0, 0, &payload))
        .unwrap();
    assert!(matches!(ev, Some(Event::Ring(_))));
    assert_eq!(ctrl.link_status(None).unwrap().v_r, 1);
    // The deferred acknowledgement went out as RR with N(R)=1
    let acked = dev.sent().iter().any(|f| {
        matches!(
            frames::classify(f),
            Some(FrameView::S { kind: SFrame::Rr, n_r: 1, .. })
        )
    });
    assert!(acked);
}

#[test]
fn window_limits_outstanding_iframes_and_acks_free_exactly_once() {
    let (mut ctrl, mut dev, clock) = establish();
    let cref = ctrl.new_call().unwrap();
    ctrl.setup(&mut dev, clock.now(), cref, &setup_params(1, "100", "200"))
        .unwrap();
    for _ in 0..9 {
        ctrl.information(&mut dev, clock.now(), cref, "1").unwrap();
    }
    let status = ctrl.link_status(None).unwrap();
    assert_eq!(status.queue_len, 10);
    // Window k=7: exactly seven in flight
    assert_eq!(seq_sub(status.v_s, status.v_a), 7);

    // Peer acknowledges the first seven
    ctrl.receive(&mut dev, clock.now(), &frames::cpe_rr(0, 7, false, false))
        .unwrap();
    let status = ctrl.link_status(None).unwrap();
    assert_eq!(status.v_a, 7);
    assert_eq!(status.v_s, 10);
    assert_eq!(status.queue_len, 3);
    assert!(seq_sub(status.v_s, status.v_a) <= 7);

    // A duplicate acknowledgement frees nothing further
    ctrl.receive(&mut dev, clock.now(), &frames::cpe_rr(0, 7, false, false))
        .unwrap();
    assert_eq!(ctrl.link_status(None).unwrap().queue_len, 3);
}

#[test]
fn t200_exhaustion_drops_the_link_and_keeps_trying() {
    let (mut ctrl, mut dev, mut clock) = establish();
    // Push the SETUP supervision far out so only the T200 cycle fires here
    ctrl.set_timer(prilink_types::timers::TimerIdx::T303, 600_000).unwrap();
    let cref = ctrl.new_call().unwrap();
    ctrl.setup(&mut dev, clock.now(), cref, &setup_params(1, "100", "200"))
        .unwrap();
    dev.take_sent();

    // Silence from the peer: T200 walks through timer recovery and the
    // SABME retries until the link is declared down.
    let ev = run_until_event(&mut ctrl, &mut dev, &mut clock, 32);
    assert_eq!(ev, Some(Event::DchanDown));
    let status = ctrl.link_status(None).unwrap();
    assert_eq!(status.state, Q921State::AwaitingEstablishment);
    // Point-to-point spans keep re-sending SABME after the failure
    assert!(dev.sent().iter().any(|f| frames::is_u_frame(f, UFrame::Sabme)));
}

#[test]
fn maintenance_discriminator_is_reflected() {
    let (mut ctrl, mut dev, clock) = establish();
    // AT&T maintenance SERVICE: pd 0x03, one-octet call reference
    let service = [0x03u8, 0x01, 0x00, 0x0f, 0x00];
    ctrl.receive(&mut dev, clock.now(), &frames::cpe_iframe(0, 0, 0, &service))
        .unwrap();
    let reflected = dev
        .sent()
        .iter()
        .find_map(|f| match frames::classify(f) {
            Some(FrameView::I { payload, .. }) => Some(payload),
            _ => None,
        })
        .expect("SERVICE must be reflected");
    // Byte 4 flips from SERVICE to SERVICE ACKNOWLEDGE
    assert_eq!(reflected, vec![0x03, 0x01, 0x00, 0x07, 0x00]);
}
