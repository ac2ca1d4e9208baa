//! TEI management on point-to-multipoint basic-rate spans.

use pretty_assertions::assert_eq;
use prilink::DchanController;
use prilink_test_utils::frames;
use prilink_test_utils::{FakeClock, FakeDchan};
use prilink_types::event::Event;
use prilink_types::frame::q921::TeiMgmtMsg;
use prilink_types::switch::{NodeType, SwitchVariant};

#[test]
fn network_assigns_the_first_free_tei() {
    let mut ctrl = DchanController::bri(NodeType::Network, SwitchVariant::EuroIsdnE1).unwrap();
    let mut dev = FakeDchan::new();
    let mut clock = FakeClock::new();
    ctrl.start(&mut dev, clock.now()).unwrap();
    // The network's D channel is usable immediately
    clock.advance_ms(1);
    let ev = ctrl.schedule_run(&mut dev, clock.now()).unwrap();
    assert_eq!(ev, Some(Event::DchanUp));

    // A terminal requests a TEI
    ctrl.receive(&mut dev, clock.now(), &frames::tei_identity_request(0xabcd))
        .unwrap();
    let assigned = dev
        .sent()
        .iter()
        .find_map(|f| frames::tei_mgmt_of(f))
        .expect("an identity assignment");
    assert_eq!(assigned.msg, TeiMgmtMsg::IdentityAssigned);
    assert_eq!(assigned.ri, 0xabcd);
    assert_eq!(assigned.ai, 64);

    // A second terminal gets the next value
    dev.take_sent();
    ctrl.receive(&mut dev, clock.now(), &frames::tei_identity_request(0x1234))
        .unwrap();
    let second = dev.sent().iter().find_map(|f| frames::tei_mgmt_of(f)).unwrap();
    assert_eq!(second.ai, 65);
}

#[test]
fn assigned_tei_carries_calls_on_its_own_subchannel() {
    let mut ctrl = DchanController::bri(NodeType::Network, SwitchVariant::EuroIsdnE1).unwrap();
    let mut dev = FakeDchan::new();
    let clock = FakeClock::new();
    ctrl.start(&mut dev, clock.now()).unwrap();
    ctrl.receive(&mut dev, clock.now(), &frames::tei_identity_request(0xabcd))
        .unwrap();
    dev.take_sent();

    // The terminal establishes multi-frame operation on TEI 64
    let ev = ctrl
        .receive(&mut dev, clock.now(), &frames::cpe_sabme(64))
        .unwrap();
    assert_eq!(ev, Some(Event::DchanUp));
    assert!(dev
        .sent()
        .iter()
        .any(|f| frames::is_u_frame(f, prilink_types::frame::q921::UFrame::Ua)));

    // And a SETUP on that TEI rings through the shared call pool
    let setup = frames::setup_payload(0x0001, 1, "201", "202");
    let ev = ctrl
        .receive(&mut dev, clock.now(), &frames::cpe_iframe(64, 0, 0, &setup))
        .unwrap();
    assert!(matches!(ev, Some(Event::Ring(_))));
}

#[test]
fn unknown_tei_is_removed_twice() {
    let mut ctrl = DchanController::bri(NodeType::Network, SwitchVariant::EuroIsdnE1).unwrap();
    let mut dev = FakeDchan::new();
    let clock = FakeClock::new();
    ctrl.start(&mut dev, clock.now()).unwrap();

    // Traffic from a TEI nobody assigned
    let setup = frames::setup_payload(0x0001, 1, "201", "202");
    ctrl.receive(&mut dev, clock.now(), &frames::cpe_iframe(99, 0, 0, &setup))
        .unwrap();

    let removes: Vec<_> = dev
        .sent()
        .iter()
        .filter_map(|f| frames::tei_mgmt_of(f))
        .filter(|m| m.msg == TeiMgmtMsg::IdentityRemove && m.ai == 99)
        .collect();
    assert_eq!(removes.len(), 2, "removal is sent twice for link corruption");
}

#[test]
fn terminal_requests_and_takes_a_tei() {
    let mut ctrl = DchanController::bri(NodeType::Cpe, SwitchVariant::EuroIsdnE1).unwrap();
    let mut dev = FakeDchan::new();
    let clock = FakeClock::new();
    ctrl.start(&mut dev, clock.now()).unwrap();

    let request = dev
        .sent()
        .iter()
        .find_map(|f| frames::tei_mgmt_of(f))
        .expect("an identity request at startup");
    assert_eq!(request.msg, TeiMgmtMsg::IdentityRequest);
    assert_eq!(request.ai, 127);
    dev.take_sent();

    // The network answers with a matching Ri
    let grant = frames::tei_mgmt_frame(TeiMgmtMsg::IdentityAssigned, request.ri, 64, true);
    let ev = ctrl.receive(&mut dev, clock.now(), &grant).unwrap();
    assert_eq!(ev, Some(Event::DchanUp));

    // A grant with the wrong Ri would have been ignored; the link now
    // answers SABME on its assigned TEI
    let ev = ctrl
        .receive(&mut dev, clock.now(), &frames::net_sabme(64))
        .unwrap();
    assert_eq!(ev, Some(Event::DchanUp));
}

#[test]
fn mismatched_ri_is_ignored() {
    let mut ctrl = DchanController::bri(NodeType::Cpe, SwitchVariant::EuroIsdnE1).unwrap();
    let mut dev = FakeDchan::new();
    let clock = FakeClock::new();
    ctrl.start(&mut dev, clock.now()).unwrap();
    dev.take_sent();

    let grant = frames::tei_mgmt_frame(TeiMgmtMsg::IdentityAssigned, 0x0bad, 64, true);
    let ev = ctrl.receive(&mut dev, clock.now(), &grant).unwrap();
    assert_eq!(ev, None);
}
