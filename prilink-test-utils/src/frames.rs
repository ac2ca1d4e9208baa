//! Builders for the wire frames a peer would send, plus small dissectors
//! for asserting on what the stack transmitted.
//!
//! The builders take the peer's perspective: a `cpe_*` frame is what a
//! terminal (user side) puts on the wire, so a network-side controller under
//! test can consume it directly.

use prilink_types::frame::q921::{SAPI_CALL_CTRL, SFrame, UFrame};
use prilink_util::frame_format::q921 as q921_codec;
use prilink_util::frame_format::q921::{Frame, TeiMgmt, decode};
use prilink_util::frame_format::q931 as q931_codec;

pub use prilink_util::frame_format::q921::Frame as FrameView;

/// SABME command from the user side.
pub fn cpe_sabme(tei: u8) -> Vec<u8> {
    let mut buf = [0u8; 8];
    let n = q921_codec::encode_u(&mut buf, SAPI_CALL_CTRL, tei, false, UFrame::Sabme, true, &[])
        .unwrap();
    buf[..n].to_vec()
}

/// UA response from the user side.
pub fn cpe_ua(tei: u8, fbit: bool) -> Vec<u8> {
    let mut buf = [0u8; 8];
    let n =
        q921_codec::encode_u(&mut buf, SAPI_CALL_CTRL, tei, true, UFrame::Ua, fbit, &[]).unwrap();
    buf[..n].to_vec()
}

/// RR from the user side; `cmd` selects command or response sense.
pub fn cpe_rr(tei: u8, n_r: u8, p_f: bool, cmd: bool) -> Vec<u8> {
    let mut buf = [0u8; 8];
    let c_r = !cmd;
    let n = q921_codec::encode_s(&mut buf, SAPI_CALL_CTRL, tei, c_r, SFrame::Rr, n_r, p_f).unwrap();
    buf[..n].to_vec()
}

/// REJ response from the user side.
pub fn cpe_rej(tei: u8, n_r: u8, p_f: bool) -> Vec<u8> {
    let mut buf = [0u8; 8];
    let n =
        q921_codec::encode_s(&mut buf, SAPI_CALL_CTRL, tei, true, SFrame::Rej, n_r, p_f).unwrap();
    buf[..n].to_vec()
}

/// I frame (command) from the user side around a Q.931 payload.
pub fn cpe_iframe(tei: u8, n_s: u8, n_r: u8, payload: &[u8]) -> Vec<u8> {
    let mut buf = vec![0u8; payload.len() + 8];
    let n = q921_codec::encode_i(&mut buf, SAPI_CALL_CTRL, tei, false, n_s, n_r, false, payload)
        .unwrap();
    buf.truncate(n);
    buf
}

/// TEI identity request from a terminal.
pub fn tei_identity_request(ri: u16) -> Vec<u8> {
    tei_mgmt_frame(prilink_types::frame::q921::TeiMgmtMsg::IdentityRequest, ri, 127, false)
}

/// Any TEI management frame; `from_network` selects the C/R sense.
pub fn tei_mgmt_frame(
    msg: prilink_types::frame::q921::TeiMgmtMsg,
    ri: u16,
    ai: u8,
    from_network: bool,
) -> Vec<u8> {
    let mut buf = [0u8; 16];
    let mgmt = TeiMgmt { msg, ri, ai };
    let n = q921_codec::encode_tei_mgmt(&mut buf, &mgmt, from_network).unwrap();
    buf[..n].to_vec()
}

/// SABME command from the network side.
pub fn net_sabme(tei: u8) -> Vec<u8> {
    let mut buf = [0u8; 8];
    let n = q921_codec::encode_u(&mut buf, SAPI_CALL_CTRL, tei, true, UFrame::Sabme, true, &[])
        .unwrap();
    buf[..n].to_vec()
}

// --- Q.931 payload builders ----------------------------------------------

/// Assemble a Q.931 message payload with a two-octet call reference exactly
/// as it appears on the wire.
pub fn q931_msg(wire_cref: u16, msg_type: u8, ies: &[u8]) -> Vec<u8> {
    let mut v = vec![
        0x08,
        0x02,
        (wire_cref >> 8) as u8,
        (wire_cref & 0xff) as u8,
        msg_type,
    ];
    v.extend_from_slice(ies);
    v
}

/// Bearer Capability: speech, 64 kbit/s circuit mode, mu-law.
pub fn bearer_ie_speech() -> Vec<u8> {
    vec![0x04, 0x03, 0x80, 0x90, 0xa2]
}

/// Channel Identification: exclusive explicit B channel on a primary span.
pub fn channel_ie_exclusive(channel: u8) -> Vec<u8> {
    vec![0x18, 0x03, 0xa9, 0x83, 0x80 | channel]
}

/// Called Party Number in the ISDN plan.
pub fn called_ie(digits: &str) -> Vec<u8> {
    let mut v = vec![0x70, (digits.len() + 1) as u8, 0x81];
    v.extend_from_slice(digits.as_bytes());
    v
}

/// Calling Party Number with a presentation octet.
pub fn calling_ie(digits: &str) -> Vec<u8> {
    let mut v = vec![0x6c, (digits.len() + 2) as u8, 0x21, 0x80];
    v.extend_from_slice(digits.as_bytes());
    v
}

/// Cause with CCITT coding, public-network location.
pub fn cause_ie(value: u8) -> Vec<u8> {
    vec![0x08, 0x02, 0x82, 0x80 | value]
}

/// Restart Indicator.
pub fn restart_ie(class: u8) -> Vec<u8> {
    vec![0x79, 0x01, 0x80 | class]
}

/// Progress Indicator with the given description.
pub fn progress_ie(description: u8) -> Vec<u8> {
    vec![0x1e, 0x02, 0x81, 0x80 | description]
}

/// Display IE carrying a name.
pub fn display_ie(name: &str) -> Vec<u8> {
    let mut v = vec![0x28, name.len() as u8];
    v.extend_from_slice(name.as_bytes());
    v
}

/// A complete SETUP from the user side: speech on the given channel.
pub fn setup_payload(wire_cref: u16, channel: u8, caller: &str, called: &str) -> Vec<u8> {
    let mut ies = bearer_ie_speech();
    ies.extend_from_slice(&channel_ie_exclusive(channel));
    ies.extend_from_slice(&calling_ie(caller));
    ies.extend_from_slice(&called_ie(called));
    q931_msg(wire_cref, 0x05, &ies)
}

// --- dissectors ----------------------------------------------------------

/// Decode a captured frame and return the Q.931 (message type, wire call
/// reference, full payload) if it carries one.
pub fn q931_of(frame: &[u8]) -> Option<(u8, u16, Vec<u8>)> {
    let payload: &[u8] = match decode(frame).ok()? {
        Frame::I { payload, .. } => payload,
        Frame::U { kind: UFrame::Ui, payload, .. } => payload,
        _ => return None,
    };
    q931_codec::decode_header(payload).ok()?;
    let wire_cref = ((payload[2] as u16) << 8) | payload[3] as u16;
    Some((hdr_msg(payload), wire_cref, payload.to_vec()))
}

fn hdr_msg(payload: &[u8]) -> u8 {
    let crlen = (payload[1] & 0x0f) as usize;
    payload[2 + crlen]
}

/// The decoded Q.921 view of a captured frame.
pub fn classify(frame: &[u8]) -> Option<Frame<'_>> {
    decode(frame).ok()
}

/// True when the captured frame is the given U-frame kind.
pub fn is_u_frame(frame: &[u8], kind: UFrame) -> bool {
    matches!(decode(frame), Ok(Frame::U { kind: k, .. }) if k == kind)
}

/// The (message type, Ri, Ai) of a captured TEI management frame, if any.
pub fn tei_mgmt_of(frame: &[u8]) -> Option<TeiMgmt> {
    match decode(frame).ok()? {
        Frame::U { kind: UFrame::Ui, payload, .. } => {
            q921_codec::decode_tei_mgmt(payload).ok()
        }
        _ => None,
    }
}

/// Find the first IE with `id` inside a Q.931 payload and return its data.
pub fn find_ie(payload: &[u8], id: u8) -> Option<Vec<u8>> {
    let (_, off) = q931_codec::decode_header(payload).ok()?;
    for item in q931_codec::IeIter::new(&payload[off..]) {
        let raw = item.ok()?;
        if raw.id == id {
            return Some(raw.data.to_vec());
        }
    }
    None
}
