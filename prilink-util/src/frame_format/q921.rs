//! Q.921 (LAPD) frame codec.
//!
//! Frames arrive from the device already FCS-checked. The address field is
//! two octets (SAPI, C/R, TEI), followed by a one-octet control field for U
//! frames or a two-octet extended control field for I and S frames
//! (Q.921 §3.4, mod-128 operation).

use prilink_types::custom::{PriError, PriResult};
use prilink_types::frame::q921::{
    AddressOctet0, AddressOctet1, IControl0, MGMT_ENTITY, NrOctet, SAPI_MGMT, SControl0, SFrame,
    TEI_GROUP, TeiMgmtMsg, UControl, UFrame,
};

/// Shortest valid frame: address + one-octet U control.
pub const MIN_FRAME_LEN: usize = 3;
/// Length of an I or S frame header (address + extended control).
pub const HEADER_LEN_IS: usize = 4;

/// A decoded Q.921 frame. Payload slices borrow the receive buffer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Frame<'a> {
    /// Information frame carrying a Q.931 payload
    I {
        /// Service access point identifier
        sapi: u8,
        /// Terminal endpoint identifier
        tei: u8,
        /// Command/response bit as received
        c_r: bool,
        /// Send sequence number N(S)
        n_s: u8,
        /// Receive sequence number N(R)
        n_r: u8,
        /// Poll bit
        p_f: bool,
        /// Layer-3 payload
        payload: &'a [u8],
    },
    /// Supervisory frame
    S {
        /// Service access point identifier
        sapi: u8,
        /// Terminal endpoint identifier
        tei: u8,
        /// Command/response bit as received
        c_r: bool,
        /// RR, RNR, or REJ
        kind: SFrame,
        /// Receive sequence number N(R)
        n_r: u8,
        /// Poll/final bit
        p_f: bool,
    },
    /// Unnumbered frame
    U {
        /// Service access point identifier
        sapi: u8,
        /// Terminal endpoint identifier
        tei: u8,
        /// Command/response bit as received
        c_r: bool,
        /// SABME, UA, DISC, DM, UI, FRMR or XID
        kind: UFrame,
        /// Poll/final bit
        p_f: bool,
        /// Payload (UI frames only carry one)
        payload: &'a [u8],
    },
}

impl<'a> Frame<'a> {
    /// The (SAPI, TEI) pair addressing this frame.
    pub fn address(&self) -> (u8, u8) {
        match *self {
            Frame::I { sapi, tei, .. } | Frame::S { sapi, tei, .. } | Frame::U { sapi, tei, .. } => {
                (sapi, tei)
            }
        }
    }

    /// The command/response bit as received.
    pub fn c_r(&self) -> bool {
        match *self {
            Frame::I { c_r, .. } | Frame::S { c_r, .. } | Frame::U { c_r, .. } => c_r,
        }
    }
}

/// Decode one FCS-stripped frame.
pub fn decode(frame: &[u8]) -> PriResult<Frame<'_>> {
    if frame.len() < MIN_FRAME_LEN {
        return Err(PriError::ShortFrame);
    }
    let a0 = AddressOctet0::from_bits(frame[0]);
    let a1 = AddressOctet1::from_bits(frame[1]);
    if a0.ea0() || !a1.ea1() {
        return Err(PriError::MalformedFrame);
    }
    let sapi = a0.sapi();
    let tei = a1.tei();
    let c_r = a0.c_r();

    let ctrl = frame[2];
    if ctrl & 0x01 == 0 {
        // Information frame, extended control
        if frame.len() < HEADER_LEN_IS {
            return Err(PriError::ShortFrame);
        }
        let c0 = IControl0::from_bits(ctrl);
        let c1 = NrOctet::from_bits(frame[3]);
        Ok(Frame::I {
            sapi,
            tei,
            c_r,
            n_s: c0.n_s(),
            n_r: c1.n_r(),
            p_f: c1.p_f(),
            payload: &frame[HEADER_LEN_IS..],
        })
    } else if ctrl & 0x03 == 0x01 {
        // Supervisory frame, extended control
        if frame.len() < HEADER_LEN_IS {
            return Err(PriError::ShortFrame);
        }
        let c0 = SControl0::from_bits(ctrl);
        let c1 = NrOctet::from_bits(frame[3]);
        Ok(Frame::S {
            sapi,
            tei,
            c_r,
            kind: SFrame::try_from(c0.ss())?,
            n_r: c1.n_r(),
            p_f: c1.p_f(),
        })
    } else {
        // Unnumbered frame, single control octet
        let c0 = UControl::from_bits(ctrl);
        let kind =
            UFrame::from_modifier_bits(c0.m3(), c0.m2()).ok_or(PriError::MalformedFrame)?;
        Ok(Frame::U {
            sapi,
            tei,
            c_r,
            kind,
            p_f: c0.p_f(),
            payload: &frame[3..],
        })
    }
}

fn put_address(buf: &mut [u8], sapi: u8, tei: u8, c_r: bool) {
    let mut a0 = AddressOctet0::new();
    a0.set_sapi(sapi);
    a0.set_c_r(c_r);
    a0.set_ea0(false);
    let mut a1 = AddressOctet1::new();
    a1.set_tei(tei);
    a1.set_ea1(true);
    buf[0] = a0.into_bits();
    buf[1] = a1.into_bits();
}

/// Encode an unnumbered frame, returning the total length.
pub fn encode_u(
    buf: &mut [u8],
    sapi: u8,
    tei: u8,
    c_r: bool,
    kind: UFrame,
    p_f: bool,
    payload: &[u8],
) -> PriResult<usize> {
    let total = 3 + payload.len();
    if buf.len() < total {
        return Err(PriError::BufferFull);
    }
    put_address(buf, sapi, tei, c_r);
    let (m3, m2) = kind.modifier_bits();
    let mut ctrl = UControl::new();
    ctrl.set_ft(3);
    ctrl.set_m2(m2);
    ctrl.set_m3(m3);
    ctrl.set_p_f(p_f);
    buf[2] = ctrl.into_bits();
    buf[3..total].copy_from_slice(payload);
    Ok(total)
}

/// Encode a supervisory frame, returning the total length (always 4).
pub fn encode_s(
    buf: &mut [u8],
    sapi: u8,
    tei: u8,
    c_r: bool,
    kind: SFrame,
    n_r: u8,
    p_f: bool,
) -> PriResult<usize> {
    if buf.len() < HEADER_LEN_IS {
        return Err(PriError::BufferFull);
    }
    put_address(buf, sapi, tei, c_r);
    let mut c0 = SControl0::new();
    c0.set_ft(1);
    c0.set_ss(kind.ss_bits());
    buf[2] = c0.into_bits();
    let mut c1 = NrOctet::new();
    c1.set_n_r(n_r);
    c1.set_p_f(p_f);
    buf[3] = c1.into_bits();
    Ok(HEADER_LEN_IS)
}

/// Encode an information frame around `payload`, returning the total length.
pub fn encode_i(
    buf: &mut [u8],
    sapi: u8,
    tei: u8,
    c_r: bool,
    n_s: u8,
    n_r: u8,
    p_f: bool,
    payload: &[u8],
) -> PriResult<usize> {
    let total = HEADER_LEN_IS + payload.len();
    if buf.len() < total {
        return Err(PriError::BufferFull);
    }
    put_address(buf, sapi, tei, c_r);
    let mut c0 = IControl0::new();
    c0.set_ft(false);
    c0.set_n_s(n_s);
    buf[2] = c0.into_bits();
    let mut c1 = NrOctet::new();
    c1.set_n_r(n_r);
    c1.set_p_f(p_f);
    buf[3] = c1.into_bits();
    buf[HEADER_LEN_IS..total].copy_from_slice(payload);
    Ok(total)
}

/// One TEI management message (Q.921 §5.3.2).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TeiMgmt {
    /// Message type
    pub msg: TeiMgmtMsg,
    /// Reference number correlating request and response
    pub ri: u16,
    /// Action indicator (TEI value, or 127 for "any")
    pub ai: u8,
}

/// Encode a complete TEI management UI frame on SAPI 63 / group TEI.
pub fn encode_tei_mgmt(buf: &mut [u8], mgmt: &TeiMgmt, c_r: bool) -> PriResult<usize> {
    let payload = [
        MGMT_ENTITY,
        (mgmt.ri >> 8) as u8,
        (mgmt.ri & 0xff) as u8,
        mgmt.msg as u8,
        (mgmt.ai << 1) | 0x01,
    ];
    encode_u(buf, SAPI_MGMT, TEI_GROUP, c_r, UFrame::Ui, false, &payload)
}

/// Decode a TEI management message from a UI frame payload.
pub fn decode_tei_mgmt(payload: &[u8]) -> PriResult<TeiMgmt> {
    if payload.len() < 5 {
        return Err(PriError::ShortFrame);
    }
    if payload[0] != MGMT_ENTITY {
        return Err(PriError::MalformedFrame);
    }
    if payload[4] & 0x01 == 0 {
        // Multibyte action indicators are not used on the D channel
        return Err(PriError::MalformedFrame);
    }
    Ok(TeiMgmt {
        msg: TeiMgmtMsg::try_from(payload[3])?,
        ri: ((payload[1] as u16) << 8) | payload[2] as u16,
        ai: payload[4] >> 1,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn i_frame_round_trip() {
        let mut buf = [0u8; 64];
        let n = encode_i(&mut buf, 0, 0, true, 5, 9, false, &[0x08, 0x02, 0x00, 0x01, 0x05])
            .unwrap();
        assert_eq!(n, 9);
        match decode(&buf[..n]).unwrap() {
            Frame::I { sapi, tei, n_s, n_r, p_f, payload, .. } => {
                assert_eq!((sapi, tei), (0, 0));
                assert_eq!((n_s, n_r), (5, 9));
                assert!(!p_f);
                assert_eq!(payload, &[0x08, 0x02, 0x00, 0x01, 0x05]);
            }
            other => panic!("decoded {other:?}"),
        }
    }

    #[test]
    fn s_frame_round_trip() {
        let mut buf = [0u8; 8];
        let n = encode_s(&mut buf, 0, 3, false, SFrame::Rej, 42, true).unwrap();
        match decode(&buf[..n]).unwrap() {
            Frame::S { kind, n_r, p_f, tei, .. } => {
                assert_eq!(kind, SFrame::Rej);
                assert_eq!(n_r, 42);
                assert!(p_f);
                assert_eq!(tei, 3);
            }
            other => panic!("decoded {other:?}"),
        }
    }

    #[test]
    fn u_frame_round_trip() {
        let mut buf = [0u8; 8];
        let n = encode_u(&mut buf, 0, 0, true, UFrame::Sabme, true, &[]).unwrap();
        assert_eq!(n, 3);
        match decode(&buf[..n]).unwrap() {
            Frame::U { kind, p_f, .. } => {
                assert_eq!(kind, UFrame::Sabme);
                assert!(p_f);
            }
            other => panic!("decoded {other:?}"),
        }
    }

    #[test]
    fn tei_mgmt_round_trip() {
        let mut buf = [0u8; 16];
        let mgmt = TeiMgmt { msg: TeiMgmtMsg::IdentityRequest, ri: 0xabcd, ai: 127 };
        let n = encode_tei_mgmt(&mut buf, &mgmt, false).unwrap();
        match decode(&buf[..n]).unwrap() {
            Frame::U { kind: UFrame::Ui, payload, sapi, tei, .. } => {
                assert_eq!((sapi, tei), (SAPI_MGMT, TEI_GROUP));
                assert_eq!(decode_tei_mgmt(payload).unwrap(), mgmt);
            }
            other => panic!("decoded {other:?}"),
        }
    }

    #[test]
    fn bad_extension_bits_are_rejected() {
        // EA bit of the first address octet set
        assert_eq!(decode(&[0x01, 0x01, 0x73]), Err(PriError::MalformedFrame));
        // EA bit of the second address octet clear
        assert_eq!(decode(&[0x00, 0x00, 0x73]), Err(PriError::MalformedFrame));
    }
}
