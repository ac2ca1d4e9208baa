//! Node roles and switch dialect variants.

use crate::custom::PriError;

/// Which end of the D-channel this controller plays.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NodeType {
    /// The network side of the interface
    Network,
    /// Customer premises equipment (the user side)
    Cpe,
}

/// Switch dialect driving the small per-vendor divergences in message
/// composition and state handling. These are predicates consulted from the
/// IE transmitters and the call engine, not separate code paths.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SwitchVariant {
    /// National ISDN 2
    Ni2,
    /// Nortel DMS-100
    Dms100,
    /// Lucent 5ESS
    Lucent5E,
    /// AT&T 4ESS
    Att4Ess,
    /// EuroISDN over E1 (ETSI 300-102)
    EuroIsdnE1,
    /// EuroISDN over T1 (ETSI 300-102)
    EuroIsdnT1,
    /// National ISDN 1
    Ni1,
    /// GR-303 Embedded Operations Channel
    Gr303Eoc,
    /// GR-303 Timeslot Management Channel
    Gr303Tmc,
    /// Q.SIG private network signalling
    QSig,
}

impl SwitchVariant {
    /// True for the EuroISDN variants, which include the Sending Complete IE.
    pub fn is_euroisdn(self) -> bool {
        matches!(self, SwitchVariant::EuroIsdnE1 | SwitchVariant::EuroIsdnT1)
    }

    /// True for variants that reject user-screened presentation values.
    pub fn restricts_presentation(self) -> bool {
        matches!(self, SwitchVariant::Dms100 | SwitchVariant::Att4Ess)
    }

    /// True when the span is an E1 (31-channel) interface.
    pub fn is_e1(self) -> bool {
        matches!(self, SwitchVariant::EuroIsdnE1 | SwitchVariant::QSig)
    }
}

impl TryFrom<u8> for SwitchVariant {
    type Error = PriError;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        match value {
            1 => Ok(SwitchVariant::Ni2),
            2 => Ok(SwitchVariant::Dms100),
            3 => Ok(SwitchVariant::Lucent5E),
            4 => Ok(SwitchVariant::Att4Ess),
            5 => Ok(SwitchVariant::EuroIsdnE1),
            6 => Ok(SwitchVariant::EuroIsdnT1),
            7 => Ok(SwitchVariant::Ni1),
            8 => Ok(SwitchVariant::Gr303Eoc),
            9 => Ok(SwitchVariant::Gr303Tmc),
            10 => Ok(SwitchVariant::QSig),
            _ => Err(PriError::UnsupportedSwitch),
        }
    }
}

/// Debug trace mask for a controller. A zero mask keeps the stack quiet
/// except for errors.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DebugFlags(pub u32);

impl DebugFlags {
    /// Q.921 state transitions
    pub const Q921_STATE: DebugFlags = DebugFlags(1 << 0);
    /// Q.921 frame dumps
    pub const Q921_DUMP: DebugFlags = DebugFlags(1 << 1);
    /// Q.931 state transitions
    pub const Q931_STATE: DebugFlags = DebugFlags(1 << 2);
    /// Q.931 message and IE dumps
    pub const Q931_DUMP: DebugFlags = DebugFlags(1 << 3);
    /// Everything
    pub const ALL: DebugFlags = DebugFlags(0xf);

    /// True when every bit of `other` is set in `self`.
    pub fn contains(self, other: DebugFlags) -> bool {
        self.0 & other.0 == other.0
    }

    /// Union of two masks.
    pub fn union(self, other: DebugFlags) -> DebugFlags {
        DebugFlags(self.0 | other.0)
    }
}
