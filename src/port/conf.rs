//! Line configuration model.
//!
//! [`Conf`] carries the parameters of a serial line. Together with
//! [`ConfFlags`] it describes partial updates: only the selected fields are
//! applied, everything else keeps its live value.

use crate::error::{Error, Result};
use bitflags::bitflags;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Serial line parameters.
///
/// A zero `baudrate` means "unspecified". It is only valid in a request that
/// does not select [`ConfFlags::BAUDRATE`], and it is what a query reports when
/// the live rate cannot be expressed as a number.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(default)]
pub struct Conf {
    /// Baud rate (bits per second).
    pub baudrate: u32,

    /// Number of data bits (5, 6, 7, or 8).
    pub databits: u8,

    /// Number of stop bits (1 or 2).
    pub stopbits: u8,

    /// Parity bit mode.
    pub parity: Parity,

    /// Flow control mode.
    pub flow: Flow,

    /// Leave the line as it is on close: no restore of the settings found at
    /// open and no hang-up.
    pub no_reset: bool,
}

impl fmt::Display for Conf {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} baud, {} data bits, parity {}, {} stop bits, flow {}",
            self.baudrate, self.databits, self.parity, self.stopbits, self.flow
        )?;
        if self.no_reset {
            f.write_str(", no reset")?;
        }
        Ok(())
    }
}

/// Parity bit modes.
///
/// `Mark` and `Space` keep the parity bit at `1` or `0` respectively. Not every
/// platform supports them.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Parity {
    #[default]
    None,
    Even,
    Odd,
    Mark,
    Space,
}

impl fmt::Display for Parity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Parity::None => "none",
            Parity::Even => "even",
            Parity::Odd => "odd",
            Parity::Mark => "mark",
            Parity::Space => "space",
        })
    }
}

/// Flow control modes.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Flow {
    #[default]
    None,
    /// Hardware flow control.
    RtsCts,
    /// Software flow control.
    XonXoff,
    /// A flow control setup that matches none of the other modes. Only ever
    /// reported by queries, never accepted in a request.
    Other,
}

impl fmt::Display for Flow {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Flow::None => "none",
            Flow::RtsCts => "rts/cts",
            Flow::XonXoff => "xon/xoff",
            Flow::Other => "other",
        })
    }
}

bitflags! {
    /// Selects which fields of a [`Conf`] an update applies.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
    pub struct ConfFlags: u8 {
        const BAUDRATE = 1;
        const DATABITS = 1 << 1;
        const PARITY = 1 << 2;
        const STOPBITS = 1 << 3;
        const FLOW = 1 << 4;
        const NO_RESET = 1 << 5;

        /// Character format: data bits, parity and stop bits.
        const FORMAT = Self::DATABITS.bits() | Self::PARITY.bits() | Self::STOPBITS.bits();
        const ALL = Self::BAUDRATE.bits() | Self::FORMAT.bits() | Self::FLOW.bits() | Self::NO_RESET.bits();
    }
}

impl ConfFlags {
    /// Flags that change the hardware (everything except `NO_RESET`).
    pub const LINE: ConfFlags = ConfFlags::BAUDRATE
        .union(ConfFlags::FORMAT)
        .union(ConfFlags::FLOW);

    /// Whether applying these flags needs a round trip to the OS.
    pub fn touches_line(self) -> bool {
        self.intersects(Self::LINE)
    }
}

impl Conf {
    /// Check the fields selected by `flags` against the supported domain.
    ///
    /// Whether a baud rate is actually available depends on the backend and is
    /// checked by the session; here only the zero rate is rejected.
    pub fn validate(&self, flags: ConfFlags) -> Result<()> {
        if flags.contains(ConfFlags::BAUDRATE) && self.baudrate == 0 {
            return Err(Error::invalid("baudrate must not be 0"));
        }
        if flags.contains(ConfFlags::DATABITS) && !(5..=8).contains(&self.databits) {
            return Err(Error::invalid(format!(
                "databits must be 5, 6, 7 or 8 (got {})",
                self.databits
            )));
        }
        if flags.contains(ConfFlags::STOPBITS) && !matches!(self.stopbits, 1 | 2) {
            return Err(Error::invalid(format!(
                "stopbits must be 1 or 2 (got {})",
                self.stopbits
            )));
        }
        if flags.contains(ConfFlags::FLOW) && self.flow == Flow::Other {
            return Err(Error::invalid("flow mode 'other' cannot be requested"));
        }
        Ok(())
    }

    /// Copy the fields selected by `flags` from `other` into `self`.
    pub fn merge(&mut self, other: &Conf, flags: ConfFlags) {
        if flags.contains(ConfFlags::BAUDRATE) {
            self.baudrate = other.baudrate;
        }
        if flags.contains(ConfFlags::DATABITS) {
            self.databits = other.databits;
        }
        if flags.contains(ConfFlags::PARITY) {
            self.parity = other.parity;
        }
        if flags.contains(ConfFlags::STOPBITS) {
            self.stopbits = other.stopbits;
        }
        if flags.contains(ConfFlags::FLOW) {
            self.flow = other.flow;
        }
        if flags.contains(ConfFlags::NO_RESET) {
            self.no_reset = other.no_reset;
        }
    }
}
