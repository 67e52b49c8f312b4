//! Core traits for serial port abstraction.
//!
//! Defines the [`Backend`] trait: the narrow set of OS operations a port
//! session needs. Each platform provides one implementation; the virtual
//! backend implements it in memory for tests.

use super::conf::{Flow, Parity};
use super::speed::SpeedTable;
use std::fmt;
use std::io;
use std::time::Duration;

/// Selects the queue(s) a flush discards.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FlushSelector {
    /// Received data not yet read.
    Input,
    /// Written data not yet transmitted.
    Output,
    Both,
}

/// Line speed as stored in a native configuration record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum LineSpeed<C> {
    /// One of the platform's speed codes.
    Code(C),
    /// A plain numeric rate, for platforms that store arbitrary rates.
    Rate(u32),
}

/// The modeled subset of a native line configuration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct LineFields<C> {
    pub speed: LineSpeed<C>,
    pub data_bits: u8,
    pub stop_bits: u8,
    pub parity: Parity,
    pub flow: Flow,
}

/// OS-level operations on a single open serial device.
///
/// Blocking calls take a relative `budget`; the session computes it from its
/// absolute deadlines each time it re-enters a wait. `read` and `write` return
/// `Ok(0)` when the budget elapsed (or the wait woke up) without progress.
pub trait Backend: Sized + Send + Sync + fmt::Debug {
    /// Native line-control record, e.g. a `termios` structure.
    type Control: Clone + Send + Sync + fmt::Debug;

    /// Native speed code.
    type Code: Copy + PartialEq + fmt::Debug + Send + Sync + 'static;

    /// Rates this backend can express as speed codes.
    fn speed_table() -> &'static SpeedTable<Self::Code>;

    /// Open the named device. Line settings must be left as found.
    fn open(name: &str) -> io::Result<Self>;

    /// Release the device.
    fn close(self) -> io::Result<()>;

    /// Put the device into transparent byte mode without touching rate,
    /// character format or flow control.
    fn set_raw_mode(&self) -> io::Result<()>;

    fn get_control(&self) -> io::Result<Self::Control>;

    /// Apply a complete native configuration.
    fn set_control(&self, control: &Self::Control) -> io::Result<()>;

    /// Read available bytes, waiting at most `budget` for the first one.
    fn read(&self, buffer: &mut [u8], budget: Duration) -> io::Result<usize>;

    /// Write as many bytes as the device accepts, waiting at most `budget`
    /// for room.
    fn write(&self, data: &[u8], budget: Duration) -> io::Result<usize>;

    /// Discard queued data.
    fn flush(&self, selector: FlushSelector) -> io::Result<()>;

    /// De-assert the modem control lines (DTR and RTS).
    fn hangup(&self) -> io::Result<()>;

    /// Extract the modeled fields from a native record.
    fn decode(control: &Self::Control) -> LineFields<Self::Code>;

    /// Store `fields` into a native record.
    ///
    /// `Flow::Other` leaves the flow bits untouched. Values the platform cannot
    /// represent fail with `io::ErrorKind::InvalidInput`.
    fn encode(control: &mut Self::Control, fields: &LineFields<Self::Code>) -> io::Result<()>;

    /// Whether rates missing from the speed table may be requested as
    /// [`LineSpeed::Rate`].
    fn accepts_raw_rates(&self) -> bool {
        false
    }
}

pub(crate) fn unsupported(what: impl fmt::Display) -> io::Error {
    io::Error::new(
        io::ErrorKind::InvalidInput,
        format!("{what} is not supported on this port"),
    )
}
