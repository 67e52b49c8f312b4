//! Port sessions.
//!
//! A [`Port`] owns one open device, the configuration found when it was
//! opened, and the read/write deadlines. Reads, writes and deadline changes
//! take `&self`, so one thread can read while another writes or re-arms a
//! deadline. Configuration changes and close take `&mut self`.

use super::conf::{Conf, ConfFlags};
use super::deadline::{DeadlineController, DeadlineState, Direction};
use super::traits::{Backend, FlushSelector, LineFields, LineSpeed};
use super::SystemBackend;
use crate::error::{Error, Result};
use std::io;
use std::time::{Duration, Instant};
use tracing::{debug, trace, warn};

/// Default upper bound for a single backend wait.
pub const DEFAULT_WAKE_INTERVAL: Duration = Duration::from_millis(20);

/// Options applied when opening a port.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PortOptions {
    /// Longest single wait inside a read or write. A deadline armed from
    /// another thread is noticed within this interval.
    pub wake_interval: Duration,
}

impl Default for PortOptions {
    fn default() -> Self {
        Self {
            wake_interval: DEFAULT_WAKE_INTERVAL,
        }
    }
}

/// An open serial port.
///
/// Dropping a port closes it like [`Port::close`], logging any failure.
#[derive(Debug)]
pub struct Port<B: Backend = SystemBackend> {
    name: String,
    backend: Option<B>,
    original: B::Control,
    no_reset: bool,
    deadlines: DeadlineController,
    wake_interval: Duration,
}

impl Port<SystemBackend> {
    /// Open the named port with default options.
    ///
    /// The port is switched to raw mode; baud rate, character format and flow
    /// control stay as the OS had them. Those settings are restored on close.
    ///
    /// # Example
    /// ```no_run
    /// use serial_line::{ConfFlags, Conf, Port};
    /// use std::time::{Duration, Instant};
    ///
    /// let mut port = Port::open("/dev/ttyUSB0")?;
    /// port.configure_some(&Conf { baudrate: 115200, ..Default::default() }, ConfFlags::BAUDRATE)?;
    /// port.set_read_deadline(Some(Instant::now() + Duration::from_secs(1)));
    ///
    /// let mut buffer = [0u8; 64];
    /// let n = port.read(&mut buffer)?;
    /// println!("{:?}", &buffer[..n]);
    /// port.close()?;
    /// # Ok::<(), serial_line::Error>(())
    /// ```
    pub fn open(name: &str) -> Result<Self> {
        Self::open_with(name, PortOptions::default())
    }
}

impl<B: Backend> Port<B> {
    /// Open the named port through backend `B`.
    pub fn open_with(name: &str, options: PortOptions) -> Result<Self> {
        let open_failed = |source| Error::OpenFailed {
            name: name.to_string(),
            source,
        };

        let backend = B::open(name).map_err(open_failed)?;
        // Snapshot before switching to raw mode, so close puts everything back.
        let original = match backend.get_control() {
            Ok(control) => control,
            Err(e) => return Err(release_after_failure(backend, open_failed(e))),
        };
        if let Err(e) = backend.set_raw_mode() {
            return Err(release_after_failure(backend, open_failed(e)));
        }

        debug!(port = name, "opened serial port");
        Ok(Self {
            name: name.to_string(),
            backend: Some(backend),
            original,
            no_reset: false,
            deadlines: DeadlineController::new(),
            wake_interval: options.wake_interval.max(Duration::from_millis(1)),
        })
    }

    /// The name the port was opened with.
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn is_closed(&self) -> bool {
        self.backend.is_none()
    }

    fn backend(&self) -> Result<&B> {
        self.backend.as_ref().ok_or(Error::AlreadyClosed)
    }

    /// Read back the live line configuration.
    pub fn conf(&self) -> Result<Conf> {
        let control = self.backend()?.get_control().map_err(Error::QueryFailed)?;
        Ok(self.to_conf(&B::decode(&control)))
    }

    /// The configuration found when the port was opened, which close restores.
    pub fn restore_snapshot(&self) -> Conf {
        Conf {
            no_reset: false,
            ..self.to_conf(&B::decode(&self.original))
        }
    }

    fn to_conf(&self, fields: &LineFields<B::Code>) -> Conf {
        let baudrate = match fields.speed {
            LineSpeed::Rate(rate) => rate,
            LineSpeed::Code(code) => B::speed_table().speed_for(code).unwrap_or_else(|| {
                warn!(port = %self.name, ?code, "speed code does not map to a known baud rate");
                0
            }),
        };
        Conf {
            baudrate,
            databits: fields.data_bits,
            stopbits: fields.stop_bits,
            parity: fields.parity,
            flow: fields.flow,
            no_reset: self.no_reset,
        }
    }

    /// Apply every field of `conf`.
    pub fn configure(&mut self, conf: &Conf) -> Result<()> {
        self.configure_some(conf, ConfFlags::ALL)
    }

    /// Apply the fields of `conf` selected by `flags`.
    ///
    /// All selected values are validated before the OS is contacted. Fields not
    /// selected are read from the live configuration and written back
    /// unchanged. If the OS rejects the merged configuration the port may be
    /// left partially configured; query with [`Port::conf`] to find out.
    ///
    /// `NO_RESET` is bookkeeping only: it decides what [`Port::close`] does.
    pub fn configure_some(&mut self, conf: &Conf, flags: ConfFlags) -> Result<()> {
        conf.validate(flags)?;
        let backend = self.backend()?;

        if flags.touches_line() {
            let speed = if flags.contains(ConfFlags::BAUDRATE) {
                Some(resolve_speed(backend, conf.baudrate)?)
            } else {
                None
            };

            let mut control = backend.get_control().map_err(Error::QueryFailed)?;
            let mut fields = B::decode(&control);
            if let Some(speed) = speed {
                fields.speed = speed;
            }
            if flags.contains(ConfFlags::DATABITS) {
                fields.data_bits = conf.databits;
            }
            if flags.contains(ConfFlags::STOPBITS) {
                fields.stop_bits = conf.stopbits;
            }
            if flags.contains(ConfFlags::PARITY) {
                fields.parity = conf.parity;
            }
            if flags.contains(ConfFlags::FLOW) {
                fields.flow = conf.flow;
            }
            B::encode(&mut control, &fields).map_err(|e| match e.kind() {
                io::ErrorKind::InvalidInput => Error::invalid(e.to_string()),
                _ => Error::ApplyFailed(e),
            })?;

            if let Err(e) = backend.set_control(&control) {
                warn!(port = %self.name, error = %e, "line configuration rejected, live state may be partially applied");
                return Err(Error::ApplyFailed(e));
            }
            debug!(port = %self.name, ?flags, %conf, "applied line configuration");
        }

        if flags.contains(ConfFlags::NO_RESET) {
            self.no_reset = conf.no_reset;
        }
        Ok(())
    }

    /// Set the deadline of both reads and writes. `None` removes it.
    ///
    /// Deadlines are absolute. A blocked call on another thread picks up the
    /// new value within the wake interval; a deadline in the past makes it
    /// return [`Error::Timeout`].
    pub fn set_deadline(&self, deadline: Option<Instant>) {
        self.deadlines.set(deadline);
    }

    pub fn set_read_deadline(&self, deadline: Option<Instant>) {
        self.deadlines.set_for(Direction::Read, deadline);
    }

    pub fn set_write_deadline(&self, deadline: Option<Instant>) {
        self.deadlines.set_for(Direction::Write, deadline);
    }

    pub fn deadline_state(&self, direction: Direction) -> DeadlineState {
        self.deadlines.state(direction)
    }

    /// Read into `buffer`, returning as soon as at least one byte arrived.
    ///
    /// Fails with `Timeout { transferred: 0 }` once the read deadline passes
    /// without data.
    pub fn read(&self, buffer: &mut [u8]) -> Result<usize> {
        let backend = self.backend()?;
        if buffer.is_empty() {
            return Ok(0);
        }
        loop {
            let budget = self
                .deadlines
                .wait_budget(Direction::Read, self.wake_interval)
                .map_err(|_| Error::Timeout { transferred: 0 })?;
            match backend.read(buffer, budget) {
                Ok(0) => continue,
                Ok(n) => {
                    trace!(port = %self.name, bytes = n, "read");
                    return Ok(n);
                }
                Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
                Err(e) => return Err(Error::io(0, e)),
            }
        }
    }

    /// Write all of `data` unless the write deadline passes first.
    ///
    /// On timeout the error reports how many bytes went out; the caller is
    /// responsible for the rest.
    pub fn write(&self, data: &[u8]) -> Result<usize> {
        let backend = self.backend()?;
        let mut written = 0;
        while written < data.len() {
            let budget = self
                .deadlines
                .wait_budget(Direction::Write, self.wake_interval)
                .map_err(|_| Error::Timeout {
                    transferred: written,
                })?;
            match backend.write(&data[written..], budget) {
                Ok(n) => written += n,
                Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
                Err(e) => return Err(Error::io(written, e)),
            }
        }
        trace!(port = %self.name, bytes = written, "wrote");
        Ok(written)
    }

    /// Discard queued input, output, or both.
    pub fn flush_buffers(&self, selector: FlushSelector) -> Result<()> {
        self.backend()?
            .flush(selector)
            .map_err(|e| Error::io(0, e))
    }

    /// Discard received data that has not been read yet.
    pub fn flush_input(&self) -> Result<()> {
        self.flush_buffers(FlushSelector::Input)
    }

    /// Discard written data that has not been transmitted yet.
    pub fn flush_output(&self) -> Result<()> {
        self.flush_buffers(FlushSelector::Output)
    }

    /// Close the port.
    ///
    /// Unless `no_reset` was configured, the settings found at open are
    /// restored and the modem control lines are de-asserted first. The device
    /// is released even if that fails; the first error is returned. Closing a
    /// closed port returns [`Error::AlreadyClosed`].
    pub fn close(&mut self) -> Result<()> {
        let backend = self.backend.take().ok_or(Error::AlreadyClosed)?;

        let mut outcome = Ok(());
        if !self.no_reset {
            if let Err(e) = backend.set_control(&self.original) {
                warn!(port = %self.name, error = %e, "failed to restore line configuration");
                outcome = Err(Error::ApplyFailed(e));
            }
            if let Err(e) = backend.hangup() {
                warn!(port = %self.name, error = %e, "failed to hang up");
                if outcome.is_ok() {
                    outcome = Err(Error::io(0, e));
                }
            }
        }
        if let Err(e) = backend.close() {
            if outcome.is_ok() {
                outcome = Err(Error::io(0, e));
            }
        }
        debug!(port = %self.name, no_reset = self.no_reset, "closed serial port");
        outcome
    }
}

fn resolve_speed<B: Backend>(backend: &B, baudrate: u32) -> Result<LineSpeed<B::Code>> {
    match B::speed_table().code_for(baudrate) {
        Some(code) => Ok(LineSpeed::Code(code)),
        None if backend.accepts_raw_rates() => Ok(LineSpeed::Rate(baudrate)),
        None => Err(Error::invalid(format!(
            "baudrate {baudrate} is not supported on this port"
        ))),
    }
}

fn release_after_failure<B: Backend>(backend: B, err: Error) -> Error {
    if let Err(e) = backend.close() {
        warn!(error = %e, "failed to release port after open failure");
    }
    err
}

impl<B: Backend> Drop for Port<B> {
    fn drop(&mut self) {
        if self.backend.is_some() {
            if let Err(e) = self.close() {
                warn!(port = %self.name, error = %e, "error while closing dropped port");
            }
        }
    }
}

impl<B: Backend> io::Read for &Port<B> {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        Port::read(*self, buf).map_err(io::Error::from)
    }
}

impl<B: Backend> io::Read for Port<B> {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        io::Read::read(&mut &*self, buf)
    }
}

impl<B: Backend> io::Write for &Port<B> {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        match Port::write(*self, buf) {
            Ok(n) => Ok(n),
            // Report partial progress; the next call surfaces the error.
            Err(Error::Timeout { transferred } | Error::IoFailure { transferred, .. })
                if transferred > 0 =>
            {
                Ok(transferred)
            }
            Err(e) => Err(e.into()),
        }
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

impl<B: Backend> io::Write for Port<B> {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        io::Write::write(&mut &*self, buf)
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}
