//! In-memory serial devices for testing.
//!
//! A [`VirtualDevice`] is registered under a name in a process-wide registry;
//! opening that name through [`VirtualBackend`] yields a port connected to it.
//! The device handle plays the other end of the line:
//! - push bytes for the port to read
//! - inspect the bytes the port wrote
//! - stall the consumer so writes only partially complete
//! - make the "OS" reject configurations or fail I/O
//!
//! Device state outlives the port, so close/reopen cycles can be observed.
//! The name is unregistered when the last clone of the device handle drops;
//! ports that are still open keep working.

use super::conf::{Flow, Parity};
use super::session::{Port, PortOptions};
use super::speed::SpeedTable;
use super::traits::{unsupported, Backend, FlushSelector, LineFields, LineSpeed};
use once_cell::sync::Lazy;
use parking_lot::{Condvar, Mutex};
use std::collections::{HashMap, VecDeque};
use std::io;
use std::sync::Arc;
use std::time::Duration;
use tracing::trace;

/// A port session on a virtual device.
pub type VirtualPort = Port<VirtualBackend>;

static VIRTUAL_SPEEDS: SpeedTable<u16> = SpeedTable::new(&[
    (50, 1),
    (75, 2),
    (110, 3),
    (134, 4),
    (150, 5),
    (200, 6),
    (300, 7),
    (600, 8),
    (1200, 9),
    (1800, 10),
    (2400, 11),
    (4800, 12),
    (9600, 13),
    (19200, 14),
    (38400, 15),
    (57600, 16),
    (115200, 17),
    (230400, 18),
    (460800, 19),
    (921600, 20),
]);

static REGISTRY: Lazy<Mutex<HashMap<String, Arc<Shared>>>> =
    Lazy::new(|| Mutex::new(HashMap::new()));

/// Native configuration record of a virtual device.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct VirtualControl {
    pub speed: LineSpeed<u16>,
    pub data_bits: u8,
    pub stop_bits: u8,
    pub parity: Parity,
    pub flow: Flow,
    /// Whether the line discipline is in raw mode.
    pub raw: bool,
}

impl Default for VirtualControl {
    /// 9600 baud, 8N1, no flow control, cooked mode.
    fn default() -> Self {
        Self {
            speed: LineSpeed::Code(13),
            data_bits: 8,
            stop_bits: 1,
            parity: Parity::None,
            flow: Flow::None,
            raw: false,
        }
    }
}

#[derive(Debug)]
struct DeviceState {
    control: VirtualControl,
    open: bool,
    input: VecDeque<u8>,
    output: Vec<u8>,
    /// Bytes the far end still accepts before it stalls.
    tx_window: usize,
    dtr: bool,
    rts: bool,
    hangups: usize,
    flushes: Vec<FlushSelector>,
    raw_rates: bool,
    fail_queries: bool,
    reject_configs: bool,
    partial_apply: bool,
    io_failure: Option<io::ErrorKind>,
}

impl Default for DeviceState {
    fn default() -> Self {
        Self {
            control: VirtualControl::default(),
            open: false,
            input: VecDeque::new(),
            output: Vec::new(),
            tx_window: usize::MAX,
            dtr: false,
            rts: false,
            hangups: 0,
            flushes: Vec::new(),
            raw_rates: false,
            fail_queries: false,
            reject_configs: false,
            partial_apply: false,
            io_failure: None,
        }
    }
}

#[derive(Debug, Default)]
struct Shared {
    state: Mutex<DeviceState>,
    changed: Condvar,
}

/// Test-side handle of a virtual serial device.
///
/// # Example
/// ```
/// use serial_line::port::VirtualDevice;
///
/// let device = VirtualDevice::create("doc-loopback");
/// let port = device.open().unwrap();
///
/// device.push_input(b"ping");
/// let mut buffer = [0u8; 8];
/// let n = port.read(&mut buffer).unwrap();
/// assert_eq!(&buffer[..n], b"ping");
///
/// port.write(b"pong").unwrap();
/// assert_eq!(device.output(), b"pong");
/// ```
#[derive(Debug, Clone)]
pub struct VirtualDevice {
    name: String,
    shared: Arc<Shared>,
    _registration: Arc<Registration>,
}

/// Registry entry owned jointly by all clones of a [`VirtualDevice`].
#[derive(Debug)]
struct Registration {
    name: String,
    shared: Arc<Shared>,
}

impl Drop for Registration {
    fn drop(&mut self) {
        unregister(&self.name, &self.shared);
    }
}

/// Remove `name` from the registry if it still refers to `shared`.
fn unregister(name: &str, shared: &Arc<Shared>) {
    let mut registry = REGISTRY.lock();
    if registry
        .get(name)
        .is_some_and(|registered| Arc::ptr_eq(registered, shared))
    {
        registry.remove(name);
    }
}

impl VirtualDevice {
    /// Register a fresh device under `name`, replacing any previous one.
    pub fn create(name: impl Into<String>) -> Self {
        Self::with_line(name, VirtualControl::default())
    }

    /// Register a fresh device whose line starts out as `control`.
    pub fn with_line(name: impl Into<String>, control: VirtualControl) -> Self {
        let name = name.into();
        let shared = Arc::new(Shared::default());
        shared.state.lock().control = control;
        REGISTRY.lock().insert(name.clone(), Arc::clone(&shared));
        let registration = Arc::new(Registration {
            name: name.clone(),
            shared: Arc::clone(&shared),
        });
        Self {
            name,
            shared,
            _registration: registration,
        }
    }

    /// Remove the device from the registry. Open ports keep working.
    pub fn unregister(&self) {
        unregister(&self.name, &self.shared);
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Open a port on this device with default options.
    pub fn open(&self) -> crate::Result<VirtualPort> {
        VirtualPort::open_with(&self.name, PortOptions::default())
    }

    /// Current line configuration as the "hardware" has it.
    pub fn line(&self) -> VirtualControl {
        self.shared.state.lock().control
    }

    /// Change the line configuration behind the port's back.
    pub fn set_line(&self, control: VirtualControl) {
        self.shared.state.lock().control = control;
    }

    pub fn is_open(&self) -> bool {
        self.shared.state.lock().open
    }

    /// Whether DTR is asserted.
    pub fn dtr(&self) -> bool {
        self.shared.state.lock().dtr
    }

    /// Whether RTS is asserted.
    pub fn rts(&self) -> bool {
        self.shared.state.lock().rts
    }

    /// Number of times the modem lines were dropped.
    pub fn hangups(&self) -> usize {
        self.shared.state.lock().hangups
    }

    /// Flush requests received so far, oldest first.
    pub fn flushes(&self) -> Vec<FlushSelector> {
        self.shared.state.lock().flushes.clone()
    }

    /// Queue bytes for the port to read.
    pub fn push_input(&self, data: &[u8]) {
        self.shared.state.lock().input.extend(data);
        self.shared.changed.notify_all();
    }

    /// Bytes queued for reading that the port has not consumed.
    pub fn pending_input(&self) -> usize {
        self.shared.state.lock().input.len()
    }

    /// Everything the port has written so far.
    pub fn output(&self) -> Vec<u8> {
        self.shared.state.lock().output.clone()
    }

    /// Return and forget everything written so far.
    pub fn take_output(&self) -> Vec<u8> {
        std::mem::take(&mut self.shared.state.lock().output)
    }

    /// Let the far end accept only `bytes` more bytes before it stalls.
    pub fn set_tx_window(&self, bytes: usize) {
        self.shared.state.lock().tx_window = bytes;
        self.shared.changed.notify_all();
    }

    /// Let a stalled far end accept `bytes` more bytes.
    pub fn grant(&self, bytes: usize) {
        let mut state = self.shared.state.lock();
        state.tx_window = state.tx_window.saturating_add(bytes);
        drop(state);
        self.shared.changed.notify_all();
    }

    /// Accept baud rates that are not in the speed table.
    pub fn allow_raw_rates(&self, allow: bool) {
        self.shared.state.lock().raw_rates = allow;
    }

    /// Make configuration queries fail.
    pub fn fail_queries(&self, fail: bool) {
        self.shared.state.lock().fail_queries = fail;
    }

    /// Make the "OS" reject every configuration change.
    pub fn reject_configs(&self, reject: bool) {
        self.shared.state.lock().reject_configs = reject;
    }

    /// When rejecting, apply the requested speed before failing.
    pub fn partial_apply(&self, partial: bool) {
        self.shared.state.lock().partial_apply = partial;
    }

    /// Make reads and writes fail with `kind`, or work again with `None`.
    pub fn fail_io(&self, kind: Option<io::ErrorKind>) {
        self.shared.state.lock().io_failure = kind;
        self.shared.changed.notify_all();
    }
}

/// Backend connecting a port to a registered [`VirtualDevice`].
#[derive(Debug)]
pub struct VirtualBackend {
    name: String,
    shared: Arc<Shared>,
}

impl Backend for VirtualBackend {
    type Control = VirtualControl;
    type Code = u16;

    fn speed_table() -> &'static SpeedTable<u16> {
        &VIRTUAL_SPEEDS
    }

    fn open(name: &str) -> io::Result<Self> {
        let shared = REGISTRY
            .lock()
            .get(name)
            .cloned()
            .ok_or_else(|| io::Error::new(io::ErrorKind::NotFound, "no such virtual device"))?;

        let mut state = shared.state.lock();
        if state.open {
            return Err(io::Error::other(format!("virtual device '{name}' is busy")));
        }
        state.open = true;
        state.dtr = true;
        state.rts = true;
        drop(state);

        Ok(Self {
            name: name.to_string(),
            shared,
        })
    }

    fn close(self) -> io::Result<()> {
        trace!(device = %self.name, "virtual device released");
        self.shared.state.lock().open = false;
        self.shared.changed.notify_all();
        Ok(())
    }

    fn set_raw_mode(&self) -> io::Result<()> {
        self.shared.state.lock().control.raw = true;
        Ok(())
    }

    fn get_control(&self) -> io::Result<VirtualControl> {
        let state = self.shared.state.lock();
        if state.fail_queries {
            return Err(io::Error::other("configuration query refused"));
        }
        Ok(state.control)
    }

    fn set_control(&self, control: &VirtualControl) -> io::Result<()> {
        let mut state = self.shared.state.lock();
        if state.reject_configs {
            if state.partial_apply {
                state.control.speed = control.speed;
            }
            return Err(io::Error::other("configuration rejected"));
        }
        state.control = *control;
        Ok(())
    }

    fn read(&self, buffer: &mut [u8], budget: Duration) -> io::Result<usize> {
        let mut state = self.shared.state.lock();
        if state.input.is_empty() && state.io_failure.is_none() {
            self.shared.changed.wait_for(&mut state, budget);
        }
        if let Some(kind) = state.io_failure {
            return Err(kind.into());
        }
        let n = buffer.len().min(state.input.len());
        for (slot, byte) in buffer.iter_mut().zip(state.input.drain(..n)) {
            *slot = byte;
        }
        Ok(n)
    }

    fn write(&self, data: &[u8], budget: Duration) -> io::Result<usize> {
        let mut state = self.shared.state.lock();
        if state.tx_window == 0 && state.io_failure.is_none() {
            self.shared.changed.wait_for(&mut state, budget);
        }
        if let Some(kind) = state.io_failure {
            return Err(kind.into());
        }
        let n = data.len().min(state.tx_window);
        state.output.extend_from_slice(&data[..n]);
        state.tx_window -= n;
        Ok(n)
    }

    fn flush(&self, selector: FlushSelector) -> io::Result<()> {
        let mut state = self.shared.state.lock();
        if matches!(selector, FlushSelector::Input | FlushSelector::Both) {
            state.input.clear();
        }
        state.flushes.push(selector);
        Ok(())
    }

    fn hangup(&self) -> io::Result<()> {
        let mut state = self.shared.state.lock();
        state.dtr = false;
        state.rts = false;
        state.hangups += 1;
        Ok(())
    }

    fn decode(control: &VirtualControl) -> LineFields<u16> {
        LineFields {
            speed: control.speed,
            data_bits: control.data_bits,
            stop_bits: control.stop_bits,
            parity: control.parity,
            flow: control.flow,
        }
    }

    fn encode(control: &mut VirtualControl, fields: &LineFields<u16>) -> io::Result<()> {
        if !(5..=8).contains(&fields.data_bits) {
            return Err(unsupported(format_args!("{} data bits", fields.data_bits)));
        }
        if !matches!(fields.stop_bits, 1 | 2) {
            return Err(unsupported(format_args!("{} stop bits", fields.stop_bits)));
        }
        control.speed = fields.speed;
        control.data_bits = fields.data_bits;
        control.stop_bits = fields.stop_bits;
        control.parity = fields.parity;
        if fields.flow != Flow::Other {
            control.flow = fields.flow;
        }
        Ok(())
    }

    fn accepts_raw_rates(&self) -> bool {
        self.shared.state.lock().raw_rates
    }
}

impl Drop for VirtualBackend {
    fn drop(&mut self) {
        // A backend dropped without close (e.g. after a panic) frees the device.
        self.shared.state.lock().open = false;
    }
}
