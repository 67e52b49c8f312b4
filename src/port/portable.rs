//! Backend built on the `serialport` crate.
//!
//! Used where no native backend exists. Reads and writes go through separate
//! cloned handles so one thread can block in a read while another writes.
//!
//! `serialport` always applies its builder defaults (8N1, no flow control)
//! when opening, so the device's previous format is not preserved at open
//! the way the termios backend preserves it.

use super::conf::{Flow, Parity};
use super::speed::SpeedTable;
use super::traits::{unsupported, Backend, FlushSelector, LineFields, LineSpeed};
use parking_lot::Mutex;
use serialport::{ClearBuffer, DataBits, FlowControl, SerialPort, StopBits};
use std::fmt;
use std::io::{self, Read, Write};
use std::time::Duration;

static PORTABLE_SPEEDS: SpeedTable<u32> = SpeedTable::new(&[
    (50, 50),
    (75, 75),
    (110, 110),
    (134, 134),
    (150, 150),
    (200, 200),
    (300, 300),
    (600, 600),
    (1200, 1200),
    (1800, 1800),
    (2400, 2400),
    (4800, 4800),
    (9600, 9600),
    (19200, 19200),
    (38400, 38400),
    (57600, 57600),
    (115200, 115200),
    (230400, 230400),
    (460800, 460800),
    (500000, 500000),
    (576000, 576000),
    (921600, 921600),
    (1000000, 1000000),
    (1152000, 1152000),
    (1500000, 1500000),
    (2000000, 2000000),
    (2500000, 2500000),
    (3000000, 3000000),
    (3500000, 3500000),
    (4000000, 4000000),
]);

/// Rate the builder needs before the real settings can be read back.
const OPEN_BAUD_RATE: u32 = 9600;

/// Line settings as `serialport` exposes them.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PortableControl {
    pub baud_rate: u32,
    pub data_bits: DataBits,
    pub stop_bits: StopBits,
    pub parity: serialport::Parity,
    pub flow_control: FlowControl,
}

pub struct PortableBackend {
    name: String,
    reader: Mutex<Box<dyn SerialPort>>,
    writer: Mutex<Box<dyn SerialPort>>,
    control: Mutex<Box<dyn SerialPort>>,
}

impl fmt::Debug for PortableBackend {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PortableBackend")
            .field("name", &self.name)
            .finish_non_exhaustive()
    }
}

fn timed_out(err: &io::Error) -> bool {
    matches!(
        err.kind(),
        io::ErrorKind::TimedOut | io::ErrorKind::WouldBlock | io::ErrorKind::Interrupted
    )
}

impl Backend for PortableBackend {
    type Control = PortableControl;
    type Code = u32;

    fn speed_table() -> &'static SpeedTable<u32> {
        &PORTABLE_SPEEDS
    }

    fn open(name: &str) -> io::Result<Self> {
        let port = serialport::new(name, OPEN_BAUD_RATE)
            .timeout(Duration::ZERO)
            .open()
            .map_err(io::Error::from)?;
        let reader = port.try_clone().map_err(io::Error::from)?;
        let writer = port.try_clone().map_err(io::Error::from)?;

        Ok(Self {
            name: name.to_string(),
            reader: Mutex::new(reader),
            writer: Mutex::new(writer),
            control: Mutex::new(port),
        })
    }

    fn close(self) -> io::Result<()> {
        // Handles close on drop; the cloned ones share the device.
        drop(self);
        Ok(())
    }

    fn set_raw_mode(&self) -> io::Result<()> {
        // serialport opens devices without line processing.
        Ok(())
    }

    fn get_control(&self) -> io::Result<PortableControl> {
        let port = self.control.lock();
        Ok(PortableControl {
            baud_rate: port.baud_rate()?,
            data_bits: port.data_bits()?,
            stop_bits: port.stop_bits()?,
            parity: port.parity()?,
            flow_control: port.flow_control()?,
        })
    }

    fn set_control(&self, control: &PortableControl) -> io::Result<()> {
        let mut port = self.control.lock();
        port.set_baud_rate(control.baud_rate)?;
        port.set_data_bits(control.data_bits)?;
        port.set_stop_bits(control.stop_bits)?;
        port.set_parity(control.parity)?;
        port.set_flow_control(control.flow_control)?;
        Ok(())
    }

    fn read(&self, buffer: &mut [u8], budget: Duration) -> io::Result<usize> {
        let mut port = self.reader.lock();
        port.set_timeout(budget)?;
        match port.read(buffer) {
            Ok(0) => Err(io::Error::new(
                io::ErrorKind::UnexpectedEof,
                "serial device hung up",
            )),
            Ok(n) => Ok(n),
            Err(err) if timed_out(&err) => Ok(0),
            Err(err) => Err(err),
        }
    }

    fn write(&self, data: &[u8], budget: Duration) -> io::Result<usize> {
        let mut port = self.writer.lock();
        port.set_timeout(budget)?;
        match port.write(data) {
            Ok(n) => Ok(n),
            Err(err) if timed_out(&err) => Ok(0),
            Err(err) => Err(err),
        }
    }

    fn flush(&self, selector: FlushSelector) -> io::Result<()> {
        let buffer = match selector {
            FlushSelector::Input => ClearBuffer::Input,
            FlushSelector::Output => ClearBuffer::Output,
            FlushSelector::Both => ClearBuffer::All,
        };
        self.control.lock().clear(buffer)?;
        Ok(())
    }

    fn hangup(&self) -> io::Result<()> {
        let mut port = self.control.lock();
        port.write_data_terminal_ready(false)?;
        port.write_request_to_send(false)?;
        Ok(())
    }

    fn decode(control: &PortableControl) -> LineFields<u32> {
        let speed = match PORTABLE_SPEEDS.code_for(control.baud_rate) {
            Some(code) => LineSpeed::Code(code),
            None => LineSpeed::Rate(control.baud_rate),
        };
        LineFields {
            speed,
            data_bits: match control.data_bits {
                DataBits::Five => 5,
                DataBits::Six => 6,
                DataBits::Seven => 7,
                DataBits::Eight => 8,
            },
            stop_bits: match control.stop_bits {
                StopBits::One => 1,
                StopBits::Two => 2,
            },
            parity: match control.parity {
                serialport::Parity::None => Parity::None,
                serialport::Parity::Odd => Parity::Odd,
                serialport::Parity::Even => Parity::Even,
            },
            flow: match control.flow_control {
                FlowControl::None => Flow::None,
                FlowControl::Hardware => Flow::RtsCts,
                FlowControl::Software => Flow::XonXoff,
            },
        }
    }

    fn encode(control: &mut PortableControl, fields: &LineFields<u32>) -> io::Result<()> {
        let baud_rate = match fields.speed {
            LineSpeed::Code(rate) | LineSpeed::Rate(rate) => rate,
        };
        let data_bits = match fields.data_bits {
            5 => DataBits::Five,
            6 => DataBits::Six,
            7 => DataBits::Seven,
            8 => DataBits::Eight,
            other => return Err(unsupported(format_args!("{other} data bits"))),
        };
        let stop_bits = match fields.stop_bits {
            1 => StopBits::One,
            2 => StopBits::Two,
            other => return Err(unsupported(format_args!("{other} stop bits"))),
        };
        let parity = match fields.parity {
            Parity::None => serialport::Parity::None,
            Parity::Odd => serialport::Parity::Odd,
            Parity::Even => serialport::Parity::Even,
            Parity::Mark | Parity::Space => return Err(unsupported(fields.parity)),
        };

        control.baud_rate = baud_rate;
        control.data_bits = data_bits;
        control.stop_bits = stop_bits;
        control.parity = parity;
        control.flow_control = match fields.flow {
            Flow::None => FlowControl::None,
            Flow::RtsCts => FlowControl::Hardware,
            Flow::XonXoff => FlowControl::Software,
            Flow::Other => control.flow_control,
        };
        Ok(())
    }

    fn accepts_raw_rates(&self) -> bool {
        true
    }
}
