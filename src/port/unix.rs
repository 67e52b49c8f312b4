//! termios backend for Unix-like systems.
//!
//! The device is opened non-blocking; every wait is a `poll(2)` bounded by the
//! budget the session hands in, so reads and writes on the same descriptor
//! can block concurrently from two threads.

use super::conf::{Flow, Parity};
use super::speed::SpeedTable;
use super::traits::{unsupported, Backend, FlushSelector, LineFields, LineSpeed};
use std::fs::OpenOptions;
use std::io;
use std::os::fd::{AsRawFd, IntoRawFd, OwnedFd, RawFd};
use std::os::unix::fs::OpenOptionsExt;
use std::time::Duration;

#[cfg(any(target_os = "linux", target_os = "android"))]
static TERMIOS_SPEEDS: SpeedTable<libc::speed_t> = SpeedTable::new(&[
    (50, libc::B50),
    (75, libc::B75),
    (110, libc::B110),
    (134, libc::B134),
    (150, libc::B150),
    (200, libc::B200),
    (300, libc::B300),
    (600, libc::B600),
    (1200, libc::B1200),
    (1800, libc::B1800),
    (2400, libc::B2400),
    (4800, libc::B4800),
    (9600, libc::B9600),
    (19200, libc::B19200),
    (38400, libc::B38400),
    (57600, libc::B57600),
    (115200, libc::B115200),
    (230400, libc::B230400),
    (460800, libc::B460800),
    (500000, libc::B500000),
    (576000, libc::B576000),
    (921600, libc::B921600),
    (1000000, libc::B1000000),
    (1152000, libc::B1152000),
    (1500000, libc::B1500000),
    (2000000, libc::B2000000),
    (2500000, libc::B2500000),
    (3000000, libc::B3000000),
    (3500000, libc::B3500000),
    (4000000, libc::B4000000),
]);

#[cfg(not(any(target_os = "linux", target_os = "android")))]
static TERMIOS_SPEEDS: SpeedTable<libc::speed_t> = SpeedTable::new(&[
    (50, libc::B50),
    (75, libc::B75),
    (110, libc::B110),
    (134, libc::B134),
    (150, libc::B150),
    (200, libc::B200),
    (300, libc::B300),
    (600, libc::B600),
    (1200, libc::B1200),
    (1800, libc::B1800),
    (2400, libc::B2400),
    (4800, libc::B4800),
    (9600, libc::B9600),
    (19200, libc::B19200),
    (38400, libc::B38400),
    (57600, libc::B57600),
    (115200, libc::B115200),
    (230400, libc::B230400),
]);

/// On the BSDs and macOS a speed code is the rate itself, so rates outside
/// the table can still be requested.
const RATE_IS_CODE: bool = !cfg!(any(target_os = "linux", target_os = "android"));

#[cfg(any(target_os = "linux", target_os = "android"))]
const CMSPAR: libc::tcflag_t = libc::CMSPAR;
#[cfg(not(any(target_os = "linux", target_os = "android")))]
const CMSPAR: libc::tcflag_t = 0;

#[cfg(any(target_os = "linux", target_os = "android"))]
const IUCLC: libc::tcflag_t = libc::IUCLC;
#[cfg(not(any(target_os = "linux", target_os = "android")))]
const IUCLC: libc::tcflag_t = 0;

/// A tty device driven through termios.
#[derive(Debug)]
pub struct TermiosBackend {
    fd: OwnedFd,
}

impl TermiosBackend {
    fn raw_fd(&self) -> RawFd {
        self.fd.as_raw_fd()
    }

    /// Wait until the descriptor is ready for `events`. `false` means the
    /// budget elapsed or the wait was interrupted.
    fn wait(&self, events: libc::c_short, budget: Duration) -> io::Result<bool> {
        let mut pollfd = libc::pollfd {
            fd: self.raw_fd(),
            events,
            revents: 0,
        };
        // SAFETY: one valid pollfd is passed with a length of 1.
        let ready = unsafe { libc::poll(&mut pollfd, 1, poll_timeout(budget)) };
        if ready < 0 {
            let err = io::Error::last_os_error();
            return match err.kind() {
                io::ErrorKind::Interrupted => Ok(false),
                _ => Err(err),
            };
        }
        if ready > 0 && pollfd.revents & libc::POLLNVAL != 0 {
            return Err(io::Error::from_raw_os_error(libc::EBADF));
        }
        Ok(ready > 0)
    }
}

/// Milliseconds for `poll`, rounded up so short budgets do not spin.
fn poll_timeout(budget: Duration) -> libc::c_int {
    let millis = budget.as_micros().div_ceil(1000).max(1);
    libc::c_int::try_from(millis).unwrap_or(libc::c_int::MAX)
}

fn check(ret: libc::c_int) -> io::Result<()> {
    if ret < 0 {
        Err(io::Error::last_os_error())
    } else {
        Ok(())
    }
}

/// Treat "no data right now" as zero progress instead of an error.
fn transfer_result(ret: isize) -> io::Result<usize> {
    if ret >= 0 {
        return Ok(ret as usize);
    }
    let err = io::Error::last_os_error();
    match err.kind() {
        io::ErrorKind::WouldBlock | io::ErrorKind::Interrupted => Ok(0),
        _ => Err(err),
    }
}

impl Backend for TermiosBackend {
    type Control = libc::termios;
    type Code = libc::speed_t;

    fn speed_table() -> &'static SpeedTable<libc::speed_t> {
        &TERMIOS_SPEEDS
    }

    fn open(name: &str) -> io::Result<Self> {
        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .custom_flags(libc::O_NOCTTY | libc::O_NONBLOCK)
            .open(name)?;
        let fd = OwnedFd::from(file);

        // SAFETY: isatty only inspects the descriptor.
        if unsafe { libc::isatty(fd.as_raw_fd()) } != 1 {
            return Err(io::Error::new(
                io::ErrorKind::InvalidInput,
                format!("{name} is not a terminal device"),
            ));
        }
        Ok(Self { fd })
    }

    fn close(self) -> io::Result<()> {
        let fd = self.fd.into_raw_fd();
        // SAFETY: the descriptor was owned by this backend and is closed once.
        check(unsafe { libc::close(fd) })
    }

    fn set_raw_mode(&self) -> io::Result<()> {
        let mut termios = self.get_control()?;
        termios.c_iflag &= !(libc::IGNBRK
            | libc::BRKINT
            | libc::PARMRK
            | libc::ISTRIP
            | libc::INLCR
            | libc::IGNCR
            | libc::ICRNL
            | libc::IMAXBEL
            | IUCLC);
        termios.c_oflag &= !libc::OPOST;
        termios.c_lflag &= !(libc::ECHO | libc::ECHONL | libc::ICANON | libc::ISIG | libc::IEXTEN);
        // Ignore carrier detect; hang-up on close is done explicitly.
        termios.c_cflag |= libc::CREAD | libc::CLOCAL;
        termios.c_cflag &= !libc::HUPCL;
        termios.c_cc[libc::VMIN] = 1;
        termios.c_cc[libc::VTIME] = 0;
        self.set_control(&termios)
    }

    fn get_control(&self) -> io::Result<libc::termios> {
        // SAFETY: termios is plain data, zero is a valid bit pattern, and
        // tcgetattr fills it completely on success.
        let mut termios: libc::termios = unsafe { std::mem::zeroed() };
        check(unsafe { libc::tcgetattr(self.raw_fd(), &mut termios) })?;
        Ok(termios)
    }

    fn set_control(&self, control: &libc::termios) -> io::Result<()> {
        // SAFETY: control points to a valid termios structure.
        check(unsafe { libc::tcsetattr(self.raw_fd(), libc::TCSANOW, control) })
    }

    fn read(&self, buffer: &mut [u8], budget: Duration) -> io::Result<usize> {
        if !self.wait(libc::POLLIN, budget)? {
            return Ok(0);
        }
        // SAFETY: the pointer and length describe the caller's buffer.
        let ret = unsafe {
            libc::read(
                self.raw_fd(),
                buffer.as_mut_ptr().cast::<libc::c_void>(),
                buffer.len(),
            )
        };
        if ret == 0 {
            return Err(io::Error::new(
                io::ErrorKind::UnexpectedEof,
                "serial device hung up",
            ));
        }
        transfer_result(ret)
    }

    fn write(&self, data: &[u8], budget: Duration) -> io::Result<usize> {
        if !self.wait(libc::POLLOUT, budget)? {
            return Ok(0);
        }
        // SAFETY: the pointer and length describe the caller's slice.
        let ret = unsafe {
            libc::write(
                self.raw_fd(),
                data.as_ptr().cast::<libc::c_void>(),
                data.len(),
            )
        };
        transfer_result(ret)
    }

    fn flush(&self, selector: FlushSelector) -> io::Result<()> {
        let queue = match selector {
            FlushSelector::Input => libc::TCIFLUSH,
            FlushSelector::Output => libc::TCOFLUSH,
            FlushSelector::Both => libc::TCIOFLUSH,
        };
        // SAFETY: tcflush only takes the descriptor and a queue selector.
        check(unsafe { libc::tcflush(self.raw_fd(), queue) })
    }

    fn hangup(&self) -> io::Result<()> {
        let lines: libc::c_int = libc::TIOCM_DTR | libc::TIOCM_RTS;
        // SAFETY: TIOCMBIC reads one c_int through the pointer.
        check(unsafe { libc::ioctl(self.raw_fd(), libc::TIOCMBIC as _, &lines) })
    }

    fn decode(control: &libc::termios) -> LineFields<libc::speed_t> {
        let cflag = control.c_cflag;
        let iflag = control.c_iflag;

        // SAFETY: cfgetospeed only reads the structure.
        let code = unsafe { libc::cfgetospeed(control) };
        let speed = if RATE_IS_CODE && TERMIOS_SPEEDS.speed_for(code).is_none() {
            LineSpeed::Rate(code as u32)
        } else {
            LineSpeed::Code(code)
        };

        let data_bits = match cflag & libc::CSIZE {
            libc::CS5 => 5,
            libc::CS6 => 6,
            libc::CS7 => 7,
            _ => 8,
        };
        let stop_bits = if cflag & libc::CSTOPB != 0 { 2 } else { 1 };

        let parity = if cflag & libc::PARENB == 0 {
            Parity::None
        } else if CMSPAR != 0 && cflag & CMSPAR != 0 {
            if cflag & libc::PARODD != 0 {
                Parity::Mark
            } else {
                Parity::Space
            }
        } else if cflag & libc::PARODD != 0 {
            Parity::Odd
        } else {
            Parity::Even
        };

        let hardware = cflag & libc::CRTSCTS != 0;
        let xon_out = iflag & libc::IXON != 0;
        let xon_in = iflag & libc::IXOFF != 0;
        let flow = match (hardware, xon_out, xon_in) {
            (false, false, false) => Flow::None,
            (true, false, false) => Flow::RtsCts,
            (false, true, true) => Flow::XonXoff,
            _ => Flow::Other,
        };

        LineFields {
            speed,
            data_bits,
            stop_bits,
            parity,
            flow,
        }
    }

    fn encode(control: &mut libc::termios, fields: &LineFields<libc::speed_t>) -> io::Result<()> {
        let code = match fields.speed {
            LineSpeed::Code(code) => code,
            LineSpeed::Rate(rate) if RATE_IS_CODE => rate as libc::speed_t,
            LineSpeed::Rate(rate) => return Err(unsupported(format_args!("{rate} baud"))),
        };
        let size = match fields.data_bits {
            5 => libc::CS5,
            6 => libc::CS6,
            7 => libc::CS7,
            8 => libc::CS8,
            other => return Err(unsupported(format_args!("{other} data bits"))),
        };
        let stop = match fields.stop_bits {
            1 => 0,
            2 => libc::CSTOPB,
            other => return Err(unsupported(format_args!("{other} stop bits"))),
        };
        let parity = match fields.parity {
            Parity::None => 0,
            Parity::Even => libc::PARENB,
            Parity::Odd => libc::PARENB | libc::PARODD,
            Parity::Mark | Parity::Space if CMSPAR == 0 => {
                return Err(unsupported(fields.parity));
            }
            Parity::Mark => libc::PARENB | CMSPAR | libc::PARODD,
            Parity::Space => libc::PARENB | CMSPAR,
        };

        // SAFETY: the cfset* functions only write the speed fields of `control`.
        check(unsafe { libc::cfsetispeed(control, code) })?;
        check(unsafe { libc::cfsetospeed(control, code) })?;

        control.c_cflag &= !(libc::CSIZE | libc::CSTOPB | libc::PARENB | libc::PARODD | CMSPAR);
        control.c_cflag |= size | stop | parity;

        match fields.flow {
            Flow::None => {
                control.c_cflag &= !libc::CRTSCTS;
                control.c_iflag &= !(libc::IXON | libc::IXOFF | libc::IXANY);
            }
            Flow::RtsCts => {
                control.c_cflag |= libc::CRTSCTS;
                control.c_iflag &= !(libc::IXON | libc::IXOFF | libc::IXANY);
            }
            Flow::XonXoff => {
                control.c_cflag &= !libc::CRTSCTS;
                control.c_iflag &= !libc::IXANY;
                control.c_iflag |= libc::IXON | libc::IXOFF;
            }
            Flow::Other => {}
        }
        Ok(())
    }

    fn accepts_raw_rates(&self) -> bool {
        RATE_IS_CODE
    }
}
