//! Port abstraction layer for serial communication.
//!
//! Provides the [`Port`] session on top of the [`Backend`] trait, the line
//! configuration model, deadlines, and one backend per platform plus an
//! in-memory backend for tests.

pub mod conf;
pub mod deadline;
pub mod portable;
pub mod session;
pub mod speed;
pub mod traits;
pub mod virtual_port;

#[cfg(unix)]
pub mod unix;

pub use conf::{Conf, ConfFlags, Flow, Parity};
pub use deadline::{DeadlineController, DeadlineState, Direction};
pub use portable::PortableBackend;
pub use session::{Port, PortOptions, DEFAULT_WAKE_INTERVAL};
pub use speed::SpeedTable;
pub use traits::{Backend, FlushSelector, LineFields, LineSpeed};
pub use virtual_port::{VirtualBackend, VirtualControl, VirtualDevice, VirtualPort};

#[cfg(unix)]
pub use unix::TermiosBackend;

/// The backend used by [`Port::open`] on this platform.
#[cfg(unix)]
pub type SystemBackend = unix::TermiosBackend;

/// The backend used by [`Port::open`] on this platform.
#[cfg(not(unix))]
pub type SystemBackend = portable::PortableBackend;
