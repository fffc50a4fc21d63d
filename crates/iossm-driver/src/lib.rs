//! Driver for IOSSM-managed DDR memory subsystems.
//!
//! An SoC in this family cannot touch its DDR controllers directly: each
//! IO96B instance is managed by the IOSSM hardware sequencer, reachable
//! only through a register-mapped command mailbox. This crate owns that
//! conversation — the mailbox transport, interface enumeration, the
//! calibration check/retry state machine, full-memory BIST, and the
//! cross-interface property queries a boot flow needs before it can hand
//! memory to anything else.
//!
//! # Backend hierarchy
//!
//! ```text
//! Production:
//!   DevMem  — the real CSR window through /dev/mem (root, on the SoC)
//!
//! Development / CI:
//!   SimBus  — software model of the sequencer; the full driver sequence
//!             runs against it on any host
//! ```
//!
//! # Quick start
//!
//! ```no_run
//! use iossm_driver::prelude::*;
//!
//! # fn main() -> iossm_driver::Result<()> {
//! let bus = DevMem::map(0x1840_0000, 0x100_0000)?;
//! let mut ctrl = Io96bController::new(
//!     Box::new(bus),
//!     Box::new(SystemClock::new()),
//!     Io96bConfig::new(&[0x1840_0000]),
//! )?;
//!
//! ctrl.check_calibration()?;
//! ctrl.enumerate_interfaces()?;
//! if !ctrl.overall_cal_passed() {
//!     ctrl.retry_calibration()?;
//! }
//!
//! let ddr = ctrl.mem_technology()?;
//! let gbit = ctrl.mem_width_info()?;
//! let ecc = ctrl.ecc_enable_status()?;
//! println!("{ddr}: {gbit} Gbit, ECC {}", if ecc { "on" } else { "off" });
//! # Ok(())
//! # }
//! ```
//!
//! The driver is single-threaded and synchronous by design: one mailbox
//! command in flight at a time, every wait an explicit bounded poll
//! against an injected [`Clock`].

#![warn(missing_docs)]
#![warn(clippy::all, clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]
#![allow(clippy::must_use_candidate)]
#![allow(clippy::missing_errors_doc)]
#![allow(clippy::cast_possible_truncation)]

pub mod backends;
mod bist;
mod bus;
mod calibration;
mod clock;
mod controller;
mod discovery;
mod error;
mod mailbox;
mod query;

pub use backends::{DevMem, SimBus, SimInterface, SimReply, SimSequencer};
pub use bus::{wait_for_bit, MmioBus, POLL_INTERVAL};
pub use calibration::CALIBRATION_TIMEOUT;
pub use clock::{Clock, FakeClock, SystemClock};
pub use controller::{
    ClkgenGate, InterfaceTable, Io96bConfig, Io96bController, Io96bInstance, MemInterfaceId,
    Timeouts,
};
pub use error::{IossmError, Result};
pub use mailbox::{Mailbox, MailboxRequest, MailboxResponse, MAILBOX_TIMEOUT};

/// Commonly used types.
pub mod prelude {
    pub use crate::{
        Clock, DevMem, Io96bConfig, Io96bController, IossmError, MmioBus, Result, SimBus,
        SystemClock,
    };
}
