//! Register bus backends
//!
//! Two backends implement [`crate::MmioBus`]:
//! - **DevMem**: the real CSR window mapped through `/dev/mem` (requires
//!   root, runs on the SoC)
//! - **Sim**: a software model of the IOSSM sequencer plus a sparse
//!   register file — the whole driver runs against it on any host, and
//!   every test in this crate does

pub mod devmem;
pub mod sim;

pub use devmem::DevMem;
pub use sim::{SimBus, SimInterface, SimReply, SimSequencer};
