//! Register bus abstraction between driver logic and hardware access.
//!
//! Everything the driver does to the SoC is a 32-bit read or write at a
//! physical address; [`MmioBus`] is that seam. The real backend maps the
//! CSR window through `/dev/mem` ([`crate::backends::DevMem`]); the
//! simulated backend models the sequencer itself
//! ([`crate::backends::SimBus`]), so the whole driver runs against a
//! register file on the host.

use std::fmt::Debug;
use std::time::Duration;

use crate::clock::Clock;
use crate::error::{IossmError, Result};

/// Interval between reads in a busy-poll loop.
pub const POLL_INTERVAL: Duration = Duration::from_micros(1);

/// 32-bit register access over a memory-mapped address space.
///
/// Addresses are absolute physical addresses; backends bounds-check them
/// against the window they actually map. Implementations are not required
/// to be thread-safe — the driver is single-threaded by design.
pub trait MmioBus: Debug {
    /// Read the 32-bit register at `addr`.
    ///
    /// # Errors
    ///
    /// Returns [`IossmError::Bus`] if `addr` is outside the mapped window.
    fn read_u32(&self, addr: u64) -> Result<u32>;

    /// Write the 32-bit register at `addr`.
    ///
    /// # Errors
    ///
    /// Returns [`IossmError::Bus`] if `addr` is outside the mapped window.
    fn write_u32(&mut self, addr: u64, value: u32) -> Result<()>;

    /// Set the bits of `mask` at `addr` (read-modify-write).
    ///
    /// # Errors
    ///
    /// Propagates the underlying access error.
    fn set_bits(&mut self, addr: u64, mask: u32) -> Result<()> {
        let value = self.read_u32(addr)?;
        self.write_u32(addr, value | mask)
    }

    /// Clear the bits of `mask` at `addr` (read-modify-write).
    ///
    /// # Errors
    ///
    /// Propagates the underlying access error.
    fn clear_bits(&mut self, addr: u64, mask: u32) -> Result<()> {
        let value = self.read_u32(addr)?;
        self.write_u32(addr, value & !mask)
    }
}

/// Poll `addr` until the bits of `mask` are all set (`set`) or all clear
/// (`!set`), bounded by `timeout` on `clock`.
///
/// # Errors
///
/// Returns [`IossmError::Timeout`] naming `what` when the bound expires,
/// or the underlying bus error.
pub fn wait_for_bit(
    bus: &mut dyn MmioBus,
    clock: &dyn Clock,
    addr: u64,
    mask: u32,
    set: bool,
    timeout: Duration,
    what: &str,
) -> Result<()> {
    let deadline = clock.now() + timeout;

    loop {
        let value = bus.read_u32(addr)?;
        let masked = value & mask;
        if (set && masked == mask) || (!set && masked == 0) {
            return Ok(());
        }

        if clock.now() > deadline {
            tracing::debug!("wait for {what} expired at {addr:#x} (last value {value:#x})");
            return Err(IossmError::timeout(what, timeout));
        }

        clock.delay(POLL_INTERVAL);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backends::SimBus;
    use crate::clock::FakeClock;

    #[test]
    fn wait_succeeds_when_bit_already_set() {
        let mut bus = SimBus::new();
        bus.poke(0x100, 0x5);
        let clock = FakeClock::new();
        wait_for_bit(&mut bus, &clock, 0x100, 0x4, true, Duration::from_secs(1), "bit").unwrap();
        assert_eq!(clock.now(), Duration::ZERO);
    }

    #[test]
    fn wait_times_out_on_stuck_bit() {
        let mut bus = SimBus::new();
        bus.poke(0x100, 0);
        let clock = FakeClock::with_step(Duration::from_millis(100));
        let err = wait_for_bit(&mut bus, &clock, 0x100, 0x1, true, Duration::from_secs(1), "lock")
            .unwrap_err();
        assert!(matches!(err, IossmError::Timeout { .. }));
    }

    #[test]
    fn wait_for_clear_watches_the_whole_mask() {
        let mut bus = SimBus::new();
        bus.poke(0x100, 0x8000_0001);
        let clock = FakeClock::with_step(Duration::from_millis(100));
        // Any bit under the mask keeps the wait alive.
        let err = wait_for_bit(&mut bus, &clock, 0x100, u32::MAX, false, Duration::from_secs(1), "idle")
            .unwrap_err();
        assert!(matches!(err, IossmError::Timeout { .. }));
    }

    #[test]
    fn set_and_clear_bits_are_read_modify_write() {
        let mut bus = SimBus::new();
        bus.poke(0x40, 0x00F0);
        bus.set_bits(0x40, 0x0003).unwrap();
        assert_eq!(bus.peek(0x40), 0x00F3);
        bus.clear_bits(0x40, 0x00F0).unwrap();
        assert_eq!(bus.peek(0x40), 0x0003);
    }
}
