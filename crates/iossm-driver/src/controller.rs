//! Controller-set data model and driver facade.
//!
//! One [`Io96bController`] owns the register bus, the clock and the state
//! of every IO96B instance handed over by the boot flow. The orchestration
//! methods live with their subjects: interface enumeration in
//! `discovery`, calibration in `calibration`, BIST in `bist`, property
//! queries in `query`.

use std::time::Duration;

use iossm_chip::mem::{self, DdrType, MAX_IO96B_INSTANCES, MAX_MEM_INTERFACES};

use crate::bus::MmioBus;
use crate::clock::Clock;
use crate::error::{IossmError, Result};
use crate::mailbox::{Mailbox, MailboxRequest, MailboxResponse, MAILBOX_TIMEOUT};

/// Identifier pair a memory interface answers to on the mailbox.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct MemInterfaceId {
    /// IP type (3-bit field in the request word).
    pub ip_type: u8,
    /// IP instance id (5-bit field in the request word).
    pub instance_id: u8,
}

/// Fixed-capacity table of the interfaces behind one instance.
///
/// The capacity is the protocol ceiling, not a guess; overflowing it means
/// the sequencer reported something the wire format cannot carry.
#[derive(Debug, Clone, Default)]
pub struct InterfaceTable {
    entries: [MemInterfaceId; MAX_MEM_INTERFACES],
    count: usize,
}

impl InterfaceTable {
    /// Record one interface.
    ///
    /// # Errors
    ///
    /// Returns [`IossmError::InvalidResponse`] when the table is full.
    pub fn push(&mut self, id: MemInterfaceId) -> Result<()> {
        if self.count == MAX_MEM_INTERFACES {
            return Err(IossmError::invalid_response(format!(
                "more than {MAX_MEM_INTERFACES} memory interfaces reported"
            )));
        }
        self.entries[self.count] = id;
        self.count += 1;
        Ok(())
    }

    /// Number of recorded interfaces.
    #[must_use]
    pub const fn len(&self) -> usize {
        self.count
    }

    /// True when nothing has been recorded.
    #[must_use]
    pub const fn is_empty(&self) -> bool {
        self.count == 0
    }

    /// Interface at `index`, if recorded.
    #[must_use]
    pub fn get(&self, index: usize) -> Option<MemInterfaceId> {
        self.entries[..self.count].get(index).copied()
    }

    /// Iterate over the recorded interfaces.
    pub fn iter(&self) -> impl Iterator<Item = MemInterfaceId> + '_ {
        self.entries[..self.count].iter().copied()
    }
}

/// One IO96B controller instance.
#[derive(Debug, Clone)]
pub struct Io96bInstance {
    pub(crate) csr_base: u64,
    pub(crate) cal_passed: bool,
    pub(crate) interfaces: InterfaceTable,
    pub(crate) mem_size_gbit: u32,
}

impl Io96bInstance {
    fn new(csr_base: u64) -> Self {
        Self {
            csr_base,
            cal_passed: false,
            interfaces: InterfaceTable::default(),
            mem_size_gbit: 0,
        }
    }

    /// CSR base address.
    #[must_use]
    pub const fn csr_base(&self) -> u64 {
        self.csr_base
    }

    /// Whether calibration has passed on every interface.
    #[must_use]
    pub const fn cal_passed(&self) -> bool {
        self.cal_passed
    }

    /// Enumerated memory interfaces.
    #[must_use]
    pub const fn interfaces(&self) -> &InterfaceTable {
        &self.interfaces
    }

    /// Memory size behind this instance in Gbit (0 until queried).
    #[must_use]
    pub const fn mem_size_gbit(&self) -> u32 {
        self.mem_size_gbit
    }
}

/// Clkgen-lock gate configuration: which PLL channels must report locked
/// before the initial calibration check may run.
#[derive(Debug, Clone, Copy)]
pub struct ClkgenGate {
    /// System-manager base address holding the lock status registers.
    pub sysmgr_base: u64,
    /// Channel-select mask ([`iossm_chip::regs::clkgen`] PLL masks).
    pub channels: u8,
}

/// Bounds for the three kinds of waits the driver performs.
#[derive(Debug, Clone, Copy)]
pub struct Timeouts {
    /// Mailbox idle / response-ready waits.
    pub mailbox: Duration,
    /// Initial calibration result wait (hardware takes tens of seconds).
    pub calibration: Duration,
    /// BIST completion polling.
    pub bist: Duration,
}

impl Default for Timeouts {
    fn default() -> Self {
        Self {
            mailbox: MAILBOX_TIMEOUT,
            calibration: crate::calibration::CALIBRATION_TIMEOUT,
            bist: MAILBOX_TIMEOUT,
        }
    }
}

/// Boot-flow handoff: where the instances live and what gates them.
#[derive(Debug, Clone)]
pub struct Io96bConfig {
    /// CSR base address per instance, in instance order.
    pub csr_bases: Vec<u64>,
    /// Optional clkgen-lock precondition.
    pub clkgen_gate: Option<ClkgenGate>,
    /// Wait bounds.
    pub timeouts: Timeouts,
}

impl Io96bConfig {
    /// Configuration with default timeouts and no clkgen gate.
    #[must_use]
    pub fn new(csr_bases: &[u64]) -> Self {
        Self {
            csr_bases: csr_bases.to_vec(),
            clkgen_gate: None,
            timeouts: Timeouts::default(),
        }
    }
}

/// The controller set: every IO96B instance plus the aggregates the boot
/// flow consumes.
///
/// Single-threaded by design — one mailbox command is in flight at a time
/// and nothing else mutates the set.
#[derive(Debug)]
pub struct Io96bController {
    pub(crate) bus: Box<dyn MmioBus>,
    pub(crate) clock: Box<dyn Clock>,
    pub(crate) instances: Vec<Io96bInstance>,
    pub(crate) clkgen_gate: Option<ClkgenGate>,
    pub(crate) timeouts: Timeouts,
    pub(crate) overall_cal_passed: bool,
    pub(crate) ddr_type: Option<DdrType>,
    pub(crate) ecc_enabled: Option<bool>,
    pub(crate) total_mem_gbit: u32,
}

impl Io96bController {
    /// Build the controller set from handoff data.
    ///
    /// # Errors
    ///
    /// Returns [`IossmError::InvalidParameter`] when the instance count is
    /// zero or exceeds what the SoC family supports.
    pub fn new(bus: Box<dyn MmioBus>, clock: Box<dyn Clock>, config: Io96bConfig) -> Result<Self> {
        if config.csr_bases.is_empty() {
            return Err(IossmError::invalid_parameter("no controller instances"));
        }
        if config.csr_bases.len() > MAX_IO96B_INSTANCES {
            return Err(IossmError::invalid_parameter(format!(
                "{} instances exceeds the supported {MAX_IO96B_INSTANCES}",
                config.csr_bases.len()
            )));
        }

        tracing::debug!("controller set with {} instance(s)", config.csr_bases.len());

        Ok(Self {
            bus,
            clock,
            instances: config.csr_bases.iter().map(|&b| Io96bInstance::new(b)).collect(),
            clkgen_gate: config.clkgen_gate,
            timeouts: config.timeouts,
            overall_cal_passed: false,
            ddr_type: None,
            ecc_enabled: None,
            total_mem_gbit: 0,
        })
    }

    /// Number of instances in the set.
    #[must_use]
    pub fn num_instances(&self) -> usize {
        self.instances.len()
    }

    /// All instances, in handoff order.
    #[must_use]
    pub fn instances(&self) -> &[Io96bInstance] {
        &self.instances
    }

    /// Instance at `index`.
    #[must_use]
    pub fn instance(&self, index: usize) -> Option<&Io96bInstance> {
        self.instances.get(index)
    }

    /// AND of every instance's calibration flag.
    #[must_use]
    pub const fn overall_cal_passed(&self) -> bool {
        self.overall_cal_passed
    }

    /// Memory technology agreed on by all interfaces (`None` until
    /// queried).
    #[must_use]
    pub const fn ddr_type(&self) -> Option<DdrType> {
        self.ddr_type
    }

    /// ECC mode agreed on by all interfaces (`None` until queried).
    #[must_use]
    pub const fn ecc_enabled(&self) -> Option<bool> {
        self.ecc_enabled
    }

    /// Total memory behind the set in Gbit (0 until queried).
    #[must_use]
    pub const fn total_mem_gbit(&self) -> u32 {
        self.total_mem_gbit
    }

    /// Total memory behind the set in bytes.
    #[must_use]
    pub const fn total_mem_bytes(&self) -> u64 {
        mem::gbit_to_bytes(self.total_mem_gbit as u64)
    }

    /// One mailbox exchange with instance `index`.
    pub(crate) fn send_to(
        &mut self,
        index: usize,
        req: &MailboxRequest,
        resp_data_len: usize,
    ) -> Result<MailboxResponse> {
        let base = self.instances[index].csr_base;
        Mailbox::new(&mut *self.bus, &*self.clock, base)
            .with_timeout(self.timeouts.mailbox)
            .send(req, resp_data_len)
    }

    /// Re-derive the overall flag from scratch. The aggregate is never
    /// updated incrementally — a later failure must not be masked by an
    /// earlier pass.
    pub(crate) fn recompute_overall(&mut self) {
        self.overall_cal_passed = self.instances.iter().all(Io96bInstance::cal_passed);
    }

    /// Mark every instance uncalibrated, forcing a full re-calibration
    /// pass. The boot flow uses this after a double-bit ECC error.
    pub fn invalidate_calibration(&mut self) {
        for instance in &mut self.instances {
            instance.cal_passed = false;
        }
        self.recompute_overall();
        tracing::info!("calibration state invalidated on all instances");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backends::SimBus;
    use crate::clock::FakeClock;

    fn controller(bases: &[u64]) -> Result<Io96bController> {
        Io96bController::new(
            Box::new(SimBus::new()),
            Box::new(FakeClock::new()),
            Io96bConfig::new(bases),
        )
    }

    #[test]
    fn rejects_empty_and_oversized_instance_lists() {
        assert!(matches!(
            controller(&[]).unwrap_err(),
            IossmError::InvalidParameter { .. }
        ));
        assert!(matches!(
            controller(&[0x1000, 0x2000, 0x3000]).unwrap_err(),
            IossmError::InvalidParameter { .. }
        ));
    }

    #[test]
    fn interface_table_is_capacity_checked() {
        let mut table = InterfaceTable::default();
        for i in 0..MAX_MEM_INTERFACES {
            table.push(MemInterfaceId { ip_type: 1, instance_id: i as u8 }).unwrap();
        }
        let err = table.push(MemInterfaceId { ip_type: 1, instance_id: 9 }).unwrap_err();
        assert!(matches!(err, IossmError::InvalidResponse { .. }));
        assert_eq!(table.len(), MAX_MEM_INTERFACES);
    }

    #[test]
    fn overall_flag_is_recomputed_not_accumulated() {
        let mut ctrl = controller(&[0x1000, 0x2000]).unwrap();
        ctrl.instances[0].cal_passed = true;
        ctrl.instances[1].cal_passed = true;
        ctrl.recompute_overall();
        assert!(ctrl.overall_cal_passed());

        // A later failure must drop the aggregate.
        ctrl.instances[1].cal_passed = false;
        ctrl.recompute_overall();
        assert!(!ctrl.overall_cal_passed());
    }

    #[test]
    fn invalidate_clears_every_instance() {
        let mut ctrl = controller(&[0x1000, 0x2000]).unwrap();
        ctrl.instances[0].cal_passed = true;
        ctrl.instances[1].cal_passed = true;
        ctrl.recompute_overall();

        ctrl.invalidate_calibration();
        assert!(!ctrl.overall_cal_passed());
        assert!(ctrl.instances().iter().all(|i| !i.cal_passed()));
    }

    #[test]
    fn total_size_converts_gbit_to_bytes() {
        let mut ctrl = controller(&[0x1000]).unwrap();
        ctrl.total_mem_gbit = 16;
        assert_eq!(ctrl.total_mem_bytes(), 2 * (1 << 30));
    }
}
