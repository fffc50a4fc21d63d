//! Mailbox transport: one request/response exchange with the sequencer.
//!
//! The protocol is strict and order-sensitive:
//!
//! 1. `CMD_REQ` must read back all-zero (mailbox idle) before anything is
//!    touched.
//! 2. Parameter registers are written **only for non-zero values** — zero
//!    is the wire-level "not supplied" sentinel. A legitimate parameter
//!    value of zero cannot be expressed; callers must not rely on an
//!    explicit zero write ever happening.
//! 3. The packed request word hits `CMD_REQ` exactly once; that write is
//!    the doorbell.
//! 4. The response-ready bit is polled with a bounded wait.
//! 5. The status word is read, then as many data words as the command
//!    defines (0–3), in fixed order.
//! 6. The ready bit is cleared back (acknowledgement) before returning,
//!    so the next command never sees a stale response.
//!
//! There is no retry here. Retry policy belongs to the calibration
//! orchestrator; every failure propagates immediately.

use std::time::Duration;

use iossm_chip::cmd::{self, CmdOpcode, CmdType};
use iossm_chip::regs::{self, resp_status};

use crate::bus::{wait_for_bit, MmioBus};
use crate::clock::Clock;
use crate::error::{IossmError, Result};

/// Bound on every mailbox wait (idle and response-ready).
pub const MAILBOX_TIMEOUT: Duration = Duration::from_secs(5);

/// One mailbox command, addressed or broadcast.
#[derive(Debug, Clone, Copy)]
pub struct MailboxRequest {
    /// IP type of the target interface; zero for instance-level commands.
    pub ip_type: u8,
    /// IP instance id of the target interface; zero for instance-level
    /// commands.
    pub instance_id: u8,
    /// Command type (request word bits 16–23).
    pub cmd_type: CmdType,
    /// Command opcode (request word bits 0–15).
    pub opcode: CmdOpcode,
    /// Optional parameters. Zero means "omit" on the wire.
    pub params: [u32; regs::NUM_CMD_PARAMS],
}

impl MailboxRequest {
    /// An instance-level command (no interface addressing).
    #[must_use]
    pub const fn new(cmd_type: CmdType, opcode: CmdOpcode) -> Self {
        Self {
            ip_type: 0,
            instance_id: 0,
            cmd_type,
            opcode,
            params: [0; regs::NUM_CMD_PARAMS],
        }
    }

    /// A command addressed to one memory interface.
    #[must_use]
    pub const fn to_interface(ip_type: u8, instance_id: u8, cmd_type: CmdType, opcode: CmdOpcode) -> Self {
        Self {
            ip_type,
            instance_id,
            cmd_type,
            opcode,
            params: [0; regs::NUM_CMD_PARAMS],
        }
    }

    /// Set parameter slot 0 (builder style).
    #[must_use]
    pub const fn with_param0(mut self, value: u32) -> Self {
        self.params[0] = value;
        self
    }
}

/// Decoded response: the packed status word plus extra data words.
///
/// Data words beyond what the command produced stay zero.
#[derive(Debug, Clone, Copy, Default)]
pub struct MailboxResponse {
    /// Raw `CMD_RESPONSE_STATUS` word.
    pub status: u32,
    /// `CMD_RESPONSE_DATA_0..2`.
    pub data: [u32; regs::NUM_CMD_RESPONSE_DATA],
}

impl MailboxResponse {
    /// Short response data (status word bits 16–31).
    #[must_use]
    pub const fn data_short(&self) -> u32 {
        (self.status & resp_status::DATA_SHORT_MASK) >> resp_status::DATA_SHORT_SHIFT
    }

    /// General error code (status word bits 1–4).
    #[must_use]
    pub const fn general_error(&self) -> u32 {
        (self.status & resp_status::GENERAL_ERROR_MASK) >> resp_status::GENERAL_ERROR_SHIFT
    }

    /// Command response error code (status word bits 5–7).
    #[must_use]
    pub const fn response_error(&self) -> u32 {
        (self.status & resp_status::CMD_RESPONSE_ERROR_MASK) >> resp_status::CMD_RESPONSE_ERROR_SHIFT
    }
}

/// Transport handle for one controller instance's mailbox.
///
/// Borrows the bus and clock for the duration of one or more exchanges;
/// the driver constructs one per command batch.
#[derive(Debug)]
pub struct Mailbox<'a> {
    bus: &'a mut dyn MmioBus,
    clock: &'a dyn Clock,
    csr_base: u64,
    timeout: Duration,
}

impl<'a> Mailbox<'a> {
    /// Bind a mailbox at `csr_base` with the default timeout.
    pub fn new(bus: &'a mut dyn MmioBus, clock: &'a dyn Clock, csr_base: u64) -> Self {
        Self {
            bus,
            clock,
            csr_base,
            timeout: MAILBOX_TIMEOUT,
        }
    }

    /// Override the mailbox wait bound.
    #[must_use]
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Execute one command and collect `resp_data_len` extra data words.
    ///
    /// # Errors
    ///
    /// - [`IossmError::InvalidParameter`] — `resp_data_len` outside 0–3 or
    ///   an addressing field wider than its bit-field (both caught before
    ///   any register traffic)
    /// - [`IossmError::NotReady`] — mailbox busy past the timeout
    /// - [`IossmError::Timeout`] — no response-ready within the timeout
    /// - [`IossmError::Bus`] — backend access failure
    pub fn send(&mut self, req: &MailboxRequest, resp_data_len: usize) -> Result<MailboxResponse> {
        if resp_data_len > regs::NUM_CMD_RESPONSE_DATA {
            return Err(IossmError::invalid_parameter(format!(
                "resp_data_len {resp_data_len} exceeds {}",
                regs::NUM_CMD_RESPONSE_DATA
            )));
        }
        if u32::from(req.ip_type) > cmd::IP_TYPE_MAX {
            return Err(IossmError::invalid_parameter(format!(
                "ip_type {:#x} wider than 3 bits",
                req.ip_type
            )));
        }
        if u32::from(req.instance_id) > cmd::INSTANCE_ID_MAX {
            return Err(IossmError::invalid_parameter(format!(
                "instance_id {:#x} wider than 5 bits",
                req.instance_id
            )));
        }

        let base = self.csr_base;

        // Mailbox must be idle before a new request is staged.
        match wait_for_bit(
            self.bus,
            self.clock,
            base + regs::CMD_REQ,
            u32::MAX,
            false,
            self.timeout,
            "mailbox idle",
        ) {
            Ok(()) => {}
            Err(IossmError::Timeout { .. }) => {
                tracing::warn!("mailbox at {base:#x} busy past timeout");
                return Err(IossmError::NotReady { csr_base: base });
            }
            Err(e) => return Err(e),
        }

        // Stage parameters. Zero-valued slots are omitted on the wire.
        for (slot, &value) in req.params.iter().enumerate() {
            if value != 0 {
                self.bus.write_u32(base + regs::CMD_PARAM[slot], value)?;
            }
        }

        // Doorbell.
        let word = cmd::encode_request(
            u32::from(req.ip_type),
            u32::from(req.instance_id),
            req.cmd_type,
            req.opcode,
        );
        tracing::debug!(
            "{:?}/{:?} -> {base:#x} (req word {word:#010x})",
            req.cmd_type,
            req.opcode,
        );
        self.bus.write_u32(base + regs::CMD_REQ, word)?;

        // Wait for the sequencer to answer.
        if let Err(e) = wait_for_bit(
            self.bus,
            self.clock,
            base + regs::CMD_RESPONSE_STATUS,
            resp_status::RESPONSE_READY,
            true,
            self.timeout,
            "command response",
        ) {
            if matches!(e, IossmError::Timeout { .. }) {
                // Decode the error fields for diagnostics only.
                let stale = MailboxResponse {
                    status: self.bus.read_u32(base + regs::CMD_RESPONSE_STATUS)?,
                    data: [0; regs::NUM_CMD_RESPONSE_DATA],
                };
                tracing::error!(
                    "no response from {base:#x}: general_error={:#x} response_error={:#x}",
                    stale.general_error(),
                    stale.response_error(),
                );
            }
            return Err(e);
        }

        let mut resp = MailboxResponse {
            status: self.bus.read_u32(base + regs::CMD_RESPONSE_STATUS)?,
            data: [0; regs::NUM_CMD_RESPONSE_DATA],
        };
        for i in 0..resp_data_len {
            resp.data[i] = self.bus.read_u32(base + regs::CMD_RESPONSE_DATA[i])?;
        }
        tracing::trace!(
            "response status {:#010x} data {:x?}",
            resp.status,
            &resp.data[..resp_data_len]
        );

        // Acknowledge: clear the ready bit so the next command never sees
        // this response.
        self.bus
            .clear_bits(base + regs::CMD_RESPONSE_STATUS, resp_status::RESPONSE_READY)?;

        Ok(resp)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backends::{SimBus, SimInterface, SimReply, SimSequencer};
    use crate::clock::FakeClock;

    const BASE: u64 = 0x1840_0000;

    fn sim_with_default_sequencer() -> SimBus {
        let bus = SimBus::new();
        let mut seq = SimSequencer::new(BASE);
        seq.add_interface(SimInterface::default());
        bus.install(seq);
        bus
    }

    #[test]
    fn zero_parameters_are_never_written() {
        let bus = sim_with_default_sequencer();
        let clock = FakeClock::new();
        let mut driver_bus = bus.clone();

        let req = MailboxRequest::new(CmdType::GetSysInfo, CmdOpcode::GetMemIntfInfo)
            .with_param0(0x40);
        Mailbox::new(&mut driver_bus, &clock, BASE).send(&req, 2).unwrap();

        assert_eq!(bus.writes_to(BASE + regs::CMD_PARAM[0]), 1);
        for slot in 1..regs::NUM_CMD_PARAMS {
            assert_eq!(bus.writes_to(BASE + regs::CMD_PARAM[slot]), 0, "slot {slot}");
        }
    }

    #[test]
    fn all_zero_parameter_request_touches_no_param_register() {
        let bus = sim_with_default_sequencer();
        let clock = FakeClock::new();
        let mut driver_bus = bus.clone();

        let req = MailboxRequest::new(CmdType::GetSysInfo, CmdOpcode::GetMemIntfInfo);
        Mailbox::new(&mut driver_bus, &clock, BASE).send(&req, 2).unwrap();

        for slot in 0..regs::NUM_CMD_PARAMS {
            assert_eq!(bus.writes_to(BASE + regs::CMD_PARAM[slot]), 0, "slot {slot}");
        }
    }

    #[test]
    fn exactly_one_doorbell_write_per_send() {
        let bus = sim_with_default_sequencer();
        let clock = FakeClock::new();
        let mut driver_bus = bus.clone();

        let req = MailboxRequest::new(CmdType::GetSysInfo, CmdOpcode::GetMemIntfInfo);
        Mailbox::new(&mut driver_bus, &clock, BASE).send(&req, 2).unwrap();

        assert_eq!(bus.writes_to(BASE + regs::CMD_REQ), 1);
    }

    #[test]
    fn ready_bit_is_cleared_before_returning() {
        let bus = sim_with_default_sequencer();
        let clock = FakeClock::new();
        let mut driver_bus = bus.clone();

        let req = MailboxRequest::new(CmdType::GetSysInfo, CmdOpcode::GetMemIntfInfo);
        Mailbox::new(&mut driver_bus, &clock, BASE).send(&req, 2).unwrap();

        let status = bus.peek(BASE + regs::CMD_RESPONSE_STATUS);
        assert_eq!(status & resp_status::RESPONSE_READY, 0);
        // The rest of the status word survives the acknowledge.
        assert_eq!(status >> resp_status::DATA_SHORT_SHIFT, 1);
    }

    #[test]
    fn busy_mailbox_reports_not_ready() {
        let bus = sim_with_default_sequencer();
        bus.poke(BASE + regs::CMD_REQ, 0xDEAD_BEEF);
        let clock = FakeClock::with_step(Duration::from_millis(50));
        let mut driver_bus = bus.clone();

        let req = MailboxRequest::new(CmdType::GetSysInfo, CmdOpcode::GetMemIntfInfo);
        let err = Mailbox::new(&mut driver_bus, &clock, BASE).send(&req, 2).unwrap_err();

        assert!(matches!(err, IossmError::NotReady { csr_base } if csr_base == BASE));
        // Never rang the doorbell on a busy mailbox.
        assert_eq!(bus.writes_to(BASE + regs::CMD_REQ), 0);
    }

    #[test]
    fn unanswered_command_times_out() {
        let bus = SimBus::new();
        let mut seq = SimSequencer::new(BASE);
        seq.set_responding(false);
        bus.install(seq);
        let clock = FakeClock::with_step(Duration::from_millis(50));
        let mut driver_bus = bus.clone();

        let req = MailboxRequest::new(CmdType::GetSysInfo, CmdOpcode::GetMemIntfInfo);
        let err = Mailbox::new(&mut driver_bus, &clock, BASE).send(&req, 2).unwrap_err();

        assert!(matches!(err, IossmError::Timeout { .. }));
    }

    #[test]
    fn oversized_data_length_is_rejected_before_any_traffic() {
        let bus = sim_with_default_sequencer();
        let clock = FakeClock::new();
        let mut driver_bus = bus.clone();

        let req = MailboxRequest::new(CmdType::GetSysInfo, CmdOpcode::GetMemIntfInfo);
        let err = Mailbox::new(&mut driver_bus, &clock, BASE).send(&req, 4).unwrap_err();

        assert!(matches!(err, IossmError::InvalidParameter { .. }));
        assert!(bus.writes().is_empty());
    }

    #[test]
    fn oversized_addressing_fields_are_rejected() {
        let bus = sim_with_default_sequencer();
        let clock = FakeClock::new();
        let mut driver_bus = bus.clone();

        let req = MailboxRequest::to_interface(0x8, 0, CmdType::GetMemInfo, CmdOpcode::GetMemTechnology);
        let err = Mailbox::new(&mut driver_bus, &clock, BASE).send(&req, 0).unwrap_err();
        assert!(matches!(err, IossmError::InvalidParameter { .. }));

        let req = MailboxRequest::to_interface(1, 0x20, CmdType::GetMemInfo, CmdOpcode::GetMemTechnology);
        let err = Mailbox::new(&mut driver_bus, &clock, BASE).send(&req, 0).unwrap_err();
        assert!(matches!(err, IossmError::InvalidParameter { .. }));
    }

    #[test]
    fn scripted_error_fields_decode() {
        let bus = SimBus::new();
        let mut seq = SimSequencer::new(BASE);
        seq.push_override(
            CmdType::GetMemInfo,
            CmdOpcode::GetMemTechnology,
            SimReply { general_error: 0x3, response_error: 0x5, ..SimReply::default() },
        );
        bus.install(seq);
        let clock = FakeClock::new();
        let mut driver_bus = bus.clone();

        let req = MailboxRequest::new(CmdType::GetMemInfo, CmdOpcode::GetMemTechnology);
        let resp = Mailbox::new(&mut driver_bus, &clock, BASE).send(&req, 0).unwrap();

        assert_eq!(resp.general_error(), 0x3);
        assert_eq!(resp.response_error(), 0x5);
    }
}
