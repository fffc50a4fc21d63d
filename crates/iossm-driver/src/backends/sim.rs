// SPDX-License-Identifier: AGPL-3.0-only

//! Software model of the IOSSM sequencer.
//!
//! Implements [`MmioBus`] over a sparse register file plus a behavioral
//! model of the mailbox: a write to a sequencer's `CMD_REQ` register is
//! decoded like the silicon would, the request word is consumed, and the
//! response registers are filled in before the write call returns. This
//! enables:
//!
//! 1. **CI without hardware**: the full enumeration → calibration → query
//!    sequence runs against `SimBus` on any host.
//!
//! 2. **Protocol assertions**: every host-side write is logged, so a test
//!    can check that zero-valued parameters are never written and that the
//!    doorbell fires exactly once per command.
//!
//! 3. **Fault injection**: a sequencer can be configured to stop
//!    responding (timeout paths), reply with error fields, or require a
//!    number of re-calibration triggers before an interface recovers.
//!
//! `SimBus` is a cheap handle onto shared state: clone one before boxing
//! it into the driver and the clone sees everything the driver did.

use std::cell::RefCell;
use std::collections::{HashMap, VecDeque};
use std::rc::Rc;

use iossm_chip::cmd::{CmdOpcode, CmdType};
use iossm_chip::regs;

use crate::bus::MmioBus;
use crate::error::Result;

/// One scripted mailbox reply.
#[derive(Debug, Clone)]
pub struct SimReply {
    /// Short response data (status word bits 16–31).
    pub short: u16,
    /// Extra response data words.
    pub data: [u32; regs::NUM_CMD_RESPONSE_DATA],
    /// General error code (status word bits 1–4).
    pub general_error: u8,
    /// Command response error code (status word bits 5–7).
    pub response_error: u8,
    /// When false the request is consumed but the ready bit never sets.
    pub respond: bool,
}

impl Default for SimReply {
    fn default() -> Self {
        Self {
            short: 0,
            data: [0; regs::NUM_CMD_RESPONSE_DATA],
            general_error: 0,
            response_error: 0,
            respond: true,
        }
    }
}

/// One simulated memory interface behind a sequencer.
#[derive(Debug, Clone)]
pub struct SimInterface {
    /// IP type reported by `GET_MEM_INTF_INFO` (non-zero = present).
    pub ip_type: u8,
    /// IP instance id.
    pub instance_id: u8,
    /// Memory size in Gbit reported by `GET_MEM_WIDTH_INFO`.
    pub size_gbit: u32,
    /// CSR offset of the live calibration status register, as returned by
    /// `GET_MEM_CAL_STATUS`.
    pub cal_status_offset: u32,
    /// `TRIG_MEM_CAL` commands required before the live status register
    /// reports success. Zero means already calibrated; `u32::MAX` means
    /// the interface never recovers.
    pub recover_after_triggers: u32,
}

impl Default for SimInterface {
    fn default() -> Self {
        Self {
            ip_type: 1,
            instance_id: 0,
            size_gbit: 8,
            cal_status_offset: 0x500,
            recover_after_triggers: 0,
        }
    }
}

/// Behavioral model of one IOSSM sequencer instance.
#[derive(Debug)]
pub struct SimSequencer {
    base: u64,
    interfaces: Vec<SimInterface>,
    ddr_type_code: u32,
    ecc_enabled: bool,
    responding: bool,
    bist_accepts: bool,
    bist_error_code: u32,
    bist_polls_until_done: u32,
    bist_polls_seen: u32,
    trigger_counts: Vec<u32>,
    overrides: HashMap<(u8, u16), VecDeque<SimReply>>,
}

impl SimSequencer {
    /// Create a sequencer at `base` with no interfaces, reporting DDR5
    /// with ECC off.
    #[must_use]
    pub fn new(base: u64) -> Self {
        Self {
            base,
            interfaces: Vec::new(),
            ddr_type_code: iossm_chip::mem::DdrType::Ddr5 as u32,
            ecc_enabled: false,
            responding: true,
            bist_accepts: true,
            bist_error_code: 0,
            bist_polls_until_done: 0,
            bist_polls_seen: 0,
            trigger_counts: Vec::new(),
            overrides: HashMap::new(),
        }
    }

    /// CSR base address.
    #[must_use]
    pub const fn base(&self) -> u64 {
        self.base
    }

    /// Add a memory interface.
    pub fn add_interface(&mut self, intf: SimInterface) -> &mut Self {
        self.interfaces.push(intf);
        self.trigger_counts.push(0);
        self
    }

    /// Set the reported memory technology code.
    pub fn set_ddr_type(&mut self, code: u32) -> &mut Self {
        self.ddr_type_code = code;
        self
    }

    /// Set the reported ECC enable status.
    pub fn set_ecc_enabled(&mut self, enabled: bool) -> &mut Self {
        self.ecc_enabled = enabled;
        self
    }

    /// When false, requests are consumed but never answered.
    pub fn set_responding(&mut self, responding: bool) -> &mut Self {
        self.responding = responding;
        self
    }

    /// Configure the BIST model: whether `BIST_MEM_INIT_START` is
    /// accepted, the rejection sub-code, and how many status polls pass
    /// before completion is reported.
    pub fn set_bist(&mut self, accepts: bool, error_code: u32, polls_until_done: u32) -> &mut Self {
        self.bist_accepts = accepts;
        self.bist_error_code = error_code;
        self.bist_polls_until_done = polls_until_done;
        self
    }

    /// Queue a scripted reply for one command, consulted before the
    /// built-in behavior. Queued replies are consumed in order.
    pub fn push_override(&mut self, cmd_type: CmdType, opcode: CmdOpcode, reply: SimReply) -> &mut Self {
        self.overrides
            .entry((cmd_type as u8, opcode as u16))
            .or_default()
            .push_back(reply);
        self
    }

    fn interface_index(&self, instance_id: u8) -> Option<usize> {
        self.interfaces.iter().position(|i| i.instance_id == instance_id)
    }

    /// Built-in reply synthesis from the configured state. Register side
    /// effects (calibration recovery) are applied by the caller.
    fn builtin_reply(&mut self, cmd_type: u8, opcode: u16, instance_id: u8) -> SimReply {
        let mut reply = SimReply::default();

        match (cmd_type, opcode) {
            (t, o) if t == CmdType::GetSysInfo as u8 && o == CmdOpcode::GetMemIntfInfo as u16 => {
                let count = self.interfaces.len().min(regs::NUM_CMD_RESPONSE_DATA);
                reply.short = count as u16;
                for (k, intf) in self.interfaces.iter().take(count).enumerate() {
                    reply.data[k] =
                        (u32::from(intf.ip_type) << 29) | (u32::from(intf.instance_id) << 24);
                }
            }
            (t, o) if t == CmdType::GetMemInfo as u8 && o == CmdOpcode::GetMemTechnology as u16 => {
                reply.short = self.ddr_type_code as u16;
            }
            (t, o) if t == CmdType::GetMemInfo as u8 && o == CmdOpcode::GetMemWidthInfo as u16 => {
                if let Some(idx) = self.interface_index(instance_id) {
                    reply.data[1] = self.interfaces[idx].size_gbit;
                }
            }
            (t, o) if t == CmdType::TrigControllerOp as u8 && o == CmdOpcode::EccEnableStatus as u16 => {
                reply.short = u16::from(self.ecc_enabled);
            }
            (t, o) if t == CmdType::TrigMemCalOp as u8 && o == CmdOpcode::GetMemCalStatus as u16 => {
                for (j, intf) in self
                    .interfaces
                    .iter()
                    .take(regs::NUM_CMD_RESPONSE_DATA)
                    .enumerate()
                {
                    reply.data[j] = intf.cal_status_offset;
                }
            }
            (t, o) if t == CmdType::TrigMemCalOp as u8 && o == CmdOpcode::TrigMemCal as u16 => {
                reply.short = 1; // trigger accepted
            }
            (t, o) if t == CmdType::TrigControllerOp as u8 && o == CmdOpcode::BistMemInitStart as u16 => {
                self.bist_polls_seen = 0;
                reply.short = if self.bist_accepts {
                    1
                } else {
                    ((self.bist_error_code & 0x3) << 1) as u16
                };
            }
            (t, o) if t == CmdType::TrigControllerOp as u8 && o == CmdOpcode::BistMemInitStatus as u16 => {
                self.bist_polls_seen += 1;
                reply.short = u16::from(self.bist_polls_seen > self.bist_polls_until_done);
            }
            _ => {
                // Command the model does not know: flag a general error.
                reply.general_error = 0x1;
            }
        }

        reply
    }
}

#[derive(Debug, Default)]
struct Inner {
    regs: HashMap<u64, u32>,
    write_log: Vec<(u64, u32)>,
    sequencers: Vec<SimSequencer>,
}

impl Inner {
    fn peek(&self, addr: u64) -> u32 {
        self.regs.get(&addr).copied().unwrap_or(0)
    }

    fn handle_doorbell(&mut self, seq_idx: usize, word: u32) {
        let opcode = (word & 0xFFFF) as u16;
        let cmd_type = ((word >> 16) & 0xFF) as u8;
        let instance_id = ((word >> 24) & 0x1F) as u8;
        let base = self.sequencers[seq_idx].base;

        // The sequencer consumes the request word.
        self.regs.insert(base + regs::CMD_REQ, 0);

        if !self.sequencers[seq_idx].responding {
            return;
        }

        let scripted = self.sequencers[seq_idx]
            .overrides
            .get_mut(&(cmd_type, opcode))
            .and_then(VecDeque::pop_front);
        let reply = match scripted {
            Some(reply) => reply,
            None => self.sequencers[seq_idx].builtin_reply(cmd_type, opcode, instance_id),
        };

        // Calibration recovery side effect: enough triggers flip the live
        // status register of the addressed interface to success.
        if cmd_type == CmdType::TrigMemCalOp as u8 && opcode == CmdOpcode::TrigMemCal as u16 {
            let seq = &mut self.sequencers[seq_idx];
            if let Some(idx) = seq.interface_index(instance_id) {
                seq.trigger_counts[idx] += 1;
                if seq.trigger_counts[idx] >= seq.interfaces[idx].recover_after_triggers {
                    let offset = u64::from(seq.interfaces[idx].cal_status_offset);
                    self.regs.insert(base + offset, regs::INTF_CAL_STATUS_SUCCESS);
                }
            }
        }

        if !reply.respond {
            return;
        }

        for (i, &word) in reply.data.iter().enumerate() {
            self.regs.insert(base + regs::CMD_RESPONSE_DATA[i], word);
        }
        let status = regs::resp_status::RESPONSE_READY
            | ((u32::from(reply.general_error) << regs::resp_status::GENERAL_ERROR_SHIFT)
                & regs::resp_status::GENERAL_ERROR_MASK)
            | ((u32::from(reply.response_error) << regs::resp_status::CMD_RESPONSE_ERROR_SHIFT)
                & regs::resp_status::CMD_RESPONSE_ERROR_MASK)
            | (u32::from(reply.short) << regs::resp_status::DATA_SHORT_SHIFT);
        self.regs.insert(base + regs::CMD_RESPONSE_STATUS, status);
    }
}

/// Simulated register bus. Cloning shares the underlying state.
#[derive(Debug, Clone, Default)]
pub struct SimBus {
    inner: Rc<RefCell<Inner>>,
}

impl SimBus {
    /// Create an empty register file with no sequencers.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Install a configured sequencer. Interfaces that start calibrated
    /// (`recover_after_triggers == 0`) get their live status register
    /// preset to the success code.
    pub fn install(&self, seq: SimSequencer) {
        let mut inner = self.inner.borrow_mut();
        for intf in &seq.interfaces {
            if intf.recover_after_triggers == 0 {
                inner
                    .regs
                    .insert(seq.base + u64::from(intf.cal_status_offset), regs::INTF_CAL_STATUS_SUCCESS);
            }
        }
        inner.sequencers.push(seq);
    }

    /// Set a register directly, bypassing the doorbell model and the
    /// write log. For test setup (calibration status bits, lock flags).
    pub fn poke(&self, addr: u64, value: u32) {
        self.inner.borrow_mut().regs.insert(addr, value);
    }

    /// Read a register without going through [`MmioBus`].
    #[must_use]
    pub fn peek(&self, addr: u64) -> u32 {
        self.inner.borrow().peek(addr)
    }

    /// Every host-side write so far, in order.
    #[must_use]
    pub fn writes(&self) -> Vec<(u64, u32)> {
        self.inner.borrow().write_log.clone()
    }

    /// Number of host-side writes that hit `addr`.
    #[must_use]
    pub fn writes_to(&self, addr: u64) -> usize {
        self.inner
            .borrow()
            .write_log
            .iter()
            .filter(|(a, _)| *a == addr)
            .count()
    }

    /// Number of `TRIG_MEM_CAL` doorbell words written to the sequencer
    /// at `base`.
    #[must_use]
    pub fn trigger_commands(&self, base: u64) -> usize {
        self.inner
            .borrow()
            .write_log
            .iter()
            .filter(|&&(a, v)| {
                a == base + regs::CMD_REQ
                    && (v & 0xFFFF) as u16 == CmdOpcode::TrigMemCal as u16
                    && ((v >> 16) & 0xFF) as u8 == CmdType::TrigMemCalOp as u8
            })
            .count()
    }
}

impl MmioBus for SimBus {
    fn read_u32(&self, addr: u64) -> Result<u32> {
        Ok(self.inner.borrow().peek(addr))
    }

    fn write_u32(&mut self, addr: u64, value: u32) -> Result<()> {
        let mut inner = self.inner.borrow_mut();
        inner.write_log.push((addr, value));
        inner.regs.insert(addr, value);

        if value != 0 {
            if let Some(idx) = inner
                .sequencers
                .iter()
                .position(|s| s.base + regs::CMD_REQ == addr)
            {
                inner.handle_doorbell(idx, value);
            }
        }
        Ok(())
    }
}
