//! Calibration orchestration: clkgen gate, initial check, bounded retry.
//!
//! Calibration is reported at two levels. The instance-level `STATUS`
//! register answers the initial pass/fail question; the per-interface live
//! status register — whose offset is only learned from a
//! `GET_MEM_CAL_STATUS` response — drives the retry loop. An instance is
//! considered passed only once every one of its interfaces is, and the
//! set-wide flag is re-derived from all instances after every round.

use std::time::Duration;

use iossm_chip::cmd::{CmdOpcode, CmdType};
use iossm_chip::mem::MAX_CAL_RETRY;
use iossm_chip::regs::{self, clkgen, status};

use crate::bus::{wait_for_bit, POLL_INTERVAL};
use crate::controller::Io96bController;
use crate::error::{IossmError, Result};
use crate::mailbox::MailboxRequest;

/// Bound on the initial calibration result. The hardware legitimately
/// takes tens of seconds after reset.
pub const CALIBRATION_TIMEOUT: Duration = Duration::from_secs(60);

impl Io96bController {
    /// Wait for every configured clkgen lock channel.
    fn wait_clkgen_locked(&mut self) -> Result<()> {
        let Some(gate) = self.clkgen_gate else {
            return Ok(());
        };

        let channels = [
            (clkgen::PLL_A_IO96B0, clkgen::SERR_STATUS, clkgen::LOCKED_IO96B0, "io96b_0 clkgen A lock"),
            (clkgen::PLL_B_IO96B0, clkgen::DERR_STATUS, clkgen::LOCKED_IO96B0, "io96b_0 clkgen B lock"),
            (clkgen::PLL_A_IO96B1, clkgen::SERR_STATUS, clkgen::LOCKED_IO96B1, "io96b_1 clkgen A lock"),
            (clkgen::PLL_B_IO96B1, clkgen::DERR_STATUS, clkgen::LOCKED_IO96B1, "io96b_1 clkgen B lock"),
        ];

        for (select, offset, locked, what) in channels {
            if gate.channels & select == 0 {
                continue;
            }
            wait_for_bit(
                &mut *self.bus,
                &*self.clock,
                gate.sysmgr_base + offset,
                locked,
                true,
                self.timeouts.mailbox,
                what,
            )?;
            tracing::debug!("{what} confirmed");
        }

        Ok(())
    }

    /// Poll one instance's `STATUS` register until it reports a result.
    ///
    /// Returns whether calibration succeeded; a result with both bits set
    /// counts as failure. No result within the bound is a hard timeout.
    fn poll_cal_result(&mut self, index: usize) -> Result<bool> {
        let status_addr = self.instances[index].csr_base + regs::STATUS;
        let timeout = self.timeouts.calibration;
        let deadline = self.clock.now() + timeout;

        loop {
            let word = self.bus.read_u32(status_addr)?;
            let success = word & status::CAL_SUCCESS != 0;
            let fail = word & status::CAL_FAIL != 0;
            if success || fail {
                return Ok(success && !fail);
            }

            if self.clock.now() > deadline {
                return Err(IossmError::timeout(
                    format!("calibration result on instance {index}"),
                    timeout,
                ));
            }

            // The one long wait in the driver; delay doubles as the
            // cooperative yield point.
            self.clock.delay(POLL_INTERVAL);
        }
    }

    /// Initial calibration check across the set.
    ///
    /// Waits out the clkgen gate if one is configured, then collects the
    /// pass/fail result of every instance. A failed instance is recorded
    /// for [`Self::retry_calibration`]; only a missing result (or a gate
    /// lock timeout) is an error.
    ///
    /// # Errors
    ///
    /// [`IossmError::Timeout`] on a clkgen lock or calibration-result
    /// timeout, or any bus error.
    pub fn check_calibration(&mut self) -> Result<()> {
        self.overall_cal_passed = false;

        self.wait_clkgen_locked()?;

        for i in 0..self.instances.len() {
            let passed = self.poll_cal_result(i)?;
            self.instances[i].cal_passed = passed;
            if passed {
                tracing::info!("initial calibration passed on instance {i}");
            } else {
                tracing::warn!("initial calibration failed on instance {i}");
            }
        }

        self.recompute_overall();
        Ok(())
    }

    /// Re-calibrate every instance that failed the initial check.
    ///
    /// Per interface: learn the live status offset, then up to
    /// [`MAX_CAL_RETRY`] rounds of read-status / trigger / re-query. The
    /// status read comes first, so an interface that recovered on its own
    /// costs no trigger command.
    ///
    /// # Errors
    ///
    /// [`IossmError::RetryExhausted`] when an interface stays failed
    /// through the retry bound; transport errors propagate unchanged.
    pub fn retry_calibration(&mut self) -> Result<()> {
        for i in 0..self.instances.len() {
            if self.instances[i].cal_passed {
                continue;
            }

            let base = self.instances[i].csr_base;
            let interfaces: Vec<_> = self.instances[i].interfaces.iter().collect();

            for (j, intf) in interfaces.iter().enumerate() {
                if j >= regs::NUM_CMD_RESPONSE_DATA {
                    return Err(IossmError::invalid_response(format!(
                        "no status offset for interface {j} in GET_MEM_CAL_STATUS response"
                    )));
                }

                let status_req =
                    MailboxRequest::new(CmdType::TrigMemCalOp, CmdOpcode::GetMemCalStatus);
                let mut resp = self.send_to(i, &status_req, 2)?;

                let mut recovered = false;
                for _ in 0..MAX_CAL_RETRY {
                    let offset = resp.data[j];
                    let cal_stat = self.bus.read_u32(base + u64::from(offset))? & 0xFF;
                    if cal_stat == regs::INTF_CAL_STATUS_SUCCESS {
                        recovered = true;
                        break;
                    }

                    let trig = MailboxRequest::to_interface(
                        intf.ip_type,
                        intf.instance_id,
                        CmdType::TrigMemCalOp,
                        CmdOpcode::TrigMemCal,
                    );
                    let trig_resp = self.send_to(i, &trig, 2)?;
                    tracing::debug!(
                        "instance {i} interface {j}: calibration trigger accepted = {}",
                        trig_resp.data_short() & 0x1
                    );

                    self.clock.delay(POLL_INTERVAL);
                    resp = self.send_to(i, &status_req, 2)?;
                }

                if !recovered {
                    tracing::error!(
                        "instance {i} interface {j} still uncalibrated after {MAX_CAL_RETRY} attempts"
                    );
                    return Err(IossmError::RetryExhausted {
                        instance: i,
                        interface: j,
                        attempts: MAX_CAL_RETRY,
                    });
                }
            }

            self.instances[i].cal_passed = true;
            tracing::info!("instance {i} recovered by re-calibration");
        }

        self.recompute_overall();
        if self.overall_cal_passed {
            tracing::debug!("overall calibration success");
        }
        Ok(())
    }
}
