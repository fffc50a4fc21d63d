//! Full-address memory initialization BIST.
//!
//! ECC-enabled memory must be written once before it can be trusted; the
//! sequencer does that with a built-in self test over the full address
//! range. The start command must be explicitly accepted, and completion is
//! polled with further mailbox commands — a wall-clock bound, not the
//! retry count calibration uses.

use iossm_chip::cmd::{bist, CmdOpcode, CmdType};

use crate::bus::POLL_INTERVAL;
use crate::controller::Io96bController;
use crate::error::{IossmError, Result};
use crate::mailbox::MailboxRequest;

impl Io96bController {
    /// Run the full-memory initialization BIST on every interface of
    /// every instance.
    ///
    /// # Errors
    ///
    /// [`IossmError::InvalidResponse`] when the sequencer rejects the
    /// start command (the diagnostic sub-code is included),
    /// [`IossmError::Timeout`] when completion never reports, and any
    /// transport error.
    pub fn bist_full_mem_init(&mut self) -> Result<()> {
        for i in 0..self.instances.len() {
            let interfaces: Vec<_> = self.instances[i].interfaces.iter().collect();

            for (j, intf) in interfaces.iter().enumerate() {
                let start = MailboxRequest::to_interface(
                    intf.ip_type,
                    intf.instance_id,
                    CmdType::TrigControllerOp,
                    CmdOpcode::BistMemInitStart,
                )
                .with_param0(bist::FULL_ADDRESS_RANGE);
                let resp = self.send_to(i, &start, 0)?;

                if resp.data_short() & bist::ACCEPTED == 0 {
                    let code = (resp.data_short() & bist::ERROR_CODE_MASK) >> bist::ERROR_CODE_SHIFT;
                    tracing::error!(
                        "instance {i} interface {j}: memory init rejected (code {code:#x})"
                    );
                    return Err(IossmError::invalid_response(format!(
                        "BIST start rejected on instance {i} interface {j} (code {code:#x})"
                    )));
                }

                // Poll completion. Bounded by wall clock only; the
                // sequencer is busy writing the whole address space.
                let timeout = self.timeouts.bist;
                let deadline = self.clock.now() + timeout;
                loop {
                    let status_req = MailboxRequest::to_interface(
                        intf.ip_type,
                        intf.instance_id,
                        CmdType::TrigControllerOp,
                        CmdOpcode::BistMemInitStatus,
                    );
                    let resp = self.send_to(i, &status_req, 0)?;
                    if resp.data_short() & bist::ACCEPTED != 0 {
                        break;
                    }

                    if self.clock.now() > deadline {
                        let code =
                            (resp.data_short() & bist::ERROR_CODE_MASK) >> bist::ERROR_CODE_SHIFT;
                        tracing::error!(
                            "instance {i} interface {j}: memory init timed out (code {code:#x})"
                        );
                        return Err(IossmError::timeout(
                            format!("memory init BIST on instance {i} interface {j}"),
                            timeout,
                        ));
                    }

                    self.clock.delay(POLL_INTERVAL);
                }
            }

            tracing::debug!("memory initialized on instance {i}");
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backends::{SimBus, SimInterface, SimSequencer};
    use crate::clock::FakeClock;
    use crate::controller::Io96bConfig;
    use std::time::Duration;

    const BASE: u64 = 0x1840_0000;

    fn setup(seq: SimSequencer) -> (Io96bController, SimBus) {
        let bus = SimBus::new();
        bus.install(seq);
        let mut ctrl = Io96bController::new(
            Box::new(bus.clone()),
            Box::new(FakeClock::with_step(Duration::from_millis(50))),
            Io96bConfig::new(&[BASE]),
        )
        .unwrap();
        ctrl.enumerate_interfaces().unwrap();
        (ctrl, bus)
    }

    #[test]
    fn accepted_bist_completes_after_polling() {
        let mut seq = SimSequencer::new(BASE);
        seq.add_interface(SimInterface::default());
        seq.set_bist(true, 0, 3);
        let (mut ctrl, _) = setup(seq);

        ctrl.bist_full_mem_init().unwrap();
    }

    #[test]
    fn rejected_start_reports_the_sub_code() {
        let mut seq = SimSequencer::new(BASE);
        seq.add_interface(SimInterface::default());
        seq.set_bist(false, 0x2, 0);
        let (mut ctrl, _) = setup(seq);

        let err = ctrl.bist_full_mem_init().unwrap_err();
        match err {
            IossmError::InvalidResponse { reason } => assert!(reason.contains("0x2")),
            other => panic!("expected InvalidResponse, got {other:?}"),
        }
    }

    #[test]
    fn never_completing_bist_times_out() {
        let mut seq = SimSequencer::new(BASE);
        seq.add_interface(SimInterface::default());
        seq.set_bist(true, 0, u32::MAX);
        let (mut ctrl, _) = setup(seq);

        let err = ctrl.bist_full_mem_init().unwrap_err();
        assert!(matches!(err, IossmError::Timeout { .. }));
    }

    #[test]
    fn start_command_carries_the_full_range_parameter() {
        let mut seq = SimSequencer::new(BASE);
        seq.add_interface(SimInterface::default());
        seq.set_bist(true, 0, 0);
        let (mut ctrl, bus) = setup(seq);

        ctrl.bist_full_mem_init().unwrap();

        // Exactly one write to param 0, carrying the range selector.
        let param0 = BASE + iossm_chip::regs::CMD_PARAM[0];
        let writes: Vec<_> = bus.writes().into_iter().filter(|(a, _)| *a == param0).collect();
        assert_eq!(writes, vec![(param0, bist::FULL_ADDRESS_RANGE)]);
    }
}
