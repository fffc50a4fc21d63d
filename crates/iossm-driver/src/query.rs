//! Read-only property queries over the mailbox.
//!
//! All three queries walk every interface of every instance. Technology
//! and ECC mode follow an establish-then-verify rule — the first interface
//! seeds the aggregate and every later one must agree, because a set whose
//! interfaces disagree on what memory is attached cannot be trusted at
//! all. Memory size is the one additive aggregate: interfaces sum into the
//! instance, instances sum into the set.

use iossm_chip::cmd::{CmdOpcode, CmdType};
use iossm_chip::mem::{self, DdrType};

use crate::controller::Io96bController;
use crate::error::{IossmError, Result};
use crate::mailbox::MailboxRequest;

impl Io96bController {
    /// Query the memory technology and verify all interfaces agree.
    ///
    /// # Errors
    ///
    /// [`IossmError::Consistency`] on a cross-interface mismatch, plus
    /// any transport error.
    pub fn mem_technology(&mut self) -> Result<DdrType> {
        self.ddr_type = None;

        for i in 0..self.instances.len() {
            let interfaces: Vec<_> = self.instances[i].interfaces.iter().collect();
            for intf in interfaces {
                let req = MailboxRequest::to_interface(
                    intf.ip_type,
                    intf.instance_id,
                    CmdType::GetMemInfo,
                    CmdOpcode::GetMemTechnology,
                );
                let resp = self.send_to(i, &req, 0)?;

                let found = DdrType::from_code(resp.data_short() & mem::DDR_TYPE_MASK);
                match self.ddr_type {
                    None => {
                        self.ddr_type = Some(found);
                        tracing::debug!("memory technology established as {found}");
                    }
                    Some(expected) if expected != found => {
                        tracing::error!("instance {i} reports {found}, set already agreed on {expected}");
                        return Err(IossmError::Consistency {
                            property: "memory technology",
                            instance: i,
                            expected: expected.to_string(),
                            found: found.to_string(),
                        });
                    }
                    Some(_) => {}
                }
            }
        }

        Ok(self.ddr_type.unwrap_or(DdrType::Unknown))
    }

    /// Query per-interface memory sizes and aggregate them by addition.
    ///
    /// Returns the set total in Gbit; per-instance sums are recorded on
    /// the instances.
    ///
    /// # Errors
    ///
    /// [`IossmError::InvalidResponse`] when an instance (or the whole
    /// set) reports zero memory, plus any transport error.
    pub fn mem_width_info(&mut self) -> Result<u32> {
        let mut total = 0u32;

        for i in 0..self.instances.len() {
            let interfaces: Vec<_> = self.instances[i].interfaces.iter().collect();
            let mut instance_size = 0u32;

            for intf in interfaces {
                let req = MailboxRequest::to_interface(
                    intf.ip_type,
                    intf.instance_id,
                    CmdType::GetMemInfo,
                    CmdOpcode::GetMemWidthInfo,
                );
                let resp = self.send_to(i, &req, 2)?;
                instance_size += resp.data[1] & mem::MEM_WIDTH_SIZE_MASK;
            }

            if instance_size == 0 {
                return Err(IossmError::invalid_response(format!(
                    "instance {i} reports no memory"
                )));
            }

            self.instances[i].mem_size_gbit = instance_size;
            total += instance_size;
            tracing::debug!("instance {i}: {instance_size} Gbit");
        }

        if total == 0 {
            return Err(IossmError::invalid_response("no memory behind the set"));
        }

        self.total_mem_gbit = total;
        tracing::info!("total memory: {total} Gbit ({} MiB)", self.total_mem_bytes() >> 20);
        Ok(total)
    }

    /// Query the ECC enable status and verify all interfaces agree.
    ///
    /// # Errors
    ///
    /// [`IossmError::Consistency`] on a cross-interface mismatch, plus
    /// any transport error.
    pub fn ecc_enable_status(&mut self) -> Result<bool> {
        self.ecc_enabled = None;

        for i in 0..self.instances.len() {
            let interfaces: Vec<_> = self.instances[i].interfaces.iter().collect();
            for intf in interfaces {
                let req = MailboxRequest::to_interface(
                    intf.ip_type,
                    intf.instance_id,
                    CmdType::TrigControllerOp,
                    CmdOpcode::EccEnableStatus,
                );
                let resp = self.send_to(i, &req, 0)?;

                let found = resp.data_short() & mem::ECC_ENABLE_MASK != 0;
                match self.ecc_enabled {
                    None => {
                        self.ecc_enabled = Some(found);
                        tracing::debug!("ECC enable status established as {found}");
                    }
                    Some(expected) if expected != found => {
                        tracing::error!("instance {i} disagrees on ECC enable status");
                        return Err(IossmError::Consistency {
                            property: "ECC enable status",
                            instance: i,
                            expected: expected.to_string(),
                            found: found.to_string(),
                        });
                    }
                    Some(_) => {}
                }
            }
        }

        Ok(self.ecc_enabled.unwrap_or(false))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backends::{SimBus, SimInterface, SimSequencer};
    use crate::clock::FakeClock;
    use crate::controller::Io96bConfig;

    const BASE0: u64 = 0x1840_0000;
    const BASE1: u64 = 0x18C0_0000;

    fn two_instance_controller(seq0: SimSequencer, seq1: SimSequencer) -> Io96bController {
        let bus = SimBus::new();
        bus.install(seq0);
        bus.install(seq1);
        let mut ctrl = Io96bController::new(
            Box::new(bus),
            Box::new(FakeClock::new()),
            Io96bConfig::new(&[BASE0, BASE1]),
        )
        .unwrap();
        ctrl.enumerate_interfaces().unwrap();
        ctrl
    }

    fn seq(base: u64, ddr_code: u32, ecc: bool) -> SimSequencer {
        let mut s = SimSequencer::new(base);
        s.add_interface(SimInterface::default());
        s.set_ddr_type(ddr_code);
        s.set_ecc_enabled(ecc);
        s
    }

    #[test]
    fn agreeing_interfaces_establish_the_technology() {
        let code = DdrType::Ddr5 as u32;
        let mut ctrl = two_instance_controller(seq(BASE0, code, false), seq(BASE1, code, false));

        assert_eq!(ctrl.mem_technology().unwrap(), DdrType::Ddr5);
        assert_eq!(ctrl.ddr_type(), Some(DdrType::Ddr5));
    }

    #[test]
    fn technology_mismatch_names_the_offender() {
        let mut ctrl = two_instance_controller(
            seq(BASE0, DdrType::Ddr4 as u32, false),
            seq(BASE1, DdrType::Ddr5 as u32, false),
        );

        let err = ctrl.mem_technology().unwrap_err();
        match err {
            IossmError::Consistency { property, instance, expected, found } => {
                assert_eq!(property, "memory technology");
                assert_eq!(instance, 1);
                assert_eq!(expected, "DDR4");
                assert_eq!(found, "DDR5");
            }
            other => panic!("expected Consistency, got {other:?}"),
        }
    }

    #[test]
    fn sizes_sum_within_and_across_instances() {
        let mut seq0 = SimSequencer::new(BASE0);
        seq0.add_interface(SimInterface { instance_id: 0, size_gbit: 8, ..SimInterface::default() });
        seq0.add_interface(SimInterface { instance_id: 1, size_gbit: 8, ..SimInterface::default() });
        seq0.add_interface(SimInterface {
            instance_id: 2,
            size_gbit: 4,
            cal_status_offset: 0x508,
            ..SimInterface::default()
        });
        let mut seq1 = SimSequencer::new(BASE1);
        seq1.add_interface(SimInterface { size_gbit: 16, ..SimInterface::default() });

        let mut ctrl = two_instance_controller(seq0, seq1);
        let total = ctrl.mem_width_info().unwrap();

        assert_eq!(ctrl.instance(0).unwrap().mem_size_gbit(), 20);
        assert_eq!(ctrl.instance(1).unwrap().mem_size_gbit(), 16);
        assert_eq!(total, 36);
        assert_eq!(ctrl.total_mem_gbit(), 36);
    }

    #[test]
    fn zero_sized_instance_is_rejected() {
        let mut seq0 = SimSequencer::new(BASE0);
        seq0.add_interface(SimInterface { size_gbit: 0, ..SimInterface::default() });
        let seq1 = seq(BASE1, DdrType::Ddr5 as u32, false);

        let mut ctrl = two_instance_controller(seq0, seq1);
        let err = ctrl.mem_width_info().unwrap_err();
        assert!(matches!(err, IossmError::InvalidResponse { .. }));
    }

    #[test]
    fn agreeing_ecc_status_is_reported() {
        let mut ctrl = two_instance_controller(
            seq(BASE0, DdrType::Ddr5 as u32, true),
            seq(BASE1, DdrType::Ddr5 as u32, true),
        );

        assert!(ctrl.ecc_enable_status().unwrap());
        assert_eq!(ctrl.ecc_enabled(), Some(true));
    }

    #[test]
    fn ecc_mismatch_is_a_consistency_error() {
        let mut ctrl = two_instance_controller(
            seq(BASE0, DdrType::Ddr5 as u32, true),
            seq(BASE1, DdrType::Ddr5 as u32, false),
        );

        let err = ctrl.ecc_enable_status().unwrap_err();
        assert!(matches!(
            err,
            IossmError::Consistency { property: "ECC enable status", instance: 1, .. }
        ));
    }
}
