//! Memory interface enumeration.
//!
//! IP type and instance id must be known before any command can be
//! addressed to an interface, so this runs once per boot, before
//! calibration retry and before every property query.

use iossm_chip::cmd::{CmdOpcode, CmdType};
use iossm_chip::mem;

use crate::controller::{Io96bController, MemInterfaceId};
use crate::error::{IossmError, Result};
use crate::mailbox::MailboxRequest;

impl Io96bController {
    /// Discover the memory interfaces behind every instance and populate
    /// the interface tables.
    ///
    /// The sequencer reports up to three interface-info words; a word
    /// whose IP-type field is zero describes an absent interface and is
    /// skipped, never recorded. Failure here is fatal to the boot flow —
    /// nothing downstream can run against unknown interfaces.
    ///
    /// # Errors
    ///
    /// Any transport error, [`IossmError::InvalidParameter`] if a table
    /// was already populated (enumeration runs exactly once).
    pub fn enumerate_interfaces(&mut self) -> Result<()> {
        for i in 0..self.instances.len() {
            if !self.instances[i].interfaces.is_empty() {
                return Err(IossmError::invalid_parameter(format!(
                    "instance {i} already enumerated"
                )));
            }

            let req = MailboxRequest::new(CmdType::GetSysInfo, CmdOpcode::GetMemIntfInfo);
            let resp = self.send_to(i, &req, 2)?;

            let reported = resp.data_short() & mem::INTF_COUNT_MASK;
            tracing::debug!("instance {i}: {reported} memory interface(s) reported");

            // reported is at most 3 (2-bit field), so it indexes data[] safely
            for k in 0..reported as usize {
                let word = resp.data[k];
                let ip_type = mem::intf_ip_type(word);
                if ip_type == 0 {
                    continue;
                }
                let id = MemInterfaceId {
                    ip_type,
                    instance_id: mem::intf_instance_id(word),
                };
                self.instances[i].interfaces.push(id)?;
                tracing::debug!(
                    "instance {i}: interface {} is ip_type={:#x} instance_id={:#x}",
                    self.instances[i].interfaces.len() - 1,
                    id.ip_type,
                    id.instance_id,
                );
            }

            tracing::info!(
                "instance {i}: {} interface(s) recorded",
                self.instances[i].interfaces.len()
            );
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backends::{SimBus, SimInterface, SimReply, SimSequencer};
    use crate::clock::FakeClock;
    use crate::controller::Io96bConfig;

    const BASE: u64 = 0x1840_0000;

    fn controller_with(seq: SimSequencer) -> (Io96bController, SimBus) {
        let bus = SimBus::new();
        bus.install(seq);
        let ctrl = Io96bController::new(
            Box::new(bus.clone()),
            Box::new(FakeClock::new()),
            Io96bConfig::new(&[BASE]),
        )
        .unwrap();
        (ctrl, bus)
    }

    #[test]
    fn records_all_present_interfaces() {
        let mut seq = SimSequencer::new(BASE);
        seq.add_interface(SimInterface { ip_type: 1, instance_id: 0, ..SimInterface::default() });
        seq.add_interface(SimInterface { ip_type: 1, instance_id: 1, ..SimInterface::default() });
        let (mut ctrl, _) = controller_with(seq);

        ctrl.enumerate_interfaces().unwrap();

        let table = ctrl.instance(0).unwrap().interfaces();
        assert_eq!(table.len(), 2);
        assert_eq!(table.get(1).unwrap().instance_id, 1);
    }

    #[test]
    fn zero_ip_type_entries_are_skipped() {
        // Count says two, but the second info word is absent (all-zero).
        let mut seq = SimSequencer::new(BASE);
        seq.push_override(
            CmdType::GetSysInfo,
            CmdOpcode::GetMemIntfInfo,
            SimReply {
                short: 2,
                data: [1 << 29, 0, 0], // ip_type=1 instance_id=0, then nothing
                ..SimReply::default()
            },
        );
        let (mut ctrl, _) = controller_with(seq);

        ctrl.enumerate_interfaces().unwrap();

        assert_eq!(ctrl.instance(0).unwrap().interfaces().len(), 1);
    }

    #[test]
    fn enumeration_failure_propagates() {
        let mut seq = SimSequencer::new(BASE);
        seq.set_responding(false);
        let bus = SimBus::new();
        bus.install(seq);
        let mut ctrl = Io96bController::new(
            Box::new(bus),
            Box::new(FakeClock::with_step(std::time::Duration::from_millis(50))),
            Io96bConfig::new(&[BASE]),
        )
        .unwrap();

        let err = ctrl.enumerate_interfaces().unwrap_err();
        assert!(matches!(err, IossmError::Timeout { .. }));
    }

    #[test]
    fn double_enumeration_is_rejected() {
        let mut seq = SimSequencer::new(BASE);
        seq.add_interface(SimInterface::default());
        let (mut ctrl, _) = controller_with(seq);

        ctrl.enumerate_interfaces().unwrap();
        let err = ctrl.enumerate_interfaces().unwrap_err();
        assert!(matches!(err, IossmError::InvalidParameter { .. }));
    }
}
