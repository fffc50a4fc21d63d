//! Mailbox register map for one IO96B controller instance.
//!
//! All offsets are relative to the instance's CSR base address. The layout
//! is fixed silicon: the seven parameter registers and three response-data
//! registers sit *below* their associated doorbell/status registers, so the
//! offsets descend as the index rises.
//!
//! ```text
//! base+0x400: STATUS               calibration success/fail/busy bits
//! base+0x420: CMD_PARAM_6          ↑ optional request parameters
//! base+0x438: CMD_PARAM_0          ↓ (written only when non-zero)
//! base+0x43c: CMD_REQ              packed request word, doorbell
//! base+0x450: CMD_RESPONSE_DATA_2  ↑ extra response words
//! base+0x458: CMD_RESPONSE_DATA_0  ↓ (count is command-specific)
//! base+0x45c: CMD_RESPONSE_STATUS  ready bit, error fields, short data
//! ```

// ── Calibration status ───────────────────────────────────────────────────────

/// Instance-level calibration status register.
pub const STATUS: u64 = 0x400;

/// `STATUS` bit definitions.
pub mod status {
    /// Calibration completed successfully.
    pub const CAL_SUCCESS: u32 = 1 << 0;
    /// Calibration completed with failure.
    pub const CAL_FAIL: u32 = 1 << 1;
    /// Calibration still running.
    pub const CAL_BUSY: u32 = 1 << 2;
}

/// Per-interface live calibration status code reporting success.
///
/// The register holding this code is not at a fixed offset: the sequencer
/// returns its offset in the `GET_MEM_CAL_STATUS` response. Only the low
/// byte of the register carries the code.
pub const INTF_CAL_STATUS_SUCCESS: u32 = 0x1;

// ── Command request ──────────────────────────────────────────────────────────

/// Number of optional parameter registers.
pub const NUM_CMD_PARAMS: usize = 7;

/// Request parameter registers, indexed by parameter slot.
pub const CMD_PARAM: [u64; NUM_CMD_PARAMS] =
    [0x438, 0x434, 0x430, 0x42C, 0x428, 0x424, 0x420];

/// Packed request word and doorbell. Must read back all-zero before a new
/// command may be issued; writing a non-zero word starts execution.
pub const CMD_REQ: u64 = 0x43C;

// ── Command response ─────────────────────────────────────────────────────────

/// Maximum number of extra response data words.
pub const NUM_CMD_RESPONSE_DATA: usize = 3;

/// Response data registers, indexed by data word.
pub const CMD_RESPONSE_DATA: [u64; NUM_CMD_RESPONSE_DATA] = [0x458, 0x454, 0x450];

/// Packed response status word.
pub const CMD_RESPONSE_STATUS: u64 = 0x45C;

/// `CMD_RESPONSE_STATUS` field definitions.
pub mod resp_status {
    /// Response ready. Set by the sequencer, cleared by the host as the
    /// acknowledgement that the response has been consumed.
    pub const RESPONSE_READY: u32 = 1 << 0;

    /// General error code, bits 1–4.
    pub const GENERAL_ERROR_MASK: u32 = 0xF << GENERAL_ERROR_SHIFT;
    /// Shift for [`GENERAL_ERROR_MASK`].
    pub const GENERAL_ERROR_SHIFT: u32 = 1;

    /// Command response error code, bits 5–7.
    pub const CMD_RESPONSE_ERROR_MASK: u32 = 0x7 << CMD_RESPONSE_ERROR_SHIFT;
    /// Shift for [`CMD_RESPONSE_ERROR_MASK`].
    pub const CMD_RESPONSE_ERROR_SHIFT: u32 = 5;

    /// Short response data, bits 16–31. Single-word results are returned
    /// here instead of occupying a `CMD_RESPONSE_DATA` register.
    pub const DATA_SHORT_MASK: u32 = 0xFFFF << DATA_SHORT_SHIFT;
    /// Shift for [`DATA_SHORT_MASK`].
    pub const DATA_SHORT_SHIFT: u32 = 16;
}

// ── Clkgen lock flags ────────────────────────────────────────────────────────
// The DDR CSR clock-generator lock bits live in two system-manager interrupt
// status registers outside the instance CSR window: PLL A channels report in
// the SERR register, PLL B channels in the DERR register.

/// Clkgen lock status flags (system-manager relative).
pub mod clkgen {
    /// PLL A lock status register, offset from the system-manager base.
    pub const SERR_STATUS: u64 = 0x9C;
    /// PLL B lock status register, offset from the system-manager base.
    pub const DERR_STATUS: u64 = 0xA0;

    /// IO96B instance 0 locked.
    pub const LOCKED_IO96B0: u32 = 1 << 16;
    /// IO96B instance 1 locked.
    pub const LOCKED_IO96B1: u32 = 1 << 17;

    /// Channel-select masks for the four independent lock channels.
    pub const PLL_A_IO96B0: u8 = 1 << 0;
    /// IO96B 0, PLL B.
    pub const PLL_B_IO96B0: u8 = 1 << 1;
    /// IO96B 1, PLL A.
    pub const PLL_A_IO96B1: u8 = 1 << 2;
    /// IO96B 1, PLL B.
    pub const PLL_B_IO96B1: u8 = 1 << 3;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn param_registers_descend_from_param_0() {
        for w in CMD_PARAM.windows(2) {
            assert_eq!(w[0] - 4, w[1]);
        }
        assert_eq!(CMD_PARAM[0] + 4, CMD_REQ);
    }

    #[test]
    fn response_registers_descend_from_data_0() {
        for w in CMD_RESPONSE_DATA.windows(2) {
            assert_eq!(w[0] - 4, w[1]);
        }
        assert_eq!(CMD_RESPONSE_DATA[0] + 4, CMD_RESPONSE_STATUS);
    }

    #[test]
    fn status_fields_do_not_overlap() {
        let fields = [
            resp_status::RESPONSE_READY,
            resp_status::GENERAL_ERROR_MASK,
            resp_status::CMD_RESPONSE_ERROR_MASK,
            resp_status::DATA_SHORT_MASK,
        ];
        for (i, a) in fields.iter().enumerate() {
            for b in &fields[i + 1..] {
                assert_eq!(a & b, 0, "{a:#x} overlaps {b:#x}");
            }
        }
    }
}
