//! Mailbox command tables and request-word packing.
//!
//! A request is a single 32-bit word packed low→high as opcode, command
//! type, IP instance id and IP type. Writing it to `CMD_REQ` is the doorbell
//! that starts execution, so the word is composed in full before any
//! register write.
//!
//! ```text
//!  31     29 28      24 23      16 15                 0
//! ┌─────────┬──────────┬──────────┬────────────────────┐
//! │ ip_type │ instance │ cmd_type │       opcode       │
//! └─────────┴──────────┴──────────┴────────────────────┘
//! ```

// ── Request word layout ──────────────────────────────────────────────────────

/// Opcode field shift (bits 0–15).
pub const OPCODE_SHIFT: u32 = 0;
/// Command type field shift (bits 16–23).
pub const CMD_TYPE_SHIFT: u32 = 16;
/// IP instance id field shift (bits 24–28).
pub const INSTANCE_ID_SHIFT: u32 = 24;
/// IP type field shift (bits 29–31).
pub const IP_TYPE_SHIFT: u32 = 29;

/// Widest IP type the 3-bit field can carry.
pub const IP_TYPE_MAX: u32 = 0x7;
/// Widest instance id the 5-bit field can carry.
pub const INSTANCE_ID_MAX: u32 = 0x1F;

/// Pack a request word. Fields wider than their slot are the caller's bug;
/// the driver validates ranges before calling.
#[must_use]
pub const fn encode_request(ip_type: u32, instance_id: u32, cmd_type: CmdType, opcode: CmdOpcode) -> u32 {
    ((opcode as u32) << OPCODE_SHIFT)
        | ((cmd_type as u32) << CMD_TYPE_SHIFT)
        | (instance_id << INSTANCE_ID_SHIFT)
        | (ip_type << IP_TYPE_SHIFT)
}

// ── Command tables ───────────────────────────────────────────────────────────

/// Mailbox command type (bits 16–23 of the request word).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum CmdType {
    /// No operation.
    Nop = 0,
    /// System information queries.
    GetSysInfo = 1,
    /// Memory interface information queries.
    GetMemInfo = 2,
    /// Memory calibration information queries.
    GetMemCalInfo = 3,
    /// Memory controller operations (ECC, BIST).
    TrigControllerOp = 4,
    /// Memory calibration operations.
    TrigMemCalOp = 5,
}

/// Mailbox command opcode (bits 0–15 of the request word).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u16)]
pub enum CmdOpcode {
    /// Enumerate memory interfaces behind an instance.
    GetMemIntfInfo = 0x0001,
    /// Report the memory technology (DDR4, DDR5, ...).
    GetMemTechnology = 0x0002,
    /// Report the memory clock frequency in kHz.
    GetMemclkFreqKhz = 0x0003,
    /// Report per-interface memory width/size.
    GetMemWidthInfo = 0x0004,
    /// Trigger re-calibration of one interface.
    TrigMemCal = 0x000A,
    /// Report the live calibration status register offset per interface.
    GetMemCalStatus = 0x000B,
    /// Report whether ECC is enabled.
    EccEnableStatus = 0x0102,
    /// Start full-address memory initialization BIST.
    BistMemInitStart = 0x0203,
    /// Poll the memory initialization BIST result.
    BistMemInitStatus = 0x0204,
}

// ── BIST sub-fields ──────────────────────────────────────────────────────────

/// `BIST_MEM_INIT_START` / `BIST_MEM_INIT_STATUS` short-data fields.
pub mod bist {
    /// Parameter 0 value selecting the full address range.
    pub const FULL_ADDRESS_RANGE: u32 = 0x40;
    /// Start accepted / initialization complete.
    pub const ACCEPTED: u32 = 1 << 0;
    /// Error sub-code on rejection, bits 1–2. Diagnostic only.
    pub const ERROR_CODE_MASK: u32 = 0x3 << ERROR_CODE_SHIFT;
    /// Shift for [`ERROR_CODE_MASK`].
    pub const ERROR_CODE_SHIFT: u32 = 1;
}
