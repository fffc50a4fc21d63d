//! `iossm` — command-line bring-up tool for IOSSM-managed DDR.
//!
//! ```text
//! USAGE:
//!   iossm calibrate --csr-base 0x18400000 [--csr-base 0x18c00000] [--bist]
//!                   [--sysmgr-base 0x10d10000 --clkgen-mask 0x3]
//!                       Run the full check/retry/query sequence (root)
//!   iossm info --csr-base 0x18400000
//!                       Report calibration state and memory properties (root)
//!   iossm sim-demo      Run the same sequence against the simulated sequencer
//! ```
//!
//! A fatal error prints the decoded diagnostic and exits non-zero — once
//! memory cannot be trusted there is no continuation path.

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

use iossm_chip::mem::DdrType;
use iossm_chip::regs::{self, status};
use iossm_driver::{
    ClkgenGate, DevMem, FakeClock, Io96bConfig, Io96bController, SimBus, SimInterface,
    SimSequencer, SystemClock,
};

/// Span of one instance's CSR block.
const CSR_SPAN: u64 = 0x100_0000;

#[derive(Parser)]
#[command(name = "iossm", about = "IOSSM DDR subsystem bring-up tool", version)]
struct Cli {
    #[command(subcommand)]
    command: Cmd,
}

#[derive(Subcommand)]
enum Cmd {
    /// Run the full calibration and query sequence against hardware.
    Calibrate {
        /// CSR base address per instance (hex ok), repeatable.
        #[arg(long = "csr-base", required = true, value_parser = parse_addr)]
        csr_bases: Vec<u64>,
        /// System-manager base for the clkgen-lock gate (hex ok).
        #[arg(long, value_parser = parse_addr, requires = "clkgen_mask")]
        sysmgr_base: Option<u64>,
        /// Clkgen lock channel mask (bits 0-3), enables the gate.
        #[arg(long, requires = "sysmgr_base", value_parser = parse_mask)]
        clkgen_mask: Option<u8>,
        /// Run full-memory initialization BIST when ECC is enabled.
        #[arg(long)]
        bist: bool,
    },
    /// Report calibration state and memory properties without retrying.
    Info {
        /// CSR base address per instance (hex ok), repeatable.
        #[arg(long = "csr-base", required = true, value_parser = parse_addr)]
        csr_bases: Vec<u64>,
    },
    /// Run the calibrate sequence against the simulated sequencer.
    SimDemo,
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| "warn".into()))
        .init();

    let cli = Cli::parse();

    match cli.command {
        Cmd::Calibrate { csr_bases, sysmgr_base, clkgen_mask, bist } => {
            cmd_calibrate(&csr_bases, sysmgr_base.zip(clkgen_mask), bist)?;
        }
        Cmd::Info { csr_bases } => cmd_info(&csr_bases)?,
        Cmd::SimDemo => cmd_sim_demo()?,
    }

    Ok(())
}

fn parse_addr(s: &str) -> Result<u64, String> {
    let trimmed = s.trim();
    let parsed = trimmed
        .strip_prefix("0x")
        .or_else(|| trimmed.strip_prefix("0X"))
        .map_or_else(|| trimmed.parse(), |hex| u64::from_str_radix(hex, 16));
    parsed.map_err(|e| format!("invalid address {trimmed:?}: {e}"))
}

fn parse_mask(s: &str) -> Result<u8, String> {
    let mask = parse_addr(s)?;
    if mask == 0 || mask > 0xF {
        return Err(format!("clkgen mask {mask:#x} outside bits 0-3"));
    }
    Ok(mask as u8)
}

/// Map one `/dev/mem` window covering every address the sequence touches.
fn map_window(csr_bases: &[u64], sysmgr_base: Option<u64>) -> Result<DevMem> {
    let mut lo = u64::MAX;
    let mut hi = 0u64;
    for &base in csr_bases.iter().chain(sysmgr_base.iter()) {
        lo = lo.min(base);
        hi = hi.max(base + CSR_SPAN);
    }

    DevMem::map(lo, (hi - lo) as usize).context("mapping the CSR window (are you root?)")
}

fn cmd_calibrate(csr_bases: &[u64], gate: Option<(u64, u8)>, bist: bool) -> Result<()> {
    let bus = map_window(csr_bases, gate.map(|(base, _)| base))?;

    let mut config = Io96bConfig::new(csr_bases);
    config.clkgen_gate = gate.map(|(sysmgr_base, channels)| ClkgenGate { sysmgr_base, channels });

    let mut ctrl = Io96bController::new(Box::new(bus), Box::new(SystemClock::new()), config)?;
    bring_up(&mut ctrl, bist)
}

fn cmd_info(csr_bases: &[u64]) -> Result<()> {
    let bus = map_window(csr_bases, None)?;
    let mut ctrl = Io96bController::new(
        Box::new(bus),
        Box::new(SystemClock::new()),
        Io96bConfig::new(csr_bases),
    )?;

    ctrl.check_calibration().context("calibration check")?;
    ctrl.enumerate_interfaces().context("interface enumeration")?;
    report(&mut ctrl)
}

fn cmd_sim_demo() -> Result<()> {
    let bus = SimBus::new();
    let base = 0x1840_0000;
    let mut seq = SimSequencer::new(base);
    seq.add_interface(SimInterface { size_gbit: 16, ..SimInterface::default() });
    seq.add_interface(SimInterface {
        instance_id: 1,
        size_gbit: 16,
        cal_status_offset: 0x504,
        ..SimInterface::default()
    });
    seq.set_ddr_type(DdrType::Ddr5 as u32);
    seq.set_ecc_enabled(true);
    bus.install(seq);
    bus.poke(base + regs::STATUS, status::CAL_SUCCESS);

    let mut ctrl = Io96bController::new(
        Box::new(bus),
        Box::new(FakeClock::new()),
        Io96bConfig::new(&[base]),
    )?;
    bring_up(&mut ctrl, true)
}

/// The full boot-flow sequence: check, enumerate, retry if needed,
/// query, optionally BIST.
fn bring_up(ctrl: &mut Io96bController, bist: bool) -> Result<()> {
    println!("SDRAM init in progress ...");

    ctrl.check_calibration().context("initial calibration check")?;
    ctrl.enumerate_interfaces().context("interface enumeration")?;

    if !ctrl.overall_cal_passed() {
        println!("Re-calibration in progress ...");
        ctrl.retry_calibration().context("re-calibration")?;
    }

    if !ctrl.overall_cal_passed() {
        bail!("calibration did not pass on all instances");
    }
    println!("Calibration success");

    report(ctrl)?;

    if bist {
        if ctrl.ecc_enabled() == Some(true) {
            println!("Full memory initialization in progress ...");
            ctrl.bist_full_mem_init().context("memory initialization BIST")?;
            println!("Memory initialized");
        } else {
            println!("ECC disabled, skipping memory initialization");
        }
    }

    println!("SDRAM init success");
    Ok(())
}

fn report(ctrl: &mut Io96bController) -> Result<()> {
    let ddr = ctrl.mem_technology().context("memory technology query")?;
    let gbit = ctrl.mem_width_info().context("memory width query")?;
    let ecc = ctrl.ecc_enable_status().context("ECC status query")?;

    println!();
    println!("Instances    : {}", ctrl.num_instances());
    for (i, inst) in ctrl.instances().iter().enumerate() {
        println!(
            "  [{i}] {:#010x}  cal={}  interfaces={}  size={} Gbit",
            inst.csr_base(),
            if inst.cal_passed() { "pass" } else { "FAIL" },
            inst.interfaces().len(),
            inst.mem_size_gbit(),
        );
    }
    println!("Technology   : {ddr}");
    println!("Total memory : {gbit} Gbit ({} MiB)", ctrl.total_mem_bytes() >> 20);
    println!("ECC          : {}", if ecc { "enabled" } else { "disabled" });
    println!();

    Ok(())
}
