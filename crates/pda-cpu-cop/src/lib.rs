//! CP15 (MMU/cache/TLB) and CP14 (power/clock) coprocessor bridge for the ARMv5TE core.
//!
//! `CpuCop` is pure reactive glue: it owns no CPU state itself (that lives in [`ArmCoreState`],
//! which the CPU core owns) and performs no I/O. It ties one ARM coprocessor instruction to a
//! register read/write plus, for the handful of selectors that need it, a cache/TLB flush or a
//! delegated CP14 transfer.

use thiserror::Error;
use tracing::warn;

/// Set by `MCR p15, 0, Rd, c7, c0, 4` (wait-for-interrupt) when no interrupt is pending.
pub const EVENT_WAITING: u32 = 1 << 0;

/// Per-ARM-core state `CpuCop` reads and writes. Owned by the CPU core; lifetime follows it.
#[derive(Debug, Clone, Default)]
pub struct ArmCoreState {
    pub control: u32,
    pub translation_table_base: u32,
    pub domain_access_control: u32,
    pub data_fault_status: u32,
    pub instruction_fault_status: u32,
    pub fault_address: u32,
    pub cpsr_n: bool,
    pub cpsr_z: bool,
    pub cpsr_c: bool,
    pub cpsr_v: bool,
    pub reg: [u32; 16],
    /// Count of currently pending interrupts; `0` means none pending.
    pub interrupts: u32,
    pub cpu_events: u32,
    pub cycle_count_delta: i64,
}

/// The CPU's address-translation cache (TLB + page-table walk cache). `CpuCop` only ever needs
/// to flush it; the cache's own contents and lookup logic are an external collaborator (the MMU
/// model) whose internals this crate does not specify.
pub trait AddressTranslationCache {
    fn flush(&mut self);
}

/// The cp14 power/clock coprocessor. Unrecognised register selectors are a hard failure here
/// (unlike cp15, where they are just a warning), matching the original's `do_cp14_instruction`
/// raising `undefined_instruction()` when the transfer function reports failure.
pub trait PwrClkCoprocRegXfer {
    /// Returns `true` if the transfer was recognised and performed, `false` if the selector is
    /// not implemented by the power/clock coprocessor (which faults the instruction).
    fn coproc_reg_xfer(
        &mut self,
        special_instr: bool,
        is_read: bool,
        opc1: u8,
        rd: u8,
        crn: u8,
        crm: u8,
        opc2: u8,
    ) -> bool;
}

#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
pub enum CopError {
    #[error("undefined coprocessor instruction")]
    UndefinedInstruction,
}

/// Runtime configuration for `CpuCop`.
#[derive(Debug, Clone, Copy, Default)]
pub struct CpuCopConfig {
    /// Normally the "clean DCache" family of cp15 writes are a pure no-op. Some guest OSes
    /// (the original's `SUPPORT_LINUX` compile-time switch) need them to also flush the address
    /// translation cache to boot correctly; this over-flushes relative to real hardware but is
    /// required for those guests. Exposed as a runtime flag per the redesign note rather than a
    /// compile-time switch.
    pub linux_support: bool,
}

#[derive(Debug, Clone, Copy, Default)]
pub struct CpuCop {
    config: CpuCopConfig,
}

impl CpuCop {
    pub fn new(config: CpuCopConfig) -> Self {
        Self { config }
    }

    /// Dispatches one coprocessor instruction. `cond == 0xF` selects the cp14 (power/clock)
    /// special long-form encoding; anything else is routed to cp15.
    pub fn execute_coproc_instruction(
        &self,
        insn: u32,
        arm: &mut ArmCoreState,
        atc: &mut dyn AddressTranslationCache,
        pwrclk: &mut dyn PwrClkCoprocRegXfer,
    ) -> Result<(), CopError> {
        let cond = (insn >> 28) & 0xF;
        if cond == 0xF {
            self.execute_cp14(insn, pwrclk)
        } else {
            self.execute_cp15(insn, arm, atc);
            Ok(())
        }
    }

    fn execute_cp15(&self, insn: u32, arm: &mut ArmCoreState, atc: &mut dyn AddressTranslationCache) {
        if insn & 0x0010_0000 != 0 {
            self.do_cp15_mrc(insn, arm);
        } else {
            self.do_cp15_mcr(insn, arm, atc);
        }
    }

    fn do_cp15_mrc(&self, insn: u32, arm: &mut ArmCoreState) {
        let key = insn & 0x00EF_00EF;
        let value = match key {
            0x0000_0000 => 0x6905_2D05, // c0,c0,0: ID Code Register (PXA261)
            0x0000_0010 => 0x1D11_2152, // c0,c0,1: Cache Type Register
            0x0000_0020 => 0,           // c0,c0,2: TCM Status Register
            0x0001_0000 => arm.control,
            0x0002_0000 => arm.translation_table_base,
            0x0003_0000 => arm.domain_access_control,
            0x0005_0000 => arm.data_fault_status,
            0x0005_0020 => arm.instruction_fault_status,
            0x0006_0000 => arm.fault_address,
            0x0007_006A | 0x0007_006E => 1 << 30, // test-and-clean / test-clean-invalidate DCache
            other => {
                warn!(insn, key = other, "unknown cp15 MRC selector");
                0
            }
        };

        let rd = (insn >> 12) & 0xF;
        if rd == 15 {
            arm.cpsr_n = value >> 31 & 1 != 0;
            arm.cpsr_z = value >> 30 & 1 != 0;
            arm.cpsr_c = value >> 29 & 1 != 0;
            arm.cpsr_v = value >> 28 & 1 != 0;
        } else {
            arm.reg[rd as usize] = value;
        }
    }

    fn do_cp15_mcr(&self, insn: u32, arm: &mut ArmCoreState, atc: &mut dyn AddressTranslationCache) {
        let rd = (insn >> 12) & 0xF;
        let value = arm.reg[rd as usize];
        let key = insn & 0x00EF_00EF;

        match key {
            0x0001_0000 => {
                let changed = value ^ arm.control;
                arm.control = value;
                if changed & 1 != 0 {
                    atc.flush();
                }
            }
            0x0002_0000 => {
                arm.translation_table_base = value & !0x3FFF;
                atc.flush();
            }
            0x0003_0000 => {
                arm.domain_access_control = value;
                atc.flush();
            }
            0x0005_0000 => arm.data_fault_status = value,
            0x0005_0020 => arm.instruction_fault_status = value,
            0x0006_0000 => arm.fault_address = value,
            0x0007_0080 => {
                // c7,c0,4: wait for interrupt
                arm.cycle_count_delta = 0;
                if arm.interrupts == 0 {
                    arm.reg[15] = arm.reg[15].wrapping_sub(4);
                    arm.cpu_events |= EVENT_WAITING;
                }
            }
            // cache/TLB invalidations: always flush
            0x0008_0005 | 0x0008_0007 | 0x0008_0025 | 0x0008_0027 | 0x0007_0005 | 0x0007_0025
            | 0x0007_0007 => atc.flush(),
            // clean-DCache family: no-op unless Linux support mode is enabled
            0x0008_0006 | 0x0008_0026 | 0x0007_0026 | 0x0007_002A | 0x0007_002E | 0x0007_008A
            | 0x000F_0000 => {
                if self.config.linux_support {
                    atc.flush();
                }
            }
            0x000F_0001 => {} // implementation-defined, unknown, treated as a harmless no-op
            other => warn!(insn, key = other, "unknown cp15 MCR selector"),
        }
    }

    fn execute_cp14(&self, insn: u32, pwrclk: &mut dyn PwrClkCoprocRegXfer) -> Result<(), CopError> {
        let special_instr = (insn >> 28) & 0xF == 0xF;
        let is_read = insn & 0x0010_0000 != 0;
        let opc1 = ((insn >> 21) & 0x07) as u8;
        let rd = ((insn >> 12) & 0x0F) as u8;
        let crn = ((insn >> 16) & 0x0F) as u8;
        let crm = (insn & 0x0F) as u8;
        let opc2 = ((insn >> 5) & 0x07) as u8;

        if pwrclk.coproc_reg_xfer(special_instr, is_read, opc1, rd, crn, crm, opc2) {
            Ok(())
        } else {
            Err(CopError::UndefinedInstruction)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Default)]
    struct FakeAtc {
        flushes: u32,
    }
    impl AddressTranslationCache for FakeAtc {
        fn flush(&mut self) {
            self.flushes += 1;
        }
    }

    struct AlwaysFail;
    impl PwrClkCoprocRegXfer for AlwaysFail {
        fn coproc_reg_xfer(&mut self, _: bool, _: bool, _: u8, _: u8, _: u8, _: u8, _: u8) -> bool {
            false
        }
    }

    struct AlwaysOk;
    impl PwrClkCoprocRegXfer for AlwaysOk {
        fn coproc_reg_xfer(&mut self, _: bool, _: bool, _: u8, _: u8, _: u8, _: u8, _: u8) -> bool {
            true
        }
    }

    fn mrc_insn(crn: u32, opc2: u32, crm: u32, rd: u32) -> u32 {
        // cond = 0xE (always), bit20 set (MRC), coproc 15 field left as 0 (unchecked per spec).
        0xE000_0010 | (1 << 20) | (crn << 16) | (rd << 12) | (opc2 << 5) | (1 << 4) | crm
    }

    fn mcr_insn(crn: u32, opc2: u32, crm: u32, rd: u32) -> u32 {
        0xE000_0010 | (crn << 16) | (rd << 12) | (opc2 << 5) | (1 << 4) | crm
    }

    #[test]
    fn id_code_register_reports_pxa261() {
        let cop = CpuCop::new(CpuCopConfig::default());
        let mut arm = ArmCoreState::default();
        let mut atc = FakeAtc::default();
        cop.execute_coproc_instruction(mrc_insn(0, 0, 0, 1), &mut arm, &mut atc, &mut AlwaysFail)
            .unwrap();
        assert_eq!(arm.reg[1], 0x6905_2D05);
    }

    #[test]
    fn control_register_write_flushes_on_mmu_toggle() {
        let cop = CpuCop::new(CpuCopConfig::default());
        let mut arm = ArmCoreState::default();
        let mut atc = FakeAtc::default();

        arm.reg[2] = 1; // enable MMU
        cop.execute_coproc_instruction(mcr_insn(1, 0, 0, 2), &mut arm, &mut atc, &mut AlwaysFail)
            .unwrap();
        assert_eq!(arm.control, 1);
        assert_eq!(atc.flushes, 1);

        // writing the same value again must not flush (bit 0 unchanged)
        cop.execute_coproc_instruction(mcr_insn(1, 0, 0, 2), &mut arm, &mut atc, &mut AlwaysFail)
            .unwrap();
        assert_eq!(atc.flushes, 1);
    }

    #[test]
    fn ttbr_write_clears_low_bits_and_flushes() {
        let cop = CpuCop::new(CpuCopConfig::default());
        let mut arm = ArmCoreState::default();
        let mut atc = FakeAtc::default();
        arm.reg[3] = 0xDEAD_FFFF;
        cop.execute_coproc_instruction(mcr_insn(2, 0, 0, 3), &mut arm, &mut atc, &mut AlwaysFail)
            .unwrap();
        assert_eq!(arm.translation_table_base, 0xDEAD_FFFF & !0x3FFF);
        assert_eq!(atc.flushes, 1);
    }

    #[test]
    fn wait_for_interrupt_rewinds_pc_when_idle() {
        let cop = CpuCop::new(CpuCopConfig::default());
        let mut arm = ArmCoreState::default();
        arm.reg[15] = 0x1000;
        arm.cycle_count_delta = 42;
        let mut atc = FakeAtc::default();
        cop.execute_coproc_instruction(mcr_insn(7, 4, 0, 0), &mut arm, &mut atc, &mut AlwaysFail)
            .unwrap();
        assert_eq!(arm.reg[15], 0x0FFC);
        assert_eq!(arm.cycle_count_delta, 0);
        assert_eq!(arm.cpu_events & EVENT_WAITING, EVENT_WAITING);
    }

    #[test]
    fn wait_for_interrupt_does_not_rewind_pc_when_interrupt_pending() {
        let cop = CpuCop::new(CpuCopConfig::default());
        let mut arm = ArmCoreState::default();
        arm.reg[15] = 0x1000;
        arm.interrupts = 1;
        let mut atc = FakeAtc::default();
        cop.execute_coproc_instruction(mcr_insn(7, 4, 0, 0), &mut arm, &mut atc, &mut AlwaysFail)
            .unwrap();
        assert_eq!(arm.reg[15], 0x1000);
        assert_eq!(arm.cpu_events & EVENT_WAITING, 0);
    }

    #[test]
    fn clean_dcache_family_is_noop_unless_linux_support_enabled() {
        let mut arm = ArmCoreState::default();
        let mut atc = FakeAtc::default();

        let cop = CpuCop::new(CpuCopConfig { linux_support: false });
        cop.execute_coproc_instruction(mcr_insn(7, 1, 10, 0), &mut arm, &mut atc, &mut AlwaysFail)
            .unwrap();
        assert_eq!(atc.flushes, 0);

        let cop = CpuCop::new(CpuCopConfig { linux_support: true });
        cop.execute_coproc_instruction(mcr_insn(7, 1, 10, 0), &mut arm, &mut atc, &mut AlwaysFail)
            .unwrap();
        assert_eq!(atc.flushes, 1);
    }

    #[test]
    fn mrc_destination_r15_loads_cpsr_flags() {
        let cop = CpuCop::new(CpuCopConfig::default());
        let mut arm = ArmCoreState::default();
        let mut atc = FakeAtc::default();
        // c0,c0,1 -> 0x1D112152, top nibble 0001 -> N=0 Z=0 C=0 V=1
        cop.execute_coproc_instruction(mrc_insn(0, 1, 0, 15), &mut arm, &mut atc, &mut AlwaysFail)
            .unwrap();
        assert!(!arm.cpsr_n);
        assert!(!arm.cpsr_z);
        assert!(!arm.cpsr_c);
        assert!(arm.cpsr_v);
    }

    #[test]
    fn unknown_cp15_selector_is_a_warning_not_a_fault() {
        let cop = CpuCop::new(CpuCopConfig::default());
        let mut arm = ArmCoreState::default();
        let mut atc = FakeAtc::default();
        let result =
            cop.execute_coproc_instruction(mrc_insn(13, 0, 0, 1), &mut arm, &mut atc, &mut AlwaysFail);
        assert!(result.is_ok());
        assert_eq!(arm.reg[1], 0);
    }

    #[test]
    fn cp14_failure_raises_undefined_instruction() {
        let cop = CpuCop::new(CpuCopConfig::default());
        let mut arm = ArmCoreState::default();
        let mut atc = FakeAtc::default();
        let insn = 0xF000_0010u32;
        let result = cop.execute_coproc_instruction(insn, &mut arm, &mut atc, &mut AlwaysFail);
        assert_eq!(result, Err(CopError::UndefinedInstruction));
    }

    #[test]
    fn cp14_success_is_ok() {
        let cop = CpuCop::new(CpuCopConfig::default());
        let mut arm = ArmCoreState::default();
        let mut atc = FakeAtc::default();
        let insn = 0xF000_0010u32;
        let result = cop.execute_coproc_instruction(insn, &mut arm, &mut atc, &mut AlwaysOk);
        assert_eq!(result, Ok(()));
    }
}
