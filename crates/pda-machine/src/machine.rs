use pda_cpu_cop::{AddressTranslationCache, ArmCoreState, CopError, CpuCop, CpuCopConfig, PwrClkCoprocRegXfer};
use pda_display::Sed1376;
use pda_sdcard::{SDCard, SdInfo};
use pda_snapshot::IoSnapshot;
use tracing::debug;

use crate::config::MachineConfig;
use crate::snapshot::MachineSnapshot;

/// Top-level aggregator owning one instance of each peripheral device model. Contains no
/// protocol logic of its own — every method is a thin forward to the owned device, wired up
/// the way a host integration (the bus/frame-loop layer this crate does not implement) would
/// otherwise have to wire them up itself at every call site.
pub struct Machine {
    cpu: CpuCop,
    sd_card: Option<SDCard>,
    sd_info: SdInfo,
    display: Sed1376,
}

impl Machine {
    pub fn new(config: MachineConfig) -> Self {
        Self {
            cpu: CpuCop::new(CpuCopConfig { linux_support: config.linux_support }),
            sd_card: None,
            sd_info: config.default_sd_info,
            display: Sed1376::new(),
        }
    }

    /// Mounts a flash image under a fresh `SDCard`. Pure bookkeeping: no protocol state is
    /// touched beyond what `SDCard::new`/`SDCard::insert_card` themselves do.
    pub fn insert_card(&mut self, data: Vec<u8>, info: SdInfo) {
        self.sd_info = info;
        let mut card = SDCard::new(info);
        card.insert_card(data);
        card.reset();
        debug!("card inserted");
        self.sd_card = Some(card);
    }

    /// Ejects the inserted card, if any, returning its backing flash image.
    pub fn eject_card(&mut self) -> Option<Vec<u8>> {
        debug!("card ejected");
        self.sd_card.as_mut().and_then(|card| card.eject_card())
    }

    pub fn is_card_inserted(&self) -> bool {
        self.sd_card.is_some()
    }

    /// Drives the SD bus one clock at a time: sets chip select, then exchanges one bit. Returns
    /// the card's simultaneous response bit, or `true` (the SPI idle-high line level) when no
    /// card is inserted.
    pub fn tick_sd_bit(&mut self, chip_select: bool, bit: bool) -> bool {
        match self.sd_card.as_mut() {
            Some(card) => {
                card.set_chip_select(chip_select);
                card.exchange_bit(bit)
            }
            None => true,
        }
    }

    /// Forwards a coprocessor instruction to the owned `CpuCop`. `arm`/`atc`/`pwrclk` are
    /// supplied by the caller each time, since the CPU core's own register file and the
    /// translation cache live outside this crate's scope (§1 scope note).
    pub fn dispatch_coproc_instruction(
        &self,
        insn: u32,
        arm: &mut ArmCoreState,
        atc: &mut dyn AddressTranslationCache,
        pwrclk: &mut dyn PwrClkCoprocRegXfer,
    ) -> Result<(), CopError> {
        self.cpu.execute_coproc_instruction(insn, arm, atc, pwrclk)
    }

    /// Forwards to `Sed1376::render`, returning the 160x160 RGB565 framebuffer as a flat
    /// row-major slice.
    pub fn render_frame(&mut self) -> &[u16] {
        self.display.render();
        self.display.framebuffer()
    }

    pub fn display(&self) -> &Sed1376 {
        &self.display
    }

    pub fn display_mut(&mut self) -> &mut Sed1376 {
        &mut self.display
    }

    pub fn save_state(&self) -> MachineSnapshot {
        MachineSnapshot { display: self.display.save_state() }
    }

    pub fn load_state(&mut self, snap: &MachineSnapshot) -> Result<(), pda_snapshot::SnapshotError> {
        self.display.load_state(&snap.display)
    }
}
