//! Register protocol layer: the typed read-modify-write sequences over
//! the clock controller's low-power registers. Every bit transition
//! here is mandated by the reference manual or an erratum; the order
//! of writes inside each operation is part of the contract.

use crate::map::HardwareBlock;
use crate::regs::{self, Ccr, Cgpr, Clpcr};
use crate::soc::QuirkFlags;
use crate::{Delay, PmError, PmResult, PowerGate, RegisterBus};

/// Settle time after reprogramming the ringbuffer bypass counter. The
/// counter crosses into the 32 kHz CKIL domain and needs at least two
/// of its cycles (~61 us measured); 65 us adds margin. Fixed by
/// hardware, not tunable.
pub const RBC_SETTLE_US: u32 = 65;

/// Target operating state encoded into the CLPCR mode field.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PowerMode {
    WaitClocked,
    WaitUnclocked,
    StopPowerOn,
    WaitUnclockedPowerOff,
    StopPowerOff,
}

impl PowerMode {
    /// Decode a raw mode number, as used on the harness surface.
    pub fn from_raw(raw: u32) -> PmResult<Self> {
        match raw {
            0 => Ok(Self::WaitClocked),
            1 => Ok(Self::WaitUnclocked),
            2 => Ok(Self::StopPowerOn),
            3 => Ok(Self::WaitUnclockedPowerOff),
            4 => Ok(Self::StopPowerOff),
            _ => Err(PmError::InvalidMode(raw)),
        }
    }
}

/// The clock-controller protocol operations. Holds the CCM mapping and
/// the stepping's behavior flags; the bus and collaborators are passed
/// per call so the coordinator keeps single ownership of them.
#[derive(Debug, Clone, Copy)]
pub struct CcmProtocol {
    ccm: HardwareBlock,
    quirks: QuirkFlags,
}

impl CcmProtocol {
    pub fn new(ccm: HardwareBlock, quirks: QuirkFlags) -> Self {
        Self { ccm, quirks }
    }

    pub fn ccm(&self) -> HardwareBlock {
        self.ccm
    }

    /// Keep the internal memory clock alive while waiting. Only
    /// engaged on steppings where the quirk table says the toggle is
    /// safe; a no-op elsewhere.
    pub fn set_cache_lpm_in_wait(&self, bus: &mut dyn RegisterBus, enable: bool) -> PmResult<()> {
        if !self.quirks.cache_lpm_gate {
            return Ok(());
        }
        let mask = Cgpr::INT_MEM_CLK_LPM.bits();
        bus.update_bits(self.ccm.vbase + regs::CGPR, mask, if enable { mask } else { 0 })
    }

    /// Configure the ringbuffer bypass. All GPC interrupts stay masked
    /// for the whole sequence, including the settle wait.
    pub fn enable_rbc(
        &self,
        bus: &mut dyn RegisterBus,
        gpc: &mut dyn PowerGate,
        delay: &mut dyn Delay,
        enable: bool,
    ) -> PmResult<()> {
        gpc.mask_all();
        let res = self.configure_rbc(bus, delay, enable);
        gpc.restore_all();
        res
    }

    fn configure_rbc(
        &self,
        bus: &mut dyn RegisterBus,
        delay: &mut dyn Delay,
        enable: bool,
    ) -> PmResult<()> {
        let ccr = self.ccm.vbase + regs::CCR;

        let en = Ccr::RBC_EN.bits();
        bus.update_bits(ccr, en, if enable { en } else { 0 })?;

        // The counter field takes a separate write.
        let count = Ccr::RBC_BYPASS_COUNT.bits();
        bus.update_bits(ccr, count, if enable { count } else { 0 })?;

        delay.busy_wait_us(RBC_SETTLE_US);
        Ok(())
    }

    /// Well-bias enable bit (CLPCR) and counter (CCR). The two
    /// registers are independent; no ordering constraint.
    pub fn enable_wb(&self, bus: &mut dyn RegisterBus, enable: bool) -> PmResult<()> {
        let wb = Clpcr::WB_PER_AT_LPM.bits();
        bus.update_bits(self.ccm.vbase + regs::CLPCR, wb, if enable { wb } else { 0 })?;

        let count = Ccr::WB_COUNT.bits();
        bus.update_bits(self.ccm.vbase + regs::CCR, count, if enable { count } else { 0 })
    }

    /// Program the low-power mode field and its per-mode companion
    /// bits.
    ///
    /// ERR007265: with an improper sequence the SoC can latch the
    /// low-power mode from a stray dsm_request before the core reaches
    /// WFI. The workaround brackets every CLPCR write: unmask the
    /// GINT-driven line at the GPC, write, re-mask.
    pub fn set_lpm(
        &self,
        bus: &mut dyn RegisterBus,
        gpc: &mut dyn PowerGate,
        mode: PowerMode,
    ) -> PmResult<()> {
        let addr = self.ccm.vbase + regs::CLPCR;
        let mut val = Clpcr::from_bits_retain(bus.read_u32(addr)?);
        val.remove(Clpcr::LPM);

        match mode {
            PowerMode::WaitClocked => {}
            PowerMode::WaitUnclocked => {
                val = Self::with_lpm(val, Clpcr::LPM_WAIT);
                val.insert(Clpcr::ARM_CLK_DIS_ON_LPM);
                val.remove(Clpcr::VSTBY);
                val.remove(Clpcr::SBYOS);
                if self.quirks.mmdc_ch0_bypass {
                    val.insert(Clpcr::BYP_MMDC_CH0_LPM_HS);
                } else {
                    val.insert(Clpcr::BYP_MMDC_CH1_LPM_HS);
                }
            }
            PowerMode::StopPowerOn => {
                val = Self::with_lpm(val, Clpcr::LPM_STOP);
                val.remove(Clpcr::VSTBY);
                val.remove(Clpcr::SBYOS);
                val.insert(Clpcr::BYP_MMDC_CH1_LPM_HS);
            }
            PowerMode::WaitUnclockedPowerOff => {
                val = Self::with_lpm(val, Clpcr::LPM_WAIT);
                val.remove(Clpcr::VSTBY);
                val.remove(Clpcr::SBYOS);
            }
            PowerMode::StopPowerOff => {
                val = Self::with_lpm(val, Clpcr::LPM_STOP);
                // Maximum standby counter: both field bits set.
                val.insert(Clpcr::STBY_COUNT);
                val.insert(Clpcr::VSTBY);
                val.insert(Clpcr::SBYOS);
                if self.quirks.mmdc_ch0_bypass {
                    val.insert(Clpcr::BYP_MMDC_CH0_LPM_HS);
                } else {
                    val.insert(Clpcr::BYP_MMDC_CH1_LPM_HS);
                }
                if self.quirks.bypass_pmic_ready {
                    val.insert(Clpcr::BYPASS_PMIC_READY);
                }
            }
        }

        gpc.irq_unmask(regs::GINT_IRQ);
        let res = bus.write_u32(addr, val.bits());
        gpc.irq_mask(regs::GINT_IRQ);
        tracing::debug!(?mode, clpcr = format_args!("{:#010x}", val.bits()), "LPM set");
        res
    }

    fn with_lpm(val: Clpcr, encoding: u32) -> Clpcr {
        Clpcr::from_bits_retain(val.bits() | (encoding << regs::BP_CLPCR_LPM))
    }
}
