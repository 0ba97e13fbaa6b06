//! Register offsets and bit-field encodings for the blocks touched
//! during low-power sequencing. Values follow the i.MX6 reference
//! manual; none of them are tunable.

use bitflags::bitflags;

/// CCM control register.
pub const CCR: u64 = 0x0;

bitflags! {
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct Ccr: u32 {
        /// Well-bias counter field (CKIL cycles before power gating).
        const WB_COUNT = 0x7 << 16;
        /// Ringbuffer bypass counter field.
        const RBC_BYPASS_COUNT = 0x3f << 21;
        const RBC_EN = 1 << 27;
    }
}

/// CCM low-power control register.
pub const CLPCR: u64 = 0x54;

/// Bit position of the LPM mode field inside CLPCR.
pub const BP_CLPCR_LPM: u32 = 0;
/// Bit position of the standby counter field inside CLPCR.
pub const BP_CLPCR_STBY_COUNT: u32 = 9;

bitflags! {
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct Clpcr: u32 {
        const LPM = 0x3 << 0;
        const BYPASS_PMIC_READY = 1 << 2;
        const ARM_CLK_DIS_ON_LPM = 1 << 5;
        /// Standby oscillator stop.
        const SBYOS = 1 << 6;
        const DIS_REF_OSC = 1 << 7;
        /// Standby voltage request.
        const VSTBY = 1 << 8;
        const STBY_COUNT = 0x3 << 9;
        const COSC_PWRDOWN = 1 << 11;
        const WB_PER_AT_LPM = 1 << 16;
        const WB_CORE_AT_LPM = 1 << 17;
        const BYP_MMDC_CH0_LPM_HS = 1 << 19;
        const BYP_MMDC_CH1_LPM_HS = 1 << 21;
        const MASK_CORE0_WFI = 1 << 22;
        const MASK_CORE1_WFI = 1 << 23;
        const MASK_CORE2_WFI = 1 << 24;
        const MASK_CORE3_WFI = 1 << 25;
        const MASK_SCU_IDLE = 1 << 26;
        const MASK_L2CC_IDLE = 1 << 27;
    }
}

impl Clpcr {
    /// LPM field encoding for WAIT.
    pub const LPM_WAIT: u32 = 0x1;
    /// LPM field encoding for STOP.
    pub const LPM_STOP: u32 = 0x2;
}

/// CCM general-purpose register.
pub const CGPR: u64 = 0x64;

bitflags! {
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct Cgpr: u32 {
        /// Keep the internal memory clock running in LPM wait.
        const INT_MEM_CLK_LPM = 1 << 17;
    }
}

/// IOMUXC general-purpose register 1, within the iomuxc-gpr block.
pub const IOMUXC_GPR1: u64 = 0x4;

bitflags! {
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct Gpr1: u32 {
        /// Global interrupt force bit; held pending as step 1 of the
        /// ERR007265 workaround.
        const GINT = 1 << 12;
        /// PCIe PHY test power-down, toggled around suspend to work
        /// around the "PCIe does not support L2 power down" erratum.
        const PCIE_TEST_PD = 1 << 18;
    }
}

/// Interrupt line driven by the GINT force bit; unmasked at the power
/// controller around every CLPCR write (ERR007265 step 2/3).
pub const GINT_IRQ: u32 = 32;
