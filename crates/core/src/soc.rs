//! Silicon variant data: behavior-flag table consulted in place of
//! inline revision checks, and the per-variant blob data (compatible
//! strings and pad offsets).

pub use powergate_config::{SiliconRev, SocVariant};

use crate::pads::IMX6Q_MMDC_IO_OFFSETS;
use powergate_config::SocDescriptor;

/// Variant discriminators stored into the resume control block.
pub const MXC_CPU_IMX6SL: u32 = 0x60;
pub const MXC_CPU_IMX6DL: u32 = 0x61;
pub const MXC_CPU_IMX6Q: u32 = 0x63;

pub fn cpu_type(variant: SocVariant) -> u32 {
    match variant {
        SocVariant::Imx6q => MXC_CPU_IMX6Q,
        SocVariant::Imx6dl => MXC_CPU_IMX6DL,
        SocVariant::Imx6sl => MXC_CPU_IMX6SL,
    }
}

/// Behavior flags for one (variant, revision-range) combination.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct QuirkFlags {
    /// The CGPR cache-in-wait toggle is safe on this stepping.
    pub cache_lpm_gate: bool,
    /// Memory-controller bypass handshake runs on channel 0.
    pub mmdc_ch0_bypass: bool,
    /// STOP entry must bypass the PMIC-ready handshake.
    pub bypass_pmic_ready: bool,
    /// Secondary cores need re-synchronization after deep-sleep exit.
    pub smp_resync: bool,
}

struct QuirkEntry {
    variant: SocVariant,
    /// Flags apply to this revision and every later one; a later entry
    /// for the same variant supersedes an earlier one.
    min_rev: SiliconRev,
    flags: QuirkFlags,
}

const QUIRK_TABLE: &[QuirkEntry] = &[
    QuirkEntry {
        variant: SocVariant::Imx6q,
        min_rev: SiliconRev::new(1, 0),
        flags: QuirkFlags {
            cache_lpm_gate: false,
            mmdc_ch0_bypass: false,
            bypass_pmic_ready: false,
            smp_resync: true,
        },
    },
    // Cache-in-wait is broken on 6Q up to and including rev 1.1.
    QuirkEntry {
        variant: SocVariant::Imx6q,
        min_rev: SiliconRev::new(1, 2),
        flags: QuirkFlags {
            cache_lpm_gate: true,
            mmdc_ch0_bypass: false,
            bypass_pmic_ready: false,
            smp_resync: true,
        },
    },
    QuirkEntry {
        variant: SocVariant::Imx6dl,
        min_rev: SiliconRev::new(1, 0),
        flags: QuirkFlags {
            cache_lpm_gate: false,
            mmdc_ch0_bypass: false,
            bypass_pmic_ready: false,
            smp_resync: true,
        },
    },
    // Same erratum on 6DL, fixed one stepping earlier.
    QuirkEntry {
        variant: SocVariant::Imx6dl,
        min_rev: SiliconRev::new(1, 1),
        flags: QuirkFlags {
            cache_lpm_gate: true,
            mmdc_ch0_bypass: false,
            bypass_pmic_ready: false,
            smp_resync: true,
        },
    },
    QuirkEntry {
        variant: SocVariant::Imx6sl,
        min_rev: SiliconRev::new(1, 0),
        flags: QuirkFlags {
            cache_lpm_gate: false,
            mmdc_ch0_bypass: true,
            bypass_pmic_ready: true,
            smp_resync: false,
        },
    },
];

/// Look up the behavior flags for a silicon stepping. The table is
/// ordered; the last entry at or below `rev` wins.
pub fn quirks_for(variant: SocVariant, rev: SiliconRev) -> QuirkFlags {
    let mut flags = QuirkFlags::default();
    for entry in QUIRK_TABLE {
        if entry.variant == variant && entry.min_rev <= rev {
            flags = entry.flags;
        }
    }
    flags
}

/// Per-variant data consumed by the resume-blob builder.
pub struct SocData {
    pub cpu_type: u32,
    pub mmdc_compat: &'static str,
    pub src_compat: &'static str,
    pub iomuxc_compat: &'static str,
    pub gpc_compat: &'static str,
    pub l2_compat: &'static str,
    pub pad_offsets: &'static [u32],
}

static IMX6Q_PM_DATA: SocData = SocData {
    cpu_type: MXC_CPU_IMX6Q,
    mmdc_compat: "fsl,imx6q-mmdc",
    src_compat: "fsl,imx6q-src",
    iomuxc_compat: "fsl,imx6q-iomuxc",
    gpc_compat: "fsl,imx6q-gpc",
    l2_compat: "arm,pl310-cache",
    pad_offsets: &IMX6Q_MMDC_IO_OFFSETS,
};

impl SocData {
    /// Blob data exists only for variants whose DDR pad map has been
    /// qualified; the others run deep sleep as plain WFI.
    pub fn for_variant(variant: SocVariant) -> Option<&'static SocData> {
        match variant {
            SocVariant::Imx6q => Some(&IMX6Q_PM_DATA),
            SocVariant::Imx6dl | SocVariant::Imx6sl => None,
        }
    }
}

/// The controller's view of the platform, distilled from a descriptor.
#[derive(Debug, Clone)]
pub struct SocProfile {
    pub variant: SocVariant,
    pub revision: SiliconRev,
    pub pcie: bool,
    /// Overrides the variant's built-in pad table when set.
    pub pad_offsets: Option<Vec<u32>>,
}

impl SocProfile {
    pub fn new(variant: SocVariant, revision: SiliconRev) -> Self {
        Self {
            variant,
            revision,
            pcie: false,
            pad_offsets: None,
        }
    }

    pub fn from_descriptor(desc: &SocDescriptor) -> Self {
        Self {
            variant: desc.variant,
            revision: desc.revision,
            pcie: desc.pcie,
            pad_offsets: desc.pad_offsets.clone(),
        }
    }

    pub fn quirks(&self) -> QuirkFlags {
        quirks_for(self.variant, self.revision)
    }
}
