use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Upper bound on the number of memory-controller I/O pads whose
/// configuration is saved into the resume control block. The block's
/// binary layout reserves exactly this many slots.
pub const MAX_PAD_OFFSETS: usize = 33;

#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum SocVariant {
    Imx6q,
    Imx6dl,
    Imx6sl,
}

/// Silicon stepping, e.g. rev 1.2.
#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub struct SiliconRev {
    pub major: u8,
    pub minor: u8,
}

impl SiliconRev {
    pub const fn new(major: u8, minor: u8) -> Self {
        Self { major, minor }
    }
}

impl std::fmt::Display for SiliconRev {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}.{}", self.major, self.minor)
    }
}

/// One addressable hardware register region, keyed by the compatible
/// string the resource locator resolves.
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct RegisterBlock {
    pub compatible: String,
    pub base: u64,
    pub size: String, // e.g. "16KiB"
}

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct SocDescriptor {
    pub name: String,
    pub variant: SocVariant,
    pub revision: SiliconRev,
    #[serde(default)]
    pub pcie: bool,
    pub blocks: Vec<RegisterBlock>,
    /// Override for the memory-controller pad offsets captured into the
    /// resume blob. Defaults to the built-in table for the variant.
    #[serde(default)]
    pub pad_offsets: Option<Vec<u32>>,
}

impl SocDescriptor {
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let f = std::fs::File::open(&path)
            .with_context(|| format!("Failed to open SoC descriptor at {:?}", path.as_ref()))?;
        let desc: Self = serde_yaml::from_reader(f).context("Failed to parse SoC descriptor")?;
        desc.validate()?;
        Ok(desc)
    }

    pub fn validate(&self) -> Result<()> {
        if self.name.trim().is_empty() {
            anyhow::bail!("SoC descriptor 'name' cannot be empty");
        }

        if self.blocks.is_empty() {
            anyhow::bail!("SoC descriptor must declare at least one register block");
        }

        for (i, block) in self.blocks.iter().enumerate() {
            if block.compatible.trim().is_empty() {
                anyhow::bail!("Register block #{} has an empty compatible string", i);
            }
            let size = parse_size(&block.size)
                .with_context(|| format!("Register block '{}'", block.compatible))?;
            if size == 0 {
                anyhow::bail!("Register block '{}' has zero size", block.compatible);
            }
            if self.blocks[..i].iter().any(|b| b.compatible == block.compatible) {
                anyhow::bail!("Duplicate register block '{}'", block.compatible);
            }
        }

        if let Some(offsets) = &self.pad_offsets {
            if offsets.len() > MAX_PAD_OFFSETS {
                anyhow::bail!(
                    "Too many pad offsets: {} (the resume block reserves {} slots)",
                    offsets.len(),
                    MAX_PAD_OFFSETS
                );
            }
            for (i, off) in offsets.iter().enumerate() {
                if offsets[..i].contains(off) {
                    anyhow::bail!("Duplicate pad offset {:#x}", off);
                }
                if off % 4 != 0 {
                    anyhow::bail!("Pad offset {:#x} is not word-aligned", off);
                }
            }
        }

        Ok(())
    }

    pub fn block(&self, compatible: &str) -> Option<&RegisterBlock> {
        self.blocks.iter().find(|b| b.compatible == compatible)
    }

    /// Built-in descriptor for the i.MX6Quad reference map. Used by the
    /// harness when no descriptor file is given.
    pub fn imx6q_default() -> Self {
        let block = |compatible: &str, base: u64, size: &str| RegisterBlock {
            compatible: compatible.to_string(),
            base,
            size: size.to_string(),
        };
        Self {
            name: "imx6q-sabresd".to_string(),
            variant: SocVariant::Imx6q,
            revision: SiliconRev::new(1, 2),
            pcie: false,
            blocks: vec![
                block("mmio-sram", 0x0090_0000, "256KiB"),
                block("arm,pl310-cache", 0x00A0_2000, "4KiB"),
                block("fsl,imx6q-ccm", 0x020C_4000, "16KiB"),
                block("fsl,imx6q-anatop", 0x020C_8000, "4KiB"),
                block("fsl,imx6q-src", 0x020D_8000, "16KiB"),
                block("fsl,imx6q-gpc", 0x020D_C000, "16KiB"),
                block("fsl,imx6q-iomuxc", 0x020E_0000, "16KiB"),
                block("fsl,imx6q-iomuxc-gpr", 0x020E_0000, "16KiB"),
                block("fsl,imx6q-mmdc", 0x021B_0000, "16KiB"),
            ],
            pad_offsets: None,
        }
    }
}

pub fn parse_size(size_str: &str) -> Result<u64> {
    use human_size::{Byte, Size, SpecificSize};
    let s: Size = size_str
        .parse()
        .map_err(|e| anyhow::anyhow!("Invalid size format: {}", e))?;
    let bytes: SpecificSize<Byte> = s.into();
    Ok(bytes.value() as u64)
}
