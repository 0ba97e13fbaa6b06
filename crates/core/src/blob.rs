//! Builder for the self-contained resume blob: the fixed-layout
//! control block plus the relocated resume routine, placed in reserved
//! on-chip memory so the routine can run while the DDR pads float.

use crate::map::{HardwareBlock, MappingSet};
use crate::pads::{PadStateTable, MAX_PAD_OFFSETS};
use crate::soc::SocData;
use crate::{
    CpuHooks, OcramPool, OcramRegion, PmError, PmResult, Region, RegisterBus, ResourceLocator,
};

/// Size of the OCRAM block reserved for the control block and routine.
pub const SUSPEND_OCRAM_SIZE: usize = 0x1000;

// Byte offsets of the serialized control block. The resume routine
// addresses these fields directly; any change here must be mirrored
// there, which is why the layout is spelled out instead of letting a
// struct definition decide it.
pub const OFF_PBASE: usize = 0x00; // u64, physical address of the block itself
pub const OFF_RESUME_ADDR: usize = 0x08; // u64
pub const OFF_CPU_TYPE: usize = 0x10; // u32
pub const OFF_PM_INFO_SIZE: usize = 0x14; // u32
pub const OFF_MMDC: usize = 0x18; // 2 x u64 (pbase, vbase) per block
pub const OFF_SRC: usize = 0x28;
pub const OFF_IOMUXC: usize = 0x38;
pub const OFF_CCM: usize = 0x48;
pub const OFF_GPC: usize = 0x58;
pub const OFF_L2: usize = 0x68;
pub const OFF_MMDC_IO_NUM: usize = 0x78; // u32
pub const OFF_MMDC_IO_VAL: usize = 0x7c; // [MAX_PAD_OFFSETS][2] x u32

/// Serialized size, padded to 8 bytes. The routine's code starts right
/// after.
pub const PM_INFO_SIZE: usize = (OFF_MMDC_IO_VAL + MAX_PAD_OFFSETS * 8 + 7) & !7;

const _: () = {
    assert!(OFF_MMDC + 0x10 == OFF_SRC);
    assert!(OFF_L2 + 0x10 == OFF_MMDC_IO_NUM);
    assert!(OFF_MMDC_IO_NUM + 4 == OFF_MMDC_IO_VAL);
    assert!(PM_INFO_SIZE == 0x188);
    assert!(PM_INFO_SIZE % 8 == 0);
    assert!(PM_INFO_SIZE < SUSPEND_OCRAM_SIZE);
};

/// The control block consumed by the resume routine. Self-contained:
/// physical addresses or addresses valid in the minimal resume
/// environment only.
#[derive(Debug, Clone)]
pub struct ResumeControlBlock {
    pub pbase: u64,
    pub resume_addr: u64,
    pub cpu_type: u32,
    pub mmdc: HardwareBlock,
    pub src: HardwareBlock,
    pub iomuxc: HardwareBlock,
    /// Mapped address only; the routine never needs the CCM's physical
    /// base.
    pub ccm: HardwareBlock,
    pub gpc: HardwareBlock,
    pub l2: HardwareBlock,
    pub pads: PadStateTable,
}

impl ResumeControlBlock {
    /// Write the block, little-endian, at `base`. Unused pad slots are
    /// zeroed.
    pub fn serialize(&self, bus: &mut dyn RegisterBus, base: u64) -> PmResult<()> {
        write_u64(bus, base + OFF_PBASE as u64, self.pbase)?;
        write_u64(bus, base + OFF_RESUME_ADDR as u64, self.resume_addr)?;
        bus.write_u32(base + OFF_CPU_TYPE as u64, self.cpu_type)?;
        bus.write_u32(base + OFF_PM_INFO_SIZE as u64, PM_INFO_SIZE as u32)?;

        write_block(bus, base + OFF_MMDC as u64, self.mmdc)?;
        write_block(bus, base + OFF_SRC as u64, self.src)?;
        write_block(bus, base + OFF_IOMUXC as u64, self.iomuxc)?;
        write_block(bus, base + OFF_CCM as u64, self.ccm)?;
        write_block(bus, base + OFF_GPC as u64, self.gpc)?;
        write_block(bus, base + OFF_L2 as u64, self.l2)?;

        bus.write_u32(base + OFF_MMDC_IO_NUM as u64, self.pads.len() as u32)?;
        for slot in 0..MAX_PAD_OFFSETS {
            let addr = base + (OFF_MMDC_IO_VAL + slot * 8) as u64;
            let (offset, value) = match self.pads.entries().get(slot) {
                Some(entry) => (entry.offset, entry.value),
                None => (0, 0),
            };
            bus.write_u32(addr, offset)?;
            bus.write_u32(addr + 4, value)?;
        }
        Ok(())
    }
}

fn write_u64(bus: &mut dyn RegisterBus, addr: u64, value: u64) -> PmResult<()> {
    bus.write_u32(addr, value as u32)?;
    bus.write_u32(addr + 4, (value >> 32) as u32)
}

fn write_block(bus: &mut dyn RegisterBus, addr: u64, block: HardwareBlock) -> PmResult<()> {
    write_u64(bus, addr, block.pbase)?;
    write_u64(bus, addr + 8, block.vbase)
}

/// The built blob: control block at the region base, routine code at
/// `entry`. Read-only after construction.
#[derive(Debug)]
pub struct ResumeBlob {
    pub region: OcramRegion,
    pub entry: u64,
    pub pm_info: ResumeControlBlock,
    /// Mappings kept alive for the blob's lifetime.
    pub mappings: Vec<Region>,
}

/// Build the resume blob. A locate failure midway releases every
/// mapping established so far, in reverse order, before the error
/// propagates.
pub fn build_blob(
    bus: &mut dyn RegisterBus,
    locator: &mut dyn ResourceLocator,
    pool: &mut dyn OcramPool,
    cpu: &dyn CpuHooks,
    data: &SocData,
    ccm: HardwareBlock,
    pad_override: Option<&[u32]>,
) -> PmResult<ResumeBlob> {
    let region = pool.alloc_exec(SUSPEND_OCRAM_SIZE)?;

    let mut set = MappingSet::new(locator);
    let mmdc = set.locate(data.mmdc_compat)?;
    let src = set.locate(data.src_compat)?;
    let iomuxc = set.locate(data.iomuxc_compat)?;
    let gpc = set.locate(data.gpc_compat)?;
    let l2 = set.locate(data.l2_compat)?;

    let offsets = pad_override.unwrap_or(data.pad_offsets);
    let pads = PadStateTable::capture(bus, iomuxc.vbase, offsets)?;

    let routine = cpu.resume_routine();
    if PM_INFO_SIZE + routine.len() > region.size {
        return Err(PmError::Hardware(format!(
            "resume routine ({} bytes) does not fit the reserved block",
            routine.len()
        )));
    }

    let pm_info = ResumeControlBlock {
        pbase: region.pbase,
        resume_addr: cpu.resume_vector(),
        cpu_type: data.cpu_type,
        mmdc,
        src,
        iomuxc,
        ccm: HardwareBlock {
            pbase: 0,
            vbase: ccm.vbase,
        },
        gpc,
        l2,
        pads,
    };
    pm_info.serialize(bus, region.vbase)?;

    let entry = region.vbase + PM_INFO_SIZE as u64;
    copy_routine(bus, entry, routine)?;

    let mappings = set.commit();
    tracing::info!(
        entry = format_args!("{:#x}", entry),
        routine_len = routine.len(),
        pads = pm_info.pads.len(),
        "resume blob built"
    );

    Ok(ResumeBlob {
        region,
        entry,
        pm_info,
        mappings,
    })
}

fn copy_routine(bus: &mut dyn RegisterBus, base: u64, code: &[u8]) -> PmResult<()> {
    for (i, chunk) in code.chunks(4).enumerate() {
        let mut word = [0u8; 4];
        word[..chunk.len()].copy_from_slice(chunk);
        bus.write_u32(base + (i * 4) as u64, u32::from_le_bytes(word))?;
    }
    Ok(())
}
