//! Saved configuration of the memory-controller I/O pads. Deep sleep
//! floats these pins; the resume routine re-drives them from the
//! snapshot captured here at init.

use crate::{PmError, PmResult, RegisterBus};

pub use powergate_config::MAX_PAD_OFFSETS;

/// Pin-mux offsets of the i.MX6Q MMDC I/O pads, in restore order.
pub const IMX6Q_MMDC_IO_OFFSETS: [u32; 33] = [
    0x5ac, 0x5b4, 0x528, 0x520, // DQM0 ~ DQM3
    0x514, 0x510, 0x5bc, 0x5c4, // DQM4 ~ DQM7
    0x56c, 0x578, 0x588, 0x594, // CAS, RAS, SDCLK_0, SDCLK_1
    0x5a8, 0x5b0, 0x524, 0x51c, // SDQS0 ~ SDQS3
    0x518, 0x50c, 0x5b8, 0x5c0, // SDQS4 ~ SDQS7
    0x784, 0x788, 0x794, 0x79c, // GPR_B0DS ~ GPR_B3DS
    0x7a0, 0x7a4, 0x7a8, 0x748, // GPR_B4DS ~ GPR_B7DS
    0x59c, 0x5a0, 0x750, 0x774, // SODT0, SODT1, MODE_CTL, MODE
    0x74c, // GPR_ADDS
];

/// One saved pad configuration value.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PadEntry {
    pub offset: u32,
    pub value: u32,
}

/// Fixed snapshot of the pad configuration, captured once at init and
/// never refreshed; the hardware re-derives live values from it on
/// every resume.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PadStateTable {
    entries: Vec<PadEntry>,
}

impl PadStateTable {
    /// Read every configured offset through the pin-mux mapping.
    pub fn capture(
        bus: &dyn RegisterBus,
        iomuxc_vbase: u64,
        offsets: &[u32],
    ) -> PmResult<Self> {
        if offsets.len() > MAX_PAD_OFFSETS {
            return Err(PmError::Hardware(format!(
                "pad table holds {} offsets, control block reserves {}",
                offsets.len(),
                MAX_PAD_OFFSETS
            )));
        }

        let mut entries = Vec::with_capacity(offsets.len());
        for &offset in offsets {
            let value = bus.read_u32(iomuxc_vbase + offset as u64)?;
            entries.push(PadEntry { offset, value });
        }
        Ok(Self { entries })
    }

    pub fn entries(&self) -> &[PadEntry] {
        &self.entries
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
