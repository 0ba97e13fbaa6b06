//! Resource map: resolves compatible strings to mapped register
//! blocks, with structured rollback for partial initialization.

use crate::{PmResult, Region, ResourceLocator};

/// One addressable register region: physical base plus the address it
/// is mapped at. Created once at init and immutable afterwards.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct HardwareBlock {
    pub pbase: u64,
    pub vbase: u64,
}

impl From<Region> for HardwareBlock {
    fn from(region: Region) -> Self {
        Self {
            pbase: region.pbase,
            vbase: region.vbase,
        }
    }
}

/// Scoped owner of a chain of mappings. If the set is dropped before
/// `commit`, every mapping is released in reverse acquisition order, so
/// a failure halfway through init leaves nothing mapped.
pub struct MappingSet<'a> {
    locator: &'a mut dyn ResourceLocator,
    regions: Vec<Region>,
}

impl<'a> MappingSet<'a> {
    pub fn new(locator: &'a mut dyn ResourceLocator) -> Self {
        Self {
            locator,
            regions: Vec::new(),
        }
    }

    pub fn locate(&mut self, compatible: &str) -> PmResult<HardwareBlock> {
        let region = self.locator.locate(compatible)?;
        tracing::debug!(
            compatible,
            pbase = format_args!("{:#x}", region.pbase),
            "mapped register block"
        );
        self.regions.push(region);
        Ok(region.into())
    }

    /// Hand the mappings over to the caller; nothing is unmapped.
    pub fn commit(mut self) -> Vec<Region> {
        std::mem::take(&mut self.regions)
    }
}

impl Drop for MappingSet<'_> {
    fn drop(&mut self) {
        for region in self.regions.drain(..).rev() {
            tracing::debug!(
                pbase = format_args!("{:#x}", region.pbase),
                "rolling back mapping"
            );
            self.locator.unmap(&region);
        }
    }
}
