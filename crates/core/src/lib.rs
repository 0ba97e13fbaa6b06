pub mod blob;
pub mod map;
pub mod pads;
pub mod protocol;
pub mod regs;
pub mod sim;
pub mod soc;
pub mod suspend;

mod tests;

#[derive(Debug, thiserror::Error)]
pub enum PmError {
    #[error("no hardware description matches '{0}'")]
    NotFound(String),
    #[error("failed to map register block at {0:#x}")]
    MapFailed(u64),
    #[error("suspend OCRAM pool exhausted")]
    OutOfOcram,
    #[error("invalid low-power mode value {0}")]
    InvalidMode(u32),
    #[error("unsupported suspend target {0:?}")]
    UnsupportedState(suspend::SuspendState),
    #[error("register access violation at {0:#x}")]
    AccessViolation(u64),
    #[error("hardware fault: {0}")]
    Hardware(String),
}

pub type PmResult<T> = Result<T, PmError>;

/// A mapped register region as handed out by the resource locator:
/// physical base, the address it is reachable at, and its extent.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Region {
    pub pbase: u64,
    pub vbase: u64,
    pub size: u64,
}

/// A block carved out of the on-chip zero-wait-state memory pool,
/// mapped executable.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct OcramRegion {
    pub pbase: u64,
    pub vbase: u64,
    pub size: usize,
}

/// How the CPU-suspend delegate reaches its wait state once the
/// controller has finished sequencing the hardware.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SuspendPath {
    /// Plain wait-for-interrupt; DDR I/O stays driven.
    DirectIdle,
    /// Jump into the pre-built OCRAM blob, which floats the DDR pads
    /// itself. The delegate must flush address-translation caches
    /// before taking the jump.
    OcramBlob { entry: u64 },
}

/// Word-wide access to the register space. Every power-management
/// register on this class of SoC is a 32-bit word.
pub trait RegisterBus {
    fn read_u32(&self, addr: u64) -> PmResult<u32>;
    fn write_u32(&mut self, addr: u64, value: u32) -> PmResult<()>;

    /// Read-modify-write of the bits selected by `mask`.
    fn update_bits(&mut self, addr: u64, mask: u32, value: u32) -> PmResult<()> {
        let cur = self.read_u32(addr)?;
        self.write_u32(addr, (cur & !mask) | (value & mask))
    }
}

/// Hardware-description lookup; the injected stand-in for device-tree
/// discovery and mapping. Mappings are long-lived; the caller owns
/// unmapping on rollback.
pub trait ResourceLocator {
    fn locate(&mut self, compatible: &str) -> PmResult<Region>;
    fn unmap(&mut self, region: &Region);
}

/// Allocator over the reserved on-chip memory region.
pub trait OcramPool {
    fn alloc_exec(&mut self, size: usize) -> PmResult<OcramRegion>;
}

/// Architecture-level hooks around the suspension point. Saving and
/// restoring CPU register context across `suspend` is the
/// implementation's job; the call returns after the wake event.
pub trait CpuHooks {
    /// Physical address of the architecture resume entry point.
    fn resume_vector(&self) -> u64;
    /// Position-independent resume routine copied into OCRAM after the
    /// control block.
    fn resume_routine(&self) -> &[u8];
    /// Record where the waking CPU should jump.
    fn set_cpu_jump(&mut self, resume_phys: u64);
    /// Wait-for-interrupt without losing power to the core.
    fn do_idle(&mut self);
    /// Full context save, then halt via the given path. Blocks until a
    /// wake event.
    fn suspend(&mut self, path: SuspendPath) -> PmResult<()>;
    /// Re-synchronize secondary cores after a deep-sleep exit.
    fn smp_prepare(&mut self);
}

/// Notification and interrupt-mask surface of the power-gating
/// controller (GPC).
pub trait PowerGate {
    fn pre_suspend(&mut self, deep: bool);
    fn post_resume(&mut self);
    fn mask_all(&mut self);
    fn restore_all(&mut self);
    fn irq_unmask(&mut self, line: u32);
    fn irq_mask(&mut self, line: u32);
}

/// Analog/regulator monitor notifications around deep sleep.
pub trait AnalogMonitor {
    fn pre_suspend(&mut self);
    fn post_resume(&mut self);
}

/// Fixed real-time delays. Must spin: the only caller runs with
/// interrupts masked at the power controller.
pub trait Delay {
    fn busy_wait_us(&mut self, us: u32);
}
