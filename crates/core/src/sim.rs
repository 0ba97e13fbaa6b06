//! Simulated SoC: a flat register file at the real physical map plus
//! recording implementations of every platform capability. This is the
//! default backing for the harness binary and the test suite; nothing
//! in here touches real hardware.

use std::collections::{BTreeMap, BTreeSet};
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use anyhow::Context;
use serde::Serialize;

use crate::{
    AnalogMonitor, CpuHooks, Delay, OcramPool, OcramRegion, PmError, PmResult, PowerGate, Region,
    RegisterBus, ResourceLocator, SuspendPath,
};
use powergate_config::{parse_size, SocDescriptor};

/// One entry of the shared hardware-traffic trace. The simulated bus
/// and capabilities all append to the same log, so tests can assert on
/// the interleaved ordering of writes and capability calls.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TraceEvent {
    Write { addr: u64, value: u32 },
    GpcIrqUnmask(u32),
    GpcIrqMask(u32),
    GpcMaskAll,
    GpcRestoreAll,
    GpcPreSuspend { deep: bool },
    GpcPostResume,
    AnatopPreSuspend,
    AnatopPostResume,
    CpuIdle,
    CpuSetJump(u64),
    CpuSuspend(SuspendPath),
    CpuSmpPrepare,
    DelayUs(u32),
}

pub type EventLog = Arc<Mutex<Vec<TraceEvent>>>;

pub fn new_event_log() -> EventLog {
    Arc::new(Mutex::new(Vec::new()))
}

fn log_event(log: &EventLog, event: TraceEvent) {
    log.lock().expect("event log poisoned").push(event);
}

#[derive(Debug)]
struct Window {
    name: String,
    base: u64,
    regs: Vec<u32>,
}

impl Window {
    fn contains(&self, addr: u64) -> bool {
        addr >= self.base && addr < self.base + (self.regs.len() * 4) as u64
    }
}

/// Flat register file covering the descriptor's register blocks.
#[derive(Debug)]
pub struct SimSoc {
    windows: Vec<Window>,
    log: Option<EventLog>,
}

#[derive(Debug, Serialize)]
pub struct WindowSnapshot {
    pub name: String,
    pub base: String,
    /// Non-zero registers only, offset -> value.
    pub regs: BTreeMap<String, String>,
}

#[derive(Debug, Serialize)]
pub struct SocSnapshot {
    pub windows: Vec<WindowSnapshot>,
}

impl SimSoc {
    /// Build the register file from a descriptor. Blocks sharing a
    /// base address (the pin-mux and its GPR view) share storage.
    pub fn from_descriptor(desc: &SocDescriptor) -> anyhow::Result<Self> {
        let mut soc = Self {
            windows: Vec::new(),
            log: None,
        };
        for block in &desc.blocks {
            if soc.windows.iter().any(|w| w.base == block.base) {
                continue;
            }
            let size = parse_size(&block.size)
                .with_context(|| format!("block '{}'", block.compatible))?;
            soc.windows.push(Window {
                name: block.compatible.clone(),
                base: block.base,
                regs: vec![0; (size / 4) as usize],
            });
        }
        soc.seed(desc);
        Ok(soc)
    }

    pub fn set_event_log(&mut self, log: EventLog) {
        self.log = Some(log);
    }

    /// Power-on reset values for the registers the controller touches,
    /// plus a recognizable drive-strength pattern on every pad so the
    /// capture tests see real data.
    fn seed(&mut self, desc: &SocDescriptor) {
        if let Some(ccm) = desc.block("fsl,imx6q-ccm") {
            let base = ccm.base;
            let _ = self.write_u32(base + crate::regs::CCR, 0x0401_16FF);
            let _ = self.write_u32(base + crate::regs::CLPCR, 0x0000_0079);
            let _ = self.write_u32(base + crate::regs::CGPR, 0x0000_FE62);
        }
        if let Some(iomuxc) = desc.block("fsl,imx6q-iomuxc") {
            for &offset in crate::pads::IMX6Q_MMDC_IO_OFFSETS.iter() {
                let _ = self.write_u32(iomuxc.base + offset as u64, 0x0002_0000 | offset);
            }
        }
    }

    fn window(&self, addr: u64) -> Option<&Window> {
        self.windows.iter().find(|w| w.contains(addr))
    }

    pub fn snapshot(&self) -> SocSnapshot {
        SocSnapshot {
            windows: self
                .windows
                .iter()
                .map(|w| WindowSnapshot {
                    name: w.name.clone(),
                    base: format!("{:#x}", w.base),
                    regs: w
                        .regs
                        .iter()
                        .enumerate()
                        .filter(|(_, &v)| v != 0)
                        .map(|(i, &v)| (format!("{:#x}", i * 4), format!("{:#010x}", v)))
                        .collect(),
                })
                .collect(),
        }
    }
}

impl RegisterBus for SimSoc {
    fn read_u32(&self, addr: u64) -> PmResult<u32> {
        if addr % 4 != 0 {
            return Err(PmError::AccessViolation(addr));
        }
        let w = self.window(addr).ok_or(PmError::AccessViolation(addr))?;
        Ok(w.regs[((addr - w.base) / 4) as usize])
    }

    fn write_u32(&mut self, addr: u64, value: u32) -> PmResult<()> {
        if addr % 4 != 0 {
            return Err(PmError::AccessViolation(addr));
        }
        if let Some(log) = &self.log {
            log_event(log, TraceEvent::Write { addr, value });
        }
        let w = self
            .windows
            .iter_mut()
            .find(|w| w.contains(addr))
            .ok_or(PmError::AccessViolation(addr))?;
        w.regs[((addr - w.base) / 4) as usize] = value;
        Ok(())
    }
}

#[derive(Debug, Default)]
pub struct LocatorState {
    pub mapped: Mutex<Vec<(String, Region)>>,
    pub unmapped: Mutex<Vec<Region>>,
}

/// Identity-mapping locator over the descriptor's blocks: the sim has
/// no MMU, so the mapped address equals the physical one.
#[derive(Debug)]
pub struct SimLocator {
    table: Vec<(String, Region)>,
    pub state: Arc<LocatorState>,
}

impl SimLocator {
    pub fn from_descriptor(desc: &SocDescriptor) -> anyhow::Result<Self> {
        let mut table = Vec::new();
        for block in &desc.blocks {
            let size = parse_size(&block.size)
                .with_context(|| format!("block '{}'", block.compatible))?;
            table.push((
                block.compatible.clone(),
                Region {
                    pbase: block.base,
                    vbase: block.base,
                    size,
                },
            ));
        }
        Ok(Self {
            table,
            state: Arc::new(LocatorState::default()),
        })
    }
}

impl ResourceLocator for SimLocator {
    fn locate(&mut self, compatible: &str) -> PmResult<Region> {
        let region = self
            .table
            .iter()
            .find(|(c, _)| c == compatible)
            .map(|(_, r)| *r)
            .ok_or_else(|| PmError::NotFound(compatible.to_string()))?;
        self.state
            .mapped
            .lock()
            .expect("locator state poisoned")
            .push((compatible.to_string(), region));
        Ok(region)
    }

    fn unmap(&mut self, region: &Region) {
        self.state
            .unmapped
            .lock()
            .expect("locator state poisoned")
            .push(*region);
    }
}

/// Bump allocator over the reserved OCRAM window.
#[derive(Debug)]
pub struct SimOcram {
    base: u64,
    size: usize,
    next: usize,
}

impl SimOcram {
    pub fn new(base: u64, size: usize) -> Self {
        Self {
            base,
            size,
            next: 0,
        }
    }

    pub fn from_descriptor(desc: &SocDescriptor) -> anyhow::Result<Self> {
        let sram = desc
            .block("mmio-sram")
            .context("descriptor has no 'mmio-sram' block")?;
        let size = parse_size(&sram.size)?;
        Ok(Self::new(sram.base, size as usize))
    }
}

impl OcramPool for SimOcram {
    fn alloc_exec(&mut self, size: usize) -> PmResult<OcramRegion> {
        if self.next + size > self.size {
            return Err(PmError::OutOfOcram);
        }
        let region = OcramRegion {
            pbase: self.base + self.next as u64,
            vbase: self.base + self.next as u64,
            size,
        };
        self.next += size;
        Ok(region)
    }
}

#[derive(Debug, Default)]
pub struct CpuState {
    pub idles: AtomicUsize,
    pub smp_prepares: AtomicUsize,
    pub jumps: Mutex<Vec<u64>>,
    pub suspends: Mutex<Vec<SuspendPath>>,
}

/// Instant-wake CPU delegate: records the requested path and returns
/// as if the wake event fired immediately.
#[derive(Debug)]
pub struct SimCpu {
    pub state: Arc<CpuState>,
    log: EventLog,
    routine: Vec<u8>,
    resume_vector: u64,
}

impl SimCpu {
    pub fn new(log: EventLog) -> Self {
        Self {
            state: Arc::new(CpuState::default()),
            log,
            routine: placeholder_routine(),
            resume_vector: 0x1000_8000,
        }
    }
}

/// Stand-in for the position-independent low-level routine: ARM NOPs
/// ending in a return.
fn placeholder_routine() -> Vec<u8> {
    let mut code = Vec::with_capacity(64);
    for _ in 0..15 {
        code.extend_from_slice(&0xE1A0_0000u32.to_le_bytes()); // mov r0, r0
    }
    code.extend_from_slice(&0xE12F_FF1Eu32.to_le_bytes()); // bx lr
    code
}

impl CpuHooks for SimCpu {
    fn resume_vector(&self) -> u64 {
        self.resume_vector
    }

    fn resume_routine(&self) -> &[u8] {
        &self.routine
    }

    fn set_cpu_jump(&mut self, resume_phys: u64) {
        self.state
            .jumps
            .lock()
            .expect("cpu state poisoned")
            .push(resume_phys);
        log_event(&self.log, TraceEvent::CpuSetJump(resume_phys));
    }

    fn do_idle(&mut self) {
        self.state.idles.fetch_add(1, Ordering::SeqCst);
        log_event(&self.log, TraceEvent::CpuIdle);
    }

    fn suspend(&mut self, path: SuspendPath) -> PmResult<()> {
        self.state
            .suspends
            .lock()
            .expect("cpu state poisoned")
            .push(path);
        log_event(&self.log, TraceEvent::CpuSuspend(path));
        Ok(())
    }

    fn smp_prepare(&mut self) {
        self.state.smp_prepares.fetch_add(1, Ordering::SeqCst);
        log_event(&self.log, TraceEvent::CpuSmpPrepare);
    }
}

#[derive(Debug)]
pub struct GpcState {
    pub masked: Mutex<BTreeSet<u32>>,
    pub mask_all_count: AtomicUsize,
    pub restore_all_count: AtomicUsize,
    pub pre_suspends: Mutex<Vec<bool>>,
    pub post_resumes: AtomicUsize,
}

impl Default for GpcState {
    fn default() -> Self {
        // The GINT line starts masked, as the real GPC driver leaves it.
        let mut masked = BTreeSet::new();
        masked.insert(crate::regs::GINT_IRQ);
        Self {
            masked: Mutex::new(masked),
            mask_all_count: AtomicUsize::new(0),
            restore_all_count: AtomicUsize::new(0),
            pre_suspends: Mutex::new(Vec::new()),
            post_resumes: AtomicUsize::new(0),
        }
    }
}

#[derive(Debug)]
pub struct SimGpc {
    pub state: Arc<GpcState>,
    log: EventLog,
}

impl SimGpc {
    pub fn new(log: EventLog) -> Self {
        Self {
            state: Arc::new(GpcState::default()),
            log,
        }
    }
}

impl PowerGate for SimGpc {
    fn pre_suspend(&mut self, deep: bool) {
        self.state
            .pre_suspends
            .lock()
            .expect("gpc state poisoned")
            .push(deep);
        log_event(&self.log, TraceEvent::GpcPreSuspend { deep });
    }

    fn post_resume(&mut self) {
        self.state.post_resumes.fetch_add(1, Ordering::SeqCst);
        log_event(&self.log, TraceEvent::GpcPostResume);
    }

    fn mask_all(&mut self) {
        self.state.mask_all_count.fetch_add(1, Ordering::SeqCst);
        log_event(&self.log, TraceEvent::GpcMaskAll);
    }

    fn restore_all(&mut self) {
        self.state.restore_all_count.fetch_add(1, Ordering::SeqCst);
        log_event(&self.log, TraceEvent::GpcRestoreAll);
    }

    fn irq_unmask(&mut self, line: u32) {
        self.state
            .masked
            .lock()
            .expect("gpc state poisoned")
            .remove(&line);
        log_event(&self.log, TraceEvent::GpcIrqUnmask(line));
    }

    fn irq_mask(&mut self, line: u32) {
        self.state
            .masked
            .lock()
            .expect("gpc state poisoned")
            .insert(line);
        log_event(&self.log, TraceEvent::GpcIrqMask(line));
    }
}

#[derive(Debug, Default)]
pub struct AnatopState {
    pub pre_suspends: AtomicUsize,
    pub post_resumes: AtomicUsize,
}

#[derive(Debug)]
pub struct SimAnatop {
    pub state: Arc<AnatopState>,
    log: EventLog,
}

impl SimAnatop {
    pub fn new(log: EventLog) -> Self {
        Self {
            state: Arc::new(AnatopState::default()),
            log,
        }
    }
}

impl AnalogMonitor for SimAnatop {
    fn pre_suspend(&mut self) {
        self.state.pre_suspends.fetch_add(1, Ordering::SeqCst);
        log_event(&self.log, TraceEvent::AnatopPreSuspend);
    }

    fn post_resume(&mut self) {
        self.state.post_resumes.fetch_add(1, Ordering::SeqCst);
        log_event(&self.log, TraceEvent::AnatopPostResume);
    }
}

/// Recording delay: accumulates the requested microseconds instead of
/// spinning, so tests can assert on the simulated clock.
#[derive(Debug)]
pub struct SimDelay {
    pub total_us: Arc<AtomicU64>,
    log: EventLog,
}

impl SimDelay {
    pub fn new(log: EventLog) -> Self {
        Self {
            total_us: Arc::new(AtomicU64::new(0)),
            log,
        }
    }
}

impl Delay for SimDelay {
    fn busy_wait_us(&mut self, us: u32) {
        self.total_us.fetch_add(us as u64, Ordering::SeqCst);
        log_event(&self.log, TraceEvent::DelayUs(us));
    }
}

/// Real spin wait, for harness runs that want wall-clock timing.
#[derive(Debug, Default)]
pub struct SpinDelay;

impl Delay for SpinDelay {
    fn busy_wait_us(&mut self, us: u32) {
        let deadline = Instant::now() + Duration::from_micros(us as u64);
        while Instant::now() < deadline {
            std::hint::spin_loop();
        }
    }
}
