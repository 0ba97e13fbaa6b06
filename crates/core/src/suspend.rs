//! Suspend coordinator: the top-level state machine sequencing the
//! clock controller, power gate, analog monitor and CPU delegate
//! through each low-power entry and exit.

use crate::blob::{build_blob, ResumeBlob};
use crate::map::HardwareBlock;
use crate::protocol::{CcmProtocol, PowerMode};
use crate::regs::{self, Gpr1};
use crate::soc::{QuirkFlags, SocData, SocProfile};
use crate::{
    AnalogMonitor, CpuHooks, Delay, OcramPool, PmError, PmResult, PowerGate, RegisterBus,
    ResourceLocator, SuspendPath,
};

/// Externally requestable sleep targets, in increasing depth.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SuspendState {
    Freeze,
    Standby,
    Mem,
    Disk,
}

/// Where the coordinator is in a transition. A failed entry returns to
/// `Idle` without ever reaching `Suspended`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    Idle,
    Entering(SuspendState),
    Suspended,
    Exiting(SuspendState),
}

pub struct SuspendController<B: RegisterBus> {
    bus: B,
    ccm: CcmProtocol,
    /// iomuxc-gpr mapping; absent when the platform lacks the node, in
    /// which case the GINT force and PCIe workaround degrade.
    gpr: Option<HardwareBlock>,
    gpc: Box<dyn PowerGate>,
    anatop: Box<dyn AnalogMonitor>,
    cpu: Box<dyn CpuHooks>,
    delay: Box<dyn Delay>,
    profile: SocProfile,
    quirks: QuirkFlags,
    blob: Option<ResumeBlob>,
    phase: Phase,
}

impl<B: RegisterBus> SuspendController<B> {
    /// Initialize the controller. Never fails: a missing iomuxc-gpr
    /// node or a failed blob build leaves the corresponding feature
    /// degraded (logged) and boot continues.
    ///
    /// The CCM mapping is a constructed dependency: the clock driver
    /// already owns it and hands it in, so it is not looked up here.
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        mut bus: B,
        ccm: HardwareBlock,
        locator: &mut dyn ResourceLocator,
        pool: &mut dyn OcramPool,
        gpc: Box<dyn PowerGate>,
        anatop: Box<dyn AnalogMonitor>,
        cpu: Box<dyn CpuHooks>,
        delay: Box<dyn Delay>,
        profile: SocProfile,
    ) -> Self {
        let quirks = profile.quirks();

        let gpr = match locator.locate("fsl,imx6q-iomuxc-gpr") {
            Ok(region) => Some(HardwareBlock::from(region)),
            Err(e) => {
                tracing::warn!(error = %e, "iomuxc-gpr unavailable, GINT/PCIe workarounds off");
                None
            }
        };

        // ERR007265 step 1: hold the global interrupt force bit
        // pending, so unmasking its GPC line can deassert a stray
        // dsm_request.
        if let Some(gpr) = gpr {
            let gint = Gpr1::GINT.bits();
            if let Err(e) = bus.update_bits(gpr.vbase + regs::IOMUXC_GPR1, gint, gint) {
                tracing::warn!(error = %e, "failed to force GINT pending");
            }
        }

        let blob = match SocData::for_variant(profile.variant) {
            None => {
                tracing::warn!(
                    variant = ?profile.variant,
                    "no qualified blob data, deep sleep falls back to WFI"
                );
                None
            }
            Some(data) => match build_blob(
                &mut bus,
                locator,
                pool,
                cpu.as_ref(),
                data,
                ccm,
                profile.pad_offsets.as_deref(),
            ) {
                Ok(blob) => Some(blob),
                Err(e) => {
                    tracing::warn!(error = %e, "resume blob unavailable, deep sleep falls back to WFI");
                    None
                }
            },
        };

        Self {
            bus,
            ccm: CcmProtocol::new(ccm, quirks),
            gpr,
            gpc,
            anatop,
            cpu,
            delay,
            profile,
            quirks,
            blob,
            phase: Phase::Idle,
        }
    }

    /// Only standby and suspend-to-mem are sequenced by this core.
    pub fn valid(state: SuspendState) -> bool {
        matches!(state, SuspendState::Standby | SuspendState::Mem)
    }

    pub fn phase(&self) -> Phase {
        self.phase
    }

    pub fn has_resume_blob(&self) -> bool {
        self.blob.is_some()
    }

    pub fn blob(&self) -> Option<&ResumeBlob> {
        self.blob.as_ref()
    }

    pub fn bus(&self) -> &B {
        &self.bus
    }

    pub fn bus_mut(&mut self) -> &mut B {
        &mut self.bus
    }

    /// Program the low-power mode directly (exported control surface).
    pub fn set_mode(&mut self, mode: PowerMode) -> PmResult<()> {
        self.ccm.set_lpm(&mut self.bus, self.gpc.as_mut(), mode)
    }

    /// Raw-mode variant used by the harness surface.
    pub fn set_mode_raw(&mut self, raw: u32) -> PmResult<()> {
        let mode = PowerMode::from_raw(raw)?;
        self.set_mode(mode)
    }

    /// Run a full entry/exit cycle for `state`, blocking until the
    /// wake event. Unsupported targets are rejected before any
    /// register write.
    pub fn enter(&mut self, state: SuspendState) -> PmResult<()> {
        if !Self::valid(state) {
            return Err(PmError::UnsupportedState(state));
        }

        self.phase = Phase::Entering(state);
        let res = self.run_entry(state);
        self.phase = Phase::Idle;
        if let Err(e) = &res {
            tracing::warn!(?state, error = %e, "suspend entry failed");
        }
        res
    }

    fn run_entry(&mut self, state: SuspendState) -> PmResult<()> {
        // An L2 exit needs a reset or an inband beacon from the remote
        // end point; toggling PCIe phy_powerdown has the same effect as
        // the beacon, working around "PCIe does not support L2 power
        // down".
        self.pcie_phy_powerdown(true)?;

        let res = match state {
            SuspendState::Standby => self.enter_standby(),
            SuspendState::Mem => self.enter_mem(),
            // valid() gates the other targets before this point.
            SuspendState::Freeze | SuspendState::Disk => {
                return Err(PmError::UnsupportedState(state))
            }
        };

        let restore = self.pcie_phy_powerdown(false);
        res.and(restore)
    }

    fn pcie_phy_powerdown(&mut self, down: bool) -> PmResult<()> {
        if !self.profile.pcie {
            return Ok(());
        }
        let gpr = self
            .gpr
            .ok_or_else(|| PmError::NotFound("fsl,imx6q-iomuxc-gpr".to_string()))?;
        let mask = Gpr1::PCIE_TEST_PD.bits();
        self.bus
            .update_bits(gpr.vbase + regs::IOMUXC_GPR1, mask, if down { mask } else { 0 })
    }

    fn enter_standby(&mut self) -> PmResult<()> {
        self.ccm
            .set_lpm(&mut self.bus, self.gpc.as_mut(), PowerMode::StopPowerOn)?;
        self.ccm.set_cache_lpm_in_wait(&mut self.bus, true)?;
        self.gpc.pre_suspend(false);

        self.phase = Phase::Suspended;
        self.cpu.do_idle();
        self.phase = Phase::Exiting(SuspendState::Standby);

        self.gpc.post_resume();
        self.ccm
            .set_lpm(&mut self.bus, self.gpc.as_mut(), PowerMode::WaitClocked)
    }

    fn enter_mem(&mut self) -> PmResult<()> {
        self.ccm.set_cache_lpm_in_wait(&mut self.bus, false)?;
        self.ccm
            .set_lpm(&mut self.bus, self.gpc.as_mut(), PowerMode::StopPowerOff)?;
        self.ccm.enable_wb(&mut self.bus, true)?;

        // With a blob, its low-level code programs the RBC itself;
        // doing it here as well would double-configure the counter.
        if self.blob.is_none() {
            self.ccm.enable_rbc(
                &mut self.bus,
                self.gpc.as_mut(),
                self.delay.as_mut(),
                true,
            )?;
        }

        self.gpc.pre_suspend(true);
        self.anatop.pre_suspend();

        let resume = self.cpu.resume_vector();
        self.cpu.set_cpu_jump(resume);

        let path = match &self.blob {
            Some(blob) => SuspendPath::OcramBlob { entry: blob.entry },
            None => SuspendPath::DirectIdle,
        };

        self.phase = Phase::Suspended;
        self.cpu.suspend(path)?;
        self.phase = Phase::Exiting(SuspendState::Mem);

        if self.quirks.smp_resync {
            self.cpu.smp_prepare();
        }
        self.anatop.post_resume();
        self.gpc.post_resume();
        self.ccm.enable_wb(&mut self.bus, false)?;
        self.ccm
            .set_lpm(&mut self.bus, self.gpc.as_mut(), PowerMode::WaitClocked)
    }
}
