#[cfg(test)]
mod tests {
    use crate::blob::{self, build_blob};
    use crate::map::HardwareBlock;
    use crate::protocol::{CcmProtocol, PowerMode};
    use crate::regs::{self, Ccr, Cgpr, Clpcr, Gpr1};
    use crate::sim::{
        new_event_log, AnatopState, CpuState, EventLog, GpcState, LocatorState, SimAnatop,
        SimCpu, SimDelay, SimGpc, SimLocator, SimOcram, SimSoc, TraceEvent,
    };
    use crate::soc::{quirks_for, SiliconRev, SocData, SocProfile, SocVariant};
    use crate::suspend::{Phase, SuspendController, SuspendState};
    use crate::{PmError, PmResult, Region, RegisterBus, ResourceLocator, SuspendPath};
    use powergate_config::SocDescriptor;
    use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
    use std::sync::Arc;

    const CCM_BASE: u64 = 0x020C_4000;
    const IOMUXC_BASE: u64 = 0x020E_0000;
    const CLPCR_ADDR: u64 = CCM_BASE + regs::CLPCR;
    const CCR_ADDR: u64 = CCM_BASE + regs::CCR;
    const CGPR_ADDR: u64 = CCM_BASE + regs::CGPR;
    const GPR1_ADDR: u64 = IOMUXC_BASE + regs::IOMUXC_GPR1;

    /// Register file wrapper counting every write reaching hardware.
    struct CountingBus {
        inner: SimSoc,
        writes: Arc<AtomicUsize>,
    }

    impl CountingBus {
        fn new(inner: SimSoc) -> Self {
            Self {
                inner,
                writes: Arc::new(AtomicUsize::new(0)),
            }
        }
    }

    impl RegisterBus for CountingBus {
        fn read_u32(&self, addr: u64) -> PmResult<u32> {
            self.inner.read_u32(addr)
        }

        fn write_u32(&mut self, addr: u64, value: u32) -> PmResult<()> {
            self.writes.fetch_add(1, Ordering::SeqCst);
            self.inner.write_u32(addr, value)
        }
    }

    /// Locator that fails on one specific compatible string, for the
    /// partial-init rollback tests.
    struct FailingLocator {
        inner: SimLocator,
        fail_on: &'static str,
    }

    impl ResourceLocator for FailingLocator {
        fn locate(&mut self, compatible: &str) -> PmResult<Region> {
            if compatible == self.fail_on {
                return Err(PmError::MapFailed(0));
            }
            self.inner.locate(compatible)
        }

        fn unmap(&mut self, region: &Region) {
            self.inner.unmap(region)
        }
    }

    struct Harness {
        controller: SuspendController<CountingBus>,
        log: EventLog,
        gpc: Arc<GpcState>,
        cpu: Arc<CpuState>,
        anatop: Arc<AnatopState>,
        delay_us: Arc<AtomicU64>,
        locator: Arc<LocatorState>,
        writes: Arc<AtomicUsize>,
    }

    fn build_harness(desc: &SocDescriptor, fail_on: Option<&'static str>) -> Harness {
        let log = new_event_log();
        let mut soc = SimSoc::from_descriptor(desc).unwrap();
        soc.set_event_log(log.clone());
        let bus = CountingBus::new(soc);
        let writes = bus.writes.clone();

        let sim_locator = SimLocator::from_descriptor(desc).unwrap();
        let locator_state = sim_locator.state.clone();
        let mut ocram = SimOcram::from_descriptor(desc).unwrap();

        let gpc = SimGpc::new(log.clone());
        let gpc_state = gpc.state.clone();
        let anatop = SimAnatop::new(log.clone());
        let anatop_state = anatop.state.clone();
        let cpu = SimCpu::new(log.clone());
        let cpu_state = cpu.state.clone();
        let delay = SimDelay::new(log.clone());
        let delay_us = delay.total_us.clone();

        let ccm = HardwareBlock {
            pbase: CCM_BASE,
            vbase: CCM_BASE,
        };
        let profile = SocProfile::from_descriptor(desc);

        let controller = match fail_on {
            None => {
                let mut locator = sim_locator;
                SuspendController::new(
                    bus,
                    ccm,
                    &mut locator,
                    &mut ocram,
                    Box::new(gpc),
                    Box::new(anatop),
                    Box::new(cpu),
                    Box::new(delay),
                    profile,
                )
            }
            Some(compat) => {
                let mut locator = FailingLocator {
                    inner: sim_locator,
                    fail_on: compat,
                };
                SuspendController::new(
                    bus,
                    ccm,
                    &mut locator,
                    &mut ocram,
                    Box::new(gpc),
                    Box::new(anatop),
                    Box::new(cpu),
                    Box::new(delay),
                    profile,
                )
            }
        };

        Harness {
            controller,
            log,
            gpc: gpc_state,
            cpu: cpu_state,
            anatop: anatop_state,
            delay_us,
            locator: locator_state,
            writes,
        }
    }

    fn harness() -> Harness {
        build_harness(&SocDescriptor::imx6q_default(), None)
    }

    fn clpcr(h: &Harness) -> Clpcr {
        Clpcr::from_bits_retain(h.controller.bus().read_u32(CLPCR_ADDR).unwrap())
    }

    #[test]
    fn test_lpm_mode_encodings() {
        let mut h = harness();

        // Marker bits outside every mode's mask must survive each
        // transition untouched.
        let marker = Clpcr::MASK_L2CC_IDLE | Clpcr::MASK_CORE0_WFI;

        let cases: [(PowerMode, u32, Clpcr, Clpcr); 4] = [
            (PowerMode::WaitClocked, 0, Clpcr::empty(), Clpcr::empty()),
            (
                PowerMode::WaitUnclocked,
                1,
                Clpcr::ARM_CLK_DIS_ON_LPM | Clpcr::BYP_MMDC_CH1_LPM_HS,
                Clpcr::VSTBY | Clpcr::SBYOS,
            ),
            (
                PowerMode::StopPowerOn,
                2,
                Clpcr::BYP_MMDC_CH1_LPM_HS,
                Clpcr::VSTBY | Clpcr::SBYOS,
            ),
            (
                PowerMode::WaitUnclockedPowerOff,
                1,
                Clpcr::empty(),
                Clpcr::VSTBY | Clpcr::SBYOS,
            ),
        ];

        for (mode, lpm, set, cleared) in cases {
            h.controller
                .bus_mut()
                .write_u32(CLPCR_ADDR, marker.bits())
                .unwrap();
            h.controller.set_mode(mode).unwrap();

            let val = clpcr(&h);
            assert_eq!(val.bits() & Clpcr::LPM.bits(), lpm, "{:?}", mode);
            assert!(val.contains(set), "{:?}: missing {:?}", mode, set);
            assert!(!val.intersects(cleared), "{:?}: stray {:?}", mode, cleared);
            assert!(val.contains(marker), "{:?}: marker clobbered", mode);
        }

        // Deep stop: both standby-count bits, voltage standby and
        // oscillator stop all on.
        h.controller
            .bus_mut()
            .write_u32(CLPCR_ADDR, marker.bits())
            .unwrap();
        h.controller.set_mode(PowerMode::StopPowerOff).unwrap();
        let val = clpcr(&h);
        assert_eq!(val.bits() & Clpcr::LPM.bits(), 2);
        assert!(val.contains(Clpcr::STBY_COUNT));
        assert!(val.contains(Clpcr::VSTBY | Clpcr::SBYOS | Clpcr::BYP_MMDC_CH1_LPM_HS));
        assert!(!val.contains(Clpcr::BYPASS_PMIC_READY));
        assert!(val.contains(marker));
    }

    #[test]
    fn test_lpm_mode_encodings_imx6sl() {
        let mut desc = SocDescriptor::imx6q_default();
        desc.variant = SocVariant::Imx6sl;
        desc.revision = SiliconRev::new(1, 0);
        let mut h = build_harness(&desc, None);

        h.controller.set_mode(PowerMode::WaitUnclocked).unwrap();
        let val = clpcr(&h);
        assert!(val.contains(Clpcr::BYP_MMDC_CH0_LPM_HS));
        assert!(!val.contains(Clpcr::BYP_MMDC_CH1_LPM_HS));

        h.controller.set_mode(PowerMode::StopPowerOff).unwrap();
        let val = clpcr(&h);
        assert!(val.contains(Clpcr::BYP_MMDC_CH0_LPM_HS | Clpcr::BYPASS_PMIC_READY));
    }

    #[test]
    fn test_raw_mode_rejects_out_of_range() {
        let mut h = harness();
        let before = h.writes.load(Ordering::SeqCst);
        let err = h.controller.set_mode_raw(7).unwrap_err();
        assert!(matches!(err, PmError::InvalidMode(7)));
        assert_eq!(h.writes.load(Ordering::SeqCst), before);

        h.controller.set_mode_raw(2).unwrap();
        assert_eq!(clpcr(&h).bits() & Clpcr::LPM.bits(), 2);
    }

    #[test]
    fn test_standby_cycle_restores_run_mode() {
        let mut h = harness();
        h.controller.enter(SuspendState::Standby).unwrap();

        assert_eq!(h.controller.phase(), Phase::Idle);
        assert_eq!(clpcr(&h).bits() & Clpcr::LPM.bits(), 0);
        assert_eq!(h.cpu.idles.load(Ordering::SeqCst), 1);
        assert_eq!(*h.gpc.pre_suspends.lock().unwrap(), vec![false]);
        assert_eq!(h.gpc.post_resumes.load(Ordering::SeqCst), 1);

        // Rev 1.2 silicon keeps the internal memory clock alive in
        // wait; the entry turned the toggle on.
        let cgpr = h.controller.bus().read_u32(CGPR_ADDR).unwrap();
        assert_ne!(cgpr & Cgpr::INT_MEM_CLK_LPM.bits(), 0);
    }

    #[test]
    fn test_cache_lpm_toggle_gated_by_stepping() {
        let mut desc = SocDescriptor::imx6q_default();
        desc.revision = SiliconRev::new(1, 1);
        let mut h = build_harness(&desc, None);

        let cgpr_before = h.controller.bus().read_u32(CGPR_ADDR).unwrap();
        h.controller.enter(SuspendState::Standby).unwrap();
        let cgpr_after = h.controller.bus().read_u32(CGPR_ADDR).unwrap();
        assert_eq!(cgpr_before, cgpr_after);
    }

    #[test]
    fn test_unsupported_target_writes_nothing() {
        let mut h = harness();
        let before = h.writes.load(Ordering::SeqCst);

        for state in [SuspendState::Freeze, SuspendState::Disk] {
            let err = h.controller.enter(state).unwrap_err();
            assert!(matches!(err, PmError::UnsupportedState(s) if s == state));
            assert!(!SuspendController::<CountingBus>::valid(state));
        }

        assert_eq!(h.writes.load(Ordering::SeqCst), before);
        assert_eq!(h.controller.phase(), Phase::Idle);
        assert_eq!(h.cpu.idles.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn test_errata_wrap_order_and_net_neutral_mask() {
        let mut h = harness();
        let modes = [
            PowerMode::WaitClocked,
            PowerMode::WaitUnclocked,
            PowerMode::StopPowerOn,
            PowerMode::WaitUnclockedPowerOff,
            PowerMode::StopPowerOff,
        ];

        let start = h.log.lock().unwrap().len();
        for i in 0..100 {
            let masked_before = h.gpc.masked.lock().unwrap().contains(&regs::GINT_IRQ);
            h.controller.set_mode(modes[i % modes.len()]).unwrap();
            let masked_after = h.gpc.masked.lock().unwrap().contains(&regs::GINT_IRQ);
            assert_eq!(masked_before, masked_after, "call {}", i);
        }

        let log = h.log.lock().unwrap();
        let tail = &log[start..];
        assert_eq!(tail.len(), 300);
        for (i, call) in tail.chunks_exact(3).enumerate() {
            assert_eq!(call[0], TraceEvent::GpcIrqUnmask(regs::GINT_IRQ), "call {}", i);
            assert!(
                matches!(call[1], TraceEvent::Write { addr, .. } if addr == CLPCR_ADDR),
                "call {}: expected CLPCR write, got {:?}",
                i,
                call[1]
            );
            assert_eq!(call[2], TraceEvent::GpcIrqMask(regs::GINT_IRQ), "call {}", i);
        }
    }

    #[test]
    fn test_gint_forced_pending_at_init() {
        let h = harness();
        let gpr1 = h.controller.bus().read_u32(GPR1_ADDR).unwrap();
        assert_ne!(gpr1 & Gpr1::GINT.bits(), 0);
    }

    fn blob_fixture() -> (SimSoc, SimLocator, SimOcram, SimCpu) {
        let desc = SocDescriptor::imx6q_default();
        let log = new_event_log();
        (
            SimSoc::from_descriptor(&desc).unwrap(),
            SimLocator::from_descriptor(&desc).unwrap(),
            SimOcram::from_descriptor(&desc).unwrap(),
            SimCpu::new(log),
        )
    }

    #[test]
    fn test_blob_pad_capture_bounded_unique_idempotent() {
        let (mut soc, mut locator, mut ocram, cpu) = blob_fixture();
        let data = SocData::for_variant(SocVariant::Imx6q).unwrap();
        let ccm = HardwareBlock {
            pbase: CCM_BASE,
            vbase: CCM_BASE,
        };

        let first = build_blob(&mut soc, &mut locator, &mut ocram, &cpu, data, ccm, None).unwrap();
        assert_eq!(first.pm_info.pads.len(), 33);

        let mut offsets: Vec<u32> = first.pm_info.pads.entries().iter().map(|e| e.offset).collect();
        offsets.sort_unstable();
        offsets.dedup();
        assert_eq!(offsets.len(), 33, "pad offsets must be unique");

        // Unchanged register file: a rebuild captures identical values.
        let second = build_blob(&mut soc, &mut locator, &mut ocram, &cpu, data, ccm, None).unwrap();
        assert_eq!(first.pm_info.pads, second.pm_info.pads);
        assert_ne!(first.region.pbase, second.region.pbase);
    }

    #[test]
    fn test_blob_serialized_layout() {
        let (mut soc, mut locator, mut ocram, cpu) = blob_fixture();
        let data = SocData::for_variant(SocVariant::Imx6q).unwrap();
        let ccm = HardwareBlock {
            pbase: CCM_BASE,
            vbase: CCM_BASE,
        };

        let built = build_blob(&mut soc, &mut locator, &mut ocram, &cpu, data, ccm, None).unwrap();
        let base = built.region.vbase;

        let read = |off: usize| soc.read_u32(base + off as u64).unwrap();
        assert_eq!(read(blob::OFF_PBASE), built.region.pbase as u32);
        assert_eq!(read(blob::OFF_PM_INFO_SIZE), blob::PM_INFO_SIZE as u32);
        assert_eq!(read(blob::OFF_CPU_TYPE), crate::soc::MXC_CPU_IMX6Q);
        assert_eq!(read(blob::OFF_MMDC_IO_NUM), 33);
        // First pad slot carries the first configured offset.
        assert_eq!(read(blob::OFF_MMDC_IO_VAL), 0x5ac);
        // The routine is relocated directly after the control block.
        assert_eq!(built.entry, base + blob::PM_INFO_SIZE as u64);
        assert_eq!(soc.read_u32(built.entry).unwrap(), 0xE1A0_0000);
    }

    #[test]
    fn test_rbc_sequence_timing_and_disable() {
        let desc = SocDescriptor::imx6q_default();
        let log = new_event_log();
        let mut soc = SimSoc::from_descriptor(&desc).unwrap();
        soc.set_event_log(log.clone());
        let mut gpc = SimGpc::new(log.clone());
        let mut delay = SimDelay::new(log.clone());
        let total_us = delay.total_us.clone();

        let ccm = CcmProtocol::new(
            HardwareBlock {
                pbase: CCM_BASE,
                vbase: CCM_BASE,
            },
            quirks_for(SocVariant::Imx6q, SiliconRev::new(1, 2)),
        );

        let start = log.lock().unwrap().len();
        ccm.enable_rbc(&mut soc, &mut gpc, &mut delay, true).unwrap();

        // The slow-oscillator crossing needs at least 61 us; anything
        // shorter is a sequencing bug.
        assert!(total_us.load(Ordering::SeqCst) >= 61);

        let ccr = soc.read_u32(CCR_ADDR).unwrap();
        assert_ne!(ccr & Ccr::RBC_EN.bits(), 0);
        assert_eq!(ccr & Ccr::RBC_BYPASS_COUNT.bits(), Ccr::RBC_BYPASS_COUNT.bits());

        {
            let log = log.lock().unwrap();
            let tail = &log[start..];
            assert_eq!(tail[0], TraceEvent::GpcMaskAll);
            assert!(matches!(tail[1], TraceEvent::Write { addr, .. } if addr == CCR_ADDR));
            assert!(matches!(tail[2], TraceEvent::Write { addr, .. } if addr == CCR_ADDR));
            assert_eq!(tail[3], TraceEvent::DelayUs(crate::protocol::RBC_SETTLE_US));
            assert_eq!(tail[4], TraceEvent::GpcRestoreAll);
        }

        ccm.enable_rbc(&mut soc, &mut gpc, &mut delay, false).unwrap();
        let ccr = soc.read_u32(CCR_ADDR).unwrap();
        assert_eq!(ccr & Ccr::RBC_EN.bits(), 0);
        assert_eq!(ccr & Ccr::RBC_BYPASS_COUNT.bits(), 0);
    }

    #[test]
    fn test_well_bias_touches_both_registers() {
        let desc = SocDescriptor::imx6q_default();
        let mut soc = SimSoc::from_descriptor(&desc).unwrap();
        let ccm = CcmProtocol::new(
            HardwareBlock {
                pbase: CCM_BASE,
                vbase: CCM_BASE,
            },
            quirks_for(SocVariant::Imx6q, SiliconRev::new(1, 2)),
        );

        ccm.enable_wb(&mut soc, true).unwrap();
        assert_ne!(
            soc.read_u32(CLPCR_ADDR).unwrap() & Clpcr::WB_PER_AT_LPM.bits(),
            0
        );
        assert_eq!(
            soc.read_u32(CCR_ADDR).unwrap() & Ccr::WB_COUNT.bits(),
            Ccr::WB_COUNT.bits()
        );

        ccm.enable_wb(&mut soc, false).unwrap();
        assert_eq!(
            soc.read_u32(CLPCR_ADDR).unwrap() & Clpcr::WB_PER_AT_LPM.bits(),
            0
        );
        assert_eq!(soc.read_u32(CCR_ADDR).unwrap() & Ccr::WB_COUNT.bits(), 0);
    }

    #[test]
    fn test_mem_cycle_uses_blob_and_restores_run_mode() {
        let mut h = harness();
        assert!(h.controller.has_resume_blob());
        let entry = h.controller.blob().unwrap().entry;

        h.controller.enter(SuspendState::Mem).unwrap();

        assert_eq!(h.controller.phase(), Phase::Idle);
        assert_eq!(
            *h.cpu.suspends.lock().unwrap(),
            vec![SuspendPath::OcramBlob { entry }]
        );
        assert_eq!(*h.cpu.jumps.lock().unwrap(), vec![0x1000_8000]);
        assert_eq!(h.cpu.smp_prepares.load(Ordering::SeqCst), 1);
        assert_eq!(*h.gpc.pre_suspends.lock().unwrap(), vec![true]);
        assert_eq!(h.anatop.pre_suspends.load(Ordering::SeqCst), 1);
        assert_eq!(h.anatop.post_resumes.load(Ordering::SeqCst), 1);

        // The blob's own code programs the RBC; the coordinator must
        // not have burned the settle delay here.
        assert_eq!(h.delay_us.load(Ordering::SeqCst), 0);

        let val = clpcr(&h);
        assert_eq!(val.bits() & Clpcr::LPM.bits(), 0);
        assert!(!val.contains(Clpcr::WB_PER_AT_LPM));
        assert_eq!(
            h.controller.bus().read_u32(CCR_ADDR).unwrap() & Ccr::WB_COUNT.bits(),
            0
        );
    }

    #[test]
    fn test_pcie_workaround_brackets_suspend() {
        let mut desc = SocDescriptor::imx6q_default();
        desc.pcie = true;
        let mut h = build_harness(&desc, None);

        let start = h.log.lock().unwrap().len();
        h.controller.enter(SuspendState::Mem).unwrap();

        let log = h.log.lock().unwrap();
        let tail = &log[start..];
        let pd_set = tail
            .iter()
            .position(|e| {
                matches!(e, TraceEvent::Write { addr, value }
                    if *addr == GPR1_ADDR && value & Gpr1::PCIE_TEST_PD.bits() != 0)
            })
            .expect("phy_powerdown never asserted");
        let suspend = tail
            .iter()
            .position(|e| matches!(e, TraceEvent::CpuSuspend(_)))
            .expect("no suspend event");
        let pd_clear = tail
            .iter()
            .rposition(|e| {
                matches!(e, TraceEvent::Write { addr, value }
                    if *addr == GPR1_ADDR && value & Gpr1::PCIE_TEST_PD.bits() == 0)
            })
            .expect("phy_powerdown never restored");
        assert!(pd_set < suspend && suspend < pd_clear);
        drop(log);

        let gpr1 = h.controller.bus().read_u32(GPR1_ADDR).unwrap();
        assert_eq!(gpr1 & Gpr1::PCIE_TEST_PD.bits(), 0);
    }

    #[test]
    fn test_pcie_workaround_skipped_when_disabled() {
        let mut h = harness();
        h.controller.enter(SuspendState::Mem).unwrap();
        h.controller.enter(SuspendState::Standby).unwrap();

        let log = h.log.lock().unwrap();
        for event in log.iter() {
            if let TraceEvent::Write { addr, value } = event {
                if *addr == GPR1_ADDR {
                    assert_eq!(value & Gpr1::PCIE_TEST_PD.bits(), 0);
                }
            }
        }
    }

    #[test]
    fn test_partial_init_rolls_back_and_falls_back_to_wfi() {
        // Third blob lookup (the pin mux) fails; the two mappings made
        // before it must be released, newest first.
        let mut h = build_harness(&SocDescriptor::imx6q_default(), Some("fsl,imx6q-iomuxc"));
        assert!(!h.controller.has_resume_blob());

        {
            let unmapped = h.locator.unmapped.lock().unwrap();
            assert_eq!(unmapped.len(), 2);
            assert_eq!(unmapped[0].pbase, 0x020D_8000, "src released first");
            assert_eq!(unmapped[1].pbase, 0x021B_0000, "mmdc released last");
        }

        h.controller.enter(SuspendState::Mem).unwrap();
        assert_eq!(
            *h.cpu.suspends.lock().unwrap(),
            vec![SuspendPath::DirectIdle]
        );
        // Without a blob the coordinator owns the RBC setup, settle
        // wait included.
        assert!(h.delay_us.load(Ordering::SeqCst) >= 61);
        assert_eq!(clpcr(&h).bits() & Clpcr::LPM.bits(), 0);
    }

    #[test]
    fn test_ocram_exhaustion_degrades_to_wfi() {
        let mut desc = SocDescriptor::imx6q_default();
        for block in &mut desc.blocks {
            if block.compatible == "mmio-sram" {
                block.size = "2KiB".to_string(); // smaller than one blob
            }
        }
        let mut h = build_harness(&desc, None);
        assert!(!h.controller.has_resume_blob());
        h.controller.enter(SuspendState::Mem).unwrap();
        assert_eq!(
            *h.cpu.suspends.lock().unwrap(),
            vec![SuspendPath::DirectIdle]
        );
    }

    #[test]
    fn test_no_blob_data_for_imx6dl() {
        let mut desc = SocDescriptor::imx6q_default();
        desc.variant = SocVariant::Imx6dl;
        desc.revision = SiliconRev::new(1, 1);
        let mut h = build_harness(&desc, None);
        assert!(!h.controller.has_resume_blob());

        h.controller.enter(SuspendState::Mem).unwrap();
        // 6DL still re-synchronizes secondaries after deep sleep.
        assert_eq!(h.cpu.smp_prepares.load(Ordering::SeqCst), 1);
    }
}
