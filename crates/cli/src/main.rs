use clap::Parser;
use std::path::PathBuf;
use tracing::info;

use powergate_config::SocDescriptor;
use powergate_core::map::HardwareBlock;
use powergate_core::sim::{
    new_event_log, SimAnatop, SimCpu, SimGpc, SimLocator, SimOcram, SimSoc, SpinDelay,
};
use powergate_core::soc::SocProfile;
use powergate_core::suspend::{SuspendController, SuspendState};

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Path to the SoC descriptor (YAML); defaults to the built-in
    /// i.MX6Quad map
    #[arg(short, long)]
    system: Option<PathBuf>,

    /// Suspend target to cycle through: standby or mem
    #[arg(long, default_value = "mem")]
    state: String,

    /// Number of suspend/resume cycles to run
    #[arg(long, default_value = "1")]
    cycles: usize,

    /// Enable register-level sequencing traces
    #[arg(short, long)]
    trace: bool,

    /// Write a JSON snapshot of the simulated register file after the
    /// run
    #[arg(long)]
    snapshot: Option<PathBuf>,
}

fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    if args.trace {
        tracing_subscriber::fmt()
            .with_max_level(tracing::Level::DEBUG)
            .init();
    } else {
        tracing_subscriber::fmt()
            .with_max_level(tracing::Level::INFO)
            .init();
    }

    info!("Starting PowerGate harness");

    let desc = if let Some(sys_path) = &args.system {
        info!("Loading SoC descriptor: {:?}", sys_path);
        SocDescriptor::from_file(sys_path)?
    } else {
        info!("Using built-in i.MX6Quad descriptor");
        SocDescriptor::imx6q_default()
    };

    let state = match args.state.as_str() {
        "standby" => SuspendState::Standby,
        "mem" => SuspendState::Mem,
        other => anyhow::bail!("unknown suspend target '{}' (use standby or mem)", other),
    };

    info!(
        "SoC: {} ({:?} rev {})",
        desc.name, desc.variant, desc.revision
    );

    let log = new_event_log();
    let soc = SimSoc::from_descriptor(&desc)?;
    let mut locator = SimLocator::from_descriptor(&desc)?;
    let mut ocram = SimOcram::from_descriptor(&desc)?;

    let ccm = desc
        .block("fsl,imx6q-ccm")
        .ok_or_else(|| anyhow::anyhow!("descriptor has no 'fsl,imx6q-ccm' block"))?;
    let ccm = HardwareBlock {
        pbase: ccm.base,
        vbase: ccm.base,
    };

    let mut controller = SuspendController::new(
        soc,
        ccm,
        &mut locator,
        &mut ocram,
        Box::new(SimGpc::new(log.clone())),
        Box::new(SimAnatop::new(log.clone())),
        Box::new(SimCpu::new(log)),
        Box::new(SpinDelay),
        SocProfile::from_descriptor(&desc),
    );

    if controller.has_resume_blob() {
        let blob = controller.blob().unwrap();
        info!("Resume blob at {:#x}, entry {:#x}", blob.region.pbase, blob.entry);
    } else {
        info!("No resume blob; deep sleep runs as plain WFI");
    }

    for cycle in 0..args.cycles {
        info!("Cycle {}/{}: entering {:?}", cycle + 1, args.cycles, state);
        controller.enter(state)?;
        info!("Cycle {}/{}: resumed", cycle + 1, args.cycles);
    }

    if let Some(path) = &args.snapshot {
        let snapshot = serde_json::json!({
            "type": "sim_imx6",
            "soc": controller.bus().snapshot(),
            "resume_blob": controller.has_resume_blob(),
        });
        std::fs::write(path, serde_json::to_string_pretty(&snapshot)?)?;
        info!("Snapshot written to {:?}", path);
    }

    info!("Run finished: {} cycle(s) of {:?}", args.cycles, state);

    Ok(())
}
