#![forbid(unsafe_code)]

use std::sync::{Arc, Mutex, PoisonError};
use std::thread;
use std::time::Duration;

use anyhow::{anyhow, Context, Result};
use clap::{Parser, ValueEnum};
use pcie_model::board::{BoardRegisters, BOARD_REG_PCI};
use pcie_model::{
    ContextHandle, DeviceConfig, DeviceContext, InterruptKind, LaneWidth, LinkSpeed,
    TaskNotifier,
};
use tracing_subscriber::EnvFilter;

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum Role {
    Rc,
    Ep,
    Both,
}

#[derive(Debug, Clone, Copy, ValueEnum)]
enum EventKind {
    Legacy,
    Msi,
    Msix,
    Intc,
}

impl From<EventKind> for InterruptKind {
    fn from(kind: EventKind) -> Self {
        match kind {
            EventKind::Legacy => InterruptKind::Legacy,
            EventKind::Msi => InterruptKind::Msi,
            EventKind::Msix => InterruptKind::Msix,
            EventKind::Intc => InterruptKind::Intc,
        }
    }
}

#[derive(Debug, Parser)]
#[command(name = "pcie-model")]
#[command(about = "Bring up simulated PCIe root complex / endpoint devices and inject interrupts")]
struct Args {
    /// Which device(s) to simulate. Each device runs on its own thread with its own state.
    #[arg(long, value_enum, default_value_t = Role::Both)]
    role: Role,

    /// Link generation (1-7).
    #[arg(long, default_value_t = 7)]
    speed: u32,

    /// Lane width of the root complex link.
    #[arg(long, default_value_t = 16)]
    rc_lanes: u32,

    /// Lane width of the endpoint link.
    #[arg(long, default_value_t = 8)]
    ep_lanes: u32,

    /// Number of interrupt events to inject per device.
    #[arg(long, default_value_t = 3)]
    events: u32,

    /// Delay between injected events, in milliseconds.
    #[arg(long, default_value_t = 0)]
    interval_ms: u64,

    /// Interrupt mechanism used for injected events.
    #[arg(long, value_enum, default_value_t = EventKind::Msi)]
    kind: EventKind,

    /// Interrupt vector used for injected events.
    #[arg(long, default_value_t = 0)]
    vector: i32,
}

#[derive(Debug)]
struct RunSummary {
    config: DeviceConfig,
    link_up: bool,
    events: u32,
    notifications: u32,
}

fn device_configs(args: &Args) -> Result<Vec<DeviceConfig>> {
    let speed = LinkSpeed::try_from(args.speed)?;
    let mut configs = Vec::new();
    if matches!(args.role, Role::Rc | Role::Both) {
        configs.push(DeviceConfig {
            link_speed: speed,
            lane_width: LaneWidth::try_from(args.rc_lanes).context("--rc-lanes")?,
            ..DeviceConfig::root_complex()
        });
    }
    if matches!(args.role, Role::Ep | Role::Both) {
        configs.push(DeviceConfig {
            link_speed: speed,
            lane_width: LaneWidth::try_from(args.ep_lanes).context("--ep-lanes")?,
            ..DeviceConfig::endpoint()
        });
    }
    Ok(configs)
}

fn run_device(
    config: DeviceConfig,
    board: Arc<Mutex<BoardRegisters>>,
    kind: InterruptKind,
    vector: i32,
    events: u32,
    interval: Duration,
) -> Result<RunSummary> {
    let mut dev = DeviceContext::with_config(&config, board);

    let task = Arc::new(TaskNotifier::new());
    dev.register_interrupt(kind, vector, ContextHandle::from(task.clone()))?;
    match kind {
        InterruptKind::Msi => dev.configure_msi(vector, ContextHandle::from(task.clone()))?,
        InterruptKind::Msix => dev.configure_msix(vector, ContextHandle::from(task.clone()))?,
        _ => {}
    }

    for i in 0..events {
        if i > 0 && !interval.is_zero() {
            thread::sleep(interval);
        }
        let delivery = dev.simulate_event(kind, vector);
        tracing::debug!(
            device = %config.kind,
            registrations = delivery.registrations,
            vector_table = delivery.vector_table,
            "event delivered"
        );
    }

    Ok(RunSummary {
        link_up: dev.is_link_up(),
        config,
        events,
        notifications: task.take(),
    })
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let args = Args::parse();
    let configs = device_configs(&args)?;
    let board = Arc::new(Mutex::new(BoardRegisters::new()));
    let kind = InterruptKind::from(args.kind);
    let interval = Duration::from_millis(args.interval_ms);
    let (vector, events) = (args.vector, args.events);

    let workers: Vec<_> = configs
        .into_iter()
        .map(|config| {
            let board = board.clone();
            let name = format!("pcie-{}", config.kind).to_lowercase();
            thread::Builder::new()
                .name(name)
                .spawn(move || run_device(config, board, kind, vector, events, interval))
                .context("failed to spawn device thread")
        })
        .collect::<Result<_>>()?;

    for worker in workers {
        let summary = worker
            .join()
            .map_err(|_| anyhow!("device thread panicked"))??;
        println!(
            "{}: link {} {} {}, {} {kind} events on vector {}, {} notifications",
            summary.config.kind,
            if summary.link_up { "up" } else { "down" },
            summary.config.link_speed,
            summary.config.lane_width,
            summary.events,
            vector,
            summary.notifications,
        );
    }

    let pci_status = board
        .lock()
        .unwrap_or_else(PoisonError::into_inner)
        .read(BOARD_REG_PCI);
    println!("board PCI status register: {pci_status:#04x}");
    Ok(())
}
