//! switchbat daemon
//!
//! Polls the Acer Switch 11 embedded controller for battery and AC adapter
//! telemetry and publishes it as power-supply reports.
//!
//! Usage: `switchbatd [config.toml]`
//!
//! Without an argument the system configuration under `/etc/switchbat` is
//! used. `SWITCHBAT_*` variables override individual settings, and
//! `SWITCHBAT_MOCK=1` runs against a simulated controller.

use anyhow::{Context, Result};
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::RecvTimeoutError;
use std::time::Duration;
use switchbat_config::SwitchbatConfig;
use switchbat_hal::{
    AdapterSupply, BatterySupply, ChannelNotifier, Engine, EngineConfig, PowerSupply,
    SupplyDescriptor, SupplyKind,
};
use tracing::{debug, error, info, warn};

/// Set from the signal handler, polled by the main loop
static SHUTDOWN: AtomicBool = AtomicBool::new(false);

/// How long the main loop waits for a notification before re-checking [`SHUTDOWN`]
const EVENT_WAIT: Duration = Duration::from_millis(200);

const MOCK_ENV: &str = "SWITCHBAT_MOCK";

fn main() -> Result<()> {
    setup_logging();

    info!("switchbat daemon starting...");

    setup_signal_handlers()?;

    let config = load_config()?;
    let (notifier, events) = ChannelNotifier::channel();
    let engine = start_engine(&config, notifier)?;

    let reporter = config.report.output_dir.clone().map(ReportWriter::new);
    if let Some(reporter) = &reporter {
        info!("Writing supply reports to {}", reporter.dir().display());
        publish(reporter, &engine, None);
    }

    while !SHUTDOWN.load(Ordering::SeqCst) {
        match events.recv_timeout(EVENT_WAIT) {
            Ok(kind) => {
                log_change(&engine, kind);
                if let Some(reporter) = &reporter {
                    publish(reporter, &engine, Some(kind));
                }
            }
            Err(RecvTimeoutError::Timeout) => continue,
            Err(RecvTimeoutError::Disconnected) => {
                error!("Poller exited unexpectedly");
                break;
            }
        }
    }

    info!("Shutting down...");
    engine.shutdown();
    Ok(())
}

/// Setup logging to console
fn setup_logging() {
    use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().with_target(false).with_ansi(false))
        .init();
}

/// Setup signal handlers for graceful shutdown
fn setup_signal_handlers() -> Result<()> {
    use nix::sys::signal::{SaFlags, SigAction, SigHandler, SigSet, Signal, sigaction};

    let action = SigAction::new(
        SigHandler::Handler(handle_signal),
        SaFlags::empty(),
        SigSet::empty(),
    );

    unsafe {
        sigaction(Signal::SIGTERM, &action).context("Failed to install SIGTERM handler")?;
        sigaction(Signal::SIGINT, &action).context("Failed to install SIGINT handler")?;
    }

    Ok(())
}

extern "C" fn handle_signal(sig: i32) {
    if matches!(sig, libc::SIGTERM | libc::SIGINT) {
        SHUTDOWN.store(true, Ordering::SeqCst);
    }
}

fn load_config() -> Result<SwitchbatConfig> {
    match std::env::args_os().nth(1).map(PathBuf::from) {
        Some(path) => {
            if !path.exists() {
                anyhow::bail!("Configuration file not found: {}", path.display());
            }
            SwitchbatConfig::load_layered(Some(&path), None)
                .with_context(|| format!("Failed to load configuration from {}", path.display()))
        }
        None => SwitchbatConfig::load_default().context("Failed to load configuration"),
    }
}

fn engine_config(config: &SwitchbatConfig) -> EngineConfig {
    EngineConfig {
        poll_interval: Duration::from_millis(config.poll.interval_ms),
        max_attempts: config.poll.max_attempts,
        design_full_capacity: config.battery.design_full_capacity,
        battery: SupplyDescriptor::battery(
            &config.battery.name,
            &config.battery.model_name,
            &config.battery.manufacturer,
        ),
        adapter: SupplyDescriptor::mains(&config.adapter.name),
    }
}

fn mock_requested() -> bool {
    std::env::var(MOCK_ENV).is_ok_and(|v| v == "1")
}

fn start_engine(config: &SwitchbatConfig, notifier: ChannelNotifier) -> Result<Engine> {
    let engine_config = engine_config(config);

    if mock_requested() {
        return start_mock_engine(config, engine_config, notifier);
    }

    start_hardware_engine(config, engine_config, notifier)
}

fn start_mock_engine(
    config: &SwitchbatConfig,
    engine_config: EngineConfig,
    notifier: ChannelNotifier,
) -> Result<Engine> {
    use switchbat_hal::BoxedBus;
    use switchbat_hal::mock::MockBus;

    warn!("{}=1, using simulated embedded controller", MOCK_ENV);

    let controller = MockBus::with_discharging_battery(config.bus.gauge_address);
    let adapter = config
        .adapter
        .enabled
        .then(|| Box::new(controller.sharing(config.bus.adapter_address)) as BoxedBus);

    Engine::start(engine_config, Box::new(controller), adapter, notifier)
        .context("Failed to start telemetry engine")
}

#[cfg(target_os = "linux")]
fn start_hardware_engine(
    config: &SwitchbatConfig,
    engine_config: EngineConfig,
    notifier: ChannelNotifier,
) -> Result<Engine> {
    info!(
        "Opening embedded controller on /dev/i2c-{} (gauge 0x{:02X})",
        config.bus.index, config.bus.gauge_address
    );

    Engine::open_linux(
        engine_config,
        config.bus.index,
        config.bus.gauge_address,
        config.adapter.enabled.then_some(config.bus.adapter_address),
        notifier,
    )
    .context("Failed to start telemetry engine")
}

#[cfg(not(target_os = "linux"))]
fn start_hardware_engine(
    _config: &SwitchbatConfig,
    _engine_config: EngineConfig,
    _notifier: ChannelNotifier,
) -> Result<Engine> {
    anyhow::bail!("I2C access requires Linux; set {}=1 to use the simulated controller", MOCK_ENV)
}

fn log_change(engine: &Engine, kind: SupplyKind) {
    match kind {
        SupplyKind::Battery => {
            let snapshot = engine.battery().snapshot();
            info!(
                "{}: {} at {}% ({})",
                engine.battery().descriptor().name,
                snapshot.state.as_str(),
                snapshot.capacity_percent,
                snapshot.capacity_level.as_str()
            );
        }
        SupplyKind::Adapter => {
            if let Some(adapter) = engine.adapter() {
                info!(
                    "{}: {}",
                    adapter.descriptor().name,
                    if adapter.is_online() { "online" } else { "offline" }
                );
            }
        }
    }
}

/// Write reports for `changed`, or for every supply when `None`
fn publish(reporter: &ReportWriter, engine: &Engine, changed: Option<SupplyKind>) {
    if changed != Some(SupplyKind::Adapter) {
        if let Err(e) = reporter.write_battery(engine.battery()) {
            warn!("Failed to write battery report: {:#}", e);
        }
    }

    if changed != Some(SupplyKind::Battery) {
        if let Some(adapter) = engine.adapter() {
            if let Err(e) = reporter.write_adapter(adapter) {
                warn!("Failed to write adapter report: {:#}", e);
            }
        }
    }
}

/// Writes `<dir>/<supply>/uevent` and `<dir>/<supply>/state.json`
struct ReportWriter {
    dir: PathBuf,
}

impl ReportWriter {
    fn new(dir: PathBuf) -> Self {
        Self { dir }
    }

    fn dir(&self) -> &Path {
        &self.dir
    }

    fn write_battery(&self, battery: &BatterySupply) -> Result<()> {
        let state = serde_json::to_value(battery.snapshot())?;
        self.write_supply(battery, state)
    }

    fn write_adapter(&self, adapter: &AdapterSupply) -> Result<()> {
        let state = serde_json::json!({ "online": adapter.is_online() });
        self.write_supply(adapter, state)
    }

    fn write_supply(&self, supply: &impl PowerSupply, state: serde_json::Value) -> Result<()> {
        let supply_dir = self.dir.join(&supply.descriptor().name);
        fs::create_dir_all(&supply_dir)
            .with_context(|| format!("Failed to create {}", supply_dir.display()))?;

        let mut uevent = supply.uevent().join("\n");
        uevent.push('\n');
        write_replacing(&supply_dir.join("uevent"), uevent.as_bytes())?;

        let json = serde_json::to_vec_pretty(&state)?;
        write_replacing(&supply_dir.join("state.json"), &json)?;

        debug!("Report written for {}", supply.descriptor().name);
        Ok(())
    }
}

/// Write through a temporary file so readers never see a partial report
fn write_replacing(path: &Path, contents: &[u8]) -> Result<()> {
    let tmp = path.with_extension("tmp");
    fs::write(&tmp, contents).with_context(|| format!("Failed to write {}", tmp.display()))?;
    fs::rename(&tmp, path).with_context(|| format!("Failed to replace {}", path.display()))?;
    Ok(())
}
