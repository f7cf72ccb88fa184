//! aero-sim - boot AeroDesk on the host
//!
//! Runs the real kernel, init and service programs against a `std` HAL
//! whose tick advances every time the idle process halts, then prints the
//! process table and the gate outcome.
//!
//! ```text
//! aero-sim                                 # threshold verifier, live sensors
//! aero-sim --verifier reject --retry-limit 2
//! aero-sim --config boot.json --print-config
//! ```

use std::fs;
use std::path::PathBuf;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use aero_hal::{CpuContext, HalError, HAL};
use aero_init::{boot, BootConfig, GateState, ADMISSION};
use aero_kernel::{init_logger, Program};
use aero_services::{AuthService, EnrolledProfile, ScriptedVerifier, ThresholdVerifier};
use anyhow::{anyhow, bail, Context};
use clap::{Parser, ValueEnum};
use log::{info, warn, LevelFilter};

/// First stack address handed out (the kernel heap start on hardware)
const STACK_BASE: u64 = 0x0010_0000;
/// Stack region size
const STACK_REGION: u64 = 0x0010_0000;
/// Wall-clock length of one tick in `--realtime` mode (100 Hz)
const TICK: Duration = Duration::from_millis(10);

// ============================================================================
// Command line
// ============================================================================

#[derive(Clone, Copy, Debug, PartialEq, Eq, ValueEnum)]
enum VerifierKind {
    /// Accept every request
    Accept,
    /// Reject every request
    Reject,
    /// Range-check live sensor samples against enrolled profiles
    Threshold,
}

#[derive(Parser, Debug)]
#[command(name = "aero-sim")]
#[command(version)]
#[command(about = "Boot AeroDesk on a host HAL and run it to desktop admission", long_about = None)]
struct Cli {
    /// JSON boot configuration
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// JSON list of enrolled profiles for the threshold verifier
    #[arg(long)]
    profiles: Option<PathBuf>,

    /// Verification strategy of the auth service
    #[arg(long, value_enum, default_value_t = VerifierKind::Threshold)]
    verifier: VerifierKind,

    /// Override the gate retry limit
    #[arg(long)]
    retry_limit: Option<u32>,

    /// Override the verification timeout (ticks)
    #[arg(long)]
    timeout_ticks: Option<u64>,

    /// Force the sensor publishers on
    #[arg(long)]
    sensors: bool,

    /// Give up after this many scheduler steps
    #[arg(long, default_value_t = 100_000)]
    max_steps: usize,

    /// Log level (off, error, warn, info, debug, trace)
    #[arg(long, default_value = "info")]
    log_level: String,

    /// Sleep one tick period on every halt
    #[arg(long)]
    realtime: bool,

    /// Print the effective configuration as JSON and exit
    #[arg(long)]
    print_config: bool,
}

// ============================================================================
// Host HAL
// ============================================================================

struct HostState {
    ticks: AtomicU64,
    next_stack: AtomicU64,
    switches: AtomicU64,
    live: spin::Mutex<CpuContext>,
    realtime: bool,
}

/// HAL backed by the host process: console on stdout, virtual ticks.
#[derive(Clone)]
struct HostHal {
    inner: Arc<HostState>,
}

impl HostHal {
    fn new(realtime: bool) -> Self {
        Self {
            inner: Arc::new(HostState {
                ticks: AtomicU64::new(0),
                next_stack: AtomicU64::new(STACK_BASE),
                switches: AtomicU64::new(0),
                live: spin::Mutex::new(CpuContext::default()),
                realtime,
            }),
        }
    }

    fn switches(&self) -> u64 {
        self.inner.switches.load(Ordering::SeqCst)
    }
}

impl HAL for HostHal {
    fn now_ticks(&self) -> u64 {
        self.inner.ticks.load(Ordering::SeqCst)
    }

    fn wait_for_interrupt(&self) {
        if self.inner.realtime {
            std::thread::sleep(TICK);
        }
        self.inner.ticks.fetch_add(1, Ordering::SeqCst);
    }

    fn switch_context(&self, save: &mut CpuContext, load: &CpuContext) {
        let mut live = self.inner.live.lock();
        *save = *live;
        *live = *load;
        self.inner.switches.fetch_add(1, Ordering::SeqCst);
    }

    fn allocate_stack(&self, size: usize) -> Result<u64, HalError> {
        if size == 0 {
            return Err(HalError::InvalidArgument);
        }
        let size = size as u64;
        let base = self.inner.next_stack.fetch_add(size, Ordering::SeqCst);
        let top = base + size;
        if top > STACK_BASE + STACK_REGION {
            return Err(HalError::OutOfMemory);
        }
        Ok(top)
    }

    fn debug_write(&self, msg: &str) {
        println!("{}", msg);
    }
}

// ============================================================================
// Setup
// ============================================================================

fn load_config(cli: &Cli) -> anyhow::Result<BootConfig> {
    let mut config = match &cli.config {
        Some(path) => {
            let text = fs::read_to_string(path)
                .with_context(|| format!("reading {}", path.display()))?;
            BootConfig::from_json(&text).with_context(|| format!("parsing {}", path.display()))?
        }
        None => BootConfig::default(),
    };
    if let Some(limit) = cli.retry_limit {
        config.gate.retry_limit = limit;
    }
    if let Some(ticks) = cli.timeout_ticks {
        config.gate.verification_timeout_ticks = ticks;
    }
    if cli.sensors {
        config.sensors.enabled = true;
    }
    if cli.verifier == VerifierKind::Threshold && !config.sensors.enabled {
        // Threshold decisions need samples
        config.sensors.enabled = true;
    }
    Ok(config)
}

fn load_profiles(cli: &Cli, config: &BootConfig) -> anyhow::Result<Vec<EnrolledProfile>> {
    match &cli.profiles {
        Some(path) => {
            let text = fs::read_to_string(path)
                .with_context(|| format!("reading {}", path.display()))?;
            serde_json::from_str(&text).with_context(|| format!("parsing {}", path.display()))
        }
        None => Ok(vec![EnrolledProfile {
            user_id: config.gate.user_id,
            min_samples: 3,
            ..EnrolledProfile::default()
        }]),
    }
}

fn auth_service(cli: &Cli, config: &BootConfig) -> anyhow::Result<Box<dyn Program>> {
    Ok(match cli.verifier {
        VerifierKind::Accept => Box::new(AuthService::new(ScriptedVerifier::accept())),
        VerifierKind::Reject => Box::new(AuthService::new(ScriptedVerifier::reject())),
        VerifierKind::Threshold => {
            let mut verifier = ThresholdVerifier::new();
            for profile in load_profiles(cli, config)? {
                let user = profile.user_id;
                verifier
                    .enroll(profile)
                    .with_context(|| format!("enrolling user {}", user))?;
            }
            Box::new(AuthService::new(verifier))
        }
    })
}

// ============================================================================
// Main
// ============================================================================

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let config = load_config(&cli)?;

    if cli.print_config {
        println!("{}", config.to_json()?);
        return Ok(());
    }

    let level: LevelFilter = cli
        .log_level
        .parse()
        .map_err(|_| anyhow!("invalid log level '{}'", cli.log_level))?;

    let hal = HostHal::new(cli.realtime);
    init_logger(hal.clone(), level).map_err(|e| anyhow!("installing logger: {}", e))?;

    let service = auth_service(&cli, &config)?;
    let mut system = boot(hal.clone(), &config, service, &ADMISSION)?;
    let outcome = system.run_until_settled(cli.max_steps);
    // Let the desktop take its first slice
    system.kernel.run(8);

    println!();
    println!("PID  NAME                             STATE");
    for line in system.kernel.process_listing() {
        println!("{}", line);
    }
    let metrics = system.kernel.state().system_metrics();
    println!();
    println!(
        "ticks: {}  switches: {}  messages: {}  topics: {}  delivery failures: {}",
        hal.now_ticks(),
        hal.switches(),
        metrics.total_messages,
        metrics.topic_count,
        metrics.delivery_failures
    );

    match outcome {
        Some(GateState::DesktopAdmitted) => {
            if let Some(admission) = ADMISSION.get() {
                info!(
                    target: "gate",
                    "desktop admitted for user {} at tick {}",
                    admission.user_id, admission.tick
                );
            }
            match system.session_user() {
                Some(user) => info!(target: "gate", "desktop session open for user {}", user),
                None => warn!(target: "gate", "desktop has not seen auth_success yet"),
            }
            Ok(())
        }
        Some(GateState::BootFailed) => bail!("boot failed: authentication denied"),
        Some(state) => bail!("gate stopped in state {}", state.label()),
        None => {
            warn!(target: "gate", "gate still {}", system.gate_state().label());
            bail!("gate did not settle within {} steps", cli.max_steps)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_stack_allocation_is_bounded() {
        let hal = HostHal::new(false);
        assert_eq!(hal.allocate_stack(4096).unwrap(), STACK_BASE + 4096);
        assert_eq!(hal.allocate_stack(0), Err(HalError::InvalidArgument));
        assert_eq!(
            hal.allocate_stack(STACK_REGION as usize),
            Err(HalError::OutOfMemory)
        );
    }

    #[test]
    fn test_halt_advances_tick() {
        let hal = HostHal::new(false);
        hal.wait_for_interrupt();
        hal.wait_for_interrupt();
        assert_eq!(hal.now_ticks(), 2);
    }

    #[test]
    fn test_switch_saves_live_registers() {
        let hal = HostHal::new(false);
        let a = CpuContext::new(0x1000, 0x2000, 0);
        let mut boot = CpuContext::default();
        hal.switch_context(&mut boot, &a);
        let mut saved = CpuContext::default();
        hal.switch_context(&mut saved, &CpuContext::default());
        assert_eq!(saved, a);
        assert_eq!(hal.switches(), 2);
    }

    #[test]
    fn test_threshold_forces_sensors() {
        let cli = Cli::try_parse_from(["aero-sim", "--retry-limit", "5"]).unwrap();
        let config = load_config(&cli).unwrap();
        assert!(config.sensors.enabled);
        assert_eq!(config.gate.retry_limit, 5);

        let cli = Cli::try_parse_from(["aero-sim", "--verifier", "accept"]).unwrap();
        assert!(!load_config(&cli).unwrap().sensors.enabled);
    }

    #[test]
    fn test_accept_boot_reaches_desktop() {
        let cli = Cli::try_parse_from(["aero-sim", "--verifier", "accept"]).unwrap();
        let config = load_config(&cli).unwrap();
        let flag: &'static aero_init::AdmissionFlag =
            Box::leak(Box::new(aero_init::AdmissionFlag::new()));
        let service = auth_service(&cli, &config).unwrap();
        let mut system = boot(HostHal::new(false), &config, service, flag).unwrap();
        assert_eq!(system.run_until_settled(1_000), Some(GateState::DesktopAdmitted));
        assert!(flag.is_admitted());
        system.kernel.run(8);
        assert_eq!(system.session_user(), Some(config.gate.user_id));
    }
}
