use std::error::Error;
use std::time::Duration;

use clap::{ArgAction, Parser};
use tracing::{error, info};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use mpx_core::config::config::KernelConfig;
use mpx_core::dcb::dcb::DeviceOp;
use mpx_core::device::device::DeviceId;
use mpx_core::kernel::kernel::Kernel;
use mpx_runtime::machine::machine::{Machine, MachineExit};
use mpx_runtime::terminal::terminal::HostTerminal;

/// MPX teaching kernel running on the host terminal
#[derive(Parser, Debug)]
#[command(name = "mpx")]
#[command(version)]
#[command(about = "MPX kernel with the command handler on COM1", long_about = None)]
struct Cli {
    /// Verbosity level (-v, -vv, -vvv)
    #[arg(short, long, action = ArgAction::Count)]
    verbose: u8,

    /// Log filter directive, e.g. `debug` or `mpx_core=trace`; overrides -v
    #[arg(long)]
    log_level: Option<String>,

    /// Console baud rate, must divide 115200
    #[arg(long, default_value_t = 9600)]
    baud: u32,

    /// Receive ring size per device
    #[arg(long)]
    ring_capacity: Option<usize>,

    /// Maximum process name length
    #[arg(long)]
    max_name_len: Option<usize>,

    /// Load the demo processes before the first prompt
    #[arg(long)]
    demo: bool,

    /// Milliseconds to sleep when nothing can run
    #[arg(long, default_value_t = 5)]
    idle_sleep_ms: u64,
}

fn main() -> Result<(), Box<dyn Error>> {
    let cli = Cli::parse();

    // logs go to stderr; stdout is the console device.
    let log_level = cli.log_level.as_deref().unwrap_or(match cli.verbose {
        0 => "warn",
        1 => "info",
        2 => "debug",
        _ => "trace",
    });
    tracing_subscriber::registry()
        .with(fmt::layer().with_writer(std::io::stderr))
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(log_level)))
        .init();

    let mut config = KernelConfig::from_env();
    if let Some(capacity) = cli.ring_capacity {
        config.ring_capacity = capacity;
    }
    if let Some(len) = cli.max_name_len {
        config.max_name_len = len;
    }

    let console = DeviceId::Com1;
    let kernel = Kernel::new(config, HostTerminal::new(console));
    let mut machine = Machine::new(kernel, console).with_idle_sleep(Duration::from_millis(cli.idle_sleep_ms));

    if let Err(err) = machine.boot(cli.baud) {
        error!(%err, "could not start the system processes");
        return Err(err.into());
    }
    if cli.demo {
        let reply = mpx_runtime::comhand::comhand::CommandTable::with_base_commands()
            .execute(machine.kernel_mut(), "load-demo");
        info!(reply = %reply.text, "demo processes loaded");
    }

    // stdin closed and the command handler is waiting on it: nothing left to do.
    let exit = machine.run(|kernel| {
        kernel.transport().hung_up() && kernel.io().dcb(console).current_op() == DeviceOp::Reading
    });
    match exit {
        MachineExit::Shutdown => info!("system shut down"),
        MachineExit::Stopped => info!("console closed, stopping"),
    }
    Ok(())
}
