//! Command line front end: read once, keep polling, or list hidraw nodes.

use clap::{Parser, Subcommand};
use std::{io, path::PathBuf, process::ExitCode, thread, time::Duration};
use tracing::error;

use hyperx_battery::{
    BatteryReading, CandidateDevice, Locate, Open, ProtocolClient, ProtocolConfig, SysfsLocator,
};

/// HyperX wireless mouse battery level
#[derive(Parser)]
#[command(name = "hyperx-battery", version, about)]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,

    /// JSON config file (default: $XDG_CONFIG_HOME/hyperx-battery/config.json)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Override the HID_ID to match, e.g. 000003F0:00000F98
    #[arg(long, global = true)]
    hid_id: Option<String>,

    /// Override the HID_PHYS interface to match, e.g. input2
    #[arg(long, global = true)]
    interface: Option<String>,

    /// Give up on a reply after this many milliseconds
    #[arg(long, global = true)]
    timeout_ms: Option<u64>,

    /// Find devices through udev instead of scanning sysfs
    #[cfg(feature = "udev")]
    #[arg(long, global = true)]
    udev: bool,

    /// Print readings as JSON
    #[arg(long, global = true)]
    json: bool,

    /// Verbose output
    #[arg(short, long, global = true)]
    verbose: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Read the battery level once (default)
    Read,
    /// Keep reading the battery level
    Watch {
        /// Seconds between readings
        #[arg(short, long, default_value_t = 30)]
        interval: u64,
    },
    /// List hidraw devices and their HID metadata
    List,
}

fn setup_logging(verbose: bool) {
    use tracing_subscriber::{fmt, EnvFilter};

    let filter = if verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"))
    };

    fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();
}

fn load_config(cli: &Cli) -> hyperx_battery::Result<ProtocolConfig> {
    let mut config = ProtocolConfig::load_or_default(cli.config.as_deref())?;
    if let Some(hid_id) = &cli.hid_id {
        config.signature.hid_id = hid_id.clone();
    }
    if let Some(interface) = &cli.interface {
        config.signature.interface = interface.clone();
    }
    if cli.timeout_ms.is_some() {
        config.read_timeout_ms = cli.timeout_ms;
    }
    Ok(config)
}

fn print_reading(reading: BatteryReading, json: bool) {
    if json {
        match serde_json::to_string(&reading) {
            Ok(line) => println!("{}", line),
            Err(err) => error!("failed to serialize reading: {}", err),
        }
    } else {
        println!("HyperX: {}", reading);
    }
}

fn run<L: Locate, O: Open>(
    client: &ProtocolClient<L, O>,
    command: &Commands,
    json: bool,
) -> ExitCode {
    match command {
        Commands::Watch { interval } => {
            let interval = Duration::from_secs((*interval).max(1));
            loop {
                print_reading(client.read_battery_percent(), json);
                thread::sleep(interval);
            }
        }
        _ => {
            let reading = client.read_battery_percent();
            print_reading(reading, json);
            match reading {
                BatteryReading::Percent(_) => ExitCode::SUCCESS,
                BatteryReading::Unavailable => ExitCode::FAILURE,
            }
        }
    }
}

fn list(candidates: io::Result<Vec<CandidateDevice>>, config: &ProtocolConfig) -> ExitCode {
    let candidates = match candidates {
        Ok(candidates) => candidates,
        Err(err) => {
            error!("failed to list HID devices: {}", err);
            return ExitCode::FAILURE;
        }
    };

    for candidate in &candidates {
        let marker = if config.signature.matches(&candidate.metadata) {
            "*"
        } else {
            " "
        };
        println!(
            "{} {} {} {:?} {}",
            marker,
            candidate.devnode.display(),
            candidate.property("HID_ID").unwrap_or("-"),
            candidate.property("HID_NAME").unwrap_or("-"),
            candidate.property("HID_PHYS").unwrap_or("-"),
        );
    }
    ExitCode::SUCCESS
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    setup_logging(cli.verbose);

    let config = match load_config(&cli) {
        Ok(config) => config,
        Err(err) => {
            error!("{}", err);
            return ExitCode::from(2);
        }
    };
    let command = cli.command.as_ref().unwrap_or(&Commands::Read);

    #[cfg(feature = "udev")]
    if cli.udev {
        let locator = hyperx_battery::UdevLocator;
        let opener = hyperx_battery::HidrawOpener {
            read_timeout: config.read_timeout(),
        };
        if let Commands::List = command {
            return list(locator.candidates(), &config);
        }
        return run(&ProtocolClient::new(config, locator, opener), command, cli.json);
    }

    let locator = SysfsLocator::new(config.sysfs_class_dir.clone(), config.dev_dir.clone());
    if let Commands::List = command {
        return list(locator.candidates(), &config);
    }
    run(&ProtocolClient::from_config(config), command, cli.json)
}
