use clap::{ArgAction, Parser, Subcommand};
use hil_testops::config::{Config, ConfigLoader, ConfigResult};
use hil_testops::{artifacts, logging, Harness, SystemPortOpener, TestReport, UsbDeviceResolver};
use std::path::PathBuf;
use std::process::ExitCode;
use tracing::{error, info};

// Command-line arguments
#[derive(Parser, Debug)]
#[command(
    name = "testops",
    version,
    about = "Run a device's built-in unit tests over serial and report the result to CI."
)]
struct Cli {
    /// Device port, or "auto" to find it by USB id.
    #[arg(short, long, global = true)]
    port: Option<String>,

    /// Attempts (one per retry delay) to wait for the device.
    #[arg(short, long, global = true)]
    timeout: Option<u32>,

    /// Secondary serial port to capture during the run.
    #[arg(short = 's', long = "stm-port", global = true)]
    stm_port: Option<String>,

    /// Directory for the output artifacts.
    #[arg(short, long, global = true)]
    output_dir: Option<PathBuf>,

    /// Also write the report as JSON.
    #[arg(long, global = true)]
    json: bool,

    /// Configuration file.
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Increase log verbosity (-v debug, -vv trace).
    #[arg(short, long, action = ArgAction::Count, global = true)]
    verbose: u8,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug, Clone, Copy)]
enum Command {
    /// Wait for the device to come up.
    #[command(alias = "await_flipper")]
    AwaitDevice,
    /// Run the on-device unit tests.
    #[command(alias = "run_units")]
    RunUnits,
}

fn load_config(cli: &Cli) -> ConfigResult<Config> {
    let mut config = ConfigLoader::load(cli.config.as_deref())?.into_config();

    if let Some(port) = &cli.port {
        config.device.port = port.clone();
    }
    if let Some(stm_port) = &cli.stm_port {
        config.monitor.port = Some(stm_port.clone());
    }
    if let Some(dir) = &cli.output_dir {
        config.output.dir = dir.clone();
    }
    if cli.json {
        config.output.write_json = true;
    }
    Ok(config)
}

fn main() -> ExitCode {
    let cli = Cli::parse();

    let config = match load_config(&cli) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("testops: {e}");
            return ExitCode::FAILURE;
        }
    };

    if let Err(e) = logging::init(&config.logging, cli.verbose) {
        eprintln!("testops: failed to initialize logging: {e}");
    }

    let resolver = UsbDeviceResolver::new(config.device.usb_vid, config.device.usb_pid);
    let opener = SystemPortOpener;
    let harness = Harness::new(&config, &resolver, &opener);

    match cli.command {
        Command::AwaitDevice => {
            let attempts = cli.timeout.unwrap_or(config.device.await_attempts);
            match harness.await_device(attempts) {
                Ok(()) => ExitCode::SUCCESS,
                Err(e) => {
                    error!("{e}");
                    ExitCode::FAILURE
                }
            }
        }
        Command::RunUnits => match harness.run_units() {
            Ok(report) => finish_run(&report, &config),
            Err(e) => {
                error!("{e}");
                ExitCode::FAILURE
            }
        },
    }
}

fn finish_run(report: &TestReport, config: &Config) -> ExitCode {
    if let Err(e) = artifacts::write_artifacts(report, &config.output) {
        error!("{e}");
        return ExitCode::FAILURE;
    }

    println!("{}", report.ci_notice());

    if report.passed() {
        info!(
            "Leaked (not failing on this stat): {}",
            report.leaked_bytes()
        );
        info!(
            "Tests ran successfully! Time elapsed {} seconds. Passed {} tests.",
            report.elapsed_secs(),
            report.total_tests()
        );
        ExitCode::SUCCESS
    } else {
        error!(
            "Failed tests: {}. Status: {}",
            report.failed_tests(),
            report.status()
        );
        ExitCode::FAILURE
    }
}
