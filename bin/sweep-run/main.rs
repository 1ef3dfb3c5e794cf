use clap::Parser;
use env_logger::Env;
use log::{error, info};
use sme_sweep::{
    AppConfig, CancelToken, Mpm, SmeSweep, SweepConfig, SweepRecorder, TcpTransport, Tsl,
    load_config_or_default,
};
use std::path::PathBuf;

/// Single-measurement sweep runner: one synchronized wavelength sweep with
/// power logging, saved as JSON.
#[derive(Parser, Debug)]
#[command(name = "sweep-run")]
#[command(about = "Run one SME wavelength sweep against a laser/power-meter pair", long_about = None)]
struct Args {
    /// Path to configuration file (TOML)
    #[arg(short, long, value_name = "FILE")]
    config: Option<PathBuf>,

    /// Start wavelength in nm
    #[arg(long)]
    start: Option<f64>,

    /// Stop wavelength in nm
    #[arg(long)]
    stop: Option<f64>,

    /// Trigger step in nm
    #[arg(long)]
    step: Option<f64>,

    /// Sweep speed in nm/s
    #[arg(long)]
    speed: Option<f64>,

    /// Laser output power in dBm
    #[arg(long)]
    power: Option<f64>,

    /// Directory for sweep result files
    #[arg(short, long, value_name = "DIR")]
    output: Option<PathBuf>,

    /// Override log level (trace, debug, info, warn, error)
    #[arg(short, long, value_name = "LEVEL")]
    log_level: Option<String>,
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = Args::parse();
    let config = load_config_or_default(args.config.as_deref());

    let log_level = args
        .log_level
        .clone()
        .unwrap_or_else(|| config.logging.log_level.clone());
    env_logger::Builder::from_env(Env::default().default_filter_or(log_level)).init();

    let sweep_config = sweep_config_from(&config, &args);
    info!(
        "Sweep window {} -> {} nm, step {} nm, {} nm/s, {} dBm",
        sweep_config.start_nm,
        sweep_config.stop_nm,
        sweep_config.step_nm,
        sweep_config.speed_nm_per_s,
        sweep_config.power_dbm
    );

    let cancel = CancelToken::new();
    let ctrlc_token = cancel.clone();
    ctrlc::set_handler(move || {
        info!("Interrupt received, cancelling sweep");
        ctrlc_token.cancel();
    })?;

    let laser_transport = TcpTransport::new(
        &config.laser.host,
        config.laser.port,
        config.laser.terminator()?,
    )?;
    let meter_transport = TcpTransport::new(
        &config.meter.host,
        config.meter.port,
        config.meter.terminator()?,
    )?;

    let mut sweep = SmeSweep::new(Tsl::new(laser_transport), Mpm::new(meter_transport))
        .with_poll_options(config.polling.to_poll_options())
        .with_cancel_token(cancel)
        .with_target(config.sweep.module, config.sweep.channel);

    info!("Laser: {}", sweep.laser_mut().identify()?.trim());
    info!("Power meter: {}", sweep.meter_mut().identify()?.trim());

    let record = match sweep.run(&sweep_config) {
        Ok(record) => record,
        Err(e) => {
            error!("Sweep failed: {e}");
            // Surface the meter's own error register when it has one.
            if let Err(device_err) = sweep.meter_mut().check_error() {
                error!("Power meter reports: {device_err}");
            }
            return Err(e.into());
        }
    };

    info!(
        "Sweep completed: {} samples in {:.2} s",
        record.samples.len(),
        record.elapsed_s
    );

    let output_dir = args
        .output
        .unwrap_or_else(|| PathBuf::from(&config.logging.output_dir));
    let path = SweepRecorder::new(output_dir).save(&record)?;
    println!("Saved sweep to {}", path.display());

    Ok(())
}

fn sweep_config_from(config: &AppConfig, args: &Args) -> SweepConfig {
    let mut sweep_config = config.sweep.to_sweep_config();
    if let Some(start) = args.start {
        sweep_config.start_nm = start;
    }
    if let Some(stop) = args.stop {
        sweep_config.stop_nm = stop;
    }
    if let Some(step) = args.step {
        sweep_config.step_nm = step;
    }
    if let Some(speed) = args.speed {
        sweep_config.speed_nm_per_s = speed;
    }
    if let Some(power) = args.power {
        sweep_config.power_dbm = power;
    }
    sweep_config
}
