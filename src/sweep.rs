//! SME (single measurement mode) sweep orchestration.
//!
//! One synchronized cycle: configure the laser and the power meter, arm the
//! sweep, release it with a software trigger, poll the meter until logging
//! completes, then fetch the binary logging buffer. The laser and meter are
//! two independent, exclusively owned transport handles; the orchestrator is
//! the only writer to each, and every poll loop is bounded and checks the
//! cancel token.

use crate::error::SweepError;
use crate::instrument::{LaserSweepState, MeasurementStatus, Mpm, RangeMode, Tsl};
use crate::transport::Transport;
use crate::utils::{Sleeper, StdSleeper, poll_bounded};
use chrono::{DateTime, Utc};
use log::{debug, info, warn};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, Instant};

/// Sweep window limits of the supported instrument pair.
pub const MIN_WAVELENGTH_NM: f64 = 1250.0;
pub const MAX_WAVELENGTH_NM: f64 = 1630.0;
pub const MIN_STEP_NM: f64 = 0.001;
pub const MAX_STEP_NM: f64 = 10.0;
pub const MIN_SPEED_NM_PER_S: f64 = 1.0;
pub const MAX_SPEED_NM_PER_S: f64 = 200.0;
pub const MIN_POWER_DBM: f64 = -15.0;
pub const MAX_POWER_DBM: f64 = 13.0;

/// Parameters of one sweep. Validated locally before anything is sent.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct SweepConfig {
    pub start_nm: f64,
    pub stop_nm: f64,
    pub step_nm: f64,
    pub speed_nm_per_s: f64,
    pub power_dbm: f64,
    pub range: RangeMode,
}

impl Default for SweepConfig {
    fn default() -> Self {
        Self {
            start_nm: 1500.0,
            stop_nm: 1600.0,
            step_nm: 0.1,
            speed_nm_per_s: 50.0,
            power_dbm: 0.0,
            range: RangeMode::default(),
        }
    }
}

impl SweepConfig {
    pub fn validate(&self) -> Result<(), SweepError> {
        if !(self.start_nm < self.stop_nm) {
            return Err(SweepError::Config(format!(
                "start wavelength {} nm must be below stop wavelength {} nm",
                self.start_nm, self.stop_nm
            )));
        }
        for (label, value) in [("start", self.start_nm), ("stop", self.stop_nm)] {
            if !(MIN_WAVELENGTH_NM..=MAX_WAVELENGTH_NM).contains(&value) {
                return Err(SweepError::Config(format!(
                    "{label} wavelength {value} nm outside {MIN_WAVELENGTH_NM}-{MAX_WAVELENGTH_NM} nm"
                )));
            }
        }
        let span = self.stop_nm - self.start_nm;
        if !(MIN_STEP_NM..=MAX_STEP_NM).contains(&self.step_nm) || self.step_nm > span {
            return Err(SweepError::Config(format!(
                "step {} nm outside {MIN_STEP_NM}-{MAX_STEP_NM} nm or larger than the {span} nm span",
                self.step_nm
            )));
        }
        if !(MIN_SPEED_NM_PER_S..=MAX_SPEED_NM_PER_S).contains(&self.speed_nm_per_s) {
            return Err(SweepError::Config(format!(
                "sweep speed {} nm/s outside {MIN_SPEED_NM_PER_S}-{MAX_SPEED_NM_PER_S} nm/s",
                self.speed_nm_per_s
            )));
        }
        if !(MIN_POWER_DBM..=MAX_POWER_DBM).contains(&self.power_dbm) {
            return Err(SweepError::Config(format!(
                "output power {} dBm outside {MIN_POWER_DBM}-{MAX_POWER_DBM} dBm",
                self.power_dbm
            )));
        }
        Ok(())
    }

    /// Number of trigger pulses, and therefore logged samples, the window
    /// produces. Rounded, not truncated: `span / step` lands just below the
    /// integer for steps like 0.1 that have no exact binary representation.
    pub fn expected_points(&self) -> u32 {
        ((self.stop_nm - self.start_nm) / self.step_nm).round() as u32 + 1
    }

    pub fn midpoint_nm(&self) -> f64 {
        (self.start_nm + self.stop_nm) / 2.0
    }
}

/// Poll intervals and retry bounds for the orchestrator's wait loops.
#[derive(Debug, Clone)]
pub struct PollOptions {
    /// `*OPC?` loop while the optical output stabilizes.
    pub output_ready_interval: Duration,
    pub output_ready_attempts: u32,
    /// `WMOD?` readback-confirm loop.
    pub mode_confirm_interval: Duration,
    pub mode_confirm_attempts: u32,
    /// `:WAV:SWE?` loop waiting for the standing-by-trigger state.
    pub sweep_start_interval: Duration,
    pub sweep_start_attempts: u32,
    /// `STAT?` loop waiting for measurement completion.
    pub status_interval: Duration,
    pub status_attempts: u32,
}

impl Default for PollOptions {
    fn default() -> Self {
        Self {
            output_ready_interval: Duration::from_millis(500),
            output_ready_attempts: 20,
            mode_confirm_interval: Duration::from_millis(200),
            mode_confirm_attempts: 10,
            sweep_start_interval: Duration::from_millis(200),
            sweep_start_attempts: 100,
            status_interval: Duration::from_millis(200),
            status_attempts: 4500,
        }
    }
}

/// Cooperative cancellation flag, checked at every poll iteration.
#[derive(Debug, Clone, Default)]
pub struct CancelToken {
    flag: Arc<AtomicBool>,
}

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.flag.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.flag.load(Ordering::SeqCst)
    }
}

/// Orchestrator state, advanced only by [`SmeSweep::run`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SweepStage {
    Idle,
    Configuring,
    AwaitingSweepStart,
    Sweeping,
    AwaitingMeasurementComplete,
    Fetching,
    Done,
    Failed,
}

/// One logged sample paired with its nominal wavelength on the sweep grid.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SamplePoint {
    pub wavelength_nm: f64,
    pub power_dbm: f32,
}

/// Completed sweep result.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SweepRecord {
    pub start_nm: f64,
    pub stop_nm: f64,
    pub step_nm: f64,
    pub speed_nm_per_s: f64,
    pub power_dbm: f64,
    pub completed_at: DateTime<Utc>,
    pub elapsed_s: f64,
    pub samples: Vec<SamplePoint>,
}

/// SME sweep orchestrator over one laser and one power meter.
pub struct SmeSweep<L: Transport, M: Transport> {
    laser: Tsl<L>,
    meter: Mpm<M>,
    poll: PollOptions,
    cancel: CancelToken,
    sleeper: Box<dyn Sleeper>,
    stage: SweepStage,
    module: u8,
    channel: u8,
}

impl<L: Transport, M: Transport> SmeSweep<L, M> {
    pub fn new(laser: Tsl<L>, meter: Mpm<M>) -> Self {
        Self {
            laser,
            meter,
            poll: PollOptions::default(),
            cancel: CancelToken::new(),
            sleeper: Box::new(StdSleeper),
            stage: SweepStage::Idle,
            module: 0,
            channel: 1,
        }
    }

    pub fn with_poll_options(mut self, poll: PollOptions) -> Self {
        self.poll = poll;
        self
    }

    pub fn with_cancel_token(mut self, cancel: CancelToken) -> Self {
        self.cancel = cancel;
        self
    }

    pub fn with_sleeper(mut self, sleeper: Box<dyn Sleeper>) -> Self {
        self.sleeper = sleeper;
        self
    }

    /// Module/channel the logging buffer is fetched from (default 0,1).
    pub fn with_target(mut self, module: u8, channel: u8) -> Self {
        self.module = module;
        self.channel = channel;
        self
    }

    pub fn stage(&self) -> SweepStage {
        self.stage
    }

    pub fn laser_mut(&mut self) -> &mut Tsl<L> {
        &mut self.laser
    }

    pub fn meter_mut(&mut self) -> &mut Mpm<M> {
        &mut self.meter
    }

    /// Run one full sweep cycle. Any error leaves the orchestrator in
    /// `Failed`; the instruments stay in whatever state they reached, except
    /// on cancellation where a best-effort stop is sent to both.
    pub fn run(&mut self, config: &SweepConfig) -> Result<SweepRecord, SweepError> {
        self.stage = SweepStage::Idle;
        match self.run_inner(config) {
            Ok(record) => {
                self.stage = SweepStage::Done;
                Ok(record)
            }
            Err(e) => {
                self.stage = SweepStage::Failed;
                if matches!(e, SweepError::Cancelled) {
                    self.abort_devices();
                }
                Err(e)
            }
        }
    }

    fn run_inner(&mut self, config: &SweepConfig) -> Result<SweepRecord, SweepError> {
        config.validate()?;
        info!(
            "Starting SME sweep: {} -> {} nm, step {} nm, {} nm/s, {} dBm",
            config.start_nm, config.stop_nm, config.step_nm, config.speed_nm_per_s, config.power_dbm
        );

        self.stage = SweepStage::Configuring;
        self.configure_laser(config)?;
        self.configure_meter(config)?;

        self.stage = SweepStage::AwaitingSweepStart;
        // Meter first: it must already be armed for triggers when the ramp
        // starts.
        self.meter.start_measurement()?;
        self.laser.start_sweep()?;
        self.await_sweep_armed()?;

        self.stage = SweepStage::Sweeping;
        let started = Instant::now();
        self.laser.issue_soft_trigger()?;

        self.stage = SweepStage::AwaitingMeasurementComplete;
        let count = self.await_completion()?;
        let elapsed = started.elapsed();
        info!("Measurement completed: {count} samples in {elapsed:.2?}");

        self.stage = SweepStage::Fetching;
        let powers = self
            .meter
            .fetch_logging_data(self.module, self.channel, count)?;

        let samples = powers
            .into_iter()
            .enumerate()
            .map(|(i, power_dbm)| SamplePoint {
                wavelength_nm: config.start_nm + i as f64 * config.step_nm,
                power_dbm,
            })
            .collect();

        Ok(SweepRecord {
            start_nm: config.start_nm,
            stop_nm: config.stop_nm,
            step_nm: config.step_nm,
            speed_nm_per_s: config.speed_nm_per_s,
            power_dbm: config.power_dbm,
            completed_at: Utc::now(),
            elapsed_s: elapsed.as_secs_f64(),
            samples,
        })
    }

    /// Reset and configure the laser. Output enable precedes the sweep
    /// parameters; the firmware rejects them while the output is settling.
    fn configure_laser(&mut self, config: &SweepConfig) -> Result<(), SweepError> {
        let Self {
            laser,
            cancel,
            sleeper,
            poll,
            ..
        } = self;

        laser.clear_status()?;
        laser.reset()?;
        laser.select_legacy_commands()?;

        if !laser.optical_output_enabled()? {
            debug!("Enabling optical output");
            laser.enable_optical_output()?;
            let ready = poll_bounded(
                || {
                    if cancel.is_cancelled() {
                        return Err(SweepError::Cancelled);
                    }
                    laser.operation_complete()
                },
                poll.output_ready_attempts,
                poll.output_ready_interval,
                &**sleeper,
            )?;
            if !ready {
                return Err(SweepError::DeviceNotReady(
                    "optical output did not stabilize within the poll budget".to_string(),
                ));
            }
        }

        laser.configure_sweep(config)
    }

    /// Stop any running measurement, then configure mode before the sweep
    /// window; window parameters are rejected in an incompatible mode.
    fn configure_meter(&mut self, config: &SweepConfig) -> Result<(), SweepError> {
        let Self {
            meter,
            cancel,
            sleeper,
            poll,
            ..
        } = self;

        meter.stop_measurement()?;
        meter.set_unit_dbm()?;
        meter.set_range_mode(config.range)?;
        meter.enable_external_trigger()?;

        let mode = config.range.measurement_mode();
        meter.set_measurement_mode(mode)?;
        // The mode write is occasionally ignored right after STOP; confirm
        // the readback and re-issue until it sticks.
        let confirmed = poll_bounded(
            || {
                if cancel.is_cancelled() {
                    return Err(SweepError::Cancelled);
                }
                if meter.measurement_mode()?.contains(mode) {
                    return Ok(true);
                }
                meter.set_measurement_mode(mode)?;
                Ok(false)
            },
            poll.mode_confirm_attempts,
            poll.mode_confirm_interval,
            &**sleeper,
        )?;
        if !confirmed {
            return Err(SweepError::DeviceNotReady(format!(
                "measurement mode {mode} was not accepted"
            )));
        }

        meter.set_sweep_window(config.start_nm, config.stop_nm, config.step_nm)?;
        meter.set_sweep_speed(config.speed_nm_per_s)?;
        meter.set_average_wavelength(config.midpoint_nm())?;

        // In auto range mode the module sizes its own logging buffer.
        if matches!(config.range, RangeMode::Manual { .. }) {
            meter.set_logging_points(config.expected_points())?;
        }
        Ok(())
    }

    /// Poll the laser until it stands by for the trigger, re-issuing the
    /// start command each round; it can be dropped while the laser settles.
    fn await_sweep_armed(&mut self) -> Result<(), SweepError> {
        let Self {
            laser,
            cancel,
            sleeper,
            poll,
            ..
        } = self;

        let mut attempts = 0;
        let armed = poll_bounded(
            || {
                if cancel.is_cancelled() {
                    return Err(SweepError::Cancelled);
                }
                attempts += 1;
                if laser.sweep_state()? == LaserSweepState::StandingByTrigger {
                    return Ok(true);
                }
                laser.start_sweep()?;
                Ok(false)
            },
            poll.sweep_start_attempts,
            poll.sweep_start_interval,
            &**sleeper,
        )?;

        if !armed {
            return Err(SweepError::SweepStartTimeout { attempts });
        }
        Ok(())
    }

    /// Poll `STAT?` until the measurement leaves the in-progress state. The
    /// count from the terminal poll is the final sample count.
    fn await_completion(&mut self) -> Result<u32, SweepError> {
        let Self {
            meter,
            cancel,
            sleeper,
            poll,
            ..
        } = self;

        let mut final_count = None;
        let done = poll_bounded(
            || {
                if cancel.is_cancelled() {
                    return Err(SweepError::Cancelled);
                }
                let (status, count) = meter.logging_status()?;
                match status {
                    MeasurementStatus::InProgress => {
                        debug!("Logging in progress: {count} samples");
                        Ok(false)
                    }
                    MeasurementStatus::Completed => {
                        final_count = Some(count);
                        Ok(true)
                    }
                    MeasurementStatus::ForciblyStopped => {
                        Err(SweepError::MeasurementAborted { count })
                    }
                }
            },
            poll.status_attempts,
            poll.status_interval,
            &**sleeper,
        )?;

        match (done, final_count) {
            (true, Some(count)) => Ok(count),
            _ => Err(SweepError::DeviceNotReady(
                "measurement did not complete within the poll budget".to_string(),
            )),
        }
    }

    /// Best-effort stop of both instruments after a cancellation, so the
    /// sweep is not left running unattended.
    fn abort_devices(&mut self) {
        if let Err(e) = self.meter.stop_measurement() {
            warn!("Failed to stop meter measurement: {e}");
        }
        if let Err(e) = self.laser.stop_sweep() {
            warn!("Failed to stop laser sweep: {e}");
        }
    }
}
