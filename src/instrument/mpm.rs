//! Optical power meter facade.
//!
//! Covers the measurement subset the orchestrator needs: mode and trigger
//! setup, sweep window, status polling and the sized binary fetch of the
//! logging buffer.

use crate::block::{SAMPLE_WIDTH, decode_ieee_block, expected_block_size};
use crate::error::SweepError;
use crate::errorcode::describe_meter_error;
use crate::scpi::{format_command, parse_scalar, parse_tuple};
use crate::transport::Transport;
use byteorder::LittleEndian;
use log::debug;
use serde::{Deserialize, Serialize};

/// Dynamic range selection for the logging sweep.
///
/// `Manual` pins one range level (level 1 covers -30 to +10 dBm) and runs the
/// `SWEEP1` measurement mode; `Auto` is for MPM-215 modules and runs `SWEEP2`
/// with automatic gain.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum RangeMode {
    Manual { level: u8 },
    Auto,
}

impl Default for RangeMode {
    fn default() -> Self {
        RangeMode::Manual { level: 1 }
    }
}

impl RangeMode {
    /// Measurement mode mnemonic paired with this range mode.
    pub fn measurement_mode(self) -> &'static str {
        match self {
            RangeMode::Manual { .. } => "SWEEP1",
            RangeMode::Auto => "SWEEP2",
        }
    }
}

/// Logging status reported by the first field of `STAT?`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MeasurementStatus {
    InProgress,
    Completed,
    ForciblyStopped,
}

impl MeasurementStatus {
    pub fn from_code(code: i32) -> Result<Self, SweepError> {
        match code {
            0 => Ok(MeasurementStatus::InProgress),
            1 => Ok(MeasurementStatus::Completed),
            -1 => Ok(MeasurementStatus::ForciblyStopped),
            other => Err(SweepError::Parse(format!(
                "unknown measurement status code {other}"
            ))),
        }
    }
}

/// Power meter facade. Owns its transport exclusively.
pub struct Mpm<T: Transport> {
    transport: T,
}

impl<T: Transport> Mpm<T> {
    pub fn new(transport: T) -> Self {
        Self { transport }
    }

    pub fn identify(&mut self) -> Result<String, SweepError> {
        self.transport.query("*IDN?")
    }

    pub fn stop_measurement(&mut self) -> Result<(), SweepError> {
        self.transport.write_line("STOP")
    }

    pub fn set_unit_dbm(&mut self) -> Result<(), SweepError> {
        self.transport.write_line("UNIT 0")
    }

    pub fn set_range_mode(&mut self, range: RangeMode) -> Result<(), SweepError> {
        match range {
            RangeMode::Manual { level } => {
                self.transport.write_line("AUTO 0")?;
                self.transport
                    .write_line(&format_command("LEV", &[level]))
            }
            RangeMode::Auto => self.transport.write_line("AUTO 1"),
        }
    }

    pub fn enable_external_trigger(&mut self) -> Result<(), SweepError> {
        self.transport.write_line("TRIG 1")
    }

    pub fn set_measurement_mode(&mut self, mode: &str) -> Result<(), SweepError> {
        self.transport.write_line(&format!("WMOD {mode}"))
    }

    pub fn measurement_mode(&mut self) -> Result<String, SweepError> {
        self.transport.query("WMOD?")
    }

    /// `WSET <start>,<stop>,<step>`: the sweep wavelength window.
    pub fn set_sweep_window(
        &mut self,
        start_nm: f64,
        stop_nm: f64,
        step_nm: f64,
    ) -> Result<(), SweepError> {
        self.transport
            .write_line(&format_command("WSET", &[start_nm, stop_nm, step_nm]))
    }

    pub fn set_sweep_speed(&mut self, speed_nm_per_s: f64) -> Result<(), SweepError> {
        self.transport
            .write_line(&format_command("SPE", &[speed_nm_per_s]))
    }

    /// Calibration wavelength applied across the sweep, set to the window
    /// midpoint by the orchestrator.
    pub fn set_average_wavelength(&mut self, wavelength_nm: f64) -> Result<(), SweepError> {
        self.transport
            .write_line(&format_command("WAV", &[wavelength_nm]))
    }

    pub fn set_logging_points(&mut self, count: u32) -> Result<(), SweepError> {
        self.transport
            .write_line(&format_command("LOGN", &[count]))
    }

    pub fn logging_points(&mut self) -> Result<u32, SweepError> {
        let response = self.transport.query("LOGN?")?;
        parse_scalar(&response)
    }

    pub fn start_measurement(&mut self) -> Result<(), SweepError> {
        self.transport.write_line("MEAS")
    }

    /// `STAT?` -> `(status, logged point count)`.
    pub fn logging_status(&mut self) -> Result<(MeasurementStatus, u32), SweepError> {
        let response = self.transport.query("STAT?")?;
        let fields = parse_tuple(&response);
        if fields.len() != 2 {
            return Err(SweepError::Parse(format!(
                "malformed STAT? response {response:?}"
            )));
        }
        let status = MeasurementStatus::from_code(parse_scalar(fields[0])?)?;
        let count = parse_scalar(fields[1])?;
        Ok((status, count))
    }

    /// Retrieve the logging buffer for one module/channel.
    ///
    /// The transfer size is computed up front from the device-reported point
    /// count, then exactly that many bytes are read and decoded. The count
    /// reported by `LOGN?` must agree with `expected_count` from the final
    /// status poll, and the decoded sample count must match it as well.
    pub fn fetch_logging_data(
        &mut self,
        module: u8,
        channel: u8,
        expected_count: u32,
    ) -> Result<Vec<f32>, SweepError> {
        let count = self.logging_points()?;
        if count != expected_count {
            return Err(SweepError::Framing(format!(
                "device reports {count} logged points, measurement status reported {expected_count}"
            )));
        }

        let expected_size = expected_block_size(count as usize, SAMPLE_WIDTH);
        debug!("Fetching {count} samples ({expected_size} bytes) from module {module} channel {channel}");

        self.transport
            .write_line(&format_command("LOGG?", &[module, channel]))?;
        let raw = self.transport.read_exact_bytes(expected_size)?;

        let samples = decode_ieee_block::<LittleEndian>(&raw)?;
        if samples.len() != count as usize {
            return Err(SweepError::Framing(format!(
                "decoded {} samples, expected {count}",
                samples.len()
            )));
        }
        Ok(samples)
    }

    /// Query the error register; non-zero codes become [`SweepError::Device`]
    /// with the description from the static code table.
    pub fn check_error(&mut self) -> Result<(), SweepError> {
        let response = self.transport.query("ERR?")?;
        let fields = parse_tuple(&response);
        let code: i32 = parse_scalar(fields[0])?;
        if code == 0 {
            return Ok(());
        }
        Err(SweepError::Device {
            code,
            message: describe_meter_error(code).to_string(),
        })
    }

    pub fn transport_mut(&mut self) -> &mut T {
        &mut self.transport
    }
}
