//! Tunable laser source facade (legacy command set).
//!
//! Thin wrapper over the transport: each method maps to one command, with no
//! local caching of instrument state. Only the subset driven by the sweep
//! orchestrator is exposed.

use crate::error::SweepError;
use crate::scpi::{format_command, parse_scalar, parse_tuple};
use crate::sweep::SweepConfig;
use crate::transport::Transport;

/// Sweep state reported by `:WAV:SWE?`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LaserSweepState {
    Stopped,
    Running,
    /// Armed and waiting for a trigger before starting the ramp.
    StandingByTrigger,
    Preparing,
}

impl LaserSweepState {
    pub fn from_code(code: i32) -> Result<Self, SweepError> {
        match code {
            0 => Ok(LaserSweepState::Stopped),
            1 => Ok(LaserSweepState::Running),
            3 => Ok(LaserSweepState::StandingByTrigger),
            4 => Ok(LaserSweepState::Preparing),
            other => Err(SweepError::Parse(format!(
                "unknown laser sweep state code {other}"
            ))),
        }
    }
}

/// Tunable laser facade. Owns its transport exclusively.
pub struct Tsl<T: Transport> {
    transport: T,
}

impl<T: Transport> Tsl<T> {
    pub fn new(transport: T) -> Self {
        Self { transport }
    }

    pub fn identify(&mut self) -> Result<String, SweepError> {
        self.transport.query("*IDN?")
    }

    pub fn clear_status(&mut self) -> Result<(), SweepError> {
        self.transport.write_line("*CLS")
    }

    pub fn reset(&mut self) -> Result<(), SweepError> {
        self.transport.write_line("*RST")
    }

    /// Select the legacy command set and the CR+LF command delimiter.
    ///
    /// Must precede the sweep parameter commands; the firmware rejects them
    /// under the other command dialect.
    pub fn select_legacy_commands(&mut self) -> Result<(), SweepError> {
        self.transport.write_line("SYST:COMM:COD 0")?;
        self.transport.write_line("SYST:COMM:GPIB:DEL 2")
    }

    pub fn optical_output_enabled(&mut self) -> Result<bool, SweepError> {
        let response = self.transport.query("POW:STAT?")?;
        Ok(parse_scalar::<i32>(&response)? != 0)
    }

    /// Turn the optical output on. Takes effect asynchronously; completion is
    /// observed through [`Tsl::operation_complete`].
    pub fn enable_optical_output(&mut self) -> Result<(), SweepError> {
        self.transport.write_line("POW:STAT 1")
    }

    /// `*OPC?`: true once all pending operations have finished.
    pub fn operation_complete(&mut self) -> Result<bool, SweepError> {
        let response = self.transport.query("*OPC?")?;
        Ok(parse_scalar::<i32>(&response)? != 0)
    }

    /// Write the full sweep setup: units, power control, shutter, output
    /// power, sweep window, speed and trigger step.
    pub fn configure_sweep(&mut self, config: &SweepConfig) -> Result<(), SweepError> {
        self.transport.write_line("POW:UNIT 0")?; // dBm
        self.transport.write_line("WAV:UNIT 0")?; // nm
        self.transport.write_line("POW:ATT:AUT 1")?; // auto power control
        self.transport.write_line("COHCtrl 0")?; // coherence control off
        self.transport.write_line("POW:SHUT 0")?; // open internal shutter

        self.transport
            .write_line(&format_command("POW", &[config.power_dbm]))?;
        self.transport
            .write_line(&format_command("WAV:SWE:STAR", &[config.start_nm]))?;
        self.transport
            .write_line(&format_command("WAV:SWE:STOP", &[config.stop_nm]))?;
        self.transport
            .write_line(&format_command("WAV:SWE:SPE", &[config.speed_nm_per_s]))?;
        self.transport
            .write_line(&format_command("TRIG:OUTP:STEP", &[config.step_nm]))
    }

    /// Start a single sweep.
    pub fn start_sweep(&mut self) -> Result<(), SweepError> {
        self.transport.write_line(":WAV:SWE 1")
    }

    pub fn stop_sweep(&mut self) -> Result<(), SweepError> {
        self.transport.write_line(":WAV:SWE 0")
    }

    pub fn sweep_state(&mut self) -> Result<LaserSweepState, SweepError> {
        let response = self.transport.query(":WAV:SWE?")?;
        LaserSweepState::from_code(parse_scalar(&response)?)
    }

    /// Software trigger releasing an armed sweep into the wavelength ramp.
    pub fn issue_soft_trigger(&mut self) -> Result<(), SweepError> {
        self.transport.write_line(":WAV:SWE:SOFT")
    }

    /// Pop one entry from the instrument error queue.
    pub fn last_error(&mut self) -> Result<(i32, String), SweepError> {
        let response = self.transport.query("SYST:ERR?")?;
        let fields = parse_tuple(&response);
        if fields.len() < 2 {
            return Err(SweepError::Parse(format!(
                "malformed error response {response:?}"
            )));
        }
        Ok((parse_scalar(fields[0])?, fields[1].to_string()))
    }

    pub fn transport_mut(&mut self) -> &mut T {
        &mut self.transport
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transport::scripted::ScriptedTransport;

    #[test]
    fn sweep_state_codes() {
        assert_eq!(
            LaserSweepState::from_code(0).unwrap(),
            LaserSweepState::Stopped
        );
        assert_eq!(
            LaserSweepState::from_code(3).unwrap(),
            LaserSweepState::StandingByTrigger
        );
        assert!(matches!(
            LaserSweepState::from_code(2),
            Err(SweepError::Parse(_))
        ));
    }

    #[test]
    fn configure_sweep_writes_setup_then_window() {
        let mut laser = Tsl::new(ScriptedTransport::new());
        let config = SweepConfig {
            start_nm: 1500.0,
            stop_nm: 1600.0,
            step_nm: 0.1,
            speed_nm_per_s: 50.0,
            power_dbm: 0.0,
            ..SweepConfig::default()
        };

        laser.configure_sweep(&config).unwrap();

        let writes = &laser.transport_mut().writes;
        let unit_pos = writes.iter().position(|w| w == "POW:UNIT 0").unwrap();
        let start_pos = writes
            .iter()
            .position(|w| w == "WAV:SWE:STAR 1500")
            .unwrap();
        assert!(unit_pos < start_pos, "units must be set before the window");
        assert!(writes.contains(&"TRIG:OUTP:STEP 0.1".to_string()));
    }

    #[test]
    fn last_error_splits_code_and_message() {
        let mut transport = ScriptedTransport::new();
        transport.reply("SYST:ERR?", "-222,Data out of range");
        let mut laser = Tsl::new(transport);

        assert_eq!(
            laser.last_error().unwrap(),
            (-222, "Data out of range".to_string())
        );
    }

    #[test]
    fn sweep_state_queries_and_parses() {
        let mut transport = ScriptedTransport::new();
        transport.reply(":WAV:SWE?", "3");
        let mut laser = Tsl::new(transport);

        assert_eq!(
            laser.sweep_state().unwrap(),
            LaserSweepState::StandingByTrigger
        );
    }
}
