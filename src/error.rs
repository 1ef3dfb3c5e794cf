use thiserror::Error;

#[derive(Error, Debug)]
pub enum SweepError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("Connection timeout")]
    Timeout,
    #[error("Invalid sweep configuration: {0}")]
    Config(String),
    #[error("Parse error: {0}")]
    Parse(String),
    #[error("Framing error: {0}")]
    Framing(String),
    #[error("Device not ready: {0}")]
    DeviceNotReady(String),
    #[error("Sweep start timed out after {attempts} polls: laser never reported standing by trigger")]
    SweepStartTimeout { attempts: u32 },
    #[error("Measurement forcibly stopped by the power meter after {count} samples")]
    MeasurementAborted { count: u32 },
    #[error("Instrument error {code}: {message}")]
    Device { code: i32, message: String },
    #[error("Invalid address: {0}")]
    InvalidAddress(String),
    #[error("Sweep cancelled")]
    Cancelled,
}
