pub mod block;
pub mod config;
pub mod error;
pub mod errorcode;
pub mod instrument;
pub mod recorder;
pub mod scpi;
pub mod sweep;
pub mod transport;
pub mod utils;

pub use block::{SAMPLE_WIDTH, decode_ieee_block, encode_ieee_block, expected_block_size};
pub use config::{AppConfig, load_config, load_config_or_default};
pub use error::SweepError;
pub use errorcode::describe_meter_error;
pub use instrument::{LaserSweepState, MeasurementStatus, Mpm, RangeMode, Tsl};
pub use recorder::SweepRecorder;
pub use sweep::{
    CancelToken, PollOptions, SamplePoint, SmeSweep, SweepConfig, SweepRecord, SweepStage,
};
pub use transport::{ConnectionConfig, TcpTransport, TcpTransportBuilder, Terminator, Transport};
pub use utils::{Sleeper, StdSleeper, poll_bounded};
