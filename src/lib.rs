pub mod actors;
pub mod api;
pub mod config;
pub mod discovery;
pub mod monitors;
pub mod reports;
pub mod storage;
pub mod transport;
pub mod util;
#[cfg(feature = "watch")]
pub mod watch;

pub use reports::{
    AlertEvent, ChipModel, DeviceState, LeakAlertReport, ReportResponse, SensorSnapshot,
    StatusReport, ValidationError,
};
