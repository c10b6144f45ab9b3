pub mod backend;
pub mod candidates;
pub mod config;
pub mod device;
pub mod errors;
pub mod mapper;
pub mod monitor;
pub mod settings;
pub mod solver;
pub mod source;

pub use device::{DeviceInfo, DeviceType, InputCapabilities, MappedDevice};
pub use errors::{MapperError, Result};
pub use mapper::{DeviceMapped, InputMapper, MapperOptions};
pub use monitor::{LogicalMonitorId, Monitor, MonitorId, MonitorLayout, MonitorSource};
pub use settings::InputSettings;
pub use solver::TieBreak;
