//! Conf module: configuration model, layered loading and validation.

pub mod model;
pub mod load;

pub use model::{
    LogFormat, LogOutput, LoggingConfig, MonitorConfig, RouterConfig, RoutingConfig, SinkConfig,
};
pub use load::CONFIG_FILE_ENV;
