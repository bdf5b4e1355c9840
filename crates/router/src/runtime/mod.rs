//! Runtime module: process lifecycle (boot, listener, connections, shutdown).

pub mod boot;
pub mod conn;
pub mod serve;
pub mod stop;
