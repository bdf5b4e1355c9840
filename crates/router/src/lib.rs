// Domain-driven module structure for the log router.

// Core infrastructure
pub mod conf;
pub mod metrics;
pub mod state;

// Domain modules
pub mod record;
pub mod route;
pub mod sink;
pub mod monitor;
pub mod runtime;
