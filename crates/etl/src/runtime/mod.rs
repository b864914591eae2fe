//! Runtime module — process lifecycle: boot, shutdown signal.

pub mod boot;
pub mod stop;
