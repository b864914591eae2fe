//! ETL module — window resolution, per-source hour walk, whole-run loop.

pub mod window;
pub mod driver;
pub mod run;

pub use window::{resolve_window, ProcessingWindow, ResolvedStart, StartPoint};
pub use driver::{system_clock, Clock, DriverSettings, HourOutcome, SourceDriver, SourceReport, StopReason};
pub use run::{Etl, RunReport, Source};
