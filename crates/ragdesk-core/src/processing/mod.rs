//! Document processing: the ingestion controller and the recovery sweep

mod controller;
mod sweep;

pub use controller::{DocumentProcessor, ProcessOutcome};
pub use sweep::{RecoverySweep, SweepReport};
