//! Metric Transformers
//!
//! Each transformer turns normalized records into one metric row per
//! suburb, ordered by suburb name.

pub mod energy;
pub mod ev;
pub mod pollution;

pub use energy::{transform_energy, EnergyMetrics};
pub use ev::{transform_ev, EvMetrics};
pub use pollution::{transform_pollution, PollutionMetrics};
