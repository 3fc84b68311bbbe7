
// Swept-frequency, swept-amplitude impedance measurements with a Digilent Analog Discovery and its
// Impedance Analyzer adapter

// Error type shared by everything below
pub mod error;

// Sweep parameters, their validation and the JSON file they can be loaded from
pub mod config;

// Impedance analyzers: the hardware (through the WaveForms runtime) and a simulator
pub mod devices;

// Per-amplitude tab separated output files
pub mod output;

// The sweep controller itself
pub mod sweep;

// Step generation for the frequency and amplitude axes
pub mod utils;

pub use config::{AmplitudeRange, FrequencyRange, SweepParams, Timing};
pub use error::{Error, Result};
pub use sweep::{run_sweep, SweepReport};
