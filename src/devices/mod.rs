
// Impedance analyzers the sweep controller can drive.  The real hardware goes through the vendor's
// WaveForms SDK (analog_discovery) and everything else that needs a device without hardware attached
// uses the simulator.

use std::sync::atomic::{AtomicBool, Ordering};

use serde::{Serialize, Deserialize};

use crate::error::{Error, Result};

pub mod analog_discovery;
pub mod simulated;

// Values of DwfState that matter to an impedance measurement
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum DeviceState {
	Ready,
	Armed,
	Done,
	Running,
	Config,
	Prefill,
	Wait,
}

impl DeviceState {
	pub fn from_code(code:u8) -> Option<Self> {
		match code {
			0 => Some(DeviceState::Ready),
			1 => Some(DeviceState::Armed),
			2 => Some(DeviceState::Done),
			3 => Some(DeviceState::Running),
			4 => Some(DeviceState::Config),
			5 => Some(DeviceState::Prefill),
			7 => Some(DeviceState::Wait),
			_ => None,
		}
	}

	pub fn is_done(self) -> bool { self == DeviceState::Done }
}

// How settings reach the hardware.  Dynamic applies every set call immediately, which is what lets
// the sweep restimulate without reconfiguring the whole instrument.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum AutoConfigure {
	Disabled,
	Enabled,
	Dynamic,
}

impl AutoConfigure {
	pub fn code(self) -> i32 {
		match self {
			AutoConfigure::Disabled => 0,
			AutoConfigure::Enabled  => 1,
			AutoConfigure::Dynamic  => 3,
		}
	}
}

// Wiring of the DUT and the reference resistor
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum MeasurementMode {
	// W1 - C1 - DUT - C2 - R - GND
	DutFirst,
	// W1 - C1 - R - C2 - DUT - GND
	ReferenceFirst,
	// Impedance Analyzer adapter module
	AdapterModule,
}

impl MeasurementMode {
	pub fn code(self) -> i32 {
		match self {
			MeasurementMode::DutFirst       => 0,
			MeasurementMode::ReferenceFirst => 1,
			MeasurementMode::AdapterModule  => 8,
		}
	}

	pub fn from_name(name:&str) -> Option<Self> {
		match name {
			"dut-first"       => Some(MeasurementMode::DutFirst),
			"reference-first" => Some(MeasurementMode::ReferenceFirst),
			"adapter-module"  => Some(MeasurementMode::AdapterModule),
			_ => None,
		}
	}
}

impl Default for MeasurementMode {
	fn default() -> Self { MeasurementMode::AdapterModule }
}

// Quantities the analyzer can report once a capture is done (DwfAnalogImpedance)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Measurement {
	Impedance,
	ImpedancePhase,
	Resistance,
	Reactance,
	Admittance,
	AdmittancePhase,
	Conductance,
	Susceptance,
	SeriesCapacitance,
	ParallelCapacitance,
	SeriesInductance,
	ParallelInductance,
	Dissipation,
	Quality,
}

impl Measurement {
	pub fn code(self) -> i32 {
		match self {
			Measurement::Impedance           => 0,
			Measurement::ImpedancePhase      => 1,
			Measurement::Resistance          => 2,
			Measurement::Reactance           => 3,
			Measurement::Admittance          => 4,
			Measurement::AdmittancePhase     => 5,
			Measurement::Conductance         => 6,
			Measurement::Susceptance         => 7,
			Measurement::SeriesCapacitance   => 8,
			Measurement::ParallelCapacitance => 9,
			Measurement::SeriesInductance    => 10,
			Measurement::ParallelInductance  => 11,
			Measurement::Dissipation         => 12,
			Measurement::Quality             => 13,
		}
	}
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DeviceInfo {
	pub index: i32,
	pub name: String,
	pub serial_num: String,
}

// The narrow slice of the vendor SDK the sweep needs.  Opening is the implementor's constructor and
// closing happens on drop (or earlier through an explicit close).
pub trait ImpedanceAnalyzer {
	fn info(&self) -> DeviceInfo;

	fn configure_auto(&mut self, mode:AutoConfigure) -> Result<()>;
	fn reset(&mut self) -> Result<()>;
	fn set_mode(&mut self, mode:MeasurementMode) -> Result<()>;
	fn set_reference_resistance(&mut self, ohms:f64) -> Result<()>;
	fn set_amplitude(&mut self, volts:f64) -> Result<()>;
	fn set_frequency(&mut self, hz:f64) -> Result<()>;

	// Start (true) or stop (false) the stimulus and measurement
	fn configure(&mut self, start:bool) -> Result<()>;

	fn status(&mut self) -> Result<DeviceState>;
	fn read_measurement(&mut self, kind:Measurement) -> Result<f64>;

	// Most recent error message reported by the device, empty if none
	fn last_error(&mut self) -> String;
}

static DEVICE_OPEN:AtomicBool = AtomicBool::new(false);

// Held by an open hardware handle.  Only one may exist per process; it's released on drop.
#[derive(Debug)]
pub struct HandleGuard { _private: () }

impl HandleGuard {
	pub fn acquire() -> Result<Self> {
		match DEVICE_OPEN.compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire) {
			Ok(_)  => Ok(HandleGuard{ _private: () }),
			Err(_) => Err(Error::Connection("A device is already open; close it before opening another".to_owned())),
		}
	}
}

impl Drop for HandleGuard {
	fn drop(&mut self) { DEVICE_OPEN.store(false, Ordering::Release); }
}
