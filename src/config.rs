
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use lazy_static::lazy_static;
use regex::Regex;
use serde::{Serialize, Deserialize};

use crate::devices::MeasurementMode;
use crate::error::{Error, Result};
use crate::utils;

lazy_static! {
	static ref RANGE_RE: Regex    = Regex::new("^\\s*([^:\\s]+)\\s*:\\s*([^:\\s]+)\\s*:\\s*([^:\\s]+)\\s*$").unwrap();
	static ref QUANTITY_RE: Regex = Regex::new("^([0-9]*\\.?[0-9]+(?:[eE][-+]?[0-9]+)?)([kMm]?)$").unwrap();
}

pub const DEFAULT_SETTLE_MS:u64       = 10;
pub const DEFAULT_WARMUP_MS:u64       = 2000;
pub const DEFAULT_POLL_TIMEOUT_MS:u64 = 10_000;

// One output file per amplitude; anything past this is a typo in the step
pub const MAX_AMPLITUDE_STEPS:usize   = 10_000;

// Inclusive frequency sweep in whole hertz
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct FrequencyRange {
	pub start_hz: u32,
	pub end_hz: u32,
	pub step_hz: u32,
}

// Half-open amplitude sweep in volts
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct AmplitudeRange {
	pub start_v: f64,
	pub end_v: f64,
	pub step_v: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Timing {
	// Delay after each frequency change before the capture is trusted
	pub settle_ms: u64,
	// Delay after the measurement is first started
	pub warmup_ms: u64,
	// None waits for the device forever
	pub poll_timeout_ms: Option<u64>,
}

impl Default for Timing {
	fn default() -> Self {
		Self {
			settle_ms: DEFAULT_SETTLE_MS,
			warmup_ms: DEFAULT_WARMUP_MS,
			poll_timeout_ms: Some(DEFAULT_POLL_TIMEOUT_MS),
		}
	}
}

impl Timing {
	// No delays at all, for simulated devices
	pub fn immediate() -> Self { Self{ settle_ms: 0, warmup_ms: 0, poll_timeout_ms: Some(DEFAULT_POLL_TIMEOUT_MS) } }

	pub fn settle(&self) -> Duration { Duration::from_millis(self.settle_ms) }
	pub fn warmup(&self) -> Duration { Duration::from_millis(self.warmup_ms) }
	pub fn poll_timeout(&self) -> Option<Duration> { self.poll_timeout_ms.map(Duration::from_millis) }
}

fn default_output_dir() -> PathBuf { PathBuf::from(".") }

// Everything a sweep needs, fixed before it starts
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SweepParams {
	pub frequency: FrequencyRange,
	pub amplitude: AmplitudeRange,
	pub reference_ohm: f64,
	#[serde(default)]
	pub mode: MeasurementMode,
	#[serde(default)]
	pub timing: Timing,
	#[serde(default = "default_output_dir")]
	pub output_dir: PathBuf,
}

impl SweepParams {

	pub fn new(frequency:FrequencyRange, amplitude:AmplitudeRange, reference_ohm:f64) -> Self {
		Self {
			frequency,
			amplitude,
			reference_ohm,
			mode: MeasurementMode::default(),
			timing: Timing::default(),
			output_dir: default_output_dir(),
		}
	}

	pub fn from_json_str(s:&str) -> Result<Self> {
		serde_json::from_str(s).map_err(|e| Error::config(format!("Unable to parse sweep configuration: {}", e)))
	}

	pub fn from_json_file<P: AsRef<Path>>(path:P) -> Result<Self> {
		let path = path.as_ref();
		let contents = fs::read_to_string(path)
			.map_err(|e| Error::config(format!("Unable to read {}: {}", path.display(), e)))?;
		Self::from_json_str(&contents)
	}

	pub fn validate(&self) -> Result<()> {
		self.frequency.validate()?;
		self.amplitude.validate()?;

		if !self.reference_ohm.is_finite() || self.reference_ohm <= 0.0 {
			return Err(Error::config(format!("Reference resistance must be positive, got {} Ohm", self.reference_ohm)));
		}

		Ok(())
	}

	pub fn frequencies(&self) -> impl Iterator<Item = u32> {
		utils::frequency_steps(self.frequency.start_hz, self.frequency.end_hz, self.frequency.step_hz)
	}

	pub fn amplitudes(&self) -> impl Iterator<Item = f64> {
		utils::amplitude_steps(self.amplitude.start_v, self.amplitude.end_v, self.amplitude.step_v)
	}

	pub fn amplitude_count(&self) -> usize { self.amplitude.step_count() }

	pub fn points_per_amplitude(&self) -> usize {
		utils::frequency_step_count(self.frequency.start_hz, self.frequency.end_hz, self.frequency.step_hz)
	}

	// None if the count doesn't fit in a usize
	pub fn total_points(&self) -> Option<usize> {
		self.points_per_amplitude().checked_mul(self.amplitude_count())
	}

}

impl FrequencyRange {

	pub fn new(start_hz:u32, end_hz:u32, step_hz:u32) -> Self { Self{ start_hz, end_hz, step_hz } }

	// "start:end:step", each optionally suffixed with k or M
	pub fn parse(s:&str) -> Result<Self> {
		let (start, end, step) = split_range(s)?;
		Ok(Self{ start_hz: whole_hertz(&start)?, end_hz: whole_hertz(&end)?, step_hz: whole_hertz(&step)? })
	}

	pub fn validate(&self) -> Result<()> {
		if self.start_hz == 0 { return Err(Error::config("Start frequency must be above 0 Hz")); }
		if self.step_hz == 0 { return Err(Error::config("Frequency step must be positive")); }
		if self.end_hz < self.start_hz {
			return Err(Error::config(format!("End frequency {} Hz is below start frequency {} Hz", self.end_hz, self.start_hz)));
		}
		Ok(())
	}

}

impl AmplitudeRange {

	pub fn new(start_v:f64, end_v:f64, step_v:f64) -> Self { Self{ start_v, end_v, step_v } }

	// "start:end:step" in volts, each optionally suffixed with m for millivolts
	pub fn parse(s:&str) -> Result<Self> {
		let (start, end, step) = split_range(s)?;
		Ok(Self{ start_v: quantity(&start)?, end_v: quantity(&end)?, step_v: quantity(&step)? })
	}

	pub fn validate(&self) -> Result<()> {
		if !(self.start_v.is_finite() && self.end_v.is_finite() && self.step_v.is_finite()) {
			return Err(Error::config("Amplitude range must be finite"));
		}
		if self.start_v < 0.0 { return Err(Error::config("Amplitude must not be negative")); }
		if self.step_v <= 0.0 { return Err(Error::config("Amplitude step must be positive")); }
		if self.end_v < self.start_v {
			return Err(Error::config(format!("End amplitude {} V is below start amplitude {} V", self.end_v, self.start_v)));
		}
		if self.step_count() > MAX_AMPLITUDE_STEPS {
			return Err(Error::config(format!("Amplitude step {} V over {}..{} V makes more than {} passes",
				self.step_v, self.start_v, self.end_v, MAX_AMPLITUDE_STEPS)));
		}
		Ok(())
	}

	pub fn step_count(&self) -> usize { utils::amplitude_step_count(self.start_v, self.end_v, self.step_v) }

}

fn split_range(s:&str) -> Result<(String, String, String)> {
	let caps = RANGE_RE.captures(s).ok_or_else(|| Error::config(format!("Expected start:end:step, got {:?}", s)))?;
	Ok((caps[1].to_owned(), caps[2].to_owned(), caps[3].to_owned()))
}

fn quantity(s:&str) -> Result<f64> {
	let caps = QUANTITY_RE.captures(s).ok_or_else(|| Error::config(format!("Unable to parse {:?} as a number", s)))?;
	let value:f64 = caps[1].parse::<f64>().map_err(|_| Error::config(format!("Unable to parse {:?} as a number", s)))?;

	Ok(match &caps[2] {
		"k" => value * 1e3,
		"M" => value * 1e6,
		"m" => value / 1e3,
		_   => value,
	})
}

fn whole_hertz(s:&str) -> Result<u32> {
	let hz:f64 = quantity(s)?;
	let rounded:f64 = hz.round();
	if (hz - rounded).abs() > 1e-6 || rounded > u32::MAX as f64 {
		return Err(Error::config(format!("Frequency {:?} is not a whole number of hertz in range", s)));
	}
	Ok(rounded as u32)
}
