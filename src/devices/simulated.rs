
// Software stand-in for an impedance analyzer.  It answers with the impedance of a modelled DUT at
// whatever frequency it was last told to stimulate, takes a configurable number of polls before a
// capture completes and can be told to fail a status read.  Every call is recorded so the order of
// operations can be checked afterwards.

use std::f64::consts::PI;

use log::debug;
use num_complex::Complex64;
use rand::{Rng, SeedableRng};
use rand::rngs::StdRng;
use serde::{Serialize, Deserialize};

use crate::devices::{AutoConfigure, DeviceInfo, DeviceState, ImpedanceAnalyzer, Measurement, MeasurementMode};
use crate::error::{Error, Result};

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "kebab-case")]
pub enum Dut {
	Resistor { ohms: f64 },
	Capacitor { farads: f64 },
	Inductor { henries: f64 },
	SeriesRc { ohms: f64, farads: f64 },
	ParallelRc { ohms: f64, farads: f64 },
	SeriesRlc { ohms: f64, henries: f64, farads: f64 },
}

fn capacitor(farads:f64, omega:f64) -> Complex64 { Complex64::new(0.0, -1.0 / (omega*farads)) }
fn inductor(henries:f64, omega:f64) -> Complex64 { Complex64::new(0.0, omega*henries) }

impl Dut {

	pub fn impedance(&self, hz:f64) -> Complex64 {
		let omega:f64 = 2.0*PI*hz;
		match *self {
			Dut::Resistor{ ohms }                 => Complex64::new(ohms, 0.0),
			Dut::Capacitor{ farads }              => capacitor(farads, omega),
			Dut::Inductor{ henries }              => inductor(henries, omega),
			Dut::SeriesRc{ ohms, farads }         => Complex64::new(ohms, 0.0) + capacitor(farads, omega),
			Dut::ParallelRc{ ohms, farads }       => {
				let r = Complex64::new(ohms, 0.0);
				let c = capacitor(farads, omega);
				(r*c) / (r + c)
			},
			Dut::SeriesRlc{ ohms, henries, farads } => Complex64::new(ohms, 0.0) + inductor(henries, omega) + capacitor(farads, omega),
		}
	}

	// Parse "<kind>:<value>[:<value>...]", e.g. "resistor:100" or "series-rc:100:1e-6"
	pub fn parse(spec:&str) -> Result<Self> {
		let mut parts = spec.trim().split(':');
		let kind:&str = parts.next().unwrap_or("");

		let values:Vec<f64> = parts
			.map(|p| p.trim().parse::<f64>().map_err(|_| Error::config(format!("Unable to parse DUT value {:?} in {:?}", p, spec))))
			.collect::<Result<Vec<f64>>>()?;

		if values.iter().any(|v| !v.is_finite() || *v <= 0.0) {
			return Err(Error::config(format!("DUT component values must be positive in {:?}", spec)));
		}

		let dut = match (kind, values.as_slice()) {
			("resistor",    &[ohms])                 => Dut::Resistor{ ohms },
			("capacitor",   &[farads])               => Dut::Capacitor{ farads },
			("inductor",    &[henries])              => Dut::Inductor{ henries },
			("series-rc",   &[ohms, farads])         => Dut::SeriesRc{ ohms, farads },
			("parallel-rc", &[ohms, farads])         => Dut::ParallelRc{ ohms, farads },
			("series-rlc",  &[ohms, henries, farads]) => Dut::SeriesRlc{ ohms, henries, farads },
			_ => return Err(Error::config(format!("Unrecognized DUT {:?}", spec))),
		};

		Ok(dut)
	}

}

// Everything the simulator was asked to do, in order
#[derive(Debug, Clone, PartialEq)]
pub enum Call {
	ConfigureAuto(AutoConfigure),
	Reset,
	SetMode(MeasurementMode),
	SetReferenceResistance(f64),
	SetAmplitude(f64),
	SetFrequency(f64),
	Configure(bool),
	Status,
	ReadMeasurement(Measurement),
	LastError,
}

pub struct SimulatedAnalyzer {
	response: Box<dyn Fn(f64) -> Complex64>,
	info: DeviceInfo,

	auto: AutoConfigure,
	mode: MeasurementMode,
	reference_ohm: f64,
	amplitude_v: f64,
	frequency_hz: f64,
	running: bool,

	polls_per_capture: u32,
	polls_remaining: u32,
	status_calls: u32,
	status_failure: Option<(u32, String)>,
	noise: Option<(StdRng, f64)>,

	last_error: String,
	calls: Vec<Call>,
}

impl SimulatedAnalyzer {

	pub fn new(dut:Dut) -> Self {
		Self::with_response(move |hz| dut.impedance(hz))
	}

	// Arbitrary impedance as a function of frequency
	pub fn with_response<F>(response:F) -> Self where F: Fn(f64) -> Complex64 + 'static {
		Self {
			response: Box::new(response),
			info: DeviceInfo{ index: 0, name: "Simulated".to_owned(), serial_num: "SIM000000000".to_owned() },
			auto: AutoConfigure::Enabled,
			mode: MeasurementMode::default(),
			reference_ohm: 0.0,
			amplitude_v: 0.0,
			frequency_hz: 0.0,
			running: false,
			polls_per_capture: 0,
			polls_remaining: 0,
			status_calls: 0,
			status_failure: None,
			noise: None,
			last_error: String::new(),
			calls: vec![],
		}
	}

	// Number of status reads that report Running after each restimulation
	pub fn polls_per_capture(mut self, n:u32) -> Self {
		self.polls_per_capture = n;
		self
	}

	// Fail the n-th status read (1-based, counted over the life of the device)
	pub fn fail_status_on(mut self, n:u32, message:&str) -> Self {
		self.status_failure = Some((n, message.to_owned()));
		self
	}

	// Scale every reading by a uniform random factor in [1 - relative, 1 + relative]
	pub fn noise(mut self, relative:f64, seed:u64) -> Result<Self> {
		if !relative.is_finite() || relative < 0.0 {
			return Err(Error::config(format!("Noise must be a finite, non-negative fraction, got {}", relative)));
		}
		self.noise = Some((StdRng::seed_from_u64(seed), relative));
		Ok(self)
	}

	pub fn calls(&self) -> &[Call] { &self.calls }
	pub fn status_calls(&self) -> u32 { self.status_calls }
	pub fn is_running(&self) -> bool { self.running }
	pub fn frequency(&self) -> f64 { self.frequency_hz }
	pub fn amplitude(&self) -> f64 { self.amplitude_v }
	pub fn reference_resistance(&self) -> f64 { self.reference_ohm }
	pub fn mode(&self) -> MeasurementMode { self.mode }
	pub fn auto_configure(&self) -> AutoConfigure { self.auto }

	fn restart_capture(&mut self) { self.polls_remaining = self.polls_per_capture; }

	fn fail<T>(&mut self, call:&'static str, message:&str) -> Result<T> {
		self.last_error = message.to_owned();
		Err(Error::Device{ call, message: message.to_owned() })
	}

}

fn evaluate(kind:Measurement, z:Complex64, hz:f64) -> f64 {
	let omega:f64 = 2.0*PI*hz;
	let y:Complex64 = z.inv();
	match kind {
		Measurement::Impedance           => z.norm(),
		Measurement::ImpedancePhase      => z.arg(),
		Measurement::Resistance          => z.re,
		Measurement::Reactance           => z.im,
		Measurement::Admittance          => y.norm(),
		Measurement::AdmittancePhase     => y.arg(),
		Measurement::Conductance         => y.re,
		Measurement::Susceptance         => y.im,
		Measurement::SeriesCapacitance   => -1.0 / (omega*z.im),
		Measurement::ParallelCapacitance => y.im / omega,
		Measurement::SeriesInductance    => z.im / omega,
		Measurement::ParallelInductance  => -1.0 / (omega*y.im),
		Measurement::Dissipation         => z.re / z.im.abs(),
		Measurement::Quality             => z.im.abs() / z.re,
	}
}

impl ImpedanceAnalyzer for SimulatedAnalyzer {

	fn info(&self) -> DeviceInfo { self.info.clone() }

	fn configure_auto(&mut self, mode:AutoConfigure) -> Result<()> {
		self.calls.push(Call::ConfigureAuto(mode));
		self.auto = mode;
		Ok(())
	}

	fn reset(&mut self) -> Result<()> {
		self.calls.push(Call::Reset);
		self.mode = MeasurementMode::default();
		self.reference_ohm = 0.0;
		self.amplitude_v = 0.0;
		self.frequency_hz = 0.0;
		self.running = false;
		Ok(())
	}

	fn set_mode(&mut self, mode:MeasurementMode) -> Result<()> {
		self.calls.push(Call::SetMode(mode));
		self.mode = mode;
		Ok(())
	}

	fn set_reference_resistance(&mut self, ohms:f64) -> Result<()> {
		self.calls.push(Call::SetReferenceResistance(ohms));
		if !(ohms > 0.0) { return self.fail("set_reference_resistance", "Reference resistance must be positive"); }
		self.reference_ohm = ohms;
		Ok(())
	}

	fn set_amplitude(&mut self, volts:f64) -> Result<()> {
		self.calls.push(Call::SetAmplitude(volts));
		if volts < 0.0 { return self.fail("set_amplitude", "Amplitude must not be negative"); }
		self.amplitude_v = volts;
		self.restart_capture();
		Ok(())
	}

	fn set_frequency(&mut self, hz:f64) -> Result<()> {
		self.calls.push(Call::SetFrequency(hz));
		if !(hz > 0.0) { return self.fail("set_frequency", "Frequency must be positive"); }
		self.frequency_hz = hz;
		self.restart_capture();
		Ok(())
	}

	fn configure(&mut self, start:bool) -> Result<()> {
		self.calls.push(Call::Configure(start));
		self.running = start;
		if start { self.restart_capture(); }
		debug!("Simulated stimulus {}", if start {"on"} else {"off"});
		Ok(())
	}

	fn status(&mut self) -> Result<DeviceState> {
		self.calls.push(Call::Status);
		self.status_calls += 1;

		if let Some((n, message)) = self.status_failure.clone() {
			if n == self.status_calls {
				return self.fail("status", &message);
			}
		}

		if !self.running {
			Ok(DeviceState::Ready)
		} else if self.polls_remaining > 0 {
			self.polls_remaining -= 1;
			Ok(DeviceState::Running)
		} else {
			Ok(DeviceState::Done)
		}
	}

	fn read_measurement(&mut self, kind:Measurement) -> Result<f64> {
		self.calls.push(Call::ReadMeasurement(kind));

		if !self.running {
			return self.fail("read_measurement", "No measurement in progress");
		}
		if self.polls_remaining > 0 {
			return self.fail("read_measurement", "Capture not complete");
		}

		let mut z:Complex64 = (self.response)(self.frequency_hz);
		if let Some((rng, relative)) = self.noise.as_mut() {
			let scale:f64 = 1.0 + rng.gen_range(-*relative..=*relative);
			z = z * scale;
		}

		Ok(evaluate(kind, z, self.frequency_hz))
	}

	fn last_error(&mut self) -> String {
		self.calls.push(Call::LastError);
		self.last_error.clone()
	}

}
