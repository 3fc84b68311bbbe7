use std::f64::consts::PI;
use std::fs;
use std::path::Path;

use num_complex::Complex64;

use dwf_impedance::{run_sweep, AmplitudeRange, Error, FrequencyRange, SweepParams, Timing};
use dwf_impedance::devices::{AutoConfigure, DeviceInfo, DeviceState, ImpedanceAnalyzer, Measurement, MeasurementMode};
use dwf_impedance::devices::simulated::{Call, Dut, SimulatedAnalyzer};
use dwf_impedance::output::{self, Sample};

fn params(dir:&Path, freq:FrequencyRange, amp:AmplitudeRange) -> SweepParams {
	let mut p = SweepParams::new(freq, amp, 100.0);
	p.timing = Timing::immediate();
	p.output_dir = dir.to_path_buf();
	p
}

fn files_in(dir:&Path) -> Vec<String> {
	let mut names:Vec<String> = fs::read_dir(dir).unwrap()
		.map(|e| e.unwrap().file_name().to_string_lossy().into_owned())
		.collect();
	names.sort();
	names
}

// Reports whatever phase it's given and the frequency scaled by `gain` as impedance, sign included
struct EchoAnalyzer {
	gain: f64,
	phase_rad: Box<dyn Fn(f64) -> f64>,
	frequency_hz: f64,
}

impl EchoAnalyzer {
	fn new(gain:f64, phase_rad:impl Fn(f64) -> f64 + 'static) -> Self {
		Self{ gain, phase_rad: Box::new(phase_rad), frequency_hz: 0.0 }
	}
}

impl ImpedanceAnalyzer for EchoAnalyzer {
	fn info(&self) -> DeviceInfo { DeviceInfo{ index: 0, name: "Echo".to_owned(), serial_num: String::new() } }
	fn configure_auto(&mut self, _:AutoConfigure) -> dwf_impedance::Result<()> { Ok(()) }
	fn reset(&mut self) -> dwf_impedance::Result<()> { Ok(()) }
	fn set_mode(&mut self, _:MeasurementMode) -> dwf_impedance::Result<()> { Ok(()) }
	fn set_reference_resistance(&mut self, _:f64) -> dwf_impedance::Result<()> { Ok(()) }
	fn set_amplitude(&mut self, _:f64) -> dwf_impedance::Result<()> { Ok(()) }
	fn set_frequency(&mut self, hz:f64) -> dwf_impedance::Result<()> { self.frequency_hz = hz; Ok(()) }
	fn configure(&mut self, _:bool) -> dwf_impedance::Result<()> { Ok(()) }
	fn status(&mut self) -> dwf_impedance::Result<DeviceState> { Ok(DeviceState::Done) }

	fn read_measurement(&mut self, kind:Measurement) -> dwf_impedance::Result<f64> {
		match kind {
			Measurement::Impedance      => Ok(self.gain * self.frequency_hz),
			Measurement::ImpedancePhase => Ok((self.phase_rad)(self.frequency_hz)),
			_ => Err(Error::Device{ call: "read_measurement", message: "unsupported".to_owned() }),
		}
	}

	fn last_error(&mut self) -> String { String::new() }
}

#[test]
fn one_file_per_amplitude_with_every_frequency() {
	let dir = tempfile::tempdir().unwrap();
	let p = params(dir.path(), FrequencyRange::new(100, 1000, 150), AmplitudeRange::new(0.5, 2.0, 0.5));
	let mut sim = SimulatedAnalyzer::new(Dut::SeriesRc{ ohms: 100.0, farads: 1e-6 });

	let report = run_sweep(&p, &mut sim).unwrap();

	// floor((1000 - 100) / 150) + 1
	let per_file = 7;
	assert_eq!(report.files.len(), 3);
	assert_eq!(report.samples, 3 * per_file);
	assert_eq!(files_in(dir.path()), vec![
		"impedance_0.5V_100Ohm.txt",
		"impedance_1.5V_100Ohm.txt",
		"impedance_1V_100Ohm.txt",
	]);

	for path in &report.files {
		let samples = output::read_samples(path).unwrap();
		assert_eq!(samples.len(), per_file);
		assert_eq!(samples.first().map(|s| s.frequency_hz), Some(100));
		assert_eq!(samples.last().map(|s| s.frequency_hz), Some(1000));
	}
}

#[test]
fn inclusive_frequency_scenario() {
	let dir = tempfile::tempdir().unwrap();
	let p = params(dir.path(), FrequencyRange::new(1000, 3000, 1000), AmplitudeRange::new(1.0, 2.0, 1.0));
	let mut sim = SimulatedAnalyzer::new(Dut::Resistor{ ohms: 220.0 });

	let report = run_sweep(&p, &mut sim).unwrap();
	assert_eq!(report.files, vec![dir.path().join("impedance_1V_100Ohm.txt")]);

	let contents = fs::read_to_string(&report.files[0]).unwrap();
	assert_eq!(contents, "1000\t220\t0\n2000\t220\t0\n3000\t220\t0\n");
}

#[test]
fn echoed_impedance_is_twice_the_frequency() {
	let dir = tempfile::tempdir().unwrap();
	let p = params(dir.path(), FrequencyRange::new(1000, 10_000, 500), AmplitudeRange::new(1.0, 3.0, 1.0));
	let mut echo = EchoAnalyzer::new(2.0, |_| 0.0);

	let report = run_sweep(&p, &mut echo).unwrap();
	assert_eq!(report.files.len(), 2);

	for path in &report.files {
		for line in fs::read_to_string(path).unwrap().lines() {
			let cols:Vec<f64> = line.split('\t').map(|c| c.parse::<f64>().unwrap()).collect();
			assert_eq!(cols[1], 2.0 * cols[0]);
			assert_eq!(cols[2], 0.0);
		}
	}
}

#[test]
fn magnitude_is_never_negative_and_phase_stays_in_range() {
	let dir = tempfile::tempdir().unwrap();
	let p = params(dir.path(), FrequencyRange::new(1, 201, 10), AmplitudeRange::new(1.0, 2.0, 1.0));

	// Phase sweeps across [-pi, pi] with the frequency
	let mut echo = EchoAnalyzer::new(-3.0, |hz| -PI + 2.0*PI*(hz - 1.0)/200.0);
	let report = run_sweep(&p, &mut echo).unwrap();

	let samples:Vec<Sample> = output::read_samples(&report.files[0]).unwrap();
	assert_eq!(samples.len(), 21);
	for s in &samples {
		assert!(s.impedance_ohm >= 0.0);
		assert_eq!(s.impedance_ohm, 3.0 * s.frequency_hz as f64);
		assert!(s.phase_deg >= -180.0 - 1e-9 && s.phase_deg <= 180.0 + 1e-9, "{}", s.phase_deg);
	}
	assert!((samples[0].phase_deg + 180.0).abs() < 1e-9);
	assert!((samples[20].phase_deg - 180.0).abs() < 1e-9);
}

#[test]
fn poll_failure_on_second_point_aborts_everything() {
	let dir = tempfile::tempdir().unwrap();
	let p = params(dir.path(), FrequencyRange::new(1000, 3000, 1000), AmplitudeRange::new(1.0, 3.0, 1.0));

	// Two status reads per point, so the third read is the stale read of the second point
	let mut sim = SimulatedAnalyzer::new(Dut::Resistor{ ohms: 100.0 }).fail_status_on(3, "Device disconnected");

	match run_sweep(&p, &mut sim) {
		Err(Error::StatusPoll{ frequency_hz, amplitude_v, message }) => {
			assert_eq!(frequency_hz, 2000);
			assert_eq!(amplitude_v, 1.0);
			assert_eq!(message, "Device disconnected");
		},
		other => panic!("expected a status poll failure, got {:?}", other),
	}

	// The in-progress file keeps the point measured before the failure; nothing later was started
	assert_eq!(files_in(dir.path()), vec!["impedance_1V_100Ohm.txt"]);
	assert_eq!(fs::read_to_string(dir.path().join("impedance_1V_100Ohm.txt")).unwrap(), "1000\t100\t0\n");

	// Stimulus stopped, and nothing was asked of the device after the failure but that
	assert!(!sim.is_running());
	let calls = sim.calls();
	assert_eq!(&calls[calls.len() - 2..], &[Call::Status, Call::Configure(false)]);
	assert!(!calls.contains(&Call::SetFrequency(3000.0)));
	assert!(!calls.contains(&Call::SetAmplitude(2.0)));
}

#[test]
fn fractional_amplitude_steps() {
	let dir = tempfile::tempdir().unwrap();
	let p = params(dir.path(), FrequencyRange::new(1000, 1000, 1), AmplitudeRange::new(0.1, 0.4, 0.1));
	let mut sim = SimulatedAnalyzer::new(Dut::Resistor{ ohms: 100.0 });

	let report = run_sweep(&p, &mut sim).unwrap();
	assert_eq!(report.samples, 3);
	assert_eq!(files_in(dir.path()), vec![
		"impedance_0.1V_100Ohm.txt",
		"impedance_0.2V_100Ohm.txt",
		"impedance_0.3V_100Ohm.txt",
	]);

	let amplitudes:Vec<f64> = sim.calls().iter()
		.filter_map(|c| match c { Call::SetAmplitude(v) => Some(*v), _ => None })
		.collect();
	// The first comes from device setup
	assert_eq!(amplitudes, vec![0.1, 0.1, 0.2, 0.3]);
}

#[test]
fn unresponsive_device_times_out() {
	let dir = tempfile::tempdir().unwrap();
	let mut p = params(dir.path(), FrequencyRange::new(1000, 2000, 1000), AmplitudeRange::new(1.0, 2.0, 1.0));
	p.timing.poll_timeout_ms = Some(0);

	let mut sim = SimulatedAnalyzer::new(Dut::Resistor{ ohms: 100.0 }).polls_per_capture(u32::MAX);

	match run_sweep(&p, &mut sim) {
		Err(Error::PollTimeout{ frequency_hz, timeout_ms, .. }) => {
			assert_eq!(frequency_hz, 1000);
			assert_eq!(timeout_ms, 0);
		},
		other => panic!("expected a poll timeout, got {:?}", other),
	}

	assert!(!sim.is_running());
	assert_eq!(fs::read_to_string(dir.path().join("impedance_1V_100Ohm.txt")).unwrap(), "");
}

#[test]
fn device_settings_follow_parameters() {
	let dir = tempfile::tempdir().unwrap();
	let mut p = params(dir.path(), FrequencyRange::new(500, 1500, 500), AmplitudeRange::new(0.25, 0.5, 0.25));
	p.reference_ohm = 1000.0;
	p.mode = MeasurementMode::ReferenceFirst;

	let mut sim = SimulatedAnalyzer::new(Dut::Capacitor{ farads: 1e-6 });
	let report = run_sweep(&p, &mut sim).unwrap();

	assert_eq!(report.files, vec![dir.path().join("impedance_0.25V_1000Ohm.txt")]);
	assert_eq!(sim.reference_resistance(), 1000.0);
	assert_eq!(sim.mode(), MeasurementMode::ReferenceFirst);
	assert_eq!(sim.auto_configure(), AutoConfigure::Dynamic);
	assert_eq!(sim.frequency(), 1500.0);
	assert_eq!(sim.amplitude(), 0.25);

	for s in output::read_samples(&report.files[0]).unwrap() {
		let expected = 1.0 / (2.0*PI*(s.frequency_hz as f64)*1e-6);
		assert!((s.impedance_ohm - expected).abs() < 1e-9 * expected);
		assert!((s.phase_deg + 90.0).abs() < 1e-9);
	}
}

#[test]
fn output_directory_is_created() {
	let dir = tempfile::tempdir().unwrap();
	let nested = dir.path().join("run").join("a");
	let p = params(&nested, FrequencyRange::new(10, 20, 10), AmplitudeRange::new(1.0, 2.0, 1.0));

	let report = run_sweep(&p, &mut SimulatedAnalyzer::new(Dut::Inductor{ henries: 1e-3 })).unwrap();
	assert_eq!(report.files, vec![nested.join("impedance_1V_100Ohm.txt")]);
}

#[test]
fn custom_response_reaches_the_file() {
	let dir = tempfile::tempdir().unwrap();
	let p = params(dir.path(), FrequencyRange::new(100, 300, 100), AmplitudeRange::new(1.0, 2.0, 1.0));
	let mut sim = SimulatedAnalyzer::with_response(|hz| Complex64::new(0.0, hz));

	let report = run_sweep(&p, &mut sim).unwrap();
	let samples = output::read_samples(&report.files[0]).unwrap();
	assert_eq!(samples.iter().map(|s| s.impedance_ohm).collect::<Vec<f64>>(), vec![100.0, 200.0, 300.0]);
	assert!(samples.iter().all(|s| (s.phase_deg - 90.0).abs() < 1e-9));
}
