
use std::fs;
use std::path::PathBuf;
use std::thread;
use std::time::{Duration, Instant};

use log::{debug, info, warn};
use serde::{Serialize, Deserialize};

use crate::config::SweepParams;
use crate::devices::{AutoConfigure, DeviceState, ImpedanceAnalyzer, Measurement};
use crate::error::{Error, Result};
use crate::output::{Sample, SampleWriter};

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SweepReport {
	// Samples written across all files
	pub samples: usize,
	// One file per completed amplitude pass, in sweep order
	pub files: Vec<PathBuf>,
}

// Sweep every amplitude in [start, end) and, within each, every frequency in [start, end], writing
// one file per amplitude.  The first failure ends the whole sweep; the file being written at that
// point keeps the rows it already has.  The measurement is stopped on the way out either way.
pub fn run_sweep<D: ImpedanceAnalyzer + ?Sized>(params:&SweepParams, device:&mut D) -> Result<SweepReport> {
	params.validate()?;
	fs::create_dir_all(&params.output_dir)?;

	info!("Sweeping {} points ({} amplitudes x {} frequencies) against {} Ohm reference",
		params.total_points().unwrap_or(usize::MAX), params.amplitude_count(), params.points_per_amplitude(), params.reference_ohm);

	let result = prepare(params, device).and_then(|_| sweep_amplitudes(params, device));
	let stopped = device.configure(false);

	match (result, stopped) {
		(Ok(report), Ok(())) => {
			info!("Sweep complete: {} samples in {} files", report.samples, report.files.len());
			Ok(report)
		},
		(Ok(_), Err(e)) => Err(e),
		(Err(e), Ok(())) => Err(e),
		(Err(e), Err(stop_err)) => {
			warn!("Unable to stop measurement after failed sweep: {}", stop_err);
			Err(e)
		},
	}
}

fn prepare<D: ImpedanceAnalyzer + ?Sized>(params:&SweepParams, device:&mut D) -> Result<()> {
	device.configure_auto(AutoConfigure::Dynamic)?;
	device.reset()?;
	device.set_mode(params.mode)?;
	device.set_reference_resistance(params.reference_ohm)?;
	device.set_frequency(params.frequency.start_hz as f64)?;
	device.set_amplitude(params.amplitude.start_v)?;
	device.configure(true)?;

	pause(params.timing.warmup());
	Ok(())
}

fn sweep_amplitudes<D: ImpedanceAnalyzer + ?Sized>(params:&SweepParams, device:&mut D) -> Result<SweepReport> {
	let mut report = SweepReport::default();

	for amplitude_v in params.amplitudes() {
		let mut writer = SampleWriter::create(&params.output_dir, amplitude_v, params.reference_ohm)?;
		info!("Amplitude {} V -> {}", amplitude_v, writer.path().display());

		device.set_amplitude(amplitude_v)?;

		for frequency_hz in params.frequencies() {
			let sample = measure_point(params, device, amplitude_v, frequency_hz)?;
			debug!("{} Hz: {} Ohm, {} deg", sample.frequency_hz, sample.impedance_ohm, sample.phase_deg);

			writer.append(&sample)?;
			report.samples += 1;
		}

		report.files.push(writer.finish()?);
	}

	Ok(report)
}

fn measure_point<D: ImpedanceAnalyzer + ?Sized>(params:&SweepParams, device:&mut D, amplitude_v:f64, frequency_hz:u32) -> Result<Sample> {
	device.set_frequency(frequency_hz as f64)?;
	pause(params.timing.settle());

	// The capture that was running when the frequency changed is stale
	read_status(device, amplitude_v, frequency_hz)?;
	wait_for_done(device, params.timing.poll_timeout(), amplitude_v, frequency_hz)?;

	let impedance:f64 = device.read_measurement(Measurement::Impedance)?;
	let phase_rad:f64 = device.read_measurement(Measurement::ImpedancePhase)?;

	Ok(Sample::from_raw(frequency_hz, impedance, phase_rad))
}

// Busy-wait until the device reports Done, or the deadline passes
fn wait_for_done<D: ImpedanceAnalyzer + ?Sized>(device:&mut D, timeout:Option<Duration>, amplitude_v:f64, frequency_hz:u32) -> Result<()> {
	let deadline:Option<Instant> = timeout.map(|t| Instant::now() + t);

	loop {
		if read_status(device, amplitude_v, frequency_hz)?.is_done() {
			return Ok(());
		}

		if let Some(deadline) = deadline {
			if Instant::now() >= deadline {
				return Err(Error::PollTimeout{
					frequency_hz,
					amplitude_v,
					timeout_ms: timeout.map(|t| t.as_millis() as u64).unwrap_or(0),
				});
			}
		}
	}
}

// A device error already carries the message captured when it failed (the SDK's, or the backend's own
// for an unrecognized state).  Only an error without one falls back to asking the device.
fn read_status<D: ImpedanceAnalyzer + ?Sized>(device:&mut D, amplitude_v:f64, frequency_hz:u32) -> Result<DeviceState> {
	let e = match device.status() {
		Ok(state) => return Ok(state),
		Err(e) => e,
	};

	let message = match e {
		Error::Device{ message, .. } if !message.is_empty() => message,
		other => {
			let last = device.last_error();
			if last.is_empty() { other.to_string() } else { last }
		},
	};
	Err(Error::StatusPoll{ frequency_hz, amplitude_v, message })
}

fn pause(d:Duration) {
	if !d.is_zero() { thread::sleep(d); }
}
