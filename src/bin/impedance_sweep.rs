
use std::fs;
use std::path::PathBuf;

use anyhow::Context;
use clap::Parser;
use log::info;
use serde::Serialize;

use dwf_impedance::{run_sweep, AmplitudeRange, Error, FrequencyRange, SweepParams, SweepReport};
use dwf_impedance::devices::{DeviceInfo, ImpedanceAnalyzer, MeasurementMode};
use dwf_impedance::devices::analog_discovery::{self, AnalogDiscovery};
use dwf_impedance::devices::simulated::{Dut, SimulatedAnalyzer};

/// Swept-frequency, swept-amplitude impedance measurement with an Analog Discovery
#[derive(Debug, Parser)]
#[command(name = "impedance_sweep", version)]
struct Args {
	/// JSON sweep configuration; flags below override it
	#[arg(long)]
	config: Option<PathBuf>,

	/// Frequency sweep in Hz as start:end:step, end inclusive (k and M suffixes allowed)
	#[arg(long, value_parser = parse_frequency)]
	freq: Option<FrequencyRange>,

	/// Amplitude sweep in V as start:end:step, end exclusive (m suffix allowed)
	#[arg(long, value_parser = parse_amplitude)]
	amp: Option<AmplitudeRange>,

	/// Reference resistance in Ohm
	#[arg(long)]
	reference: Option<f64>,

	/// dut-first, reference-first or adapter-module
	#[arg(long, value_parser = parse_mode)]
	mode: Option<MeasurementMode>,

	#[arg(long)]
	settle_ms: Option<u64>,

	#[arg(long)]
	warmup_ms: Option<u64>,

	/// 0 waits forever
	#[arg(long)]
	poll_timeout_ms: Option<u64>,

	#[arg(long)]
	output_dir: Option<PathBuf>,

	/// Device to open, -1 for the first available
	#[arg(long, default_value_t = -1, allow_negative_numbers = true)]
	device_index: i32,

	/// Measure a simulated DUT instead of hardware, e.g. series-rc:100:1e-6
	#[arg(long, value_name = "DUT")]
	simulate: Option<String>,

	/// Relative noise on simulated readings
	#[arg(long, requires = "simulate")]
	noise: Option<f64>,

	/// Seed for --noise
	#[arg(long, default_value_t = 0)]
	seed: u64,

	/// List attached devices and exit
	#[arg(long)]
	list_devices: bool,

	/// Write the parameters and results of a successful sweep to this JSON file
	#[arg(long)]
	manifest: Option<PathBuf>,
}

#[derive(Debug, Serialize)]
struct Manifest<'a> {
	device: DeviceInfo,
	params: &'a SweepParams,
	report: &'a SweepReport,
}

fn parse_frequency(s:&str) -> Result<FrequencyRange, String> { FrequencyRange::parse(s).map_err(|e| e.to_string()) }
fn parse_amplitude(s:&str) -> Result<AmplitudeRange, String> { AmplitudeRange::parse(s).map_err(|e| e.to_string()) }

fn parse_mode(s:&str) -> Result<MeasurementMode, String> {
	MeasurementMode::from_name(s).ok_or_else(|| format!("Unrecognized mode {:?}", s))
}

fn build_params(args:&Args) -> dwf_impedance::Result<SweepParams> {
	let mut params = match &args.config {
		Some(path) => SweepParams::from_json_file(path)?,
		None => match (args.freq, args.amp, args.reference) {
			(Some(f), Some(a), Some(r)) => SweepParams::new(f, a, r),
			_ => return Err(Error::config("--freq, --amp and --reference are required without --config")),
		},
	};

	if let Some(f) = args.freq { params.frequency = f; }
	if let Some(a) = args.amp { params.amplitude = a; }
	if let Some(r) = args.reference { params.reference_ohm = r; }
	if let Some(m) = args.mode { params.mode = m; }
	if let Some(ms) = args.settle_ms { params.timing.settle_ms = ms; }
	if let Some(ms) = args.warmup_ms { params.timing.warmup_ms = ms; }
	if let Some(ms) = args.poll_timeout_ms { params.timing.poll_timeout_ms = if ms == 0 { None } else { Some(ms) }; }
	if let Some(dir) = &args.output_dir { params.output_dir = dir.clone(); }

	params.validate()?;
	Ok(params)
}

fn open_device(args:&Args) -> dwf_impedance::Result<Box<dyn ImpedanceAnalyzer>> {
	match &args.simulate {
		Some(spec) => {
			let mut sim = SimulatedAnalyzer::new(Dut::parse(spec)?);
			if let Some(relative) = args.noise { sim = sim.noise(relative, args.seed)?; }
			Ok(Box::new(sim))
		},
		None => Ok(Box::new(AnalogDiscovery::open(args.device_index)?)),
	}
}

pub fn main() -> anyhow::Result<()> {
	env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

	let args = Args::parse();

	if args.list_devices {
		for device in analog_discovery::enumerate()? {
			println!("{}", serde_json::to_string(&device)?);
		}
		return Ok(());
	}

	let params = build_params(&args)?;
	let mut device = open_device(&args).context("Unable to open impedance analyzer")?;

	let device_info = device.info();
	println!("{}", serde_json::to_string_pretty(&device_info)?);

	let report = run_sweep(&params, device.as_mut()).context("Sweep aborted")?;

	if let Some(path) = &args.manifest {
		let manifest = Manifest{ device: device_info, params: &params, report: &report };
		fs::write(path, serde_json::to_string_pretty(&manifest)?.as_bytes())
			.with_context(|| format!("Unable to write manifest {}", path.display()))?;
		info!("Wrote manifest {}", path.display());
	}

	Ok(())
}
