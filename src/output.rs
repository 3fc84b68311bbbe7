
use std::fs::File;
use std::io::{self, BufWriter, Write};
use std::path::{Path, PathBuf};

use serde::{Serialize, Deserialize};

// One measured point.  Magnitude is never negative and phase is in degrees.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Sample {
	pub frequency_hz: u32,
	pub impedance_ohm: f64,
	pub phase_deg: f64,
}

impl Sample {

	// Build a sample from raw analyzer readings: |Z| in ohms (sign ignored) and phase in radians
	pub fn from_raw(frequency_hz:u32, impedance:f64, phase_rad:f64) -> Self {
		Self{ frequency_hz, impedance_ohm: impedance.abs(), phase_deg: phase_rad.to_degrees() }
	}

	pub fn to_line(&self) -> String {
		format!("{}\t{}\t{}\n", self.frequency_hz, self.impedance_ohm, self.phase_deg)
	}

	pub fn parse_line(line:&str) -> Option<Self> {
		let mut cols = line.trim_end_matches(['\r', '\n']).split('\t');
		let frequency_hz:u32  = cols.next()?.parse().ok()?;
		let impedance_ohm:f64 = cols.next()?.parse().ok()?;
		let phase_deg:f64     = cols.next()?.parse().ok()?;
		if cols.next().is_some() { return None; }
		Some(Self{ frequency_hz, impedance_ohm, phase_deg })
	}

}

pub fn file_name(amplitude_v:f64, reference_ohm:f64) -> String {
	format!("impedance_{}V_{}Ohm.txt", amplitude_v, reference_ohm)
}

// Appends samples for a single amplitude pass.  The file is created (truncating any earlier run at
// the same amplitude and reference) when the writer is made and closed when it's dropped, so rows
// written before an error survive it.
pub struct SampleWriter {
	path: PathBuf,
	out: BufWriter<File>,
	lines: usize,
}

impl SampleWriter {

	pub fn create(dir:&Path, amplitude_v:f64, reference_ohm:f64) -> io::Result<Self> {
		let path = dir.join(file_name(amplitude_v, reference_ohm));
		let out = BufWriter::new(File::create(&path)?);
		Ok(Self{ path, out, lines: 0 })
	}

	pub fn append(&mut self, sample:&Sample) -> io::Result<()> {
		self.out.write_all(sample.to_line().as_bytes())?;
		self.lines += 1;
		Ok(())
	}

	pub fn path(&self) -> &Path { &self.path }
	pub fn lines(&self) -> usize { self.lines }

	// Flush and close, reporting any error the implicit close on drop would swallow
	pub fn finish(mut self) -> io::Result<PathBuf> {
		self.out.flush()?;
		Ok(self.path)
	}

}

pub fn read_samples(path:&Path) -> io::Result<Vec<Sample>> {
	let contents = std::fs::read_to_string(path)?;
	contents.lines()
		.enumerate()
		.map(|(n, line)| Sample::parse_line(line)
			.ok_or_else(|| io::Error::new(io::ErrorKind::InvalidData, format!("{}:{}: malformed sample {:?}", path.display(), n + 1, line))))
		.collect()
}
