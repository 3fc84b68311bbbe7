use std::io;

use thiserror::Error;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, Error)]
pub enum Error {
	// The device could not be opened, or the vendor library is missing
	#[error("Unable to connect to device: {0}")]
	Connection(String),

	// A status read failed while waiting for a measurement to complete
	#[error("Status poll failed at {frequency_hz} Hz, {amplitude_v} V: {message}")]
	StatusPoll { frequency_hz: u32, amplitude_v: f64, message: String },

	#[error("Measurement at {frequency_hz} Hz, {amplitude_v} V did not complete within {timeout_ms} ms")]
	PollTimeout { frequency_hz: u32, amplitude_v: f64, timeout_ms: u64 },

	#[error("Invalid sweep configuration: {0}")]
	Config(String),

	// Any other device call that reported failure
	#[error("Device call {call} failed: {message}")]
	Device { call: &'static str, message: String },

	#[error(transparent)]
	Io(#[from] io::Error),
}

impl Error {
	pub fn config(msg:impl Into<String>) -> Self { Error::Config(msg.into()) }
}
