// Step generation for the two sweep axes

// Tolerance, in units of one step, used when deciding whether the last
// fractional step still lands inside a half-open range
const STEP_EPSILON:f64 = 1e-9;

// Amplitudes are snapped to 1/AMPLITUDE_SCALE volts so accumulated floating point error
// doesn't show up in output file names
const AMPLITUDE_SCALE:f64 = 1e9;

// Inclusive integer steps: start, start+step, ... up to and including end if it lands on a step.
// A zero step or an inverted range yields nothing.
pub fn frequency_steps(start:u32, end:u32, step:u32) -> impl Iterator<Item = u32> {
	let count = frequency_step_count(start, end, step) as u64;
	(0..count).map(move |i| (start as u64 + i*(step as u64)) as u32)
}

pub fn frequency_step_count(start:u32, end:u32, step:u32) -> usize {
	if step == 0 || end < start { 0 } else { ((end - start) / step) as usize + 1 }
}

// Half-open floating point steps over [start, end)
pub fn amplitude_steps(start:f64, end:f64, step:f64) -> impl Iterator<Item = f64> {
	let count = amplitude_step_count(start, end, step);
	(0..count).map(move |i| snap(start + (i as f64)*step))
}

// Saturates at usize::MAX when the step is vanishingly small against the range
pub fn amplitude_step_count(start:f64, end:f64, step:f64) -> usize {
	if !(step > 0.0) || !start.is_finite() || !end.is_finite() || end <= start {
		return 0;
	}

	let n:f64 = ((end - start) / step - STEP_EPSILON).ceil();
	if n > 0.0 { n as usize } else { 0 }
}

fn snap(x:f64) -> f64 {
	let snapped = (x * AMPLITUDE_SCALE).round() / AMPLITUDE_SCALE;
	// Avoid writing "-0" into a file name
	if snapped == 0.0 { 0.0 } else { snapped }
}
