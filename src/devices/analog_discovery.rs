
// Analog Discovery family through the Digilent WaveForms runtime.  The dwf library is loaded at run
// time so the crate builds (and the simulator runs) on machines without WaveForms installed.

use std::ffi::{c_char, c_int, c_uchar, CStr};
use std::sync::OnceLock;

use libloading::Library;
use log::{debug, warn};

use crate::devices::{AutoConfigure, DeviceInfo, DeviceState, HandleGuard, ImpedanceAnalyzer, Measurement, MeasurementMode};
use crate::error::{Error, Result};

type Hdwf = c_int;

pub const HDWF_NONE:Hdwf = 0;
pub const ENUMFILTER_ALL:c_int = 0;

// FDwfGetLastErrorMsg fills a fixed 512 byte buffer, the enumeration strings are 32 bytes
const ERROR_MSG_LEN:usize = 512;
const ENUM_STR_LEN:usize = 32;

#[cfg(target_os = "windows")]
const LIB_NAMES:&[&str] = &["dwf.dll"];

#[cfg(target_os = "macos")]
const LIB_NAMES:&[&str] = &["/Library/Frameworks/dwf.framework/dwf", "libdwf.dylib"];

#[cfg(not(any(target_os = "windows", target_os = "macos")))]
const LIB_NAMES:&[&str] = &["libdwf.so", "libdwf.so.3"];

struct DwfLib {
	// None only for entry points that don't come from a shared library
	_lib: Option<Library>,
	get_last_error_msg: unsafe extern "C" fn(*mut c_char) -> c_int,
	enumerate: unsafe extern "C" fn(c_int, *mut c_int) -> c_int,
	enum_device_name: unsafe extern "C" fn(c_int, *mut c_char) -> c_int,
	enum_sn: unsafe extern "C" fn(c_int, *mut c_char) -> c_int,
	device_open: unsafe extern "C" fn(c_int, *mut Hdwf) -> c_int,
	device_close: unsafe extern "C" fn(Hdwf) -> c_int,
	device_auto_configure_set: unsafe extern "C" fn(Hdwf, c_int) -> c_int,
	impedance_reset: unsafe extern "C" fn(Hdwf) -> c_int,
	impedance_mode_set: unsafe extern "C" fn(Hdwf, c_int) -> c_int,
	impedance_reference_set: unsafe extern "C" fn(Hdwf, f64) -> c_int,
	impedance_frequency_set: unsafe extern "C" fn(Hdwf, f64) -> c_int,
	impedance_amplitude_set: unsafe extern "C" fn(Hdwf, f64) -> c_int,
	impedance_configure: unsafe extern "C" fn(Hdwf, c_int) -> c_int,
	impedance_status: unsafe extern "C" fn(Hdwf, *mut c_uchar) -> c_int,
	impedance_status_measure: unsafe extern "C" fn(Hdwf, c_int, *mut f64) -> c_int,
}

static DWF_LIB:OnceLock<Option<DwfLib>> = OnceLock::new();

// Copy a function pointer out of the library.  The pointer stays valid as long as `lib` is alive,
// which DwfLib guarantees by owning it.
unsafe fn symbol<T: Copy>(lib:&Library, name:&[u8]) -> std::result::Result<T, libloading::Error> {
	Ok(*lib.get::<T>(name)?)
}

unsafe fn load_symbols(lib:Library) -> std::result::Result<DwfLib, libloading::Error> {
	Ok(DwfLib {
		get_last_error_msg:        symbol(&lib, b"FDwfGetLastErrorMsg\0")?,
		enumerate:                 symbol(&lib, b"FDwfEnum\0")?,
		enum_device_name:          symbol(&lib, b"FDwfEnumDeviceName\0")?,
		enum_sn:                   symbol(&lib, b"FDwfEnumSN\0")?,
		device_open:               symbol(&lib, b"FDwfDeviceOpen\0")?,
		device_close:              symbol(&lib, b"FDwfDeviceClose\0")?,
		device_auto_configure_set: symbol(&lib, b"FDwfDeviceAutoConfigureSet\0")?,
		impedance_reset:           symbol(&lib, b"FDwfAnalogImpedanceReset\0")?,
		impedance_mode_set:        symbol(&lib, b"FDwfAnalogImpedanceModeSet\0")?,
		impedance_reference_set:   symbol(&lib, b"FDwfAnalogImpedanceReferenceSet\0")?,
		impedance_frequency_set:   symbol(&lib, b"FDwfAnalogImpedanceFrequencySet\0")?,
		impedance_amplitude_set:   symbol(&lib, b"FDwfAnalogImpedanceAmplitudeSet\0")?,
		impedance_configure:       symbol(&lib, b"FDwfAnalogImpedanceConfigure\0")?,
		impedance_status:          symbol(&lib, b"FDwfAnalogImpedanceStatus\0")?,
		impedance_status_measure:  symbol(&lib, b"FDwfAnalogImpedanceStatusMeasure\0")?,
		_lib: Some(lib),
	})
}

fn load_library() -> Option<DwfLib> {
	for name in LIB_NAMES {
		let lib = match unsafe { Library::new(name) } {
			Ok(lib) => lib,
			Err(_)  => continue,
		};

		match unsafe { load_symbols(lib) } {
			Ok(dwf) => {
				debug!("Loaded WaveForms runtime from {}", name);
				return Some(dwf);
			},
			Err(e) => warn!("{} is missing impedance analyzer symbols: {}", name, e),
		}
	}

	None
}

fn library() -> Result<&'static DwfLib> {
	DWF_LIB.get_or_init(load_library).as_ref()
		.ok_or_else(|| Error::Connection("WaveForms runtime (dwf library) not found".to_owned()))
}

fn last_error_msg(dwf:&DwfLib) -> String {
	let mut buff:[c_char; ERROR_MSG_LEN] = [0; ERROR_MSG_LEN];
	unsafe { (dwf.get_last_error_msg)(buff.as_mut_ptr()); }
	c_buff_to_string(&buff)
}

fn c_buff_to_string(buff:&[c_char]) -> String {
	// Force termination in case the runtime filled the whole buffer
	let mut owned:Vec<c_char> = buff.to_vec();
	owned.push(0);
	unsafe { CStr::from_ptr(owned.as_ptr()) }.to_string_lossy().trim().to_owned()
}

// List attached devices without opening any of them
pub fn enumerate() -> Result<Vec<DeviceInfo>> {
	let dwf = library()?;

	let count:c_int = device_count(dwf)?;

	let mut devices:Vec<DeviceInfo> = Vec::with_capacity(count.max(0) as usize);
	for index in 0..count {
		devices.push(enum_info(dwf, index)?);
	}

	Ok(devices)
}

fn device_count(dwf:&DwfLib) -> Result<c_int> {
	let mut count:c_int = 0;
	if unsafe { (dwf.enumerate)(ENUMFILTER_ALL, &mut count) } == 0 {
		return Err(Error::Device{ call: "FDwfEnum", message: last_error_msg(dwf) });
	}
	Ok(count)
}

fn enum_info(dwf:&DwfLib, index:c_int) -> Result<DeviceInfo> {
	let mut name:[c_char; ENUM_STR_LEN] = [0; ENUM_STR_LEN];
	let mut sn:[c_char; ENUM_STR_LEN]   = [0; ENUM_STR_LEN];

	if unsafe { (dwf.enum_device_name)(index, name.as_mut_ptr()) } == 0 {
		return Err(Error::Device{ call: "FDwfEnumDeviceName", message: last_error_msg(dwf) });
	}
	if unsafe { (dwf.enum_sn)(index, sn.as_mut_ptr()) } == 0 {
		return Err(Error::Device{ call: "FDwfEnumSN", message: last_error_msg(dwf) });
	}

	Ok(DeviceInfo{ index, name: c_buff_to_string(&name), serial_num: c_buff_to_string(&sn) })
}

pub struct AnalogDiscovery {
	dwf: &'static DwfLib,
	hdwf: Hdwf,
	info: DeviceInfo,
	_guard: HandleGuard,
}

impl AnalogDiscovery {

	// Index -1 opens the first available device
	pub fn open(index:i32) -> Result<Self> {
		Self::open_with(library()?, index)
	}

	fn open_with(dwf:&'static DwfLib, index:i32) -> Result<Self> {
		let info = if index >= 0 {
			let count:c_int = device_count(dwf)?;
			if index >= count {
				return Err(Error::Connection(format!("No device at index {} ({} attached)", index, count)));
			}
			enum_info(dwf, index)?
		} else {
			DeviceInfo{ index, name: "first available".to_owned(), serial_num: String::new() }
		};

		let guard = HandleGuard::acquire()?;

		let mut hdwf:Hdwf = HDWF_NONE;
		let ok = unsafe { (dwf.device_open)(index, &mut hdwf) };
		if ok == 0 || hdwf == HDWF_NONE {
			return Err(Error::Connection(last_error_msg(dwf)));
		}

		debug!("Opened {} (SN {}) as handle {}", info.name, info.serial_num, hdwf);
		Ok(Self{ dwf, hdwf, info, _guard: guard })
	}

	pub fn close(self) { drop(self) }

	fn check(&self, call:&'static str, ok:c_int) -> Result<()> {
		if ok != 0 { Ok(()) }
		else { Err(Error::Device{ call, message: last_error_msg(self.dwf) }) }
	}

}

impl ImpedanceAnalyzer for AnalogDiscovery {

	fn info(&self) -> DeviceInfo { self.info.clone() }

	fn configure_auto(&mut self, mode:AutoConfigure) -> Result<()> {
		let ok = unsafe { (self.dwf.device_auto_configure_set)(self.hdwf, mode.code()) };
		self.check("FDwfDeviceAutoConfigureSet", ok)
	}

	fn reset(&mut self) -> Result<()> {
		let ok = unsafe { (self.dwf.impedance_reset)(self.hdwf) };
		self.check("FDwfAnalogImpedanceReset", ok)
	}

	fn set_mode(&mut self, mode:MeasurementMode) -> Result<()> {
		let ok = unsafe { (self.dwf.impedance_mode_set)(self.hdwf, mode.code()) };
		self.check("FDwfAnalogImpedanceModeSet", ok)
	}

	fn set_reference_resistance(&mut self, ohms:f64) -> Result<()> {
		let ok = unsafe { (self.dwf.impedance_reference_set)(self.hdwf, ohms) };
		self.check("FDwfAnalogImpedanceReferenceSet", ok)
	}

	fn set_amplitude(&mut self, volts:f64) -> Result<()> {
		let ok = unsafe { (self.dwf.impedance_amplitude_set)(self.hdwf, volts) };
		self.check("FDwfAnalogImpedanceAmplitudeSet", ok)
	}

	fn set_frequency(&mut self, hz:f64) -> Result<()> {
		let ok = unsafe { (self.dwf.impedance_frequency_set)(self.hdwf, hz) };
		self.check("FDwfAnalogImpedanceFrequencySet", ok)
	}

	fn configure(&mut self, start:bool) -> Result<()> {
		let ok = unsafe { (self.dwf.impedance_configure)(self.hdwf, if start {1} else {0}) };
		self.check("FDwfAnalogImpedanceConfigure", ok)
	}

	fn status(&mut self) -> Result<DeviceState> {
		let mut sts:c_uchar = 0;
		let ok = unsafe { (self.dwf.impedance_status)(self.hdwf, &mut sts) };
		self.check("FDwfAnalogImpedanceStatus", ok)?;

		DeviceState::from_code(sts)
			.ok_or_else(|| Error::Device{ call: "FDwfAnalogImpedanceStatus", message: format!("Unrecognized state code {}", sts) })
	}

	fn read_measurement(&mut self, kind:Measurement) -> Result<f64> {
		let mut value:f64 = 0.0;
		let ok = unsafe { (self.dwf.impedance_status_measure)(self.hdwf, kind.code(), &mut value) };
		self.check("FDwfAnalogImpedanceStatusMeasure", ok)?;
		Ok(value)
	}

	fn last_error(&mut self) -> String { last_error_msg(self.dwf) }

}

impl Drop for AnalogDiscovery {

	fn drop(&mut self) {
		if unsafe { (self.dwf.device_close)(self.hdwf) } == 0 {
			warn!("Unable to close device handle {}: {}", self.hdwf, last_error_msg(self.dwf));
		}
	}

}
