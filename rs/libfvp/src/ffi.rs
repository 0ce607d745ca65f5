use std::ffi::{CStr, c_char};

use crate::Error;

/// Run the closure, turning its result or a panic into a return code.
pub fn return_code<C: ReturnCode, F: FnOnce() -> C>(f: F) -> i32 {
	match std::panic::catch_unwind(std::panic::AssertUnwindSafe(f)) {
		Ok(ret) => ret.code(),
		Err(_) => Error::Panic.code(),
	}
}

/// Run a callback from the engine, returning `default` on panic.
///
/// Panics must not unwind into the engine's threads.
pub fn guard<T, F: FnOnce() -> T>(default: T, f: F) -> T {
	match std::panic::catch_unwind(std::panic::AssertUnwindSafe(f)) {
		Ok(ret) => ret,
		Err(_) => {
			tracing::error!("panic in engine callback");
			default
		}
	}
}

pub trait ReturnCode {
	fn code(&self) -> i32;
}

impl ReturnCode for () {
	fn code(&self) -> i32 {
		0
	}
}

impl ReturnCode for Result<(), Error> {
	fn code(&self) -> i32 {
		match self {
			Ok(()) => 0,
			Err(e) => e.code(),
		}
	}
}

impl ReturnCode for Result<bool, Error> {
	fn code(&self) -> i32 {
		match self {
			Ok(ok) => *ok as i32,
			Err(e) => e.code(),
		}
	}
}

impl ReturnCode for Result<i32, Error> {
	fn code(&self) -> i32 {
		match self {
			Ok(code) if *code < 0 => Error::InvalidCode.code(),
			Ok(code) => *code,
			Err(e) => e.code(),
		}
	}
}

/// Every handle is accepted; 0 is the global handle, unknown players fail later with `NotFound`.
pub fn parse_player(player: i64) -> fvp::PlayerHandle {
	fvp::PlayerHandle(player)
}

pub fn parse_type(ty: i32) -> Result<fvp::CallbackType, Error> {
	Ok(fvp::CallbackType::try_from(ty)?)
}

/// # Safety
///
/// The caller must ensure that cstr is valid for 'a.
pub unsafe fn parse_str<'a>(cstr: *const c_char) -> Result<&'a str, Error> {
	if cstr.is_null() {
		return Ok("");
	}

	let string = unsafe { CStr::from_ptr(cstr) };
	Ok(string.to_str()?)
}

/// # Safety
///
/// The caller must ensure that data is valid for 'a.
pub unsafe fn parse_slice<'a>(data: *const u8, size: usize) -> Result<&'a [u8], Error> {
	if data.is_null() {
		if size == 0 {
			return Ok(&[]);
		}

		return Err(Error::InvalidPointer);
	}

	let data = unsafe { std::slice::from_raw_parts(data, size) };
	Ok(data)
}
