use fvp::{Message, Port, Value};

pub const FVP_VALUE_NULL: i32 = 0;
pub const FVP_VALUE_BOOL: i32 = 1;
pub const FVP_VALUE_INT: i32 = 2;
pub const FVP_VALUE_DOUBLE: i32 = 3;
pub const FVP_VALUE_STRING: i32 = 4;
pub const FVP_VALUE_BYTES: i32 = 5;

/// One field of a posted message.
///
/// `int` holds booleans and integers, `real` doubles, `data`/`len` strings (UTF-8, not
/// NUL-terminated) and bytes. Pointers are only valid during the `post` call.
#[repr(C)]
pub struct FvpValue {
	pub kind: i32,
	pub int: i64,
	pub real: f64,
	pub data: *const u8,
	pub len: usize,
}

impl FvpValue {
	fn new(value: &Value) -> Self {
		let mut out = Self {
			kind: FVP_VALUE_NULL,
			int: 0,
			real: 0.0,
			data: std::ptr::null(),
			len: 0,
		};

		match value {
			Value::Null => {}
			Value::Bool(v) => {
				out.kind = FVP_VALUE_BOOL;
				out.int = *v as i64;
			}
			Value::Int(v) => {
				out.kind = FVP_VALUE_INT;
				out.int = *v;
			}
			Value::Double(v) => {
				out.kind = FVP_VALUE_DOUBLE;
				out.real = *v;
			}
			Value::String(v) => {
				out.kind = FVP_VALUE_STRING;
				out.data = v.as_ptr();
				out.len = v.len();
			}
			Value::Bytes(v) => {
				out.kind = FVP_VALUE_BYTES;
				out.data = v.as_ptr();
				out.len = v.len();
			}
		}

		out
	}
}

/// A message posted to the runtime; the first value is always the integer callback type.
#[repr(C)]
pub struct FvpMessage {
	pub values: *const FvpValue,
	pub count: usize,
}

/// Enqueue a message on the runtime's port without waiting for it to be handled.
///
/// Returns `false` when the port is closed.
pub type FvpPostFn = unsafe extern "C" fn(port: i64, message: *const FvpMessage) -> bool;

/// [Port] over the runtime's native post function.
pub struct HostPort {
	post: FvpPostFn,
	port: i64,
}

impl HostPort {
	pub fn new(post: FvpPostFn, port: i64) -> Self {
		Self { post, port }
	}
}

impl Port for HostPort {
	fn post(&self, message: Message) -> Result<(), fvp::Error> {
		let values: Vec<FvpValue> = message.values().iter().map(FvpValue::new).collect();
		let raw = FvpMessage {
			values: values.as_ptr(),
			count: values.len(),
		};

		// SAFETY: the runtime copies what it keeps; message and values outlive the call.
		match unsafe { (self.post)(self.port, &raw) } {
			true => Ok(()),
			false => Err(fvp::Error::Closed),
		}
	}
}

/// Read a posted value back, for tests and for hosts written in Rust.
///
/// # Safety
///
/// The caller must ensure the value came from a message that is still being posted.
pub unsafe fn read_value(value: &FvpValue) -> Value {
	let data = match value.data.is_null() {
		true => &[][..],
		false => unsafe { std::slice::from_raw_parts(value.data, value.len) },
	};

	match value.kind {
		FVP_VALUE_BOOL => Value::Bool(value.int != 0),
		FVP_VALUE_INT => Value::Int(value.int),
		FVP_VALUE_DOUBLE => Value::Double(value.real),
		FVP_VALUE_STRING => Value::String(String::from_utf8_lossy(data).into_owned()),
		FVP_VALUE_BYTES => Value::Bytes(fvp::bytes::Bytes::copy_from_slice(data)),
		_ => Value::Null,
	}
}

/// Copy a posted message, see [read_value].
///
/// # Safety
///
/// The caller must ensure the message is still being posted.
pub unsafe fn read_message(message: *const FvpMessage) -> Vec<Value> {
	let Some(message) = (unsafe { message.as_ref() }) else {
		return Vec::new();
	};
	if message.values.is_null() {
		return Vec::new();
	}

	let values = unsafe { std::slice::from_raw_parts(message.values, message.count) };
	values.iter().map(|value| unsafe { read_value(value) }).collect()
}

#[cfg(test)]
mod test {
	use super::*;
	use fvp::{CallbackType, LogLevel, State};
	use std::sync::Mutex;

	static POSTED: Mutex<Vec<(i64, Vec<Value>)>> = Mutex::new(Vec::new());

	unsafe extern "C" fn record(port: i64, message: *const FvpMessage) -> bool {
		let values = unsafe { read_message(message) };
		POSTED.lock().unwrap().push((port, values));
		port != 0
	}

	#[test]
	fn post() {
		let port = HostPort::new(record, 7);
		port.post(Message::log(LogLevel::Warning, "hello")).unwrap();
		port.post(Message::state(State::Stopped, State::Playing)).unwrap();

		let closed = HostPort::new(record, 0);
		assert_eq!(closed.post(Message::sync()), Err(fvp::Error::Closed));

		let posted = POSTED.lock().unwrap();
		assert_eq!(
			posted[0],
			(
				7,
				vec![
					Value::Int(CallbackType::Log as i64),
					Value::Int(LogLevel::Warning as i64),
					Value::String("hello".into()),
				]
			)
		);
		assert_eq!(posted[1].1, Message::state(State::Stopped, State::Playing).values());
	}
}
