use bytes::Bytes;

use crate::{Error, LogLevel, MediaEvent, MediaStatus, Snapshot, State};

/// The kind of notification, also the first element of every posted [Message].
///
/// The numeric tags are part of the wire contract with the scripting runtime.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
#[repr(i32)]
pub enum CallbackType {
	Event = 0,
	State = 1,
	MediaStatus = 2,
	Prepared = 3,
	Sync = 4,
	Seek = 5,
	Snapshot = 6,
	Log = 7,
}

impl CallbackType {
	pub const COUNT: usize = 8;

	pub const ALL: [Self; Self::COUNT] = [
		Self::Event,
		Self::State,
		Self::MediaStatus,
		Self::Prepared,
		Self::Sync,
		Self::Seek,
		Self::Snapshot,
		Self::Log,
	];

	pub fn index(self) -> usize {
		self as usize
	}

	pub(crate) fn bit(self) -> u32 {
		1 << (self as u32)
	}

	/// Whether the type is posted without ever waiting for a reply.
	pub fn notify_only(self) -> bool {
		matches!(self, Self::Event | Self::Seek | Self::Snapshot | Self::Log)
	}
}

impl TryFrom<i32> for CallbackType {
	type Error = Error;

	fn try_from(raw: i32) -> Result<Self, Error> {
		usize::try_from(raw)
			.ok()
			.and_then(|index| Self::ALL.get(index).copied())
			.ok_or(Error::InvalidType(raw))
	}
}

/// A single field of a posted message or a method-call argument.
#[derive(Clone, Debug, PartialEq)]
pub enum Value {
	Null,
	Bool(bool),
	Int(i64),
	Double(f64),
	String(String),
	Bytes(Bytes),
}

impl Value {
	pub fn as_int(&self) -> Option<i64> {
		match self {
			Self::Int(v) => Some(*v),
			_ => None,
		}
	}

	pub fn as_bool(&self) -> Option<bool> {
		match self {
			Self::Bool(v) => Some(*v),
			_ => None,
		}
	}

	pub fn as_str(&self) -> Option<&str> {
		match self {
			Self::String(v) => Some(v),
			_ => None,
		}
	}
}

impl From<bool> for Value {
	fn from(v: bool) -> Self {
		Self::Bool(v)
	}
}

impl From<i64> for Value {
	fn from(v: i64) -> Self {
		Self::Int(v)
	}
}

impl From<i32> for Value {
	fn from(v: i32) -> Self {
		Self::Int(v.into())
	}
}

impl From<u32> for Value {
	fn from(v: u32) -> Self {
		Self::Int(v.into())
	}
}

impl From<f64> for Value {
	fn from(v: f64) -> Self {
		Self::Double(v)
	}
}

impl From<String> for Value {
	fn from(v: String) -> Self {
		Self::String(v)
	}
}

impl From<&str> for Value {
	fn from(v: &str) -> Self {
		Self::String(v.to_string())
	}
}

impl From<Bytes> for Value {
	fn from(v: Bytes) -> Self {
		Self::Bytes(v)
	}
}

impl<T: Into<Value>> From<Option<T>> for Value {
	fn from(v: Option<T>) -> Self {
		v.map(Into::into).unwrap_or(Self::Null)
	}
}

/// An ordered sequence of values posted to the scripting runtime.
///
/// The first value is always the integer [CallbackType] tag.
#[derive(Clone, Debug, PartialEq)]
pub struct Message {
	values: Vec<Value>,
}

impl Message {
	pub fn new(ty: CallbackType) -> Self {
		Self {
			values: vec![Value::Int(ty as i64)],
		}
	}

	pub fn with(mut self, value: impl Into<Value>) -> Self {
		self.values.push(value.into());
		self
	}

	pub fn ty(&self) -> Option<CallbackType> {
		let tag = self.values.first()?.as_int()?;
		CallbackType::try_from(i32::try_from(tag).ok()?).ok()
	}

	pub fn values(&self) -> &[Value] {
		&self.values
	}

	/// The fields following the tag.
	pub fn fields(&self) -> &[Value] {
		&self.values[1..]
	}

	pub fn event(event: &MediaEvent) -> Self {
		Self::new(CallbackType::Event)
			.with(event.error)
			.with(event.category.as_str())
			.with(event.detail.as_str())
	}

	pub fn state(old: State, new: State) -> Self {
		Self::new(CallbackType::State).with(old as i32).with(new as i32)
	}

	pub fn media_status(old: MediaStatus, new: MediaStatus) -> Self {
		Self::new(CallbackType::MediaStatus).with(old.0).with(new.0)
	}

	pub fn prepared(position: i64, live: bool) -> Self {
		Self::new(CallbackType::Prepared).with(position).with(live)
	}

	pub fn sync() -> Self {
		Self::new(CallbackType::Sync)
	}

	pub fn seek(position: i64) -> Self {
		Self::new(CallbackType::Seek).with(position)
	}

	pub fn snapshot(snapshot: Option<Snapshot>) -> Self {
		match snapshot {
			Some(snapshot) => Self::new(CallbackType::Snapshot)
				.with(snapshot.width)
				.with(snapshot.height)
				.with(snapshot.data),
			None => Self::new(CallbackType::Snapshot).with(0).with(0).with(Value::Null),
		}
	}

	pub fn log(level: LogLevel, text: &str) -> Self {
		Self::new(CallbackType::Log).with(level as i32).with(text)
	}
}

/// Data sent back by the scripting runtime for a notification that waits for a reply.
#[derive(Clone, Copy, Debug, PartialEq)]
pub enum Reply {
	/// Releases the waiting thread without a payload.
	Ack,
	MediaStatus { ret: bool },
	Prepared { ret: bool, boost: bool },
	Sync { ret: f64 },
}

impl Reply {
	/// Check the payload is meaningful for the given callback type.
	pub fn matches(&self, ty: CallbackType) -> bool {
		match self {
			Self::Ack => true,
			Self::MediaStatus { .. } => ty == CallbackType::MediaStatus,
			Self::Prepared { .. } => ty == CallbackType::Prepared,
			Self::Sync { .. } => ty == CallbackType::Sync,
		}
	}
}

#[cfg(test)]
mod test {
	use super::*;

	#[test]
	fn tag_first() {
		let msg = Message::state(State::Stopped, State::Playing);
		assert_eq!(msg.ty(), Some(CallbackType::State));
		assert_eq!(msg.values()[0], Value::Int(1));
		assert_eq!(msg.fields(), &[Value::Int(0), Value::Int(1)]);
	}

	#[test]
	fn snapshot_fields() {
		let msg = Message::snapshot(Some(Snapshot {
			width: 2,
			height: 1,
			stride: 8,
			data: Bytes::from_static(&[0; 8]),
		}));
		assert_eq!(msg.fields()[0], Value::Int(2));
		assert_eq!(msg.fields()[1], Value::Int(1));
		assert!(matches!(&msg.fields()[2], Value::Bytes(data) if data.len() == 8));

		let empty = Message::snapshot(None);
		assert_eq!(empty.fields(), &[Value::Int(0), Value::Int(0), Value::Null]);
	}

	#[test]
	fn replies() {
		let waiting: Vec<_> = CallbackType::ALL.into_iter().filter(|ty| !ty.notify_only()).collect();
		assert_eq!(
			waiting,
			[CallbackType::State, CallbackType::MediaStatus, CallbackType::Prepared, CallbackType::Sync]
		);
	}

	#[test]
	fn callback_type_raw() {
		assert_eq!(CallbackType::try_from(3), Ok(CallbackType::Prepared));
		assert_eq!(CallbackType::try_from(-1), Err(Error::InvalidType(-1)));
		assert_eq!(CallbackType::try_from(8), Err(Error::InvalidType(8)));
	}

	#[test]
	fn reply_matches() {
		assert!(Reply::Ack.matches(CallbackType::State));
		assert!(Reply::Prepared { ret: true, boost: false }.matches(CallbackType::Prepared));
		assert!(!Reply::Sync { ret: 1.0 }.matches(CallbackType::MediaStatus));
	}
}
