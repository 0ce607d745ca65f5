//! The media engine, seen from the integration layer.
//!
//! The engine is an opaque black box: it decodes, renders into whatever target it is given, and
//! invokes callbacks on its own worker threads. These traits are the only capabilities we use.

use std::{fmt, sync::Arc};

use bytes::Bytes;

/// An opaque decoder instance owned by the scripting runtime.
///
/// We wrap it but never own its lifetime. `0` is reserved for process-wide subscriptions.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct PlayerHandle(pub i64);

impl PlayerHandle {
	pub const GLOBAL: Self = Self(0);

	pub fn is_global(&self) -> bool {
		self.0 == 0
	}
}

impl fmt::Display for PlayerHandle {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		write!(f, "{:#x}", self.0)
	}
}

/// Identifier assigned by the compositor when a texture is registered.
///
/// Unique while live, possibly reused afterwards.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TextureId(pub i64);

impl fmt::Display for TextureId {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		self.0.fmt(f)
	}
}

/// Playback state as reported by the engine.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
#[repr(i32)]
pub enum State {
	#[default]
	Stopped = 0,
	Playing = 1,
	Paused = 2,
}

impl State {
	pub fn from_raw(raw: i32) -> Option<Self> {
		match raw {
			0 => Some(Self::Stopped),
			1 => Some(Self::Playing),
			2 => Some(Self::Paused),
			_ => None,
		}
	}
}

/// A set of media status flags; several may be set at once.
#[derive(Clone, Copy, Default, PartialEq, Eq, Hash)]
pub struct MediaStatus(pub u32);

impl MediaStatus {
	pub const NO_MEDIA: Self = Self(0);
	pub const UNLOADED: Self = Self(1);
	pub const LOADING: Self = Self(1 << 1);
	pub const LOADED: Self = Self(1 << 2);
	pub const PREPARED: Self = Self(1 << 8);
	pub const STALLED: Self = Self(1 << 3);
	pub const BUFFERING: Self = Self(1 << 4);
	pub const BUFFERED: Self = Self(1 << 5);
	pub const END: Self = Self(1 << 6);
	pub const SEEKING: Self = Self(1 << 7);
	pub const INVALID: Self = Self(1 << 31);

	pub fn contains(&self, other: Self) -> bool {
		self.0 & other.0 == other.0
	}
}

impl std::ops::BitOr for MediaStatus {
	type Output = Self;

	fn bitor(self, rhs: Self) -> Self {
		Self(self.0 | rhs.0)
	}
}

impl fmt::Debug for MediaStatus {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		write!(f, "MediaStatus({:#x})", self.0)
	}
}

/// Seek behavior flags, passed through to the engine untouched.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub struct SeekFlag(pub i32);

impl SeekFlag {
	pub const FROM_START: Self = Self(1);
	pub const KEY_FRAME: Self = Self(1 << 8);
	pub const FAST: Self = Self::KEY_FRAME;
	pub const DEFAULT: Self = Self(Self::FROM_START.0 | Self::KEY_FRAME.0);
}

/// An engine event, like a network or decoder error, or a metadata update.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct MediaEvent {
	pub error: i64,
	pub category: String,
	pub detail: String,
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[repr(i32)]
pub enum LogLevel {
	Off = 0,
	Error = 1,
	Warning = 2,
	#[default]
	Info = 3,
	Debug = 4,
	All = 5,
}

impl LogLevel {
	pub fn from_raw(raw: i32) -> Self {
		match raw {
			i32::MIN..=0 => Self::Off,
			1 => Self::Error,
			2 => Self::Warning,
			3 => Self::Info,
			4 => Self::Debug,
			_ => Self::All,
		}
	}
}

impl From<tracing::Level> for LogLevel {
	fn from(level: tracing::Level) -> Self {
		match level {
			tracing::Level::ERROR => Self::Error,
			tracing::Level::WARN => Self::Warning,
			tracing::Level::INFO => Self::Info,
			tracing::Level::DEBUG => Self::Debug,
			tracing::Level::TRACE => Self::All,
		}
	}
}

/// The render target handed to the engine.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum RenderApi {
	/// Render into a framebuffer object of the current GL context.
	Gl { fbo: u32 },
	/// Render into a D3D11 texture, as a raw `ID3D11Texture2D` pointer.
	D3d11 { rtv: usize },
}

/// Pixels captured by [Decoder::snapshot], tightly packed RGBA unless `stride` says otherwise.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Snapshot {
	pub width: u32,
	pub height: u32,
	pub stride: u32,
	pub data: Bytes,
}

/// A value passed to [Engine::set_global_option].
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum GlobalOption {
	Str(String),
	Int(i64),
	/// A platform pointer such as an X11 `Display*` or a `JavaVM*`.
	Ptr(usize),
}

pub type RenderCallback = Box<dyn Fn() + Send + Sync>;
pub type EventCallback = Box<dyn Fn(&MediaEvent) -> bool + Send + Sync>;
pub type StateCallback = Box<dyn Fn(State) + Send + Sync>;
pub type MediaStatusCallback = Box<dyn Fn(MediaStatus, MediaStatus) -> bool + Send + Sync>;
pub type SyncCallback = Box<dyn Fn() -> f64 + Send + Sync>;
pub type LogCallback = Box<dyn Fn(LogLevel, &str) + Send + Sync>;

/// Called once when prepare completes with the position reached.
///
/// `boost` may be changed to request a boosted start; returning `false` cancels playback.
pub type PrepareCallback = Box<dyn FnOnce(i64, &mut bool) -> bool + Send>;
/// Called once when a seek completes, with the position reached or a negative value on failure.
pub type SeekCallback = Box<dyn FnOnce(i64) + Send>;
/// Called once with the captured frame, if any.
pub type SnapshotCallback = Box<dyn FnOnce(Option<Snapshot>) + Send>;

/// The per-player capabilities of the engine.
///
/// Every setter replaces the previous callback; the engine must not invoke a callback after the
/// call that replaced it has returned.
pub trait Decoder: Send + Sync {
	fn set_render_api(&self, api: Option<RenderApi>);
	fn set_render_callback(&self, callback: Option<RenderCallback>);

	/// Sets the logical surface size, or releases the render target with `(-1, -1)`.
	fn set_video_surface_size(&self, width: i32, height: i32);
	fn scale(&self, x: f32, y: f32);

	/// Renders the current frame into the configured target, returning its timestamp.
	///
	/// Requires the target's GPU context to be current.
	fn render_video(&self) -> f64;

	/// The media duration in milliseconds, `<= 0` for live streams.
	fn duration(&self) -> i64;

	fn prepare(&self, position: i64, flags: SeekFlag, callback: PrepareCallback);
	fn seek(&self, position: i64, flags: SeekFlag, callback: SeekCallback) -> bool;
	fn snapshot(&self, width: i32, height: i32, callback: SnapshotCallback);

	fn on_event(&self, callback: Option<EventCallback>);
	fn on_state_changed(&self, callback: Option<StateCallback>);
	fn on_media_status(&self, callback: Option<MediaStatusCallback>);
	fn on_sync(&self, callback: Option<SyncCallback>);
}

/// The process-wide side of the engine.
pub trait Engine: Send + Sync {
	/// Wrap the opaque handle owned by the scripting runtime.
	fn player(&self, handle: PlayerHandle) -> Option<Arc<dyn Decoder>>;

	fn set_global_option(&self, key: &str, value: GlobalOption);
	fn set_log_handler(&self, callback: Option<LogCallback>);
	fn set_log_level(&self, level: LogLevel);
}

#[cfg(test)]
mod test {
	use super::*;

	#[test]
	fn media_status_flags() {
		let status = MediaStatus::LOADED | MediaStatus::PREPARED | MediaStatus::BUFFERED;
		assert!(status.contains(MediaStatus::PREPARED));
		assert!(!status.contains(MediaStatus::END));
		assert!(status.contains(MediaStatus::NO_MEDIA));
	}

	#[test]
	fn log_level_clamps() {
		assert_eq!(LogLevel::from_raw(-3), LogLevel::Off);
		assert_eq!(LogLevel::from_raw(2), LogLevel::Warning);
		assert_eq!(LogLevel::from_raw(42), LogLevel::All);
		assert_eq!(LogLevel::from(tracing::Level::DEBUG), LogLevel::Debug);
	}

	#[test]
	fn state_raw() {
		assert_eq!(State::from_raw(1), Some(State::Playing));
		assert_eq!(State::from_raw(7), None);
	}
}
