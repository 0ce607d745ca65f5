use crate::ffi;
use crate::state::*;
use crate::{Error, FvpEngineApi, FvpPostFn, Host, HostPort};

use std::ffi::c_char;
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;

use fvp::{CallbackType, LogLevel, MediaEvent, MediaStatus, Reply, SeekFlag, Snapshot};
use tracing::Level;

/// The payload of [fvp_reply_type]; which fields are read depends on the callback type.
///
/// - MediaStatus: `ret` accepts the status.
/// - Prepared: `ret` accepts playback, `boost` requests a boosted start.
/// - Sync: `sync` is the external clock in seconds.
#[repr(C)]
pub struct FvpReply {
	pub ret: bool,
	pub boost: bool,
	pub sync: f64,
}

impl FvpReply {
	fn to_reply(&self, ty: CallbackType) -> Reply {
		match ty {
			CallbackType::MediaStatus => Reply::MediaStatus { ret: self.ret },
			CallbackType::Prepared => Reply::Prepared {
				ret: self.ret,
				boost: self.boost,
			},
			CallbackType::Sync => Reply::Sync { ret: self.sync },
			_ => Reply::Ack,
		}
	}
}

/// Initialize logging with a level.
///
/// The level is a string: "error", "warn", "info", "debug", "trace". Empty or null uses the default.
///
/// Returns a zero on success, or a negative code on failure.
///
/// # Safety
/// - The caller must ensure that level is a valid null-terminated C string.
#[unsafe(no_mangle)]
pub unsafe extern "C" fn fvp_log_level(level: *const c_char) -> i32 {
	ffi::return_code(move || {
		match unsafe { ffi::parse_str(level) }? {
			"" => fvp::Log::default(),
			level => fvp::Log::new(Level::from_str(level).map_err(|_| Error::InvalidLevel)?),
		}
		.init();

		Ok(())
	})
}

/// Bind the library to the media engine.
///
/// Must be called before any other function except [fvp_log_level]. Calling it again replaces the
/// engine and unregisters every port. A positive `reply_timeout_ms` bounds how long an engine
/// thread waits for a reply; zero or negative waits until the reply or until unregistered.
///
/// Returns a zero on success, or a negative code on failure.
///
/// # Safety
/// - The caller must ensure that api points to a valid [FvpEngineApi], which is copied.
/// - The functions and user_data must stay valid until [fvp_shutdown] returns.
#[unsafe(no_mangle)]
pub unsafe extern "C" fn fvp_init(api: *const FvpEngineApi, reply_timeout_ms: i64) -> i32 {
	ffi::return_code(move || {
		let api = unsafe { api.as_ref() }.copied().ok_or(Error::InvalidPointer)?;
		let reply_timeout = u64::try_from(reply_timeout_ms)
			.ok()
			.filter(|ms| *ms > 0)
			.map(Duration::from_millis);

		let old = State::lock().init(api, reply_timeout);
		drop(old);

		tracing::debug!(?reply_timeout, "initialized");
		Ok(())
	})
}

/// Unregister every port and release the engine.
///
/// Blocked engine threads are released with their default values.
///
/// Returns a zero on success, or a negative code on failure.
#[unsafe(no_mangle)]
pub extern "C" fn fvp_shutdown() -> i32 {
	ffi::return_code(move || {
		let old = State::lock().shutdown();
		match old {
			Some(bridge) => drop(bridge),
			None => return Err(Error::NotInitialized),
		}
		Ok(())
	})
}

/// Forward a player's notifications to a port, or the engine log when player is zero.
///
/// `post` is called from engine threads with `port` and the message; it must only enqueue.
/// The calling thread is recorded: notifications raised on it never wait for a reply.
///
/// Returns a zero on success, or a negative code on failure.
#[unsafe(no_mangle)]
pub extern "C" fn fvp_register_port(player: i64, post: Option<FvpPostFn>, port: i64) -> i32 {
	ffi::return_code(move || {
		let post = post.ok_or(Error::InvalidPointer)?;
		let player = ffi::parse_player(player);
		let bridge = State::lock().bridge()?;

		bridge.register_port(player, Arc::new(HostPort::new(post, port)))?;
		Ok(())
	})
}

/// Stop forwarding a player's notifications, releasing any blocked engine thread.
///
/// Returns 1 if a port was registered, 0 if not, or a negative code on failure.
#[unsafe(no_mangle)]
pub extern "C" fn fvp_unregister_port(player: i64) -> i32 {
	ffi::return_code(move || {
		let player = ffi::parse_player(player);
		let bridge = State::lock().bridge()?;
		Ok(bridge.unregister_port(player))
	})
}

/// Forward a callback type, optionally waiting for [fvp_reply_type] on engine threads.
///
/// Returns a zero on success, or a negative code on failure.
#[unsafe(no_mangle)]
pub extern "C" fn fvp_register_type(player: i64, ty: i32, reply: bool) -> i32 {
	ffi::return_code(move || {
		let player = ffi::parse_player(player);
		let ty = ffi::parse_type(ty)?;
		let bridge = State::lock().bridge()?;

		bridge.register_type(player, ty, reply)?;
		Ok(())
	})
}

/// Stop forwarding a callback type, releasing a blocked engine thread.
///
/// Returns a zero on success, or a negative code on failure.
#[unsafe(no_mangle)]
pub extern "C" fn fvp_unregister_type(player: i64, ty: i32) -> i32 {
	ffi::return_code(move || {
		let player = ffi::parse_player(player);
		let ty = ffi::parse_type(ty)?;
		let bridge = State::lock().bridge()?;

		bridge.unregister_type(player, ty)?;
		Ok(())
	})
}

/// Reply to the notification of the given type, releasing the engine thread waiting on it.
///
/// A null reply only releases the thread, which then uses the type's default.
///
/// Returns a zero on success, or a negative code on failure.
///
/// # Safety
/// - The caller must ensure that reply is null or points to a valid [FvpReply].
#[unsafe(no_mangle)]
pub unsafe extern "C" fn fvp_reply_type(player: i64, ty: i32, reply: *const FvpReply) -> i32 {
	ffi::return_code(move || {
		let player = ffi::parse_player(player);
		let ty = ffi::parse_type(ty)?;
		let reply = match unsafe { reply.as_ref() } {
			Some(reply) => reply.to_reply(ty),
			None => Reply::Ack,
		};

		let bridge = State::lock().bridge()?;
		bridge.reply_type(player, ty, reply)?;
		Ok(())
	})
}

/// Prepare the player; a Prepared message is posted when done.
///
/// Returns a zero on success, or a negative code on failure.
#[unsafe(no_mangle)]
pub extern "C" fn fvp_prepare(player: i64, position: i64, flags: i32) -> i32 {
	ffi::return_code(move || {
		let player = ffi::parse_player(player);
		let bridge = State::lock().bridge()?;

		bridge.prepare(player, position, SeekFlag(flags))?;
		Ok(())
	})
}

/// Seek the player; a Seek message is posted when done.
///
/// Returns 1 if the seek started, 0 if not, or a negative code on failure.
#[unsafe(no_mangle)]
pub extern "C" fn fvp_seek(player: i64, position: i64, flags: i32) -> i32 {
	ffi::return_code(move || {
		let player = ffi::parse_player(player);
		let bridge = State::lock().bridge()?;
		Ok(bridge.seek(player, position, SeekFlag(flags))?)
	})
}

/// Capture a frame; a Snapshot message is posted with the pixels, valid only during the post.
///
/// Returns a zero on success, or a negative code on failure.
#[unsafe(no_mangle)]
pub extern "C" fn fvp_snapshot(player: i64, width: i32, height: i32) -> i32 {
	ffi::return_code(move || {
		let player = ffi::parse_player(player);
		let bridge = State::lock().bridge()?;

		bridge.snapshot(player, width, height)?;
		Ok(())
	})
}

/// Set the most verbose engine log level forwarded to the global port.
///
/// Returns a zero on success, or a negative code on failure.
#[unsafe(no_mangle)]
pub extern "C" fn fvp_set_log_level(level: i32) -> i32 {
	ffi::return_code(move || {
		let bridge = State::lock().bridge()?;
		bridge.set_log_level(LogLevel::from_raw(level));
		Ok(())
	})
}

/// Run an engine notification against the current host, or return the default.
fn with_host<T, F: FnOnce(&Host) -> T>(default: T, f: F) -> T {
	let Some(host) = State::lock().host() else {
		return default;
	};
	f(&host)
}

/// The engine has a new frame for the player.
#[unsafe(no_mangle)]
pub extern "C" fn fvp_engine_frame_ready(player: i64) {
	ffi::guard((), || with_host((), |host| host.frame_ready(fvp::PlayerHandle(player))))
}

/// The engine raised an event. Returns whether it was handled.
///
/// # Safety
/// - The caller must ensure that category and detail are null or valid null-terminated C strings.
#[unsafe(no_mangle)]
pub unsafe extern "C" fn fvp_engine_event(
	player: i64,
	error: i64,
	category: *const c_char,
	detail: *const c_char,
) -> bool {
	ffi::guard(false, || {
		let event = MediaEvent {
			error,
			category: unsafe { ffi::parse_str(category) }.unwrap_or_default().to_string(),
			detail: unsafe { ffi::parse_str(detail) }.unwrap_or_default().to_string(),
		};
		with_host(false, |host| host.event(fvp::PlayerHandle(player), &event))
	})
}

/// The playback state changed.
#[unsafe(no_mangle)]
pub extern "C" fn fvp_engine_state(player: i64, state: i32) {
	ffi::guard((), || {
		let Some(state) = fvp::State::from_raw(state) else {
			tracing::warn!(state, "unknown playback state");
			return;
		};
		with_host((), |host| host.state(fvp::PlayerHandle(player), state))
	})
}

/// The media status changed. Returns whether the new status is accepted.
#[unsafe(no_mangle)]
pub extern "C" fn fvp_engine_media_status(player: i64, old: u32, new: u32) -> bool {
	ffi::guard(true, || {
		with_host(true, |host| {
			host.media_status(fvp::PlayerHandle(player), MediaStatus(old), MediaStatus(new))
		})
	})
}

/// The engine asks for the external clock, in seconds. Negative means none.
#[unsafe(no_mangle)]
pub extern "C" fn fvp_engine_sync(player: i64) -> f64 {
	ffi::guard(-1.0, || with_host(-1.0, |host| host.sync(fvp::PlayerHandle(player))))
}

/// A prepare completed. Returns false to cancel playback; boost may be changed.
///
/// # Safety
/// - The caller must ensure that boost is null or valid for reads and writes.
#[unsafe(no_mangle)]
pub unsafe extern "C" fn fvp_engine_prepared(player: i64, position: i64, boost: *mut bool) -> bool {
	ffi::guard(true, || {
		let mut scratch = false;
		let boost = match unsafe { boost.as_mut() } {
			Some(boost) => boost,
			None => &mut scratch,
		};
		with_host(true, |host| host.prepared(fvp::PlayerHandle(player), position, boost))
	})
}

/// A seek completed, with the position reached or a negative value on failure.
#[unsafe(no_mangle)]
pub extern "C" fn fvp_engine_seeked(player: i64, position: i64) {
	ffi::guard((), || with_host((), |host| host.seeked(fvp::PlayerHandle(player), position)))
}

/// A snapshot completed. Null data means no frame was captured; the pixels are copied.
///
/// # Safety
/// - The caller must ensure that data is null or valid for size bytes.
#[unsafe(no_mangle)]
pub unsafe extern "C" fn fvp_engine_snapshot(
	player: i64,
	width: u32,
	height: u32,
	stride: u32,
	data: *const u8,
	size: usize,
) {
	ffi::guard((), || {
		let snapshot = match data.is_null() {
			true => None,
			false => unsafe { ffi::parse_slice(data, size) }.ok().map(|data| Snapshot {
				width,
				height,
				stride,
				data: fvp::bytes::Bytes::copy_from_slice(data),
			}),
		};
		with_host((), |host| host.snapshot(fvp::PlayerHandle(player), snapshot))
	})
}

/// The engine logged a line.
///
/// # Safety
/// - The caller must ensure that text is null or a valid null-terminated C string.
#[unsafe(no_mangle)]
pub unsafe extern "C" fn fvp_engine_log(level: i32, text: *const c_char) {
	ffi::guard((), || {
		let Ok(text) = (unsafe { ffi::parse_str(text) }) else {
			return;
		};
		with_host((), |host| host.log(LogLevel::from_raw(level), text))
	})
}
