use std::collections::HashMap;
use std::ffi::{CString, c_char, c_void};
use std::sync::Arc;

use fvp::{
	Decoder, Engine, EventCallback, GlobalOption, LogCallback, LogLevel, MediaEvent, MediaStatus,
	MediaStatusCallback, PlayerHandle, PrepareCallback, RenderApi, RenderCallback, SeekCallback, SeekFlag,
	Snapshot, SnapshotCallback, State, StateCallback, SyncCallback,
};
use parking_lot::Mutex;

/// Bits of the `mask` passed to [FvpEngineApi::subscribe]; a set bit means the engine should
/// report that notification through the matching `fvp_engine_*` function.
pub const FVP_HOOK_EVENT: u32 = 1 << 0;
pub const FVP_HOOK_STATE: u32 = 1 << 1;
pub const FVP_HOOK_MEDIA_STATUS: u32 = 1 << 2;
pub const FVP_HOOK_SYNC: u32 = 1 << 4;
pub const FVP_HOOK_LOG: u32 = 1 << 7;
pub const FVP_HOOK_FRAME: u32 = 1 << 8;

pub const FVP_RENDER_API_NONE: i32 = 0;
pub const FVP_RENDER_API_GL: i32 = 1;
pub const FVP_RENDER_API_D3D11: i32 = 2;

/// A render target: a GL framebuffer name or an `ID3D11Texture2D*`.
#[repr(C)]
pub struct FvpRenderApi {
	pub kind: i32,
	pub handle: u64,
}

/// The engine functions, provided once by the host at [crate::fvp_init].
///
/// Every function receives `user_data` first. Missing functions are treated as no-ops.
#[repr(C)]
#[derive(Clone, Copy)]
pub struct FvpEngineApi {
	pub user_data: *mut c_void,
	pub has_player: Option<unsafe extern "C" fn(user_data: *mut c_void, player: i64) -> bool>,
	pub subscribe: Option<unsafe extern "C" fn(user_data: *mut c_void, player: i64, mask: u32)>,
	pub duration: Option<unsafe extern "C" fn(user_data: *mut c_void, player: i64) -> i64>,
	pub prepare: Option<unsafe extern "C" fn(user_data: *mut c_void, player: i64, position: i64, flags: i32)>,
	pub seek: Option<unsafe extern "C" fn(user_data: *mut c_void, player: i64, position: i64, flags: i32) -> bool>,
	pub snapshot: Option<unsafe extern "C" fn(user_data: *mut c_void, player: i64, width: i32, height: i32)>,
	pub set_log_level: Option<unsafe extern "C" fn(user_data: *mut c_void, level: i32)>,
	pub set_global_option_int:
		Option<unsafe extern "C" fn(user_data: *mut c_void, key: *const c_char, value: i64)>,
	pub set_global_option_str:
		Option<unsafe extern "C" fn(user_data: *mut c_void, key: *const c_char, value: *const c_char)>,
	pub set_global_option_ptr:
		Option<unsafe extern "C" fn(user_data: *mut c_void, key: *const c_char, value: *mut c_void)>,
	pub set_video_surface_size: Option<unsafe extern "C" fn(user_data: *mut c_void, player: i64, width: i32, height: i32)>,
	pub scale: Option<unsafe extern "C" fn(user_data: *mut c_void, player: i64, x: f32, y: f32)>,
	pub render_video: Option<unsafe extern "C" fn(user_data: *mut c_void, player: i64) -> f64>,
	pub set_render_api: Option<unsafe extern "C" fn(user_data: *mut c_void, player: i64, api: *const FvpRenderApi)>,
}

// SAFETY: the engine is called from the decoder, raster and runtime threads.
// The host MUST guarantee:
// - every function is thread-safe, including any access to user_data
// - user_data and the functions stay valid until fvp_shutdown returns
unsafe impl Send for FvpEngineApi {}
unsafe impl Sync for FvpEngineApi {}

/// The callbacks installed on one player, invoked by the `fvp_engine_*` functions.
#[derive(Default)]
struct Hooks {
	render: Option<Arc<dyn Fn() + Send + Sync>>,
	event: Option<Arc<dyn Fn(&MediaEvent) -> bool + Send + Sync>>,
	state: Option<Arc<dyn Fn(State) + Send + Sync>>,
	media_status: Option<Arc<dyn Fn(MediaStatus, MediaStatus) -> bool + Send + Sync>>,
	sync: Option<Arc<dyn Fn() -> f64 + Send + Sync>>,

	prepare: Option<PrepareCallback>,
	seek: Option<SeekCallback>,
	snapshot: Option<SnapshotCallback>,
}

impl Hooks {
	fn mask(&self) -> u32 {
		let mut mask = 0;
		if self.render.is_some() {
			mask |= FVP_HOOK_FRAME;
		}
		if self.event.is_some() {
			mask |= FVP_HOOK_EVENT;
		}
		if self.state.is_some() {
			mask |= FVP_HOOK_STATE;
		}
		if self.media_status.is_some() {
			mask |= FVP_HOOK_MEDIA_STATUS;
		}
		if self.sync.is_some() {
			mask |= FVP_HOOK_SYNC;
		}
		mask
	}
}

/// The host's engine, and the callbacks we installed on it.
pub struct Host {
	api: FvpEngineApi,
	hooks: Mutex<HashMap<PlayerHandle, Hooks>>,
	log: Mutex<Option<Arc<dyn Fn(LogLevel, &str) + Send + Sync>>>,
}

impl Host {
	pub fn new(api: FvpEngineApi) -> Arc<Self> {
		Arc::new(Self {
			api,
			hooks: Default::default(),
			log: Default::default(),
		})
	}

	/// Update one player's hooks, then tell the engine which notifications we want.
	fn update<F: FnOnce(&mut Hooks)>(&self, handle: PlayerHandle, f: F) {
		let mask = {
			let mut hooks = self.hooks.lock();
			let entry = hooks.entry(handle).or_default();
			f(entry);
			let mask = entry.mask();

			if mask == 0 && entry.prepare.is_none() && entry.seek.is_none() && entry.snapshot.is_none() {
				hooks.remove(&handle);
			}
			mask
		};

		if let Some(subscribe) = self.api.subscribe {
			// SAFETY: guaranteed by the host at fvp_init.
			unsafe { subscribe(self.api.user_data, handle.0, mask) };
		}
	}

	pub fn frame_ready(&self, handle: PlayerHandle) {
		let render = self.hooks.lock().get(&handle).and_then(|hooks| hooks.render.clone());
		if let Some(render) = render {
			render();
		}
	}

	pub fn event(&self, handle: PlayerHandle, event: &MediaEvent) -> bool {
		let callback = self.hooks.lock().get(&handle).and_then(|hooks| hooks.event.clone());
		callback.is_some_and(|callback| callback(event))
	}

	pub fn state(&self, handle: PlayerHandle, state: State) {
		let callback = self.hooks.lock().get(&handle).and_then(|hooks| hooks.state.clone());
		if let Some(callback) = callback {
			callback(state);
		}
	}

	pub fn media_status(&self, handle: PlayerHandle, old: MediaStatus, new: MediaStatus) -> bool {
		let callback = self.hooks.lock().get(&handle).and_then(|hooks| hooks.media_status.clone());
		callback.is_none_or(|callback| callback(old, new))
	}

	pub fn sync(&self, handle: PlayerHandle) -> f64 {
		let callback = self.hooks.lock().get(&handle).and_then(|hooks| hooks.sync.clone());
		callback.map(|callback| callback()).unwrap_or(-1.0)
	}

	/// Complete a pending prepare. Returns `true` when nothing was pending.
	pub fn prepared(&self, handle: PlayerHandle, position: i64, boost: &mut bool) -> bool {
		let callback = self.hooks.lock().get_mut(&handle).and_then(|hooks| hooks.prepare.take());
		match callback {
			Some(callback) => callback(position, boost),
			None => {
				tracing::debug!(%handle, "prepared without a pending prepare");
				true
			}
		}
	}

	pub fn seeked(&self, handle: PlayerHandle, position: i64) {
		let callback = self.hooks.lock().get_mut(&handle).and_then(|hooks| hooks.seek.take());
		match callback {
			Some(callback) => callback(position),
			None => tracing::debug!(%handle, "seeked without a pending seek"),
		}
	}

	pub fn snapshot(&self, handle: PlayerHandle, snapshot: Option<Snapshot>) {
		let callback = self.hooks.lock().get_mut(&handle).and_then(|hooks| hooks.snapshot.take());
		match callback {
			Some(callback) => callback(snapshot),
			None => tracing::debug!(%handle, "snapshot without a pending request"),
		}
	}

	pub fn log(&self, level: LogLevel, text: &str) {
		let callback = self.log.lock().clone();
		if let Some(callback) = callback {
			callback(level, text);
		}
	}

	#[cfg(test)]
	fn mask(&self, handle: PlayerHandle) -> u32 {
		self.hooks.lock().get(&handle).map(Hooks::mask).unwrap_or(0)
	}
}

/// [Engine] over the host's function table.
pub struct HostEngine(pub Arc<Host>);

impl Engine for HostEngine {
	fn player(&self, handle: PlayerHandle) -> Option<Arc<dyn Decoder>> {
		if let Some(has_player) = self.0.api.has_player {
			// SAFETY: guaranteed by the host at fvp_init.
			if !unsafe { has_player(self.0.api.user_data, handle.0) } {
				return None;
			}
		}

		Some(Arc::new(HostDecoder {
			host: self.0.clone(),
			handle,
		}))
	}

	fn set_global_option(&self, key: &str, value: GlobalOption) {
		let Ok(ckey) = CString::new(key) else {
			tracing::warn!(key, "invalid global option name");
			return;
		};
		let api = &self.0.api;

		// SAFETY: guaranteed by the host at fvp_init; strings outlive the call.
		unsafe {
			match value {
				GlobalOption::Int(value) => {
					if let Some(set) = api.set_global_option_int {
						set(api.user_data, ckey.as_ptr(), value);
					}
				}
				GlobalOption::Str(value) => {
					let Ok(value) = CString::new(value) else {
						tracing::warn!(key, "invalid global option value");
						return;
					};
					if let Some(set) = api.set_global_option_str {
						set(api.user_data, ckey.as_ptr(), value.as_ptr());
					}
				}
				GlobalOption::Ptr(value) => {
					if let Some(set) = api.set_global_option_ptr {
						set(api.user_data, ckey.as_ptr(), value as *mut c_void);
					}
				}
			}
		}
	}

	fn set_log_handler(&self, callback: Option<LogCallback>) {
		let mask = match callback.is_some() {
			true => FVP_HOOK_LOG,
			false => 0,
		};
		*self.0.log.lock() = callback.map(Arc::from);

		if let Some(subscribe) = self.0.api.subscribe {
			// SAFETY: guaranteed by the host at fvp_init.
			unsafe { subscribe(self.0.api.user_data, PlayerHandle::GLOBAL.0, mask) };
		}
	}

	fn set_log_level(&self, level: LogLevel) {
		if let Some(set) = self.0.api.set_log_level {
			// SAFETY: guaranteed by the host at fvp_init.
			unsafe { set(self.0.api.user_data, level as i32) };
		}
	}
}

/// [Decoder] for one player handle of the host.
pub struct HostDecoder {
	host: Arc<Host>,
	handle: PlayerHandle,
}

impl HostDecoder {
	fn api(&self) -> &FvpEngineApi {
		&self.host.api
	}
}

impl Decoder for HostDecoder {
	fn set_render_api(&self, api: Option<RenderApi>) {
		let Some(set) = self.api().set_render_api else { return };

		let api = match api {
			Some(RenderApi::Gl { fbo }) => FvpRenderApi {
				kind: FVP_RENDER_API_GL,
				handle: fbo.into(),
			},
			Some(RenderApi::D3d11 { rtv }) => FvpRenderApi {
				kind: FVP_RENDER_API_D3D11,
				handle: rtv as u64,
			},
			None => FvpRenderApi {
				kind: FVP_RENDER_API_NONE,
				handle: 0,
			},
		};

		// SAFETY: guaranteed by the host at fvp_init; api outlives the call.
		unsafe { set(self.api().user_data, self.handle.0, &api) };
	}

	fn set_render_callback(&self, callback: Option<RenderCallback>) {
		self.host.update(self.handle, |hooks| hooks.render = callback.map(Arc::from));
	}

	fn set_video_surface_size(&self, width: i32, height: i32) {
		if let Some(set) = self.api().set_video_surface_size {
			// SAFETY: guaranteed by the host at fvp_init.
			unsafe { set(self.api().user_data, self.handle.0, width, height) };
		}
	}

	fn scale(&self, x: f32, y: f32) {
		if let Some(scale) = self.api().scale {
			// SAFETY: guaranteed by the host at fvp_init.
			unsafe { scale(self.api().user_data, self.handle.0, x, y) };
		}
	}

	fn render_video(&self) -> f64 {
		match self.api().render_video {
			// SAFETY: guaranteed by the host at fvp_init.
			Some(render) => unsafe { render(self.api().user_data, self.handle.0) },
			None => 0.0,
		}
	}

	fn duration(&self) -> i64 {
		match self.api().duration {
			// SAFETY: guaranteed by the host at fvp_init.
			Some(duration) => unsafe { duration(self.api().user_data, self.handle.0) },
			None => 0,
		}
	}

	fn prepare(&self, position: i64, flags: SeekFlag, callback: PrepareCallback) {
		let Some(prepare) = self.api().prepare else {
			tracing::warn!(handle = %self.handle, "engine can't prepare");
			return;
		};

		self.host.update(self.handle, |hooks| hooks.prepare = Some(callback));

		// SAFETY: guaranteed by the host at fvp_init.
		unsafe { prepare(self.api().user_data, self.handle.0, position, flags.0) };
	}

	fn seek(&self, position: i64, flags: SeekFlag, callback: SeekCallback) -> bool {
		let Some(seek) = self.api().seek else {
			return false;
		};

		self.host.update(self.handle, |hooks| hooks.seek = Some(callback));

		// SAFETY: guaranteed by the host at fvp_init.
		let started = unsafe { seek(self.api().user_data, self.handle.0, position, flags.0) };
		if !started {
			self.host.update(self.handle, |hooks| hooks.seek = None);
		}
		started
	}

	fn snapshot(&self, width: i32, height: i32, callback: SnapshotCallback) {
		let Some(snapshot) = self.api().snapshot else {
			callback(None);
			return;
		};

		self.host.update(self.handle, |hooks| hooks.snapshot = Some(callback));

		// SAFETY: guaranteed by the host at fvp_init.
		unsafe { snapshot(self.api().user_data, self.handle.0, width, height) };
	}

	fn on_event(&self, callback: Option<EventCallback>) {
		self.host.update(self.handle, |hooks| hooks.event = callback.map(Arc::from));
	}

	fn on_state_changed(&self, callback: Option<StateCallback>) {
		self.host.update(self.handle, |hooks| hooks.state = callback.map(Arc::from));
	}

	fn on_media_status(&self, callback: Option<MediaStatusCallback>) {
		self.host.update(self.handle, |hooks| hooks.media_status = callback.map(Arc::from));
	}

	fn on_sync(&self, callback: Option<SyncCallback>) {
		self.host.update(self.handle, |hooks| hooks.sync = callback.map(Arc::from));
	}
}

#[cfg(test)]
mod test {
	use super::*;

	fn empty() -> FvpEngineApi {
		FvpEngineApi {
			user_data: std::ptr::null_mut(),
			has_player: None,
			subscribe: None,
			duration: None,
			prepare: None,
			seek: None,
			snapshot: None,
			set_log_level: None,
			set_global_option_int: None,
			set_global_option_str: None,
			set_global_option_ptr: None,
			set_video_surface_size: None,
			scale: None,
			render_video: None,
			set_render_api: None,
		}
	}

	#[test]
	fn hooks_mask() {
		let host = Host::new(empty());
		let engine = HostEngine(host.clone());
		let handle = PlayerHandle(3);
		let decoder = engine.player(handle).unwrap();

		decoder.on_event(Some(Box::new(|_| true)));
		decoder.on_sync(Some(Box::new(|| 2.5)));
		assert_eq!(host.mask(handle), FVP_HOOK_EVENT | FVP_HOOK_SYNC);

		assert!(host.event(handle, &MediaEvent::default()));
		assert_eq!(host.sync(handle), 2.5);

		decoder.on_event(None);
		decoder.on_sync(None);
		assert_eq!(host.mask(handle), 0);
		assert!(!host.event(handle, &MediaEvent::default()));
		assert_eq!(host.sync(handle), -1.0);
	}

	#[test]
	fn defaults_without_hooks() {
		let host = Host::new(empty());
		let handle = PlayerHandle(9);

		assert!(host.media_status(handle, MediaStatus::LOADING, MediaStatus::LOADED));
		let mut boost = false;
		assert!(host.prepared(handle, 10, &mut boost));
		host.seeked(handle, 10);
		host.frame_ready(handle);
	}

	#[test]
	fn missing_functions() {
		let host = Host::new(empty());
		let decoder = HostEngine(host).player(PlayerHandle(1)).unwrap();

		assert_eq!(decoder.duration(), 0);
		assert!(!decoder.seek(0, SeekFlag::DEFAULT, Box::new(|_| {})));

		let (tx, rx) = std::sync::mpsc::channel();
		decoder.snapshot(0, 0, Box::new(move |snapshot| tx.send(snapshot.is_none()).unwrap()));
		assert!(rx.recv().unwrap());
	}
}
