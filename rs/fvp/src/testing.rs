//! In-process doubles for the engine, the GPU and the compositor.
//!
//! They record every call so tests can assert on ordering, and let tests raise decoder callbacks
//! from any thread the way the engine's workers would.

use std::{
	collections::HashMap,
	mem,
	sync::{
		Arc, Weak,
		atomic::{AtomicBool, AtomicUsize, Ordering},
	},
};

use parking_lot::Mutex;
use slab::Slab;

use crate::gpu::{ExternalHandle, Gpu};
use crate::texture::{Completion, Compositor, TextureSource};
use crate::{
	Bridge, CleanupQueue, Decoder, Engine, Error, EventCallback, GlobalOption, LogCallback, LogLevel, MediaEvent,
	MediaStatus, MediaStatusCallback, Message, PlayerHandle, Port, PrepareCallback, RenderApi, RenderCallback, Reply,
	Result, SeekCallback, SeekFlag, Snapshot, SnapshotCallback, State, StateCallback, SyncCallback, TextureId,
};

type Shared<F> = Mutex<Option<Arc<F>>>;

/// A decoder that renders nothing and completes operations when the test says so.
#[derive(Default)]
pub struct FakeDecoder {
	render_api: Mutex<Option<RenderApi>>,
	surface_size: Mutex<(i32, i32)>,
	scaled: Mutex<Option<(f32, f32)>>,
	renders: AtomicUsize,
	duration: Mutex<i64>,

	render: Shared<dyn Fn() + Send + Sync>,
	event: Shared<dyn Fn(&MediaEvent) -> bool + Send + Sync>,
	state: Shared<dyn Fn(State) + Send + Sync>,
	media_status: Shared<dyn Fn(MediaStatus, MediaStatus) -> bool + Send + Sync>,
	sync: Shared<dyn Fn() -> f64 + Send + Sync>,

	prepared_at: Mutex<Option<(i64, SeekFlag)>>,
	prepare: Mutex<Option<PrepareCallback>>,
	seek: Mutex<Option<SeekCallback>>,
	snapshot: Mutex<Option<SnapshotCallback>>,
}

impl FakeDecoder {
	pub fn new() -> Self {
		Self::default()
	}

	pub fn renders(&self) -> usize {
		self.renders.load(Ordering::SeqCst)
	}

	pub fn render_api(&self) -> Option<RenderApi> {
		*self.render_api.lock()
	}

	pub fn surface_size(&self) -> (i32, i32) {
		*self.surface_size.lock()
	}

	pub fn scaled(&self) -> Option<(f32, f32)> {
		*self.scaled.lock()
	}

	pub fn set_duration(&self, duration: i64) {
		*self.duration.lock() = duration;
	}

	pub fn has_render_callback(&self) -> bool {
		self.render.lock().is_some()
	}

	pub fn take_render_callback(&self) -> Option<Arc<dyn Fn() + Send + Sync>> {
		self.render.lock().take()
	}

	pub fn has_media_status_callback(&self) -> bool {
		self.media_status.lock().is_some()
	}

	pub fn has_sync_callback(&self) -> bool {
		self.sync.lock().is_some()
	}

	/// Signal a decoded frame, as the engine does from its render thread.
	pub fn frame_ready(&self) {
		// Never call out with the lock held, the callback may replace itself.
		let callback = self.render.lock().clone();
		if let Some(callback) = callback {
			callback();
		}
	}

	pub fn fire_event(&self, event: &MediaEvent) -> Option<bool> {
		let callback = self.event.lock().clone()?;
		Some(callback(event))
	}

	pub fn fire_state(&self, state: State) {
		let callback = self.state.lock().clone();
		if let Some(callback) = callback {
			callback(state);
		}
	}

	pub fn fire_media_status(&self, old: MediaStatus, new: MediaStatus) -> Option<bool> {
		let callback = self.media_status.lock().clone()?;
		Some(callback(old, new))
	}

	pub fn fire_sync(&self) -> Option<f64> {
		let callback = self.sync.lock().clone()?;
		Some(callback())
	}

	pub fn prepared_at(&self) -> Option<(i64, SeekFlag)> {
		*self.prepared_at.lock()
	}

	/// Complete the pending prepare, returning whether playback continues and the boost decision.
	pub fn complete_prepare(&self, position: i64, boost: bool) -> Option<(bool, bool)> {
		let callback = self.prepare.lock().take()?;
		let mut boost = boost;
		let ret = callback(position, &mut boost);
		Some((ret, boost))
	}

	pub fn complete_seek(&self, position: i64) -> bool {
		let callback = self.seek.lock().take();
		callback.map(|callback| callback(position)).is_some()
	}

	pub fn complete_snapshot(&self, snapshot: Option<Snapshot>) -> bool {
		let callback = self.snapshot.lock().take();
		callback.map(|callback| callback(snapshot)).is_some()
	}
}

impl Decoder for FakeDecoder {
	fn set_render_api(&self, api: Option<RenderApi>) {
		*self.render_api.lock() = api;
	}

	fn set_render_callback(&self, callback: Option<RenderCallback>) {
		*self.render.lock() = callback.map(Arc::from);
	}

	fn set_video_surface_size(&self, width: i32, height: i32) {
		*self.surface_size.lock() = (width, height);
	}

	fn scale(&self, x: f32, y: f32) {
		*self.scaled.lock() = Some((x, y));
	}

	fn render_video(&self) -> f64 {
		self.renders.fetch_add(1, Ordering::SeqCst);
		0.0
	}

	fn duration(&self) -> i64 {
		*self.duration.lock()
	}

	fn prepare(&self, position: i64, flags: SeekFlag, callback: PrepareCallback) {
		*self.prepared_at.lock() = Some((position, flags));
		*self.prepare.lock() = Some(callback);
	}

	fn seek(&self, _position: i64, _flags: SeekFlag, callback: SeekCallback) -> bool {
		*self.seek.lock() = Some(callback);
		true
	}

	fn snapshot(&self, _width: i32, _height: i32, callback: SnapshotCallback) {
		*self.snapshot.lock() = Some(callback);
	}

	fn on_event(&self, callback: Option<EventCallback>) {
		*self.event.lock() = callback.map(Arc::from);
	}

	fn on_state_changed(&self, callback: Option<StateCallback>) {
		*self.state.lock() = callback.map(Arc::from);
	}

	fn on_media_status(&self, callback: Option<MediaStatusCallback>) {
		*self.media_status.lock() = callback.map(Arc::from);
	}

	fn on_sync(&self, callback: Option<SyncCallback>) {
		*self.sync.lock() = callback.map(Arc::from);
	}
}

/// An engine with a fixed set of players.
#[derive(Default)]
pub struct FakeEngine {
	players: Mutex<HashMap<PlayerHandle, Arc<FakeDecoder>>>,
	options: Mutex<HashMap<String, GlobalOption>>,
	log_handler: Shared<dyn Fn(LogLevel, &str) + Send + Sync>,
	log_level: Mutex<LogLevel>,
}

impl FakeEngine {
	pub fn new() -> Self {
		Self::default()
	}

	pub fn add_player(&self, handle: PlayerHandle) -> Arc<FakeDecoder> {
		self.players.lock().entry(handle).or_default().clone()
	}

	pub fn decoder(&self, handle: PlayerHandle) -> Option<Arc<FakeDecoder>> {
		self.players.lock().get(&handle).cloned()
	}

	pub fn global_option(&self, key: &str) -> Option<GlobalOption> {
		self.options.lock().get(key).cloned()
	}

	pub fn log_level(&self) -> LogLevel {
		*self.log_level.lock()
	}

	pub fn has_log_handler(&self) -> bool {
		self.log_handler.lock().is_some()
	}

	/// Emit a log line, as the engine does from any of its threads.
	pub fn log(&self, level: LogLevel, text: &str) {
		let handler = self.log_handler.lock().clone();
		if let Some(handler) = handler {
			handler(level, text);
		}
	}
}

impl Engine for FakeEngine {
	fn player(&self, handle: PlayerHandle) -> Option<Arc<dyn Decoder>> {
		let decoder: Arc<dyn Decoder> = self.decoder(handle)?;
		Some(decoder)
	}

	fn set_global_option(&self, key: &str, value: GlobalOption) {
		self.options.lock().insert(key.to_string(), value);
	}

	fn set_log_handler(&self, callback: Option<LogCallback>) {
		*self.log_handler.lock() = callback.map(Arc::from);
	}

	fn set_log_level(&self, level: LogLevel) {
		*self.log_level.lock() = level;
	}
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct FakeContext(pub u32);

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct FakeTarget {
	pub fbo: u32,
	pub texture: u32,
}

#[derive(Default)]
struct GpuState {
	next: u32,
	targets: usize,
	shares: usize,
	live_shares: usize,
	released: Vec<Option<FakeContext>>,
	current: Option<FakeContext>,

	fail_device: Option<Error>,
	fail_target: Option<Error>,
	fail_share: bool,
	stuck: bool,
}

/// A GPU that hands out increasing object names and remembers what was released where.
#[derive(Default)]
pub struct FakeGpu {
	state: Mutex<GpuState>,
}

impl FakeGpu {
	pub fn new() -> Self {
		Self::default()
	}

	pub fn targets_created(&self) -> usize {
		self.state.lock().targets
	}

	pub fn shares_created(&self) -> usize {
		self.state.lock().shares
	}

	pub fn live_shares(&self) -> usize {
		self.state.lock().live_shares
	}

	pub fn released(&self) -> usize {
		self.state.lock().released.len()
	}

	/// The context that was current for each release, in order.
	pub fn released_in(&self) -> Vec<Option<FakeContext>> {
		self.state.lock().released.clone()
	}

	pub fn current(&self) -> Option<FakeContext> {
		self.state.lock().current
	}

	pub fn set_current(&self, context: Option<FakeContext>) {
		self.state.lock().current = context;
	}

	pub fn fail_device(&self, err: Error) {
		self.state.lock().fail_device = Some(err);
	}

	pub fn fail_next_target(&self, err: Error) {
		self.state.lock().fail_target = Some(err);
	}

	pub fn fail_next_share(&self) {
		self.state.lock().fail_share = true;
	}

	/// Refuse to switch contexts, like a platform without a context API.
	pub fn set_stuck(&self, stuck: bool) {
		self.state.lock().stuck = stuck;
	}
}

impl Gpu for FakeGpu {
	type Context = FakeContext;
	type Target = FakeTarget;

	fn create_device(&self) -> Result<Option<FakeContext>> {
		match self.state.lock().fail_device.clone() {
			Some(err) => Err(err),
			None => Ok(None),
		}
	}

	fn flip_y(&self) -> bool {
		true
	}

	fn create_target(&self, _context: &FakeContext, _width: u32, _height: u32) -> Result<FakeTarget> {
		let mut state = self.state.lock();
		if let Some(err) = state.fail_target.take() {
			return Err(err);
		}

		state.next += 2;
		state.targets += 1;

		Ok(FakeTarget {
			fbo: state.next - 1,
			texture: state.next,
		})
	}

	fn render_api(&self, target: &FakeTarget) -> RenderApi {
		RenderApi::Gl { fbo: target.fbo }
	}

	fn share(&self, _context: &FakeContext, target: &FakeTarget) -> Result<ExternalHandle> {
		let mut state = self.state.lock();
		if mem::take(&mut state.fail_share) {
			return Err(Error::Image);
		}

		state.shares += 1;
		state.live_shares += 1;

		Ok(ExternalHandle::GlTexture {
			target: 0x0de1,
			name: target.texture,
		})
	}

	fn release(&self, _context: &FakeContext, _target: FakeTarget, shared: Option<ExternalHandle>) {
		let mut state = self.state.lock();
		if shared.is_some() {
			state.live_shares -= 1;
		}

		let current = state.current;
		state.released.push(current);
	}

	fn make_current(&self, context: &FakeContext) -> Result<Option<FakeContext>> {
		let mut state = self.state.lock();
		if state.stuck {
			return Err(Error::Context);
		}
		Ok(state.current.replace(*context))
	}

	fn restore(&self, previous: Option<FakeContext>) {
		self.state.lock().current = previous;
	}
}

/// A compositor that only populates when the test asks it to.
pub struct FakeCompositor<G: Gpu> {
	textures: Mutex<Slab<Arc<dyn TextureSource<G>>>>,
	frames: Mutex<HashMap<TextureId, usize>>,
	completions: Mutex<Vec<Completion>>,
	queue: Arc<CleanupQueue>,
	reuse: Mutex<Option<TextureId>>,

	async_unregister: AtomicBool,
	rendering: AtomicBool,
	refuse: AtomicBool,
}

impl<G: Gpu> Default for FakeCompositor<G> {
	fn default() -> Self {
		Self {
			textures: Default::default(),
			frames: Default::default(),
			completions: Default::default(),
			queue: Arc::new(CleanupQueue::new()),
			reuse: Default::default(),
			async_unregister: AtomicBool::new(false),
			rendering: AtomicBool::new(true),
			refuse: AtomicBool::new(false),
		}
	}
}

impl<G: Gpu> FakeCompositor<G> {
	pub fn new() -> Self {
		Self::default()
	}

	pub fn set_async_unregister(&self, enabled: bool) {
		self.async_unregister.store(enabled, Ordering::SeqCst);
	}

	/// Stop the rendering thread; no populate or completion runs afterwards.
	pub fn shutdown(&self) {
		self.rendering.store(false, Ordering::SeqCst);
		self.completions.lock().clear();
	}

	/// Fail the next registration.
	pub fn refuse_next(&self) {
		self.refuse.store(true, Ordering::SeqCst);
	}

	/// Hand out a live id again on the next registration, replacing its source.
	pub fn reuse_next(&self, id: TextureId) {
		*self.reuse.lock() = Some(id);
	}

	pub fn registered(&self) -> usize {
		self.textures.lock().len()
	}

	pub fn is_registered(&self, id: TextureId) -> bool {
		usize::try_from(id.0).is_ok_and(|key| self.textures.lock().contains(key))
	}

	pub fn frames_marked(&self, id: TextureId) -> usize {
		self.frames.lock().get(&id).copied().unwrap_or(0)
	}

	/// Populate the texture as the rendering thread would, with `context` current.
	pub fn populate(&self, id: TextureId, context: &G::Context) -> Option<ExternalHandle> {
		let key = usize::try_from(id.0).ok()?;
		let source = self.textures.lock().get(key).cloned()?;
		source.populate(0, 0, Some(context))
	}

	/// Run the pending unregister completions, returning how many ran.
	pub fn run_completions(&self) -> usize {
		let completions = mem::take(&mut *self.completions.lock());
		let count = completions.len();
		for completion in completions {
			completion();
		}
		count
	}
}

impl<G: Gpu> Compositor<G> for FakeCompositor<G> {
	fn register_texture(&self, source: Arc<dyn TextureSource<G>>) -> Result<TextureId> {
		if self.refuse.swap(false, Ordering::SeqCst) {
			return Err(Error::Register);
		}

		let mut textures = self.textures.lock();
		let reused = self.reuse.lock().take();
		if let Some(id) = reused {
			if let Some(slot) = usize::try_from(id.0).ok().and_then(|key| textures.get_mut(key)) {
				*slot = source;
				return Ok(id);
			}
		}

		let key = textures.insert(source);
		Ok(TextureId(key as i64))
	}

	fn mark_frame_available(&self, id: TextureId) {
		*self.frames.lock().entry(id).or_default() += 1;
	}

	fn can_unregister_async(&self) -> bool {
		self.async_unregister.load(Ordering::SeqCst)
	}

	fn unregister_texture(&self, id: TextureId, done: Option<Completion>) {
		if let Ok(key) = usize::try_from(id.0) {
			self.textures.lock().try_remove(key);
		}
		self.frames.lock().remove(&id);

		if let Some(done) = done {
			self.completions.lock().push(done);
		}
	}

	fn is_rendering(&self) -> bool {
		self.rendering.load(Ordering::SeqCst)
	}

	fn cleanup_queue(&self) -> Arc<CleanupQueue> {
		self.queue.clone()
	}
}

/// A port that records messages, optionally replying to each one before `post` returns.
pub struct FakePort {
	posted: Mutex<Vec<Message>>,
	reply: Option<(Weak<Bridge>, PlayerHandle, Reply)>,
}

impl FakePort {
	pub fn new() -> Arc<Self> {
		Arc::new(Self {
			posted: Default::default(),
			reply: None,
		})
	}

	pub fn replying(bridge: Weak<Bridge>, handle: PlayerHandle, reply: Reply) -> Arc<Self> {
		Arc::new(Self {
			posted: Default::default(),
			reply: Some((bridge, handle, reply)),
		})
	}

	pub fn posted(&self) -> Vec<Message> {
		self.posted.lock().clone()
	}
}

impl Port for FakePort {
	fn post(&self, message: Message) -> Result<()> {
		let ty = message.ty();
		self.posted.lock().push(message);

		if let (Some((bridge, handle, reply)), Some(ty)) = (&self.reply, ty) {
			if let Some(bridge) = bridge.upgrade() {
				// Replies that don't match the type are dropped, like a runtime ignoring them.
				let _ = bridge.reply_type(*handle, ty, *reply);
			}
		}

		Ok(())
	}
}
