//! Binding between a decoder's render output and a texture the compositor can consume.
//!
//! A [SurfaceBinding] lazily allocates a framebuffer/texture pair on the first frame request,
//! because the GPU context is only current inside the compositor's populate call. The context
//! seen at that point is captured, and every later creation and deletion uses that same context.

#[cfg(all(feature = "d3d11", windows))]
pub mod d3d11;
#[cfg(feature = "gl")]
pub mod gl;

use std::{fmt, sync::Arc};

use parking_lot::Mutex;

use crate::{CleanupQueue, CleanupTask, Decoder, RenderApi, Result};

/// A GPU handle the compositor can consume from its own context.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum ExternalHandle {
	/// A GL texture name, valid in contexts sharing objects with the one that created it.
	GlTexture { target: u32, name: u32 },
	/// An `EGLImageKHR` created from the texture.
	EglImage(usize),
	/// A DXGI shared handle for the texture.
	DxgiShared(usize),
}

/// The per-platform GPU operations used by a [SurfaceBinding].
///
/// Everything except [Gpu::create_device] and [Gpu::make_current] assumes the given context is
/// current on the calling thread.
pub trait Gpu: Send + Sync + 'static {
	/// The device or context that owns the GPU objects, captured at first use.
	type Context: Clone + PartialEq + fmt::Debug + Send + Sync + 'static;

	/// A framebuffer/texture pair. Cloning copies handles, it never allocates.
	type Target: Clone + fmt::Debug + Send + Sync + 'static;

	/// Create a device up front, for platforms where the integration owns it.
	///
	/// Returning `None` means the context is supplied by the compositor on first populate.
	fn create_device(&self) -> Result<Option<Self::Context>> {
		Ok(None)
	}

	/// Whether the decoder output must be flipped vertically to match the compositor.
	fn flip_y(&self) -> bool {
		false
	}

	/// Allocate a render target of the given size, failing if it is not complete.
	///
	/// On failure no objects are left allocated.
	fn create_target(&self, context: &Self::Context, width: u32, height: u32) -> Result<Self::Target>;

	/// How the decoder should render into the target.
	fn render_api(&self, target: &Self::Target) -> RenderApi;

	/// Export the target's texture as a handle the compositor can consume.
	fn share(&self, context: &Self::Context, target: &Self::Target) -> Result<ExternalHandle>;

	/// Delete the target and its shared handle.
	fn release(&self, context: &Self::Context, target: Self::Target, shared: Option<ExternalHandle>);

	/// Make the context current on this thread, returning the previously current one.
	///
	/// Fails if the context can't be made current; nothing may be released then.
	fn make_current(&self, context: &Self::Context) -> Result<Option<Self::Context>>;

	/// Undo [Gpu::make_current].
	fn restore(&self, previous: Option<Self::Context>);
}

/// The GPU resources of one texture-backed player.
pub struct SurfaceBinding<G: Gpu> {
	gpu: Arc<G>,
	decoder: Arc<dyn Decoder>,
	queue: Arc<CleanupQueue>,

	width: u32,
	height: u32,

	context: Option<G::Context>,
	target: Option<G::Target>,

	// Also read by the cleanup task, which may outlive us.
	shared: Arc<Mutex<Option<ExternalHandle>>>,
	task: Option<CleanupTask>,

	released: bool,
}

impl<G: Gpu> SurfaceBinding<G> {
	pub fn new(
		gpu: Arc<G>,
		decoder: Arc<dyn Decoder>,
		queue: Arc<CleanupQueue>,
		width: u32,
		height: u32,
		device: Option<G::Context>,
	) -> Self {
		Self {
			gpu,
			decoder,
			queue,
			width,
			height,
			context: device,
			target: None,
			shared: Default::default(),
			task: None,
			released: false,
		}
	}

	pub fn size(&self) -> (u32, u32) {
		(self.width, self.height)
	}

	pub fn context(&self) -> Option<&G::Context> {
		self.context.as_ref()
	}

	pub fn target(&self) -> Option<&G::Target> {
		self.target.as_ref()
	}

	pub fn is_released(&self) -> bool {
		self.released
	}

	/// Produce the current frame, returning the handle to display.
	///
	/// Called on the rendering thread with `context` current. Drains the thread's cleanup queue
	/// first. `None` means the frame is not ready yet and the caller should try again next frame.
	pub fn ensure(&mut self, width: u32, height: u32, context: Option<&G::Context>) -> Option<ExternalHandle> {
		self.queue.drain_disposed();

		if self.released {
			return None;
		}

		let context = match (&self.context, context) {
			(Some(captured), Some(current)) if captured != current => {
				tracing::error!(?captured, ?current, "populate called with a different gpu context");
				return None;
			}
			(Some(captured), _) => captured.clone(),
			(None, Some(current)) => {
				self.context = Some(current.clone());
				current.clone()
			}
			(None, None) => {
				tracing::warn!("no gpu context available for the first frame");
				return None;
			}
		};

		if self.target.is_none() {
			// The compositor may not know the size yet.
			let width = if width > 0 { width } else { self.width };
			let height = if height > 0 { height } else { self.height };

			let target = match self.gpu.create_target(&context, width, height) {
				Ok(target) => target,
				Err(err) => {
					tracing::warn!(%err, width, height, "failed to create render target");
					return self.current();
				}
			};

			tracing::debug!(?target, width, height, thread = ?std::thread::current().id(), "created render target");

			// The decoder's viewport has to match the framebuffer it renders into.
			self.width = width;
			self.height = height;
			self.decoder.set_video_surface_size(width as i32, height as i32);
			self.decoder.set_render_api(Some(self.gpu.render_api(&target)));
			self.schedule_release(&context, &target);
			self.target = Some(target);
		}

		if self.current().is_none() {
			let target = self.target.as_ref()?;

			match self.gpu.share(&context, target) {
				Ok(handle) => {
					tracing::debug!(?handle, "created shareable handle");
					*self.shared.lock() = Some(handle);
				}
				Err(err) => tracing::warn!(%err, "failed to share render target"),
			}
		}

		self.decoder.render_video();
		self.current()
	}

	fn current(&self) -> Option<ExternalHandle> {
		*self.shared.lock()
	}

	fn schedule_release(&mut self, context: &G::Context, target: &G::Target) {
		let gpu = self.gpu.clone();
		let context = context.clone();
		let target = target.clone();
		let shared = self.shared.clone();

		let task = CleanupTask::new(move || {
			tracing::debug!(?target, "releasing render target");
			let shared = shared.lock().take();
			gpu.release(&context, target, shared);
		});

		self.queue.enqueue(task.clone());
		self.task = Some(task);
	}

	/// Detach the decoder from the target; no frame is produced afterwards.
	///
	/// Returns the cleanup task, which is not disposed yet: the compositor may still sample the
	/// texture until it is unregistered.
	pub fn teardown(&mut self) -> Option<CleanupTask> {
		if !self.released {
			self.released = true;
			self.decoder.set_video_surface_size(-1, -1);
		}

		self.task.clone()
	}

	/// Release the GPU objects immediately from the calling thread.
	///
	/// Used when the rendering thread is gone. The captured context is made current around the
	/// release and the previous one restored afterwards. Returns `false` without releasing if the
	/// context can't be made current.
	pub fn release_now(&mut self) -> bool {
		let (Some(task), Some(context)) = (self.task.as_ref(), self.context.as_ref()) else {
			return false;
		};

		task.dispose();

		// Left in the queue, a later drain on the rendering thread may still run it.
		let previous = match self.gpu.make_current(context) {
			Ok(previous) => previous,
			Err(err) => {
				tracing::warn!(%err, ?context, "can't switch gpu context, release deferred");
				return false;
			}
		};

		let ran = task.run();
		self.gpu.restore(previous);

		ran
	}
}

impl<G: Gpu> Drop for SurfaceBinding<G> {
	fn drop(&mut self) {
		if let Some(task) = self.teardown() {
			task.dispose();
		}
	}
}

impl<G: Gpu> fmt::Debug for SurfaceBinding<G> {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.debug_struct("SurfaceBinding")
			.field("width", &self.width)
			.field("height", &self.height)
			.field("context", &self.context)
			.field("target", &self.target)
			.field("shared", &self.current())
			.field("released", &self.released)
			.finish()
	}
}
