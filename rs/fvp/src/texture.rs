use std::sync::{Arc, Weak};

use parking_lot::Mutex;

use crate::gpu::{ExternalHandle, Gpu, SurfaceBinding};
use crate::{CleanupQueue, Decoder, PlayerHandle, Result, TextureId};

/// Runs once the compositor no longer references an unregistered texture.
pub type Completion = Box<dyn FnOnce() + Send>;

/// A texture the compositor pulls frames from.
pub trait TextureSource<G: Gpu>: Send + Sync {
	/// Produce the current frame.
	///
	/// Called by the compositor on its rendering thread, with `context` current if the platform
	/// provides one. `None` means no frame is ready.
	fn populate(&self, width: u32, height: u32, context: Option<&G::Context>) -> Option<ExternalHandle>;
}

/// The compositor's texture registrar.
pub trait Compositor<G: Gpu>: Send + Sync {
	fn register_texture(&self, source: Arc<dyn TextureSource<G>>) -> Result<TextureId>;

	/// Schedule a populate call for the texture on the rendering thread.
	fn mark_frame_available(&self, id: TextureId);

	/// Whether [Compositor::unregister_texture] honors the completion.
	fn can_unregister_async(&self) -> bool {
		false
	}

	/// Remove the texture. The completion, if any, runs on the rendering thread afterwards.
	fn unregister_texture(&self, id: TextureId, done: Option<Completion>);

	/// Whether the rendering thread still produces frames.
	fn is_rendering(&self) -> bool {
		true
	}

	/// The cleanup queue of the rendering thread.
	fn cleanup_queue(&self) -> Arc<CleanupQueue>;
}

struct PlayerTexture<G: Gpu> {
	binding: Mutex<SurfaceBinding<G>>,
}

impl<G: Gpu> TextureSource<G> for PlayerTexture<G> {
	fn populate(&self, width: u32, height: u32, context: Option<&G::Context>) -> Option<ExternalHandle> {
		self.binding.lock().ensure(width, height, context)
	}
}

// Reached by the decoder's render callback through a weak reference.
struct FrameSignal<G: Gpu> {
	compositor: Arc<dyn Compositor<G>>,
	id: TextureId,
}

/// One decoder rendering into one compositor texture.
pub struct TexturePlayer<G: Gpu> {
	id: TextureId,
	handle: PlayerHandle,
	decoder: Arc<dyn Decoder>,
	compositor: Arc<dyn Compositor<G>>,
	texture: Arc<PlayerTexture<G>>,
	signal: Option<Arc<FrameSignal<G>>>,
	registered: bool,
}

impl<G: Gpu> TexturePlayer<G> {
	/// Register a texture for the decoder and route its frames to it.
	///
	/// Rendering itself is deferred to the compositor's populate call, the only place a GPU
	/// context is known to be current.
	pub fn create(
		handle: PlayerHandle,
		decoder: Arc<dyn Decoder>,
		width: u32,
		height: u32,
		compositor: Arc<dyn Compositor<G>>,
		gpu: Arc<G>,
	) -> Result<Self> {
		let device = gpu.create_device()?;
		let flip = gpu.flip_y();

		let binding = SurfaceBinding::new(gpu, decoder.clone(), compositor.cleanup_queue(), width, height, device);
		let texture = Arc::new(PlayerTexture {
			binding: Mutex::new(binding),
		});

		let id = compositor.register_texture(texture.clone())?;

		if flip {
			decoder.scale(1.0, -1.0);
		}
		decoder.set_video_surface_size(width as i32, height as i32);

		let signal = Arc::new(FrameSignal {
			compositor: compositor.clone(),
			id,
		});

		let weak: Weak<FrameSignal<G>> = Arc::downgrade(&signal);
		decoder.set_render_callback(Some(Box::new(move || {
			if let Some(signal) = weak.upgrade() {
				signal.compositor.mark_frame_available(signal.id);
			}
		})));

		tracing::info!(texture = %id, %handle, width, height, "created texture player");

		Ok(Self {
			id,
			handle,
			decoder,
			compositor,
			texture,
			signal: Some(signal),
			registered: true,
		})
	}

	pub fn id(&self) -> TextureId {
		self.id
	}

	pub fn handle(&self) -> PlayerHandle {
		self.handle
	}

	/// Produce a frame as the compositor would; mostly useful for compositors without callbacks.
	pub fn populate(&self, width: u32, height: u32, context: Option<&G::Context>) -> Option<ExternalHandle> {
		self.texture.populate(width, height, context)
	}

	/// Give up the texture id without unregistering it, because another player now owns it.
	///
	/// Releasing still tears down the decoder and the GPU objects.
	pub(crate) fn forget_texture(&mut self) {
		self.registered = false;
	}

	fn release(&mut self) {
		// Stop frame notifications before anything else goes away.
		self.decoder.set_render_callback(None);
		self.signal.take();

		let task = self.texture.binding.lock().teardown();

		match task {
			Some(task) if !self.registered => task.dispose(),
			None if !self.registered => {}
			Some(task) if self.compositor.can_unregister_async() => {
				let done = task.clone();
				self.compositor
					.unregister_texture(self.id, Some(Box::new(move || {
						done.dispose();
						done.run();
					})));
			}
			Some(task) => {
				self.compositor.unregister_texture(self.id, None);
				task.dispose();
			}
			None => self.compositor.unregister_texture(self.id, None),
		}

		if !self.compositor.is_rendering() {
			tracing::debug!(texture = %self.id, "rendering thread gone, releasing gpu objects now");
			self.texture.binding.lock().release_now();
		}

		tracing::info!(texture = %self.id, handle = %self.handle, "released texture player");
	}
}

impl<G: Gpu> Drop for TexturePlayer<G> {
	fn drop(&mut self) {
		self.release();
	}
}
