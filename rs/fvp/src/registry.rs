use std::{collections::HashMap, sync::Arc};

use parking_lot::Mutex;

use crate::gpu::Gpu;
use crate::texture::{Compositor, TexturePlayer};
use crate::{Engine, Error, PlayerHandle, Result, TextureId};

/// The owner of every live [TexturePlayer], keyed by the compositor's texture id.
pub struct Registry<G: Gpu> {
	engine: Arc<dyn Engine>,
	compositor: Arc<dyn Compositor<G>>,
	gpu: Arc<G>,
	players: Mutex<HashMap<TextureId, TexturePlayer<G>>>,
}

impl<G: Gpu> Registry<G> {
	pub fn new(engine: Arc<dyn Engine>, compositor: Arc<dyn Compositor<G>>, gpu: Arc<G>) -> Self {
		Self {
			engine,
			compositor,
			gpu,
			players: Default::default(),
		}
	}

	/// Create a texture-backed player for the decoder, returning the compositor's id.
	pub fn create(&self, handle: PlayerHandle, width: u32, height: u32) -> Result<TextureId> {
		let decoder = self.engine.player(handle).ok_or(Error::NotFound)?;
		let player = TexturePlayer::create(
			handle,
			decoder,
			width,
			height,
			self.compositor.clone(),
			self.gpu.clone(),
		)?;

		let id = player.id();
		let old = self.players.lock().insert(id, player);

		if let Some(mut old) = old {
			// The compositor reused an id we still hold; the id now belongs to the new player.
			tracing::warn!(texture = %id, handle = %old.handle(), "texture id reused while live");
			old.forget_texture();
			drop(old);
		}

		Ok(id)
	}

	/// Release the player, returning whether it was live.
	///
	/// Unknown ids are ignored: a teardown may race a pending release.
	pub fn release(&self, id: TextureId) -> bool {
		// Drop outside the lock, teardown calls back into the compositor.
		let player = self.players.lock().remove(&id);

		match player {
			Some(player) => {
				drop(player);
				true
			}
			None => {
				tracing::debug!(texture = %id, "release of unknown texture");
				false
			}
		}
	}

	pub fn contains(&self, id: TextureId) -> bool {
		self.players.lock().contains_key(&id)
	}

	pub fn len(&self) -> usize {
		self.players.lock().len()
	}

	pub fn is_empty(&self) -> bool {
		self.players.lock().is_empty()
	}

	/// Release every player.
	pub fn clear(&self) {
		let players: Vec<_> = self.players.lock().drain().map(|(_, player)| player).collect();
		if !players.is_empty() {
			tracing::debug!(count = players.len(), "releasing texture players");
		}
		drop(players);
	}
}

impl<G: Gpu> Drop for Registry<G> {
	fn drop(&mut self) {
		self.clear();
	}
}

#[cfg(test)]
mod test {
	use super::*;
	use crate::testing::{FakeCompositor, FakeContext, FakeEngine, FakeGpu};

	fn registry() -> (Registry<FakeGpu>, Arc<FakeEngine>, Arc<FakeCompositor<FakeGpu>>, Arc<FakeGpu>) {
		let engine = Arc::new(FakeEngine::new());
		let compositor = Arc::new(FakeCompositor::new());
		let gpu = Arc::new(FakeGpu::new());
		let registry = Registry::new(engine.clone(), compositor.clone(), gpu.clone());
		(registry, engine, compositor, gpu)
	}

	#[test]
	fn release_idempotent() {
		let (registry, engine, compositor, _gpu) = registry();
		engine.add_player(PlayerHandle(42));

		for _ in 0..3 {
			let id = registry.create(PlayerHandle(42), 640, 480).unwrap();
			assert!(registry.contains(id));
			assert!(compositor.is_registered(id));

			assert!(registry.release(id));
			assert!(!registry.release(id));
			assert!(!registry.contains(id));
			assert!(registry.is_empty());
		}
	}

	#[test]
	fn unknown_player() {
		let (registry, _engine, compositor, _gpu) = registry();

		assert_eq!(registry.create(PlayerHandle(7), 640, 480), Err(Error::NotFound));
		assert_eq!(compositor.registered(), 0);
	}

	#[test]
	fn ids_reused() {
		let (registry, engine, _compositor, _gpu) = registry();
		engine.add_player(PlayerHandle(1));
		engine.add_player(PlayerHandle(2));

		let first = registry.create(PlayerHandle(1), 16, 16).unwrap();
		assert!(registry.release(first));

		// The compositor may hand out the same id again.
		let second = registry.create(PlayerHandle(2), 16, 16).unwrap();
		assert_eq!(first, second);
		assert_eq!(registry.len(), 1);
	}

	#[test]
	fn live_id_reused() {
		let (registry, engine, compositor, _gpu) = registry();
		engine.add_player(PlayerHandle(1));
		engine.add_player(PlayerHandle(2));

		let first = registry.create(PlayerHandle(1), 16, 16).unwrap();
		compositor.reuse_next(first);
		let second = registry.create(PlayerHandle(2), 16, 16).unwrap();
		assert_eq!(first, second);

		// The new player keeps the id, the old one is torn down.
		assert!(compositor.is_registered(second));
		assert_eq!(registry.len(), 1);
		let old = engine.decoder(PlayerHandle(1)).unwrap();
		assert_eq!(old.surface_size(), (-1, -1));
		assert!(!old.has_render_callback());
		assert!(engine.decoder(PlayerHandle(2)).unwrap().has_render_callback());

		assert!(registry.release(second));
		assert!(!compositor.is_registered(second));
	}

	#[test]
	fn drop_releases_all() {
		let (registry, engine, compositor, gpu) = registry();
		engine.add_player(PlayerHandle(1));
		engine.add_player(PlayerHandle(2));

		let a = registry.create(PlayerHandle(1), 16, 16).unwrap();
		let b = registry.create(PlayerHandle(2), 16, 16).unwrap();
		compositor.populate(a, &FakeContext(1)).unwrap();
		compositor.populate(b, &FakeContext(1)).unwrap();

		drop(registry);
		assert_eq!(compositor.registered(), 0);
		assert_eq!(engine.decoder(PlayerHandle(1)).unwrap().surface_size(), (-1, -1));

		compositor.cleanup_queue().drain_disposed();
		assert_eq!(gpu.released(), 2);
	}
}
