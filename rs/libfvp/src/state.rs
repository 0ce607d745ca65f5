use std::sync::{Arc, LazyLock};
use std::time::Duration;

use fvp::Bridge;
use parking_lot::{Mutex, MutexGuard};

use crate::{Error, FvpEngineApi, Host, HostEngine};

/// The process-wide bridge, created by `fvp_init`.
///
/// Never call into the bridge or the host while holding the lock: both call back into the
/// engine, which may call `fvp_engine_*` on the same thread.
#[derive(Default)]
pub struct State {
	bridge: Option<Arc<Bridge>>,
	host: Option<Arc<Host>>,
}

static STATE: LazyLock<Mutex<State>> = LazyLock::new(Default::default);

impl State {
	pub fn lock() -> MutexGuard<'static, State> {
		STATE.lock()
	}

	/// Replace the engine, returning the previous bridge so it can be dropped unlocked.
	pub fn init(&mut self, api: FvpEngineApi, reply_timeout: Option<Duration>) -> Option<Arc<Bridge>> {
		let host = Host::new(api);
		let bridge = Bridge::new(Arc::new(HostEngine(host.clone()))).with_reply_timeout(reply_timeout);

		self.host = Some(host);
		self.bridge.replace(Arc::new(bridge))
	}

	pub fn shutdown(&mut self) -> Option<Arc<Bridge>> {
		self.host = None;
		self.bridge.take()
	}

	pub fn bridge(&self) -> Result<Arc<Bridge>, Error> {
		self.bridge.clone().ok_or(Error::NotInitialized)
	}

	pub fn host(&self) -> Option<Arc<Host>> {
		self.host.clone()
	}
}
