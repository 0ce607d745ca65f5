//! Forwards decoder notifications to the scripting runtime.
//!
//! Each player handle gets a [Port] and a set of enabled callback types. Notifications are posted
//! as [Message]s; types registered with `reply` block the decoder thread until the runtime calls
//! [Bridge::reply_type], the type is disabled, or the port is unregistered.

mod reply;

use std::{
	collections::HashMap,
	sync::{
		Arc, Weak,
		atomic::{AtomicBool, AtomicI32, AtomicU32, Ordering},
	},
	thread::{self, ThreadId},
	time::Duration,
};

use parking_lot::Mutex;

use crate::{
	CallbackType, Decoder, Engine, Error, LogLevel, Message, PlayerHandle, Port, Reply, Result, SeekFlag, State,
};
use reply::ReplySlot;

/// The registration of one port, either for a player or the process-wide log.
struct Subscription {
	handle: PlayerHandle,
	port: Arc<dyn Port>,
	decoder: Option<Arc<dyn Decoder>>,

	// Blocking on this thread would deadlock the runtime.
	owner: ThreadId,

	enabled: AtomicU32,
	reply: AtomicU32,
	closed: AtomicBool,

	last_state: Mutex<State>,
	slots: [ReplySlot; CallbackType::COUNT],
	timeout: Option<Duration>,
}

impl Subscription {
	fn new(handle: PlayerHandle, port: Arc<dyn Port>, decoder: Option<Arc<dyn Decoder>>, timeout: Option<Duration>) -> Self {
		Self {
			handle,
			port,
			decoder,
			owner: thread::current().id(),
			enabled: AtomicU32::new(0),
			reply: AtomicU32::new(0),
			closed: AtomicBool::new(false),
			last_state: Mutex::new(State::Stopped),
			slots: Default::default(),
			timeout,
		}
	}

	fn is_enabled(&self, ty: CallbackType) -> bool {
		self.enabled.load(Ordering::Acquire) & ty.bit() != 0
	}

	fn requires_reply(&self, ty: CallbackType) -> bool {
		self.reply.load(Ordering::Acquire) & ty.bit() != 0
	}

	fn is_closed(&self) -> bool {
		self.closed.load(Ordering::Acquire)
	}

	/// Post the message if the type is enabled, waiting for a reply if registered with one.
	fn notify(&self, ty: CallbackType, message: Message) -> Option<Reply> {
		if !self.is_enabled(ty) {
			return None;
		}

		self.deliver(ty, message, self.requires_reply(ty))
	}

	/// Post the message regardless of registration.
	fn deliver(&self, ty: CallbackType, message: Message, wait: bool) -> Option<Reply> {
		let slot = &self.slots[ty.index()];
		if wait {
			slot.reset();
		}

		if let Err(err) = self.port.post(message) {
			tracing::warn!(%err, handle = %self.handle, ?ty, "failed to post message");
			return None;
		}

		if !wait {
			return None;
		}

		if thread::current().id() == self.owner {
			tracing::debug!(handle = %self.handle, ?ty, "not waiting for a reply on the registering thread");
			return None;
		}

		let reply = slot.wait(
			|| self.is_closed() || !self.is_enabled(ty) || !self.requires_reply(ty),
			self.timeout,
		);

		if reply.is_none() && !self.is_closed() && self.is_enabled(ty) {
			tracing::warn!(handle = %self.handle, ?ty, timeout = ?self.timeout, "timed out waiting for a reply");
		}

		reply
	}

	fn set_type(&self, ty: CallbackType, enabled: bool, reply: bool) {
		let bit = ty.bit();

		// These have no reply value; Event returns before the runtime could answer.
		let reply = reply && !ty.notify_only();

		if reply {
			self.reply.fetch_or(bit, Ordering::AcqRel);
		} else {
			self.reply.fetch_and(!bit, Ordering::AcqRel);
		}

		if enabled {
			self.enabled.fetch_or(bit, Ordering::AcqRel);
		} else {
			self.enabled.fetch_and(!bit, Ordering::AcqRel);
		}

		// A waiter may now be cancelled.
		self.slots[ty.index()].wake();
	}

	fn close(&self) {
		self.closed.store(true, Ordering::Release);
		self.enabled.store(0, Ordering::Release);
		self.reply.store(0, Ordering::Release);

		for slot in &self.slots {
			slot.wake();
		}
	}
}

/// The process-wide callback bridge, one per scripting runtime.
pub struct Bridge {
	engine: Arc<dyn Engine>,
	ports: Mutex<HashMap<PlayerHandle, Arc<Subscription>>>,
	reply_timeout: Option<Duration>,
	log_level: Arc<AtomicI32>,
}

impl Bridge {
	pub fn new(engine: Arc<dyn Engine>) -> Self {
		Self {
			engine,
			ports: Default::default(),
			reply_timeout: None,
			log_level: Arc::new(AtomicI32::new(LogLevel::default() as i32)),
		}
	}

	/// Give up waiting for a reply after the timeout, returning the type's default.
	pub fn with_reply_timeout(mut self, timeout: Option<Duration>) -> Self {
		self.reply_timeout = timeout;
		self
	}

	pub fn reply_timeout(&self) -> Option<Duration> {
		self.reply_timeout
	}

	pub fn is_registered(&self, handle: PlayerHandle) -> bool {
		self.ports.lock().contains_key(&handle)
	}

	fn subscription(&self, handle: PlayerHandle) -> Result<Arc<Subscription>> {
		self.ports.lock().get(&handle).cloned().ok_or(Error::NotFound)
	}

	/// Start forwarding the decoder's notifications to the port.
	///
	/// The global handle subscribes to the engine's log instead. The calling thread is recorded:
	/// notifications raised on it never block. Registering again replaces the previous port.
	pub fn register_port(&self, handle: PlayerHandle, port: Arc<dyn Port>) -> Result<()> {
		let decoder = match handle.is_global() {
			true => None,
			false => Some(self.engine.player(handle).ok_or(Error::NotFound)?),
		};

		let sub = Arc::new(Subscription::new(handle, port, decoder.clone(), self.reply_timeout));

		if let Some(old) = self.ports.lock().insert(handle, sub.clone()) {
			tracing::debug!(%handle, "replacing port");
			old.close();
		}

		match decoder {
			Some(decoder) => Self::subscribe(&sub, decoder.as_ref()),
			None => self.subscribe_log(&sub),
		}

		tracing::debug!(%handle, "registered port");
		Ok(())
	}

	fn subscribe(sub: &Arc<Subscription>, decoder: &dyn Decoder) {
		let weak = Arc::downgrade(sub);
		decoder.on_event(Some(Box::new(move |event| {
			if let Some(sub) = weak.upgrade() {
				sub.notify(CallbackType::Event, Message::event(event));
			}
			false
		})));

		let weak = Arc::downgrade(sub);
		decoder.on_state_changed(Some(Box::new(move |state| {
			let Some(sub) = weak.upgrade() else { return };
			let old = std::mem::replace(&mut *sub.last_state.lock(), state);
			sub.notify(CallbackType::State, Message::state(old, state));
		})));

		let weak = Arc::downgrade(sub);
		decoder.on_media_status(Some(Box::new(move |old, new| {
			let Some(sub) = weak.upgrade() else { return true };
			match sub.notify(CallbackType::MediaStatus, Message::media_status(old, new)) {
				Some(Reply::MediaStatus { ret }) => ret,
				_ => true,
			}
		})));
	}

	fn subscribe_log(&self, sub: &Arc<Subscription>) {
		sub.set_type(CallbackType::Log, true, false);

		let weak = Arc::downgrade(sub);
		let filter = self.log_level.clone();

		self.engine.set_log_handler(Some(Box::new(move |level, text| {
			if level as i32 > filter.load(Ordering::Relaxed) {
				return;
			}
			if let Some(sub) = weak.upgrade() {
				sub.notify(CallbackType::Log, Message::log(level, text));
			}
		})));
	}

	/// Stop forwarding and release every blocked notification of the handle.
	///
	/// Returns whether a port was registered.
	pub fn unregister_port(&self, handle: PlayerHandle) -> bool {
		let Some(sub) = self.ports.lock().remove(&handle) else {
			return false;
		};

		self.unsubscribe(&sub);
		tracing::debug!(%handle, "unregistered port");
		true
	}

	fn unsubscribe(&self, sub: &Subscription) {
		// Wake waiters first, the decoder may wait for its callbacks to return.
		sub.close();

		match &sub.decoder {
			Some(decoder) => {
				decoder.on_event(None);
				decoder.on_state_changed(None);
				decoder.on_media_status(None);
				decoder.on_sync(None);
			}
			None => self.engine.set_log_handler(None),
		}
	}

	/// Forward the callback type, optionally blocking until the runtime replies.
	pub fn register_type(&self, handle: PlayerHandle, ty: CallbackType, reply: bool) -> Result<()> {
		let sub = self.subscription(handle)?;
		sub.set_type(ty, true, reply);

		if let (CallbackType::Sync, Some(decoder)) = (ty, &sub.decoder) {
			let weak: Weak<Subscription> = Arc::downgrade(&sub);
			decoder.on_sync(Some(Box::new(move || {
				let Some(sub) = weak.upgrade() else { return -1.0 };
				match sub.notify(CallbackType::Sync, Message::sync()) {
					Some(Reply::Sync { ret }) => ret,
					_ => -1.0,
				}
			})));
		}

		tracing::debug!(%handle, ?ty, reply, "registered callback type");
		Ok(())
	}

	/// Stop forwarding the callback type, releasing a notification blocked on it.
	pub fn unregister_type(&self, handle: PlayerHandle, ty: CallbackType) -> Result<()> {
		let sub = self.subscription(handle)?;
		sub.set_type(ty, false, false);

		if let (CallbackType::Sync, Some(decoder)) = (ty, &sub.decoder) {
			decoder.on_sync(None);
		}

		tracing::debug!(%handle, ?ty, "unregistered callback type");
		Ok(())
	}

	/// Deliver the runtime's reply to the notification waiting on the type.
	pub fn reply_type(&self, handle: PlayerHandle, ty: CallbackType, reply: Reply) -> Result<()> {
		if !reply.matches(ty) {
			return Err(Error::InvalidReply);
		}

		let sub = self.subscription(handle)?;
		sub.slots[ty.index()].fill(reply);
		Ok(())
	}

	/// Prepare the media, posting a Prepared message on completion.
	///
	/// If Prepared is registered with a reply, the completion waits for the runtime to accept or
	/// cancel playback and decide on a boosted start.
	pub fn prepare(&self, handle: PlayerHandle, position: i64, flags: SeekFlag) -> Result<()> {
		let sub = self.subscription(handle)?;
		let decoder = sub.decoder.clone().ok_or(Error::NotFound)?;
		let weak = Arc::downgrade(&sub);

		decoder.prepare(
			position,
			flags,
			Box::new(move |position, boost| {
				let Some(sub) = weak.upgrade() else { return true };
				let live = sub.decoder.as_ref().is_some_and(|decoder| decoder.duration() <= 0);

				let ty = CallbackType::Prepared;
				let wait = sub.is_enabled(ty) && sub.requires_reply(ty);

				match sub.deliver(ty, Message::prepared(position, live), wait) {
					Some(Reply::Prepared { ret, boost: accepted }) => {
						*boost = accepted;
						ret
					}
					_ => true,
				}
			}),
		);

		Ok(())
	}

	/// Seek, posting a Seek message with the position reached. Returns whether the seek started.
	pub fn seek(&self, handle: PlayerHandle, position: i64, flags: SeekFlag) -> Result<bool> {
		let sub = self.subscription(handle)?;
		let decoder = sub.decoder.clone().ok_or(Error::NotFound)?;
		let weak = Arc::downgrade(&sub);

		Ok(decoder.seek(
			position,
			flags,
			Box::new(move |position| {
				if let Some(sub) = weak.upgrade() {
					sub.deliver(CallbackType::Seek, Message::seek(position), false);
				}
			}),
		))
	}

	/// Capture the next frame, posting a Snapshot message with its pixels.
	pub fn snapshot(&self, handle: PlayerHandle, width: i32, height: i32) -> Result<()> {
		let sub = self.subscription(handle)?;
		let decoder = sub.decoder.clone().ok_or(Error::NotFound)?;
		let weak = Arc::downgrade(&sub);

		decoder.snapshot(
			width,
			height,
			Box::new(move |snapshot| {
				if let Some(sub) = weak.upgrade() {
					sub.deliver(CallbackType::Snapshot, Message::snapshot(snapshot), false);
				}
			}),
		);

		Ok(())
	}

	/// Set the most verbose decoder log level forwarded to the runtime.
	pub fn set_log_level(&self, level: LogLevel) {
		self.log_level.store(level as i32, Ordering::Relaxed);
		self.engine.set_log_level(level);
	}

	pub fn log_level(&self) -> LogLevel {
		LogLevel::from_raw(self.log_level.load(Ordering::Relaxed))
	}
}

impl Drop for Bridge {
	fn drop(&mut self) {
		let subs: Vec<_> = self.ports.lock().drain().map(|(_, sub)| sub).collect();
		for sub in subs {
			self.unsubscribe(&sub);
		}
	}
}

#[cfg(test)]
mod test {
	use super::*;
	use crate::testing::{FakeEngine, FakePort};
	use crate::{MediaEvent, MediaStatus, Snapshot, Value};
	use bytes::Bytes;
	use std::sync::mpsc;
	use std::time::Instant;
	use tokio::sync::mpsc::{UnboundedReceiver, unbounded_channel};

	const PLAYER: PlayerHandle = PlayerHandle(42);
	const WAIT: Duration = Duration::from_secs(5);

	fn setup() -> (Arc<Bridge>, Arc<FakeEngine>, UnboundedReceiver<Message>) {
		let engine = Arc::new(FakeEngine::new());
		engine.add_player(PLAYER);

		let bridge = Arc::new(Bridge::new(engine.clone()));
		let (tx, rx) = unbounded_channel();
		bridge.register_port(PLAYER, Arc::new(tx)).unwrap();

		(bridge, engine, rx)
	}

	#[test]
	fn disabled_posts_nothing() {
		let (_bridge, engine, mut rx) = setup();
		let decoder = engine.decoder(PLAYER).unwrap();

		assert_eq!(decoder.fire_media_status(MediaStatus::NO_MEDIA, MediaStatus::LOADING), Some(true));
		decoder.fire_state(State::Playing);
		assert!(rx.try_recv().is_err());
	}

	#[test]
	fn no_reply_never_blocks() {
		let (bridge, engine, mut rx) = setup();
		let decoder = engine.decoder(PLAYER).unwrap();
		bridge.register_type(PLAYER, CallbackType::MediaStatus, false).unwrap();

		let (done_tx, done_rx) = mpsc::channel();
		thread::spawn(move || {
			let ret = decoder.fire_media_status(MediaStatus::LOADING, MediaStatus::LOADED);
			done_tx.send(ret).unwrap();
		});

		assert_eq!(done_rx.recv_timeout(Duration::from_millis(500)), Ok(Some(true)));

		let msg = rx.try_recv().unwrap();
		assert_eq!(msg.ty(), Some(CallbackType::MediaStatus));
		assert_eq!(msg.fields(), &[Value::Int(1 << 1), Value::Int(1 << 2)]);
	}

	#[test]
	fn blocks_until_reply() {
		let (bridge, engine, mut rx) = setup();
		let decoder = engine.decoder(PLAYER).unwrap();
		bridge.register_type(PLAYER, CallbackType::MediaStatus, true).unwrap();

		let (done_tx, done_rx) = mpsc::channel();
		thread::spawn(move || {
			let ret = decoder.fire_media_status(MediaStatus::LOADING, MediaStatus::INVALID);
			done_tx.send(ret).unwrap();
		});

		let msg = rx.blocking_recv().unwrap();
		assert_eq!(msg.ty(), Some(CallbackType::MediaStatus));

		// Still waiting for the runtime.
		assert!(done_rx.recv_timeout(Duration::from_millis(50)).is_err());

		bridge
			.reply_type(PLAYER, CallbackType::MediaStatus, Reply::MediaStatus { ret: false })
			.unwrap();
		assert_eq!(done_rx.recv_timeout(WAIT), Ok(Some(false)));
	}

	#[test]
	fn reply_during_post() {
		let engine = Arc::new(FakeEngine::new());
		let decoder = engine.add_player(PLAYER);
		let bridge = Arc::new(Bridge::new(engine.clone()));

		// The runtime replies before the decoder thread starts waiting.
		let port = FakePort::replying(Arc::downgrade(&bridge), PLAYER, Reply::Sync { ret: 12.5 });
		bridge.register_port(PLAYER, port.clone()).unwrap();
		bridge.register_type(PLAYER, CallbackType::Sync, true).unwrap();

		let ret = thread::spawn(move || decoder.fire_sync()).join().unwrap();
		assert_eq!(ret, Some(12.5));
		assert_eq!(port.posted().len(), 1);
	}

	#[test]
	fn same_thread_never_blocks() {
		let (bridge, engine, mut rx) = setup();
		let decoder = engine.decoder(PLAYER).unwrap();
		bridge.register_type(PLAYER, CallbackType::State, true).unwrap();

		// Raised on the registering thread, so it can't wait.
		decoder.fire_state(State::Playing);
		decoder.fire_state(State::Paused);

		let first = rx.try_recv().unwrap();
		assert_eq!(first.fields(), &[Value::Int(0), Value::Int(1)]);
		let second = rx.try_recv().unwrap();
		assert_eq!(second.fields(), &[Value::Int(1), Value::Int(2)]);
	}

	#[test]
	fn unregister_port_releases_waiter() {
		let (bridge, engine, mut rx) = setup();
		let decoder = engine.decoder(PLAYER).unwrap();
		bridge.register_type(PLAYER, CallbackType::MediaStatus, true).unwrap();

		let (done_tx, done_rx) = mpsc::channel();
		let waiter = decoder.clone();
		thread::spawn(move || {
			let ret = waiter.fire_media_status(MediaStatus::LOADED, MediaStatus::END);
			done_tx.send(ret).unwrap();
		});

		rx.blocking_recv().unwrap();
		let start = Instant::now();
		assert!(bridge.unregister_port(PLAYER));

		assert_eq!(done_rx.recv_timeout(WAIT), Ok(Some(true)));
		assert!(start.elapsed() < WAIT);

		assert!(!bridge.is_registered(PLAYER));
		assert!(!decoder.has_media_status_callback());
		assert!(!bridge.unregister_port(PLAYER));
	}

	#[test]
	fn unregister_type_releases_waiter() {
		let (bridge, engine, mut rx) = setup();
		let decoder = engine.decoder(PLAYER).unwrap();
		bridge.register_type(PLAYER, CallbackType::State, true).unwrap();

		let (done_tx, done_rx) = mpsc::channel();
		thread::spawn(move || {
			decoder.fire_state(State::Playing);
			done_tx.send(()).unwrap();
		});

		rx.blocking_recv().unwrap();
		bridge.unregister_type(PLAYER, CallbackType::State).unwrap();
		assert_eq!(done_rx.recv_timeout(WAIT), Ok(()));
	}

	#[test]
	fn reply_timeout() {
		let engine = Arc::new(FakeEngine::new());
		let decoder = engine.add_player(PLAYER);
		let bridge = Bridge::new(engine.clone()).with_reply_timeout(Some(Duration::from_millis(30)));

		let (tx, _rx) = unbounded_channel();
		bridge.register_port(PLAYER, Arc::new(tx)).unwrap();
		bridge.register_type(PLAYER, CallbackType::Sync, true).unwrap();

		let ret = thread::spawn(move || decoder.fire_sync()).join().unwrap();
		assert_eq!(ret, Some(-1.0));
	}

	#[test]
	fn event_never_waits() {
		let (bridge, engine, mut rx) = setup();
		let decoder = engine.decoder(PLAYER).unwrap();
		bridge.register_type(PLAYER, CallbackType::Event, true).unwrap();

		let event = MediaEvent {
			error: -1,
			category: "reader.buffering".to_string(),
			detail: "50".to_string(),
		};

		let ret = thread::spawn(move || decoder.fire_event(&event)).join().unwrap();
		assert_eq!(ret, Some(false));

		let msg = rx.try_recv().unwrap();
		assert_eq!(
			msg.fields(),
			&[Value::Int(-1), Value::from("reader.buffering"), Value::from("50")]
		);
	}

	#[tracing_test::traced_test]
	#[test]
	fn closed_port_returns_default() {
		let (bridge, engine, rx) = setup();
		let decoder = engine.decoder(PLAYER).unwrap();
		bridge.register_type(PLAYER, CallbackType::MediaStatus, true).unwrap();
		drop(rx);

		// Posting fails, so no reply will ever come.
		assert_eq!(decoder.fire_media_status(MediaStatus::LOADING, MediaStatus::LOADED), Some(true));
		assert!(logs_contain("failed to post message"));
	}

	#[test]
	fn prepared_live_boost() {
		let (bridge, engine, mut rx) = setup();
		let decoder = engine.decoder(PLAYER).unwrap();
		decoder.set_duration(0);

		bridge.register_type(PLAYER, CallbackType::Prepared, true).unwrap();
		bridge.prepare(PLAYER, 0, SeekFlag::DEFAULT).unwrap();

		let (done_tx, done_rx) = mpsc::channel();
		let completer = decoder.clone();
		thread::spawn(move || {
			done_tx.send(completer.complete_prepare(1000, false)).unwrap();
		});

		let msg = rx.blocking_recv().unwrap();
		assert_eq!(msg.ty(), Some(CallbackType::Prepared));
		assert_eq!(msg.fields(), &[Value::Int(1000), Value::Bool(true)]);

		bridge
			.reply_type(PLAYER, CallbackType::Prepared, Reply::Prepared { ret: true, boost: true })
			.unwrap();
		assert_eq!(done_rx.recv_timeout(WAIT), Ok(Some((true, true))));
	}

	#[test]
	fn prepared_without_registration() {
		let (bridge, engine, mut rx) = setup();
		let decoder = engine.decoder(PLAYER).unwrap();
		decoder.set_duration(60_000);

		bridge.prepare(PLAYER, 500, SeekFlag::FROM_START).unwrap();
		assert_eq!(decoder.prepared_at(), Some((500, SeekFlag::FROM_START)));

		let ret = thread::spawn(move || decoder.complete_prepare(480, true)).join().unwrap();
		assert_eq!(ret, Some((true, true)));

		let msg = rx.try_recv().unwrap();
		assert_eq!(msg.fields(), &[Value::Int(480), Value::Bool(false)]);
	}

	#[tokio::test]
	async fn seek_and_snapshot() {
		let (bridge, engine, mut rx) = setup();
		let decoder = engine.decoder(PLAYER).unwrap();

		assert!(bridge.seek(PLAYER, 2000, SeekFlag::FAST).unwrap());
		decoder.complete_seek(1995);

		let msg = rx.recv().await.unwrap();
		assert_eq!(msg.ty(), Some(CallbackType::Seek));
		assert_eq!(msg.fields(), &[Value::Int(1995)]);

		bridge.snapshot(PLAYER, 2, 2).unwrap();
		decoder.complete_snapshot(Some(Snapshot {
			width: 2,
			height: 2,
			stride: 8,
			data: Bytes::from(vec![0xff; 16]),
		}));

		let msg = rx.recv().await.unwrap();
		assert_eq!(msg.ty(), Some(CallbackType::Snapshot));
		assert!(matches!(&msg.fields()[2], Value::Bytes(data) if data.len() == 16));

		bridge.snapshot(PLAYER, 2, 2).unwrap();
		decoder.complete_snapshot(None);
		let msg = rx.recv().await.unwrap();
		assert_eq!(msg.fields(), &[Value::Int(0), Value::Int(0), Value::Null]);
	}

	#[test]
	fn global_log() {
		let engine = Arc::new(FakeEngine::new());
		let bridge = Bridge::new(engine.clone());
		let (tx, mut rx) = unbounded_channel();

		bridge.register_port(PlayerHandle::GLOBAL, Arc::new(tx)).unwrap();
		bridge.set_log_level(LogLevel::Warning);
		assert_eq!(engine.log_level(), LogLevel::Warning);

		engine.log(LogLevel::Debug, "dropped");
		engine.log(LogLevel::Error, "kept");

		let msg = rx.try_recv().unwrap();
		assert_eq!(msg.ty(), Some(CallbackType::Log));
		assert_eq!(msg.fields(), &[Value::Int(1), Value::from("kept")]);
		assert!(rx.try_recv().is_err());

		assert!(bridge.unregister_port(PlayerHandle::GLOBAL));
		assert!(!engine.has_log_handler());
	}

	#[test]
	fn log_never_waits() {
		let engine = Arc::new(FakeEngine::new());
		let bridge = Bridge::new(engine.clone());
		let (tx, mut rx) = unbounded_channel();

		bridge.register_port(PlayerHandle::GLOBAL, Arc::new(tx)).unwrap();
		bridge.register_type(PlayerHandle::GLOBAL, CallbackType::Log, true).unwrap();

		let (done_tx, done_rx) = mpsc::channel();
		let logger = engine.clone();
		thread::spawn(move || {
			logger.log(LogLevel::Error, "from the engine");
			done_tx.send(()).unwrap();
		});

		done_rx.recv_timeout(Duration::from_secs(2)).expect("log blocked on a reply");
		let msg = rx.try_recv().unwrap();
		assert_eq!(msg.fields(), &[Value::Int(1), Value::from("from the engine")]);
	}

	#[test]
	fn sync_subscription() {
		let (bridge, engine, _rx) = setup();
		let decoder = engine.decoder(PLAYER).unwrap();
		assert!(!decoder.has_sync_callback());

		bridge.register_type(PLAYER, CallbackType::Sync, false).unwrap();
		assert!(decoder.has_sync_callback());
		assert_eq!(decoder.fire_sync(), Some(-1.0));

		bridge.unregister_type(PLAYER, CallbackType::Sync).unwrap();
		assert!(!decoder.has_sync_callback());
	}

	#[test]
	fn errors() {
		let (bridge, _engine, _rx) = setup();
		let (tx, _rx2) = unbounded_channel();

		assert_eq!(bridge.register_port(PlayerHandle(7), Arc::new(tx)), Err(Error::NotFound));
		assert_eq!(bridge.register_type(PlayerHandle(7), CallbackType::State, false), Err(Error::NotFound));
		assert_eq!(
			bridge.reply_type(PLAYER, CallbackType::MediaStatus, Reply::Sync { ret: 1.0 }),
			Err(Error::InvalidReply)
		);
		assert_eq!(bridge.seek(PlayerHandle(7), 0, SeekFlag::DEFAULT), Err(Error::NotFound));
	}
}
