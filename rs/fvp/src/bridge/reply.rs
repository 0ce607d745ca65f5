use std::time::{Duration, Instant};

use parking_lot::{Condvar, Mutex};

use crate::Reply;

#[derive(Default)]
struct Pending {
	ready: bool,
	reply: Option<Reply>,
}

/// Where a blocked notification waits for the scripting runtime's reply.
#[derive(Default)]
pub(super) struct ReplySlot {
	pending: Mutex<Pending>,
	signal: Condvar,
}

impl ReplySlot {
	/// Forget any previous reply. Must happen before the message is posted.
	pub fn reset(&self) {
		let mut pending = self.pending.lock();
		pending.ready = false;
		pending.reply = None;
	}

	pub fn fill(&self, reply: Reply) {
		let mut pending = self.pending.lock();
		pending.reply = Some(reply);
		pending.ready = true;
		self.signal.notify_one();
	}

	/// Wake every waiter so it can re-check its cancellation predicate.
	///
	/// The predicate's inputs must be updated before calling this.
	pub fn wake(&self) {
		let _pending = self.pending.lock();
		self.signal.notify_all();
	}

	/// Block until a reply arrives, `cancelled` returns true, or the timeout expires.
	///
	/// Returns `None` unless a reply arrived.
	pub fn wait(&self, cancelled: impl Fn() -> bool, timeout: Option<Duration>) -> Option<Reply> {
		let deadline = timeout.map(|timeout| Instant::now() + timeout);
		let mut pending = self.pending.lock();

		while !pending.ready && !cancelled() {
			match deadline {
				Some(deadline) => {
					if self.signal.wait_until(&mut pending, deadline).timed_out() {
						break;
					}
				}
				None => self.signal.wait(&mut pending),
			}
		}

		if pending.ready {
			pending.ready = false;
			pending.reply.take()
		} else {
			None
		}
	}
}

#[cfg(test)]
mod test {
	use super::*;
	use std::{
		sync::{
			Arc,
			atomic::{AtomicBool, Ordering},
		},
		thread,
	};

	#[test]
	fn reply_before_wait() {
		let slot = ReplySlot::default();
		slot.reset();
		slot.fill(Reply::Sync { ret: 2.5 });

		assert_eq!(slot.wait(|| false, None), Some(Reply::Sync { ret: 2.5 }));
	}

	#[test]
	fn reset_discards() {
		let slot = ReplySlot::default();
		slot.fill(Reply::Ack);
		slot.reset();

		assert_eq!(slot.wait(|| false, Some(Duration::from_millis(10))), None);
	}

	#[test]
	fn reply_from_other_thread() {
		let slot = Arc::new(ReplySlot::default());
		slot.reset();

		let filler = slot.clone();
		let handle = thread::spawn(move || {
			thread::sleep(Duration::from_millis(20));
			filler.fill(Reply::MediaStatus { ret: false });
		});

		assert_eq!(slot.wait(|| false, None), Some(Reply::MediaStatus { ret: false }));
		handle.join().unwrap();
	}

	#[test]
	fn cancel_wakes() {
		let slot = Arc::new(ReplySlot::default());
		let cancelled = Arc::new(AtomicBool::new(false));
		slot.reset();

		let waiter = thread::spawn({
			let slot = slot.clone();
			let cancelled = cancelled.clone();
			move || slot.wait(|| cancelled.load(Ordering::SeqCst), None)
		});

		thread::sleep(Duration::from_millis(20));
		cancelled.store(true, Ordering::SeqCst);
		slot.wake();

		assert_eq!(waiter.join().unwrap(), None);
	}

	#[test]
	fn timeout() {
		let slot = ReplySlot::default();
		slot.reset();

		let start = Instant::now();
		assert_eq!(slot.wait(|| false, Some(Duration::from_millis(30))), None);
		assert!(start.elapsed() >= Duration::from_millis(30));
	}
}
