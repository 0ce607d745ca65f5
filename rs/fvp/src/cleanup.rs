//! Deferred release of GPU resources.
//!
//! GPU objects may only be deleted with their context current, which is only guaranteed inside
//! compositor calls on the rendering thread. Owners mark a [CleanupTask] as disposed from any
//! thread and the rendering thread runs it the next time it drains the [CleanupQueue].

use std::{
	collections::VecDeque,
	fmt,
	sync::{
		Arc,
		atomic::{AtomicBool, Ordering},
	},
	thread::{self, ThreadId},
};

use parking_lot::Mutex;

type Release = Box<dyn FnOnce() + Send>;

struct TaskState {
	disposed: AtomicBool,
	// Taken exactly once, by whichever path gets here first.
	release: Mutex<Option<Release>>,
}

/// A pending release closure, capturing GPU handles by value.
#[derive(Clone)]
pub struct CleanupTask {
	state: Arc<TaskState>,
}

impl CleanupTask {
	pub fn new<F>(release: F) -> Self
	where
		F: FnOnce() + Send + 'static,
	{
		Self {
			state: Arc::new(TaskState {
				disposed: AtomicBool::new(false),
				release: Mutex::new(Some(Box::new(release))),
			}),
		}
	}

	/// Mark the owner as gone; the release may now run on the next drain.
	pub fn dispose(&self) {
		self.state.disposed.store(true, Ordering::Release);
	}

	pub fn is_disposed(&self) -> bool {
		self.state.disposed.load(Ordering::Acquire)
	}

	/// Whether the release closure already ran.
	pub fn is_done(&self) -> bool {
		self.state.release.lock().is_none()
	}

	/// Run the release closure now, if nobody did yet.
	///
	/// Returns `true` if this call ran it. The caller is responsible for having the right GPU
	/// context current.
	pub fn run(&self) -> bool {
		// Don't hold the lock while running the closure, it may be slow or reentrant.
		let release = self.state.release.lock().take();
		match release {
			Some(release) => {
				release();
				true
			}
			None => false,
		}
	}
}

impl fmt::Debug for CleanupTask {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.debug_struct("CleanupTask")
			.field("disposed", &self.is_disposed())
			.field("done", &self.is_done())
			.finish()
	}
}

/// A FIFO of cleanup tasks confined to one rendering thread.
///
/// Tasks may be enqueued from any thread. The first thread to drain the queue becomes its owner;
/// drains attempted from other threads do nothing.
#[derive(Default)]
pub struct CleanupQueue {
	affinity: Mutex<Option<ThreadId>>,
	tasks: Mutex<VecDeque<CleanupTask>>,
}

impl CleanupQueue {
	pub fn new() -> Self {
		Self::default()
	}

	/// Create a queue already bound to the given rendering thread.
	pub fn bound_to(thread: ThreadId) -> Self {
		Self {
			affinity: Mutex::new(Some(thread)),
			tasks: Default::default(),
		}
	}

	pub fn affinity(&self) -> Option<ThreadId> {
		*self.affinity.lock()
	}

	/// Whether the calling thread is (or may become) the owner of this queue.
	pub fn is_owner(&self) -> bool {
		self.affinity().is_none_or(|owner| owner == thread::current().id())
	}

	pub fn enqueue(&self, task: CleanupTask) {
		self.tasks.lock().push_back(task);
	}

	pub fn len(&self) -> usize {
		self.tasks.lock().len()
	}

	pub fn is_empty(&self) -> bool {
		self.tasks.lock().is_empty()
	}

	/// Remove and run every disposed task, returning how many releases ran.
	///
	/// Must be called with the rendering thread's GPU context current.
	pub fn drain_disposed(&self) -> usize {
		let current = thread::current().id();

		{
			let mut affinity = self.affinity.lock();
			match *affinity {
				None => *affinity = Some(current),
				Some(owner) if owner != current => {
					tracing::warn!(?owner, ?current, "cleanup queue drained from a foreign thread");
					return 0;
				}
				Some(_) => {}
			}
		}

		let disposed: Vec<CleanupTask> = {
			let mut tasks = self.tasks.lock();
			let (disposed, pending): (Vec<_>, Vec<_>) =
				tasks.drain(..).partition(|task| task.is_disposed() || task.is_done());
			*tasks = pending.into();
			disposed
		};

		let count = disposed.iter().filter(|task| task.run()).count();
		if count > 0 {
			tracing::debug!(count, thread = ?current, "cleanup tasks executed");
		}

		count
	}
}

impl Drop for CleanupQueue {
	fn drop(&mut self) {
		let leaked = self
			.tasks
			.get_mut()
			.iter()
			.filter(|task| task.is_disposed() && !task.is_done())
			.count();

		if leaked > 0 {
			tracing::warn!(leaked, "cleanup queue dropped before its tasks could run");
		}
	}
}

impl fmt::Debug for CleanupQueue {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.debug_struct("CleanupQueue")
			.field("affinity", &self.affinity())
			.field("tasks", &self.len())
			.finish()
	}
}

#[cfg(test)]
mod test {
	use super::*;
	use std::sync::{Barrier, atomic::AtomicUsize};

	fn counted() -> (CleanupTask, Arc<AtomicUsize>) {
		let runs = Arc::new(AtomicUsize::new(0));
		let task = CleanupTask::new({
			let runs = runs.clone();
			move || {
				runs.fetch_add(1, Ordering::SeqCst);
			}
		});
		(task, runs)
	}

	#[test]
	fn drain_only_disposed() {
		let queue = CleanupQueue::new();
		let (live, live_runs) = counted();
		let (dead, dead_runs) = counted();

		queue.enqueue(live.clone());
		queue.enqueue(dead.clone());
		dead.dispose();

		assert_eq!(queue.drain_disposed(), 1);
		assert_eq!(dead_runs.load(Ordering::SeqCst), 1);
		assert_eq!(live_runs.load(Ordering::SeqCst), 0);
		assert_eq!(queue.len(), 1);

		// Draining again doesn't rerun anything.
		assert_eq!(queue.drain_disposed(), 0);
		assert_eq!(dead_runs.load(Ordering::SeqCst), 1);

		live.dispose();
		assert_eq!(queue.drain_disposed(), 1);
		assert!(queue.is_empty());
	}

	#[test]
	fn fallback_then_drain() {
		let queue = CleanupQueue::new();
		let (task, runs) = counted();
		queue.enqueue(task.clone());

		task.dispose();
		assert!(task.run());
		assert!(!task.run());

		// The queue forgets the task without running it again.
		assert_eq!(queue.drain_disposed(), 0);
		assert!(queue.is_empty());
		assert_eq!(runs.load(Ordering::SeqCst), 1);
	}

	#[test]
	fn foreign_thread_does_not_drain() {
		let queue = Arc::new(CleanupQueue::bound_to(thread::current().id()));
		let (task, runs) = counted();
		queue.enqueue(task.clone());
		task.dispose();

		let other = queue.clone();
		let drained = thread::spawn(move || other.drain_disposed()).join().unwrap();
		assert_eq!(drained, 0);
		assert_eq!(runs.load(Ordering::SeqCst), 0);

		assert_eq!(queue.drain_disposed(), 1);
		assert_eq!(runs.load(Ordering::SeqCst), 1);
	}

	#[test]
	fn first_drain_binds() {
		let queue = Arc::new(CleanupQueue::new());
		assert!(queue.is_owner());

		let other = queue.clone();
		let owner = thread::spawn(move || {
			other.drain_disposed();
			thread::current().id()
		})
		.join()
		.unwrap();

		assert_eq!(queue.affinity(), Some(owner));
		assert!(!queue.is_owner());
	}

	#[test]
	fn race_exactly_once() {
		for _ in 0..200 {
			let (task, runs) = counted();
			let barrier = Arc::new(Barrier::new(2));

			// The rendering thread owns the queue and drains it.
			let render = thread::spawn({
				let task = task.clone();
				let barrier = barrier.clone();
				move || {
					let queue = CleanupQueue::new();
					queue.enqueue(task.clone());
					task.dispose();
					barrier.wait();
					queue.drain_disposed()
				}
			});

			// Meanwhile the owner is destroyed and attempts the fallback.
			barrier.wait();
			let fallback = task.run() as usize;
			let drained = render.join().unwrap();

			assert_eq!(drained + fallback, 1);
			assert_eq!(runs.load(Ordering::SeqCst), 1);
		}
	}
}
