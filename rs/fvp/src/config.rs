use std::time;

use crate::{Engine, GlobalOption, Log};

/// A platform window-system handle, required by some decoders to render.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum WindowHandle {
	/// An X11 `Display*`.
	X11Display(usize),
	/// A Wayland `wl_display*`.
	WaylandDisplay(usize),
	/// The process `JavaVM*` on Android.
	JavaVm(usize),
}

impl WindowHandle {
	/// The global engine option this handle is passed as.
	pub fn option_name(&self) -> &'static str {
		match self {
			Self::X11Display(_) => "X11Display",
			Self::WaylandDisplay(_) => "WaylandDisplay",
			Self::JavaVm(_) => "JavaVM",
		}
	}

	fn ptr(&self) -> usize {
		match self {
			Self::X11Display(ptr) | Self::WaylandDisplay(ptr) | Self::JavaVm(ptr) => *ptr,
		}
	}
}

/// Plugin configuration, applied once at registration.
#[derive(Clone, Default, Debug, clap::Args, serde::Serialize, serde::Deserialize)]
#[serde(default, deny_unknown_fields)]
#[non_exhaustive]
pub struct Config {
	/// The decoder license key.
	#[serde(skip_serializing_if = "Option::is_none")]
	#[arg(id = "license-key", long = "license-key", env = "FVP_LICENSE_KEY")]
	pub license_key: Option<String>,

	/// Stop waiting for a reply from the runtime after this long.
	///
	/// Unset waits until the runtime replies, or the callback type or port is unregistered.
	#[arg(
		id = "reply-timeout",
		long = "reply-timeout",
		env = "FVP_REPLY_TIMEOUT",
		value_parser = humantime::parse_duration,
	)]
	#[serde(with = "humantime_serde")]
	#[serde(skip_serializing_if = "Option::is_none")]
	pub reply_timeout: Option<time::Duration>,

	/// Enable the decoder's GPU profiler.
	#[arg(id = "gpu-profiler", long = "gpu-profiler", env = "FVP_GPU_PROFILER")]
	pub gpu_profiler: bool,

	#[command(flatten)]
	#[serde(default)]
	pub log: Log,
}

impl Config {
	/// Push the process-wide options to the engine.
	///
	/// A missing window handle degrades rendering on some platforms but is not an error.
	pub fn apply(&self, engine: &dyn Engine, window: Option<WindowHandle>) {
		if let Some(key) = &self.license_key {
			engine.set_global_option("MDK_KEY", GlobalOption::Str(key.clone()));
		}

		match window {
			Some(window) => {
				tracing::debug!(?window, "using window handle");
				engine.set_global_option(window.option_name(), GlobalOption::Ptr(window.ptr()));
			}
			None => tracing::warn!("no window handle, rendering may be unavailable"),
		}

		if self.gpu_profiler {
			engine.set_global_option("profiler.gpu", GlobalOption::Int(1));
		}

		engine.set_log_level(self.log.level.into());
	}
}
