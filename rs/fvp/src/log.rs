use std::sync::OnceLock;

use serde_with::{DisplayFromStr, serde_as};
use tracing::Level;
use tracing_subscriber::{EnvFilter, filter::LevelFilter};

static INIT: OnceLock<()> = OnceLock::new();

/// Tracing configuration for the host process.
#[serde_as]
#[derive(Clone, Debug, clap::Args, serde::Serialize, serde::Deserialize)]
#[serde(default, deny_unknown_fields)]
#[non_exhaustive]
pub struct Log {
	/// The minimum level to print, overridden by `RUST_LOG` when set.
	#[arg(id = "log-level", long = "log-level", default_value = "info", env = "FVP_LOG_LEVEL")]
	#[serde_as(as = "DisplayFromStr")]
	pub level: Level,
}

impl Default for Log {
	fn default() -> Self {
		Self { level: Level::INFO }
	}
}

impl Log {
	pub fn new(level: Level) -> Self {
		Self { level }
	}

	/// Install a global subscriber.
	///
	/// Only the first call has an effect; the embedder may have installed its own subscriber already.
	pub fn init(&self) {
		let level = self.level;
		INIT.get_or_init(|| {
			let filter = EnvFilter::builder()
				.with_default_directive(LevelFilter::from_level(level).into())
				.from_env_lossy();

			let res = tracing_subscriber::fmt()
				.with_env_filter(filter)
				.with_writer(std::io::stderr)
				.with_thread_names(true)
				.try_init();

			if res.is_err() {
				tracing::debug!("a global subscriber is already installed");
			}
		});
	}
}

#[cfg(test)]
mod test {
	use super::*;

	#[test]
	fn parse() {
		let log: Log = toml::from_str(r#"level = "debug""#).unwrap();
		assert_eq!(log.level, Level::DEBUG);

		let log: Log = toml::from_str("").unwrap();
		assert_eq!(log.level, Level::INFO);
	}
}
