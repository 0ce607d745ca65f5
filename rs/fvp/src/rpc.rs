use std::{collections::HashMap, sync::Arc};

use crate::gpu::Gpu;
use crate::texture::Compositor;
use crate::{Config, Engine, Error, PlayerHandle, Registry, TextureId, Value, WindowHandle};

/// A named call from the UI layer, with its arguments.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct MethodCall {
	pub method: String,
	pub args: HashMap<String, Value>,
}

impl MethodCall {
	pub fn new(method: impl Into<String>) -> Self {
		Self {
			method: method.into(),
			args: HashMap::new(),
		}
	}

	pub fn arg(mut self, name: impl Into<String>, value: impl Into<Value>) -> Self {
		self.args.insert(name.into(), value.into());
		self
	}

	fn int(&self, name: &'static str) -> Result<i64, Error> {
		self.args
			.get(name)
			.ok_or(Error::MissingArgument(name))?
			.as_int()
			.ok_or(Error::InvalidArgument(name))
	}

	fn size(&self, name: &'static str) -> Result<u32, Error> {
		u32::try_from(self.int(name)?).map_err(|_| Error::InvalidArgument(name))
	}
}

#[derive(Clone, Debug, PartialEq)]
pub enum MethodResponse {
	Success(Value),
	Error { code: String, message: String },
	NotImplemented,
}

impl MethodResponse {
	fn error(code: &str, err: Error) -> Self {
		Self::Error {
			code: code.to_string(),
			message: err.to_string(),
		}
	}
}

impl From<Error> for MethodResponse {
	fn from(err: Error) -> Self {
		let code = match err {
			Error::MissingArgument(_) | Error::InvalidArgument(_) => "argument",
			Error::Device(_) => "device",
			Error::NotFound => "player",
			_ => "register",
		};
		Self::error(code, err)
	}
}

/// The plugin object registered with the UI framework.
///
/// Owns the registry; dropping the plugin releases every player before the engine reference.
pub struct Plugin<G: Gpu> {
	// Declared first so it is dropped first.
	registry: Registry<G>,
	engine: Arc<dyn Engine>,
}

impl<G: Gpu> Plugin<G> {
	pub fn register(
		config: &Config,
		engine: Arc<dyn Engine>,
		compositor: Arc<dyn Compositor<G>>,
		gpu: Arc<G>,
		window: Option<WindowHandle>,
	) -> Self {
		config.apply(engine.as_ref(), window);

		Self {
			registry: Registry::new(engine.clone(), compositor, gpu),
			engine,
		}
	}

	pub fn registry(&self) -> &Registry<G> {
		&self.registry
	}

	pub fn engine(&self) -> &Arc<dyn Engine> {
		&self.engine
	}

	pub fn handle_method_call(&self, call: &MethodCall) -> MethodResponse {
		let res = match call.method.as_str() {
			"CreateRT" => self.create_rt(call),
			"ReleaseRT" => self.release_rt(call),
			"MixWithOthers" => Ok(Value::Null),
			method => {
				tracing::debug!(method, "method not implemented");
				return MethodResponse::NotImplemented;
			}
		};

		match res {
			Ok(value) => MethodResponse::Success(value),
			Err(err) => {
				tracing::warn!(method = %call.method, %err, "method call failed");
				err.into()
			}
		}
	}

	fn create_rt(&self, call: &MethodCall) -> Result<Value, Error> {
		let handle = PlayerHandle(call.int("player")?);
		let width = call.size("width")?;
		let height = call.size("height")?;

		let id = self.registry.create(handle, width, height)?;
		Ok(Value::Int(id.0))
	}

	fn release_rt(&self, call: &MethodCall) -> Result<Value, Error> {
		let id = TextureId(call.int("texture")?);
		self.registry.release(id);
		Ok(Value::Null)
	}
}

#[cfg(test)]
mod test {
	use super::*;
	use crate::testing::{FakeCompositor, FakeContext, FakeEngine, FakeGpu};

	struct Setup {
		engine: Arc<FakeEngine>,
		compositor: Arc<FakeCompositor<FakeGpu>>,
		gpu: Arc<FakeGpu>,
		plugin: Plugin<FakeGpu>,
	}

	fn setup() -> Setup {
		let engine = Arc::new(FakeEngine::new());
		let compositor = Arc::new(FakeCompositor::new());
		let gpu = Arc::new(FakeGpu::new());
		let plugin = Plugin::register(
			&Config::default(),
			engine.clone(),
			compositor.clone(),
			gpu.clone(),
			Some(WindowHandle::WaylandDisplay(1)),
		);

		Setup {
			engine,
			compositor,
			gpu,
			plugin,
		}
	}

	#[test]
	fn create_release() {
		let setup = setup();
		setup.engine.add_player(PlayerHandle(42));

		let create = MethodCall::new("CreateRT")
			.arg("player", 42)
			.arg("width", 640)
			.arg("height", 480);

		let MethodResponse::Success(Value::Int(id)) = setup.plugin.handle_method_call(&create) else {
			panic!("expected a texture id");
		};
		assert!(setup.compositor.is_registered(TextureId(id)));

		let release = MethodCall::new("ReleaseRT").arg("texture", id);
		assert_eq!(setup.plugin.handle_method_call(&release), MethodResponse::Success(Value::Null));
		assert!(!setup.compositor.is_registered(TextureId(id)));

		// Releasing again is a no-op.
		assert_eq!(setup.plugin.handle_method_call(&release), MethodResponse::Success(Value::Null));
	}

	#[test]
	fn arguments() {
		let setup = setup();
		setup.engine.add_player(PlayerHandle(42));

		let missing = MethodCall::new("CreateRT").arg("player", 42).arg("width", 640);
		assert!(matches!(
			setup.plugin.handle_method_call(&missing),
			MethodResponse::Error { code, .. } if code == "argument"
		));

		let negative = MethodCall::new("CreateRT")
			.arg("player", 42)
			.arg("width", -1)
			.arg("height", 480);
		assert!(matches!(
			setup.plugin.handle_method_call(&negative),
			MethodResponse::Error { code, .. } if code == "argument"
		));

		let mistyped = MethodCall::new("ReleaseRT").arg("texture", "1");
		assert!(matches!(
			setup.plugin.handle_method_call(&mistyped),
			MethodResponse::Error { code, .. } if code == "argument"
		));

		assert_eq!(setup.compositor.registered(), 0);
	}

	#[test]
	fn device_error() {
		let setup = setup();
		setup.engine.add_player(PlayerHandle(42));
		setup.gpu.fail_device(Error::Device(-2005270523));

		let create = MethodCall::new("CreateRT")
			.arg("player", 42)
			.arg("width", 640)
			.arg("height", 480);

		match setup.plugin.handle_method_call(&create) {
			MethodResponse::Error { code, message } => {
				assert_eq!(code, "device");
				assert!(message.contains("device creation failed"));
			}
			res => panic!("unexpected response: {res:?}"),
		}
	}

	#[test]
	fn other_methods() {
		let setup = setup();

		assert_eq!(
			setup.plugin.handle_method_call(&MethodCall::new("MixWithOthers")),
			MethodResponse::Success(Value::Null)
		);
		assert_eq!(
			setup.plugin.handle_method_call(&MethodCall::new("getPlatformVersion")),
			MethodResponse::NotImplemented
		);
	}

	#[test]
	fn register_applies_options() {
		let setup = setup();
		assert_eq!(
			setup.engine.global_option("WaylandDisplay"),
			Some(crate::GlobalOption::Ptr(1))
		);
	}

	#[test]
	fn drop_releases_players() {
		let setup = setup();
		let decoder = setup.engine.add_player(PlayerHandle(1));

		let create = MethodCall::new("CreateRT")
			.arg("player", 1)
			.arg("width", 8)
			.arg("height", 8);
		let MethodResponse::Success(Value::Int(id)) = setup.plugin.handle_method_call(&create) else {
			panic!("expected a texture id");
		};
		setup.compositor.populate(TextureId(id), &FakeContext(1)).unwrap();

		drop(setup.plugin);
		assert_eq!(setup.compositor.registered(), 0);
		assert_eq!(decoder.surface_size(), (-1, -1));
	}
}
