/// A list of possible errors produced by the texture and callback layers.
///
/// Most of these never cross a thread boundary: GPU and transport failures are logged and
/// degraded locally, only request-level failures reach a caller.
#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
#[non_exhaustive]
pub enum Error {
	#[error("not found")]
	NotFound,

	/// The message port is closed or the runtime is shutting down.
	#[error("port closed")]
	Closed,

	/// The framebuffer did not reach a complete status.
	#[error("framebuffer incomplete status={0:#x}")]
	Framebuffer(u32),

	/// The platform refused to create a shareable image for the texture.
	#[error("failed to create shareable image")]
	Image,

	/// The GPU device could not be created, with the platform error code.
	#[error("device creation failed code={0:#x}")]
	Device(i32),

	/// No GPU context is available, or it differs from the one captured at first use.
	#[error("gpu context unavailable or mismatched")]
	Context,

	/// The compositor refused to register the texture.
	#[error("texture registration failed")]
	Register,

	#[error("invalid callback type: {0}")]
	InvalidType(i32),

	#[error("reply does not match the callback type")]
	InvalidReply,

	#[error("missing argument: {0}")]
	MissingArgument(&'static str),

	#[error("invalid argument: {0}")]
	InvalidArgument(&'static str),
}

impl Error {
	/// A stable negative code used across the C ABI.
	pub fn code(&self) -> i32 {
		match self {
			Self::NotFound => -2,
			Self::Closed => -3,
			Self::Framebuffer(_) => -4,
			Self::Image => -5,
			Self::Device(_) => -6,
			Self::Context => -7,
			Self::Register => -8,
			Self::InvalidType(_) => -9,
			Self::InvalidReply => -10,
			Self::MissingArgument(_) => -11,
			Self::InvalidArgument(_) => -12,
		}
	}
}

pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod test {
	use super::*;

	#[test]
	fn codes_are_negative_and_unique() {
		let errors = [
			Error::NotFound,
			Error::Closed,
			Error::Framebuffer(0x8cd6),
			Error::Image,
			Error::Device(-1),
			Error::Context,
			Error::Register,
			Error::InvalidType(9),
			Error::InvalidReply,
			Error::MissingArgument("player"),
			Error::InvalidArgument("width"),
		];

		let mut codes: Vec<i32> = errors.iter().map(Error::code).collect();
		assert!(codes.iter().all(|code| *code < 0));

		codes.sort();
		codes.dedup();
		assert_eq!(codes.len(), errors.len());
	}

	#[test]
	fn display() {
		assert_eq!(Error::Framebuffer(0x8cd6).to_string(), "framebuffer incomplete status=0x8cd6");
		assert_eq!(Error::MissingArgument("texture").to_string(), "missing argument: texture");
	}
}
