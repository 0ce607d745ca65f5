/// Errors returned across the C ABI, always as a negative code.
#[derive(thiserror::Error, Debug)]
#[non_exhaustive]
pub enum Error {
	#[error("panic")]
	Panic,

	#[error("invalid pointer")]
	InvalidPointer,

	#[error("invalid code")]
	InvalidCode,

	#[error("not initialized, call fvp_init first")]
	NotInitialized,

	#[error("utf8 error: {0}")]
	Utf8(#[from] std::str::Utf8Error),

	#[error("invalid log level")]
	InvalidLevel,

	#[error(transparent)]
	Fvp(#[from] fvp::Error),
}

impl Error {
	pub fn code(&self) -> i32 {
		match self {
			Self::Panic => -1,
			Self::Fvp(err) => err.code(),
			Self::InvalidPointer => -20,
			Self::InvalidCode => -21,
			Self::NotInitialized => -22,
			Self::Utf8(_) => -23,
			Self::InvalidLevel => -24,
		}
	}
}
