pub type Result<T, E = Error> = std::result::Result<T, E>;

#[derive(Debug, thiserror::Error)]
pub enum Error {
	#[error("Invalid request: {message}")]
	InvalidRequest { message: String },
	#[error("Provider error: {message}")]
	Provider { message: String },
	#[error("Storage error: {message}")]
	Storage { message: String },
	#[error("Qdrant error: {message}")]
	Qdrant { message: String },
	#[error("Upstream unavailable: {message}")]
	Unavailable { message: String },
	#[error("Retrieval was cancelled.")]
	Cancelled,
	#[error("Retrieval deadline exceeded.")]
	DeadlineExceeded,
}
impl Error {
	/// Only transient failures are retried.
	pub fn is_transient(&self) -> bool {
		matches!(self, Self::Unavailable { .. })
	}
}
impl From<lumen_config::Error> for Error {
	fn from(err: lumen_config::Error) -> Self {
		Self::InvalidRequest { message: err.to_string() }
	}
}
impl From<lumen_providers::Error> for Error {
	fn from(err: lumen_providers::Error) -> Self {
		if err.is_transient() {
			return Self::Unavailable { message: err.to_string() };
		}

		Self::Provider { message: err.to_string() }
	}
}
impl From<lumen_storage::Error> for Error {
	fn from(err: lumen_storage::Error) -> Self {
		if err.is_transient() {
			return Self::Unavailable { message: err.to_string() };
		}

		match err {
			lumen_storage::Error::Sqlx(inner) => Self::Storage { message: inner.to_string() },
			lumen_storage::Error::InvalidArgument(message) => Self::InvalidRequest { message },
			lumen_storage::Error::NotFound(message) => Self::Storage { message },
			lumen_storage::Error::Qdrant(inner) => Self::Qdrant { message: inner.to_string() },
		}
	}
}
