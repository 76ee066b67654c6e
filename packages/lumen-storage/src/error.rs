#[derive(Debug, thiserror::Error)]
pub enum Error {
	#[error(transparent)]
	Sqlx(#[from] sqlx::Error),
	#[error("Invalid argument: {0}")]
	InvalidArgument(String),
	#[error("Not found: {0}")]
	NotFound(String),
	#[error(transparent)]
	Qdrant(#[from] Box<qdrant_client::QdrantError>),
}
impl Error {
	/// Pool exhaustion and dropped connections; everything else is permanent.
	pub fn is_transient(&self) -> bool {
		match self {
			Self::Sqlx(err) => matches!(err, sqlx::Error::PoolTimedOut | sqlx::Error::Io(_)),
			_ => false,
		}
	}
}
impl From<qdrant_client::QdrantError> for Error {
	fn from(err: qdrant_client::QdrantError) -> Self {
		Self::Qdrant(Box::new(err))
	}
}
