pub mod db;
pub mod history;
pub mod models;
pub mod passages;
pub mod qdrant;

mod error;

pub use error::Error;

pub type Result<T, E = Error> = std::result::Result<T, E>;
