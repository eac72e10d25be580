pub mod document;
pub mod error;
pub mod types;

pub use error::{Error, FlagcastResult};
