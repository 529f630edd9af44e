pub mod error;

pub use error::{JwkError, Result};
