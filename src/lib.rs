pub mod core;
pub mod services;
pub mod utils;

pub use crate::core::config::Config;
pub use crate::core::error::{ErrorKind, GenerationError, StageError};
pub use crate::core::state::SessionState;
pub use crate::services::workflow::Workshop;
