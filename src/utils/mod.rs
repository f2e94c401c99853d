pub mod constants;
pub mod pacing;
pub mod timeout;

pub use constants::*;
pub use pacing::Pacer;
pub use timeout::{Elapsed, with_timeout};
