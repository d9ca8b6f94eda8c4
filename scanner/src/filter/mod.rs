pub mod signature;
pub mod stability;
pub mod traits;

pub use stability::{StabilityDetector, StabilityReport};
