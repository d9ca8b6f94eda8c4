pub mod cancel;
pub mod controller;
pub mod sampler;
pub mod session;

pub use cancel::CancelToken;
pub use session::{ScanSession, SessionCommand, SessionError, SessionOutcome};
