// Application layer - use cases and orchestration.
// The CLI (or any other front end) talks to `AcademyService` only;
// account arithmetic lives in the domain ledger.

pub mod error;
pub mod service;

pub use error::*;
pub use service::*;
