mod coordinator;
mod diagnostics;
pub mod routes;
mod types;

#[cfg(test)]
mod tests;

pub use coordinator::ScanCoordinator;
pub use diagnostics::{Candidate, ResolutionReport};
pub use routes::{ar_route, ar_url, parse_route, preview_payload, simulate_route, Route};
pub use types::{ArHandoff, IncompleteReason, ScanOutcome};
