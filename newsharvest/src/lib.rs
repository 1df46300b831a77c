// Library interface for newsharvest modules
// This allows tests and the binary to import modules

pub mod classify;
pub mod display;
pub mod engine;
pub mod error;
pub mod filter;
pub mod handler;
pub mod harvester;
pub mod model;
pub mod server;
pub mod sources;

pub use error::{EngineError, HarvestError, HarvestFailure};
pub use filter::SearchTarget;
pub use handler::{HarvestRequest, HarvestResponse, HarvestService};
pub use harvester::{HarvestConfig, Harvester, RetryPolicy};
pub use model::{Article, HarvestResult, Termination};
