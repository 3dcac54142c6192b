pub mod download;
pub mod extract;
pub mod orchestrator;

pub use download::{AssetFetcher, HttpFetcher};
pub use orchestrator::{Orchestrator, Outcome, TransferOptions, TransferRequest, TransferSummary};
