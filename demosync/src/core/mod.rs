pub mod identity;
pub mod paths;

pub use identity::GameId;
pub use paths::{DownloadUrl, RelativePath};
