mod refresh_token_repo_memory;
mod repo_tx_memory;

pub use refresh_token_repo_memory::*;
pub use repo_tx_memory::*;
