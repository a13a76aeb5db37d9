// repo

mod refresh_token_repo;

mod repo_tx;

pub use refresh_token_repo::*;

pub use repo_tx::*;
