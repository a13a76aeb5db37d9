//! File settings layered with `NITI__` environment overrides.
//! See `bin/token_demo.rs` for a binary that wires them up without a database.

mod cli;
pub use clap::Parser;
pub use cli::*;

mod settings;
pub use settings::*;
