mod identity_service;
mod token_service;

pub use identity_service::*;
pub use token_service::*;
