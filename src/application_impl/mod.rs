mod jwt_token_codec;
mod telegram_identity_resolver;
mod token_service_impl;

pub use jwt_token_codec::*;
pub use telegram_identity_resolver::*;
pub use token_service_impl::*;
