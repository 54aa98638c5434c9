pub mod flight;
pub mod token;
pub mod token_cache;
