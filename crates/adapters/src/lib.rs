pub mod export;
pub mod http;
pub mod token_store;
pub mod wire;
