pub mod config;
pub mod exchange;
pub mod grid;
pub mod logging;

mod helpers;

pub use helpers::{
    float_to_string, next_nonce, BaseUrl, EPSILON, MAINNET_API_URL, TESTNET_API_URL,
};
