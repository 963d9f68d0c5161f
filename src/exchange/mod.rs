//! Minimal Hyperliquid REST client: info queries and signed L1 actions.

mod actions;
mod errors;
mod exchange_client;
mod info_client;
mod req;
mod responses;
mod signature;

pub use errors::{Error, Result};
pub use exchange_client::{ClientOrderRequest, ExchangeClient};
pub use info_client::InfoClient;
pub use req::HttpClient;
pub use responses::{
    AssetMeta, CandlesSnapshotResponse, ExchangeDataStatus, ExchangeResponseStatus, Meta,
    OpenOrdersResponse, UserFillsResponse, UserStateResponse,
};
