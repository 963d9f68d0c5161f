use std::collections::HashMap;

use alloy::primitives::Address;
use serde::{Deserialize, Serialize};

use super::errors::{Error, Result};
use super::req::HttpClient;
use super::responses::{
    CandlesSnapshotResponse, Meta, OpenOrdersResponse, UserFillsResponse, UserStateResponse,
};

#[derive(Deserialize, Serialize, Debug, Clone)]
#[serde(rename_all = "camelCase")]
pub struct CandleSnapshotRequest {
    coin: String,
    interval: String,
    start_time: u64,
    end_time: u64,
}

#[derive(Deserialize, Serialize, Debug, Clone)]
#[serde(tag = "type")]
#[serde(rename_all = "camelCase")]
pub enum InfoRequest {
    #[serde(rename = "clearinghouseState")]
    UserState {
        user: Address,
    },
    OpenOrders {
        user: Address,
    },
    Meta,
    AllMids,
    UserFills {
        user: Address,
    },
    CandleSnapshot {
        req: CandleSnapshotRequest,
    },
}

/// Read-only queries against `POST /info`
#[derive(Debug, Clone)]
pub struct InfoClient {
    pub http_client: HttpClient,
}

impl InfoClient {
    pub fn new(http_client: HttpClient) -> Self {
        Self { http_client }
    }

    async fn send_info_request<T: for<'a> Deserialize<'a>>(
        &self,
        info_request: InfoRequest,
    ) -> Result<T> {
        let data =
            serde_json::to_string(&info_request).map_err(|e| Error::JsonParse(e.to_string()))?;

        let return_data = self.http_client.post("/info", data).await?;
        serde_json::from_str(&return_data).map_err(|e| Error::JsonParse(e.to_string()))
    }

    pub async fn open_orders(&self, address: Address) -> Result<Vec<OpenOrdersResponse>> {
        self.send_info_request(InfoRequest::OpenOrders { user: address })
            .await
    }

    pub async fn user_state(&self, address: Address) -> Result<UserStateResponse> {
        self.send_info_request(InfoRequest::UserState { user: address })
            .await
    }

    pub async fn meta(&self) -> Result<Meta> {
        self.send_info_request(InfoRequest::Meta).await
    }

    pub async fn all_mids(&self) -> Result<HashMap<String, String>> {
        self.send_info_request(InfoRequest::AllMids).await
    }

    /// Most recent fills first
    pub async fn user_fills(&self, address: Address) -> Result<Vec<UserFillsResponse>> {
        self.send_info_request(InfoRequest::UserFills { user: address })
            .await
    }

    pub async fn candles_snapshot(
        &self,
        coin: String,
        interval: String,
        start_time: u64,
        end_time: u64,
    ) -> Result<Vec<CandlesSnapshotResponse>> {
        let input = InfoRequest::CandleSnapshot {
            req: CandleSnapshotRequest {
                coin,
                interval,
                start_time,
                end_time,
            },
        };
        self.send_info_request(input).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_info_request_shapes() {
        let json = serde_json::to_value(InfoRequest::AllMids).unwrap();
        assert_eq!(json, serde_json::json!({"type": "allMids"}));

        let json = serde_json::to_value(InfoRequest::UserState { user: Address::ZERO }).unwrap();
        assert_eq!(json["type"], "clearinghouseState");

        let json = serde_json::to_value(InfoRequest::CandleSnapshot {
            req: CandleSnapshotRequest {
                coin: "ETH".to_string(),
                interval: "1h".to_string(),
                start_time: 1,
                end_time: 2,
            },
        })
        .unwrap();
        assert_eq!(json["type"], "candleSnapshot");
        assert_eq!(json["req"]["startTime"], 1);
    }
}
