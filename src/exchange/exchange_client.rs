//! Signed `POST /exchange` actions: orders, cancels and leverage.

use std::collections::HashMap;

use alloy::{
    primitives::{Address, Signature},
    signers::local::PrivateKeySigner,
};
use log::debug;
use serde::{ser::SerializeStruct, Serialize, Serializer};

use super::actions::{
    Actions, BulkCancel, BulkOrder, CancelRequest, Limit, Order, OrderRequest, UpdateLeverage,
};
use super::errors::{Error, Result};
use super::req::HttpClient;
use super::responses::{ExchangeResponseStatus, Meta};
use super::signature::sign_l1_action;
use crate::helpers::{float_to_string, next_nonce};

/// Order as the strategy describes it, before asset/number encoding
#[derive(Debug, Clone)]
pub struct ClientOrderRequest {
    pub asset: String,
    pub is_buy: bool,
    pub reduce_only: bool,
    pub limit_px: f64,
    pub sz: f64,
    pub tif: String,
}

pub struct ExchangeClient {
    pub http_client: HttpClient,
    pub wallet: PrivateKeySigner,
    pub vault_address: Option<Address>,
    pub coin_to_asset: HashMap<String, u32>,
}

impl std::fmt::Debug for ExchangeClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ExchangeClient")
            .field("http_client", &self.http_client)
            .field("wallet", &"<redacted>")
            .field("vault_address", &self.vault_address)
            .field(
                "coin_to_asset",
                &format!("{} entries", self.coin_to_asset.len()),
            )
            .finish()
    }
}

fn serialize_sig<S>(sig: &Signature, s: S) -> std::result::Result<S::Ok, S::Error>
where
    S: Serializer,
{
    let mut state = s.serialize_struct("Signature", 3)?;
    state.serialize_field("r", &sig.r())?;
    state.serialize_field("s", &sig.s())?;
    state.serialize_field("v", &(27 + sig.v() as u64))?;
    state.end()
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct ExchangePayload {
    action: serde_json::Value,
    #[serde(serialize_with = "serialize_sig")]
    signature: Signature,
    nonce: u64,
    vault_address: Option<Address>,
}

impl ExchangeClient {
    pub fn new(http_client: HttpClient, wallet: PrivateKeySigner, meta: &Meta) -> Self {
        let coin_to_asset = meta
            .universe
            .iter()
            .enumerate()
            .map(|(index, asset)| (asset.name.clone(), index as u32))
            .collect();

        Self {
            http_client,
            wallet,
            vault_address: None,
            coin_to_asset,
        }
    }

    fn asset_index(&self, coin: &str) -> Result<u32> {
        self.coin_to_asset
            .get(coin)
            .copied()
            .ok_or_else(|| Error::AssetNotFound(coin.to_string()))
    }

    pub async fn order(&self, order: ClientOrderRequest) -> Result<ExchangeResponseStatus> {
        let asset = self.asset_index(&order.asset)?;
        let action = Actions::Order(BulkOrder {
            orders: vec![OrderRequest {
                asset,
                is_buy: order.is_buy,
                limit_px: float_to_string(order.limit_px),
                sz: float_to_string(order.sz),
                reduce_only: order.reduce_only,
                order_type: Order::Limit(Limit { tif: order.tif }),
            }],
            grouping: "na".to_string(),
        });
        self.execute_l1_action(action).await
    }

    pub async fn cancel(&self, coin: &str, oid: u64) -> Result<ExchangeResponseStatus> {
        let asset = self.asset_index(coin)?;
        let action = Actions::Cancel(BulkCancel {
            cancels: vec![CancelRequest { asset, oid }],
        });
        self.execute_l1_action(action).await
    }

    pub async fn update_leverage(
        &self,
        leverage: u32,
        coin: &str,
        is_cross: bool,
    ) -> Result<ExchangeResponseStatus> {
        let asset = self.asset_index(coin)?;
        let action = Actions::UpdateLeverage(UpdateLeverage {
            asset,
            is_cross,
            leverage,
        });
        self.execute_l1_action(action).await
    }

    async fn execute_l1_action(&self, action: Actions) -> Result<ExchangeResponseStatus> {
        let timestamp = next_nonce();

        let connection_id = action.hash(timestamp, self.vault_address)?;
        let action_json =
            serde_json::to_value(&action).map_err(|e| Error::JsonParse(e.to_string()))?;
        let signature = sign_l1_action(&self.wallet, connection_id, self.http_client.is_mainnet())?;

        self.post(action_json, signature, timestamp).await
    }

    async fn post(
        &self,
        action: serde_json::Value,
        signature: Signature,
        nonce: u64,
    ) -> Result<ExchangeResponseStatus> {
        let exchange_payload = ExchangePayload {
            action,
            signature,
            nonce,
            vault_address: self.vault_address,
        };
        let res = serde_json::to_string(&exchange_payload)
            .map_err(|e| Error::JsonParse(e.to_string()))?;
        // payload carries a signature, keep it out of the logs
        debug!("Sending exchange request");

        let output = self.http_client.post("/exchange", res).await?;
        serde_json::from_str(&output).map_err(|e| Error::JsonParse(e.to_string()))
    }
}
