use serde::Deserialize;

#[derive(Deserialize, Debug, Clone)]
pub struct RestingOrder {
    pub oid: u64,
}

#[derive(Deserialize, Debug, Clone)]
#[serde(rename_all = "camelCase")]
pub struct FilledOrder {
    pub total_sz: String,
    pub avg_px: String,
    pub oid: u64,
}

#[derive(Deserialize, Debug, Clone)]
#[serde(rename_all = "camelCase")]
pub enum ExchangeDataStatus {
    Success,
    WaitingForFill,
    WaitingForTrigger,
    Error(String),
    Resting(RestingOrder),
    Filled(FilledOrder),
}

#[derive(Deserialize, Debug, Clone)]
pub struct ExchangeDataStatuses {
    pub statuses: Vec<ExchangeDataStatus>,
}

#[derive(Deserialize, Debug, Clone)]
pub struct ExchangeResponse {
    #[serde(rename = "type")]
    pub response_type: String,
    pub data: Option<ExchangeDataStatuses>,
}

#[derive(Deserialize, Debug, Clone)]
#[serde(rename_all = "camelCase")]
#[serde(tag = "status", content = "response")]
pub enum ExchangeResponseStatus {
    Ok(ExchangeResponse),
    Err(String),
}

impl ExchangeResponseStatus {
    /// First per-order status of a successful response
    pub fn first_status(&self) -> std::result::Result<Option<&ExchangeDataStatus>, &str> {
        match self {
            ExchangeResponseStatus::Ok(resp) => Ok(resp
                .data
                .as_ref()
                .and_then(|data| data.statuses.first())),
            ExchangeResponseStatus::Err(e) => Err(e.as_str()),
        }
    }
}

#[derive(Deserialize, Debug, Clone)]
#[serde(rename_all = "camelCase")]
pub struct OpenOrdersResponse {
    pub coin: String,
    pub oid: u64,
}

#[derive(Deserialize, Debug, Clone)]
#[serde(rename_all = "camelCase")]
pub struct UserFillsResponse {
    pub closed_pnl: String,
    pub coin: String,
    pub crossed: bool,
    pub dir: String,
    pub hash: String,
    pub oid: u64,
    pub px: String,
    pub side: String,
    pub start_position: String,
    pub sz: String,
    pub time: u64,
    pub fee: String,
    pub tid: u64,
}

#[derive(Deserialize, Debug, Clone)]
pub struct CandlesSnapshotResponse {
    #[serde(rename = "t")]
    pub time_open: u64,
    #[serde(rename = "T")]
    pub time_close: u64,
    #[serde(rename = "s")]
    pub coin: String,
    #[serde(rename = "i")]
    pub candle_interval: String,
    #[serde(rename = "o")]
    pub open: String,
    #[serde(rename = "c")]
    pub close: String,
    #[serde(rename = "h")]
    pub high: String,
    #[serde(rename = "l")]
    pub low: String,
    #[serde(rename = "v")]
    pub vlm: String,
    #[serde(rename = "n")]
    pub num_trades: u64,
}

#[derive(Deserialize, Debug, Clone)]
#[serde(rename_all = "camelCase")]
pub struct AssetMeta {
    pub name: String,
    pub sz_decimals: u32,
}

#[derive(Deserialize, Debug, Clone)]
pub struct Meta {
    pub universe: Vec<AssetMeta>,
}

#[derive(Deserialize, Debug, Clone)]
#[serde(rename_all = "camelCase")]
pub struct PositionData {
    pub coin: String,
    pub szi: String,
    pub entry_px: Option<String>,
    pub unrealized_pnl: String,
}

#[derive(Deserialize, Debug, Clone)]
pub struct AssetPosition {
    pub position: PositionData,
}

#[derive(Deserialize, Debug, Clone)]
#[serde(rename_all = "camelCase")]
pub struct UserStateResponse {
    pub asset_positions: Vec<AssetPosition>,
    pub withdrawable: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_resting_order_response() {
        let raw = r#"{"status":"ok","response":{"type":"order","data":{"statuses":[{"resting":{"oid":77738308}}]}}}"#;
        let parsed: ExchangeResponseStatus = serde_json::from_str(raw).unwrap();
        match parsed.first_status() {
            Ok(Some(ExchangeDataStatus::Resting(r))) => assert_eq!(r.oid, 77738308),
            other => panic!("unexpected status: {:?}", other),
        }
    }

    #[test]
    fn test_parse_cancel_and_error_responses() {
        let raw = r#"{"status":"ok","response":{"type":"cancel","data":{"statuses":["success"]}}}"#;
        let parsed: ExchangeResponseStatus = serde_json::from_str(raw).unwrap();
        assert!(matches!(parsed.first_status(), Ok(Some(ExchangeDataStatus::Success))));

        let raw = r#"{"status":"ok","response":{"type":"order","data":{"statuses":[{"error":"Order must have minimum value of $10."}]}}}"#;
        let parsed: ExchangeResponseStatus = serde_json::from_str(raw).unwrap();
        assert!(matches!(parsed.first_status(), Ok(Some(ExchangeDataStatus::Error(_)))));

        let raw = r#"{"status":"err","response":"User or API Wallet does not exist."}"#;
        let parsed: ExchangeResponseStatus = serde_json::from_str(raw).unwrap();
        assert!(parsed.first_status().is_err());
    }

    #[test]
    fn test_parse_user_fill() {
        let raw = r#"[{"closedPnl":"0.0","coin":"ETH","crossed":false,"dir":"Open Long","hash":"0xa166e3fa63c25663024b03f2e0da011a00307e4017465df020210d3d432e7cb8","oid":90542681,"px":"1893.2","side":"B","startPosition":"0.0","sz":"0.0109","time":1681222254710,"fee":"0.0041","tid":118906512037719,"feeToken":"USDC"}]"#;
        let fills: Vec<UserFillsResponse> = serde_json::from_str(raw).unwrap();
        assert_eq!(fills.len(), 1);
        assert_eq!(fills[0].dir, "Open Long");
        assert_eq!(fills[0].oid, 90542681);
    }
}
