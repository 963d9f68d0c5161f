use std::time::Duration;

use log::debug;
use reqwest::{Client, Response};
use serde::Deserialize;

use super::errors::{Error, Result};
use crate::BaseUrl;

const REQUEST_TIMEOUT_SECS: u64 = 10;

#[derive(Deserialize, Debug)]
struct ErrorData {
    code: u16,
    msg: String,
}

#[derive(Debug, Clone)]
pub struct HttpClient {
    pub client: Client,
    pub base_url: String,
}

fn classify(err: reqwest::Error) -> Error {
    if err.is_connect() || err.is_timeout() || err.is_request() || err.is_body() {
        Error::Network(err.to_string())
    } else {
        Error::GenericRequest(err.to_string())
    }
}

async fn parse_response(response: Response) -> Result<String> {
    let status_code = response.status().as_u16();
    let text = response.text().await.map_err(classify)?;

    if status_code < 400 {
        return Ok(text);
    }
    if (400..500).contains(&status_code) {
        let client_error = match serde_json::from_str::<ErrorData>(&text) {
            Ok(error_data) => Error::ClientRequest {
                status_code,
                error_code: Some(error_data.code),
                error_message: error_data.msg,
            },
            Err(_) => Error::ClientRequest {
                status_code,
                error_code: None,
                error_message: text,
            },
        };
        return Err(client_error);
    }

    Err(Error::ServerRequest {
        status_code,
        error_message: text,
    })
}

impl HttpClient {
    pub fn new(base_url: BaseUrl) -> Result<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(REQUEST_TIMEOUT_SECS))
            .build()
            .map_err(|e| Error::GenericRequest(e.to_string()))?;
        Ok(Self {
            client,
            base_url: base_url.get_url(),
        })
    }

    pub async fn post(&self, url_path: &'static str, data: String) -> Result<String> {
        let full_url = format!("{}{url_path}", self.base_url);
        debug!("POST {}", url_path);
        let response = self
            .client
            .post(&full_url)
            .header("Content-Type", "application/json")
            .body(data)
            .send()
            .await
            .map_err(classify)?;
        parse_response(response).await
    }

    pub fn is_mainnet(&self) -> bool {
        self.base_url == BaseUrl::Mainnet.get_url()
    }
}
