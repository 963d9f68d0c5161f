use std::sync::atomic::{AtomicU64, Ordering};

use chrono::Utc;

pub const MAINNET_API_URL: &str = "https://api.hyperliquid.xyz";
pub const TESTNET_API_URL: &str = "https://api.hyperliquid-testnet.xyz";

/// Tolerance used when comparing filled quantities against the unit size
pub const EPSILON: f64 = 1e-9;

static CUR_NONCE: AtomicU64 = AtomicU64::new(0);

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum BaseUrl {
    Mainnet,
    Testnet,
}

impl BaseUrl {
    pub fn get_url(&self) -> String {
        match self {
            BaseUrl::Mainnet => MAINNET_API_URL.to_string(),
            BaseUrl::Testnet => TESTNET_API_URL.to_string(),
        }
    }
}

/// Millisecond nonce, strictly increasing within the process.
pub fn next_nonce() -> u64 {
    let now = Utc::now().timestamp_millis().max(0) as u64;
    let mut prev = CUR_NONCE.load(Ordering::Relaxed);
    loop {
        let candidate = now.max(prev + 1);
        match CUR_NONCE.compare_exchange_weak(prev, candidate, Ordering::Relaxed, Ordering::Relaxed) {
            Ok(_) => return candidate,
            Err(actual) => prev = actual,
        }
    }
}

/// Current wall-clock time in unix milliseconds
pub fn now_millis() -> u64 {
    Utc::now().timestamp_millis().max(0) as u64
}

/// Format a float the way the exchange hashes it: at most 8 decimals, no trailing zeros.
pub fn float_to_string(x: f64) -> String {
    let mut x = format!("{:.*}", 8, x);
    while x.ends_with('0') {
        x.pop();
    }
    if x.ends_with('.') {
        x.pop();
    }
    if x == "-0" {
        "0".to_string()
    } else {
        x
    }
}

/// Round `value` to `decimals` decimal places
pub fn round_to_decimals(value: f64, decimals: u32) -> f64 {
    let factor = 10f64.powi(decimals as i32);
    (value * factor).round() / factor
}
