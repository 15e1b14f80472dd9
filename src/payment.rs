//!
//! src/payment.rs  Oct 19th, 2026
//!
//! Launch fee payment through a JSON-RPC wallet provider: puts the wallet on
//! the target chain, checks the balance covers fee and gas, then sends the
//! transfer to the treasury. Signing happens in the wallet, never here.
//!

use std::sync::atomic::{AtomicU64, Ordering};

use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;
use serde_json::{Value, json};
use thiserror::Error;
use tracing::{debug, info, warn};

use crate::config::{ChainConfig, HttpConfig, PaymentConfig};
use crate::errors::{PaymentError, UploaderError};
use crate::fetch;
use crate::types::PaymentResult;

const WEI_PER_ETHER: u128 = 1_000_000_000_000_000_000;
const ETHER_DECIMALS: usize = 18;

// EIP-1193 / JSON-RPC error codes the wallet answers with
pub const USER_REJECTED: i64 = 4001;
pub const UNRECOGNIZED_CHAIN: i64 = 4902;
pub const INTERNAL_ERROR: i64 = -32603;

/// Decimal ether string to wei, exact
pub fn parse_ether(amount: &str) -> Result<u128, String> {
    let amount = amount.trim();
    let (whole, frac) = match amount.split_once('.') {
        Some((w, f)) => (w, f),
        None => (amount, ""),
    };
    if whole.is_empty() && frac.is_empty() {
        return Err(format!("not an ether amount: {amount:?}"));
    }
    if !whole.chars().chain(frac.chars()).all(|c| c.is_ascii_digit()) {
        return Err(format!("not an ether amount: {amount:?}"));
    }
    if frac.len() > ETHER_DECIMALS {
        return Err(format!("more than {ETHER_DECIMALS} decimals: {amount}"));
    }

    let whole: u128 = if whole.is_empty() {
        0
    } else {
        whole.parse().map_err(|e| format!("{amount}: {e}"))?
    };
    let padded = format!("{frac:0<width$}", width = ETHER_DECIMALS);
    let frac: u128 = padded.parse().map_err(|e| format!("{amount}: {e}"))?;

    whole.checked_mul(WEI_PER_ETHER)
        .and_then(|w| w.checked_add(frac))
        .ok_or_else(|| format!("ether amount overflows: {amount}"))
}

/// Wei back to a trimmed decimal ether string, for display
pub fn format_ether(wei: u128) -> String {
    let whole = wei / WEI_PER_ETHER;
    let frac = wei % WEI_PER_ETHER;
    if frac == 0 {
        return whole.to_string();
    }
    let frac = format!("{frac:0>width$}", width = ETHER_DECIMALS);
    format!("{whole}.{}", frac.trim_end_matches('0'))
}

pub fn to_quantity(n: u128) -> String {
    format!("{n:#x}")
}

/// Parses a JSON-RPC hex quantity such as "0x2105"
pub fn parse_quantity(v: &Value) -> Option<u128> {
    let s = v.as_str()?;
    let digits = s.strip_prefix("0x").or_else(|| s.strip_prefix("0X"))?;
    if digits.is_empty() {
        return Some(0);
    }
    u128::from_str_radix(digits, 16).ok()
}

/// `0x` followed by 40 hex digits
pub fn is_address(s: &str) -> bool {
    s.len() == 42
        && s.starts_with("0x")
        && s[2..].chars().all(|c| c.is_ascii_hexdigit())
}

#[derive(Error, Debug, Clone, PartialEq, Eq, Deserialize)]
#[error("rpc error {code}: {message}")]
pub struct RpcError {
    pub code: i64,
    #[serde(default)]
    pub message: String,
}

impl RpcError {
    pub fn new(code: i64, message: impl Into<String>) -> Self {
        Self { code, message: message.into() }
    }
}

#[async_trait]
pub trait WalletProvider: Send + Sync {
    async fn request(&self, method: &str, params: Value) -> Result<Value, RpcError>;
}

#[async_trait]
pub trait PaymentProcessor: Send + Sync {
    async fn process_launch_payment(&self, payer: &str) -> Result<PaymentResult, PaymentError>;
}

#[derive(Debug, Deserialize)]
struct RpcResponse {
    result: Option<Value>,
    error: Option<RpcError>,
}

///
/// JSON-RPC 2.0 over http to a signer endpoint (a local node or wallet bridge)
///
#[derive(Debug)]
pub struct HttpWalletProvider {
    http: Client,
    endpoint: url::Url,
    next_id: AtomicU64,
}

impl HttpWalletProvider {
    pub fn new(http_config: &HttpConfig, endpoint: &url::Url) -> Result<Self, UploaderError> {
        Ok( Self {
            http: fetch::base_client(http_config)?,
            endpoint: endpoint.clone(),
            next_id: AtomicU64::new(1),
        })
    }
}

#[async_trait]
impl WalletProvider for HttpWalletProvider {
    async fn request(&self, method: &str, params: Value) -> Result<Value, RpcError> {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let body = json!({ "jsonrpc": "2.0", "id": id, "method": method, "params": params });

        debug!(method, id, "wallet.request");
        let response = self.http
            .post(self.endpoint.clone())
            .json(&body)
            .send()
            .await
            .map_err(|e| RpcError::new(INTERNAL_ERROR, format!("transport: {e}")))?;

        let status = response.status();
        let parsed: RpcResponse = response.json()
            .await
            .map_err(|e| RpcError::new(INTERNAL_ERROR, format!("http {status}: {e}")))?;

        match (parsed.error, parsed.result) {
            (Some(err), _) => Err(err),
            (None, Some(result)) => Ok(result),
            (None, None) => Err(RpcError::new(INTERNAL_ERROR, "response without result")),
        }
    }
}

///
/// Charges the launch fee through whichever wallet it is given
///
pub struct PaymentService<W> {
    wallet: W,
    cfg: PaymentConfig,
}

impl<W: WalletProvider> PaymentService<W> {
    pub fn new(wallet: W, cfg: &PaymentConfig) -> Self {
        Self { wallet, cfg: cfg.clone() }
    }

    fn add_chain_params(chain: &ChainConfig) -> Value {
        json!([{
            "chainId": to_quantity(chain.chain_id as u128),
            "chainName": chain.chain_name,
            "nativeCurrency": {
                "name": "Ethereum",
                "symbol": chain.currency_symbol,
                "decimals": ETHER_DECIMALS,
            },
            "rpcUrls": [chain.rpc_url],
            "blockExplorerUrls": [chain.explorer_url],
        }])
    }

    async fn ensure_chain(&self) -> Result<(), PaymentError> {
        let target = self.cfg.chain.chain_id;
        let current = self.wallet.request("eth_chainId", json!([]))
            .await
            .map_err(rpc_error)?;
        let current = parse_quantity(&current);
        if current == Some(target as u128) {
            return Ok(());
        }

        info!(current = ?current, target, "payment.chain.switch");
        let switch = json!([{ "chainId": to_quantity(target as u128) }]);
        match self.wallet.request("wallet_switchEthereumChain", switch).await {
            Ok(_) => Ok(()),
            Err(e) if e.code == UNRECOGNIZED_CHAIN => {
                info!(target, chain = %self.cfg.chain.chain_name, "payment.chain.add");
                self.wallet
                    .request("wallet_addEthereumChain", Self::add_chain_params(&self.cfg.chain))
                    .await
                    .map(|_| ())
                    .map_err(|e| switch_error(target, e))
            }
            Err(e) => Err(switch_error(target, e)),
        }
    }

    async fn balance_of(&self, payer: &str) -> Result<u128, PaymentError> {
        let v = self.wallet.request("eth_getBalance", json!([payer, "latest"]))
            .await
            .map_err(rpc_error)?;
        parse_quantity(&v).ok_or_else(|| PaymentError::Rpc {
            code: INTERNAL_ERROR,
            message: format!("malformed balance {v}"),
        })
    }

    async fn estimate_gas(&self, tx: &Value) -> u128 {
        match self.wallet.request("eth_estimateGas", json!([tx])).await {
            Ok(v) => parse_quantity(&v).unwrap_or(self.cfg.default_gas as u128),
            Err(e) => {
                warn!(error = %e, fallback = self.cfg.default_gas, "payment.gas.estimate_failed");
                self.cfg.default_gas as u128
            }
        }
    }
}

fn rpc_error(e: RpcError) -> PaymentError {
    if e.code == USER_REJECTED {
        PaymentError::UserRejected
    } else {
        PaymentError::Rpc { code: e.code, message: e.message }
    }
}

fn switch_error(chain_id: u64, e: RpcError) -> PaymentError {
    if e.code == USER_REJECTED {
        PaymentError::UserRejected
    } else {
        PaymentError::ChainSwitch { chain_id, message: e.message }
    }
}

fn send_error(e: RpcError, required_wei: u128, available_wei: u128) -> PaymentError {
    if e.code == USER_REJECTED {
        return PaymentError::UserRejected;
    }
    if e.message.to_ascii_lowercase().contains("insufficient funds") {
        return PaymentError::InsufficientFunds { required_wei, available_wei };
    }
    if e.code == INTERNAL_ERROR {
        return PaymentError::BroadcastFailed(e.message);
    }
    PaymentError::Rpc { code: e.code, message: e.message }
}

#[async_trait]
impl<W: WalletProvider> PaymentProcessor for PaymentService<W> {
    async fn process_launch_payment(&self, payer: &str) -> Result<PaymentResult, PaymentError> {
        self.ensure_chain().await?;

        let treasury = self.cfg.treasury_wallet.as_str();
        if !is_address(treasury) {
            return Err(PaymentError::InvalidTreasury(treasury.to_string()));
        }

        let fee = self.cfg.launch_fee_wei;
        let required = fee.saturating_add(self.cfg.gas_buffer_wei);
        let available = self.balance_of(payer).await?;
        if available < required {
            warn!(
                payer, required = %format_ether(required), available = %format_ether(available),
                "payment.insufficient"
            );
            return Err(PaymentError::InsufficientFunds {
                required_wei: required,
                available_wei: available,
            });
        }

        let mut tx = json!({ "from": payer, "to": treasury, "value": to_quantity(fee) });
        let gas = self.estimate_gas(&tx).await;
        tx["gas"] = Value::String(to_quantity(gas));

        let hash = self.wallet.request("eth_sendTransaction", json!([tx]))
            .await
            .map_err(|e| send_error(e, required, available))?;
        let hash = hash.as_str().unwrap_or_default().to_string();
        if hash.is_empty() || hash == "0x" {
            return Err(PaymentError::BroadcastFailed("wallet returned no transaction hash".to_string()));
        }

        info!(payer, tx = %hash, fee = %self.cfg.launch_fee, "payment.sent");
        Ok(PaymentResult {
            success: true,
            transaction_hash: Some(hash),
            amount_paid: Some(self.cfg.launch_fee.clone()),
            error: None,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use std::sync::Mutex;

    const PAYER: &str = "0x5a12C4a5995F4585bDA7BE7ddda1A110e0b526Fc";

    /// Scripted wallet: answers per method, records every call in order
    struct MockWallet {
        calls: Mutex<Vec<(String, Value)>>,
        answers: HashMap<&'static str, Result<Value, RpcError>>,
        chain: Mutex<String>,
    }

    impl MockWallet {
        fn new(chain: &str) -> Self {
            let mut answers = HashMap::new();
            answers.insert("eth_getBalance", Ok(json!("0xde0b6b3a7640000"))); // 1 ether
            answers.insert("eth_estimateGas", Ok(json!("0x5300")));
            answers.insert("eth_sendTransaction", Ok(json!("0xfeed")));
            answers.insert("wallet_switchEthereumChain", Ok(Value::Null));
            answers.insert("wallet_addEthereumChain", Ok(Value::Null));
            Self { calls: Mutex::new(Vec::new()), answers, chain: Mutex::new(chain.to_string()) }
        }

        fn answer(mut self, method: &'static str, v: Result<Value, RpcError>) -> Self {
            self.answers.insert(method, v);
            self
        }

        fn methods(&self) -> Vec<String> {
            self.calls.lock().unwrap().iter().map(|(m, _)| m.clone()).collect()
        }

        fn params(&self, method: &str) -> Value {
            self.calls.lock().unwrap().iter()
                .find(|(m, _)| m == method)
                .map(|(_, p)| p.clone())
                .unwrap()
        }
    }

    #[async_trait]
    impl WalletProvider for MockWallet {
        async fn request(&self, method: &str, params: Value) -> Result<Value, RpcError> {
            self.calls.lock().unwrap().push((method.to_string(), params));
            if method == "eth_chainId" {
                return Ok(json!(self.chain.lock().unwrap().clone()));
            }
            let answer = self.answers.get(method).cloned().unwrap_or(Ok(Value::Null));
            if method == "wallet_switchEthereumChain" && answer.is_ok() {
                *self.chain.lock().unwrap() = "0x2105".to_string();
            }
            answer
        }
    }

    fn cfg() -> PaymentConfig {
        PaymentConfig {
            wallet_rpc_url: url::Url::parse("http://127.0.0.1:8545").unwrap(),
            treasury_wallet: "0xc0dca68EFdCC63aD109B301585b4b8E38cAe344e".to_string(),
            launch_fee: "0.001".to_string(),
            launch_fee_wei: parse_ether("0.001").unwrap(),
            gas_buffer_wei: parse_ether("0.001").unwrap(),
            default_gas: 21_000,
            chain: ChainConfig::default(),
        }
    }

    #[test]
    fn ether_parses_exactly() {
        assert_eq!(parse_ether("0.001").unwrap(), 1_000_000_000_000_000);
        assert_eq!(parse_ether("1").unwrap(), WEI_PER_ETHER);
        assert_eq!(parse_ether("1.5").unwrap(), 1_500_000_000_000_000_000);
        assert_eq!(parse_ether(".25").unwrap(), 250_000_000_000_000_000);
        assert_eq!(parse_ether("0.000000000000000001").unwrap(), 1);
        assert!(parse_ether("0.0000000000000000001").is_err());
        assert!(parse_ether("1e-3").is_err());
        assert!(parse_ether("").is_err());
        assert!(parse_ether(".").is_err());
        assert_eq!(format_ether(parse_ether("0.002").unwrap()), "0.002");
        assert_eq!(format_ether(3 * WEI_PER_ETHER), "3");
    }

    #[test]
    fn quantities_and_addresses() {
        assert_eq!(to_quantity(21_000), "0x5208");
        assert_eq!(parse_quantity(&json!("0x2105")), Some(8453));
        assert_eq!(parse_quantity(&json!("2105")), None);
        assert!(is_address(PAYER));
        assert!(!is_address("0x123"));
        assert!(!is_address("c0dca68EFdCC63aD109B301585b4b8E38cAe344e00"));
    }

    #[tokio::test]
    async fn pays_fee_on_the_right_chain_without_switching() {
        let service = PaymentService::new(MockWallet::new("0x2105"), &cfg());
        let result = service.process_launch_payment(PAYER).await.unwrap();

        assert!(result.success);
        assert_eq!(result.transaction_hash.as_deref(), Some("0xfeed"));
        assert_eq!(result.amount_paid.as_deref(), Some("0.001"));
        assert_eq!(service.wallet.methods(), vec![
            "eth_chainId", "eth_getBalance", "eth_estimateGas", "eth_sendTransaction",
        ]);

        let tx = &service.wallet.params("eth_sendTransaction")[0];
        assert_eq!(tx["value"], "0x38d7ea4c68000");
        assert_eq!(tx["gas"], "0x5300");
        assert_eq!(tx["to"], "0xc0dca68EFdCC63aD109B301585b4b8E38cAe344e");
    }

    #[tokio::test]
    async fn wrong_chain_switches_before_sending() {
        let service = PaymentService::new(MockWallet::new("0x1"), &cfg());
        service.process_launch_payment(PAYER).await.unwrap();

        let methods = service.wallet.methods();
        let switch = methods.iter().position(|m| m == "wallet_switchEthereumChain").unwrap();
        let send = methods.iter().position(|m| m == "eth_sendTransaction").unwrap();
        assert!(switch < send);
        assert_eq!(service.wallet.params("wallet_switchEthereumChain")[0]["chainId"], "0x2105");
    }

    #[tokio::test]
    async fn rejected_switch_sends_nothing() {
        let wallet = MockWallet::new("0x1").answer(
            "wallet_switchEthereumChain",
            Err(RpcError::new(USER_REJECTED, "User rejected the request.")),
        );
        let service = PaymentService::new(wallet, &cfg());
        let err = service.process_launch_payment(PAYER).await.unwrap_err();

        assert_eq!(err.cause(), "user-rejected");
        assert!(!service.wallet.methods().iter().any(|m| m == "eth_sendTransaction"));
    }

    #[tokio::test]
    async fn unknown_chain_is_added() {
        let wallet = MockWallet::new("0x1").answer(
            "wallet_switchEthereumChain",
            Err(RpcError::new(UNRECOGNIZED_CHAIN, "Unrecognized chain ID")),
        );
        let service = PaymentService::new(wallet, &cfg());
        service.process_launch_payment(PAYER).await.unwrap();

        let added = &service.wallet.params("wallet_addEthereumChain")[0];
        assert_eq!(added["chainName"], "Base");
        assert_eq!(added["nativeCurrency"]["decimals"], 18);
        assert_eq!(added["rpcUrls"][0], "https://mainnet.base.org");
    }

    #[tokio::test]
    async fn other_switch_failures_are_chain_switch_errors() {
        let wallet = MockWallet::new("0x1").answer(
            "wallet_switchEthereumChain",
            Err(RpcError::new(-32002, "request already pending")),
        );
        let err = PaymentService::new(wallet, &cfg())
            .process_launch_payment(PAYER).await.unwrap_err();
        assert!(matches!(err, PaymentError::ChainSwitch { chain_id: 8453, .. }));
    }

    #[tokio::test]
    async fn low_balance_stops_before_send() {
        // 0.0015 ether, under fee + buffer
        let wallet = MockWallet::new("0x2105").answer("eth_getBalance", Ok(json!("0x5543df729c000")));
        let service = PaymentService::new(wallet, &cfg());
        let err = service.process_launch_payment(PAYER).await.unwrap_err();

        assert_eq!(err, PaymentError::InsufficientFunds {
            required_wei: 2_000_000_000_000_000,
            available_wei: 1_500_000_000_000_000,
        });
        assert!(!service.wallet.methods().iter().any(|m| m == "eth_sendTransaction"));
    }

    #[tokio::test]
    async fn failed_estimate_falls_back_to_transfer_gas() {
        let wallet = MockWallet::new("0x2105")
            .answer("eth_estimateGas", Err(RpcError::new(-32000, "execution reverted")));
        let service = PaymentService::new(wallet, &cfg());
        service.process_launch_payment(PAYER).await.unwrap();
        assert_eq!(service.wallet.params("eth_sendTransaction")[0]["gas"], "0x5208");
    }

    #[tokio::test]
    async fn send_errors_keep_their_cause() {
        let cases = [
            (Err(RpcError::new(USER_REJECTED, "denied")), "user-rejected"),
            (Err(RpcError::new(INTERNAL_ERROR, "node down")), "broadcast-failure"),
            (Err(RpcError::new(-32000, "insufficient funds for gas * price + value")), "insufficient-funds"),
            (Err(RpcError::new(-32000, "nonce too low")), "rpc"),
            (Ok(json!("0x")), "broadcast-failure"),
            (Ok(json!("")), "broadcast-failure"),
        ];
        for (answer, cause) in cases {
            let wallet = MockWallet::new("0x2105").answer("eth_sendTransaction", answer);
            let err = PaymentService::new(wallet, &cfg())
                .process_launch_payment(PAYER).await.unwrap_err();
            assert_eq!(err.cause(), cause);
        }
    }

    #[tokio::test]
    async fn malformed_treasury_is_rejected() {
        let mut bad = cfg();
        bad.treasury_wallet = "0xnothex".to_string();
        let service = PaymentService::new(MockWallet::new("0x2105"), &bad);
        let err = service.process_launch_payment(PAYER).await.unwrap_err();
        assert!(matches!(err, PaymentError::InvalidTreasury(_)));
        assert!(!service.wallet.methods().iter().any(|m| m == "eth_getBalance"));
    }
}
