//!
//! src/config.rs  Oct 19th, 2026
//!
//! Loads every backend's configuration from the environment (.env honored)
//! and validates urls before any client is built
//!

use url::Url;
use std::time;

use crate::errors::UploaderError;
use crate::payment::parse_ether;

/// Constants for HTTP Config
pub const HTTP_TIMEOUT: u64 = 30000;
pub const HTTP_CONNECT_TIMEOUT: u64 = 5000;
pub const HTTP_POOL_MAX_IDLE: usize = 16;
pub const HTTP_POOL_IDLE_TIMEOUT: u64 = 90000;
pub const HTTP_MAX_REDIRECTS: u8 = 4;

pub const RETRY_MAX_ATTEMPTS: u8 = 3;
pub const RETRY_BASE_BACKOFF: u64 = 250;

/// Pinning deadlines: 2 minutes floor, 1 minute per MiB above it
pub const STORE_MIN_TIMEOUT: u64 = 120_000;
pub const STORE_TIMEOUT_PER_MB: u64 = 60_000;
pub const RESOLVE_TIMEOUT: u64 = 15_000;
pub const PROBE_TIMEOUT: u64 = 3_000;

pub const DEFAULT_GATEWAYS: [&str; 8] = [
    "https://ipfs.io/ipfs/",
    "https://gateway.ipfs.io/ipfs/",
    "https://gateway.pinata.cloud/ipfs/",
    "https://dweb.link/ipfs/",
    "https://4everland.io/ipfs/",
    "https://cf-ipfs.com/ipfs/",
    "https://w3s.link/ipfs/",
    "https://nftstorage.link/ipfs/",
];

const DEFAULT_TREASURY: &str = "0xc0dca68EFdCC63aD109B301585b4b8E38cAe344e";

/// Wrapper over env::var to return an invalid enviroment var error
fn env_check(s: &str) -> Result<String, UploaderError> {
    match std::env::var(s) {
        Ok(v) if !v.trim().is_empty() => Ok(v),
        _ => Err(UploaderError::Config(format!("{s} was not set"))),
    }
}

fn env_or(s: &str, default: &str) -> String {
    match std::env::var(s) {
        Ok(v) if !v.trim().is_empty() => v,
        _ => default.to_string(),
    }
}

fn env_parse<T: std::str::FromStr>(s: &str, default: T) -> T {
    match std::env::var(s) {
        Ok(v) => v.trim().parse::<T>().unwrap_or(default),
        Err(_) => default,
    }
}

fn env_list(s: &str) -> Vec<String> {
    std::env::var(s)
        .unwrap_or_default()
        .split(',')
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .map(str::to_string)
        .collect()
}

/// Ensures that url is https
fn ensure_https(url: &Url) -> Result<(), String> {
    if url.scheme() == "https" {
        Ok(())
    } else {
        Err(format!("URL must be https: {url}"))
    }
}

fn ensure_trailing_slash(url: &mut Url) {
    if !url.path().ends_with('/') {
        let mut path = url.path().to_string();
        path.push('/');
        url.set_path(&path);
    }
}

fn parse_base(var: &str, raw: &str) -> Result<Url, UploaderError> {
    let mut url = Url::parse(raw)
        .map_err(|e| UploaderError::Config(format!("{var} invalid {e}")))?;
    ensure_https(&url).map_err(UploaderError::Config)?;
    ensure_trailing_slash(&mut url);
    Ok(url)
}

///
/// Configuration for the pinning backend's REST api
///
#[derive(Clone)]
pub struct PinConfig {
    pub api_key: String,
    pub api_base: Url,      // https://api.quicknode.com/ipfs/rest/
    pub page_size: u32,     // default 100
    pub max_pages: u32,     // default 10
}

// api key stays out of debug output
impl std::fmt::Debug for PinConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PinConfig")
            .field("api_key", &"<redacted>")
            .field("api_base", &self.api_base.as_str())
            .field("page_size", &self.page_size)
            .field("max_pages", &self.max_pages)
            .finish()
    }
}

fn build_pin() -> Result<PinConfig, UploaderError> {
    let api_key  = env_check("PIN_API_KEY")?;
    let api_base = env_or("PIN_API_BASE", "https://api.quicknode.com/ipfs/rest/");
    let api_base = parse_base("PIN_API_BASE", &api_base)?;

    Ok( PinConfig {
        api_key,
        api_base,
        page_size: env_parse("PIN_PAGE_SIZE", 100),
        max_pages: env_parse("PIN_MAX_PAGES", 10),
    })
}

///
/// Gateways that serve pinned content; the first one is primary
///
#[derive(Debug, Clone)]
pub struct GatewayConfig {
    pub gateways: Vec<Url>,
    pub probe_timeout: time::Duration,
    pub resolve_timeout: time::Duration,
}

impl GatewayConfig {
    pub fn from_list<S: AsRef<str>>(list: &[S]) -> Result<Self, UploaderError> {
        let mut gateways: Vec<Url> = Vec::with_capacity(list.len());
        for raw in list {
            let url = parse_base("IPFS_GATEWAYS", raw.as_ref())?;
            if !gateways.contains(&url) {
                gateways.push(url);
            }
        }
        if gateways.is_empty() {
            return Err(UploaderError::Config("no ipfs gateways configured".to_string()));
        }
        Ok( Self {
            gateways,
            probe_timeout: time::Duration::from_millis(PROBE_TIMEOUT),
            resolve_timeout: time::Duration::from_millis(RESOLVE_TIMEOUT),
        })
    }
}

fn build_gateways() -> Result<GatewayConfig, UploaderError> {
    let list = env_list("IPFS_GATEWAYS");
    if list.is_empty() {
        GatewayConfig::from_list(&DEFAULT_GATEWAYS)
    } else {
        GatewayConfig::from_list(&list)
    }
}

///
/// Credentials for the fingerprinting service
///
#[derive(Clone)]
pub struct CopyrightConfig {
    pub host: String,
    pub access_key: String,
    pub access_secret: String,
    pub sample_bytes: usize,   // default 1 MiB
    pub block_threshold: u32,  // default 80
}

impl std::fmt::Debug for CopyrightConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CopyrightConfig")
            .field("host", &self.host)
            .field("access_key", &self.access_key)
            .field("access_secret", &"<redacted>")
            .field("sample_bytes", &self.sample_bytes)
            .field("block_threshold", &self.block_threshold)
            .finish()
    }
}

/// Credentials are optional here; only the launch path needs them
fn build_copyright() -> Option<CopyrightConfig> {
    let access_key    = env_check("ACRCLOUD_ACCESS_KEY").ok()?;
    let access_secret = env_check("ACRCLOUD_ACCESS_SECRET").ok()?;

    Some( CopyrightConfig {
        host: env_or("ACRCLOUD_HOST", "identify-us-west-2.acrcloud.com"),
        access_key,
        access_secret,
        sample_bytes: 1024 * 1024,
        block_threshold: block_threshold(),
    })
}

fn block_threshold() -> u32 {
    env_parse("COPYRIGHT_BLOCK_THRESHOLD", 80_u32).min(100)
}

///
/// Chain the launch fee is paid on, as the wallet needs it to add the network
///
#[derive(Debug, Clone)]
pub struct ChainConfig {
    pub chain_id: u64,
    pub chain_name: String,
    pub rpc_url: String,
    pub explorer_url: String,
    pub currency_symbol: String,
}

impl Default for ChainConfig {
    fn default() -> Self {
        Self {
            chain_id: 8453,
            chain_name: "Base".to_string(),
            rpc_url: "https://mainnet.base.org".to_string(),
            explorer_url: "https://basescan.org".to_string(),
            currency_symbol: "ETH".to_string(),
        }
    }
}

#[derive(Debug, Clone)]
pub struct PaymentConfig {
    pub wallet_rpc_url: Url,
    pub treasury_wallet: String,
    pub launch_fee: String,     // decimal ether, shown to the user
    pub launch_fee_wei: u128,
    pub gas_buffer_wei: u128,
    pub default_gas: u64,       // 21000 for a plain transfer
    pub chain: ChainConfig,
}

fn build_payment() -> Result<PaymentConfig, UploaderError> {
    let wallet_rpc_url = env_or("WALLET_RPC_URL", "http://127.0.0.1:8545");
    let wallet_rpc_url = Url::parse(&wallet_rpc_url)
        .map_err(|e| UploaderError::Config(format!("WALLET_RPC_URL invalid {e}")))?;

    let launch_fee = env_or("LAUNCH_FEE_ETH", "0.001");
    let launch_fee_wei = parse_ether(&launch_fee)
        .map_err(|e| UploaderError::Config(format!("LAUNCH_FEE_ETH {e}")))?;
    let gas_buffer_wei = parse_ether(&env_or("GAS_BUFFER_ETH", "0.001"))
        .map_err(|e| UploaderError::Config(format!("GAS_BUFFER_ETH {e}")))?;

    let defaults = ChainConfig::default();
    let chain = ChainConfig {
        chain_id: env_parse("TARGET_CHAIN_ID", defaults.chain_id),
        chain_name: env_or("TARGET_CHAIN_NAME", &defaults.chain_name),
        rpc_url: env_or("TARGET_CHAIN_RPC", &defaults.rpc_url),
        explorer_url: env_or("TARGET_CHAIN_EXPLORER", &defaults.explorer_url),
        currency_symbol: defaults.currency_symbol,
    };

    Ok( PaymentConfig {
        wallet_rpc_url,
        treasury_wallet: env_or("TREASURY_WALLET", DEFAULT_TREASURY),
        launch_fee,
        launch_fee_wei,
        gas_buffer_wei,
        default_gas: 21_000,
        chain,
    })
}

///
/// Who may upload for free and how the orchestrator reports progress
///
#[derive(Debug, Clone)]
pub struct UploadPolicy {
    pub verified_wallets: Vec<String>,
    pub copyright_threshold: u32,
    pub status_lines: usize,
}

impl UploadPolicy {
    pub fn is_verified(&self, wallet: &str) -> bool {
        self.verified_wallets.iter().any(|w| w.eq_ignore_ascii_case(wallet))
    }
}

impl Default for UploadPolicy {
    fn default() -> Self {
        Self {
            verified_wallets: Vec::new(),
            copyright_threshold: 80,
            status_lines: 5,
        }
    }
}

fn build_policy() -> UploadPolicy {
    UploadPolicy {
        verified_wallets: env_list("VERIFIED_WALLETS"),
        copyright_threshold: block_threshold(),
        status_lines: env_parse("STATUS_LOG_LINES", 5_usize).max(1),
    }
}

///
/// Configuration for Http timeouts, retries, etc.
///
#[derive(Debug, Clone)]
pub struct RetryConfig {
    pub max_attempts: u8,
    pub base_backoff: time::Duration,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: RETRY_MAX_ATTEMPTS,
            base_backoff: time::Duration::from_millis(RETRY_BASE_BACKOFF),
        }
    }
}

#[derive(Debug, Clone)]
pub struct HttpConfig {
    pub timeout: time::Duration,
    pub connect_timeout: time::Duration,
    pub pool_max_idle_per_host: usize,
    pub pool_idle_timeout: time::Duration,
    pub max_redirects: u8,
    pub retry: RetryConfig
}

impl Default for HttpConfig {
    fn default() -> Self {
        Self {
            timeout: time::Duration::from_millis(HTTP_TIMEOUT),
            connect_timeout: time::Duration::from_millis(HTTP_CONNECT_TIMEOUT),
            pool_max_idle_per_host: HTTP_POOL_MAX_IDLE,
            pool_idle_timeout: time::Duration::from_millis(HTTP_POOL_IDLE_TIMEOUT),
            max_redirects: HTTP_MAX_REDIRECTS,
            retry: RetryConfig::default()
        }
    }
}

///
/// Configuration for Logger
///

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogFormat {
    Pretty,
    Json
}

#[derive(Debug, Clone)]
pub struct LoggingConfig {
    pub filter_directives: String,
    pub format: LogFormat,
    pub with_ansi: bool,
    pub include_file_line: bool,
    pub include_target: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            filter_directives: "info,track_uploader=debug,reqwest=warn".to_string(),
            format: LogFormat::Json,
            with_ansi: true,
            include_file_line: true,
            include_target: true,
        }
    }
}

fn build_logging() -> LoggingConfig {
    let format = match env_or("LOG_FORMAT", "json").to_ascii_lowercase().as_str() {
        "pretty" => LogFormat::Pretty,
        _ => LogFormat::Json,
    };
    LoggingConfig { format, ..LoggingConfig::default() }
}

///
/// AppConfig which holds everything the clients and orchestrator need
///
#[derive(Debug, Clone)]
pub struct AppConfig {
    pub pin: PinConfig,
    pub gateway: GatewayConfig,
    pub copyright: Option<CopyrightConfig>,
    pub payment: PaymentConfig,
    pub policy: UploadPolicy,
    pub http: HttpConfig,
    pub logging: LoggingConfig
}

///
/// Return all environment variables to caller at program start.
///
pub fn load_config() -> Result<AppConfig, UploaderError> {
    dotenvy::dotenv().ok();

    let pin       = build_pin()?;
    let gateway   = build_gateways()?;
    let copyright = build_copyright();
    let payment   = build_payment()?;
    let policy    = build_policy();
    let http      = HttpConfig::default();
    let logging   = build_logging();

    Ok( AppConfig { pin, gateway, copyright, payment, policy, http, logging } )
}
