//!
//! src/main.rs  Oct 19th, 2026
//!
//! Command line entry point: wires config, logging and the backend clients
//! into the upload orchestrator, track discovery and gateway fallback.
//! Live testbenches for the real backends sit at the bottom.
//!

mod config;
mod errors;
mod logging;

mod copyright;
mod fetch;
mod gateway;
mod library;
mod payment;
mod pin;
mod playback;
mod status;
mod types;
mod upload;

use std::path::PathBuf;
use std::sync::Arc;

use clap::{Args, Parser, Subcommand};

use crate::config::AppConfig;
use crate::copyright::AcrCloudClient;
use crate::errors::UploaderError;
use crate::gateway::{GatewayProbe, GatewayResolver};
use crate::payment::{HttpWalletProvider, PaymentService};
use crate::pin::{PinClient, PinStore};
use crate::playback::PlaybackController;
use crate::types::{MediaFile, MusicMetadata};
use crate::upload::{Orchestrator, UploadPath, UploadRequest};

/// Upload music to IPFS and play it back through public gateways
#[derive(Parser, Debug)]
#[command(author, version, about)]
struct Cli {
    #[command(subcommand)]
    cmd: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Free upload for a verified wallet
    Upload(UploadArgs),
    /// Fee-based upload: copyright check, launch fee, then upload
    Launch(UploadArgs),
    /// List tracks rebuilt from pinned metadata, newest first
    Tracks {
        #[arg(long)]
        owner: Option<String>,
    },
    /// Print the metadata document stored under a content id
    Resolve { cid: String },
    /// Download through the gateway fallback chain
    Fetch {
        source: String,
        #[arg(short, long)]
        output: PathBuf,
        /// Once every gateway fails, recheck them all and retry from the first live one
        #[arg(long)]
        retry: bool,
    },
    /// Probe every gateway for a content id
    Probe { source: String },
    /// Check pinning and fingerprint service connectivity
    Status,
}

#[derive(Args, Debug)]
struct UploadArgs {
    /// Audio file to upload
    audio: PathBuf,
    #[arg(long)]
    title: String,
    #[arg(long)]
    artist: String,
    #[arg(long)]
    ticker: String,
    #[arg(long)]
    description: String,
    #[arg(long)]
    album: Option<String>,
    #[arg(long)]
    genre: Option<String>,
    #[arg(long)]
    release_date: Option<String>,
    /// Cover image, uploaded best effort
    #[arg(long)]
    cover: Option<PathBuf>,
    /// Connected wallet address, recorded as owner
    #[arg(long, env = "UPLOADER_WALLET")]
    wallet: String,
    /// Retry the metadata step once if it fails after the audio is pinned
    #[arg(long)]
    resume: bool,
}

impl UploadArgs {
    async fn into_request(self, path: UploadPath) -> Result<UploadRequest, UploaderError> {
        let audio = MediaFile::from_path(&self.audio).await?;
        let cover = match &self.cover {
            Some(p) => Some(MediaFile::from_path(p).await?),
            None => None,
        };
        Ok( UploadRequest {
            audio: Some(audio),
            cover,
            metadata: MusicMetadata {
                title: self.title,
                artist: self.artist,
                ticker: self.ticker,
                description: self.description,
                album: self.album,
                genre: self.genre,
                release_date: self.release_date,
            },
            wallet: Some(self.wallet),
            path,
        })
    }
}

fn pin_client(cfgs: &AppConfig, resolver: &GatewayResolver) -> Result<PinClient, UploaderError> {
    PinClient::new(&cfgs.http, &cfgs.pin, resolver.clone())
}

fn orchestrator(cfgs: &AppConfig, resolver: &GatewayResolver, path: UploadPath)
    -> Result<Orchestrator, UploaderError> {
    let pins = Arc::new(pin_client(cfgs, resolver)?);
    let orchestrator = Orchestrator::new(pins, resolver.clone(), cfgs.policy.clone());
    if path == UploadPath::Verified {
        return Ok(orchestrator);
    }

    let copyright = cfgs.copyright.as_ref()
        .ok_or_else(|| UploaderError::Config(
            "ACRCLOUD_ACCESS_KEY and ACRCLOUD_ACCESS_SECRET are required to launch".to_string()
        ))?;
    let checker = AcrCloudClient::new(&cfgs.http, copyright)?;
    let wallet = HttpWalletProvider::new(&cfgs.http, &cfgs.payment.wallet_rpc_url)?;
    let payment = PaymentService::new(wallet, &cfgs.payment);

    Ok(orchestrator
        .with_copyright(Arc::new(checker))
        .with_payment(Arc::new(payment)))
}

async fn run_upload(cfgs: &AppConfig, args: UploadArgs, path: UploadPath) -> Result<(), UploaderError> {
    let resolver = GatewayResolver::new(&cfgs.gateway, &cfgs.http)?;
    let orchestrator = orchestrator(cfgs, &resolver, path)?;
    let resume = args.resume;
    let request = args.into_request(path).await?;

    let mut attempt = orchestrator.begin();
    let outcome = orchestrator.run(&request, &mut attempt).await;
    println!("{}", attempt.log);

    let result = match outcome {
        Ok(result) => result,
        Err(e) => match e.pinned_audio() {
            Some(pinned) if resume => {
                let mut retry = orchestrator.begin();
                let outcome = orchestrator.resume(&request, pinned, &mut retry).await;
                println!("{}", retry.log);
                outcome?
            }
            Some(pinned) => {
                eprintln!("audio is pinned at {}; rerun with --resume to retry metadata", pinned.audio.url);
                return Err(e);
            }
            None => {
                if attempt.requires_new_file {
                    eprintln!("choose a different audio file");
                }
                return Err(e);
            }
        },
    };

    println!("{}", serde_json::to_string_pretty(&result)?);
    Ok(())
}

fn cid_of(source: &str) -> Result<types::Cid, UploaderError> {
    gateway::extract_cid(source)
        .cid()
        .ok_or_else(|| UploaderError::Precondition(
            format!("{source} is not an ipfs content id or gateway url")
        ))
}

#[tokio::main]
async fn main() -> Result<(), UploaderError> {
    let cli  = Cli::parse();
    let cfgs = config::load_config()?;
    let _guard = logging::init_logging(&cfgs.logging)?;

    tracing::info!(
        service="track-uploader",
        version=%env!("CARGO_PKG_VERSION"),
        "starting"
    );

    match cli.cmd {
        Command::Upload(args) => run_upload(&cfgs, args, UploadPath::Verified).await?,
        Command::Launch(args) => run_upload(&cfgs, args, UploadPath::Launch).await?,
        Command::Tracks { owner } => {
            let resolver = GatewayResolver::new(&cfgs.gateway, &cfgs.http)?;
            let pins = pin_client(&cfgs, &resolver)?;
            let tracks = library::discover_tracks(&pins, owner.as_deref()).await?;
            println!("{}", serde_json::to_string_pretty(&tracks)?);
        }
        Command::Resolve { cid } => {
            let resolver = GatewayResolver::new(&cfgs.gateway, &cfgs.http)?;
            let pins = pin_client(&cfgs, &resolver)?;
            let doc = pins.resolve(&cid_of(&cid)?).await?;
            println!("{}", serde_json::to_string_pretty(&doc)?);
        }
        Command::Fetch { source, output, retry } => {
            let resolver = GatewayResolver::new(&cfgs.gateway, &cfgs.http)?;
            let mut controller = PlaybackController::new(&source, &resolver)?;
            let liveness = retry.then_some(&resolver as &dyn GatewayProbe);
            let bytes = controller.download_with_retry(resolver.http(), liveness).await?;
            tokio::fs::write(&output, &bytes).await?;
            println!(
                "wrote {} bytes to {} from {} ({} of {} gateways tried)",
                bytes.len(), output.display(), controller.current_url(),
                controller.attempted().len(), controller.candidates().len()
            );
        }
        Command::Probe { source } => {
            let resolver = GatewayResolver::new(&cfgs.gateway, &cfgs.http)?;
            for (url, live) in resolver.probe_all(&cid_of(&source)?).await {
                println!("{} {url}", if live { "live" } else { "down" });
            }
        }
        Command::Status => {
            let resolver = GatewayResolver::new(&cfgs.gateway, &cfgs.http)?;
            pin_client(&cfgs, &resolver)?.test_connection().await?;
            println!("pinning: ok");
            match &cfgs.copyright {
                Some(c) => {
                    AcrCloudClient::new(&cfgs.http, c)?.test_connection().await?;
                    println!("copyright: ok");
                }
                None => println!("copyright: not configured"),
            }
        }
    }

    Ok(())
}

/// Live testbenches against the configured backends
#[cfg(test)]
mod tests {
    use super::*;

    // "Big Buck Bunny" directory, pinned widely
    const WELL_KNOWN: &str = "QmVLDAhCY3X9P2uRudKAryuQFPM5zqA3Yij1dY8FpGbL7T";

    fn live() -> bool {
        std::env::var("LIVE_HTTP").ok().as_deref() == Some("1")
    }

    #[test]
    fn cli_parses_upload_arguments() {
        let cli = Cli::try_parse_from([
            "track-uploader", "launch", "song.mp3",
            "--title", "Neon Nights", "--artist", "Synth Master",
            "--ticker", "NEON", "--description", "synthwave",
            "--cover", "art.png", "--wallet", "0xabc", "--resume",
        ]).unwrap();

        let Command::Launch(args) = cli.cmd else {
            panic!("expected launch");
        };
        assert_eq!(args.audio, PathBuf::from("song.mp3"));
        assert_eq!(args.cover, Some(PathBuf::from("art.png")));
        assert!(args.resume);
        assert!(args.album.is_none());
    }

    #[test]
    fn cli_parses_fetch_retry_flag() {
        let cli = Cli::try_parse_from([
            "track-uploader", "fetch", WELL_KNOWN, "-o", "song.mp3", "--retry",
        ]).unwrap();
        let Command::Fetch { source, output, retry } = cli.cmd else {
            panic!("expected fetch");
        };
        assert_eq!(source, WELL_KNOWN);
        assert_eq!(output, PathBuf::from("song.mp3"));
        assert!(retry);

        let cli = Cli::try_parse_from(["track-uploader", "fetch", WELL_KNOWN, "-o", "x"]).unwrap();
        assert!(matches!(cli.cmd, Command::Fetch { retry: false, .. }));
    }

    #[test]
    fn cid_of_rejects_plain_urls() {
        assert!(cid_of(&format!("ipfs://{WELL_KNOWN}")).is_ok());
        assert!(matches!(
            cid_of("https://example.com/song.mp3"),
            Err(UploaderError::Precondition(_))
        ));
    }

    #[tokio::test]
    #[allow(dead_code)]
    async fn pin_connection_testbench() -> Result<(), UploaderError> {
        dotenvy::dotenv().ok();
        if !live() {
            eprintln!("Set LIVE_HTTP=1 to run");
            return Ok(())
        }

        let cfgs = config::load_config()?;
        let resolver = GatewayResolver::new(&cfgs.gateway, &cfgs.http)?;
        let pins = pin_client(&cfgs, &resolver)?;
        pins.test_connection().await?;

        let records = pins.list_by_owner("").await?;
        println!("pins: {}", records.len());
        Ok(())
    }

    #[tokio::test]
    #[allow(dead_code)]
    async fn gateway_probe_testbench() -> Result<(), UploaderError> {
        dotenvy::dotenv().ok();
        if !live() {
            eprintln!("Set LIVE_HTTP=1 to run");
            return Ok(())
        }

        let cfgs = config::load_config()?;
        let resolver = GatewayResolver::new(&cfgs.gateway, &cfgs.http)?;
        let results = resolver.probe_all(&cid_of(WELL_KNOWN)?).await;
        for (url, live) in &results {
            println!("{live} {url}");
        }
        assert!(results.iter().any(|(_, live)| *live));

        let mut controller = PlaybackController::new(WELL_KNOWN, &resolver)?;
        let adopted = controller.retry(&resolver as &dyn GatewayProbe).await?;
        println!("adopted: {adopted}");
        Ok(())
    }

    #[tokio::test]
    #[allow(dead_code)]
    async fn store_and_resolve_testbench() -> Result<(), UploaderError> {
        dotenvy::dotenv().ok();
        if !live() {
            eprintln!("Set LIVE_HTTP=1 to run");
            return Ok(())
        }

        let cfgs = config::load_config()?;
        let resolver = GatewayResolver::new(&cfgs.gateway, &cfgs.http)?;
        let pins = pin_client(&cfgs, &resolver)?;

        let key = format!("metadata-{}.json", chrono::Utc::now().timestamp_millis());
        let body = serde_json::json!({ "title": "testbench", "artist": "track-uploader" });
        let cid = pins.store(serde_json::to_vec(&body)?, "application/json", &key).await?;
        println!("stored {key} as {cid}");

        let doc = pins.resolve(&cid).await?;
        assert_eq!(doc["title"], "testbench");
        Ok(())
    }

    #[tokio::test]
    #[allow(dead_code)]
    async fn fetch_fallback_testbench() -> Result<(), UploaderError> {
        dotenvy::dotenv().ok();
        if !live() {
            eprintln!("Set LIVE_HTTP=1 to run");
            return Ok(())
        }

        let cfgs = config::load_config()?;
        let resolver = GatewayResolver::new(&cfgs.gateway, &cfgs.http)?;
        let mut controller = PlaybackController::new(
            &format!("https://ipfs.io/ipfs/{WELL_KNOWN}"), &resolver
        )?;
        let bytes = controller.download_with_retry(resolver.http(), Some(&resolver as &dyn GatewayProbe)).await?;

        let dir = tempfile::tempdir()?;
        let out = dir.path().join("object.bin");
        tokio::fs::write(&out, &bytes).await?;
        println!("{} bytes via {:?}", bytes.len(), controller.attempted());
        Ok(())
    }
}
