//! chunkbridge 백엔드 - UDP 리소스 저장소
//!
//! stop-and-wait 전송으로 리소스를 저장/제공하는 UDP 서비스
//! - 피어 주소별 세션, 세션당 태스크 하나
//! - 디렉터리 기반 저장소
//!
//! 사용법:
//!   cargo run --release --bin chunkbridge-backend -- [OPTIONS]
//!
//! 예시:
//!   # 기본 포트(41000), ./store 디렉터리
//!   cargo run --release --bin chunkbridge-backend -- --root ./store
//!
//!   # 손실이 많은 네트워크용 설정 파일
//!   cargo run --release --bin chunkbridge-backend -- --config lossy.toml

use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use tokio::net::UdpSocket;
use tracing::info;
use tracing_subscriber::{EnvFilter, FmtSubscriber};

use chunkbridge::{Backend, Config, FsStore, DEFAULT_BACKEND_PORT};

/// chunkbridge 백엔드
#[derive(Parser, Debug)]
#[command(name = "chunkbridge-backend", version, about)]
struct Args {
    /// UDP 바인드 주소
    #[arg(short, long, default_value_t = SocketAddr::from(([0, 0, 0, 0], DEFAULT_BACKEND_PORT)))]
    bind: SocketAddr,

    /// 리소스 저장 디렉터리
    #[arg(short, long, env = "CHUNKBRIDGE_ROOT", default_value = "store")]
    root: PathBuf,

    /// TOML 설정 파일
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// 청크 크기 (1 ~ 1024)
    #[arg(long)]
    chunk_size: Option<usize>,

    /// 청크당 최대 재전송 횟수
    #[arg(long)]
    max_retries: Option<u32>,
}

fn load_config(args: &Args) -> Result<Config> {
    let mut config = match &args.config {
        Some(path) => Config::load(path)
            .with_context(|| format!("failed to load config {}", path.display()))?,
        None => Config::default(),
    };
    if let Some(chunk_size) = args.chunk_size {
        config.max_chunk_size = chunk_size;
    }
    if let Some(max_retries) = args.max_retries {
        config.max_retries = max_retries;
    }
    config.validate()?;
    Ok(config)
}

#[tokio::main]
async fn main() -> Result<()> {
    // 로깅 설정 (RUST_LOG, 기본 info)
    let subscriber = FmtSubscriber::builder()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .finish();
    tracing::subscriber::set_global_default(subscriber)?;

    let args = Args::parse();
    let config = load_config(&args)?;

    tokio::fs::create_dir_all(&args.root)
        .await
        .with_context(|| format!("failed to create store directory {}", args.root.display()))?;

    info!("chunkbridge backend starting...");
    info!("Store root: {}", args.root.display());
    info!("Chunk size: {} bytes", config.max_chunk_size);
    info!(
        "Ack timeout: {}ms, max retries: {}",
        config.ack_timeout_ms, config.max_retries
    );

    let socket = Arc::new(
        UdpSocket::bind(args.bind)
            .await
            .with_context(|| format!("failed to bind {}", args.bind))?,
    );
    info!("Backend listening on {}", socket.local_addr()?);

    let backend = Backend::new(config, Arc::new(FsStore::new(args.root.clone())))?;

    tokio::select! {
        result = backend.clone().run(socket) => result?,
        _ = tokio::signal::ctrl_c() => {
            let stats = backend.stats();
            info!("Shutting down");
            info!("  Sessions completed: {}", stats.sessions_completed);
            info!("  Sessions failed: {}", stats.sessions_failed);
            info!("  Not found: {}", stats.not_found);
            info!("  Bytes stored: {}", stats.bytes_stored);
            info!("  Bytes served: {}", stats.bytes_served);
        }
    }

    Ok(())
}
