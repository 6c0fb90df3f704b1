//! chunkbridge 게이트웨이 - HTTP -> UDP 전송 브리지
//!
//! HTTP 요청을 백엔드 전송 세션으로 변환
//! - 바이너리(image/*) 요청: 백엔드와 stop-and-wait 전송
//! - 그 외: 로컬 디렉터리 직접 읽기/쓰기
//!
//! 사용법:
//!   cargo run --release --bin chunkbridge-gateway -- --backend <HOST:PORT> [OPTIONS]
//!
//! 예시:
//!   cargo run --release --bin chunkbridge-gateway -- --backend 127.0.0.1:41000
//!   curl -X POST --data-binary @cat.png -H 'Content-Type: image/png' localhost:40000/cat.png

use std::net::{IpAddr, SocketAddr};
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use tokio::net::{lookup_host, TcpListener};
use tracing::info;
use tracing_subscriber::{EnvFilter, FmtSubscriber};

use chunkbridge::{Config, FsStore, Gateway, DEFAULT_BACKEND_PORT, DEFAULT_GATEWAY_PORT};

/// chunkbridge 게이트웨이
#[derive(Parser, Debug)]
#[command(name = "chunkbridge-gateway", version, about)]
struct Args {
    /// TCP 바인드 주소
    #[arg(short, long, default_value_t = SocketAddr::from(([0, 0, 0, 0], DEFAULT_GATEWAY_PORT)))]
    bind: SocketAddr,

    /// 백엔드 주소 (HOST 또는 HOST:PORT)
    #[arg(long, env = "CHUNKBRIDGE_BACKEND", default_value = "127.0.0.1")]
    backend: String,

    /// 비바이너리 리소스 저장 디렉터리
    #[arg(short, long, default_value = ".")]
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

/// 포트가 없으면 기본 백엔드 포트 사용
async fn resolve_backend(backend: &str) -> Result<SocketAddr> {
    if let Ok(addr) = backend.parse::<SocketAddr>() {
        return Ok(addr);
    }
    if let Ok(ip) = backend.parse::<IpAddr>() {
        return Ok(SocketAddr::new(ip, DEFAULT_BACKEND_PORT));
    }

    let target = if backend.contains(':') {
        backend.to_string()
    } else {
        format!("{backend}:{DEFAULT_BACKEND_PORT}")
    };
    let addr = lookup_host(target.as_str())
        .await
        .with_context(|| format!("failed to resolve backend {target}"))?
        .next()
        .with_context(|| format!("no address for backend {target}"));
    addr
}

#[tokio::main]
async fn main() -> Result<()> {
    let subscriber = FmtSubscriber::builder()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .finish();
    tracing::subscriber::set_global_default(subscriber)?;

    let args = Args::parse();
    let config = load_config(&args)?;
    let backend_addr = resolve_backend(&args.backend).await?;

    info!("chunkbridge gateway starting...");
    info!("Backend: {}", backend_addr);
    info!("Local root: {}", args.root.display());
    info!("Binary types: {:?}", config.binary_types);

    let listener = TcpListener::bind(args.bind)
        .await
        .with_context(|| format!("failed to bind {}", args.bind))?;
    info!("Gateway listening on {}", listener.local_addr()?);

    let gateway = Gateway::new(config, backend_addr, Arc::new(FsStore::new(args.root)))?;

    tokio::select! {
        result = gateway.run(listener) => result?,
        _ = tokio::signal::ctrl_c() => info!("Shutting down"),
    }

    Ok(())
}
