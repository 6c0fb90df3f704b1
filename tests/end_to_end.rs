//! 루프백 UDP/TCP 위에서 백엔드 + 게이트웨이 전체 흐름 테스트

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;
use tempfile::TempDir;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream, UdpSocket};

use chunkbridge::initiator::Initiator;
use chunkbridge::{Backend, Config, Error, FsStore, Gateway, MemoryStore};

fn config() -> Config {
    Config {
        linger_ms: 200,
        ..Config::low_latency()
    }
}

fn image(len: usize) -> Bytes {
    (0..len).map(|i| (i * 17 % 256) as u8).collect::<Vec<u8>>().into()
}

async fn start_backend(store: Arc<MemoryStore>) -> (Backend, SocketAddr) {
    let socket = Arc::new(UdpSocket::bind("127.0.0.1:0").await.unwrap());
    let addr = socket.local_addr().unwrap();
    let backend = Backend::new(config(), store).unwrap();
    tokio::spawn(backend.clone().run(socket));
    (backend, addr)
}

async fn start_gateway(backend_addr: SocketAddr, local_root: &std::path::Path) -> SocketAddr {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let local_store = Arc::new(FsStore::new(local_root));
    let gateway = Gateway::new(config(), backend_addr, local_store).unwrap();
    tokio::spawn(gateway.run(listener));
    addr
}

/// 요청 하나 보내고 연결이 닫힐 때까지 응답 읽기. 응답 헤드는 소문자로.
async fn http(addr: SocketAddr, head: &str, body: &[u8]) -> (String, Vec<u8>) {
    let mut stream = TcpStream::connect(addr).await.unwrap();
    stream.write_all(head.as_bytes()).await.unwrap();
    stream.write_all(body).await.unwrap();

    let mut raw = Vec::new();
    tokio::time::timeout(Duration::from_secs(10), stream.read_to_end(&mut raw))
        .await
        .unwrap()
        .unwrap();
    split_response(&raw)
}

fn split_response(raw: &[u8]) -> (String, Vec<u8>) {
    let end = raw
        .windows(4)
        .position(|w| w == b"\r\n\r\n")
        .expect("response head");
    let head = String::from_utf8(raw[..end].to_vec()).unwrap().to_ascii_lowercase();
    (head, raw[end + 4..].to_vec())
}

#[tokio::test]
async fn test_store_then_fetch_photo() {
    let store = Arc::new(MemoryStore::new());
    let (backend, addr) = start_backend(store.clone()).await;
    let initiator = Initiator::new(config(), addr).unwrap();
    let photo = image(2500);

    let stats = initiator.store("photo.bin", photo.clone()).await.unwrap();
    assert_eq!(stats.total_chunks, 3);
    assert_eq!(stats.total_bytes, 2500);
    assert_eq!(store.get("photo.bin").unwrap(), photo);

    let fetched = initiator.fetch("photo.bin").await.unwrap();
    assert_eq!(fetched, photo);

    tokio::time::sleep(Duration::from_millis(400)).await;
    let stats = backend.stats();
    assert_eq!(stats.bytes_stored, 2500);
    assert_eq!(stats.bytes_served, 2500);
}

#[tokio::test]
async fn test_fetch_missing_resource() {
    let (backend, addr) = start_backend(Arc::new(MemoryStore::new())).await;
    let initiator = Initiator::new(config(), addr).unwrap();

    let err = initiator.fetch("missing.png").await.unwrap_err();
    assert!(matches!(err, Error::ResourceNotFound { .. }));

    tokio::time::sleep(Duration::from_millis(50)).await;
    assert_eq!(backend.stats().not_found, 1);
}

#[tokio::test]
async fn test_empty_resource_roundtrip() {
    let store = Arc::new(MemoryStore::new());
    let (_backend, addr) = start_backend(store.clone()).await;
    let initiator = Initiator::new(config(), addr).unwrap();

    initiator.store("empty.png", Bytes::new()).await.unwrap();
    assert!(store.get("empty.png").unwrap().is_empty());

    let fetched = initiator.fetch("empty.png").await.unwrap();
    assert!(fetched.is_empty());
}

#[tokio::test]
async fn test_concurrent_transfers() {
    let store = Arc::new(MemoryStore::new());
    let (_backend, addr) = start_backend(store.clone()).await;

    let tasks: Vec<_> = (0..4)
        .map(|i| {
            let initiator = Initiator::new(config(), addr).unwrap();
            tokio::spawn(async move {
                let name = format!("img-{i}.png");
                let data = image(1000 + i * 1500);
                initiator.store(&name, data.clone()).await.unwrap();
                (name, data)
            })
        })
        .collect();

    for task in tasks {
        let (name, data) = task.await.unwrap();
        assert_eq!(store.get(&name).unwrap(), data);
    }
}

#[tokio::test]
async fn test_gateway_image_roundtrip() {
    let store = Arc::new(MemoryStore::new());
    let (_backend, backend_addr) = start_backend(store.clone()).await;
    let local = TempDir::new().unwrap();
    let gateway = start_gateway(backend_addr, local.path()).await;
    let photo = image(3000);

    let head = format!(
        "POST /cat.png HTTP/1.1\r\nHost: test\r\nContent-Type: image/png\r\nContent-Length: {}\r\n\r\n",
        photo.len()
    );
    let (status, _) = http(gateway, &head, &photo).await;
    assert!(status.starts_with("http/1.1 201 created"), "{status}");
    assert_eq!(store.get("cat.png").unwrap(), photo);
    // 이미지는 게이트웨이 로컬에 저장되지 않음
    assert!(!local.path().join("cat.png").exists());

    let (status, body) = http(gateway, "GET /cat.png HTTP/1.1\r\nContent-Type: image/png\r\n\r\n", b"").await;
    assert!(status.starts_with("http/1.1 200 ok"), "{status}");
    assert!(status.contains("content-length: 3000"));
    assert_eq!(body, photo.to_vec());

    let (status, _) = http(gateway, "GET /nope.png HTTP/1.1\r\n\r\n", b"").await;
    assert!(status.starts_with("http/1.1 404 not found"), "{status}");
}

#[tokio::test]
async fn test_gateway_expect_continue() {
    let store = Arc::new(MemoryStore::new());
    let (_backend, backend_addr) = start_backend(store.clone()).await;
    let local = TempDir::new().unwrap();
    let gateway = start_gateway(backend_addr, local.path()).await;
    let photo = image(1500);

    let mut stream = TcpStream::connect(gateway).await.unwrap();
    let head = format!(
        "PUT /big.jpg HTTP/1.1\r\nContent-Type: image/jpeg\r\nExpect: 100-continue\r\nContent-Length: {}\r\n\r\n",
        photo.len()
    );
    stream.write_all(head.as_bytes()).await.unwrap();

    let continue_line = b"HTTP/1.1 100 Continue\r\n\r\n";
    let mut interim = vec![0u8; continue_line.len()];
    stream.read_exact(&mut interim).await.unwrap();
    assert_eq!(interim, continue_line);

    stream.write_all(&photo).await.unwrap();
    let mut raw = Vec::new();
    stream.read_to_end(&mut raw).await.unwrap();
    let (status, _) = split_response(&raw);

    assert!(status.starts_with("http/1.1 201 created"), "{status}");
    assert_eq!(store.get("big.jpg").unwrap(), photo);
}

#[tokio::test]
async fn test_gateway_text_uses_local_directory() {
    let store = Arc::new(MemoryStore::new());
    let (_backend, backend_addr) = start_backend(store.clone()).await;
    let local = TempDir::new().unwrap();
    let gateway = start_gateway(backend_addr, local.path()).await;

    let (status, _) = http(
        gateway,
        "POST /notes.txt HTTP/1.1\r\nContent-Type: text/plain\r\nContent-Length: 5\r\n\r\n",
        b"hello",
    )
    .await;
    assert!(status.starts_with("http/1.1 201 created"), "{status}");
    assert_eq!(std::fs::read(local.path().join("notes.txt")).unwrap(), b"hello");
    assert!(store.is_empty());

    let (status, body) = http(gateway, "GET /notes.txt HTTP/1.1\r\n\r\n", b"").await;
    assert!(status.starts_with("http/1.1 200 ok"), "{status}");
    assert!(status.contains("content-type: text/plain"));
    assert_eq!(body, b"hello");

    let (status, _) = http(gateway, "DELETE /notes.txt HTTP/1.1\r\n\r\n", b"").await;
    assert!(status.starts_with("http/1.1 405"), "{status}");
    assert!(status.contains("allow: get, post, put"));

    let (status, _) = http(
        gateway,
        "PUT /my%20notes.txt HTTP/1.1\r\nContent-Type: text/plain\r\nContent-Length: 2\r\n\r\n",
        b"hi",
    )
    .await;
    assert!(status.starts_with("http/1.1 201 created"), "{status}");
    assert_eq!(std::fs::read(local.path().join("my notes.txt")).unwrap(), b"hi");

    // 요청 줄이 깨진 요청은 hyper가 400으로 응답
    let (status, _) = http(gateway, "nonsense\r\n\r\n", b"").await;
    assert!(status.starts_with("http/1.1 400"), "{status}");
}
