//! 브리지 게이트웨이
//!
//! TCP 연결마다 hyper HTTP/1 연결 하나를 띄우고 요청 하나를 처리한다.
//! - 바이너리 타입: 백엔드와 전송 세션 하나 (STORE/FETCH)
//! - 그 외: 로컬 저장소 직접 읽기/쓰기
//!
//! 모든 에러는 HTTP 에러 응답으로 변환된다.

use std::convert::Infallible;
use std::net::SocketAddr;
use std::sync::Arc;

use bytes::Bytes;
use http_body_util::{BodyExt, Full, LengthLimitError, Limited};
use hyper::body::Body;
use hyper::header::CONTENT_TYPE;
use hyper::server::conn::http1;
use hyper::service::service_fn;
use hyper::{Request, Response, StatusCode};
use hyper_util::rt::TokioIo;
use tokio::net::TcpListener;
use tracing::{debug, info, warn};

use crate::http::{empty, guess_content_type, operation_for, resource_name, response, status_for};
use crate::initiator::Initiator;
use crate::message::{validate_resource_name, Operation};
use crate::storage::ResourceStore;
use crate::{Config, Error, Result};

type BoxError = Box<dyn std::error::Error + Send + Sync>;

/// 브리지 게이트웨이
#[derive(Clone)]
pub struct Gateway {
    config: Config,
    initiator: Initiator,
    local_store: Arc<dyn ResourceStore>,
}

impl Gateway {
    /// 설정이 유효하지 않으면 `Error::Config`
    pub fn new(
        config: Config,
        backend_addr: SocketAddr,
        local_store: Arc<dyn ResourceStore>,
    ) -> Result<Self> {
        Ok(Self {
            initiator: Initiator::new(config.clone(), backend_addr)?,
            config,
            local_store,
        })
    }

    /// 연결을 받을 때마다 태스크 하나를 띄운다
    pub async fn run(self, listener: TcpListener) -> Result<()> {
        info!(
            "게이트웨이 시작: {} -> backend {}",
            listener.local_addr()?,
            self.initiator.backend_addr()
        );

        loop {
            let (stream, client) = listener.accept().await?;
            let io = TokioIo::new(stream);
            let gateway = self.clone();

            tokio::spawn(async move {
                let service = service_fn(move |request: Request<hyper::body::Incoming>| {
                    let gateway = gateway.clone();
                    async move {
                        info!("{} {} from {}", request.method(), request.uri(), client);
                        let response = gateway.handle_request(request).await;
                        debug!("응답 {} -> {}", response.status(), client);
                        Ok::<_, Infallible>(response)
                    }
                });

                // 연결당 요청 하나, 응답 후 `Connection: close`
                if let Err(e) = http1::Builder::new()
                    .keep_alive(false)
                    .serve_connection(io, service)
                    .await
                {
                    warn!("연결 처리 실패: {}: {}", client, e);
                }
            });
        }
    }

    /// 요청을 저장/조회로 변환
    pub async fn handle_request<B>(&self, request: Request<B>) -> Response<Full<Bytes>>
    where
        B: Body<Data = Bytes>,
        B::Error: Into<BoxError>,
    {
        let operation = match operation_for(request.method()) {
            Some(operation) => operation,
            None => return empty(StatusCode::METHOD_NOT_ALLOWED),
        };

        let name = match resource_name(request.uri()) {
            Ok(name) => name,
            Err(e) => return error_response(&e),
        };
        if let Err(e) = validate_resource_name(&name) {
            return error_response(&e);
        }

        let content_type = request
            .headers()
            .get(CONTENT_TYPE)
            .and_then(|value| value.to_str().ok())
            .unwrap_or_else(|| guess_content_type(&name))
            .to_string();
        let binary = self.config.is_binary_type(&content_type);

        // 본문은 거부할 이유가 없을 때만 읽는다 (100-continue는 이때 전송)
        let body = match operation {
            Operation::Store => match self.read_body(request.into_body()).await {
                Ok(body) => body,
                Err(status) => return empty(status),
            },
            Operation::Fetch => Bytes::new(),
        };

        let result = match (operation, binary) {
            (Operation::Store, true) => self
                .initiator
                .store(&name, body)
                .await
                .map(|_| response(StatusCode::CREATED, &content_type, Bytes::new())),
            (Operation::Fetch, true) => self
                .initiator
                .fetch(&name)
                .await
                .map(|data| response(StatusCode::OK, &content_type, data)),
            (Operation::Store, false) => self
                .local_store
                .store(&name, body)
                .await
                .map(|()| response(StatusCode::CREATED, &content_type, Bytes::new())),
            (Operation::Fetch, false) => match self.local_store.fetch(&name).await {
                Ok(Some(data)) => Ok(response(StatusCode::OK, &content_type, data)),
                Ok(None) => Err(Error::ResourceNotFound { name: name.clone() }),
                Err(e) => Err(e),
            },
        };

        result.unwrap_or_else(|e| {
            if !matches!(e, Error::ResourceNotFound { .. }) {
                warn!("{} {} 실패: {}", operation, name, e);
            }
            error_response(&e)
        })
    }

    /// `max_request_size`까지 본문 수집
    async fn read_body<B>(&self, body: B) -> std::result::Result<Bytes, StatusCode>
    where
        B: Body<Data = Bytes>,
        B::Error: Into<BoxError>,
    {
        match Limited::new(body, self.config.max_request_size).collect().await {
            Ok(collected) => Ok(collected.to_bytes()),
            Err(e) if e.downcast_ref::<LengthLimitError>().is_some() => {
                warn!("요청 본문이 너무 큼: > {} bytes", self.config.max_request_size);
                Err(StatusCode::PAYLOAD_TOO_LARGE)
            }
            Err(e) => {
                debug!("요청 본문 읽기 실패: {}", e);
                Err(StatusCode::BAD_REQUEST)
            }
        }
    }
}

/// 에러 -> HTTP 에러 응답
pub fn error_response(error: &Error) -> Response<Full<Bytes>> {
    empty(status_for(error))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::MemoryStore;

    fn gateway(local: Arc<MemoryStore>, backend: SocketAddr) -> Gateway {
        let config = Config {
            ack_timeout_ms: 10,
            max_retries: 1,
            max_request_size: 64,
            ..Config::default()
        };
        Gateway::new(config, backend, local).unwrap()
    }

    fn request(
        method: &str,
        target: &str,
        content_type: Option<&str>,
        body: &[u8],
    ) -> Request<Full<Bytes>> {
        let mut builder = Request::builder().method(method).uri(target);
        if let Some(content_type) = content_type {
            builder = builder.header(CONTENT_TYPE, content_type);
        }
        builder.body(Full::new(Bytes::copy_from_slice(body))).unwrap()
    }

    async fn body_of(response: Response<Full<Bytes>>) -> Bytes {
        response.into_body().collect().await.unwrap().to_bytes()
    }

    #[tokio::test]
    async fn test_text_goes_to_local_store() {
        let local = Arc::new(MemoryStore::new());
        let gateway = gateway(local.clone(), "127.0.0.1:9".parse().unwrap());

        let response = gateway
            .handle_request(request("POST", "/notes.txt", Some("text/plain"), b"hello"))
            .await;
        assert_eq!(response.status(), StatusCode::CREATED);
        assert_eq!(local.get("notes.txt").unwrap(), Bytes::from_static(b"hello"));

        let response = gateway.handle_request(request("GET", "/notes.txt", None, b"")).await;
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(response.headers()[CONTENT_TYPE], "text/plain");
        assert_eq!(&body_of(response).await[..], b"hello");

        let response = gateway.handle_request(request("GET", "/absent.txt", None, b"")).await;
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn test_unsupported_method_and_bad_name() {
        let gateway = gateway(Arc::new(MemoryStore::new()), "127.0.0.1:9".parse().unwrap());

        let response = gateway.handle_request(request("DELETE", "/a.png", None, b"")).await;
        assert_eq!(response.status(), StatusCode::METHOD_NOT_ALLOWED);

        let response = gateway.handle_request(request("GET", "/", None, b"")).await;
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);

        // 디코딩 후 CRLF가 들어간 이름
        let response = gateway.handle_request(request("GET", "/a%0D%0Ab.txt", None, b"")).await;
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn test_percent_encoded_name_is_decoded() {
        let local = Arc::new(MemoryStore::new());
        let gateway = gateway(local.clone(), "127.0.0.1:9".parse().unwrap());

        let response = gateway
            .handle_request(request("PUT", "/my%20notes.txt", Some("text/plain"), b"hi"))
            .await;
        assert_eq!(response.status(), StatusCode::CREATED);
        assert_eq!(local.get("my notes.txt").unwrap(), Bytes::from_static(b"hi"));
    }

    #[tokio::test]
    async fn test_oversized_body_is_rejected() {
        let local = Arc::new(MemoryStore::new());
        let gateway = gateway(local.clone(), "127.0.0.1:9".parse().unwrap());

        let response = gateway
            .handle_request(request("POST", "/big.txt", Some("text/plain"), &[b'x'; 65]))
            .await;
        assert_eq!(response.status(), StatusCode::PAYLOAD_TOO_LARGE);
        assert!(local.is_empty());
    }

    #[tokio::test]
    async fn test_silent_backend_is_bad_gateway() {
        // 응답하지 않는 백엔드: 바이너리 요청은 타임아웃
        let silent = tokio::net::UdpSocket::bind("127.0.0.1:0").await.unwrap();
        let local = Arc::new(MemoryStore::new());
        let gateway = gateway(local.clone(), silent.local_addr().unwrap());

        let response = gateway
            .handle_request(request("POST", "/photo.png", Some("image/png"), b"\x89PNG"))
            .await;
        assert_eq!(response.status(), StatusCode::BAD_GATEWAY);
        // 바이너리는 로컬 저장소로 가지 않음
        assert!(local.is_empty());
    }

    #[test]
    fn test_zero_chunk_size_is_rejected() {
        let config = Config {
            max_chunk_size: 0,
            ..Config::default()
        };
        let local = Arc::new(MemoryStore::new());
        let result = Gateway::new(config, "127.0.0.1:9".parse().unwrap(), local);
        assert!(matches!(result, Err(Error::Config(_))));
    }
}
