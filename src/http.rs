//! 게이트웨이 HTTP 매핑
//!
//! HTTP/1.1 파싱, `Expect: 100-continue`, `Date`는 hyper가 처리한다.
//! 여기서는 요청 -> 작업/리소스 이름, 에러 -> 상태 코드 변환만 한다.

use bytes::Bytes;
use http_body_util::Full;
use hyper::header::{HeaderValue, ALLOW, CONTENT_TYPE};
use hyper::{Method, Response, StatusCode, Uri};
use percent_encoding::percent_decode_str;

use crate::message::Operation;
use crate::{Error, Result};

/// POST/PUT -> STORE, GET -> FETCH
pub fn operation_for(method: &Method) -> Option<Operation> {
    match *method {
        Method::POST | Method::PUT => Some(Operation::Store),
        Method::GET => Some(Operation::Fetch),
        _ => None,
    }
}

/// 경로에서 앞의 `/`를 떼고 퍼센트 디코딩한 리소스 이름 (쿼리 제외)
pub fn resource_name(uri: &Uri) -> Result<String> {
    let path = uri.path().trim_start_matches('/');
    percent_decode_str(path)
        .decode_utf8()
        .map(|name| name.into_owned())
        .map_err(|_| Error::InvalidRequest(format!("non UTF-8 resource name: {path:?}")))
}

/// 확장자로 콘텐츠 타입 추정
pub fn guess_content_type(name: &str) -> &'static str {
    let ext = name.rsplit_once('.').map(|(_, ext)| ext.to_ascii_lowercase());
    match ext.as_deref() {
        Some("png") => "image/png",
        Some("jpg") | Some("jpeg") => "image/jpeg",
        Some("gif") => "image/gif",
        Some("bmp") => "image/bmp",
        Some("webp") => "image/webp",
        Some("svg") => "image/svg+xml",
        Some("txt") => "text/plain",
        Some("html") | Some("htm") => "text/html",
        Some("json") => "application/json",
        _ => "application/octet-stream",
    }
}

/// 에러 -> HTTP 상태 코드
pub fn status_for(error: &Error) -> StatusCode {
    match error {
        Error::ResourceNotFound { .. } => StatusCode::NOT_FOUND,
        Error::InvalidRequest(_) | Error::InvalidName(_) => StatusCode::BAD_REQUEST,
        Error::TransferTimeout { .. }
        | Error::MalformedStatus(_)
        | Error::MalformedChunk { .. }
        | Error::SequenceGap { .. }
        | Error::ChannelClosed => StatusCode::BAD_GATEWAY,
        Error::Io(_)
        | Error::MalformedHeader(_)
        | Error::StorageFailure(_)
        | Error::Config(_) => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

/// 본문 있는 응답. `Content-Length`는 hyper가 본문 크기로 채운다.
pub fn response(status: StatusCode, content_type: &str, body: Bytes) -> Response<Full<Bytes>> {
    let mut response = Response::new(Full::new(body));
    *response.status_mut() = status;
    if let Ok(value) = HeaderValue::from_str(content_type) {
        response.headers_mut().insert(CONTENT_TYPE, value);
    }
    response
}

/// 본문 없는 응답
pub fn empty(status: StatusCode) -> Response<Full<Bytes>> {
    let mut response = Response::new(Full::new(Bytes::new()));
    *response.status_mut() = status;
    if status == StatusCode::METHOD_NOT_ALLOWED {
        response
            .headers_mut()
            .insert(ALLOW, HeaderValue::from_static("GET, POST, PUT"));
    }
    response
}
