//! 리소스 저장소
//!
//! 백엔드(및 게이트웨이의 비바이너리 요청)가 사용하는 저장/조회 인터페이스.

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};

use async_trait::async_trait;
use bytes::Bytes;
use dashmap::DashMap;
use tracing::debug;

use crate::message::validate_resource_name;
use crate::{Error, Result};

/// 저장소 인터페이스
#[async_trait]
pub trait ResourceStore: Send + Sync {
    /// 리소스 저장 (같은 이름이면 덮어씀)
    async fn store(&self, name: &str, data: Bytes) -> Result<()>;

    /// 리소스 조회. 없으면 `None`.
    async fn fetch(&self, name: &str) -> Result<Option<Bytes>>;
}

/// 디렉터리 기반 저장소
#[derive(Debug, Clone)]
pub struct FsStore {
    root: PathBuf,
}

impl FsStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// 루트 밖을 가리키지 않는 평평한 파일 이름만 허용
    fn path_for(&self, name: &str) -> Result<PathBuf> {
        validate_resource_name(name)?;
        if name.contains(|c: char| c == '/' || c == '\\') || name == "." || name == ".." {
            return Err(Error::InvalidName(name.to_string()));
        }
        Ok(self.root.join(name))
    }
}

#[async_trait]
impl ResourceStore for FsStore {
    async fn store(&self, name: &str, data: Bytes) -> Result<()> {
        let path = self.path_for(name)?;
        tokio::fs::write(&path, &data)
            .await
            .map_err(|e| Error::StorageFailure(format!("{}: {}", path.display(), e)))?;
        debug!("저장 완료: {} ({} bytes)", path.display(), data.len());
        Ok(())
    }

    async fn fetch(&self, name: &str) -> Result<Option<Bytes>> {
        let path = self.path_for(name)?;
        match tokio::fs::read(&path).await {
            Ok(data) => Ok(Some(Bytes::from(data))),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(Error::StorageFailure(format!("{}: {}", path.display(), e))),
        }
    }
}

/// 메모리 저장소 (테스트, 임베딩용)
#[derive(Debug, Default)]
pub struct MemoryStore {
    entries: DashMap<String, Bytes>,
    fail_writes: AtomicBool,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// 이후 모든 저장을 실패시킴
    pub fn set_fail_writes(&self, fail: bool) {
        self.fail_writes.store(fail, Ordering::SeqCst);
    }

    pub fn get(&self, name: &str) -> Option<Bytes> {
        self.entries.get(name).map(|entry| entry.value().clone())
    }

    pub fn insert(&self, name: impl Into<String>, data: impl Into<Bytes>) {
        self.entries.insert(name.into(), data.into());
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[async_trait]
impl ResourceStore for MemoryStore {
    async fn store(&self, name: &str, data: Bytes) -> Result<()> {
        validate_resource_name(name)?;
        if self.fail_writes.load(Ordering::SeqCst) {
            return Err(Error::StorageFailure(format!("write rejected: {name}")));
        }
        self.entries.insert(name.to_string(), data);
        Ok(())
    }

    async fn fetch(&self, name: &str) -> Result<Option<Bytes>> {
        validate_resource_name(name)?;
        Ok(self.get(name))
    }
}
