//! 영속 저장소 -- 로컬 스토리지 우선, 쿠키 폴백
//!
//! 값은 JSON으로 직렬화한 뒤 base64로 인코딩해 저장합니다.
//! 읽기는 절대 실패하지 않습니다: 백엔드, base64, UTF-8, JSON 에러는 모두
//! `debug` 로그와 메트릭을 남기고 `None`이 됩니다 (새 방문자로 취급).
//!
//! # 백엔드
//! - [`MemoryStorage`]: 프로세스 내 로컬 스토리지 (테스트, 임베딩)
//! - [`FileStorage`]: 디렉토리 기반 로컬 스토리지 (CLI)
//! - [`CookieStorage`]: [`CookieJar`]를 통한 쿠키 폴백

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use chrono::DateTime;
use hct_core::backend::{Clock, StorageBackend};
use hct_core::error::StorageError;
use hct_core::metrics as m;
use serde::Serialize;
use serde::de::DeserializeOwned;
use tracing::{debug, warn};

use crate::codec::{decode_stored, encode_stored};
use crate::cookie::{CookieJar, CookieOptions, serialize_cookie};

/// 프로세스 내 키-값 스토리지
#[derive(Debug)]
pub struct MemoryStorage {
    items: Mutex<HashMap<String, String>>,
    available: bool,
}

impl MemoryStorage {
    /// 사용 가능한 빈 스토리지를 만듭니다.
    pub fn new() -> Self {
        Self {
            items: Mutex::new(HashMap::new()),
            available: true,
        }
    }

    /// 프로브에 실패하는 스토리지를 만듭니다 (쿠키 폴백 확인용).
    pub fn unavailable() -> Self {
        Self {
            items: Mutex::new(HashMap::new()),
            available: false,
        }
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<String, String>> {
        self.items.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// 저장된 항목 수
    pub fn len(&self) -> usize {
        self.lock().len()
    }

    /// 비어 있는지 확인합니다.
    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }
}

impl Default for MemoryStorage {
    fn default() -> Self {
        Self::new()
    }
}

impl StorageBackend for MemoryStorage {
    fn name(&self) -> &str {
        "memory"
    }

    fn probe(&self) -> bool {
        self.available
    }

    fn get_item(&self, key: &str) -> Result<Option<String>, StorageError> {
        if !self.available {
            return Err(StorageError::Unavailable {
                backend: self.name().to_owned(),
                reason: "disabled".to_owned(),
            });
        }
        Ok(self.lock().get(key).cloned())
    }

    fn set_item(&self, key: &str, value: &str) -> Result<(), StorageError> {
        if !self.available {
            return Err(StorageError::Unavailable {
                backend: self.name().to_owned(),
                reason: "disabled".to_owned(),
            });
        }
        self.lock().insert(key.to_owned(), value.to_owned());
        Ok(())
    }
}

/// 디렉토리 기반 스토리지 (키 하나당 파일 하나)
///
/// 쓰기는 임시 파일에 쓴 뒤 rename합니다.
#[derive(Debug, Clone)]
pub struct FileStorage {
    dir: PathBuf,
}

impl FileStorage {
    /// 디렉토리를 지정해 스토리지를 만듭니다. 디렉토리는 첫 쓰기 때 생성됩니다.
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    /// 저장 디렉토리
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn path_for(&self, key: &str) -> Result<PathBuf, StorageError> {
        let valid = !key.is_empty()
            && key
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || matches!(c, '_' | '-' | '.'))
            && !key.starts_with('.');
        if !valid {
            return Err(StorageError::Write {
                key: key.to_owned(),
                reason: "key must be [A-Za-z0-9_.-] and not start with '.'".to_owned(),
            });
        }
        Ok(self.dir.join(key))
    }
}

impl StorageBackend for FileStorage {
    fn name(&self) -> &str {
        "file"
    }

    fn probe(&self) -> bool {
        if std::fs::create_dir_all(&self.dir).is_err() {
            return false;
        }
        std::fs::metadata(&self.dir)
            .map(|meta| meta.is_dir() && !meta.permissions().readonly())
            .unwrap_or(false)
    }

    fn get_item(&self, key: &str) -> Result<Option<String>, StorageError> {
        let path = self.path_for(key)?;
        match std::fs::read_to_string(&path) {
            Ok(content) => Ok(Some(content)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(StorageError::Read {
                key: key.to_owned(),
                reason: e.to_string(),
            }),
        }
    }

    fn set_item(&self, key: &str, value: &str) -> Result<(), StorageError> {
        let path = self.path_for(key)?;
        let write_err = |e: std::io::Error| StorageError::Write {
            key: key.to_owned(),
            reason: e.to_string(),
        };
        std::fs::create_dir_all(&self.dir).map_err(write_err)?;
        let tmp = self.dir.join(format!(".{key}.tmp"));
        std::fs::write(&tmp, value).map_err(write_err)?;
        std::fs::rename(&tmp, &path).map_err(write_err)
    }
}

/// 쿠키 폴백 스토리지
///
/// `Expires = now + 보존 기간`으로 쿠키를 씁니다.
pub struct CookieStorage {
    jar: CookieJar,
    domain: Option<String>,
    path: String,
    expiration_days: AtomicU32,
    clock: Arc<dyn Clock>,
}

impl CookieStorage {
    /// 쿠키 스토리지를 만듭니다.
    pub fn new(
        jar: CookieJar,
        domain: Option<String>,
        path: impl Into<String>,
        expiration_days: u32,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            jar,
            domain,
            path: path.into(),
            expiration_days: AtomicU32::new(expiration_days),
            clock,
        }
    }

    /// 쿠키 보존 기간(일)을 바꿉니다.
    pub fn set_expiration_days(&self, days: u32) {
        self.expiration_days.store(days, Ordering::Relaxed);
    }

    /// 쿠키 저장소
    pub fn jar(&self) -> &CookieJar {
        &self.jar
    }
}

impl StorageBackend for CookieStorage {
    fn name(&self) -> &str {
        "cookie"
    }

    fn probe(&self) -> bool {
        true
    }

    fn get_item(&self, key: &str) -> Result<Option<String>, StorageError> {
        Ok(self.jar.get(key, self.clock.now_millis()))
    }

    fn set_item(&self, key: &str, value: &str) -> Result<(), StorageError> {
        let now = self.clock.now_millis();
        let days = i64::from(self.expiration_days.load(Ordering::Relaxed));
        let options = CookieOptions {
            domain: self.domain.clone(),
            path: self.path.clone(),
            expires: DateTime::from_timestamp_millis(now + days * 24 * 60 * 60 * 1000),
            ..Default::default()
        };
        let write_err = |e: hct_core::error::CodecError| StorageError::Write {
            key: key.to_owned(),
            reason: e.to_string(),
        };
        let header = serialize_cookie(key, value, &options).map_err(write_err)?;
        self.jar.set_cookie(&header, now).map_err(write_err)
    }
}

/// 트래커 상태 저장소
///
/// 로컬 스토리지가 프로브를 통과하면 로컬 스토리지를, 아니면 쿠키를 사용합니다.
pub struct PersistentStore {
    local: Option<Arc<dyn StorageBackend>>,
    cookie: CookieStorage,
    tracking_disabled: bool,
}

impl PersistentStore {
    /// 저장소를 만듭니다. `local`이 없으면 항상 쿠키를 사용합니다.
    pub fn new(local: Option<Arc<dyn StorageBackend>>, cookie: CookieStorage) -> Self {
        Self {
            local,
            cookie,
            tracking_disabled: false,
        }
    }

    fn backend(&self) -> &dyn StorageBackend {
        match &self.local {
            Some(local) if local.probe() => local.as_ref(),
            _ => &self.cookie,
        }
    }

    /// 현재 사용 중인 백엔드 이름
    pub fn backend_name(&self) -> &str {
        self.backend().name()
    }

    /// do-not-track 가드 상태를 설정합니다. 활성화되면 `set`이 아무것도 하지 않습니다.
    pub fn set_tracking_disabled(&mut self, disabled: bool) {
        self.tracking_disabled = disabled;
    }

    /// 쿠키 폴백의 보존 기간(일)을 바꿉니다.
    pub fn set_cookie_expiration_days(&self, days: u32) {
        self.cookie.set_expiration_days(days);
    }

    /// 값을 읽습니다. 어떤 실패든 `None`입니다.
    pub fn get<T: DeserializeOwned>(&self, key: &str) -> Option<T> {
        let backend = self.backend();
        let raw = match backend.get_item(key) {
            Ok(Some(raw)) => raw,
            Ok(None) => return None,
            Err(e) => {
                debug!(backend = backend.name(), key, error = %e, "storage read failed");
                return None;
            }
        };
        match decode_stored(&raw) {
            Ok(value) => Some(value),
            Err(e) => {
                metrics::counter!(m::STORAGE_DECODE_ERRORS_TOTAL).increment(1);
                debug!(backend = backend.name(), key, error = %e, "stored value could not be decoded");
                None
            }
        }
    }

    /// 값을 씁니다. 실패는 `warn` 로그만 남깁니다.
    pub fn set<T: Serialize>(&self, key: &str, value: &T) {
        if self.tracking_disabled {
            debug!(key, "do-not-track active, storage write skipped");
            return;
        }
        let encoded = match encode_stored(value) {
            Ok(encoded) => encoded,
            Err(e) => {
                warn!(key, error = %e, "failed to encode value for storage");
                return;
            }
        };
        let backend = self.backend();
        if let Err(e) = backend.set_item(key, &encoded) {
            warn!(backend = backend.name(), key, error = %e, "storage write failed");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use hct_core::types::PersistedState;
    use std::sync::atomic::AtomicI64;

    struct FixedClock(AtomicI64);

    impl Clock for FixedClock {
        fn now_millis(&self) -> i64 {
            self.0.load(Ordering::Relaxed)
        }
    }

    fn cookie_storage(jar: &CookieJar) -> CookieStorage {
        CookieStorage::new(
            jar.clone(),
            Some(".net-helium.dev".to_owned()),
            "/",
            395,
            Arc::new(FixedClock(AtomicI64::new(1_700_000_000_000))),
        )
    }

    fn sample_state() -> PersistedState {
        PersistedState {
            token: Some("BROWSER".to_owned()),
            anonym: Some(true),
            ..Default::default()
        }
    }

    #[test]
    fn local_storage_round_trip() {
        let jar = CookieJar::new();
        let local = Arc::new(MemoryStorage::new());
        let store = PersistentStore::new(Some(local.clone()), cookie_storage(&jar));

        store.set("hct", &sample_state());
        assert_eq!(store.backend_name(), "memory");
        assert_eq!(local.len(), 1);
        assert_eq!(jar.document_cookie(0), "");

        let loaded: PersistedState = store.get("hct").unwrap();
        assert_eq!(loaded, sample_state());
    }

    #[test]
    fn falls_back_to_cookie_when_local_unavailable() {
        let jar = CookieJar::new();
        let store = PersistentStore::new(
            Some(Arc::new(MemoryStorage::unavailable())),
            cookie_storage(&jar),
        );

        store.set("hct", &sample_state());
        assert_eq!(store.backend_name(), "cookie");
        assert!(jar.get("hct", 1_700_000_000_000).is_some());

        let loaded: PersistedState = store.get("hct").unwrap();
        assert_eq!(loaded.token.as_deref(), Some("BROWSER"));
    }

    #[test]
    fn cookie_expires_after_configured_days() {
        let jar = CookieJar::new();
        let cookies = cookie_storage(&jar);
        cookies.set_expiration_days(1);
        cookies.set_item("hct", "abc").unwrap();

        let now = 1_700_000_000_000;
        assert!(jar.get("hct", now + 86_399_000).is_some());
        assert!(jar.get("hct", now + 86_400_000).is_none());
    }

    #[test]
    fn raw_json_is_accepted() {
        let jar = CookieJar::new();
        let local = Arc::new(MemoryStorage::new());
        local
            .set_item("hct", r#"{"token":"RAW","anonym":false}"#)
            .unwrap();
        let store = PersistentStore::new(Some(local), cookie_storage(&jar));

        let loaded: PersistedState = store.get("hct").unwrap();
        assert_eq!(loaded.token.as_deref(), Some("RAW"));
        assert_eq!(loaded.anonym, Some(false));
    }

    #[test]
    fn corrupted_value_reads_as_none() {
        let jar = CookieJar::new();
        let local = Arc::new(MemoryStorage::new());
        local.set_item("hct", "!!not-base64!!").unwrap();
        let store = PersistentStore::new(Some(local), cookie_storage(&jar));

        assert!(store.get::<PersistedState>("hct").is_none());
        assert!(store.get::<PersistedState>("missing").is_none());
    }

    #[test]
    fn tracking_disabled_skips_writes() {
        let jar = CookieJar::new();
        let local = Arc::new(MemoryStorage::new());
        let mut store = PersistentStore::new(Some(local.clone()), cookie_storage(&jar));
        store.set_tracking_disabled(true);

        store.set("hct", &sample_state());
        assert!(local.is_empty());
    }

    #[test]
    fn file_storage_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let storage = FileStorage::new(dir.path().join("local"));
        assert!(storage.probe());

        assert_eq!(storage.get_item("hct").unwrap(), None);
        storage.set_item("hct", "value-1").unwrap();
        storage.set_item("hct", "value-2").unwrap();
        assert_eq!(storage.get_item("hct").unwrap().as_deref(), Some("value-2"));
        assert!(!dir.path().join("local/.hct.tmp").exists());
    }

    #[test]
    fn file_storage_rejects_path_like_keys() {
        let dir = tempfile::tempdir().unwrap();
        let storage = FileStorage::new(dir.path());
        assert!(storage.set_item("../escape", "x").is_err());
        assert!(storage.set_item(".hidden", "x").is_err());
        assert!(storage.set_item("_hct_ut", "x").is_ok());
    }
}
