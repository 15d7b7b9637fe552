use std::collections::{BTreeMap, HashMap};
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};

use tokio::sync::{watch, Mutex};
use tokio_stream::wrappers::WatchStream;
use tracing::{debug, warn};

use super::state::AuthState;
use crate::error::{OidcError, Result};

/// Preference key holding the serialized auth state.
pub const AUTH_STATE_KEY: &str = "authState";
/// File used by [`FilePreferenceBackend`] inside the state directory.
pub const STATE_FILE_NAME: &str = "authState.json";

/// Key/value storage of string preferences.
pub trait PreferenceBackend: Send + Sync {
    fn load(&self, key: &str) -> Result<Option<String>>;
    fn save(&self, key: &str, value: &str) -> Result<()>;
    /// Remove every key.
    fn clear(&self) -> Result<()>;
}

/// Preferences kept as one JSON object in a file, replaced atomically.
#[derive(Debug, Clone)]
pub struct FilePreferenceBackend {
    path: PathBuf,
}

impl FilePreferenceBackend {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// Backend storing `authState.json` under `dir`.
    pub fn in_dir(dir: &Path) -> Self {
        Self::new(dir.join(STATE_FILE_NAME))
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn read_map(&self) -> Result<BTreeMap<String, String>> {
        let raw = match fs::read_to_string(&self.path) {
            Ok(raw) => raw,
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => return Ok(BTreeMap::new()),
            Err(err) => return Err(err.into()),
        };
        serde_json::from_str(&raw).map_err(|err| {
            OidcError::StorageDeserializationFailed(format!("{}: {err}", self.path.display()))
        })
    }
}

impl PreferenceBackend for FilePreferenceBackend {
    fn load(&self, key: &str) -> Result<Option<String>> {
        Ok(self.read_map()?.remove(key))
    }

    fn save(&self, key: &str, value: &str) -> Result<()> {
        // An unreadable file is replaced rather than blocking every write.
        let mut map = match self.read_map() {
            Ok(map) => map,
            Err(OidcError::StorageDeserializationFailed(reason)) => {
                warn!(%reason, "discarding unreadable preference file");
                BTreeMap::new()
            }
            Err(err) => return Err(err),
        };
        map.insert(key.to_string(), value.to_string());
        let serialized = serde_json::to_vec_pretty(&map)?;
        atomic_write(&self.path, &serialized)
    }

    fn clear(&self) -> Result<()> {
        match fs::remove_file(&self.path) {
            Ok(()) => Ok(()),
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(err) => Err(err.into()),
        }
    }
}

/// Preferences held in memory, lost on drop.
#[derive(Debug, Default)]
pub struct MemoryPreferenceBackend {
    values: std::sync::Mutex<HashMap<String, String>>,
}

impl MemoryPreferenceBackend {
    pub fn new() -> Self {
        Self::default()
    }

    fn values(&self) -> Result<std::sync::MutexGuard<'_, HashMap<String, String>>> {
        self.values
            .lock()
            .map_err(|_| OidcError::Storage("memory preferences lock poisoned".to_string()))
    }
}

impl PreferenceBackend for MemoryPreferenceBackend {
    fn load(&self, key: &str) -> Result<Option<String>> {
        Ok(self.values()?.get(key).cloned())
    }

    fn save(&self, key: &str, value: &str) -> Result<()> {
        self.values()?.insert(key.to_string(), value.to_string());
        Ok(())
    }

    fn clear(&self) -> Result<()> {
        self.values()?.clear();
        Ok(())
    }
}

/// Durable, observable holder of the single persisted [`AuthState`].
///
/// Commits are serialized: each one is persisted and then published, so
/// observers see commits in order and never a partial value. Published
/// values are shared `Arc`s; two observations of the same commit are
/// pointer-equal.
///
/// # Example
/// ```no_run
/// use std::sync::Arc;
/// use oidc_session::auth::{AuthState, AuthStateStore, MemoryPreferenceBackend};
///
/// # async fn example() -> oidc_session::error::Result<()> {
/// let store = AuthStateStore::open(Arc::new(MemoryPreferenceBackend::new()))?;
/// store.write(Some(AuthState::default())).await?;
/// assert!(store.current().is_some());
/// store.write(None).await?;
/// # Ok(())
/// # }
/// ```
pub struct AuthStateStore {
    backend: Arc<dyn PreferenceBackend>,
    sender: watch::Sender<Option<Arc<AuthState>>>,
    write_lock: Mutex<()>,
}

impl std::fmt::Debug for AuthStateStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AuthStateStore")
            .field("current", &self.sender.borrow().is_some())
            .finish()
    }
}

impl AuthStateStore {
    /// Open the store, reading whatever was persisted under `authState`.
    ///
    /// A blob that cannot be decoded reads as "no state".
    pub fn open(backend: Arc<dyn PreferenceBackend>) -> Result<Self> {
        let initial = match backend.load(AUTH_STATE_KEY) {
            Ok(Some(raw)) => decode(&raw),
            Ok(None) => None,
            Err(OidcError::StorageDeserializationFailed(reason)) => {
                warn!(%reason, "stored preferences are unreadable; starting logged out");
                None
            }
            Err(err) => return Err(err),
        };
        debug!(present = initial.is_some(), "auth state store opened");
        let (sender, _) = watch::channel(initial.map(Arc::new));
        Ok(Self {
            backend,
            sender,
            write_lock: Mutex::new(()),
        })
    }

    /// File-backed store in `dir`.
    pub fn open_in_dir(dir: &Path) -> Result<Self> {
        Self::open(Arc::new(FilePreferenceBackend::in_dir(dir)))
    }

    /// Store that lives only as long as the process.
    pub fn in_memory() -> Self {
        let (sender, _) = watch::channel(None);
        Self {
            backend: Arc::new(MemoryPreferenceBackend::new()),
            sender,
            write_lock: Mutex::new(()),
        }
    }

    /// Latest committed value.
    pub fn current(&self) -> Option<Arc<AuthState>> {
        self.sender.borrow().clone()
    }

    pub fn subscribe(&self) -> watch::Receiver<Option<Arc<AuthState>>> {
        self.sender.subscribe()
    }

    /// Latest committed value followed by every later commit.
    ///
    /// Each call starts a new stream; a slow consumer only skips values that
    /// were already superseded.
    pub fn stream(&self) -> WatchStream<Option<Arc<AuthState>>> {
        WatchStream::new(self.sender.subscribe())
    }

    /// Replace the stored state; `None` clears it.
    ///
    /// Returns the committed value as observers will see it.
    pub async fn write(&self, state: Option<AuthState>) -> Result<Option<Arc<AuthState>>> {
        let _guard = self.write_lock.lock().await;
        self.commit(state)
    }

    /// Commit `state` only if nothing is stored yet.
    ///
    /// Returns `None` when another value was already present.
    pub async fn write_if_absent(&self, state: AuthState) -> Result<Option<Arc<AuthState>>> {
        let _guard = self.write_lock.lock().await;
        if self.sender.borrow().is_some() {
            return Ok(None);
        }
        self.commit(Some(state))
    }

    /// Commit `state` only if `expected` is still the committed value.
    ///
    /// Returns `None` without writing when another commit happened after
    /// `expected` was observed.
    pub async fn write_if_current(
        &self,
        expected: &Arc<AuthState>,
        state: AuthState,
    ) -> Result<Option<Arc<AuthState>>> {
        let _guard = self.write_lock.lock().await;
        let unchanged = self
            .sender
            .borrow()
            .as_ref()
            .is_some_and(|current| Arc::ptr_eq(current, expected));
        if !unchanged {
            return Ok(None);
        }
        self.commit(Some(state))
    }

    fn commit(&self, state: Option<AuthState>) -> Result<Option<Arc<AuthState>>> {
        match &state {
            Some(state) => self.backend.save(AUTH_STATE_KEY, &state.to_json()?)?,
            None => self.backend.clear()?,
        }
        let committed = state.map(Arc::new);
        self.sender.send_replace(committed.clone());
        debug!(present = committed.is_some(), "auth state committed");
        Ok(committed)
    }
}

fn decode(raw: &str) -> Option<AuthState> {
    match AuthState::from_json(raw) {
        Ok(state) => Some(state),
        Err(err) => {
            let err = OidcError::StorageDeserializationFailed(err.to_string());
            warn!(error = %err, "ignoring stored auth state");
            None
        }
    }
}

fn atomic_write(path: &Path, data: &[u8]) -> Result<()> {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            fs::create_dir_all(parent)?;
        }
    }

    let file_name = path.file_name().ok_or_else(|| {
        OidcError::Storage(format!("preference path {} has no file name", path.display()))
    })?;

    let nonce = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_nanos();
    let temp_path = path.with_file_name(format!(
        ".{}.tmp-{}-{nonce}",
        file_name.to_string_lossy(),
        std::process::id()
    ));

    let mut options = fs::OpenOptions::new();
    options.write(true).create_new(true);
    #[cfg(unix)]
    {
        use std::os::unix::fs::OpenOptionsExt;
        options.mode(0o600);
    }

    let written = (|| -> std::io::Result<()> {
        let mut file = options.open(&temp_path)?;
        file.write_all(data)?;
        file.sync_all()?;
        Ok(())
    })();
    if let Err(err) = written {
        let _ = fs::remove_file(&temp_path);
        return Err(err.into());
    }

    if let Err(err) = fs::rename(&temp_path, path) {
        let _ = fs::remove_file(&temp_path);
        return Err(err.into());
    }
    Ok(())
}
