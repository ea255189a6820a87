use serde_json::json;
use std::collections::BTreeMap;
use std::path::PathBuf;
use uuid::Uuid;

/// One file in the remote gallery folder, as reported by `list`.
///
/// `id` is the provider's stable opaque key; rank identity is always derived
/// from `name`, never from `id`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RemoteFile {
    pub id: String,
    pub name: String,
    pub mime_type: String,
    pub size: Option<u64>,
}

#[derive(Debug)]
pub enum RemoteError {
    Unauthorized,
    NotFound(String),
    TargetExists(String),
    Io(String),
}

impl std::fmt::Display for RemoteError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RemoteError::Unauthorized => write!(f, "missing or invalid bearer token"),
            RemoteError::NotFound(id) => write!(f, "no such asset: {}", id),
            RemoteError::TargetExists(name) => write!(f, "target name already exists: {}", name),
            RemoteError::Io(msg) => write!(f, "storage error: {}", msg),
        }
    }
}

impl std::error::Error for RemoteError {}

impl From<std::io::Error> for RemoteError {
    fn from(e: std::io::Error) -> Self {
        RemoteError::Io(e.to_string())
    }
}

/// The remote file-storage provider's primitives, consumed as opaque
/// operations. Timeouts and retries live behind this seam.
pub trait RemoteStore {
    /// Full listing of the gallery folder, every bucket included.
    fn list(&self, auth_token: Option<&str>) -> Result<Vec<RemoteFile>, RemoteError>;

    /// Rename a single asset. No transactional guarantee across calls.
    fn rename(&self, asset_id: &str, new_name: &str, auth_token: &str) -> Result<(), RemoteError>;

    /// Store new bytes under `target_name`; fails if the name is taken.
    /// Returns the minted asset id.
    fn upload(&self, bytes: &[u8], target_name: &str, auth_token: &str)
        -> Result<String, RemoteError>;

    /// Binary payload for an asset; the token is optional for public stores.
    fn fetch_bytes(&self, asset_id: &str, auth_token: Option<&str>) -> Result<Vec<u8>, RemoteError>;

    /// Optimistic direct reference for an asset, if the store serves one.
    /// Never performs a fetch; the reference may turn out to be dead.
    fn public_reference(&self, asset_id: &str) -> Option<String>;
}

pub fn mime_for_name(name: &str) -> &'static str {
    let lower = name.to_ascii_lowercase();
    if lower.ends_with(".png") {
        "image/png"
    } else if lower.ends_with(".jpg") || lower.ends_with(".jpeg") {
        "image/jpeg"
    } else {
        "application/octet-stream"
    }
}

const INDEX_FILE: &str = ".index.json";

/// Directory-backed remote store for local deployments and tests.
///
/// Files live flat in `root`; a `.index.json` sidecar maps opaque asset ids
/// to current filenames. Files dropped into the directory out-of-band are
/// adopted (and assigned ids) on the next listing, so the index follows the
/// directory rather than the other way around.
pub struct DirStore {
    root: PathBuf,
    required_token: Option<String>,
    public: bool,
}

impl DirStore {
    pub fn open(
        root: impl Into<PathBuf>,
        required_token: Option<String>,
        public: bool,
    ) -> Result<Self, RemoteError> {
        let root = root.into();
        std::fs::create_dir_all(&root)?;
        let store = DirStore {
            root,
            required_token,
            public,
        };
        store.sync_index()?;
        Ok(store)
    }

    fn check_token(&self, token: Option<&str>) -> Result<(), RemoteError> {
        match &self.required_token {
            None => Ok(()),
            Some(required) if token == Some(required.as_str()) => Ok(()),
            Some(_) => Err(RemoteError::Unauthorized),
        }
    }

    fn index_path(&self) -> PathBuf {
        self.root.join(INDEX_FILE)
    }

    fn load_index(&self) -> Result<BTreeMap<String, String>, RemoteError> {
        let path = self.index_path();
        if !path.is_file() {
            return Ok(BTreeMap::new());
        }
        let raw = std::fs::read_to_string(&path)?;
        serde_json::from_str(&raw).map_err(|e| RemoteError::Io(e.to_string()))
    }

    fn save_index(&self, index: &BTreeMap<String, String>) -> Result<(), RemoteError> {
        let raw = serde_json::to_string_pretty(&json!(index))
            .map_err(|e| RemoteError::Io(e.to_string()))?;
        std::fs::write(self.index_path(), raw)?;
        Ok(())
    }

    /// Reconcile the id index with the directory: adopt unindexed files,
    /// drop entries whose file is gone.
    fn sync_index(&self) -> Result<BTreeMap<String, String>, RemoteError> {
        let mut index = self.load_index()?;

        let mut present: Vec<String> = Vec::new();
        for entry in std::fs::read_dir(&self.root)? {
            let entry = entry?;
            if !entry.path().is_file() {
                continue;
            }
            let Some(name) = entry.file_name().to_str().map(str::to_string) else {
                continue;
            };
            if name.starts_with('.') {
                continue;
            }
            present.push(name);
        }

        let mut changed = false;
        index.retain(|_, name| {
            let keep = present.iter().any(|p| p == name);
            if !keep {
                changed = true;
            }
            keep
        });
        for name in &present {
            if !index.values().any(|v| v == name) {
                index.insert(Uuid::new_v4().to_string(), name.clone());
                changed = true;
            }
        }
        if changed {
            self.save_index(&index)?;
        }
        Ok(index)
    }

    fn name_of(&self, asset_id: &str) -> Result<String, RemoteError> {
        let index = self.sync_index()?;
        index
            .get(asset_id)
            .cloned()
            .ok_or_else(|| RemoteError::NotFound(asset_id.to_string()))
    }
}

impl RemoteStore for DirStore {
    fn list(&self, _auth_token: Option<&str>) -> Result<Vec<RemoteFile>, RemoteError> {
        let index = self.sync_index()?;
        let mut files: Vec<RemoteFile> = Vec::with_capacity(index.len());
        for (id, name) in &index {
            let size = std::fs::metadata(self.root.join(name)).ok().map(|m| m.len());
            files.push(RemoteFile {
                id: id.clone(),
                name: name.clone(),
                mime_type: mime_for_name(name).to_string(),
                size,
            });
        }
        files.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(files)
    }

    fn rename(&self, asset_id: &str, new_name: &str, auth_token: &str) -> Result<(), RemoteError> {
        self.check_token(Some(auth_token))?;
        let mut index = self.sync_index()?;
        let old_name = index
            .get(asset_id)
            .cloned()
            .ok_or_else(|| RemoteError::NotFound(asset_id.to_string()))?;
        let target = self.root.join(new_name);
        if target.exists() {
            return Err(RemoteError::TargetExists(new_name.to_string()));
        }
        std::fs::rename(self.root.join(&old_name), target)?;
        index.insert(asset_id.to_string(), new_name.to_string());
        self.save_index(&index)?;
        Ok(())
    }

    fn upload(
        &self,
        bytes: &[u8],
        target_name: &str,
        auth_token: &str,
    ) -> Result<String, RemoteError> {
        self.check_token(Some(auth_token))?;
        let mut index = self.sync_index()?;
        let target = self.root.join(target_name);
        if target.exists() {
            return Err(RemoteError::TargetExists(target_name.to_string()));
        }
        std::fs::write(target, bytes)?;
        let id = Uuid::new_v4().to_string();
        index.insert(id.clone(), target_name.to_string());
        self.save_index(&index)?;
        Ok(id)
    }

    fn fetch_bytes(&self, asset_id: &str, auth_token: Option<&str>) -> Result<Vec<u8>, RemoteError> {
        if !self.public {
            self.check_token(auth_token)?;
        }
        let name = self.name_of(asset_id)?;
        Ok(std::fs::read(self.root.join(name))?)
    }

    fn public_reference(&self, asset_id: &str) -> Option<String> {
        if !self.public {
            return None;
        }
        let name = self.name_of(asset_id).ok()?;
        Some(self.root.join(name).to_string_lossy().into_owned())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn temp_root(tag: &str) -> PathBuf {
        let p = std::env::temp_dir().join(format!(
            "tahfiz-remote-{}-{}",
            tag,
            std::time::SystemTime::now()
                .duration_since(std::time::UNIX_EPOCH)
                .expect("clock")
                .as_nanos()
        ));
        std::fs::create_dir_all(&p).expect("create temp root");
        p
    }

    #[test]
    fn upload_list_rename_fetch_cycle() {
        let root = temp_root("cycle");
        let store = DirStore::open(&root, Some("secret".into()), true).expect("open");

        let id = store
            .upload(b"png-bytes", "202510-01.png", "secret")
            .expect("upload");
        let files = store.list(None).expect("list");
        assert_eq!(files.len(), 1);
        assert_eq!(files[0].name, "202510-01.png");
        assert_eq!(files[0].mime_type, "image/png");

        store
            .rename(&id, "202510-02.png", "secret")
            .expect("rename");
        assert_eq!(store.fetch_bytes(&id, None).expect("fetch"), b"png-bytes");
        assert!(store
            .public_reference(&id)
            .expect("reference")
            .ends_with("202510-02.png"));

        let _ = std::fs::remove_dir_all(root);
    }

    #[test]
    fn upload_rejects_taken_name_and_bad_token() {
        let root = temp_root("conflict");
        let store = DirStore::open(&root, Some("secret".into()), false).expect("open");

        store
            .upload(b"a", "202510-01.jpg", "secret")
            .expect("first upload");
        assert!(matches!(
            store.upload(b"b", "202510-01.jpg", "secret"),
            Err(RemoteError::TargetExists(_))
        ));
        assert!(matches!(
            store.upload(b"b", "202510-02.jpg", "wrong"),
            Err(RemoteError::Unauthorized)
        ));
        // private store refuses unauthenticated fetches and serves no references
        let files = store.list(None).expect("list");
        assert!(matches!(
            store.fetch_bytes(&files[0].id, None),
            Err(RemoteError::Unauthorized)
        ));
        assert_eq!(store.public_reference(&files[0].id), None);

        let _ = std::fs::remove_dir_all(root);
    }

    #[test]
    fn out_of_band_files_are_adopted() {
        let root = temp_root("adopt");
        let store = DirStore::open(&root, None, true).expect("open");
        std::fs::write(root.join("202511-01.jpg"), b"planted").expect("plant file");

        let files = store.list(None).expect("list");
        assert_eq!(files.len(), 1);
        assert_eq!(files[0].name, "202511-01.jpg");
        assert_eq!(store.fetch_bytes(&files[0].id, None).expect("fetch"), b"planted");

        let _ = std::fs::remove_dir_all(root);
    }
}
