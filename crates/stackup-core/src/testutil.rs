use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use chrono::{DateTime, Utc};
use tempfile::TempDir;

use crate::config::StackupConfig;
use crate::error::{Result, StackupError};
use crate::external::{CacheAdmin, DatabaseAdmin, ServiceSupervisor};
use crate::store::{ObjectMeta, RemoteStore, StoredObject};

/// In-memory database double. `restore` replaces the stored bytes so
/// round-trips can be asserted exactly.
pub struct MemoryDatabase {
    pub data: Mutex<Vec<u8>>,
    pub restored: Mutex<Option<Vec<u8>>>,
    pub fail_dump: bool,
}

impl MemoryDatabase {
    pub fn with_data(data: &[u8]) -> Self {
        Self {
            data: Mutex::new(data.to_vec()),
            restored: Mutex::new(None),
            fail_dump: false,
        }
    }

    pub fn failing() -> Self {
        Self {
            data: Mutex::new(Vec::new()),
            restored: Mutex::new(None),
            fail_dump: true,
        }
    }
}

impl DatabaseAdmin for MemoryDatabase {
    fn dump(&self) -> Result<Vec<u8>> {
        if self.fail_dump {
            return Err(StackupError::External("pg_dump: connection refused".into()));
        }
        Ok(self.data.lock().unwrap().clone())
    }

    fn restore(&self, dump: &[u8]) -> Result<()> {
        *self.data.lock().unwrap() = dump.to_vec();
        *self.restored.lock().unwrap() = Some(dump.to_vec());
        Ok(())
    }

    fn version(&self) -> Result<String> {
        Ok("16.3 (test)".into())
    }
}

/// In-memory cache double backed by a real snapshot file in a temp dir.
pub struct MemoryCache {
    dir: TempDir,
    pub live: Mutex<Vec<u8>>,
    pub fail_snapshot: bool,
}

impl MemoryCache {
    pub fn with_data(data: &[u8]) -> Self {
        Self {
            dir: tempfile::tempdir().expect("tempdir"),
            live: Mutex::new(data.to_vec()),
            fail_snapshot: false,
        }
    }

    pub fn failing() -> Self {
        let mut cache = Self::with_data(b"");
        cache.fail_snapshot = true;
        cache
    }
}

impl CacheAdmin for MemoryCache {
    fn snapshot(&self) -> Result<PathBuf> {
        if self.fail_snapshot {
            return Err(StackupError::External("redis-cli SAVE: refused".into()));
        }
        let path = self.dir.path().join("dump.rdb");
        std::fs::write(&path, self.live.lock().unwrap().as_slice())?;
        Ok(path)
    }

    fn replace_snapshot(&self, src: &Path) -> Result<()> {
        *self.live.lock().unwrap() = std::fs::read(src)?;
        Ok(())
    }

    fn version(&self) -> Result<String> {
        Ok("7.2.5 (test)".into())
    }
}

/// Supervisor double recording every stop/start in order.
#[derive(Default)]
pub struct RecordingSupervisor {
    pub events: Mutex<Vec<String>>,
    pub fail_stop_for: Option<String>,
}

impl RecordingSupervisor {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn failing_stop(service: &str) -> Self {
        Self {
            events: Mutex::new(Vec::new()),
            fail_stop_for: Some(service.to_string()),
        }
    }

    pub fn events(&self) -> Vec<String> {
        self.events.lock().unwrap().clone()
    }
}

impl ServiceSupervisor for RecordingSupervisor {
    fn stop(&self, name: &str) -> Result<()> {
        if self.fail_stop_for.as_deref() == Some(name) {
            return Err(StackupError::ServiceQuiesce {
                service: name.to_string(),
                message: "refusing to stop (test)".into(),
            });
        }
        self.events.lock().unwrap().push(format!("stop {name}"));
        Ok(())
    }

    fn start(&self, name: &str) -> Result<()> {
        self.events.lock().unwrap().push(format!("start {name}"));
        Ok(())
    }

    fn is_running(&self, _name: &str) -> Result<bool> {
        Ok(true)
    }
}

struct RemoteEntry {
    data: Vec<u8>,
    meta: Option<ObjectMeta>,
    last_modified: DateTime<Utc>,
}

/// In-memory remote store with settable timestamps for retention tests.
#[derive(Default)]
pub struct MemoryRemote {
    objects: Mutex<HashMap<String, RemoteEntry>>,
    pub fail_put: bool,
}

impl MemoryRemote {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn failing_put() -> Self {
        Self {
            objects: Mutex::new(HashMap::new()),
            fail_put: true,
        }
    }

    pub fn insert(&self, key: &str, data: &[u8], last_modified: DateTime<Utc>) {
        self.objects.lock().unwrap().insert(
            key.to_string(),
            RemoteEntry {
                data: data.to_vec(),
                meta: None,
                last_modified,
            },
        );
    }

    pub fn meta_of(&self, key: &str) -> Option<ObjectMeta> {
        self.objects
            .lock()
            .unwrap()
            .get(key)
            .and_then(|e| e.meta.clone())
    }

    pub fn keys(&self) -> Vec<String> {
        let mut keys: Vec<String> = self.objects.lock().unwrap().keys().cloned().collect();
        keys.sort();
        keys
    }
}

impl RemoteStore for MemoryRemote {
    fn put(&self, key: &str, src: &Path, meta: &ObjectMeta) -> Result<()> {
        if self.fail_put {
            return Err(StackupError::Other("remote unreachable (test)".into()));
        }
        let data = std::fs::read(src)?;
        self.objects.lock().unwrap().insert(
            key.to_string(),
            RemoteEntry {
                data,
                meta: Some(meta.clone()),
                last_modified: Utc::now(),
            },
        );
        Ok(())
    }

    fn fetch(&self, key: &str, dest: &Path) -> Result<bool> {
        match self.objects.lock().unwrap().get(key) {
            Some(entry) => {
                std::fs::write(dest, &entry.data)?;
                Ok(true)
            }
            None => Ok(false),
        }
    }

    fn list(&self) -> Result<Vec<StoredObject>> {
        let mut objects: Vec<StoredObject> = self
            .objects
            .lock()
            .unwrap()
            .iter()
            .map(|(key, entry)| StoredObject {
                key: key.clone(),
                size: entry.data.len() as u64,
                last_modified: entry.last_modified,
            })
            .collect();
        objects.sort_by(|a, b| a.key.cmp(&b.key));
        Ok(objects)
    }

    fn delete(&self, key: &str) -> Result<()> {
        self.objects.lock().unwrap().remove(key);
        Ok(())
    }

    fn exists(&self, key: &str) -> Result<bool> {
        Ok(self.objects.lock().unwrap().contains_key(key))
    }
}

/// A config whose storage and source trees all live under `root`.
pub fn test_config(root: &Path) -> StackupConfig {
    let yaml = format!(
        r#"
storage:
  local_dir: {backups}
application:
  paths: [{app}]
logs:
  paths: [{logs}]
config_files:
  paths: [{conf}]
services: [app-backend, app-worker]
"#,
        backups = root.join("backups").display(),
        app = root.join("app").display(),
        logs = root.join("logs").display(),
        conf = root.join("conf").display(),
    );
    serde_yaml::from_str(&yaml).expect("test config parses")
}

/// Populate the application/logs/config source trees for `test_config`.
pub fn seed_sources(root: &Path) {
    std::fs::create_dir_all(root.join("app/static")).expect("mkdir");
    std::fs::write(root.join("app/server.py"), b"print('app')\n").expect("write");
    std::fs::write(root.join("app/static/index.html"), b"<html></html>\n").expect("write");
    std::fs::create_dir_all(root.join("logs")).expect("mkdir");
    std::fs::write(root.join("logs/app.log"), b"started\n").expect("write");
    std::fs::create_dir_all(root.join("conf")).expect("mkdir");
    std::fs::write(root.join("conf/app.yaml"), b"debug: false\n").expect("write");
}
