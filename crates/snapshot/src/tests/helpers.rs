use std::fs;
use std::io::{self, Read, Write};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use matrix::PartitionManager;
use namespace::{FileStatus, LocalNamespace, Namespace};

use crate::*;

/// Local namespace whose operations can be made to fail on demand.
#[derive(Default)]
pub struct FaultyNamespace {
    inner: LocalNamespace,
    pub fail_create: AtomicBool,
    pub fail_rename: AtomicBool,
    pub fail_delete: AtomicBool,
    pub fail_list: AtomicBool,
    pub renames: AtomicUsize,
}

impl FaultyNamespace {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }
}

fn injected(op: &str) -> io::Error {
    io::Error::new(io::ErrorKind::Other, format!("injected {} failure", op))
}

impl Namespace for FaultyNamespace {
    fn exists(&self, path: &Path) -> io::Result<bool> {
        self.inner.exists(path)
    }

    fn mkdirs(&self, path: &Path) -> io::Result<()> {
        self.inner.mkdirs(path)
    }

    fn create(&self, path: &Path) -> io::Result<Box<dyn Write + Send>> {
        if self.fail_create.load(Ordering::SeqCst) {
            return Err(injected("create"));
        }
        self.inner.create(path)
    }

    fn open(&self, path: &Path) -> io::Result<Box<dyn Read + Send>> {
        self.inner.open(path)
    }

    fn rename(&self, src: &Path, dst: &Path) -> io::Result<()> {
        if self.fail_rename.load(Ordering::SeqCst) {
            return Err(injected("rename"));
        }
        self.renames.fetch_add(1, Ordering::SeqCst);
        self.inner.rename(src, dst)
    }

    fn delete(&self, path: &Path, recursive: bool) -> io::Result<bool> {
        if self.fail_delete.load(Ordering::SeqCst) {
            return Err(injected("delete"));
        }
        self.inner.delete(path, recursive)
    }

    fn list_status(&self, path: &Path) -> io::Result<Vec<FileStatus>> {
        if self.fail_list.load(Ordering::SeqCst) {
            return Err(injected("list"));
        }
        self.inner.list_status(path)
    }
}

/// Coordinator returning a fixed answer and counting calls.
pub struct StaticCoordinator {
    response: Result<Vec<TaskMatrixClock>, CoordinatorError>,
    pub calls: AtomicUsize,
    pub last_attempt: Mutex<Option<WorkerAttemptId>>,
}

impl StaticCoordinator {
    pub fn answering(clocks: Vec<TaskMatrixClock>) -> Arc<Self> {
        Arc::new(Self {
            response: Ok(clocks),
            calls: AtomicUsize::new(0),
            last_attempt: Mutex::new(None),
        })
    }

    pub fn unreachable() -> Arc<Self> {
        Arc::new(Self {
            response: Err(CoordinatorError::Unreachable("connection refused".to_string())),
            calls: AtomicUsize::new(0),
            last_attempt: Mutex::new(None),
        })
    }
}

impl Coordinator for StaticCoordinator {
    fn task_matrix_clocks(
        &self,
        attempt: &WorkerAttemptId,
    ) -> Result<Vec<TaskMatrixClock>, CoordinatorError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        *self.last_attempt.lock().unwrap() = Some(*attempt);
        self.response.clone()
    }
}

/// Engine whose serialization always fails after writing a few bytes.
pub struct FailingEngine;

impl MatrixPartitionEngine for FailingEngine {
    fn write_matrix(&self, output: &mut dyn Write) -> Result<(), EngineError> {
        output.write_all(b"half")?;
        Err("serialization exploded".into())
    }

    fn parse_matrices_from_input(&self, _input: &mut dyn Read) -> Result<(), EngineError> {
        Err("cannot parse".into())
    }

    fn set_clock(&self, _matrix_id: u32, _task_index: u32, _clock: u32) {}
}

/// Engine that, while serializing, records which files are visible in the
/// attempt directory and whether the temporary artifact exists.
pub struct ProbeEngine {
    pub paths: SnapshotPaths,
    pub observed: Mutex<Vec<(Vec<String>, bool)>>,
}

impl MatrixPartitionEngine for ProbeEngine {
    fn write_matrix(&self, output: &mut dyn Write) -> Result<(), EngineError> {
        output.write_all(b"partial image ")?;
        let names = snapshot_names(&self.paths.base_dir());
        let temp_exists = self.paths.temp_file().exists();
        self.observed.lock().unwrap().push((names, temp_exists));
        output.write_all(b"complete")?;
        Ok(())
    }

    fn parse_matrices_from_input(&self, _input: &mut dyn Read) -> Result<(), EngineError> {
        Ok(())
    }

    fn set_clock(&self, _matrix_id: u32, _task_index: u32, _clock: u32) {}
}

/// Names of completed snapshot files in `dir`, sorted.
pub fn snapshot_names(dir: &Path) -> Vec<String> {
    let mut names: Vec<String> = match fs::read_dir(dir) {
        Ok(entries) => entries
            .filter_map(|e| e.ok())
            .filter(|e| e.path().is_file())
            .map(|e| e.file_name().to_string_lossy().into_owned())
            .filter(|n| n.starts_with(SNAPSHOT_FILE_PREFIX))
            .collect(),
        Err(_) => Vec::new(),
    };
    names.sort();
    names
}

/// Creates `<root>/snapshots/<worker>/<attempt>/` holding the given files.
pub fn seed_attempt(root: &Path, worker: u32, attempt: u32, files: &[&str]) -> PathBuf {
    let paths = SnapshotPaths::new(root, WorkerAttemptId::new(worker, attempt));
    let dir = paths.base_dir();
    fs::create_dir_all(&dir).unwrap();
    for name in files {
        fs::write(dir.join(name), name.as_bytes()).unwrap();
    }
    dir
}

/// Matrix state used across tests: two matrices, rows and clocks.
pub fn sample_engine() -> Arc<PartitionManager> {
    let pm = Arc::new(PartitionManager::new());
    pm.create_matrix(1);
    pm.increment(1, 0, 3.0);
    pm.increment(1, 5, 1.25);
    pm.set_clock(1, 0, 2);
    pm.create_matrix(2);
    pm.increment(2, 9, -4.0);
    pm
}

pub fn writer_for(
    root: &Path,
    attempt: WorkerAttemptId,
    namespace: Arc<dyn Namespace>,
    engine: Arc<dyn MatrixPartitionEngine>,
) -> SnapshotWriter {
    let paths = SnapshotPaths::new(root, attempt);
    fs::create_dir_all(paths.temp_dir()).unwrap();
    SnapshotWriter::new(namespace, engine, paths)
}

pub fn settings(root: &Path, interval_ms: u64) -> SnapshotSettings {
    SnapshotSettings::new(root, Duration::from_millis(interval_ms))
}

/// Polls `cond` until it holds or `timeout` elapses.
pub fn wait_until<F: Fn() -> bool>(timeout: Duration, cond: F) -> bool {
    let deadline = Instant::now() + timeout;
    while Instant::now() < deadline {
        if cond() {
            return true;
        }
        std::thread::sleep(Duration::from_millis(5));
    }
    cond()
}
