use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::sync::mpsc::{channel, Receiver, Sender};
use std::sync::{Arc, Mutex, MutexGuard};
use std::thread::JoinHandle;

use serde::{Deserialize, Serialize};

use crate::engine::{Grid, Score};
use crate::error::{Error, Result};

/// UserData is the persisted game: the resumable grid (if any) and both scores.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserData {
    #[serde(default)]
    pub grid: Option<Grid>,
    #[serde(default)]
    pub current_score: Score,
    #[serde(default)]
    pub best_score: Score,
}

/// GameStore is the persistence backend consumed by the presenter.
pub trait GameStore {
    /// Returns the last saved game, or `UserData::default()` if nothing was ever saved.
    fn fetch(&mut self) -> Result<UserData>;
    fn update(&mut self, data: &UserData) -> Result<()>;
}

#[derive(Default)]
struct MemoryStoreInner {
    data: UserData,
    writes: Vec<UserData>,
}

/// MemoryStore keeps the saved game in memory and remembers every write it received. Clones share
/// the same storage.
#[derive(Clone, Default)]
pub struct MemoryStore {
    inner: Arc<Mutex<MemoryStoreInner>>,
}

impl MemoryStore {
    pub fn new(data: UserData) -> Self {
        Self {
            inner: Arc::new(Mutex::new(MemoryStoreInner {
                data,
                writes: Vec::new(),
            })),
        }
    }

    /// Every write received so far, oldest first.
    pub fn writes(&self) -> Vec<UserData> {
        self.lock().writes.clone()
    }

    pub fn data(&self) -> UserData {
        self.lock().data.clone()
    }

    fn lock(&self) -> MutexGuard<MemoryStoreInner> {
        self.inner
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

impl GameStore for MemoryStore {
    fn fetch(&mut self) -> Result<UserData> {
        Ok(self.lock().data.clone())
    }

    fn update(&mut self, data: &UserData) -> Result<()> {
        let mut inner = self.lock();
        inner.data = data.clone();
        inner.writes.push(data.clone());
        Ok(())
    }
}

/// JsonFileStore saves the game as a JSON document on disk.
pub struct JsonFileStore {
    path: PathBuf,
}

impl JsonFileStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl GameStore for JsonFileStore {
    fn fetch(&mut self) -> Result<UserData> {
        let contents = match fs::read_to_string(&self.path) {
            Ok(contents) => contents,
            Err(e) if e.kind() == ErrorKind::NotFound => {
                log::debug!("no saved game at {}", self.path.display());
                return Ok(UserData::default());
            }
            Err(e) => return Err(e.into()),
        };
        Ok(serde_json::from_str(&contents)?)
    }

    fn update(&mut self, data: &UserData) -> Result<()> {
        // write a sibling file first so a crash never leaves a truncated save behind
        let mut tmp = self.path.clone().into_os_string();
        tmp.push(".tmp");
        let tmp = PathBuf::from(tmp);
        fs::write(&tmp, serde_json::to_vec(data)?)?;
        fs::rename(&tmp, &self.path)?;
        Ok(())
    }
}

enum Request {
    Fetch(Sender<Result<UserData>>),
    Update(UserData),
    Flush(Sender<()>),
}

/// Persister runs a GameStore on its own thread. Updates are queued without waiting and reach
/// the store in the order they were issued; a fetch waits behind every queued update.
pub struct Persister {
    sender: Option<Sender<Request>>,
    worker: Option<JoinHandle<()>>,
}

impl Persister {
    pub fn spawn<S: GameStore + Send + 'static>(store: S) -> Result<Self> {
        let (sender, receiver) = channel();
        let worker = std::thread::Builder::new()
            .name("engine48-persister".into())
            .spawn(move || Self::work(store, receiver))?;
        Ok(Self {
            sender: Some(sender),
            worker: Some(worker),
        })
    }

    fn work<S: GameStore>(mut store: S, receiver: Receiver<Request>) {
        while let Ok(request) = receiver.recv() {
            match request {
                Request::Fetch(reply) => {
                    let _ = reply.send(store.fetch());
                }
                Request::Flush(reply) => {
                    let _ = reply.send(());
                }
                Request::Update(data) => {
                    log::trace!(
                        "saving game: current score {}, best score {}",
                        data.current_score,
                        data.best_score
                    );
                    if let Err(e) = store.update(&data) {
                        log::error!("failed to save game: {}", e);
                    }
                }
            }
        }
        log::debug!("persister queue closed");
    }

    fn send(&self, request: Request) -> Result<()> {
        self.sender
            .as_ref()
            .ok_or(Error::PersisterGone)?
            .send(request)
            .map_err(|_| Error::PersisterGone)
    }

    /// Blocks until the store answers.
    pub fn fetch(&self) -> Result<UserData> {
        let (reply, answer) = channel();
        self.send(Request::Fetch(reply))?;
        answer.recv().map_err(|_| Error::PersisterGone)?
    }

    /// Blocks until every update queued before this call has reached the store.
    pub fn flush(&self) -> Result<()> {
        let (reply, done) = channel();
        self.send(Request::Flush(reply))?;
        done.recv().map_err(|_| Error::PersisterGone)
    }

    /// Queues a write and returns immediately.
    pub fn update(&self, data: UserData) -> Result<()> {
        self.send(Request::Update(data))
    }
}

impl Drop for Persister {
    fn drop(&mut self) {
        drop(self.sender.take());
        if let Some(worker) = self.worker.take() {
            if worker.join().is_err() {
                log::error!("persister thread panicked");
            }
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::engine::GRID_SIZE;

    fn temp_path(name: &str) -> PathBuf {
        std::env::temp_dir().join(format!("engine48-{}-{}.json", name, std::process::id()))
    }

    fn data(score: Score) -> UserData {
        let mut values = [[None; GRID_SIZE]; GRID_SIZE];
        values[0][0] = Some(2);
        values[3][3] = Some(1024);
        UserData {
            grid: Some(Grid::from_values(values).unwrap()),
            current_score: score,
            best_score: score * 2,
        }
    }

    #[test]
    fn json_field_names() {
        let encoded = serde_json::to_value(UserData {
            grid: None,
            current_score: 4,
            best_score: 8,
        })
        .unwrap();
        assert_eq!(
            encoded,
            serde_json::json!({"grid": null, "currentScore": 4, "bestScore": 8})
        );
    }

    #[test]
    fn decode_missing_fields_as_default() {
        let decoded: UserData = serde_json::from_str("{}").unwrap();
        assert_eq!(decoded, UserData::default());
    }

    #[test]
    fn decode_rejects_bad_tile() {
        let decoded = serde_json::from_str::<UserData>(
            r#"{"grid": [[3,null,null,null],[null,null,null,null],[null,null,null,null],[null,null,null,null]], "currentScore": 0, "bestScore": 0}"#,
        );
        assert!(decoded.is_err());
    }

    #[test]
    fn json_file_missing_is_default() {
        let mut store = JsonFileStore::new(temp_path("missing"));
        let _ = fs::remove_file(store.path());
        assert_eq!(store.fetch().unwrap(), UserData::default());
    }

    #[test]
    fn json_file_update_then_fetch() {
        let path = temp_path("roundtrip");
        let mut store = JsonFileStore::new(&path);
        let saved = data(16);
        store.update(&saved).unwrap();
        let fetched = store.fetch().unwrap();
        let _ = fs::remove_file(&path);

        assert_eq!(fetched.current_score, 16);
        assert_eq!(fetched.best_score, 32);
        assert_eq!(
            fetched.grid.map(|g| g.values()),
            saved.grid.map(|g| g.values())
        );
    }

    #[test]
    fn persister_preserves_write_order() {
        let store = MemoryStore::default();
        {
            let persister = Persister::spawn(store.clone()).unwrap();
            for score in 1..=50 {
                persister.update(data(score)).unwrap();
            }
        }
        let scores = store
            .writes()
            .iter()
            .map(|d| d.current_score)
            .collect::<Vec<_>>();
        assert_eq!(scores, (1..=50).collect::<Vec<_>>());
        assert_eq!(store.data().current_score, 50);
    }

    #[test]
    fn persister_fetch_sees_queued_updates() {
        let store = MemoryStore::default();
        let persister = Persister::spawn(store).unwrap();
        persister.update(data(8)).unwrap();
        assert_eq!(persister.fetch().unwrap().current_score, 8);
    }

    struct FailingStore;

    impl GameStore for FailingStore {
        fn fetch(&mut self) -> Result<UserData> {
            Ok(UserData::default())
        }

        fn update(&mut self, _data: &UserData) -> Result<()> {
            Err(std::io::Error::new(ErrorKind::Other, "disk full").into())
        }
    }

    #[test]
    fn persister_survives_failed_updates() {
        let persister = Persister::spawn(FailingStore).unwrap();
        persister.update(data(2)).unwrap();
        persister.update(data(4)).unwrap();
        assert_eq!(persister.fetch().unwrap(), UserData::default());
    }
}
