use super::types::Entry;
use crate::config::StoreConfig;
use crate::error::{Error, Result};

use parking_lot::Mutex;
use std::collections::HashMap;
use std::fs::{File, OpenOptions};
use std::io::{BufWriter, Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::time::{Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;

/// Pending flush signals that force a snapshot before the interval elapses.
pub const FLUSH_BATCH_THRESHOLD: usize = 100;

const MIN_FLUSH_INTERVAL: Duration = Duration::from_millis(1);

/// Versioned key-value map owned by a single node.
///
/// All reads and writes go through one mutex. When a backing file is configured,
/// every accepted mutation sends a signal to a background worker which rewrites
/// the full snapshot either when the flush interval elapses or when more than
/// [`FLUSH_BATCH_THRESHOLD`] signals have piled up.
pub struct StorageEngine {
    shared: Arc<Shared>,
    /// `None` for in-memory engines: nothing to flush, no worker.
    flush_tx: Option<mpsc::UnboundedSender<()>>,
    worker_token: CancellationToken,
}

struct Shared {
    state: Mutex<State>,
    path: Option<PathBuf>,
}

struct State {
    data: HashMap<String, Entry>,
    /// Released on close; a closed engine flushes nothing.
    file: Option<File>,
}

impl StorageEngine {
    pub fn in_memory() -> Self {
        Self {
            shared: Arc::new(Shared {
                state: Mutex::new(State {
                    data: HashMap::new(),
                    file: None,
                }),
                path: None,
            }),
            flush_tx: None,
            worker_token: CancellationToken::new(),
        }
    }

    /// Opens the engine described by `config`.
    ///
    /// With a backing file the whole snapshot is loaded first: a missing or empty
    /// file is an empty store, anything else that fails to decode aborts the open.
    /// The flush worker is spawned on the current tokio runtime and stops when
    /// `shutdown` (or the engine itself) is cancelled.
    pub fn open(config: StoreConfig, shutdown: &CancellationToken) -> Result<Self> {
        let Some(path) = config.path else {
            return Ok(Self::in_memory());
        };

        let runtime = tokio::runtime::Handle::try_current().map_err(|_| {
            Error::Internal("a persistent store must be opened inside a tokio runtime".into())
        })?;

        let (file, data) = load(&path).inspect_err(|e| {
            tracing::error!("Failed loading store {}: {}", path.display(), e);
        })?;

        tracing::info!("Loaded {} entries from {}", data.len(), path.display());

        let shared = Arc::new(Shared {
            state: Mutex::new(State {
                data,
                file: Some(file),
            }),
            path: Some(path),
        });

        let (flush_tx, flush_rx) = mpsc::unbounded_channel();
        let worker_token = shutdown.child_token();

        runtime.spawn(flush_worker(
            shared.clone(),
            flush_rx,
            config.flush_interval.max(MIN_FLUSH_INTERVAL),
            worker_token.clone(),
        ));

        Ok(Self {
            shared,
            flush_tx: Some(flush_tx),
            worker_token,
        })
    }

    /// Stores `entry` unless the current entry for the key has a strictly higher version.
    ///
    /// A stale write is not an error: it returns `Ok(())` and leaves the map untouched.
    pub fn put(&self, entry: Entry) -> Result<()> {
        if entry.key.is_empty() {
            return Err(Error::invalid("key cannot be empty"));
        }

        if entry.version == 0 {
            return Err(Error::invalid("version cannot be empty"));
        }

        {
            let mut state = self.shared.state.lock();
            self.shared.ensure_open(&state)?;

            if let Some(found) = state.data.get(&entry.key)
                && found.version > entry.version
            {
                tracing::debug!(
                    "Dropping stale write for {:?}: version {} < {}",
                    entry.key,
                    entry.version,
                    found.version
                );
                return Ok(());
            }

            state.data.insert(entry.key.clone(), entry);
        }

        self.notify_flush();

        Ok(())
    }

    pub fn get(&self, key: &str) -> Option<Entry> {
        self.shared.state.lock().data.get(key).cloned()
    }

    /// Removes `key`, returning the previous entry. Signals a flush even on a miss.
    pub fn del(&self, key: &str) -> Result<Option<Entry>> {
        let removed = {
            let mut state = self.shared.state.lock();
            self.shared.ensure_open(&state)?;
            state.data.remove(key)
        };

        self.notify_flush();

        Ok(removed)
    }

    pub fn len(&self) -> usize {
        self.shared.state.lock().data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn is_persisted(&self) -> bool {
        self.shared.path.is_some()
    }

    /// Writes the snapshot now, bypassing the batching worker.
    pub fn flush(&self) -> Result<()> {
        self.shared.flush()
    }

    /// Flushes and releases the backing file. Calling it again is a no-op.
    ///
    /// A closed persistent engine still serves reads but refuses mutations.
    pub fn close(&self) -> Result<()> {
        let mut state = self.shared.state.lock();

        if state.file.is_none() {
            return Ok(());
        }

        Shared::write_snapshot(&mut state)?;
        state.file = None;
        self.worker_token.cancel();

        tracing::info!("Store closed");

        Ok(())
    }

    /// Closes the engine and deletes its backing file.
    pub fn clean(&self) -> Result<()> {
        if let Err(e) = self.close() {
            tracing::warn!("Failed closing store before clean: {}", e);
        }

        match &self.shared.path {
            Some(path) => Ok(std::fs::remove_file(path)?),
            None => Ok(()),
        }
    }

    fn notify_flush(&self) {
        if let Some(tx) = &self.flush_tx {
            // The worker only goes away once the engine is closed or shutting down.
            let _ = tx.send(());
        }
    }
}

impl Drop for StorageEngine {
    fn drop(&mut self) {
        self.worker_token.cancel();
    }
}

impl Shared {
    /// Mutations of a persistent engine need the backing file.
    fn ensure_open(&self, state: &State) -> Result<()> {
        if self.path.is_some() && state.file.is_none() {
            return Err(Error::Internal("store closed".to_string()));
        }
        Ok(())
    }

    fn flush(&self) -> Result<()> {
        let mut state = self.state.lock();
        Self::write_snapshot(&mut state)
    }

    fn write_snapshot(state: &mut State) -> Result<()> {
        let State { data, file } = state;

        let Some(file) = file.as_mut() else {
            return Ok(());
        };

        tracing::info!("Flushing {} entries to disk...", data.len());

        file.set_len(0)?;
        file.seek(SeekFrom::Start(0))?;

        {
            let mut writer = BufWriter::new(&mut *file);
            serde_json::to_writer(&mut writer, &*data)?;
            writer.write_all(b"\n")?;
            writer.flush()?;
        }

        file.sync_all()?;

        Ok(())
    }
}

fn load(path: &Path) -> Result<(File, HashMap<String, Entry>)> {
    let mut file = OpenOptions::new()
        .read(true)
        .write(true)
        .create(true)
        .truncate(false)
        .open(path)?;

    let mut raw = String::new();
    file.read_to_string(&mut raw)?;

    if raw.trim().is_empty() {
        return Ok((file, HashMap::new()));
    }

    let data: HashMap<String, Entry> = serde_json::from_str(&raw)?;

    Ok((file, data))
}

/// Consumes flush signals and rewrites the snapshot on whichever comes first:
/// the interval elapsing with work pending, or the batch threshold being crossed.
async fn flush_worker(
    shared: Arc<Shared>,
    mut signals: mpsc::UnboundedReceiver<()>,
    interval: Duration,
    shutdown: CancellationToken,
) {
    let mut pending = 0usize;
    let mut ticker = tokio::time::interval_at(Instant::now() + interval, interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        tokio::select! {
            _ = shutdown.cancelled() => break,

            signal = signals.recv() => {
                let Some(()) = signal else { break };

                pending += 1;

                if pending > FLUSH_BATCH_THRESHOLD {
                    flush_pending(&shared, &mut pending).await;
                    ticker.reset();
                }
            }

            _ = ticker.tick() => {
                if pending > 0 {
                    flush_pending(&shared, &mut pending).await;
                }
            }
        }
    }

    // Signals sent right before cancellation are still queued
    while signals.try_recv().is_ok() {
        pending += 1;
    }

    if pending > 0 {
        flush_pending(&shared, &mut pending).await;
    }

    tracing::debug!("Flush worker stopped");
}

async fn flush_pending(shared: &Arc<Shared>, pending: &mut usize) {
    let shared = shared.clone();

    match tokio::task::spawn_blocking(move || shared.flush()).await {
        Ok(Ok(())) => *pending = 0,
        // Keep the count so the next tick retries.
        Ok(Err(e)) => tracing::error!("Failed flush: {}", e),
        Err(e) => tracing::error!("Flush task failed: {}", e),
    }
}
