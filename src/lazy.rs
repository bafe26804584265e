//! Lazy loading shared by works, users, series and comments.
//!
//! Every entity keeps its fetched fields in a [`LazyCell`]. A cell moves
//! `Unloaded -> Loading -> Loaded` (or `Failed`), and once loaded the value is
//! an immutable snapshot that only an explicit reload replaces.
//!
//! Fields come in two tiers. Cheap metadata goes through [`Loadable::record`],
//! which loads on first access. Expensive content (chapter text, comment
//! threads) lives in its own cell read with [`LazyCell::get_loaded`], which
//! fails with [`Ao3ApiError::Unloaded`] until the matching loader was called.

use crate::errors::Ao3ApiError;
use crate::Result;
use log::debug;
use parking_lot::{Condvar, Mutex};
use std::fmt;
use std::sync::Arc;
use std::thread::{self, JoinHandle};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LoadState {
    Unloaded,
    Loading,
    Loaded,
    /// The last load failed with this message.
    Failed(String),
}

struct Slot<T> {
    state: LoadState,
    value: Option<Arc<T>>,
}

pub struct LazyCell<T> {
    slot: Mutex<Slot<T>>,
    changed: Condvar,
}

impl<T> Default for LazyCell<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> fmt::Debug for LazyCell<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LazyCell")
            .field("state", &self.state())
            .finish_non_exhaustive()
    }
}

/// Marks a cell `Failed` if a loader unwinds before reporting back.
struct Pending<'a, T> {
    cell: &'a LazyCell<T>,
    settled: bool,
}

impl<T> Drop for Pending<'_, T> {
    fn drop(&mut self) {
        if !self.settled {
            let mut slot = self.cell.slot.lock();
            slot.state = LoadState::Failed("load was interrupted".to_string());
            self.cell.changed.notify_all();
        }
    }
}

impl<T> LazyCell<T> {
    pub fn new() -> Self {
        Self {
            slot: Mutex::new(Slot {
                state: LoadState::Unloaded,
                value: None,
            }),
            changed: Condvar::new(),
        }
    }

    /// A cell that starts out loaded, e.g. from a listing page.
    pub fn loaded(value: T) -> Self {
        Self {
            slot: Mutex::new(Slot {
                state: LoadState::Loaded,
                value: Some(Arc::new(value)),
            }),
            changed: Condvar::new(),
        }
    }

    pub fn state(&self) -> LoadState {
        self.slot.lock().state.clone()
    }

    pub fn is_loaded(&self) -> bool {
        self.slot.lock().state == LoadState::Loaded
    }

    /// Latest snapshot, whatever the state.
    pub fn peek(&self) -> Option<Arc<T>> {
        self.slot.lock().value.clone()
    }

    /// Stores `value` unless the cell already holds one.
    pub fn fill(&self, value: T) {
        let mut slot = self.slot.lock();
        if slot.state == LoadState::Unloaded {
            slot.value = Some(Arc::new(value));
            slot.state = LoadState::Loaded;
            self.changed.notify_all();
        }
    }

    /// Auto-load access: runs `load` once if nothing was loaded yet.
    ///
    /// While another thread is loading, callers get the previous snapshot if
    /// there is one and block otherwise.
    pub fn get_or_load<F>(&self, load: F) -> Result<Arc<T>>
    where
        F: FnOnce() -> Result<T>,
    {
        let mut slot = self.slot.lock();
        loop {
            match slot.state.clone() {
                LoadState::Loaded => {
                    if let Some(value) = &slot.value {
                        return Ok(value.clone());
                    }
                    break;
                }
                LoadState::Loading => {
                    if let Some(value) = &slot.value {
                        return Ok(value.clone());
                    }
                    self.changed.wait(&mut slot);
                }
                LoadState::Failed(message) => return Err(Ao3ApiError::LoadFailed(message)),
                LoadState::Unloaded => break,
            }
        }
        slot.state = LoadState::Loading;
        drop(slot);
        self.settle(load)
    }

    /// Secondary access: never loads. `what` names the loader to call.
    pub fn get_loaded(&self, what: &str) -> Result<Arc<T>> {
        let mut slot = self.slot.lock();
        loop {
            match slot.state.clone() {
                LoadState::Loaded => {
                    return slot
                        .value
                        .clone()
                        .ok_or_else(|| Ao3ApiError::unloaded(what.to_string()));
                }
                LoadState::Loading => {
                    if let Some(value) = &slot.value {
                        return Ok(value.clone());
                    }
                    self.changed.wait(&mut slot);
                }
                LoadState::Failed(message) => return Err(Ao3ApiError::LoadFailed(message)),
                LoadState::Unloaded => return Err(Ao3ApiError::unloaded(what.to_string())),
            }
        }
    }

    /// Unconditional load. Waits for an in-flight load to finish first.
    pub fn reload<F>(&self, load: F) -> Result<Arc<T>>
    where
        F: FnOnce() -> Result<T>,
    {
        let mut slot = self.slot.lock();
        while slot.state == LoadState::Loading {
            self.changed.wait(&mut slot);
        }
        slot.state = LoadState::Loading;
        drop(slot);
        self.settle(load)
    }

    fn settle<F>(&self, load: F) -> Result<Arc<T>>
    where
        F: FnOnce() -> Result<T>,
    {
        let mut pending = Pending {
            cell: self,
            settled: false,
        };
        let result = load();
        let mut slot = self.slot.lock();
        pending.settled = true;
        let outcome = match result {
            Ok(value) => {
                let value = Arc::new(value);
                slot.value = Some(value.clone());
                slot.state = LoadState::Loaded;
                Ok(value)
            }
            Err(err) => {
                debug!("load failed: {err}");
                slot.state = LoadState::Failed(err.to_string());
                Err(err)
            }
        };
        self.changed.notify_all();
        outcome
    }
}

/// Join handle for work submitted to a worker thread.
///
/// Dropping the handle detaches the worker; it still runs to completion.
pub struct ThreadHandle<T> {
    handle: JoinHandle<Result<T>>,
}

impl<T> fmt::Debug for ThreadHandle<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ThreadHandle")
            .field("finished", &self.handle.is_finished())
            .finish()
    }
}

impl<T: Send + 'static> ThreadHandle<T> {
    /// Runs `work` on a new OS thread. Each call is one thread; fan-outs over
    /// many entities go through [`reload_all`], which caps how many run at once.
    pub fn spawn<F>(work: F) -> Self
    where
        F: FnOnce() -> Result<T> + Send + 'static,
    {
        Self {
            handle: thread::spawn(work),
        }
    }

    pub fn is_finished(&self) -> bool {
        self.handle.is_finished()
    }

    /// Blocks until the worker is done and hands back its result or error.
    pub fn wait(self) -> Result<T> {
        self.handle
            .join()
            .map_err(|_| Ao3ApiError::GenericError("worker thread panicked".to_string()))?
    }
}

/// An entity whose primary page is fetched on demand.
///
/// Implementors are cheap handles around shared state, so a clone can be
/// moved onto a worker thread.
pub trait Loadable: Clone + Send + Sync + 'static {
    type Record: Send + Sync + 'static;

    fn cell(&self) -> &LazyCell<Self::Record>;

    /// Fetches and parses the primary page. Does not touch the cell.
    fn fetch(&self) -> Result<Self::Record>;

    fn reload(&self) -> Result<()> {
        self.cell().reload(|| self.fetch()).map(|_| ())
    }

    /// Runs [`Loadable::reload`] on a worker thread.
    fn reload_threaded(&self) -> ThreadHandle<()> {
        let this = self.clone();
        ThreadHandle::spawn(move || this.reload())
    }

    /// The loaded record, loading it first if needed.
    fn record(&self) -> Result<Arc<Self::Record>> {
        self.cell().get_or_load(|| self.fetch())
    }

    fn state(&self) -> LoadState {
        self.cell().state()
    }

    fn is_loaded(&self) -> bool {
        self.cell().is_loaded()
    }
}

/// Most worker threads [`reload_all`] keeps alive at once.
pub const MAX_RELOAD_WORKERS: usize = 16;

/// Reloads every entity on worker threads, at most [`MAX_RELOAD_WORKERS`]
/// at a time; results keep input order.
pub fn reload_all<E: Loadable>(entities: &[E]) -> Vec<Result<()>> {
    let mut results = Vec::with_capacity(entities.len());
    for batch in entities.chunks(MAX_RELOAD_WORKERS) {
        let handles: Vec<ThreadHandle<()>> = batch.iter().map(Loadable::reload_threaded).collect();
        results.extend(handles.into_iter().map(ThreadHandle::wait));
    }
    results
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    #[test]
    fn loads_once_then_serves_the_snapshot() {
        let cell = LazyCell::new();
        let calls = AtomicUsize::new(0);
        let load = || {
            calls.fetch_add(1, Ordering::SeqCst);
            Ok(7u32)
        };
        assert_eq!(*cell.get_or_load(load).unwrap(), 7);
        assert_eq!(*cell.get_or_load(|| Ok(8)).unwrap(), 7);
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert_eq!(cell.state(), LoadState::Loaded);
    }

    #[test]
    fn secondary_access_never_loads() {
        let cell: LazyCell<String> = LazyCell::new();
        assert!(matches!(
            cell.get_loaded("call load_chapters() first"),
            Err(Ao3ApiError::Unloaded(_))
        ));
        cell.reload(|| Ok("text".to_string())).unwrap();
        assert_eq!(cell.get_loaded("x").unwrap().as_str(), "text");
    }

    #[test]
    fn failure_sticks_until_reload() {
        let cell: LazyCell<u8> = LazyCell::new();
        let err = cell
            .get_or_load(|| Err(Ao3ApiError::parsing("bad page")))
            .unwrap_err();
        assert!(matches!(err, Ao3ApiError::Parsing(_)));
        assert!(matches!(cell.state(), LoadState::Failed(_)));
        assert!(matches!(
            cell.get_or_load(|| Ok(1)),
            Err(Ao3ApiError::LoadFailed(_))
        ));
        cell.reload(|| Ok(2)).unwrap();
        assert_eq!(*cell.get_or_load(|| Ok(3)).unwrap(), 2);
    }

    #[test]
    fn readers_see_the_old_snapshot_during_reload() {
        let cell = Arc::new(LazyCell::loaded(1u32));
        let worker = {
            let cell = cell.clone();
            thread::spawn(move || {
                cell.reload(|| {
                    thread::sleep(Duration::from_millis(100));
                    Ok(2)
                })
            })
        };
        thread::sleep(Duration::from_millis(20));
        assert_eq!(cell.state(), LoadState::Loading);
        assert_eq!(*cell.get_or_load(|| Ok(99)).unwrap(), 1);
        worker.join().unwrap().unwrap();
        assert_eq!(*cell.get_or_load(|| Ok(99)).unwrap(), 2);
    }

    #[test]
    fn first_load_blocks_concurrent_readers() {
        let cell: Arc<LazyCell<u32>> = Arc::new(LazyCell::new());
        let calls = Arc::new(AtomicUsize::new(0));
        let readers: Vec<_> = (0..4)
            .map(|_| {
                let cell = cell.clone();
                let calls = calls.clone();
                thread::spawn(move || {
                    *cell
                        .get_or_load(|| {
                            calls.fetch_add(1, Ordering::SeqCst);
                            thread::sleep(Duration::from_millis(50));
                            Ok(5)
                        })
                        .unwrap()
                })
            })
            .collect();
        for reader in readers {
            assert_eq!(reader.join().unwrap(), 5);
        }
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[derive(Clone)]
    struct CountedLoad {
        id: usize,
        cell: Arc<LazyCell<usize>>,
        running: Arc<AtomicUsize>,
        peak: Arc<AtomicUsize>,
    }

    impl Loadable for CountedLoad {
        type Record = usize;

        fn cell(&self) -> &LazyCell<usize> {
            &self.cell
        }

        fn fetch(&self) -> Result<usize> {
            let now = self.running.fetch_add(1, Ordering::SeqCst) + 1;
            self.peak.fetch_max(now, Ordering::SeqCst);
            thread::sleep(Duration::from_millis(10));
            self.running.fetch_sub(1, Ordering::SeqCst);
            if self.id == 7 {
                return Err(Ao3ApiError::parsing("bad page"));
            }
            Ok(self.id)
        }
    }

    #[test]
    fn reload_all_caps_its_workers_and_keeps_order() {
        let running = Arc::new(AtomicUsize::new(0));
        let peak = Arc::new(AtomicUsize::new(0));
        let entities: Vec<CountedLoad> = (0..MAX_RELOAD_WORKERS * 2 + 3)
            .map(|id| CountedLoad {
                id,
                cell: Arc::new(LazyCell::new()),
                running: running.clone(),
                peak: peak.clone(),
            })
            .collect();
        let results = reload_all(&entities);
        assert_eq!(results.len(), entities.len());
        assert!(peak.load(Ordering::SeqCst) <= MAX_RELOAD_WORKERS);
        for (entity, result) in entities.iter().zip(&results) {
            assert_eq!(result.is_ok(), entity.id != 7);
        }
        assert_eq!(*entities[20].record().unwrap(), 20);
    }

    #[test]
    fn thread_handle_reports_errors() {
        let handle: ThreadHandle<()> =
            ThreadHandle::spawn(|| Err(Ao3ApiError::auth("stale token")));
        assert!(handle.wait().unwrap_err().is_auth());
    }
}
