//! The live view of one watched root.
//!
//! [`InMemoryView`] owns the database behind a reader/writer lock and runs
//! two threads: the notify thread turns watcher batches into pending changes
//! and the IO thread drains them through the pipeline. Readers take a
//! [`ViewSnapshot`], which pairs the shared lock with the clock position the
//! snapshot is consistent with.

mod io_thread;
mod notify_thread;
mod results;
mod warm;

use std::ops::Deref;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use crossbeam_channel::Receiver;
use parking_lot::{Mutex, RwLock, RwLockReadGuard};

pub use results::FileResult;

use crate::cache::{ContentHashCache, SymlinkTargetCache};
use crate::clock::{next_root_number, unix_now, Clock, ClockPosition, ClockStamp};
use crate::config::ViewConfig;
use crate::cookie::{CookieRoute, CookieSync};
use crate::database::{AgeOutStats, FileId, ViewDatabase};
use crate::debug::{PipelineCounters, ProcessedPathLog, ViewDebugInfo};
use crate::error::{is_missing_path_error, Result, ViewError};
use crate::pending::{pending_channel, IoMessage, PendingChanges, PendingSender};
use crate::pipeline::Pipeline;
use crate::signal::{Completion, SettleSignal};
use crate::watcher::{NotifyWatcher, Watcher, WatcherFlags};

#[derive(Debug, Default)]
struct CrawlReady {
    /// A full crawl finished and no recrawl is outstanding.
    done: bool,
    /// Created by the first waiter, resolved by the next finished crawl.
    waiter: Option<Arc<Completion>>,
}

#[derive(Debug, Default)]
struct RecrawlInfo {
    count: u64,
    last_reason: Option<String>,
}

pub struct InMemoryView {
    root: PathBuf,
    config: ViewConfig,
    clock: Clock,
    db: RwLock<ViewDatabase>,
    watcher: Arc<dyn Watcher>,
    pipeline: Pipeline,
    sender: PendingSender,
    receiver: Mutex<Option<Receiver<IoMessage>>>,
    cookies: CookieSync,
    content_hashes: Arc<ContentHashCache>,
    symlink_targets: SymlinkTargetCache,
    counters: Arc<PipelineCounters>,
    processed_paths: Arc<ProcessedPathLog>,
    settle: SettleSignal,
    crawl_ready: Mutex<CrawlReady>,
    recrawl_requested: AtomicBool,
    recrawl: Mutex<RecrawlInfo>,
    last_warmed_tick: AtomicU32,
    stopping: AtomicBool,
    threads: Mutex<Vec<JoinHandle<()>>>,
}

/// Shared-lock view of the database, tagged with the clock position it is
/// consistent with. Every change stamped at or before `position()` is
/// visible; every later change has a strictly greater tick.
pub struct ViewSnapshot<'a> {
    db: RwLockReadGuard<'a, ViewDatabase>,
    position: ClockPosition,
}

impl ViewSnapshot<'_> {
    pub fn position(&self) -> ClockPosition {
        self.position
    }

    pub fn file_result(&self, id: FileId) -> Option<FileResult> {
        FileResult::new(&self.db, id)
    }
}

impl Deref for ViewSnapshot<'_> {
    type Target = ViewDatabase;

    fn deref(&self) -> &ViewDatabase {
        &self.db
    }
}

fn canonical_root(root: &Path) -> Result<PathBuf> {
    let canonical = root.canonicalize().map_err(|error| {
        if is_missing_path_error(&error) {
            ViewError::PathNotFound(root.to_path_buf())
        } else {
            ViewError::Io(error)
        }
    })?;
    if !canonical.is_dir() {
        return Err(ViewError::InvalidInput(format!(
            "root is not a directory: {}",
            canonical.display()
        )));
    }
    Ok(canonical)
}

impl InMemoryView {
    /// Creates a view of `root` fed by `watcher`. The watcher must report
    /// paths under the canonical form of `root`.
    pub fn new(root: &Path, watcher: Arc<dyn Watcher>, config: ViewConfig) -> Result<Arc<Self>> {
        let root = canonical_root(root)?;
        let (sender, receiver) = pending_channel(config.pending_channel_capacity);
        let cookies = CookieSync::new(&root);
        let counters = Arc::new(PipelineCounters::default());
        let processed_paths = Arc::new(ProcessedPathLog::new(config.processed_paths_buffer));
        let pipeline = Pipeline::new(
            watcher.clone(),
            root.clone(),
            config.ignored_roots(&root),
            cookies.prefix().clone(),
            counters.clone(),
            processed_paths.clone(),
        );
        let error_ttl = config.cache_error_ttl();

        log::info!(
            "fsview view init root={} watcher={} settle_ms={} gc_age_seconds={}",
            root.display(),
            watcher.name(),
            config.settle_ms,
            config.gc_age_seconds
        );

        Ok(Arc::new(Self {
            db: RwLock::new(ViewDatabase::new(root.clone())),
            clock: Clock::new(next_root_number()),
            content_hashes: Arc::new(ContentHashCache::new(
                config.content_hash_max_items,
                error_ttl,
            )),
            symlink_targets: SymlinkTargetCache::new(config.symlink_target_max_items, error_ttl),
            receiver: Mutex::new(Some(receiver)),
            settle: SettleSignal::default(),
            crawl_ready: Mutex::new(CrawlReady::default()),
            recrawl_requested: AtomicBool::new(false),
            recrawl: Mutex::new(RecrawlInfo::default()),
            last_warmed_tick: AtomicU32::new(0),
            stopping: AtomicBool::new(false),
            threads: Mutex::new(Vec::new()),
            root,
            config,
            watcher,
            pipeline,
            sender,
            cookies,
            counters,
            processed_paths,
        }))
    }

    /// Creates a view backed by a recursive [`NotifyWatcher`] on `root`.
    pub fn watch(root: &Path, config: ViewConfig) -> Result<Arc<Self>> {
        let root = canonical_root(root)?;
        let watcher = NotifyWatcher::new(&root)?;
        Self::new(&root, Arc::new(watcher), config)
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn config(&self) -> &ViewConfig {
        &self.config
    }

    pub fn watcher_name(&self) -> &str {
        self.watcher.name()
    }

    /// Current clock position, read without locking.
    pub fn position(&self) -> ClockPosition {
        self.clock.position()
    }

    pub fn clock_string(&self) -> String {
        self.clock.position().to_clock_string()
    }

    /// Takes the shared lock. Do not call back into the view's locking
    /// methods while holding the snapshot; use its own accessors instead.
    pub fn read(&self) -> ViewSnapshot<'_> {
        let db = self.db.read();
        // Changes are only stamped under the write lock, so none can land at
        // or below this position while the guard lives.
        let position = self.clock.position();
        ViewSnapshot { db, position }
    }

    pub fn file_result(&self, id: FileId) -> Option<FileResult> {
        self.read().file_result(id)
    }

    fn is_stopping(&self) -> bool {
        self.stopping.load(Ordering::Acquire)
    }

    /// Spawns the notify and IO threads. The IO thread starts with a full
    /// crawl of the root.
    pub fn start_threads(self: &Arc<Self>) -> Result<()> {
        let receiver = self.receiver.lock().take().ok_or_else(|| {
            ViewError::InvalidInput(format!(
                "view threads already started for {}",
                self.root.display()
            ))
        })?;

        let io_view = self.clone();
        let io = thread::Builder::new()
            .name("fsview-io".to_string())
            .spawn(move || io_view.io_loop(receiver))?;
        let notify_view = self.clone();
        let notify = thread::Builder::new()
            .name("fsview-notify".to_string())
            .spawn(move || notify_view.notify_loop())?;

        self.threads.lock().extend([io, notify]);
        Ok(())
    }

    /// Stops and joins both threads. Outstanding cookie waits are aborted.
    pub fn stop(&self) {
        if self.stopping.swap(true, Ordering::AcqRel) {
            return;
        }
        log::info!("fsview stopping root={}", self.root.display());
        self.watcher.wake();
        self.sender.wake();
        self.cookies.close();
        self.settle.poke();

        let handles = std::mem::take(&mut *self.threads.lock());
        for handle in handles {
            if handle.join().is_err() {
                log::error!("fsview thread panicked root={}", self.root.display());
            }
        }
    }

    /// Performs the initial full crawl on the calling thread, without any
    /// background threads.
    pub fn client_mode_crawl(&self) {
        self.recrawl_requested.store(false, Ordering::Release);
        let mut pending = PendingChanges::new();
        self.full_crawl(&mut pending, false);
    }

    /// Asks the IO thread to crawl the whole root again. Ready waits block
    /// until that crawl finishes.
    pub fn schedule_recrawl(&self, reason: &str) {
        {
            let mut recrawl = self.recrawl.lock();
            recrawl.count += 1;
            recrawl.last_reason = Some(reason.to_string());
            log::warn!(
                "fsview recrawl scheduled root={} count={} reason={reason}",
                self.root.display(),
                recrawl.count
            );
        }
        {
            // Both change under the lock so a crawl finishing concurrently
            // cannot mark the view ready on behalf of this request.
            let mut ready = self.crawl_ready.lock();
            ready.done = false;
            self.recrawl_requested.store(true, Ordering::Release);
        }
        self.sender.wake();
    }

    pub fn recrawl_count(&self) -> u64 {
        self.recrawl.lock().count
    }

    fn mark_crawl_complete(&self) {
        let mut ready = self.crawl_ready.lock();
        if self.recrawl_requested.load(Ordering::Acquire) {
            return;
        }
        ready.done = true;
        if let Some(waiter) = ready.waiter.take() {
            waiter.complete();
        }
    }

    /// Blocks until a full crawl has completed, or `timeout` passes.
    /// Returns whether the view is ready.
    pub fn wait_until_ready(&self, timeout: Duration) -> bool {
        let waiter = {
            let mut ready = self.crawl_ready.lock();
            if ready.done {
                return true;
            }
            ready.waiter.get_or_insert_with(Completion::new).clone()
        };
        waiter.wait(timeout)
    }

    /// Blocks until the next settle, or `timeout` passes.
    pub fn wait_for_settle(&self, timeout: Duration) -> bool {
        let seen = self.settle.generation();
        self.settle.wait_past(seen, timeout).is_some()
    }

    /// Returns once every change made on disk before the call is reflected
    /// in the view.
    pub fn sync_to_now(&self, timeout: Duration) -> Result<()> {
        if self.is_stopping() {
            return Err(ViewError::Stopped);
        }
        let started = Instant::now();
        let route = if self.watcher.flags().contains(WatcherFlags::REPORTS_COOKIES) {
            CookieRoute::Watcher
        } else {
            CookieRoute::Direct {
                sender: &self.sender,
                clock: &self.clock,
            }
        };
        self.cookies.sync(route, timeout)?;
        log::debug!(
            "fsview synced root={} tick={} elapsed_ms={}",
            self.root.display(),
            self.clock.ticks(),
            started.elapsed().as_millis()
        );
        Ok(())
    }

    /// Removes deleted records last changed more than `min_age` ago.
    pub fn age_out(&self, min_age: Duration) -> AgeOutStats {
        let started = Instant::now();
        let stats = {
            let mut db = self.db.write();
            self.clock.advance();
            db.age_out(min_age, unix_now())
        };
        log::info!(
            "fsview age-out root={} walked={} files_removed={} dirs_removed={} elapsed_ms={}",
            self.root.display(),
            stats.walked,
            stats.files_removed,
            stats.dirs_removed,
            started.elapsed().as_millis()
        );
        stats
    }

    pub fn last_age_out(&self) -> ClockStamp {
        self.db.read().last_age_out()
    }

    pub fn view_debug_info(&self) -> ViewDebugInfo {
        let (file_count, dir_count, last_age_out, position) = {
            let db = self.db.read();
            (
                db.file_count(),
                db.dir_count(),
                db.last_age_out(),
                self.clock.position(),
            )
        };
        let (recrawl_count, last_recrawl_reason) = {
            let recrawl = self.recrawl.lock();
            (recrawl.count, recrawl.last_reason.clone())
        };
        ViewDebugInfo {
            root: self.root.clone(),
            watcher: self.watcher.name().to_string(),
            clock: position.to_clock_string(),
            ticks: position.ticks,
            file_count,
            dir_count,
            recrawl_count,
            last_recrawl_reason,
            last_age_out_tick: last_age_out.ticks,
            last_age_out_timestamp: last_age_out.timestamp,
            last_warmed_tick: self.last_warmed_tick.load(Ordering::Relaxed),
            settle_generation: self.settle.generation(),
            pipeline: self.counters.snapshot(),
            content_hash_cache: self.content_hashes.stats(),
            symlink_target_cache: self.symlink_targets.stats(),
            processed_paths: self.processed_paths.snapshot(),
        }
    }

    /// Resets counters, cache statistics and the processed-path log.
    pub fn clear_view_debug_info(&self) {
        self.counters.reset();
        self.processed_paths.clear();
        self.content_hashes.clear_stats();
        self.symlink_targets.clear_stats();
    }
}
