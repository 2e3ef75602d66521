//! Cookie files for "sync to now".
//!
//! A caller writes a uniquely named file into the root and waits until the
//! pipeline reports having processed it. When the watcher reports the cookie
//! it arrives behind every event the watcher saw before it, so everything that
//! happened on disk before the cookie was written is then reflected in the
//! view. A cookie observed during a desynced pass proves nothing, so the IO
//! thread aborts outstanding cookies instead and the caller retries with a
//! fresh one.

use std::ffi::OsString;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use fnv::FnvHashMap;
use parking_lot::{Condvar, Mutex};

use crate::clock::Clock;
use crate::error::{Result, ViewError};
use crate::pending::{PendingChange, PendingFlags, PendingSender};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CookieState {
    Pending,
    Observed,
    /// Seen in a desynced pass, or the view is shutting down.
    Aborted,
}

#[derive(Debug)]
pub struct Cookie {
    path: PathBuf,
    state: Mutex<CookieState>,
    cond: Condvar,
}

impl Cookie {
    pub fn path(&self) -> &Path {
        &self.path
    }

    fn resolve(&self, state: CookieState) {
        let mut current = self.state.lock();
        if *current == CookieState::Pending {
            *current = state;
            self.cond.notify_all();
        }
    }

    /// Waits until the cookie leaves the pending state or `deadline` passes.
    pub fn wait_until(&self, deadline: Instant) -> CookieState {
        let mut state = self.state.lock();
        while *state == CookieState::Pending {
            if self.cond.wait_until(&mut state, deadline).timed_out() {
                break;
            }
        }
        *state
    }
}

/// How a cookie reaches the IO thread.
#[derive(Clone, Copy)]
pub enum CookieRoute<'a> {
    /// The watcher reports the cookie file like any other change.
    Watcher,
    /// Queued straight to the IO thread, for watchers that never report
    /// files in the root. Changes still held by the watcher may be missed.
    Direct {
        sender: &'a PendingSender,
        clock: &'a Clock,
    },
}

#[derive(Debug)]
pub struct CookieSync {
    dir: PathBuf,
    prefix: OsString,
    serial: AtomicU64,
    outstanding: Mutex<FnvHashMap<PathBuf, Arc<Cookie>>>,
    closed: AtomicBool,
}

impl CookieSync {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self {
            dir: dir.into(),
            prefix: OsString::from(format!(".fsview-cookie-{}-", std::process::id())),
            serial: AtomicU64::new(1),
            outstanding: Mutex::new(FnvHashMap::default()),
            closed: AtomicBool::new(false),
        }
    }

    /// File name prefix shared by every cookie of this process.
    pub fn prefix(&self) -> &OsString {
        &self.prefix
    }

    pub fn outstanding(&self) -> usize {
        self.outstanding.lock().len()
    }

    /// Registers a new cookie and writes its file.
    pub fn create(&self) -> Result<Arc<Cookie>> {
        if self.closed.load(Ordering::Acquire) {
            return Err(ViewError::Stopped);
        }
        let serial = self.serial.fetch_add(1, Ordering::Relaxed);
        let mut name = self.prefix.clone();
        name.push(serial.to_string());
        let cookie = Arc::new(Cookie {
            path: self.dir.join(name),
            state: Mutex::new(CookieState::Pending),
            cond: Condvar::new(),
        });

        self.outstanding
            .lock()
            .insert(cookie.path.clone(), cookie.clone());
        if let Err(error) = std::fs::write(&cookie.path, b"") {
            self.outstanding.lock().remove(&cookie.path);
            return Err(ViewError::Io(error));
        }
        Ok(cookie)
    }

    /// Marks the cookie at `path` observed. Unknown paths are ignored; they
    /// belong to cookies that already finished.
    pub fn notify_cookie(&self, path: &Path) {
        if let Some(cookie) = self.outstanding.lock().remove(path) {
            cookie.resolve(CookieState::Observed);
        }
    }

    pub fn abort_all(&self) {
        let aborted: Vec<_> = self.outstanding.lock().drain().map(|(_, c)| c).collect();
        if !aborted.is_empty() {
            log::info!("fsview aborting cookies count={}", aborted.len());
        }
        for cookie in aborted {
            cookie.resolve(CookieState::Aborted);
        }
    }

    /// Aborts outstanding cookies and refuses new ones.
    pub fn close(&self) {
        self.closed.store(true, Ordering::Release);
        self.abort_all();
    }

    fn finish(&self, cookie: &Cookie) {
        self.outstanding.lock().remove(&cookie.path);
        if let Err(error) = std::fs::remove_file(&cookie.path) {
            if error.kind() != std::io::ErrorKind::NotFound {
                log::debug!(
                    "fsview cookie cleanup failed path={} error={error}",
                    cookie.path.display()
                );
            }
        }
    }

    /// Writes cookies until one is observed by a clean pass or `timeout`
    /// runs out.
    pub fn sync(&self, route: CookieRoute<'_>, timeout: Duration) -> Result<()> {
        let deadline = Instant::now() + timeout;
        loop {
            let cookie = self.create()?;
            if let CookieRoute::Direct { sender, clock } = route {
                let queued = sender.send(vec![PendingChange::new(
                    cookie.path.clone(),
                    clock.stamp(),
                    PendingFlags::VIA_NOTIFY,
                )]);
                if let Err(error) = queued {
                    self.finish(&cookie);
                    return Err(error);
                }
            }

            let state = cookie.wait_until(deadline);
            self.finish(&cookie);
            match state {
                CookieState::Observed => return Ok(()),
                CookieState::Aborted if self.closed.load(Ordering::Acquire) => {
                    return Err(ViewError::Stopped);
                }
                CookieState::Aborted if Instant::now() < deadline => {
                    log::debug!("fsview cookie aborted, retrying path={}", cookie.path.display());
                }
                CookieState::Aborted | CookieState::Pending => {
                    return Err(ViewError::SyncTimeout { timeout });
                }
            }
        }
    }
}
