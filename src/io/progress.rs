use parking_lot::{const_mutex, Mutex};
use std::sync::atomic::{AtomicU64, Ordering};

type ProgressFn = Box<dyn Fn(u64, u64) + Send + 'static>;

static DOWNLOAD_PROGRESS_CB: Mutex<Option<ProgressFn>> = const_mutex(None);
static LAST_LOGGED_DECILE: AtomicU64 = AtomicU64::new(u64::MAX);

/// Installs the download progress callback, replacing any previous one.
pub fn set_download_progress_callback(cb: impl Fn(u64, u64) + Send + 'static) {
    *DOWNLOAD_PROGRESS_CB.lock() = Some(Box::new(cb));
}

/// Reports `done` of `total` bytes. Without a callback, progress goes to the
/// log every 10%.
pub fn emit_download_progress(done: u64, total: u64) {
    if let Some(cb) = &*DOWNLOAD_PROGRESS_CB.lock() {
        cb(done, total);
        return;
    }

    if total == 0 {
        return;
    }
    let decile = (done.min(total) * 10) / total;
    if LAST_LOGGED_DECILE.swap(decile, Ordering::Relaxed) != decile {
        tracing::info!(done, total, percent = decile * 10, "model download");
    }
}
