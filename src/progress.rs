//! Progress tracking for the generate and validate pipelines.
//!
//! Each worker owns one counter slot and increments it without ever touching
//! another worker's slot, so the hot path has no contention. A single watcher
//! thread sums the slots once per second and repaints a live bar on stderr;
//! the display tolerates stale reads. On shutdown the watcher paints one
//! final total and terminates.

use crossbeam_channel::{bounded, tick, Sender};
use std::io::Write;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::Duration;

/// One `AtomicU64` slot per worker. Workers write their own slot; only the
/// watcher reads across slots.
pub struct WorkerCounters {
    slots: Box<[AtomicU64]>,
}

impl WorkerCounters {
    pub fn new(workers: usize) -> Arc<Self> {
        let slots = (0..workers).map(|_| AtomicU64::new(0)).collect();
        Arc::new(WorkerCounters { slots })
    }

    /// Increments the given worker's slot by one.
    pub fn bump(&self, slot: usize) {
        self.slots[slot].fetch_add(1, Ordering::Relaxed);
    }

    /// Value of a single slot.
    pub fn get(&self, slot: usize) -> u64 {
        self.slots[slot].load(Ordering::Relaxed)
    }

    /// Sum over all slots. Relaxed reads; the result may lag a little, which
    /// is fine for both the display and the final post-join summation (after
    /// join the workers have stopped writing).
    pub fn total(&self) -> u64 {
        self.slots.iter().map(|s| s.load(Ordering::Relaxed)).sum()
    }

    pub fn slot_count(&self) -> usize {
        self.slots.len()
    }
}

/// Handle to the background watcher thread. Dropping without calling
/// [`ProgressWatcher::stop`] detaches the thread, so call it.
pub struct ProgressWatcher {
    stop_tx: Sender<()>,
    handle: JoinHandle<()>,
}

impl ProgressWatcher {
    /// Spawns the watcher. `total` is `Some(n)` for a determinate bar
    /// (validate knows the header count) and `None` for an indeterminate
    /// item ticker (generate cannot know the tree size up front).
    pub fn spawn(label: &'static str, counters: Arc<WorkerCounters>, total: Option<u64>) -> Self {
        let (stop_tx, stop_rx) = bounded::<()>(1);
        let handle = std::thread::spawn(move || {
            let ticker = tick(Duration::from_secs(1));
            loop {
                crossbeam_channel::select! {
                    recv(ticker) -> _ => {
                        render(label, counters.total(), total, false);
                    }
                    recv(stop_rx) -> _ => {
                        render(label, counters.total(), total, true);
                        break;
                    }
                }
            }
        });
        ProgressWatcher { stop_tx, handle }
    }

    /// Emits the final total and joins the watcher thread.
    pub fn stop(self) {
        let _ = self.stop_tx.send(());
        let _ = self.handle.join();
    }
}

const BAR_WIDTH: usize = 40;

fn render(label: &str, current: u64, total: Option<u64>, last: bool) {
    let line = match total {
        Some(total) if total > 0 => {
            let capped = current.min(total);
            let filled = (capped as usize * BAR_WIDTH) / total as usize;
            let percent = (capped as f64 / total as f64) * 100.0;
            format!(
                "[{}] [{}{}] {:.1}% | {}/{} items",
                label,
                "█".repeat(filled),
                "░".repeat(BAR_WIDTH - filled),
                percent,
                capped,
                total
            )
        }
        _ => format!("[{}] {} items", label, current),
    };

    // Clear-line + carriage return keeps repaints on a single terminal row.
    eprint!("\r\x1B[2K{}", line);
    let _ = std::io::stderr().flush();
    if last {
        eprintln!();
    }
}
