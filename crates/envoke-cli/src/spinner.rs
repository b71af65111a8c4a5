//! Thread-safe live progress renderer with per-entry finalize lines.

use std::io::Write;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use indexmap::IndexMap;
use tokio::sync::oneshot;
use tokio::task::JoinHandle;

const CLEAR_LINE: &str = "\x1b[K";
const HIDE_CURSOR: &str = "\x1b[?25l";
const SHOW_CURSOR: &str = "\x1b[?25h";
const FRAMES: [&str; 10] = ["⠋", "⠙", "⠹", "⠸", "⠼", "⠴", "⠦", "⠧", "⠇", "⠏"];
const REFRESH: Duration = Duration::from_millis(100);
const MAX_WIDTH: usize = 120;

/// Live progress renderer.
///
/// `add` and the finalize methods are callable from any thread; renders are
/// serialized by the internal lock. When disabled, renders are no-ops but
/// finalize lines still print.
pub struct Spinner {
    state: Mutex<State>,
    enabled: bool,
    report: AtomicBool,
    stop: Mutex<Option<oneshot::Sender<()>>>,
    worker: Mutex<Option<JoinHandle<()>>>,
}

struct State {
    running: IndexMap<String, Instant>,
    frame_index: usize,
}

impl Spinner {
    pub fn new(enabled: bool) -> Self {
        Self {
            state: Mutex::new(State {
                running: IndexMap::new(),
                frame_index: 0,
            }),
            enabled,
            report: AtomicBool::new(true),
            stop: Mutex::new(None),
            worker: Mutex::new(None),
        }
    }

    /// Hide the cursor and start the render task at ~10 Hz.
    pub fn start(self: &Arc<Self>) {
        if !self.enabled {
            return;
        }
        print!("{HIDE_CURSOR}");
        let _ = std::io::stdout().flush();

        let (stop_tx, mut stop_rx) = oneshot::channel();
        let spinner = Arc::clone(self);
        let handle = tokio::spawn(async move {
            let mut ticker = tokio::time::interval(REFRESH);
            loop {
                tokio::select! {
                    _ = ticker.tick() => spinner.render_frame(),
                    _ = &mut stop_rx => break,
                }
            }
        });
        *self.stop.lock().expect("spinner stop lock") = Some(stop_tx);
        *self.worker.lock().expect("spinner worker lock") = Some(handle);
    }

    /// Stop rendering, clear the line, and restore the cursor.
    pub async fn stop(&self) {
        let stop = self.stop.lock().expect("spinner stop lock").take();
        if let Some(stop) = stop {
            let _ = stop.send(());
        }
        let worker = self.worker.lock().expect("spinner worker lock").take();
        if let Some(worker) = worker {
            let _ = worker.await;
        }
        if self.enabled {
            print!("\r{CLEAR_LINE}{SHOW_CURSOR}");
            let _ = std::io::stdout().flush();
        }
    }

    /// Register an environment as running.
    pub fn add(&self, name: &str) {
        self.state
            .lock()
            .expect("spinner state lock")
            .running
            .insert(name.to_string(), Instant::now());
    }

    pub fn succeed(&self, name: &str) {
        self.finalize(name, "✔ OK");
    }

    pub fn fail(&self, name: &str) {
        self.finalize(name, "✖ FAIL");
    }

    pub fn skip(&self, name: &str) {
        self.finalize(name, "⚠ SKIP");
    }

    /// Suppress finalize lines; renders continue until stop.
    pub fn disable_report(&self) {
        self.report.store(false, Ordering::SeqCst);
    }

    fn finalize(&self, name: &str, status: &str) {
        let elapsed = {
            let mut state = self.state.lock().expect("spinner state lock");
            let started = state.running.shift_remove(name);
            if self.enabled {
                print!("\r{CLEAR_LINE}");
            }
            started.map(|at| at.elapsed()).unwrap_or_default()
        };
        if self.report.load(Ordering::SeqCst) {
            println!("{status} {name} in {}", human_duration(elapsed));
            let _ = std::io::stdout().flush();
        }
    }

    fn render_frame(&self) {
        let mut state = self.state.lock().expect("spinner state lock");
        let frame = FRAMES[state.frame_index];
        state.frame_index = (state.frame_index + 1) % FRAMES.len();
        let names: Vec<&str> = state.running.keys().map(String::as_str).collect();
        let text = truncated(
            &format!("[{}] {}", names.len(), names.join(", ")),
            MAX_WIDTH - 2,
        );
        print!("\r{CLEAR_LINE}{frame} {text}");
        let _ = std::io::stdout().flush();
    }
}

fn truncated(text: &str, width: usize) -> String {
    if text.chars().count() <= width {
        return text.to_string();
    }
    let cut: String = text.chars().take(width.saturating_sub(3)).collect();
    format!("{cut}...")
}

/// Render a duration the way humans read it, e.g. `2 minutes, 3.12 seconds`.
pub fn human_duration(delta: Duration) -> String {
    const PERIODS: [(&str, u64); 5] = [
        ("year", 60 * 60 * 24 * 365),
        ("month", 60 * 60 * 24 * 30),
        ("day", 60 * 60 * 24),
        ("hour", 60 * 60),
        ("minute", 60),
    ];
    let mut seconds = delta.as_secs();
    let mut texts = Vec::new();
    for (name, span) in PERIODS {
        if seconds > span {
            let value = seconds / span;
            seconds %= span;
            let plural = if value > 1 { "s" } else { "" };
            texts.push(format!("{value} {name}{plural}"));
        }
    }
    let fraction = delta.as_secs_f64().fract();
    let secs = ((seconds as f64 + fraction) * 1000.0).round() / 1000.0;
    let plural = if secs != 1.0 { "s" } else { "" };
    texts.push(format!("{secs} second{plural}"));
    texts.join(", ")
}
