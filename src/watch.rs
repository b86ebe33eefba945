//! Watch mode: re-execute when input files or the configuration change.
//!
//! ```text
//! input watcher  ──push path──▶ changes ─┐
//! config watcher ──set flag───▶ new_engine ├─▶ wake (bounded(1)) ─▶ loop
//! Ctrl-C / Enter ──set flag───▶ exit ─────┘
//! ```
//!
//! Every producer pushes its state first and then signals the wake channel.
//! The channel holds at most one pending wake, so any burst of events between
//! two wake-ups is handled by a single pass:
//!
//! - `exit` set: stop, dropping the engine and the watchers.
//! - `new_engine` set: drop the engine, build and execute a fresh one, and
//!   discard queued changes (the new run reads everything anyway).
//! - otherwise: drain the queue into a distinct set of paths and re-execute
//!   once if it is non-empty.
//!
//! A failing run is logged by the engine and the loop keeps waiting.

use crate::config::ConfigError;
use crate::engine::{Engine, EngineError, ExecutionSummary};
use crossbeam_channel::{Receiver, Sender, bounded};
use notify::{Event, EventKind, RecommendedWatcher, RecursiveMode, Watcher};
use std::collections::BTreeSet;
use std::io::BufRead;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use thiserror::Error;
use tracing::{debug, error, info, warn};

#[derive(Error, Debug)]
pub enum WatchError {
    #[error("File watcher error: {0}")]
    Notify(#[from] notify::Error),
    #[error("Could not install Ctrl-C handler: {0}")]
    Signal(#[from] ctrlc::Error),
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error(transparent)]
    Engine(#[from] EngineError),
}

/// State shared between the watchers, the exit triggers and the loop.
pub struct WatchSignals {
    wake: Sender<()>,
    changes: Mutex<Vec<PathBuf>>,
    new_engine: AtomicBool,
    exit: AtomicBool,
}

impl WatchSignals {
    /// Signals plus the receiving end of the wake channel.
    pub fn new() -> (Arc<Self>, Receiver<()>) {
        let (wake, wake_rx) = bounded(1);
        let signals = Arc::new(Self {
            wake,
            changes: Mutex::new(Vec::new()),
            new_engine: AtomicBool::new(false),
            exit: AtomicBool::new(false),
        });
        (signals, wake_rx)
    }

    /// Queue a changed input path.
    pub fn path_changed(&self, path: PathBuf) {
        self.lock_changes().push(path);
        self.wake();
    }

    /// Ask for a fresh engine on the next wake.
    pub fn config_changed(&self) {
        self.new_engine.store(true, Ordering::SeqCst);
        self.wake();
    }

    pub fn request_exit(&self) {
        self.exit.store(true, Ordering::SeqCst);
        self.wake();
    }

    pub fn exit_requested(&self) -> bool {
        self.exit.load(Ordering::SeqCst)
    }

    // A full channel already holds a pending wake.
    fn wake(&self) {
        let _ = self.wake.try_send(());
    }

    fn take_changes(&self) -> Vec<PathBuf> {
        std::mem::take(&mut *self.lock_changes())
    }

    fn lock_changes(&self) -> std::sync::MutexGuard<'_, Vec<PathBuf>> {
        self.changes.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// What one wake-up did.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WakeOutcome {
    Exit,
    /// A new engine was built (and executed, if building succeeded).
    NewEngine,
    /// The current engine re-executed for this many distinct paths.
    Executed { changed: usize },
    /// Nothing queued.
    Idle,
}

type EngineFactory = dyn FnMut() -> Result<Engine, WatchError>;
type Reporter = dyn FnMut(&ExecutionSummary);

/// The rebuild loop. The only caller of [`Engine::execute`] in watch mode.
pub struct WatchLoop {
    signals: Arc<WatchSignals>,
    wake_rx: Receiver<()>,
    factory: Box<EngineFactory>,
    reporter: Option<Box<Reporter>>,
    engine: Option<Engine>,
}

impl WatchLoop {
    pub fn new(factory: impl FnMut() -> Result<Engine, WatchError> + 'static) -> Self {
        let (signals, wake_rx) = WatchSignals::new();
        Self {
            signals,
            wake_rx,
            factory: Box::new(factory),
            reporter: None,
            engine: None,
        }
    }

    /// Called with the summary of every successful run.
    pub fn with_reporter(mut self, reporter: impl FnMut(&ExecutionSummary) + 'static) -> Self {
        self.reporter = Some(Box::new(reporter));
        self
    }

    pub fn signals(&self) -> &Arc<WatchSignals> {
        &self.signals
    }

    pub fn engine(&self) -> Option<&Engine> {
        self.engine.as_ref()
    }

    /// Build and execute the first engine.
    pub fn start(&mut self) -> Result<(), WatchError> {
        let mut engine = (self.factory)()?;
        self.execute(&mut engine);
        self.engine = Some(engine);
        Ok(())
    }

    /// Block until woken, then handle everything queued since the last wake.
    ///
    /// Returns `Exit` if every wake sender is gone.
    pub fn wait(&mut self) -> WakeOutcome {
        if self.wake_rx.recv().is_err() {
            return WakeOutcome::Exit;
        }
        while self.wake_rx.try_recv().is_ok() {}
        self.handle_wake()
    }

    /// Handle queued signals without waiting.
    pub fn handle_wake(&mut self) -> WakeOutcome {
        if self.signals.exit_requested() {
            info!("exit requested");
            self.engine = None;
            return WakeOutcome::Exit;
        }

        if self.signals.new_engine.swap(false, Ordering::SeqCst) {
            info!("configuration changed, rebuilding engine");
            self.signals.take_changes();
            self.engine = None;
            match (self.factory)() {
                Ok(mut engine) => {
                    self.execute(&mut engine);
                    self.engine = Some(engine);
                }
                Err(e) => error!(error = %e, "could not build engine, waiting for the next change"),
            }
            return WakeOutcome::NewEngine;
        }

        let changed: BTreeSet<PathBuf> = self.signals.take_changes().into_iter().collect();
        if changed.is_empty() {
            return WakeOutcome::Idle;
        }
        for path in &changed {
            info!(path = %path.display(), "changed");
        }
        match self.engine.take() {
            Some(mut engine) => {
                self.execute(&mut engine);
                self.engine = Some(engine);
            }
            None => debug!("no engine, ignoring changes"),
        }
        WakeOutcome::Executed {
            changed: changed.len(),
        }
    }

    /// Run until exit is requested.
    pub fn run(&mut self) {
        loop {
            if self.wait() == WakeOutcome::Exit {
                break;
            }
        }
    }

    // Failures are logged by the engine.
    fn execute(&mut self, engine: &mut Engine) {
        if let Ok(summary) = engine.execute() {
            if let Some(report) = self.reporter.as_mut() {
                report(&summary);
            }
        }
    }
}

// =============================================================================
// Watchers and exit triggers
// =============================================================================

fn is_relevant(event: &Event) -> bool {
    !matches!(event.kind, EventKind::Access(_))
}

/// Watch the input folder recursively, queueing every changed path.
pub fn watch_input(input: &Path, signals: Arc<WatchSignals>) -> Result<RecommendedWatcher, WatchError> {
    let mut watcher = notify::recommended_watcher(move |res: notify::Result<Event>| match res {
        Ok(event) if is_relevant(&event) => {
            for path in event.paths {
                signals.path_changed(path);
            }
        }
        Ok(_) => {}
        Err(e) => warn!(error = %e, "input watcher error"),
    })?;
    watcher.watch(input, RecursiveMode::Recursive)?;
    info!(path = %input.display(), "watching input folder");
    Ok(watcher)
}

/// Watch the configuration file's folder, flagging a new engine when the
/// file itself changes.
pub fn watch_config(config: &Path, signals: Arc<WatchSignals>) -> Result<RecommendedWatcher, WatchError> {
    let folder = match config.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent.to_path_buf(),
        _ => PathBuf::from("."),
    };
    let file_name = config.file_name().map(|n| n.to_os_string());
    let mut watcher = notify::recommended_watcher(move |res: notify::Result<Event>| match res {
        Ok(event) if is_relevant(&event) => {
            let touches_config = event
                .paths
                .iter()
                .any(|p| p.file_name().map(|n| n.to_os_string()) == file_name);
            if touches_config {
                signals.config_changed();
            }
        }
        Ok(_) => {}
        Err(e) => warn!(error = %e, "configuration watcher error"),
    })?;
    watcher.watch(&folder, RecursiveMode::NonRecursive)?;
    debug!(path = %config.display(), "watching configuration file");
    Ok(watcher)
}

/// Request exit on Ctrl-C or when a line is read from stdin.
pub fn install_exit_triggers(signals: &Arc<WatchSignals>) -> Result<(), WatchError> {
    let on_signal = Arc::clone(signals);
    ctrlc::set_handler(move || on_signal.request_exit())?;

    let on_enter = Arc::clone(signals);
    std::thread::spawn(move || {
        let mut line = String::new();
        // EOF means no terminal; keep watching until Ctrl-C.
        if let Ok(n) = std::io::stdin().lock().read_line(&mut line) {
            if n > 0 {
                on_enter.request_exit();
            }
        }
    });
    Ok(())
}

/// Watch `input` and `config`, rebuilding through `watch_loop` until exit.
pub fn run(mut watch_loop: WatchLoop, input: &Path, config: &Path) -> Result<(), WatchError> {
    let signals = Arc::clone(watch_loop.signals());
    let _input_watcher = if input.is_dir() {
        Some(watch_input(input, Arc::clone(&signals))?)
    } else {
        warn!(path = %input.display(), "input folder does not exist, not watching it");
        None
    };
    let _config_watcher = watch_config(config, Arc::clone(&signals))?;
    install_exit_triggers(&signals)?;

    info!("press Ctrl-C or Enter to exit");
    watch_loop.run();
    Ok(())
}
