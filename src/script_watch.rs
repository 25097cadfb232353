use anyhow::{Context, Result};
use notify::{Config as NotifyConfig, Event, EventKind, RecommendedWatcher, RecursiveMode, Watcher};
use std::path::{Path, PathBuf};
use std::sync::mpsc::{channel, Receiver};
use std::time::Duration;

/// Watches the script assembly sources and reports when a domain reload is
/// due. The watcher only flags; the engine decides when to act, since a
/// reload is a stop-the-world operation relative to the frame.
pub struct ScriptSourceWatcher {
    watcher: RecommendedWatcher,
    rx: Receiver<notify::Result<Event>>,
    registrations: Vec<PathBuf>,
}

impl ScriptSourceWatcher {
    pub fn new() -> Result<Self> {
        let (tx, rx) = channel();
        let mut watcher = notify::recommended_watcher(move |res| {
            let _ = tx.send(res);
        })?;
        watcher
            .configure(
                NotifyConfig::default()
                    .with_compare_contents(false)
                    .with_poll_interval(Duration::from_millis(300)),
            )
            .context("configure script source watcher")?;
        Ok(Self { watcher, rx, registrations: Vec::new() })
    }

    pub fn watch(&mut self, path: impl AsRef<Path>) -> Result<()> {
        let path = path.as_ref();
        if !path.exists() {
            anyhow::bail!("script source '{}' does not exist", path.display());
        }
        let normalized = path.canonicalize().unwrap_or_else(|_| path.to_path_buf());
        if self.registrations.iter().any(|existing| *existing == normalized) {
            return Ok(());
        }
        self.watcher
            .watch(&normalized, RecursiveMode::NonRecursive)
            .with_context(|| format!("watch {}", normalized.display()))?;
        self.registrations.push(normalized);
        Ok(())
    }

    /// Drain pending filesystem events; true when any watched source was
    /// written or replaced since the last call.
    pub fn drain_dirty(&mut self) -> bool {
        let mut dirty = false;
        while let Ok(event) = self.rx.try_recv() {
            match event {
                Ok(event) => {
                    if Self::is_relevant(&event.kind) {
                        dirty = true;
                    }
                }
                Err(err) => eprintln!("[script] source watcher error: {err}"),
            }
        }
        dirty
    }

    fn is_relevant(kind: &EventKind) -> bool {
        matches!(kind, EventKind::Modify(_) | EventKind::Create(_) | EventKind::Remove(_))
    }
}
