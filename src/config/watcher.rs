//! Hot reload of the configuration file.
//!
//! The parent directory is watched rather than the file itself: editors and
//! config-management tools usually replace the file by rename, which drops a
//! watch placed on the old inode. Events for sibling files are ignored, and a
//! write that leaves the content unchanged does not trigger a reload.

use std::path::{Path, PathBuf};
use std::sync::Mutex;
use std::time::Duration;

use notify::{Config, Event, EventKind, RecommendedWatcher, RecursiveMode, Watcher};
use tokio::sync::mpsc;

use crate::config::loader::parse_config;
use crate::config::schema::PerimeterConfig;

/// Keeps the underlying notify watcher alive; dropping it stops reloads.
pub struct ConfigWatcher {
    _inner: RecommendedWatcher,
}

impl ConfigWatcher {
    /// Watch `path` and return a stream of validated configurations.
    pub fn watch(
        path: &Path,
    ) -> Result<(Self, mpsc::UnboundedReceiver<PerimeterConfig>), notify::Error> {
        let (tx, rx) = mpsc::unbounded_channel();
        let target = path.to_path_buf();
        let reloader = Reloader {
            file_name: target.file_name().map(|n| n.to_os_string()),
            path: target.clone(),
            last_applied: Mutex::new(std::fs::read_to_string(&target).ok()),
            tx,
        };

        let mut inner = RecommendedWatcher::new(
            move |res: notify::Result<Event>| match res {
                Ok(event) => reloader.on_event(&event),
                Err(e) => tracing::error!(error = %e, "Config watch error"),
            },
            Config::default().with_poll_interval(Duration::from_secs(2)),
        )?;

        let dir = match target.parent() {
            Some(p) if !p.as_os_str().is_empty() => p.to_path_buf(),
            _ => PathBuf::from("."),
        };
        inner.watch(&dir, RecursiveMode::NonRecursive)?;

        tracing::info!(path = %target.display(), "Config watcher started");
        Ok((Self { _inner: inner }, rx))
    }
}

struct Reloader {
    path: PathBuf,
    file_name: Option<std::ffi::OsString>,
    last_applied: Mutex<Option<String>>,
    tx: mpsc::UnboundedSender<PerimeterConfig>,
}

impl Reloader {
    fn on_event(&self, event: &Event) {
        if !matches!(event.kind, EventKind::Modify(_) | EventKind::Create(_)) {
            return;
        }
        let ours = event
            .paths
            .iter()
            .any(|p| p.file_name().map(|n| n.to_os_string()) == self.file_name);
        if ours {
            self.reload();
        }
    }

    fn reload(&self) {
        let content = match std::fs::read_to_string(&self.path) {
            Ok(content) => content,
            // Mid-rename; the follow-up create event retries.
            Err(e) => {
                tracing::debug!(error = %e, "Config file not readable yet");
                return;
            }
        };

        let Ok(mut last) = self.last_applied.lock() else {
            return;
        };
        if last.as_deref() == Some(content.as_str()) {
            return;
        }

        match parse_config(&content) {
            Ok(config) => {
                tracing::info!(path = %self.path.display(), "Config change detected, reloading edge policy");
                *last = Some(content);
                let _ = self.tx.send(config);
            }
            Err(e) => {
                tracing::error!(error = %e, "Rejected config change, keeping current edge policy");
            }
        }
    }
}
