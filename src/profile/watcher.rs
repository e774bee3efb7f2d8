//! Profile file watcher for hot reload

use anyhow::{Context, Result};
use notify::{Event, EventKind, RecommendedWatcher, RecursiveMode, Watcher};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{debug, error, info};

use super::loader::LoadHandle;

/// Wait this long after a modify event so the writer can finish
const RELOAD_DEBOUNCE: Duration = Duration::from_millis(100);

/// Requests a background reload whenever the profile file is modified.
///
/// Bursts of events produce bursts of requests; the loader's version
/// counter makes all but the last one no-ops.
pub struct ProfileWatcher {
    _watcher: RecommendedWatcher,
    path: PathBuf,
}

impl ProfileWatcher {
    pub fn new(path: impl Into<PathBuf>, loader: LoadHandle) -> Result<Self> {
        let path = path.into();
        let reload_path = path.clone();

        // notify calls back on its own OS thread; LoadHandle carries the
        // runtime handle so requests can still reach the blocking pool
        let mut watcher = notify::recommended_watcher(move |res: Result<Event, notify::Error>| match res {
            Ok(event) => {
                if matches!(event.kind, EventKind::Modify(_) | EventKind::Create(_)) {
                    debug!("Profile file changed: {:?}", event.paths);
                    loader.request_after(reload_path.clone(), RELOAD_DEBOUNCE);
                }
            }
            Err(e) => error!("Profile watch error: {}", e),
        })?;

        watcher
            .watch(Path::new(&path), RecursiveMode::NonRecursive)
            .with_context(|| format!("Failed to watch profile file: {}", path.display()))?;

        info!("Watching profile file: {}", path.display());
        Ok(Self { _watcher: watcher, path })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::profile::loader::{LoadEvent, ProfileLoader};
    use std::fs;
    use tempfile::TempDir;
    use tokio::runtime::Handle;

    #[tokio::test]
    async fn test_modification_triggers_reload() -> Result<()> {
        let dir = TempDir::new()?;
        let path = dir.path().join("profile.yaml");
        fs::write(&path, "name: \"Before\"\n")?;

        let mut loader = ProfileLoader::new(Handle::current());
        let watcher = ProfileWatcher::new(&path, loader.handle())?;
        assert_eq!(watcher.path(), path.as_path());

        tokio::time::sleep(Duration::from_millis(100)).await;
        fs::write(&path, "name: \"After\"\n")?;

        let event = tokio::time::timeout(Duration::from_secs(2), loader.next()).await?;
        let Some(LoadEvent::Loaded { profile, .. }) = event else {
            panic!("expected the reloaded profile");
        };
        assert_eq!(profile.name, "After");
        Ok(())
    }
}
