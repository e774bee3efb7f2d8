//! Background profile loading with last-request-wins semantics
//!
//! Every request bumps a shared load version. File reads and parsing run on
//! the blocking pool; a finished load is only handed to the tick thread if
//! its version is still the latest, so a slow load can never clobber a
//! newer selection.

use anyhow::{Context, Result};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::runtime::Handle;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use super::MappingProfile;
use crate::pipeline::AxisModeDefaults;

/// Outcome of one load request
#[derive(Debug)]
pub enum LoadEvent {
    Loaded {
        version: u64,
        path: PathBuf,
        profile: MappingProfile,
    },
    Failed {
        version: u64,
        path: PathBuf,
        error: anyhow::Error,
    },
}

impl LoadEvent {
    pub fn version(&self) -> u64 {
        match self {
            Self::Loaded { version, .. } | Self::Failed { version, .. } => *version,
        }
    }
}

/// Cloneable request side, usable from any thread
#[derive(Debug, Clone)]
pub struct LoadHandle {
    latest: Arc<AtomicU64>,
    tx: mpsc::UnboundedSender<LoadEvent>,
    runtime: Handle,
    /// Resolves unset deadzone modes during validation
    axis_defaults: Arc<AxisModeDefaults>,
}

impl LoadHandle {
    /// Start loading `path`; returns the request's version
    pub fn request(&self, path: impl Into<PathBuf>) -> u64 {
        self.request_after(path, Duration::ZERO)
    }

    /// Like [`request`](Self::request) but waits `delay` first. A newer
    /// request arriving during the delay makes this one a no-op.
    pub fn request_after(&self, path: impl Into<PathBuf>, delay: Duration) -> u64 {
        let path = path.into();
        let version = self.latest.fetch_add(1, Ordering::SeqCst) + 1;
        let latest = Arc::clone(&self.latest);
        let tx = self.tx.clone();
        let axis_defaults = Arc::clone(&self.axis_defaults);

        debug!("Profile load v{} requested: {}", version, path.display());
        self.runtime.spawn_blocking(move || {
            if !delay.is_zero() {
                std::thread::sleep(delay);
            }
            if latest.load(Ordering::SeqCst) != version {
                debug!("Profile load v{} superseded before reading", version);
                return;
            }
            let event = match read_profile(&path, &axis_defaults) {
                Ok(profile) => LoadEvent::Loaded { version, path, profile },
                Err(error) => LoadEvent::Failed { version, path, error },
            };
            if latest.load(Ordering::SeqCst) != version {
                debug!("Profile load v{} finished stale, dropped", version);
                return;
            }
            // Receiver gone means the engine shut down
            let _ = tx.send(event);
        });
        version
    }

    pub fn latest_version(&self) -> u64 {
        self.latest.load(Ordering::SeqCst)
    }
}

/// Receiving side, owned by the tick thread
#[derive(Debug)]
pub struct ProfileLoader {
    handle: LoadHandle,
    rx: mpsc::UnboundedReceiver<LoadEvent>,
}

impl ProfileLoader {
    pub fn new(runtime: Handle) -> Self {
        Self::with_axis_defaults(runtime, AxisModeDefaults::new())
    }

    pub fn with_axis_defaults(runtime: Handle, axis_defaults: AxisModeDefaults) -> Self {
        let (tx, rx) = mpsc::unbounded_channel();
        Self {
            handle: LoadHandle {
                latest: Arc::new(AtomicU64::new(0)),
                tx,
                runtime,
                axis_defaults: Arc::new(axis_defaults),
            },
            rx,
        }
    }

    pub fn handle(&self) -> LoadHandle {
        self.handle.clone()
    }

    pub fn request(&self, path: impl Into<PathBuf>) -> u64 {
        self.handle.request(path)
    }

    pub fn latest_version(&self) -> u64 {
        self.handle.latest_version()
    }

    /// Drain finished loads without blocking; returns the current one, if any
    pub fn poll(&mut self) -> Option<LoadEvent> {
        let mut current = None;
        while let Ok(event) = self.rx.try_recv() {
            if let Some(event) = self.accept(event) {
                current = Some(event);
            }
        }
        current
    }

    /// Wait for the next load that is still current
    pub async fn next(&mut self) -> Option<LoadEvent> {
        loop {
            let event = self.rx.recv().await?;
            if let Some(event) = self.accept(event) {
                return Some(event);
            }
        }
    }

    fn accept(&self, event: LoadEvent) -> Option<LoadEvent> {
        let latest = self.latest_version();
        if event.version() != latest {
            debug!("Discarding stale profile load v{} (latest v{})", event.version(), latest);
            return None;
        }
        match &event {
            LoadEvent::Loaded { version, path, profile } => {
                info!("Profile '{}' loaded from {} (v{})", profile.name, path.display(), version)
            }
            LoadEvent::Failed { version, path, error } => {
                warn!("Profile load v{} from {} failed: {:#}", version, path.display(), error)
            }
        }
        Some(event)
    }
}

/// Read and validate a profile file
pub fn read_profile(path: &Path, axis_defaults: &AxisModeDefaults) -> Result<MappingProfile> {
    let text = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read profile: {}", path.display()))?;
    MappingProfile::from_yaml_str_with(&text, axis_defaults)
        .with_context(|| format!("Invalid profile: {}", path.display()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    const PROFILE_A: &str = r#"
name: "Profile A"
axes:
  - output: { kind: virtual_axis, device: 1, index: 0 }
    inputs:
      - { device: "stick", index: 0, kind: axis }
"#;

    const PROFILE_B: &str = r#"
name: "Profile B"
"#;

    #[tokio::test]
    async fn test_load_profile() -> Result<()> {
        let dir = TempDir::new()?;
        let path = dir.path().join("a.yaml");
        fs::write(&path, PROFILE_A)?;

        let mut loader = ProfileLoader::new(Handle::current());
        let version = loader.request(&path);

        let event = tokio::time::timeout(Duration::from_secs(2), loader.next()).await?;
        match event {
            Some(LoadEvent::Loaded { version: v, profile, .. }) => {
                assert_eq!(v, version);
                assert_eq!(profile.name, "Profile A");
                assert_eq!(profile.axes.len(), 1);
            }
            other => panic!("unexpected {:?}", other),
        }
        Ok(())
    }

    #[tokio::test]
    async fn test_last_request_wins() -> Result<()> {
        let dir = TempDir::new()?;
        let slow = dir.path().join("a.yaml");
        let fast = dir.path().join("b.yaml");
        fs::write(&slow, PROFILE_A)?;
        fs::write(&fast, PROFILE_B)?;

        let mut loader = ProfileLoader::new(Handle::current());
        loader.handle().request_after(&slow, Duration::from_millis(200));
        let newest = loader.request(&fast);

        let event = tokio::time::timeout(Duration::from_secs(2), loader.next()).await?;
        let Some(LoadEvent::Loaded { version, profile, .. }) = event else {
            panic!("expected a loaded profile");
        };
        assert_eq!(version, newest);
        assert_eq!(profile.name, "Profile B");

        // The delayed request never surfaces
        tokio::time::sleep(Duration::from_millis(300)).await;
        assert!(loader.poll().is_none());
        Ok(())
    }

    #[tokio::test]
    async fn test_validates_with_configured_axis_modes() -> Result<()> {
        let dir = TempDir::new()?;
        let path = dir.path().join("throttle.yaml");
        fs::write(
            &path,
            r#"
name: "Throttle"
axes:
  - output: { kind: virtual_axis, device: 1, index: 0 }
    inputs:
      - { device: "throttle", index: 0, kind: axis }
    deadzone: { min: 0.2, max: 1.0 }
"#,
        )?;

        let mut loader = ProfileLoader::new(Handle::current());
        loader.request(&path);
        let event = tokio::time::timeout(Duration::from_secs(2), loader.next()).await?;
        assert!(matches!(event, Some(LoadEvent::Failed { .. })));

        let defaults = AxisModeDefaults::new().with_override(0, crate::profile::DeadzoneMode::EndOnly);
        let mut loader = ProfileLoader::with_axis_defaults(Handle::current(), defaults);
        loader.request(&path);
        let event = tokio::time::timeout(Duration::from_secs(2), loader.next()).await?;
        assert!(matches!(event, Some(LoadEvent::Loaded { .. })));
        Ok(())
    }

    #[tokio::test]
    async fn test_invalid_profile_reports_failure() -> Result<()> {
        let dir = TempDir::new()?;
        let path = dir.path().join("bad.yaml");
        fs::write(
            &path,
            r#"
axes:
  - output: { kind: virtual_axis, device: 1, index: 0 }
    deadzone: { min: 0.5, max: -0.5 }
"#,
        )?;

        let mut loader = ProfileLoader::new(Handle::current());
        loader.request(&path);
        let event = tokio::time::timeout(Duration::from_secs(2), loader.next()).await?;
        assert!(matches!(event, Some(LoadEvent::Failed { .. })));

        loader.request(dir.path().join("missing.yaml"));
        let event = tokio::time::timeout(Duration::from_secs(2), loader.next()).await?;
        assert!(matches!(event, Some(LoadEvent::Failed { .. })));
        Ok(())
    }
}
