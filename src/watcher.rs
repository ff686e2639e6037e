// SPDX-License-Identifier: MIT
// SPDX-FileCopyrightText: 2025 Jonathan D. A. Jewell <hyperpolymath>

//! File system watcher for the screenshot directory

use glob::MatchOptions;
use notify::event::{ModifyKind, RenameMode};
use notify::{Config, Event, EventKind, RecommendedWatcher, RecursiveMode, Watcher};
use std::path::{Path, PathBuf};
use std::sync::mpsc::{channel, Receiver};
use std::time::Duration;
use tracing::{debug, info, warn};

use crate::clock::Clock;
use crate::config::GuardConfig;
use crate::{Result, SnapSightError};

/// Events emitted by the watcher
#[derive(Debug, Clone, PartialEq)]
pub enum WatchEvent {
    /// A new file was created (or renamed into place)
    FileCreated(PathBuf),
    /// A file's contents changed
    FileModified(PathBuf),
    /// Watcher error
    Error(String),
}

impl WatchEvent {
    /// Path of a create/modify event
    pub fn path(&self) -> Option<&Path> {
        match self {
            WatchEvent::FileCreated(p) | WatchEvent::FileModified(p) => Some(p),
            WatchEvent::Error(_) => None,
        }
    }
}

/// Non-recursive watcher over a single existing directory
pub struct FileWatcher {
    watcher: RecommendedWatcher,
    watched: Option<PathBuf>,
    event_rx: Receiver<notify::Result<Event>>,
}

impl FileWatcher {
    /// Create a new file watcher
    pub fn new() -> Result<Self> {
        let (tx, rx) = channel();

        let config = Config::default()
            .with_poll_interval(Duration::from_secs(2));

        let watcher = RecommendedWatcher::new(tx, config)?;

        Ok(Self {
            watcher,
            watched: None,
            event_rx: rx,
        })
    }

    /// Start watching `path`, which must already be a directory
    pub fn watch(&mut self, path: &Path) -> Result<()> {
        if !path.is_dir() {
            return Err(SnapSightError::MissingWatchDirectory(path.to_path_buf()));
        }

        if let Some(previous) = self.watched.take() {
            self.watcher.unwatch(&previous)?;
        }

        self.watcher.watch(path, RecursiveMode::NonRecursive)?;
        self.watched = Some(path.to_path_buf());
        info!("Watching: {:?}", path);

        Ok(())
    }

    /// Get the next event (blocking with timeout)
    pub fn next_event(&self, timeout: Duration) -> Option<WatchEvent> {
        match self.event_rx.recv_timeout(timeout) {
            Ok(Ok(event)) => Self::convert_event(event),
            Ok(Err(e)) => Some(WatchEvent::Error(e.to_string())),
            Err(std::sync::mpsc::RecvTimeoutError::Timeout) => None,
            Err(std::sync::mpsc::RecvTimeoutError::Disconnected) => {
                Some(WatchEvent::Error("Watcher disconnected".to_string()))
            }
        }
    }

    /// Convert notify event to our event type
    fn convert_event(event: Event) -> Option<WatchEvent> {
        match event.kind {
            EventKind::Create(_) => {
                event.paths.first().map(|p| WatchEvent::FileCreated(p.clone()))
            }
            // Capture tools often write a temp file and rename it into place
            EventKind::Modify(ModifyKind::Name(RenameMode::To)) => {
                event.paths.first().map(|p| WatchEvent::FileCreated(p.clone()))
            }
            EventKind::Modify(ModifyKind::Name(RenameMode::Both)) => {
                event.paths.last().map(|p| WatchEvent::FileCreated(p.clone()))
            }
            EventKind::Modify(ModifyKind::Name(_)) | EventKind::Modify(ModifyKind::Metadata(_)) => None,
            EventKind::Modify(_) => {
                event.paths.first().map(|p| WatchEvent::FileModified(p.clone()))
            }
            _ => None,
        }
    }

    pub fn watched_path(&self) -> Option<&Path> {
        self.watched.as_deref()
    }
}

/// Check if a path looks like a finished capture with an accepted extension.
///
/// `extensions` are compared case-insensitively and without the leading dot.
pub fn is_capture(path: &Path, extensions: &[String]) -> bool {
    let filename = match path.file_name().and_then(|n| n.to_str()) {
        Some(n) => n,
        None => return false,
    };

    // Skip hidden files
    if filename.starts_with('.') {
        return false;
    }

    match path.extension().and_then(|e| e.to_str()) {
        Some(ext) => extensions
            .iter()
            .any(|accepted| accepted.trim_start_matches('.').eq_ignore_ascii_case(ext)),
        None => false,
    }
}

/// Most recently modified capture directly inside `dir`
pub fn latest_capture(dir: &Path, extensions: &[String]) -> Result<Option<PathBuf>> {
    if !dir.is_dir() {
        return Err(SnapSightError::MissingWatchDirectory(dir.to_path_buf()));
    }

    let options = MatchOptions {
        case_sensitive: false,
        ..MatchOptions::default()
    };
    let base = glob::Pattern::escape(&dir.to_string_lossy());

    let mut newest: Option<(std::time::SystemTime, PathBuf)> = None;
    for ext in extensions {
        let pattern = format!("{}/*.{}", base, ext.trim_start_matches('.'));
        let entries = glob::glob_with(&pattern, options)
            .map_err(|e| SnapSightError::Config(format!("Bad capture pattern {}: {}", pattern, e)))?;

        for path in entries.flatten() {
            if !path.is_file() || !is_capture(&path, extensions) {
                continue;
            }
            let modified = match std::fs::metadata(&path).and_then(|m| m.modified()) {
                Ok(t) => t,
                Err(_) => continue,
            };
            if newest.as_ref().map_or(true, |(t, _)| modified > *t) {
                newest = Some((modified, path));
            }
        }
    }

    Ok(newest.map(|(_, p)| p))
}

/// How to wait out a capture that may still be being written
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum CompletionGuard {
    /// Sleep a fixed time after the event
    FixedDelay(Duration),
    /// Poll size until two consecutive reads agree
    StableSize { interval: Duration, max_wait: Duration },
}

impl Default for CompletionGuard {
    fn default() -> Self {
        Self::FixedDelay(Duration::from_secs(2))
    }
}

impl From<&GuardConfig> for CompletionGuard {
    fn from(config: &GuardConfig) -> Self {
        match *config {
            GuardConfig::FixedDelay { delay_ms } => Self::FixedDelay(Duration::from_millis(delay_ms)),
            GuardConfig::StableSize { interval_ms, max_wait_ms } => Self::StableSize {
                interval: Duration::from_millis(interval_ms),
                max_wait: Duration::from_millis(max_wait_ms),
            },
        }
    }
}

impl CompletionGuard {
    /// Wait until the file is (probably) complete.
    ///
    /// Returns false if the file disappeared while waiting.
    pub async fn wait(&self, path: &Path, clock: &dyn Clock) -> bool {
        match *self {
            CompletionGuard::FixedDelay(delay) => {
                if !delay.is_zero() {
                    clock.sleep(delay).await;
                }
                true
            }
            CompletionGuard::StableSize { interval, max_wait } => {
                wait_for_stable(path, interval, max_wait, clock).await
            }
        }
    }
}

/// Wait for file to be stable (not being written)
pub async fn wait_for_stable(path: &Path, interval: Duration, max_wait: Duration, clock: &dyn Clock) -> bool {
    let start = clock.now();

    let mut last_size = match std::fs::metadata(path) {
        Ok(m) => m.len(),
        Err(_) => return false,
    };

    loop {
        clock.sleep(interval).await;

        // Check if file still exists
        let current_size = match std::fs::metadata(path) {
            Ok(m) => m.len(),
            Err(_) => return false, // File was deleted
        };

        // If size hasn't changed, file is stable
        if current_size == last_size {
            return true;
        }

        if clock.now().duration_since(start) >= max_wait {
            warn!("File stability check timed out for {:?}", path);
            return true; // Proceed anyway
        }

        last_size = current_size;
        debug!("File {:?} still being written, size: {}", path, current_size);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use notify::event::{CreateKind, DataChange};
    use test_case::test_case;

    fn exts() -> Vec<String> {
        vec!["png".to_string(), "jpg".to_string(), "jpeg".to_string()]
    }

    #[test_case("capture1.png", true ; "png")]
    #[test_case("Screenshot 2025-01-01.PNG", true ; "uppercase png")]
    #[test_case("photo.JpEg", true ; "mixed case jpeg")]
    #[test_case("shot.jpg", true ; "jpg")]
    #[test_case("notes.txt", false ; "text file")]
    #[test_case("image.webp", false ; "unaccepted image type")]
    #[test_case("capture.png.part", false ; "partial download")]
    #[test_case(".hidden.png", false ; "hidden file")]
    #[test_case("png", false ; "no extension")]
    fn test_is_capture(name: &str, expected: bool) {
        assert_eq!(is_capture(&Path::new("/shots").join(name), &exts()), expected);
    }

    #[test]
    fn test_extensions_with_leading_dot() {
        assert!(is_capture(Path::new("a.png"), &[".PNG".to_string()]));
    }

    #[test]
    fn test_convert_create_and_rename() {
        let created = Event::new(EventKind::Create(CreateKind::File)).add_path(PathBuf::from("/s/a.png"));
        assert_eq!(
            FileWatcher::convert_event(created),
            Some(WatchEvent::FileCreated(PathBuf::from("/s/a.png")))
        );

        let renamed = Event::new(EventKind::Modify(ModifyKind::Name(RenameMode::Both)))
            .add_path(PathBuf::from("/s/.tmp123"))
            .add_path(PathBuf::from("/s/b.png"));
        assert_eq!(
            FileWatcher::convert_event(renamed),
            Some(WatchEvent::FileCreated(PathBuf::from("/s/b.png")))
        );

        let written = Event::new(EventKind::Modify(ModifyKind::Data(DataChange::Content)))
            .add_path(PathBuf::from("/s/a.png"));
        assert_eq!(
            FileWatcher::convert_event(written),
            Some(WatchEvent::FileModified(PathBuf::from("/s/a.png")))
        );

        let removed = Event::new(EventKind::Remove(notify::event::RemoveKind::File))
            .add_path(PathBuf::from("/s/a.png"));
        assert_eq!(FileWatcher::convert_event(removed), None);
    }

    #[test]
    fn test_watch_missing_directory_is_fatal() {
        let dir = tempfile::tempdir().unwrap();
        let mut watcher = FileWatcher::new().unwrap();
        let err = watcher.watch(&dir.path().join("missing")).unwrap_err();
        assert!(matches!(err, SnapSightError::MissingWatchDirectory(_)));
        assert!(watcher.watched_path().is_none());
    }

    #[test]
    fn test_latest_capture_picks_newest_accepted_file() {
        let dir = tempfile::tempdir().unwrap();
        let old = dir.path().join("old.png");
        let new = dir.path().join("new.JPG");
        std::fs::write(&old, b"x").unwrap();
        std::fs::write(dir.path().join("newest.txt"), b"x").unwrap();
        std::fs::write(&new, b"x").unwrap();

        let past = std::time::SystemTime::now() - Duration::from_secs(3600);
        std::fs::File::options().write(true).open(&old).unwrap().set_modified(past).unwrap();

        assert_eq!(latest_capture(dir.path(), &exts()).unwrap(), Some(new));
    }

    #[test]
    fn test_latest_capture_empty_dir() {
        let dir = tempfile::tempdir().unwrap();
        assert_eq!(latest_capture(dir.path(), &exts()).unwrap(), None);
    }

    #[tokio::test]
    async fn test_fixed_delay_guard_sleeps_once() {
        let clock = ManualClock::new();
        let guard = CompletionGuard::default();
        assert!(guard.wait(Path::new("/does/not/matter.png"), &clock).await);
        assert_eq!(clock.sleeps(), vec![Duration::from_secs(2)]);
    }

    #[tokio::test]
    async fn test_stable_size_guard() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("a.png");
        std::fs::write(&path, b"12345").unwrap();

        let clock = ManualClock::new();
        let guard = CompletionGuard::StableSize {
            interval: Duration::from_millis(100),
            max_wait: Duration::from_secs(1),
        };
        assert!(guard.wait(&path, &clock).await);
        assert_eq!(clock.sleeps(), vec![Duration::from_millis(100)]);

        assert!(!guard.wait(&dir.path().join("gone.png"), &clock).await);
    }

    #[test]
    fn test_event_path() {
        let created = WatchEvent::FileCreated(PathBuf::from("/s/a.png"));
        assert_eq!(created.path(), Some(Path::new("/s/a.png")));
        assert_eq!(WatchEvent::Error("boom".to_string()).path(), None);
    }

    /// Appends to the watched file on every sleep, so it never settles
    struct GrowingFileClock {
        inner: ManualClock,
        path: PathBuf,
    }

    #[async_trait::async_trait]
    impl Clock for GrowingFileClock {
        fn now(&self) -> std::time::Instant {
            self.inner.now()
        }

        async fn sleep(&self, duration: Duration) {
            use std::io::Write;
            let mut file = std::fs::OpenOptions::new().append(true).open(&self.path).unwrap();
            file.write_all(b"more").unwrap();
            self.inner.sleep(duration).await;
        }
    }

    #[tokio::test]
    async fn test_stable_size_gives_up_waiting_after_max_wait() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("recording.png");
        std::fs::write(&path, b"start").unwrap();

        let clock = GrowingFileClock { inner: ManualClock::new(), path: path.clone() };
        let guard = CompletionGuard::StableSize {
            interval: Duration::from_millis(500),
            max_wait: Duration::from_secs(2),
        };

        // still growing at the deadline, processing proceeds anyway
        assert!(guard.wait(&path, &clock).await);
        assert_eq!(clock.inner.sleeps(), vec![Duration::from_millis(500); 4]);
        assert_eq!(std::fs::metadata(&path).unwrap().len(), 5 + 4 * 4);
    }
}
