//! Scan request lifecycle: sequencing, cancellation, and event delivery.
//!
//! One coordinator serializes scans for a target scope. Submitting a new
//! request atomically supersedes the previous one: its id stops being
//! active, its checker processes are killed best-effort, and any of its
//! events still in flight are suppressed. Events carry the originating
//! `RequestId` and are only delivered while that id is the active one, so
//! listeners never observe stale callbacks after a newer scan started.
//!
//! Per request the worker thread runs: materialize buffers, resolve the
//! checker and environment once, partition targets, invoke each partition,
//! parse and merge output, route issues back to sources. The workspace
//! temp files are removed when the worker returns, on every path
//! including unwind.

use crate::environment;
use crate::errors::ScanError;
use crate::invoke;
use crate::materialize::ScanWorkspace;
use crate::models::{ScanResult, SourceFile};
use crate::route;
use crossbeam_channel::Sender;
use std::collections::HashMap;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::path::PathBuf;
use std::process::Child;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use tracing::{debug, error, info, warn};

pub type RequestId = u64;

#[derive(Debug, Clone, Default)]
/// Settings one coordinator scans with; supplied by the embedding caller,
/// never fetched from ambient state.
pub struct ScanSettings {
    /// Working directory for checker processes and base for relative paths.
    pub project_root: PathBuf,
    /// Explicit checker executable override; empty/None means autodetect.
    pub mypy_path: Option<PathBuf>,
    /// Optional checker config file; validated to exist before any spawn.
    pub config_file: Option<PathBuf>,
    /// Free-form extra checker arguments, tokenized shell-style.
    pub arguments: String,
    /// Python interpreter used for virtual-environment detection.
    pub interpreter: Option<PathBuf>,
    /// Extra environment variables layered over the process environment.
    pub env_overrides: HashMap<String, String>,
    /// Probe the resolved executable with `-V` before every scan; a
    /// failing probe makes the request fail as unavailable instead of
    /// producing launch errors or garbage output.
    pub precheck: bool,
}

#[derive(Debug)]
/// Lifecycle notifications for one scan request, delivered in order
/// Started, Progress*, then exactly one of Completed/Failed/Aborted.
pub enum ScanEvent {
    Started {
        request: RequestId,
        file_count: usize,
    },
    /// Incremental: `scanned` is the size of the partition that finished.
    Progress {
        request: RequestId,
        scanned: usize,
    },
    Completed {
        request: RequestId,
        result: ScanResult,
    },
    Failed {
        request: RequestId,
        error: ScanError,
    },
    Aborted {
        request: RequestId,
    },
}

impl ScanEvent {
    pub fn request(&self) -> RequestId {
        match self {
            ScanEvent::Started { request, .. }
            | ScanEvent::Progress { request, .. }
            | ScanEvent::Completed { request, .. }
            | ScanEvent::Failed { request, .. }
            | ScanEvent::Aborted { request } => *request,
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            ScanEvent::Completed { .. } | ScanEvent::Failed { .. } | ScanEvent::Aborted { .. }
        )
    }
}

/// State shared between the coordinator handle and its worker threads.
struct CoordinatorState {
    next_request: AtomicU64,
    /// The only request whose events are deliverable; 0 = none.
    active: AtomicU64,
    /// Live checker processes, tagged by owning request.
    children: Mutex<Vec<(RequestId, Arc<Mutex<Child>>)>>,
    /// Serializes the is-active check with the send, so a superseded
    /// worker can never slip an event in after the new request emitted.
    delivery: Mutex<()>,
}

impl CoordinatorState {
    fn is_active(&self, request: RequestId) -> bool {
        self.active.load(Ordering::SeqCst) == request
    }

    /// Deliver an event iff `request` is still the active one.
    fn emit(&self, events: &Sender<ScanEvent>, event: ScanEvent) {
        let _guard = self.delivery.lock().unwrap_or_else(|e| e.into_inner());
        if self.is_active(event.request()) {
            let _ = events.send(event);
        }
    }

    /// Track a spawned child; returns false (and kills the child) when the
    /// owning request was superseded while spawning.
    fn register_child(&self, request: RequestId, handle: Arc<Mutex<Child>>) -> bool {
        {
            let mut children = self.children.lock().unwrap_or_else(|e| e.into_inner());
            children.push((request, Arc::clone(&handle)));
        }
        if !self.is_active(request) {
            kill_child(&handle);
            false
        } else {
            true
        }
    }

    /// Kill every child that does not belong to `keep` and drop finished
    /// entries. Best-effort; the reader observes EOF and unwinds itself.
    fn kill_children_except(&self, keep: RequestId) {
        let mut children = self.children.lock().unwrap_or_else(|e| e.into_inner());
        children.retain(|(owner, handle)| {
            if *owner == keep {
                true
            } else {
                kill_child(handle);
                false
            }
        });
    }

    fn forget_request(&self, request: RequestId) {
        let mut children = self.children.lock().unwrap_or_else(|e| e.into_inner());
        children.retain(|(owner, _)| *owner != request);
    }
}

fn kill_child(handle: &Arc<Mutex<Child>>) {
    let mut child = handle.lock().unwrap_or_else(|e| e.into_inner());
    if let Err(err) = child.kill() {
        // Already exited is the common case here.
        debug!(%err, "checker kill was a no-op");
    }
}

/// Sequences scans for one target scope: at most one request is running,
/// and submitting a new one cancels the previous first.
pub struct ScanCoordinator {
    settings: ScanSettings,
    events: Sender<ScanEvent>,
    state: Arc<CoordinatorState>,
}

impl ScanCoordinator {
    pub fn new(settings: ScanSettings, events: Sender<ScanEvent>) -> Self {
        ScanCoordinator {
            settings,
            events,
            state: Arc::new(CoordinatorState {
                next_request: AtomicU64::new(0),
                active: AtomicU64::new(0),
                children: Mutex::new(Vec::new()),
                delivery: Mutex::new(()),
            }),
        }
    }

    /// Start a scan over `sources`, cancelling any scan still running.
    ///
    /// Safe to call from any thread; supersession is atomic (the swap of
    /// the active id), so two rapid submissions can never leave two
    /// requests both delivering events. Does not block on teardown of the
    /// superseded request.
    pub fn submit(&self, sources: Vec<SourceFile>) -> RequestId {
        let request = self.state.next_request.fetch_add(1, Ordering::SeqCst) + 1;
        let superseded = self.state.active.swap(request, Ordering::SeqCst);
        if superseded != 0 {
            debug!(superseded, request, "cancelling previous scan request");
        }
        self.state.kill_children_except(request);

        let state = Arc::clone(&self.state);
        let settings = self.settings.clone();
        let events = self.events.clone();
        let spawned = std::thread::Builder::new()
            .name(format!("tycheck-scan-{request}"))
            .spawn(move || run_request(&state, &settings, &events, request, sources));
        if let Err(err) = spawned {
            error!(%err, "could not spawn scan worker");
            self.state.emit(
                &self.events,
                ScanEvent::Failed {
                    request,
                    error: ScanError::Internal(format!("could not spawn scan worker: {err}")),
                },
            );
        }
        request
    }

    /// Cancel the running scan, if any, without starting a new one.
    pub fn stop(&self) {
        let stopped = self.state.active.swap(0, Ordering::SeqCst);
        if stopped != 0 {
            info!(request = stopped, "stopping scan");
        }
        self.state.kill_children_except(0);
    }
}

/// Worker body plus the coordinator boundary: every failure mode funnels
/// into exactly one terminal event and never escapes as a panic.
fn run_request(
    state: &CoordinatorState,
    settings: &ScanSettings,
    events: &Sender<ScanEvent>,
    request: RequestId,
    sources: Vec<SourceFile>,
) {
    state.emit(
        events,
        ScanEvent::Started {
            request,
            file_count: sources.len(),
        },
    );
    let outcome = catch_unwind(AssertUnwindSafe(|| {
        scan_once(state, settings, events, request, &sources)
    }));
    match outcome {
        Ok(Ok(result)) => {
            state.emit(events, ScanEvent::Completed { request, result });
        }
        Ok(Err(error)) if error.is_cancellation() => {
            state.emit(events, ScanEvent::Aborted { request });
        }
        Ok(Err(error)) => {
            warn!(request, %error, "scan failed");
            state.emit(events, ScanEvent::Failed { request, error });
        }
        Err(panic) => {
            let message = panic
                .downcast_ref::<&str>()
                .map(|s| s.to_string())
                .or_else(|| panic.downcast_ref::<String>().cloned())
                .unwrap_or_else(|| "scan worker panicked".to_string());
            error!(request, message, "scan worker panicked");
            state.emit(
                events,
                ScanEvent::Failed {
                    request,
                    error: ScanError::Internal(message),
                },
            );
        }
    }
    state.forget_request(request);
}

fn scan_once(
    state: &CoordinatorState,
    settings: &ScanSettings,
    events: &Sender<ScanEvent>,
    request: RequestId,
    sources: &[SourceFile],
) -> Result<ScanResult, ScanError> {
    // Workspace drop deletes every temp file, also on early return/unwind.
    let mut workspace = ScanWorkspace::new(settings.project_root.clone());
    let scanned = workspace.materialize(sources)?;
    if scanned.is_empty() {
        debug!(request, "no checkable targets; completing empty");
        return Ok(ScanResult::default());
    }

    let executable = environment::resolve_executable(
        &settings.project_root,
        settings.mypy_path.as_deref(),
        settings.interpreter.as_deref(),
    )
    .ok_or(ScanError::Unavailable)?;
    let env = environment::build_env(settings.interpreter.as_deref(), &settings.env_overrides);
    if settings.precheck && !environment::smoke_check(&executable, &env) {
        return Err(ScanError::Unavailable);
    }

    let config_file = match &settings.config_file {
        Some(path) if !path.as_os_str().is_empty() => {
            let absolute = if path.is_absolute() {
                path.clone()
            } else {
                settings.project_root.join(path)
            };
            if !absolute.is_file() {
                return Err(ScanError::Config(format!(
                    "checker config file does not exist: {}",
                    absolute.display()
                )));
            }
            Some(absolute)
        }
        _ => None,
    };

    let partitions = invoke::partition_targets(&scanned);
    let mut issues = Vec::new();
    for partition in &partitions {
        if !state.is_active(request) {
            return Err(ScanError::Interrupted);
        }
        let invocation = invoke::build_invocation(
            &executable,
            config_file.as_deref(),
            &settings.arguments,
            partition,
            env.clone(),
            &settings.project_root,
        );
        info!(request, command = %invocation.command_line(), "running checker");
        let running = invoke::spawn(&invocation)?;
        if !state.register_child(request, running.kill_handle()) {
            return Err(ScanError::Interrupted);
        }
        let batch = running.collect()?;
        if !state.is_active(request) {
            // Killed mid-read: the truncated output is not a result.
            return Err(ScanError::Interrupted);
        }
        issues.extend(batch);
        state.emit(
            events,
            ScanEvent::Progress {
                request,
                scanned: partition.len(),
            },
        );
    }

    Ok(route::route_issues(
        issues,
        &scanned,
        sources,
        &settings.project_root,
    ))
}

/// Submit one request and block until its terminal event.
///
/// Convenience for one-shot callers (the CLI); interactive embedders keep
/// their own receiver and coordinator instead.
pub fn run_scan_blocking(
    settings: ScanSettings,
    sources: Vec<SourceFile>,
) -> Result<ScanResult, ScanError> {
    let (tx, rx) = crossbeam_channel::unbounded();
    let coordinator = ScanCoordinator::new(settings, tx);
    let request = coordinator.submit(sources);
    for event in rx.iter() {
        if event.request() != request {
            continue;
        }
        match event {
            ScanEvent::Completed { result, .. } => return Ok(result),
            ScanEvent::Failed { error, .. } => return Err(error),
            ScanEvent::Aborted { .. } => return Err(ScanError::Interrupted),
            ScanEvent::Started { .. } | ScanEvent::Progress { .. } => {}
        }
    }
    Err(ScanError::Internal(
        "event channel closed before a terminal event".into(),
    ))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{SourceFile, SourceId};
    use std::path::Path;
    use std::time::Duration;
    use tempfile::tempdir;

    #[cfg(unix)]
    fn fake_checker(dir: &Path, body: &str) -> PathBuf {
        use std::os::unix::fs::PermissionsExt;
        let script = dir.join("fake-mypy");
        std::fs::write(&script, format!("#!/bin/sh\n{body}")).unwrap();
        std::fs::set_permissions(&script, std::fs::Permissions::from_mode(0o755)).unwrap();
        script
    }

    fn sources_in(dir: &Path, names: &[&str]) -> Vec<SourceFile> {
        names
            .iter()
            .enumerate()
            .map(|(i, name)| {
                let path = dir.join(name);
                std::fs::write(&path, "x = 1\n").unwrap();
                SourceFile::saved(SourceId(i as u64 + 1), path, "x = 1\n".into())
            })
            .collect()
    }

    fn settings_with(dir: &Path, checker: PathBuf) -> ScanSettings {
        ScanSettings {
            project_root: dir.to_path_buf(),
            mypy_path: Some(checker),
            ..ScanSettings::default()
        }
    }

    #[cfg(unix)]
    #[test]
    fn test_blocking_scan_routes_diagnostics() {
        let dir = tempdir().unwrap();
        let checker = fake_checker(dir.path(), "echo 'a.py:1:1: error: assignment is wrong'\n");
        let sources = sources_in(dir.path(), &["a.py"]);
        let result = run_scan_blocking(settings_with(dir.path(), checker), sources).unwrap();
        let problems = result.problems_for(SourceId(1));
        assert_eq!(problems.len(), 1);
        assert_eq!(problems[0].message, "assignment is wrong");
    }

    #[cfg(unix)]
    #[test]
    fn test_event_order_for_successful_scan() {
        let dir = tempdir().unwrap();
        let checker = fake_checker(dir.path(), "exit 0\n");
        let sources = sources_in(dir.path(), &["a.py", "b.py"]);
        let (tx, rx) = crossbeam_channel::unbounded();
        let coordinator = ScanCoordinator::new(settings_with(dir.path(), checker), tx);
        let request = coordinator.submit(sources);

        let mut kinds = Vec::new();
        for event in rx.iter() {
            assert_eq!(event.request(), request);
            let terminal = event.is_terminal();
            kinds.push(match event {
                ScanEvent::Started { file_count, .. } => {
                    assert_eq!(file_count, 2);
                    "started"
                }
                ScanEvent::Progress { scanned, .. } => {
                    assert_eq!(scanned, 2);
                    "progress"
                }
                ScanEvent::Completed { .. } => "completed",
                ScanEvent::Failed { .. } => "failed",
                ScanEvent::Aborted { .. } => "aborted",
            });
            if terminal {
                break;
            }
        }
        assert_eq!(kinds, vec!["started", "progress", "completed"]);
    }

    #[test]
    fn test_empty_target_set_short_circuits() {
        let dir = tempdir().unwrap();
        // No checker configured at all; filtering happens before
        // availability is even considered.
        let readme = dir.path().join("README.md");
        std::fs::write(&readme, "# hi\n").unwrap();
        let sources = vec![SourceFile::saved(SourceId(1), readme, "# hi\n".into())];
        let settings = ScanSettings {
            project_root: dir.path().to_path_buf(),
            ..ScanSettings::default()
        };
        let result = run_scan_blocking(settings, sources).unwrap();
        assert_eq!(result.files_scanned(), 0);
        assert!(result.is_empty());
    }

    #[test]
    fn test_missing_config_file_fails_before_spawn() {
        let dir = tempdir().unwrap();
        let sources = sources_in(dir.path(), &["a.py"]);
        // Use a checker path that would fail to spawn; the config error
        // must win because it is checked first.
        let settings = ScanSettings {
            project_root: dir.path().to_path_buf(),
            mypy_path: Some(dir.path().join("missing-checker")),
            config_file: Some(dir.path().join("no-such.ini")),
            ..ScanSettings::default()
        };
        match run_scan_blocking(settings, sources) {
            Err(ScanError::Config(message)) => assert!(message.contains("no-such.ini")),
            other => panic!("expected config error, got {other:?}"),
        }
    }

    #[cfg(unix)]
    #[test]
    fn test_rapid_resubmission_suppresses_stale_events() {
        let dir = tempdir().unwrap();
        let checker = fake_checker(
            dir.path(),
            "sleep 2\necho 'a.py:1:1: error: from a slow scan'\n",
        );
        let sources = sources_in(dir.path(), &["a.py"]);
        let (tx, rx) = crossbeam_channel::unbounded();
        let coordinator = ScanCoordinator::new(settings_with(dir.path(), checker), tx);

        let first = coordinator.submit(sources.clone());
        let second = coordinator.submit(sources);
        assert_ne!(first, second);

        let mut seen = Vec::new();
        let deadline = Duration::from_secs(10);
        loop {
            let event = rx.recv_timeout(deadline).expect("terminal event");
            let terminal = event.is_terminal() && event.request() == second;
            seen.push((event.request(), event.is_terminal()));
            if terminal {
                break;
            }
        }
        // Nothing attributable to the first request may arrive once the
        // second request started delivering, and the second gets exactly
        // one terminal event.
        let second_begins = seen
            .iter()
            .position(|(r, _)| *r == second)
            .expect("second request delivered events");
        let stale: Vec<_> = seen[second_begins..]
            .iter()
            .filter(|(r, _)| *r == first)
            .collect();
        assert!(stale.is_empty(), "stale events delivered: {stale:?}");
        let terminals = seen.iter().filter(|(_, t)| *t).count();
        assert_eq!(terminals, 1);
        // Channel stays quiet afterwards.
        assert!(rx.recv_timeout(Duration::from_millis(300)).is_err());
    }

    #[cfg(unix)]
    #[test]
    fn test_stop_cancels_without_error_report() {
        let dir = tempdir().unwrap();
        let checker = fake_checker(dir.path(), "sleep 5\n");
        let sources = sources_in(dir.path(), &["a.py"]);
        let (tx, rx) = crossbeam_channel::unbounded();
        let coordinator = ScanCoordinator::new(settings_with(dir.path(), checker), tx);
        coordinator.submit(sources);

        // Let the scan start, then stop it.
        let started = rx.recv_timeout(Duration::from_secs(5)).unwrap();
        assert!(matches!(started, ScanEvent::Started { .. }));
        coordinator.stop();

        // No Failed/Completed may follow; cancellation is silent.
        match rx.recv_timeout(Duration::from_secs(4)) {
            Err(_) => {}
            Ok(event) => panic!("unexpected event after stop: {event:?}"),
        }
    }

    #[cfg(unix)]
    #[test]
    fn test_failing_version_probe_makes_scan_unavailable() {
        let dir = tempdir().unwrap();
        let checker = fake_checker(
            dir.path(),
            "if [ \"$1\" = \"-V\" ]; then exit 1; fi\necho 'a.py:1:1: error: never delivered'\n",
        );
        let sources = sources_in(dir.path(), &["a.py"]);
        let settings = ScanSettings {
            precheck: true,
            ..settings_with(dir.path(), checker)
        };
        match run_scan_blocking(settings, sources) {
            Err(ScanError::Unavailable) => {}
            other => panic!("expected unavailable, got {other:?}"),
        }
    }

    #[cfg(unix)]
    #[test]
    fn test_passing_version_probe_lets_scan_run() {
        let dir = tempdir().unwrap();
        let checker = fake_checker(
            dir.path(),
            "if [ \"$1\" = \"-V\" ]; then exit 0; fi\necho 'a.py:1:1: error: found it'\n",
        );
        let sources = sources_in(dir.path(), &["a.py"]);
        let settings = ScanSettings {
            precheck: true,
            ..settings_with(dir.path(), checker)
        };
        let result = run_scan_blocking(settings, sources).unwrap();
        assert_eq!(result.problems_for(SourceId(1)).len(), 1);
    }

    /// Poll the argument file a fake checker writes until the trailing
    /// target path shows up.
    #[cfg(unix)]
    fn wait_for_recorded_path(args_file: &Path) -> PathBuf {
        let deadline = std::time::Instant::now() + Duration::from_secs(5);
        loop {
            if let Ok(content) = std::fs::read_to_string(args_file) {
                if content.ends_with('\n') {
                    if let Some(last) = content.lines().last() {
                        if last.ends_with(".py") {
                            return PathBuf::from(last);
                        }
                    }
                }
            }
            assert!(
                std::time::Instant::now() < deadline,
                "checker never recorded its arguments"
            );
            std::thread::sleep(Duration::from_millis(20));
        }
    }

    #[cfg(unix)]
    #[test]
    fn test_cancelled_scan_removes_temp_files() {
        let dir = tempdir().unwrap();
        let args_file = dir.path().join("seen-args.txt");
        let checker = fake_checker(
            dir.path(),
            &format!(
                "printf '%s\\n' \"$@\" > {}\nsleep 5\n",
                args_file.display()
            ),
        );
        // A dirty buffer forces a temp copy whose path the checker records.
        let path = dir.path().join("edited.py");
        std::fs::write(&path, "old\n").unwrap();
        let sources = vec![SourceFile::dirty(SourceId(1), path, "new = 1\n".into())];
        let (tx, rx) = crossbeam_channel::unbounded();
        let coordinator = ScanCoordinator::new(settings_with(dir.path(), checker), tx);
        coordinator.submit(sources);
        let started = rx.recv_timeout(Duration::from_secs(5)).unwrap();
        assert!(matches!(started, ScanEvent::Started { .. }));

        let temp_path = wait_for_recorded_path(&args_file);
        assert!(temp_path.exists());
        coordinator.stop();

        // Cleanup happens when the superseded worker unwinds; poll for it.
        let deadline = std::time::Instant::now() + Duration::from_secs(5);
        while temp_path.exists() && std::time::Instant::now() < deadline {
            std::thread::sleep(Duration::from_millis(50));
        }
        assert!(!temp_path.exists());
    }

    #[cfg(unix)]
    #[test]
    fn test_failed_scan_removes_temp_files() {
        let dir = tempdir().unwrap();
        let args_file = dir.path().join("seen-args.txt");
        // Self-deleting checker: the first partition records its
        // arguments, the second fails to launch.
        let checker = fake_checker(
            dir.path(),
            &format!(
                "printf '%s\\n' \"$@\" >> {}\nrm -f \"$0\"\n",
                args_file.display()
            ),
        );
        let setup = dir.path().join("setup.py");
        let module = dir.path().join("mod.py");
        std::fs::write(&setup, "old\n").unwrap();
        std::fs::write(&module, "x = 1\n").unwrap();
        let sources = vec![
            SourceFile::dirty(SourceId(1), setup, "edited = 1\n".into()),
            SourceFile::saved(SourceId(2), module, "x = 1\n".into()),
        ];
        match run_scan_blocking(settings_with(dir.path(), checker), sources) {
            Err(ScanError::Launch { .. }) => {}
            other => panic!("expected launch error, got {other:?}"),
        }
        let temp_path = wait_for_recorded_path(&args_file);
        assert!(temp_path.to_string_lossy().ends_with("setup.py"));
        // The failed request's workspace is gone by the time its terminal
        // event is delivered.
        assert!(!temp_path.exists());
    }

    #[cfg(unix)]
    #[test]
    fn test_launch_failure_is_reported_once() {
        let dir = tempdir().unwrap();
        let sources = sources_in(dir.path(), &["pkg_a.py", "setup.py"]);
        let settings = ScanSettings {
            project_root: dir.path().to_path_buf(),
            mypy_path: Some(dir.path().join("not-a-checker")),
            ..ScanSettings::default()
        };
        let (tx, rx) = crossbeam_channel::unbounded();
        let coordinator = ScanCoordinator::new(settings, tx);
        coordinator.submit(sources);

        let mut failures = 0;
        while let Ok(event) = rx.recv_timeout(Duration::from_secs(5)) {
            let terminal = event.is_terminal();
            if let ScanEvent::Failed { error, .. } = &event {
                assert!(matches!(error, ScanError::Launch { .. }));
                failures += 1;
            }
            if terminal {
                break;
            }
        }
        // Two partitions (setup.py isolated), but the first launch failure
        // aborts the request; it is reported once, not per partition.
        assert_eq!(failures, 1);
        assert!(rx.recv_timeout(Duration::from_millis(200)).is_err());
    }
}
