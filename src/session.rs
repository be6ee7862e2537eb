/// Session lifecycle: spawn the dev server, feed its output through the
/// extraction engine, react to milestone events, and decide when to tear
/// the subprocess down.
use crate::config::{LoadTrigger, RunConfig};
use crate::extract::{ExtractionEngine, ExtractionEvent};
use crate::metrics::MetricRecord;
use crate::pageload::{PageLoadError, PageLoader};
use crate::patterns::StreamSource;
use crate::report::StatusReporter;
use nix::sys::signal::{self, Signal};
use nix::unistd::Pid;
use std::process::Stdio;
use std::time::Duration;
use tokio::io::AsyncReadExt;
use tokio::process::{Child, Command};
use tokio::sync::mpsc::UnboundedReceiver;

/// Session lifecycle states.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Running,
    AwaitingPageLoad,
    Terminating,
    Done,
}

/// What the run loop should do after a milestone event.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionAction {
    /// Keep watching the stream.
    Continue,
    /// Measure page load against the detected URL, then terminate.
    MeasurePageLoad,
    /// Begin teardown.
    Terminate,
}

/// Decides when the measurement session is complete.
///
/// Every transition out of `Running` is final, so however many events could
/// independently trigger it, termination is requested at most once.
pub struct SessionController {
    load_trigger: LoadTrigger,
    state: SessionState,
}

impl SessionController {
    pub fn new(load_trigger: LoadTrigger) -> Self {
        Self {
            load_trigger,
            state: SessionState::Running,
        }
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    /// The server reported ready.
    ///
    /// Hash consistency wins over a requested start-up page load: a valid
    /// dependency cache means no bundling phase follows, so there is nothing
    /// further to measure.
    pub fn on_server_ready(&mut self, hash_consistent: bool) -> SessionAction {
        if self.state != SessionState::Running {
            return SessionAction::Continue;
        }
        if hash_consistent {
            self.state = SessionState::Terminating;
            return SessionAction::Terminate;
        }
        if self.load_trigger == LoadTrigger::OnStartUp {
            self.state = SessionState::AwaitingPageLoad;
            return SessionAction::MeasurePageLoad;
        }
        SessionAction::Continue
    }

    /// Dependency prebundling finished.
    pub fn on_dependencies_bundled(&mut self) -> SessionAction {
        if self.state != SessionState::Running {
            return SessionAction::Continue;
        }
        match self.load_trigger {
            LoadTrigger::OnPrebundle => {
                self.state = SessionState::AwaitingPageLoad;
                SessionAction::MeasurePageLoad
            }
            // The start-up branch owns termination when a page load was
            // requested there
            LoadTrigger::OnStartUp => SessionAction::Continue,
            LoadTrigger::None => {
                self.state = SessionState::Terminating;
                SessionAction::Terminate
            }
        }
    }

    /// The page-load measurement completed.
    pub fn page_load_finished(&mut self) -> SessionAction {
        if self.state != SessionState::AwaitingPageLoad {
            return SessionAction::Continue;
        }
        self.state = SessionState::Terminating;
        SessionAction::Terminate
    }

    pub fn mark_done(&mut self) {
        self.state = SessionState::Done;
    }
}

/// Errors that can end a session without a complete measurement.
#[derive(Debug)]
pub enum SessionError {
    /// Failed to spawn the dev server.
    Spawn { source: std::io::Error },
    /// I/O failure reading the dev server's output.
    Io { source: std::io::Error },
    /// Dev server exited on its own before the session completed.
    ServerExited { code: Option<i32> },
    /// Page load was requested but no local URL was ever observed.
    MissingServerUrl,
    /// The page-load collaborator failed.
    PageLoad { source: PageLoadError },
    /// Interrupted before the session completed.
    Interrupted,
}

impl std::fmt::Display for SessionError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SessionError::Spawn { source } => {
                write!(f, "failed to spawn dev server: {}", source)
            }
            SessionError::Io { source } => {
                write!(f, "I/O error reading dev server output: {}", source)
            }
            SessionError::ServerExited { code: Some(code) } => {
                write!(
                    f,
                    "dev server exited with code {} before measurements completed",
                    code
                )
            }
            SessionError::ServerExited { code: None } => {
                write!(f, "dev server was killed before measurements completed")
            }
            SessionError::MissingServerUrl => {
                write!(f, "no server URL observed before page load was triggered")
            }
            SessionError::PageLoad { source } => {
                write!(f, "page load measurement failed: {}", source)
            }
            SessionError::Interrupted => write!(f, "interrupted"),
        }
    }
}

impl std::error::Error for SessionError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            SessionError::Spawn { source } => Some(source),
            SessionError::Io { source } => Some(source),
            SessionError::PageLoad { source } => Some(source),
            _ => None,
        }
    }
}

/// Dev-server argument list: `[--force] <configured args>`.
fn vite_args(config: &RunConfig) -> Vec<String> {
    let mut args = config.vite.args.clone();
    if config.force {
        args.insert(0, "--force".to_string());
    }
    args
}

/// Run one measurement session from spawn to teardown.
///
/// The subprocess is spawned in its own process group so teardown can kill
/// the whole group. Returns the collected metric record on success.
pub async fn run_session<L: PageLoader>(
    config: &RunConfig,
    loader: &L,
    reporter: &StatusReporter,
) -> Result<MetricRecord, SessionError> {
    let args = vite_args(config);
    tracing::info!(
        command = %config.vite.command,
        args = ?args,
        "spawning vite dev server"
    );

    let mut child = Command::new(&config.vite.command)
        .args(&args)
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .process_group(0) // New process group for clean kill
        .kill_on_drop(true)
        .spawn()
        .map_err(|e| SessionError::Spawn { source: e })?;

    let pid = child.id().unwrap_or(0);
    tracing::info!(pid, "vite subprocess started");

    let mut stdout = child.stdout.take().expect("stdout piped");
    let mut stderr = child.stderr.take().expect("stderr piped");

    let (mut engine, mut events) = ExtractionEngine::new();
    let mut controller = SessionController::new(config.load_trigger);

    let ctrl_c = tokio::signal::ctrl_c();
    tokio::pin!(ctrl_c);

    let mut out_buf = [0u8; 8192];
    let mut err_buf = [0u8; 8192];
    let mut stdout_open = true;
    let mut stderr_open = true;

    let outcome = loop {
        tokio::select! {
            biased;
            read = stdout.read(&mut out_buf), if stdout_open => match read {
                Ok(0) => {
                    stdout_open = false;
                    continue;
                }
                Ok(n) => engine.feed(
                    &String::from_utf8_lossy(&out_buf[..n]),
                    StreamSource::Stdout,
                ),
                Err(e) => break Err(SessionError::Io { source: e }),
            },
            read = stderr.read(&mut err_buf), if stderr_open => match read {
                Ok(0) => {
                    stderr_open = false;
                    continue;
                }
                Ok(n) => engine.feed(
                    &String::from_utf8_lossy(&err_buf[..n]),
                    StreamSource::Stderr,
                ),
                Err(e) => break Err(SessionError::Io { source: e }),
            },
            status = child.wait() => {
                let code = status.ok().and_then(|s| s.code());
                tracing::warn!(exit_code = ?code, "dev server exited before session completed");
                break Err(SessionError::ServerExited { code });
            }
            _ = &mut ctrl_c => break Err(SessionError::Interrupted),
        }

        match drain_events(&mut events, &mut controller, &mut engine, loader, reporter).await {
            Ok(false) => {}
            Ok(true) => {
                teardown(&mut child, config.session.grace_delay_ms, reporter).await;
                controller.mark_done();
                break Ok(());
            }
            Err(e) => break Err(e),
        }
    };

    match outcome {
        Ok(()) => Ok(engine.record().clone()),
        Err(e) => {
            reporter.finish();
            kill_server(&mut child).await;
            Err(e)
        }
    }
}

/// Process every event the last feed produced, in firing order. Returns
/// `true` once the session should terminate.
async fn drain_events<L: PageLoader>(
    events: &mut UnboundedReceiver<ExtractionEvent>,
    controller: &mut SessionController,
    engine: &mut ExtractionEngine,
    loader: &L,
    reporter: &StatusReporter,
) -> Result<bool, SessionError> {
    let mut terminate = false;
    while let Ok(event) = events.try_recv() {
        let action = match event {
            ExtractionEvent::MetricObserved { metric, value } => {
                reporter.metric_observed(metric, value, engine.deps_hash_consistent());
                SessionAction::Continue
            }
            ExtractionEvent::ServerReady => {
                controller.on_server_ready(engine.deps_hash_consistent())
            }
            ExtractionEvent::DependenciesBundled => controller.on_dependencies_bundled(),
        };
        match action {
            SessionAction::Continue => {}
            SessionAction::MeasurePageLoad => {
                let url = engine
                    .server_url()
                    .map(str::to_string)
                    .ok_or(SessionError::MissingServerUrl)?;
                tracing::info!(url = %url, "measuring page load");
                let elapsed = loader
                    .load(&url)
                    .await
                    .map_err(|e| SessionError::PageLoad { source: e })?;
                engine.record_page_load(elapsed);
                if controller.page_load_finished() == SessionAction::Terminate {
                    terminate = true;
                }
            }
            SessionAction::Terminate => terminate = true,
        }
    }
    Ok(terminate)
}

/// Grace delay so the last status line settles, then tear the server down.
async fn teardown(child: &mut Child, grace_delay_ms: u64, reporter: &StatusReporter) {
    reporter.waiting("waiting to exit...");
    tokio::time::sleep(Duration::from_millis(grace_delay_ms)).await;
    reporter.finish();
    kill_server(child).await;
}

/// SIGTERM the dev server's process group and reap it. A child that already
/// exited is left alone.
async fn kill_server(child: &mut Child) {
    let Some(pid) = child.id() else {
        return;
    };
    if let Err(e) = signal::killpg(Pid::from_raw(pid as i32), Signal::SIGTERM) {
        tracing::warn!(error = %e, pid, "failed to signal dev server process group");
        let _ = child.kill().await;
        return;
    }
    let _ = child.wait().await;
    tracing::info!(pid, "dev server terminated");
}
