//! Execution session manager.
//!
//! One session per room, shared by every viewer of that room:
//!
//! ```text
//!            join / leave                 run
//! Viewer ─────────────────┐      ┌──────────────────── any connection
//!                         ▼      ▼
//!                   ExecutionSession(room)
//!                   │ output buffer (scrollback)
//!                   │ work dir (lazy, per session)
//!                   └ process ──► supervisor task ──► data / exit to viewers
//! ```
//!
//! Lifecycle: `Idle → Preparing → Running → Idle`, and `Disposed` once the
//! viewer set has stayed empty for the idle grace period. A new run always
//! supersedes the current one: a run still preparing is abandoned, the old
//! process is killed and reaped before the new one is spawned, and every
//! publish is checked against the session's current run id so a superseded
//! run can never write into the new run's output.

use std::collections::HashMap;
use std::fmt;
use std::io;
use std::path::PathBuf;
use std::process::ExitStatus;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tempfile::TempDir;
use tokio::io::{AsyncRead, AsyncReadExt};
use tokio::process::Child;
use tokio::sync::{mpsc, oneshot, Mutex};
use tokio::task::JoinHandle;

use pairpad_core::{ConnectionId, RoomKey, ValidationError};

use crate::buffer::{OutputBuffer, Utf8Decoder};
use crate::event::{ExecEvent, TerminalSize, Viewer};
use crate::language::Language;
use crate::toolchain::Toolchain;

/// Clears the screen and scrollback, then homes the cursor.
pub const TERMINAL_RESET: &str = "\x1b[2J\x1b[3J\x1b[H";

/// Sent once when a run's output exceeds `max_run_output_chars`.
pub const OUTPUT_LIMIT_NOTICE: &str = "\r\n[Output limit exceeded: process killed]\r\n";

const READ_CHUNK: usize = 8192;

/// Execution manager configuration.
#[derive(Debug, Clone)]
pub struct ExecConfig {
    /// How long a session with no viewers survives
    pub idle_grace: Duration,
    /// Wall-clock limit per run
    pub run_timeout: Duration,
    /// Scrollback kept for late joiners
    pub max_buffer_chars: usize,
    /// Streamed characters per run before the process is killed
    pub max_run_output_chars: usize,
    pub max_code_chars: usize,
    /// Time allowed to read what is left in the pipes after exit
    pub drain_grace: Duration,
    pub toolchain: Toolchain,
    /// Parent of the per-session work dirs; the system temp dir if unset
    pub work_root: Option<PathBuf>,
}

impl Default for ExecConfig {
    fn default() -> Self {
        Self {
            idle_grace: Duration::from_secs(30),
            run_timeout: Duration::from_secs(10),
            max_buffer_chars: 64_000,
            max_run_output_chars: 256_000,
            max_code_chars: 200_000,
            drain_grace: Duration::from_millis(200),
            toolchain: Toolchain::default(),
            work_root: None,
        }
    }
}

impl ExecConfig {
    pub fn with_defaults() -> Self {
        Self::default()
    }
}

/// Why a run did not start. `Display` is the text sent to the requester.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ExecError {
    Validation(ValidationError),
    WorkDir(String),
    Materialize(String),
    Transpile(String),
    Spawn(String),
}

impl fmt::Display for ExecError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Validation(e) => write!(f, "{e}"),
            Self::WorkDir(e) => write!(f, "Failed to create work directory: {e}"),
            Self::Materialize(e) => write!(f, "Failed to write source file: {e}"),
            Self::Transpile(e) => write!(f, "TypeScript compilation failed: {e}"),
            Self::Spawn(e) => write!(f, "Failed to start process: {e}"),
        }
    }
}

impl std::error::Error for ExecError {}

impl From<ValidationError> for ExecError {
    fn from(e: ValidationError) -> Self {
        ExecError::Validation(e)
    }
}

/// Where a session is in its run cycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionPhase {
    Idle,
    Preparing,
    Running,
}

/// Handle to the supervisor of a live process.
struct RunHandle {
    run_id: u64,
    kill: Option<oneshot::Sender<()>>,
    supervisor: Option<JoinHandle<()>>,
}

impl RunHandle {
    /// Ask the supervisor to SIGKILL its child. Idempotent.
    fn kill(&mut self) {
        if let Some(tx) = self.kill.take() {
            let _ = tx.send(());
        }
    }
}

struct ExecutionSession {
    viewers: HashMap<ConnectionId, Viewer>,
    output: OutputBuffer,
    work_dir: Option<TempDir>,
    process: Option<RunHandle>,
    current_run: u64,
    disposal: Option<JoinHandle<()>>,
    phase: SessionPhase,
    /// Fired to abandon the run that is still preparing
    preparing: Option<oneshot::Sender<()>>,
    /// Serializes writes into the work dir across overlapping runs
    materialize: Arc<Mutex<()>>,
}

impl ExecutionSession {
    fn new(max_buffer_chars: usize) -> Self {
        Self {
            viewers: HashMap::new(),
            output: OutputBuffer::new(max_buffer_chars),
            work_dir: None,
            process: None,
            current_run: 0,
            disposal: None,
            phase: SessionPhase::Idle,
            preparing: None,
            materialize: Arc::new(Mutex::new(())),
        }
    }

    fn cancel_disposal(&mut self) {
        if let Some(timer) = self.disposal.take() {
            timer.abort();
        }
    }

    /// Abandon a run that has not spawned yet. Its transpiler, if any, is
    /// killed when the preparation future is dropped.
    fn cancel_preparing(&mut self) {
        if let Some(cancel) = self.preparing.take() {
            let _ = cancel.send(());
        }
    }

    fn broadcast(&mut self, event: &ExecEvent) {
        for viewer in self.viewers.values() {
            let _ = viewer.send(event.clone());
        }
    }

    /// Append to the scrollback and stream to every viewer.
    fn publish(&mut self, text: &str) {
        self.output.push(text);
        self.broadcast(&ExecEvent::data(text));
    }

    fn ensure_work_dir(&mut self, room: &RoomKey, config: &ExecConfig) -> io::Result<PathBuf> {
        if let Some(dir) = &self.work_dir {
            return Ok(dir.path().to_path_buf());
        }

        let prefix = format!("pairpad-{room}-");
        let mut builder = tempfile::Builder::new();
        builder.prefix(&prefix);
        let dir = match &config.work_root {
            Some(root) => builder.tempdir_in(root)?,
            None => builder.tempdir()?,
        };
        let path = dir.path().to_path_buf();
        log::debug!("Created work dir {} for room {room}", path.display());
        self.work_dir = Some(dir);
        Ok(path)
    }
}

/// A validated run waiting to be started. See [`ExecutionManager::submit`].
pub struct PendingRun {
    manager: ExecutionManager,
    run_id: u64,
    room: RoomKey,
    language: Language,
    code: String,
}

impl PendingRun {
    pub fn run_id(&self) -> u64 {
        self.run_id
    }

    /// Supersede the room's current run and start this one. Resolves once
    /// the process is spawned, or when this run is itself superseded.
    pub async fn start(self) -> Result<(), ExecError> {
        let Self {
            manager,
            run_id,
            room,
            language,
            code,
        } = self;
        manager.execute(run_id, room, language, &code).await
    }
}

struct Inner {
    config: ExecConfig,
    sessions: Mutex<HashMap<RoomKey, ExecutionSession>>,
    next_run: AtomicU64,
}

/// Owns every room's execution session. Cheap to clone.
#[derive(Clone)]
pub struct ExecutionManager {
    inner: Arc<Inner>,
}

impl ExecutionManager {
    pub fn new(config: ExecConfig) -> Self {
        Self {
            inner: Arc::new(Inner {
                config,
                sessions: Mutex::new(HashMap::new()),
                next_run: AtomicU64::new(0),
            }),
        }
    }

    pub fn config(&self) -> &ExecConfig {
        &self.inner.config
    }

    /// Start watching a room. The current scrollback, if any, is replayed
    /// to `viewer` only.
    pub async fn join(
        &self,
        id: ConnectionId,
        room_key: &str,
        size: TerminalSize,
        viewer: Viewer,
    ) -> Result<(), ValidationError> {
        let room = RoomKey::parse(room_key)?;
        let mut sessions = self.inner.sessions.lock().await;
        let session = self.session_entry(&mut sessions, &room);
        session.cancel_disposal();

        if !session.output.is_empty() {
            let _ = viewer.send(ExecEvent::data(session.output.as_str()));
        }
        session.viewers.insert(id, viewer);

        log::debug!(
            "Viewer {id} joined room {room} ({}x{}), {} viewer(s)",
            size.cols,
            size.rows,
            session.viewers.len()
        );
        Ok(())
    }

    /// Stop watching a room.
    pub async fn leave(&self, id: ConnectionId, room_key: &str) -> Result<(), ValidationError> {
        let room = RoomKey::parse(room_key)?;
        let mut sessions = self.inner.sessions.lock().await;
        if let Some(session) = sessions.get_mut(&room) {
            if session.viewers.remove(&id).is_some() {
                log::debug!("Viewer {id} left room {room}");
            }
            self.schedule_disposal(&room, session);
        }
        Ok(())
    }

    /// Leave every room `id` is watching. Called when its transport closes.
    pub async fn disconnect(&self, id: ConnectionId) {
        let mut sessions = self.inner.sessions.lock().await;
        for (room, session) in sessions.iter_mut() {
            if session.viewers.remove(&id).is_some() {
                log::debug!("Viewer {id} disconnected from room {room}");
                self.schedule_disposal(room, session);
            }
        }
    }

    /// Terminal size changes are accepted but not acted on; runs have no
    /// pseudo-terminal.
    pub async fn resize(
        &self,
        id: ConnectionId,
        room_key: &str,
        size: TerminalSize,
    ) -> Result<(), ValidationError> {
        let room = RoomKey::parse(room_key)?;
        log::debug!("Resize from {id} in room {room}: {}x{}", size.cols, size.rows);
        Ok(())
    }

    /// Run `code` in the room's session, superseding whatever is running.
    ///
    /// Errors are meant for the requester only; nothing is broadcast and the
    /// buffer is untouched when validation fails. A run that is superseded
    /// while still preparing is abandoned at once (a pending transpile is
    /// killed) and returns `Ok` without spawning.
    pub async fn run(
        &self,
        id: ConnectionId,
        room_key: &str,
        language: &str,
        code: &str,
    ) -> Result<(), ExecError> {
        self.submit(id, room_key, language, code)?.start().await
    }

    /// Validate a run request and fix its place in the room's run order
    /// without starting it.
    ///
    /// Runs are ordered by submission: a pending run that is started after a
    /// later submission has already taken the session is dropped.
    pub fn submit(
        &self,
        id: ConnectionId,
        room_key: &str,
        language: &str,
        code: &str,
    ) -> Result<PendingRun, ExecError> {
        let (room, language) = self.validate(room_key, language, code)?;
        let run_id = self.inner.next_run.fetch_add(1, Ordering::SeqCst) + 1;
        log::info!("Run {run_id} ({language}) requested by {id} in room {room}");
        Ok(PendingRun {
            manager: self.clone(),
            run_id,
            room,
            language,
            code: code.to_string(),
        })
    }

    async fn execute(
        &self,
        run_id: u64,
        room: RoomKey,
        language: Language,
        code: &str,
    ) -> Result<(), ExecError> {
        // Supersede the current run and reset every viewer's terminal.
        let (cancel_tx, mut cancelled) = oneshot::channel();
        let previous = {
            let mut sessions = self.inner.sessions.lock().await;
            let session = self.session_entry(&mut sessions, &room);
            if session.current_run > run_id {
                log::debug!("Run {run_id} superseded before starting");
                return Ok(());
            }
            session.cancel_disposal();
            session.cancel_preparing();
            session.preparing = Some(cancel_tx);
            session.current_run = run_id;
            let previous = session.process.take().map(|mut handle| {
                handle.kill();
                handle.supervisor.take()
            });
            session.output.clear();
            session.broadcast(&ExecEvent::data(TERMINAL_RESET));
            session.phase = SessionPhase::Preparing;
            previous.flatten()
        };
        if let Some(supervisor) = previous {
            // Reaped once the supervisor returns
            let _ = supervisor.await;
        }

        let (work_dir, materialize) = {
            let mut sessions = self.inner.sessions.lock().await;
            let Some(session) = sessions.get_mut(&room) else {
                return Ok(());
            };
            if session.current_run != run_id {
                log::debug!("Run {run_id} superseded before preparing");
                return Ok(());
            }
            match session.ensure_work_dir(&room, &self.inner.config) {
                Ok(path) => (path, session.materialize.clone()),
                Err(e) => {
                    let err = ExecError::WorkDir(e.to_string());
                    self.fail_run(&room, session, &err);
                    return Err(err);
                }
            }
        };

        let preparation = async {
            let _writing = materialize.lock().await;
            self.inner
                .config
                .toolchain
                .prepare(language, code, &work_dir, self.inner.config.run_timeout)
                .await
        };
        // A dropped sender means the session was disposed
        let prepared = tokio::select! {
            prepared = preparation => prepared,
            _ = &mut cancelled => {
                log::debug!("Run {run_id} cancelled while preparing");
                return Ok(());
            }
        };

        let mut sessions = self.inner.sessions.lock().await;
        let Some(session) = sessions.get_mut(&room) else {
            return Ok(());
        };
        if session.current_run != run_id {
            log::debug!("Run {run_id} superseded while preparing");
            return Ok(());
        }
        session.preparing = None;

        let launch = match prepared {
            Ok(launch) => launch,
            Err(err) => {
                self.fail_run(&room, session, &err);
                return Err(err);
            }
        };

        let child = match launch
            .command(&work_dir, &self.inner.config.toolchain.path)
            .spawn()
        {
            Ok(child) => child,
            Err(e) => {
                let err = ExecError::Spawn(format!("{}: {e}", launch.program));
                self.fail_run(&room, session, &err);
                return Err(err);
            }
        };

        let display = launch.display();
        log::info!("Run {run_id} started in room {room}: {display}");
        session.publish(&format!("$ {display}\r\n"));

        let (kill_tx, kill_rx) = oneshot::channel();
        let supervisor = RunSupervisor::new(self.clone(), room.clone(), run_id);
        let task = tokio::spawn(supervisor.run(child, kill_rx));
        session.process = Some(RunHandle {
            run_id,
            kill: Some(kill_tx),
            supervisor: Some(task),
        });
        session.phase = SessionPhase::Running;
        Ok(())
    }

    /// Dispose every session immediately.
    pub async fn shutdown(&self) {
        let rooms: Vec<RoomKey> = {
            let mut sessions = self.inner.sessions.lock().await;
            for session in sessions.values_mut() {
                session.viewers.clear();
                session.cancel_disposal();
            }
            sessions.keys().cloned().collect()
        };
        for room in rooms {
            self.dispose(&room).await;
        }
    }

    pub async fn session_count(&self) -> usize {
        self.inner.sessions.lock().await.len()
    }

    pub async fn has_session(&self, room_key: &str) -> bool {
        match RoomKey::parse(room_key) {
            Ok(room) => self.inner.sessions.lock().await.contains_key(&room),
            Err(_) => false,
        }
    }

    pub async fn has_process(&self, room_key: &str) -> bool {
        self.with_session(room_key, |s| s.process.is_some())
            .await
            .unwrap_or(false)
    }

    pub async fn output_buffer(&self, room_key: &str) -> Option<String> {
        self.with_session(room_key, |s| s.output.as_str().to_string())
            .await
    }

    pub async fn work_dir(&self, room_key: &str) -> Option<PathBuf> {
        self.with_session(room_key, |s| {
            s.work_dir.as_ref().map(|d| d.path().to_path_buf())
        })
        .await
        .flatten()
    }

    pub async fn viewer_count(&self, room_key: &str) -> usize {
        self.with_session(room_key, |s| s.viewers.len())
            .await
            .unwrap_or(0)
    }

    pub async fn phase(&self, room_key: &str) -> Option<SessionPhase> {
        self.with_session(room_key, |s| s.phase).await
    }

    // ===== internals =====

    fn validate(
        &self,
        room_key: &str,
        language: &str,
        code: &str,
    ) -> Result<(RoomKey, Language), ValidationError> {
        let room = RoomKey::parse(room_key)?;
        let language = language.parse::<Language>()?;
        if code.is_empty() {
            return Err(ValidationError::EmptyCode);
        }
        let len = code.chars().count();
        let max = self.inner.config.max_code_chars;
        if len > max {
            return Err(ValidationError::CodeTooLarge { len, max });
        }
        Ok((room, language))
    }

    fn session_entry<'a>(
        &self,
        sessions: &'a mut HashMap<RoomKey, ExecutionSession>,
        room: &RoomKey,
    ) -> &'a mut ExecutionSession {
        sessions.entry(room.clone()).or_insert_with(|| {
            log::info!("Created execution session for room {room}");
            ExecutionSession::new(self.inner.config.max_buffer_chars)
        })
    }

    async fn with_session<T>(
        &self,
        room_key: &str,
        f: impl FnOnce(&ExecutionSession) -> T,
    ) -> Option<T> {
        let room = RoomKey::parse(room_key).ok()?;
        let sessions = self.inner.sessions.lock().await;
        sessions.get(&room).map(f)
    }

    fn fail_run(&self, room: &RoomKey, session: &mut ExecutionSession, err: &ExecError) {
        log::warn!("Run failed in room {room}: {err}");
        session.preparing = None;
        session.phase = SessionPhase::Idle;
        self.schedule_disposal(room, session);
    }

    /// Start the idle timer if nobody is watching and none is pending.
    fn schedule_disposal(&self, room: &RoomKey, session: &mut ExecutionSession) {
        if !session.viewers.is_empty() || session.disposal.is_some() {
            return;
        }

        let manager = self.clone();
        let room = room.clone();
        let grace = self.inner.config.idle_grace;
        log::debug!("Room {room} has no viewers, disposing in {grace:?}");
        session.disposal = Some(tokio::spawn(async move {
            tokio::time::sleep(grace).await;
            manager.dispose(&room).await;
        }));
    }

    async fn dispose(&self, room: &RoomKey) {
        let removed = {
            let mut sessions = self.inner.sessions.lock().await;
            let idle = sessions
                .get(room)
                .is_some_and(|session| session.viewers.is_empty());
            if idle {
                sessions.remove(room)
            } else {
                None
            }
        };
        let Some(mut session) = removed else {
            return;
        };

        if let Some(mut handle) = session.process.take() {
            handle.kill();
            if let Some(supervisor) = handle.supervisor.take() {
                let _ = supervisor.await;
            }
        }
        if let Some(dir) = session.work_dir.take() {
            let path = dir.path().to_path_buf();
            match tokio::task::spawn_blocking(move || dir.close()).await {
                Ok(Ok(())) => {}
                Ok(Err(e)) => log::warn!("Failed to remove {}: {e}", path.display()),
                Err(e) => log::warn!("Failed to remove {}: {e}", path.display()),
            }
        }
        log::info!("Disposed execution session for room {room}");
    }

    /// Stream `text` if `run_id` is still the room's current run.
    async fn publish(&self, room: &RoomKey, run_id: u64, text: &str) -> bool {
        let mut sessions = self.inner.sessions.lock().await;
        match sessions.get_mut(room) {
            Some(session) if session.current_run == run_id => {
                session.publish(text);
                true
            }
            _ => false,
        }
    }

    async fn finish_run(&self, room: &RoomKey, run_id: u64, exit: ExecEvent) {
        let mut sessions = self.inner.sessions.lock().await;
        let Some(session) = sessions.get_mut(room) else {
            return;
        };
        if session.current_run != run_id {
            return;
        }

        log::info!("Run {run_id} in room {room} finished: {exit:?}");
        session.broadcast(&exit);
        if session.process.as_ref().map(|p| p.run_id) == Some(run_id) {
            session.process = None;
        }
        session.phase = SessionPhase::Idle;
        self.schedule_disposal(room, session);
    }
}

/// Owns a run's child process until it exits.
struct RunSupervisor {
    manager: ExecutionManager,
    room: RoomKey,
    run_id: u64,
    decoder: Utf8Decoder,
    streamed: usize,
    /// Set once a limit notice is out; nothing more is streamed
    silenced: bool,
}

impl RunSupervisor {
    fn new(manager: ExecutionManager, room: RoomKey, run_id: u64) -> Self {
        Self {
            manager,
            room,
            run_id,
            decoder: Utf8Decoder::new(),
            streamed: 0,
            silenced: false,
        }
    }

    async fn run(mut self, mut child: Child, mut kill_rx: oneshot::Receiver<()>) {
        let (tx, mut chunks) = mpsc::channel::<Vec<u8>>(64);
        let mut pumps = Vec::with_capacity(2);
        if let Some(stdout) = child.stdout.take() {
            pumps.push(pump(stdout, tx.clone()));
        }
        if let Some(stderr) = child.stderr.take() {
            pumps.push(pump(stderr, tx.clone()));
        }
        drop(tx);

        let run_timeout = self.manager.inner.config.run_timeout;
        let deadline = tokio::time::sleep(run_timeout);
        tokio::pin!(deadline);
        let mut kill_armed = true;
        let mut timed_out = false;

        let status = loop {
            tokio::select! {
                Some(chunk) = chunks.recv() => {
                    let text = self.decoder.push(&chunk);
                    if self.emit(text).await {
                        let _ = child.start_kill();
                    }
                }
                status = child.wait() => break status,
                _ = &mut kill_rx, if kill_armed => {
                    // Superseded, disposed, or the handle was dropped
                    kill_armed = false;
                    self.silenced = true;
                    let _ = child.start_kill();
                }
                _ = &mut deadline, if !timed_out => {
                    timed_out = true;
                    if !self.silenced {
                        self.silenced = true;
                        let notice = format!(
                            "\r\n[Execution timed out after {}: process killed]\r\n",
                            format_duration(run_timeout)
                        );
                        self.manager.publish(&self.room, self.run_id, &notice).await;
                    }
                    let _ = child.start_kill();
                }
            }
        };

        // Whatever is still in the pipes, unless a grandchild holds them open
        let drain_grace = self.manager.inner.config.drain_grace;
        let drained = tokio::time::timeout(drain_grace, async {
            while let Some(chunk) = chunks.recv().await {
                let text = self.decoder.push(&chunk);
                self.emit(text).await;
            }
        })
        .await;
        if drained.is_err() {
            log::debug!("Run {} left its output pipes open", self.run_id);
        }
        for pump in pumps {
            pump.abort();
        }
        let rest = self.decoder.finish();
        self.emit(rest).await;

        let exit = exit_event(status);
        self.manager.finish_run(&self.room, self.run_id, exit).await;
    }

    /// Stream decoded output, enforcing the per-run limit. Returns `true`
    /// when the limit was just reached and the child must be killed.
    async fn emit(&mut self, text: String) -> bool {
        if self.silenced || text.is_empty() {
            return false;
        }

        let limit = self.manager.inner.config.max_run_output_chars;
        let len = text.chars().count();
        if self.streamed + len <= limit {
            self.streamed += len;
            self.manager.publish(&self.room, self.run_id, &text).await;
            return false;
        }

        let mut out: String = text.chars().take(limit - self.streamed).collect();
        out.push_str(OUTPUT_LIMIT_NOTICE);
        self.streamed = limit;
        self.silenced = true;
        log::info!("Run {} in room {} hit the output limit", self.run_id, self.room);
        self.manager.publish(&self.room, self.run_id, &out).await;
        true
    }
}

fn pump<R>(mut reader: R, tx: mpsc::Sender<Vec<u8>>) -> JoinHandle<()>
where
    R: AsyncRead + Unpin + Send + 'static,
{
    tokio::spawn(async move {
        let mut buf = vec![0u8; READ_CHUNK];
        loop {
            match reader.read(&mut buf).await {
                Ok(0) | Err(_) => break,
                Ok(n) => {
                    if tx.send(buf[..n].to_vec()).await.is_err() {
                        break;
                    }
                }
            }
        }
    })
}

fn exit_event(status: io::Result<ExitStatus>) -> ExecEvent {
    match status {
        Ok(status) => ExecEvent::Exit {
            exit_code: status.code(),
            signal: signal_name(&status),
        },
        Err(e) => {
            log::warn!("Failed to wait for child: {e}");
            ExecEvent::Exit {
                exit_code: None,
                signal: None,
            }
        }
    }
}

#[cfg(unix)]
fn signal_name(status: &ExitStatus) -> Option<String> {
    use std::os::unix::process::ExitStatusExt;

    status.signal().map(|sig| match sig {
        1 => "SIGHUP".to_string(),
        2 => "SIGINT".to_string(),
        6 => "SIGABRT".to_string(),
        9 => "SIGKILL".to_string(),
        11 => "SIGSEGV".to_string(),
        13 => "SIGPIPE".to_string(),
        15 => "SIGTERM".to_string(),
        other => format!("SIG{other}"),
    })
}

#[cfg(not(unix))]
fn signal_name(_status: &ExitStatus) -> Option<String> {
    None
}

fn format_duration(d: Duration) -> String {
    if d.subsec_millis() == 0 {
        format!("{}s", d.as_secs())
    } else {
        format!("{}ms", d.as_millis())
    }
}
