//! Reading session lifecycle manager.

use super::observable::Observable;
use super::state::{BookType, EndSessionResult, SessionState};
use super::tasks;
use crate::error::{Result, SessionError};
use crate::service::{HeartbeatAck, Milestone, ReadingPosition, SessionService};
use parking_lot::Mutex;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

/// Handles of the two periodic tasks of a running session.
struct RunningTasks {
    token: CancellationToken,
    ticker: JoinHandle<()>,
    heartbeat: JoinHandle<()>,
}

impl Drop for RunningTasks {
    fn drop(&mut self) {
        self.token.cancel();
        self.ticker.abort();
        self.heartbeat.abort();
    }
}

/// Bookkeeping guarded by the state lock. Never held across an await.
#[derive(Default)]
struct Core {
    /// Bumped on every task stop; stale tasks compare against it.
    generation: u64,
    tasks: Option<RunningTasks>,
    /// Last position reported by the reader, sent with heartbeats.
    position: ReadingPosition,
    /// Sequence number of the last server request carrying durations.
    issued: u64,
    /// Sequence number of the newest reply written to the state.
    applied: u64,
}

impl Core {
    fn next_sequence(&mut self) -> u64 {
        self.issued += 1;
        self.issued
    }

    /// Accept a reply for `sequence` unless a newer one already landed.
    fn accept(&mut self, sequence: u64) -> bool {
        if sequence <= self.applied {
            return false;
        }
        self.applied = sequence;
        true
    }
}

/// Fate of a heartbeat reply.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(super) enum Reconcile {
    /// Server figures were written to the state.
    Applied,
    /// A reply to a later request was applied first.
    Superseded,
    /// The session stopped or changed while the request was in flight.
    Stopped,
}

/// State shared between the manager and its periodic tasks.
pub(crate) struct Shared {
    pub(super) service: Arc<dyn SessionService>,
    state: Observable<SessionState>,
    milestones: Observable<Vec<Milestone>>,
    core: Mutex<Core>,
    /// Serializes lifecycle operations in call order.
    ops: tokio::sync::Mutex<()>,
    heartbeat_interval: Duration,
}

impl Shared {
    /// Stop any running tasks, apply `f` to the state, and start the tasks
    /// again when the new state is running.
    fn transition(self: &Arc<Self>, f: impl FnOnce(&mut SessionState)) {
        let mut core = self.core.lock();
        Self::stop_locked(&mut core);
        self.state.update(f);

        if self.state.read(SessionState::is_running) {
            core.generation += 1;
            let generation = core.generation;
            let token = CancellationToken::new();
            let ticker = tasks::spawn_ticker(Arc::downgrade(self), generation, token.clone());
            let heartbeat = tasks::spawn_heartbeat(
                Arc::downgrade(self),
                generation,
                token.clone(),
                self.heartbeat_interval,
            );
            core.tasks = Some(RunningTasks {
                token,
                ticker,
                heartbeat,
            });
        }
    }

    fn stop_tasks(&self) {
        let mut core = self.core.lock();
        Self::stop_locked(&mut core);
    }

    fn stop_locked(core: &mut Core) {
        core.generation += 1;
        core.tasks = None;
    }

    /// Clear the session, keeping the day total. A total confirmed by the
    /// server outranks any reply still in flight.
    fn reset(&self, today_duration: u64, confirmed: bool) {
        let mut core = self.core.lock();
        Self::stop_locked(&mut core);
        core.position = ReadingPosition::default();
        if confirmed {
            let sequence = core.next_sequence();
            core.accept(sequence);
        }
        self.state.set(SessionState::idle(today_duration));
    }

    fn begin_today_refresh(&self) -> u64 {
        self.core.lock().next_sequence()
    }

    /// Store a fetched day total unless a newer server figure landed meanwhile.
    fn apply_today(&self, sequence: u64, today_duration: u64) -> bool {
        let mut core = self.core.lock();
        if !core.accept(sequence) {
            return false;
        }
        self.state.update(|s| s.today_duration = today_duration);
        true
    }

    /// Apply one local tick. Returns false if `generation` is stale.
    pub(super) fn tick(&self, generation: u64) -> bool {
        let core = self.core.lock();
        if core.generation != generation {
            return false;
        }
        self.state.update(|s| s.duration_seconds += 1);
        true
    }

    /// Session id, buffered position and sequence number for a heartbeat,
    /// if still running.
    pub(super) fn heartbeat_request(
        &self,
        generation: u64,
    ) -> Option<(i64, ReadingPosition, u64)> {
        let mut core = self.core.lock();
        if core.generation != generation {
            return None;
        }
        let session_id = self
            .state
            .read(|s| if s.is_running() { s.session_id } else { None })?;
        let sequence = core.next_sequence();
        Some((session_id, core.position.clone(), sequence))
    }

    /// Overwrite the local estimate with server figures, unless the session
    /// changed or a later request was answered first.
    pub(super) fn apply_heartbeat(
        &self,
        generation: u64,
        session_id: i64,
        sequence: u64,
        ack: HeartbeatAck,
    ) -> Reconcile {
        let mut core = self.core.lock();
        if core.generation != generation {
            return Reconcile::Stopped;
        }
        if !self
            .state
            .read(|s| s.is_running() && s.session_id == Some(session_id))
        {
            return Reconcile::Stopped;
        }
        if !core.accept(sequence) {
            return Reconcile::Superseded;
        }

        self.state.update(|s| {
            s.duration_seconds = ack.duration_seconds;
            s.today_duration = ack.today_duration;
        });
        Reconcile::Applied
    }
}

/// Coordinates one reading session at a time.
///
/// Owns the observable [`SessionState`], starts and stops the local ticker
/// and the heartbeat scheduler, and funnels every lifecycle call through a
/// single lock so calls apply in the order they were made.
#[derive(Clone)]
pub struct SessionManager {
    shared: Arc<Shared>,
}

impl SessionManager {
    /// Create an idle manager.
    pub fn new(service: Arc<dyn SessionService>, heartbeat_interval: Duration) -> Self {
        Self {
            shared: Arc::new(Shared {
                service,
                state: Observable::new(SessionState::default()),
                milestones: Observable::new(Vec::new()),
                core: Mutex::new(Core::default()),
                ops: tokio::sync::Mutex::new(()),
                heartbeat_interval,
            }),
        }
    }

    /// Snapshot of the session state.
    pub fn state(&self) -> SessionState {
        self.shared.state.get()
    }

    /// Subscribe to session state changes.
    pub fn subscribe(&self) -> watch::Receiver<SessionState> {
        self.shared.state.subscribe()
    }

    /// Milestones reported by the last ended session, until cleared.
    ///
    /// Every `end_session` replaces the list; a failed end empties it.
    pub fn milestones(&self) -> Vec<Milestone> {
        self.shared.milestones.get()
    }

    /// Subscribe to milestone changes.
    pub fn subscribe_milestones(&self) -> watch::Receiver<Vec<Milestone>> {
        self.shared.milestones.subscribe()
    }

    /// Drop milestones once the UI has shown them.
    pub fn clear_milestones(&self) {
        self.shared.milestones.set(Vec::new());
    }

    /// Whether the ticker and heartbeat scheduler are running.
    pub fn tasks_running(&self) -> bool {
        self.shared.core.lock().tasks.is_some()
    }

    /// Current session duration as `HH:MM:SS` or `MM:SS`.
    pub fn formatted_duration(&self) -> String {
        self.shared.state.read(SessionState::formatted_duration)
    }

    /// Whether a session is active for this book.
    pub fn is_session_active_for_book(&self, book_id: i64, book_type: BookType) -> bool {
        self.shared.state.read(|s| s.is_for_book(book_id, book_type))
    }

    /// Buffer the reader's position for the next heartbeat.
    pub fn update_position(&self, position: ReadingPosition) {
        self.shared.core.lock().position = position;
    }

    /// Start a session, ending any session already active first.
    ///
    /// Returns the new session id. On failure no session is active.
    pub async fn start_session(
        &self,
        book_id: i64,
        book_type: BookType,
        position: ReadingPosition,
    ) -> Result<i64> {
        let _ops = self.shared.ops.lock().await;

        if let Some(previous) = self.shared.state.read(|s| s.session_id) {
            tracing::info!(
                session_id = previous,
                "Ending previous session before starting a new one"
            );
            let _ = self.end_locked(ReadingPosition::default()).await;
        }

        let started = match self
            .shared
            .service
            .start(book_id, book_type, &position)
            .await
        {
            Ok(started) => started,
            Err(e) => {
                tracing::warn!(book_id, %book_type, error = %e, "Failed to start session");
                return Err(e);
            }
        };

        self.shared.core.lock().position = position;
        self.shared.transition(|s| {
            *s = SessionState {
                session_id: Some(started.session_id),
                book_id: Some(book_id),
                book_type: Some(book_type),
                is_active: true,
                is_paused: false,
                duration_seconds: 0,
                today_duration: s.today_duration,
                start_time: Some(started.start_time),
            };
        });

        tracing::info!(
            session_id = started.session_id,
            book_id,
            %book_type,
            "Reading session started"
        );
        Ok(started.session_id)
    }

    /// Pause the running session.
    pub async fn pause_session(&self) -> Result<()> {
        let _ops = self.shared.ops.lock().await;

        let (session_id, paused) = self.shared.state.read(|s| (s.session_id, s.is_paused));
        let session_id = session_id.ok_or(SessionError::NoActiveSession)?;
        if paused {
            return Err(SessionError::InvalidTransition("session is already paused"));
        }

        if let Err(e) = self.shared.service.pause(session_id).await {
            tracing::warn!(session_id, error = %e, "Failed to pause session");
            return Err(e);
        }

        self.shared.transition(|s| s.is_paused = true);
        tracing::info!(session_id, "Reading session paused");
        Ok(())
    }

    /// Resume the paused session.
    pub async fn resume_session(&self) -> Result<()> {
        let _ops = self.shared.ops.lock().await;

        let (session_id, paused) = self.shared.state.read(|s| (s.session_id, s.is_paused));
        let session_id = session_id.ok_or(SessionError::NoActiveSession)?;
        if !paused {
            return Err(SessionError::InvalidTransition("session is not paused"));
        }

        if let Err(e) = self.shared.service.resume(session_id).await {
            tracing::warn!(session_id, error = %e, "Failed to resume session");
            return Err(e);
        }

        self.shared.transition(|s| s.is_paused = false);
        tracing::info!(session_id, "Reading session resumed");
        Ok(())
    }

    /// End the active session.
    ///
    /// Local state is cleared even when the server call fails; the error is
    /// still returned to the caller.
    pub async fn end_session(&self, position: ReadingPosition) -> Result<EndSessionResult> {
        let _ops = self.shared.ops.lock().await;
        self.end_locked(position).await
    }

    async fn end_locked(&self, position: ReadingPosition) -> Result<EndSessionResult> {
        self.shared.stop_tasks();

        let (session_id, today) = self
            .shared
            .state
            .read(|s| (s.session_id, s.today_duration));
        let session_id = session_id.ok_or(SessionError::NoActiveSession)?;

        let position = position.or(self.shared.core.lock().position.clone());

        match self.shared.service.end(session_id, &position).await {
            Ok(ended) => {
                self.shared.reset(ended.today_duration, true);
                self.shared
                    .milestones
                    .set(ended.milestones_achieved.clone());

                tracing::info!(
                    session_id,
                    duration = ended.duration_seconds,
                    milestones = ended.milestones_achieved.len(),
                    "Reading session ended"
                );

                Ok(EndSessionResult {
                    duration_seconds: ended.duration_seconds,
                    today_duration: ended.today_duration,
                    milestones: ended.milestones_achieved,
                })
            }
            Err(e) => {
                self.shared.reset(today, false);
                self.shared.milestones.set(Vec::new());
                tracing::warn!(session_id, error = %e, "Failed to end session, cleared locally");
                Err(e)
            }
        }
    }

    /// Send a heartbeat now instead of waiting for the next cycle.
    pub async fn flush(&self) -> Result<()> {
        let _ops = self.shared.ops.lock().await;
        self.flush_locked().await
    }

    async fn flush_locked(&self) -> Result<()> {
        let generation = {
            let core = self.shared.core.lock();
            if core.tasks.is_none() {
                return Err(if self.shared.state.read(|s| s.is_active) {
                    SessionError::InvalidTransition("session is paused")
                } else {
                    SessionError::NoActiveSession
                });
            }
            core.generation
        };

        tasks::send_heartbeat(&self.shared, generation).await?;
        Ok(())
    }

    /// The app is going to the background: report progress now.
    pub async fn enter_background(&self) -> Result<()> {
        let _ops = self.shared.ops.lock().await;
        if !self.shared.state.read(SessionState::is_running) {
            return Ok(());
        }
        self.flush_locked().await
    }

    /// The app is back in the foreground.
    ///
    /// Restarts the periodic tasks of a running session and reconciles with
    /// the server, or runs recovery when no session is known.
    /// Returns whether a session is active afterwards.
    pub async fn enter_foreground(&self) -> Result<bool> {
        let _ops = self.shared.ops.lock().await;

        let (active, running) = self
            .shared
            .state
            .read(|s| (s.is_active, s.is_running()));
        if !active {
            return self.recover_locked().await;
        }
        if running {
            self.shared.transition(|_| {});
            if let Err(e) = self.flush_locked().await {
                tracing::warn!(error = %e, "Foreground heartbeat failed");
            }
        }
        Ok(true)
    }

    /// Re-attach to a session the server still considers active.
    ///
    /// Returns whether a session is active afterwards. An absent server
    /// session is the normal case, not an error.
    pub async fn recover(&self) -> Result<bool> {
        let _ops = self.shared.ops.lock().await;
        self.recover_locked().await
    }

    async fn recover_locked(&self) -> Result<bool> {
        if self.shared.state.read(|s| s.is_active) {
            return Ok(true);
        }

        let Some(active) = self.shared.service.active_session().await? else {
            tracing::debug!("No active session on server");
            return Ok(false);
        };

        self.shared.transition(|s| {
            *s = SessionState {
                session_id: Some(active.session_id),
                book_id: Some(active.book_id),
                book_type: Some(active.book_type),
                is_active: true,
                is_paused: false,
                duration_seconds: active.duration_seconds,
                today_duration: s.today_duration,
                start_time: Some(active.start_time),
            };
        });

        tracing::info!(
            session_id = active.session_id,
            book_id = active.book_id,
            duration = active.duration_seconds,
            "Recovered active session"
        );
        Ok(true)
    }

    /// Fetch today's reading time and store it in the state.
    ///
    /// A heartbeat or end answered while this call was in flight carries a
    /// newer total; in that case the stored total is kept and returned.
    pub async fn refresh_today_duration(&self) -> Result<u64> {
        let _ops = self.shared.ops.lock().await;

        let sequence = self.shared.begin_today_refresh();
        let today = self.shared.service.today_duration().await?.today_duration;

        if !self.shared.apply_today(sequence, today) {
            tracing::debug!(today, "Discarding day total older than last server figure");
        }
        Ok(self.shared.state.read(|s| s.today_duration))
    }
}
