//! Session manager: register or restore a shell, keep its output flowing,
//! relay commands, and tear it down.
//!
//! Every request runs on its own spawned task. Completion handlers take the
//! session lock, apply the response, and spawn the follow-up request (if any)
//! as a new task, so a request is never re-issued from inside its own
//! completion. Host callbacks are delivered after the lock is released;
//! input changes are numbered under the lock and delivered in that order.

use std::{
    sync::{Arc, Mutex, MutexGuard, PoisonError},
    time::Duration,
};

use remote_shell_core::{
    HostSurface, OutputBuffer, Session, SessionError, SessionFault, SessionState, ShellId,
};
use remote_shell_transport::{
    CommandResponse, CreateResponse, OutputResponse, RestoreResponse, ShellTransport,
    TransportError,
};
use tokio::{sync::watch, task::JoinHandle};
use uuid::Uuid;

use crate::{
    CommandChannel, OutputChannel, PollDirective, SessionConfig, SubmitError,
    requests::{InFlight, PendingRequests, RequestHandle, RequestKind},
};

/// Mutable session state, guarded by one lock.
struct Inner {
    session: Session,
    /// Shell we were asked to reattach to; cleared once a shell is adopted.
    prior_id: Option<ShellId>,
    output: OutputChannel,
    commands: CommandChannel,
    requests: PendingRequests,
    notice_seq: u64,
}

impl Inner {
    fn notices(&mut self) -> Notices {
        self.notice_seq += 1;
        Notices {
            seq: self.notice_seq,
            ..Notices::default()
        }
    }
}

/// Host callbacks collected under the lock.
#[derive(Default)]
struct Notices {
    seq: u64,
    input_enabled: Option<bool>,
    clear_input: bool,
    fault: Option<SessionFault>,
}

/// Result of closing the session.
struct Closed {
    alive_id: Option<ShellId>,
    kill: Option<JoinHandle<()>>,
}

struct Shared<T> {
    instance: Uuid,
    transport: T,
    host: HostSurface,
    inner: Mutex<Inner>,
    /// Sequence number of the last input change handed to the host.
    delivered_seq: Mutex<u64>,
    state_tx: watch::Sender<SessionState>,
}

/// Client side of one remote shell session.
///
/// Dropping the manager tears the session down.
pub struct SessionManager<T>
where
    T: ShellTransport,
{
    shared: Arc<Shared<T>>,
}

impl<T> SessionManager<T>
where
    T: ShellTransport,
{
    /// Create a session manager with default timing.
    #[must_use]
    pub fn new(transport: T, host: HostSurface) -> Self {
        Self::with_config(transport, host, SessionConfig::default())
    }

    /// Create a session manager.
    #[must_use]
    pub fn with_config(transport: T, host: HostSurface, config: SessionConfig) -> Self {
        let (state_tx, _) = watch::channel(SessionState::Uninitialized);
        Self {
            shared: Arc::new(Shared {
                instance: Uuid::new_v4(),
                transport,
                host,
                inner: Mutex::new(Inner {
                    session: Session::new(),
                    prior_id: None,
                    output: OutputChannel::new(config.poll_retry_delay),
                    commands: CommandChannel::new(),
                    requests: PendingRequests::default(),
                    notice_seq: 0,
                }),
                delivered_seq: Mutex::new(0),
                state_tx,
            }),
        }
    }

    /// Identifier of this manager in log output.
    #[must_use]
    pub fn instance_id(&self) -> Uuid {
        self.shared.instance
    }

    /// Restore `prior` if given, otherwise register a new shell.
    ///
    /// # Errors
    /// Returns `AlreadyStarted` if called more than once.
    ///
    /// # Panics
    /// Panics if called outside a tokio runtime.
    pub fn start(&self, prior: Option<ShellId>) -> Result<(), SessionError> {
        let notices = {
            let mut guard = self.shared.lock();
            let inner = &mut *guard;
            let state = inner.session.state();
            if state != SessionState::Uninitialized {
                return Err(SessionError::AlreadyStarted(state));
            }
            // Numbered before the setup request exists, so its completion
            // always supersedes this.
            let mut notices = inner.notices();
            notices.input_enabled = Some(false);

            match prior {
                Some(shell_id) => {
                    tracing::info!(instance = %self.shared.instance, shell_id = %shell_id, "Restoring shell");
                    self.shared.transition(inner, SessionState::Restoring);
                    inner.prior_id = Some(shell_id.clone());
                    self.shared.begin_restore(inner, shell_id);
                }
                None => {
                    tracing::info!(instance = %self.shared.instance, "Registering new shell");
                    self.shared.transition(inner, SessionState::Registering);
                    self.shared.begin_registration(inner);
                }
            }
            notices
        };
        self.shared.notify(notices);
        Ok(())
    }

    /// Send one command line to the shell.
    ///
    /// Input is disabled before the request goes out and re-enabled only
    /// once the server accepts the command.
    ///
    /// # Errors
    /// Returns why the command was refused; nothing is sent in that case.
    pub fn submit(&self, line: impl Into<String>) -> Result<(), SubmitError> {
        self.shared.submit(line.into())
    }

    /// Cancel outstanding requests and ask the server to kill the shell,
    /// unless it is already known to be gone. Idempotent.
    pub fn teardown(&self) {
        self.shared.close(true);
    }

    /// Tear down, then wait up to `timeout` for the kill notification.
    ///
    /// Use this before the runtime shuts down, which would otherwise drop
    /// the notification. Returns `false` if it was still in flight.
    pub async fn shutdown(&self, timeout: Duration) -> bool {
        let Some(kill) = self.shared.close(true).kill else {
            return true;
        };
        if tokio::time::timeout(timeout, kill).await.is_ok() {
            true
        } else {
            tracing::warn!(instance = %self.shared.instance, "Kill notification still pending at shutdown");
            false
        }
    }

    /// Cancel outstanding requests but leave the shell running.
    ///
    /// Returns the id to restore later, if the shell is still alive.
    #[must_use]
    pub fn detach(self) -> Option<ShellId> {
        self.shared.close(false).alive_id
    }

    #[must_use]
    pub fn state(&self) -> SessionState {
        self.shared.lock().session.state()
    }

    /// Watch state changes.
    #[must_use]
    pub fn subscribe_state(&self) -> watch::Receiver<SessionState> {
        self.shared.state_tx.subscribe()
    }

    #[must_use]
    pub fn shell_id(&self) -> Option<ShellId> {
        self.shared.lock().session.id().cloned()
    }

    #[must_use]
    pub fn next_chunk_id(&self) -> u64 {
        self.shared.lock().session.next_chunk_id()
    }

    /// The output buffer; subscribe to it to render output.
    #[must_use]
    pub fn output(&self) -> Arc<OutputBuffer> {
        Arc::clone(self.shared.lock().session.output())
    }

    /// Whether a command can be submitted right now.
    #[must_use]
    pub fn input_enabled(&self) -> bool {
        self.shared.lock().commands.is_open()
    }

    /// Whether the process exited and the remaining output is being read.
    #[must_use]
    pub fn is_draining(&self) -> bool {
        self.shared.lock().output.is_draining()
    }

    /// Which requests are outstanding.
    #[must_use]
    pub fn in_flight(&self) -> InFlight {
        self.shared.lock().requests.in_flight()
    }
}

impl<T> Drop for SessionManager<T>
where
    T: ShellTransport,
{
    fn drop(&mut self) {
        self.shared.close(true);
    }
}

impl<T> Shared<T>
where
    T: ShellTransport,
{
    fn lock(&self) -> MutexGuard<'_, Inner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn notify(&self, notices: Notices) {
        if let Some(enabled) = notices.input_enabled {
            let mut delivered = self
                .delivered_seq
                .lock()
                .unwrap_or_else(PoisonError::into_inner);
            if notices.seq > *delivered {
                *delivered = notices.seq;
                self.host.set_input_enabled(enabled);
                if notices.clear_input {
                    self.host.clear_input();
                }
            } else {
                tracing::debug!(
                    instance = %self.instance,
                    seq = notices.seq,
                    "Dropping superseded input change"
                );
            }
        }
        if let Some(fault) = &notices.fault {
            self.host.report(fault);
        }
    }

    fn transition(&self, inner: &mut Inner, next: SessionState) -> bool {
        match inner.session.transition(next) {
            Ok(previous) => {
                tracing::debug!(
                    instance = %self.instance,
                    from = %previous,
                    to = %next,
                    "Session state changed"
                );
                self.state_tx.send_replace(next);
                true
            }
            Err(err) => {
                tracing::warn!(instance = %self.instance, "{err}");
                false
            }
        }
    }

    // -- setup --

    fn begin_restore(self: &Arc<Self>, inner: &mut Inner, shell_id: ShellId) {
        let shared = Arc::clone(self);
        inner.requests.insert(RequestHandle::spawn(RequestKind::Setup, async move {
            let result = shared.transport.restore(&shell_id).await;
            shared.restore_completed(shell_id, result);
        }));
    }

    fn restore_completed(
        self: &Arc<Self>,
        shell_id: ShellId,
        result: Result<RestoreResponse, TransportError>,
    ) {
        let notices = {
            let mut guard = self.lock();
            let inner = &mut *guard;
            inner.requests.complete(RequestKind::Setup);
            if inner.session.state() != SessionState::Restoring {
                return;
            }
            let mut notices = inner.notices();

            match result {
                Ok(response) if response.success => {
                    inner.prior_id = None;
                    match inner.session.adopt_restored(
                        shell_id.clone(),
                        response.next_chunk_id,
                        response.backlog(),
                    ) {
                        Ok(()) => {
                            tracing::info!(
                                instance = %self.instance,
                                shell_id = %shell_id,
                                next_chunk_id = response.next_chunk_id,
                                "Restored shell"
                            );
                            self.activate(inner, &mut notices);
                        }
                        Err(err) => {
                            tracing::warn!(instance = %self.instance, "{err}");
                            self.fall_back_to_registration(inner);
                        }
                    }
                }
                Ok(_) => {
                    tracing::info!(
                        instance = %self.instance,
                        shell_id = %shell_id,
                        "Shell cannot be restored, registering a new one"
                    );
                    self.fall_back_to_registration(inner);
                }
                Err(err) => {
                    tracing::warn!(
                        instance = %self.instance,
                        shell_id = %shell_id,
                        "Restore failed, registering a new shell: {err}"
                    );
                    self.fall_back_to_registration(inner);
                }
            }
            notices
        };
        self.notify(notices);
    }

    fn fall_back_to_registration(self: &Arc<Self>, inner: &mut Inner) {
        if self.transition(inner, SessionState::Registering) {
            self.begin_registration(inner);
        }
    }

    fn begin_registration(self: &Arc<Self>, inner: &mut Inner) {
        let shared = Arc::clone(self);
        inner.requests.insert(RequestHandle::spawn(RequestKind::Setup, async move {
            let result = shared.transport.create().await;
            shared.registration_completed(result);
        }));
    }

    fn registration_completed(self: &Arc<Self>, result: Result<CreateResponse, TransportError>) {
        let notices = {
            let mut guard = self.lock();
            let inner = &mut *guard;
            inner.requests.complete(RequestKind::Setup);
            if inner.session.state() != SessionState::Registering {
                return;
            }
            let mut notices = inner.notices();

            let outcome = match result {
                Ok(response) => response.into_shell_id(),
                Err(err) => Err(SessionFault::ServerUnreachable {
                    detail: err.to_string(),
                }),
            };

            let adopted = outcome.and_then(|shell_id| match inner.session.adopt_fresh(shell_id) {
                Ok(()) => Ok(()),
                Err(err) => {
                    tracing::warn!(instance = %self.instance, "{err}");
                    Err(SessionFault::UnexpectedResponse {
                        endpoint: "/shell/create",
                    })
                }
            });

            match adopted {
                Ok(()) => {
                    inner.prior_id = None;
                    tracing::info!(
                        instance = %self.instance,
                        shell_id = ?inner.session.id(),
                        "Registered shell"
                    );
                    self.activate(inner, &mut notices);
                }
                Err(fault) => {
                    tracing::warn!(instance = %self.instance, "Shell registration failed: {fault}");
                    self.terminate(inner, SessionState::Failed, Some(fault), &mut notices);
                }
            }
            notices
        };
        self.notify(notices);
    }

    fn activate(self: &Arc<Self>, inner: &mut Inner, notices: &mut Notices) {
        if !self.transition(inner, SessionState::Active) {
            return;
        }
        inner.commands.open();
        notices.input_enabled = Some(true);
        self.schedule_poll(inner, Duration::ZERO);
    }

    /// Enter a terminal state: close input and stop every loop.
    fn terminate(
        &self,
        inner: &mut Inner,
        next: SessionState,
        fault: Option<SessionFault>,
        notices: &mut Notices,
    ) {
        self.transition(inner, next);
        if matches!(next, SessionState::Exited | SessionState::Killed) {
            inner.session.mark_killed_locally();
        }
        inner.commands.close();
        inner.requests.cancel(RequestKind::OutputPoll);
        inner.requests.cancel(RequestKind::Command);
        notices.input_enabled = Some(false);
        notices.fault = fault;
    }

    // -- output --

    fn schedule_poll(self: &Arc<Self>, inner: &mut Inner, delay: Duration) {
        let Some(shell_id) = inner.session.id().cloned() else {
            tracing::warn!(instance = %self.instance, "No shell id, not polling");
            return;
        };
        let next_chunk_id = inner.session.next_chunk_id();
        let shared = Arc::clone(self);
        inner.requests.insert(RequestHandle::spawn(RequestKind::OutputPoll, async move {
            if !delay.is_zero() {
                tokio::time::sleep(delay).await;
            }
            tracing::trace!(shell_id = %shell_id, next_chunk_id, "Polling for output");
            let result = shared
                .transport
                .retrieve_output(&shell_id, next_chunk_id)
                .await;
            shared.output_received(result);
        }));
    }

    fn output_received(self: &Arc<Self>, result: Result<OutputResponse, TransportError>) {
        let notices = {
            let mut guard = self.lock();
            let inner = &mut *guard;
            inner.requests.complete(RequestKind::OutputPoll);
            if inner.session.state() != SessionState::Active {
                tracing::debug!(
                    instance = %self.instance,
                    state = %inner.session.state(),
                    "Dropping output response for inactive session"
                );
                return;
            }
            let mut notices = inner.notices();

            let directive = match &result {
                Ok(response) => inner.output.handle_response(&mut inner.session, response),
                Err(err) => inner.output.handle_failure(err),
            };

            match directive {
                PollDirective::Rearm { delay } => self.schedule_poll(inner, delay),
                PollDirective::Drain => {
                    tracing::info!(instance = %self.instance, "Shell exited, reading remaining output");
                    inner.commands.close();
                    inner.session.mark_killed_locally();
                    notices.input_enabled = Some(false);
                    self.schedule_poll(inner, Duration::ZERO);
                }
                PollDirective::Exited => {
                    tracing::info!(
                        instance = %self.instance,
                        next_chunk_id = inner.session.next_chunk_id(),
                        "Shell exited"
                    );
                    self.terminate(inner, SessionState::Exited, None, &mut notices);
                }
                PollDirective::Terminate(fault) => {
                    let next = if fault.ends_shell() {
                        SessionState::Killed
                    } else {
                        SessionState::Failed
                    };
                    tracing::warn!(instance = %self.instance, "Output channel closed: {fault}");
                    self.terminate(inner, next, Some(fault), &mut notices);
                }
            }
            notices
        };
        self.notify(notices);
    }

    // -- commands --

    fn submit(self: &Arc<Self>, line: String) -> Result<(), SubmitError> {
        let notices = {
            let mut guard = self.lock();
            let state = guard.session.state();
            guard.commands.begin(state)?;
            let mut notices = guard.notices();
            notices.input_enabled = Some(false);
            notices
        };
        self.notify(notices);

        let mut guard = self.lock();
        let inner = &mut *guard;
        let state = inner.session.state();
        // Teardown or exit may have happened while the host was notified.
        let shell_id = match inner.session.id().cloned() {
            Some(shell_id) if state == SessionState::Active && inner.commands.is_pending() => {
                shell_id
            }
            _ => {
                inner.commands.close();
                return Err(SubmitError::NotActive(state));
            }
        };

        tracing::debug!(instance = %self.instance, bytes = line.len(), "Sending command");
        let shared = Arc::clone(self);
        inner.requests.insert(RequestHandle::spawn(RequestKind::Command, async move {
            let result = shared.transport.process_command(&shell_id, &line).await;
            shared.command_processed(result);
        }));
        Ok(())
    }

    fn command_processed(self: &Arc<Self>, result: Result<CommandResponse, TransportError>) {
        let notices = {
            let mut guard = self.lock();
            let inner = &mut *guard;
            inner.requests.complete(RequestKind::Command);
            if inner.session.state() != SessionState::Active {
                return;
            }
            let mut notices = inner.notices();

            match inner.commands.finish(result) {
                Ok(()) => {
                    let reopened = inner.commands.is_open();
                    notices.input_enabled = Some(reopened);
                    notices.clear_input = reopened;
                }
                Err(fault) if fault.ends_shell() => {
                    tracing::warn!(instance = %self.instance, "Command rejected: {fault}");
                    self.terminate(inner, SessionState::Killed, Some(fault), &mut notices);
                }
                Err(fault) => {
                    tracing::warn!(instance = %self.instance, "Command rejected: {fault}");
                    notices.fault = Some(fault);
                }
            }
            notices
        };
        self.notify(notices);
    }

    // -- teardown --

    /// Reports the shell id if the shell is still believed alive, and the
    /// kill notification task if one was sent.
    fn close(self: &Arc<Self>, notify_server: bool) -> Closed {
        let (notices, alive_id, kill_id) = {
            let mut guard = self.lock();
            let inner = &mut *guard;
            let state = inner.session.state();
            if state == SessionState::Closed {
                return Closed {
                    alive_id: None,
                    kill: None,
                };
            }

            let cancelled = inner.requests.cancel_all();
            inner.commands.close();
            let (alive_id, kill_id) = if inner.session.killed_locally() {
                (None, None)
            } else {
                // Until a shell is adopted, the one we were asked to
                // reattach to is still ours.
                let adopted = inner.session.id().cloned();
                let target = adopted.clone().or_else(|| inner.prior_id.clone());
                let alive_id = if adopted.is_some() || state == SessionState::Restoring {
                    target.clone()
                } else {
                    None
                };
                (alive_id, target.filter(|_| notify_server))
            };
            self.transition(inner, SessionState::Closed);
            tracing::debug!(
                instance = %self.instance,
                cancelled,
                notify_server,
                "Session closed"
            );
            let mut notices = inner.notices();
            notices.input_enabled = Some(false);
            (notices, alive_id, kill_id)
        };

        self.notify(notices);
        Closed {
            alive_id,
            kill: kill_id.and_then(|shell_id| self.send_kill(shell_id)),
        }
    }

    fn send_kill(self: &Arc<Self>, shell_id: ShellId) -> Option<JoinHandle<()>> {
        let Ok(runtime) = tokio::runtime::Handle::try_current() else {
            tracing::warn!(
                instance = %self.instance,
                shell_id = %shell_id,
                "No async runtime, skipping kill notification"
            );
            return None;
        };

        tracing::debug!(instance = %self.instance, shell_id = %shell_id, "Sending kill notification");
        let shared = Arc::clone(self);
        Some(runtime.spawn(async move {
            if let Err(err) = shared.transport.kill(&shell_id).await {
                tracing::debug!(shell_id = %shell_id, "Kill notification failed: {err}");
            }
        }))
    }
}
