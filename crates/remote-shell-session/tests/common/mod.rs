//! Scripted transport and recording host shared by the session tests.

#![allow(dead_code)]

use std::{
    collections::VecDeque,
    sync::{
        Arc, Mutex,
        atomic::{AtomicBool, AtomicUsize, Ordering},
    },
    time::Duration,
};

use async_trait::async_trait;
use remote_shell_core::{ErrorSignal, HostSurface, InputGate, SessionFault, SessionState, ShellId};
use remote_shell_session::{SessionConfig, SessionManager};
use remote_shell_transport::{
    CommandResponse, CreateResponse, OutputResponse, RestoreResponse, ShellTransport,
    TransportError,
};
use tokio::sync::watch;

/// A request the transport saw, in order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Call {
    Create,
    Restore(String),
    RetrieveOutput(String, u64),
    ProcessCommand(String, String),
    Kill(String),
}

/// Tracks how many requests of one kind are outstanding at once.
#[derive(Debug, Default)]
pub struct Concurrency {
    current: AtomicUsize,
    max: AtomicUsize,
}

impl Concurrency {
    fn enter(&self) -> ConcurrencyGuard<'_> {
        let now = self.current.fetch_add(1, Ordering::SeqCst) + 1;
        self.max.fetch_max(now, Ordering::SeqCst);
        ConcurrencyGuard(self)
    }

    pub fn max(&self) -> usize {
        self.max.load(Ordering::SeqCst)
    }
}

// Dropped on completion or when the request task is aborted.
struct ConcurrencyGuard<'a>(&'a Concurrency);

impl Drop for ConcurrencyGuard<'_> {
    fn drop(&mut self) {
        self.0.current.fetch_sub(1, Ordering::SeqCst);
    }
}

type Script<R> = Mutex<VecDeque<Result<R, TransportError>>>;

/// Answers each endpoint from a queue. When a queue runs dry the request
/// stays open forever, like an idle long poll.
#[derive(Default)]
pub struct ScriptedTransport {
    creates: Script<CreateResponse>,
    restores: Script<RestoreResponse>,
    outputs: Script<OutputResponse>,
    commands: Script<CommandResponse>,
    calls: Mutex<Vec<Call>>,
    hang_kills: AtomicBool,
    pub setup_concurrency: Concurrency,
    pub poll_concurrency: Concurrency,
    pub command_concurrency: Concurrency,
}

async fn next_or_hang<R>(script: &Script<R>) -> Result<R, TransportError> {
    let next = script.lock().unwrap().pop_front();
    match next {
        Some(result) => result,
        None => futures::future::pending().await,
    }
}

impl ScriptedTransport {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn push_create(&self, result: Result<CreateResponse, TransportError>) -> &Self {
        self.creates.lock().unwrap().push_back(result);
        self
    }

    pub fn push_restore(&self, result: Result<RestoreResponse, TransportError>) -> &Self {
        self.restores.lock().unwrap().push_back(result);
        self
    }

    pub fn push_output(&self, result: Result<OutputResponse, TransportError>) -> &Self {
        self.outputs.lock().unwrap().push_back(result);
        self
    }

    pub fn push_command(&self, result: Result<CommandResponse, TransportError>) -> &Self {
        self.commands.lock().unwrap().push_back(result);
        self
    }

    /// Record kill requests but never answer them.
    pub fn hang_kills(&self) -> &Self {
        self.hang_kills.store(true, Ordering::SeqCst);
        self
    }

    pub fn calls(&self) -> Vec<Call> {
        self.calls.lock().unwrap().clone()
    }

    pub fn count(&self, matches: impl Fn(&Call) -> bool) -> usize {
        self.calls.lock().unwrap().iter().filter(|c| matches(c)).count()
    }

    pub fn kills(&self) -> usize {
        self.count(|c| matches!(c, Call::Kill(_)))
    }

    pub fn polls(&self) -> Vec<u64> {
        self.calls
            .lock()
            .unwrap()
            .iter()
            .filter_map(|c| match c {
                Call::RetrieveOutput(_, next) => Some(*next),
                _ => None,
            })
            .collect()
    }

    fn record(&self, call: Call) {
        self.calls.lock().unwrap().push(call);
    }
}

#[async_trait]
impl ShellTransport for ScriptedTransport {
    async fn create(&self) -> Result<CreateResponse, TransportError> {
        self.record(Call::Create);
        let _guard = self.setup_concurrency.enter();
        next_or_hang(&self.creates).await
    }

    async fn restore(&self, shell_id: &ShellId) -> Result<RestoreResponse, TransportError> {
        self.record(Call::Restore(shell_id.to_string()));
        let _guard = self.setup_concurrency.enter();
        next_or_hang(&self.restores).await
    }

    async fn retrieve_output(
        &self,
        shell_id: &ShellId,
        next_chunk_id: u64,
    ) -> Result<OutputResponse, TransportError> {
        self.record(Call::RetrieveOutput(shell_id.to_string(), next_chunk_id));
        let _guard = self.poll_concurrency.enter();
        next_or_hang(&self.outputs).await
    }

    async fn process_command(
        &self,
        shell_id: &ShellId,
        line: &str,
    ) -> Result<CommandResponse, TransportError> {
        self.record(Call::ProcessCommand(shell_id.to_string(), line.to_owned()));
        let _guard = self.command_concurrency.enter();
        next_or_hang(&self.commands).await
    }

    async fn kill(&self, shell_id: &ShellId) -> Result<(), TransportError> {
        self.record(Call::Kill(shell_id.to_string()));
        if self.hang_kills.load(Ordering::SeqCst) {
            futures::future::pending::<()>().await;
        }
        Ok(())
    }
}

/// Records every host callback.
#[derive(Default)]
pub struct RecordingHost {
    input: Mutex<Vec<bool>>,
    clears: AtomicUsize,
    faults: Mutex<Vec<SessionFault>>,
}

impl RecordingHost {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn surface(self: &Arc<Self>) -> HostSurface {
        HostSurface::attach(self.clone(), self.clone())
    }

    /// Last input state the host was told about.
    pub fn input_enabled(&self) -> Option<bool> {
        self.input.lock().unwrap().last().copied()
    }

    pub fn input_history(&self) -> Vec<bool> {
        self.input.lock().unwrap().clone()
    }

    pub fn clears(&self) -> usize {
        self.clears.load(Ordering::SeqCst)
    }

    pub fn faults(&self) -> Vec<SessionFault> {
        self.faults.lock().unwrap().clone()
    }
}

impl InputGate for RecordingHost {
    fn set_enabled(&self, enabled: bool) {
        self.input.lock().unwrap().push(enabled);
    }

    fn clear(&self) {
        self.clears.fetch_add(1, Ordering::SeqCst);
    }
}

impl ErrorSignal for RecordingHost {
    fn report(&self, fault: &SessionFault) {
        self.faults.lock().unwrap().push(fault.clone());
    }
}

pub fn manager(
    transport: &Arc<ScriptedTransport>,
    host: &Arc<RecordingHost>,
) -> SessionManager<Arc<ScriptedTransport>> {
    SessionManager::with_config(
        Arc::clone(transport),
        host.surface(),
        SessionConfig::default().with_poll_retry_delay(Duration::ZERO),
    )
}

/// Let spawned request tasks run until nothing is left to do.
pub async fn settle() {
    for _ in 0..100 {
        tokio::task::yield_now().await;
    }
}

/// Poll `condition` until it holds; panics after five seconds.
pub async fn wait_until(mut condition: impl FnMut() -> bool) {
    tokio::time::timeout(Duration::from_secs(5), async {
        while !condition() {
            tokio::time::sleep(Duration::from_millis(1)).await;
        }
    })
    .await
    .expect("condition not reached in time");
}

pub async fn wait_for_state(rx: &mut watch::Receiver<SessionState>, target: SessionState) {
    tokio::time::timeout(Duration::from_secs(5), rx.wait_for(|state| *state == target))
        .await
        .unwrap_or_else(|_| panic!("timed out waiting for {target}"))
        .unwrap();
}

pub fn created(id: &str) -> Result<CreateResponse, TransportError> {
    Ok(CreateResponse {
        success: true,
        shell_id: Some(ShellId::new(id)),
        ..CreateResponse::default()
    })
}

pub fn chunk(output: &str, next_chunk_id: u64) -> Result<OutputResponse, TransportError> {
    Ok(OutputResponse {
        alive: true,
        output: Some(output.to_owned()),
        next_chunk_id: Some(next_chunk_id),
        ..OutputResponse::default()
    })
}

pub fn heartbeat() -> Result<OutputResponse, TransportError> {
    Ok(OutputResponse {
        periodic_response: true,
        ..OutputResponse::default()
    })
}

pub fn accepted() -> Result<CommandResponse, TransportError> {
    Ok(CommandResponse {
        success: true,
        ..CommandResponse::default()
    })
}

pub fn unreachable() -> TransportError {
    TransportError::Unavailable("connection refused".into())
}
