//! Mock database server state.

use std::collections::HashSet;
use std::sync::Arc;
use std::sync::atomic::{AtomicU32, Ordering};
use std::time::Duration;

use dbpool_driver::ConnectionParams;
use parking_lot::Mutex;

use crate::pool::MockDriver;

/// A statement observed by the mock server.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Statement {
    /// Backend pid of the session that sent it.
    pub backend_pid: u32,
    /// Statement text.
    pub sql: String,
}

/// Shared state of one simulated database server.
#[derive(Debug)]
pub struct MockServer {
    state: Mutex<ServerState>,
    next_pid: AtomicU32,
    pools_created: AtomicU32,
    connections_opened: AtomicU32,
    connections_closed: AtomicU32,
}

#[derive(Debug)]
struct ServerState {
    live: HashSet<u32>,
    killed: HashSet<u32>,
    born_dead: bool,
    timezone: String,
    server_version: u32,
    pool_delay: Option<Duration>,
    pool_params: Vec<(ConnectionParams, u32, u32)>,
    statements: Vec<Statement>,
}

impl MockServer {
    /// Start a server reporting `TimeZone = UTC` and version 15.4.
    #[must_use]
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            state: Mutex::new(ServerState {
                live: HashSet::new(),
                killed: HashSet::new(),
                born_dead: false,
                timezone: "UTC".to_string(),
                server_version: 150_004,
                pool_delay: None,
                pool_params: Vec::new(),
                statements: Vec::new(),
            }),
            next_pid: AtomicU32::new(1000),
            pools_created: AtomicU32::new(0),
            connections_opened: AtomicU32::new(0),
            connections_closed: AtomicU32::new(0),
        })
    }

    /// A pool factory connected to this server.
    #[must_use]
    pub fn driver(self: &Arc<Self>) -> MockDriver {
        MockDriver::new(Arc::clone(self))
    }

    /// Terminate one backend, as `pg_terminate_backend` would.
    pub fn kill(&self, backend_pid: u32) {
        let mut state = self.state.lock();
        if state.live.contains(&backend_pid) {
            state.killed.insert(backend_pid);
        }
    }

    /// Terminate every live backend, as a server restart would.
    pub fn kill_all(&self) {
        let mut state = self.state.lock();
        let live: Vec<u32> = state.live.iter().copied().collect();
        state.killed.extend(live);
    }

    /// When set, every newly opened session is already terminated.
    pub fn set_born_dead(&self, born_dead: bool) {
        self.state.lock().born_dead = born_dead;
    }

    /// Timezone reported to new sessions.
    pub fn set_timezone(&self, timezone: impl Into<String>) {
        self.state.lock().timezone = timezone.into();
    }

    /// Version reported to new sessions, in `PG_VERSION_NUM` form.
    pub fn set_server_version(&self, version: u32) {
        self.state.lock().server_version = version;
    }

    /// Delay applied to every pool construction, to widen race windows.
    pub fn set_pool_delay(&self, delay: Duration) {
        self.state.lock().pool_delay = Some(delay);
    }

    /// Number of physical pools constructed so far.
    #[must_use]
    pub fn pools_created(&self) -> u32 {
        self.pools_created.load(Ordering::SeqCst)
    }

    /// Parameters and sizes of every pool constructed so far.
    #[must_use]
    pub fn pool_params(&self) -> Vec<(ConnectionParams, u32, u32)> {
        self.state.lock().pool_params.clone()
    }

    /// Number of sessions opened so far.
    #[must_use]
    pub fn connections_opened(&self) -> u32 {
        self.connections_opened.load(Ordering::SeqCst)
    }

    /// Number of sessions closed so far.
    #[must_use]
    pub fn connections_closed(&self) -> u32 {
        self.connections_closed.load(Ordering::SeqCst)
    }

    /// Number of sessions currently open.
    #[must_use]
    pub fn live_connections(&self) -> usize {
        self.state.lock().live.len()
    }

    /// Every statement received so far, in arrival order.
    #[must_use]
    pub fn statements(&self) -> Vec<Statement> {
        self.state.lock().statements.clone()
    }

    /// Statements received from one backend.
    #[must_use]
    pub fn statements_for(&self, backend_pid: u32) -> Vec<String> {
        self.state
            .lock()
            .statements
            .iter()
            .filter(|s| s.backend_pid == backend_pid)
            .map(|s| s.sql.clone())
            .collect()
    }

    /// Count statements whose text starts with `prefix`.
    #[must_use]
    pub fn count_statements(&self, prefix: &str) -> usize {
        self.state
            .lock()
            .statements
            .iter()
            .filter(|s| s.sql.starts_with(prefix))
            .count()
    }

    pub(crate) fn pool_delay(&self) -> Option<Duration> {
        self.state.lock().pool_delay
    }

    pub(crate) fn record_pool(&self, params: &ConnectionParams, min_size: u32, max_size: u32) {
        self.pools_created.fetch_add(1, Ordering::SeqCst);
        self.state
            .lock()
            .pool_params
            .push((params.clone(), min_size, max_size));
    }

    /// Register a new session; returns its pid, timezone and version.
    pub(crate) fn open_session(&self) -> (u32, String, u32) {
        let pid = self.next_pid.fetch_add(1, Ordering::SeqCst);
        self.connections_opened.fetch_add(1, Ordering::SeqCst);

        let mut state = self.state.lock();
        state.live.insert(pid);
        if state.born_dead {
            state.killed.insert(pid);
        }
        (pid, state.timezone.clone(), state.server_version)
    }

    pub(crate) fn close_session(&self, backend_pid: u32) {
        let mut state = self.state.lock();
        if state.live.remove(&backend_pid) {
            state.killed.remove(&backend_pid);
            self.connections_closed.fetch_add(1, Ordering::SeqCst);
        }
    }

    pub(crate) fn is_killed(&self, backend_pid: u32) -> bool {
        self.state.lock().killed.contains(&backend_pid)
    }

    pub(crate) fn record(&self, backend_pid: u32, sql: &str) {
        self.state.lock().statements.push(Statement {
            backend_pid,
            sql: sql.to_string(),
        });
    }
}
