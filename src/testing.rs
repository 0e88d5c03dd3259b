//! In-memory broker doubles shared by the unit tests.

use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;
use tokio::sync::Barrier;

use crate::broker::{BrokerConnection, ConnectionFactory, Worker};
use crate::error::ConnectionError;
use crate::lifecycle::ProcessingStep;
use crate::types::AmqpConfig;

/// A configuration that passes validation.
pub fn valid_config() -> AmqpConfig {
    AmqpConfig::with_credentials("localhost", "guest", "guest")
}

#[derive(Default)]
struct JournalState {
    connects: usize,
    connection_closes: HashMap<usize, usize>,
    worker_closes: HashMap<usize, usize>,
}

/// Records what the doubles were asked to do.
#[derive(Clone, Default)]
pub struct Journal {
    state: Arc<Mutex<JournalState>>,
}

impl Journal {
    pub fn connects(&self) -> usize {
        self.state.lock().connects
    }

    pub fn connection_closes(&self, id: usize) -> usize {
        self.state.lock().connection_closes.get(&id).copied().unwrap_or(0)
    }

    pub fn worker_closes(&self, id: usize) -> usize {
        self.state.lock().worker_closes.get(&id).copied().unwrap_or(0)
    }

    /// Wait until connection `id` has been closed by a background task.
    pub async fn wait_for_connection_close(&self, id: usize) {
        tokio::time::timeout(Duration::from_secs(1), async {
            while self.connection_closes(id) == 0 {
                tokio::task::yield_now().await;
            }
        })
        .await
        .expect("connection was never closed");
    }
}

pub struct FakeConnection {
    id: usize,
    journal: Journal,
    fail_close: bool,
}

impl FakeConnection {
    pub fn new(id: usize, journal: Journal) -> Self {
        Self {
            id,
            journal,
            fail_close: false,
        }
    }

    pub fn failing_close(mut self) -> Self {
        self.fail_close = true;
        self
    }

    pub fn id(&self) -> usize {
        self.id
    }
}

#[async_trait]
impl BrokerConnection for FakeConnection {
    async fn close(&self) -> anyhow::Result<()> {
        *self
            .journal
            .state
            .lock()
            .connection_closes
            .entry(self.id)
            .or_default() += 1;

        if self.fail_close {
            anyhow::bail!("connection {} reset by peer", self.id);
        }
        Ok(())
    }
}

pub struct FakeWorker {
    id: usize,
    journal: Journal,
    fail_close: bool,
    uses: usize,
}

impl FakeWorker {
    pub fn new(id: usize, journal: Journal) -> Self {
        Self {
            id,
            journal,
            fail_close: false,
            uses: 0,
        }
    }

    pub fn failing_close(mut self) -> Self {
        self.fail_close = true;
        self
    }

    pub fn id(&self) -> usize {
        self.id
    }

    pub fn uses(&self) -> usize {
        self.uses
    }
}

#[async_trait]
impl Worker for FakeWorker {
    async fn close(&self) -> anyhow::Result<()> {
        *self
            .journal
            .state
            .lock()
            .worker_closes
            .entry(self.id)
            .or_default() += 1;

        if self.fail_close {
            anyhow::bail!("channel {} already closed", self.id);
        }
        Ok(())
    }
}

/// Hands out connections numbered from 1.
pub struct FakeFactory {
    journal: Journal,
    next_id: AtomicUsize,
    failing_close: HashSet<usize>,
    fail_connect: AtomicBool,
    barrier: Option<Arc<Barrier>>,
}

impl FakeFactory {
    pub fn new(journal: Journal) -> Self {
        Self {
            journal,
            next_id: AtomicUsize::new(1),
            failing_close: HashSet::new(),
            fail_connect: AtomicBool::new(false),
            barrier: None,
        }
    }

    /// Connections with these ids fail to close.
    pub fn with_failing_close(mut self, ids: impl IntoIterator<Item = usize>) -> Self {
        self.failing_close.extend(ids);
        self
    }

    /// Hold every connection attempt until `callers` attempts are in flight.
    pub fn with_barrier(mut self, callers: usize) -> Self {
        self.barrier = Some(Arc::new(Barrier::new(callers)));
        self
    }

    pub fn set_fail_connect(&self, fail: bool) {
        self.fail_connect.store(fail, Ordering::SeqCst);
    }
}

#[async_trait]
impl ConnectionFactory for FakeFactory {
    type Connection = FakeConnection;

    async fn create_connection(
        &self,
        config: &AmqpConfig,
    ) -> Result<FakeConnection, ConnectionError> {
        if self.fail_connect.load(Ordering::SeqCst) {
            return Err(ConnectionError::Establish {
                target: config.target(),
                source: anyhow::anyhow!("connection refused"),
            });
        }

        let id = self.next_id.fetch_add(1, Ordering::SeqCst);
        self.journal.state.lock().connects += 1;

        if let Some(barrier) = &self.barrier {
            barrier.wait().await;
        }

        let connection = FakeConnection::new(id, self.journal.clone());
        if self.failing_close.contains(&id) {
            Ok(connection.failing_close())
        } else {
            Ok(connection)
        }
    }
}

/// What the scripted step should do with the resource it is given.
#[derive(Debug, Clone, Copy)]
pub enum Outcome {
    Succeed,
    Fail(&'static str),
    /// Never finish, as when the broker stops answering.
    Hang,
}

/// Processing step whose result is chosen by the caller.
///
/// Returns the ids of the connection and worker it ran on.
pub struct ScriptedStep {
    journal: Journal,
    fail_worker_creation: AtomicBool,
}

impl ScriptedStep {
    pub fn new(journal: Journal) -> Self {
        Self {
            journal,
            fail_worker_creation: AtomicBool::new(false),
        }
    }

    pub fn set_fail_worker_creation(&self, fail: bool) {
        self.fail_worker_creation.store(fail, Ordering::SeqCst);
    }
}

#[async_trait]
impl ProcessingStep<FakeConnection> for ScriptedStep {
    type Worker = FakeWorker;
    type Input = Outcome;
    type Output = (usize, usize);

    fn name(&self) -> &'static str {
        "scripted"
    }

    async fn create_worker(&self, connection: &FakeConnection) -> anyhow::Result<FakeWorker> {
        if self.fail_worker_creation.load(Ordering::SeqCst) {
            anyhow::bail!("channel limit reached");
        }
        Ok(FakeWorker::new(connection.id(), self.journal.clone()))
    }

    async fn process(
        &self,
        connection: &FakeConnection,
        worker: &mut FakeWorker,
        input: Outcome,
    ) -> anyhow::Result<(usize, usize)> {
        worker.uses += 1;
        match input {
            Outcome::Succeed => Ok((connection.id(), worker.id())),
            Outcome::Fail(reason) => Err(anyhow::anyhow!("{reason}")),
            Outcome::Hang => std::future::pending().await,
        }
    }
}
