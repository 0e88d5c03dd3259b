//! Trigger lifecycle controller.

use tracing::{debug, info, instrument, warn};

use super::{CloseOnCancel, ProcessingStep, Resource, ResourcePool};
use crate::broker::{BrokerConnection, ConnectionFactory};
use crate::error::{CloseError, ConnectionError, InvalidConfiguration, ProcessingError, TriggerError};
use crate::types::AmqpConfig;
use crate::validation;

/// Outcome of [`LifecycleController::shutdown`].
#[derive(Debug, Default)]
pub struct ShutdownSummary {
    /// Resources closed cleanly
    pub closed: usize,
    /// Close failures, one per resource that failed to close
    pub failures: Vec<CloseError>,
}

/// Owns the resource pool of one role and runs its processing step.
pub struct LifecycleController<F, S>
where
    F: ConnectionFactory,
    S: ProcessingStep<F::Connection>,
{
    config: AmqpConfig,
    factory: F,
    step: S,
    pool: ResourcePool<F::Connection, S::Worker>,
}

impl<F, S> LifecycleController<F, S>
where
    F: ConnectionFactory,
    S: ProcessingStep<F::Connection>,
{
    /// Create a controller. The configuration is validated up front and
    /// rejected with every failure found.
    pub fn new(config: AmqpConfig, factory: F, step: S) -> Result<Self, InvalidConfiguration> {
        let failures = validation::validate(&config);
        if !failures.is_empty() {
            return Err(InvalidConfiguration { failures });
        }

        Ok(Self {
            config,
            factory,
            step,
            pool: ResourcePool::new(),
        })
    }

    pub fn config(&self) -> &AmqpConfig {
        &self.config
    }

    pub fn step(&self) -> &S {
        &self.step
    }

    /// Number of idle resources currently pooled.
    pub fn idle_count(&self) -> usize {
        self.pool.idle_count()
    }

    /// Run one trigger invocation: exactly one acquire and one run.
    #[instrument(skip_all, fields(step = self.step.name()))]
    pub async fn on_trigger(&self, input: S::Input) -> Result<S::Output, TriggerError> {
        let resource = self.acquire_or_create().await?;
        Ok(self.run_with_resource(resource, input).await?)
    }

    /// Take an idle resource or build a new one.
    ///
    /// Never waits for another caller. Concurrent misses each build their
    /// own resource.
    pub async fn acquire_or_create(
        &self,
    ) -> Result<Resource<F::Connection, S::Worker>, TriggerError> {
        if self.pool.is_closed() {
            return Err(TriggerError::Shutdown);
        }

        if let Some(resource) = self.pool.checkout() {
            debug!(resource_id = %resource.id(), "Reusing pooled resource");
            return Ok(resource);
        }

        Ok(self.create_resource().await?)
    }

    /// Hand a checked-out resource to the processing step.
    ///
    /// On success the resource is returned to the pool. On failure it is
    /// closed and dropped, and the step's error is returned with any close
    /// failure attached as `suppressed`. If the returned future is dropped
    /// while the step is running, the resource is closed in the background.
    pub async fn run_with_resource(
        &self,
        resource: Resource<F::Connection, S::Worker>,
        input: S::Input,
    ) -> Result<S::Output, ProcessingError> {
        let resource_id = resource.id();
        let mut held = CloseOnCancel::new(resource);

        let outcome = match held.parts_mut() {
            Some((connection, worker)) => self.step.process(connection, worker, input).await,
            None => Err(anyhow::anyhow!("resource {resource_id} released before processing")),
        };

        let Some(resource) = held.disarm() else {
            return outcome.map_err(|cause| ProcessingError {
                resource_id,
                cause,
                suppressed: None,
            });
        };

        match outcome {
            Ok(output) => {
                self.checkin(resource).await;
                Ok(output)
            }
            Err(cause) => {
                warn!(
                    resource_id = %resource_id,
                    error = %cause,
                    "Processing failed, discarding resource"
                );

                let suppressed = resource.close().await.err();
                if let Some(close_error) = &suppressed {
                    warn!(
                        resource_id = %resource_id,
                        error = %close_error,
                        "Failed to close discarded resource"
                    );
                }

                Err(ProcessingError {
                    resource_id,
                    cause,
                    suppressed,
                })
            }
        }
    }

    /// Close every idle resource and refuse further triggers.
    ///
    /// Close failures are logged and collected; they never stop the drain.
    /// Resources checked out at this point are closed when they come back.
    pub async fn shutdown(&self) -> ShutdownSummary {
        self.pool.close();

        let mut summary = ShutdownSummary::default();
        while let Some(resource) = self.pool.checkout() {
            let resource_id = resource.id();
            match resource.close().await {
                Ok(()) => summary.closed += 1,
                Err(e) => {
                    warn!(resource_id = %resource_id, error = %e, "Failed to close AMQP resource");
                    summary.failures.push(e);
                }
            }
        }

        info!(
            step = self.step.name(),
            closed = summary.closed,
            failed = summary.failures.len(),
            "Resource pool drained"
        );

        summary
    }

    async fn create_resource(
        &self,
    ) -> Result<Resource<F::Connection, S::Worker>, ConnectionError> {
        let connection = self.factory.create_connection(&self.config).await?;

        match self.step.create_worker(&connection).await {
            Ok(worker) => {
                let resource = Resource::new(connection, worker);
                info!(
                    resource_id = %resource.id(),
                    step = self.step.name(),
                    "Created resource"
                );
                Ok(resource)
            }
            Err(source) => {
                if let Err(e) = connection.close().await {
                    warn!(error = %e, "Failed to close connection after worker creation failed");
                }
                Err(ConnectionError::Worker {
                    target: self.config.target(),
                    source,
                })
            }
        }
    }

    async fn checkin(&self, resource: Resource<F::Connection, S::Worker>) {
        if let Err(resource) = self.pool.checkin(resource) {
            let resource_id = resource.id();
            debug!(resource_id = %resource_id, "Pool closed, closing returned resource");
            if let Err(e) = resource.close().await {
                warn!(resource_id = %resource_id, error = %e, "Failed to close AMQP resource");
            }
        }
    }
}
