//! The pooled unit of ownership: a connection and the worker bound to it.

use tracing::warn;

use crate::broker::{BrokerConnection, Worker};
use crate::error::{CloseError, ResourceId};

/// A connection paired with its worker, closed as a unit.
pub struct Resource<C, W> {
    id: ResourceId,
    connection: C,
    worker: W,
}

impl<C, W> Resource<C, W>
where
    C: BrokerConnection,
    W: Worker,
{
    pub fn new(connection: C, worker: W) -> Self {
        Self {
            id: ResourceId::new(),
            connection,
            worker,
        }
    }

    pub fn id(&self) -> ResourceId {
        self.id
    }

    pub fn connection(&self) -> &C {
        &self.connection
    }

    pub fn worker(&self) -> &W {
        &self.worker
    }

    /// Borrow the connection and exclusively borrow the worker.
    pub fn parts_mut(&mut self) -> (&C, &mut W) {
        (&self.connection, &mut self.worker)
    }

    /// Close the worker, then the connection.
    ///
    /// The connection is closed even when the worker fails to close; the
    /// first failure is returned and any later one is logged.
    pub async fn close(self) -> Result<(), CloseError> {
        let id = self.id;

        let worker_result = self
            .worker
            .close()
            .await
            .map_err(|source| CloseError::Worker {
                resource_id: id,
                source,
            });

        let connection_result =
            self.connection
                .close()
                .await
                .map_err(|source| CloseError::Connection {
                    resource_id: id,
                    source,
                });

        match (worker_result, connection_result) {
            (Err(first), Err(second)) => {
                warn!(resource_id = %id, error = %second, "Connection close also failed");
                Err(first)
            }
            (Err(e), Ok(())) | (Ok(()), Err(e)) => Err(e),
            (Ok(()), Ok(())) => Ok(()),
        }
    }
}

/// A resource held by an in-flight trigger.
///
/// If the trigger is dropped before [`CloseOnCancel::disarm`] is called, the
/// resource is closed on the current runtime in the background. A dropped
/// broker connection is not closed by the client library.
pub(crate) struct CloseOnCancel<C: BrokerConnection, W: Worker> {
    resource: Option<Resource<C, W>>,
}

impl<C: BrokerConnection, W: Worker> CloseOnCancel<C, W> {
    pub(crate) fn new(resource: Resource<C, W>) -> Self {
        Self {
            resource: Some(resource),
        }
    }

    pub(crate) fn parts_mut(&mut self) -> Option<(&C, &mut W)> {
        self.resource.as_mut().map(Resource::parts_mut)
    }

    /// Take the resource back; dropping the guard afterwards does nothing.
    pub(crate) fn disarm(mut self) -> Option<Resource<C, W>> {
        self.resource.take()
    }
}

impl<C: BrokerConnection, W: Worker> Drop for CloseOnCancel<C, W> {
    fn drop(&mut self) {
        let Some(resource) = self.resource.take() else {
            return;
        };

        let resource_id = resource.id();
        warn!(resource_id = %resource_id, "Trigger cancelled, closing checked-out resource");

        match tokio::runtime::Handle::try_current() {
            Ok(handle) => {
                handle.spawn(async move {
                    if let Err(e) = resource.close().await {
                        warn!(resource_id = %resource_id, error = %e, "Failed to close AMQP resource");
                    }
                });
            }
            Err(_) => {
                warn!(resource_id = %resource_id, "No runtime left, resource dropped without close");
            }
        }
    }
}
