//! Service instance lifecycle.
//!
//! Provisioning is idempotent on the instance id: a repeated create reports
//! that the instance already existed and leaves the stored record alone,
//! without comparing the requested plan or parameters. Deprovisioning is
//! strict: an unknown id is an error every time.

use std::sync::Arc;

use credbroker_storage::StorageBackend;
use tracing::{debug, info};

use crate::error::InstanceError;
use crate::locks::KeyedLocks;
use crate::model::{Parameters, ServiceInstance};
use crate::record::RecordStore;

/// Outcome of [`InstanceService::create_instance`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CreateInstanceResponse {
    pub instance_existed: bool,
}

/// Stored state of one instance.
#[derive(Debug, Clone, PartialEq)]
pub struct GetInstanceResponse {
    pub service_definition_id: String,
    pub plan_id: String,
    pub parameters: Parameters,
}

/// Creates, reads and deletes service instance records.
#[derive(Debug)]
pub struct InstanceService {
    instances: RecordStore<ServiceInstance>,
    locks: KeyedLocks,
}

impl InstanceService {
    #[must_use]
    pub fn new(backend: Arc<dyn StorageBackend>) -> Self {
        Self {
            instances: RecordStore::new(backend),
            locks: KeyedLocks::new(),
        }
    }

    /// Provision an instance, or report that it already exists.
    ///
    /// # Errors
    ///
    /// Returns `InstanceError::Store` if the record store fails.
    pub async fn create_instance(
        &self,
        instance_id: &str,
        service_definition_id: &str,
        plan_id: &str,
        parameters: Parameters,
    ) -> Result<CreateInstanceResponse, InstanceError> {
        let _guard = self.locks.lock(instance_id).await;

        if self.instances.exists(instance_id).await? {
            debug!(instance_id, "service instance already exists");
            return Ok(CreateInstanceResponse {
                instance_existed: true,
            });
        }

        self.instances
            .put(&ServiceInstance {
                instance_id: instance_id.to_owned(),
                service_definition_id: service_definition_id.to_owned(),
                plan_id: plan_id.to_owned(),
                parameters,
            })
            .await?;

        info!(instance_id, service_definition_id, plan_id, "service instance created");
        Ok(CreateInstanceResponse {
            instance_existed: false,
        })
    }

    /// Read a stored instance.
    ///
    /// # Errors
    ///
    /// Returns `InstanceError::NotFound` if no instance has this id, or
    /// `InstanceError::Store` if the record store fails.
    pub async fn get_instance(&self, instance_id: &str) -> Result<GetInstanceResponse, InstanceError> {
        let instance = self
            .instances
            .get(instance_id)
            .await?
            .ok_or_else(|| InstanceError::NotFound {
                instance_id: instance_id.to_owned(),
            })?;

        Ok(GetInstanceResponse {
            service_definition_id: instance.service_definition_id,
            plan_id: instance.plan_id,
            parameters: instance.parameters,
        })
    }

    /// Deprovision an instance.
    ///
    /// # Errors
    ///
    /// Returns `InstanceError::NotFound` if no instance has this id, or
    /// `InstanceError::Store` if the record store fails.
    pub async fn delete_instance(&self, instance_id: &str) -> Result<(), InstanceError> {
        let _guard = self.locks.lock(instance_id).await;

        if !self.instances.exists(instance_id).await? {
            return Err(InstanceError::NotFound {
                instance_id: instance_id.to_owned(),
            });
        }
        self.instances.delete(instance_id).await?;

        info!(instance_id, "service instance deleted");
        Ok(())
    }
}
