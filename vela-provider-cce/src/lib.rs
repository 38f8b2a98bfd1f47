//! Vela provider for CCE, a managed Kubernetes service
//!
//! Four resource types: `cce_cluster`, `cce_node`, `cce_node_pool` and
//! `cce_addon`. Child resources are identified by the composite form
//! `<cluster-id>/<id>`; mutations on children are gated on the parent
//! cluster being `Available`.

pub mod api;
mod attrs;
pub mod client;
pub mod coerce;
pub mod config;
pub mod schemas;
pub mod validation;
pub mod wait;

mod addon;
mod cluster;
mod gate;
mod job;
mod node;
mod node_pool;

use vela_core::provider::{
    BoxFuture, OperationTimeouts, Provider, ProviderError, ProviderResult, ResourceType,
};
use vela_core::resource::{Resource, ResourceId, State};
use vela_core::schema::ResourceSchema;

use crate::addon::AddonController;
use crate::client::ClientFactory;
use crate::cluster::ClusterController;
use crate::config::CloudConfig;
use crate::node::NodeController;
use crate::node_pool::NodePoolController;

/// Attach context to an error from a lower layer
pub(crate) fn wrap(
    action: &str,
    cause: impl std::error::Error + Send + Sync + 'static,
) -> ProviderError {
    ProviderError::new(format!("{} failed", action)).with_cause(cause)
}

// ===== Resource types =====

struct CceResourceType {
    name: &'static str,
    schema: fn() -> ResourceSchema,
}

impl ResourceType for CceResourceType {
    fn name(&self) -> &'static str {
        self.name
    }

    fn schema(&self) -> ResourceSchema {
        (self.schema)()
    }
}

// ===== Provider =====

pub struct CceProvider {
    factory: ClientFactory,
    timeouts: OperationTimeouts,
}

impl CceProvider {
    pub fn new(config: CloudConfig) -> Self {
        Self {
            factory: ClientFactory::new(config),
            timeouts: OperationTimeouts::default(),
        }
    }

    fn clusters(&self) -> ClusterController<'_> {
        ClusterController::new(&self.factory, self.timeouts)
    }

    fn nodes(&self) -> NodeController<'_> {
        NodeController::new(&self.factory, self.timeouts)
    }

    fn node_pools(&self) -> NodePoolController<'_> {
        NodePoolController::new(&self.factory, self.timeouts)
    }

    fn addons(&self) -> AddonController<'_> {
        AddonController::new(&self.factory, self.timeouts)
    }
}

/// Split a child identifier of the form `<cluster-id>/<id>`
fn split_composite(identifier: &str) -> ProviderResult<(&str, &str)> {
    match identifier.split_once('/') {
        Some((cluster_id, id)) if !cluster_id.is_empty() && !id.is_empty() => Ok((cluster_id, id)),
        _ => Err(ProviderError::new(format!(
            "identifier {:?} is not of the form <cluster-id>/<id>",
            identifier
        ))),
    }
}

/// Run the attribute validators and fold their findings into one error
fn checked(resource: &Resource) -> ProviderResult<()> {
    validation::validate_resource(&resource.id.resource_type, &resource.attributes).map_err(
        |errors| {
            let findings: Vec<String> = errors.iter().map(|e| e.to_string()).collect();
            ProviderError::new(findings.join("; ")).for_resource(resource.id.clone())
        },
    )
}

impl Provider for CceProvider {
    fn name(&self) -> &'static str {
        "cce"
    }

    fn resource_types(&self) -> Vec<Box<dyn ResourceType>> {
        vec![
            Box::new(CceResourceType {
                name: "cce_cluster",
                schema: schemas::cluster_schema,
            }),
            Box::new(CceResourceType {
                name: "cce_node",
                schema: schemas::node_schema,
            }),
            Box::new(CceResourceType {
                name: "cce_node_pool",
                schema: schemas::node_pool_schema,
            }),
            Box::new(CceResourceType {
                name: "cce_addon",
                schema: schemas::addon_schema,
            }),
        ]
    }

    fn read(
        &self,
        id: &ResourceId,
        identifier: Option<&str>,
    ) -> BoxFuture<'_, ProviderResult<State>> {
        let id = id.clone();
        let identifier = identifier.map(|s| s.to_string());
        Box::pin(async move {
            let Some(identifier) = identifier else {
                return Ok(State::not_found(id));
            };
            let result = match id.resource_type.as_str() {
                "cce_cluster" => self.clusters().read(&id, &identifier).await,
                "cce_node" => {
                    let (cluster_id, node_id) = split_composite(&identifier)?;
                    self.nodes().read(&id, cluster_id, node_id).await
                }
                "cce_node_pool" => {
                    let (cluster_id, pool_id) = split_composite(&identifier)?;
                    self.node_pools().read(&id, cluster_id, pool_id).await
                }
                "cce_addon" => {
                    let (cluster_id, addon_id) = split_composite(&identifier)?;
                    self.addons().read(&id, cluster_id, addon_id).await
                }
                other => Err(ProviderError::new(format!(
                    "unknown resource type {:?}",
                    other
                ))),
            };
            result.map_err(|e| e.for_resource(id))
        })
    }

    fn create(&self, resource: &Resource) -> BoxFuture<'_, ProviderResult<State>> {
        let resource = resource.clone();
        Box::pin(async move {
            checked(&resource)?;
            let result = match resource.id.resource_type.as_str() {
                "cce_cluster" => self.clusters().create(&resource).await,
                "cce_node" => self.nodes().create(&resource).await,
                "cce_node_pool" => self.node_pools().create(&resource).await,
                "cce_addon" => self.addons().create(&resource).await,
                other => Err(ProviderError::new(format!(
                    "unknown resource type {:?}",
                    other
                ))),
            };
            result.map_err(|e| e.for_resource(resource.id.clone()))
        })
    }

    fn update(
        &self,
        id: &ResourceId,
        identifier: &str,
        from: &State,
        to: &Resource,
    ) -> BoxFuture<'_, ProviderResult<State>> {
        let id = id.clone();
        let identifier = identifier.to_string();
        let from = from.clone();
        let to = to.clone();
        Box::pin(async move {
            checked(&to)?;
            let result = match id.resource_type.as_str() {
                "cce_cluster" => self.clusters().update(&id, &identifier, &from, &to).await,
                "cce_node" => {
                    let (cluster_id, node_id) = split_composite(&identifier)?;
                    self.nodes().update(&id, cluster_id, node_id, &from, &to).await
                }
                "cce_node_pool" => {
                    let (cluster_id, pool_id) = split_composite(&identifier)?;
                    self.node_pools().update(&id, cluster_id, pool_id, &to).await
                }
                "cce_addon" => self.addons().update(&id).await,
                other => Err(ProviderError::new(format!(
                    "unknown resource type {:?}",
                    other
                ))),
            };
            result.map_err(|e| e.for_resource(id))
        })
    }

    fn delete(&self, id: &ResourceId, identifier: &str) -> BoxFuture<'_, ProviderResult<()>> {
        let id = id.clone();
        let identifier = identifier.to_string();
        Box::pin(async move {
            let result = match id.resource_type.as_str() {
                "cce_cluster" => self.clusters().delete(&identifier).await,
                "cce_node" => {
                    let (cluster_id, node_id) = split_composite(&identifier)?;
                    self.nodes().delete(cluster_id, node_id).await
                }
                "cce_node_pool" => {
                    let (cluster_id, pool_id) = split_composite(&identifier)?;
                    self.node_pools().delete(cluster_id, pool_id).await
                }
                "cce_addon" => {
                    let (cluster_id, addon_id) = split_composite(&identifier)?;
                    self.addons().delete(cluster_id, addon_id).await
                }
                other => Err(ProviderError::new(format!(
                    "unknown resource type {:?}",
                    other
                ))),
            };
            result.map_err(|e| e.for_resource(id))
        })
    }

    fn plan_check(&self, resource: &Resource) -> BoxFuture<'_, ProviderResult<()>> {
        let resource = resource.clone();
        Box::pin(async move {
            checked(&resource)?;
            if resource.id.resource_type == "cce_cluster" {
                self.clusters()
                    .plan_check(&resource)
                    .await
                    .map_err(|e| e.for_resource(resource.id.clone()))?;
            }
            Ok(())
        })
    }
}
