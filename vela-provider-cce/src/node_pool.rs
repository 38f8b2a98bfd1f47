//! Node-pool controller
//!
//! Pools accept mutations only while the parent cluster is `Available`, and
//! settle through the transient `Synchronizing`/`Synchronized` states into
//! an empty phase. Reads strip the pool-management tag keys the cloud
//! injects and impute the runtime when the server returns its `"null"`
//! sentinel.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use vela_core::provider::{OperationTimeouts, ProviderError, ProviderResult};
use vela_core::resource::{Resource, ResourceId, State, Value};

use crate::api::node::{NodeNicSpec, NodeSpec, PrimaryNic, Runtime};
use crate::api::node_pool::{
    Autoscaling, NodeManagement, NodePool, NodePoolSpec, RUNTIME_NULL_SENTINEL,
};
use crate::api::{self, Metadata};
use crate::attrs::{
    merge_declared, string_map, taints_from_attr, user_tags_from_attr, volume_from_value,
    volume_to_value, volumes_from_attr,
};
use crate::client::ClientFactory;
use crate::config::Service;
use crate::gate;
use crate::node::{build_login, template_extend_params};
use crate::wait::{DELETED, WaitConfig, deleted_on_404, wait_for_phase};
use crate::wrap;

/// Substring marking a k8s tag as pool-management metadata, stripped on read
const POOL_TAG_MARKER: &str = "cce.cloud.com";

pub struct NodePoolController<'a> {
    factory: &'a ClientFactory,
    timeouts: OperationTimeouts,
}

impl<'a> NodePoolController<'a> {
    pub fn new(factory: &'a ClientFactory, timeouts: OperationTimeouts) -> Self {
        Self { factory, timeouts }
    }

    pub async fn create(&self, resource: &Resource) -> ProviderResult<State> {
        let cluster_id = resource
            .attr_str("cluster_id")
            .ok_or_else(|| ProviderError::new("cluster_id is required"))?
            .to_string();
        let request = build_pool_request(resource)?;

        let cce = self.factory.service(Service::CceV3);
        let created = gate::gated_call(
            || self.cluster_ready(&cluster_id),
            || {
                let cce = Arc::clone(&cce);
                let cluster_id = cluster_id.clone();
                let request = request.clone();
                async move { api::node_pool::create(&cce, &cluster_id, &request).await }
            },
        )
        .await
        .map_err(|e| wrap("creating node pool", e))?;

        let pool_id = created
            .metadata
            .uid
            .clone()
            .ok_or_else(|| ProviderError::new("create response carried no pool id"))?;

        self.wait_steady(&cluster_id, &pool_id, self.timeouts.create)
            .await?;

        let mut state = self.read_existing(&resource.id, &cluster_id, &pool_id).await?;
        merge_declared(&mut state, resource);
        Ok(state)
    }

    pub async fn read(
        &self,
        id: &ResourceId,
        cluster_id: &str,
        pool_id: &str,
    ) -> ProviderResult<State> {
        let cce = self.factory.service(Service::CceV3);
        let pool = match api::node_pool::get(&cce, cluster_id, pool_id).await {
            Ok(pool) => pool,
            Err(e) if e.is_not_found() => return Ok(State::not_found(id.clone())),
            Err(e) => return Err(wrap("fetching node pool", e)),
        };

        let attrs = state_attributes(cluster_id, &pool)?;
        Ok(State::existing(id.clone(), attrs)
            .with_identifier(format!("{}/{}", cluster_id, pool_id)))
    }

    pub async fn update(
        &self,
        id: &ResourceId,
        cluster_id: &str,
        pool_id: &str,
        to: &Resource,
    ) -> ProviderResult<State> {
        let request = build_pool_request(to)?;

        let cce = self.factory.service(Service::CceV3);
        gate::gated_call(
            || self.cluster_ready(cluster_id),
            || {
                let cce = Arc::clone(&cce);
                let cluster_id = cluster_id.to_string();
                let pool_id = pool_id.to_string();
                let request = request.clone();
                async move { api::node_pool::update(&cce, &cluster_id, &pool_id, &request).await }
            },
        )
        .await
        .map_err(|e| wrap("updating node pool", e))?;

        self.wait_steady(cluster_id, pool_id, self.timeouts.update)
            .await?;

        let mut state = self.read_existing(id, cluster_id, pool_id).await?;
        merge_declared(&mut state, to);
        Ok(state)
    }

    pub async fn delete(&self, cluster_id: &str, pool_id: &str) -> ProviderResult<()> {
        let cce = self.factory.service(Service::CceV3);
        match api::node_pool::delete(&cce, cluster_id, pool_id).await {
            Ok(()) => {}
            Err(e) if e.is_not_found() => return Ok(()),
            Err(e) => return Err(wrap("deleting node pool", e)),
        }

        let cluster_id = cluster_id.to_string();
        let pool_id = pool_id.to_string();
        wait_for_phase(
            || {
                let cce = Arc::clone(&cce);
                let cluster_id = cluster_id.clone();
                let pool_id = pool_id.clone();
                async move {
                    deleted_on_404(
                        api::node_pool::get(&cce, &cluster_id, &pool_id)
                            .await
                            .map(|pool| {
                                let phase = pool
                                    .status
                                    .as_ref()
                                    .map(|s| s.phase.clone())
                                    .unwrap_or_default();
                                ((), phase)
                            }),
                    )
                }
            },
            &["Deleting", "Synchronizing", "Synchronized", ""],
            &[DELETED],
            WaitConfig::with_timeout(self.timeouts.delete),
        )
        .await
        .map_err(|e| wrap("waiting for node pool deletion", e))?;
        Ok(())
    }

    fn cluster_ready(
        &self,
        cluster_id: &str,
    ) -> impl Future<Output = Result<(), crate::wait::WaitError>> {
        let cce = self.factory.service(Service::CceV3);
        let cluster_id = cluster_id.to_string();
        let timeout = self.timeouts.default_;
        async move {
            gate::wait_cluster_available(
                || {
                    let cce = Arc::clone(&cce);
                    let cluster_id = cluster_id.clone();
                    async move {
                        let cluster = api::cluster::get(&cce, &cluster_id).await?;
                        Ok(cluster
                            .status
                            .as_ref()
                            .map(|s| s.phase.clone())
                            .unwrap_or_default())
                    }
                },
                timeout,
            )
            .await
        }
    }

    /// Wait for the pool to settle out of the synchronisation states; the
    /// cloud expresses "steady" as an empty phase.
    async fn wait_steady(
        &self,
        cluster_id: &str,
        pool_id: &str,
        timeout: Duration,
    ) -> ProviderResult<NodePool> {
        let cce = self.factory.service(Service::CceV3);
        let cluster_id = cluster_id.to_string();
        let pool_id = pool_id.to_string();
        wait_for_phase(
            || {
                let cce = Arc::clone(&cce);
                let cluster_id = cluster_id.clone();
                let pool_id = pool_id.clone();
                async move {
                    let pool = api::node_pool::get(&cce, &cluster_id, &pool_id).await?;
                    let phase = pool
                        .status
                        .as_ref()
                        .map(|s| s.phase.clone())
                        .unwrap_or_default();
                    Ok((pool, phase))
                }
            },
            &["Synchronizing", "Synchronized"],
            &[""],
            WaitConfig::with_timeout(timeout),
        )
        .await
        .map_err(|e| wrap("waiting for node pool to settle", e))
    }

    async fn read_existing(
        &self,
        id: &ResourceId,
        cluster_id: &str,
        pool_id: &str,
    ) -> ProviderResult<State> {
        let state = self.read(id, cluster_id, pool_id).await?;
        if !state.exists {
            return Err(ProviderError::new(format!(
                "node pool {} disappeared after the operation completed",
                pool_id
            )));
        }
        Ok(state)
    }
}

/// Assemble the pool request; also used for updates, where the cloud ignores
/// the immutable template fields.
fn build_pool_request(resource: &Resource) -> ProviderResult<NodePool> {
    let attrs = &resource.attributes;

    let name = resource
        .attr_str("name")
        .ok_or_else(|| ProviderError::new("name is required"))?;
    let flavor = resource
        .attr_str("flavor")
        .ok_or_else(|| ProviderError::new("flavor is required"))?;
    let root_volume = attrs
        .get("root_volume")
        .ok_or_else(|| ProviderError::new("root_volume is required"))
        .and_then(|v| volume_from_value(v, "root_volume"))?;
    let data_volumes = volumes_from_attr(attrs, "data_volumes")?;
    if data_volumes.is_empty() {
        return Err(ProviderError::new("at least one data volume is required"));
    }
    let initial_node_count = resource
        .attr_int("initial_node_count")
        .ok_or_else(|| ProviderError::new("initial_node_count is required"))?;

    let autoscaling = if resource.attr_bool("scale_enable").unwrap_or(false) {
        Some(Autoscaling {
            enable: true,
            min_node_count: resource.attr_int("min_node_count").unwrap_or(0),
            max_node_count: resource.attr_int("max_node_count").unwrap_or(0),
            scale_down_cooldown_time: resource.attr_int("scale_down_cooldown_time").unwrap_or(0),
            priority: resource.attr_int("priority").unwrap_or(0),
        })
    } else {
        None
    };

    let mut extend_params: HashMap<String, serde_json::Value> = HashMap::new();
    template_extend_params(resource, &mut extend_params);

    let node_template = NodeSpec {
        flavor: flavor.to_string(),
        az: resource
            .attr_str("availability_zone")
            .unwrap_or("random")
            .to_string(),
        os: resource.attr_str("os").map(|s| s.to_string()),
        login: build_login(resource)?,
        root_volume,
        data_volumes,
        nic: resource.attr_str("subnet_id").map(|subnet_id| NodeNicSpec {
            primary_nic: PrimaryNic {
                subnet_id: Some(subnet_id.to_string()),
                fixed_ips: None,
            },
        }),
        extend_params,
        runtime: resource.attr_str("runtime").map(|name| Runtime {
            name: name.to_string(),
        }),
        k8s_tags: string_map(attrs.get("k8s_tags")),
        taints: taints_from_attr(attrs),
        user_tags: user_tags_from_attr(attrs, "user_tags"),
        ..Default::default()
    };

    let node_management = resource
        .attr_str("server_group_id")
        .map(|group| NodeManagement {
            server_group_reference: Some(group.to_string()),
        });

    Ok(NodePool {
        metadata: Metadata::named(name),
        spec: NodePoolSpec {
            pool_type: Some("vm".to_string()),
            node_template,
            initial_node_count,
            autoscaling,
            node_management,
        },
        status: None,
    })
}

/// `"null"` from the server means the runtime was never recorded; such pools
/// run the default container runtime.
fn impute_runtime(runtime: Option<&Runtime>) -> Option<String> {
    let runtime = runtime?;
    if runtime.name == RUNTIME_NULL_SENTINEL || runtime.name.is_empty() {
        Some("docker".to_string())
    } else {
        Some(runtime.name.clone())
    }
}

/// Drop the pool-management keys the cloud injects into the template's tags
fn strip_pool_tags(tags: &HashMap<String, String>) -> HashMap<String, String> {
    tags.iter()
        .filter(|(key, _)| !key.contains(POOL_TAG_MARKER))
        .map(|(k, v)| (k.clone(), v.clone()))
        .collect()
}

fn state_attributes(cluster_id: &str, pool: &NodePool) -> ProviderResult<HashMap<String, Value>> {
    let template = &pool.spec.node_template;
    let mut attrs = HashMap::new();
    attrs.insert(
        "cluster_id".to_string(),
        Value::String(cluster_id.to_string()),
    );
    attrs.insert(
        "name".to_string(),
        Value::String(pool.metadata.name.clone()),
    );
    attrs.insert("flavor".to_string(), Value::String(template.flavor.clone()));
    attrs.insert(
        "availability_zone".to_string(),
        Value::String(template.az.clone()),
    );
    if let Some(os) = &template.os {
        attrs.insert("os".to_string(), Value::String(os.clone()));
    }
    if let Some(ssh_key) = &template.login.ssh_key {
        attrs.insert("key_pair".to_string(), Value::String(ssh_key.clone()));
    }

    attrs.insert(
        "root_volume".to_string(),
        volume_to_value(&template.root_volume)?,
    );
    let data_volumes = template
        .data_volumes
        .iter()
        .map(volume_to_value)
        .collect::<Result<Vec<_>, _>>()?;
    attrs.insert("data_volumes".to_string(), Value::List(data_volumes));

    attrs.insert(
        "initial_node_count".to_string(),
        Value::Int(pool.spec.initial_node_count),
    );
    if let Some(autoscaling) = &pool.spec.autoscaling {
        attrs.insert("scale_enable".to_string(), Value::Bool(autoscaling.enable));
        attrs.insert(
            "min_node_count".to_string(),
            Value::Int(autoscaling.min_node_count),
        );
        attrs.insert(
            "max_node_count".to_string(),
            Value::Int(autoscaling.max_node_count),
        );
        attrs.insert(
            "scale_down_cooldown_time".to_string(),
            Value::Int(autoscaling.scale_down_cooldown_time),
        );
        attrs.insert("priority".to_string(), Value::Int(autoscaling.priority));
    }

    let k8s_tags = strip_pool_tags(&template.k8s_tags);
    attrs.insert(
        "k8s_tags".to_string(),
        Value::Map(
            k8s_tags
                .into_iter()
                .map(|(k, v)| (k, Value::String(v)))
                .collect(),
        ),
    );

    if let Some(runtime) = impute_runtime(template.runtime.as_ref()) {
        attrs.insert("runtime".to_string(), Value::String(runtime));
    }

    if let Some(status) = &pool.status {
        attrs.insert("status".to_string(), Value::String(status.phase.clone()));
        if let Some(count) = status.current_node {
            attrs.insert("current_node_count".to_string(), Value::Int(count));
        }
    }
    Ok(attrs)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn volume_value(size: i64) -> Value {
        Value::Map(HashMap::from([
            ("size".to_string(), Value::Int(size)),
            ("volumetype".to_string(), Value::String("SAS".to_string())),
        ]))
    }

    fn declared() -> Resource {
        Resource::new("cce_node_pool", "pool")
            .with_attribute("cluster_id", Value::String("c-1".to_string()))
            .with_attribute("name", Value::String("pool-a".to_string()))
            .with_attribute("flavor", Value::String("s3.large.2".to_string()))
            .with_attribute("key_pair", Value::String("ssh-k1".to_string()))
            .with_attribute("root_volume", volume_value(40))
            .with_attribute("data_volumes", Value::List(vec![volume_value(100)]))
            .with_attribute("initial_node_count", Value::Int(1))
    }

    #[test]
    fn request_defaults_az_to_random() {
        let request = build_pool_request(&declared()).unwrap();
        assert_eq!(request.spec.node_template.az, "random");
        assert_eq!(request.spec.pool_type.as_deref(), Some("vm"));
        assert_eq!(request.spec.initial_node_count, 1);
        assert!(request.spec.autoscaling.is_none());
    }

    #[test]
    fn autoscaling_block_requires_enable_flag() {
        let resource = declared()
            .with_attribute("scale_enable", Value::Bool(true))
            .with_attribute("min_node_count", Value::Int(1))
            .with_attribute("max_node_count", Value::Int(3));
        let request = build_pool_request(&resource).unwrap();
        let autoscaling = request.spec.autoscaling.unwrap();
        assert!(autoscaling.enable);
        assert_eq!(autoscaling.max_node_count, 3);
    }

    #[test]
    fn template_extras_reach_the_wire() {
        let resource = declared()
            .with_attribute("subnet_id", Value::String("subnet-1".to_string()))
            .with_attribute("preinstall", Value::String("#!/bin/sh\ntrue".to_string()))
            .with_attribute("docker_base_size", Value::Int(20))
            .with_attribute("agency_name", Value::String("cce-admin".to_string()))
            .with_attribute(
                "docker_lvm_config_override",
                Value::String("dockerThinpool=vgpaas/90%VG".to_string()),
            )
            .with_attribute("server_group_id", Value::String("sg-1".to_string()));
        let request = build_pool_request(&resource).unwrap();

        let template = &request.spec.node_template;
        assert_eq!(
            template
                .nic
                .as_ref()
                .and_then(|n| n.primary_nic.subnet_id.as_deref()),
            Some("subnet-1")
        );
        assert_eq!(
            template.extend_params["dockerBaseSize"],
            serde_json::Value::from(20i64)
        );
        assert_eq!(
            template.extend_params["agency_name"],
            serde_json::Value::from("cce-admin")
        );
        assert_eq!(
            template.extend_params["DockerLVMConfigOverride"],
            serde_json::Value::from("dockerThinpool=vgpaas/90%VG")
        );
        assert!(
            template.extend_params[crate::node::PRE_INSTALL_KEY]
                .as_str()
                .is_some_and(|s| !s.contains('\n'))
        );
        assert_eq!(
            request
                .spec
                .node_management
                .as_ref()
                .and_then(|m| m.server_group_reference.as_deref()),
            Some("sg-1")
        );
    }

    #[test]
    fn pool_management_tags_are_stripped() {
        let tags = HashMap::from([
            ("team".to_string(), "a".to_string()),
            (
                "cce.cloud.com/cce-nodepool".to_string(),
                "pool-a".to_string(),
            ),
        ]);
        let kept = strip_pool_tags(&tags);
        assert_eq!(kept.len(), 1);
        assert!(kept.contains_key("team"));
    }

    #[test]
    fn null_runtime_is_imputed_as_docker() {
        assert_eq!(
            impute_runtime(Some(&Runtime {
                name: "null".to_string()
            }))
            .as_deref(),
            Some("docker")
        );
        assert_eq!(
            impute_runtime(Some(&Runtime {
                name: "containerd".to_string()
            }))
            .as_deref(),
            Some("containerd")
        );
        assert_eq!(impute_runtime(None), None);
    }

    #[test]
    fn state_attributes_map_autoscaling_and_tags() {
        let pool: NodePool = serde_json::from_value(serde_json::json!({
            "metadata": { "name": "pool-a", "uid": "np-1" },
            "spec": {
                "type": "vm",
                "nodeTemplate": {
                    "flavor": "s3.large.2",
                    "az": "random",
                    "login": { "sshKey": "ssh-k1" },
                    "rootVolume": { "size": 40, "volumetype": "SAS" },
                    "dataVolumes": [ { "size": 100, "volumetype": "SAS" } ],
                    "runtime": { "name": "null" },
                    "k8sTags": {
                        "team": "a",
                        "cce.cloud.com/cce-nodepool": "pool-a"
                    }
                },
                "initialNodeCount": 1,
                "autoscaling": { "enable": true, "minNodeCount": 1, "maxNodeCount": 3 }
            },
            "status": { "currentNode": 1 }
        }))
        .unwrap();

        let attrs = state_attributes("c-1", &pool).unwrap();
        assert_eq!(attrs["status"], Value::String(String::new()));
        assert_eq!(attrs["max_node_count"], Value::Int(3));
        assert_eq!(attrs["runtime"], Value::String("docker".to_string()));
        assert_eq!(attrs["current_node_count"], Value::Int(1));
        let tags = attrs["k8s_tags"].as_map().unwrap();
        assert_eq!(tags.len(), 1);
        assert_eq!(tags["team"], Value::String("a".to_string()));
    }
}
