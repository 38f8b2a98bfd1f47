//! Node controller
//!
//! The most involved lifecycle: create is gated on the parent cluster,
//! returns a job handle that must be resolved to the node identifier, and
//! polls `Build -> Installing -> Active`. Reads assemble state from three
//! services (CCE v3 node, ECS server tags, CCE v1 kubernetes node). Updates
//! run through side channels per field: node rename, ECS tag reconciliation,
//! floating-IP bandwidth resize and rebinding.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use base64::Engine as _;
use base64::engine::general_purpose::STANDARD as BASE64;

use vela_core::provider::{OperationTimeouts, ProviderError, ProviderResult};
use vela_core::resource::{Resource, ResourceId, State, Value};

use crate::api::ecs::{RESERVED_TAG_KEYS, ServerTag};
use crate::api::node::{
    EipAllocation, Login, Node, NodeNicSpec, NodeSpec, PrimaryNic, PublicIpSpec, Runtime,
    UserPassword,
};
use crate::api::{self, Metadata, k8s};
use crate::attrs::{
    merge_declared, string_list, string_map, taints_from_attr, user_tags_from_attr,
    volume_from_value, volume_to_value, volumes_from_attr,
};
use crate::client::ClientFactory;
use crate::config::Service;
use crate::gate;
use crate::job;
use crate::wait::{DELETED, WaitConfig, deleted_on_404, wait_for_phase};
use crate::wrap;

/// Extend-param keys carrying the base64-encoded lifecycle scripts
pub(crate) const PRE_INSTALL_KEY: &str = "alpha.cce/preInstall";
pub(crate) const POST_INSTALL_KEY: &str = "alpha.cce/postInstall";

/// Extend-param keys for sizing and placement the API accepts nowhere else
const MAX_PODS_KEY: &str = "maxPods";
const AGENCY_NAME_KEY: &str = "agency_name";
const DOCKER_BASE_SIZE_KEY: &str = "dockerBaseSize";
const LVM_OVERRIDE_KEY: &str = "DockerLVMConfigOverride";

/// Defaults for a floating IP allocated inline with the node
const DEFAULT_IP_TYPE: &str = "5_bgp";
const DEFAULT_SHARE_TYPE: &str = "PER";
const DEFAULT_CHARGE_MODE: &str = "traffic";

pub struct NodeController<'a> {
    factory: &'a ClientFactory,
    timeouts: OperationTimeouts,
}

impl<'a> NodeController<'a> {
    pub fn new(factory: &'a ClientFactory, timeouts: OperationTimeouts) -> Self {
        Self { factory, timeouts }
    }

    pub async fn create(&self, resource: &Resource) -> ProviderResult<State> {
        let cluster_id = resource
            .attr_str("cluster_id")
            .ok_or_else(|| ProviderError::new("cluster_id is required"))?
            .to_string();
        let request = build_create_request(resource)?;

        let cce = self.factory.service(Service::CceV3);
        let created = gate::gated_call(
            || {
                let cce = Arc::clone(&cce);
                let cluster_id = cluster_id.clone();
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
                        self.timeouts.default_,
                    )
                    .await
                }
            },
            || {
                let cce = Arc::clone(&cce);
                let cluster_id = cluster_id.clone();
                let request = request.clone();
                async move { api::node::create(&cce, &cluster_id, &request).await }
            },
        )
        .await
        .map_err(|e| wrap("creating node", e))?;

        let job_id = created
            .status
            .as_ref()
            .and_then(|s| s.job_id.clone())
            .ok_or_else(|| ProviderError::new("create response carried no job id"))?;

        let node_id = job::resolve_node_id(
            |id| {
                let cce = Arc::clone(&cce);
                async move { api::job::get(&cce, &id).await }
            },
            &job_id,
            WaitConfig::with_timeout(self.timeouts.default_),
        )
        .await
        .map_err(|e| wrap("resolving node id from create job", e))?;

        self.wait_phase(
            &cluster_id,
            &node_id,
            &["Build", "Installing"],
            &["Active"],
            self.timeouts.create,
        )
        .await?;

        let mut state = self
            .read_existing(&resource.id, &cluster_id, &node_id)
            .await?;
        merge_declared(&mut state, resource);
        Ok(state)
    }

    pub async fn read(
        &self,
        id: &ResourceId,
        cluster_id: &str,
        node_id: &str,
    ) -> ProviderResult<State> {
        let cce = self.factory.service(Service::CceV3);
        let node = match api::node::get(&cce, cluster_id, node_id).await {
            Ok(node) => node,
            Err(e) if e.is_not_found() => return Ok(State::not_found(id.clone())),
            Err(e) => return Err(wrap("fetching node", e)),
        };

        let mut attrs = state_attributes(cluster_id, &node)?;

        let server_id = node.status.as_ref().and_then(|s| s.server_id.as_deref());
        if let Some(server_id) = server_id {
            self.read_server_tags(server_id, &mut attrs).await?;
            self.read_floating_ip(server_id, &mut attrs).await?;
        }

        let private_ip = node.status.as_ref().and_then(|s| s.private_ip.as_deref());
        if let Some(private_ip) = private_ip {
            self.read_k8s_metadata(cluster_id, private_ip, &mut attrs)
                .await?;
        }

        Ok(State::existing(id.clone(), attrs)
            .with_identifier(format!("{}/{}", cluster_id, node_id)))
    }

    pub async fn update(
        &self,
        id: &ResourceId,
        cluster_id: &str,
        node_id: &str,
        from: &State,
        to: &Resource,
    ) -> ProviderResult<State> {
        let cce = self.factory.service(Service::CceV3);

        let old_name = from
            .attributes
            .get("name")
            .and_then(Value::as_str)
            .unwrap_or_default();
        if let Some(new_name) = to.attr_str("name") {
            if new_name != old_name {
                api::node::update_name(&cce, cluster_id, node_id, new_name)
                    .await
                    .map_err(|e| wrap("renaming node", e))?;
            }
        }

        let node = api::node::get(&cce, cluster_id, node_id)
            .await
            .map_err(|e| wrap("fetching node", e))?;
        let server_id = node
            .status
            .as_ref()
            .and_then(|s| s.server_id.clone())
            .ok_or_else(|| ProviderError::new("node carries no server id"))?;

        self.sync_server_tags(&server_id, from, to).await?;
        self.sync_floating_ip(&server_id, from, to).await?;

        let mut state = self.read_existing(id, cluster_id, node_id).await?;
        merge_declared(&mut state, to);
        Ok(state)
    }

    pub async fn delete(&self, cluster_id: &str, node_id: &str) -> ProviderResult<()> {
        let cce = self.factory.service(Service::CceV3);
        match api::node::delete(&cce, cluster_id, node_id).await {
            Ok(()) => {}
            Err(e) if e.is_not_found() => return Ok(()),
            Err(e) => return Err(wrap("deleting node", e)),
        }

        let cluster_id = cluster_id.to_string();
        let node_id = node_id.to_string();
        wait_for_phase(
            || {
                let cce = Arc::clone(&cce);
                let cluster_id = cluster_id.clone();
                let node_id = node_id.clone();
                async move {
                    deleted_on_404(
                        api::node::get(&cce, &cluster_id, &node_id)
                            .await
                            .map(|node| {
                                let phase = node
                                    .status
                                    .as_ref()
                                    .map(|s| s.phase.clone())
                                    .unwrap_or_default();
                                ((), phase)
                            }),
                    )
                }
            },
            &["Deleting", "Active", "Abnormal"],
            &[DELETED],
            WaitConfig::with_timeout(self.timeouts.delete),
        )
        .await
        .map_err(|e| wrap("waiting for node deletion", e))?;
        Ok(())
    }

    async fn read_existing(
        &self,
        id: &ResourceId,
        cluster_id: &str,
        node_id: &str,
    ) -> ProviderResult<State> {
        let state = self.read(id, cluster_id, node_id).await?;
        if !state.exists {
            return Err(ProviderError::new(format!(
                "node {} disappeared after the operation completed",
                node_id
            )));
        }
        Ok(state)
    }

    async fn wait_phase(
        &self,
        cluster_id: &str,
        node_id: &str,
        pending: &[&str],
        target: &[&str],
        timeout: Duration,
    ) -> ProviderResult<Node> {
        let cce = self.factory.service(Service::CceV3);
        let cluster_id = cluster_id.to_string();
        let node_id = node_id.to_string();
        wait_for_phase(
            || {
                let cce = Arc::clone(&cce);
                let cluster_id = cluster_id.clone();
                let node_id = node_id.clone();
                async move {
                    let node = api::node::get(&cce, &cluster_id, &node_id).await?;
                    let phase = node
                        .status
                        .as_ref()
                        .map(|s| s.phase.clone())
                        .unwrap_or_default();
                    Ok((node, phase))
                }
            },
            pending,
            target,
            WaitConfig::with_timeout(timeout),
        )
        .await
        .map_err(|e| wrap("waiting for node phase", e))
    }

    async fn read_server_tags(
        &self,
        server_id: &str,
        attrs: &mut HashMap<String, Value>,
    ) -> ProviderResult<()> {
        let ecs = self.factory.service(Service::Ecs);
        let tags = api::ecs::tags(&ecs, server_id)
            .await
            .map_err(|e| wrap("fetching server tags", e))?;
        let user_tags: HashMap<String, Value> = tags
            .tags
            .into_iter()
            .filter(|t| !RESERVED_TAG_KEYS.contains(&t.key.as_str()))
            .map(|t| (t.key, Value::String(t.value)))
            .collect();
        attrs.insert("tags".to_string(), Value::Map(user_tags));
        attrs.insert(
            "server_id".to_string(),
            Value::String(server_id.to_string()),
        );
        Ok(())
    }

    async fn read_floating_ip(
        &self,
        server_id: &str,
        attrs: &mut HashMap<String, Value>,
    ) -> ProviderResult<()> {
        let eip_client = self.factory.service(Service::Eip);
        let bound = api::eip::find_by_server(&eip_client, server_id)
            .await
            .map_err(|e| wrap("listing floating IPs", e))?;
        match bound {
            Some(ip) => {
                attrs.insert(
                    "public_ip".to_string(),
                    Value::String(ip.public_ip_address.clone()),
                );
                if let Some(bandwidth_id) = &ip.bandwidth_id {
                    let bandwidth = api::eip::get_bandwidth(&eip_client, bandwidth_id)
                        .await
                        .map_err(|e| wrap("fetching bandwidth", e))?;
                    attrs.insert("bandwidth_size".to_string(), Value::Int(bandwidth.size));
                }
            }
            None => {
                attrs.insert("public_ip".to_string(), Value::String(String::new()));
                attrs.insert("bandwidth_size".to_string(), Value::Int(0));
            }
        }
        Ok(())
    }

    async fn read_k8s_metadata(
        &self,
        cluster_id: &str,
        private_ip: &str,
        attrs: &mut HashMap<String, Value>,
    ) -> ProviderResult<()> {
        let v1 = self.factory.service(Service::CceV1);
        let list = match k8s::list_nodes(&v1, cluster_id).await {
            Ok(list) => list,
            Err(e) => {
                // The v1 surface is best-effort; a node read should not fail
                // because labels are momentarily unreadable.
                log::warn!("kubernetes nodes of {} not listable: {}", cluster_id, e);
                return Ok(());
            }
        };
        let Some(k8s_node) = k8s::find_by_private_ip(&list, private_ip) else {
            return Ok(());
        };

        let config = self.factory.config();
        let labels = filter_labels(&k8s_node.metadata.labels, &config.predefined_label_keys);
        attrs.insert(
            "k8s_tags".to_string(),
            Value::Map(
                labels
                    .into_iter()
                    .map(|(k, v)| (k, Value::String(v)))
                    .collect(),
            ),
        );

        let taints = filter_taints(&k8s_node.spec.taints, &config.predefined_taint_keys);
        attrs.insert(
            "taints".to_string(),
            Value::List(
                taints
                    .iter()
                    .map(|t| {
                        let mut map = HashMap::from([
                            ("key".to_string(), Value::String(t.key.clone())),
                            ("effect".to_string(), Value::String(t.effect.clone())),
                        ]);
                        if let Some(value) = &t.value {
                            map.insert("value".to_string(), Value::String(value.clone()));
                        }
                        Value::Map(map)
                    })
                    .collect(),
            ),
        );
        Ok(())
    }

    async fn sync_server_tags(
        &self,
        server_id: &str,
        from: &State,
        to: &Resource,
    ) -> ProviderResult<()> {
        let old = string_map(from.attributes.get("tags"));
        let new = string_map(to.attributes.get("tags"));
        if old == new {
            return Ok(());
        }
        let (add, remove) = diff_tags(&old, &new);

        let ecs = self.factory.service(Service::Ecs);
        api::ecs::remove_tags(&ecs, server_id, &remove)
            .await
            .map_err(|e| wrap("removing server tags", e))?;
        api::ecs::add_tags(&ecs, server_id, &add)
            .await
            .map_err(|e| wrap("adding server tags", e))?;
        Ok(())
    }

    async fn sync_floating_ip(
        &self,
        server_id: &str,
        from: &State,
        to: &Resource,
    ) -> ProviderResult<()> {
        let eip_client = self.factory.service(Service::Eip);

        // Pre-allocated ids take precedence over the inline recipe.
        let old_ids = string_list(from.attributes.get("eip_ids"));
        let new_ids = string_list(to.attributes.get("eip_ids"));
        if old_ids != new_ids {
            for id in old_ids.iter().filter(|id| !new_ids.contains(id)) {
                api::eip::bind_server(&eip_client, id, None)
                    .await
                    .map_err(|e| wrap("disassociating floating IP", e))?;
            }
            for id in new_ids.iter().filter(|id| !old_ids.contains(id)) {
                api::eip::bind_server(&eip_client, id, Some(server_id))
                    .await
                    .map_err(|e| wrap("associating floating IP", e))?;
            }
            return Ok(());
        }

        let old_size = from
            .attributes
            .get("bandwidth_size")
            .and_then(Value::as_int)
            .unwrap_or(0);
        let new_size = to.attr_int("bandwidth_size").unwrap_or(old_size);
        if old_size == new_size {
            return Ok(());
        }

        let bound = api::eip::find_by_server(&eip_client, server_id)
            .await
            .map_err(|e| wrap("listing floating IPs", e))?;
        match floating_ip_step(bound, new_size)? {
            FloatingIpStep::Keep => {}
            FloatingIpStep::Release { eip_id } => {
                api::eip::bind_server(&eip_client, &eip_id, None)
                    .await
                    .map_err(|e| wrap("disassociating floating IP", e))?;
                api::eip::delete(&eip_client, &eip_id)
                    .await
                    .map_err(|e| wrap("releasing floating IP", e))?;
            }
            FloatingIpStep::Resize { bandwidth_id, size } => {
                api::eip::resize_bandwidth(&eip_client, &bandwidth_id, size)
                    .await
                    .map_err(|e| wrap("resizing bandwidth", e))?;
            }
            FloatingIpStep::Allocate { size } => {
                let recipe = api::eip::PublicIpCreate {
                    ip_type: to.attr_str("iptype").unwrap_or(DEFAULT_IP_TYPE).to_string(),
                    bandwidth_size: size,
                    share_type: to
                        .attr_str("sharetype")
                        .unwrap_or(DEFAULT_SHARE_TYPE)
                        .to_string(),
                    charge_mode: to
                        .attr_str("bandwidth_charge_mode")
                        .unwrap_or(DEFAULT_CHARGE_MODE)
                        .to_string(),
                };
                let created = api::eip::create(&eip_client, &recipe)
                    .await
                    .map_err(|e| wrap("allocating floating IP", e))?;

                let eip_id = created.id.clone();
                wait_for_phase(
                    || {
                        let client = Arc::clone(&eip_client);
                        let eip_id = eip_id.clone();
                        async move {
                            let ip = api::eip::get(&client, &eip_id).await?;
                            let status = ip.status.clone();
                            Ok((ip, status))
                        }
                    },
                    &["PENDING_CREATE", "NOTIFYING"],
                    &["ACTIVE", "DOWN"],
                    WaitConfig {
                        delay: Duration::from_secs(2),
                        poll_interval: Duration::from_secs(5),
                        timeout: self.timeouts.default_,
                    },
                )
                .await
                .map_err(|e| wrap("waiting for floating IP", e))?;

                api::eip::bind_server(&eip_client, &eip_id, Some(server_id))
                    .await
                    .map_err(|e| wrap("associating floating IP", e))?;
            }
        }
        Ok(())
    }
}

/// Assemble the node create request from the declared attributes
fn build_create_request(resource: &Resource) -> ProviderResult<Node> {
    let attrs = &resource.attributes;

    let flavor = resource
        .attr_str("flavor")
        .ok_or_else(|| ProviderError::new("flavor is required"))?;
    let az = resource
        .attr_str("availability_zone")
        .ok_or_else(|| ProviderError::new("availability_zone is required"))?;
    let root_volume = attrs
        .get("root_volume")
        .ok_or_else(|| ProviderError::new("root_volume is required"))
        .and_then(|v| volume_from_value(v, "root_volume"))?;
    let data_volumes = volumes_from_attr(attrs, "data_volumes")?;
    if data_volumes.is_empty() {
        return Err(ProviderError::new("at least one data volume is required"));
    }

    let login = build_login(resource)?;

    let eip_ids = string_list(attrs.get("eip_ids"));
    let public_ip = if !eip_ids.is_empty() {
        Some(PublicIpSpec {
            ids: Some(eip_ids),
            count: None,
            eip: None,
        })
    } else {
        build_inline_eip(resource)
    };

    let nic = match (resource.attr_str("subnet_id"), resource.attr_str("fixed_ip")) {
        (None, None) => None,
        (subnet_id, fixed_ip) => Some(NodeNicSpec {
            primary_nic: PrimaryNic {
                subnet_id: subnet_id.map(|s| s.to_string()),
                fixed_ips: fixed_ip.map(|ip| vec![ip.to_string()]),
            },
        }),
    };

    let mut extend_params: HashMap<String, serde_json::Value> =
        string_map(attrs.get("extend_params"))
            .into_iter()
            .map(|(k, v)| (k, serde_json::Value::String(v)))
            .collect();
    template_extend_params(resource, &mut extend_params);
    if let Some(max_pods) = resource.attr_int("max_pods") {
        extend_params.insert(MAX_PODS_KEY.to_string(), serde_json::Value::from(max_pods));
    }

    Ok(Node {
        metadata: Metadata::named(resource.attr_str("name").unwrap_or_default()),
        spec: NodeSpec {
            flavor: flavor.to_string(),
            az: az.to_string(),
            os: resource.attr_str("os").map(|s| s.to_string()),
            login,
            root_volume,
            data_volumes,
            public_ip,
            nic,
            ecs_group_id: resource.attr_str("ecs_group_id").map(|s| s.to_string()),
            billing_mode: 0,
            count: Some(1),
            extend_params,
            runtime: resource
                .attr_str("runtime")
                .map(|name| Runtime {
                    name: name.to_string(),
                }),
            k8s_tags: string_map(attrs.get("k8s_tags")),
            taints: taints_from_attr(attrs),
            user_tags: user_tags_from_attr(attrs, "tags"),
        },
        status: None,
    })
}

/// Template fields shared by nodes and node-pool templates; the API accepts
/// them only through extend params.
pub(crate) fn template_extend_params(
    resource: &Resource,
    extend_params: &mut HashMap<String, serde_json::Value>,
) {
    if let Some(script) = resource.attr_str("preinstall").filter(|s| !s.is_empty()) {
        extend_params.insert(
            PRE_INSTALL_KEY.to_string(),
            serde_json::Value::String(BASE64.encode(script)),
        );
    }
    if let Some(script) = resource.attr_str("postinstall").filter(|s| !s.is_empty()) {
        extend_params.insert(
            POST_INSTALL_KEY.to_string(),
            serde_json::Value::String(BASE64.encode(script)),
        );
    }
    if let Some(size) = resource.attr_int("docker_base_size") {
        extend_params.insert(
            DOCKER_BASE_SIZE_KEY.to_string(),
            serde_json::Value::from(size),
        );
    }
    if let Some(agency) = resource.attr_str("agency_name") {
        extend_params.insert(
            AGENCY_NAME_KEY.to_string(),
            serde_json::Value::String(agency.to_string()),
        );
    }
    if let Some(lvm) = resource.attr_str("docker_lvm_config_override") {
        extend_params.insert(
            LVM_OVERRIDE_KEY.to_string(),
            serde_json::Value::String(lvm.to_string()),
        );
    }
}

pub(crate) fn build_login(resource: &Resource) -> ProviderResult<Login> {
    match (
        resource.attr_str("key_pair").filter(|s| !s.is_empty()),
        resource.attr_str("password").filter(|s| !s.is_empty()),
    ) {
        (Some(key_pair), None) => Ok(Login {
            ssh_key: Some(key_pair.to_string()),
            user_password: None,
        }),
        (None, Some(password)) => Ok(Login {
            ssh_key: None,
            user_password: Some(UserPassword {
                username: "root".to_string(),
                password: password.to_string(),
            }),
        }),
        _ => Err(ProviderError::new(
            "exactly one of key_pair and password is required",
        )),
    }
}

/// Inline floating-IP recipe; a bandwidth with no explicit count means one
/// address.
fn build_inline_eip(resource: &Resource) -> Option<PublicIpSpec> {
    let bandwidth_size = resource.attr_int("bandwidth_size").unwrap_or(0);
    let mut count = resource.attr_int("eip_count").unwrap_or(0);
    if bandwidth_size > 0 && count == 0 {
        count = 1;
    }
    if count == 0 {
        return None;
    }
    Some(PublicIpSpec {
        ids: None,
        count: Some(count),
        eip: Some(EipAllocation {
            iptype: resource
                .attr_str("iptype")
                .unwrap_or(DEFAULT_IP_TYPE)
                .to_string(),
            bandwidth: api::node::BandwidthAllocation {
                size: bandwidth_size,
                share_type: resource
                    .attr_str("sharetype")
                    .unwrap_or(DEFAULT_SHARE_TYPE)
                    .to_string(),
                charge_mode: resource
                    .attr_str("bandwidth_charge_mode")
                    .unwrap_or(DEFAULT_CHARGE_MODE)
                    .to_string(),
            },
        }),
    })
}

/// Base attribute mapping from the v3 node object; tags, floating IP and
/// kubernetes metadata are filled in by the service reads.
fn state_attributes(cluster_id: &str, node: &Node) -> ProviderResult<HashMap<String, Value>> {
    let mut attrs = HashMap::new();
    attrs.insert(
        "cluster_id".to_string(),
        Value::String(cluster_id.to_string()),
    );
    attrs.insert(
        "name".to_string(),
        Value::String(node.metadata.name.clone()),
    );
    attrs.insert(
        "flavor".to_string(),
        Value::String(node.spec.flavor.clone()),
    );
    attrs.insert(
        "availability_zone".to_string(),
        Value::String(node.spec.az.clone()),
    );
    if let Some(os) = &node.spec.os {
        attrs.insert("os".to_string(), Value::String(os.clone()));
    }
    if let Some(ssh_key) = &node.spec.login.ssh_key {
        attrs.insert("key_pair".to_string(), Value::String(ssh_key.clone()));
    }

    attrs.insert(
        "root_volume".to_string(),
        volume_to_value(&node.spec.root_volume)?,
    );
    let data_volumes = node
        .spec
        .data_volumes
        .iter()
        .map(volume_to_value)
        .collect::<Result<Vec<_>, _>>()?;
    attrs.insert("data_volumes".to_string(), Value::List(data_volumes));

    if let Some(runtime) = &node.spec.runtime {
        attrs.insert("runtime".to_string(), Value::String(runtime.name.clone()));
    }
    if let Some(nic) = &node.spec.nic {
        if let Some(subnet_id) = &nic.primary_nic.subnet_id {
            attrs.insert("subnet_id".to_string(), Value::String(subnet_id.clone()));
        }
    }

    if let Some(status) = &node.status {
        attrs.insert("status".to_string(), Value::String(status.phase.clone()));
        if let Some(private_ip) = &status.private_ip {
            attrs.insert("private_ip".to_string(), Value::String(private_ip.clone()));
        }
    }
    Ok(attrs)
}

/// Remove cloud-managed label keys; unknown kubernetes.io keys are kept but
/// flagged, so a new cloud version extending the set is visible.
fn filter_labels(
    labels: &HashMap<String, String>,
    predefined: &[String],
) -> HashMap<String, String> {
    labels
        .iter()
        .filter(|(key, _)| {
            if predefined.iter().any(|p| p == *key) {
                return false;
            }
            if key.contains("kubernetes.io") {
                log::warn!("keeping unrecognised cloud-looking label key {:?}", key);
            }
            true
        })
        .map(|(k, v)| (k.clone(), v.clone()))
        .collect()
}

fn filter_taints(taints: &[k8s::K8sTaint], predefined: &[String]) -> Vec<k8s::K8sTaint> {
    taints
        .iter()
        .filter(|taint| !predefined.iter().any(|p| p == &taint.key))
        .cloned()
        .collect()
}

/// What a `bandwidth_size` change needs from the EIP service
#[derive(Debug, PartialEq)]
enum FloatingIpStep {
    /// Disassociate the bound address, then delete the allocation
    Release { eip_id: String },
    Resize { bandwidth_id: String, size: i64 },
    Allocate { size: i64 },
    Keep,
}

fn floating_ip_step(
    bound: Option<api::eip::PublicIp>,
    new_size: i64,
) -> ProviderResult<FloatingIpStep> {
    match (bound, new_size) {
        (Some(ip), 0) => Ok(FloatingIpStep::Release { eip_id: ip.id }),
        (Some(ip), size) => {
            let bandwidth_id = ip.bandwidth_id.ok_or_else(|| {
                ProviderError::new(format!("floating IP {} has no bandwidth object", ip.id))
            })?;
            Ok(FloatingIpStep::Resize { bandwidth_id, size })
        }
        (None, 0) => Ok(FloatingIpStep::Keep),
        (None, size) => Ok(FloatingIpStep::Allocate { size }),
    }
}

/// Tags to add and remove to take `old` to `new`; a changed value is a
/// remove-then-add.
fn diff_tags(
    old: &HashMap<String, String>,
    new: &HashMap<String, String>,
) -> (Vec<ServerTag>, Vec<ServerTag>) {
    let mut add: Vec<ServerTag> = new
        .iter()
        .filter(|(k, v)| old.get(*k) != Some(*v))
        .map(|(k, v)| ServerTag {
            key: k.clone(),
            value: v.clone(),
        })
        .collect();
    let mut remove: Vec<ServerTag> = old
        .iter()
        .filter(|(k, v)| new.get(*k) != Some(*v))
        .map(|(k, v)| ServerTag {
            key: k.clone(),
            value: v.clone(),
        })
        .collect();
    add.sort_by(|a, b| a.key.cmp(&b.key));
    remove.sort_by(|a, b| a.key.cmp(&b.key));
    (add, remove)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn volume_value(size: i64) -> Value {
        Value::Map(HashMap::from([
            ("size".to_string(), Value::Int(size)),
            ("volumetype".to_string(), Value::String("SSD".to_string())),
        ]))
    }

    fn declared() -> Resource {
        Resource::new("cce_node", "worker")
            .with_attribute("cluster_id", Value::String("c-1".to_string()))
            .with_attribute("name", Value::String("worker-0".to_string()))
            .with_attribute("flavor", Value::String("s3.large.2".to_string()))
            .with_attribute("availability_zone", Value::String("eu-de-01".to_string()))
            .with_attribute("key_pair", Value::String("ssh-k1".to_string()))
            .with_attribute("root_volume", volume_value(40))
            .with_attribute("data_volumes", Value::List(vec![volume_value(100)]))
    }

    #[test]
    fn create_request_uses_key_pair_login() {
        let request = build_create_request(&declared()).unwrap();
        assert_eq!(request.spec.login.ssh_key.as_deref(), Some("ssh-k1"));
        assert!(request.spec.login.user_password.is_none());
        assert_eq!(request.spec.count, Some(1));
        assert_eq!(request.spec.data_volumes[0].size, 100);
    }

    #[test]
    fn password_login_targets_root() {
        let mut resource = declared();
        resource.attributes.remove("key_pair");
        let resource = resource.with_attribute("password", Value::String("hunter2".to_string()));
        let request = build_create_request(&resource).unwrap();
        let password = request.spec.login.user_password.unwrap();
        assert_eq!(password.username, "root");
    }

    #[test]
    fn missing_data_volumes_are_rejected() {
        let mut resource = declared();
        resource.attributes.remove("data_volumes");
        let err = build_create_request(&resource).unwrap_err();
        assert!(err.message.contains("data volume"));
    }

    #[test]
    fn bandwidth_without_count_implies_one_address() {
        let resource = declared().with_attribute("bandwidth_size", Value::Int(5));
        let request = build_create_request(&resource).unwrap();
        let public_ip = request.spec.public_ip.unwrap();
        assert_eq!(public_ip.count, Some(1));
        let eip = public_ip.eip.unwrap();
        assert_eq!(eip.iptype, "5_bgp");
        assert_eq!(eip.bandwidth.size, 5);
        assert_eq!(eip.bandwidth.share_type, "PER");
        assert_eq!(eip.bandwidth.charge_mode, "traffic");
    }

    #[test]
    fn eip_ids_take_precedence_over_inline_recipe() {
        let resource = declared().with_attribute(
            "eip_ids",
            Value::List(vec![Value::String("eip-1".to_string())]),
        );
        let request = build_create_request(&resource).unwrap();
        let public_ip = request.spec.public_ip.unwrap();
        assert_eq!(public_ip.ids, Some(vec!["eip-1".to_string()]));
        assert!(public_ip.eip.is_none());
    }

    #[test]
    fn no_eip_fields_mean_no_public_ip_block() {
        let request = build_create_request(&declared()).unwrap();
        assert!(request.spec.public_ip.is_none());
    }

    #[test]
    fn scripts_are_base64_encoded_into_extend_params() {
        let resource = declared()
            .with_attribute("preinstall", Value::String("#!/bin/sh\necho pre".to_string()));
        let request = build_create_request(&resource).unwrap();
        let encoded = request.spec.extend_params[PRE_INSTALL_KEY].as_str().unwrap();
        assert_eq!(BASE64.decode(encoded).unwrap(), b"#!/bin/sh\necho pre");
        assert!(!request.spec.extend_params.contains_key(POST_INSTALL_KEY));
    }

    #[test]
    fn sizing_and_agency_reach_extend_params() {
        let lvm = "dockerThinpool=vgpaas/90%VG;kubernetesLV=vgpaas/10%VG";
        let resource = declared()
            .with_attribute("max_pods", Value::Int(110))
            .with_attribute("agency_name", Value::String("cce-admin".to_string()))
            .with_attribute("docker_base_size", Value::Int(20))
            .with_attribute("docker_lvm_config_override", Value::String(lvm.to_string()));
        let request = build_create_request(&resource).unwrap();
        let params = &request.spec.extend_params;
        assert_eq!(params["maxPods"], serde_json::Value::from(110i64));
        assert_eq!(params["agency_name"], serde_json::Value::from("cce-admin"));
        assert_eq!(params["dockerBaseSize"], serde_json::Value::from(20i64));
        assert_eq!(params["DockerLVMConfigOverride"], serde_json::Value::from(lvm));
    }

    #[test]
    fn bandwidth_zero_releases_and_deletes_the_address() {
        let bound = api::eip::PublicIp {
            id: "eip-1".to_string(),
            bandwidth_id: Some("bw-1".to_string()),
            ..Default::default()
        };
        assert_eq!(
            floating_ip_step(Some(bound), 0).unwrap(),
            FloatingIpStep::Release {
                eip_id: "eip-1".to_string()
            }
        );
    }

    #[test]
    fn bandwidth_change_resizes_through_the_bandwidth_object() {
        let bound = api::eip::PublicIp {
            id: "eip-1".to_string(),
            bandwidth_id: Some("bw-1".to_string()),
            ..Default::default()
        };
        assert_eq!(
            floating_ip_step(Some(bound), 10).unwrap(),
            FloatingIpStep::Resize {
                bandwidth_id: "bw-1".to_string(),
                size: 10
            }
        );

        let bare = api::eip::PublicIp {
            id: "eip-1".to_string(),
            ..Default::default()
        };
        assert!(floating_ip_step(Some(bare), 10).is_err());
        assert_eq!(floating_ip_step(None, 0).unwrap(), FloatingIpStep::Keep);
        assert_eq!(
            floating_ip_step(None, 5).unwrap(),
            FloatingIpStep::Allocate { size: 5 }
        );
    }

    #[test]
    fn predefined_labels_are_stripped() {
        let labels = HashMap::from([
            ("kubernetes.io/hostname".to_string(), "n1".to_string()),
            ("team".to_string(), "a".to_string()),
        ]);
        let kept = filter_labels(&labels, &["kubernetes.io/hostname".to_string()]);
        assert_eq!(kept.len(), 1);
        assert_eq!(kept.get("team").map(String::as_str), Some("a"));
    }

    #[test]
    fn predefined_taints_are_stripped() {
        let taints = vec![
            k8s::K8sTaint {
                key: "node.kubernetes.io/unreachable".to_string(),
                value: None,
                effect: "NoSchedule".to_string(),
            },
            k8s::K8sTaint {
                key: "dedicated".to_string(),
                value: Some("gpu".to_string()),
                effect: "NoSchedule".to_string(),
            },
        ];
        let kept = filter_taints(&taints, &["node.kubernetes.io/unreachable".to_string()]);
        assert_eq!(kept.len(), 1);
        assert_eq!(kept[0].key, "dedicated");
    }

    #[test]
    fn tag_diff_removes_changed_values_before_adding() {
        let old = HashMap::from([
            ("team".to_string(), "a".to_string()),
            ("stale".to_string(), "1".to_string()),
        ]);
        let new = HashMap::from([
            ("team".to_string(), "b".to_string()),
            ("fresh".to_string(), "1".to_string()),
        ]);
        let (add, remove) = diff_tags(&old, &new);
        assert_eq!(
            add,
            vec![
                ServerTag { key: "fresh".to_string(), value: "1".to_string() },
                ServerTag { key: "team".to_string(), value: "b".to_string() },
            ]
        );
        assert_eq!(
            remove,
            vec![
                ServerTag { key: "stale".to_string(), value: "1".to_string() },
                ServerTag { key: "team".to_string(), value: "a".to_string() },
            ]
        );
    }

    #[test]
    fn state_attributes_carry_volumes_and_status() {
        let node: Node = serde_json::from_value(serde_json::json!({
            "metadata": { "name": "worker-0", "uid": "n-1" },
            "spec": {
                "flavor": "s3.large.2",
                "az": "eu-de-01",
                "login": { "sshKey": "ssh-k1" },
                "rootVolume": { "size": 40, "volumetype": "SATA" },
                "dataVolumes": [ { "size": 100, "volumetype": "SSD" } ],
                "runtime": { "name": "containerd" }
            },
            "status": {
                "phase": "Active",
                "serverId": "srv-1",
                "privateIP": "192.168.0.4"
            }
        }))
        .unwrap();

        let attrs = state_attributes("c-1", &node).unwrap();
        assert_eq!(attrs["status"], Value::String("Active".to_string()));
        assert_eq!(attrs["key_pair"], Value::String("ssh-k1".to_string()));
        assert_eq!(attrs["runtime"], Value::String("containerd".to_string()));
        assert_eq!(attrs["private_ip"], Value::String("192.168.0.4".to_string()));
        let root = attrs["root_volume"].as_map().unwrap();
        assert_eq!(root["size"], Value::Int(40));
    }
}
