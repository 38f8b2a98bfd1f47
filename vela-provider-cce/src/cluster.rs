//! Cluster controller
//!
//! Drives a cluster through its create/read/update/delete lifecycle:
//! pre-create floating-IP validation, the `Creating -> Available` wait, the
//! default-add-on settle (wait for them to appear, then optionally reap),
//! description and master-EIP updates, and the tolerant delete wait.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use base64::Engine as _;
use base64::engine::general_purpose::STANDARD as BASE64;

use vela_core::provider::{OperationTimeouts, ProviderError, ProviderResult};
use vela_core::resource::{Resource, ResourceId, State, Value};

use crate::api::cluster::{
    Authentication, AuthenticatingProxy, CertificateBundle, Cluster, ClusterSpec,
    ContainerNetwork, Endpoints, HostNetwork,
};
use crate::api::{self, Metadata};
use crate::attrs::{merge_declared, string_map};
use crate::client::ClientFactory;
use crate::config::Service;
use crate::wait::{DELETED, WaitConfig, WaitError, wait_for_phase};
use crate::wrap;

/// Synthetic phases for the default-add-on settle wait
const ADDONS_MISSING: &str = "Missing";
const ADDONS_PRESENT: &str = "Present";

pub struct ClusterController<'a> {
    factory: &'a ClientFactory,
    timeouts: OperationTimeouts,
}

impl<'a> ClusterController<'a> {
    pub fn new(factory: &'a ClientFactory, timeouts: OperationTimeouts) -> Self {
        Self { factory, timeouts }
    }

    pub async fn create(&self, resource: &Resource) -> ProviderResult<State> {
        let cce = self.factory.service(Service::CceV3);

        // A requested floating IP must already be allocated in the project.
        let eip_address = resource.attr_str("eip").filter(|s| !s.is_empty());
        let eip = match eip_address {
            Some(address) => {
                let eip_client = self.factory.service(Service::Eip);
                let found = api::eip::find_by_address(&eip_client, address)
                    .await
                    .map_err(|e| wrap("listing floating IPs", e))?;
                Some(found.ok_or_else(|| {
                    ProviderError::new(format!(
                        "floating IP {} is not allocated in this project",
                        address
                    ))
                })?)
            }
            None => None,
        };

        let request = build_create_request(resource)?;
        let created = api::cluster::create(&cce, &request).await.map_err(|e| {
            if e.is_auth_pending() {
                ProviderError::new(
                    "the CCE service is not authorised in this project; \
                     grant it access in the cloud console and retry",
                )
                .with_cause(e)
            } else {
                wrap("creating cluster", e)
            }
        })?;
        let cluster_id = created
            .metadata
            .uid
            .clone()
            .ok_or_else(|| ProviderError::new("create response carried no cluster id"))?;

        self.wait_phase(
            &cluster_id,
            &["Creating"],
            &["Available"],
            self.timeouts.create,
        )
        .await
        .map_err(|e| wrap("waiting for cluster to become Available", e))?;

        if let Some(eip) = &eip {
            api::cluster::master_eip(&cce, &cluster_id, "bind", Some(&eip.id))
                .await
                .map_err(|e| wrap("binding master floating IP", e))?;
        }

        let reap = resource.attr_bool("no_addons").unwrap_or(false);
        self.settle_default_addons(&cluster_id, reap).await?;

        let mut state = self.read_existing(&resource.id, &cluster_id).await?;
        merge_declared(&mut state, resource);
        Ok(state)
    }

    pub async fn read(&self, id: &ResourceId, cluster_id: &str) -> ProviderResult<State> {
        let cce = self.factory.service(Service::CceV3);
        let cluster = match api::cluster::get(&cce, cluster_id).await {
            Ok(cluster) => cluster,
            Err(e) if e.is_not_found() => return Ok(State::not_found(id.clone())),
            Err(e) => return Err(wrap("fetching cluster", e)),
        };

        // Certificates are unavailable for some authentication modes; treat
        // that as an empty bundle rather than a failed read.
        let certificates = match api::cluster::certificates(&cce, cluster_id).await {
            Ok(bundle) => Some(bundle),
            Err(e) => {
                log::warn!("cluster {} certificates not readable: {}", cluster_id, e);
                None
            }
        };

        let addon_client = self.factory.service(Service::CceAddonV3);
        let installed = match api::addon::list(&addon_client, cluster_id).await {
            Ok(list) => list
                .items
                .iter()
                .map(|a| a.spec.template_name.clone())
                .collect(),
            Err(e) => {
                log::warn!("cluster {} add-ons not listable: {}", cluster_id, e);
                Vec::new()
            }
        };

        let attributes = state_attributes(&cluster, certificates.as_ref(), &installed);
        Ok(State::existing(id.clone(), attributes).with_identifier(cluster_id))
    }

    pub async fn update(
        &self,
        id: &ResourceId,
        cluster_id: &str,
        from: &State,
        to: &Resource,
    ) -> ProviderResult<State> {
        let cce = self.factory.service(Service::CceV3);

        let old_description = from
            .attributes
            .get("description")
            .and_then(Value::as_str)
            .unwrap_or_default();
        let new_description = to.attr_str("description").unwrap_or_default();
        if old_description != new_description {
            api::cluster::update_description(&cce, cluster_id, new_description)
                .await
                .map_err(|e| wrap("updating cluster description", e))?;
        }

        let old_eip = from
            .attributes
            .get("eip")
            .and_then(Value::as_str)
            .unwrap_or_default();
        let new_eip = to.attr_str("eip").unwrap_or_default();
        if old_eip != new_eip {
            if !old_eip.is_empty() {
                api::cluster::master_eip(&cce, cluster_id, "unbind", None)
                    .await
                    .map_err(|e| wrap("unbinding master floating IP", e))?;
            }
            if !new_eip.is_empty() {
                let eip_client = self.factory.service(Service::Eip);
                let found = api::eip::find_by_address(&eip_client, new_eip)
                    .await
                    .map_err(|e| wrap("listing floating IPs", e))?
                    .ok_or_else(|| {
                        ProviderError::new(format!(
                            "floating IP {} is not allocated in this project",
                            new_eip
                        ))
                    })?;
                api::cluster::master_eip(&cce, cluster_id, "bind", Some(&found.id))
                    .await
                    .map_err(|e| wrap("binding master floating IP", e))?;
            }
        }

        let mut state = self.read_existing(id, cluster_id).await?;
        merge_declared(&mut state, to);
        Ok(state)
    }

    pub async fn delete(&self, cluster_id: &str) -> ProviderResult<()> {
        let cce = self.factory.service(Service::CceV3);
        match api::cluster::delete(&cce, cluster_id).await {
            Ok(()) => {}
            Err(e) if e.is_not_found() => return Ok(()),
            Err(e) => return Err(wrap("deleting cluster", e)),
        }

        // Deletion may briefly report Available again, and Unavailable while
        // the control plane is torn down.
        self.wait_phase(
            cluster_id,
            &["Deleting", "Available", "Unavailable"],
            &[DELETED],
            self.timeouts.delete,
        )
        .await
        .map_err(|e| wrap("waiting for cluster deletion", e))?;
        Ok(())
    }

    /// Plan-time check: the VPC and subnet must exist before anything is sent
    pub async fn plan_check(&self, resource: &Resource) -> ProviderResult<()> {
        let vpc_client = self.factory.service(Service::Vpc);
        if let Some(vpc_id) = resource.attr_str("vpc_id") {
            match api::vpc::get_vpc(&vpc_client, vpc_id).await {
                Ok(_) => {}
                Err(e) if e.is_not_found() => {
                    return Err(ProviderError::new(format!("vpc {} does not exist", vpc_id)));
                }
                Err(e) => return Err(wrap("fetching vpc", e)),
            }
        }
        if let Some(subnet_id) = resource.attr_str("subnet_id") {
            match api::vpc::get_subnet(&vpc_client, subnet_id).await {
                Ok(_) => {}
                Err(e) if e.is_not_found() => {
                    return Err(ProviderError::new(format!(
                        "subnet {} does not exist",
                        subnet_id
                    )));
                }
                Err(e) => return Err(wrap("fetching subnet", e)),
            }
        }
        Ok(())
    }

    async fn read_existing(&self, id: &ResourceId, cluster_id: &str) -> ProviderResult<State> {
        let state = self.read(id, cluster_id).await?;
        if !state.exists {
            return Err(ProviderError::new(format!(
                "cluster {} disappeared after the operation completed",
                cluster_id
            )));
        }
        Ok(state)
    }

    async fn wait_phase(
        &self,
        cluster_id: &str,
        pending: &[&str],
        target: &[&str],
        timeout: Duration,
    ) -> Result<Cluster, WaitError> {
        let cce = self.factory.service(Service::CceV3);
        wait_for_phase(
            || {
                let cce = Arc::clone(&cce);
                let cluster_id = cluster_id.to_string();
                async move {
                    let result = api::cluster::get(&cce, &cluster_id).await.map(|cluster| {
                        let phase = cluster
                            .status
                            .as_ref()
                            .map(|s| s.phase.clone())
                            .unwrap_or_default();
                        (cluster, phase)
                    });
                    deleted_on_404_cluster(result)
                }
            },
            pending,
            target,
            WaitConfig::with_timeout(timeout),
        )
        .await
    }

    /// The cloud installs default add-ons after create returns `Available`.
    /// Wait for them to appear so a reap is not racy; an appear-timeout is
    /// tolerated because some flavors ship without default add-ons.
    async fn settle_default_addons(&self, cluster_id: &str, reap: bool) -> ProviderResult<()> {
        let client = self.factory.service(Service::CceAddonV3);
        let config = WaitConfig {
            delay: Duration::from_secs(10),
            poll_interval: Duration::from_secs(10),
            timeout: self.timeouts.default_,
        };

        let appeared = wait_for_phase(
            || {
                let client = Arc::clone(&client);
                let cluster_id = cluster_id.to_string();
                async move {
                    let list = api::addon::list(&client, &cluster_id).await?;
                    let phase = if list.items.is_empty() {
                        ADDONS_MISSING
                    } else {
                        ADDONS_PRESENT
                    };
                    Ok((list, phase.to_string()))
                }
            },
            &[ADDONS_MISSING],
            &[ADDONS_PRESENT],
            config,
        )
        .await;

        let present = match appeared {
            Ok(list) => list,
            Err(WaitError::Timeout { .. }) => {
                log::warn!(
                    "no default add-ons appeared on cluster {} within the wait budget",
                    cluster_id
                );
                return Ok(());
            }
            Err(e) => return Err(wrap("waiting for default add-ons", e)),
        };

        if !reap {
            return Ok(());
        }

        for addon in &present.items {
            let Some(uid) = &addon.metadata.uid else {
                continue;
            };
            log::info!(
                "removing default add-on {} from cluster {}",
                addon.spec.template_name,
                cluster_id
            );
            match api::addon::delete(&client, cluster_id, uid).await {
                Ok(()) => {}
                Err(e) if e.is_not_found() => {}
                Err(e) => return Err(wrap("removing default add-on", e)),
            }
        }

        wait_for_phase(
            || {
                let client = Arc::clone(&client);
                let cluster_id = cluster_id.to_string();
                async move {
                    let list = api::addon::list(&client, &cluster_id).await?;
                    let phase = if list.items.is_empty() {
                        ADDONS_MISSING
                    } else {
                        ADDONS_PRESENT
                    };
                    Ok(((), phase.to_string()))
                }
            },
            &[ADDONS_PRESENT],
            &[ADDONS_MISSING],
            config,
        )
        .await
        .map_err(|e| wrap("waiting for default add-ons to be removed", e))?;
        Ok(())
    }
}

fn deleted_on_404_cluster(
    result: Result<(Cluster, String), crate::client::ApiError>,
) -> Result<(Cluster, String), crate::client::ApiError> {
    match result {
        Err(e) if e.is_not_found() => Ok((
            Cluster {
                kind: "Cluster".to_string(),
                api_version: "v3".to_string(),
                metadata: Metadata::default(),
                spec: ClusterSpec::default(),
                status: None,
            },
            DELETED.to_string(),
        )),
        other => other,
    }
}

/// Assemble the create request from the declared attributes
fn build_create_request(resource: &Resource) -> ProviderResult<Cluster> {
    let attrs = &resource.attributes;

    let name = resource
        .attr_str("name")
        .ok_or_else(|| ProviderError::new("name is required"))?;
    let flavor = resource
        .attr_str("flavor")
        .ok_or_else(|| ProviderError::new("flavor is required"))?;
    let vpc_id = resource
        .attr_str("vpc_id")
        .ok_or_else(|| ProviderError::new("vpc_id is required"))?;
    let subnet_id = resource
        .attr_str("subnet_id")
        .ok_or_else(|| ProviderError::new("subnet_id is required"))?;
    let network_mode = resource
        .attr_str("container_network_type")
        .ok_or_else(|| ProviderError::new("container_network_type is required"))?;

    let mut metadata = Metadata::named(name);
    metadata.labels = string_map(attrs.get("labels"));
    metadata.annotations = string_map(attrs.get("annotations"));

    let authentication_mode = resource.attr_str("authentication_mode").unwrap_or("rbac");
    let authentication = Authentication {
        mode: authentication_mode.to_string(),
        authenticating_proxy: resource
            .attr_str("authenticating_proxy_ca")
            .filter(|ca| !ca.is_empty())
            .map(|ca| AuthenticatingProxy {
                ca: BASE64.encode(ca),
            }),
    };

    let mut extend_params = string_map(attrs.get("extend_params"));
    if resource.attr_bool("multi_az").unwrap_or(false) {
        extend_params.insert("clusterAZ".to_string(), "multi_az".to_string());
    }

    Ok(Cluster {
        kind: "Cluster".to_string(),
        api_version: "v3".to_string(),
        metadata,
        spec: ClusterSpec {
            cluster_type: resource
                .attr_str("cluster_type")
                .unwrap_or("VirtualMachine")
                .to_string(),
            flavor: flavor.to_string(),
            version: resource.attr_str("cluster_version").map(|s| s.to_string()),
            description: resource.attr_str("description").map(|s| s.to_string()),
            host_network: HostNetwork {
                vpc: vpc_id.to_string(),
                subnet: subnet_id.to_string(),
                highway_subnet: resource
                    .attr_str("highway_subnet_id")
                    .map(|s| s.to_string()),
            },
            container_network: ContainerNetwork {
                mode: network_mode.to_string(),
                cidr: resource
                    .attr_str("container_network_cidr")
                    .map(|s| s.to_string()),
            },
            authentication: Some(authentication),
            kubernetes_svc_ip_range: resource
                .attr_str("service_network_cidr")
                .map(|s| s.to_string()),
            billing_mode: resource.attr_int("billing_mode").unwrap_or(0),
            extend_params,
        },
        status: None,
    })
}

/// The hostname of the external endpoint URL is the bound floating IP
fn external_ip(endpoints: Option<&Endpoints>) -> Option<String> {
    let external = endpoints?.external.as_deref()?;
    let parsed = url::Url::parse(external).ok()?;
    parsed.host_str().map(|h| h.to_string())
}

/// Map the remote cluster back onto schema attributes
fn state_attributes(
    cluster: &Cluster,
    certificates: Option<&CertificateBundle>,
    installed_addons: &[String],
) -> HashMap<String, Value> {
    let mut attrs = HashMap::new();
    attrs.insert(
        "name".to_string(),
        Value::String(cluster.metadata.name.clone()),
    );
    attrs.insert(
        "flavor".to_string(),
        Value::String(cluster.spec.flavor.clone()),
    );
    attrs.insert(
        "cluster_type".to_string(),
        Value::String(cluster.spec.cluster_type.clone()),
    );
    if let Some(version) = &cluster.spec.version {
        attrs.insert(
            "cluster_version".to_string(),
            Value::String(version.clone()),
        );
    }
    if let Some(description) = &cluster.spec.description {
        attrs.insert(
            "description".to_string(),
            Value::String(description.clone()),
        );
    }
    attrs.insert(
        "vpc_id".to_string(),
        Value::String(cluster.spec.host_network.vpc.clone()),
    );
    attrs.insert(
        "subnet_id".to_string(),
        Value::String(cluster.spec.host_network.subnet.clone()),
    );
    if let Some(highway) = &cluster.spec.host_network.highway_subnet {
        attrs.insert(
            "highway_subnet_id".to_string(),
            Value::String(highway.clone()),
        );
    }
    attrs.insert(
        "container_network_type".to_string(),
        Value::String(cluster.spec.container_network.mode.clone()),
    );
    if let Some(cidr) = &cluster.spec.container_network.cidr {
        attrs.insert(
            "container_network_cidr".to_string(),
            Value::String(cidr.clone()),
        );
    }
    if let Some(range) = &cluster.spec.kubernetes_svc_ip_range {
        attrs.insert(
            "service_network_cidr".to_string(),
            Value::String(range.clone()),
        );
    }
    if let Some(authentication) = &cluster.spec.authentication {
        attrs.insert(
            "authentication_mode".to_string(),
            Value::String(authentication.mode.clone()),
        );
    }
    attrs.insert(
        "billing_mode".to_string(),
        Value::Int(cluster.spec.billing_mode),
    );

    if let Some(status) = &cluster.status {
        attrs.insert("status".to_string(), Value::String(status.phase.clone()));
        if let Some(endpoints) = &status.endpoints {
            if let Some(internal) = &endpoints.internal {
                attrs.insert(
                    "internal_endpoint".to_string(),
                    Value::String(internal.clone()),
                );
            }
            if let Some(external) = &endpoints.external {
                attrs.insert(
                    "external_endpoint".to_string(),
                    Value::String(external.clone()),
                );
            }
        }
        attrs.insert(
            "eip".to_string(),
            Value::String(external_ip(status.endpoints.as_ref()).unwrap_or_default()),
        );
    }

    attrs.insert(
        "installed_addons".to_string(),
        Value::List(
            installed_addons
                .iter()
                .map(|name| Value::String(name.clone()))
                .collect(),
        ),
    );

    if let Some(bundle) = certificates {
        attrs.insert(
            "certificate_clusters".to_string(),
            Value::List(
                bundle
                    .clusters
                    .iter()
                    .map(|c| {
                        Value::Map(HashMap::from([
                            ("name".to_string(), Value::String(c.name.clone())),
                            (
                                "server".to_string(),
                                Value::String(c.cluster.server.clone()),
                            ),
                            (
                                "certificate_authority_data".to_string(),
                                Value::String(c.cluster.certificate_authority_data.clone()),
                            ),
                        ]))
                    })
                    .collect(),
            ),
        );
        attrs.insert(
            "certificate_users".to_string(),
            Value::List(
                bundle
                    .users
                    .iter()
                    .map(|u| {
                        Value::Map(HashMap::from([
                            ("name".to_string(), Value::String(u.name.clone())),
                            (
                                "client_certificate_data".to_string(),
                                Value::String(u.user.client_certificate_data.clone()),
                            ),
                            (
                                "client_key_data".to_string(),
                                Value::String(u.user.client_key_data.clone()),
                            ),
                        ]))
                    })
                    .collect(),
            ),
        );
    }

    attrs
}
