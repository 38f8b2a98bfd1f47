//! Add-on controller
//!
//! Add-on instances are immutable once installed; every input change is a
//! delete-and-recreate. The add-on API lives on its own service endpoint
//! and scopes requests by a `cluster_id` query parameter.

use std::collections::HashMap;
use std::sync::Arc;

use vela_core::provider::{OperationTimeouts, ProviderError, ProviderResult};
use vela_core::resource::{Resource, ResourceId, State, Value};

use crate::api::addon::{Addon, AddonSpec, AddonValues};
use crate::api::{self, Metadata};
use crate::attrs::{merge_declared, string_map};
use crate::client::ClientFactory;
use crate::coerce::coerce_map;
use crate::config::Service;
use crate::gate;
use crate::wait::{DELETED, WaitConfig, deleted_on_404, wait_for_phase};
use crate::wrap;

/// `abnormal` is legal on both ends: transient while the cluster is still
/// converging, terminal when the install settles there. The waiter checks
/// targets first, so a refresh observing it stops the wait.
const INSTALL_PENDING: [&str; 2] = ["installing", "abnormal"];
const INSTALL_TARGET: [&str; 3] = ["running", "available", "abnormal"];

pub struct AddonController<'a> {
    factory: &'a ClientFactory,
    timeouts: OperationTimeouts,
}

impl<'a> AddonController<'a> {
    pub fn new(factory: &'a ClientFactory, timeouts: OperationTimeouts) -> Self {
        Self { factory, timeouts }
    }

    pub async fn create(&self, resource: &Resource) -> ProviderResult<State> {
        let cluster_id = resource
            .attr_str("cluster_id")
            .ok_or_else(|| ProviderError::new("cluster_id is required"))?
            .to_string();
        let request = build_install_request(resource)?;

        let addons = self.factory.service(Service::CceAddonV3);
        let created = gate::gated_call(
            || self.cluster_ready(&cluster_id),
            || {
                let addons = Arc::clone(&addons);
                let request = request.clone();
                async move { api::addon::create(&addons, &request).await }
            },
        )
        .await;

        let created = match created {
            Ok(addon) => addon,
            Err(e) => return Err(self.describe_install_failure(resource, e).await),
        };

        let addon_id = created
            .metadata
            .uid
            .clone()
            .ok_or_else(|| ProviderError::new("install response carried no add-on id"))?;

        self.wait_installed(&cluster_id, &addon_id).await?;

        let mut state = self.read_existing(&resource.id, &cluster_id, &addon_id).await?;
        merge_declared(&mut state, resource);
        Ok(state)
    }

    pub async fn read(
        &self,
        id: &ResourceId,
        cluster_id: &str,
        addon_id: &str,
    ) -> ProviderResult<State> {
        let addons = self.factory.service(Service::CceAddonV3);
        let addon = match api::addon::get(&addons, cluster_id, addon_id).await {
            Ok(addon) => addon,
            Err(e) if e.is_not_found() => return Ok(State::not_found(id.clone())),
            Err(e) => return Err(wrap("fetching add-on", e)),
        };

        let attrs = state_attributes(cluster_id, &addon);
        Ok(State::existing(id.clone(), attrs)
            .with_identifier(format!("{}/{}", cluster_id, addon_id)))
    }

    /// Every input forces recreation, so an in-place update is a planning bug.
    pub async fn update(&self, id: &ResourceId) -> ProviderResult<State> {
        Err(ProviderError::new(
            "add-on instances are immutable; changes require delete and recreate",
        )
        .for_resource(id.clone()))
    }

    pub async fn delete(&self, cluster_id: &str, addon_id: &str) -> ProviderResult<()> {
        let addons = self.factory.service(Service::CceAddonV3);
        match api::addon::delete(&addons, cluster_id, addon_id).await {
            Ok(()) => {}
            Err(e) if e.is_not_found() => return Ok(()),
            Err(e) => return Err(wrap("deleting add-on", e)),
        }

        let cluster_id = cluster_id.to_string();
        let addon_id = addon_id.to_string();
        wait_for_phase(
            || {
                let addons = Arc::clone(&addons);
                let cluster_id = cluster_id.clone();
                let addon_id = addon_id.clone();
                async move {
                    deleted_on_404(
                        api::addon::get(&addons, &cluster_id, &addon_id)
                            .await
                            .map(|addon| {
                                let status = addon
                                    .status
                                    .as_ref()
                                    .map(|s| s.status.clone())
                                    .unwrap_or_default();
                                ((), status)
                            }),
                    )
                }
            },
            &["deleting", "running", "available", "abnormal"],
            &[DELETED],
            WaitConfig::with_timeout(self.timeouts.delete),
        )
        .await
        .map_err(|e| wrap("waiting for add-on removal", e))?;
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

    async fn wait_installed(&self, cluster_id: &str, addon_id: &str) -> ProviderResult<()> {
        let addons = self.factory.service(Service::CceAddonV3);
        let cluster_id = cluster_id.to_string();
        let addon_id = addon_id.to_string();
        wait_for_phase(
            || {
                let addons = Arc::clone(&addons);
                let cluster_id = cluster_id.clone();
                let addon_id = addon_id.clone();
                async move {
                    let addon = api::addon::get(&addons, &cluster_id, &addon_id).await?;
                    let status = addon
                        .status
                        .as_ref()
                        .map(|s| s.status.clone())
                        .unwrap_or_default();
                    Ok(((), status))
                }
            },
            &INSTALL_PENDING,
            &INSTALL_TARGET,
            WaitConfig::with_timeout(self.timeouts.create),
        )
        .await
        .map_err(|e| wrap("waiting for add-on install", e))?;
        Ok(())
    }

    /// Rejected installs usually mean a template-version mismatch; attach the
    /// catalogue entry for the template so the error is actionable.
    async fn describe_install_failure(
        &self,
        resource: &Resource,
        cause: gate::GateError,
    ) -> ProviderError {
        let template_name = resource.attr_str("template_name");
        let base = ProviderError::new("installing add-on failed").with_cause(cause);

        let addons = self.factory.service(Service::CceAddonV3);
        match api::addon::templates(&addons, template_name).await {
            Ok(catalogue) if !catalogue.items.is_empty() => {
                let versions: Vec<String> = catalogue
                    .items
                    .iter()
                    .filter_map(|t| t["spec"]["versions"].as_array())
                    .flatten()
                    .filter_map(|v| v["version"].as_str().map(|s| s.to_string()))
                    .collect();
                ProviderError::new(format!(
                    "{}; template {} offers versions [{}]",
                    base.message,
                    template_name.unwrap_or("<unknown>"),
                    versions.join(", ")
                ))
            }
            _ => base,
        }
    }

    async fn read_existing(
        &self,
        id: &ResourceId,
        cluster_id: &str,
        addon_id: &str,
    ) -> ProviderResult<State> {
        let state = self.read(id, cluster_id, addon_id).await?;
        if !state.exists {
            return Err(ProviderError::new(format!(
                "add-on {} disappeared after the operation completed",
                addon_id
            )));
        }
        Ok(state)
    }
}

fn build_install_request(resource: &Resource) -> ProviderResult<Addon> {
    let attrs = &resource.attributes;
    let cluster_id = resource
        .attr_str("cluster_id")
        .ok_or_else(|| ProviderError::new("cluster_id is required"))?;
    let template_name = resource
        .attr_str("template_name")
        .ok_or_else(|| ProviderError::new("template_name is required"))?;
    let template_version = resource
        .attr_str("template_version")
        .ok_or_else(|| ProviderError::new("template_version is required"))?;

    let flavor = match resource.attr_str("flavor") {
        Some(raw) => Some(serde_json::from_str(raw).map_err(|e| {
            ProviderError::new(format!("flavor is not valid JSON: {}", e))
        })?),
        None => None,
    };

    Ok(Addon {
        kind: "Addon".to_string(),
        api_version: "v3".to_string(),
        metadata: Metadata::named(template_name),
        spec: AddonSpec {
            cluster_id: cluster_id.to_string(),
            version: template_version.to_string(),
            template_name: template_name.to_string(),
            values: AddonValues {
                basic: coerce_map(&string_map(attrs.get("values_basic"))),
                custom: coerce_map(&string_map(attrs.get("values_custom"))),
                flavor,
            },
        },
        status: None,
    })
}

fn state_attributes(cluster_id: &str, addon: &Addon) -> HashMap<String, Value> {
    let mut attrs = HashMap::new();
    attrs.insert(
        "cluster_id".to_string(),
        Value::String(cluster_id.to_string()),
    );
    attrs.insert(
        "template_name".to_string(),
        Value::String(addon.spec.template_name.clone()),
    );
    attrs.insert(
        "template_version".to_string(),
        Value::String(addon.spec.version.clone()),
    );
    if let Some(status) = &addon.status {
        attrs.insert("status".to_string(), Value::String(status.status.clone()));
        if let Some(message) = &status.message {
            attrs.insert("description".to_string(), Value::String(message.clone()));
        }
    }
    attrs
}
