//! Cloud configuration and per-service endpoint derivation
//!
//! The provider talks to several services of the same cloud (CCE, ECS, VPC,
//! EIP). Each service is reachable under its own hostname within the region;
//! this module knows how to derive those endpoints from one configuration.

/// A cloud service the provider opens a client against
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Service {
    /// CCE v3: clusters, nodes, node pools, jobs, certificates
    CceV3,
    /// CCE v3 add-on API (rooted above the project path)
    CceAddonV3,
    /// CCE v1: kubernetes node objects, addressed by private IP
    CceV1,
    /// ECS: servers and server tags
    Ecs,
    /// VPC: vpcs and subnets (plan-time existence checks)
    Vpc,
    /// EIP: floating IPs and bandwidths
    Eip,
}

/// Configuration for one provider instance
///
/// The predefined label/taint keys are the keys the cloud manages on every
/// kubernetes node; they are data here, not compiled-in constants, so new
/// cloud versions can extend them without a rebuild.
#[derive(Debug, Clone)]
pub struct CloudConfig {
    /// Region identifier (e.g., "eu-de")
    pub region: String,
    /// Cloud DNS suffix (e.g., "cloud.example.com")
    pub domain: String,
    /// Project (tenant) identifier
    pub project_id: String,
    /// Authentication token sent as X-Auth-Token
    pub token: String,
    /// Label keys the cloud injects on kubernetes nodes, skipped on read
    pub predefined_label_keys: Vec<String>,
    /// Taint keys the cloud injects on kubernetes nodes, skipped on read
    pub predefined_taint_keys: Vec<String>,
}

impl CloudConfig {
    pub fn new(
        region: impl Into<String>,
        domain: impl Into<String>,
        project_id: impl Into<String>,
        token: impl Into<String>,
    ) -> Self {
        Self {
            region: region.into(),
            domain: domain.into(),
            project_id: project_id.into(),
            token: token.into(),
            predefined_label_keys: default_label_keys(),
            predefined_taint_keys: default_taint_keys(),
        }
    }

    /// Base URL for a service, project-scoped where the service requires it
    pub fn endpoint(&self, service: Service) -> String {
        match service {
            Service::CceV3 => format!(
                "https://cce.{}.{}/api/v3/projects/{}",
                self.region, self.domain, self.project_id
            ),
            Service::CceAddonV3 => {
                format!("https://cce.{}.{}/api/v3", self.region, self.domain)
            }
            Service::CceV1 => {
                format!("https://cce.{}.{}/api/v1", self.region, self.domain)
            }
            Service::Ecs => format!(
                "https://ecs.{}.{}/v1/{}",
                self.region, self.domain, self.project_id
            ),
            Service::Vpc => format!(
                "https://vpc.{}.{}/v1/{}",
                self.region, self.domain, self.project_id
            ),
            Service::Eip => format!(
                "https://vpc.{}.{}/v1/{}",
                self.region, self.domain, self.project_id
            ),
        }
    }
}

/// Label keys the cloud stamps on every kubernetes node
fn default_label_keys() -> Vec<String> {
    [
        "beta.kubernetes.io/arch",
        "beta.kubernetes.io/os",
        "failure-domain.beta.kubernetes.io/region",
        "failure-domain.beta.kubernetes.io/zone",
        "kubernetes.io/arch",
        "kubernetes.io/hostname",
        "kubernetes.io/os",
        "topology.kubernetes.io/region",
        "topology.kubernetes.io/zone",
        "node.kubernetes.io/baremetal",
        "os.architecture",
        "os.name",
        "os.version",
    ]
    .iter()
    .map(|s| s.to_string())
    .collect()
}

/// Taint keys the cloud stamps on unready or shut-down nodes
fn default_taint_keys() -> Vec<String> {
    [
        "node.kubernetes.io/unreachable",
        "node.cloudprovider.kubernetes.io/shutdown",
    ]
    .iter()
    .map(|s| s.to_string())
    .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config() -> CloudConfig {
        CloudConfig::new("eu-de", "cloud.example.com", "p-123", "tok")
    }

    #[test]
    fn cce_v3_endpoint_is_project_scoped() {
        assert_eq!(
            config().endpoint(Service::CceV3),
            "https://cce.eu-de.cloud.example.com/api/v3/projects/p-123"
        );
    }

    #[test]
    fn addon_endpoint_is_not_project_scoped() {
        assert_eq!(
            config().endpoint(Service::CceAddonV3),
            "https://cce.eu-de.cloud.example.com/api/v3"
        );
    }

    #[test]
    fn v1_endpoint_shares_the_cce_hostname() {
        assert_eq!(
            config().endpoint(Service::CceV1),
            "https://cce.eu-de.cloud.example.com/api/v1"
        );
    }

    #[test]
    fn eip_service_lives_under_vpc_hostname() {
        assert_eq!(
            config().endpoint(Service::Eip),
            "https://vpc.eu-de.cloud.example.com/v1/p-123"
        );
    }

    #[test]
    fn default_skip_lists_cover_the_wellknown_keys() {
        let cfg = config();
        assert!(
            cfg.predefined_label_keys
                .iter()
                .any(|k| k == "kubernetes.io/hostname")
        );
        assert!(
            cfg.predefined_taint_keys
                .iter()
                .any(|k| k == "node.kubernetes.io/unreachable")
        );
    }
}
