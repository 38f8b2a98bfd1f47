//! VPCs and subnets (plan-time existence checks)

use serde::Deserialize;

use crate::client::{ApiResult, ServiceClient};

#[derive(Debug, Clone, Default, Deserialize)]
pub struct Vpc {
    #[serde(default)]
    pub id: String,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub cidr: String,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct Subnet {
    #[serde(default)]
    pub id: String,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub vpc_id: String,
}

#[derive(Debug, Clone, Default, Deserialize)]
struct VpcEnvelope {
    #[serde(default)]
    vpc: Vpc,
}

#[derive(Debug, Clone, Default, Deserialize)]
struct SubnetEnvelope {
    #[serde(default)]
    subnet: Subnet,
}

pub async fn get_vpc(client: &ServiceClient, vpc_id: &str) -> ApiResult<Vpc> {
    let envelope: VpcEnvelope = client.get(&format!("vpcs/{}", vpc_id)).await?;
    Ok(envelope.vpc)
}

pub async fn get_subnet(client: &ServiceClient, subnet_id: &str) -> ApiResult<Subnet> {
    let envelope: SubnetEnvelope = client.get(&format!("subnets/{}", subnet_id)).await?;
    Ok(envelope.subnet)
}
