//! Floating IPs and bandwidths

use serde::{Deserialize, Serialize};

use crate::client::{ApiResult, ServiceClient};

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PublicIp {
    #[serde(default)]
    pub id: String,
    /// `ACTIVE`, `DOWN`, `PENDING_CREATE`, ...
    #[serde(default)]
    pub status: String,
    #[serde(default)]
    pub public_ip_address: String,
    #[serde(rename = "type", default)]
    pub ip_type: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub bandwidth_id: Option<String>,
    /// Server the address is currently associated with, if any
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub instance_id: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
struct PublicIpEnvelope {
    #[serde(default)]
    publicip: PublicIp,
}

#[derive(Debug, Clone, Default, Deserialize)]
struct PublicIpListEnvelope {
    #[serde(default)]
    publicips: Vec<PublicIp>,
}

/// Shared-bandwidth object behind a floating IP
#[derive(Debug, Clone, Default, Deserialize)]
pub struct Bandwidth {
    #[serde(default)]
    pub id: String,
    /// Mbit/s
    #[serde(default)]
    pub size: i64,
}

#[derive(Debug, Clone, Default, Deserialize)]
struct BandwidthEnvelope {
    #[serde(default)]
    bandwidth: Bandwidth,
}

/// Allocation recipe for a new floating IP
#[derive(Debug, Clone, Serialize)]
pub struct PublicIpCreate {
    pub ip_type: String,
    pub bandwidth_size: i64,
    pub share_type: String,
    pub charge_mode: String,
}

pub async fn get(client: &ServiceClient, eip_id: &str) -> ApiResult<PublicIp> {
    let envelope: PublicIpEnvelope = client.get(&format!("publicips/{}", eip_id)).await?;
    Ok(envelope.publicip)
}

pub async fn list(client: &ServiceClient) -> ApiResult<Vec<PublicIp>> {
    let envelope: PublicIpListEnvelope = client.get("publicips").await?;
    Ok(envelope.publicips)
}

/// Find the floating IP with the given address, if allocated
pub async fn find_by_address(client: &ServiceClient, address: &str) -> ApiResult<Option<PublicIp>> {
    let ips = list(client).await?;
    Ok(ips.into_iter().find(|ip| ip.public_ip_address == address))
}

/// Find the floating IP currently associated with a server, if any
pub async fn find_by_server(client: &ServiceClient, server_id: &str) -> ApiResult<Option<PublicIp>> {
    let ips = list(client).await?;
    Ok(ips
        .into_iter()
        .find(|ip| ip.instance_id.as_deref() == Some(server_id)))
}

pub async fn create(client: &ServiceClient, recipe: &PublicIpCreate) -> ApiResult<PublicIp> {
    let body = serde_json::json!({
        "publicip": { "type": recipe.ip_type },
        "bandwidth": {
            "size": recipe.bandwidth_size,
            "share_type": recipe.share_type,
            "charge_mode": recipe.charge_mode,
        }
    });
    let envelope: PublicIpEnvelope = client.post("publicips", &body).await?;
    Ok(envelope.publicip)
}

pub async fn delete(client: &ServiceClient, eip_id: &str) -> ApiResult<()> {
    client.delete(&format!("publicips/{}", eip_id)).await
}

/// Associate the floating IP with a server, or disassociate when `None`
pub async fn bind_server(
    client: &ServiceClient,
    eip_id: &str,
    server_id: Option<&str>,
) -> ApiResult<PublicIp> {
    let body = serde_json::json!({ "publicip": { "instance_id": server_id } });
    let envelope: PublicIpEnvelope = client.put(&format!("publicips/{}", eip_id), &body).await?;
    Ok(envelope.publicip)
}

pub async fn get_bandwidth(client: &ServiceClient, bandwidth_id: &str) -> ApiResult<Bandwidth> {
    let envelope: BandwidthEnvelope = client
        .get(&format!("bandwidths/{}", bandwidth_id))
        .await?;
    Ok(envelope.bandwidth)
}

/// Resize the bandwidth object behind a floating IP
pub async fn resize_bandwidth(
    client: &ServiceClient,
    bandwidth_id: &str,
    size: i64,
) -> ApiResult<()> {
    let body = serde_json::json!({ "bandwidth": { "size": size } });
    let _: serde_json::Value = client
        .put(&format!("bandwidths/{}", bandwidth_id), &body)
        .await?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn publicip_envelope_unwraps() {
        let raw = serde_json::json!({
            "publicip": {
                "id": "eip-1",
                "status": "ACTIVE",
                "public_ip_address": "80.1.2.3",
                "type": "5_bgp",
                "bandwidth_id": "bw-1"
            }
        });
        let envelope: PublicIpEnvelope = serde_json::from_value(raw).unwrap();
        assert_eq!(envelope.publicip.id, "eip-1");
        assert_eq!(envelope.publicip.bandwidth_id.as_deref(), Some("bw-1"));
    }
}
