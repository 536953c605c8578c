//! Local network discovery using pure async TCP probing.
//!
//! No external binaries are required. Concurrency is bounded by a semaphore
//! to avoid flooding the network interface, and no new probe starts once the
//! run is cancelled.

use std::net::{IpAddr, SocketAddr};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use futures::future::join_all;
use ipnet::Ipv4Net;
use tokio::net::TcpStream;
use tokio::sync::Semaphore;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use crate::discovery::models::{DiscoveredDevice, DiscoveryFinding, DiscoveryMetadata, PairingCapability};
use crate::discovery::strategy::DiscoveryStrategy;
use crate::errors::OnboardError;

/// Max concurrent TCP probes to avoid overwhelming the local network.
const MAX_CONCURRENT: usize = 64;

/// Probes every host of an IPv4 subnet for setup-mode devices
pub struct LanProbeStrategy {
    cidr: String,
    ports: Vec<u16>,
    probe_timeout: Duration,
}

impl LanProbeStrategy {
    pub fn new(cidr: impl Into<String>, ports: Vec<u16>, probe_timeout: Duration) -> Self {
        Self {
            cidr: cidr.into(),
            ports,
            probe_timeout,
        }
    }

    fn finding_for(ip: IpAddr) -> DiscoveryFinding {
        let device = DiscoveredDevice::new(format!("lan-{}", ip), format!("Device at {}", ip))
            .with_capability(PairingCapability::SoftAp);
        let metadata = DiscoveryMetadata {
            supports_soft_ap: true,
            device_ap_reachable: true,
            ..Default::default()
        };
        DiscoveryFinding::new(device, metadata)
    }
}

#[async_trait]
impl DiscoveryStrategy for LanProbeStrategy {
    fn id(&self) -> &str {
        "lan_probe"
    }

    async fn discover(&self, cancel: CancellationToken) -> Result<Vec<DiscoveryFinding>, OnboardError> {
        let net: Ipv4Net = self.cidr.parse().map_err(|e| {
            OnboardError::DiscoveryError(format!("Invalid CIDR {}: {}", self.cidr, e))
        })?;

        let hosts: Vec<IpAddr> = net.hosts().map(IpAddr::V4).collect();
        info!("Probing {} hosts in {}", hosts.len(), self.cidr);

        let semaphore = Arc::new(Semaphore::new(MAX_CONCURRENT));
        let mut handles = Vec::with_capacity(hosts.len());

        for ip in hosts {
            let sem = Arc::clone(&semaphore);
            let cancel = cancel.clone();
            let ports = self.ports.clone();
            let timeout = self.probe_timeout;
            handles.push(tokio::spawn(async move {
                let _permit = tokio::select! {
                    _ = cancel.cancelled() => return None,
                    permit = sem.acquire_owned() => permit.ok()?,
                };
                if cancel.is_cancelled() {
                    return None;
                }
                let open_ports = probe_ports(ip, &ports, timeout).await;
                if open_ports.is_empty() {
                    return None;
                }
                Some((ip, open_ports))
            }));
        }

        let mut results = Vec::new();
        for (ip, open_ports) in join_all(handles).await.into_iter().flatten().flatten() {
            debug!("Found host: {} ports={:?}", ip, open_ports);
            results.push(Self::finding_for(ip));
        }

        if cancel.is_cancelled() {
            return Err(OnboardError::Cancelled("LAN probe cancelled".to_string()));
        }

        info!("LAN probe complete: {} hosts responded", results.len());
        Ok(results)
    }
}

/// Probe a set of ports on `ip` and return those that accepted a connection.
async fn probe_ports(ip: IpAddr, ports: &[u16], timeout: Duration) -> Vec<u16> {
    let mut open = Vec::new();

    for &port in ports {
        let addr = SocketAddr::new(ip, port);
        if let Ok(Ok(_)) = tokio::time::timeout(timeout, TcpStream::connect(addr)).await {
            open.push(port);
        }
    }

    open
}
