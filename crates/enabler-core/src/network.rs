//! metallb address pools carved from the kind docker network

use crate::error::{CoreError, Result};
use enabler_rs::{CommandRunner, Docker};
use ipnetwork::Ipv4Network;
use std::fmt;
use std::net::Ipv4Addr;
use std::str::FromStr;

/// Number of addresses handed to metallb by default
const DEFAULT_POOL_SIZE: u32 = 10;

/// Inclusive IPv4 range, rendered as `a - b`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AddressPool {
    pub start: Ipv4Addr,
    pub end: Ipv4Addr,
}

impl AddressPool {
    /// Both endpoints inside `subnet`
    pub fn within(&self, subnet: &Ipv4Network) -> bool {
        subnet.contains(self.start) && subnet.contains(self.end)
    }
}

impl fmt::Display for AddressPool {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} - {}", self.start, self.end)
    }
}

impl FromStr for AddressPool {
    type Err = CoreError;

    /// Accepts `a - b` as well as `a-b`
    fn from_str(s: &str) -> Result<Self> {
        let invalid = || CoreError::InvalidAddressRange(s.to_string());
        let (start, end) = s.split_once('-').ok_or_else(invalid)?;
        let start: Ipv4Addr = start.trim().parse().map_err(|_| invalid())?;
        let end: Ipv4Addr = end.trim().parse().map_err(|_| invalid())?;
        if start > end {
            return Err(invalid());
        }
        Ok(Self { start, end })
    }
}

/// The last usable host addresses of `subnet`, broadcast excluded
pub fn default_pool(subnet: &Ipv4Network) -> AddressPool {
    let network = u32::from(subnet.network());
    let broadcast = u32::from(subnet.broadcast());
    if subnet.prefix() >= 31 {
        return AddressPool {
            start: Ipv4Addr::from(network),
            end: Ipv4Addr::from(broadcast),
        };
    }
    let end = broadcast - 1;
    let start = end.saturating_sub(DEFAULT_POOL_SIZE - 1).max(network + 1);
    AddressPool {
        start: Ipv4Addr::from(start),
        end: Ipv4Addr::from(end),
    }
}

/// Pick the pool for an install: the requested range if it lies inside the
/// cluster network, else the default tail of the network.
pub fn select_pool(subnet: &Ipv4Network, requested: Option<&str>) -> Result<AddressPool> {
    let Some(requested) = requested else {
        return Ok(default_pool(subnet));
    };
    let pool: AddressPool = requested.parse()?;
    if !pool.within(subnet) {
        return Err(CoreError::RangeNotInNetwork {
            range: requested.to_string(),
            subnet: subnet.to_string(),
        });
    }
    Ok(pool)
}

/// First IPv4 subnet of a docker network's IPAM config
pub async fn cluster_subnet(runner: &dyn CommandRunner, network: &str) -> Result<Ipv4Network> {
    let subnets = Docker::new(runner)
        .network_subnets(network)
        .await?
        .ok_or_else(|| CoreError::NetworkNotFound(network.to_string()))?;
    first_ipv4(&subnets).ok_or_else(|| CoreError::NetworkNotFound(network.to_string()))
}

fn first_ipv4(subnets: &[String]) -> Option<Ipv4Network> {
    subnets.iter().find_map(|s| s.parse::<Ipv4Network>().ok())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::ScriptedRunner;
    use enabler_rs::CommandOutput;

    fn kind_subnet() -> Ipv4Network {
        "172.18.0.0/16".parse().unwrap()
    }

    #[test]
    fn test_default_pool_is_network_tail() {
        let pool = default_pool(&kind_subnet());
        assert_eq!(pool.to_string(), "172.18.255.245 - 172.18.255.254");
    }

    #[test]
    fn test_default_pool_small_subnet() {
        let subnet: Ipv4Network = "10.1.0.0/29".parse().unwrap();
        let pool = default_pool(&subnet);
        assert_eq!(pool.start, Ipv4Addr::new(10, 1, 0, 1));
        assert_eq!(pool.end, Ipv4Addr::new(10, 1, 0, 6));
    }

    #[test]
    fn test_parse_ranges() {
        let pool: AddressPool = "172.18.0.100 - 172.18.0.110".parse().unwrap();
        assert_eq!(pool.start, Ipv4Addr::new(172, 18, 0, 100));
        assert_eq!(pool.end, Ipv4Addr::new(172, 18, 0, 110));

        assert!("172.18.0.100-172.18.0.110".parse::<AddressPool>().is_ok());
        assert!("172.18.0.110 - 172.18.0.100".parse::<AddressPool>().is_err());
        assert!("not-a-range".parse::<AddressPool>().is_err());
        assert!("172.18.0.100".parse::<AddressPool>().is_err());
    }

    #[test]
    fn test_range_outside_network_rejected() {
        let err = select_pool(&kind_subnet(), Some("10.0.0.5 - 10.0.0.9")).unwrap_err();
        assert!(matches!(err, CoreError::RangeNotInNetwork { .. }));
        assert!(err.to_string().contains("not in cluster network"));
    }

    #[test]
    fn test_requested_range_kept() {
        let pool = select_pool(&kind_subnet(), Some("172.18.1.1 - 172.18.1.5")).unwrap();
        assert_eq!(pool.to_string(), "172.18.1.1 - 172.18.1.5");
    }

    #[tokio::test]
    async fn test_cluster_subnet_skips_ipv6() {
        let runner = ScriptedRunner::new().on(
            "docker network inspect kind",
            CommandOutput::ok(r#"[{"Subnet":"fc00:f853:ccd:e793::/64"},{"Subnet":"172.18.0.0/16","Gateway":"172.18.0.1"}]"#),
        );
        let subnet = cluster_subnet(&runner, "kind").await.unwrap();
        assert_eq!(subnet, kind_subnet());
    }

    #[tokio::test]
    async fn test_missing_network() {
        let runner = ScriptedRunner::new().on(
            "docker network inspect",
            CommandOutput::failed(1, "Error: No such network: kind"),
        );
        let err = cluster_subnet(&runner, "kind").await.unwrap_err();
        assert!(matches!(err, CoreError::NetworkNotFound(_)));
    }
}
