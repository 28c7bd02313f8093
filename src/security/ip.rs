//! IP allow-list for admin routes.
//!
//! Entries are either single addresses (`192.0.2.7`, `::1`) or CIDR networks
//! (`10.0.0.0/8`, `2001:db8::/32`). An empty list disables the check.

use ipnetwork::IpNetwork;
use std::net::IpAddr;

use super::config::ConfigError;

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct IpAllowList {
    entries: Vec<IpNetwork>,
}

impl IpAllowList {
    /// Parse allow-list entries, skipping blanks.
    ///
    /// # Errors
    /// Returns `ConfigError::InvalidIpEntry` for entries that are neither an
    /// address nor a CIDR network.
    pub fn parse<I, S>(entries: I) -> Result<Self, ConfigError>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut networks = Vec::new();
        for entry in entries {
            let trimmed = entry.as_ref().trim();
            if trimmed.is_empty() {
                continue;
            }
            let network = trimmed
                .parse::<IpNetwork>()
                .map_err(|_| ConfigError::InvalidIpEntry(trimmed.to_string()))?;
            networks.push(network);
        }
        Ok(Self { entries: networks })
    }

    #[must_use]
    pub fn is_enabled(&self) -> bool {
        !self.entries.is_empty()
    }

    #[must_use]
    pub fn entries(&self) -> &[IpNetwork] {
        &self.entries
    }

    /// Whether `ip` may reach admin routes. Unparseable addresses are refused
    /// when the list is enabled.
    #[must_use]
    pub fn allows(&self, ip: &str) -> bool {
        !self.is_enabled() || parse_client_ip(ip).is_some_and(|addr| self.contains(addr))
    }

    /// Strict membership: an empty list contains nothing.
    #[must_use]
    pub fn contains(&self, addr: IpAddr) -> bool {
        let addr = addr.to_canonical();
        self.entries.iter().any(|network| network.contains(addr))
    }
}

/// Parse a client address as seen in proxy headers, tolerating `[v6]:port`
/// and `v4:port` forms. IPv4-mapped IPv6 addresses are canonicalized.
fn parse_client_ip(raw: &str) -> Option<IpAddr> {
    let raw = raw.trim();
    if let Ok(addr) = raw.parse::<IpAddr>() {
        return Some(addr.to_canonical());
    }
    if let Ok(socket) = raw.parse::<std::net::SocketAddr>() {
        return Some(socket.ip().to_canonical());
    }
    raw.strip_prefix('[')
        .and_then(|rest| rest.split(']').next())
        .and_then(|inner| inner.parse::<IpAddr>().ok())
        .map(|addr| addr.to_canonical())
}
