//! Domain and CIDR matching.

use std::collections::HashSet;
use std::net::IpAddr;

use crate::blocklist::source::{entries, ListError};

/// Why a destination was refused.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BlockReason {
    Domain,
    Cidr,
}

impl BlockReason {
    pub fn as_label(&self) -> &'static str {
        match self {
            BlockReason::Domain => "domain",
            BlockReason::Cidr => "cidr",
        }
    }
}

impl std::fmt::Display for BlockReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_label())
    }
}

fn normalize_domain(name: &str) -> String {
    name.trim()
        .trim_start_matches("*.")
        .trim_start_matches('.')
        .trim_end_matches('.')
        .to_ascii_lowercase()
}

/// Domains matched by suffix: `example.com` covers `example.com` and
/// `a.example.com` but not `badexample.com`.
#[derive(Debug, Clone, Default)]
pub struct DomainSet {
    domains: HashSet<String>,
}

impl DomainSet {
    pub fn from_text(text: &str) -> Self {
        let domains = entries(text)
            .map(|(_, line)| normalize_domain(line))
            .filter(|d| !d.is_empty())
            .collect();
        Self { domains }
    }

    pub fn len(&self) -> usize {
        self.domains.len()
    }

    pub fn is_empty(&self) -> bool {
        self.domains.is_empty()
    }

    pub fn contains(&self, host: &str) -> bool {
        if self.domains.is_empty() {
            return false;
        }
        let host = normalize_domain(host);
        let mut candidate = host.as_str();
        loop {
            if self.domains.contains(candidate) {
                return true;
            }
            match candidate.find('.') {
                Some(dot) => candidate = &candidate[dot + 1..],
                None => return false,
            }
        }
    }
}

/// IP family a CIDR list is expected to contain.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IpFamily {
    V4,
    V6,
}

/// A network prefix with host bits cleared.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Cidr {
    network: IpAddr,
    prefix: u8,
}

impl Cidr {
    /// Parse `addr/prefix`; a bare address is a full-length prefix.
    pub fn parse(s: &str) -> Option<Cidr> {
        let (addr, prefix) = match s.split_once('/') {
            Some((addr, prefix)) => (addr.trim(), Some(prefix.trim().parse::<u8>().ok()?)),
            None => (s.trim(), None),
        };
        let addr: IpAddr = addr.parse().ok()?;
        let max = match addr {
            IpAddr::V4(_) => 32,
            IpAddr::V6(_) => 128,
        };
        let prefix = prefix.unwrap_or(max);
        if prefix > max {
            return None;
        }
        let network = match addr {
            IpAddr::V4(v4) => IpAddr::V4((u32::from(v4) & mask_v4(prefix)).into()),
            IpAddr::V6(v6) => IpAddr::V6((u128::from(v6) & mask_v6(prefix)).into()),
        };
        Some(Cidr { network, prefix })
    }

    pub fn family(&self) -> IpFamily {
        match self.network {
            IpAddr::V4(_) => IpFamily::V4,
            IpAddr::V6(_) => IpFamily::V6,
        }
    }

    pub fn contains(&self, ip: IpAddr) -> bool {
        match (self.network, ip.to_canonical()) {
            (IpAddr::V4(net), IpAddr::V4(ip)) => u32::from(ip) & mask_v4(self.prefix) == u32::from(net),
            (IpAddr::V6(net), IpAddr::V6(ip)) => {
                u128::from(ip) & mask_v6(self.prefix) == u128::from(net)
            }
            _ => false,
        }
    }
}

fn mask_v4(prefix: u8) -> u32 {
    if prefix == 0 {
        0
    } else {
        u32::MAX << (32 - u32::from(prefix))
    }
}

fn mask_v6(prefix: u8) -> u128 {
    if prefix == 0 {
        0
    } else {
        u128::MAX << (128 - u32::from(prefix))
    }
}

/// A list of CIDRs of one family.
#[derive(Debug, Clone, Default)]
pub struct CidrSet {
    cidrs: Vec<Cidr>,
}

impl CidrSet {
    /// Parse a list, rejecting malformed lines and entries of the wrong family.
    pub fn from_text(text: &str, family: IpFamily, source_name: &str) -> Result<Self, ListError> {
        let mut cidrs = Vec::new();
        for (line, value) in entries(text) {
            match Cidr::parse(value) {
                Some(cidr) if cidr.family() == family => cidrs.push(cidr),
                _ => {
                    return Err(ListError::InvalidEntry {
                        source_name: source_name.to_string(),
                        line,
                        value: value.to_string(),
                    })
                }
            }
        }
        Ok(Self { cidrs })
    }

    pub fn len(&self) -> usize {
        self.cidrs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.cidrs.is_empty()
    }

    pub fn contains(&self, ip: IpAddr) -> bool {
        self.cidrs.iter().any(|c| c.contains(ip))
    }
}

/// Everything a tunnel consults before dialing.
#[derive(Debug, Clone, Default)]
pub struct BlockList {
    pub domains: DomainSet,
    pub cidr4: CidrSet,
    pub cidr6: CidrSet,
    /// Upper-cased country codes.
    pub geoip: Vec<String>,
}

impl BlockList {
    /// Check a host name or IP literal.
    pub fn check_host(&self, host: &str) -> Option<BlockReason> {
        match host.parse::<IpAddr>() {
            Ok(ip) => self.check_ip(ip),
            Err(_) => self.domains.contains(host).then_some(BlockReason::Domain),
        }
    }

    /// Check a resolved address.
    pub fn check_ip(&self, ip: IpAddr) -> Option<BlockReason> {
        let blocked = match ip.to_canonical() {
            IpAddr::V4(_) => self.cidr4.contains(ip),
            IpAddr::V6(_) => self.cidr6.contains(ip),
        };
        blocked.then_some(BlockReason::Cidr)
    }
}
