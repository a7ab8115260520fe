//! Destination matching primitives shared by the expression engine and
//! the outbound-control walk. All of these are total: malformed input
//! yields `false`, never an error.

use std::net::IpAddr;

use ipnet::IpNet;

use crate::glob::glob_match;

/// True when `ip` parses and falls inside `cidr`. `0.0.0.0/0` matches
/// every IPv4 address; IPv6 literals and prefixes are supported.
pub fn ip_in_cidr(ip: &str, cidr: &str) -> bool {
    let Ok(addr) = ip.parse::<IpAddr>() else {
        return false;
    };
    let Ok(net) = cidr.parse::<IpNet>() else {
        return false;
    };
    net.contains(&addr)
}

/// Suffix/glob domain matching, case-insensitive.
///
/// `*.evil.com` matches `evil.com`, `a.evil.com`, and `a.b.evil.com`;
/// other patterns fall back to anchored glob matching, and a pattern
/// with no wildcards is an exact comparison.
pub fn domain_matches(domain: &str, pattern: &str) -> bool {
    if domain.is_empty() || pattern.is_empty() {
        return false;
    }
    let domain = domain.to_ascii_lowercase();
    let pattern = pattern.to_ascii_lowercase();

    if let Some(suffix) = pattern.strip_prefix("*.") {
        return domain == suffix || domain.ends_with(&format!(".{suffix}"));
    }
    glob_match(&pattern, &domain)
}

/// Parse `"8000-9000"` (inclusive) or a single `"443"`. Values outside
/// u16 cannot be expressed and never match.
pub fn port_in_range(port: u16, range: &str) -> bool {
    let range = range.trim();
    if let Some((lo, hi)) = range.split_once('-') {
        match (lo.trim().parse::<u16>(), hi.trim().parse::<u16>()) {
            (Ok(lo), Ok(hi)) => lo <= port && port <= hi,
            _ => false,
        }
    } else {
        range.parse::<u16>().map_or(false, |p| p == port)
    }
}
