//! Client address extraction and anonymization
//!
//! Addresses are handled as strings end to end: they become map keys in the
//! persisted document, and a proxy may hand us something that is not a
//! parseable IP at all. Such values are stored verbatim.

use axum::http::HeaderMap;
use ipnet::{Ipv4Net, Ipv6Net};
use std::net::{IpAddr, Ipv4Addr, Ipv6Addr};

/// Resolve the client address for a request
///
/// Preference order: first entry of `X-Forwarded-For`, then `X-Real-IP`, then
/// the transport peer. Returns an empty string when nothing is known.
pub fn resolve_client_address(headers: &HeaderMap, peer: Option<IpAddr>) -> String {
    if let Some(ip) = forwarded_for(headers) {
        return ip;
    }

    if let Some(ip) = header_value(headers, "x-real-ip") {
        return ip;
    }

    peer.map(|ip| ip.to_string()).unwrap_or_default()
}

/// Leftmost `X-Forwarded-For` entry, i.e. the originating client
fn forwarded_for(headers: &HeaderMap) -> Option<String> {
    let xff = headers.get("x-forwarded-for")?.to_str().ok()?;
    let first = xff.split(',').next()?.trim();
    (!first.is_empty()).then(|| first.to_string())
}

fn header_value(headers: &HeaderMap, name: &str) -> Option<String> {
    let value = headers.get(name)?.to_str().ok()?.trim();
    (!value.is_empty()).then(|| value.to_string())
}

/// Anonymize an address by truncating it to its network prefix
///
/// - IPv4 dotted quad: `/24`, e.g. `1.2.3.4` becomes `1.2.3.0/24`
/// - anything containing `:`: first four groups plus `::/64`
/// - everything else is returned unchanged
pub fn anonymize(address: &str) -> String {
    if is_dotted_quad(address) {
        if let Ok(ip) = address.parse::<Ipv4Addr>() {
            return Ipv4Net::new(ip, 24)
                .map(|net| net.trunc().to_string())
                .unwrap_or_else(|_| address.to_string());
        }
        // Dotted quad with out-of-range octets; keep the textual rule.
        let head: Vec<&str> = address.split('.').take(3).collect();
        return format!("{}.0/24", head.join("."));
    }

    if address.contains(':') {
        if let Ok(ip) = address.parse::<Ipv6Addr>() {
            return Ipv6Net::new(ip, 64)
                .map(|net| net.trunc().to_string())
                .unwrap_or_else(|_| address.to_string());
        }
        let head: Vec<&str> = address.split(':').take(4).collect();
        return format!("{}::/64", head.join(":"));
    }

    address.to_string()
}

fn is_dotted_quad(address: &str) -> bool {
    let parts: Vec<&str> = address.split('.').collect();
    parts.len() == 4
        && parts
            .iter()
            .all(|p| (1..=3).contains(&p.len()) && p.bytes().all(|b| b.is_ascii_digit()))
}
