//! Outbound URL checks for segment downloads.
//!
//! Hosts are classified from the parsed URL, so numeric, hex, userinfo and
//! IPv4-mapped IPv6 spellings of an internal address are caught the same way
//! as the dotted form.

use std::net::{Ipv4Addr, Ipv6Addr};
use std::sync::LazyLock;

use regex::Regex;
use url::{Host, Url};

/// Host names that resolve to the local machine or a cloud metadata service.
static BLOCKED_HOST_NAMES: LazyLock<Vec<Regex>> = LazyLock::new(|| {
    [
        r"^localhost\.?$",
        r"\.localhost\.?$",
        r"^metadata$",
        r"^metadata\.",
        r"\.internal\.?$",
    ]
    .iter()
    .filter_map(|p| Regex::new(p).ok())
    .collect()
});

pub fn is_internal_ipv4(ip: Ipv4Addr) -> bool {
    let [a, b, _, _] = ip.octets();
    ip.is_loopback()
        || ip.is_private()
        || ip.is_link_local()
        || ip.is_unspecified()
        || ip.is_broadcast()
        || a == 0
        // 100.64.0.0/10 shared address space
        || (a == 100 && (64..=127).contains(&b))
}

pub fn is_internal_ipv6(ip: Ipv6Addr) -> bool {
    let segments = ip.segments();

    // IPv4-mapped, IPv4-compatible and NAT64 forms embed an IPv4 address.
    if let Some(v4) = ip.to_ipv4() {
        if is_internal_ipv4(v4) {
            return true;
        }
    }
    if segments[..6] == [0x64, 0xff9b, 0, 0, 0, 0] {
        let [.., hi, lo] = segments;
        let embedded = Ipv4Addr::from((u32::from(hi) << 16) | u32::from(lo));
        if is_internal_ipv4(embedded) {
            return true;
        }
    }

    ip.is_loopback()
        || ip.is_unspecified()
        // fc00::/7 unique local
        || (segments[0] & 0xfe00) == 0xfc00
        // fe80::/10 link local
        || (segments[0] & 0xffc0) == 0xfe80
}

/// True when `url` targets loopback, private, link-local or metadata hosts.
/// A URL without a host counts as internal.
pub fn is_internal_host(url: &Url) -> bool {
    match url.host() {
        None => true,
        Some(Host::Ipv4(ip)) => is_internal_ipv4(ip),
        Some(Host::Ipv6(ip)) => is_internal_ipv6(ip),
        Some(Host::Domain(name)) => {
            let name = name.to_lowercase();
            BLOCKED_HOST_NAMES.iter().any(|p| p.is_match(&name))
        }
    }
}

/// An origin plus path prefix that a credential may be sent to.
#[derive(Debug, Clone)]
pub struct UrlScope {
    scheme: String,
    host: String,
    port: Option<u16>,
    path: String,
}

impl UrlScope {
    pub fn parse(prefix: &str) -> Result<Self, url::ParseError> {
        let url = Url::parse(prefix)?;
        let host = url.host_str().ok_or(url::ParseError::EmptyHost)?.to_string();
        Ok(Self {
            scheme: url.scheme().to_string(),
            host,
            port: url.port_or_known_default(),
            path: url.path().trim_end_matches('/').to_string(),
        })
    }

    /// Same scheme, host and port, and a path under the prefix on a `/` boundary.
    pub fn covers(&self, url: &Url) -> bool {
        if url.scheme() != self.scheme
            || url.host_str() != Some(self.host.as_str())
            || url.port_or_known_default() != self.port
        {
            return false;
        }
        let path = url.path();
        self.path.is_empty()
            || path == self.path
            || path
                .strip_prefix(self.path.as_str())
                .is_some_and(|rest| rest.starts_with('/'))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn internal(raw: &str) -> bool {
        is_internal_host(&Url::parse(raw).unwrap())
    }

    #[test]
    fn alternate_ipv4_spellings_are_internal() {
        for raw in [
            "http://127.0.0.1/x.mp4",
            "http://user@127.0.0.1/x.mp4",
            "http://user:pw@10.0.0.8/x.mp4",
            "http://2130706433/x.mp4",
            "http://0x7f000001/x",
            "http://0177.0.0.1/x",
            "http://127.1/x",
            "http://0.0.0.0/x",
            "http://169.254.169.254/latest/meta-data/",
            "http://172.20.1.1/x",
            "http://192.168.0.1/x",
            "http://100.100.100.200/x",
        ] {
            assert!(internal(raw), "{}", raw);
        }
    }

    #[test]
    fn ipv6_forms_are_internal() {
        for raw in [
            "http://[::1]/x",
            "http://[::]/x",
            "http://[::ffff:169.254.169.254]/x",
            "http://[::ffff:7f00:1]/x",
            "http://[64:ff9b::a9fe:a9fe]/x",
            "http://[fd00::1]/x",
            "http://[fe80::1]/x",
        ] {
            assert!(internal(raw), "{}", raw);
        }
    }

    #[test]
    fn local_and_metadata_names_are_internal() {
        for raw in [
            "http://localhost:8080/x",
            "http://LOCALHOST/x",
            "http://api.localhost/x",
            "http://metadata.google.internal/computeMetadata/v1/",
            "http://metadata/x",
        ] {
            assert!(internal(raw), "{}", raw);
        }
    }

    #[test]
    fn public_hosts_pass() {
        for raw in [
            "https://cdn.example.com/a.mp4",
            "https://93.184.216.34/a.mp4",
            "https://[2606:4700::1111]/a.mp4",
            "https://generativelanguage.googleapis.com/v1beta/files/x",
        ] {
            assert!(!internal(raw), "{}", raw);
        }
    }

    #[test]
    fn scope_matches_exact_origin_and_path_boundary() {
        let scope = UrlScope::parse("https://generativelanguage.googleapis.com").unwrap();
        let url = |raw: &str| Url::parse(raw).unwrap();

        assert!(scope.covers(&url("https://generativelanguage.googleapis.com/v1beta/files/a")));
        assert!(scope.covers(&url("https://generativelanguage.googleapis.com:443/v1beta/x")));
        assert!(!scope.covers(&url(
            "https://generativelanguage.googleapis.com.attacker.example/a.mp4"
        )));
        assert!(!scope.covers(&url("https://user@evil.example/generativelanguage.googleapis.com")));
        assert!(!scope.covers(&url("http://generativelanguage.googleapis.com/v1beta/x")));
        assert!(!scope.covers(&url("https://generativelanguage.googleapis.com:8443/x")));
    }

    #[test]
    fn scope_path_prefix_stops_at_segment_boundary() {
        let scope = UrlScope::parse("http://127.0.0.1:4479/v1beta/").unwrap();
        let url = |raw: &str| Url::parse(raw).unwrap();

        assert!(scope.covers(&url("http://127.0.0.1:4479/v1beta/files/a")));
        assert!(scope.covers(&url("http://127.0.0.1:4479/v1beta")));
        assert!(!scope.covers(&url("http://127.0.0.1:4479/v1betax/files/a")));
        assert!(!scope.covers(&url("http://127.0.0.1:44791/v1beta/files/a")));
    }
}
