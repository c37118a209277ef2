//! Address token validation.
//!
//! Log lines are only ever inspected for their first whitespace-delimited
//! token; this module decides whether that token is a plausible address.
//! Validation is deliberately strict: anything that is not a syntactically
//! complete IPv4 or IPv6 literal (timestamps, usernames, hostnames) is
//! rejected so differently-formatted logs cannot pollute the store.

use anyhow::{anyhow, Result};
use ipnet::IpNet;
use std::net::IpAddr;

/// Parse an address token as captured from a log line.
///
/// IPv6 literals may be wrapped in square brackets (`[2001:db8::1]`); the
/// brackets are stripped for parsing but callers keep the token verbatim
/// as the record name.
///
/// # Examples
/// ```
/// use blocktail::validation::parse_address_token;
/// assert!(parse_address_token("192.0.2.7").is_ok());
/// assert!(parse_address_token("[2001:db8::1]").is_ok());
/// assert!(parse_address_token("2024-01-01T00:00:00").is_err());
/// ```
pub fn parse_address_token(token: &str) -> Result<IpAddr> {
    let literal = token
        .strip_prefix('[')
        .and_then(|rest| rest.strip_suffix(']'))
        .unwrap_or(token);

    literal
        .parse()
        .map_err(|_| anyhow!("not an address literal: {}", token))
}

/// Parse an allowlist entry as an IP address or CIDR network.
///
/// A plain address becomes a /32 (IPv4) or /128 (IPv6) network.
///
/// # Examples
/// ```
/// use blocktail::validation::parse_ip_or_net;
/// assert_eq!(parse_ip_or_net("192.0.2.1").unwrap().to_string(), "192.0.2.1/32");
/// assert!(parse_ip_or_net("10.0.0.0/8").is_ok());
/// assert!(parse_ip_or_net("bogus").is_err());
/// ```
pub fn parse_ip_or_net(entry: &str) -> Result<IpNet> {
    if entry.contains('/') {
        entry
            .parse()
            .map_err(|_| anyhow!("invalid network: {}", entry))
    } else {
        let addr: IpAddr = entry
            .parse()
            .map_err(|_| anyhow!("invalid address: {}", entry))?;
        Ok(IpNet::from(addr))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ipv4_valid() {
        let addr = parse_address_token("192.0.2.7").unwrap();
        assert!(addr.is_ipv4());
    }

    #[test]
    fn test_ipv6_valid() {
        let addr = parse_address_token("2001:db8::1").unwrap();
        assert!(addr.is_ipv6());
    }

    #[test]
    fn test_ipv6_bracketed() {
        let addr = parse_address_token("[2001:db8::1]").unwrap();
        assert!(addr.is_ipv6());
    }

    #[test]
    fn test_ipv6_loopback() {
        assert!(parse_address_token("::1").is_ok());
        assert!(parse_address_token("[::1]").is_ok());
    }

    #[test]
    fn test_rejects_timestamp() {
        assert!(parse_address_token("2024-01-01T00:00:00").is_err());
        assert!(parse_address_token("12:34:56").is_err());
    }

    #[test]
    fn test_rejects_username() {
        assert!(parse_address_token("root").is_err());
        assert!(parse_address_token("not-an-address").is_err());
    }

    #[test]
    fn test_rejects_partial_ipv4() {
        assert!(parse_address_token("1.2.3").is_err());
        assert!(parse_address_token("1.2.3.4.5").is_err());
        assert!(parse_address_token("256.1.1.1").is_err());
    }

    #[test]
    fn test_rejects_unbalanced_brackets() {
        assert!(parse_address_token("[::1").is_err());
        assert!(parse_address_token("::1]").is_err());
    }

    #[test]
    fn test_rejects_empty() {
        assert!(parse_address_token("").is_err());
        assert!(parse_address_token("[]").is_err());
    }

    #[test]
    fn test_parse_ip_or_net_plain() {
        assert_eq!(parse_ip_or_net("::1").unwrap().to_string(), "::1/128");
        assert_eq!(
            parse_ip_or_net("192.0.2.1").unwrap().to_string(),
            "192.0.2.1/32"
        );
    }

    #[test]
    fn test_parse_ip_or_net_cidr() {
        assert_eq!(
            parse_ip_or_net("10.0.0.0/8").unwrap().to_string(),
            "10.0.0.0/8"
        );
        assert!(parse_ip_or_net("10.0.0.0/99").is_err());
    }
}
