//! Tunnel address resolution
//!
//! Explicit addresses must be a single well-formed /32; otherwise the lowest
//! free address in the `prefix.2 ..= prefix.254` pool wins. A freed address
//! simply becomes eligible again on the next scan; no compaction.

use ipnetwork::Ipv4Network;
use regex::Regex;

use crate::error::WgError;

/// The default AllowedIPs value, meaning "route everything" on the client
/// side and "auto-assign an address" on ours.
pub const FULL_TUNNEL: &str = "0.0.0.0/0";

/// Resolve the client tunnel address for a create request.
pub fn resolve_address(
    config_text: &str,
    prefix: &str,
    requested: &str,
) -> Result<String, WgError> {
    let requested = requested.trim();
    if !requested.is_empty() && requested != FULL_TUNNEL {
        return normalize_host_address(requested);
    }

    for octet in 2u8..=254 {
        let candidate = format!("{prefix}{octet}/32");
        if !config_text.contains(&candidate) {
            return Ok(candidate);
        }
    }
    Err(WgError::PoolExhausted(prefix.to_string()))
}

/// Validate an explicit address: one entry, IPv4, mask 32 (a bare IP is
/// normalized to /32).
fn normalize_host_address(requested: &str) -> Result<String, WgError> {
    if requested.contains(',') {
        return Err(WgError::InvalidAllowedIps(format!(
            "expected a single host address, got: {requested}"
        )));
    }
    let cidr = if requested.contains('/') {
        requested.to_string()
    } else {
        format!("{requested}/32")
    };
    let network: Ipv4Network = cidr
        .parse()
        .map_err(|_| WgError::InvalidAllowedIps(requested.to_string()))?;
    if network.prefix() != 32 {
        return Err(WgError::InvalidAllowedIps(format!(
            "mask must be /32: {requested}"
        )));
    }
    Ok(cidr)
}

/// Whole-entry collision check against `AllowedIPs =` lines, commented or
/// not. Textual and line-level, matching how the config is appended to.
pub fn address_in_use(config_text: &str, address: &str) -> bool {
    let line_re = Regex::new(r"(?mi)^\s*#?\s*AllowedIPs\s*=\s*(.+)$").unwrap();
    let in_use = line_re.captures_iter(config_text).any(|caps| {
        caps[1]
            .split(',')
            .map(str::trim)
            .any(|entry| entry == address)
    });
    in_use
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_auto_assign_picks_lowest_free() {
        let config = "AllowedIPs = 10.0.0.2/32\n# AllowedIPs = 10.0.0.3/32\n";
        assert_eq!(
            resolve_address(config, "10.0.0.", FULL_TUNNEL).unwrap(),
            "10.0.0.4/32"
        );
    }

    #[test]
    fn test_auto_assign_starts_at_dot_two() {
        assert_eq!(
            resolve_address("[Interface]\n", "10.0.0.", FULL_TUNNEL).unwrap(),
            "10.0.0.2/32"
        );
    }

    #[test]
    fn test_auto_assign_not_fooled_by_longer_octets() {
        // .22 in use must not hide .2
        let config = "AllowedIPs = 10.0.0.22/32\n";
        assert_eq!(
            resolve_address(config, "10.0.0.", FULL_TUNNEL).unwrap(),
            "10.0.0.2/32"
        );
    }

    #[test]
    fn test_pool_exhaustion() {
        let mut config = String::new();
        for octet in 2u8..=254 {
            config.push_str(&format!("AllowedIPs = 10.0.0.{octet}/32\n"));
        }
        assert!(matches!(
            resolve_address(&config, "10.0.0.", FULL_TUNNEL),
            Err(WgError::PoolExhausted(_))
        ));
    }

    #[test]
    fn test_explicit_address_passes_through() {
        assert_eq!(
            resolve_address("", "10.0.0.", "10.0.0.50/32").unwrap(),
            "10.0.0.50/32"
        );
    }

    #[test]
    fn test_bare_ip_normalized_to_host_mask() {
        assert_eq!(
            resolve_address("", "10.0.0.", "10.0.0.50").unwrap(),
            "10.0.0.50/32"
        );
    }

    #[test]
    fn test_rejects_non_host_masks_and_garbage() {
        assert!(resolve_address("", "10.0.0.", "10.0.0.0/24").is_err());
        assert!(resolve_address("", "10.0.0.", "not-an-ip").is_err());
        assert!(resolve_address("", "10.0.0.", "10.0.0.5/32,10.0.0.6/32").is_err());
    }

    #[test]
    fn test_address_in_use_matches_whole_entries_only() {
        let config = "AllowedIPs = 10.0.0.50/32\n";
        assert!(address_in_use(config, "10.0.0.50/32"));
        assert!(!address_in_use(config, "10.0.0.5/32"));
        // Commented (disabled) blocks still hold their address.
        assert!(address_in_use("#   AllowedIPs = 10.0.0.9/32\n", "10.0.0.9/32"));
    }

    #[test]
    fn test_address_in_use_handles_multi_entry_lines() {
        let config = "AllowedIPs = 10.0.0.7/32, 192.168.1.0/24\n";
        assert!(address_in_use(config, "192.168.1.0/24"));
        assert!(!address_in_use(config, "192.168.1.1/32"));
    }
}
