//! Provider and OS inference
//!
//! An explicit provider on the order always wins, then the catalog's
//! provider tag. The name/IP heuristics below exist only for legacy catalog
//! rows that predate explicit tagging; they are a last resort, and anything
//! they cannot place falls through to manual fulfilment.

use crate::providers::types::ProviderKind;
use regex::Regex;
use std::str::FromStr;
use std::sync::OnceLock;
use tracing::debug;

fn skystack_name_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| Regex::new(r"(?i)\b(sky|nvme|ryzen)\b").expect("static regex"))
}

fn rockvm_name_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| Regex::new(r"(?i)\b(rock|storage|hdd)\b").expect("static regex"))
}

/// IP blocks assigned to each backend; used only when nothing better exists
const SKYSTACK_IP_PREFIXES: &[&str] = &["45.129.", "194.163."];
const ROCKVM_IP_PREFIXES: &[&str] = &["103.87.", "103.212."];

/// Resolve which backend should serve an order.
pub fn infer_provider(
    explicit: Option<&str>,
    catalog_tag: Option<&str>,
    product_name: &str,
    ip_address: Option<&str>,
) -> ProviderKind {
    if let Some(value) = explicit {
        if let Ok(kind) = ProviderKind::from_str(value) {
            return kind;
        }
    }

    if let Some(tag) = catalog_tag {
        if let Ok(kind) = ProviderKind::from_str(tag) {
            return kind;
        }
    }

    if skystack_name_pattern().is_match(product_name) {
        debug!(product = %product_name, "provider inferred from product name: skystack");
        return ProviderKind::SkyStack;
    }
    if rockvm_name_pattern().is_match(product_name) {
        debug!(product = %product_name, "provider inferred from product name: rockvm");
        return ProviderKind::RockVm;
    }

    if let Some(ip) = ip_address {
        if SKYSTACK_IP_PREFIXES.iter().any(|p| ip.starts_with(p)) {
            return ProviderKind::SkyStack;
        }
        if ROCKVM_IP_PREFIXES.iter().any(|p| ip.starts_with(p)) {
            return ProviderKind::RockVm;
        }
    }

    ProviderKind::Manual
}

/// Derive the OS template from the product descriptor. The storefront sells
/// OS choice as part of the product name, so this is a token scan with an
/// Ubuntu default.
pub fn determine_os(product_name: &str) -> String {
    let lower = product_name.to_lowercase();
    if lower.contains("windows") || lower.contains("win ") || lower.ends_with("win") {
        "windows-2022".to_string()
    } else if lower.contains("debian") {
        "debian-12".to_string()
    } else if lower.contains("centos") || lower.contains("alma") {
        "almalinux-9".to_string()
    } else {
        "ubuntu-22.04".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn explicit_provider_wins_over_everything() {
        let kind = infer_provider(
            Some("rockvm"),
            Some("skystack"),
            "Sky NVMe 4GB",
            Some("45.129.0.8"),
        );
        assert_eq!(kind, ProviderKind::RockVm);
    }

    #[test]
    fn catalog_tag_beats_heuristics() {
        let kind = infer_provider(None, Some("skystack"), "Storage Box 8GB", None);
        assert_eq!(kind, ProviderKind::SkyStack);
    }

    #[test]
    fn name_heuristics_are_last_resort_before_ip() {
        assert_eq!(
            infer_provider(None, None, "Sky NVMe 4GB", None),
            ProviderKind::SkyStack
        );
        assert_eq!(
            infer_provider(None, None, "Rock Storage 8GB", None),
            ProviderKind::RockVm
        );
    }

    #[test]
    fn ip_prefix_used_when_name_is_silent() {
        assert_eq!(
            infer_provider(None, None, "Value 2GB", Some("103.87.4.2")),
            ProviderKind::RockVm
        );
    }

    #[test]
    fn unmatched_orders_fall_back_to_manual() {
        assert_eq!(
            infer_provider(None, None, "Value 2GB", None),
            ProviderKind::Manual
        );
    }

    #[test]
    fn os_detection_from_product_name() {
        assert_eq!(determine_os("Sky Windows 8GB"), "windows-2022");
        assert_eq!(determine_os("Rock Debian 4GB"), "debian-12");
        assert_eq!(determine_os("Value 2GB"), "ubuntu-22.04");
    }
}
