//! IPVS routing-table parser.
//!
//! Reads the text of a routing dump (`ipvsadm -Ln` style) and finds the
//! backend a virtual address is currently routed to:
//!
//! ```text
//! TCP  10.0.0.100:3306 rr              <- section header for the VIP
//!   -> 10.0.0.5:3306   Route 1 0 0     <- routing entry, weight 0: skipped
//!   -> 10.0.0.6:3306   Route 1 5 0     <- first positive weight: candidate
//! TCP  10.0.0.200:5432 rr              <- next header ends the section
//! ```
//!
//! The dump format is not a stable contract. Anything that does not match
//! degrades to an explicit "no candidate" outcome instead of an error.

use harbor_core::NodeAddress;
use tracing::debug;

/// Token separating the real-server field from the forwarding fields.
pub const ROUTE_MARKER: &str = "->";

/// 1-based position of the weight among the fields after [`ROUTE_MARKER`].
///
/// This is the established convention for these dumps. On a stock
/// `ipvsadm -Ln` layout (Forward, Weight, ActiveConn, InActConn) position 4
/// is ActiveConn; configure 3 to read the Weight column instead.
pub const DEFAULT_WEIGHT_FIELD: usize = 4;

/// Protocol tokens that open a virtual-service header.
const SERVICE_PROTOCOLS: &[&str] = &["TCP", "UDP", "SCTP", "FWM"];

/// One real-server line inside a virtual-service section.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RouteEntry {
    pub backend: NodeAddress,
    pub weight: u64,
}

/// Outcome of looking up the active backend for a virtual address.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RouteLookup {
    /// No section header names the virtual address.
    NoSection,
    /// The section lists no parseable routing entries.
    NoEntries,
    /// Every entry in the section has zero weight.
    NoPositiveWeight { entries: usize },
    /// First entry with positive weight.
    Found(RouteEntry),
}

impl RouteLookup {
    pub fn candidate(&self) -> Option<&NodeAddress> {
        match self {
            RouteLookup::Found(entry) => Some(&entry.backend),
            _ => None,
        }
    }

    /// Short human-readable description for audit lines.
    pub fn describe(&self) -> String {
        match self {
            RouteLookup::NoSection => "virtual address not present in routing table".to_string(),
            RouteLookup::NoEntries => "no routing entries under virtual address".to_string(),
            RouteLookup::NoPositiveWeight { entries } => {
                format!("{entries} routing entries, none with positive weight")
            }
            RouteLookup::Found(entry) => {
                format!("active backend {} (weight {})", entry.backend, entry.weight)
            }
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RoutingTableParser {
    weight_field: usize,
}

impl Default for RoutingTableParser {
    fn default() -> Self {
        Self {
            weight_field: DEFAULT_WEIGHT_FIELD,
        }
    }
}

impl RoutingTableParser {
    pub fn new() -> Self {
        Self::default()
    }

    /// Read the weight from a different field position (1-based, after the marker).
    pub fn with_weight_field(weight_field: usize) -> Self {
        Self {
            weight_field: weight_field.max(1),
        }
    }

    pub fn weight_field(&self) -> usize {
        self.weight_field
    }

    /// Find the backend the virtual address is routed to.
    pub fn find_active_backend(&self, dump: &str, virtual_address: &str) -> RouteLookup {
        let Some(entries) = self.section_entries(dump, virtual_address) else {
            debug!(%virtual_address, "no routing section for virtual address");
            return RouteLookup::NoSection;
        };
        if entries.is_empty() {
            return RouteLookup::NoEntries;
        }

        let total = entries.len();
        match entries.into_iter().find(|e| e.weight > 0) {
            Some(entry) => RouteLookup::Found(entry),
            None => RouteLookup::NoPositiveWeight { entries: total },
        }
    }

    /// Routing entries listed under the virtual address, in dump order.
    ///
    /// Returns `None` when no section header names the address.
    pub fn section_entries(&self, dump: &str, virtual_address: &str) -> Option<Vec<RouteEntry>> {
        let mut lines = dump.lines();
        lines.find(|line| !line.contains(ROUTE_MARKER) && names_address(line, virtual_address))?;

        let entries = lines
            .take_while(|line| line.trim().is_empty() || line.contains(ROUTE_MARKER))
            .filter_map(|line| self.parse_entry(line))
            .collect();
        Some(entries)
    }

    /// Parse one `-> address:port fields...` line.
    pub fn parse_entry(&self, line: &str) -> Option<RouteEntry> {
        let (_, rest) = line.split_once(ROUTE_MARKER)?;
        let fields: Vec<&str> = rest.split_whitespace().collect();
        let backend = strip_port(fields.first()?);
        let weight = fields.get(self.weight_field - 1)?.parse::<u64>().ok()?;
        if backend.is_empty() {
            return None;
        }
        Some(RouteEntry {
            backend: NodeAddress::from(backend),
            weight,
        })
    }
}

/// Whether the dump lists at least one virtual service.
pub fn has_virtual_services(dump: &str) -> bool {
    dump.lines().any(|line| {
        line.split_whitespace()
            .next()
            .is_some_and(|first| SERVICE_PROTOCOLS.contains(&first))
    })
}

/// Whether an interface listing (`ip -o addr show`) carries the address.
///
/// Matches whole address tokens, so `10.0.0.1` does not match `10.0.0.10/24`.
pub fn lists_address(interface_listing: &str, address: &str) -> bool {
    interface_listing.lines().any(|line| {
        line.split_whitespace()
            .any(|token| token.split('/').next() == Some(address))
    })
}

/// Whether any token on the line is `address`, with or without a port.
fn names_address(line: &str, address: &str) -> bool {
    line.split_whitespace()
        .any(|token| token == address || strip_port(token) == address)
}

/// `10.0.0.6:3306` → `10.0.0.6`; `[fd00::6]:3306` → `fd00::6`.
pub fn strip_port(field: &str) -> &str {
    if let Some(rest) = field.strip_prefix('[') {
        return rest.split_once(']').map_or(rest, |(host, _)| host);
    }
    match field.rsplit_once(':') {
        // More than one colon without brackets: a bare IPv6 address.
        Some((host, _)) if host.contains(':') => field,
        Some((host, _)) => host,
        None => field,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const VIP: &str = "10.0.0.100";

    const DUMP: &str = "\
IP Virtual Server version 1.2.1 (size=4096)
Prot LocalAddress:Port Scheduler Flags
  -> RemoteAddress:Port           Forward Weight ActiveConn InActConn
TCP  10.0.0.100:3306 rr
  -> 10.0.0.5:3306                Route   1      0          0
  -> 10.0.0.6:3306                Route   1      5          0
TCP  10.0.0.200:5432 rr
  -> 10.0.0.9:5432                Route   1      7          0
";

    #[test]
    fn skips_zero_weight_and_picks_first_positive() {
        let lookup = RoutingTableParser::new().find_active_backend(DUMP, VIP);
        assert_eq!(
            lookup,
            RouteLookup::Found(RouteEntry {
                backend: "10.0.0.6".into(),
                weight: 5,
            })
        );
        assert_eq!(lookup.candidate().map(NodeAddress::as_str), Some("10.0.0.6"));
    }

    #[test]
    fn minimal_section_without_preamble() {
        let dump = "10.0.0.100\n-> 10.0.0.5:3306 Route 1 0 0\n-> 10.0.0.6:3306 Route 1 5 0\n";
        let lookup = RoutingTableParser::new().find_active_backend(dump, VIP);
        assert_eq!(lookup.candidate().map(NodeAddress::as_str), Some("10.0.0.6"));
    }

    #[test]
    fn section_stops_at_next_header() {
        let dump = "\
TCP  10.0.0.100:3306 rr
  -> 10.0.0.5:3306                Route   1      0          0
TCP  10.0.0.200:5432 rr
  -> 10.0.0.9:5432                Route   1      7          0
";
        let lookup = RoutingTableParser::new().find_active_backend(dump, VIP);
        assert_eq!(lookup, RouteLookup::NoPositiveWeight { entries: 1 });
    }

    #[test]
    fn other_vip_is_parsed_independently() {
        let lookup = RoutingTableParser::new().find_active_backend(DUMP, "10.0.0.200");
        assert_eq!(lookup.candidate().map(NodeAddress::as_str), Some("10.0.0.9"));
    }

    #[test]
    fn missing_vip_is_no_section() {
        let lookup = RoutingTableParser::new().find_active_backend(DUMP, "10.0.0.250");
        assert_eq!(lookup, RouteLookup::NoSection);
        assert_eq!(lookup.candidate(), None);
    }

    #[test]
    fn vip_prefix_does_not_match_longer_address() {
        let dump = "TCP  10.0.0.10:3306 rr\n  -> 10.0.0.5:3306 Route 1 5 0\n";
        let lookup = RoutingTableParser::new().find_active_backend(dump, "10.0.0.1");
        assert_eq!(lookup, RouteLookup::NoSection);
    }

    #[test]
    fn empty_section_is_no_entries() {
        let dump = "TCP  10.0.0.100:3306 rr\nTCP  10.0.0.200:5432 rr\n";
        let lookup = RoutingTableParser::new().find_active_backend(dump, VIP);
        assert_eq!(lookup, RouteLookup::NoEntries);
    }

    #[test]
    fn malformed_entries_degrade_to_no_candidate() {
        let dump = "TCP  10.0.0.100:3306 rr\n  -> garbage\n  -> 10.0.0.5:3306 Route x y z\n";
        let lookup = RoutingTableParser::new().find_active_backend(dump, VIP);
        assert_eq!(lookup, RouteLookup::NoEntries);
    }

    #[test]
    fn empty_dump_is_no_section() {
        assert_eq!(
            RoutingTableParser::new().find_active_backend("", VIP),
            RouteLookup::NoSection
        );
    }

    #[test]
    fn weight_field_is_configurable() {
        // Reading the Weight column: 10.0.0.5 has weight 1.
        let parser = RoutingTableParser::with_weight_field(3);
        let lookup = parser.find_active_backend(DUMP, VIP);
        assert_eq!(lookup.candidate().map(NodeAddress::as_str), Some("10.0.0.5"));
    }

    #[test]
    fn weight_field_zero_is_clamped() {
        assert_eq!(RoutingTableParser::with_weight_field(0).weight_field(), 1);
    }

    #[test]
    fn ipv6_backends_lose_port() {
        let dump = "TCP  [fd00::100]:3306 rr\n  -> [fd00::6]:3306 Route 1 2 0\n";
        let lookup = RoutingTableParser::new().find_active_backend(dump, "fd00::100");
        assert_eq!(lookup.candidate().map(NodeAddress::as_str), Some("fd00::6"));
    }

    #[test]
    fn legend_line_is_not_an_entry() {
        let parser = RoutingTableParser::new();
        assert_eq!(
            parser.parse_entry("  -> RemoteAddress:Port Forward Weight ActiveConn InActConn"),
            None
        );
    }

    #[test]
    fn detects_virtual_services() {
        assert!(has_virtual_services(DUMP));
        assert!(!has_virtual_services(
            "IP Virtual Server version 1.2.1 (size=4096)\nProt LocalAddress:Port Scheduler Flags\n"
        ));
    }

    #[test]
    fn interface_listing_matches_whole_address() {
        let listing = "\
2: eth0    inet 10.0.0.11/24 brd 10.0.0.255 scope global eth0
2: eth0    inet 10.0.0.100/32 scope global eth0
";
        assert!(lists_address(listing, "10.0.0.100"));
        assert!(lists_address(listing, "10.0.0.11"));
        assert!(!lists_address(listing, "10.0.0.1"));
        assert!(!lists_address("", "10.0.0.100"));
    }

    #[test]
    fn strip_port_forms() {
        assert_eq!(strip_port("10.0.0.6:3306"), "10.0.0.6");
        assert_eq!(strip_port("10.0.0.6"), "10.0.0.6");
        assert_eq!(strip_port("[fd00::6]:3306"), "fd00::6");
        assert_eq!(strip_port("fd00::6"), "fd00::6");
    }

    #[test]
    fn describe_outcomes() {
        assert!(RouteLookup::NoSection.describe().contains("not present"));
        assert!(RouteLookup::NoPositiveWeight { entries: 2 }
            .describe()
            .contains("2 routing entries"));
    }
}
