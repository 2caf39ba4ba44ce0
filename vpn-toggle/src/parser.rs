// Parsers for networksetup output

//! Service listing and status parsing
//!
//! Turns the raw text printed by the OS service tools into the typed data
//! model. Both parsers are total: malformed input degrades to an empty list
//! or [`Status::Invalid`], never to an error.

use crate::types::{Connection, Status};
use std::collections::HashSet;

/// Services that are never VPN profiles, regardless of configuration
pub const EXCLUDED_SERVICES: [&str; 3] = ["Wi-Fi", "Bluetooth PAN", "Thunderbolt Bridge"];

/// Marker printed next to disabled services
const DISABLED_MARKER: &str = "(*)";

const HARDWARE_PORT_LABEL: &str = "Hardware Port:";
const DEVICE_LABEL: &str = "Device:";

/// Record being assembled while walking the listing
#[derive(Default)]
struct PendingRecord {
    name: String,
    hardware_port: Option<String>,
    device: String,
}

/// Check whether a service name is excluded (case-insensitive)
pub fn is_excluded(name: &str, extra_excluded: &[String]) -> bool {
    let name = name.trim();
    EXCLUDED_SERVICES
        .iter()
        .copied()
        .chain(extra_excluded.iter().map(String::as_str))
        .any(|excluded| excluded.trim().eq_ignore_ascii_case(name))
}

/// Parse the header of a record, e.g. `(1) CorpVPN` or `(*) Old VPN`
/// Returns the service name with index and disabled marker removed
fn parse_record_header(line: &str) -> Option<String> {
    let line = line.trim();
    let inner_end = line.strip_prefix('(')?.find(')')?;
    let token = &line[1..=inner_end];

    if token != "*" && (token.is_empty() || !token.chars().all(|c| c.is_ascii_digit())) {
        return None;
    }

    let name = line.replace(DISABLED_MARKER, "");
    let name = name.trim();
    // Strip the index token if the disabled marker came first
    let name = match name.strip_prefix('(') {
        Some(rest) => match rest.split_once(')') {
            Some((index, tail)) if index.chars().all(|c| c.is_ascii_digit()) => tail,
            _ => name,
        },
        None => name,
    };

    Some(name.trim().to_string())
}

/// Parse `(Hardware Port: VPN, Device: ppp0)` into (port, device)
fn parse_hardware_line(line: &str) -> (String, String) {
    let inner = line.trim();
    let inner = inner.strip_prefix('(').unwrap_or(inner);
    let inner = inner.strip_suffix(')').unwrap_or(inner);

    let (port_part, device_part) = match inner.split_once(',') {
        Some((port, device)) => (port, device),
        None => (inner, ""),
    };

    let port = port_part
        .trim()
        .trim_start_matches(HARDWARE_PORT_LABEL)
        .trim()
        .to_string();
    let device = device_part
        .trim()
        .trim_start_matches(DEVICE_LABEL)
        .trim()
        .to_string();

    (port, device)
}

/// Finish a record: accept it unless it is incomplete, excluded or a duplicate
fn complete_record(
    record: PendingRecord,
    extra_excluded: &[String],
    seen: &mut HashSet<String>,
    connections: &mut Vec<Connection>,
) {
    let hardware_port = match record.hardware_port {
        Some(port) if !record.name.is_empty() && !port.is_empty() => port,
        _ => {
            log::debug!("Skipping incomplete service record '{}'", record.name);
            return;
        }
    };

    if is_excluded(&record.name, extra_excluded) {
        log::debug!("Skipping excluded service '{}'", record.name);
        return;
    }

    if !seen.insert(record.name.clone()) {
        log::debug!("Skipping duplicate service '{}'", record.name);
        return;
    }

    connections.push(Connection::new(record.name, hardware_port).with_device(record.device));
}

/// Parse `networksetup -listnetworkserviceorder` output into candidate connections
///
/// Priority order of the listing is preserved and every connection starts
/// Disconnected. Records without a name or hardware port are skipped, as are
/// the fixed [`EXCLUDED_SERVICES`] and any names in `extra_excluded`.
pub fn parse_service_list(output: &str, extra_excluded: &[String]) -> Vec<Connection> {
    let mut connections = Vec::new();
    let mut seen = HashSet::new();
    let mut current: Option<PendingRecord> = None;

    for line in output.lines() {
        if let Some(name) = parse_record_header(line) {
            if let Some(record) = current.take() {
                complete_record(record, extra_excluded, &mut seen, &mut connections);
            }
            current = Some(PendingRecord {
                name,
                ..Default::default()
            });
        } else if line.contains(HARDWARE_PORT_LABEL) {
            // Only the first hardware line after a header belongs to it
            if let Some(record) = current.as_mut().filter(|r| r.hardware_port.is_none()) {
                let (port, device) = parse_hardware_line(line);
                record.hardware_port = Some(port);
                record.device = device;
            }
        }
    }

    // Trailing record at end of input
    if let Some(record) = current.take() {
        complete_record(record, extra_excluded, &mut seen, &mut connections);
    }

    connections
}

/// Map `networksetup -showpppoestatus` output to a status
///
/// Case-insensitive and whitespace-tolerant; anything unrecognised
/// (including empty text) is [`Status::Invalid`].
pub fn resolve_status(output: &str) -> Status {
    match output.trim().to_ascii_lowercase().as_str() {
        "connected" => Status::Connected,
        "connecting" => Status::Connecting,
        "disconnecting" => Status::Disconnecting,
        "disconnected" => Status::Disconnected,
        _ => Status::Invalid,
    }
}
