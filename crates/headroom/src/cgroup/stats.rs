//! Parsers for cgroup v2 interface files.

use std::collections::HashMap;

use headroom_common::{HeadroomError, HeadroomResult};

use crate::device::{DeviceNumber, IoCounters, parse_device_number};

fn malformed(file: &str, message: impl Into<String>) -> HeadroomError {
    HeadroomError::MalformedStats {
        source_file: file.to_string(),
        message: message.into(),
    }
}

/// Parse a single-value file such as `memory.current`.
pub(super) fn parse_value(content: &str, file: &str) -> HeadroomResult<u64> {
    content
        .trim()
        .parse()
        .map_err(|e| malformed(file, format!("{e}: {:?}", content.trim())))
}

/// Parse `memory.max`; `max` means unbounded.
pub(super) fn parse_limit(content: &str, file: &str) -> HeadroomResult<Option<u64>> {
    match content.trim() {
        "max" => Ok(None),
        _ => parse_value(content, file).map(Some),
    }
}

/// Extract `usage_usec` from `cpu.stat`.
pub(super) fn parse_cpu_usage(content: &str) -> HeadroomResult<u64> {
    for line in content.lines() {
        let parts: Vec<&str> = line.split_whitespace().collect();
        if let ["usage_usec", value, ..] = parts.as_slice() {
            return parse_value(value, "cpu.stat");
        }
    }
    Err(malformed("cpu.stat", "missing usage_usec"))
}

/// Parse `io.stat`.
///
/// Format: `MAJ:MIN rbytes=N wbytes=N rios=N wios=N dbytes=N dios=N`
pub(super) fn parse_io_stat(content: &str) -> HeadroomResult<HashMap<DeviceNumber, IoCounters>> {
    let mut devices = HashMap::new();

    for line in content.lines() {
        let mut parts = line.split_whitespace();
        let Some(device) = parts.next() else {
            continue;
        };
        let device = parse_device_number(device, "io.stat")?;

        let mut counters = IoCounters::default();
        for part in parts {
            if let Some((key, value)) = part.split_once('=') {
                match key {
                    "rbytes" => counters.read_bytes = parse_value(value, "io.stat")?,
                    "wbytes" => counters.write_bytes = parse_value(value, "io.stat")?,
                    _ => {}
                }
            }
        }

        devices.insert(device, counters);
    }

    Ok(devices)
}
