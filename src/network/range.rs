//! Parsing of IP list entries used by `static` and `reserved` declarations.
//!
//! An entry is a single address (`10.0.0.5`), an inclusive range
//! (`10.0.0.5 - 10.0.0.9`) or a CIDR block (`10.0.0.8/30`).

use ipnetwork::Ipv4Network;
use std::net::Ipv4Addr;

use crate::error::NetworkError;

/// Parses one entry into its inclusive first and last address.
///
/// # Errors
///
/// Returns an error if the entry is malformed or the range is reversed.
pub fn parse_ip_range(entry: &str) -> Result<(Ipv4Addr, Ipv4Addr), NetworkError> {
    let entry = entry.trim();

    if let Some((first, last)) = entry.split_once('-') {
        let first = parse_addr(entry, first)?;
        let last = parse_addr(entry, last)?;
        if u32::from(first) > u32::from(last) {
            return Err(NetworkError::invalid_range(
                entry,
                "range start is after range end",
            ));
        }
        return Ok((first, last));
    }

    if entry.contains('/') {
        let block: Ipv4Network = entry
            .parse()
            .map_err(|e| NetworkError::invalid_range(entry, format!("{e}")))?;
        return Ok((block.network(), block.broadcast()));
    }

    let ip = parse_addr(entry, entry)?;
    Ok((ip, ip))
}

/// Expands a list of entries into individual addresses, in declaration order.
///
/// # Errors
///
/// Returns an error if any entry fails to parse.
pub fn parse_ip_list(entries: &[String]) -> Result<Vec<Ipv4Addr>, NetworkError> {
    let mut ips = Vec::new();
    for entry in entries {
        let (first, last) = parse_ip_range(entry)?;
        ips.extend((u32::from(first)..=u32::from(last)).map(Ipv4Addr::from));
    }
    Ok(ips)
}

fn parse_addr(entry: &str, part: &str) -> Result<Ipv4Addr, NetworkError> {
    part.trim()
        .parse()
        .map_err(|e| NetworkError::invalid_range(entry, format!("'{}': {e}", part.trim())))
}
