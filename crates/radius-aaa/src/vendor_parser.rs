//! MAC address and VLAN extraction per NAS dialect
//!
//! Nothing here fails: attributes that are missing or malformed leave the
//! corresponding field empty or zero and log a warning.

use crate::models::{Vendor, VendorRequest};
use once_cell::sync::Lazy;
use radius_proto::vendor::{h3c, radback};
use radius_proto::{AttributeType, Packet};
use regex::Regex;
use tracing::warn;

/// `slot/subslot/port:vlan1[.vlan2]`, e.g. `eth 3/0/1:100.200`
static VLAN_PORT_FORM: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"\w?\s?\d+/\d+/\d+:(\d+)(\.(\d+))?\s?").expect("VLAN port regex is valid")
});

/// `vlanid=100;vlanid2=200;`
static VLAN_KEY_FORM: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"vlanid=(\d+);(vlanid2=?(\d+);)?").expect("VLAN key regex is valid")
});

const MAC_TEXT_LEN: usize = 17;

/// Parse the two VLAN tags out of a NAS-Port-Id value.
pub fn parse_vlan_ids(nas_port_id: &str) -> (u32, u32) {
    let captures = VLAN_PORT_FORM
        .captures(nas_port_id)
        .or_else(|| VLAN_KEY_FORM.captures(nas_port_id));

    let Some(captures) = captures else {
        return (0, 0);
    };

    let parse = |idx: usize| -> u32 {
        captures
            .get(idx)
            .and_then(|m| m.as_str().parse().ok())
            .unwrap_or_else(|| {
                warn!(nas_port_id = %nas_port_id, "VLAN id out of range in NAS-Port-Id");
                0
            })
    };

    let vlanid1 = parse(1);
    let vlanid2 = if captures.get(2).is_some() { parse(3) } else { 0 };
    (vlanid1, vlanid2)
}

/// Extract the subscriber MAC and VLAN tags the way `vendor` reports them.
pub fn parse_vendor_request(packet: &Packet, vendor: Vendor) -> VendorRequest {
    let macaddr = match vendor {
        Vendor::H3c => h3c_mac(packet),
        Vendor::Zte => zte_mac(packet),
        Vendor::Radback => radback_mac(packet),
        _ => default_mac(packet),
    };

    let (vlanid1, vlanid2) = packet
        .string_attribute(AttributeType::NasPortId as u8)
        .filter(|value| !value.is_empty())
        .map(|value| parse_vlan_ids(&value))
        .unwrap_or((0, 0));

    VendorRequest {
        macaddr,
        vlanid1,
        vlanid2,
    }
}

fn calling_station_id(packet: &Packet) -> String {
    packet
        .string_attribute(AttributeType::CallingStationId as u8)
        .unwrap_or_default()
}

fn default_mac(packet: &Packet) -> String {
    let value = calling_station_id(packet);
    if value.is_empty() {
        warn!("Calling-Station-Id is empty");
    }
    value.replace('-', ":")
}

/// H3C reports `<ip> <mac>` in H3C-IP-Host-Addr; the MAC is the last 17 chars.
fn h3c_mac(packet: &Packet) -> String {
    let host_addr = packet
        .find_vendor_attribute(h3c::VENDOR_ID, h3c::IP_HOST_ADDR)
        .map(|vsa| vsa.as_text())
        .unwrap_or_default();

    if host_addr.len() >= MAC_TEXT_LEN && host_addr.is_char_boundary(host_addr.len() - MAC_TEXT_LEN) {
        return host_addr[host_addr.len() - MAC_TEXT_LEN..].to_string();
    }
    if host_addr.is_empty() {
        warn!("H3C-IP-Host-Addr is empty, using Calling-Station-Id");
    } else {
        warn!(value = %host_addr, "H3C-IP-Host-Addr is malformed, using Calling-Station-Id");
    }
    default_mac(packet)
}

/// ZTE sends the MAC as twelve bare hex digits in Calling-Station-Id.
fn zte_mac(packet: &Packet) -> String {
    let value = calling_station_id(packet);
    let digits = value.get(..12).filter(|d| d.bytes().all(|b| b.is_ascii_hexdigit()));
    match digits {
        Some(digits) => digits
            .as_bytes()
            .chunks(2)
            .map(|pair| String::from_utf8_lossy(pair).into_owned())
            .collect::<Vec<_>>()
            .join(":"),
        None => {
            warn!(value = %value, "ZTE Calling-Station-Id is not 12 hex digits");
            String::new()
        }
    }
}

fn radback_mac(packet: &Packet) -> String {
    match packet.find_vendor_attribute(radback::VENDOR_ID, radback::MAC_ADDR) {
        Some(vsa) => vsa.as_text().replace('-', ":"),
        None => {
            warn!("Redback Mac-Addr is empty");
            String::new()
        }
    }
}
