//! Vendor-Specific Attributes (RFC 2865 §5.26)
//!
//! Every VSA is carried inside attribute 26 using the recommended layout:
//!
//! ```text
//! +--------+--------+------------------------------------+
//! |  26    | Length |           Vendor-Id (4)            |
//! +--------+--------+--------+--------+------------------+
//! | Vendor type     | Vendor length   |  Value ...
//! +-----------------+-----------------+------------------
//! ```
//!
//! The dictionaries below only list the sub-attributes this crate's users
//! exchange with NAS equipment.

use crate::attributes::{Attribute, AttributeType};
use crate::packet::PacketError;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VendorAttribute {
    pub vendor_id: u32,
    pub vendor_type: u8,
    pub value: Vec<u8>,
}

impl VendorAttribute {
    /// Vendor-Id plus sub-attribute header
    const OVERHEAD: usize = 6;

    pub fn new(vendor_id: u32, vendor_type: u8, value: Vec<u8>) -> Self {
        VendorAttribute {
            vendor_id,
            vendor_type,
            value,
        }
    }

    pub fn string(vendor_id: u32, vendor_type: u8, value: impl Into<String>) -> Self {
        Self::new(vendor_id, vendor_type, value.into().into_bytes())
    }

    pub fn integer(vendor_id: u32, vendor_type: u8, value: u32) -> Self {
        Self::new(vendor_id, vendor_type, value.to_be_bytes().to_vec())
    }

    /// Wrap into a Vendor-Specific attribute.
    pub fn into_attribute(self) -> Result<Attribute, PacketError> {
        let sub_length = self.value.len() + 2;
        if sub_length > u8::MAX as usize {
            return Err(PacketError::AttributeError(format!(
                "vendor {} attribute {} value too long: {} bytes",
                self.vendor_id,
                self.vendor_type,
                self.value.len()
            )));
        }

        let mut payload = Vec::with_capacity(self.value.len() + Self::OVERHEAD);
        payload.extend_from_slice(&self.vendor_id.to_be_bytes());
        payload.push(self.vendor_type);
        payload.push(sub_length as u8);
        payload.extend_from_slice(&self.value);
        Attribute::new(AttributeType::VendorSpecific as u8, payload)
    }

    /// Split the value of a Vendor-Specific attribute into its sub-attributes.
    pub fn parse_all(payload: &[u8]) -> Result<Vec<VendorAttribute>, PacketError> {
        if payload.len() < Self::OVERHEAD {
            return Err(PacketError::AttributeError(format!(
                "Vendor-Specific payload too short: {} bytes",
                payload.len()
            )));
        }

        let vendor_id = u32::from_be_bytes([payload[0], payload[1], payload[2], payload[3]]);
        let mut rest = &payload[4..];
        let mut found = Vec::new();
        while !rest.is_empty() {
            if rest.len() < 2 {
                return Err(PacketError::AttributeError(
                    "truncated vendor sub-attribute".to_string(),
                ));
            }
            let vendor_type = rest[0];
            let sub_length = rest[1] as usize;
            if sub_length < 2 || sub_length > rest.len() {
                return Err(PacketError::AttributeError(format!(
                    "vendor {} sub-attribute {} has bad length {}",
                    vendor_id, vendor_type, sub_length
                )));
            }
            found.push(VendorAttribute::new(
                vendor_id,
                vendor_type,
                rest[2..sub_length].to_vec(),
            ));
            rest = &rest[sub_length..];
        }
        Ok(found)
    }

    pub fn as_text(&self) -> String {
        String::from_utf8_lossy(&self.value).into_owned()
    }

    pub fn as_integer(&self) -> Option<u32> {
        let bytes: [u8; 4] = self.value.as_slice().try_into().ok()?;
        Some(u32::from_be_bytes(bytes))
    }
}

pub mod huawei {
    pub const VENDOR_ID: u32 = 2011;
    pub const INPUT_BURST_SIZE: u8 = 1;
    pub const INPUT_AVERAGE_RATE: u8 = 2;
    pub const INPUT_PEAK_RATE: u8 = 3;
    pub const OUTPUT_BURST_SIZE: u8 = 4;
    pub const OUTPUT_AVERAGE_RATE: u8 = 5;
    pub const OUTPUT_PEAK_RATE: u8 = 6;
    pub const DOMAIN_NAME: u8 = 138;
}

pub mod h3c {
    pub const VENDOR_ID: u32 = 25506;
    pub const INPUT_PEAK_RATE: u8 = 1;
    pub const INPUT_AVERAGE_RATE: u8 = 2;
    pub const OUTPUT_PEAK_RATE: u8 = 4;
    pub const OUTPUT_AVERAGE_RATE: u8 = 5;
    /// "ipv4-address mac-address" reported by the BRAS
    pub const IP_HOST_ADDR: u8 = 60;
}

pub mod zte {
    pub const VENDOR_ID: u32 = 3902;
    pub const CONTEXT_NAME: u8 = 4;
    pub const RATE_CTRL_SCR_DOWN: u8 = 83;
    pub const RATE_CTRL_SCR_UP: u8 = 89;
}

pub mod radback {
    pub const VENDOR_ID: u32 = 2352;
    pub const CONTEXT_NAME: u8 = 4;
    pub const SUBSCRIBER_PROFILE_NAME: u8 = 91;
    pub const MAC_ADDR: u8 = 145;
}

pub mod cisco {
    pub const VENDOR_ID: u32 = 9;
    pub const AV_PAIR: u8 = 1;
}

pub mod mikrotik {
    pub const VENDOR_ID: u32 = 14988;
    pub const RATE_LIMIT: u8 = 8;
}

pub mod ikuai {
    pub const VENDOR_ID: u32 = 10055;
    pub const UPSTREAM_SPEED_LIMIT: u8 = 1;
    pub const DOWNSTREAM_SPEED_LIMIT: u8 = 2;
}

pub mod microsoft {
    pub const VENDOR_ID: u32 = 311;
    pub const MPPE_ENCRYPTION_POLICY: u8 = 7;
    pub const MPPE_ENCRYPTION_TYPES: u8 = 8;
    pub const CHAP_CHALLENGE: u8 = 11;
    pub const MPPE_SEND_KEY: u8 = 16;
    pub const MPPE_RECV_KEY: u8 = 17;
    pub const CHAP2_RESPONSE: u8 = 25;
    pub const CHAP2_SUCCESS: u8 = 26;

    pub const ENCRYPTION_ALLOWED: u32 = 1;
    /// RC4 with 40- or 128-bit keys
    pub const RC4_40_OR_128_BIT_ALLOWED: u32 = 6;
}
