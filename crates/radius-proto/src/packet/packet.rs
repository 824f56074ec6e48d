use super::Code;
use crate::attributes::{Attribute, AttributeType};
use crate::vendor::VendorAttribute;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum PacketError {
    #[error("Invalid packet length: {0}")]
    InvalidLength(usize),
    #[error("Invalid packet code: {0}")]
    InvalidCode(u8),
    #[error("Attribute error: {0}")]
    AttributeError(String),
    #[error("Packet too large: {0} bytes")]
    PacketTooLarge(usize),
}

/// A decoded RADIUS packet (RFC 2865 §3)
///
/// ```text
///  0                   1                   2                   3
///  0 1 2 3 4 5 6 7 8 9 0 1 2 3 4 5 6 7 8 9 0 1 2 3 4 5 6 7 8 9 0 1
/// +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
/// |     Code      |  Identifier   |            Length             |
/// +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
/// |                         Authenticator (16)                    |
/// +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
/// |  Attributes ...
/// +-+-+-+-+-+-+-+-+-+-+-+-+-
/// ```
#[derive(Debug, Clone)]
pub struct Packet {
    pub code: Code,
    pub identifier: u8,
    pub authenticator: [u8; 16],
    pub attributes: Vec<Attribute>,
}

impl Packet {
    pub const HEADER_SIZE: usize = 20;
    pub const MAX_PACKET_SIZE: usize = 4096;

    pub fn new(code: Code, identifier: u8, authenticator: [u8; 16]) -> Self {
        Packet {
            code,
            identifier,
            authenticator,
            attributes: Vec::new(),
        }
    }

    /// Start a response to `request`.
    ///
    /// The authenticator field holds the request authenticator until the
    /// response is signed, so attribute ciphers keyed on it (MS-MPPE keys)
    /// can be applied while the response is still being built.
    pub fn reply_to(request: &Packet, code: Code) -> Self {
        Packet::new(code, request.identifier, request.authenticator)
    }

    pub fn add_attribute(&mut self, attribute: Attribute) {
        self.attributes.push(attribute);
    }

    pub fn add_vendor_attribute(&mut self, vsa: VendorAttribute) -> Result<(), PacketError> {
        self.attributes.push(vsa.into_attribute()?);
        Ok(())
    }

    /// Copy every Proxy-State of `request` into this packet, in order (RFC 2865 §5.33).
    pub fn copy_proxy_state(&mut self, request: &Packet) {
        let proxy_states = request
            .find_all_attributes(AttributeType::ProxyState as u8)
            .into_iter()
            .cloned();
        self.attributes.extend(proxy_states);
    }

    pub fn encode(&self) -> Result<Vec<u8>, PacketError> {
        let total_length = self.length();
        if total_length > Self::MAX_PACKET_SIZE {
            return Err(PacketError::PacketTooLarge(total_length));
        }

        let mut buffer = Vec::with_capacity(total_length);
        buffer.push(self.code.as_u8());
        buffer.push(self.identifier);
        buffer.extend_from_slice(&(total_length as u16).to_be_bytes());
        buffer.extend_from_slice(&self.authenticator);
        for attr in &self.attributes {
            attr.encode_into(&mut buffer)?;
        }

        Ok(buffer)
    }

    pub fn decode(data: &[u8]) -> Result<Self, PacketError> {
        if data.len() < Self::HEADER_SIZE {
            return Err(PacketError::InvalidLength(data.len()));
        }

        let code = Code::from_u8(data[0]).ok_or(PacketError::InvalidCode(data[0]))?;
        let identifier = data[1];
        let length = u16::from_be_bytes([data[2], data[3]]) as usize;

        if !(Self::HEADER_SIZE..=Self::MAX_PACKET_SIZE).contains(&length) || data.len() < length {
            return Err(PacketError::InvalidLength(length));
        }

        let mut authenticator = [0u8; 16];
        authenticator.copy_from_slice(&data[4..Self::HEADER_SIZE]);

        // Octets past `length` are padding and ignored (RFC 2865 §3).
        let mut rest = &data[Self::HEADER_SIZE..length];
        let mut attributes = Vec::new();
        while !rest.is_empty() {
            let attr = Attribute::decode(rest)?;
            rest = &rest[attr.encoded_length()..];
            attributes.push(attr);
        }

        Ok(Packet {
            code,
            identifier,
            authenticator,
            attributes,
        })
    }

    /// Encoded size in octets.
    pub fn length(&self) -> usize {
        Self::HEADER_SIZE
            + self
                .attributes
                .iter()
                .map(Attribute::encoded_length)
                .sum::<usize>()
    }

    pub fn find_attribute(&self, attr_type: u8) -> Option<&Attribute> {
        self.attributes.iter().find(|a| a.attr_type == attr_type)
    }

    pub fn find_all_attributes(&self, attr_type: u8) -> Vec<&Attribute> {
        self.attributes
            .iter()
            .filter(|a| a.attr_type == attr_type)
            .collect()
    }

    /// Text value of the first attribute of `attr_type`; invalid UTF-8 is replaced.
    pub fn string_attribute(&self, attr_type: u8) -> Option<String> {
        self.find_attribute(attr_type).map(Attribute::as_text)
    }

    pub fn integer_attribute(&self, attr_type: u8) -> Option<u32> {
        self.find_attribute(attr_type)
            .and_then(|attr| attr.as_integer().ok())
    }

    /// All vendor sub-attributes carried in Vendor-Specific attributes.
    ///
    /// Malformed Vendor-Specific payloads are skipped.
    pub fn vendor_attributes(&self) -> Vec<VendorAttribute> {
        self.find_all_attributes(AttributeType::VendorSpecific as u8)
            .into_iter()
            .filter_map(|attr| VendorAttribute::parse_all(&attr.value).ok())
            .flatten()
            .collect()
    }

    pub fn find_vendor_attribute(&self, vendor_id: u32, vendor_type: u8) -> Option<VendorAttribute> {
        self.vendor_attributes()
            .into_iter()
            .find(|vsa| vsa.vendor_id == vendor_id && vsa.vendor_type == vendor_type)
    }
}
