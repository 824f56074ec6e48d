//! RADIUS protocol library
//!
//! Packet codec and the cryptographic pieces a multi-vendor AAA server needs:
//! RFC 2865/2866/2869 packets and attributes, vendor-specific attributes,
//! request/response authenticators, the User-Password and salted attribute
//! ciphers, CHAP, and MS-CHAPv2 with MPPE key derivation (RFC 2759, 3079).
//!
//! ```rust
//! use radius_proto::{Attribute, AttributeType, Code, Packet};
//! use radius_proto::auth::{encrypt_user_password, generate_request_authenticator};
//!
//! let req_auth = generate_request_authenticator();
//! let mut packet = Packet::new(Code::AccessRequest, 1, req_auth);
//! packet.add_attribute(Attribute::string(AttributeType::UserName as u8, "alice").unwrap());
//! packet.add_attribute(
//!     Attribute::new(
//!         AttributeType::UserPassword as u8,
//!         encrypt_user_password("password", b"secret", &req_auth),
//!     )
//!     .unwrap(),
//! );
//! let bytes = packet.encode().unwrap();
//! assert_eq!(Packet::decode(&bytes).unwrap().identifier, 1);
//! ```

pub mod accounting;
pub mod attributes;
pub mod auth;
pub mod chap;
pub mod mschap;
pub mod packet;
pub mod vendor;

pub use accounting::{octets_with_gigawords, AccountingError, AcctStatusType};
pub use attributes::{Attribute, AttributeType};
pub use auth::{
    calculate_accounting_request_authenticator, calculate_response_authenticator,
    decrypt_user_password, encrypt_user_password, generate_request_authenticator, sign_request,
    sign_response, verify_accounting_request_authenticator, verify_response_authenticator,
};
pub use chap::{compute_chap_response, verify_chap_response, ChapChallenge, ChapError, ChapResponse};
pub use mschap::{verify_mschap_v2, MsChapError, MsChapV2Response, MsChapV2Success};
pub use packet::{Code, Packet, PacketError};
pub use vendor::VendorAttribute;
