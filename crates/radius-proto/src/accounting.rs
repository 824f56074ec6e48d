//! Accounting attribute values (RFC 2866, RFC 2869)

use thiserror::Error;

/// Acct-Status-Type (RFC 2866 §5.1)
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u32)]
pub enum AcctStatusType {
    Start = 1,
    Stop = 2,
    InterimUpdate = 3,
    /// NAS (re)booted; all its earlier sessions are gone
    AccountingOn = 7,
    AccountingOff = 8,
}

impl AcctStatusType {
    pub fn from_u32(value: u32) -> Option<Self> {
        Some(match value {
            1 => AcctStatusType::Start,
            2 => AcctStatusType::Stop,
            3 => AcctStatusType::InterimUpdate,
            7 => AcctStatusType::AccountingOn,
            8 => AcctStatusType::AccountingOff,
            _ => return None,
        })
    }

    pub fn as_u32(self) -> u32 {
        self as u32
    }

    /// Whether the request reports on a single subscriber session.
    pub fn is_session_status(self) -> bool {
        matches!(
            self,
            AcctStatusType::Start | AcctStatusType::Stop | AcctStatusType::InterimUpdate
        )
    }
}

/// Combine a 32-bit octet counter with its gigaword overflow counter.
pub fn octets_with_gigawords(octets: u32, gigawords: u32) -> u64 {
    (u64::from(gigawords) << 32) | u64::from(octets)
}

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum AccountingError {
    #[error("Missing required attribute: {0}")]
    MissingAttribute(&'static str),
    #[error("Invalid Acct-Status-Type value: {0}")]
    InvalidStatusType(u32),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_type_values() {
        for status in [
            AcctStatusType::Start,
            AcctStatusType::Stop,
            AcctStatusType::InterimUpdate,
            AcctStatusType::AccountingOn,
            AcctStatusType::AccountingOff,
        ] {
            assert_eq!(AcctStatusType::from_u32(status.as_u32()), Some(status));
        }
        assert_eq!(AcctStatusType::from_u32(4), None);
        assert!(AcctStatusType::Stop.is_session_status());
        assert!(!AcctStatusType::AccountingOn.is_session_status());
    }

    #[test]
    fn test_gigaword_correction() {
        assert_eq!(octets_with_gigawords(1_000_000, 0), 1_000_000);
        assert_eq!(octets_with_gigawords(5, 2), 2 * 4_294_967_296 + 5);
        assert_eq!(octets_with_gigawords(u32::MAX, u32::MAX), u64::MAX);
    }
}
