macro_rules! attribute_types {
    ($($(#[$doc:meta])* $name:ident = $value:literal,)+) => {
        /// Standard attribute numbers (RFC 2865, 2866, 2869, 2868)
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
        #[repr(u8)]
        pub enum AttributeType {
            $($(#[$doc])* $name = $value,)+
        }

        impl AttributeType {
            pub fn from_u8(value: u8) -> Option<Self> {
                match value {
                    $($value => Some(AttributeType::$name),)+
                    _ => None,
                }
            }
        }
    };
}

attribute_types! {
    UserName = 1,
    /// Hidden with the shared secret (RFC 2865 §5.2)
    UserPassword = 2,
    ChapPassword = 3,
    NasIpAddress = 4,
    NasPort = 5,
    ServiceType = 6,
    FramedProtocol = 7,
    FramedIpAddress = 8,
    FramedIpNetmask = 9,
    FilterId = 11,
    FramedMtu = 12,
    ReplyMessage = 18,
    State = 24,
    Class = 25,
    VendorSpecific = 26,
    SessionTimeout = 27,
    IdleTimeout = 28,
    CalledStationId = 30,
    CallingStationId = 31,
    NasIdentifier = 32,
    ProxyState = 33,
    AcctStatusType = 40,
    AcctDelayTime = 41,
    AcctInputOctets = 42,
    AcctOutputOctets = 43,
    AcctSessionId = 44,
    AcctAuthentic = 45,
    AcctSessionTime = 46,
    AcctInputPackets = 47,
    AcctOutputPackets = 48,
    AcctTerminateCause = 49,
    AcctMultiSessionId = 50,
    /// High 32 bits of the 64-bit input octet counter (RFC 2869)
    AcctInputGigawords = 52,
    AcctOutputGigawords = 53,
    EventTimestamp = 55,
    ChapChallenge = 60,
    NasPortType = 61,
    ConnectInfo = 77,
    EapMessage = 79,
    MessageAuthenticator = 80,
    AcctInterimInterval = 85,
    NasPortId = 87,
    FramedPool = 88,
}

impl AttributeType {
    pub fn as_u8(self) -> u8 {
        self as u8
    }
}
