//! Logical CIP constants shared across the service composer: class codes,
//! path segment type bytes, service codes, and the fixed Forward
//! Open/Close timing parameters.

/// CIP class codes used by this core.
pub mod class_code {
    pub const MESSAGE_ROUTER: u8 = 0x02;
    pub const CONNECTION_MANAGER: u8 = 0x06;
    pub const IDENTITY: u8 = 0x01;
}

/// EPATH logical segment type bytes.
pub mod segment {
    pub const CLASS_ID_8_BIT: u8 = 0x20;
    pub const CLASS_ID_16_BIT: u8 = 0x21;
    pub const INSTANCE_ID_8_BIT: u8 = 0x24;
    pub const INSTANCE_ID_16_BIT: u8 = 0x25;
    pub const ELEMENT_ID_8_BIT: u8 = 0x28;
    pub const ELEMENT_ID_16_BIT: u8 = 0x29;
    pub const ELEMENT_ID_32_BIT: u8 = 0x2A;
    pub const EXTENDED_SYMBOLIC: u8 = 0x91;
    pub const PADDING: u8 = 0x00;
}

/// CIP service codes used by this core.
pub mod service_code {
    pub const FORWARD_OPEN: u8 = 0x54;
    pub const LARGE_FORWARD_OPEN: u8 = 0x5B;
    pub const FORWARD_CLOSE: u8 = 0x4E;
    pub const UNCONNECTED_SEND: u8 = 0x52;
    pub const MULTIPLE_SERVICE_PACKET: u8 = 0x0A;
    pub const GET_ATTRIBUTES_ALL: u8 = 0x01;
}

/// Fixed timing parameters for Forward Open / Forward Close requests.
pub const PRIORITY_TIME_TICK: u8 = 0x0A;
pub const TIMEOUT_TICKS: u8 = 0x0E;
/// Class 3 (server) connected transport class.
pub const TRANSPORT_CLASS: u8 = 0xA3;

/// Connection size in bytes for a standard Forward Open.
pub const CONNECTION_SIZE_STANDARD: u16 = 500;
/// Connection size in bytes for a Large Forward Open.
pub const CONNECTION_SIZE_LARGE: u32 = 4002;
