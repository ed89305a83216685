//! # enip-cip-core
//!
//! EtherNet/IP encapsulation and CIP session core: the byte-level plumbing
//! for establishing a session with an industrial controller over TCP port
//! 44818, negotiating a Class 3 connection via Connection Manager Forward
//! Open/Forward Close, and framing the Common Packet Format payloads that
//! carry CIP service requests.
//!
//! This crate is deliberately narrow. It does not provide a CLI, a
//! configuration-file loader, or typed tag read/write convenience APIs —
//! those are external collaborators built on top of the primitives here.
//! What it does provide is meant to be correct down to the byte: every
//! field in the encapsulation header and CPF item list has a fixed offset,
//! width, and endianness, and getting any of them wrong corrupts the
//! session.
//!
//! ## Layering
//!
//! ```text
//! Service Composer (service)  -- builds/parses Forward Open, Identity, ...
//!         |
//! CPF Builder (cpf)           -- wraps a service body in the item list
//!         |
//! Encapsulation Framer (encapsulation) -- wraps the CPF in the 24-byte header
//!         |
//! Transport (transport)       -- carries the framed bytes over TCP
//! ```
//!
//! [`Session`] is the only stateful piece; everything below it is a pure
//! transformer between byte slices and typed values.

pub mod codec;
pub mod consts;
pub mod cpf;
pub mod encapsulation;
pub mod epath;
pub mod error;
pub mod service;
pub mod session;
pub mod transport;

pub use epath::create_tag_rp;
pub use error::{CipError, CipResult};
pub use session::{Session, SessionConfig, SessionState};
pub use transport::{TcpTransport, Transport};

/// The current version of this crate.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Default configuration values, mirroring the defaults the original
/// implementation hard-coded.
pub mod defaults {
    /// Standard EtherNet/IP encapsulation port.
    pub const PORT: u16 = 44818;

    /// Default per-request timeout, in seconds.
    pub const TIMEOUT_SECS: u64 = 10;

    /// Default backplane slot addressed by a backplane-routed connection.
    pub const CPU_SLOT: u8 = 0;

    /// Default Requested Packet Interval, in microseconds.
    pub const RPI_US: u32 = 5000;

    /// Sender context echoed on every encapsulation header.
    pub const SENDER_CONTEXT: [u8; 8] = *b"_pycomm_";
}
