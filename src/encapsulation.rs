//! EtherNet/IP encapsulation header framing.
//!
//! Every request and reply is wrapped in a fixed 24-byte header. Building
//! is infallible; parsing a reply validates length, session handle,
//! status, and sender-context echo, any mismatch of which is a
//! [`CipError::Protocol`].

use crate::codec::{pack_udint, pack_uint, unpack_udint, unpack_uint};
use crate::error::{CipError, CipResult};

/// Fixed size of the encapsulation header, in bytes.
pub const HEADER_LEN: usize = 24;

/// Sender context is a fixed 8-byte opaque echo field.
pub type SenderContext = [u8; 8];

/// Encapsulation command codes (Volume 2, Table 2-3.2).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u16)]
pub enum Command {
    Nop = 0x0000,
    ListIdentity = 0x0063,
    RegisterSession = 0x0065,
    UnRegisterSession = 0x0066,
    SendRrData = 0x006F,
    SendUnitData = 0x0070,
}

impl Command {
    fn code(self) -> u16 {
        self as u16
    }
}

/// A parsed encapsulation header plus the trailing data bytes.
#[derive(Debug, Clone)]
pub struct EncapsulationReply {
    pub command: u16,
    pub length: u16,
    pub session_handle: u32,
    pub status: u32,
    pub context: SenderContext,
    pub options: u32,
    pub data: Vec<u8>,
}

/// Build the 24-byte header for `command` carrying `data_len` bytes of
/// payload that follow it, addressed to `session_handle` and echoing
/// `context`. Status and options are always zero on a request.
pub fn build_header(
    command: Command,
    data_len: u16,
    session_handle: u32,
    context: &SenderContext,
) -> Vec<u8> {
    let mut header = Vec::with_capacity(HEADER_LEN);
    header.extend_from_slice(&pack_uint(command.code()));
    header.extend_from_slice(&pack_uint(data_len));
    header.extend_from_slice(&pack_udint(session_handle));
    header.extend_from_slice(&pack_udint(0)); // status
    header.extend_from_slice(context);
    header.extend_from_slice(&pack_udint(0)); // options
    header
}

/// Prefix `payload` with a header for `command` addressed to
/// `session_handle`, echoing `context`.
pub fn build_message(
    command: Command,
    payload: &[u8],
    session_handle: u32,
    context: &SenderContext,
) -> CipResult<Vec<u8>> {
    let data_len: u16 = payload
        .len()
        .try_into()
        .map_err(|_| CipError::encoding("payload exceeds 65535 bytes"))?;
    let mut message = build_header(command, data_len, session_handle, context);
    message.extend_from_slice(payload);
    Ok(message)
}

/// Parse and validate a full encapsulation message (header + tail) as
/// received from the transport. `expected_session` is `0` when no session
/// has been registered yet (e.g. validating a `RegisterSession` reply).
pub fn parse_reply(
    message: &[u8],
    expected_session: u32,
    expected_context: &SenderContext,
) -> CipResult<EncapsulationReply> {
    if message.len() < HEADER_LEN {
        return Err(CipError::protocol(format!(
            "truncated encapsulation header: {} bytes",
            message.len()
        )));
    }

    let command = unpack_uint(&message[0..2])?;
    let length = unpack_uint(&message[2..4])?;
    let session_handle = unpack_udint(&message[4..8])?;
    let status = unpack_udint(&message[8..12])?;
    let mut context = [0u8; 8];
    context.copy_from_slice(&message[12..20]);
    let options = unpack_udint(&message[20..24])?;
    let data = message[HEADER_LEN..].to_vec();

    if data.len() != length as usize {
        return Err(CipError::protocol(format!(
            "encapsulation length mismatch: header says {length}, got {}",
            data.len()
        )));
    }
    if expected_session != 0 && session_handle != expected_session {
        return Err(CipError::protocol(format!(
            "session handle mismatch: expected {expected_session:#x}, got {session_handle:#x}"
        )));
    }
    if status != 0 {
        return Err(CipError::protocol(format!(
            "encapsulation status {status:#x} in reply"
        )));
    }
    if &context != expected_context {
        return Err(CipError::protocol("sender context mismatch in reply"));
    }

    Ok(EncapsulationReply {
        command,
        length,
        session_handle,
        status,
        context,
        options,
        data,
    })
}
