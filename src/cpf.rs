//! Common Packet Format (CPF) builder and parser.
//!
//! CPF is the item-list payload carried inside `SendRRData` and
//! `SendUnitData`: an interface handle, a timeout, and exactly two items
//! (an address item and a data item) for everything this core composes.

use crate::codec::{pack_udint, pack_uint, unpack_uint};
use crate::error::{CipError, CipResult};

/// Address item type: Unconnected Message Manager (unconnected request).
pub const ADDRESS_ITEM_UCMM: u16 = 0x0000;
/// Address item type: connection-based (connected request), carries the
/// 4-byte target connection id.
pub const ADDRESS_ITEM_CONNECTION_BASED: u16 = 0x00A1;

/// Data item type: unconnected message.
pub const DATA_ITEM_UNCONNECTED: u16 = 0x00B2;
/// Data item type: connected transport packet.
pub const DATA_ITEM_CONNECTED: u16 = 0x00B1;

/// Build a two-item CPF payload: `interface_handle=0`, `timeout`, an
/// address item (`address_type`, with optional `address_bytes`), and a
/// data item (`data_type`, `data_bytes`).
pub fn build_common_packet_format(
    data_type: u16,
    data_bytes: &[u8],
    address_type: u16,
    address_bytes: Option<&[u8]>,
    timeout: u16,
) -> CipResult<Vec<u8>> {
    let mut msg = Vec::new();
    msg.extend_from_slice(&pack_udint(0)); // interface handle
    msg.extend_from_slice(&pack_uint(timeout));
    msg.extend_from_slice(&pack_uint(2)); // item count

    msg.extend_from_slice(&pack_uint(address_type));
    match address_bytes {
        Some(bytes) => {
            let len: u16 = bytes
                .len()
                .try_into()
                .map_err(|_| CipError::encoding("address item too large"))?;
            msg.extend_from_slice(&pack_uint(len));
            msg.extend_from_slice(bytes);
        }
        None => msg.extend_from_slice(&pack_uint(0)),
    }

    msg.extend_from_slice(&pack_uint(data_type));
    let data_len: u16 = data_bytes
        .len()
        .try_into()
        .map_err(|_| CipError::encoding("data item too large"))?;
    msg.extend_from_slice(&pack_uint(data_len));
    msg.extend_from_slice(data_bytes);

    Ok(msg)
}

/// Convenience wrapper for a connected data item, whose address item
/// always carries the 4-byte target connection id.
pub fn build_connected_cpf(data_bytes: &[u8], target_cid: u32, timeout: u16) -> CipResult<Vec<u8>> {
    build_common_packet_format(
        DATA_ITEM_CONNECTED,
        data_bytes,
        ADDRESS_ITEM_CONNECTION_BASED,
        Some(&pack_udint(target_cid)),
        timeout,
    )
}

/// A single CPF item list, parsed out of a CPF payload.
#[derive(Debug, Clone)]
pub struct ParsedCpf {
    pub address_type: u16,
    pub address_bytes: Vec<u8>,
    pub data_type: u16,
    pub data_bytes: Vec<u8>,
}

/// Parse a two-item CPF payload (as produced by [`build_common_packet_format`])
/// back into its address and data items.
pub fn parse_common_packet_format(msg: &[u8]) -> CipResult<ParsedCpf> {
    if msg.len() < 8 {
        return Err(CipError::protocol("CPF payload shorter than its fixed header"));
    }
    // bytes 0..4 interface handle, 4..6 timeout, 6..8 item count
    let item_count = unpack_uint(&msg[6..8])?;
    if item_count != 2 {
        return Err(CipError::protocol(format!(
            "expected 2 CPF items, got {item_count}"
        )));
    }

    let mut cursor = 8usize;
    let address_type = unpack_uint(msg.get(cursor..cursor + 2).ok_or_else(too_short)?)?;
    cursor += 2;
    let address_len = unpack_uint(msg.get(cursor..cursor + 2).ok_or_else(too_short)?)? as usize;
    cursor += 2;
    let address_bytes = msg.get(cursor..cursor + address_len).ok_or_else(too_short)?.to_vec();
    cursor += address_len;

    let data_type = unpack_uint(msg.get(cursor..cursor + 2).ok_or_else(too_short)?)?;
    cursor += 2;
    let data_len = unpack_uint(msg.get(cursor..cursor + 2).ok_or_else(too_short)?)? as usize;
    cursor += 2;
    let data_bytes = msg.get(cursor..cursor + data_len).ok_or_else(too_short)?.to_vec();

    Ok(ParsedCpf {
        address_type,
        address_bytes,
        data_type,
        data_bytes,
    })
}

fn too_short() -> CipError {
    CipError::protocol("truncated CPF item")
}
