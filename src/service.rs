//! Service Composer: builds Forward Open / Forward Close / Identity /
//! Multiple Service Packet request bodies and parses their replies.
//!
//! These are the CIP messages carried as the data item of a CPF payload,
//! in turn wrapped in an encapsulation header by the session controller.

use crate::codec::{pack_udint, pack_uint, unpack_uint};
use crate::consts::{
    class_code, segment, service_code, CONNECTION_SIZE_LARGE, CONNECTION_SIZE_STANDARD,
    PRIORITY_TIME_TICK, TIMEOUT_TICKS, TRANSPORT_CLASS,
};
use crate::error::{CipError, CipResult};

/// Timeout multiplier byte sent in Forward Open (value `n` means the
/// connection timeout is `timeout_ticks * 2^n` times the tick interval).
const TIMEOUT_MULTIPLIER: u8 = 0x03;

/// Port-segment byte selecting the backplane as the routing port.
const CONNECTION_SIZE_BACKPLANE: u8 = 0x01;
/// Port-segment byte selecting a direct (non-backplane) network hop.
const CONNECTION_SIZE_DIRECT: u8 = 0x02;

/// Distinguishes the standard Forward Open from the Large Forward Open
/// variant, which widens the network-parameters field from UINT to UDINT
/// and allows connection sizes above 511 bytes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ForwardOpenKind {
    Standard,
    Large,
}

impl ForwardOpenKind {
    fn service_code(self) -> u8 {
        match self {
            ForwardOpenKind::Standard => service_code::FORWARD_OPEN,
            ForwardOpenKind::Large => service_code::LARGE_FORWARD_OPEN,
        }
    }

    fn connection_size(self) -> u32 {
        match self {
            ForwardOpenKind::Standard => CONNECTION_SIZE_STANDARD as u32,
            ForwardOpenKind::Large => CONNECTION_SIZE_LARGE,
        }
    }
}

/// Identifiers carried in a Forward Open / Forward Close request. These
/// mirror the `Session`'s own fields; kept as a plain struct so the
/// composer has no dependency on the session module.
#[derive(Debug, Clone, Copy)]
pub struct ConnectionParams {
    pub originator_cid: u32,
    pub originator_serial: u16,
    pub vendor_id: u16,
    pub originator_vsn: u32,
    pub rpi_us: u32,
    pub direct_connection: bool,
    pub backplane: u8,
    pub cpu_slot: u8,
}

/// The packed CIP network-parameters word: connection size (low bits),
/// fixed priority=2, variable-size=true, redundant-owner=false.
fn network_parameters(kind: ForwardOpenKind) -> Vec<u8> {
    let init_net_params: u32 = (1 << 9) | (2 << 13);
    let size = kind.connection_size();
    match kind {
        ForwardOpenKind::Standard => {
            let value = (size & 0x01FF) | init_net_params;
            pack_uint(value as u16)
        }
        ForwardOpenKind::Large => {
            let value = (size & 0xFFFF) | (init_net_params << 16);
            pack_udint(value)
        }
    }
}

/// Build a Forward Open (or Large Forward Open) request body.
pub fn build_forward_open(kind: ForwardOpenKind, params: ConnectionParams) -> Vec<u8> {
    let mut msg = Vec::new();
    msg.push(kind.service_code());
    msg.push(0x02); // path size in words
    msg.push(segment::CLASS_ID_8_BIT);
    msg.push(class_code::CONNECTION_MANAGER);
    msg.push(segment::INSTANCE_ID_8_BIT);
    msg.push(0x01); // Open Request instance

    msg.push(PRIORITY_TIME_TICK);
    msg.push(TIMEOUT_TICKS);

    msg.extend_from_slice(&pack_udint(0)); // O->T connection id, target-assigned
    msg.extend_from_slice(&pack_udint(params.originator_cid));
    msg.extend_from_slice(&pack_uint(params.originator_serial));
    msg.extend_from_slice(&pack_uint(params.vendor_id));
    msg.extend_from_slice(&pack_udint(params.originator_vsn));

    msg.push(TIMEOUT_MULTIPLIER);
    msg.extend_from_slice(&[0x00, 0x00, 0x00]); // reserved

    msg.extend_from_slice(&pack_udint(params.rpi_us)); // O->T RPI
    msg.extend_from_slice(&network_parameters(kind));
    msg.extend_from_slice(&pack_udint(params.rpi_us)); // T->O RPI
    msg.extend_from_slice(&network_parameters(kind));

    msg.push(TRANSPORT_CLASS);
    msg.extend_from_slice(&connection_path(
        params.direct_connection,
        params.backplane,
        params.cpu_slot,
    ));

    msg
}

/// Build a Forward Close request body.
pub fn build_forward_close(params: ConnectionParams) -> Vec<u8> {
    let mut msg = Vec::new();
    msg.push(service_code::FORWARD_CLOSE);
    msg.push(0x02);
    msg.push(segment::CLASS_ID_8_BIT);
    msg.push(class_code::CONNECTION_MANAGER);
    msg.push(segment::INSTANCE_ID_8_BIT);
    msg.push(0x01);

    msg.push(PRIORITY_TIME_TICK);
    msg.push(TIMEOUT_TICKS);

    msg.extend_from_slice(&pack_uint(params.originator_serial));
    msg.extend_from_slice(&pack_uint(params.vendor_id));
    msg.extend_from_slice(&pack_udint(params.originator_vsn));

    // See Design Notes: the original implementation's out-of-order slice
    // assignment here inserts these route bytes rather than replacing
    // anything; we express that directly as an append.
    if params.direct_connection {
        msg.push(CONNECTION_SIZE_DIRECT);
        msg.push(0x00);
    } else {
        msg.push(CONNECTION_SIZE_BACKPLANE);
        msg.push(0x00);
        msg.push(params.backplane);
        msg.push(params.cpu_slot);
    }

    msg.push(segment::CLASS_ID_8_BIT);
    msg.push(class_code::MESSAGE_ROUTER);
    msg.push(segment::INSTANCE_ID_8_BIT);
    msg.push(0x01);
    msg
}

/// The connection path segment routing to the Message Router: a backplane
/// hop through `backplane`/`cpu_slot`, or a direct network hop, either way
/// ending in a class/instance segment addressing the Message Router.
fn connection_path(direct_connection: bool, backplane: u8, cpu_slot: u8) -> Vec<u8> {
    let mut path = Vec::new();
    if direct_connection {
        path.push(CONNECTION_SIZE_DIRECT);
        path.push(segment::CLASS_ID_8_BIT);
        path.push(class_code::MESSAGE_ROUTER);
    } else {
        path.push(CONNECTION_SIZE_BACKPLANE);
    }
    path.push(backplane);
    path.push(cpu_slot);
    path.push(segment::CLASS_ID_8_BIT);
    path.push(class_code::MESSAGE_ROUTER);
    path.push(segment::INSTANCE_ID_8_BIT);
    path.push(0x01);
    path
}

/// Build an unconnected Get_Attributes_All request against the Identity
/// object at the given backplane slot, wrapped in an Unconnected_Send
/// envelope so it can route from the Ethernet port to the target slot.
pub fn build_identity_request(backplane: u8, slot: u8) -> Vec<u8> {
    let mut msg = Vec::new();
    msg.push(service_code::UNCONNECTED_SEND);
    msg.push(0x02);
    msg.push(segment::CLASS_ID_8_BIT);
    msg.push(class_code::CONNECTION_MANAGER);
    msg.push(segment::INSTANCE_ID_8_BIT);
    msg.push(0x01);
    msg.push(PRIORITY_TIME_TICK);
    msg.extend_from_slice(&[TIMEOUT_TICKS, 0x06, 0x00]);

    msg.push(service_code::GET_ATTRIBUTES_ALL);
    msg.push(0x02);
    msg.push(segment::CLASS_ID_8_BIT);
    msg.push(class_code::IDENTITY);
    msg.push(segment::INSTANCE_ID_8_BIT);
    msg.push(0x01);

    msg.extend_from_slice(&[0x01, 0x00]); // route path size (1 word) + reserved
    msg.push(backplane);
    msg.push(slot);
    msg
}

/// A parsed CIP Identity object (vendor, product, revision, state, ...).
#[derive(Debug, Clone, PartialEq)]
pub struct IdentityInfo {
    pub vendor_id: u16,
    pub vendor_name: &'static str,
    pub product_type_id: u16,
    pub product_type_name: &'static str,
    pub product_code: u16,
    pub version_major: u8,
    pub version_minor: u8,
    pub status: String,
    pub serial: String,
    pub product_name: String,
    pub state: Option<i16>,
}

/// Parse an Identity reply at the fixed field layout a `Get_Attributes_All`
/// or `ListIdentity` response uses (§4.7): vendor id, product type,
/// product code, major/minor revision, status, serial, a length-prefixed
/// product name, then an optional trailing device-state word.
///
/// `base` is the offset of the vendor-id field within `reply`. The two
/// callers land on different bases because they parse different wire
/// shapes sharing the same field layout from that point on: an unconnected
/// `Get_Attributes_All` reply's attributes start right after its CPF
/// overhead and 4-byte CIP response prefix, while a `ListIdentity` reply's
/// attributes start after its item-list header and socket address struct.
pub fn parse_identity(reply: &[u8], base: usize) -> CipResult<IdentityInfo> {
    let name_len_offset = base + 14;
    if reply.len() <= name_len_offset {
        return Err(CipError::protocol("identity reply shorter than fixed fields"));
    }
    let vendor_id = unpack_uint(&reply[base..base + 2])?;
    let product_type_id = unpack_uint(&reply[base + 2..base + 4])?;
    let product_code = unpack_uint(&reply[base + 4..base + 6])?;
    let version_major = reply[base + 6];
    let version_minor = reply[base + 7];
    let status_word = unpack_uint(&reply[base + 8..base + 10])?;
    let serial_word = crate::codec::unpack_udint(&reply[base + 10..base + 14])?;
    let name_len = reply[name_len_offset] as usize;

    let name_start = base + 15;
    let name_end = name_start + name_len;
    let product_name = reply
        .get(name_start..name_end)
        .ok_or_else(|| CipError::protocol("truncated identity product name"))?;
    let product_name = String::from_utf8_lossy(product_name).into_owned();

    let state = match reply.get(name_end..name_end + 2) {
        Some(bytes) => Some(unpack_uint(bytes)? as i16),
        None => None,
    };

    Ok(IdentityInfo {
        vendor_id,
        vendor_name: vendor_name(vendor_id),
        product_type_id,
        product_type_name: product_type_name(product_type_id),
        product_code,
        version_major,
        version_minor,
        status: format!("{status_word:016b}"),
        serial: format!("{serial_word:08x}"),
        product_name,
        state,
    })
}

fn vendor_name(id: u16) -> &'static str {
    match id {
        1 => "Rockwell Automation/Allen-Bradley",
        26 => "Festo Corporation",
        40 => "Weidmuller Interface GmbH & Co. KG",
        46 => "ifm efector inc",
        161 => "Turck",
        806 => "Rockwell Automation (Enhanced Identity)",
        _ => "UNKNOWN",
    }
}

fn product_type_name(id: u16) -> &'static str {
    match id {
        0x00 => "Generic Device",
        0x02 => "AC Drive",
        0x0C => "Communications Adapter",
        0x0E => "Programmable Logic Controller",
        0x24 => "Safety Controller",
        _ => "UNKNOWN",
    }
}

/// CIP device states (Identity object, attribute 5), per ODVA Vol 1.
pub fn device_state_name(state: Option<i16>) -> &'static str {
    match state {
        Some(0) => "Nonexistent",
        Some(1) => "Self Testing",
        Some(2) => "Standby",
        Some(3) => "Operational",
        Some(4) => "Major Recoverable Fault",
        Some(5) => "Major Unrecoverable Fault",
        _ => "UNKNOWN",
    }
}

/// Build a Multiple Service Packet request wrapping `requests`, each an
/// already-encoded service request body. `sequence`, if given, is a
/// connected-message sequence number prefixed before the service code
/// (used when this aggregate is framed for `send_unit_data`).
pub fn build_multiple_service(requests: &[Vec<u8>], sequence: Option<u16>) -> CipResult<Vec<u8>> {
    let mut msg = Vec::new();
    if let Some(seq) = sequence {
        msg.extend_from_slice(&pack_uint(seq));
    }

    msg.push(service_code::MULTIPLE_SERVICE_PACKET);
    msg.push(0x02); // path size in words
    msg.push(segment::CLASS_ID_8_BIT);
    msg.push(class_code::MESSAGE_ROUTER);
    msg.push(segment::INSTANCE_ID_8_BIT);
    msg.push(0x01);

    let count: u16 = requests
        .len()
        .try_into()
        .map_err(|_| CipError::encoding("too many services for one Multiple Service Packet"))?;
    msg.extend_from_slice(&pack_uint(count));

    let mut offset = (requests.len() * 2 + 2) as u16;
    for request in requests {
        msg.extend_from_slice(&pack_uint(offset));
        offset += request
            .len()
            .try_into()
            .map_err(|_| CipError::encoding("service request body too large"))?;
    }
    for request in requests {
        msg.extend_from_slice(request);
    }

    Ok(msg)
}

/// The kind of service a slot in a Multiple Service Packet reply answers,
/// determining how a non-zero general status is reported back.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ServiceKind {
    Read,
    Write,
}

/// One slot of a parsed Multiple Service Packet reply.
#[derive(Debug, Clone, PartialEq)]
pub enum ServiceResult {
    /// A read that succeeded: tag name, decoded value, and its CIP type.
    Read(String, crate::codec::CipValue, crate::codec::CipDataType),
    /// A read that failed (bad status or unrecognized data type).
    ReadFailed(String),
    /// A write that succeeded.
    WriteOk(String),
    /// A write that failed.
    WriteFailed(String),
}

/// Parse a Multiple Service Packet reply embedded in an encapsulation
/// reply body at the fixed offset (50) that `send_unit_data` replies use.
pub fn parse_multiple_request(
    message: &[u8],
    tags: &[String],
    kind: ServiceKind,
) -> CipResult<Vec<ServiceResult>> {
    const BASE: usize = 50;
    if message.len() < BASE + 2 {
        return Err(CipError::protocol("reply too short for Multiple Service Packet"));
    }

    let count = unpack_uint(&message[BASE..BASE + 2])? as usize;
    if count != tags.len() {
        return Err(CipError::protocol(format!(
            "Multiple Service Packet reply has {count} slots, expected {}",
            tags.len()
        )));
    }

    let mut results = Vec::with_capacity(count);
    for (i, tag) in tags.iter().enumerate() {
        let offset_pos = BASE + 2 + i * 2;
        let item_offset = unpack_uint(
            message
                .get(offset_pos..offset_pos + 2)
                .ok_or_else(|| CipError::protocol("truncated Multiple Service offset table"))?,
        )? as usize;
        let start = BASE + item_offset;

        let general_status = *message
            .get(start + 2)
            .ok_or_else(|| CipError::protocol("truncated Multiple Service reply slot"))?;

        let result = if general_status == 0 {
            match kind {
                ServiceKind::Read => {
                    let data_type_id = unpack_uint(
                        message
                            .get(start + 4..start + 6)
                            .ok_or_else(|| CipError::protocol("truncated read reply header"))?,
                    )?;
                    match crate::codec::CipDataType::from_id(data_type_id) {
                        Some(data_type) => {
                            let value_start = start + 6;
                            let value_bytes = message.get(value_start..).unwrap_or(&[]);
                            match crate::codec::unpack_cip_value(data_type, value_bytes) {
                                Ok(value) => ServiceResult::Read(tag.clone(), value, data_type),
                                Err(_) => ServiceResult::ReadFailed(tag.clone()),
                            }
                        }
                        None => ServiceResult::ReadFailed(tag.clone()),
                    }
                }
                ServiceKind::Write => ServiceResult::WriteOk(tag.clone()),
            }
        } else {
            match kind {
                ServiceKind::Read => ServiceResult::ReadFailed(tag.clone()),
                ServiceKind::Write => ServiceResult::WriteFailed(tag.clone()),
            }
        };
        results.push(result);
    }

    Ok(results)
}

/// A small, intentionally non-exhaustive table of extended status strings
/// for common Connection Manager Forward Open/Close failures. Unknown
/// `(status, extended)` pairs fall back to a generic message rather than
/// erroring, since the full ODVA table is large and still growing.
fn extended_status_text(status: u8, extended: u32) -> Option<&'static str> {
    match (status, extended) {
        (0x01, 0x0100) => Some("Connection in use or duplicate Forward Open"),
        (0x01, 0x0103) => Some("Transport class/trigger not supported"),
        (0x01, 0x0106) => Some("Ownership conflict"),
        (0x01, 0x0113) => Some("Out of connections"),
        (0x01, 0x0114) => Some("Vendor id or product code mismatch"),
        (0x01, 0x0115) => Some("Device type mismatch"),
        (0x01, 0x0116) => Some("Revision mismatch"),
        (0x01, 0x0118) => Some("Invalid connection point"),
        (0x01, 0x0119) => Some("Invalid configuration format"),
        (0x01, 0x0203) => Some("Connection timed out"),
        (0x03, 0x0000) => Some("Resource unavailable"),
        (0x05, 0x0000) => Some("Path segment error"),
        (0x13, 0x0000) => Some("Insufficient request data"),
        _ => None,
    }
}

/// Decode a general status byte, a size-in-words byte, and the 0/1/2/4
/// byte extended status that follows, starting at `start` in `msg`, and
/// format it as a human-readable string.
pub fn get_extended_status(msg: &[u8], start: usize) -> String {
    let Some(&status) = msg.get(start) else {
        return "Extended Status info not present".to_string();
    };
    let Some(&size_words) = msg.get(start + 1) else {
        return "Extended Status info not present".to_string();
    };
    let extended_len = size_words as usize * 2;

    let extended: u32 = match extended_len {
        0 => 0,
        1 => match msg.get(start + 2) {
            Some(&b) => b as u32,
            None => return "Extended Status info not present".to_string(),
        },
        2 => match msg.get(start + 2..start + 4) {
            Some(bytes) => unpack_uint(bytes).unwrap_or(0) as u32,
            None => return "Extended Status info not present".to_string(),
        },
        4 => match msg.get(start + 2..start + 6) {
            Some(bytes) => crate::codec::unpack_udint(bytes).unwrap_or(0),
            None => return "Extended Status info not present".to_string(),
        },
        _ => return "Extended Status Size Unknown".to_string(),
    };

    match extended_status_text(status, extended) {
        Some(text) => format!("{text}  ({status:02x}, {extended:02x})"),
        None => "Extended Status info not present".to_string(),
    }
}

/// Placeholder for decoding a tag's symbol-type attribute (CIP symbol
/// instance attribute 2 bitfield: element type, array dimensions, etc.).
/// The original implementation left this unimplemented; we keep the
/// interface so a future revision can fill in the decoding without
/// changing any caller.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SymbolType {
    pub type_id: u16,
    pub is_struct: bool,
    pub array_dims: u8,
}

pub fn parse_symbol_type(_symbol: u16) -> Option<SymbolType> {
    None
}

#[cfg(test)]
mod tests {
    use super::*;

    fn params() -> ConnectionParams {
        ConnectionParams {
            originator_cid: 0x7119_0427,
            originator_serial: 0x0427,
            vendor_id: 0x1009,
            originator_vsn: 0x7119_0910,
            rpi_us: 5000,
            direct_connection: false,
            backplane: 1,
            cpu_slot: 0,
        }
    }

    #[test]
    fn forward_open_starts_with_service_and_path() {
        let body = build_forward_open(ForwardOpenKind::Standard, params());
        assert_eq!(body[0], service_code::FORWARD_OPEN);
        assert_eq!(&body[1..6], &[0x02, 0x20, 0x06, 0x24, 0x01]);
    }

    #[test]
    fn large_forward_open_uses_large_service_code() {
        let body = build_forward_open(ForwardOpenKind::Large, params());
        assert_eq!(body[0], service_code::LARGE_FORWARD_OPEN);
    }

    #[test]
    fn forward_close_uses_fixed_prefix_then_route() {
        let body = build_forward_close(params());
        assert_eq!(body[0], service_code::FORWARD_CLOSE);
        // csn, vid, vsn occupy bytes 8..16; route bytes follow at 16.
        assert_eq!(body[16], CONNECTION_SIZE_BACKPLANE);
        assert_eq!(body[17], 0x00);
        assert_eq!(body[18], 1); // backplane
        assert_eq!(body[19], 0); // cpu_slot
    }

    #[test]
    fn multiple_service_offsets_match_spec_example() {
        let requests = vec![vec![0u8; 6], vec![0u8; 8], vec![0u8; 10]];
        let msg = build_multiple_service(&requests, None).unwrap();
        // service(1) + path size(1) + class/instance(4) + count(2) = 8 bytes header
        let count = unpack_uint(&msg[6..8]).unwrap();
        assert_eq!(count, 3);
        let offsets: Vec<u16> = (0..3)
            .map(|i| unpack_uint(&msg[8 + i * 2..10 + i * 2]).unwrap())
            .collect();
        assert_eq!(offsets, vec![8, 14, 22]);
    }

    #[test]
    fn identity_parse_at_unconnected_reply_base() {
        // base=20: CPF overhead (16) + CIP response prefix (4), the shape
        // `get_module_info` feeds it.
        let mut reply = vec![0u8; 40];
        reply[20..22].copy_from_slice(&pack_uint(1));
        reply[22..24].copy_from_slice(&pack_uint(0x0E));
        reply[24..26].copy_from_slice(&pack_uint(42));
        reply[26] = 2;
        reply[27] = 1;
        reply[28..30].copy_from_slice(&pack_uint(0));
        reply[30..34].copy_from_slice(&pack_udint(0x1234_5678));
        reply[34] = 4;
        reply[35..39].copy_from_slice(b"PLC5");

        let info = parse_identity(&reply, 20).unwrap();
        assert_eq!(info.vendor_name, "Rockwell Automation/Allen-Bradley");
        assert_eq!(info.product_type_name, "Programmable Logic Controller");
        assert_eq!(info.product_code, 42);
        assert_eq!(info.version_major, 2);
        assert_eq!(info.version_minor, 1);
        assert_eq!(info.serial, "12345678");
        assert_eq!(info.product_name, "PLC5");
        assert_eq!(info.state, None);
    }

    #[test]
    fn identity_parse_at_list_identity_base() {
        // base=24: item-list header (6) + protocol version (2) + socket
        // address struct (16), the shape `list_identity` feeds it.
        let mut reply = vec![0u8; 43];
        reply[24..26].copy_from_slice(&pack_uint(1));
        reply[38] = 4;
        reply[39..43].copy_from_slice(b"PLC5");
        let info = parse_identity(&reply, 24).unwrap();
        assert_eq!(info.vendor_name, "Rockwell Automation/Allen-Bradley");
        assert_eq!(info.product_name, "PLC5");
    }

    #[test]
    fn identity_parse_unknown_vendor_falls_back() {
        let mut reply = vec![0u8; 17];
        reply[0..2].copy_from_slice(&pack_uint(0xBEEF));
        reply[14] = 0;
        let info = parse_identity(&reply, 0).unwrap();
        assert_eq!(info.vendor_name, "UNKNOWN");
    }

    #[test]
    fn extended_status_known_pair() {
        let mut msg = vec![0u8; 8];
        msg[0] = 0x01; // general status
        msg[1] = 0x01; // size in words (1 word = 2 bytes)
        msg[2..4].copy_from_slice(&pack_uint(0x0100));
        let text = get_extended_status(&msg, 0);
        assert!(text.starts_with("Connection in use"));
    }

    #[test]
    fn extended_status_unknown_pair_falls_back() {
        let mut msg = vec![0u8; 4];
        msg[0] = 0xFF;
        msg[1] = 0x00;
        assert_eq!(get_extended_status(&msg, 0), "Extended Status info not present");
    }

    #[test]
    fn parse_symbol_type_is_unimplemented_by_design() {
        assert_eq!(parse_symbol_type(0x00C4), None);
    }
}
