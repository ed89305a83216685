//! Session Controller: owns the encapsulation session handle, the CIP
//! connection identifiers, and the `Disconnected -> TcpOpen ->
//! SessionRegistered -> CipConnected` lifecycle.
//!
//! A `Session` is not safe for concurrent callers — it assumes one
//! in-flight request at a time, mirroring a single TCP socket's own
//! discipline. The process-wide sequence counter is the only state shared
//! across sessions.

use std::sync::OnceLock;
use std::time::Duration;

use parking_lot::Mutex;
use rand::rngs::OsRng;
use rand::RngCore;
use tracing::{debug, warn};

use crate::codec::{pack_uint, unpack_udint};
use crate::cpf::{
    build_common_packet_format, build_connected_cpf, ADDRESS_ITEM_UCMM, DATA_ITEM_UNCONNECTED,
};
use crate::encapsulation::{build_message, parse_reply, Command, SenderContext};
use crate::error::{CipError, CipResult};
use crate::service::{
    build_forward_close, build_forward_open, build_identity_request, parse_identity,
    ConnectionParams, ForwardOpenKind, IdentityInfo,
};
use crate::transport::{TcpTransport, Transport};

static SEQUENCE: OnceLock<Mutex<u16>> = OnceLock::new();

/// `send_rr_data`/`send_unit_data` return the reply with only the 24-byte
/// encapsulation header stripped; the CPF envelope (interface handle,
/// timeout, item count, address item, data item header) is still present.
/// For a zero-length UCMM address item that overhead is exactly 16 bytes,
/// so a CIP response embedded in such a reply begins at this offset.
const CPF_REPLY_DATA_OFFSET: usize = 16;

/// Offset of the target connection id in a Forward Open reply: CPF
/// overhead (16) plus the CIP response's service/reserved/general-status/
/// additional-status-size prefix (4).
const FORWARD_OPEN_CID_OFFSET: usize = CPF_REPLY_DATA_OFFSET + 4;

/// Offset of the general-status byte in a Forward Close reply: CPF
/// overhead (16) plus the CIP response's service/reserved prefix (2).
const FORWARD_CLOSE_STATUS_OFFSET: usize = CPF_REPLY_DATA_OFFSET + 2;

/// Base offset of the Identity object's vendor-id field within an
/// unconnected `Get_Attributes_All` reply: CPF overhead (16) plus the CIP
/// response's service/reserved/general-status/additional-status-size
/// prefix (4), same as `FORWARD_OPEN_CID_OFFSET`.
const IDENTITY_BASE_UNCONNECTED_REPLY: usize = CPF_REPLY_DATA_OFFSET + 4;

/// Base offset of the Identity object's vendor-id field within a
/// `ListIdentity` reply: item-list header (item count, item type, item
/// length = 6 bytes) plus encapsulation protocol version (2) plus the
/// socket address struct (16).
const IDENTITY_BASE_LIST_IDENTITY_REPLY: usize = 6 + 2 + 16;

/// Advance and return the process-wide connected-message sequence number.
/// Seeded from the process id on first use; wraps to `pid % 65535` rather
/// than to zero, so a freshly-started process never collides with a
/// still-draining reply from a previous run using the same low sequence
/// values.
fn next_sequence() -> u16 {
    let pid_seed = (std::process::id() % 65535) as u16;
    let cell = SEQUENCE.get_or_init(|| Mutex::new(pid_seed));
    let mut guard = cell.lock();
    if *guard == 65535 {
        *guard = pid_seed;
    } else {
        *guard = guard.wrapping_add(1);
    }
    *guard
}

/// Lifecycle states a [`Session`] moves through. Each operation that
/// requires a minimum stage checks it explicitly and fails with
/// [`CipError::Comm`] rather than silently attempting the wire exchange.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Disconnected,
    TcpOpen,
    SessionRegistered,
    CipConnected,
}

/// Construction-time configuration, replacing an ad-hoc attribute bag.
/// `Default` reproduces the defaults the original hard-coded.
#[derive(Debug, Clone)]
pub struct SessionConfig {
    pub ip_address: String,
    pub port: u16,
    pub timeout: Duration,
    pub backplane: u8,
    pub cpu_slot: u8,
    pub sender_context: SenderContext,
    pub vendor_id: u16,
    pub originator_serial: u16,
    pub extended_forward_open: bool,
    pub direct_connection: bool,
    pub rpi_us: u32,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            ip_address: String::new(),
            port: 44818,
            timeout: Duration::from_secs(10),
            backplane: 1,
            cpu_slot: 0,
            sender_context: *b"_pycomm_",
            vendor_id: 0x0001,
            originator_serial: (std::process::id() & 0xFFFF) as u16,
            extended_forward_open: false,
            direct_connection: false,
            rpi_us: 5000,
        }
    }
}

/// A (group, message) pair describing the last non-fatal or fatal event
/// surfaced to the caller, mirroring the original's status attribute.
pub type Status = Option<(u8, String)>;

/// Owns one controller connection: the TCP socket, the encapsulation
/// session handle, and (once Forward Open succeeds) the CIP connection
/// identifiers needed for every subsequent connected request.
pub struct Session {
    config: SessionConfig,
    transport: Box<dyn Transport>,
    state: SessionState,
    session_handle: u32,
    originator_cid: u32,
    originator_vsn: u32,
    target_cid: u32,
    last_status: Status,
}

impl Session {
    /// Build a session over the default blocking `TcpTransport`.
    pub fn new(config: SessionConfig) -> Self {
        let timeout = config.timeout;
        Self::with_transport(config, Box::new(TcpTransport::new(timeout)))
    }

    /// Build a session over a caller-supplied transport (a mock, for tests).
    pub fn with_transport(config: SessionConfig, transport: Box<dyn Transport>) -> Self {
        Self {
            config,
            transport,
            state: SessionState::Disconnected,
            session_handle: 0,
            originator_cid: 0,
            originator_vsn: 0,
            target_cid: 0,
            last_status: None,
        }
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    pub fn session_handle(&self) -> u32 {
        self.session_handle
    }

    pub fn target_cid(&self) -> u32 {
        self.target_cid
    }

    pub fn connected(&self) -> bool {
        matches!(
            self.state,
            SessionState::TcpOpen | SessionState::SessionRegistered | SessionState::CipConnected
        )
    }

    pub fn cip_connected(&self) -> bool {
        self.state == SessionState::CipConnected
    }

    pub fn status(&self) -> Status {
        self.last_status.clone()
    }

    pub fn clear(&mut self) {
        self.last_status = None;
    }

    fn require(&self, minimum: SessionState, operation: &str) -> CipResult<()> {
        let ok = match minimum {
            SessionState::Disconnected => true,
            SessionState::TcpOpen => self.state != SessionState::Disconnected,
            SessionState::SessionRegistered => {
                matches!(
                    self.state,
                    SessionState::SessionRegistered | SessionState::CipConnected
                )
            }
            SessionState::CipConnected => self.state == SessionState::CipConnected,
        };
        if ok {
            Ok(())
        } else {
            Err(CipError::comm(
                4,
                format!("{operation} requires {minimum:?}, session is {:?}", self.state),
            ))
        }
    }

    /// Open TCP, randomize the Forward Open identifiers, then register the
    /// encapsulation session. Leaves the session `Disconnected` on failure.
    pub fn open(&mut self) -> CipResult<()> {
        self.transport
            .connect(&self.config.ip_address, self.config.port)
            .map_err(|e| {
                self.last_status = Some((1, e.to_string()));
                e
            })?;
        self.state = SessionState::TcpOpen;
        debug!(host = %self.config.ip_address, port = self.config.port, "tcp open");

        let mut cid_bytes = [0u8; 4];
        let mut vsn_bytes = [0u8; 4];
        OsRng.fill_bytes(&mut cid_bytes);
        OsRng.fill_bytes(&mut vsn_bytes);
        self.originator_cid = u32::from_le_bytes(cid_bytes);
        self.originator_vsn = u32::from_le_bytes(vsn_bytes);

        if let Err(e) = self.register_session() {
            self.last_status = Some((1, e.to_string()));
            warn!(error = %e, "register_session failed");
            let _ = self.transport.close();
            self.state = SessionState::Disconnected;
            return Err(CipError::comm(1, e.to_string()));
        }
        Ok(())
    }

    /// Send RegisterSession (protocol version 1, options 0) and extract
    /// the session handle the target assigns.
    pub fn register_session(&mut self) -> CipResult<()> {
        self.require(SessionState::TcpOpen, "register_session")?;
        let mut payload = Vec::with_capacity(4);
        payload.extend_from_slice(&1u16.to_le_bytes()); // protocol version
        payload.extend_from_slice(&0u16.to_le_bytes()); // options

        let message = build_message(Command::RegisterSession, &payload, 0, &self.config.sender_context)?;
        self.transport.send(&message)?;
        let reply = self.transport.recv()?;
        let parsed = parse_reply(&reply, 0, &self.config.sender_context)?;

        self.session_handle = parsed.session_handle;
        self.state = SessionState::SessionRegistered;
        debug!(session_handle = format_args!("{:#x}", self.session_handle), "session registered");
        Ok(())
    }

    /// Compose and send Forward Open, advancing to `CipConnected` on a
    /// successful reply.
    pub fn forward_open(&mut self) -> CipResult<()> {
        self.require(SessionState::SessionRegistered, "forward_open")?;

        let kind = if self.config.extended_forward_open {
            ForwardOpenKind::Large
        } else {
            ForwardOpenKind::Standard
        };
        let params = ConnectionParams {
            originator_cid: self.originator_cid,
            originator_serial: self.config.originator_serial,
            vendor_id: self.config.vendor_id,
            originator_vsn: self.originator_vsn,
            rpi_us: self.config.rpi_us,
            direct_connection: self.config.direct_connection,
            backplane: self.config.backplane,
            cpu_slot: self.config.cpu_slot,
        };
        let body = build_forward_open(kind, params);
        let cpf = build_common_packet_format(
            DATA_ITEM_UNCONNECTED,
            &body,
            ADDRESS_ITEM_UCMM,
            None,
            self.config.timeout.as_secs() as u16,
        )?;

        let data = self.send_rr_data(&cpf)?;
        if data.len() < FORWARD_OPEN_CID_OFFSET + 4 {
            return Err(CipError::comm(4, "Forward Open reply shorter than expected"));
        }
        self.target_cid =
            unpack_udint(&data[FORWARD_OPEN_CID_OFFSET..FORWARD_OPEN_CID_OFFSET + 4])?;
        self.state = SessionState::CipConnected;
        debug!(target_cid = format_args!("{:#x}", self.target_cid), "forward open succeeded");
        Ok(())
    }

    /// Best-effort Forward Close: a non-zero reply status is recorded in
    /// `last_status` rather than raised, since a failed close still allows
    /// the caller to proceed with `un_register_session`/socket teardown.
    pub fn forward_close(&mut self) -> CipResult<()> {
        if self.state != SessionState::CipConnected {
            return Ok(());
        }
        let params = ConnectionParams {
            originator_cid: self.originator_cid,
            originator_serial: self.config.originator_serial,
            vendor_id: self.config.vendor_id,
            originator_vsn: self.originator_vsn,
            rpi_us: self.config.rpi_us,
            direct_connection: self.config.direct_connection,
            backplane: self.config.backplane,
            cpu_slot: self.config.cpu_slot,
        };
        let body = build_forward_close(params);
        let cpf = build_common_packet_format(
            DATA_ITEM_UNCONNECTED,
            &body,
            ADDRESS_ITEM_UCMM,
            None,
            self.config.timeout.as_secs() as u16,
        )?;

        match self.send_rr_data(&cpf) {
            Ok(data) => {
                let ok = data.get(FORWARD_CLOSE_STATUS_OFFSET).copied().unwrap_or(1) == 0;
                if !ok {
                    self.last_status = Some((2, "forward close returned non-zero status".to_string()));
                }
            }
            Err(e) => {
                warn!(error = %e, "forward_close failed, continuing teardown");
                self.last_status = Some((2, e.to_string()));
            }
        }
        self.target_cid = 0;
        self.state = SessionState::SessionRegistered;
        Ok(())
    }

    /// Fire-and-forget UnRegisterSession: no reply is expected.
    pub fn un_register_session(&mut self) -> CipResult<()> {
        if self.state != SessionState::SessionRegistered && self.state != SessionState::CipConnected {
            return Ok(());
        }
        let message = build_message(
            Command::UnRegisterSession,
            &[],
            self.session_handle,
            &self.config.sender_context,
        )?;
        if let Err(e) = self.transport.send(&message) {
            warn!(error = %e, "un_register_session send failed");
        }
        self.session_handle = 0;
        self.state = SessionState::TcpOpen;
        Ok(())
    }

    /// Tear down in reverse of `open`: Forward Close, then
    /// UnRegisterSession, then socket close, aggregating any errors from
    /// the first two steps into a single reported failure rather than
    /// skipping the remaining steps.
    pub fn close(&mut self) -> CipResult<()> {
        let mut errors = Vec::new();

        if let Err(e) = self.forward_close() {
            errors.push(e.to_string());
        }
        if let Err(e) = self.un_register_session() {
            errors.push(e.to_string());
        }
        if let Err(e) = self.transport.close() {
            errors.push(e.to_string());
        }

        self.session_handle = 0;
        self.target_cid = 0;
        self.state = SessionState::Disconnected;
        debug!("session closed");

        if errors.is_empty() {
            Ok(())
        } else {
            Err(CipError::transport(errors.join("; ")))
        }
    }

    /// Wrap `payload` in a SendRRData header, send, receive, validate, and
    /// return the reply body (the CPF payload, stripped of the
    /// encapsulation header).
    pub fn send_rr_data(&mut self, payload: &[u8]) -> CipResult<Vec<u8>> {
        self.require(SessionState::SessionRegistered, "send_rr_data")?;
        let message = build_message(
            Command::SendRrData,
            payload,
            self.session_handle,
            &self.config.sender_context,
        )?;
        self.transport.send(&message)?;
        let reply = self.transport.recv()?;
        let parsed = parse_reply(&reply, self.session_handle, &self.config.sender_context)?;
        Ok(parsed.data)
    }

    /// Wrap `payload` in a SendUnitData header (used for connected
    /// requests once `forward_open` has succeeded) and return the reply body.
    pub fn send_unit_data(&mut self, payload: &[u8]) -> CipResult<Vec<u8>> {
        self.require(SessionState::CipConnected, "send_unit_data")?;
        let message = build_message(
            Command::SendUnitData,
            payload,
            self.session_handle,
            &self.config.sender_context,
        )?;
        self.transport.send(&message)?;
        let reply = self.transport.recv()?;
        let parsed = parse_reply(&reply, self.session_handle, &self.config.sender_context)?;
        Ok(parsed.data)
    }

    /// Header-only heartbeat; does not expect a reply.
    pub fn nop(&mut self) -> CipResult<()> {
        let message = build_message(Command::Nop, &[], self.session_handle, &self.config.sender_context)?;
        self.transport.send(&message)
    }

    /// Broadcast-style identification query over the already-open TCP
    /// socket (does not require a registered session).
    pub fn list_identity(&mut self) -> CipResult<IdentityInfo> {
        self.require(SessionState::TcpOpen, "list_identity")?;
        let message = build_message(Command::ListIdentity, &[], 0, &self.config.sender_context)?;
        self.transport.send(&message)?;
        let reply = self.transport.recv()?;
        let parsed = parse_reply(&reply, 0, &self.config.sender_context)?;
        parse_identity(&parsed.data, IDENTITY_BASE_LIST_IDENTITY_REPLY)
    }

    /// Send an unconnected Identity Get_Attributes_All to the given
    /// backplane slot and parse the result. `send_rr_data` already strips
    /// the encapsulation header; the CPF envelope around the CIP response
    /// is left intact, since that's the shape `IDENTITY_BASE_UNCONNECTED_REPLY`
    /// is measured against.
    pub fn get_module_info(&mut self, slot: u8) -> CipResult<IdentityInfo> {
        let body = build_identity_request(self.config.backplane, slot);
        let cpf = build_common_packet_format(
            DATA_ITEM_UNCONNECTED,
            &body,
            ADDRESS_ITEM_UCMM,
            None,
            self.config.timeout.as_secs() as u16,
        )?;
        let data = self.send_rr_data(&cpf)?;
        parse_identity(&data, IDENTITY_BASE_UNCONNECTED_REPLY)
    }

    /// Build a connected CPF envelope around `payload` for
    /// `send_unit_data`: the next process-wide sequence number is embedded
    /// as the leading UINT of the data item, as CIP Class 3 connected
    /// transport requires.
    pub fn connected_cpf(&self, payload: &[u8]) -> CipResult<Vec<u8>> {
        let sequence = next_sequence();
        let mut framed = Vec::with_capacity(payload.len() + 2);
        framed.extend_from_slice(&pack_uint(sequence));
        framed.extend_from_slice(payload);
        build_connected_cpf(&framed, self.target_cid, self.config.timeout.as_secs() as u16)
    }

    /// Enter a scoped session: opens immediately, and guarantees `close()`
    /// runs when the guard drops, including during a panicking unwind.
    pub fn scoped(mut self) -> CipResult<ScopedSession> {
        self.open()?;
        Ok(ScopedSession { session: Some(self) })
    }
}

/// RAII guard returned by [`Session::scoped`]. Mirrors a context manager's
/// `__enter__`/`__exit__`: `Deref`/`DerefMut` give access to the session
/// for the scope's duration, and `Drop` calls `close()` unconditionally.
pub struct ScopedSession {
    session: Option<Session>,
}

impl std::ops::Deref for ScopedSession {
    type Target = Session;
    fn deref(&self) -> &Session {
        self.session.as_ref().expect("session taken before drop")
    }
}

impl std::ops::DerefMut for ScopedSession {
    fn deref_mut(&mut self) -> &mut Session {
        self.session.as_mut().expect("session taken before drop")
    }
}

impl Drop for ScopedSession {
    fn drop(&mut self) {
        if let Some(mut session) = self.session.take() {
            if let Err(e) = session.close() {
                warn!(error = %e, "error closing session during drop");
            }
        }
    }
}
