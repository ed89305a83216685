//! Drives a real `Session` over a loopback TCP socket against a minimal
//! fake EtherNet/IP target, exercising the full
//! Disconnected -> TcpOpen -> SessionRegistered -> CipConnected -> (close)
//! lifecycle end to end, the way the teacher's own `tcp_socket.rs` tests
//! spin up a background server and drive a client against it.

use std::io::{Read, Write};
use std::net::{TcpListener, TcpStream};
use std::thread;
use std::time::Duration;

use enip_cip_core::cpf::{build_common_packet_format, ADDRESS_ITEM_UCMM, DATA_ITEM_UNCONNECTED};
use enip_cip_core::encapsulation::{build_header, Command, HEADER_LEN};
use enip_cip_core::session::{Session, SessionConfig, SessionState};

fn read_message(stream: &mut TcpStream) -> Vec<u8> {
    let mut header = [0u8; HEADER_LEN];
    stream.read_exact(&mut header).unwrap();
    let data_len = u16::from_le_bytes([header[2], header[3]]) as usize;
    let mut tail = vec![0u8; data_len];
    if data_len > 0 {
        stream.read_exact(&mut tail).unwrap();
    }
    let mut message = header.to_vec();
    message.extend_from_slice(&tail);
    message
}

/// Wraps `cip_response` (a full CIP response: service/reserved/general
/// status/additional status size, plus whatever the service appends) in a
/// CPF payload with a zero-length UCMM address item, matching the shape
/// `send_rr_data` produces for an unconnected request/reply pair.
fn cpf_reply_data(cip_response: &[u8]) -> Vec<u8> {
    build_common_packet_format(DATA_ITEM_UNCONNECTED, cip_response, ADDRESS_ITEM_UCMM, None, 0).unwrap()
}

/// Plays a minimal EtherNet/IP target: accepts one connection, answers
/// RegisterSession with a fixed session handle, Forward Open with a fixed
/// target CID carried in a realistic CPF-wrapped CIP response, a Forward
/// Close success carried the same way, then drops the connection after
/// the client's UnRegisterSession (fire-and-forget, no reply expected).
fn spawn_fake_target(listener: TcpListener) -> thread::JoinHandle<()> {
    thread::spawn(move || {
        let (mut stream, _) = listener.accept().unwrap();
        let context = *b"_pycomm_";

        // RegisterSession
        let request = read_message(&mut stream);
        assert_eq!(u16::from_le_bytes([request[0], request[1]]), Command::RegisterSession as u16);
        let mut reply = build_header(Command::RegisterSession, 4, 0, &context);
        reply[4..8].copy_from_slice(&0xCAFEBABEu32.to_le_bytes());
        reply.extend_from_slice(&1u16.to_le_bytes());
        reply.extend_from_slice(&0u16.to_le_bytes());
        stream.write_all(&reply).unwrap();

        // Forward Open, wrapped in SendRRData: a CIP response whose
        // service/reserved/general-status/additional-status-size prefix is
        // followed by the target connection id, inside a CPF envelope.
        let request = read_message(&mut stream);
        assert_eq!(u16::from_le_bytes([request[0], request[1]]), Command::SendRrData as u16);
        let mut cip_response = vec![0u8; 26];
        cip_response[0] = 0xD4; // Forward Open reply service (request | 0x80)
        cip_response[2] = 0x00; // general status: success
        cip_response[4..8].copy_from_slice(&0x1122_3344u32.to_le_bytes()); // target cid
        let data = cpf_reply_data(&cip_response);
        let mut reply = build_header(Command::SendRrData, data.len() as u16, 0xCAFEBABE, &context);
        reply.extend_from_slice(&data);
        stream.write_all(&reply).unwrap();

        // Forward Close, also via SendRRData: a 4-byte CIP response
        // (service/reserved/general-status/additional-status-size) with a
        // zero general status, inside the same CPF envelope shape.
        let request = read_message(&mut stream);
        assert_eq!(u16::from_le_bytes([request[0], request[1]]), Command::SendRrData as u16);
        let cip_response = vec![0xCEu8, 0x00, 0x00, 0x00];
        let data = cpf_reply_data(&cip_response);
        let mut reply = build_header(Command::SendRrData, data.len() as u16, 0xCAFEBABE, &context);
        reply.extend_from_slice(&data);
        stream.write_all(&reply).unwrap();

        // UnRegisterSession: fire-and-forget, no reply expected.
        let request = read_message(&mut stream);
        assert_eq!(
            u16::from_le_bytes([request[0], request[1]]),
            Command::UnRegisterSession as u16
        );
    })
}

#[test]
fn full_session_lifecycle_against_fake_target() {
    let listener = TcpListener::bind("127.0.0.1:0").unwrap();
    let port = listener.local_addr().unwrap().port();
    let server = spawn_fake_target(listener);

    let config = SessionConfig {
        ip_address: "127.0.0.1".to_string(),
        port,
        timeout: Duration::from_secs(2),
        ..Default::default()
    };
    let mut session = Session::new(config);

    session.open().unwrap();
    assert_eq!(session.state(), SessionState::SessionRegistered);
    assert_eq!(session.session_handle(), 0xCAFEBABE);

    session.forward_open().unwrap();
    assert_eq!(session.state(), SessionState::CipConnected);
    assert_eq!(session.target_cid(), 0x1122_3344);

    session.close().unwrap();
    assert_eq!(session.state(), SessionState::Disconnected);
    assert_eq!(session.session_handle(), 0);
    assert!(session.status().is_none());

    server.join().unwrap();
}

/// A Forward Close reply with a non-zero general status is recorded in
/// `last_status` rather than silently treated as success.
#[test]
fn forward_close_nak_sets_last_status() {
    let listener = TcpListener::bind("127.0.0.1:0").unwrap();
    let port = listener.local_addr().unwrap().port();

    let server = thread::spawn(move || {
        let (mut stream, _) = listener.accept().unwrap();
        let context = *b"_pycomm_";

        let _request = read_message(&mut stream);
        let mut reply = build_header(Command::RegisterSession, 4, 0, &context);
        reply[4..8].copy_from_slice(&0x1000_0001u32.to_le_bytes());
        reply.extend_from_slice(&1u16.to_le_bytes());
        reply.extend_from_slice(&0u16.to_le_bytes());
        stream.write_all(&reply).unwrap();

        let _request = read_message(&mut stream);
        let mut cip_response = vec![0u8; 26];
        cip_response[0] = 0xD4;
        cip_response[2] = 0x00;
        cip_response[4..8].copy_from_slice(&0x2222_3333u32.to_le_bytes());
        let data = cpf_reply_data(&cip_response);
        let mut reply = build_header(Command::SendRrData, data.len() as u16, 0x1000_0001, &context);
        reply.extend_from_slice(&data);
        stream.write_all(&reply).unwrap();

        let _request = read_message(&mut stream);
        // general status 0x01: connection failure, reported as a NAK.
        let cip_response = vec![0xCEu8, 0x00, 0x01, 0x00];
        let data = cpf_reply_data(&cip_response);
        let mut reply = build_header(Command::SendRrData, data.len() as u16, 0x1000_0001, &context);
        reply.extend_from_slice(&data);
        stream.write_all(&reply).unwrap();

        let _request = read_message(&mut stream);
    });

    let config = SessionConfig {
        ip_address: "127.0.0.1".to_string(),
        port,
        timeout: Duration::from_secs(2),
        ..Default::default()
    };
    let mut session = Session::new(config);
    session.open().unwrap();
    session.forward_open().unwrap();

    session.close().unwrap();
    let (group, message) = session.status().expect("forward close NAK should set last_status");
    assert_eq!(group, 2);
    assert!(message.contains("non-zero status"));

    server.join().unwrap();
}
