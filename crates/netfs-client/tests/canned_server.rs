// Copyright 2025 Schelling Point Labs Inc
// SPDX-License-Identifier: AGPL-3.0-only

//! Client behaviour against a server that replies with canned frames.

use netfs_client::{ClientConfig, ClientError, FileKind, NetFsClient};
use netfs_proto::{
    AttrResponse, DirEntry, DirResponse, Opcode, OpenResponse, ProtocolError, ReadResponse,
    Request, Response, Status, encode_frame, read_frame,
};
use std::ffi::OsString;
use std::io::Write;
use std::net::TcpListener;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

/// Accept one connection, record the request and answer with `reply`.
fn serve_once(reply: Vec<u8>) -> (NetFsClient, JoinHandle<Request>) {
    let listener = TcpListener::bind("127.0.0.1:0").unwrap();
    let port = listener.local_addr().unwrap().port();
    let handle = thread::spawn(move || {
        let (mut stream, _) = listener.accept().unwrap();
        let (header, payload) = read_frame(&mut stream).unwrap();
        let request = Request::decode_payload(header.opcode, &payload).unwrap();
        stream.write_all(&reply).unwrap();
        request
    });
    let config = ClientConfig::new("127.0.0.1", port).with_io_timeout(Duration::from_secs(5));
    (NetFsClient::new(config), handle)
}

fn entry(name: &str, is_directory: bool) -> DirEntry {
    DirEntry {
        name: name.as_bytes().to_vec(),
        is_directory,
    }
}

#[test]
fn get_attr_sends_path_and_decodes_stat() {
    let mut attr = AttrResponse::failure(Status::Ok);
    attr.exists = true;
    attr.is_directory = true;
    attr.mode = 0o040555;
    attr.nlink = 2;
    let (client, server) = serve_once(Response::GetAttr(attr).encode());

    let stat = client.get_attr("/docs").unwrap();
    assert_eq!(stat.kind, FileKind::Directory);
    assert_eq!(stat.perm(), 0o555);
    assert_eq!(server.join().unwrap(), Request::get_attr("/docs"));
}

#[test]
fn missing_path_surfaces_enoent() {
    let (client, _server) = serve_once(Response::GetAttr(AttrResponse::missing()).encode());

    let err = client.get_attr("/missing").unwrap_err();
    assert_eq!(err.status(), Some(Status::NotFound));
    assert_eq!(err.errno(), libc::ENOENT);
}

#[test]
fn read_dir_synthesises_dot_entries_and_stops_when_full() {
    let listing = DirResponse::new(vec![
        entry("a.txt", false),
        entry("b.txt", false),
        entry("sub", true),
    ]);
    let (client, _server) = serve_once(Response::ReadDir(listing).encode());

    let mut seen = Vec::new();
    client
        .read_dir("/docs", |name, kind| {
            seen.push((name.to_os_string(), kind));
            seen.len() == 3
        })
        .unwrap();

    assert_eq!(
        seen,
        vec![
            (OsString::from("."), FileKind::Directory),
            (OsString::from(".."), FileKind::Directory),
            (OsString::from("a.txt"), FileKind::File),
        ]
    );
}

#[test]
fn invalid_entry_name_is_a_protocol_failure() {
    let listing = DirResponse::new(vec![entry("ok", false), entry("../escape", false)]);
    let (client, _server) = serve_once(Response::ReadDir(listing).encode());

    let mut delivered = 0;
    let err = client
        .read_dir("/", |_, _| {
            delivered += 1;
            false
        })
        .unwrap_err();
    assert!(err.is_protocol_failure());
    assert_eq!(delivered, 0);
}

#[test]
fn count_disagreeing_with_entries_is_rejected() {
    let mut listing = DirResponse::new(vec![entry("a", false)]);
    listing.count = 5;
    let (client, _server) = serve_once(Response::ReadDir(listing).encode());

    match client.list_dir("/") {
        Err(ClientError::Protocol(ProtocolError::LengthMismatch { declared, actual })) => {
            assert_eq!(declared, 5);
            assert_eq!(actual, 1);
        }
        other => panic!("unexpected result: {:?}", other),
    }
}

#[test]
fn mismatched_response_opcode_is_rejected() {
    let (client, _server) =
        serve_once(Response::Open(OpenResponse { status: Status::Ok }).encode());

    let err = client.get_attr("/notes.txt").unwrap_err();
    assert!(matches!(
        err,
        ClientError::Protocol(ProtocolError::OpcodeMismatch { .. })
    ));
}

#[test]
fn truncated_response_is_a_protocol_failure() {
    let mut frame = Response::Read(ReadResponse::new(b"hello".to_vec())).encode();
    frame.truncate(frame.len() - 2);
    let (client, _server) = serve_once(frame);

    let mut buf = [0u8; 16];
    let err = client.read("/notes.txt", 0, &mut buf).unwrap_err();
    assert!(matches!(
        err,
        ClientError::Protocol(ProtocolError::Truncated { .. })
    ));
}

#[test]
fn read_copies_data_and_requests_buffer_length() {
    let (client, server) =
        serve_once(Response::Read(ReadResponse::new(b"world".to_vec())).encode());

    let mut buf = [0u8; 8];
    let n = client.read("/notes.txt", 6, &mut buf).unwrap();
    assert_eq!(&buf[..n], b"world");
    assert_eq!(server.join().unwrap(), Request::read("/notes.txt", 6, 8));
}

#[test]
fn oversized_read_reply_is_rejected() {
    let (client, _server) =
        serve_once(Response::Read(ReadResponse::new(vec![1u8; 32])).encode());

    let mut buf = [0u8; 4];
    let err = client.read("/notes.txt", 0, &mut buf).unwrap_err();
    assert!(err.is_protocol_failure());
}

#[test]
fn open_reports_status() {
    let (client, _server) = serve_once(
        Response::Open(OpenResponse {
            status: Status::IsADirectory,
        })
        .encode(),
    );
    assert_eq!(client.open("/docs").unwrap_err().status(), Some(Status::IsADirectory));
}

#[test]
fn server_closing_without_reply_is_a_transport_error() {
    let (client, _server) = serve_once(Vec::new());
    let err = client.open("/notes.txt").unwrap_err();
    assert!(matches!(err, ClientError::Transport(_)));
}

#[test]
fn unknown_opcode_in_reply_is_a_protocol_failure() {
    let mut frame = encode_frame(Opcode::Open, &[0]);
    frame[9] = 0x7f;
    let (client, _server) = serve_once(frame);
    assert!(matches!(
        client.open("/notes.txt"),
        Err(ClientError::Protocol(ProtocolError::UnknownOperation(0x7f)))
    ));
}

#[test]
fn refused_connection_is_a_connection_failure() {
    // Bind then drop to obtain a port nobody listens on.
    let port = TcpListener::bind("127.0.0.1:0").unwrap().local_addr().unwrap().port();
    let client = NetFsClient::new(ClientConfig::new("127.0.0.1", port));

    let err = client.get_attr("/").unwrap_err();
    assert!(err.is_connection_failure(), "{:?}", err);
    assert!(!err.is_protocol_failure());
}

#[test]
fn unresolvable_host_is_a_connection_failure() {
    let client = NetFsClient::new(ClientConfig::new("no-such-host.invalid", 4455));
    assert!(matches!(
        client.get_attr("/"),
        Err(ClientError::Resolve { .. })
    ));
}

#[test]
fn sessions_are_single_use() {
    let (client, server) = serve_once(Response::Open(OpenResponse { status: Status::Ok }).encode());
    client.open("/notes.txt").unwrap();
    server.join().unwrap();

    // The canned server accepted exactly one connection and is gone.
    assert!(client.open("/notes.txt").unwrap_err().is_connection_failure());
}

#[test]
fn silent_server_hits_the_io_timeout() {
    let listener = TcpListener::bind("127.0.0.1:0").unwrap();
    let port = listener.local_addr().unwrap().port();
    let (done_tx, done_rx) = std::sync::mpsc::channel::<()>();
    let server = thread::spawn(move || {
        // Hold the connection open without ever answering.
        let (_stream, _) = listener.accept().unwrap();
        let _ = done_rx.recv();
    });

    let client = NetFsClient::new(
        ClientConfig::new("127.0.0.1", port).with_io_timeout(Duration::from_millis(200)),
    );
    let started = Instant::now();
    let err = client.get_attr("/notes.txt").unwrap_err();
    let elapsed = started.elapsed();

    assert!(matches!(err, ClientError::Transport(_)), "{:?}", err);
    assert_eq!(err.errno(), libc::EIO);
    assert!(elapsed >= Duration::from_millis(150), "returned after {:?}", elapsed);
    assert!(elapsed < Duration::from_secs(5), "returned after {:?}", elapsed);

    done_tx.send(()).unwrap();
    server.join().unwrap();
}
