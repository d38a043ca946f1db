//! Real UDP loopback tests: a `ServerFuture` serving the resolution engine
//! on 127.0.0.1, queried over the wire.

mod common;

use std::net::{Ipv4Addr, SocketAddr};
use std::time::Duration;

use hickory_proto::op::{Message, ResponseCode};
use hickory_proto::rr::RecordType;
use hickory_server::ServerFuture;
use tokio::net::UdpSocket;
use weighted_dns::resolver::ResolutionEngine;
use weighted_dns::table::RoutingTable;

use common::*;

// =========================================================================
// Infrastructure
// =========================================================================

/// A test DNS server running on a random port.
struct TestServer {
    addr: SocketAddr,
    _shutdown: tokio::sync::oneshot::Sender<()>,
}

impl TestServer {
    async fn start(engine: ResolutionEngine) -> Self {
        let udp_socket = UdpSocket::bind("127.0.0.1:0")
            .await
            .expect("failed to bind UDP socket");
        let addr = udp_socket.local_addr().expect("failed to get local addr");

        let (tx, rx) = tokio::sync::oneshot::channel::<()>();

        tokio::spawn(async move {
            let mut server = ServerFuture::new(engine);
            server.register_socket(udp_socket);

            tokio::select! {
                result = server.block_until_done() => {
                    if let Err(e) = result {
                        eprintln!("server error: {}", e);
                    }
                }
                _ = rx => {}
            }
        });

        // Give the server a moment to start accepting packets.
        tokio::time::sleep(Duration::from_millis(50)).await;

        Self {
            addr,
            _shutdown: tx,
        }
    }
}

/// Send a DNS query over UDP and return the parsed response.
async fn query(server: SocketAddr, name: &str, record_type: RecordType, id: u16) -> Message {
    let sock = UdpSocket::bind("127.0.0.1:0")
        .await
        .expect("failed to bind client socket");

    let query_bytes = build_query_bytes(name, record_type, id);
    sock.send_to(&query_bytes, server)
        .await
        .expect("failed to send query");

    let mut buf = vec![0u8; 4096];
    let timeout = Duration::from_secs(5);
    let len = tokio::time::timeout(timeout, sock.recv(&mut buf))
        .await
        .expect("query timed out")
        .expect("failed to recv response");

    Message::from_vec(&buf[..len]).expect("failed to parse DNS response")
}

// =========================================================================
// Tests
// =========================================================================

#[tokio::test]
async fn loopback_local_answer() {
    let table = RoutingTable::new();
    table.set("web.example.com", "10.1.2.3", 1).unwrap();
    let server = TestServer::start(build_engine(table, None, vec![])).await;

    let msg = query(server.addr, "web.example.com.", RecordType::A, 1).await;

    assert_eq!(msg.id(), 1);
    assert_response_code(&msg, ResponseCode::NoError);
    assert_eq!(extract_a_ips(&msg), vec![Ipv4Addr::new(10, 1, 2, 3)]);
}

#[tokio::test]
async fn loopback_indirection_and_forwarding() {
    let upstream = MockUpstream::start(&[
        ("backend.example.net.", "10.7.7.7"),
        ("example.org.", "93.184.216.34"),
    ])
    .await;
    let table = RoutingTable::new();
    table.set("svc.example.com", "backend.example.net", 1).unwrap();
    let server = TestServer::start(build_engine(table, Some(upstream.addr()), vec![])).await;

    let msg = query(server.addr, "svc.example.com.", RecordType::A, 2).await;
    assert_response_code(&msg, ResponseCode::NoError);
    assert_eq!(extract_cname_targets(&msg), vec!["backend.example.net."]);
    assert_eq!(extract_a_ips(&msg), vec![Ipv4Addr::new(10, 7, 7, 7)]);

    let msg = query(server.addr, "example.org.", RecordType::A, 3).await;
    assert_eq!(msg.id(), 3);
    assert_eq!(extract_a_ips(&msg), vec![Ipv4Addr::new(93, 184, 216, 34)]);
}

#[tokio::test]
async fn loopback_table_changes_are_visible() {
    let table = RoutingTable::new();
    let server = TestServer::start(build_engine(table.clone(), None, vec![])).await;

    let msg = query(server.addr, "late.example.com.", RecordType::A, 4).await;
    assert_response_code(&msg, ResponseCode::ServFail);

    table.set("late.example.com", "10.0.0.8", 1).unwrap();
    let msg = query(server.addr, "late.example.com.", RecordType::A, 5).await;
    assert_eq!(extract_a_ips(&msg), vec![Ipv4Addr::new(10, 0, 0, 8)]);
}
