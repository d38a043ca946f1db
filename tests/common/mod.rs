//! Shared test infrastructure for resolution and server integration tests.

use std::collections::HashMap;
use std::io;
use std::net::{Ipv4Addr, SocketAddr};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use hickory_proto::op::{Edns, Message, MessageType, OpCode, Query, ResponseCode};
use hickory_proto::rr::rdata::A;
use hickory_proto::rr::{DNSClass, Name, RData, RecordType};
use hickory_proto::serialize::binary::{BinDecodable, BinDecoder, BinEncoder};
use hickory_server::authority::{MessageRequest, MessageResponse};
use hickory_server::proto::rr::Record;
use hickory_server::proto::xfer::Protocol;
use hickory_server::server::{Request, RequestHandler, ResponseHandler, ResponseInfo};
use tokio::net::UdpSocket;

use weighted_dns::config::ForwardSuffixRule;
use weighted_dns::forward::{ForwardRules, UdpForwarder};
use weighted_dns::resolver::ResolutionEngine;
use weighted_dns::table::RoutingTable;

// --- Constants ---

pub const TEST_TTL: u32 = 60;
pub const FORWARD_TIMEOUT: Duration = Duration::from_millis(300);

// --- TestResponseHandler ---

/// Captures the serialized DNS response for inspection in tests.
///
/// The response is serialized via `MessageResponse::destructive_emit()` and stored
/// as raw wire-format bytes, which can then be parsed with `Message::from_vec()`.
#[derive(Clone)]
pub struct TestResponseHandler {
    buf: Arc<Mutex<Vec<u8>>>,
}

impl TestResponseHandler {
    pub fn new() -> Self {
        Self {
            buf: Arc::new(Mutex::new(Vec::with_capacity(512))),
        }
    }

    /// Parse the captured wire bytes into a `Message` for assertions.
    pub fn into_message(self) -> Message {
        let buf = self.buf.lock().unwrap();
        assert!(!buf.is_empty(), "no response was captured");
        Message::from_vec(&buf).expect("failed to parse captured DNS response")
    }
}

#[async_trait]
impl ResponseHandler for TestResponseHandler {
    async fn send_response<'a>(
        &mut self,
        response: MessageResponse<
            '_,
            'a,
            impl Iterator<Item = &'a Record> + Send + 'a,
            impl Iterator<Item = &'a Record> + Send + 'a,
            impl Iterator<Item = &'a Record> + Send + 'a,
            impl Iterator<Item = &'a Record> + Send + 'a,
        >,
    ) -> io::Result<ResponseInfo> {
        let mut buf = self.buf.lock().unwrap();
        buf.clear();
        let mut encoder = BinEncoder::new(&mut *buf);
        encoder.set_max_size(u16::MAX);
        let info = response
            .destructive_emit(&mut encoder)
            .map_err(|e| io::Error::new(io::ErrorKind::Other, e))?;
        Ok(info)
    }
}

// --- MockUpstream ---

/// Upstream DNS server on a loopback UDP socket.
///
/// Answers A queries for known names, NXDOMAIN otherwise, and records every
/// question name it sees along with the EDNS options of each message.
/// Messages carrying an OPT record get one back.
pub struct MockUpstream {
    addr: SocketAddr,
    seen: Arc<Seen>,
    _shutdown: tokio::sync::oneshot::Sender<()>,
}

/// EDNS max payload and DO bit of a received message.
pub type EdnsSeen = Option<(u16, bool)>;

#[derive(Default)]
struct Seen {
    names: Mutex<Vec<String>>,
    edns: Mutex<Vec<EdnsSeen>>,
}

impl MockUpstream {
    pub async fn start(answers: &[(&str, &str)]) -> Self {
        let answers: HashMap<String, Ipv4Addr> = answers
            .iter()
            .map(|(name, ip)| (name.to_string(), ip.parse().unwrap()))
            .collect();

        let socket = UdpSocket::bind("127.0.0.1:0")
            .await
            .expect("failed to bind mock upstream");
        let addr = socket.local_addr().expect("failed to get local addr");
        let seen = Arc::new(Seen::default());
        let (tx, mut rx) = tokio::sync::oneshot::channel::<()>();

        let log = seen.clone();
        tokio::spawn(async move {
            let mut buf = vec![0u8; 4096];
            loop {
                let (len, src) = tokio::select! {
                    received = socket.recv_from(&mut buf) => match received {
                        Ok(received) => received,
                        Err(_) => return,
                    },
                    _ = &mut rx => return,
                };
                let Ok(query) = Message::from_vec(&buf[..len]) else {
                    continue;
                };
                let reply = answer(&query, &answers, &log);
                let _ = socket.send_to(&reply.to_vec().unwrap(), src).await;
            }
        });

        Self {
            addr,
            seen,
            _shutdown: tx,
        }
    }

    pub fn addr(&self) -> SocketAddr {
        self.addr
    }

    /// Question names received so far, in arrival order.
    pub fn queried(&self) -> Vec<String> {
        self.seen.names.lock().unwrap().clone()
    }

    /// EDNS options of each received message, in arrival order.
    pub fn received_edns(&self) -> Vec<EdnsSeen> {
        self.seen.edns.lock().unwrap().clone()
    }
}

fn answer(
    query: &Message,
    answers: &HashMap<String, Ipv4Addr>,
    seen: &Seen,
) -> Message {
    let mut reply = Message::new();
    reply
        .set_id(query.id())
        .set_message_type(MessageType::Response)
        .set_op_code(query.op_code())
        .set_recursion_desired(query.recursion_desired())
        .set_recursion_available(true);
    reply.add_queries(query.queries().iter().cloned());

    let edns = query
        .extensions()
        .as_ref()
        .map(|edns| (edns.max_payload(), edns.flags().dnssec_ok));
    seen.edns.lock().unwrap().push(edns);
    if let Some((max_payload, _)) = edns {
        let mut opt = Edns::new();
        opt.set_max_payload(max_payload);
        reply.set_edns(opt);
    }

    for q in query.queries() {
        let name = q.name().to_ascii().to_ascii_lowercase();
        seen.names.lock().unwrap().push(name.clone());
        match answers.get(&name) {
            Some(ip) => {
                reply.add_answer(Record::from_rdata(q.name().clone(), 300, RData::A(A(*ip))));
            }
            None => {
                reply.set_response_code(ResponseCode::NXDomain);
            }
        }
    }
    reply
}

/// A bound UDP socket that never replies. Keep it alive for the test.
pub async fn silent_upstream() -> (UdpSocket, SocketAddr) {
    let socket = UdpSocket::bind("127.0.0.1:0")
        .await
        .expect("failed to bind silent upstream");
    let addr = socket.local_addr().unwrap();
    (socket, addr)
}

// --- Engine builders ---

pub fn suffix_rule(suffix: &str, addr: SocketAddr) -> ForwardSuffixRule {
    ForwardSuffixRule {
        suffix: suffix.to_string(),
        addr,
    }
}

/// Build an engine forwarding over real UDP.
pub fn build_engine(
    table: RoutingTable,
    default_addr: Option<SocketAddr>,
    suffixes: Vec<ForwardSuffixRule>,
) -> ResolutionEngine {
    ResolutionEngine::new(
        table,
        ForwardRules::new(default_addr, suffixes),
        Arc::new(UdpForwarder::new(FORWARD_TIMEOUT)),
        TEST_TTL,
    )
}

// --- Query/Request construction ---

/// Build wire-format bytes for a DNS query.
pub fn build_query_bytes(name: &str, record_type: RecordType, id: u16) -> Vec<u8> {
    query_message(name, record_type, id).to_vec().unwrap()
}

/// Build wire-format bytes for a DNS query with an OPT record.
pub fn build_edns_query_bytes(
    name: &str,
    record_type: RecordType,
    id: u16,
    max_payload: u16,
    dnssec_ok: bool,
) -> Vec<u8> {
    let mut msg = query_message(name, record_type, id);
    let mut edns = Edns::new();
    edns.set_max_payload(max_payload);
    edns.set_dnssec_ok(dnssec_ok);
    msg.set_edns(edns);
    msg.to_vec().unwrap()
}

fn query_message(name: &str, record_type: RecordType, id: u16) -> Message {
    let mut msg = Message::new();
    msg.set_id(id);
    msg.set_message_type(MessageType::Query);
    msg.set_op_code(OpCode::Query);
    msg.set_recursion_desired(true);
    let mut query = Query::new();
    query.set_name(Name::from_ascii(name).unwrap());
    query.set_query_type(record_type);
    query.set_query_class(DNSClass::IN);
    msg.add_query(query);
    msg
}

/// Parse wire bytes into a MessageRequest.
pub fn parse_message_request(bytes: &[u8]) -> MessageRequest {
    let mut decoder = BinDecoder::new(bytes);
    MessageRequest::read(&mut decoder).expect("failed to parse MessageRequest")
}

/// Build a full `Request` as if received over UDP from a local client.
pub fn build_request(name: &str, record_type: RecordType, id: u16) -> Request {
    request_from_bytes(&build_query_bytes(name, record_type, id))
}

fn request_from_bytes(bytes: &[u8]) -> Request {
    let msg = parse_message_request(bytes);
    let src: SocketAddr = "127.0.0.1:12345".parse().unwrap();
    Request::new(msg, src, Protocol::Udp)
}

// --- Response helpers ---

/// Execute a query through the engine's request handler and return the parsed response.
pub async fn execute_query(
    engine: &ResolutionEngine,
    name: &str,
    record_type: RecordType,
    id: u16,
) -> Message {
    let request = build_request(name, record_type, id);
    let handler = TestResponseHandler::new();
    engine.handle_request(&request, handler.clone()).await;
    handler.into_message()
}

/// Execute a query carrying EDNS (max payload 4096, DO set).
pub async fn execute_edns_query(
    engine: &ResolutionEngine,
    name: &str,
    record_type: RecordType,
    id: u16,
) -> Message {
    let request = request_from_bytes(&build_edns_query_bytes(name, record_type, id, 4096, true));
    let handler = TestResponseHandler::new();
    engine.handle_request(&request, handler.clone()).await;
    handler.into_message()
}

/// Extract A addresses from a response.
pub fn extract_a_ips(msg: &Message) -> Vec<Ipv4Addr> {
    msg.answers()
        .iter()
        .filter_map(|r| match r.data() {
            RData::A(a) => Some(Ipv4Addr::from(*a)),
            _ => None,
        })
        .collect()
}

/// Extract CNAME targets from a response, in answer order.
pub fn extract_cname_targets(msg: &Message) -> Vec<String> {
    msg.answers()
        .iter()
        .filter_map(|r| match r.data() {
            RData::CNAME(cname) => Some(cname.0.to_ascii()),
            _ => None,
        })
        .collect()
}

/// Assert response code.
pub fn assert_response_code(msg: &Message, expected: ResponseCode) {
    assert_eq!(
        msg.response_code(),
        expected,
        "expected {:?}, got {:?}",
        expected,
        msg.response_code()
    );
}
