//! Query resolution against the weighted routing table.
//!
//! ```text
//! query for <domain>
//!   → table lookup (weighted draw)
//!     ├─ address   → A <domain> <address>
//!     ├─ name      → forward A <name>, answer CNAME <domain> <name> + upstream answers
//!     └─ not found → forward the query as-is, relay the upstream reply
//! ```
//!
//! Every failure on this path ends in SERVFAIL for the client.

use async_trait::async_trait;
use hickory_proto::op::{Header, Message, MessageType, OpCode, Query, ResponseCode};
use hickory_proto::rr::rdata::{A, CNAME};
use hickory_proto::rr::{Name, RData, Record, RecordType};
use hickory_server::authority::MessageResponseBuilder;
use hickory_server::server::{Request, RequestHandler, ResponseHandler, ResponseInfo};
use std::net::IpAddr;
use std::sync::Arc;
use tracing::{debug, error, trace, warn};

use crate::config::{DnsConfig, ForwardConfig};
use crate::error::DnsError;
use crate::forward::{ForwardRules, ProxyForwarder, UdpForwarder};
use crate::metrics::{self, QueryResult, Timer};
use crate::table::RoutingTable;

/// What a table candidate turned out to be.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Candidate {
    /// Literal network address.
    Address(IpAddr),
    /// Another domain name to resolve through an upstream.
    Domain(String),
}

impl Candidate {
    /// Classify a stored candidate by trying to parse it as an address.
    pub fn classify(value: &str) -> Self {
        match value.parse::<IpAddr>() {
            Ok(ip) => Candidate::Address(ip),
            Err(_) => Candidate::Domain(value.to_string()),
        }
    }
}

/// Which branch produced a reply.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    /// A record synthesized from a table address.
    Local,
    /// CNAME to a table domain plus the forwarded answer for it.
    Indirect,
    /// Upstream reply relayed unchanged.
    Forwarded,
}

impl From<Outcome> for QueryResult {
    fn from(outcome: Outcome) -> Self {
        match outcome {
            Outcome::Local => QueryResult::Local,
            Outcome::Indirect => QueryResult::Indirect,
            Outcome::Forwarded => QueryResult::Forwarded,
        }
    }
}

/// A reply plus the branch that produced it.
#[derive(Debug, Clone)]
pub struct Resolution {
    /// Branch taken.
    pub outcome: Outcome,
    /// Message to send back to the client.
    pub reply: Message,
}

/// DNS query handler backed by the routing table.
pub struct ResolutionEngine {
    table: RoutingTable,
    rules: ForwardRules,
    forwarder: Arc<dyn ProxyForwarder>,
    ttl: u32,
}

impl ResolutionEngine {
    /// Create an engine over the given table, forwarding rules and transport.
    pub fn new(
        table: RoutingTable,
        rules: ForwardRules,
        forwarder: Arc<dyn ProxyForwarder>,
        ttl: u32,
    ) -> Self {
        Self {
            table,
            rules,
            forwarder,
            ttl,
        }
    }

    /// Create an engine forwarding over UDP as configured.
    pub fn from_config(table: RoutingTable, dns: &DnsConfig, forward: &ForwardConfig) -> Self {
        Self::new(
            table,
            ForwardRules::from_config(forward),
            Arc::new(UdpForwarder::from_config(forward)),
            dns.ttl,
        )
    }

    /// Resolve the first question of `request`.
    pub async fn resolve(&self, request: &Message) -> Result<Resolution, DnsError> {
        let query = request.queries().first().ok_or(DnsError::MissingQuestion)?;
        let name = query.name().clone();
        let domain = name.to_ascii();

        let Some(candidate) = self.table.lookup(&domain) else {
            trace!(%domain, "not in routing table, forwarding");
            let reply = self.forward(request).await?;
            return Ok(Resolution {
                outcome: Outcome::Forwarded,
                reply,
            });
        };

        match Candidate::classify(&candidate) {
            Candidate::Address(ip) => {
                debug!(%domain, %ip, "answering from routing table");
                Ok(Resolution {
                    outcome: Outcome::Local,
                    reply: self.answer_address(request, name, ip)?,
                })
            }
            Candidate::Domain(target) => {
                debug!(%domain, %target, "candidate is a domain, resolving upstream");
                Ok(Resolution {
                    outcome: Outcome::Indirect,
                    reply: self.answer_indirect(request, name, &target).await?,
                })
            }
        }
    }

    /// Send `message` to the upstream chosen by the forward rules.
    pub async fn forward(&self, message: &Message) -> Result<Message, DnsError> {
        let addr = self.rules.resolve_addr(message).ok_or_else(|| {
            DnsError::ForwardUnavailable(format!(
                "no forward address for {}",
                question_names(message)
            ))
        })?;
        self.forwarder.forward(message, addr).await
    }

    fn answer_address(&self, request: &Message, name: Name, ip: IpAddr) -> Result<Message, DnsError> {
        let IpAddr::V4(v4) = ip else {
            return Err(DnsError::RecordSynthesis(format!(
                "{ip} cannot be served as an A record for {name}"
            )));
        };

        let mut reply = reply_to(request);
        reply.set_authoritative(true);
        reply.add_answer(Record::from_rdata(name, self.ttl, RData::A(A(v4))));
        Ok(reply)
    }

    async fn answer_indirect(
        &self,
        request: &Message,
        name: Name,
        target: &str,
    ) -> Result<Message, DnsError> {
        let target = parse_target(target)?;

        let mut sub_query = Message::new();
        sub_query
            .set_id(rand::random())
            .set_message_type(MessageType::Query)
            .set_op_code(OpCode::Query)
            .set_recursion_desired(true);
        sub_query.add_query(Query::query(target.clone(), RecordType::A));
        if let Some(edns) = request.extensions() {
            sub_query.set_edns(edns.clone());
        }

        let forwarded = self.forward(&sub_query).await?;

        let cname = Record::from_rdata(name, self.ttl, RData::CNAME(CNAME(target)));

        let mut reply = reply_to(request);
        reply
            .set_recursion_available(forwarded.recursion_available())
            .set_response_code(forwarded.response_code());
        reply.add_answer(cname);
        reply.add_answers(forwarded.answers().iter().cloned());
        reply.add_name_servers(forwarded.name_servers().iter().cloned());
        reply.add_additionals(forwarded.additionals().iter().cloned());
        Ok(reply)
    }
}

/// Empty response carrying the request's id, flags and questions.
fn reply_to(request: &Message) -> Message {
    let mut reply = Message::new();
    reply
        .set_id(request.id())
        .set_message_type(MessageType::Response)
        .set_op_code(request.op_code())
        .set_recursion_desired(request.recursion_desired())
        .set_checking_disabled(request.checking_disabled());
    reply.add_queries(request.queries().iter().cloned());
    if let Some(edns) = request.extensions() {
        reply.set_edns(edns.clone());
    }
    reply
}

fn parse_target(target: &str) -> Result<Name, DnsError> {
    let mut name = Name::from_ascii(target)
        .map_err(|e| DnsError::RecordSynthesis(format!("invalid CNAME target {target:?}: {e}")))?;
    if name.is_root() {
        return Err(DnsError::RecordSynthesis(format!(
            "invalid CNAME target {target:?}"
        )));
    }
    name.set_fqdn(true);
    Ok(name)
}

fn question_names(message: &Message) -> String {
    message
        .queries()
        .iter()
        .map(|q| q.name().to_string())
        .collect::<Vec<_>>()
        .join(", ")
}

/// Rebuild the client's query from what the listener parsed, keeping its
/// EDNS options and additional records so a forward carries them upstream.
fn request_to_message(request: &Request) -> Message {
    let header = request.header();
    let mut message = Message::new();
    message
        .set_id(header.id())
        .set_message_type(MessageType::Query)
        .set_op_code(header.op_code())
        .set_recursion_desired(header.recursion_desired())
        .set_checking_disabled(header.checking_disabled())
        .set_authentic_data(header.authentic_data());
    message.add_queries(request.queries().iter().map(|q| q.original().clone()));
    message.add_additionals(request.additionals().iter().cloned());
    if let Some(edns) = request.edns() {
        message.set_edns(edns.clone());
    }
    message
}

async fn send_reply<R: ResponseHandler>(
    request: &Request,
    reply: &Message,
    mut response_handle: R,
) -> ResponseInfo {
    let mut header = *reply.header();
    header.set_id(request.header().id());
    header.set_message_type(MessageType::Response);

    let mut builder = MessageResponseBuilder::from_message_request(request);
    if let Some(edns) = reply.extensions() {
        builder.edns(edns.clone());
    }
    let response = builder.build(
        header,
        reply.answers().iter(),
        reply.name_servers().iter(),
        std::iter::empty(),
        reply.additionals().iter(),
    );

    response_handle
        .send_response(response)
        .await
        .unwrap_or_else(|e| {
            error!(error = %e, "failed to send DNS response");
            header.into()
        })
}

async fn send_failure<R: ResponseHandler>(request: &Request, mut response_handle: R) -> ResponseInfo {
    let mut header = Header::response_from_request(request.header());
    header.set_response_code(ResponseCode::ServFail);

    let response = MessageResponseBuilder::from_message_request(request).build_no_records(header);

    response_handle
        .send_response(response)
        .await
        .unwrap_or_else(|e| {
            error!(error = %e, "failed to send SERVFAIL response");
            header.into()
        })
}

#[async_trait]
impl RequestHandler for ResolutionEngine {
    async fn handle_request<R: ResponseHandler>(
        &self,
        request: &Request,
        response_handle: R,
    ) -> ResponseInfo {
        let timer = Timer::start();
        let query = request_to_message(request);

        match self.resolve(&query).await {
            Ok(resolution) => {
                metrics::record_query(resolution.outcome.into(), timer.elapsed());
                trace!(
                    src = %request.src(),
                    outcome = ?resolution.outcome,
                    answers = resolution.reply.answers().len(),
                    "query resolved"
                );
                send_reply(request, &resolution.reply, response_handle).await
            }
            Err(e) => {
                metrics::record_query(QueryResult::Error, timer.elapsed());
                warn!(
                    src = %request.src(),
                    question = %question_names(&query),
                    error = %e,
                    "query failed, answering SERVFAIL"
                );
                send_failure(request, response_handle).await
            }
        }
    }
}
