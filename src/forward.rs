//! Upstream forwarding: suffix-based upstream selection and the UDP exchange.

use async_trait::async_trait;
use hickory_proto::op::Message;
use std::net::{Ipv4Addr, Ipv6Addr, SocketAddr};
use std::time::Duration;
use tokio::net::UdpSocket;
use tokio::time::timeout;
use tracing::{debug, warn};

use crate::config::{ForwardConfig, ForwardSuffixRule};
use crate::error::DnsError;
use crate::metrics::{self, ForwardResult};

/// Receive buffer for upstream replies, large enough for any EDNS payload.
const UDP_RECV_BUFFER_SIZE: usize = u16::MAX as usize;

/// Chooses the upstream server for a message.
#[derive(Debug, Clone, Default)]
pub struct ForwardRules {
    default_addr: Option<SocketAddr>,
    /// Suffixes are stored lowercased.
    suffixes: Vec<ForwardSuffixRule>,
}

impl ForwardRules {
    /// Build rules from an explicit default and ordered suffix list.
    pub fn new(default_addr: Option<SocketAddr>, suffixes: Vec<ForwardSuffixRule>) -> Self {
        let suffixes = suffixes
            .into_iter()
            .map(|rule| ForwardSuffixRule {
                suffix: rule.suffix.to_ascii_lowercase(),
                addr: rule.addr,
            })
            .collect();
        Self {
            default_addr,
            suffixes,
        }
    }

    /// Build rules from configuration.
    pub fn from_config(config: &ForwardConfig) -> Self {
        Self::new(config.default_addr, config.suffixes.clone())
    }

    /// The single upstream every suffix match across all questions agrees
    /// on. `None` if nothing matches or matches disagree.
    pub fn suffix_match(&self, message: &Message) -> Option<SocketAddr> {
        let mut matched: Option<SocketAddr> = None;

        for query in message.queries() {
            let name = query.name().to_ascii().to_ascii_lowercase();
            for rule in &self.suffixes {
                if !name.ends_with(&rule.suffix) {
                    continue;
                }
                match matched {
                    Some(addr) if addr != rule.addr => {
                        debug!(
                            name = %name,
                            first = %addr,
                            second = %rule.addr,
                            "ambiguous suffix match"
                        );
                        return None;
                    }
                    _ => matched = Some(rule.addr),
                }
            }
        }

        matched
    }

    /// Upstream for `message`: the suffix match, else the default.
    pub fn resolve_addr(&self, message: &Message) -> Option<SocketAddr> {
        self.suffix_match(message).or(self.default_addr)
    }
}

/// Sends a DNS message to an upstream server and returns its reply.
#[async_trait]
pub trait ProxyForwarder: Send + Sync {
    /// Exchange `message` with `addr`. Any network or protocol failure is
    /// reported as an error; nothing is retried.
    async fn forward(&self, message: &Message, addr: SocketAddr) -> Result<Message, DnsError>;
}

/// Plain UDP exchange bounded by a timeout.
#[derive(Debug, Clone)]
pub struct UdpForwarder {
    timeout: Duration,
}

impl UdpForwarder {
    /// Create a forwarder that waits at most `timeout` for each reply.
    pub fn new(timeout: Duration) -> Self {
        Self { timeout }
    }

    /// Create a forwarder from configuration.
    pub fn from_config(config: &ForwardConfig) -> Self {
        Self::new(Duration::from_millis(config.timeout_ms.max(1)))
    }

    async fn exchange(&self, message: &Message, addr: SocketAddr) -> Result<Message, DnsError> {
        let query_bytes = message.to_vec()?;

        let bind_addr = if addr.is_ipv4() {
            SocketAddr::from((Ipv4Addr::UNSPECIFIED, 0))
        } else {
            SocketAddr::from((Ipv6Addr::UNSPECIFIED, 0))
        };
        let socket = UdpSocket::bind(bind_addr).await?;
        socket.send_to(&query_bytes, addr).await?;

        // Stray datagrams are dropped; the caller's timeout bounds the wait.
        let mut recv_buf = vec![0u8; UDP_RECV_BUFFER_SIZE];
        loop {
            let (len, src) = socket.recv_from(&mut recv_buf).await?;
            if src != addr {
                debug!(%src, expected = %addr, "dropping reply from unexpected source");
                continue;
            }

            let reply = match Message::from_vec(&recv_buf[..len]) {
                Ok(reply) => reply,
                Err(e) => {
                    debug!(%addr, error = %e, "dropping undecodable reply");
                    continue;
                }
            };
            if reply.id() != message.id() {
                debug!(
                    %addr,
                    reply_id = reply.id(),
                    query_id = message.id(),
                    "dropping reply with mismatched id"
                );
                continue;
            }

            return Ok(reply);
        }
    }
}

#[async_trait]
impl ProxyForwarder for UdpForwarder {
    async fn forward(&self, message: &Message, addr: SocketAddr) -> Result<Message, DnsError> {
        let name = message
            .queries()
            .first()
            .map(|q| q.name().to_string())
            .unwrap_or_default();
        debug!(%addr, %name, "forwarding query");

        match timeout(self.timeout, self.exchange(message, addr)).await {
            Ok(Ok(reply)) => {
                metrics::record_forward(ForwardResult::Success);
                Ok(reply)
            }
            Ok(Err(e)) => {
                metrics::record_forward(ForwardResult::Error);
                warn!(%addr, %name, error = %e, "upstream exchange failed");
                Err(match e {
                    DnsError::ForwardUnavailable(_) => e,
                    other => DnsError::ForwardUnavailable(format!("{addr}: {other}")),
                })
            }
            Err(_) => {
                metrics::record_forward(ForwardResult::Timeout);
                warn!(%addr, %name, timeout = ?self.timeout, "upstream exchange timed out");
                Err(DnsError::ForwardUnavailable(format!(
                    "no reply from {addr} within {:?}",
                    self.timeout
                )))
            }
        }
    }
}
