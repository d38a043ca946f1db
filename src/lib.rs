//! Weighted DNS - A forwarding DNS server with weighted local answers.
//!
//! Domains in the routing table resolve to one of several candidates, drawn
//! at random in proportion to operator-assigned weights. Everything else is
//! forwarded to an upstream resolver chosen by question-name suffix.
//!
//! ## Features
//!
//! - O(1) weighted selection per query (alias method)
//! - Candidates can be IPv4 addresses (A answers) or domain names (CNAME plus
//!   the upstream answer for the target)
//! - Suffix-based upstream selection with a default fallback
//! - Live table edits and JSON snapshots over an HTTP admin interface
//! - Graceful shutdown support
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────┐
//! │                         weighted-dns                            │
//! │                                                                 │
//! │  ┌──────────────────┐    ┌──────────────────┐                  │
//! │  │  Admin HTTP API  │───▶│  Routing Table   │                  │
//! │  │  (axum)          │    │  (+ samplers)    │                  │
//! │  └──────────────────┘    └────────┬─────────┘                  │
//! │                                   │ lookup                      │
//! │                                   ▼                             │
//! │  ┌──────────────────┐    ┌──────────────────┐                  │
//! │  │  Upstream DNS    │◀───│ ResolutionEngine │◀── UDP/TCP       │
//! │  │  (by suffix)     │    │ (hickory server) │    :53           │
//! │  └──────────────────┘    └──────────────────┘                  │
//! └─────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## DNS Resolution
//!
//! ```text
//! svc.example.com
//!   → weighted draw from the table entry
//!   → 10.0.0.1            : A svc.example.com 10.0.0.1
//!   → backend.example.net : CNAME svc.example.com backend.example.net
//!                           + forwarded A answers for backend.example.net
//!   → no entry            : forward the query, relay the reply
//! ```
//!
//! ## Example Usage
//!
//! ```rust,ignore
//! use tokio_util::sync::CancellationToken;
//! use weighted_dns::{Config, DnsServer};
//!
//! #[tokio::main]
//! async fn main() {
//!     let config: Config = load_config();
//!
//!     let server = DnsServer::new(config).unwrap();
//!     server.table().set("svc.example.com", "10.0.0.1", 3).unwrap();
//!     server.table().set("svc.example.com", "10.0.0.2", 1).unwrap();
//!
//!     let shutdown = CancellationToken::new();
//!     server.run(shutdown).await.unwrap();
//! }
//! ```

#![warn(missing_docs)]

pub mod admin;
pub mod config;
pub mod error;
pub mod forward;
pub mod metrics;
pub mod resolver;
pub mod sampler;
pub mod server;
pub mod snapshot;
pub mod table;
pub mod telemetry;

// Re-export main types
pub use config::{Config, DnsConfig, ForwardConfig, TelemetryConfig};
pub use error::DnsError;
pub use resolver::ResolutionEngine;
pub use sampler::WeightedSampler;
pub use server::DnsServer;
pub use table::RoutingTable;
