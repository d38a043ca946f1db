//! DNS server setup and lifecycle management.

use hickory_server::ServerFuture;
use std::time::Duration;
use tokio::net::{TcpListener, UdpSocket};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::admin;
use crate::config::Config;
use crate::error::DnsError;
use crate::resolver::ResolutionEngine;
use crate::snapshot;
use crate::table::RoutingTable;

/// Interval for emitting table metrics.
const METRICS_INTERVAL: Duration = Duration::from_secs(10);

/// Periodically emit table metrics.
async fn metrics_loop(table: RoutingTable, shutdown: CancellationToken) {
    let mut interval = tokio::time::interval(METRICS_INTERVAL);

    loop {
        tokio::select! {
            _ = interval.tick() => {
                table.emit_metrics();
                debug!(
                    domains = table.domains_count(),
                    candidates = table.candidates_count(),
                    "emitted table metrics"
                );
            }
            _ = shutdown.cancelled() => {
                debug!("metrics loop shutting down");
                return;
            }
        }
    }
}

/// Serve the admin interface until shutdown.
async fn admin_loop(listener: TcpListener, table: RoutingTable, shutdown: CancellationToken) {
    let router = admin::build_router(table);
    let result = axum::serve(listener, router)
        .with_graceful_shutdown(async move { shutdown.cancelled().await })
        .await;

    if let Err(e) = result {
        error!("Admin server error: {}", e);
    }
}

/// Weighted DNS server: routing table, DNS listeners and admin interface.
pub struct DnsServer {
    config: Config,
    table: RoutingTable,
}

impl DnsServer {
    /// Create a server and seed its table: the snapshot file first (when
    /// configured and present), then the static routes on top.
    pub fn new(config: Config) -> Result<Self, DnsError> {
        let table = RoutingTable::new();

        if let Some(path) = &config.admin.snapshot_path {
            snapshot::restore_file(&table, path)?;
        }

        for route in &config.routes {
            table.set(&route.domain, &route.candidate, route.weight)?;
        }

        info!(
            domains = table.domains_count(),
            candidates = table.candidates_count(),
            "Routing table seeded"
        );

        Ok(Self { config, table })
    }

    /// Get a handle to the routing table.
    pub fn table(&self) -> &RoutingTable {
        &self.table
    }

    /// Run until `shutdown` is cancelled, then write the table back to the
    /// snapshot file if one is configured.
    pub async fn run(self, shutdown: CancellationToken) -> Result<(), DnsError> {
        let dns = &self.config.dns;
        info!(
            udp_addr = ?dns.udp_addr,
            tcp_addr = ?dns.tcp_addr,
            admin_addr = ?self.config.admin.listen_addr,
            default_forward = ?self.config.forward.default_addr,
            "Starting weighted-dns server"
        );

        let engine = ResolutionEngine::from_config(self.table.clone(), dns, &self.config.forward);
        let mut server = ServerFuture::new(engine);

        if let Some(addr) = dns.udp_addr {
            let udp_socket = UdpSocket::bind(addr).await?;
            info!(addr = %udp_socket.local_addr()?, "DNS UDP listening");
            server.register_socket(udp_socket);
        }

        if let Some(addr) = dns.tcp_addr {
            let tcp_listener = TcpListener::bind(addr).await?;
            info!(addr = %tcp_listener.local_addr()?, "DNS TCP listening");
            server.register_listener(tcp_listener, Duration::from_secs(dns.tcp_timeout_secs));
        }

        let admin_handle = match self.config.admin.listen_addr {
            Some(addr) => {
                let listener = TcpListener::bind(addr).await?;
                info!(addr = %listener.local_addr()?, "Admin API listening");
                Some(tokio::spawn(admin_loop(
                    listener,
                    self.table.clone(),
                    shutdown.clone(),
                )))
            }
            None => None,
        };

        // Start metrics loop
        let metrics_handle = tokio::spawn(metrics_loop(self.table.clone(), shutdown.clone()));

        // Emit initial metrics
        self.table.emit_metrics();

        tokio::select! {
            _ = shutdown.cancelled() => {
                info!("DNS server shutdown requested");
            }
            result = server.block_until_done() => {
                if let Err(e) = result {
                    error!("DNS server error: {}", e);
                }
                shutdown.cancel();
            }
        }

        if let Err(e) = server.shutdown_gracefully().await {
            warn!("DNS listeners did not stop cleanly: {}", e);
        }

        let _ = metrics_handle.await;
        if let Some(handle) = admin_handle {
            let _ = handle.await;
        }

        if let Some(path) = &self.config.admin.snapshot_path {
            snapshot::save_file(&self.table, path)?;
        }

        info!("DNS server stopped");
        Ok(())
    }
}
