//! JSON export and import of routing table snapshots.
//!
//! ```json
//! { "svc.example.com.": { "resolvers": { "10.0.0.1": 3, "backend.example.net.": 1 } } }
//! ```

use std::io::{ErrorKind, Write};
use std::path::Path;
use tempfile::NamedTempFile;
use tracing::{debug, info};

use crate::error::DnsError;
use crate::table::{RoutingTable, Snapshot};

/// Serialize a snapshot to JSON.
pub fn encode(snapshot: &Snapshot) -> Result<Vec<u8>, DnsError> {
    Ok(serde_json::to_vec_pretty(snapshot)?)
}

/// Parse a JSON snapshot. Weights are validated when the snapshot is
/// installed, not here.
pub fn decode(bytes: &[u8]) -> Result<Snapshot, DnsError> {
    Ok(serde_json::from_slice(bytes)?)
}

/// Read a snapshot file. A missing file yields `Ok(None)`.
pub fn load_file(path: &Path) -> Result<Option<Snapshot>, DnsError> {
    match std::fs::read(path) {
        Ok(bytes) => decode(&bytes).map(Some),
        Err(e) if e.kind() == ErrorKind::NotFound => {
            debug!(path = %path.display(), "no snapshot file");
            Ok(None)
        }
        Err(e) => Err(e.into()),
    }
}

/// Write the table's current contents to `path`.
///
/// The JSON goes to a temporary file in the same directory which is then
/// renamed over `path`, so readers see either the old or the new snapshot.
pub fn save_file(table: &RoutingTable, path: &Path) -> Result<(), DnsError> {
    let bytes = encode(&table.snapshot())?;

    let dir = match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent,
        _ => Path::new("."),
    };
    let mut file = NamedTempFile::new_in(dir)?;
    file.write_all(&bytes)?;
    file.as_file().sync_all()?;
    file.persist(path).map_err(|e| DnsError::Io(e.error))?;
    info!(path = %path.display(), domains = table.domains_count(), "wrote snapshot");
    Ok(())
}

/// Install the snapshot at `path` into `table`, if the file exists.
/// Returns whether anything was installed.
pub fn restore_file(table: &RoutingTable, path: &Path) -> Result<bool, DnsError> {
    let Some(snapshot) = load_file(path)? else {
        return Ok(false);
    };
    table.replace_all(snapshot)?;
    info!(path = %path.display(), domains = table.domains_count(), "restored snapshot");
    Ok(true)
}
