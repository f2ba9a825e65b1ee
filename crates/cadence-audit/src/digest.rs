//! Export checksums.
//!
//! The checksum is SHA-256 over the compact JSON of the entry list, in
//! export order. Any change to any entry, or to their order, changes it.

use sha2::{Digest, Sha256};

use cadence_contracts::{audit::AuditEntry, error::CadenceResult};

use crate::report::AuditExport;

/// Lowercase hex SHA-256 of `entries`.
pub fn checksum(entries: &[AuditEntry]) -> CadenceResult<String> {
    let json = serde_json::to_vec(entries)?;
    Ok(hex::encode(Sha256::digest(&json)))
}

/// True when `export.checksum` and `export.entry_count` match its entries.
pub fn verify_export(export: &AuditExport) -> bool {
    export.entry_count == export.entries.len()
        && checksum(&export.entries).is_ok_and(|sum| sum == export.checksum)
}
