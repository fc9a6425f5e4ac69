//! Whitelist entries gating dispatch.

use serde::Serialize;
use snojobs_core::types::{DbId, Timestamp};
use sqlx::FromRow;

/// A row from the `whitelist_entries` table: `subject` may dispatch jobs
/// of `category`.
#[derive(Debug, Clone, PartialEq, FromRow, Serialize)]
pub struct WhitelistEntry {
    pub id: DbId,
    /// User name or project code.
    pub subject: String,
    pub category: String,
    pub created_at: Timestamp,
}
