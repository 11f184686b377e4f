//! Public import result.

use crate::store::MapId;
use std::time::Duration;

/// Outcome of an import run.
///
/// Always returned, never thrown: failures carry a human-readable
/// message plus whatever partial counts the run achieved before
/// aborting.
#[derive(Debug, Clone, Default)]
pub struct ImportResult {
    pub success: bool,
    /// Failure description; `None` on success.
    pub message: Option<String>,
    pub maps_created: usize,
    pub grids_imported: usize,
    /// Grids skipped because the tenant already had them (merge mode).
    pub grids_skipped: usize,
    /// Tiles written across all zoom levels, base tiles included.
    pub tiles_written: usize,
    pub markers_imported: usize,
    /// Segments dropped by the top-N retention policy.
    pub segments_dropped: usize,
    /// Every map the run touched, reused maps included.
    pub affected_map_ids: Vec<MapId>,
    pub created_map_ids: Vec<MapId>,
    pub created_grid_ids: Vec<String>,
    /// First network-class texture failure, if any occurred.
    pub fetch_diagnostic: Option<String>,
    pub duration: Duration,
}

impl ImportResult {
    /// A failure result that never started (e.g. busy tenant).
    pub(crate) fn rejected(message: impl Into<String>) -> Self {
        Self {
            success: false,
            message: Some(message.into()),
            ..Self::default()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rejected_result() {
        let result = ImportResult::rejected("an import is already running");
        assert!(!result.success);
        assert_eq!(result.maps_created, 0);
        assert!(result.message.unwrap().contains("already running"));
    }
}
