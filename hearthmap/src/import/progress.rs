//! Progress reporting for import runs.
//!
//! Progress is purely observational - a UI hook, never required for
//! correctness. The callback fires at each phase boundary and at major
//! iterations within a phase.

use std::sync::Arc;

/// Progress callback for import runs.
///
/// Must be `Send + Sync`: phases report from spawned tasks.
pub type ProgressCallback = Arc<dyn Fn(ImportProgress) + Send + Sync>;

/// Phase of an import run, in execution order.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ImportPhase {
    /// Parsing the binary export stream.
    Parse,
    /// Choosing the largest segments to import.
    SelectSegments,
    /// Resolving tileset textures ahead of rasterization.
    PrefetchTextures,
    /// Rasterizing and persisting base tiles.
    ImportSegments,
    /// Building the zoom pyramid from dirty markers.
    GenerateZoomLevels,
    /// Resolving and storing markers.
    ImportMarkers,
    /// Run finished.
    Complete,
}

impl ImportPhase {
    /// Human-readable phase description.
    pub fn description(&self) -> &'static str {
        match self {
            Self::Parse => "Parsing export",
            Self::SelectSegments => "Selecting segments",
            Self::PrefetchTextures => "Prefetching textures",
            Self::ImportSegments => "Importing grids",
            Self::GenerateZoomLevels => "Generating zoom levels",
            Self::ImportMarkers => "Importing markers",
            Self::Complete => "Complete",
        }
    }
}

/// One progress observation.
#[derive(Debug, Clone)]
pub struct ImportProgress {
    pub phase: ImportPhase,
    pub current_item: usize,
    pub total_items: usize,
    pub current_item_name: Option<String>,
}

impl ImportProgress {
    /// Progress at a phase boundary, before any items.
    pub fn at_phase(phase: ImportPhase) -> Self {
        Self {
            phase,
            current_item: 0,
            total_items: 0,
            current_item_name: None,
        }
    }

    /// Progress within a phase's item loop.
    pub fn at_item(
        phase: ImportPhase,
        current_item: usize,
        total_items: usize,
        name: impl Into<String>,
    ) -> Self {
        Self {
            phase,
            current_item,
            total_items,
            current_item_name: Some(name.into()),
        }
    }
}

/// Invokes the callback if one is attached.
pub(crate) fn report(callback: &Option<ProgressCallback>, progress: ImportProgress) {
    if let Some(callback) = callback {
        callback(progress);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    #[test]
    fn test_phase_descriptions() {
        assert_eq!(ImportPhase::Parse.description(), "Parsing export");
        assert_eq!(ImportPhase::Complete.description(), "Complete");
    }

    #[test]
    fn test_report_invokes_callback() {
        let seen: Arc<Mutex<Vec<ImportPhase>>> = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&seen);
        let callback: ProgressCallback =
            Arc::new(move |p: ImportProgress| sink.lock().unwrap().push(p.phase));

        report(&Some(callback), ImportProgress::at_phase(ImportPhase::Parse));
        report(&None, ImportProgress::at_phase(ImportPhase::Complete));

        assert_eq!(*seen.lock().unwrap(), vec![ImportPhase::Parse]);
    }

    #[test]
    fn test_at_item_carries_name() {
        let progress = ImportProgress::at_item(ImportPhase::ImportSegments, 2, 10, "grid-abc");
        assert_eq!(progress.current_item, 2);
        assert_eq!(progress.total_items, 10);
        assert_eq!(progress.current_item_name.as_deref(), Some("grid-abc"));
    }
}
