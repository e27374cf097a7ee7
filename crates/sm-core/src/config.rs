//! Engine tuning knobs.
//!
//! Every timing and threshold constant the interaction engine uses, in one
//! place, serializable so hosts can persist overrides.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct EngineConfig {
    /// Quiet period before a dirty document is written out. Restarted on
    /// every new edit, so a flurry of moves produces one write.
    pub persist_debounce_ms: u64,

    /// Delay before hover side effects fire (entity detail popups).
    /// Cancelled when the pointer leaves first.
    pub hover_delay_ms: u64,

    /// Minimum distance between consecutive recorded freeform path points.
    pub path_point_threshold: f32,

    /// Maximum undo depth; older commands are forgotten beyond this.
    pub history_limit: usize,

    /// Presses that travel less than this are clicks, not drags.
    pub drag_slop: f32,

    /// Radius of the connector drag handle on a selected node.
    pub handle_radius: f32,

    /// Pick tolerance around a connector's line segment.
    pub connector_tolerance: f32,

    /// Area drags smaller than this on both axes are treated as aborted.
    pub min_area_size: f32,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            persist_debounce_ms: 1000,
            hover_delay_ms: 250,
            path_point_threshold: 6.0,
            history_limit: 100,
            drag_slop: 3.0,
            handle_radius: 6.0,
            connector_tolerance: 5.0,
            min_area_size: 2.0,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn partial_config_fills_defaults() {
        let cfg: EngineConfig = serde_json::from_str(r#"{"historyLimit": 25}"#).unwrap();
        assert_eq!(cfg.history_limit, 25);
        assert_eq!(cfg.persist_debounce_ms, EngineConfig::default().persist_debounce_ms);
    }
}
