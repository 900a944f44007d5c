mod build;
mod interaction;
mod view;

use std::collections::HashSet;
use std::sync::Arc;

use eframe::egui::Vec2;

use super::physics::LayoutEngine;

/// Slack added to a node's size when hit-testing.
const HIT_SLACK: f32 = 10.0;
/// Labels are always drawn for graphs this small.
const ALWAYS_LABEL_MAX_NODES: usize = 8;

pub(in crate::app) struct GraphView {
    layout: LayoutEngine,
    synced_revision: Option<u64>,
    sizes: Vec<f32>,
    pan: Vec2,
    zoom: f32,
    hovered: Option<usize>,
    selected: Option<String>,
    dragging: Option<usize>,
    search: String,
    search_cache: Option<SearchMatchCache>,
}

struct SearchMatchCache {
    query: String,
    revision: u64,
    matches: Arc<HashSet<usize>>,
}

impl Default for GraphView {
    fn default() -> Self {
        Self {
            layout: LayoutEngine::default(),
            synced_revision: None,
            sizes: Vec::new(),
            pan: Vec2::ZERO,
            zoom: 1.0,
            hovered: None,
            selected: None,
            dragging: None,
            search: String::new(),
            search_cache: None,
        }
    }
}

impl GraphView {
    pub(in crate::app) fn selected(&self) -> Option<&str> {
        self.selected.as_deref()
    }

    pub(in crate::app) fn hovered(&self) -> Option<usize> {
        self.hovered
    }

    pub(in crate::app) fn search_mut(&mut self) -> &mut String {
        &mut self.search
    }

    pub(in crate::app) fn reset_view(&mut self) {
        self.pan = Vec2::ZERO;
        self.zoom = 1.0;
        self.layout.restart();
    }

    /// Stops the simulation and forgets the current snapshot.
    pub(in crate::app) fn clear(&mut self) {
        *self = Self {
            layout: LayoutEngine::new(self.layout.canvas(), *self.layout.params()),
            ..Self::default()
        };
    }
}
