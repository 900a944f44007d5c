use eframe::egui::{self, Rect, Ui};

use super::super::render_utils::{hit_test, screen_to_world};
use super::{GraphView, HIT_SLACK};

impl GraphView {
    pub(super) fn handle_zoom(&mut self, ui: &Ui, rect: Rect, response: &egui::Response) {
        if !response.hovered() {
            return;
        }

        let scroll = ui.input(|input| input.raw_scroll_delta.y);
        if scroll.abs() <= f32::EPSILON {
            return;
        }

        let pointer = ui
            .input(|input| input.pointer.hover_pos())
            .unwrap_or_else(|| rect.center());
        let world_before = screen_to_world(rect, self.pan, self.zoom, pointer);

        let zoom_factor = (1.0 + (scroll * 0.0018)).clamp(0.85, 1.15);
        self.zoom = (self.zoom * zoom_factor).clamp(0.2, 5.0);
        self.pan = pointer - rect.min - (world_before * self.zoom);
    }

    pub(super) fn handle_pan(&mut self, response: &egui::Response) {
        if response.dragged_by(egui::PointerButton::Secondary)
            || response.dragged_by(egui::PointerButton::Middle)
        {
            self.pan += response.drag_delta();
        }
    }

    /// Node under the pointer, if any, hit-tested in model space.
    pub(super) fn pick(&self, ui: &Ui, rect: Rect) -> Option<usize> {
        let pointer = ui.input(|input| input.pointer.hover_pos())?;
        if !rect.contains(pointer) {
            return None;
        }
        let model = screen_to_world(rect, self.pan, self.zoom, pointer);
        hit_test(self.layout.positions(), &self.sizes, model, HIT_SLACK)
    }

    /// Primary drag moves a node and pins it until the button is released.
    pub(super) fn handle_node_drag(&mut self, ui: &Ui, rect: Rect, response: &egui::Response) {
        if response.drag_started_by(egui::PointerButton::Primary) {
            self.dragging = self.pick(ui, rect);
        }

        if let Some(index) = self.dragging {
            if response.dragged_by(egui::PointerButton::Primary)
                && let Some(pointer) = response.interact_pointer_pos()
            {
                let model = screen_to_world(rect, self.pan, self.zoom, pointer);
                self.layout.drag_to(index, model);
            }

            if response.drag_stopped() {
                self.dragging = None;
                self.layout.release();
            }
        }
    }

    pub(super) fn handle_selection(&mut self, hovered: Option<usize>, response: &egui::Response, ids: &[&str]) {
        if !response.clicked_by(egui::PointerButton::Primary) {
            return;
        }

        let next = hovered.and_then(|index| ids.get(index)).map(|id| (*id).to_owned());
        if next != self.selected {
            tracing::debug!(selected = ?next, "graph selection changed");
            self.selected = next;
        }
    }
}
