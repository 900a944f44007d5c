use eframe::egui::{self, Align2, Color32, FontId, Pos2, Sense, Shape, Stroke, Ui, vec2};

use crate::scan::{AttackGraph, RiskLevel};
use crate::util::first_line;

use super::super::render_utils::{
    SEARCH_MATCH_COLOR, SELECTED_COLOR, arrow_geometry, blend_color, circle_visible, dim_color,
    draw_background, edge_color, risk_color, world_to_screen,
};
use super::{ALWAYS_LABEL_MAX_NODES, GraphView};

impl GraphView {
    /// Paints the graph into the remaining space and handles its input.
    /// Never mutates `graph`.
    pub(in crate::app) fn draw(&mut self, ui: &mut Ui, graph: &AttackGraph) {
        let (rect, response) = ui.allocate_exact_size(ui.available_size(), Sense::click_and_drag());
        let painter = ui.painter_at(rect);

        self.layout.resize(rect.size());
        draw_background(&painter, rect, self.pan, self.zoom);

        if graph.is_empty() {
            painter.text(
                rect.center(),
                Align2::CENTER_CENTER,
                "No attack graph yet",
                FontId::proportional(15.0),
                Color32::from_gray(150),
            );
            return;
        }

        self.handle_zoom(ui, rect, &response);
        self.handle_pan(&response);
        self.handle_node_drag(ui, rect, &response);

        if self.layout.tick() || self.dragging.is_some() {
            ui.ctx().request_repaint();
        }

        let hovered = self.dragging.or_else(|| self.pick(ui, rect));
        self.hovered = hovered;
        if hovered.is_some() {
            ui.output_mut(|output| output.cursor_icon = egui::CursorIcon::PointingHand);
        }

        let ids: Vec<&str> = graph.nodes.iter().map(|node| node.id.as_str()).collect();
        self.handle_selection(hovered, &response, &ids);

        let search_matches = self.cached_search_matches(graph);
        let search_active = search_matches
            .as_ref()
            .is_some_and(|matches| !matches.is_empty());
        let selected_index = self.selected.as_deref().and_then(|id| graph.node_index(id));

        let positions = self.layout.positions();
        let screen: Vec<Pos2> = positions
            .iter()
            .map(|position| world_to_screen(rect, self.pan, self.zoom, *position))
            .collect();
        let radii: Vec<f32> = graph
            .nodes
            .iter()
            .enumerate()
            .map(|(index, node)| {
                let scale = if hovered == Some(index) { 1.5 } else { 1.0 };
                node.size * scale * self.zoom
            })
            .collect();

        let zoom_sqrt = self.zoom.sqrt();
        for edge in &graph.edges {
            let (Some(from), Some(to)) = (graph.node_index(&edge.from), graph.node_index(&edge.to))
            else {
                continue;
            };
            if from >= screen.len() || to >= screen.len() {
                continue;
            }

            let incident = selected_index.is_some_and(|selected| selected == from || selected == to);
            let base = edge_color(&edge.kind);
            let (width, color) = if incident {
                ((3.0 * zoom_sqrt).clamp(1.5, 5.0), blend_color(base, SELECTED_COLOR, 0.55))
            } else if edge.critical {
                ((2.6 * zoom_sqrt).clamp(1.3, 4.5), base)
            } else if selected_index.is_some() {
                ((1.2 * zoom_sqrt).clamp(0.6, 2.2), dim_color(base, 0.45))
            } else {
                ((1.4 * zoom_sqrt).clamp(0.7, 2.6), blend_color(base, Color32::from_gray(40), 0.25))
            };

            let Some((start, tip, left, right)) =
                arrow_geometry(screen[from], screen[to], radii[to], (9.0 * zoom_sqrt).clamp(5.0, 14.0))
            else {
                continue;
            };
            painter.line_segment([start, tip], Stroke::new(width, color));
            painter.add(Shape::convex_polygon(vec![tip, left, right], color, Stroke::NONE));
        }

        let label_all = graph.nodes.len() <= ALWAYS_LABEL_MAX_NODES;
        for (index, node) in graph.nodes.iter().enumerate() {
            let (Some(&position), Some(&radius)) = (screen.get(index), radii.get(index)) else {
                continue;
            };
            if !circle_visible(rect, position, radius + 12.0) {
                continue;
            }

            let is_hovered = hovered == Some(index);
            let is_selected = selected_index == Some(index);
            let is_match = search_matches
                .as_ref()
                .is_some_and(|matches| matches.contains(&index));

            let base = risk_color(node.risk);
            let color = if is_selected {
                blend_color(base, SELECTED_COLOR, 0.45)
            } else if is_match {
                blend_color(base, SEARCH_MATCH_COLOR, 0.55)
            } else if search_active {
                dim_color(base, 0.45)
            } else {
                base
            };

            if node.risk == RiskLevel::Critical {
                for (spread, alpha) in [(10.0, 28u8), (6.0, 46), (3.0, 70)] {
                    painter.circle_filled(
                        position,
                        radius + spread * zoom_sqrt,
                        Color32::from_rgba_unmultiplied(base.r(), base.g(), base.b(), alpha),
                    );
                }
            }

            painter.circle_filled(position, radius, color);
            let stroke = if is_selected {
                Stroke::new(2.4, SELECTED_COLOR)
            } else if is_match {
                Stroke::new(1.8, SEARCH_MATCH_COLOR)
            } else {
                Stroke::new(1.0, Color32::from_rgba_unmultiplied(15, 15, 15, 190))
            };
            painter.circle_stroke(position, radius, stroke);

            if label_all || is_hovered || is_selected {
                painter.text(
                    position + vec2(0.0, radius + 4.0),
                    Align2::CENTER_TOP,
                    first_line(&node.label),
                    FontId::proportional(12.0),
                    Color32::from_gray(238),
                );
            }
        }

        if let Some(node) = hovered.and_then(|index| graph.nodes.get(index)) {
            let mut text = format!("{}  |  {} risk", first_line(&node.label), node.risk);
            if let Some(port) = node.port {
                text.push_str(&format!("  |  port {port}"));
            }
            if !node.vulnerabilities.is_empty() {
                text.push_str(&format!("  |  {} findings", node.vulnerabilities.len()));
            }
            painter.text(
                rect.left_top() + vec2(10.0, 10.0),
                Align2::LEFT_TOP,
                text,
                FontId::proportional(13.0),
                Color32::from_gray(240),
            );
        }
    }
}
