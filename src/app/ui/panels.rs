use eframe::egui::{self, Align, Color32, Context, Layout, RichText, Ui};

use crate::scan::{CRITICAL_EDGE_RISK, RiskLevel, ScanStore};
use crate::util::{first_line, plural};

use super::super::ScanDashboardApp;
use super::super::render_utils::risk_color;
use super::connection_color;

const PORT_ROW_HEIGHT: f32 = 18.0;

impl ScanDashboardApp {
    pub(in crate::app) fn show(&mut self, ctx: &Context) {
        egui::TopBottomPanel::top("top_bar")
            .resizable(false)
            .show(ctx, |ui| {
                ui.horizontal(|ui| {
                    ui.heading("netscan-view");
                    ui.separator();
                    ui.label(format!("backend: {}", self.backend_url));
                    let state = self.client.connection_state();
                    ui.colored_label(connection_color(state), state.label());
                    ui.with_layout(Layout::right_to_left(Align::Center), |ui| {
                        let summary = self.client.store().summary();
                        ui.label(format!(
                            "open {}  closed {}  filtered {}  total {}",
                            summary.open, summary.closed, summary.filtered, summary.total
                        ));
                    });
                });
            });

        egui::SidePanel::left("controls")
            .resizable(true)
            .default_width(300.0)
            .show(ctx, |ui| {
                egui::ScrollArea::vertical().show(ui, |ui| self.draw_controls(ui));
            });

        egui::SidePanel::right("details")
            .resizable(true)
            .default_width(340.0)
            .show(ctx, |ui| {
                egui::ScrollArea::vertical().show(ui, |ui| self.draw_details(ui));
            });

        egui::CentralPanel::default().show(ctx, |ui| {
            self.graph.draw(ui, self.client.store().graph());
        });
    }

    fn draw_details(&self, ui: &mut Ui) {
        let store = self.client.store();

        self.draw_node_details(ui, store);
        draw_exposure(ui, store);
        draw_statistics(ui, store);
        draw_attack_chains(ui, store);
        draw_open_ports(ui, store);
    }

    fn draw_node_details(&self, ui: &mut Ui, store: &ScanStore) {
        let graph = store.graph();
        let node = self
            .graph
            .hovered()
            .and_then(|index| graph.nodes.get(index))
            .or_else(|| self.graph.selected().and_then(|id| graph.node(id)));
        let Some(node) = node else {
            return;
        };

        ui.heading(first_line(&node.label));
        ui.horizontal(|ui| {
            ui.label("Risk:");
            ui.colored_label(risk_color(node.risk), node.risk.label());
        });
        if let Some(port) = node.port {
            ui.label(format!("Port {port} · {}", node.service));
        }
        if node.vulnerabilities.is_empty() {
            ui.label(RichText::new("No known findings").weak());
        } else {
            for finding in &node.vulnerabilities {
                ui.label(format!("• {finding}"));
            }
        }
        ui.separator();
    }
}

fn draw_exposure(ui: &mut Ui, store: &ScanStore) {
    let Some(exposure) = store.exposure() else {
        return;
    };

    ui.heading("Exposure");
    ui.horizontal(|ui| {
        ui.label(RichText::new(format!("{:.0}/100", exposure.score)).strong());
        ui.colored_label(risk_color(exposure.severity), exposure.severity.label());
    });
    ui.add(
        egui::ProgressBar::new((exposure.score / 100.0).clamp(0.0, 1.0))
            .fill(risk_color(exposure.severity)),
    );
    ui.separator();
}

fn draw_statistics(ui: &mut Ui, store: &ScanStore) {
    let graph = store.graph();
    if graph.is_empty() {
        return;
    }
    let stats = graph.statistics;

    ui.heading("Attack graph");
    egui::Grid::new("graph_statistics")
        .num_columns(2)
        .spacing([12.0, 4.0])
        .show(ui, |ui| {
            for (label, value) in [
                ("Services", stats.total_nodes),
                ("Paths", stats.total_edges),
                ("Critical", stats.critical_services),
                ("High", stats.high_risk_services),
                ("Medium", stats.medium_services),
                ("Low", stats.low_services),
                ("Lateral paths", stats.lateral_movement_paths),
                ("Horizontal paths", stats.horizontal_movement_paths),
                ("Findings", stats.total_vulnerabilities),
            ] {
                ui.label(label);
                ui.label(value.to_string());
                ui.end_row();
            }
        });
    ui.separator();
}

fn draw_attack_chains(ui: &mut Ui, store: &ScanStore) {
    let chains = store.attack_chains();
    if chains.chains.is_empty() {
        return;
    }

    ui.heading(format!("Attack chains ({})", chains.total.max(chains.chains.len())));
    for chain in &chains.chains {
        let risk = if chain.risk_score >= CRITICAL_EDGE_RISK {
            RiskLevel::Critical
        } else if chain.risk_score >= 7.0 {
            RiskLevel::High
        } else {
            RiskLevel::Medium
        };
        ui.horizontal_wrapped(|ui| {
            ui.colored_label(risk_color(risk), format!("{:.1}", chain.risk_score));
            ui.label(format!("{} → {}", chain.from, chain.to));
        });
        if !chain.description.is_empty() {
            ui.label(RichText::new(&chain.description).weak());
        }
    }
    ui.separator();
}

fn draw_open_ports(ui: &mut Ui, store: &ScanStore) {
    let open: Vec<_> = store.open_ports().collect();
    ui.heading(format!("Open ports ({})", open.len()));
    if open.is_empty() {
        ui.label(RichText::new("Nothing open yet").weak());
        return;
    }

    egui::Grid::new("open_ports")
        .num_columns(3)
        .striped(true)
        .min_row_height(PORT_ROW_HEIGHT)
        .show(ui, |ui| {
            ui.label(RichText::new("Port").strong());
            ui.label(RichText::new("Service").strong());
            ui.label(RichText::new("Risk").strong());
            ui.end_row();

            for record in open {
                ui.label(RichText::new(record.port.to_string()).monospace());
                ui.label(record.service.as_str())
                    .on_hover_text(plural(record.vulnerabilities.len(), "finding", "findings"));
                match store.risk_for_port(record.port) {
                    Some(risk) => ui.colored_label(risk_color(risk), risk.label()),
                    None => ui.label(RichText::new("n/a").color(Color32::from_gray(130))),
                };
                ui.end_row();
            }
        });
}
