use eframe::egui::{self, Color32, RichText, Ui};

use crate::live::ConnectionState;
use crate::scan::{MAX_THREAD_HINT, ScanStatus};

use super::super::ScanDashboardApp;
use super::{connection_color, status_color};

impl ScanDashboardApp {
    pub(in crate::app) fn draw_controls(&mut self, ui: &mut Ui) {
        ui.heading("Scan");
        ui.add_space(4.0);

        egui::Grid::new("scan_form")
            .num_columns(2)
            .spacing([8.0, 6.0])
            .show(ui, |ui| {
                ui.label("Target");
                ui.add(egui::TextEdit::singleline(&mut self.form.target).hint_text("10.0.0.5"));
                ui.end_row();

                ui.label("Start port");
                ui.add(egui::DragValue::new(&mut self.form.start_port).range(1..=65535));
                ui.end_row();

                ui.label("End port");
                ui.add(egui::DragValue::new(&mut self.form.end_port).range(1..=65535));
                ui.end_row();

                ui.label("Threads");
                ui.add(egui::DragValue::new(&mut self.form.threads).range(1..=MAX_THREAD_HINT));
                ui.end_row();
            });

        ui.add_space(6.0);
        ui.horizontal(|ui| {
            let running = self.client.store().status() == ScanStatus::Running;
            let label = if running { "Restart scan" } else { "Launch scan" };
            if ui.button(label).clicked() {
                self.launch_from_form();
            }
            if ui
                .button("Load last results")
                .on_hover_text("Fetch the backend's saved results for this target")
                .clicked()
            {
                self.load_saved_from_form();
            }
        });

        if let Some(error) = &self.form_error {
            ui.colored_label(Color32::from_rgb(248, 113, 113), error.as_str());
        }

        ui.separator();
        self.draw_connection_status(ui);

        ui.separator();
        ui.heading("Graph");
        ui.add_space(4.0);
        ui.horizontal(|ui| {
            ui.label("Search");
            ui.add(
                egui::TextEdit::singleline(self.graph.search_mut())
                    .hint_text("service, label or port"),
            );
        });
        ui.horizontal(|ui| {
            if ui.button("Reset view").clicked() {
                self.graph.reset_view();
            }
            let has_results = self.client.store().session().is_some();
            if ui
                .add_enabled(has_results, egui::Button::new("Copy results as JSON"))
                .clicked()
            {
                self.copy_results(ui.ctx());
            }
        });
        if let Some(notice) = &self.notice {
            ui.label(RichText::new(notice).weak());
        }
    }

    fn draw_connection_status(&mut self, ui: &mut Ui) {
        let state = self.client.connection_state();
        let store = self.client.store();
        let status = store.status();

        ui.horizontal(|ui| {
            ui.label("Stream:");
            ui.colored_label(connection_color(state), state.label());
            if state == ConnectionState::Disconnected || self.client.retry_count() > 0 {
                ui.label(
                    RichText::new(format!(
                        "retry {}/{}",
                        self.client.retry_count(),
                        self.client.config().max_retries
                    ))
                    .weak(),
                );
            }
        });
        ui.horizontal(|ui| {
            ui.label("Scan:");
            ui.colored_label(status_color(status), status.label());
            if let Some(target) = store.target() {
                ui.label(RichText::new(target).monospace());
            }
            if status == ScanStatus::Running {
                ui.spinner();
            }
        });

        if status == ScanStatus::Failed {
            let message = store.last_error().unwrap_or("Scan failed").to_owned();
            ui.add_space(4.0);
            ui.colored_label(Color32::from_rgb(248, 113, 113), message);
            if ui.button("Relaunch").clicked() {
                self.relaunch();
            }
        }
    }
}
