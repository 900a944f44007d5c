use std::sync::Arc;
use std::time::{Duration, Instant};

use eframe::egui::Context;

use crate::live::{ClientConfig, HttpBackend, LiveClient};
use crate::scan::{InvalidScan, ScanApi, ScanSession, ScanStatus};

mod graph;
mod physics;
mod render_utils;
mod ui;

pub use physics::{DEFAULT_CANVAS, LayoutEngine, LayoutParams};

use graph::GraphView;

/// Launch-time settings gathered from the command line.
#[derive(Clone, Debug)]
pub struct AppSettings {
    pub backend_url: String,
    pub stream_idle_timeout: Duration,
    pub form: ScanForm,
    pub autostart: bool,
}

/// Editable scan parameters shown in the controls panel.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ScanForm {
    pub target: String,
    pub start_port: u32,
    pub end_port: u32,
    pub threads: u32,
}

impl Default for ScanForm {
    fn default() -> Self {
        Self {
            target: String::new(),
            start_port: 1,
            end_port: 1024,
            threads: 100,
        }
    }
}

impl ScanForm {
    pub fn to_session(&self) -> Result<ScanSession, InvalidScan> {
        ScanSession::new(&self.target, self.start_port, self.end_port, self.threads)
    }
}

pub struct ScanDashboardApp {
    client: LiveClient<HttpBackend>,
    backend_url: String,
    form: ScanForm,
    form_error: Option<String>,
    notice: Option<String>,
    graph: GraphView,
}

impl ScanDashboardApp {
    pub fn new(cc: &eframe::CreationContext<'_>, settings: AppSettings) -> Self {
        let api = ScanApi::new(settings.backend_url, settings.stream_idle_timeout);
        let backend_url = api.base_url().to_owned();
        let mut client = LiveClient::new(HttpBackend::new(api), ClientConfig::default());

        let ctx = cc.egui_ctx.clone();
        client.set_waker(Arc::new(move || ctx.request_repaint()));

        let mut app = Self {
            client,
            backend_url,
            form: settings.form,
            form_error: None,
            notice: None,
            graph: GraphView::default(),
        };

        if settings.autostart {
            app.launch_from_form();
        }
        app
    }

    fn launch_from_form(&mut self) {
        match self.form.to_session() {
            Ok(session) => {
                self.form_error = None;
                self.notice = None;
                self.graph.clear();
                self.client.launch(session);
            }
            Err(error) => {
                tracing::warn!(%error, "rejected scan parameters");
                self.form_error = Some(error.to_string());
            }
        }
    }

    fn load_saved_from_form(&mut self) {
        match self.form.to_session() {
            Ok(session) => {
                self.form_error = None;
                self.notice = None;
                self.graph.clear();
                self.client.load_saved(session);
            }
            Err(error) => self.form_error = Some(error.to_string()),
        }
    }

    /// Re-runs the last session's parameters after a failure.
    fn relaunch(&mut self) {
        let Some(mut session) = self.client.store().session().cloned() else {
            self.launch_from_form();
            return;
        };

        session.status = ScanStatus::Idle;
        self.notice = None;
        self.graph.clear();
        self.client.launch(session);
    }

    fn copy_results(&mut self, ctx: &Context) {
        match self.client.store().export_json() {
            Ok(json) => {
                ctx.copy_text(json);
                self.notice = Some("Results copied to clipboard".to_owned());
            }
            Err(error) => {
                tracing::error!(%error, "failed to serialize results");
                self.notice = Some(format!("Could not export results: {error}"));
            }
        }
    }
}

impl eframe::App for ScanDashboardApp {
    fn update(&mut self, ctx: &Context, _frame: &mut eframe::Frame) {
        self.client.pump(Instant::now());

        let store = self.client.store();
        self.graph.sync(store.graph(), store.graph_revision());

        self.show(ctx);

        if let Some(wait) = self.client.next_wakeup(Instant::now()) {
            ctx.request_repaint_after(wait);
        }
    }
}
