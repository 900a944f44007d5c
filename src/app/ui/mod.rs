mod controls;
mod panels;

use eframe::egui::Color32;

use crate::live::ConnectionState;
use crate::scan::ScanStatus;

fn connection_color(state: ConnectionState) -> Color32 {
    match state {
        ConnectionState::Connected => Color32::from_rgb(34, 197, 94),
        ConnectionState::Connecting | ConnectionState::Disconnected => {
            Color32::from_rgb(234, 179, 8)
        }
        ConnectionState::Polling => Color32::from_rgb(234, 88, 12),
        ConnectionState::Idle => Color32::from_gray(150),
    }
}

fn status_color(status: ScanStatus) -> Color32 {
    match status {
        ScanStatus::Idle => Color32::from_gray(150),
        ScanStatus::Running => Color32::from_rgb(103, 196, 255),
        ScanStatus::Complete => Color32::from_rgb(34, 197, 94),
        ScanStatus::Failed => Color32::from_rgb(220, 38, 38),
    }
}
