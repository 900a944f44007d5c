use eframe::egui::{Color32, Painter, Pos2, Rect, Stroke, Vec2};

use crate::scan::{EdgeKind, RiskLevel};

pub(super) const LATERAL_EDGE_COLOR: Color32 = Color32::from_rgb(0xFF, 0x6B, 0x6B);
pub(super) const OTHER_EDGE_COLOR: Color32 = Color32::from_rgb(0xFF, 0xA5, 0x00);
pub(super) const SELECTED_COLOR: Color32 = Color32::from_rgb(245, 206, 93);
pub(super) const SEARCH_MATCH_COLOR: Color32 = Color32::from_rgb(103, 196, 255);

pub(super) fn risk_color(risk: RiskLevel) -> Color32 {
    match risk {
        RiskLevel::Critical => Color32::from_rgb(0xdc, 0x26, 0x26),
        RiskLevel::High => Color32::from_rgb(0xea, 0x58, 0x0c),
        RiskLevel::Medium => Color32::from_rgb(0xea, 0xb3, 0x08),
        RiskLevel::Low => Color32::from_rgb(0x22, 0xc5, 0x5e),
    }
}

pub(super) fn edge_color(kind: &EdgeKind) -> Color32 {
    match kind {
        EdgeKind::LateralMovement => LATERAL_EDGE_COLOR,
        _ => OTHER_EDGE_COLOR,
    }
}

pub(super) fn blend_color(base: Color32, overlay: Color32, amount: f32) -> Color32 {
    let amount = amount.clamp(0.0, 1.0);
    let inverse = 1.0 - amount;

    Color32::from_rgba_unmultiplied(
        ((base.r() as f32 * inverse) + (overlay.r() as f32 * amount)) as u8,
        ((base.g() as f32 * inverse) + (overlay.g() as f32 * amount)) as u8,
        ((base.b() as f32 * inverse) + (overlay.b() as f32 * amount)) as u8,
        ((base.a() as f32 * inverse) + (overlay.a() as f32 * amount)) as u8,
    )
}

pub(super) fn dim_color(color: Color32, factor: f32) -> Color32 {
    let factor = factor.clamp(0.0, 1.0);
    Color32::from_rgba_unmultiplied(
        (color.r() as f32 * factor) as u8,
        (color.g() as f32 * factor) as u8,
        (color.b() as f32 * factor) as u8,
        (color.a() as f32 * (0.45 + (factor * 0.55))) as u8,
    )
}

pub(super) fn draw_background(painter: &Painter, rect: Rect, pan: Vec2, zoom: f32) {
    painter.rect_filled(rect, 0.0, Color32::from_rgb(19, 23, 29));

    let step = (50.0 * zoom.clamp(0.6, 1.8)).max(20.0);
    let origin = rect.min + pan;
    let stroke = Stroke::new(1.0, Color32::from_rgba_unmultiplied(60, 70, 80, 60));

    let mut x = rect.left() + (origin.x - rect.left()).rem_euclid(step);
    while x < rect.right() {
        painter.line_segment([Pos2::new(x, rect.top()), Pos2::new(x, rect.bottom())], stroke);
        x += step;
    }

    let mut y = rect.top() + (origin.y - rect.top()).rem_euclid(step);
    while y < rect.bottom() {
        painter.line_segment([Pos2::new(rect.left(), y), Pos2::new(rect.right(), y)], stroke);
        y += step;
    }
}

pub(super) fn circle_visible(rect: Rect, position: Pos2, radius: f32) -> bool {
    !(position.x + radius < rect.left()
        || position.x - radius > rect.right()
        || position.y + radius < rect.top()
        || position.y - radius > rect.bottom())
}

/// `screen = rect.min + pan + model * zoom`.
pub(super) fn world_to_screen(rect: Rect, pan: Vec2, zoom: f32, world: Vec2) -> Pos2 {
    rect.min + pan + world * zoom
}

pub(super) fn screen_to_world(rect: Rect, pan: Vec2, zoom: f32, screen: Pos2) -> Vec2 {
    (screen - rect.min - pan) / zoom
}

/// Index of the first node whose centre lies within `size + slack` of
/// `pointer`, all in model space.
pub(super) fn hit_test(
    positions: &[Vec2],
    sizes: &[f32],
    pointer: Vec2,
    slack: f32,
) -> Option<usize> {
    positions
        .iter()
        .zip(sizes)
        .position(|(position, size)| (*position - pointer).length() < size + slack)
}

/// Start, tip and the two barb points of an arrow that stops at the rim of
/// the target circle. `None` when the endpoints overlap.
pub(super) fn arrow_geometry(
    start: Pos2,
    end: Pos2,
    target_radius: f32,
    head_length: f32,
) -> Option<(Pos2, Pos2, Pos2, Pos2)> {
    let delta = end - start;
    let length = delta.length();
    if length <= target_radius + 0.5 {
        return None;
    }

    let direction = delta / length;
    let normal = direction.rot90();
    let tip = end - direction * target_radius;
    let back = tip - direction * head_length;
    let half_width = head_length * 0.5;
    Some((start, tip, back + normal * half_width, back - normal * half_width))
}

#[cfg(test)]
mod tests {
    use eframe::egui::{pos2, vec2};

    use super::*;

    #[test]
    fn transform_applies_offset_pan_and_zoom() {
        let rect = Rect::from_min_size(pos2(300.0, 40.0), vec2(1200.0, 600.0));
        let pan = vec2(-20.0, 15.0);

        let screen = world_to_screen(rect, pan, 2.0, vec2(100.0, 50.0));
        assert_eq!(screen, pos2(480.0, 155.0));
        assert_eq!(screen_to_world(rect, pan, 2.0, screen), vec2(100.0, 50.0));
    }

    #[test]
    fn hit_test_returns_first_match_with_slack() {
        let positions = [vec2(100.0, 100.0), vec2(105.0, 100.0), vec2(400.0, 400.0)];
        let sizes = [10.0, 15.0, 8.0];

        assert_eq!(hit_test(&positions, &sizes, vec2(118.0, 100.0), 10.0), Some(0));
        assert_eq!(hit_test(&positions, &sizes, vec2(125.0, 100.0), 10.0), Some(1));
        assert_eq!(hit_test(&positions, &sizes, vec2(250.0, 250.0), 10.0), None);
    }

    #[test]
    fn arrow_stops_at_target_rim() {
        let (start, tip, left, right) =
            arrow_geometry(pos2(0.0, 0.0), pos2(100.0, 0.0), 10.0, 8.0).unwrap();
        assert_eq!(start, pos2(0.0, 0.0));
        assert_eq!(tip, pos2(90.0, 0.0));
        assert_eq!(left.x, 82.0);
        assert_eq!(right.x, 82.0);
        assert_eq!((left.y - right.y).abs(), 8.0);

        assert!(arrow_geometry(pos2(0.0, 0.0), pos2(5.0, 0.0), 10.0, 8.0).is_none());
    }

    #[test]
    fn risk_palette() {
        assert_eq!(risk_color(RiskLevel::Critical), Color32::from_rgb(220, 38, 38));
        assert_eq!(risk_color(RiskLevel::Low), Color32::from_rgb(34, 197, 94));
        assert_eq!(edge_color(&EdgeKind::LateralMovement), LATERAL_EDGE_COLOR);
        assert_eq!(edge_color(&EdgeKind::HorizontalMovement), OTHER_EDGE_COLOR);
    }
}
