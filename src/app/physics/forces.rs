use eframe::egui::{Vec2, vec2};

/// Unit vector from `b` towards `a`, falling back to a deterministic
/// direction when the points coincide.
fn separation_direction(delta: Vec2, distance: f32, from: usize, to: usize) -> Vec2 {
    if distance > 0.0001 {
        delta / distance
    } else {
        let angle = ((from as f32) * 0.618_034 + (to as f32) * 0.414_214) * std::f32::consts::TAU;
        vec2(angle.cos(), angle.sin())
    }
}

/// Pairwise `strength / (d² + floor)` push between every two nodes.
pub(super) fn accumulate_repulsion(
    positions: &[Vec2],
    strength: f32,
    floor: f32,
    forces: &mut [Vec2],
) {
    for from in 0..positions.len() {
        for to in (from + 1)..positions.len() {
            let delta = positions[from] - positions[to];
            let distance_sq = delta.length_sq();
            let direction = separation_direction(delta, distance_sq.sqrt(), from, to);
            let push = direction * (strength / (distance_sq + floor));
            forces[from] += push;
            forces[to] -= push;
        }
    }
}

/// Hookean springs pulling connected nodes towards `rest_length`.
pub(super) fn accumulate_springs(
    positions: &[Vec2],
    springs: &[(usize, usize)],
    stiffness: f32,
    rest_length: f32,
    forces: &mut [Vec2],
) {
    for &(from, to) in springs {
        if from == to || from >= positions.len() || to >= positions.len() {
            continue;
        }

        let delta = positions[to] - positions[from];
        let distance = delta.length();
        if distance <= 0.0001 {
            continue;
        }

        let pull = (delta / distance) * ((distance - rest_length) * stiffness);
        forces[from] += pull;
        forces[to] -= pull;
    }
}

pub(super) fn accumulate_centering(
    positions: &[Vec2],
    center: Vec2,
    strength: f32,
    forces: &mut [Vec2],
) {
    for (position, force) in positions.iter().zip(forces.iter_mut()) {
        *force += (center - *position) * strength;
    }
}
