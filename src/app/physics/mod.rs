//! Force-directed layout over a frame-local position buffer.
//!
//! Positions live here, indexed in snapshot order, and never in the graph
//! data itself. Model space is the canvas rectangle `[0, w] x [0, h]`.

mod forces;

use std::collections::HashMap;

use eframe::egui::{Vec2, vec2};

use crate::scan::AttackGraph;
use crate::util::stable_pair;

use forces::{accumulate_centering, accumulate_repulsion, accumulate_springs};

pub const DEFAULT_CANVAS: Vec2 = vec2(1200.0, 600.0);

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct LayoutParams {
    pub repulsion: f32,
    pub repulsion_floor: f32,
    pub spring_stiffness: f32,
    pub rest_length: f32,
    pub center_strength: f32,
    pub damping: f32,
    pub padding: f32,
    pub settle_speed: f32,
    pub settle_force: f32,
    pub max_ticks_per_run: u32,
    pub initial_radius_ratio: f32,
    pub jitter: f32,
}

impl Default for LayoutParams {
    fn default() -> Self {
        Self {
            repulsion: 200.0,
            repulsion_floor: 100.0,
            spring_stiffness: 0.1,
            rest_length: 100.0,
            center_strength: 0.004,
            damping: 0.85,
            padding: 50.0,
            settle_speed: 0.05,
            settle_force: 0.05,
            max_ticks_per_run: 2000,
            initial_radius_ratio: 0.3,
            jitter: 12.0,
        }
    }
}

pub struct LayoutEngine {
    params: LayoutParams,
    canvas: Vec2,
    index_by_id: HashMap<String, usize>,
    positions: Vec<Vec2>,
    velocities: Vec<Vec2>,
    forces: Vec<Vec2>,
    springs: Vec<(usize, usize)>,
    pinned: Option<usize>,
    running: bool,
    ticks_in_run: u32,
}

impl Default for LayoutEngine {
    fn default() -> Self {
        Self::new(DEFAULT_CANVAS, LayoutParams::default())
    }
}

impl LayoutEngine {
    pub fn new(canvas: Vec2, params: LayoutParams) -> Self {
        Self {
            params,
            canvas,
            index_by_id: HashMap::new(),
            positions: Vec::new(),
            velocities: Vec::new(),
            forces: Vec::new(),
            springs: Vec::new(),
            pinned: None,
            running: false,
            ticks_in_run: 0,
        }
    }

    pub fn params(&self) -> &LayoutParams {
        &self.params
    }

    pub fn canvas(&self) -> Vec2 {
        self.canvas
    }

    pub fn len(&self) -> usize {
        self.positions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.positions.is_empty()
    }

    pub fn positions(&self) -> &[Vec2] {
        &self.positions
    }

    pub fn position(&self, index: usize) -> Option<Vec2> {
        self.positions.get(index).copied()
    }

    pub fn index_of(&self, id: &str) -> Option<usize> {
        self.index_by_id.get(id).copied()
    }

    pub fn is_running(&self) -> bool {
        self.running
    }

    pub fn ticks_in_run(&self) -> u32 {
        self.ticks_in_run
    }

    pub fn pinned(&self) -> Option<usize> {
        self.pinned
    }

    fn center(&self) -> Vec2 {
        self.canvas * 0.5
    }

    fn clamp_to_canvas(&self, position: Vec2) -> Vec2 {
        let padding = self
            .params
            .padding
            .min(self.canvas.x * 0.5)
            .min(self.canvas.y * 0.5);
        vec2(
            position.x.clamp(padding, self.canvas.x - padding),
            position.y.clamp(padding, self.canvas.y - padding),
        )
    }

    fn initial_position(&self, id: &str, index: usize, count: usize) -> Vec2 {
        let radius = self.params.initial_radius_ratio * self.canvas.x.min(self.canvas.y);
        let angle = std::f32::consts::TAU * (index as f32) / (count.max(1) as f32);
        let (jx, jy) = stable_pair(id);
        let jitter = vec2(jx, jy) * self.params.jitter;
        self.clamp_to_canvas(self.center() + vec2(angle.cos(), angle.sin()) * radius + jitter)
    }

    /// Rebuilds the buffers for a new snapshot. Nodes already on screen keep
    /// their position and velocity; new ones are placed on the start circle.
    pub fn load(&mut self, graph: &AttackGraph) {
        let count = graph.nodes.len();
        let pinned_id = self
            .pinned
            .and_then(|pinned| self.id_at(pinned).map(str::to_owned));

        let mut index_by_id = HashMap::with_capacity(count);
        let mut positions = Vec::with_capacity(count);
        let mut velocities = Vec::with_capacity(count);
        let mut reused = 0usize;

        for (index, node) in graph.nodes.iter().enumerate() {
            match self.index_by_id.get(&node.id) {
                Some(&previous) => {
                    positions.push(self.positions[previous]);
                    velocities.push(self.velocities[previous]);
                    reused += 1;
                }
                None => {
                    positions.push(self.initial_position(&node.id, index, count));
                    velocities.push(Vec2::ZERO);
                }
            }
            index_by_id.insert(node.id.clone(), index);
        }

        self.springs = graph
            .edges
            .iter()
            .filter_map(|edge| {
                let from = graph.node_index(&edge.from)?;
                let to = graph.node_index(&edge.to)?;
                (from != to).then_some((from, to))
            })
            .collect();
        self.pinned = pinned_id.and_then(|id| index_by_id.get(&id).copied());
        self.index_by_id = index_by_id;
        self.positions = positions;
        self.velocities = velocities;
        self.forces.clear();
        self.forces.resize(count, Vec2::ZERO);

        tracing::debug!(
            nodes = count,
            springs = self.springs.len(),
            reused,
            "layout loaded snapshot"
        );
        self.restart();
    }

    fn id_at(&self, index: usize) -> Option<&str> {
        self.index_by_id
            .iter()
            .find_map(|(id, &at)| (at == index).then_some(id.as_str()))
    }

    /// Adopts a new canvas size, pulling nodes back inside the new bounds.
    pub fn resize(&mut self, canvas: Vec2) {
        if canvas.x <= 0.0 || canvas.y <= 0.0 {
            return;
        }
        if (canvas - self.canvas).length_sq() < 0.25 {
            return;
        }

        self.canvas = canvas;
        for index in 0..self.positions.len() {
            self.positions[index] = self.clamp_to_canvas(self.positions[index]);
        }
        self.restart();
    }

    pub fn restart(&mut self) {
        self.ticks_in_run = 0;
        self.running = !self.positions.is_empty();
    }

    pub fn cancel(&mut self) {
        self.running = false;
    }

    /// Pins `index` under the pointer until [`LayoutEngine::release`].
    pub fn drag_to(&mut self, index: usize, position: Vec2) {
        if index >= self.positions.len() {
            return;
        }
        self.pinned = Some(index);
        self.positions[index] = self.clamp_to_canvas(position);
        self.velocities[index] = Vec2::ZERO;
        self.restart();
    }

    pub fn release(&mut self) {
        if self.pinned.take().is_some() {
            self.restart();
        }
    }

    /// Advances the simulation by one step. Returns whether it is still
    /// running afterwards.
    pub fn tick(&mut self) -> bool {
        if !self.running {
            return false;
        }

        let count = self.positions.len();
        if count == 0 {
            self.running = false;
            return false;
        }

        let params = self.params;
        self.forces.clear();
        self.forces.resize(count, Vec2::ZERO);
        accumulate_repulsion(
            &self.positions,
            params.repulsion,
            params.repulsion_floor,
            &mut self.forces,
        );
        accumulate_springs(
            &self.positions,
            &self.springs,
            params.spring_stiffness,
            params.rest_length,
            &mut self.forces,
        );
        accumulate_centering(
            &self.positions,
            self.center(),
            params.center_strength,
            &mut self.forces,
        );

        let settle_speed_sq = params.settle_speed * params.settle_speed;
        let settle_force_sq = params.settle_force * params.settle_force;
        let mut settled = true;

        for index in 0..count {
            if Some(index) == self.pinned {
                self.velocities[index] = Vec2::ZERO;
                continue;
            }

            let force = self.forces[index];
            let velocity = (self.velocities[index] + force) * params.damping;
            let previous = self.positions[index];
            let unclamped = previous + velocity;
            let next = self.clamp_to_canvas(unclamped);
            let against_wall = next != unclamped;

            // Motion into the wall is absorbed.
            self.velocities[index] = next - previous;
            self.positions[index] = next;

            let moving = self.velocities[index].length_sq() >= settle_speed_sq;
            let pushed = force.length_sq() >= settle_force_sq && !against_wall;
            if moving || pushed {
                settled = false;
            }
        }

        self.ticks_in_run += 1;
        if settled && self.pinned.is_none() {
            tracing::debug!(ticks = self.ticks_in_run, "layout settled");
            self.running = false;
        } else if self.ticks_in_run >= params.max_ticks_per_run {
            tracing::debug!(ticks = self.ticks_in_run, "layout stopped at tick limit");
            self.running = false;
        }

        self.running
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::scan::{EdgeKind, GraphEdge, GraphNode, RiskLevel};

    fn node(id: &str) -> GraphNode {
        GraphNode {
            id: id.to_owned(),
            label: id.to_owned(),
            risk: RiskLevel::Medium,
            size: RiskLevel::Medium.default_size(),
            port: None,
            service: String::new(),
            vulnerabilities: Vec::new(),
        }
    }

    fn edge(from: &str, to: &str) -> GraphEdge {
        GraphEdge {
            id: format!("{from}->{to}"),
            from: from.to_owned(),
            to: to.to_owned(),
            kind: EdgeKind::LateralMovement,
            critical: false,
            risk_score: 5.0,
            label: String::new(),
        }
    }

    fn graph(ids: &[&str], edges: &[(&str, &str)]) -> AttackGraph {
        AttackGraph::from_parts(
            ids.iter().map(|id| node(id)).collect(),
            edges.iter().map(|(from, to)| edge(from, to)).collect(),
        )
    }

    fn run(engine: &mut LayoutEngine, max_ticks: u32) -> u32 {
        let mut ticks = 0;
        while engine.tick() && ticks < max_ticks {
            ticks += 1;
        }
        ticks
    }

    #[test]
    fn initial_placement_is_on_circle_inside_canvas() {
        let mut engine = LayoutEngine::default();
        engine.load(&graph(&["a", "b", "c", "d"], &[]));

        let center = DEFAULT_CANVAS * 0.5;
        for position in engine.positions() {
            let radius = (*position - center).length();
            assert!((radius - 180.0).abs() <= 12.0 * std::f32::consts::SQRT_2 + 0.01);
        }
    }

    #[test]
    fn connected_pair_settles_near_rest_length() {
        let mut engine = LayoutEngine::default();
        engine.load(&graph(&["target", "port_22"], &[("target", "port_22")]));

        let ticks = run(&mut engine, 500);

        assert!(!engine.is_running(), "still running after {ticks} ticks");
        assert!(ticks < 500);
        let distance = (engine.positions()[0] - engine.positions()[1]).length();
        assert!((distance - 100.0).abs() <= 3.0, "distance {distance}");
    }

    #[test]
    fn nodes_stay_inside_padding() {
        let mut engine = LayoutEngine::new(vec2(300.0, 200.0), LayoutParams::default());
        let ids: Vec<String> = (0..12).map(|index| format!("port_{index}")).collect();
        let ids: Vec<&str> = ids.iter().map(String::as_str).collect();
        engine.load(&graph(&ids, &[]));

        for _ in 0..300 {
            engine.tick();
            for position in engine.positions() {
                assert!(position.x >= 50.0 && position.x <= 250.0);
                assert!(position.y >= 50.0 && position.y <= 150.0);
            }
        }
    }

    #[test]
    fn existing_nodes_keep_positions_across_snapshots() {
        let mut engine = LayoutEngine::default();
        engine.load(&graph(&["target", "port_22"], &[("target", "port_22")]));
        run(&mut engine, 100);
        let before = engine.positions()[engine.index_of("port_22").unwrap()];

        engine.load(&graph(
            &["target", "port_80", "port_22"],
            &[("target", "port_22"), ("target", "port_80")],
        ));

        let after = engine.positions()[engine.index_of("port_22").unwrap()];
        assert_eq!(before, after);
        assert_eq!(engine.index_of("port_22"), Some(2));
        assert!(engine.is_running());
    }

    #[test]
    fn run_is_bounded() {
        let params = LayoutParams {
            max_ticks_per_run: 10,
            ..LayoutParams::default()
        };
        let mut engine = LayoutEngine::new(DEFAULT_CANVAS, params);
        engine.load(&graph(&["a", "b", "c"], &[("a", "b"), ("b", "c")]));

        let ticks = run(&mut engine, 100);

        assert_eq!(ticks, 9);
        assert_eq!(engine.ticks_in_run(), 10);
        assert!(!engine.is_running());
    }

    #[test]
    fn cancel_stops_and_restart_resumes() {
        let mut engine = LayoutEngine::default();
        engine.load(&graph(&["a", "b"], &[("a", "b")]));

        engine.cancel();
        assert!(!engine.tick());
        let frozen = engine.positions().to_vec();
        assert!(!engine.tick());
        assert_eq!(engine.positions(), frozen.as_slice());

        engine.restart();
        assert!(engine.tick());
    }

    #[test]
    fn dragged_node_is_pinned() {
        let mut engine = LayoutEngine::default();
        engine.load(&graph(&["a", "b"], &[("a", "b")]));

        engine.drag_to(0, vec2(100.0, 100.0));
        for _ in 0..50 {
            engine.tick();
        }
        assert_eq!(engine.positions()[0], vec2(100.0, 100.0));
        assert!(engine.is_running());

        engine.release();
        assert_eq!(engine.pinned(), None);
        assert!(engine.is_running());
    }

    #[test]
    fn resize_restarts_and_clamps() {
        let mut engine = LayoutEngine::default();
        engine.load(&graph(&["a", "b"], &[("a", "b")]));
        run(&mut engine, 1000);
        assert!(!engine.is_running());

        engine.resize(vec2(400.0, 300.0));

        assert!(engine.is_running());
        for position in engine.positions() {
            assert!(position.x <= 350.0 && position.y <= 250.0);
        }
    }

    #[test]
    fn empty_graph_never_runs() {
        let mut engine = LayoutEngine::default();
        engine.load(&AttackGraph::default());
        assert!(!engine.is_running());
        assert!(!engine.tick());
    }
}
