//! Renderable scene produced after each view update.
//!
//! Coordinates are in tree space: `x` runs along the breadth axis and `y`
//! along the depth axis. Hosts drawing a left-to-right diagram place a node
//! at `translate(origin.x + y, origin.y + x)`.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Point {
    pub x: f64,
    pub y: f64,
}

impl Point {
    pub fn new(x: f64, y: f64) -> Self {
        Self { x, y }
    }
}

/// Transition phase of a scene element relative to the previous render.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Phase {
    /// Newly visible; starts at the source node's previous position.
    Enter,
    /// Visible before and after; moves from its old position to its new one.
    Update,
    /// No longer visible; moves to the source node and is then dropped.
    Exit,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SceneNode {
    pub id: i64,
    pub label: String,
    pub resource_type: String,
    pub icon: String,
    pub depth: usize,
    pub expanded: bool,
    /// Has children that are currently hidden.
    pub collapsed: bool,
    pub phase: Phase,
    pub from: Point,
    pub to: Point,
}

/// Straight parent→child segment.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Segment {
    pub source: Point,
    pub target: Point,
}

impl Segment {
    /// Degenerate segment with both ends at `p`.
    pub fn point(p: Point) -> Self {
        Self {
            source: p,
            target: p,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SceneLink {
    /// Id of the child node; links are matched across renders by it.
    pub id: i64,
    pub parent: i64,
    pub phase: Phase,
    pub from: Segment,
    pub to: Segment,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Scene {
    pub revision: u64,
    /// Node whose activation produced this render.
    pub source: i64,
    pub duration_ms: u64,
    /// Top-left margin offset for the drawing area.
    pub origin: Point,
    pub nodes: Vec<SceneNode>,
    pub links: Vec<SceneLink>,
}

impl Scene {
    /// Ids of nodes still on screen once transitions settle.
    pub fn visible_ids(&self) -> Vec<i64> {
        self.nodes
            .iter()
            .filter(|n| n.phase != Phase::Exit)
            .map(|n| n.id)
            .collect()
    }

    #[cfg(test)]
    pub fn node(&self, id: i64) -> Option<&SceneNode> {
        self.nodes.iter().find(|n| n.id == id)
    }

    #[cfg(test)]
    pub fn link(&self, child_id: i64) -> Option<&SceneLink> {
        self.links.iter().find(|l| l.id == child_id)
    }
}
