//! View controller: expand/collapse state and scene reconciliation.
//!
//! The controller owns the tree. Every state change is a `toggle` followed
//! by an `update`, which lays out the visible nodes and diffs them by id
//! against the previous render.

use std::collections::HashSet;
use tracing::debug;

use crate::config::LayoutConfig;
use crate::hierarchy::Tree;
use crate::layout;
use crate::scene::{Phase, Point, Scene, SceneLink, SceneNode, Segment};

/// Owned view-model for one inventory tree.
#[derive(Debug)]
pub struct ViewController {
    tree: Tree,
    config: LayoutConfig,
    /// Arena indices rendered last time, pre-order.
    rendered: Vec<usize>,
    revision: u64,
    scene: Scene,
}

impl ViewController {
    /// Take ownership of a freshly built tree, collapse everything below the
    /// root, and run the initial render.
    pub fn new(mut tree: Tree, config: LayoutConfig) -> Self {
        collapse_below_root(&mut tree);

        let root = tree.root_index();
        let node = tree.node_mut(root);
        node.x0 = config.inner_height() / 2.0;
        node.y0 = 0.0;

        let root_id = tree.root_id();
        let mut controller = Self {
            tree,
            config,
            rendered: Vec::new(),
            revision: 0,
            scene: Scene {
                revision: 0,
                source: root_id,
                duration_ms: 0,
                origin: Point::new(0.0, 0.0),
                nodes: Vec::new(),
                links: Vec::new(),
            },
        };
        controller.update(root_id);
        controller
    }

    pub fn tree(&self) -> &Tree {
        &self.tree
    }

    pub fn config(&self) -> &LayoutConfig {
        &self.config
    }

    /// The most recent render.
    pub fn render(&self) -> &Scene {
        &self.scene
    }

    pub fn is_expanded(&self, id: i64) -> Option<bool> {
        self.tree.get(id).map(|n| n.expanded)
    }

    /// Flip a node between expanded and collapsed. Leaves are left alone.
    ///
    /// # Panics
    ///
    /// If `id` is not in the tree. Callers only toggle nodes they were handed
    /// in a scene.
    pub fn toggle(&mut self, id: i64) {
        let i = self.node_index(id);
        let node = self.tree.node_mut(i);
        if !node.has_children() {
            return;
        }
        node.expanded = !node.expanded;
        debug!("Toggled node {} (expanded: {})", id, node.expanded);
    }

    /// Toggle a node and re-render with it as the transition source.
    pub fn activate(&mut self, id: i64) -> &Scene {
        self.toggle(id);
        self.update(id)
    }

    /// Lay out the visible nodes and reconcile them against the last render.
    ///
    /// Entering nodes and links start at the source's previous position;
    /// exiting ones end at its new position.
    pub fn update(&mut self, source_id: i64) -> &Scene {
        let source = self.node_index(source_id);
        let source_before = {
            let n = self.tree.node(source);
            Point::new(n.x0, n.y0)
        };

        let visible = layout::layout(&mut self.tree, &self.config);

        let source_after = {
            let n = self.tree.node(source);
            Point::new(n.x, n.y)
        };
        let previous: HashSet<usize> = self.rendered.iter().copied().collect();
        let current: HashSet<usize> = visible.iter().copied().collect();

        let mut nodes = Vec::with_capacity(visible.len());
        let mut links = Vec::with_capacity(visible.len());

        for &i in &visible {
            let node = self.tree.node(i);
            let to = Point::new(node.x, node.y);
            let (phase, from) = if previous.contains(&i) {
                (Phase::Update, Point::new(node.x0, node.y0))
            } else {
                (Phase::Enter, source_before)
            };
            nodes.push(self.scene_node(i, phase, from, to));

            if let Some(p) = node.parent {
                let parent = self.tree.node(p);
                let to = Segment {
                    source: Point::new(parent.x, parent.y),
                    target: to,
                };
                let from = if phase == Phase::Update {
                    Segment {
                        source: Point::new(parent.x0, parent.y0),
                        target: from,
                    }
                } else {
                    Segment::point(source_before)
                };
                links.push(SceneLink {
                    id: node.id(),
                    parent: parent.id(),
                    phase,
                    from,
                    to,
                });
            }
        }

        for &i in self.rendered.iter().filter(|i| !current.contains(*i)) {
            let node = self.tree.node(i);
            let from = Point::new(node.x0, node.y0);
            nodes.push(self.scene_node(i, Phase::Exit, from, source_after));

            if let Some(p) = node.parent {
                let parent = self.tree.node(p);
                links.push(SceneLink {
                    id: node.id(),
                    parent: parent.id(),
                    phase: Phase::Exit,
                    from: Segment {
                        source: Point::new(parent.x0, parent.y0),
                        target: from,
                    },
                    to: Segment::point(source_after),
                });
            }
        }

        for &i in &visible {
            let node = self.tree.node_mut(i);
            node.x0 = node.x;
            node.y0 = node.y;
        }

        self.revision += 1;
        debug!(
            "Render {} from node {}: {} visible, {} exiting",
            self.revision,
            source_id,
            visible.len(),
            self.rendered.len() - previous.intersection(&current).count()
        );

        self.rendered = visible;
        self.scene = Scene {
            revision: self.revision,
            source: source_id,
            duration_ms: self.config.duration_ms,
            origin: Point::new(self.config.margin.left, self.config.margin.top),
            nodes,
            links,
        };
        &self.scene
    }

    fn scene_node(&self, i: usize, phase: Phase, from: Point, to: Point) -> SceneNode {
        let node = self.tree.node(i);
        let record = &node.record;
        SceneNode {
            id: record.id,
            label: record.effective_name().to_string(),
            resource_type: record.resource_type.to_string(),
            icon: self.config.icon_url(record.resource_type.icon_key()),
            depth: node.depth,
            expanded: node.expanded,
            collapsed: !node.expanded && node.has_children(),
            phase,
            from,
            to,
        }
    }

    fn node_index(&self, id: i64) -> usize {
        match self.tree.index_of(id) {
            Some(i) => i,
            None => panic!("node {} is not part of the rendered tree", id),
        }
    }
}

/// Collapse every descendant of the root. Runs once, before the first render.
fn collapse_below_root(tree: &mut Tree) {
    let root = tree.root_index();
    let mut stack: Vec<usize> = tree.node(root).children.clone();
    while let Some(i) = stack.pop() {
        let node = tree.node_mut(i);
        node.expanded = false;
        stack.extend(node.children.iter().copied());
    }
}
