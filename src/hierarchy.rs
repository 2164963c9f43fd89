//! Hierarchy builder: flat parent-pointer records → single-rooted tree.
//!
//! Nodes live in an arena in input order. Children are stored as arena
//! indices and keep the order their records appeared in.

use std::collections::HashMap;
use tracing::debug;

use crate::error::{InventoryError, Result};
use crate::record::{FlatRecord, ResourceType};

/// A record placed in the hierarchy, plus its view-state.
#[derive(Debug, Clone)]
pub struct TreeNode {
    pub record: FlatRecord,
    pub(crate) parent: Option<usize>,
    pub(crate) children: Vec<usize>,
    pub depth: usize,
    /// Whether children are shown. Only `ViewController::toggle` and the
    /// bootstrap collapse change this.
    pub expanded: bool,
    /// Breadth coordinate from the last layout pass.
    pub x: f64,
    /// Depth coordinate from the last layout pass.
    pub y: f64,
    /// Position at the end of the previous render.
    pub x0: f64,
    pub y0: f64,
}

impl TreeNode {
    fn new(record: FlatRecord) -> Self {
        Self {
            record,
            parent: None,
            children: Vec::new(),
            depth: 0,
            expanded: true,
            x: 0.0,
            y: 0.0,
            x0: 0.0,
            y0: 0.0,
        }
    }

    pub fn id(&self) -> i64 {
        self.record.id
    }

    pub fn has_children(&self) -> bool {
        !self.children.is_empty()
    }
}

/// Single-rooted inventory tree.
#[derive(Debug, Clone)]
pub struct Tree {
    nodes: Vec<TreeNode>,
    index: HashMap<i64, usize>,
    root: usize,
}

impl Tree {
    /// Assemble records into a tree.
    ///
    /// Fails on duplicate ids, dangling parents, zero or several roots, and
    /// parent cycles. Never returns a partial tree.
    ///
    /// The root is whichever record has no parent. Only organizations are
    /// normalized without one, so the root is always an organization for
    /// records that came through `record::normalize`.
    pub fn build(records: &[FlatRecord]) -> Result<Self> {
        let mut index = HashMap::with_capacity(records.len());
        for (i, record) in records.iter().enumerate() {
            if index.insert(record.id, i).is_some() {
                return Err(InventoryError::DuplicateId(record.id));
            }
        }

        let mut nodes: Vec<TreeNode> = records.iter().cloned().map(TreeNode::new).collect();
        let mut roots = Vec::new();

        for i in 0..nodes.len() {
            let Some(parent_id) = nodes[i].record.parent_id else {
                roots.push(i);
                continue;
            };
            let parent = *index
                .get(&parent_id)
                .ok_or(InventoryError::DanglingParent {
                    id: nodes[i].record.id,
                    parent_id: Some(parent_id),
                })?;
            nodes[i].parent = Some(parent);
            nodes[parent].children.push(i);
        }

        let root = match roots.as_slice() {
            [] => return Err(InventoryError::MissingRoot),
            [root] => *root,
            many => {
                return Err(InventoryError::MultipleRoots(
                    many.iter().map(|&i| nodes[i].record.id).collect(),
                ))
            }
        };

        debug_assert!(
            nodes[root].record.resource_type == ResourceType::Organization,
            "root {} is not an organization",
            nodes[root].record.id
        );

        assign_depths(&mut nodes, root)?;

        debug!(
            "Built inventory tree: {} nodes, root {}",
            nodes.len(),
            nodes[root].record.id
        );

        Ok(Self { nodes, index, root })
    }

    pub fn root_id(&self) -> i64 {
        self.nodes[self.root].record.id
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn contains(&self, id: i64) -> bool {
        self.index.contains_key(&id)
    }

    pub fn get(&self, id: i64) -> Option<&TreeNode> {
        self.index.get(&id).map(|&i| &self.nodes[i])
    }

    /// Child ids of `id`, in input order. Empty for unknown ids.
    #[cfg(test)]
    pub fn children(&self, id: i64) -> Vec<i64> {
        self.index
            .get(&id)
            .map(|&i| {
                self.nodes[i]
                    .children
                    .iter()
                    .map(|&c| self.nodes[c].record.id)
                    .collect()
            })
            .unwrap_or_default()
    }

    #[cfg(test)]
    pub fn parent(&self, id: i64) -> Option<i64> {
        let node = self.get(id)?;
        node.parent.map(|p| self.nodes[p].record.id)
    }

    /// Every id reachable from the root, pre-order.
    pub fn descendants(&self) -> Vec<i64> {
        let mut out = Vec::with_capacity(self.nodes.len());
        let mut stack = vec![self.root];
        while let Some(i) = stack.pop() {
            out.push(self.nodes[i].record.id);
            stack.extend(self.nodes[i].children.iter().rev());
        }
        out
    }

    /// Number of nodes reachable from the root through child links.
    pub fn count_nodes(&self) -> usize {
        self.descendants().len()
    }

    /// Records in the order they were built from.
    pub fn records(&self) -> impl Iterator<Item = &FlatRecord> {
        self.nodes.iter().map(|n| &n.record)
    }

    pub(crate) fn root_index(&self) -> usize {
        self.root
    }

    pub(crate) fn index_of(&self, id: i64) -> Option<usize> {
        self.index.get(&id).copied()
    }

    pub(crate) fn node(&self, i: usize) -> &TreeNode {
        &self.nodes[i]
    }

    pub(crate) fn node_mut(&mut self, i: usize) -> &mut TreeNode {
        &mut self.nodes[i]
    }
}

/// Walk down from the root assigning depths, bounded by the node count.
///
/// Every non-root node already has a resolved parent, so anything the walk
/// cannot reach sits on a parent cycle.
fn assign_depths(nodes: &mut [TreeNode], root: usize) -> Result<()> {
    let bound = nodes.len();
    let mut seen = vec![false; bound];
    let mut visited = 0usize;
    let mut stack = vec![(root, 0usize)];

    while let Some((i, depth)) = stack.pop() {
        if seen[i] || depth > bound {
            return Err(InventoryError::CycleDetected(nodes[i].record.id));
        }
        seen[i] = true;
        visited += 1;
        nodes[i].depth = depth;
        stack.extend(nodes[i].children.iter().map(|&c| (c, depth + 1)));
    }

    if visited == bound {
        return Ok(());
    }

    // Follow parent links from an unreached node until one repeats; that node
    // is on the cycle.
    let start = seen.iter().position(|s| !s).unwrap_or(root);
    let mut on_path = vec![false; bound];
    let mut cur = start;
    for _ in 0..=bound {
        if on_path[cur] {
            break;
        }
        on_path[cur] = true;
        match nodes[cur].parent {
            Some(p) => cur = p,
            None => break,
        }
    }
    Err(InventoryError::CycleDetected(nodes[cur].record.id))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn rec(id: i64, resource_type: &str, parent_id: Option<i64>, name: &str) -> FlatRecord {
        FlatRecord {
            id,
            resource_type: ResourceType::parse(resource_type),
            category: "resource".to_string(),
            resource_id: format!("{}/{}", resource_type, id),
            parent_id,
            display_name: String::new(),
            name: name.to_string(),
        }
    }

    fn sample() -> Vec<FlatRecord> {
        vec![
            rec(3, "bucket", Some(2), "my-bucket"),
            rec(1, "organization", None, "acme"),
            rec(2, "project", Some(1), "proj-a"),
            rec(4, "folder", Some(1), "eng"),
            rec(5, "project", Some(4), "proj-b"),
            rec(6, "disk", Some(2), "disk-1"),
        ]
    }

    #[test]
    fn test_build_links_every_record() {
        let records = sample();
        let tree = Tree::build(&records).unwrap();
        assert_eq!(tree.root_id(), 1);
        assert_eq!(tree.count_nodes(), records.len());
        assert_eq!(tree.descendants(), vec![1, 2, 3, 6, 4, 5]);
        for record in &records {
            assert!(tree.contains(record.id));
            assert_eq!(tree.parent(record.id), record.parent_id);
        }
    }

    #[test]
    fn test_children_keep_input_order() {
        let tree = Tree::build(&sample()).unwrap();
        assert_eq!(tree.children(1), vec![2, 4]);
        assert_eq!(tree.children(2), vec![3, 6]);
        assert!(tree.children(3).is_empty());
    }

    #[test]
    fn test_depths() {
        let tree = Tree::build(&sample()).unwrap();
        assert_eq!(tree.get(1).unwrap().depth, 0);
        assert_eq!(tree.get(4).unwrap().depth, 1);
        assert_eq!(tree.get(5).unwrap().depth, 2);
    }

    #[test]
    fn test_missing_root() {
        let records = vec![rec(2, "project", Some(3), "a"), rec(3, "project", Some(2), "b")];
        assert_eq!(Tree::build(&records).unwrap_err(), InventoryError::MissingRoot);

        assert_eq!(Tree::build(&[]).unwrap_err(), InventoryError::MissingRoot);
    }

    #[test]
    #[cfg(debug_assertions)]
    #[should_panic(expected = "is not an organization")]
    fn test_parentless_project_root_is_rejected() {
        let records = vec![rec(2, "project", None, "proj-a"), rec(3, "bucket", Some(2), "b")];
        let _ = Tree::build(&records);
    }

    #[test]
    fn test_multiple_roots() {
        let records = vec![
            rec(1, "organization", None, "a"),
            rec(2, "organization", None, "b"),
        ];
        assert_eq!(
            Tree::build(&records).unwrap_err(),
            InventoryError::MultipleRoots(vec![1, 2])
        );
    }

    #[test]
    fn test_dangling_parent() {
        let mut records = sample();
        records.push(rec(9, "bucket", Some(42), "orphan"));
        assert_eq!(
            Tree::build(&records).unwrap_err(),
            InventoryError::DanglingParent {
                id: 9,
                parent_id: Some(42)
            }
        );
    }

    #[test]
    fn test_duplicate_id() {
        let mut records = sample();
        records.push(rec(2, "bucket", Some(1), "again"));
        assert_eq!(Tree::build(&records).unwrap_err(), InventoryError::DuplicateId(2));
    }

    #[test]
    fn test_cycle_detected() {
        let mut records = sample();
        records.push(rec(7, "folder", Some(8), "x"));
        records.push(rec(8, "folder", Some(7), "y"));
        records.push(rec(9, "bucket", Some(8), "z"));
        match Tree::build(&records).unwrap_err() {
            InventoryError::CycleDetected(id) => assert!(id == 7 || id == 8),
            other => panic!("expected cycle, got {:?}", other),
        }
    }

    #[test]
    fn test_self_parent_is_cycle() {
        let mut records = sample();
        records.push(rec(7, "folder", Some(7), "self"));
        assert_eq!(Tree::build(&records).unwrap_err(), InventoryError::CycleDetected(7));
    }
}
