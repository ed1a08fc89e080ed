//! Channel-selection tree built from space-separated channel names.
//!
//! `"hand left x"` becomes Group(hand) -> Group(left) -> Channel(x). Nodes live
//! in an arena and are addressed by [`NodeId`]; behavior differs per
//! [`NodeKind`] and is dispatched with `match`.
//!
//! Check-state invariant: a group is checked iff at least one child is.

use super::channel::Channel;
use super::color::Rgb;

pub type NodeId = usize;

const HEADER: &str = "Channel";

#[derive(Clone, Debug, PartialEq)]
pub enum NodeKind {
    Root,
    Group { name: String },
    /// Leaf bound to the channel at `channel` in the model's channel list
    Channel { name: String, channel: usize },
}

#[derive(Clone, Debug)]
pub struct TreeNode {
    pub kind: NodeKind,
    pub parent: Option<NodeId>,
    pub children: Vec<NodeId>,
    pub checked: bool,
    pub color: Rgb,
}

impl TreeNode {
    pub fn name(&self) -> &str {
        match &self.kind {
            NodeKind::Root => HEADER,
            NodeKind::Group { name } | NodeKind::Channel { name, .. } => name,
        }
    }

    pub fn column_count(&self) -> usize {
        match self.kind {
            NodeKind::Root | NodeKind::Group { .. } => 1,
            NodeKind::Channel { .. } => 2,
        }
    }

    /// Display text for a column; channels expose their model index in column 1.
    pub fn data(&self, column: usize) -> Option<String> {
        match (&self.kind, column) {
            (NodeKind::Root, 0) => Some(HEADER.to_string()),
            (NodeKind::Group { name }, 0) => Some(name.clone()),
            (NodeKind::Channel { name, .. }, 0) => Some(name.clone()),
            (NodeKind::Channel { channel, .. }, 1) => Some(channel.to_string()),
            _ => None,
        }
    }

    pub fn channel(&self) -> Option<usize> {
        match self.kind {
            NodeKind::Channel { channel, .. } => Some(channel),
            _ => None,
        }
    }
}

#[derive(Clone, Debug)]
pub struct ChannelTree {
    nodes: Vec<TreeNode>,
}

impl Default for ChannelTree {
    fn default() -> Self {
        Self {
            nodes: vec![TreeNode {
                kind: NodeKind::Root,
                parent: None,
                children: Vec::new(),
                checked: true,
                color: Rgb::BLACK,
            }],
        }
    }
}

impl ChannelTree {
    pub const ROOT: NodeId = 0;

    pub fn build(channels: &[Channel]) -> Self {
        let mut tree = Self::default();
        for (index, channel) in channels.iter().enumerate() {
            let parts: Vec<&str> = channel.name().split(' ').collect();
            let mut parent = Self::ROOT;
            for (depth, part) in parts.iter().enumerate() {
                let leaf = depth + 1 == parts.len();
                parent = if leaf {
                    tree.push(
                        parent,
                        NodeKind::Channel {
                            name: part.to_string(),
                            channel: index,
                        },
                        channel.color(),
                        channel.is_visible(),
                    )
                } else {
                    match tree.child_group(parent, part) {
                        Some(existing) => existing,
                        None => tree.push(
                            parent,
                            NodeKind::Group { name: part.to_string() },
                            channel.color(),
                            true,
                        ),
                    }
                };
            }
        }
        tree.refresh_ancestors_all();
        tree
    }

    fn push(&mut self, parent: NodeId, kind: NodeKind, color: Rgb, checked: bool) -> NodeId {
        let id = self.nodes.len();
        self.nodes.push(TreeNode {
            kind,
            parent: Some(parent),
            children: Vec::new(),
            checked,
            color,
        });
        self.nodes[parent].children.push(id);
        id
    }

    fn child_group(&self, parent: NodeId, name: &str) -> Option<NodeId> {
        self.nodes[parent]
            .children
            .iter()
            .copied()
            .find(|&c| matches!(&self.nodes[c].kind, NodeKind::Group { name: n } if n == name))
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.len() <= 1
    }

    pub fn node(&self, id: NodeId) -> Option<&TreeNode> {
        self.nodes.get(id)
    }

    pub fn children(&self, id: NodeId) -> &[NodeId] {
        self.nodes.get(id).map(|n| n.children.as_slice()).unwrap_or(&[])
    }

    /// Position of `id` among its siblings.
    pub fn row(&self, id: NodeId) -> usize {
        self.nodes
            .get(id)
            .and_then(|n| n.parent)
            .and_then(|p| self.nodes[p].children.iter().position(|&c| c == id))
            .unwrap_or(0)
    }

    /// Space-joined names from the first level down to `id`.
    pub fn path(&self, id: NodeId) -> String {
        let mut parts = Vec::new();
        let mut cur = Some(id);
        while let Some(n) = cur.and_then(|i| self.nodes.get(i)) {
            if !matches!(n.kind, NodeKind::Root) {
                parts.push(n.name());
            }
            cur = n.parent;
        }
        parts.reverse();
        parts.join(" ")
    }

    pub fn find(&self, path: &str) -> Option<NodeId> {
        let mut cur = Self::ROOT;
        for part in path.split(' ') {
            cur = self.nodes[cur]
                .children
                .iter()
                .copied()
                .find(|&c| self.nodes[c].name() == part)?;
        }
        Some(cur)
    }

    /// Flip the check state of `id` and its subtree, then repair ancestors.
    ///
    /// Returns `(channel index, visible)` for every channel leaf touched.
    pub fn toggle(&mut self, id: NodeId) -> Vec<(usize, bool)> {
        let Some(node) = self.nodes.get(id) else {
            return Vec::new();
        };
        let state = !node.checked;
        let mut changed = Vec::new();
        let mut stack = vec![id];
        while let Some(n) = stack.pop() {
            let node = &mut self.nodes[n];
            node.checked = state;
            if let Some(ch) = node.channel() {
                changed.push((ch, state));
            }
            stack.extend(node.children.iter().copied());
        }
        let mut parent = self.nodes[id].parent;
        while let Some(p) = parent {
            self.refresh_checked(p);
            parent = self.nodes[p].parent;
        }
        changed.sort_unstable();
        changed
    }

    fn refresh_checked(&mut self, id: NodeId) {
        if self.nodes[id].children.is_empty() {
            return;
        }
        let any = self.nodes[id].children.iter().any(|&c| self.nodes[c].checked);
        self.nodes[id].checked = any;
    }

    fn refresh_ancestors_all(&mut self) {
        // Children always have larger ids than their parents
        for id in (0..self.nodes.len()).rev() {
            self.refresh_checked(id);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn channels(names: &[&str]) -> Vec<Channel> {
        names
            .iter()
            .enumerate()
            .map(|(i, n)| Channel::new(*n, i + 1, i, Rgb::RED))
            .collect()
    }

    #[test]
    fn test_groups_are_shared() {
        let tree = ChannelTree::build(&channels(&["hand left x", "hand left y", "hand right x", "head"]));
        let root_children = tree.children(ChannelTree::ROOT);
        assert_eq!(root_children.len(), 2);
        let hand = tree.find("hand").unwrap();
        assert_eq!(tree.children(hand).len(), 2);
        let y = tree.find("hand left y").unwrap();
        assert_eq!(tree.node(y).unwrap().channel(), Some(1));
        assert_eq!(tree.path(y), "hand left y");
        assert_eq!(tree.row(y), 1);
    }

    #[test]
    fn test_node_kinds_dispatch() {
        let tree = ChannelTree::build(&channels(&["hand x"]));
        let root = tree.node(ChannelTree::ROOT).unwrap();
        assert_eq!(root.data(0).as_deref(), Some("Channel"));
        assert_eq!(root.column_count(), 1);
        let leaf = tree.node(tree.find("hand x").unwrap()).unwrap();
        assert_eq!(leaf.column_count(), 2);
        assert_eq!(leaf.data(1).as_deref(), Some("0"));
        assert_eq!(leaf.data(2), None);
    }

    #[test]
    fn test_toggle_group_sets_subtree() {
        let mut tree = ChannelTree::build(&channels(&["hand left x", "hand left y", "head"]));
        let left = tree.find("hand left").unwrap();
        let changed = tree.toggle(left);
        assert_eq!(changed, vec![(0, false), (1, false)]);
        // hand has no checked child left
        assert!(!tree.node(tree.find("hand").unwrap()).unwrap().checked);
        // root still has head
        assert!(tree.node(ChannelTree::ROOT).unwrap().checked);
    }

    #[test]
    fn test_toggle_leaf_rechecks_ancestors() {
        let mut tree = ChannelTree::build(&channels(&["hand left x", "hand left y"]));
        tree.toggle(tree.find("hand").unwrap());
        let changed = tree.toggle(tree.find("hand left x").unwrap());
        assert_eq!(changed, vec![(0, true)]);
        assert!(tree.node(tree.find("hand left").unwrap()).unwrap().checked);
        assert!(tree.node(tree.find("hand").unwrap()).unwrap().checked);
        assert!(!tree.node(tree.find("hand left y").unwrap()).unwrap().checked);
    }

    #[test]
    fn test_toggle_unknown_node_is_noop() {
        let mut tree = ChannelTree::build(&channels(&["x"]));
        assert!(tree.toggle(99).is_empty());
    }
}
