//! Conversation and plan memory as an arena-backed tree.
//!
//! Nodes live in a flat vector indexed by [`NodeId`]; node 0 is the root.
//! Parents own the ordering of their children, and the cursor is a plain id so
//! it can never dangle. Nodes are never removed individually.

use std::fmt;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Action tag for nodes created from plan outlines.
pub const PLAN_ACTION: &str = "plan";

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct NodeId(usize);

impl NodeId {
    pub const ROOT: NodeId = NodeId(0);

    pub fn index(self) -> usize {
        self.0
    }
}

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    Root,
    User,
    System,
    Assistant,
}

impl Role {
    pub fn label(self) -> &'static str {
        match self {
            Role::Root => "root",
            Role::User => "user",
            Role::System => "system",
            Role::Assistant => "assistant",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NodeState {
    Ready,
    Success,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MemoryNode {
    pub id: NodeId,
    pub role: Role,
    pub action: String,
    pub content: String,
    pub state: NodeState,
    pub parent: Option<NodeId>,
    pub children: Vec<NodeId>,
}

#[derive(Debug, Clone, Copy, Error, PartialEq, Eq)]
pub enum MemoryError {
    #[error("memory node {0} does not exist")]
    UnknownNode(NodeId),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MemoryTree {
    nodes: Vec<MemoryNode>,
    current: Option<NodeId>,
}

impl Default for MemoryTree {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryTree {
    pub fn new() -> Self {
        Self {
            nodes: vec![MemoryNode {
                id: NodeId::ROOT,
                role: Role::Root,
                action: "root".to_string(),
                content: String::new(),
                state: NodeState::Ready,
                parent: None,
                children: Vec::new(),
            }],
            current: None,
        }
    }

    pub fn root(&self) -> NodeId {
        NodeId::ROOT
    }

    pub fn node(&self, id: NodeId) -> Option<&MemoryNode> {
        self.nodes.get(id.0)
    }

    /// Id for a raw index, if that node exists.
    pub fn lookup(&self, index: usize) -> Result<NodeId, MemoryError> {
        let id = NodeId(index);
        self.require(id)?;
        Ok(id)
    }

    pub fn nodes(&self) -> &[MemoryNode] {
        &self.nodes
    }

    /// Number of nodes, root included.
    pub fn node_count(&self) -> usize {
        self.nodes.len()
    }

    pub fn current(&self) -> Option<NodeId> {
        self.current
    }

    /// Insertion anchor: the cursor, or the root before the cursor is set.
    pub fn anchor(&self) -> NodeId {
        self.current.unwrap_or(NodeId::ROOT)
    }

    pub fn set_current(&mut self, id: NodeId) -> Result<(), MemoryError> {
        self.require(id)?;
        self.current = Some(id);
        Ok(())
    }

    /// Append a node under the insertion anchor.
    pub fn add_node(
        &mut self,
        role: Role,
        action: impl Into<String>,
        content: impl Into<String>,
    ) -> NodeId {
        let parent = self.anchor();
        self.push_child(parent, role, action.into(), content.into())
    }

    /// Append a node as the last child of `parent`.
    pub fn add_child(
        &mut self,
        parent: NodeId,
        role: Role,
        action: impl Into<String>,
        content: impl Into<String>,
    ) -> Result<NodeId, MemoryError> {
        self.require(parent)?;
        Ok(self.push_child(parent, role, action.into(), content.into()))
    }

    fn push_child(&mut self, parent: NodeId, role: Role, action: String, content: String) -> NodeId {
        let id = NodeId(self.nodes.len());
        self.nodes.push(MemoryNode {
            id,
            role,
            action,
            content,
            state: NodeState::Ready,
            parent: Some(parent),
            children: Vec::new(),
        });
        self.nodes[parent.0].children.push(id);
        id
    }

    /// Edges between `id` and the root (root has depth 0).
    pub fn depth(&self, id: NodeId) -> Result<usize, MemoryError> {
        Ok(self.ancestors(id)?.len() - 1)
    }

    /// Path from the root down to `id`, both included.
    pub fn ancestors(&self, id: NodeId) -> Result<Vec<NodeId>, MemoryError> {
        let mut path = vec![self.require(id)?.id];
        let mut cursor = self.nodes[id.0].parent;
        while let Some(parent) = cursor {
            path.push(parent);
            cursor = self.nodes[parent.0].parent;
        }
        path.reverse();
        Ok(path)
    }

    /// Context for `id`: at every level below the root, the earlier siblings
    /// followed by the node on the path, ending with `id` itself.
    pub fn related_messages(&self, id: NodeId) -> Result<Vec<&MemoryNode>, MemoryError> {
        let mut related = Vec::new();
        for node_id in self.ancestors(id)?.into_iter().skip(1) {
            let node = &self.nodes[node_id.0];
            if let Some(parent) = node.parent {
                related.extend(
                    self.nodes[parent.0]
                        .children
                        .iter()
                        .take_while(|sibling| **sibling != node_id)
                        .map(|sibling| &self.nodes[sibling.0]),
                );
            }
            related.push(node);
        }
        Ok(related)
    }

    /// First plan node still `Ready`, with sub-steps before their parent step.
    pub fn next_todo(&self) -> Option<NodeId> {
        self.next_todo_from(NodeId::ROOT)
    }

    fn next_todo_from(&self, id: NodeId) -> Option<NodeId> {
        let node = &self.nodes[id.0];
        for child in &node.children {
            if let Some(found) = self.next_todo_from(*child) {
                return Some(found);
            }
        }
        (node.action == PLAN_ACTION && node.state == NodeState::Ready).then_some(id)
    }

    pub fn mark_success(&mut self, id: NodeId) -> Result<(), MemoryError> {
        self.require(id)?;
        self.nodes[id.0].state = NodeState::Success;
        Ok(())
    }

    /// Indented one-line-per-node rendering; the cursor is marked with `*`.
    pub fn render_outline(&self) -> String {
        let mut out = String::new();
        for child in &self.nodes[NodeId::ROOT.0].children {
            self.render_node(*child, 0, &mut out);
        }
        out
    }

    fn render_node(&self, id: NodeId, level: usize, out: &mut String) {
        let node = &self.nodes[id.0];
        let marker = if self.current == Some(id) { "*" } else { "-" };
        let state = match (node.action == PLAN_ACTION, node.state) {
            (true, NodeState::Success) => "[x] ",
            (true, NodeState::Ready) => "[ ] ",
            (false, _) => "",
        };
        let summary = node.content.lines().next().unwrap_or("");
        out.push_str(&format!(
            "{}{} {}{}/{}: {}\n",
            "  ".repeat(level),
            marker,
            state,
            node.role.label(),
            node.action,
            summary
        ));
        for child in &node.children {
            self.render_node(*child, level + 1, out);
        }
    }

    fn require(&self, id: NodeId) -> Result<&MemoryNode, MemoryError> {
        self.nodes.get(id.0).ok_or(MemoryError::UnknownNode(id))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn add_node_uses_root_until_cursor_is_set() {
        let mut tree = MemoryTree::new();
        let first = tree.add_node(Role::User, "input", "hello");
        tree.set_current(first).expect("cursor");
        let reply = tree.add_node(Role::Assistant, "response", "hi");

        assert_eq!(tree.node(first).unwrap().parent, Some(NodeId::ROOT));
        assert_eq!(tree.node(reply).unwrap().parent, Some(first));
        assert_eq!(tree.depth(reply).unwrap(), 2);
        assert_eq!(tree.node_count(), 3);
    }

    #[test]
    fn set_current_rejects_unknown_node() {
        let mut tree = MemoryTree::new();
        let err = tree.set_current(NodeId(7)).unwrap_err();
        assert_eq!(err, MemoryError::UnknownNode(NodeId(7)));
        assert_eq!(tree.current(), None);
        assert_eq!(tree.lookup(7), Err(MemoryError::UnknownNode(NodeId(7))));
        assert_eq!(tree.lookup(0), Ok(NodeId::ROOT));
    }

    #[test]
    fn next_todo_visits_substeps_before_parent_step() {
        let mut tree = MemoryTree::new();
        let step1 = tree.add_node(Role::System, PLAN_ACTION, "1");
        let step11 = tree.add_child(step1, Role::System, PLAN_ACTION, "1.1").unwrap();
        let step2 = tree.add_node(Role::System, PLAN_ACTION, "2");

        assert_eq!(tree.next_todo(), Some(step11));
        tree.mark_success(step11).unwrap();
        assert_eq!(tree.next_todo(), Some(step1));
        tree.mark_success(step1).unwrap();
        assert_eq!(tree.next_todo(), Some(step2));
        tree.mark_success(step2).unwrap();
        assert_eq!(tree.next_todo(), None);
    }

    #[test]
    fn related_messages_include_earlier_siblings_on_path() {
        let mut tree = MemoryTree::new();
        let question = tree.add_node(Role::User, "input", "q");
        let plan = tree.add_node(Role::System, PLAN_ACTION, "p");
        let a = tree.add_child(plan, Role::System, PLAN_ACTION, "a").unwrap();
        let b = tree.add_child(plan, Role::System, PLAN_ACTION, "b").unwrap();

        let ids: Vec<NodeId> = tree
            .related_messages(b)
            .unwrap()
            .iter()
            .map(|node| node.id)
            .collect();
        assert_eq!(ids, vec![question, plan, a, b]);
    }

    #[test]
    fn render_outline_marks_cursor_and_plan_state() {
        let mut tree = MemoryTree::new();
        let input = tree.add_node(Role::User, "input", "hello world");
        tree.set_current(input).unwrap();
        let step = tree.add_node(Role::System, PLAN_ACTION, "1.xxx\n1.1 xxx");
        tree.mark_success(step).unwrap();

        assert_eq!(
            tree.render_outline(),
            "* user/input: hello world\n  - [x] system/plan: 1.xxx\n"
        );
    }
}
