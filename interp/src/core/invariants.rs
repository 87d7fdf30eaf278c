//! Structural invariants for a memory tree loaded from disk.

use std::collections::HashSet;

use crate::memory::{MemoryTree, NodeId, Role};

/// Check invariants serde cannot express:
/// - node ids match arena positions
/// - the root is node 0, has role `root`, and no parent
/// - every other node has exactly one parent, which lists it as a child
/// - the cursor, if set, refers to an existing node
pub fn validate_memory_invariants(tree: &MemoryTree) -> Vec<String> {
    let mut errors = Vec::new();
    let nodes = tree.nodes();

    let Some(root) = nodes.first() else {
        errors.push("memory has no root node".to_string());
        return errors;
    };
    if root.parent.is_some() {
        errors.push("root must not have a parent".to_string());
    }
    if root.role != Role::Root {
        errors.push("node #0 must have role 'root'".to_string());
    }

    let mut claimed: HashSet<NodeId> = HashSet::new();
    for (index, node) in nodes.iter().enumerate() {
        if node.id.index() != index {
            errors.push(format!("node at position {} has id {}", index, node.id));
        }
        for child in &node.children {
            match tree.node(*child) {
                None => errors.push(format!("{}: child {} does not exist", node.id, child)),
                Some(found) if found.parent != Some(node.id) => errors.push(format!(
                    "{}: child {} names parent {:?}",
                    node.id, child, found.parent
                )),
                Some(_) => {}
            }
            if !claimed.insert(*child) {
                errors.push(format!("{} is listed as a child more than once", child));
            }
        }
        if index > 0 {
            match node.parent {
                None => errors.push(format!("{} has no parent", node.id)),
                Some(parent) => match tree.node(parent) {
                    None => errors.push(format!("{}: parent {} does not exist", node.id, parent)),
                    Some(found) if !found.children.contains(&node.id) => errors.push(format!(
                        "{}: parent {} does not list it as a child",
                        node.id, parent
                    )),
                    Some(_) => {}
                },
            }
        }
    }

    for node in nodes.iter().skip(1) {
        if !reaches_root(tree, node.id) {
            errors.push(format!("{} is not connected to the root", node.id));
        }
    }

    if let Some(current) = tree.current()
        && tree.node(current).is_none()
    {
        errors.push(format!("cursor {} does not exist", current));
    }

    errors
}

/// Follow parent links from `id`; cycles and dangling links never reach node 0.
fn reaches_root(tree: &MemoryTree, id: NodeId) -> bool {
    let mut cursor = Some(id);
    for _ in 0..=tree.node_count() {
        match cursor.and_then(|current| tree.node(current)) {
            Some(node) if node.id == NodeId::ROOT => return true,
            Some(node) => cursor = node.parent,
            None => return false,
        }
    }
    false
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::{PLAN_ACTION, Role};

    #[test]
    fn fresh_and_grown_trees_are_valid() {
        let mut tree = MemoryTree::new();
        assert!(validate_memory_invariants(&tree).is_empty());
        let input = tree.add_node(Role::User, "input", "hi");
        tree.set_current(input).unwrap();
        tree.add_node(Role::System, PLAN_ACTION, "step");
        assert!(validate_memory_invariants(&tree).is_empty());
    }

    #[test]
    fn reports_broken_links_from_hand_edited_json() {
        let raw = r#"{
            "nodes": [
                {"id": 0, "role": "root", "action": "root", "content": "", "state": "ready", "parent": null, "children": [1, 1]},
                {"id": 1, "role": "user", "action": "input", "content": "hi", "state": "ready", "parent": 0, "children": []},
                {"id": 5, "role": "user", "action": "input", "content": "orphan", "state": "ready", "parent": null, "children": []}
            ],
            "current": 9
        }"#;
        let tree: MemoryTree = serde_json::from_str(raw).expect("parse");
        let errors = validate_memory_invariants(&tree);
        assert!(errors.iter().any(|e| e.contains("more than once")));
        assert!(errors.iter().any(|e| e.contains("position 2 has id #5")));
        assert!(errors.iter().any(|e| e.contains("#5 has no parent")));
        assert!(errors.iter().any(|e| e.contains("cursor #9")));
    }
}
