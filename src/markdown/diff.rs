use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use super::token::TreeNode;
use crate::id::NodeKey;

/// Merges a freshly parsed tree with the previously rendered one. Subtrees whose
/// key, type, tag and content are unchanged come back as the previous `Arc`, so
/// consumers can skip them with `Arc::ptr_eq`.
pub fn merge_trees(previous: Option<&Arc<TreeNode>>, next: Arc<TreeNode>) -> Arc<TreeNode> {
    match previous {
        Some(previous) => merge_node(previous, next),
        None => next,
    }
}

fn same_identity(previous: &TreeNode, next: &TreeNode) -> bool {
    previous.key == next.key
        && previous.token.token_type == next.token.token_type
        && previous.token.tag == next.token.tag
}

fn merge_node(previous: &Arc<TreeNode>, next: Arc<TreeNode>) -> Arc<TreeNode> {
    if Arc::ptr_eq(previous, &next) {
        return next;
    }
    if !same_identity(previous, &next) {
        return next;
    }

    let by_key: HashMap<&NodeKey, &Arc<TreeNode>> = previous
        .children
        .iter()
        .map(|child| (&child.key, child))
        .collect();

    let children = next
        .children
        .iter()
        .map(|child| match by_key.get(&child.key) {
            Some(old) => merge_node(old, Arc::clone(child)),
            None => Arc::clone(child),
        })
        .collect::<Vec<_>>();

    let reused_all = children.len() == previous.children.len()
        && children
            .iter()
            .zip(&previous.children)
            .all(|(merged, old)| Arc::ptr_eq(merged, old));

    if reused_all && previous.token == next.token {
        return Arc::clone(previous);
    }

    Arc::new(TreeNode {
        key: next.key.clone(),
        token: next.token.clone(),
        children,
    })
}

/// Counts nodes in `next` that are shared by reference with `previous`. Only the
/// topmost shared node of each subtree is counted.
pub(crate) fn reused_subtrees(previous: &Arc<TreeNode>, next: &Arc<TreeNode>) -> usize {
    fn collect(node: &Arc<TreeNode>, into: &mut HashSet<*const TreeNode>) {
        into.insert(Arc::as_ptr(node));
        for child in &node.children {
            collect(child, into);
        }
    }

    fn count(node: &Arc<TreeNode>, old_nodes: &HashSet<*const TreeNode>) -> usize {
        if old_nodes.contains(&Arc::as_ptr(node)) {
            return 1;
        }
        node.children
            .iter()
            .map(|child| count(child, old_nodes))
            .sum()
    }

    let mut old_nodes = HashSet::new();
    collect(previous, &mut old_nodes);
    count(next, &old_nodes)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::markdown::Tokenizer;

    #[test]
    fn merging_equal_trees_returns_previous_reference() {
        let tokenizer = Tokenizer::new();
        let source = "# Title\n\nSome *text*.\n\n- a\n- b\n";
        let first = tokenizer.parse(source, None, true).expect("parses");
        let fresh = tokenizer.parse(source, None, true).expect("parses");
        assert!(!Arc::ptr_eq(&first, &fresh));

        let merged = merge_trees(Some(&first), fresh);
        assert!(Arc::ptr_eq(&first, &merged));
    }

    #[test]
    fn parse_with_previous_is_idempotent() {
        let tokenizer = Tokenizer::new();
        let source = "| a | b |\n|---|---|\n| 1 | 2 |\n\n```js\nlet x = 1;\n```\n";
        let first = tokenizer.parse(source, None, true).expect("parses");
        let second = tokenizer.parse(source, Some(&first), true).expect("parses");
        assert!(Arc::ptr_eq(&first, &second));
    }

    #[test]
    fn appending_a_block_reuses_earlier_blocks() {
        let tokenizer = Tokenizer::new();
        let first = tokenizer
            .parse("intro paragraph\n\n## Heading\n\nbody", None, true)
            .expect("parses");
        let second = tokenizer
            .parse("intro paragraph\n\n## Heading\n\nbody text continues", Some(&first), true)
            .expect("parses");

        assert!(!Arc::ptr_eq(&first, &second));
        assert!(Arc::ptr_eq(&first.children[0], &second.children[0]));
        assert!(Arc::ptr_eq(&first.children[1], &second.children[1]));
        assert!(!Arc::ptr_eq(&first.children[2], &second.children[2]));
        assert_eq!(second.children[2].text_content(), "body text continues");
    }

    #[test]
    fn type_change_at_same_position_is_not_reused() {
        let tokenizer = Tokenizer::new();
        let first = tokenizer.parse("plain", None, true).expect("parses");
        let second = tokenizer.parse("# plain", Some(&first), true).expect("parses");
        assert!(!Arc::ptr_eq(&first.children[0], &second.children[0]));
        assert_eq!(second.children[0].token.tag, "h1");
    }

    #[test]
    fn reused_subtrees_counts_shared_roots() {
        let tokenizer = Tokenizer::new();
        let first = tokenizer.parse("a\n\nb\n\nc", None, true).expect("parses");
        let second = tokenizer
            .parse("a\n\nb\n\nc and more", Some(&first), true)
            .expect("parses");
        assert_eq!(reused_subtrees(&first, &second), 2);
        assert_eq!(reused_subtrees(&first, &first), 1);
    }
}
