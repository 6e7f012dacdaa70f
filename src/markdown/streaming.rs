use std::sync::Arc;

use super::token::TreeNode;

#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
pub enum TableStreamingState {
    #[default]
    NotInTableLoading,
    TableLoading,
}

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum GateDecision {
    /// Render the tree as is.
    Render,
    /// Render one frame with the trailing table shown as a skeleton.
    RenderLoadingFrame,
    /// Keep the previous output and stage the tree for later.
    Stage,
}

/// Holds back rendering while a table is still streaming in.
#[derive(Clone, Debug, Default)]
pub struct TableStreamingGate {
    state: TableStreamingState,
    has_rendered_loading_frame: bool,
}

impl TableStreamingGate {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn state(&self) -> TableStreamingState {
        self.state
    }

    pub fn is_loading(&self) -> bool {
        self.state == TableStreamingState::TableLoading
    }

    pub fn has_rendered_loading_frame(&self) -> bool {
        self.has_rendered_loading_frame
    }

    pub fn reset(&mut self) {
        *self = Self::default();
    }

    pub fn advance(&mut self, streaming: bool, tree: &Arc<TreeNode>, source: &str) -> GateDecision {
        match self.state {
            TableStreamingState::NotInTableLoading => {
                if streaming && ends_with_table(tree) {
                    self.state = TableStreamingState::TableLoading;
                    self.has_rendered_loading_frame = true;
                    log::debug!(target: "calmchat::streaming", "entering table loading mode");
                    GateDecision::RenderLoadingFrame
                } else {
                    GateDecision::Render
                }
            }
            TableStreamingState::TableLoading => {
                let released = !streaming
                    || !contains_table(tree)
                    || (has_node_after_table(tree) && !has_likely_partial_table_tail(source));
                if released {
                    self.reset();
                    log::debug!(target: "calmchat::streaming", "leaving table loading mode");
                    return GateDecision::Render;
                }
                if self.has_rendered_loading_frame {
                    GateDecision::Stage
                } else {
                    self.has_rendered_loading_frame = true;
                    GateDecision::RenderLoadingFrame
                }
            }
        }
    }
}

/// True when the rightmost chain of last children contains a table.
pub fn ends_with_table(tree: &TreeNode) -> bool {
    let mut current = tree;
    loop {
        if current.is_table() {
            return true;
        }
        match current.last_child() {
            Some(child) => current = child,
            None => return false,
        }
    }
}

pub fn contains_table(tree: &TreeNode) -> bool {
    let mut found = false;
    tree.walk(&mut |node| found |= node.is_table());
    found
}

/// A table exists and something has been parsed after it.
pub fn has_node_after_table(tree: &TreeNode) -> bool {
    contains_table(tree) && !ends_with_table(tree)
}

fn is_separator_row(line: &str) -> bool {
    line.contains('|')
        && line.contains('-')
        && line
            .chars()
            .all(|ch| ch == '|' || ch == '-' || ch == ':' || ch.is_whitespace())
}

/// Whether the last non-blank line of `source` looks like an unfinished table
/// row or separator.
pub fn has_likely_partial_table_tail(source: &str) -> bool {
    let Some(line) = source.lines().rev().map(str::trim).find(|line| !line.is_empty()) else {
        return false;
    };
    line.starts_with('|') || line.ends_with('|') || is_separator_row(line)
}
