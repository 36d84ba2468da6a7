use std::collections::HashMap;

use serde::Serialize;

use crate::identity::role::Badge;

use super::{Author, CommentId, CommentNode, CommentRecord, VoteTally};

/// Assembles flat records into a forest of comment trees.
///
/// `records` must be sorted by `created_at` ascending; children keep that
/// order. Roots are ordered pinned first, then oldest first. A comment whose
/// parent is not among `records` becomes a root. Tallies for unknown ids are
/// ignored and missing tallies count as zero.
pub fn build_comment_tree(
    records: Vec<CommentRecord>,
    tallies: &HashMap<CommentId, VoteTally>,
) -> Vec<CommentNode> {
    let n = records.len();

    // Later duplicates take the slot, earlier ones are dropped
    let mut index = HashMap::<CommentId, usize>::with_capacity(n);
    for (i, record) in records.iter().enumerate() {
        index.insert(record.id, i);
    }
    let live: Vec<bool> = records
        .iter()
        .enumerate()
        .map(|(i, r)| index.get(&r.id) == Some(&i))
        .collect();

    let mut parent: Vec<Option<usize>> = vec![None; n];
    let mut children: Vec<Vec<usize>> = vec![vec![]; n];
    let mut roots: Vec<usize> = vec![];

    for (i, record) in records.iter().enumerate() {
        if !live[i] {
            continue;
        }
        match record.parent_id.and_then(|p| index.get(&p).copied()) {
            Some(p) if p != i => {
                parent[i] = Some(p);
                children[p].push(i);
            }
            _ => roots.push(i),
        }
    }

    // Anything not reachable from a root hangs off a parent cycle. Cutting
    // the first such node loose breaks the cycle and keeps every comment.
    let mut reached = vec![false; n];
    for &root in &roots {
        mark_subtree(root, &children, &mut reached);
    }
    for i in 0..n {
        if !live[i] || reached[i] {
            continue;
        }
        if let Some(p) = parent[i].take() {
            children[p].retain(|&c| c != i);
        }
        tracing::warn!(
            id = records[i].id,
            parent_id = ?records[i].parent_id,
            "Comment is part of a parent cycle, promoting it to a root"
        );
        roots.push(i);
        mark_subtree(i, &children, &mut reached);
    }

    roots.sort_by(|&a, &b| {
        let (a, b) = (&records[a], &records[b]);
        b.pinned
            .cmp(&a.pinned)
            .then_with(|| a.created_at.cmp(&b.created_at))
    });

    let mut slots: Vec<Option<CommentRecord>> = records.into_iter().map(Some).collect();
    let mut built: Vec<Option<CommentNode>> = (0..n).map(|_| None).collect();

    // Post-order, so every child is built before its parent
    for &root in &roots {
        let mut stack = vec![(root, false)];
        while let Some((i, expanded)) = stack.pop() {
            if !expanded {
                stack.push((i, true));
                stack.extend(children[i].iter().rev().map(|&c| (c, false)));
                continue;
            }

            let Some(record) = slots[i].take() else {
                continue;
            };
            let tally = tallies.get(&record.id).copied().unwrap_or_default();
            let kids = children[i]
                .iter()
                .filter_map(|&c| built[c].take())
                .collect();
            built[i] = Some(CommentNode::new(record, tally, kids));
        }
    }

    roots.into_iter().filter_map(|r| built[r].take()).collect()
}

fn mark_subtree(start: usize, children: &[Vec<usize>], reached: &mut [bool]) {
    let mut stack = vec![start];
    while let Some(i) = stack.pop() {
        if reached[i] {
            continue;
        }
        reached[i] = true;
        stack.extend(children[i].iter().copied().filter(|&c| !reached[c]));
    }
}

/// Depth-first, pre-order walk over a forest, yielding each node with its depth.
pub fn walk(roots: &[CommentNode]) -> impl Iterator<Item = (usize, &CommentNode)> {
    let mut stack: Vec<(usize, &CommentNode)> = roots.iter().rev().map(|r| (0, r)).collect();
    std::iter::from_fn(move || {
        let (depth, node) = stack.pop()?;
        stack.extend(node.children.iter().rev().map(|c| (depth + 1, c)));
        Some((depth, node))
    })
}

pub fn count_nodes(roots: &[CommentNode]) -> usize {
    walk(roots).count()
}

/// Everything of a node except its children.
#[derive(Serialize)]
struct NodeFields<'a> {
    id: CommentId,
    content: &'a str,
    created_at: &'a str,
    parent_id: Option<CommentId>,
    author: &'a Author,
    #[serde(skip_serializing_if = "Option::is_none")]
    badge: Option<Badge>,
    likes: i64,
    dislikes: i64,
    pinned: bool,
    allow_replies: bool,
    allow_dislikes: bool,
}

impl<'a> From<&'a CommentNode> for NodeFields<'a> {
    fn from(node: &'a CommentNode) -> Self {
        NodeFields {
            id: node.id,
            content: &node.content,
            created_at: &node.created_at,
            parent_id: node.parent_id,
            author: &node.author,
            badge: node.badge,
            likes: node.likes,
            dislikes: node.dislikes,
            pinned: node.pinned,
            allow_replies: node.allow_replies,
            allow_dislikes: node.allow_dislikes,
        }
    }
}

enum Step<'a> {
    Open(&'a CommentNode),
    Separator,
    Close,
}

fn push_siblings<'a>(stack: &mut Vec<Step<'a>>, nodes: &'a [CommentNode]) {
    for (i, node) in nodes.iter().enumerate().rev() {
        stack.push(Step::Open(node));
        if i > 0 {
            stack.push(Step::Separator);
        }
    }
}

/// Writes a forest as a JSON array of nodes, each with a nested `children`
/// array. serde recurses once per nesting level, so the nesting is written
/// from an explicit stack and only the flat fields go through serde.
pub fn forest_json(roots: &[CommentNode]) -> Result<Vec<u8>, serde_json::Error> {
    let mut out = Vec::with_capacity(roots.len() * 256);
    let mut stack = vec![];

    out.push(b'[');
    push_siblings(&mut stack, roots);

    while let Some(step) = stack.pop() {
        match step {
            Step::Open(node) => {
                serde_json::to_writer(&mut out, &NodeFields::from(node))?;
                // Reopen the object to append the children
                out.pop();
                out.extend_from_slice(br#","children":["#);
                stack.push(Step::Close);
                push_siblings(&mut stack, &node.children);
            }
            Step::Separator => out.push(b','),
            Step::Close => out.extend_from_slice(b"]}"),
        }
    }

    out.push(b']');
    Ok(out)
}
