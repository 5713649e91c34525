//! Depth-first helpers for nested `children` payloads

/// A node that owns an ordered list of child nodes.
pub trait TreeNode: Sized {
    fn children(&self) -> &[Self];
}

/// First node (pre-order, depth-first) matching `predicate`.
pub fn find<'a, T, P>(roots: &'a [T], mut predicate: P) -> Option<&'a T>
where
    T: TreeNode,
    P: FnMut(&T) -> bool,
{
    let mut stack: Vec<&'a T> = roots.iter().rev().collect();
    while let Some(node) = stack.pop() {
        if predicate(node) {
            return Some(node);
        }
        stack.extend(node.children().iter().rev());
    }
    None
}

/// Visit every node in pre-order along with its depth (roots are depth 0).
pub fn walk<'a, T, F>(roots: &'a [T], mut visit: F)
where
    T: TreeNode,
    F: FnMut(&'a T, usize),
{
    let mut stack: Vec<(&'a T, usize)> = roots.iter().rev().map(|n| (n, 0)).collect();
    while let Some((node, depth)) = stack.pop() {
        visit(node, depth);
        stack.extend(node.children().iter().rev().map(|c| (c, depth + 1)));
    }
}
