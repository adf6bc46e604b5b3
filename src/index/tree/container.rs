//! The ordered container: a balanced tree of extent-backed nodes supporting
//! bound searches, path-shaped positions, deterministic sampling, and O(n)
//! bulk load.
//!
//! All searches take an ordering probe (a closure returning the ordering of a
//! stored element relative to the search target), so the container never
//! needs to know whether elements are hinted, what a key part is, or how ties
//! break. Mutating operations reserve their worst-case extent count before
//! touching anything, which keeps a failed allocation from leaving the
//! container partially changed.

use std::cmp::Ordering;

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use smallvec::SmallVec;

use super::extent::{ExtentAllocator, ExtentId, ExtentPool};
use crate::types::Result;

/// Maximum elements per node; one node occupies one extent.
pub(crate) const FANOUT: usize = 16;
/// Nodes below this fill borrow from or merge with a sibling.
const MIN_FILL: usize = FANOUT / 2;

/// One tree node. Inner nodes pair each child with a copy of the child
/// subtree's maximum element.
#[derive(Clone)]
pub(crate) enum Node<E> {
    Inner {
        keys: Vec<E>,
        children: Vec<ExtentId>,
    },
    Leaf {
        entries: Vec<E>,
    },
}

/// A position inside the tree: the descent path from the root to one leaf
/// slot. The empty path doubles as the invalid/end position. Positions are
/// plain data; they hold no borrow and may be kept across arbitrary tree
/// mutations, at the price of having to be validated before use.
#[derive(Clone, Debug, Default)]
pub struct TreePos {
    steps: SmallVec<[(ExtentId, usize); 8]>,
}

impl TreePos {
    /// The invalid (end) position.
    pub fn invalid() -> Self {
        Self::default()
    }

    /// Whether the position points anywhere at all.
    pub fn is_valid(&self) -> bool {
        !self.steps.is_empty()
    }
}

/// Balanced ordered container over extent-backed nodes.
pub struct Tree<E> {
    pool: ExtentPool<Node<E>>,
    root: Option<ExtentId>,
    height: usize,
    count: usize,
}

impl<E: Clone> Tree<E> {
    /// Creates an empty tree drawing extents from `allocator`.
    pub fn new(allocator: std::sync::Arc<dyn ExtentAllocator>) -> Self {
        Self {
            pool: ExtentPool::new(allocator),
            root: None,
            height: 0,
            count: 0,
        }
    }

    /// Number of live elements.
    pub fn len(&self) -> usize {
        self.count
    }

    /// Whether the tree holds no elements.
    pub fn is_empty(&self) -> bool {
        self.count == 0
    }

    /// Bytes held in extents, including those pinned by frozen readers.
    pub fn bytes_used(&self) -> usize {
        self.pool.bytes_used()
    }

    /// Position of the smallest element.
    pub fn first_pos(&self) -> TreePos {
        match self.root {
            Some(root) => TreePos {
                steps: self.descend_left(SmallVec::new(), root),
            },
            None => TreePos::invalid(),
        }
    }

    /// Position of the largest element.
    pub fn last_pos(&self) -> TreePos {
        match self.root {
            Some(root) => TreePos {
                steps: self.descend_right(SmallVec::new(), root),
            },
            None => TreePos::invalid(),
        }
    }

    /// Leftmost insertion point for the probe target: the position of the
    /// first element ordering `>=` the target, with `exact` reporting
    /// whether an equal element was found there.
    pub fn lower_bound<F>(&self, f: &F) -> (TreePos, bool)
    where
        F: Fn(&E) -> Ordering,
    {
        let mut steps = SmallVec::new();
        let Some(mut id) = self.root else {
            return (TreePos::invalid(), false);
        };
        loop {
            match self.node(id) {
                Node::Inner { keys, children } => {
                    let idx = keys.partition_point(|k| f(k) == Ordering::Less);
                    if idx == children.len() {
                        return (TreePos::invalid(), false);
                    }
                    steps.push((id, idx));
                    id = children[idx];
                }
                Node::Leaf { entries } => {
                    let idx = entries.partition_point(|e| f(e) == Ordering::Less);
                    if idx == entries.len() {
                        return (TreePos::invalid(), false);
                    }
                    let exact = f(&entries[idx]) == Ordering::Equal;
                    steps.push((id, idx));
                    return (TreePos { steps }, exact);
                }
            }
        }
    }

    /// Rightmost insertion point: the position of the first element ordering
    /// strictly `>` the target. `exact` reports whether an equal element
    /// exists anywhere before that position.
    pub fn upper_bound<F>(&self, f: &F) -> (TreePos, bool)
    where
        F: Fn(&E) -> Ordering,
    {
        let mut steps = SmallVec::new();
        let mut exact = false;
        let Some(mut id) = self.root else {
            return (TreePos::invalid(), false);
        };
        loop {
            match self.node(id) {
                Node::Inner { keys, children } => {
                    let idx = keys.partition_point(|k| f(k) != Ordering::Greater);
                    if idx > 0 && f(&keys[idx - 1]) == Ordering::Equal {
                        exact = true;
                    }
                    if idx == children.len() {
                        return (TreePos::invalid(), exact);
                    }
                    steps.push((id, idx));
                    id = children[idx];
                }
                Node::Leaf { entries } => {
                    let idx = entries.partition_point(|e| f(e) != Ordering::Greater);
                    if idx > 0 && f(&entries[idx - 1]) == Ordering::Equal {
                        exact = true;
                    }
                    if idx == entries.len() {
                        return (TreePos::invalid(), exact);
                    }
                    steps.push((id, idx));
                    return (TreePos { steps }, exact);
                }
            }
        }
    }

    /// Exact lookup: the element comparing equal to the probe target.
    pub fn find<F>(&self, f: &F) -> Option<&E>
    where
        F: Fn(&E) -> Ordering,
    {
        let (pos, exact) = self.lower_bound(f);
        if exact {
            self.entry_at(&pos)
        } else {
            None
        }
    }

    /// The element at `pos`, provided the position still describes the live
    /// structure: every step must name a live extent whose child pointer
    /// still matches the next step. Any mismatch yields `None`, which is how
    /// iterators detect staleness after intervening mutations.
    pub fn entry_at(&self, pos: &TreePos) -> Option<&E> {
        let steps = &pos.steps;
        let (&(first, _), &(leaf, slot)) = (steps.first()?, steps.last()?);
        if Some(first) != self.root || steps.len() != self.height {
            return None;
        }
        for window in 0..steps.len() - 1 {
            let (id, idx) = steps[window];
            match self.pool.get_live(id)? {
                Node::Inner { children, .. } => {
                    if children.get(idx) != Some(&steps[window + 1].0) {
                        return None;
                    }
                }
                Node::Leaf { .. } => return None,
            }
        }
        match self.pool.get_live(leaf)? {
            Node::Leaf { entries } => entries.get(slot),
            Node::Inner { .. } => None,
        }
    }

    /// Position one step forward in the order. `pos` must have been
    /// validated via [`Tree::entry_at`] on the current structure.
    pub fn next_pos(&self, pos: &TreePos) -> TreePos {
        if !pos.is_valid() {
            return TreePos::invalid();
        }
        let mut steps = pos.steps.clone();
        let &(leaf, slot) = steps.last().expect("valid position");
        if slot + 1 < self.node_len(leaf) {
            steps.last_mut().expect("valid position").1 = slot + 1;
            return TreePos { steps };
        }
        steps.pop();
        while let Some(&(id, idx)) = steps.last() {
            if idx + 1 < self.node_len(id) {
                steps.last_mut().expect("inner step").1 = idx + 1;
                let child = self.child_of(id, idx + 1);
                return TreePos {
                    steps: self.descend_left(steps, child),
                };
            }
            steps.pop();
        }
        TreePos::invalid()
    }

    /// Position one step backward in the order. Stepping back from the
    /// invalid position yields the last element, which is exactly what a
    /// descending scan needs after an upper-bound search ran off the end.
    pub fn prev_pos(&self, pos: &TreePos) -> TreePos {
        if !pos.is_valid() {
            return self.last_pos();
        }
        let mut steps = pos.steps.clone();
        let &(_, slot) = steps.last().expect("valid position");
        if slot > 0 {
            steps.last_mut().expect("valid position").1 = slot - 1;
            return TreePos { steps };
        }
        steps.pop();
        while let Some(&(id, idx)) = steps.last() {
            if idx > 0 {
                steps.last_mut().expect("inner step").1 = idx - 1;
                let child = self.child_of(id, idx - 1);
                return TreePos {
                    steps: self.descend_right(steps, child),
                };
            }
            steps.pop();
        }
        TreePos::invalid()
    }

    /// An arbitrary element chosen by a seed-deterministic descent; `None`
    /// on an empty tree.
    pub fn random(&self, seed: u64) -> Option<&E> {
        let mut id = self.root?;
        let mut rng = StdRng::seed_from_u64(seed);
        loop {
            match self.node(id) {
                Node::Inner { children, .. } => {
                    id = children[rng.gen_range(0..children.len())];
                }
                Node::Leaf { entries } => {
                    return entries.get(rng.gen_range(0..entries.len()));
                }
            }
        }
    }

    /// Grants the worst case one replace cycle can consume: the optimistic
    /// insert with its splits and copy-on-write, a rollback delete plus
    /// reinsert of the displaced element, and the removal of a superseded
    /// element. Every mutation inside the cycle then draws from the
    /// reservation, so none of them can fail after the first node changes.
    /// Leftover grants are returned by [`Tree::release_reserved`].
    pub fn reserve_for_replace(&mut self, inserting: bool) -> Result<()> {
        let n = match (inserting, self.pool.has_frozen()) {
            (true, true) => 8 * self.height + 8,
            (true, false) => 2 * self.height + 3,
            (false, true) => 2 * self.height + 2,
            (false, false) => 0,
        };
        self.pool.reserve(n, "replace")
    }

    /// Returns grants left over from [`Tree::reserve_for_replace`].
    pub fn release_reserved(&mut self) {
        self.pool.release_reservation();
    }

    /// Inserts `entry`, displacing and returning any element that compares
    /// equal under the probe. On allocation failure the tree is unchanged.
    /// Unconsumed grants stay reserved for the caller to release.
    pub fn insert<F>(&mut self, entry: E, f: &F) -> Result<Option<E>>
    where
        F: Fn(&E) -> Ordering,
    {
        // Worst case: a split at every level plus a new root, plus a
        // copy-on-write of the whole descent path when a freeze is active.
        let cow = if self.pool.has_frozen() {
            self.height
        } else {
            0
        };
        self.pool.reserve(cow + self.height + 1, "insert")?;
        self.insert_inner(entry, f)
    }

    /// Removes and returns the element comparing equal under the probe;
    /// `None` (not an error) when absent.
    pub fn delete<F>(&mut self, f: &F) -> Result<Option<E>>
    where
        F: Fn(&E) -> Ordering,
    {
        // Deletions allocate nothing themselves; only copy-on-write of the
        // descent path and one rebalancing sibling per level needs extents.
        if self.pool.has_frozen() {
            self.pool.reserve(2 * self.height, "delete")?;
        }
        self.delete_inner(f)
    }

    /// Replaces the contents of an empty tree with a pre-sorted element
    /// array, building nodes level by level. Ordering and tie placement are
    /// the caller's responsibility; the array order is preserved verbatim.
    pub fn bulk_load(&mut self, entries: Vec<E>) -> Result<()> {
        assert!(self.root.is_none(), "bulk load into a non-empty container");
        if entries.is_empty() {
            return Ok(());
        }
        let total = entries.len();
        let mut built: Vec<ExtentId> = Vec::new();
        match self.bulk_levels(entries, &mut built) {
            Ok((root, height)) => {
                self.root = Some(root);
                self.height = height;
                self.count = total;
                Ok(())
            }
            Err(err) => {
                for id in built {
                    self.pool.retire(id);
                }
                Err(err)
            }
        }
    }

    /// Freezes the current structure for a snapshot reader: returns the
    /// frozen root and generation. Until [`Tree::thaw`] is called with that
    /// generation, nodes reachable from the frozen root are copied before
    /// mutation and never physically reclaimed.
    pub fn freeze(&mut self) -> (Option<ExtentId>, u64) {
        (self.root, self.pool.freeze())
    }

    /// Releases a frozen generation and reclaims whatever it alone pinned.
    pub fn thaw(&mut self, generation: u64) {
        self.pool.thaw(generation);
    }

    /// Read access for frozen traversals; sees retired nodes.
    pub(crate) fn frozen_node(&self, id: ExtentId) -> Option<&Node<E>> {
        self.pool.get_any(id)
    }

    fn insert_inner<F>(&mut self, entry: E, f: &F) -> Result<Option<E>>
    where
        F: Fn(&E) -> Ordering,
    {
        let Some(root_old) = self.root else {
            let root = self.pool.alloc(
                Node::Leaf {
                    entries: vec![entry],
                },
                "insert",
            )?;
            self.root = Some(root);
            self.height = 1;
            self.count = 1;
            return Ok(None);
        };
        let root = self.pool.make_mut(root_old, "insert")?;
        self.root = Some(root);
        let (dup, split) = self.insert_rec(root, entry, f)?;
        if let Some(right) = split {
            let left_max = self.node_max(root);
            let right_max = self.node_max(right);
            let new_root = self.pool.alloc(
                Node::Inner {
                    keys: vec![left_max, right_max],
                    children: vec![root, right],
                },
                "insert",
            )?;
            self.root = Some(new_root);
            self.height += 1;
        }
        if dup.is_none() {
            self.count += 1;
        }
        Ok(dup)
    }

    fn insert_rec<F>(&mut self, id: ExtentId, entry: E, f: &F) -> Result<(Option<E>, Option<ExtentId>)>
    where
        F: Fn(&E) -> Ordering,
    {
        if matches!(self.node(id), Node::Leaf { .. }) {
            let (dup, spilled) = {
                let Node::Leaf { entries } = self.pool.node_mut(id) else {
                    unreachable!("leaf checked above")
                };
                let idx = entries.partition_point(|e| f(e) == Ordering::Less);
                if idx < entries.len() && f(&entries[idx]) == Ordering::Equal {
                    (Some(std::mem::replace(&mut entries[idx], entry)), None)
                } else {
                    entries.insert(idx, entry);
                    if entries.len() > FANOUT {
                        let right = entries.split_off(entries.len() / 2);
                        (None, Some(right))
                    } else {
                        (None, None)
                    }
                }
            };
            let split = match spilled {
                Some(right) => Some(self.pool.alloc(Node::Leaf { entries: right }, "insert")?),
                None => None,
            };
            return Ok((dup, split));
        }

        let (child_old, idx) = {
            let Node::Inner { keys, children } = self.node(id) else {
                unreachable!("inner checked above")
            };
            let mut idx = keys.partition_point(|k| f(k) == Ordering::Less);
            if idx == children.len() {
                idx = children.len() - 1;
            }
            (children[idx], idx)
        };
        let child = self.pool.make_mut(child_old, "insert")?;
        if child != child_old {
            self.set_child(id, idx, child);
        }
        let (dup, child_split) = self.insert_rec(child, entry, f)?;
        let child_max = self.node_max(child);
        self.set_key(id, idx, child_max);

        let mut split = None;
        if let Some(right_child) = child_split {
            let right_max = self.node_max(right_child);
            let spilled = {
                let Node::Inner { keys, children } = self.pool.node_mut(id) else {
                    unreachable!("inner checked above")
                };
                keys.insert(idx + 1, right_max);
                children.insert(idx + 1, right_child);
                if children.len() > FANOUT {
                    let half = children.len() / 2;
                    Some((keys.split_off(half), children.split_off(half)))
                } else {
                    None
                }
            };
            if let Some((rk, rc)) = spilled {
                split = Some(self.pool.alloc(
                    Node::Inner {
                        keys: rk,
                        children: rc,
                    },
                    "insert",
                )?);
            }
        }
        Ok((dup, split))
    }

    fn delete_inner<F>(&mut self, f: &F) -> Result<Option<E>>
    where
        F: Fn(&E) -> Ordering,
    {
        let Some(root_old) = self.root else {
            return Ok(None);
        };
        let root = self.pool.make_mut(root_old, "delete")?;
        self.root = Some(root);
        let removed = self.delete_rec(root, f)?;
        if removed.is_some() {
            self.count -= 1;
            self.collapse_root();
        }
        Ok(removed)
    }

    fn delete_rec<F>(&mut self, id: ExtentId, f: &F) -> Result<Option<E>>
    where
        F: Fn(&E) -> Ordering,
    {
        if matches!(self.node(id), Node::Leaf { .. }) {
            let Node::Leaf { entries } = self.pool.node_mut(id) else {
                unreachable!("leaf checked above")
            };
            let idx = entries.partition_point(|e| f(e) == Ordering::Less);
            if idx < entries.len() && f(&entries[idx]) == Ordering::Equal {
                return Ok(Some(entries.remove(idx)));
            }
            return Ok(None);
        }

        let descent = {
            let Node::Inner { keys, children } = self.node(id) else {
                unreachable!("inner checked above")
            };
            let idx = keys.partition_point(|k| f(k) == Ordering::Less);
            children.get(idx).map(|&child| (child, idx))
        };
        let Some((child_old, idx)) = descent else {
            // Target orders past every element in this subtree.
            return Ok(None);
        };
        let child = self.pool.make_mut(child_old, "delete")?;
        if child != child_old {
            self.set_child(id, idx, child);
        }
        let removed = self.delete_rec(child, f)?;
        if removed.is_some() {
            let child_max = self.node_max(child);
            self.set_key(id, idx, child_max);
            if self.node_len(child) < MIN_FILL {
                self.rebalance_child(id, idx)?;
            }
        }
        Ok(removed)
    }

    fn rebalance_child(&mut self, parent: ExtentId, idx: usize) -> Result<()> {
        let (left, right) = {
            let Node::Inner { children, .. } = self.node(parent) else {
                unreachable!("parent is inner")
            };
            (
                idx.checked_sub(1).map(|i| children[i]),
                children.get(idx + 1).copied(),
            )
        };
        if let Some(l) = left {
            if self.node_len(l) > MIN_FILL {
                return self.borrow_from_left(parent, idx);
            }
        }
        if let Some(r) = right {
            if self.node_len(r) > MIN_FILL {
                return self.borrow_from_right(parent, idx);
            }
        }
        if left.is_some() {
            self.merge_into_left(parent, idx)
        } else if right.is_some() {
            self.merge_from_right(parent, idx)
        } else {
            // Root with a single child; collapse_root handles it.
            Ok(())
        }
    }

    fn borrow_from_left(&mut self, parent: ExtentId, idx: usize) -> Result<()> {
        let (left_old, child) = {
            let Node::Inner { children, .. } = self.node(parent) else {
                unreachable!("parent is inner")
            };
            (children[idx - 1], children[idx])
        };
        let left = self.pool.make_mut(left_old, "delete")?;
        if left != left_old {
            self.set_child(parent, idx - 1, left);
        }
        match self.pool.node_mut(left) {
            Node::Leaf { entries } => {
                let moved = entries.pop().expect("donor leaf is above minimum fill");
                let Node::Leaf { entries } = self.pool.node_mut(child) else {
                    unreachable!("siblings share a level")
                };
                entries.insert(0, moved);
            }
            Node::Inner { keys, children } => {
                let moved_key = keys.pop().expect("donor inner is above minimum fill");
                let moved_child = children.pop().expect("donor inner is above minimum fill");
                let Node::Inner { keys, children } = self.pool.node_mut(child) else {
                    unreachable!("siblings share a level")
                };
                keys.insert(0, moved_key);
                children.insert(0, moved_child);
            }
        }
        let left_max = self.node_max(left);
        self.set_key(parent, idx - 1, left_max);
        let child_max = self.node_max(child);
        self.set_key(parent, idx, child_max);
        Ok(())
    }

    fn borrow_from_right(&mut self, parent: ExtentId, idx: usize) -> Result<()> {
        let (right_old, child) = {
            let Node::Inner { children, .. } = self.node(parent) else {
                unreachable!("parent is inner")
            };
            (children[idx + 1], children[idx])
        };
        let right = self.pool.make_mut(right_old, "delete")?;
        if right != right_old {
            self.set_child(parent, idx + 1, right);
        }
        match self.pool.node_mut(right) {
            Node::Leaf { entries } => {
                let moved = entries.remove(0);
                let Node::Leaf { entries } = self.pool.node_mut(child) else {
                    unreachable!("siblings share a level")
                };
                entries.push(moved);
            }
            Node::Inner { keys, children } => {
                let moved_key = keys.remove(0);
                let moved_child = children.remove(0);
                let Node::Inner { keys, children } = self.pool.node_mut(child) else {
                    unreachable!("siblings share a level")
                };
                keys.push(moved_key);
                children.push(moved_child);
            }
        }
        let child_max = self.node_max(child);
        self.set_key(parent, idx, child_max);
        Ok(())
    }

    fn merge_into_left(&mut self, parent: ExtentId, idx: usize) -> Result<()> {
        let (left_old, child) = {
            let Node::Inner { children, .. } = self.node(parent) else {
                unreachable!("parent is inner")
            };
            (children[idx - 1], children[idx])
        };
        let left = self.pool.make_mut(left_old, "delete")?;
        if left != left_old {
            self.set_child(parent, idx - 1, left);
        }
        self.append_contents(child, left);
        self.pool.retire(child);
        {
            let Node::Inner { keys, children } = self.pool.node_mut(parent) else {
                unreachable!("parent is inner")
            };
            keys.remove(idx);
            children.remove(idx);
        }
        let left_max = self.node_max(left);
        self.set_key(parent, idx - 1, left_max);
        Ok(())
    }

    fn merge_from_right(&mut self, parent: ExtentId, idx: usize) -> Result<()> {
        let (right, child) = {
            let Node::Inner { children, .. } = self.node(parent) else {
                unreachable!("parent is inner")
            };
            (children[idx + 1], children[idx])
        };
        self.append_contents(right, child);
        self.pool.retire(right);
        {
            let Node::Inner { keys, children } = self.pool.node_mut(parent) else {
                unreachable!("parent is inner")
            };
            keys.remove(idx + 1);
            children.remove(idx + 1);
        }
        let child_max = self.node_max(child);
        self.set_key(parent, idx, child_max);
        Ok(())
    }

    /// Appends the contents of `src` onto the back of `dst` (same level).
    fn append_contents(&mut self, src: ExtentId, dst: ExtentId) {
        let cloned = self.node(src).clone();
        match (self.pool.node_mut(dst), cloned) {
            (Node::Leaf { entries }, Node::Leaf { entries: more }) => {
                entries.extend(more);
            }
            (
                Node::Inner { keys, children },
                Node::Inner {
                    keys: more_keys,
                    children: more_children,
                },
            ) => {
                keys.extend(more_keys);
                children.extend(more_children);
            }
            _ => unreachable!("siblings share a level"),
        }
    }

    fn collapse_root(&mut self) {
        loop {
            let Some(root) = self.root else { return };
            enum Fix {
                Promote(ExtentId),
                DropEmpty,
                Keep,
            }
            let fix = match self.node(root) {
                Node::Inner { children, .. } if children.len() == 1 => Fix::Promote(children[0]),
                Node::Leaf { entries } if entries.is_empty() => Fix::DropEmpty,
                _ => Fix::Keep,
            };
            match fix {
                Fix::Promote(child) => {
                    self.pool.retire(root);
                    self.root = Some(child);
                    self.height -= 1;
                }
                Fix::DropEmpty => {
                    self.pool.retire(root);
                    self.root = None;
                    self.height = 0;
                    return;
                }
                Fix::Keep => return,
            }
        }
    }

    fn bulk_levels(&mut self, entries: Vec<E>, built: &mut Vec<ExtentId>) -> Result<(ExtentId, usize)> {
        let mut level: Vec<ExtentId> = Vec::new();
        for chunk in even_chunks(entries) {
            let id = self.pool.alloc(Node::Leaf { entries: chunk }, "build")?;
            built.push(id);
            level.push(id);
        }
        let mut height = 1;
        while level.len() > 1 {
            let mut next = Vec::new();
            for children in even_chunks(level) {
                let keys = children.iter().map(|&c| self.node_max(c)).collect();
                let id = self.pool.alloc(Node::Inner { keys, children }, "build")?;
                built.push(id);
                next.push(id);
            }
            level = next;
            height += 1;
        }
        Ok((level[0], height))
    }

    fn node(&self, id: ExtentId) -> &Node<E> {
        self.pool.get_live(id).expect("live node")
    }

    fn node_len(&self, id: ExtentId) -> usize {
        match self.node(id) {
            Node::Inner { children, .. } => children.len(),
            Node::Leaf { entries } => entries.len(),
        }
    }

    fn node_max(&self, id: ExtentId) -> E {
        match self.node(id) {
            Node::Inner { keys, .. } => keys.last().expect("non-empty inner").clone(),
            Node::Leaf { entries } => entries.last().expect("non-empty leaf").clone(),
        }
    }

    fn child_of(&self, id: ExtentId, idx: usize) -> ExtentId {
        match self.node(id) {
            Node::Inner { children, .. } => children[idx],
            Node::Leaf { .. } => unreachable!("leaf has no children"),
        }
    }

    fn set_child(&mut self, id: ExtentId, idx: usize, child: ExtentId) {
        let Node::Inner { children, .. } = self.pool.node_mut(id) else {
            unreachable!("inner expected")
        };
        children[idx] = child;
    }

    fn set_key(&mut self, id: ExtentId, idx: usize, key: E) {
        let Node::Inner { keys, .. } = self.pool.node_mut(id) else {
            unreachable!("inner expected")
        };
        keys[idx] = key;
    }

    fn descend_left(
        &self,
        mut steps: SmallVec<[(ExtentId, usize); 8]>,
        mut id: ExtentId,
    ) -> SmallVec<[(ExtentId, usize); 8]> {
        loop {
            match self.node(id) {
                Node::Inner { children, .. } => {
                    steps.push((id, 0));
                    id = children[0];
                }
                Node::Leaf { .. } => {
                    steps.push((id, 0));
                    return steps;
                }
            }
        }
    }

    fn descend_right(
        &self,
        mut steps: SmallVec<[(ExtentId, usize); 8]>,
        mut id: ExtentId,
    ) -> SmallVec<[(ExtentId, usize); 8]> {
        loop {
            match self.node(id) {
                Node::Inner { children, .. } => {
                    steps.push((id, children.len() - 1));
                    id = children[children.len() - 1];
                }
                Node::Leaf { entries } => {
                    steps.push((id, entries.len() - 1));
                    return steps;
                }
            }
        }
    }
}

/// Splits `items` into contiguous chunks of at most `FANOUT` elements with
/// sizes as even as possible, so no node starts below half fill.
fn even_chunks<T>(items: Vec<T>) -> Vec<Vec<T>> {
    let total = items.len();
    let node_count = total.div_ceil(FANOUT);
    let base = total / node_count;
    let extra = total % node_count;
    let mut iter = items.into_iter();
    (0..node_count)
        .map(|i| {
            let take = base + usize::from(i < extra);
            iter.by_ref().take(take).collect()
        })
        .collect()
}
