//! An order-statistic tree: a treap whose nodes also track subtree size,
//! giving O(log n) insert, remove, rank and select.

use rand::Rng;
use std::cmp::Ordering;

type Link<K> = Option<Box<Node<K>>>;

#[derive(Debug, Clone)]
struct Node<K> {
    key: K,
    priority: u32,
    size: usize,
    left: Link<K>,
    right: Link<K>,
}

fn size<K>(link: &Link<K>) -> usize {
    link.as_ref().map_or(0, |n| n.size)
}

fn update<K>(node: &mut Node<K>) {
    node.size = 1 + size(&node.left) + size(&node.right);
}

/// Split into (keys for which `goes_left` holds, the rest). `goes_left`
/// must hold for a prefix of the in-order sequence.
fn split<K, F: Fn(&K) -> bool>(link: Link<K>, goes_left: &F) -> (Link<K>, Link<K>) {
    match link {
        None => (None, None),
        Some(mut node) => {
            if goes_left(&node.key) {
                let (l, r) = split(node.right.take(), goes_left);
                node.right = l;
                update(&mut node);
                (Some(node), r)
            } else {
                let (l, r) = split(node.left.take(), goes_left);
                node.left = r;
                update(&mut node);
                (l, Some(node))
            }
        }
    }
}

/// Join two treaps where every key in `a` precedes every key in `b`.
fn merge<K>(a: Link<K>, b: Link<K>) -> Link<K> {
    match (a, b) {
        (None, b) => b,
        (a, None) => a,
        (Some(mut a), Some(mut b)) => {
            if a.priority > b.priority {
                a.right = merge(a.right.take(), Some(b));
                update(&mut a);
                Some(a)
            } else {
                b.left = merge(Some(a), b.left.take());
                update(&mut b);
                Some(b)
            }
        }
    }
}

#[derive(Debug, Clone)]
pub struct OrderTree<K> {
    root: Link<K>,
}

impl<K> Default for OrderTree<K> {
    fn default() -> Self {
        OrderTree { root: None }
    }
}

impl<K: Ord> OrderTree<K> {
    pub fn new() -> Self {
        OrderTree { root: None }
    }

    pub fn len(&self) -> usize {
        size(&self.root)
    }

    pub fn is_empty(&self) -> bool {
        self.root.is_none()
    }

    /// Insert a key that is not already present.
    pub fn insert(&mut self, key: K) {
        let (left, right) = split(self.root.take(), &|k: &K| k < &key);
        let node = Box::new(Node {
            key,
            priority: rand::thread_rng().r#gen(),
            size: 1,
            left: None,
            right: None,
        });
        self.root = merge(merge(left, Some(node)), right);
    }

    pub fn remove(&mut self, key: &K) -> bool {
        let (left, rest) = split(self.root.take(), &|k: &K| k < key);
        let (found, right) = split(rest, &|k: &K| k == key);
        self.root = merge(left, right);
        found.is_some()
    }

    /// Number of keys strictly less than `key`.
    pub fn rank(&self, key: &K) -> usize {
        self.count_while(|k| k < key)
    }

    /// Number of leading keys satisfying `pred`, which must hold for a
    /// prefix of the sequence and fail for the rest.
    pub fn count_while(&self, pred: impl Fn(&K) -> bool) -> usize {
        let mut count = 0;
        let mut node = self.root.as_deref();
        while let Some(n) = node {
            if pred(&n.key) {
                count += size(&n.left) + 1;
                node = n.right.as_deref();
            } else {
                node = n.left.as_deref();
            }
        }
        count
    }

    /// The key at 0-based position `index`.
    pub fn select(&self, mut index: usize) -> Option<&K> {
        let mut node = self.root.as_deref();
        while let Some(n) = node {
            let left = size(&n.left);
            match index.cmp(&left) {
                Ordering::Less => node = n.left.as_deref(),
                Ordering::Equal => return Some(&n.key),
                Ordering::Greater => {
                    index -= left + 1;
                    node = n.right.as_deref();
                }
            }
        }
        None
    }

    pub fn iter(&self) -> Iter<'_, K> {
        self.iter_from(0)
    }

    /// Ascending iteration starting at position `rank`.
    pub fn iter_from(&self, rank: usize) -> Iter<'_, K> {
        Iter::seek(self.root.as_deref(), rank, false)
    }

    /// Descending iteration starting at position `rank` (counted from the
    /// front) and moving toward the first key.
    pub fn iter_rev_from(&self, rank: usize) -> Iter<'_, K> {
        Iter::seek(self.root.as_deref(), rank, true)
    }
}

/// In-order traversal with an explicit stack. The top of the stack is
/// always the next node to yield.
pub struct Iter<'a, K> {
    stack: Vec<&'a Node<K>>,
    reverse: bool,
}

impl<'a, K> Iter<'a, K> {
    fn seek(mut node: Option<&'a Node<K>>, mut rank: usize, reverse: bool) -> Self {
        let mut stack = Vec::new();
        while let Some(n) = node {
            let left = size(&n.left);
            match rank.cmp(&left) {
                Ordering::Equal => {
                    stack.push(n);
                    break;
                }
                Ordering::Less => {
                    if !reverse {
                        stack.push(n);
                    }
                    node = n.left.as_deref();
                }
                Ordering::Greater => {
                    if reverse {
                        stack.push(n);
                    }
                    rank -= left + 1;
                    node = n.right.as_deref();
                }
            }
        }
        Iter { stack, reverse }
    }
}

impl<'a, K> Iterator for Iter<'a, K> {
    type Item = &'a K;

    fn next(&mut self) -> Option<&'a K> {
        let node = self.stack.pop()?;
        let mut child = if self.reverse {
            node.left.as_deref()
        } else {
            node.right.as_deref()
        };
        while let Some(c) = child {
            self.stack.push(c);
            child = if self.reverse {
                c.right.as_deref()
            } else {
                c.left.as_deref()
            };
        }
        Some(&node.key)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tree_of(keys: &[i32]) -> OrderTree<i32> {
        let mut t = OrderTree::new();
        for &k in keys {
            t.insert(k);
        }
        t
    }

    #[test]
    fn test_insert_keeps_order() {
        let t = tree_of(&[5, 1, 9, 3, 7]);
        assert_eq!(t.iter().copied().collect::<Vec<_>>(), vec![1, 3, 5, 7, 9]);
        assert_eq!(t.len(), 5);
    }

    #[test]
    fn test_rank_and_select() {
        let t = tree_of(&[10, 20, 30, 40]);
        assert_eq!(t.rank(&30), 2);
        assert_eq!(t.rank(&25), 2);
        assert_eq!(t.select(0), Some(&10));
        assert_eq!(t.select(3), Some(&40));
        assert_eq!(t.select(4), None);
    }

    #[test]
    fn test_remove() {
        let mut t = tree_of(&[1, 2, 3]);
        assert!(t.remove(&2));
        assert!(!t.remove(&2));
        assert_eq!(t.iter().copied().collect::<Vec<_>>(), vec![1, 3]);
        assert_eq!(t.len(), 2);
    }

    #[test]
    fn test_iter_from_rank() {
        let t = tree_of(&(0..100).collect::<Vec<_>>());
        assert_eq!(t.iter_from(95).copied().collect::<Vec<_>>(), vec![95, 96, 97, 98, 99]);
        assert_eq!(t.iter_rev_from(3).copied().collect::<Vec<_>>(), vec![3, 2, 1, 0]);
        assert_eq!(t.iter_from(100).count(), 0);
    }

    #[test]
    fn test_count_while() {
        let t = tree_of(&[1, 2, 3, 4, 5]);
        assert_eq!(t.count_while(|&k| k <= 3), 3);
        assert_eq!(t.count_while(|_| false), 0);
        assert_eq!(t.count_while(|_| true), 5);
    }

    #[test]
    fn test_large_random_workload() {
        use rand::seq::SliceRandom;
        let mut keys: Vec<i32> = (0..2000).collect();
        keys.shuffle(&mut rand::thread_rng());
        let mut t = tree_of(&keys);
        for k in (0..2000).step_by(2) {
            assert!(t.remove(&k));
        }
        let expected: Vec<i32> = (0..2000).filter(|k| k % 2 == 1).collect();
        assert_eq!(t.iter().copied().collect::<Vec<_>>(), expected);
        assert_eq!(t.rank(&1001), 500);
    }
}
