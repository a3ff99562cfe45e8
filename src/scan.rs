//! Stateless cursors for SCAN, HSCAN and ZSCAN.
//!
//! Every element has a fixed position: the 64-bit hash of its name. A page
//! holds the elements whose position is at or past the cursor, in position
//! order, and the returned cursor is the position of the first element left
//! out. Positions depend only on names, so an element present for a whole
//! scan is returned exactly once however the collection is rearranged, and
//! a cursor from a scan over a changing collection can never loop.

use std::collections::hash_map::DefaultHasher;
use std::hash::Hasher;

/// Position of an element name in scan order.
pub fn position(name: &[u8]) -> u64 {
    let mut hasher = DefaultHasher::new();
    hasher.write(name);
    hasher.finish()
}

/// Select one page of `items`.
///
/// At least `count` elements are returned when that many remain; elements
/// sharing a position are never split across pages. Returns the next cursor
/// (0 when the scan is complete) and the page.
pub fn page<T>(items: impl IntoIterator<Item = T>, name: impl Fn(&T) -> &[u8], cursor: u64, count: usize) -> (u64, Vec<T>) {
    let remaining: Vec<(u64, T)> = items
        .into_iter()
        .map(|item| (position(name(&item)), item))
        .filter(|(pos, _)| *pos >= cursor)
        .collect();
    page_positioned(remaining, name, count)
}

/// Like [`page`], for elements already tagged with their position and
/// filtered to those at or past the cursor.
///
/// Only the page itself is sorted; the rest is partitioned around the
/// `count`-th smallest position.
pub fn page_positioned<T>(mut remaining: Vec<(u64, T)>, name: impl Fn(&T) -> &[u8], count: usize) -> (u64, Vec<T>) {
    let order = |(a, x): &(u64, T), (b, y): &(u64, T)| a.cmp(b).then_with(|| name(x).cmp(name(y)));
    let count = count.max(1);

    let mut next = 0;
    if remaining.len() > count {
        remaining.select_nth_unstable_by(count - 1, order);
        let last = remaining[count - 1].0;
        let tail = remaining.split_off(count);
        let mut after: Option<u64> = None;
        for (pos, item) in tail {
            if pos == last {
                remaining.push((pos, item));
            } else {
                after = Some(after.map_or(pos, |a| a.min(pos)));
            }
        }
        next = after.unwrap_or(0);
    }

    remaining.sort_unstable_by(order);
    (next, remaining.into_iter().map(|(_, item)| item).collect())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    fn names(n: usize) -> Vec<String> {
        (0..n).map(|i| format!("key:{i}")).collect()
    }

    #[test]
    fn test_full_scan_visits_everything_once() {
        let all = names(1000);
        let mut seen = Vec::new();
        let mut cursor = 0;
        loop {
            let (next, items) = page(all.clone(), |s| s.as_bytes(), cursor, 17);
            seen.extend(items);
            if next == 0 {
                break;
            }
            cursor = next;
        }
        assert_eq!(seen.len(), 1000);
        let unique: HashSet<_> = seen.into_iter().collect();
        assert_eq!(unique.len(), 1000);
    }

    #[test]
    fn test_single_page_when_count_covers_everything() {
        let (next, items) = page(names(5), |s| s.as_bytes(), 0, 10);
        assert_eq!(next, 0);
        assert_eq!(items.len(), 5);
    }

    #[test]
    fn test_survivors_seen_after_concurrent_removal() {
        let all = names(100);
        let (cursor, first) = page(all.clone(), |s| s.as_bytes(), 0, 10);
        // Drop everything already returned plus a few unseen elements.
        let removed: HashSet<&String> = first.iter().chain(all.iter().take(3)).collect();
        let rest: Vec<String> = all.iter().filter(|k| !removed.contains(k)).cloned().collect();
        let (next, second) = page(rest.clone(), |s| s.as_bytes(), cursor, 1000);
        assert_eq!(next, 0);
        assert_eq!(second.len(), rest.len());
    }

    #[test]
    fn test_empty_collection() {
        let (next, items) = page(Vec::<String>::new(), |s| s.as_bytes(), 0, 10);
        assert_eq!(next, 0);
        assert!(items.is_empty());
    }

    #[test]
    fn test_shared_position_is_never_split() {
        let tagged = vec![(5, "b"), (9, "z"), (5, "a"), (7, "c"), (5, "c")];
        let (next, items) = page_positioned(tagged, |s| s.as_bytes(), 2);
        assert_eq!(items, vec!["a", "b", "c"]);
        assert_eq!(next, 7);
    }
}
