use super::order_tree::OrderTree;
use std::cmp::Ordering;
use std::collections::HashMap;

/// A (score, member) pair ordered by score, then by member bytes.
#[derive(Debug, Clone)]
pub struct ScoredMember {
    pub score: f64,
    pub member: Vec<u8>,
}

impl PartialEq for ScoredMember {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for ScoredMember {}

impl Ord for ScoredMember {
    fn cmp(&self, other: &Self) -> Ordering {
        self.score
            .total_cmp(&other.score)
            .then_with(|| self.member.cmp(&other.member))
    }
}

impl PartialOrd for ScoredMember {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

/// One end of a score interval: `1.5`, `(1.5`, `-inf`, `+inf`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ScoreBound {
    pub value: f64,
    pub exclusive: bool,
}

impl ScoreBound {
    pub fn parse(s: &str) -> Option<ScoreBound> {
        let (exclusive, rest) = match s.strip_prefix('(') {
            Some(rest) => (true, rest),
            None => (false, s),
        };
        let value = parse_score(rest)?;
        Some(ScoreBound { value, exclusive })
    }

    /// Whether `score` lies below this bound used as a minimum.
    fn below_min(&self, score: f64) -> bool {
        if self.exclusive { score <= self.value } else { score < self.value }
    }

    /// Whether `score` lies within this bound used as a maximum.
    fn within_max(&self, score: f64) -> bool {
        if self.exclusive { score < self.value } else { score <= self.value }
    }
}

/// One end of a lexicographic interval: `-`, `+`, `[abc`, `(abc`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LexBound {
    Min,
    Max,
    Inclusive(Vec<u8>),
    Exclusive(Vec<u8>),
}

impl LexBound {
    pub fn parse(s: &[u8]) -> Option<LexBound> {
        match s.split_first() {
            Some((b'-', [])) => Some(LexBound::Min),
            Some((b'+', [])) => Some(LexBound::Max),
            Some((b'[', rest)) => Some(LexBound::Inclusive(rest.to_vec())),
            Some((b'(', rest)) => Some(LexBound::Exclusive(rest.to_vec())),
            _ => None,
        }
    }

    fn below_min(&self, member: &[u8]) -> bool {
        match self {
            LexBound::Min => false,
            LexBound::Max => true,
            LexBound::Inclusive(v) => member < v.as_slice(),
            LexBound::Exclusive(v) => member <= v.as_slice(),
        }
    }

    fn within_max(&self, member: &[u8]) -> bool {
        match self {
            LexBound::Min => false,
            LexBound::Max => true,
            LexBound::Inclusive(v) => member <= v.as_slice(),
            LexBound::Exclusive(v) => member < v.as_slice(),
        }
    }
}

/// Parse a score the way Redis does, accepting `inf`, `+inf` and `-inf`.
/// NaN is rejected.
pub fn parse_score(s: &str) -> Option<f64> {
    let v = match s.to_ascii_lowercase().as_str() {
        "inf" | "+inf" | "infinity" | "+infinity" => f64::INFINITY,
        "-inf" | "-infinity" => f64::NEG_INFINITY,
        other => {
            let v: f64 = other.parse().ok()?;
            if v.is_infinite() {
                return None;
            }
            v
        }
    };
    (!v.is_nan()).then_some(v)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Aggregate {
    #[default]
    Sum,
    Min,
    Max,
}

impl Aggregate {
    fn apply(self, a: f64, b: f64) -> f64 {
        match self {
            Aggregate::Sum => nan_to_zero(a + b),
            Aggregate::Min => a.min(b),
            Aggregate::Max => a.max(b),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SetOp {
    Union,
    Inter,
    Diff,
}

fn nan_to_zero(v: f64) -> f64 {
    if v.is_nan() { 0.0 } else { v }
}

/// A sorted set: a member -> score map plus an order-statistic index
/// over (score, member).
#[derive(Debug, Clone, Default)]
pub struct RedisSortedSet {
    scores: HashMap<Vec<u8>, f64>,
    index: OrderTree<ScoredMember>,
}

impl PartialEq for RedisSortedSet {
    fn eq(&self, other: &Self) -> bool {
        self.scores == other.scores
    }
}

impl RedisSortedSet {
    pub fn new() -> Self {
        RedisSortedSet::default()
    }

    pub fn len(&self) -> usize {
        self.scores.len()
    }

    pub fn is_empty(&self) -> bool {
        self.scores.is_empty()
    }

    pub fn score(&self, member: &[u8]) -> Option<f64> {
        self.scores.get(member).copied()
    }

    /// Add or update a member. Returns true if the member was new.
    pub fn insert(&mut self, member: &[u8], score: f64) -> bool {
        // -0.0 and 0.0 must be the same position in the index.
        let score = if score == 0.0 { 0.0 } else { score };
        let new = match self.scores.insert(member.to_vec(), score) {
            Some(old) => {
                if old == score {
                    return false;
                }
                self.index.remove(&ScoredMember {
                    score: old,
                    member: member.to_vec(),
                });
                false
            }
            None => true,
        };
        self.index.insert(ScoredMember {
            score,
            member: member.to_vec(),
        });
        new
    }

    pub fn remove(&mut self, member: &[u8]) -> bool {
        match self.scores.remove(member) {
            Some(score) => {
                self.index.remove(&ScoredMember {
                    score,
                    member: member.to_vec(),
                });
                true
            }
            None => false,
        }
    }

    /// 0-based ascending rank.
    pub fn rank(&self, member: &[u8]) -> Option<usize> {
        let score = self.score(member)?;
        Some(self.index.rank(&ScoredMember {
            score,
            member: member.to_vec(),
        }))
    }

    pub fn rev_rank(&self, member: &[u8]) -> Option<usize> {
        self.rank(member).map(|r| self.len() - 1 - r)
    }

    pub fn iter(&self) -> impl Iterator<Item = &ScoredMember> {
        self.index.iter()
    }

    pub fn select(&self, index: usize) -> Option<&ScoredMember> {
        self.index.select(index)
    }

    /// Resolve Redis rank indices (negative counts from the end) into a
    /// half-open range of positions.
    pub fn rank_range(&self, start: i64, stop: i64) -> (usize, usize) {
        let len = self.len() as i64;
        let start = if start < 0 { (len + start).max(0) } else { start };
        let stop = if stop < 0 { len + stop } else { stop.min(len - 1) };
        if start > stop || start >= len {
            return (0, 0);
        }
        (start as usize, stop as usize + 1)
    }

    /// Half-open range of positions whose scores fall within the bounds.
    pub fn score_range(&self, min: &ScoreBound, max: &ScoreBound) -> (usize, usize) {
        let lo = self.index.count_while(|e| min.below_min(e.score));
        let hi = self.index.count_while(|e| max.within_max(e.score));
        (lo, hi.max(lo))
    }

    /// Half-open range of positions whose members fall within the bounds.
    /// Only meaningful when every member has the same score.
    pub fn lex_range(&self, min: &LexBound, max: &LexBound) -> (usize, usize) {
        let lo = self.index.count_while(|e| min.below_min(&e.member));
        let hi = self.index.count_while(|e| max.within_max(&e.member));
        (lo, hi.max(lo))
    }

    /// Entries at positions `[lo, hi)`, after skipping `offset` and taking at
    /// most `limit`. With `rev` the walk starts at `hi - 1` and moves down.
    pub fn slice(
        &self,
        (lo, hi): (usize, usize),
        rev: bool,
        offset: usize,
        limit: Option<usize>,
    ) -> Vec<(Vec<u8>, f64)> {
        let available = hi.saturating_sub(lo).saturating_sub(offset);
        let take = limit.map_or(available, |l| l.min(available));
        if take == 0 {
            return Vec::new();
        }
        let iter = if rev {
            self.index.iter_rev_from(hi - 1 - offset)
        } else {
            self.index.iter_from(lo + offset)
        };
        iter.take(take)
            .map(|e| (e.member.clone(), e.score))
            .collect()
    }

    /// Remove positions `[lo, hi)`. Returns how many were removed.
    pub fn remove_positions(&mut self, range: (usize, usize)) -> usize {
        let doomed = self.slice(range, false, 0, None);
        for (member, _) in &doomed {
            self.remove(member);
        }
        doomed.len()
    }

    /// Pop up to `count` entries from the low (or high) end.
    pub fn pop(&mut self, count: usize, highest: bool) -> Vec<(Vec<u8>, f64)> {
        let len = self.len();
        let popped = self.slice((0, len), highest, 0, Some(count));
        for (member, _) in &popped {
            self.remove(member);
        }
        popped
    }

    /// Combine weighted sources into a new set.
    ///
    /// Union and intersection scale each source's scores by its weight and
    /// fold them with `aggregate`. Difference keeps the first source's
    /// members (and unweighted scores) that appear in no other source.
    pub fn combine(op: SetOp, sources: &[&RedisSortedSet], weights: &[f64], aggregate: Aggregate) -> RedisSortedSet {
        let weight = |i: usize| weights.get(i).copied().unwrap_or(1.0);
        let weighted = |score: f64, i: usize| nan_to_zero(score * weight(i));
        let mut out = RedisSortedSet::new();
        let Some((first, rest)) = sources.split_first() else {
            return out;
        };

        match op {
            SetOp::Union => {
                let mut acc: HashMap<&[u8], f64> = HashMap::new();
                for (i, src) in sources.iter().enumerate() {
                    for (member, &score) in &src.scores {
                        let score = weighted(score, i);
                        acc.entry(member.as_slice())
                            .and_modify(|s| *s = aggregate.apply(*s, score))
                            .or_insert(score);
                    }
                }
                for (member, score) in acc {
                    out.insert(member, score);
                }
            }
            SetOp::Inter => {
                'members: for (member, &score) in &first.scores {
                    let mut total = weighted(score, 0);
                    for (i, src) in rest.iter().enumerate() {
                        match src.score(member) {
                            Some(s) => total = aggregate.apply(total, weighted(s, i + 1)),
                            None => continue 'members,
                        }
                    }
                    out.insert(member, total);
                }
            }
            SetOp::Diff => {
                for (member, &score) in &first.scores {
                    if rest.iter().all(|src| src.score(member).is_none()) {
                        out.insert(member, score);
                    }
                }
            }
        }
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn zset(entries: &[(&str, f64)]) -> RedisSortedSet {
        let mut z = RedisSortedSet::new();
        for (m, s) in entries {
            z.insert(m.as_bytes(), *s);
        }
        z
    }

    fn members(entries: Vec<(Vec<u8>, f64)>) -> Vec<String> {
        entries
            .into_iter()
            .map(|(m, _)| String::from_utf8(m).unwrap())
            .collect()
    }

    #[test]
    fn test_ties_break_on_member() {
        let z = zset(&[("b", 1.0), ("a", 1.0), ("c", 0.5)]);
        let all = z.slice((0, z.len()), false, 0, None);
        assert_eq!(members(all), vec!["c", "a", "b"]);
        assert_eq!(z.rank(b"b"), Some(2));
        assert_eq!(z.rev_rank(b"c"), Some(2));
    }

    #[test]
    fn test_update_moves_member() {
        let mut z = zset(&[("a", 1.0), ("b", 2.0)]);
        assert!(!z.insert(b"a", 3.0));
        assert_eq!(z.rank(b"a"), Some(1));
        assert_eq!(z.len(), 2);
    }

    #[test]
    fn test_negative_zero_is_zero() {
        let mut z = zset(&[("a", 0.0)]);
        z.insert(b"b", -0.0);
        assert_eq!(z.score(b"b"), Some(0.0));
        assert!(z.score(b"b").unwrap().is_sign_positive());
    }

    #[test]
    fn test_rank_range() {
        let z = zset(&[("a", 1.0), ("b", 2.0), ("c", 3.0)]);
        assert_eq!(z.rank_range(0, -1), (0, 3));
        assert_eq!(z.rank_range(-2, -1), (1, 3));
        assert_eq!(z.rank_range(2, 1), (0, 0));
        assert_eq!(z.rank_range(5, 10), (0, 0));
        assert_eq!(z.rank_range(-100, 0), (0, 1));
    }

    #[test]
    fn test_score_range_bounds() {
        let z = zset(&[("a", 1.0), ("b", 2.0), ("c", 3.0)]);
        let incl = |v| ScoreBound { value: v, exclusive: false };
        let excl = |v| ScoreBound { value: v, exclusive: true };
        assert_eq!(z.score_range(&incl(1.0), &incl(2.0)), (0, 2));
        assert_eq!(z.score_range(&excl(1.0), &incl(3.0)), (1, 3));
        assert_eq!(z.score_range(&excl(1.0), &excl(2.0)), (1, 1));
        assert_eq!(z.score_range(&incl(f64::NEG_INFINITY), &incl(f64::INFINITY)), (0, 3));
    }

    #[test]
    fn test_rev_slice_with_limit() {
        let z = zset(&[("a", 1.0), ("b", 2.0), ("c", 3.0)]);
        let range = z.score_range(
            &ScoreBound { value: 1.0, exclusive: false },
            &ScoreBound { value: 3.0, exclusive: false },
        );
        assert_eq!(members(z.slice(range, true, 0, None)), vec!["c", "b", "a"]);
        assert_eq!(members(z.slice(range, true, 1, Some(1))), vec!["b"]);
        assert_eq!(members(z.slice(range, false, 5, None)), Vec::<String>::new());
    }

    #[test]
    fn test_lex_range() {
        let z = zset(&[("a", 0.0), ("b", 0.0), ("c", 0.0), ("d", 0.0)]);
        let r = z.lex_range(&LexBound::Inclusive(b"a".to_vec()), &LexBound::Exclusive(b"c".to_vec()));
        assert_eq!(r.1 - r.0, 2);
        let r = z.lex_range(&LexBound::Min, &LexBound::Max);
        assert_eq!(r, (0, 4));
        let r = z.lex_range(&LexBound::Exclusive(b"d".to_vec()), &LexBound::Max);
        assert_eq!(r.1 - r.0, 0);
    }

    #[test]
    fn test_parse_bounds() {
        assert_eq!(ScoreBound::parse("(1.5"), Some(ScoreBound { value: 1.5, exclusive: true }));
        assert_eq!(ScoreBound::parse("-inf").map(|b| b.value), Some(f64::NEG_INFINITY));
        assert_eq!(ScoreBound::parse("abc"), None);
        assert_eq!(LexBound::parse(b"-"), Some(LexBound::Min));
        assert_eq!(LexBound::parse(b"[x"), Some(LexBound::Inclusive(b"x".to_vec())));
        assert_eq!(LexBound::parse(b"x"), None);
        assert_eq!(parse_score("nan"), None);
    }

    #[test]
    fn test_pop_both_ends() {
        let mut z = zset(&[("a", 1.0), ("b", 2.0), ("c", 3.0)]);
        assert_eq!(members(z.pop(2, false)), vec!["a", "b"]);
        assert_eq!(members(z.pop(5, true)), vec!["c"]);
        assert!(z.is_empty());
    }

    #[test]
    fn test_combine_weights_and_aggregate() {
        let z1 = zset(&[("a", 1.0), ("b", 2.0)]);
        let z2 = zset(&[("b", 3.0), ("c", 4.0)]);
        let inter = RedisSortedSet::combine(SetOp::Inter, &[&z1, &z2], &[2.0, 3.0], Aggregate::Sum);
        assert_eq!(inter.len(), 1);
        assert_eq!(inter.score(b"b"), Some(13.0));

        let union = RedisSortedSet::combine(SetOp::Union, &[&z1, &z2], &[], Aggregate::Max);
        assert_eq!(union.score(b"b"), Some(3.0));
        assert_eq!(union.len(), 3);

        let diff = RedisSortedSet::combine(SetOp::Diff, &[&z1, &z2], &[], Aggregate::Sum);
        assert_eq!(diff.len(), 1);
        assert_eq!(diff.score(b"a"), Some(1.0));
    }

    #[test]
    fn test_combine_infinite_weights_collapse_to_zero() {
        let z1 = zset(&[("a", f64::INFINITY)]);
        let z2 = zset(&[("a", f64::NEG_INFINITY)]);
        let union = RedisSortedSet::combine(SetOp::Union, &[&z1, &z2], &[], Aggregate::Sum);
        assert_eq!(union.score(b"a"), Some(0.0));
        let zeroed = RedisSortedSet::combine(SetOp::Union, &[&z1], &[0.0], Aggregate::Sum);
        assert_eq!(zeroed.score(b"a"), Some(0.0));
    }
}
