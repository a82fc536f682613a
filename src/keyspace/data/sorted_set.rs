//! Sorted set ordered by `(score, member bytes)`
//!
//! Two indexes kept in lockstep: a hash map for O(1) score lookup by member
//! and a B-tree over `(score, member)` for ordered range, rank and lexical
//! queries.

use ahash::AHashMap;
use bytes::Bytes;
use std::cmp::Ordering;
use std::collections::BTreeSet;
use std::ops::Bound;

/// Total order over scores (NaN is rejected before it gets here).
#[derive(Clone, Copy, Debug)]
struct Score(f64);

impl PartialEq for Score {
    fn eq(&self, other: &Self) -> bool {
        self.0.total_cmp(&other.0) == Ordering::Equal
    }
}

impl Eq for Score {}

impl PartialOrd for Score {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Score {
    fn cmp(&self, other: &Self) -> Ordering {
        self.0.total_cmp(&other.0)
    }
}

/// ZRANGEBYLEX bound: `-`, `+`, `[member` or `(member`.
#[derive(Clone, Debug, PartialEq)]
pub enum LexBound {
    NegInf,
    PosInf,
    Inclusive(Bytes),
    Exclusive(Bytes),
}

impl LexBound {
    pub fn parse(raw: &[u8]) -> Result<LexBound, String> {
        match raw.first() {
            Some(b'-') if raw.len() == 1 => Ok(LexBound::NegInf),
            Some(b'+') if raw.len() == 1 => Ok(LexBound::PosInf),
            Some(b'[') => Ok(LexBound::Inclusive(Bytes::copy_from_slice(&raw[1..]))),
            Some(b'(') => Ok(LexBound::Exclusive(Bytes::copy_from_slice(&raw[1..]))),
            _ => Err("ERR min or max not valid string range item".to_string()),
        }
    }

    pub fn encode(&self) -> Bytes {
        match self {
            LexBound::NegInf => Bytes::from_static(b"-"),
            LexBound::PosInf => Bytes::from_static(b"+"),
            LexBound::Inclusive(m) => {
                let mut out = Vec::with_capacity(m.len() + 1);
                out.push(b'[');
                out.extend_from_slice(m);
                Bytes::from(out)
            }
            LexBound::Exclusive(m) => {
                let mut out = Vec::with_capacity(m.len() + 1);
                out.push(b'(');
                out.extend_from_slice(m);
                Bytes::from(out)
            }
        }
    }

    fn admits_lower(&self, member: &[u8]) -> bool {
        match self {
            LexBound::NegInf => true,
            LexBound::PosInf => false,
            LexBound::Inclusive(m) => member >= m.as_ref(),
            LexBound::Exclusive(m) => member > m.as_ref(),
        }
    }

    fn admits_upper(&self, member: &[u8]) -> bool {
        match self {
            LexBound::NegInf => false,
            LexBound::PosInf => true,
            LexBound::Inclusive(m) => member <= m.as_ref(),
            LexBound::Exclusive(m) => member < m.as_ref(),
        }
    }
}

#[derive(Clone, Debug, Default)]
pub struct SortedSet {
    members: AHashMap<Bytes, f64>,
    ordered: BTreeSet<(Score, Bytes)>,
}

impl SortedSet {
    pub fn new() -> Self {
        SortedSet {
            members: AHashMap::new(),
            ordered: BTreeSet::new(),
        }
    }

    #[cfg(debug_assertions)]
    fn verify_invariants(&self) {
        debug_assert_eq!(
            self.members.len(),
            self.ordered.len(),
            "Invariant violated: members.len() != ordered.len()"
        );
    }

    #[cfg(not(debug_assertions))]
    #[inline(always)]
    fn verify_invariants(&self) {}

    /// Add or rescore a member. Returns true if the member is new.
    pub fn add(&mut self, member: Bytes, score: f64) -> bool {
        debug_assert!(!score.is_nan(), "Precondition: score must not be NaN");

        let added = match self.members.insert(member.clone(), score) {
            Some(old) => {
                self.ordered.remove(&(Score(old), member.clone()));
                false
            }
            None => true,
        };
        self.ordered.insert((Score(score), member));

        self.verify_invariants();
        added
    }

    pub fn remove(&mut self, member: &[u8]) -> bool {
        let removed = match self.members.remove_entry(member) {
            Some((key, score)) => {
                self.ordered.remove(&(Score(score), key));
                true
            }
            None => false,
        };

        self.verify_invariants();
        removed
    }

    pub fn score(&self, member: &[u8]) -> Option<f64> {
        self.members.get(member).copied()
    }

    /// 0-based rank in ascending order.
    pub fn rank(&self, member: &[u8]) -> Option<usize> {
        let (key, score) = self.members.get_key_value(member)?;
        Some(
            self.ordered
                .range(..(Score(*score), key.clone()))
                .count(),
        )
    }

    pub fn len(&self) -> usize {
        self.members.len()
    }

    pub fn is_empty(&self) -> bool {
        self.members.is_empty()
    }

    /// ZRANGE by rank, inclusive `stop`, Redis index normalization.
    pub fn range(&self, start: isize, stop: isize) -> Vec<(Bytes, f64)> {
        let len = self.ordered.len() as isize;
        let start = if start < 0 {
            (len + start).max(0)
        } else {
            start
        };
        let stop = if stop < 0 { len + stop } else { stop.min(len - 1) };

        if start > stop || start >= len {
            return Vec::new();
        }

        self.ordered
            .iter()
            .skip(start as usize)
            .take((stop - start + 1) as usize)
            .map(|(score, member)| (member.clone(), score.0))
            .collect()
    }

    /// ZRANGEBYLEX. Only meaningful when every member shares one score.
    pub fn range_by_lex(&self, min: &LexBound, max: &LexBound) -> Vec<Bytes> {
        let lower = match min {
            LexBound::Inclusive(m) | LexBound::Exclusive(m) => {
                // Members equal to the bound sort first at the lowest score;
                // the admits_lower filter handles exclusivity.
                match self.ordered.iter().next() {
                    Some((score, _)) => Bound::Included((*score, m.clone())),
                    None => return Vec::new(),
                }
            }
            _ => Bound::Unbounded,
        };

        self.ordered
            .range((lower, Bound::Unbounded))
            .map(|(_, member)| member)
            .skip_while(|member| !min.admits_lower(member))
            .take_while(|member| max.admits_upper(member))
            .cloned()
            .collect()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&Bytes, f64)> {
        self.ordered.iter().map(|(score, member)| (member, score.0))
    }
}

impl PartialEq for SortedSet {
    fn eq(&self, other: &Self) -> bool {
        self.members == other.members
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn member(s: &'static str) -> Bytes {
        Bytes::from_static(s.as_bytes())
    }

    fn names(items: Vec<(Bytes, f64)>) -> Vec<String> {
        items
            .into_iter()
            .map(|(m, _)| String::from_utf8_lossy(&m).into_owned())
            .collect()
    }

    #[test]
    fn test_sorted_set_ordering_and_rescore() {
        let mut zs = SortedSet::new();
        assert!(zs.add(member("b"), 2.0));
        assert!(zs.add(member("a"), 1.0));
        assert!(zs.add(member("c"), 3.0));
        assert_eq!(names(zs.range(0, -1)), vec!["a", "b", "c"]);

        assert!(!zs.add(member("a"), 10.0));
        assert_eq!(names(zs.range(0, -1)), vec!["b", "c", "a"]);
        assert_eq!(zs.len(), 3);
        assert_eq!(zs.score(b"a"), Some(10.0));
    }

    #[test]
    fn test_sorted_set_negative_scores_sort_first() {
        let mut zs = SortedSet::new();
        zs.add(member("old"), -100.0);
        zs.add(member("new"), -200.0);
        assert_eq!(names(zs.range(0, 0)), vec!["new"]);
        assert_eq!(zs.rank(b"old"), Some(1));
    }

    #[test]
    fn test_sorted_set_equal_scores_order_by_member() {
        let mut zs = SortedSet::new();
        zs.add(member("cherry"), 0.0);
        zs.add(member("apple"), 0.0);
        zs.add(member("banana"), 0.0);
        assert_eq!(names(zs.range(0, -1)), vec!["apple", "banana", "cherry"]);
        assert_eq!(zs.rank(b"banana"), Some(1));
        assert_eq!(zs.rank(b"durian"), None);
    }

    #[test]
    fn test_sorted_set_remove() {
        let mut zs = SortedSet::new();
        zs.add(member("a"), 1.0);
        assert!(zs.remove(b"a"));
        assert!(!zs.remove(b"a"));
        assert!(zs.is_empty());
        assert!(zs.range(0, -1).is_empty());
    }

    #[test]
    fn test_range_by_lex() {
        let mut zs = SortedSet::new();
        for m in ["apple", "apricot", "banana", "cherry"] {
            zs.add(Bytes::from_static(m.as_bytes()), 0.0);
        }

        let all = zs.range_by_lex(&LexBound::NegInf, &LexBound::PosInf);
        assert_eq!(all.len(), 4);

        let ap = zs.range_by_lex(
            &LexBound::Inclusive(member("ap")),
            &LexBound::Exclusive(member("aq")),
        );
        assert_eq!(ap, vec![member("apple"), member("apricot")]);

        let after_apple = zs.range_by_lex(
            &LexBound::Exclusive(member("apple")),
            &LexBound::Inclusive(member("banana")),
        );
        assert_eq!(after_apple, vec![member("apricot"), member("banana")]);
    }

    #[test]
    fn test_lex_bound_parse() {
        assert_eq!(LexBound::parse(b"-").unwrap(), LexBound::NegInf);
        assert_eq!(LexBound::parse(b"+").unwrap(), LexBound::PosInf);
        assert_eq!(LexBound::parse(b"[a").unwrap(), LexBound::Inclusive(member("a")));
        assert_eq!(LexBound::parse(b"(a").unwrap(), LexBound::Exclusive(member("a")));
        assert!(LexBound::parse(b"a").is_err());
    }
}
