//! Id sets: compact range lists such as `0-3,7,9-10`.
//!
//! Sets are held as ranges, so `0-4294967295` costs one entry.

use crate::RlistError;

/// An ordered set of non-negative integer ids.
///
/// Ranges are sorted, disjoint and never adjacent.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct IdSet(Vec<(u32, u32)>);

impl IdSet {
    /// Parse a range list. Whitespace around entries is ignored.
    pub fn parse(s: &str) -> Result<Self, RlistError> {
        let invalid = || RlistError::InvalidIdset(s.to_string());

        if s.trim().is_empty() {
            return Err(invalid());
        }

        let mut ranges = Vec::new();
        for part in s.split(',') {
            let part = part.trim();
            let (lo, hi) = match part.split_once('-') {
                Some((lo, hi)) => (lo.trim(), hi.trim()),
                None => (part, part),
            };
            let lo: u32 = lo.parse().map_err(|_| invalid())?;
            let hi: u32 = hi.parse().map_err(|_| invalid())?;
            if lo > hi {
                return Err(invalid());
            }
            ranges.push((lo, hi));
        }

        Ok(Self::from_ranges(ranges))
    }

    fn from_ranges(mut ranges: Vec<(u32, u32)>) -> Self {
        ranges.sort_unstable();
        let mut merged: Vec<(u32, u32)> = Vec::with_capacity(ranges.len());
        for (lo, hi) in ranges {
            match merged.last_mut() {
                Some((_, last)) if lo <= last.saturating_add(1) => *last = (*last).max(hi),
                _ => merged.push((lo, hi)),
            }
        }
        Self(merged)
    }

    pub fn len(&self) -> usize {
        self.0
            .iter()
            .map(|&(lo, hi)| (hi - lo) as usize + 1)
            .sum()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn contains(&self, id: u32) -> bool {
        let i = self.0.partition_point(|&(_, hi)| hi < id);
        self.0.get(i).is_some_and(|&(lo, _)| lo <= id)
    }

    /// The smallest id.
    pub fn first(&self) -> Option<u32> {
        self.0.first().map(|&(lo, _)| lo)
    }

    pub fn iter(&self) -> impl Iterator<Item = u32> + '_ {
        self.0.iter().flat_map(|&(lo, hi)| lo..=hi)
    }

    /// Returns the ids present in both sets.
    pub fn intersection(&self, other: &IdSet) -> IdSet {
        let (a, b) = (&self.0, &other.0);
        let (mut i, mut j) = (0, 0);
        let mut out = Vec::new();
        while i < a.len() && j < b.len() {
            let lo = a[i].0.max(b[j].0);
            let hi = a[i].1.min(b[j].1);
            if lo <= hi {
                out.push((lo, hi));
            }
            if a[i].1 < b[j].1 {
                i += 1;
            } else {
                j += 1;
            }
        }
        IdSet::from_ranges(out)
    }

    /// Returns the ids in `self` that are not in `other`.
    pub fn difference(&self, other: &IdSet) -> IdSet {
        let mut out = Vec::new();
        for &(lo, hi) in &self.0 {
            let mut start = lo;
            let mut covered = false;
            for &(olo, ohi) in other.0.iter().filter(|&&(olo, ohi)| ohi >= lo && olo <= hi) {
                if olo > start {
                    out.push((start, olo - 1));
                }
                if ohi >= hi {
                    covered = true;
                    break;
                }
                start = ohi + 1;
            }
            if !covered {
                out.push((start, hi));
            }
        }
        IdSet::from_ranges(out)
    }

    pub(crate) fn extend(&mut self, other: &IdSet) {
        let mut ranges = std::mem::take(&mut self.0);
        ranges.extend_from_slice(&other.0);
        *self = IdSet::from_ranges(ranges);
    }
}

impl std::fmt::Display for IdSet {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let parts: Vec<String> = self
            .0
            .iter()
            .map(|&(lo, hi)| {
                if lo == hi {
                    lo.to_string()
                } else {
                    format!("{lo}-{hi}")
                }
            })
            .collect();
        write!(f, "{}", parts.join(","))
    }
}
