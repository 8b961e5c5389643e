use std::collections::BTreeSet;

use arbor_values::Ref;

/// A deduplicated frontier of refs, ordered by height then hash.
#[derive(Clone, Debug, Default)]
pub struct RefQueue {
    refs: BTreeSet<Ref>,
}

impl RefQueue {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, r: Ref) {
        self.refs.insert(r);
    }

    pub fn len(&self) -> usize {
        self.refs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.refs.is_empty()
    }

    pub fn clear(&mut self) {
        self.refs.clear();
    }

    pub fn contains(&self, r: &Ref) -> bool {
        self.refs.contains(r)
    }

    /// Height of the tallest ref, or 0 when empty.
    pub fn max_height(&self) -> u64 {
        self.refs.last().map_or(0, Ref::height)
    }

    /// Remove and return every ref at the greatest height, in hash order.
    pub fn pop_tallest(&mut self) -> Vec<Ref> {
        let height = self.max_height();
        let mut out = Vec::new();
        while self.refs.last().is_some_and(|r| r.height() == height) {
            if let Some(r) = self.refs.pop_last() {
                out.push(r);
            }
        }
        out.reverse();
        out
    }
}

impl Extend<Ref> for RefQueue {
    fn extend<I: IntoIterator<Item = Ref>>(&mut self, iter: I) {
        self.refs.extend(iter);
    }
}

impl FromIterator<Ref> for RefQueue {
    fn from_iter<I: IntoIterator<Item = Ref>>(iter: I) -> Self {
        Self {
            refs: iter.into_iter().collect(),
        }
    }
}
