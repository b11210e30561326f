//! Command tags.
//!
//! Tags match commands with their completion responses. A session issues
//! them in strictly increasing order: `A0000`, `A0001`, ...

/// Sequential tag source owned by one session.
#[derive(Debug, Clone)]
pub struct TagGenerator {
    counter: u32,
    prefix: char,
}

impl TagGenerator {
    /// Creates a generator with the given prefix.
    #[must_use]
    pub const fn new(prefix: char) -> Self {
        Self { counter: 0, prefix }
    }

    /// Returns the next tag. Wraps after `u32::MAX`.
    pub fn next_tag(&mut self) -> String {
        let tag = format!("{}{:04}", self.prefix, self.counter);
        self.counter = self.counter.wrapping_add(1);
        tag
    }

    /// Number of tags issued so far.
    #[must_use]
    pub const fn issued(&self) -> u32 {
        self.counter
    }
}

impl Default for TagGenerator {
    fn default() -> Self {
        Self::new('A')
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn test_tag_sequence() {
        let mut tags = TagGenerator::default();
        assert_eq!(tags.next_tag(), "A0000");
        assert_eq!(tags.next_tag(), "A0001");
        assert_eq!(tags.issued(), 2);
    }

    #[test]
    fn test_padding_grows() {
        let mut tags = TagGenerator::new('T');
        for _ in 0..10_000 {
            let _ = tags.next_tag();
        }
        assert_eq!(tags.next_tag(), "T10000");
    }

    #[test]
    fn test_unique() {
        let mut tags = TagGenerator::default();
        let mut seen = std::collections::HashSet::new();
        for _ in 0..5000 {
            assert!(seen.insert(tags.next_tag()));
        }
    }
}
