//! Protocol dispatcher.
//!
//! A registry mapping path patterns to mounted handlers. Patterns are
//! `/`-separated segments: literals match exactly, `:name` matches any one
//! segment, and a trailing `*` matches any remainder (including empty).
//! Resolution picks the most specific match: longer literal prefixes win,
//! and on equal length exact beats `:param` beats `*`.

/// One pattern segment.
#[derive(Debug, Clone, PartialEq, Eq)]
enum Segment {
    Exact(String),
    Param,
    Wildcard,
}

impl Segment {
    fn specificity(&self) -> u8 {
        match self {
            Segment::Exact(_) => 2,
            Segment::Param => 1,
            Segment::Wildcard => 0,
        }
    }
}

#[derive(Debug, Clone)]
struct Pattern {
    segments: Vec<Segment>,
}

impl Pattern {
    fn parse(pattern: &str) -> Self {
        let segments = pattern
            .trim_start_matches('/')
            .split('/')
            .filter(|s| !s.is_empty())
            .map(|s| {
                if s == "*" {
                    Segment::Wildcard
                } else if let Some(name) = s.strip_prefix(':') {
                    debug_assert!(!name.is_empty());
                    Segment::Param
                } else {
                    Segment::Exact(s.to_string())
                }
            })
            .collect();
        Self { segments }
    }

    /// Specificity vector for a matching path, or None when it does not
    /// match. Vectors compare lexicographically, so an exact segment beats
    /// `:param` beats `*` at the first position they differ.
    fn match_score(&self, path: &[&str]) -> Option<Vec<u8>> {
        let mut score = Vec::with_capacity(self.segments.len());
        let mut i = 0;

        for segment in &self.segments {
            match segment {
                Segment::Wildcard => {
                    score.push(segment.specificity());
                    return Some(score);
                }
                Segment::Param => {
                    if i >= path.len() {
                        return None;
                    }
                    score.push(segment.specificity());
                    i += 1;
                }
                Segment::Exact(literal) => {
                    if path.get(i) != Some(&literal.as_str()) {
                        return None;
                    }
                    score.push(segment.specificity());
                    i += 1;
                }
            }
        }

        if i == path.len() { Some(score) } else { None }
    }
}

/// Registry of patterns with their mounted values.
pub struct PatternSet<T> {
    entries: Vec<(Pattern, T)>,
}

impl<T> PatternSet<T> {
    pub fn new() -> Self {
        Self {
            entries: Vec::new(),
        }
    }

    pub fn insert(&mut self, pattern: &str, value: T) {
        self.entries.push((Pattern::parse(pattern), value));
    }

    /// Resolve a path to the most specific mounted value.
    pub fn resolve(&self, path: &str) -> Option<&T> {
        let segments: Vec<&str> = path
            .trim_start_matches('/')
            .split('/')
            .filter(|s| !s.is_empty())
            .collect();

        self.entries
            .iter()
            .filter_map(|(pattern, value)| Some((pattern.match_score(&segments)?, value)))
            .max_by(|(a, _), (b, _)| a.cmp(b))
            .map(|(_, value)| value)
    }
}

impl<T> Default for PatternSet<T> {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_exact_match() {
        let mut set = PatternSet::new();
        set.insert("/healthz", "health");
        set.insert("/*", "streams");

        assert_eq!(set.resolve("/healthz"), Some(&"health"));
        assert_eq!(set.resolve("/healthz/extra"), Some(&"streams"));
        assert_eq!(set.resolve("/anything/else"), Some(&"streams"));
    }

    #[test]
    fn test_exact_beats_param_beats_wildcard() {
        let mut set = PatternSet::new();
        set.insert("/v1/stream/ingest", "exact");
        set.insert("/v1/stream/:ns", "param");
        set.insert("/v1/stream/*", "wildcard");

        assert_eq!(set.resolve("/v1/stream/ingest"), Some(&"exact"));
        assert_eq!(set.resolve("/v1/stream/other"), Some(&"param"));
        assert_eq!(set.resolve("/v1/stream/a/b"), Some(&"wildcard"));
    }

    #[test]
    fn test_longest_prefix_wins() {
        let mut set = PatternSet::new();
        set.insert("/*", "root");
        set.insert("/v1/*", "v1");
        set.insert("/v1/stream/*", "stream");

        assert_eq!(set.resolve("/v1/stream/x"), Some(&"stream"));
        assert_eq!(set.resolve("/v1/other"), Some(&"v1"));
        assert_eq!(set.resolve("/zzz"), Some(&"root"));
    }

    #[test]
    fn test_param_requires_segment() {
        let mut set = PatternSet::new();
        set.insert("/v1/:ns", "param");

        assert_eq!(set.resolve("/v1"), None);
        assert_eq!(set.resolve("/v1/a/b"), None);
        assert_eq!(set.resolve("/v1/a"), Some(&"param"));
    }

    #[test]
    fn test_no_match() {
        let mut set: PatternSet<&str> = PatternSet::new();
        set.insert("/only/here", "x");
        assert_eq!(set.resolve("/elsewhere"), None);
    }
}
