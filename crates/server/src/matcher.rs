//! Gem source selection by path prefix.

/// Matches request paths against a fixed prefix and strips it.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PathMatcher {
    prefix: String,
}

impl PathMatcher {
    pub fn new(prefix: impl Into<String>) -> Self {
        Self {
            prefix: prefix.into(),
        }
    }

    pub fn prefix(&self) -> &str {
        &self.prefix
    }

    /// The path with the prefix removed, when `path` is the prefix itself or
    /// continues with `/` after it. The bare prefix rewrites to `/`.
    pub fn matches<'a>(&self, path: &'a str) -> Option<&'a str> {
        let rest = path.strip_prefix(self.prefix.as_str())?;
        if rest.is_empty() {
            Some("/")
        } else if rest.starts_with('/') {
            Some(rest)
        } else {
            None
        }
    }
}

/// Gem sources served by this process.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum GemSource {
    /// Privately pushed gems.
    Private,
}

/// Ordered source table; the first matching prefix owns the request.
#[derive(Clone, Debug)]
pub struct SourceTable {
    sources: Vec<(PathMatcher, GemSource)>,
}

impl SourceTable {
    pub fn new(private_prefix: &str) -> Self {
        Self {
            sources: vec![(PathMatcher::new(private_prefix), GemSource::Private)],
        }
    }

    /// Select the source owning `path` and return it with the rewritten path.
    pub fn select<'a>(&self, path: &'a str) -> Option<(GemSource, &'a str)> {
        self.sources
            .iter()
            .find_map(|(matcher, source)| matcher.matches(path).map(|rest| (*source, rest)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_prefix_match_and_rewrite() {
        let matcher = PathMatcher::new("/private");
        assert_eq!(matcher.matches("/private"), Some("/"));
        assert_eq!(matcher.matches("/private/"), Some("/"));
        assert_eq!(
            matcher.matches("/private/api/v1/gems"),
            Some("/api/v1/gems")
        );
        assert_eq!(
            matcher.matches("/private/gems/rack-2.2.8.gem"),
            Some("/gems/rack-2.2.8.gem")
        );
    }

    #[test]
    fn test_prefix_must_end_at_segment_boundary() {
        let matcher = PathMatcher::new("/private");
        assert_eq!(matcher.matches("/privateer"), None);
        assert_eq!(matcher.matches("/public/private"), None);
        assert_eq!(matcher.matches("/"), None);
        assert_eq!(matcher.matches(""), None);
    }

    #[test]
    fn test_source_table_selects_private() {
        let table = SourceTable::new("/private");
        assert_eq!(
            table.select("/private/specs.4.8.gz"),
            Some((GemSource::Private, "/specs.4.8.gz"))
        );
        assert_eq!(table.select("/specs.4.8.gz"), None);
    }

    #[test]
    fn test_custom_prefix() {
        let table = SourceTable::new("/internal/gems");
        assert_eq!(
            table.select("/internal/gems/api/v1/gems"),
            Some((GemSource::Private, "/api/v1/gems"))
        );
        assert_eq!(table.select("/private/api/v1/gems"), None);
    }
}
