// src/links/aggregate.rs
// =============================================================================
// Per-link results and the fold that turns them into page-level counts.
//
// Workers never touch the counters. They build an immutable LinkOutcome
// and send it to the collection loop, which is the only place that calls
// AggregateCounts::fold. The increments are commutative, so the order in
// which outcomes arrive does not matter.
// =============================================================================

use serde::Serialize;

use super::LinkError;

/// What happened to one link
#[derive(Debug)]
pub enum Verdict {
    /// Fragment, empty or non-web href; counted nowhere
    Skipped,
    /// Same host as the page; assumed reachable and never probed
    Internal,
    /// Different host; probed once
    External { accessible: bool },
    /// Could not be resolved or probed at all
    Failed(LinkError),
}

/// Result of processing one href, produced by exactly one worker
#[derive(Debug)]
pub struct LinkOutcome {
    /// The href as it appeared in the document
    pub original_ref: String,
    pub verdict: Verdict,
}

impl LinkOutcome {
    pub fn new(original_ref: impl Into<String>, verdict: Verdict) -> Self {
        Self {
            original_ref: original_ref.into(),
            verdict,
        }
    }

    pub fn is_internal(&self) -> bool {
        matches!(self.verdict, Verdict::Internal)
    }

    // Internal links count as accessible without a network call
    pub fn is_accessible(&self) -> bool {
        match self.verdict {
            Verdict::Internal => true,
            Verdict::External { accessible } => accessible,
            Verdict::Skipped | Verdict::Failed(_) => false,
        }
    }

    pub fn probe_error(&self) -> Option<&LinkError> {
        match &self.verdict {
            Verdict::Failed(err) => Some(err),
            _ => None,
        }
    }
}

/// Link counts reported for a page
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct AggregateCounts {
    pub internal_links: usize,
    pub external_links: usize,
    /// External links whose probe failed
    pub inaccessible_links: usize,
}

impl AggregateCounts {
    pub fn fold(&mut self, outcome: &LinkOutcome) {
        match outcome.verdict {
            Verdict::Skipped | Verdict::Failed(_) => {}
            Verdict::Internal => self.internal_links += 1,
            Verdict::External { accessible } => {
                self.external_links += 1;
                if !accessible {
                    self.inaccessible_links += 1;
                }
            }
        }
    }

    pub fn total(&self) -> usize {
        self.internal_links + self.external_links
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn outcomes() -> Vec<LinkOutcome> {
        let bad_href = url::Url::parse("https://site.test/")
            .unwrap()
            .join("http://[::1")
            .unwrap_err();

        vec![
            LinkOutcome::new("/a", Verdict::Internal),
            LinkOutcome::new("https://site.test/b", Verdict::Internal),
            LinkOutcome::new("https://ok.test/", Verdict::External { accessible: true }),
            LinkOutcome::new("https://down.test/", Verdict::External { accessible: false }),
            LinkOutcome::new("https://gone.test/", Verdict::External { accessible: false }),
            LinkOutcome::new("#frag", Verdict::Skipped),
            LinkOutcome::new(
                "http://[::1",
                Verdict::Failed(LinkError::Resolve {
                    href: "http://[::1".to_string(),
                    source: bad_href,
                }),
            ),
        ]
    }

    fn fold_all<'a>(items: impl Iterator<Item = &'a LinkOutcome>) -> AggregateCounts {
        let mut counts = AggregateCounts::default();
        for outcome in items {
            counts.fold(outcome);
        }
        counts
    }

    #[test]
    fn test_fold_counts() {
        let counts = fold_all(outcomes().iter());
        assert_eq!(
            counts,
            AggregateCounts {
                internal_links: 2,
                external_links: 3,
                inaccessible_links: 2,
            }
        );
        assert_eq!(counts.total(), 5);
    }

    #[test]
    fn test_fold_is_order_independent() {
        let items = outcomes();
        let forward = fold_all(items.iter());
        let backward = fold_all(items.iter().rev());
        // Interleave: odd positions first, then even ones
        let shuffled = fold_all(items.iter().skip(1).step_by(2).chain(items.iter().step_by(2)));

        assert_eq!(forward, backward);
        assert_eq!(forward, shuffled);
    }

    #[test]
    fn test_failed_and_skipped_change_nothing() {
        let items = outcomes();
        let counts = fold_all(items.iter().filter(|o| {
            matches!(o.verdict, Verdict::Skipped | Verdict::Failed(_))
        }));
        assert_eq!(counts, AggregateCounts::default());
    }

    #[test]
    fn test_outcome_accessors() {
        let items = outcomes();
        assert!(items[0].is_internal());
        assert!(items[0].is_accessible());
        assert!(!items[3].is_accessible());
        assert!(items[6].probe_error().is_some());
        assert!(items[2].probe_error().is_none());
    }
}
