//! Duplicate detection and consolidation.
//!
//! Events are sorted by instant, paired only inside the time tolerance and
//! joined with union-find. Every cluster elects one representative, which
//! absorbs the non-conflicting fields of the others.

use std::{cmp::Ordering, collections::BTreeMap, sync::Arc};

use serde::Serialize;

use crate::{
    NormalizedEvent,
    category::CategoryTable,
    config::DedupConfig,
    similarity::{LexicalScorer, SemanticOracle, SemanticScorer, SimilarityScorer, WeightedScorer},
};

/// Similarity evidence for one candidate pair inside a cluster.
#[derive(Debug, Clone, Serialize)]
pub struct PairScore {
    /// Member indices
    pub a: usize,
    pub b: usize,
    pub minutes_apart: i64,
    pub name: f64,
    pub semantic: Option<f64>,
    pub blended: f64,
    /// `None` when either side is unknown
    pub same_category: Option<bool>,
    /// `None` when either venue is unknown
    pub same_location: Option<bool>,
    pub duplicate: bool,
}

/// Events judged to be one real-world session.
#[derive(Debug, Clone)]
pub struct DuplicateCluster {
    pub members: Vec<NormalizedEvent>,
    /// Index of the elected member in `members`
    pub representative: usize,
    pub scores: Vec<PairScore>,
}

impl DuplicateCluster {
    pub fn representative(&self) -> &NormalizedEvent {
        &self.members[self.representative]
    }
}

#[derive(Debug, Clone, Default)]
pub struct DedupReport {
    pub input: usize,
    pub output: usize,
    /// Clusters with more than one member
    pub clusters: Vec<DuplicateCluster>,
}

impl DedupReport {
    pub fn merged(&self) -> usize {
        self.input - self.output
    }
}

pub struct Deduplicator {
    config: DedupConfig,
    table: Arc<CategoryTable>,
    lexical: LexicalScorer,
    semantic: Option<SemanticScorer>,
    blended: WeightedScorer,
}

impl Deduplicator {
    pub fn new(config: DedupConfig, table: Arc<CategoryTable>) -> Self {
        let blended = WeightedScorer::new().with(Box::new(LexicalScorer::new(table.clone())), 1.0);
        Self {
            config,
            lexical: LexicalScorer::new(table.clone()),
            table,
            semantic: None,
            blended,
        }
    }

    /// Blend an oracle's opinion into the score with `semantic_weight`.
    pub fn with_oracle(mut self, oracle: Arc<dyn SemanticOracle>) -> Self {
        let weight = self.config.semantic_weight;
        self.blended = WeightedScorer::new()
            .with(Box::new(LexicalScorer::new(self.table.clone())), 1.0 - weight)
            .with(Box::new(SemanticScorer::new(oracle.clone())), weight);
        self.semantic = Some(SemanticScorer::new(oracle));
        self
    }

    /// Consolidate `events`, returning survivors ordered by (instant, id).
    ///
    /// Passes repeat until one finds nothing to merge, so the output is a
    /// fixed point: deduplicating it again changes nothing.
    pub fn dedup(&self, events: Vec<NormalizedEvent>) -> (Vec<NormalizedEvent>, DedupReport) {
        let mut report = DedupReport {
            input: events.len(),
            ..Default::default()
        };

        let mut current = events;
        loop {
            let before = current.len();
            let (survivors, clusters) = self.pass(current);
            report.clusters.extend(clusters);
            current = survivors;
            if current.len() == before {
                break;
            }
        }

        report.output = current.len();
        tracing::info!(
            input = report.input,
            output = report.output,
            clusters = report.clusters.len(),
            "Deduplication finished"
        );
        (current, report)
    }

    fn pass(&self, mut events: Vec<NormalizedEvent>) -> (Vec<NormalizedEvent>, Vec<DuplicateCluster>) {
        events.sort_by(|a, b| a.start.cmp(&b.start).then_with(|| a.id.cmp(&b.id)));

        let tolerance = self.config.time_tolerance();
        let mut sets = DisjointSet::new(events.len());
        let mut scored = Vec::new();

        for i in 0..events.len() {
            for j in (i + 1)..events.len() {
                let apart = events[j].start.signed_duration_since(events[i].start);
                if apart > tolerance {
                    break;
                }
                let score = self.score_pair(&events[i], &events[j], i, j, apart.num_minutes());
                if score.duplicate
                    && !sets.union_if(i, j, |x, y| self.compatible(&events[x], &events[y]))
                {
                    tracing::debug!(
                        a = %events[i].name(),
                        b = %events[j].name(),
                        "Join rejected, clusters conflict"
                    );
                }
                scored.push(score);
            }
        }

        let mut groups: BTreeMap<usize, Vec<usize>> = BTreeMap::new();
        for idx in 0..events.len() {
            groups.entry(sets.find(idx)).or_default().push(idx);
        }

        let mut slots: Vec<Option<NormalizedEvent>> = events.into_iter().map(Some).collect();
        let mut survivors = Vec::with_capacity(groups.len());
        let mut clusters = Vec::new();

        for indices in groups.into_values() {
            let members: Vec<NormalizedEvent> =
                indices.iter().filter_map(|&i| slots[i].take()).collect();
            if members.len() == 1 {
                survivors.extend(members);
                continue;
            }

            let position = |global: usize| indices.iter().position(|&i| i == global);
            let scores = scored
                .iter()
                .filter_map(|s| {
                    Some(PairScore {
                        a: position(s.a)?,
                        b: position(s.b)?,
                        ..s.clone()
                    })
                })
                .collect();

            let representative = elect(&members);
            let merged = merge(&members, representative);
            tracing::debug!(
                representative = %merged.name(),
                source = %merged.source(),
                members = members.len(),
                "Merged duplicate cluster"
            );
            survivors.push(merged);
            clusters.push(DuplicateCluster {
                members,
                representative,
                scores,
            });
        }

        survivors.sort_by(|a, b| a.start.cmp(&b.start).then_with(|| a.id.cmp(&b.id)));
        (survivors, clusters)
    }

    fn score_pair(
        &self,
        a: &NormalizedEvent,
        b: &NormalizedEvent,
        ia: usize,
        ib: usize,
        minutes_apart: i64,
    ) -> PairScore {
        let name = self.lexical.score(a, b).unwrap_or(0.0);
        let semantic = self.semantic.as_ref().and_then(|s| s.score(a, b));
        let blended = self.blended.score(a, b).unwrap_or(name);

        let same_category = same_category(a, b);
        let same_location = same_location(a, b);

        let threshold = self.config.name_threshold;
        let duplicate = !self.vetoed(a, b) && name >= threshold && blended >= threshold;

        PairScore {
            a: ia,
            b: ib,
            minutes_apart,
            name,
            semantic,
            blended,
            same_category,
            same_location,
            duplicate,
        }
    }
}

impl Deduplicator {
    /// Known-and-different categories, or venues when the config asks for it.
    fn vetoed(&self, a: &NormalizedEvent, b: &NormalizedEvent) -> bool {
        same_category(a, b) == Some(false)
            || (self.config.require_location_match && same_location(a, b) == Some(false))
    }

    /// Whether two events may sit in one cluster: within tolerance and not vetoed.
    fn compatible(&self, a: &NormalizedEvent, b: &NormalizedEvent) -> bool {
        let apart = a.start.signed_duration_since(b.start).abs();
        apart <= self.config.time_tolerance() && !self.vetoed(a, b)
    }
}

/// `None` when either side is unknown.
fn same_category(a: &NormalizedEvent, b: &NormalizedEvent) -> Option<bool> {
    (!a.category.is_unknown() && !b.category.is_unknown())
        .then(|| a.category.code == b.category.code)
}

fn same_location(a: &NormalizedEvent, b: &NormalizedEvent) -> Option<bool> {
    (!a.location.is_empty() && !b.location.is_empty())
        .then(|| a.location.name.eq_ignore_ascii_case(&b.location.name))
}

/// Higher priority, then explicit date, then smaller content id.
fn elect(members: &[NormalizedEvent]) -> usize {
    let mut best = 0;
    for (idx, candidate) in members.iter().enumerate().skip(1) {
        if preference(candidate, &members[best]) == Ordering::Greater {
            best = idx;
        }
    }
    best
}

fn preference(a: &NormalizedEvent, b: &NormalizedEvent) -> Ordering {
    a.priority()
        .cmp(&b.priority())
        .then_with(|| (!a.from_context).cmp(&!b.from_context))
        .then_with(|| b.id.cmp(&a.id))
}

fn merge(members: &[NormalizedEvent], representative: usize) -> NormalizedEvent {
    let mut merged = members[representative].clone();

    let mut links: Vec<String> = members
        .iter()
        .flat_map(|m| m.streaming_links.iter().cloned())
        .collect();
    links.sort();
    links.dedup();
    merged.streaming_links = links;

    let mut sources: Vec<String> = members.iter().flat_map(|m| m.sources.iter().cloned()).collect();
    sources.sort();
    sources.dedup();
    merged.sources = sources;

    if merged.category.is_unknown() {
        if let Some(known) = members
            .iter()
            .filter(|m| !m.category.is_unknown())
            .max_by(|a, b| {
                a.category
                    .confidence
                    .total_cmp(&b.category.confidence)
                    .then_with(|| b.category.code.cmp(&a.category.code))
            })
        {
            merged.category = known.category.clone();
        }
    }

    if merged.location.is_empty() {
        if let Some(other) = members.iter().find(|m| !m.location.is_empty()) {
            merged.location = other.location.clone();
        }
    } else if merged.location.country.is_none() {
        merged.location.country = members
            .iter()
            .filter(|m| m.location.name.eq_ignore_ascii_case(&merged.location.name))
            .find_map(|m| m.location.country.clone());
    }

    merged
}

/// Union-find that also tracks the members under each root.
struct DisjointSet {
    parent: Vec<usize>,
    members: Vec<Vec<usize>>,
}

impl DisjointSet {
    fn new(len: usize) -> Self {
        Self {
            parent: (0..len).collect(),
            members: (0..len).map(|i| vec![i]).collect(),
        }
    }

    fn find(&mut self, mut x: usize) -> usize {
        while self.parent[x] != x {
            self.parent[x] = self.parent[self.parent[x]];
            x = self.parent[x];
        }
        x
    }

    /// Join the sets of `a` and `b` only if every cross pair is `compatible`.
    ///
    /// Returns whether both end up in one set. The smaller root wins so roots
    /// stay the earliest member.
    fn union_if(&mut self, a: usize, b: usize, compatible: impl Fn(usize, usize) -> bool) -> bool {
        let (ra, rb) = (self.find(a), self.find(b));
        if ra == rb {
            return true;
        }
        let fits = self.members[ra]
            .iter()
            .all(|&x| self.members[rb].iter().all(|&y| compatible(x, y)));
        if !fits {
            return false;
        }

        let (keep, drop) = if ra < rb { (ra, rb) } else { (rb, ra) };
        self.parent[drop] = keep;
        let moved = std::mem::take(&mut self.members[drop]);
        self.members[keep].extend(moved);
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        ResolvedLocation,
        testing::{categorized, event},
    };

    fn dedup() -> Deduplicator {
        Deduplicator::new(DedupConfig::default(), Arc::new(CategoryTable::default()))
    }

    fn f1(source: &str, name: &str, minutes: i64, priority: u32) -> NormalizedEvent {
        categorized(source, name, minutes, priority, "F1", "Formula 1")
    }

    #[test]
    fn three_spellings_of_one_session_collapse() {
        let events = vec![
            f1("a", "F1 Qualifying", 0, 1),
            f1("b", "Formula 1 Qualifying", 5, 1),
            f1("c", "F1 - Qualifying", 10, 1),
        ];
        let (out, report) = dedup().dedup(events);

        assert_eq!(out.len(), 1);
        assert_eq!(report.merged(), 2);
        assert_eq!(report.clusters.len(), 1);
        assert_eq!(report.clusters[0].members.len(), 3);
        assert_eq!(out[0].sources, vec!["a", "b", "c"]);
        assert!(report.clusters[0].scores.iter().all(|s| s.duplicate));
    }

    #[test]
    fn higher_priority_is_elected() {
        let mut low = f1("low", "F1 Race", 0, 1);
        low.streaming_links = vec!["https://b.tv".to_string()];
        let mut high = f1("high", "Formula 1 Race", 2, 5);
        high.streaming_links = vec!["https://a.tv".to_string()];

        for events in [vec![low.clone(), high.clone()], vec![high.clone(), low.clone()]] {
            let (out, report) = dedup().dedup(events);
            assert_eq!(out.len(), 1);
            assert_eq!(out[0].source(), "high");
            assert_eq!(out[0].streaming_links, vec!["https://a.tv", "https://b.tv"]);
            assert_eq!(report.clusters[0].representative().source(), "high");
        }
    }

    #[test]
    fn explicit_date_beats_context_date_on_priority_tie() {
        let mut inferred = f1("a", "F1 Race", 0, 2);
        inferred.from_context = true;
        let explicit = f1("b", "F1 Race", 0, 2);

        let (out, _) = dedup().dedup(vec![inferred, explicit]);
        assert_eq!(out.len(), 1);
        assert_eq!(out[0].source(), "b");
    }

    #[test]
    fn content_id_breaks_remaining_ties() {
        let a = f1("a", "F1 Race", 0, 2);
        let b = f1("b", "F1 Race", 0, 2);
        let expected = if a.id < b.id { "a" } else { "b" };

        let (out, _) = dedup().dedup(vec![a, b]);
        assert_eq!(out[0].source(), expected);
    }

    #[test]
    fn events_outside_tolerance_are_kept() {
        let (out, report) = dedup().dedup(vec![
            f1("a", "F1 Race", 0, 1),
            f1("b", "F1 Race", 31, 1),
        ]);
        assert_eq!(out.len(), 2);
        assert!(report.clusters.is_empty());
    }

    #[test]
    fn different_categories_never_merge() {
        let (out, _) = dedup().dedup(vec![
            categorized("a", "Qualifying", 0, 1, "F2", "Formula 2"),
            categorized("b", "Qualifying", 0, 1, "F3", "Formula 3"),
        ]);
        assert_eq!(out.len(), 2);
    }

    #[test]
    fn location_veto_is_optional() {
        let mut a = f1("a", "F1 Race", 0, 1);
        a.location = ResolvedLocation {
            name: "Spa".to_string(),
            country: None,
        };
        let mut b = f1("b", "F1 Race", 0, 1);
        b.location = ResolvedLocation {
            name: "Monza".to_string(),
            country: None,
        };

        let (out, _) = dedup().dedup(vec![a.clone(), b.clone()]);
        assert_eq!(out.len(), 1);

        let strict = Deduplicator::new(
            DedupConfig {
                require_location_match: true,
                ..Default::default()
            },
            Arc::new(CategoryTable::default()),
        );
        let (out, _) = strict.dedup(vec![a, b]);
        assert_eq!(out.len(), 2);
    }

    #[test]
    fn merge_fills_unknown_category_and_country() {
        let mut rep = event("high", "F1 Sprint", 0, 9);
        rep.location = ResolvedLocation {
            name: "Interlagos".to_string(),
            country: None,
        };
        let mut other = f1("low", "Formula 1 Sprint", 3, 1);
        other.location = ResolvedLocation {
            name: "interlagos".to_string(),
            country: Some("Brasil".to_string()),
        };

        let (out, _) = dedup().dedup(vec![rep, other]);
        assert_eq!(out.len(), 1);
        assert_eq!(out[0].source(), "high");
        assert_eq!(out[0].category.code, "F1");
        assert_eq!(out[0].location.country.as_deref(), Some("Brasil"));
    }

    #[test]
    fn dedup_is_idempotent() {
        let events = vec![
            f1("a", "F1 Qualifying", 0, 1),
            f1("b", "Formula 1 Qualifying", 5, 2),
            event("c", "F1 Qualifying", 8, 1),
            f1("a", "F1 Race", 120, 1),
            categorized("d", "Moto2 Race", 125, 1, "MOTO2", "Moto2"),
            event("e", "Formula 1 Race", 130, 1),
        ];
        let d = dedup();
        let (once, _) = d.dedup(events);
        let (twice, report) = d.dedup(once.clone());

        assert_eq!(report.merged(), 0);
        let ids = |v: &[NormalizedEvent]| v.iter().map(|e| e.id.clone()).collect::<Vec<_>>();
        assert_eq!(ids(&once), ids(&twice));
    }

    #[test]
    fn result_ignores_input_order() {
        let events = vec![
            f1("a", "F1 Qualifying", 0, 1),
            f1("b", "Formula 1 Qualifying", 5, 1),
            f1("c", "F1 - Qualifying", 10, 1),
            f1("a", "F1 Race", 200, 1),
            f1("b", "Formula 1 Race", 210, 3),
        ];
        let mut reversed = events.clone();
        reversed.reverse();
        let mut rotated = events.clone();
        rotated.rotate_left(2);

        let d = dedup();
        let (expected, _) = d.dedup(events);
        for input in [reversed, rotated] {
            let (out, _) = d.dedup(input);
            let summary = |v: &[NormalizedEvent]| {
                v.iter()
                    .map(|e| (e.id.clone(), e.sources.clone(), e.streaming_links.clone()))
                    .collect::<Vec<_>>()
            };
            assert_eq!(summary(&out), summary(&expected));
        }
    }

    #[test]
    fn semantic_oracle_can_block_a_weak_lexical_match() {
        struct Disagrees;
        impl SemanticOracle for Disagrees {
            fn similarity(&self, _: &str, _: &str) -> Option<f64> {
                Some(0.0)
            }
        }

        let config = DedupConfig {
            semantic_weight: 0.5,
            ..Default::default()
        };
        let d = Deduplicator::new(config, Arc::new(CategoryTable::default()))
            .with_oracle(Arc::new(Disagrees));
        let (out, _) = d.dedup(vec![f1("a", "F1 Race", 0, 1), f1("b", "F1 Race", 0, 1)]);
        assert_eq!(out.len(), 2);
    }

    #[test]
    fn unknown_event_cannot_bridge_two_categories() {
        let events = vec![
            categorized("a", "Qualifying", 0, 1, "F2", "Formula 2"),
            event("b", "Qualifying", 5, 1),
            categorized("c", "Qualifying", 10, 1, "F3", "Formula 3"),
        ];
        let d = dedup();
        let (out, report) = d.dedup(events.clone());

        let mut codes: Vec<_> = out.iter().map(|e| e.category.code.as_str()).collect();
        codes.sort();
        assert_eq!(codes, vec!["F2", "F3"]);
        assert_eq!(report.merged(), 1);
        assert_eq!(report.clusters.len(), 1);
        assert_eq!(report.clusters[0].members.len(), 2);

        let mut reversed = events;
        reversed.reverse();
        let (again, _) = d.dedup(reversed);
        let ids = |v: &[NormalizedEvent]| v.iter().map(|e| e.id.clone()).collect::<Vec<_>>();
        assert_eq!(ids(&again), ids(&out));
    }

    #[test]
    fn shared_venue_cannot_bridge_two_venues() {
        let at = |source: &str, minutes: i64, venue: &str| {
            let mut e = f1(source, "F1 Race", minutes, 1);
            e.location = ResolvedLocation {
                name: venue.to_string(),
                country: None,
            };
            e
        };
        let strict = Deduplicator::new(
            DedupConfig {
                require_location_match: true,
                ..Default::default()
            },
            Arc::new(CategoryTable::default()),
        );
        let (out, _) = strict.dedup(vec![
            at("a", 0, "Spa"),
            f1("b", "F1 Race", 5, 1),
            at("c", 10, "Monza"),
        ]);
        assert_eq!(out.len(), 2);
    }

    #[test]
    fn clusters_never_span_more_than_the_tolerance() {
        // 0 and 25 pair, 25 and 50 pair, but 0 and 50 are 50 minutes apart
        let (out, report) = dedup().dedup(vec![
            f1("a", "F1 Race", 0, 3),
            f1("b", "F1 Race", 25, 1),
            f1("c", "F1 Race", 50, 1),
        ]);

        assert_eq!(out.len(), 2);
        assert_eq!(report.clusters.len(), 1);
        assert_eq!(report.clusters[0].representative().source(), "a");
        let sources: Vec<_> = out.iter().map(|e| e.sources.clone()).collect();
        assert_eq!(sources, vec![vec!["a", "b"], vec!["c"]]);
    }

    #[test]
    fn chain_inside_the_tolerance_is_one_cluster() {
        let (out, report) = dedup().dedup(vec![
            f1("a", "F1 Race", 0, 1),
            f1("b", "F1 Race", 12, 1),
            f1("c", "F1 Race", 24, 1),
        ]);
        assert_eq!(out.len(), 1);
        assert_eq!(report.clusters[0].members.len(), 3);
    }
}
