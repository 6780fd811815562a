//! Deduplicating aggregation of many reports into one summary.

use std::collections::BTreeMap;

use indexmap::IndexMap;
use report_types::{AggregatedSummary, CanonicalField, ParsedReport};
use tracing::debug;

use crate::aliases::DEFAULT_PLACEHOLDERS;
use crate::normalize::{EntityKind, is_degenerate_person, split_team};

/// Group used for reports that carry no grouping value.
pub const UNASSIGNED_GROUP: &str = "Unassigned";

// ── Unique set ───────────────────────────────────────────────────────

/// Insertion-ordered key → first-seen display map.
#[derive(Debug, Clone)]
pub struct UniqueSet {
    kind: EntityKind,
    entries: IndexMap<String, String>,
}

impl UniqueSet {
    pub fn new(kind: EntityKind) -> Self {
        UniqueSet {
            kind,
            entries: IndexMap::new(),
        }
    }

    /// Add a raw value. Returns true when it introduced a new key; blank
    /// values and values already represented are absorbed.
    pub fn insert(&mut self, raw: &str) -> bool {
        let display = self.kind.display(raw);
        let key = self.kind.key(raw);
        if display.is_empty() || key.is_empty() {
            return false;
        }
        if let Some(existing) = self.entries.get(&key) {
            debug!(raw, kept = %existing, "absorbed duplicate");
            return false;
        }
        self.entries.insert(key, display);
        true
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Display values sorted lexicographically.
    pub fn into_sorted(self) -> Vec<String> {
        let mut values: Vec<String> = self.entries.into_values().collect();
        values.sort();
        values
    }
}

// ── Aggregator ───────────────────────────────────────────────────────

#[derive(Debug, Clone)]
pub struct Aggregator {
    placeholders: Vec<String>,
}

impl Default for Aggregator {
    fn default() -> Self {
        Self::new(DEFAULT_PLACEHOLDERS.iter().map(|s| s.to_string()).collect())
    }
}

impl Aggregator {
    pub fn new(placeholders: Vec<String>) -> Self {
        Aggregator { placeholders }
    }

    /// Add every labourer named in a team string to `set`.
    pub fn add_team(&self, set: &mut UniqueSet, team: &str) {
        for name in split_team(team) {
            let display = EntityKind::Person.display(name);
            if is_degenerate_person(&display, &self.placeholders) {
                continue;
            }
            set.insert(name);
        }
    }

    /// Merge a batch of reports. Missing or malformed values only drop
    /// out of their own set; they never fail the aggregation.
    pub fn aggregate<'a, I>(&self, reports: I) -> AggregatedSummary
    where
        I: IntoIterator<Item = &'a ParsedReport>,
    {
        let mut locations = UniqueSet::new(EntityKind::Location);
        let mut labourers = UniqueSet::new(EntityKind::Person);
        let mut activity_types = UniqueSet::new(EntityKind::Label);
        let mut summary = AggregatedSummary::default();

        for report in reports {
            summary.total_outreaches += 1;
            summary.total_saved = summary
                .total_saved
                .saturating_add(report.number(CanonicalField::Saved).unwrap_or(0));
            summary.total_healed = summary
                .total_healed
                .saturating_add(report.number(CanonicalField::Healed).unwrap_or(0));

            if let Some(location) = report.text(CanonicalField::Location) {
                locations.insert(location);
            }
            if let Some(team) = report.text(CanonicalField::PreachersTeam) {
                self.add_team(&mut labourers, team);
            }
            if let Some(kind) = report.text(CanonicalField::ActivityType) {
                activity_types.insert(kind);
            }
            if let Some(text) = report.text(CanonicalField::MessageSummary) {
                let text = text.trim();
                if !text.is_empty() {
                    summary.message_summaries.push(text.to_string());
                }
            }
        }

        debug!(
            reports = summary.total_outreaches,
            locations = locations.len(),
            labourers = labourers.len(),
            activity_types = activity_types.len(),
            "aggregated batch"
        );
        summary.locations = locations.into_sorted();
        summary.labourers = labourers.into_sorted();
        summary.activity_types = activity_types.into_sorted();
        summary
    }

    /// Aggregate separately per grouping value, e.g. per area.
    pub fn aggregate_by<'a, I, F>(&self, reports: I, key_fn: F) -> BTreeMap<String, AggregatedSummary>
    where
        I: IntoIterator<Item = &'a ParsedReport>,
        F: Fn(&ParsedReport) -> Option<String>,
    {
        let mut groups: BTreeMap<String, Vec<&ParsedReport>> = BTreeMap::new();
        for report in reports {
            let key = key_fn(report)
                .map(|k| k.trim().to_string())
                .filter(|k| !k.is_empty())
                .unwrap_or_else(|| UNASSIGNED_GROUP.to_string());
            groups.entry(key).or_default().push(report);
        }

        groups
            .into_iter()
            .map(|(key, members)| (key, self.aggregate(members)))
            .collect()
    }
}

/// Group key: the report's area field.
pub fn by_area(report: &ParsedReport) -> Option<String> {
    report.text(CanonicalField::Area).map(str::to_string)
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn report(location: &str, team: &str, kind: &str, saved: u32) -> ParsedReport {
        ParsedReport::new()
            .with(CanonicalField::Location, location)
            .with(CanonicalField::PreachersTeam, team)
            .with(CanonicalField::ActivityType, kind)
            .with(CanonicalField::MessageSummary, format!("at {location}"))
            .with(CanonicalField::Saved, saved)
            .with(CanonicalField::Healed, 1u32)
    }

    #[test]
    fn test_first_seen_location_display_wins() {
        let reports = vec![
            report("Sakubva.", "Br Tadiwa", "Street", 1),
            report("sakubva", "Br Tadiwa", "Street", 1),
        ];
        let summary = Aggregator::default().aggregate(&reports);
        assert_eq!(summary.locations, vec!["Sakubva.".to_string()]);

        let reversed: Vec<_> = reports.into_iter().rev().collect();
        let summary = Aggregator::default().aggregate(&reversed);
        assert_eq!(summary.locations, vec!["sakubva".to_string()]);
    }

    #[test]
    fn test_honorific_variants_collapse() {
        let reports = vec![
            report("A", "Br Tadiwa and Sister Grace", "Street", 0),
            report("B", "Brother Tadiwa., sr grace", "Street", 0),
            report("C", "BR TADIWA", "Street", 0),
        ];
        let summary = Aggregator::default().aggregate(&reports);
        assert_eq!(
            summary.labourers,
            vec!["Br Tadiwa".to_string(), "Sister Grace".to_string()]
        );
    }

    #[test]
    fn test_placeholders_and_short_names_dropped() {
        let reports = vec![
            report("A", "Not Specified", "Street", 0),
            report("B", "UNKNOWN, n/a, None, -", "Street", 0),
            report("C", "Jo", "Street", 0),
        ];
        let summary = Aggregator::default().aggregate(&reports);
        assert!(summary.labourers.is_empty());
    }

    #[test]
    fn test_totals_and_summaries() {
        let reports = vec![
            report("A", "Br Tadiwa", "Street", 3),
            report("B", "Br Tadiwa", "Crusade", 2),
        ];
        let summary = Aggregator::default().aggregate(&reports);
        assert_eq!(summary.total_outreaches, 2);
        assert_eq!(summary.total_saved, 5);
        assert_eq!(summary.total_healed, 2);
        assert_eq!(summary.activity_types, vec!["Crusade", "Street"]);
        assert_eq!(summary.message_summaries, vec!["at A", "at B"]);
    }

    #[test]
    fn test_output_sorted_not_insertion_ordered() {
        let reports = vec![
            report("Zimunya", "Sr Ruth", "Street", 0),
            report("Birchenough", "Br Alan", "Street", 0),
        ];
        let summary = Aggregator::default().aggregate(&reports);
        assert_eq!(summary.locations, vec!["Birchenough", "Zimunya"]);
        assert_eq!(summary.labourers, vec!["Br Alan", "Sr Ruth"]);
    }

    #[test]
    fn test_malformed_records_are_tolerated() {
        let broken = ParsedReport::new()
            .with(CanonicalField::Location, 7u32)
            .with(CanonicalField::Saved, "lots");
        let reports = vec![broken, report("Sakubva", "Br Tadiwa", "Street", 2)];
        let summary = Aggregator::default().aggregate(&reports);
        assert_eq!(summary.total_outreaches, 2);
        assert_eq!(summary.total_saved, 2);
        assert_eq!(summary.locations, vec!["Sakubva"]);
    }

    #[test]
    fn test_location_parentheses_and_slashes() {
        let reports = vec![
            report("Dangamvura / Chikanga", "Br A. Moyo", "Street", 0),
            report("(dangamvura/chikanga)", "Br A. Moyo", "Street", 0),
        ];
        let summary = Aggregator::default().aggregate(&reports);
        assert_eq!(summary.locations, vec!["Dangamvura / Chikanga"]);
    }

    #[test]
    fn test_aggregate_by_area() {
        let reports = vec![
            report("A", "Br Tadiwa", "Street", 1).with(CanonicalField::Area, "Mutare East"),
            report("B", "Sr Grace", "Street", 2).with(CanonicalField::Area, "Mutare West"),
            report("C", "Sr Ruth", "Street", 4),
            report("D", "Br Tadiwa", "Street", 8).with(CanonicalField::Area, " Mutare East "),
        ];
        let groups = Aggregator::default().aggregate_by(&reports, by_area);
        let keys: Vec<_> = groups.keys().cloned().collect();
        assert_eq!(keys, vec!["Mutare East", "Mutare West", UNASSIGNED_GROUP]);
        assert_eq!(groups["Mutare East"].total_saved, 9);
        assert_eq!(groups["Mutare East"].labourers, vec!["Br Tadiwa"]);
        assert_eq!(groups[UNASSIGNED_GROUP].total_outreaches, 1);
    }

    #[test]
    fn test_empty_batch() {
        let summary = Aggregator::default().aggregate(&Vec::<ParsedReport>::new());
        assert_eq!(summary, AggregatedSummary::default());
    }

    fn name_variant() -> impl Strategy<Value = String> {
        let base = prop_oneof![Just("Tadiwa"), Just("Grace"), Just("Ruth Moyo")];
        let title = prop_oneof![Just("Br "), Just("Brother "), Just("Sr "), Just("Sister "), Just("")];
        let tail = prop_oneof![Just(""), Just("."), Just(","), Just(" ;")];
        let upper = any::<bool>();
        (title, base, tail, upper).prop_map(|(t, b, x, u)| {
            let s = format!("{t}{b}{x}");
            if u { s.to_uppercase() } else { s }
        })
    }

    proptest! {
        #[test]
        fn prop_reaggregation_is_a_fixed_point(
            teams in proptest::collection::vec(proptest::collection::vec(name_variant(), 1..4), 1..6),
            places in proptest::collection::vec(
                prop_oneof![Just("Sakubva."), Just("sakubva"), Just("(Dangamvura)"), Just("Dangamvura / Chikanga")],
                1..6,
            ),
        ) {
            let reports: Vec<ParsedReport> = teams
                .iter()
                .zip(places.iter().cycle())
                .map(|(team, place)| report(place, &team.join(", "), "Street", 0))
                .collect();
            let agg = Aggregator::default();
            let first = agg.aggregate(&reports);

            let mut people = UniqueSet::new(EntityKind::Person);
            for name in &first.labourers {
                agg.add_team(&mut people, name);
            }
            let mut locations = UniqueSet::new(EntityKind::Location);
            for place in &first.locations {
                locations.insert(place);
            }
            prop_assert_eq!(people.len(), first.labourers.len());
            prop_assert_eq!(locations.len(), first.locations.len());
        }

        #[test]
        fn prop_placeholder_only_teams_yield_no_labourers(
            picks in proptest::collection::vec(
                (prop_oneof![Just("not specified"), Just("unknown"), Just("n/a"), Just("none"), Just("-")], any::<bool>()),
                1..8,
            ),
        ) {
            let team = picks
                .iter()
                .map(|(p, upper)| if *upper { p.to_uppercase() } else { p.to_string() })
                .collect::<Vec<_>>()
                .join(", ");
            let summary = Aggregator::default().aggregate(&[report("A", &team, "Street", 0)]);
            prop_assert!(summary.labourers.is_empty());
        }
    }
}
