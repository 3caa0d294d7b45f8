use crate::config::SchemaConfig;
use crate::error::SchemaWarning;
use indexmap::{IndexMap, IndexSet};
use serde::Deserialize;
use std::cell::RefCell;
use strum::IntoEnumIterator;

/// The categories of type names the compiler derives from a base type name.
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Hash,
    Deserialize,
    strum_macros::Display,
    strum_macros::EnumIter,
)]
pub enum DerivedTypeKind {
    FilterInput,
    ListFilterInput,
    ListElementFilterInput,
    FieldsListFilterInput,
    Aggregation,
    AggregatedValues,
    GroupedBy,
    AggregationSubAggregations,
    SubAggregation,
    SubAggregationConnection,
    SubAggregationSubAggregations,
    Edge,
    Connection,
    SortOrder,
    SortOrderInput,
}

impl DerivedTypeKind {
    /// The default naming template; `{base}` is replaced with the base name.
    pub fn default_format(&self) -> String {
        format!("{{base}}{self}")
    }
}

/// Names every derived type, honoring configured format templates and
/// per-name overrides, and remembers which overrides were actually consulted
/// so unused ones can be reported.
pub struct Namer {
    formats: IndexMap<DerivedTypeKind, String>,
    type_name_overrides: IndexMap<String, String>,
    enum_value_overrides_by_type: IndexMap<String, IndexMap<String, String>>,
    used_type_name_overrides: RefCell<IndexSet<String>>,
    used_enum_value_overrides: RefCell<IndexSet<(String, String)>>,
    seen_derived_names: RefCell<IndexSet<String>>,
    seen_enum_values: RefCell<IndexSet<(String, String)>>,
}

impl Namer {
    pub fn new(config: &SchemaConfig) -> Self {
        let mut formats: IndexMap<DerivedTypeKind, String> = DerivedTypeKind::iter()
            .map(|kind| (kind, kind.default_format()))
            .collect();
        for (kind, format) in &config.derived_type_name_formats {
            formats.insert(*kind, format.clone());
        }
        Self {
            formats,
            type_name_overrides: config.type_name_overrides.clone(),
            enum_value_overrides_by_type: config.enum_value_overrides_by_type.clone(),
            used_type_name_overrides: RefCell::new(IndexSet::new()),
            used_enum_value_overrides: RefCell::new(IndexSet::new()),
            seen_derived_names: RefCell::new(IndexSet::new()),
            seen_enum_values: RefCell::new(IndexSet::new()),
        }
    }

    /// The name of the `kind` type derived from `base`.
    pub fn derived(&self, kind: DerivedTypeKind, base: &str) -> String {
        let format = &self.formats[&kind];
        let name = format.replace("{base}", base);
        self.seen_derived_names.borrow_mut().insert(name.clone());
        match self.type_name_overrides.get(&name) {
            Some(replacement) => {
                self.used_type_name_overrides
                    .borrow_mut()
                    .insert(name.clone());
                replacement.clone()
            }
            None => name,
        }
    }

    /// The emitted name for an enum value, after per-type value overrides.
    pub fn enum_value(&self, type_name: &str, value: &str) -> String {
        self.seen_enum_values
            .borrow_mut()
            .insert((type_name.to_owned(), value.to_owned()));
        match self
            .enum_value_overrides_by_type
            .get(type_name)
            .and_then(|overrides| overrides.get(value))
        {
            Some(replacement) => {
                self.used_enum_value_overrides
                    .borrow_mut()
                    .insert((type_name.to_owned(), value.to_owned()));
                replacement.clone()
            }
            None => value.to_owned(),
        }
    }

    /// Overrides that were never consulted, reported with a nearest-name
    /// suggestion where one is plausible.
    pub fn unused_override_warnings(&self) -> Vec<SchemaWarning> {
        let mut warnings = Vec::new();

        let used = self.used_type_name_overrides.borrow();
        let seen = self.seen_derived_names.borrow();
        for name in self.type_name_overrides.keys() {
            if !used.contains(name) {
                warnings.push(SchemaWarning::UnusedTypeNameOverride {
                    name: name.clone(),
                    suggestion: did_you_mean(name, seen.iter().map(String::as_str)),
                });
            }
        }

        let used_values = self.used_enum_value_overrides.borrow();
        let seen_values = self.seen_enum_values.borrow();
        for (type_name, overrides) in &self.enum_value_overrides_by_type {
            for value in overrides.keys() {
                let key = (type_name.clone(), value.clone());
                if !used_values.contains(&key) {
                    let candidates = seen_values
                        .iter()
                        .filter(|(seen_type, _)| seen_type == type_name)
                        .map(|(_, seen_value)| seen_value.as_str())
                        .collect::<Vec<_>>();
                    let suggestion = did_you_mean(value, candidates.iter().copied()).or_else(|| {
                        // The type itself may be misspelled.
                        did_you_mean(
                            type_name,
                            seen_values.iter().map(|(seen_type, _)| seen_type.as_str()),
                        )
                    });
                    warnings.push(SchemaWarning::UnusedEnumValueOverride {
                        type_name: type_name.clone(),
                        value: value.clone(),
                        suggestion,
                    });
                }
            }
        }

        warnings
    }
}

/// Returns the candidate most similar to `target`, when similar enough that
/// a typo is the likely explanation.
pub(crate) fn did_you_mean<'a>(
    target: &str,
    candidates: impl IntoIterator<Item = &'a str>,
) -> Option<String> {
    const THRESHOLD: f64 = 0.8;
    candidates
        .into_iter()
        .map(|candidate| (candidate, strsim::jaro_winkler(target, candidate)))
        .filter(|(_, score)| *score >= THRESHOLD)
        .max_by(|(_, a), (_, b)| a.total_cmp(b))
        .map(|(candidate, _)| candidate.to_owned())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn namer_with(config_fn: impl FnOnce(&mut SchemaConfig)) -> Namer {
        let mut config = SchemaConfig::default();
        config_fn(&mut config);
        Namer::new(&config)
    }

    #[test]
    fn default_formats_append_the_category() {
        let namer = namer_with(|_| {});
        assert_eq!(
            namer.derived(DerivedTypeKind::FilterInput, "Widget"),
            "WidgetFilterInput"
        );
        assert_eq!(
            namer.derived(DerivedTypeKind::SortOrderInput, "Widget"),
            "WidgetSortOrderInput"
        );
        assert_eq!(
            namer.derived(DerivedTypeKind::SubAggregation, "TeamSeason"),
            "TeamSeasonSubAggregation"
        );
    }

    #[test]
    fn format_and_name_overrides_apply_in_sequence() {
        let namer = namer_with(|config| {
            config
                .derived_type_name_formats
                .insert(DerivedTypeKind::FilterInput, "{base}Predicate".to_owned());
            config
                .type_name_overrides
                .insert("WidgetPredicate".to_owned(), "WidgetWhere".to_owned());
        });
        assert_eq!(
            namer.derived(DerivedTypeKind::FilterInput, "Widget"),
            "WidgetWhere"
        );
    }

    #[test]
    fn unused_overrides_are_reported_with_suggestions() {
        let namer = namer_with(|config| {
            config
                .type_name_overrides
                .insert("WidgettFilterInput".to_owned(), "Gadget".to_owned());
        });
        namer.derived(DerivedTypeKind::FilterInput, "Widget");
        let warnings = namer.unused_override_warnings();
        assert_eq!(warnings.len(), 1);
        match &warnings[0] {
            SchemaWarning::UnusedTypeNameOverride { name, suggestion } => {
                assert_eq!(name, "WidgettFilterInput");
                assert_eq!(suggestion.as_deref(), Some("WidgetFilterInput"));
            }
            other => panic!("unexpected warning: {other:?}"),
        }
    }

    #[test]
    fn enum_value_overrides_track_usage() {
        let namer = namer_with(|config| {
            let mut overrides = IndexMap::new();
            overrides.insert("MONDAY".to_owned(), "MON".to_owned());
            overrides.insert("MONDAYY".to_owned(), "M".to_owned());
            config
                .enum_value_overrides_by_type
                .insert("DayOfWeek".to_owned(), overrides);
        });
        assert_eq!(namer.enum_value("DayOfWeek", "MONDAY"), "MON");
        assert_eq!(namer.enum_value("DayOfWeek", "TUESDAY"), "TUESDAY");
        let warnings = namer.unused_override_warnings();
        assert_eq!(warnings.len(), 1);
        match &warnings[0] {
            SchemaWarning::UnusedEnumValueOverride {
                type_name,
                value,
                suggestion,
            } => {
                assert_eq!(type_name, "DayOfWeek");
                assert_eq!(value, "MONDAYY");
                assert_eq!(suggestion.as_deref(), Some("MONDAY"));
            }
            other => panic!("unexpected warning: {other:?}"),
        }
    }

    #[test]
    fn did_you_mean_requires_similarity() {
        assert_eq!(
            did_you_mean("Widgett", ["Widget", "Gizmo"]),
            Some("Widget".to_owned())
        );
        assert_eq!(did_you_mean("Zebra", ["Widget", "Gizmo"]), None);
    }
}
