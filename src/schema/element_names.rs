use crate::config::{NameForm, SchemaElementNamesConfig};
use crate::error::SchemaError;
use crate::schema::namer::did_you_mean;
use heck::ToLowerCamelCase;
use indexmap::IndexMap;

/// Every generated field and argument name the compiler can emit, in its
/// canonical snake_case form. Overrides must name one of these.
pub const CANONICAL_ELEMENT_NAMES: &[&str] = &[
    // filter operators
    "equal_to_any_of",
    "gt",
    "gte",
    "lt",
    "lte",
    "any_of",
    "all_of",
    "not",
    "any_satisfy",
    "count",
    "matches",
    "matches_query",
    "matches_phrase",
    "time_of_day",
    "time_zone",
    "near",
    "query",
    "phrase",
    "allowed_edits_per_term",
    "require_all_terms",
    "latitude",
    "longitude",
    "max_distance",
    "unit",
    // aggregation selections
    "grouped_by",
    "aggregated_values",
    "sub_aggregations",
    "count_detail",
    "approximate_value",
    "exact_value",
    "upper_bound",
    "approximate_sum",
    "exact_sum",
    "approximate_avg",
    "exact_min",
    "exact_max",
    "approximate_distinct_value_count",
    // date/time grouping
    "granularity",
    "offset",
    "offset_ms",
    "as_date",
    "as_date_time",
    "as_day_of_week",
    "as_time_of_day",
    // relay pagination
    "edges",
    "nodes",
    "node",
    "cursor",
    "page_info",
    "total_edge_count",
    "start_cursor",
    "end_cursor",
    "has_next_page",
    "has_previous_page",
    // query arguments
    "filter",
    "order_by",
    "first",
    "after",
    "last",
    "before",
];

/// Resolves canonical element names to their emitted form: the configured
/// casing first, then any per-element override.
#[derive(Debug, Clone)]
pub struct SchemaElementNames {
    form: NameForm,
    overrides: IndexMap<String, String>,
}

impl SchemaElementNames {
    pub fn new(config: &SchemaElementNamesConfig) -> Result<Self, SchemaError> {
        for name in config.overrides.keys() {
            if !CANONICAL_ELEMENT_NAMES.contains(&name.as_str()) {
                return Err(SchemaError::UnknownElementNameOverride {
                    name: name.clone(),
                    suggestion: did_you_mean(name, CANONICAL_ELEMENT_NAMES.iter().copied()),
                });
            }
        }
        Ok(Self {
            form: config.form,
            overrides: config.overrides.clone(),
        })
    }

    pub fn form(&self) -> NameForm {
        self.form
    }

    /// The emitted name for a canonical element.
    pub fn of(&self, canonical: &str) -> String {
        debug_assert!(
            CANONICAL_ELEMENT_NAMES.contains(&canonical),
            "`{canonical}` is not a canonical schema element name"
        );
        if let Some(replacement) = self.overrides.get(canonical) {
            return replacement.clone();
        }
        match self.form {
            NameForm::SnakeCase => canonical.to_owned(),
            NameForm::CamelCase => canonical.to_lower_camel_case(),
        }
    }

    /// Applies the configured casing to a generated name that is built from
    /// user input (e.g. a root aggregations field), without override lookup.
    pub fn cased(&self, snake_cased: &str) -> String {
        match self.form {
            NameForm::SnakeCase => snake_cased.to_owned(),
            NameForm::CamelCase => snake_cased.to_lower_camel_case(),
        }
    }

    pub fn overrides(&self) -> &IndexMap<String, String> {
        &self.overrides
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn names(form: NameForm) -> SchemaElementNames {
        SchemaElementNames::new(&SchemaElementNamesConfig {
            form,
            overrides: IndexMap::new(),
        })
        .unwrap()
    }

    #[test]
    fn snake_case_passes_canonical_names_through() {
        let names = names(NameForm::SnakeCase);
        assert_eq!(names.of("equal_to_any_of"), "equal_to_any_of");
        assert_eq!(names.of("grouped_by"), "grouped_by");
    }

    #[test]
    fn camel_case_converts_canonical_names() {
        let names = names(NameForm::CamelCase);
        assert_eq!(names.of("equal_to_any_of"), "equalToAnyOf");
        assert_eq!(names.of("page_info"), "pageInfo");
        assert_eq!(names.of("gt"), "gt");
    }

    #[test]
    fn overrides_beat_the_form() {
        let mut overrides = IndexMap::new();
        overrides.insert("any_of".to_owned(), "anyOfThese".to_owned());
        let names = SchemaElementNames::new(&SchemaElementNamesConfig {
            form: NameForm::SnakeCase,
            overrides,
        })
        .unwrap();
        assert_eq!(names.of("any_of"), "anyOfThese");
        assert_eq!(names.of("not"), "not");
    }

    #[test]
    fn unknown_overrides_fail_with_a_suggestion() {
        let mut overrides = IndexMap::new();
        overrides.insert("equl_to_any_of".to_owned(), "eq".to_owned());
        let error = SchemaElementNames::new(&SchemaElementNamesConfig {
            form: NameForm::SnakeCase,
            overrides,
        })
        .unwrap_err();
        match error {
            SchemaError::UnknownElementNameOverride { name, suggestion } => {
                assert_eq!(name, "equl_to_any_of");
                assert_eq!(suggestion.as_deref(), Some("equal_to_any_of"));
            }
            other => panic!("unexpected error: {other}"),
        }
    }
}
