use crate::schema::definitions::{DerivedFieldFunction, DerivedIndexedType};
use indexmap::IndexMap;
use lazy_static::lazy_static;
use sha2::{Digest, Sha256};

/// A datastore stored script: static (from the fixed repository) or
/// generated from a `derived_indexed_type` rule.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DatastoreScript {
    /// `<context>/<name>`, e.g. `update/index_data`.
    pub scoped_name: String,
    pub context: &'static str,
    pub language: &'static str,
    pub source: String,
}

impl DatastoreScript {
    fn new(scoped_name: &str, context: &'static str, source: &str) -> Self {
        Self {
            scoped_name: scoped_name.to_owned(),
            context,
            language: "painless",
            source: source.to_owned(),
        }
    }

    /// Content-addressed ID: consumers reference scripts by this without
    /// further resolution, and any source change produces a new ID.
    pub fn id(&self) -> String {
        let digest = Sha256::digest(
            format!("{}:{}:{}", self.context, self.language, self.source).as_bytes(),
        );
        format!("{}_{}", self.scoped_name.replace('/', "_"), &hex(&digest)[..32])
    }
}

fn hex(bytes: &[u8]) -> String {
    bytes.iter().map(|b| format!("{b:02x}")).collect()
}

const INDEX_DATA_SOURCE: &str = r#"
Map source = ctx._source;
String relationship = params.containsKey('relationship') ? params.relationship : '__self';

if (source.__versions == null) {
  source.__versions = [:];
}
if (source.__versions[relationship] == null) {
  source.__versions[relationship] = [:];
}

Map versions = source.__versions[relationship];
Long eventVersion = params.__version;
Long documentVersion = versions[params.id];

if (documentVersion != null && documentVersion >= eventVersion) {
  ctx.op = 'none';
} else {
  versions[params.id] = eventVersion;

  if (source.__sources == null) {
    source.__sources = [];
  }
  if (!source.__sources.contains(relationship)) {
    source.__sources.add(relationship);
    Collections.sort(source.__sources);
  }

  for (entry in params.data.entrySet()) {
    source[entry.getKey()] = entry.getValue();
  }
}
"#;

const BY_TIME_OF_DAY_SOURCE: &str = r#"
ZoneId zoneId = ZoneId.of(params.time_zone);
long timestampMillis = doc[params.field].value.toInstant().toEpochMilli();
LocalTime localTime = Instant.ofEpochMilli(timestampMillis).atZone(zoneId).toLocalTime();
long timeOfDayNanos = localTime.toNanoOfDay();

if (params.containsKey('equal_to_any_of')) {
  return params.equal_to_any_of.contains(timeOfDayNanos);
}
boolean matches = true;
if (params.containsKey('gt'))  { matches = matches && timeOfDayNanos >  (long) params.gt; }
if (params.containsKey('gte')) { matches = matches && timeOfDayNanos >= (long) params.gte; }
if (params.containsKey('lt'))  { matches = matches && timeOfDayNanos <  (long) params.lt; }
if (params.containsKey('lte')) { matches = matches && timeOfDayNanos <= (long) params.lte; }
return matches;
"#;

lazy_static! {
    /// The fixed repository of static scripts, keyed by scoped name.
    pub static ref STATIC_SCRIPTS: Vec<DatastoreScript> = vec![
        DatastoreScript::new("update/index_data", "update", INDEX_DATA_SOURCE.trim_start()),
        DatastoreScript::new("filter/by_time_of_day", "filter", BY_TIME_OF_DAY_SOURCE.trim_start()),
    ];
}

pub fn static_script_ids_by_scoped_name() -> IndexMap<String, String> {
    STATIC_SCRIPTS
        .iter()
        .map(|script| (script.scoped_name.clone(), script.id()))
        .collect()
}

pub fn index_data_update_script_id() -> String {
    STATIC_SCRIPTS
        .iter()
        .find(|script| script.scoped_name == "update/index_data")
        .map(DatastoreScript::id)
        .unwrap_or_default()
}

const APPEND_ONLY_SET_HELPER: &str = r#"
boolean appendOnlySet_idempotentlyInsertValues(List values, List sortedList) {
  boolean listUpdated = false;
  for (def value : values) {
    int binarySearchResult = Collections.binarySearch(sortedList, value);
    if (binarySearchResult < 0) {
      sortedList.add(-binarySearchResult - 1, value);
      listUpdated = true;
    }
  }
  return listUpdated;
}
"#;

const IMMUTABLE_VALUE_HELPER: &str = r#"
boolean immutableValue_setValue(String fieldName, Map doc, def value) {
  def currentValue = doc[fieldName];
  if (currentValue == null) {
    doc[fieldName] = value;
    return true;
  }
  if (currentValue != value) {
    throw new IllegalArgumentException(
      "Field [" + fieldName + "] cannot be changed ([" + currentValue + "] => [" + value + "]).");
  }
  return false;
}
"#;

const MIN_VALUE_HELPER: &str = r#"
boolean minValue_updateValue(String fieldName, Map doc, def value) {
  def currentValue = doc[fieldName];
  if (currentValue == null || value.compareTo(currentValue) < 0) {
    doc[fieldName] = value;
    return true;
  }
  return false;
}
"#;

const MAX_VALUE_HELPER: &str = r#"
boolean maxValue_updateValue(String fieldName, Map doc, def value) {
  def currentValue = doc[fieldName];
  if (currentValue == null || value.compareTo(currentValue) > 0) {
    doc[fieldName] = value;
    return true;
  }
  return false;
}
"#;

/// Generates the update script merging one source record into a document of
/// the derived indexed type described by `rule`.
pub fn derived_indexed_type_script(
    source_type: &str,
    rule: &DerivedIndexedType,
) -> DatastoreScript {
    let mut helpers: Vec<&str> = Vec::new();
    let mut statements: Vec<String> = Vec::new();

    for function in &rule.fields {
        match function {
            DerivedFieldFunction::AppendOnlySet { field, source } => {
                if !helpers.contains(&APPEND_ONLY_SET_HELPER) {
                    helpers.push(APPEND_ONLY_SET_HELPER);
                }
                statements.push(format!(
                    "if (doc['{field}'] == null) {{ doc['{field}'] = []; }}\n\
                     changed = appendOnlySet_idempotentlyInsertValues(params.data['{source}'], doc['{field}']) || changed;"
                ));
            }
            DerivedFieldFunction::ImmutableValue { field, source } => {
                if !helpers.contains(&IMMUTABLE_VALUE_HELPER) {
                    helpers.push(IMMUTABLE_VALUE_HELPER);
                }
                statements.push(format!(
                    "changed = immutableValue_setValue('{field}', doc, params.data['{source}']) || changed;"
                ));
            }
            DerivedFieldFunction::MinValue { field, source } => {
                if !helpers.contains(&MIN_VALUE_HELPER) {
                    helpers.push(MIN_VALUE_HELPER);
                }
                statements.push(format!(
                    "changed = minValue_updateValue('{field}', doc, params.data['{source}']) || changed;"
                ));
            }
            DerivedFieldFunction::MaxValue { field, source } => {
                if !helpers.contains(&MAX_VALUE_HELPER) {
                    helpers.push(MAX_VALUE_HELPER);
                }
                statements.push(format!(
                    "changed = maxValue_updateValue('{field}', doc, params.data['{source}']) || changed;"
                ));
            }
        }
    }

    let source = format!(
        "{}\nMap doc = ctx._source;\nboolean changed = false;\n{}\nif (!changed) {{\n  ctx.op = 'none';\n}}\n",
        helpers
            .iter()
            .map(|helper| helper.trim())
            .collect::<Vec<_>>()
            .join("\n\n"),
        statements.join("\n")
    );

    DatastoreScript::new(
        &format!("update/{}_from_{}", rule.destination_type, source_type),
        "update",
        source.trim_start(),
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_rule() -> DerivedIndexedType {
        DerivedIndexedType {
            destination_type: "WidgetCurrency".to_owned(),
            id_source: "cost.currency".to_owned(),
            routing_value_source: None,
            rollover_timestamp_value_source: None,
            fields: vec![
                DerivedFieldFunction::AppendOnlySet {
                    field: "widget_ids".to_owned(),
                    source: "id".to_owned(),
                },
                DerivedFieldFunction::ImmutableValue {
                    field: "name".to_owned(),
                    source: "cost.currency_name".to_owned(),
                },
            ],
        }
    }

    #[test]
    fn script_ids_are_content_addressed_and_stable() {
        let script = derived_indexed_type_script("Widget", &sample_rule());
        let again = derived_indexed_type_script("Widget", &sample_rule());
        assert_eq!(script.id(), again.id());
        assert!(script.id().starts_with("update_WidgetCurrency_from_Widget_"));
        // scoped name prefix + 32 hex chars
        let suffix = script.id();
        let suffix = suffix.rsplit('_').next().unwrap();
        assert_eq!(suffix.len(), 32);
        assert!(suffix.chars().all(|c| c.is_ascii_hexdigit()));
    }

    #[test]
    fn source_changes_change_the_id() {
        let script = derived_indexed_type_script("Widget", &sample_rule());
        let mut other_rule = sample_rule();
        other_rule.fields.push(DerivedFieldFunction::MaxValue {
            field: "newest_widget_created_at".to_owned(),
            source: "created_at".to_owned(),
        });
        let other = derived_indexed_type_script("Widget", &other_rule);
        assert_ne!(script.id(), other.id());
    }

    #[test]
    fn helpers_are_emitted_once_per_kind() {
        let mut rule = sample_rule();
        rule.fields.push(DerivedFieldFunction::AppendOnlySet {
            field: "tag_names".to_owned(),
            source: "tags.name".to_owned(),
        });
        let script = derived_indexed_type_script("Widget", &rule);
        assert_eq!(
            script
                .source
                .matches("boolean appendOnlySet_idempotentlyInsertValues")
                .count(),
            1
        );
    }

    #[test]
    fn static_scripts_cover_update_and_filter_contexts() {
        let ids = static_script_ids_by_scoped_name();
        assert!(ids.contains_key("update/index_data"));
        assert!(ids.contains_key("filter/by_time_of_day"));
        assert_eq!(index_data_update_script_id(), ids["update/index_data"]);
    }
}
