use crate::derive::{graphql_visible, is_filterable, supports_range_filtering};
use crate::error::SchemaErrors;
use crate::schema::definitions::{
    FieldDef, InputFieldDef, InputTypeDef, ScalarTypeDef, TypeDef,
};
use crate::schema::element_names::SchemaElementNames;
use crate::schema::namer::{DerivedTypeKind, Namer};
use crate::schema::registry::SchemaRegistry;
use indexmap::IndexMap;

/// Derives the filter input family for every filterable type: `TFilterInput`
/// plus the list variants. Unreferenced filter inputs are pruned away during
/// SDL normalization, so generation here is exhaustive rather than
/// demand-driven.
pub(crate) fn derive(
    registry: &mut SchemaRegistry,
    names: &SchemaElementNames,
    namer: &Namer,
) -> Result<(), SchemaErrors> {
    let mut generated = Vec::new();

    let base_types: Vec<String> = registry
        .types()
        .values()
        .filter(|type_def| filterable_base_type(type_def))
        .map(|type_def| type_def.name().to_owned())
        .collect();

    for type_name in base_types {
        let predicates = predicates_for(registry, names, namer, &type_name);
        generated.extend(filter_input_family(
            registry, names, namer, &type_name, &type_name, predicates,
        ));
    }

    // Fields mapped as `text` filter through the full-text family instead of
    // the keyword-equality `StringFilterInput`. A user-defined `Text` type
    // supplies its own family above.
    if !registry.contains_type("Text") {
        generated.extend(filter_input_family(
            registry,
            names,
            namer,
            "Text",
            "String",
            full_text_predicates(names),
        ));
    }

    for type_def in generated {
        registry.register_type(type_def).map_err(SchemaErrors::from)?;
    }
    Ok(())
}

fn filterable_base_type(type_def: &TypeDef) -> bool {
    if type_def.derived_from().is_some() {
        return false;
    }
    match type_def {
        // Cursors are opaque; Input types are never filtered.
        TypeDef::Scalar(scalar) => scalar.name != "Cursor",
        TypeDef::Enum(_) | TypeDef::Union(_) | TypeDef::Interface(_) => true,
        TypeDef::Object(object) => !object.graphql_only,
        TypeDef::Input(_) => false,
    }
}

/// Builds `TFilterInput`, `TListFilterInput`, `TListElementFilterInput` and,
/// for non-leaf object types, `TFieldsListFilterInput`.
fn filter_input_family(
    registry: &SchemaRegistry,
    names: &SchemaElementNames,
    namer: &Namer,
    base: &str,
    graphql_type: &str,
    predicates: Vec<InputFieldDef>,
) -> Vec<TypeDef> {
    let filter_name = namer.derived(DerivedTypeKind::FilterInput, base);
    let list_filter_name = namer.derived(DerivedTypeKind::ListFilterInput, base);
    let element_filter_name = namer.derived(DerivedTypeKind::ListElementFilterInput, base);

    let mut result = Vec::new();

    let mut filter = InputTypeDef {
        name: filter_name.clone(),
        documentation: Some(format!(
            "Input type used to specify filters on `{graphql_type}` fields."
        )),
        derived_from: Some((DerivedTypeKind::FilterInput, base.to_owned())),
        ..Default::default()
    };
    add_input_field(
        &mut filter,
        any_of_field(names, &filter_name),
    );
    add_input_field(&mut filter, not_field(names, &filter_name));
    for predicate in &predicates {
        add_input_field(&mut filter, predicate.clone());
    }
    result.push(TypeDef::Input(filter));

    let mut list_filter = InputTypeDef {
        name: list_filter_name.clone(),
        documentation: Some(format!(
            "Input type used to specify filters on `[{graphql_type}]` fields."
        )),
        derived_from: Some((DerivedTypeKind::ListFilterInput, base.to_owned())),
        ..Default::default()
    };
    add_input_field(&mut list_filter, any_of_field(names, &list_filter_name));
    add_input_field(
        &mut list_filter,
        InputFieldDef::new(names.of("all_of"), &format!("[{list_filter_name}!]")).doc(
            "Matches records where all of the provided sub-filters evaluate to true. This \
             works just like an AND operator in SQL. When `null` is passed, matches all \
             documents. When an empty list is passed, this part of the filter matches all \
             documents.",
        ),
    );
    add_input_field(&mut list_filter, not_field(names, &list_filter_name));
    add_input_field(
        &mut list_filter,
        InputFieldDef::new(names.of("any_satisfy"), &element_filter_name).doc(
            "Matches records where any of the list elements match the provided \
             sub-filter. When `null` is passed, matches all documents.",
        ),
    );
    add_input_field(&mut list_filter, count_field(names, namer));
    result.push(TypeDef::Input(list_filter));

    let mut element_filter = InputTypeDef {
        name: element_filter_name.clone(),
        documentation: Some(format!(
            "Input type used to specify filters on elements of a `[{graphql_type}]` field."
        )),
        derived_from: Some((DerivedTypeKind::ListElementFilterInput, base.to_owned())),
        ..Default::default()
    };
    add_input_field(&mut element_filter, any_of_field(names, &element_filter_name));
    // No `not` here: the datastore cannot express "any element is NOT
    // matching" as the negation of "any element matches" -- for list fields
    // those mean different things.
    for predicate in &predicates {
        add_input_field(&mut element_filter, predicate.clone());
    }
    result.push(TypeDef::Input(element_filter));

    if let Some(object) = registry.type_named(base).and_then(TypeDef::as_object) {
        if object.mapping.is_none() {
            result.push(fields_list_filter(registry, names, namer, base, &object.fields));
        }
    }

    result
}

fn fields_list_filter(
    registry: &SchemaRegistry,
    names: &SchemaElementNames,
    namer: &Namer,
    base: &str,
    fields: &IndexMap<String, FieldDef>,
) -> TypeDef {
    let name = namer.derived(DerivedTypeKind::FieldsListFilterInput, base);
    let mut filter = InputTypeDef {
        name: name.clone(),
        documentation: Some(format!(
            "Input type used to specify filters on a `{base}` object referenced directly \
             or transitively from a list field that has been configured to index each leaf \
             field as its own flattened list of values."
        )),
        derived_from: Some((DerivedTypeKind::FieldsListFilterInput, base.to_owned())),
        ..Default::default()
    };
    add_input_field(&mut filter, any_of_field(names, &name));
    add_input_field(&mut filter, not_field(names, &name));

    let count_name = names.of("count");
    for field in fields.values() {
        if !is_filterable(registry, field) {
            continue;
        }
        // Inside a flattened object list, every leaf is itself a list of
        // values, so subfields filter through the list family.
        let filter_type = match field_filter_base(registry, field) {
            FilterBase::FieldsList(inner) => {
                namer.derived(DerivedTypeKind::FieldsListFilterInput, &inner)
            }
            FilterBase::Leaf(inner) => namer.derived(DerivedTypeKind::ListFilterInput, &inner),
        };
        let doc = format!(
            "Used to filter on the `{}` field. When `null` is passed, matches all documents.",
            field.name
        );
        add_input_field(
            &mut filter,
            InputFieldDef::new(field.name.clone(), &filter_type).doc(doc),
        );
    }
    if !filter.fields.contains_key(&count_name) {
        add_input_field(&mut filter, count_field(names, namer));
    }
    TypeDef::Input(filter)
}

enum FilterBase {
    /// Filter through `<name>FilterInput` / `<name>ListFilterInput`.
    Leaf(String),
    /// A non-leaf object list flattened without `nested`.
    FieldsList(String),
}

fn field_filter_base(registry: &SchemaRegistry, field: &FieldDef) -> FilterBase {
    let unwrapped = field.ty.fully_unwrapped();
    let mapping = crate::derive::mapping_type(registry, field);
    if mapping == "text" && unwrapped == "String" {
        return FilterBase::Leaf("Text".to_owned());
    }
    let non_leaf_object = matches!(
        registry.type_named(unwrapped),
        Some(TypeDef::Object(object)) if object.mapping.is_none()
    );
    if non_leaf_object && field.ty.is_list() && mapping != "nested" {
        FilterBase::FieldsList(unwrapped.to_owned())
    } else {
        FilterBase::Leaf(unwrapped.to_owned())
    }
}

/// The filter input type used for `field` wherever a filter is offered.
pub(crate) fn filter_type_for_field(
    registry: &SchemaRegistry,
    namer: &Namer,
    field: &FieldDef,
) -> Option<String> {
    if !is_filterable(registry, field) {
        return None;
    }
    Some(match field_filter_base(registry, field) {
        FilterBase::FieldsList(inner) => {
            namer.derived(DerivedTypeKind::FieldsListFilterInput, &inner)
        }
        FilterBase::Leaf(inner) => {
            if field.ty.is_list() {
                namer.derived(DerivedTypeKind::ListFilterInput, &inner)
            } else {
                namer.derived(DerivedTypeKind::FilterInput, &inner)
            }
        }
    })
}

fn predicates_for(
    registry: &SchemaRegistry,
    names: &SchemaElementNames,
    namer: &Namer,
    type_name: &str,
) -> Vec<InputFieldDef> {
    match registry.type_named(type_name) {
        Some(TypeDef::Scalar(scalar)) => scalar_predicates(names, scalar),
        Some(TypeDef::Enum(enum_def)) => vec![equal_to_any_of_field(names, &enum_def.name)],
        Some(TypeDef::Object(object)) => {
            if let Some(mapping) = &object.mapping {
                if mapping.mapping_type == "geo_point" {
                    return vec![InputFieldDef::new(
                        names.of("near"),
                        "GeoLocationDistanceFilterInput",
                    )
                    .doc(
                        "Matches records where the field's geographic location is within \
                         a specified distance from the location identified by `latitude` \
                         and `longitude`. When `null` or an empty object is passed, \
                         matches all documents.",
                    )];
                }
            }
            subfield_predicates(registry, namer, &object.fields)
        }
        Some(TypeDef::Interface(interface)) => {
            subfield_predicates(registry, namer, &interface.fields)
        }
        Some(TypeDef::Union(union_def)) => {
            let mut merged: IndexMap<String, FieldDef> = IndexMap::new();
            for member in &union_def.members {
                if let Some(fields) = registry.type_named(member).and_then(TypeDef::fields) {
                    for (name, field) in fields {
                        merged.entry(name.clone()).or_insert_with(|| field.clone());
                    }
                }
            }
            subfield_predicates(registry, namer, &merged)
        }
        _ => Vec::new(),
    }
}

fn subfield_predicates(
    registry: &SchemaRegistry,
    namer: &Namer,
    fields: &IndexMap<String, FieldDef>,
) -> Vec<InputFieldDef> {
    let mut predicates = Vec::new();
    for field in fields.values() {
        if !graphql_visible(field) {
            continue;
        }
        if let Some(filter_type) = filter_type_for_field(registry, namer, field) {
            predicates.push(
                InputFieldDef::new(field.name.clone(), &filter_type).doc(format!(
                    "Used to filter on the `{}` field. When `null` is passed, matches all \
                     documents.",
                    field.name
                )),
            );
        }
    }
    predicates
}

fn scalar_predicates(names: &SchemaElementNames, scalar: &ScalarTypeDef) -> Vec<InputFieldDef> {
    let mut predicates = vec![equal_to_any_of_field(names, &scalar.name)];
    if supports_range_filtering(&scalar.mapping.mapping_type) {
        for (canonical, comparator) in [
            ("gt", "greater than (>)"),
            ("gte", "greater than or equal to (>=)"),
            ("lt", "less than (<)"),
            ("lte", "less than or equal to (<=)"),
        ] {
            predicates.push(
                InputFieldDef::new(names.of(canonical), &scalar.name).doc(format!(
                    "Matches records where the field value is {comparator} the provided \
                     value. When `null` is passed, matches all documents."
                )),
            );
        }
    }
    if scalar.name == "DateTime" {
        predicates.push(
            InputFieldDef::new(names.of("time_of_day"), "DateTimeTimeOfDayFilterInput").doc(
                "Matches records based on the time-of-day of the `DateTime` values. When \
                 `null` or an empty object is passed, matches all documents.",
            ),
        );
    }
    predicates
}

fn full_text_predicates(names: &SchemaElementNames) -> Vec<InputFieldDef> {
    vec![
        InputFieldDef::new(names.of("matches"), "String").doc(
            "Matches records where the field value matches the provided value using full \
             text search. When `null` is passed, matches all documents.",
        ),
        InputFieldDef::new(names.of("matches_query"), "MatchesQueryFilterInput").doc(
            "Matches records where the field value matches the provided query using full \
             text search. This is more lenient than `matches_phrase`: the order of terms \
             is ignored, and, by default, only one search term is required to be in the \
             field value. When `null` is passed, matches all documents.",
        ),
        InputFieldDef::new(names.of("matches_phrase"), "MatchesPhraseFilterInput").doc(
            "Matches records where the field value has a phrase matching the provided \
             phrase using full text search. This is stricter than `matches_query`: all \
             terms must match and be in the same order as the provided phrase. When \
             `null` is passed, matches all documents.",
        ),
    ]
}

fn equal_to_any_of_field(names: &SchemaElementNames, graphql_type: &str) -> InputFieldDef {
    InputFieldDef::new(names.of("equal_to_any_of"), &format!("[{graphql_type}]")).doc(
        "Matches records where the field value is equal to any of the provided values. \
         This works just like an IN operator in SQL. When `null` is passed, matches all \
         documents. When an empty list is passed, this part of the filter matches no \
         documents. When `null` is passed in the list, this part of the filter matches \
         records where the field value is `null`.",
    )
}

fn any_of_field(names: &SchemaElementNames, self_name: &str) -> InputFieldDef {
    InputFieldDef::new(names.of("any_of"), &format!("[{self_name}!]")).doc(
        "Matches records where any of the provided sub-filters evaluate to true. This \
         works just like an OR operator in SQL. When `null` is passed, matches all \
         documents. When an empty list is passed, this part of the filter matches no \
         documents.",
    )
}

fn not_field(names: &SchemaElementNames, self_name: &str) -> InputFieldDef {
    InputFieldDef::new(names.of("not"), self_name).doc(
        "Matches records where the provided sub-filter evaluates to false. When `null` \
         is passed, matches all documents.",
    )
}

fn count_field(names: &SchemaElementNames, namer: &Namer) -> InputFieldDef {
    InputFieldDef::new(
        names.of("count"),
        &namer.derived(DerivedTypeKind::FilterInput, "Int"),
    )
    .doc(
        "Used to filter on the number of non-null elements in this list field. When \
         `null` or an empty object is passed, matches all documents.",
    )
}

fn add_input_field(input: &mut InputTypeDef, field: InputFieldDef) {
    input.fields.insert(field.name.clone(), field);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::SchemaConfig;
    use crate::schema::builder::SchemaDefinition;
    use crate::schema::built_ins;
    use crate::schema::element_names::SchemaElementNames;

    fn derived_registry(
        f: impl FnOnce(&mut SchemaDefinition) -> Result<(), crate::error::SchemaError>,
    ) -> SchemaRegistry {
        let config = SchemaConfig::default();
        let mut api = SchemaDefinition::new(config.clone()).unwrap();
        f(&mut api).unwrap();
        let names = SchemaElementNames::new(&config.schema_element_names).unwrap();
        let namer = Namer::new(&config);
        built_ins::register_built_ins(&mut api.registry, &names, &namer, &[]).unwrap();
        api.registry.complete_user_definition();
        derive(&mut api.registry, &names, &namer).unwrap();
        api.registry
    }

    fn field_names(input: &InputTypeDef) -> Vec<&str> {
        input.fields.keys().map(String::as_str).collect()
    }

    #[test]
    fn numeric_scalars_get_range_predicates() {
        let registry = derived_registry(|_| Ok(()));
        let int_filter = registry.type_named("IntFilterInput").unwrap().as_input().unwrap();
        assert_eq!(
            field_names(int_filter),
            ["any_of", "not", "equal_to_any_of", "gt", "gte", "lt", "lte"]
        );
    }

    #[test]
    fn keyword_scalars_get_equality_only() {
        let registry = derived_registry(|_| Ok(()));
        let id_filter = registry.type_named("IDFilterInput").unwrap().as_input().unwrap();
        assert_eq!(field_names(id_filter), ["any_of", "not", "equal_to_any_of"]);
    }

    #[test]
    fn date_time_gets_time_of_day() {
        let registry = derived_registry(|_| Ok(()));
        let filter = registry
            .type_named("DateTimeFilterInput")
            .unwrap()
            .as_input()
            .unwrap();
        let fields = field_names(filter);
        assert!(fields.contains(&"time_of_day"));
        assert_eq!(
            filter.fields["time_of_day"].ty.to_string(),
            "DateTimeTimeOfDayFilterInput"
        );
    }

    #[test]
    fn list_element_filters_omit_not() {
        let registry = derived_registry(|_| Ok(()));
        let element = registry
            .type_named("IntListElementFilterInput")
            .unwrap()
            .as_input()
            .unwrap();
        assert!(!element.fields.contains_key("not"));
        assert!(element.fields.contains_key("any_of"));

        let list = registry
            .type_named("IntListFilterInput")
            .unwrap()
            .as_input()
            .unwrap();
        assert!(list.fields.contains_key("not"));
        assert_eq!(list.fields["any_satisfy"].ty.to_string(), "IntListElementFilterInput");
        assert_eq!(list.fields["count"].ty.to_string(), "IntFilterInput");
    }

    #[test]
    fn object_filters_expose_filterable_subfields() {
        let registry = derived_registry(|api| {
            api.object_type("Widget", |t| {
                t.field("id", "ID!")?;
                t.field("name", "String")?.mapping("text", &[]);
                t.field("tags", "[String!]")?;
                t.field("secret", "String")?.indexing_only();
                t.index("widgets")?;
                Ok(())
            })
        });
        let filter = registry
            .type_named("WidgetFilterInput")
            .unwrap()
            .as_input()
            .unwrap();
        assert_eq!(filter.fields["id"].ty.to_string(), "IDFilterInput");
        assert_eq!(filter.fields["name"].ty.to_string(), "TextFilterInput");
        assert_eq!(filter.fields["tags"].ty.to_string(), "StringListFilterInput");
        assert!(!filter.fields.contains_key("secret"));
    }

    #[test]
    fn geo_location_filters_through_near() {
        let registry = derived_registry(|_| Ok(()));
        let filter = registry
            .type_named("GeoLocationFilterInput")
            .unwrap()
            .as_input()
            .unwrap();
        assert_eq!(field_names(filter), ["any_of", "not", "near"]);
    }

    #[test]
    fn flattened_object_lists_use_fields_list_filters() {
        let registry = derived_registry(|api| {
            api.object_type("Part", |t| {
                t.field("id", "ID!")?;
                t.field("name", "String")?;
                Ok(())
            })?;
            api.object_type("Widget", |t| {
                t.field("id", "ID!")?;
                t.field("parts", "[Part!]")?;
                t.index("widgets")?;
                Ok(())
            })
        });
        let filter = registry
            .type_named("WidgetFilterInput")
            .unwrap()
            .as_input()
            .unwrap();
        assert_eq!(
            filter.fields["parts"].ty.to_string(),
            "PartFieldsListFilterInput"
        );
        let fields_list = registry
            .type_named("PartFieldsListFilterInput")
            .unwrap()
            .as_input()
            .unwrap();
        assert_eq!(
            fields_list.fields["name"].ty.to_string(),
            "StringListFilterInput"
        );
        assert!(fields_list.fields.contains_key("count"));
    }
}
