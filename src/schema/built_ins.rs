use crate::error::SchemaError;
use crate::schema::definitions::{
    EnumTypeDef, EnumValueDef, FieldDef, InputFieldDef, InputTypeDef, MappingDef, ObjectTypeDef,
    ScalarTypeDef, TypeDef,
};
use crate::schema::element_names::SchemaElementNames;
use crate::schema::namer::Namer;
use crate::schema::registry::{SchemaRegistry, TypeCustomization};
use crate::schema::type_ref::TypeRef;
use serde_json::json;

/// GraphQL's five standard scalars. They are registered (they carry mappings
/// and JSON schemas) but never emitted as SDL definitions.
pub const STANDARD_GRAPHQL_SCALARS: &[&str] = &["Boolean", "Float", "ID", "Int", "String"];

pub const INT_MIN: i64 = i32::MIN as i64;
pub const INT_MAX: i64 = i32::MAX as i64;
/// The largest integer magnitude a JSON `number` can carry without loss.
pub const JSON_SAFE_LONG_MIN: i64 = -((1_i64 << 53) - 1);
pub const JSON_SAFE_LONG_MAX: i64 = (1_i64 << 53) - 1;

/// Registers every built-in type. Runs after the user closure so that
/// `on_built_in_types` callbacks registered inside it apply, and after
/// extension modules have had the chance to install their own callbacks.
pub fn register_built_ins(
    registry: &mut SchemaRegistry,
    names: &SchemaElementNames,
    namer: &Namer,
    callbacks: &[TypeCustomization],
) -> Result<(), SchemaError> {
    let mut register = |mut type_def: TypeDef| -> Result<(), SchemaError> {
        for callback in callbacks {
            callback(&mut type_def);
        }
        registry.register_type(type_def)
    };

    for scalar in built_in_scalars() {
        register(TypeDef::Scalar(scalar))?;
    }
    for enum_def in built_in_enums(namer) {
        register(TypeDef::Enum(enum_def))?;
    }
    for object in built_in_objects(names) {
        register(TypeDef::Object(object))?;
    }
    for input in built_in_inputs(names) {
        register(TypeDef::Input(input))?;
    }
    Ok(())
}

fn scalar(
    name: &str,
    mapping: MappingDef,
    json_schema: serde_json::Value,
    documentation: Option<&str>,
) -> ScalarTypeDef {
    ScalarTypeDef {
        name: name.to_owned(),
        documentation: documentation.map(str::to_owned),
        directives: Vec::new(),
        mapping,
        json_schema,
        built_in: true,
    }
}

fn built_in_scalars() -> Vec<ScalarTypeDef> {
    vec![
        scalar(
            "Boolean",
            MappingDef::of_type("boolean"),
            json!({"type": "boolean"}),
            None,
        ),
        scalar(
            "Float",
            MappingDef::of_type("double"),
            json!({"type": "number"}),
            None,
        ),
        scalar("ID", MappingDef::of_type("keyword"), json!({"type": "string"}), None),
        scalar(
            "Int",
            MappingDef::of_type("integer"),
            json!({"type": "integer", "minimum": INT_MIN, "maximum": INT_MAX}),
            None,
        ),
        scalar(
            "String",
            MappingDef::of_type("keyword"),
            json!({"type": "string"}),
            None,
        ),
        scalar(
            "Cursor",
            MappingDef::of_type("keyword"),
            json!({"type": "string"}),
            Some(
                "An opaque string value representing a specific location in a paginated \
                 connection. Obtained from a `cursor` field, and usable as `before` or \
                 `after` arguments to continue paginating from that location.",
            ),
        ),
        scalar(
            "Date",
            MappingDef::of_type("date").with_option("format", json!("strict_date")),
            json!({"type": "string", "format": "date"}),
            Some("A date, represented as an ISO 8601 date string (`2021-07-04`)."),
        ),
        scalar(
            "DateTime",
            MappingDef::of_type("date").with_option("format", json!("strict_date_time")),
            json!({"type": "string", "format": "date-time"}),
            Some(
                "A timestamp, represented as an ISO 8601 date-time string \
                 (`2021-07-04T12:30:00Z`).",
            ),
        ),
        scalar(
            "LocalTime",
            MappingDef::of_type("date")
                .with_option("format", json!("HH:mm:ss||HH:mm:ss.S||HH:mm:ss.SS||HH:mm:ss.SSS")),
            json!({
                "type": "string",
                "pattern": "^(?:[01][0-9]|2[0-3]):[0-5][0-9]:[0-5][0-9](?:\\.[0-9]{1,3})?$"
            }),
            Some(
                "A local time such as `23:59:33` or `07:20:47.454`, without a date or \
                 time zone.",
            ),
        ),
        scalar(
            "TimeZone",
            MappingDef::of_type("keyword"),
            json!({"type": "string"}),
            Some("An IANA time zone identifier, such as `America/Los_Angeles` or `UTC`."),
        ),
        scalar(
            "JsonSafeLong",
            MappingDef::of_type("long"),
            json!({
                "type": "integer",
                "minimum": JSON_SAFE_LONG_MIN,
                "maximum": JSON_SAFE_LONG_MAX
            }),
            Some(
                "A numeric type for large integer values in the inclusive range -2^53 \
                 (-9,007,199,254,740,991) to 2^53 (9,007,199,254,740,991). Values of this \
                 type can be serialized in JSON without loss of precision.",
            ),
        ),
        scalar(
            "LongString",
            MappingDef::of_type("long"),
            json!({
                "anyOf": [
                    {"type": "integer", "minimum": i64::MIN, "maximum": i64::MAX},
                    {"type": "string", "pattern": "^-?[0-9]+$"}
                ]
            }),
            Some(
                "A numeric type for large integer values in the inclusive range -2^63 \
                 (-9,223,372,036,854,775,808) to (2^63 - 1) (9,223,372,036,854,775,807). \
                 Values exceeding the JSON-safe integer range lose precision as JSON \
                 numbers, so events may carry them as either an integer or a string of \
                 digits, and GraphQL responses return them as strings.",
            ),
        ),
        scalar(
            "Untyped",
            MappingDef::of_type("keyword"),
            json!({"type": ["array", "boolean", "integer", "null", "number", "object", "string"]}),
            Some(
                "A JSON value of any type. Stored in the index as its serialized JSON \
                 text; only equality filtering is supported.",
            ),
        ),
    ]
}

fn enum_type(
    namer: &Namer,
    name: &str,
    documentation: &str,
    values: &[(&str, Option<&str>)],
) -> EnumTypeDef {
    let mut type_def = EnumTypeDef {
        name: name.to_owned(),
        documentation: Some(documentation.to_owned()),
        ..Default::default()
    };
    for (value, value_doc) in values {
        let emitted = namer.enum_value(name, value);
        type_def.values.insert(
            emitted.clone(),
            EnumValueDef {
                name: emitted,
                original_name: (*value).to_owned(),
                documentation: value_doc.map(|d| d.to_owned()),
                directives: Vec::new(),
                sort_clause: None,
            },
        );
    }
    type_def
}

fn built_in_enums(namer: &Namer) -> Vec<EnumTypeDef> {
    vec![
        enum_type(
            namer,
            "DayOfWeek",
            "Indicates the specific day of the week.",
            &[
                ("MONDAY", None),
                ("TUESDAY", None),
                ("WEDNESDAY", None),
                ("THURSDAY", None),
                ("FRIDAY", None),
                ("SATURDAY", None),
                ("SUNDAY", None),
            ],
        ),
        enum_type(
            namer,
            "DateGroupingGranularity",
            "Enumerates the supported granularities of a `Date`.",
            &[
                ("YEAR", None),
                ("QUARTER", None),
                ("MONTH", None),
                ("WEEK", None),
                ("DAY", None),
            ],
        ),
        enum_type(
            namer,
            "DateTimeGroupingGranularity",
            "Enumerates the supported granularities of a `DateTime`.",
            &[
                ("YEAR", None),
                ("QUARTER", None),
                ("MONTH", None),
                ("WEEK", None),
                ("DAY", None),
                ("HOUR", None),
                ("MINUTE", None),
                ("SECOND", None),
            ],
        ),
        enum_type(
            namer,
            "LocalTimeGroupingGranularity",
            "Enumerates the supported granularities of a `LocalTime`.",
            &[("HOUR", None), ("MINUTE", None), ("SECOND", None)],
        ),
        enum_type(
            namer,
            "DistanceUnit",
            "Enumerates the supported distance units.",
            &[
                ("MILE", None),
                ("YARD", None),
                ("FOOT", None),
                ("INCH", None),
                ("KILOMETER", None),
                ("METER", None),
                ("CENTIMETER", None),
                ("MILLIMETER", None),
                ("NAUTICAL_MILE", None),
            ],
        ),
        enum_type(
            namer,
            "MatchesQueryAllowedEditsPerTerm",
            "Enumeration of allowed values for the `matches_query: {allowed_edits_per_term: ...}` filter option.",
            &[
                ("NONE", Some("No allowed edits per term.")),
                (
                    "DYNAMIC",
                    Some("Allowed edits per term is dynamically chosen based on the length of the term."),
                ),
            ],
        ),
    ]
}

fn graphql_only_field(names_field: &str, names: &SchemaElementNames, ty: &str) -> FieldDef {
    let mut field = FieldDef::new(names.of(names_field), TypeRef::parse(ty).unwrap());
    field.graphql_only = true;
    field
}

fn built_in_objects(names: &SchemaElementNames) -> Vec<ObjectTypeDef> {
    let mut page_info = ObjectTypeDef {
        name: "PageInfo".to_owned(),
        documentation: Some(
            "Provides information about the specific fetched page. This implements the \
             `PageInfo` specification from the Relay GraphQL Cursor Connections \
             Specification."
                .to_owned(),
        ),
        graphql_only: true,
        ..Default::default()
    };
    for (canonical, ty, doc) in [
        (
            "has_next_page",
            "Boolean!",
            "Indicates if there is another page of results available after the current one.",
        ),
        (
            "has_previous_page",
            "Boolean!",
            "Indicates if there is another page of results available before the current one.",
        ),
        (
            "start_cursor",
            "Cursor",
            "The `Cursor` of the first edge of the current page. This can be passed in the \
             next query as a `before` argument to paginate backwards.",
        ),
        (
            "end_cursor",
            "Cursor",
            "The `Cursor` of the last edge of the current page. This can be passed in the \
             next query as an `after` argument to paginate forwards.",
        ),
    ] {
        let mut field = graphql_only_field(canonical, names, ty);
        field.documentation = Some(doc.to_owned());
        page_info.fields.insert(field.name.clone(), field);
    }

    let mut geo_location = ObjectTypeDef {
        name: "GeoLocation".to_owned(),
        documentation: Some(
            "Geographic coordinates representing a location on the Earth's surface.".to_owned(),
        ),
        mapping: Some(MappingDef::of_type("geo_point")),
        ..Default::default()
    };
    let mut latitude = FieldDef::new(names.of("latitude"), TypeRef::parse("Float!").unwrap());
    latitude.name_in_index = "lat".to_owned();
    latitude.documentation = Some("Angular distance north or south of the Earth's equator, measured in degrees from -90 to +90.".to_owned());
    let mut longitude = FieldDef::new(names.of("longitude"), TypeRef::parse("Float!").unwrap());
    longitude.name_in_index = "lon".to_owned();
    longitude.documentation = Some("Angular distance east or west of the Prime Meridian at Greenwich, UK, measured in degrees from -180 to +180.".to_owned());
    geo_location.fields.insert(latitude.name.clone(), latitude);
    geo_location.fields.insert(longitude.name.clone(), longitude);

    let mut count_detail = ObjectTypeDef {
        name: "AggregationCountDetail".to_owned(),
        documentation: Some(
            "Provides detail about an aggregation `count`. Sub-aggregation counts can be \
             approximate; these fields communicate the precision of the value."
                .to_owned(),
        ),
        graphql_only: true,
        ..Default::default()
    };
    for (canonical, ty, doc) in [
        (
            "approximate_value",
            "JsonSafeLong!",
            "The (approximate) count of documents in this aggregation bucket. When \
             `exact_value` is non-null it is the exact count; otherwise the true count is \
             at most `upper_bound`.",
        ),
        (
            "exact_value",
            "JsonSafeLong",
            "The exact count of documents in this aggregation bucket, when it is known to \
             be exact.",
        ),
        (
            "upper_bound",
            "JsonSafeLong!",
            "An upper bound on how large the true count of documents in this aggregation \
             bucket could be.",
        ),
    ] {
        let mut field = graphql_only_field(canonical, names, ty);
        field.documentation = Some(doc.to_owned());
        count_detail.fields.insert(field.name.clone(), field);
    }

    vec![
        page_info,
        geo_location,
        count_detail,
        date_grouped_by(names),
        date_time_grouped_by(names),
    ]
}

fn grouping_arg(names: &SchemaElementNames, canonical: &str, ty: &str) -> InputFieldDef {
    InputFieldDef::new(names.of(canonical), ty)
}

fn date_grouped_by(names: &SchemaElementNames) -> ObjectTypeDef {
    let mut type_def = ObjectTypeDef {
        name: "DateGroupedBy".to_owned(),
        documentation: Some("Allows for grouping on any of the supported views of a `Date`.".to_owned()),
        graphql_only: true,
        ..Default::default()
    };

    let mut as_date = graphql_only_field("as_date", names, "Date");
    as_date.documentation =
        Some("The date, truncated to the requested `granularity`.".to_owned());
    as_date.args = vec![
        grouping_arg(names, "granularity", "DateGroupingGranularity!"),
        grouping_arg(names, "time_zone", "TimeZone!").default(serde_json::json!("UTC")),
        grouping_arg(names, "offset", "Int!")
            .default(serde_json::json!(0))
            .doc("Number of days to shift the boundaries of each grouping bucket."),
    ];
    type_def.fields.insert(as_date.name.clone(), as_date);

    let mut as_day_of_week = graphql_only_field("as_day_of_week", names, "DayOfWeek");
    as_day_of_week.documentation = Some("The day of the week the date falls on.".to_owned());
    as_day_of_week.args = vec![
        grouping_arg(names, "time_zone", "TimeZone!").default(serde_json::json!("UTC")),
        grouping_arg(names, "offset_ms", "Int!")
            .default(serde_json::json!(0))
            .doc("Number of milliseconds to shift each date before determining its day of week."),
    ];
    type_def
        .fields
        .insert(as_day_of_week.name.clone(), as_day_of_week);

    type_def
}

fn date_time_grouped_by(names: &SchemaElementNames) -> ObjectTypeDef {
    let mut type_def = ObjectTypeDef {
        name: "DateTimeGroupedBy".to_owned(),
        documentation: Some(
            "Allows for grouping on any of the supported views of a `DateTime`.".to_owned(),
        ),
        graphql_only: true,
        ..Default::default()
    };

    let common_args = |names: &SchemaElementNames| {
        vec![
            grouping_arg(names, "time_zone", "TimeZone!").default(serde_json::json!("UTC")),
            grouping_arg(names, "offset_ms", "Int!")
                .default(serde_json::json!(0))
                .doc("Number of milliseconds to shift the boundaries of each grouping bucket."),
        ]
    };

    let mut as_date_time = graphql_only_field("as_date_time", names, "DateTime");
    as_date_time.documentation =
        Some("The timestamp, truncated to the requested `granularity`.".to_owned());
    as_date_time.args = vec![grouping_arg(
        names,
        "granularity",
        "DateTimeGroupingGranularity!",
    )];
    as_date_time.args.extend(common_args(names));
    type_def
        .fields
        .insert(as_date_time.name.clone(), as_date_time);

    let mut as_date = graphql_only_field("as_date", names, "Date");
    as_date.documentation =
        Some("The date of the timestamp, truncated to the requested `granularity`.".to_owned());
    as_date.args = vec![grouping_arg(names, "granularity", "DateGroupingGranularity!")];
    as_date.args.extend(common_args(names));
    type_def.fields.insert(as_date.name.clone(), as_date);

    let mut as_day_of_week = graphql_only_field("as_day_of_week", names, "DayOfWeek");
    as_day_of_week.documentation =
        Some("The day of the week the timestamp falls on.".to_owned());
    as_day_of_week.args = common_args(names);
    type_def
        .fields
        .insert(as_day_of_week.name.clone(), as_day_of_week);

    let mut as_time_of_day = graphql_only_field("as_time_of_day", names, "LocalTime");
    as_time_of_day.documentation = Some(
        "The time of day of the timestamp, truncated to the requested `granularity`.".to_owned(),
    );
    as_time_of_day.args = vec![grouping_arg(
        names,
        "granularity",
        "LocalTimeGroupingGranularity!",
    )];
    as_time_of_day.args.extend(common_args(names));
    type_def
        .fields
        .insert(as_time_of_day.name.clone(), as_time_of_day);

    type_def
}

fn built_in_inputs(names: &SchemaElementNames) -> Vec<InputTypeDef> {
    let mut matches_query = InputTypeDef {
        name: "MatchesQueryFilterInput".to_owned(),
        documentation: Some(
            "Input type used to specify parameters for the `matches_query` full-text \
             filtering operator."
                .to_owned(),
        ),
        ..Default::default()
    };
    for field in [
        InputFieldDef::new(names.of("query"), "String!")
            .doc("The input query to search for."),
        InputFieldDef::new(
            names.of("allowed_edits_per_term"),
            "MatchesQueryAllowedEditsPerTerm!",
        )
        .default(serde_json::json!("DYNAMIC"))
        .doc(
            "Number of allowed modifications per term to arrive at a match. For example, \
             if set to `NONE`, `glass` will not match `grass`.",
        ),
        InputFieldDef::new(names.of("require_all_terms"), "Boolean!")
            .default(serde_json::json!(true))
            .doc(
                "Set to `true` to match only documents containing all terms of the query, \
                 instead of any of them.",
            ),
    ] {
        matches_query.fields.insert(field.name.clone(), field);
    }

    let mut matches_phrase = InputTypeDef {
        name: "MatchesPhraseFilterInput".to_owned(),
        documentation: Some(
            "Input type used to specify parameters for the `matches_phrase` full-text \
             filtering operator."
                .to_owned(),
        ),
        ..Default::default()
    };
    let phrase = InputFieldDef::new(names.of("phrase"), "String!")
        .doc("The input phrase to search for.");
    matches_phrase.fields.insert(phrase.name.clone(), phrase);

    let mut geo_distance = InputTypeDef {
        name: "GeoLocationDistanceFilterInput".to_owned(),
        documentation: Some(
            "Input type used to specify distance filtering parameters on `GeoLocation` \
             fields."
                .to_owned(),
        ),
        ..Default::default()
    };
    for field in [
        InputFieldDef::new(names.of("latitude"), "Float!")
            .doc("Angular distance north or south of the Earth's equator."),
        InputFieldDef::new(names.of("longitude"), "Float!")
            .doc("Angular distance east or west of the Prime Meridian."),
        InputFieldDef::new(names.of("max_distance"), "Float!").doc(
            "Maximum distance (of the provided `unit`) to consider \"near\" the location \
             identified by `latitude` and `longitude`.",
        ),
        InputFieldDef::new(names.of("unit"), "DistanceUnit!")
            .doc("Determines the unit of the specified `max_distance`."),
    ] {
        geo_distance.fields.insert(field.name.clone(), field);
    }

    let mut time_of_day = InputTypeDef {
        name: "DateTimeTimeOfDayFilterInput".to_owned(),
        documentation: Some(
            "Input type used to specify filters on the time-of-day of `DateTime` fields. \
             Matches documents where the field value's local time (in the given \
             `time_zone`) satisfies the provided predicates."
                .to_owned(),
        ),
        ..Default::default()
    };
    for field in [
        InputFieldDef::new(names.of("equal_to_any_of"), "[LocalTime!]"),
        InputFieldDef::new(names.of("gt"), "LocalTime"),
        InputFieldDef::new(names.of("gte"), "LocalTime"),
        InputFieldDef::new(names.of("lt"), "LocalTime"),
        InputFieldDef::new(names.of("lte"), "LocalTime"),
        InputFieldDef::new(names.of("time_zone"), "TimeZone!")
            .default(serde_json::json!("UTC"))
            .doc("Time zone in which to evaluate the time of day of each value."),
    ] {
        time_of_day.fields.insert(field.name.clone(), field);
    }

    vec![matches_query, matches_phrase, geo_distance, time_of_day]
}
