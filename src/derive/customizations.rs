use crate::config::SchemaConfig;
use crate::derive::batch;
use crate::error::{SchemaError, SchemaErrors};
use crate::schema::definitions::TypeDef;
use crate::schema::namer::did_you_mean;
use crate::schema::registry::SchemaRegistry;

/// Applies `customize_derived_types` / `customize_derived_type_fields`
/// registrations and extension-module customizations, now that every derived
/// type exists. Unknown names fail with a suggestion.
pub(crate) fn apply(
    registry: &mut SchemaRegistry,
    config: &SchemaConfig,
) -> Result<(), SchemaErrors> {
    let mut errors = Vec::new();

    let type_customizations = std::mem::take(&mut registry.derived_type_customizations);
    for customization in &type_customizations {
        for target in &customization.target_type_names {
            let belongs_to_owner = registry
                .type_named(target)
                .and_then(TypeDef::derived_from)
                .is_some_and(|(_, base)| {
                    base == &customization.owner || base.starts_with(&customization.owner)
                });
            if belongs_to_owner {
                if let Some(type_def) = registry.type_named_mut(target) {
                    (customization.customize)(type_def);
                }
            } else {
                errors.push(unknown_derived_type_error(
                    registry,
                    &customization.owner,
                    target,
                ));
            }
        }
    }

    let field_customizations = std::mem::take(&mut registry.derived_field_customizations);
    for customization in &field_customizations {
        let target_exists = registry
            .type_named(&customization.target_type_name)
            .and_then(TypeDef::derived_from)
            .is_some_and(|(_, base)| base == &customization.owner);
        if !target_exists {
            errors.push(unknown_derived_type_error(
                registry,
                &customization.owner,
                &customization.target_type_name,
            ));
            continue;
        }
        for field_name in &customization.field_names {
            let exists = registry
                .type_named(&customization.target_type_name)
                .and_then(TypeDef::fields)
                .is_some_and(|fields| fields.contains_key(field_name));
            if exists {
                if let Some(field) = registry
                    .type_named_mut(&customization.target_type_name)
                    .and_then(TypeDef::fields_mut)
                    .and_then(|fields| fields.get_mut(field_name))
                {
                    (customization.customize)(field);
                }
            } else {
                let candidates: Vec<String> = registry
                    .type_named(&customization.target_type_name)
                    .and_then(TypeDef::fields)
                    .map(|fields| fields.keys().cloned().collect())
                    .unwrap_or_default();
                errors.push(SchemaError::UnknownDerivedTypeField {
                    owner: customization.owner.clone(),
                    type_name: customization.target_type_name.clone(),
                    field: field_name.clone(),
                    suggestion: did_you_mean(field_name, candidates.iter().map(String::as_str)),
                });
            }
        }
    }

    batch(errors)?;

    for extension in &config.extension_modules {
        let type_names: Vec<String> = registry.type_names().map(str::to_owned).collect();
        for type_name in type_names {
            let Some(type_def) = registry.type_named_mut(&type_name) else {
                continue;
            };
            if let Err(error) = extension.customize_type(type_def) {
                return Err(error.into());
            }
            if let Some(fields) = type_def.fields_mut() {
                for field in fields.values_mut() {
                    if let Err(error) = extension.customize_field(&type_name, field) {
                        return Err(error.into());
                    }
                }
            }
        }
    }

    Ok(())
}

fn unknown_derived_type_error(
    registry: &SchemaRegistry,
    owner: &str,
    target: &str,
) -> SchemaError {
    // Sub-aggregations of unions are deliberately unsupported; give the
    // specific answer instead of a generic "unknown name".
    if matches!(registry.type_named(owner), Some(TypeDef::Union(_)))
        && target.contains("SubAggregation")
    {
        return SchemaError::UnionSubAggregation {
            union_type: owner.to_owned(),
        };
    }
    let candidates: Vec<String> = registry
        .types()
        .values()
        .filter(|t| {
            t.derived_from()
                .is_some_and(|(_, base)| base == owner || base.starts_with(owner))
        })
        .map(|t| t.name().to_owned())
        .collect();
    SchemaError::UnknownDerivedType {
        owner: owner.to_owned(),
        name: target.to_owned(),
        suggestion: did_you_mean(target, candidates.iter().map(String::as_str)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::SchemaConfig;
    use crate::schema::builder::SchemaDefinition;
    use crate::schema::built_ins;
    use crate::schema::definitions::DirectiveApplication;
    use crate::schema::namer::Namer;

    fn run_derivations(api: &mut SchemaDefinition) -> Result<(), SchemaErrors> {
        let config = api.config.clone();
        let names = api.names.clone();
        let namer = Namer::new(&config);
        built_ins::register_built_ins(&mut api.registry, &names, &namer, &[]).unwrap();
        api.registry.complete_user_definition();
        crate::derive::sort_orders::derive(&mut api.registry, &namer)?;
        crate::derive::filters::derive(&mut api.registry, &names, &namer)?;
        crate::derive::sub_aggregations::derive(&mut api.registry, &names, &namer)?;
        crate::derive::aggregations::derive(&mut api.registry, &names, &namer)?;
        crate::derive::relay::derive(&mut api.registry, &names, &namer)?;
        apply(&mut api.registry, &config)
    }

    #[test]
    fn customizes_named_derived_types() {
        let mut api = SchemaDefinition::new(SchemaConfig::default()).unwrap();
        api.object_type("Widget", |t| {
            t.field("id", "ID!")?;
            t.index("widgets")?;
            t.customize_derived_types(&["WidgetAggregation"], |type_def| {
                if let TypeDef::Object(object) = type_def {
                    object
                        .directives
                        .push(DirectiveApplication::new("deprecated"));
                }
            });
            Ok(())
        })
        .unwrap();
        run_derivations(&mut api).unwrap();
        let aggregation = api
            .registry
            .type_named("WidgetAggregation")
            .unwrap()
            .as_object()
            .unwrap();
        assert_eq!(aggregation.directives.len(), 1);
    }

    #[test]
    fn unknown_derived_type_names_fail_with_suggestions() {
        let mut api = SchemaDefinition::new(SchemaConfig::default()).unwrap();
        api.object_type("Widget", |t| {
            t.field("id", "ID!")?;
            t.index("widgets")?;
            t.customize_derived_types(&["WidgetAggergation"], |_| {});
            Ok(())
        })
        .unwrap();
        let errors = run_derivations(&mut api).unwrap_err();
        match &errors.errors()[0] {
            SchemaError::UnknownDerivedType {
                owner,
                name,
                suggestion,
            } => {
                assert_eq!(owner, "Widget");
                assert_eq!(name, "WidgetAggergation");
                assert_eq!(suggestion.as_deref(), Some("WidgetAggregation"));
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn union_sub_aggregation_customization_is_rejected_specifically() {
        let mut api = SchemaDefinition::new(SchemaConfig::default()).unwrap();
        api.object_type("Widget", |t| {
            t.field("id", "ID!")?;
            t.index("widgets")?;
            Ok(())
        })
        .unwrap();
        api.object_type("Gadget", |t| {
            t.field("id", "ID!")?;
            t.index("gadgets")?;
            Ok(())
        })
        .unwrap();
        api.union_type("Thing", |u| {
            u.subtypes(&["Widget", "Gadget"]);
            Ok(())
        })
        .unwrap();
        api.object_type("Owner", |t| {
            t.field("id", "ID!")?;
            t.index("owners")?;
            t.customize_derived_types(&["ThingSubAggregation"], |_| {});
            Ok(())
        })
        .unwrap();
        // Reassign the customization's owner to the union to model a
        // customization against the union's derived types.
        let customization = api.registry.derived_type_customizations.last_mut().unwrap();
        customization.owner = "Thing".to_owned();
        let errors = run_derivations(&mut api).unwrap_err();
        assert!(matches!(
            errors.errors()[0],
            SchemaError::UnionSubAggregation { .. }
        ));
    }
}
