use crate::derive::batch;
use crate::error::{SchemaError, SchemaErrors, SchemaWarning};
use crate::schema::definitions::{Cardinality, FieldDef, ForeignKeyDirection, TypeDef};
use crate::schema::registry::SchemaRegistry;
use crate::schema::type_ref::TypeRef;

/// The relationship closure: ensures every declared relationship has its
/// foreign key field, synthesizing indexing-only fields where the user did
/// not define them, and warning when the two sides disagree.
pub(crate) fn close(
    registry: &mut SchemaRegistry,
    warnings: &mut Vec<SchemaWarning>,
) -> Result<(), SchemaErrors> {
    let mut errors = Vec::new();
    // (type to receive the field, foreign key name, field type, owning
    // relationship for error messages)
    let mut needed_foreign_keys: Vec<(String, String, TypeRef, String, String)> = Vec::new();

    for type_def in registry.types().values() {
        let Some(object) = type_def.as_object() else {
            continue;
        };
        for field in object.fields.values() {
            let Some(relationship) = &field.relationship else {
                continue;
            };
            if !registry.contains_type(&relationship.related_type) {
                errors.push(SchemaError::UnresolvableFieldType {
                    type_name: object.name.clone(),
                    field: field.name.clone(),
                    referenced: relationship.related_type.clone(),
                });
                continue;
            }

            let (holder, fk_type) = match relationship.direction {
                ForeignKeyDirection::Out => (
                    object.name.clone(),
                    match relationship.cardinality {
                        Cardinality::One => TypeRef::parse("ID"),
                        Cardinality::Many => TypeRef::parse("[ID!]"),
                    },
                ),
                ForeignKeyDirection::In => (
                    relationship.related_type.clone(),
                    match relationship.cardinality {
                        // Many documents of this type share one related
                        // document, so the inbound key is a list there.
                        Cardinality::One => TypeRef::parse("[ID!]"),
                        Cardinality::Many => TypeRef::parse("ID"),
                    },
                ),
            };
            let fk_type = fk_type.expect("foreign key type references are well-formed");
            needed_foreign_keys.push((
                holder,
                relationship.foreign_key.clone(),
                fk_type,
                object.name.clone(),
                field.name.clone(),
            ));
        }
    }

    for (holder, foreign_key, fk_type, owner, relationship_name) in needed_foreign_keys {
        let Some(TypeDef::Object(holder_def)) = registry.type_named_mut(&holder) else {
            // Relationships to interfaces/unions hold their keys on each
            // concrete implementation; nothing to synthesize here.
            continue;
        };
        match holder_def.fields.get(&foreign_key) {
            Some(existing) => {
                if existing.ty.is_list() != fk_type.is_list() {
                    errors.push(SchemaError::ForeignKeyConflict {
                        type_name: owner.clone(),
                        relationship: relationship_name.clone(),
                        foreign_key: foreign_key.clone(),
                        other_type: holder.clone(),
                        detail: format!(
                            "the relationship implies `{fk_type}` but the field is `{}`",
                            existing.ty
                        ),
                    });
                } else if existing.relationship.is_some() {
                    warnings.push(SchemaWarning::InconsistentRelationship {
                        type_name: owner.clone(),
                        relationship: relationship_name.clone(),
                        detail: format!(
                            "`{holder}.{foreign_key}` is itself a relationship field and \
                             cannot serve as a foreign key"
                        ),
                    });
                }
                // A matching user-defined field wins over synthesis.
            }
            None => {
                let mut field = FieldDef::new(&foreign_key, fk_type);
                field.indexing_only = true;
                holder_def.fields.insert(foreign_key.clone(), field);
            }
        }
    }

    batch(errors)
}
