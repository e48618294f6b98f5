use serde_json::Value;

use crate::registry::{EntityRegistry, EntitySchema, FieldDef, ID};

/// CREATE TABLE statements for every registered entity, referenced
/// tables first
pub fn create_tables_ddl(registry: &EntityRegistry) -> Vec<String> {
    let mut ordered: Vec<&EntitySchema> = Vec::new();
    let mut pending: Vec<&EntitySchema> = registry.entities().collect();

    while !pending.is_empty() {
        let before = pending.len();
        pending.retain(|schema| {
            let ready = schema
                .relations
                .iter()
                .all(|r| r.target == schema.name || ordered.iter().any(|o| o.name == r.target));
            if ready {
                ordered.push(schema);
            }
            !ready
        });
        if pending.len() == before {
            // cyclic relations; emit the rest as they are
            ordered.append(&mut pending);
        }
    }

    ordered
        .into_iter()
        .map(|schema| create_table_ddl(schema, registry))
        .collect()
}

pub fn create_table_ddl(schema: &EntitySchema, registry: &EntityRegistry) -> String {
    let mut columns: Vec<String> = schema.fields.iter().map(column_ddl).collect();

    for relation in &schema.relations {
        let target_table = registry
            .get(&relation.target)
            .map(|t| t.table.as_str())
            .unwrap_or(relation.target.as_str());
        columns.push(format!(
            "FOREIGN KEY (\"{}\") REFERENCES \"{}\" (\"{}\") ON DELETE CASCADE",
            relation.local_field, target_table, ID
        ));
    }

    format!(
        "CREATE TABLE IF NOT EXISTS \"{}\" (\n    {}\n)",
        schema.table,
        columns.join(",\n    ")
    )
}

fn column_ddl(field: &FieldDef) -> String {
    let mut ddl = format!("\"{}\" {}", field.name, field.kind.sql_type().to_uppercase());
    if field.name == ID {
        ddl += " PRIMARY KEY";
    } else if field.unique {
        ddl += " UNIQUE";
    }
    if field.required {
        ddl += " NOT NULL";
    }
    if let Some(default) = &field.default {
        match default {
            Value::String(s) => ddl += &format!(" DEFAULT '{}'", s.replace('\'', "''")),
            Value::Number(n) => ddl += &format!(" DEFAULT {}", n),
            Value::Bool(b) => ddl += &format!(" DEFAULT {}", b),
            _ => {}
        }
    }
    ddl
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models;

    #[test]
    fn users_are_created_before_posts() {
        let ddl = create_tables_ddl(&models::registry());
        assert_eq!(ddl.len(), 2);
        assert!(ddl[0].starts_with("CREATE TABLE IF NOT EXISTS \"user\""));
        assert!(ddl[1].contains("FOREIGN KEY (\"createdById\") REFERENCES \"user\" (\"id\") ON DELETE CASCADE"));
    }

    #[test]
    fn columns_carry_constraints() {
        let ddl = create_tables_ddl(&models::registry()).join("\n");
        assert!(ddl.contains("\"id\" UUID PRIMARY KEY NOT NULL"));
        assert!(ddl.contains("\"email\" VARCHAR(255) UNIQUE NOT NULL"));
        assert!(ddl.contains("\"published\" BOOLEAN NOT NULL DEFAULT false"));
        assert!(ddl.contains("\"createdAt\" TIMESTAMPTZ NOT NULL"));
    }
}
