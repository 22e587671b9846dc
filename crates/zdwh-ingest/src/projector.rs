//! Record projection
//!
//! Reduces raw API records to the configured column set, in page order, and
//! appends the two audit timestamps. A missing source field or a malformed
//! timestamp aborts the run; a JSON `null` becomes a NULL cell.

use chrono::{DateTime, Utc};
use serde_json::{Map, Value};
use zdwh_common::time::parse_timestamp;

use crate::entity::{AssociationConfig, ColumnKind, EntityConfig, FieldMapping};
use crate::error::ProjectionError;
use crate::row::{Cell, Row};

type Result<T> = std::result::Result<T, ProjectionError>;

/// Rows produced from one page
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ProjectedPage {
    /// One row per record, same order as the page
    pub rows: Vec<Row>,
    /// `(child, parent, DwhInsert, DwhUpdate)` rows for entities with a nested id list
    pub associations: Vec<Row>,
}

/// Project every record of a page
///
/// `now` stamps both `DwhInsert` and `DwhUpdate` on every produced row.
pub fn project_page(entity: &EntityConfig, records: &[Value], now: DateTime<Utc>) -> Result<ProjectedPage> {
    let mut projected = ProjectedPage {
        rows: Vec::with_capacity(records.len()),
        associations: Vec::new(),
    };

    for (index, record) in records.iter().enumerate() {
        let object = record
            .as_object()
            .ok_or(ProjectionError::NotAnObject { index })?;

        projected.rows.push(project_record(entity.fields, object, index, now)?);

        if let Some(association) = &entity.association {
            project_associations(entity, association, object, index, now, &mut projected.associations)?;
        }
    }

    Ok(projected)
}

fn project_record(
    fields: &[FieldMapping],
    record: &Map<String, Value>,
    index: usize,
    now: DateTime<Utc>,
) -> Result<Row> {
    let mut cells = Vec::with_capacity(fields.len() + 2);

    for mapping in fields {
        let value = record.get(mapping.source).ok_or_else(|| ProjectionError::MissingField {
            field: mapping.source.to_string(),
            index,
        })?;
        cells.push(project_value(mapping.source, mapping.kind, value, index)?);
    }

    cells.push(Cell::Timestamp(now));
    cells.push(Cell::Timestamp(now));

    Ok(Row::new(cells))
}

fn project_associations(
    entity: &EntityConfig,
    association: &AssociationConfig,
    record: &Map<String, Value>,
    index: usize,
    now: DateTime<Utc>,
    out: &mut Vec<Row>,
) -> Result<()> {
    let key = entity.key_field();
    let parent = record.get(key.source).ok_or_else(|| ProjectionError::MissingField {
        field: key.source.to_string(),
        index,
    })?;
    let parent = project_value(key.source, ColumnKind::Integer, parent, index)?;

    let children = match record.get(association.source_list) {
        None => {
            return Err(ProjectionError::MissingField {
                field: association.source_list.to_string(),
                index,
            })
        },
        Some(Value::Null) => return Ok(()),
        Some(Value::Array(children)) => children,
        Some(other) => {
            return Err(ProjectionError::TypeMismatch {
                field: association.source_list.to_string(),
                index,
                expected: "array",
                found: json_type(other).to_string(),
            })
        },
    };

    for child in children {
        let child = project_value(association.source_list, ColumnKind::Integer, child, index)?;
        out.push(Row::new(vec![
            child,
            parent.clone(),
            Cell::Timestamp(now),
            Cell::Timestamp(now),
        ]));
    }

    Ok(())
}

fn project_value(field: &str, kind: ColumnKind, value: &Value, index: usize) -> Result<Cell> {
    if value.is_null() {
        return Ok(Cell::Null);
    }

    let mismatch = || ProjectionError::TypeMismatch {
        field: field.to_string(),
        index,
        expected: kind.as_str(),
        found: json_type(value).to_string(),
    };

    match kind {
        ColumnKind::Integer => value.as_i64().map(Cell::Integer).ok_or_else(mismatch),
        ColumnKind::Boolean => value.as_bool().map(Cell::Boolean).ok_or_else(mismatch),
        ColumnKind::Text => Ok(Cell::Text(match value {
            Value::String(s) => s.clone(),
            other => other.to_string(),
        })),
        ColumnKind::Timestamp => {
            let raw = value.as_str().ok_or_else(mismatch)?;
            parse_timestamp(raw)
                .map(Cell::Timestamp)
                .map_err(|e| ProjectionError::InvalidTimestamp {
                    field: field.to_string(),
                    index,
                    value: raw.to_string(),
                    reason: e.to_string(),
                })
        },
    }
}

fn json_type(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use crate::entity::{EntityKind, DWH_INSERT_COLUMN, DWH_UPDATE_COLUMN};
    use chrono::TimeZone;
    use serde_json::json;

    fn brands() -> EntityConfig {
        EntityConfig::build(EntityKind::Brands, "dbo", &[]).unwrap()
    }

    fn brand(id: i64, name: &str) -> Value {
        json!({
            "id": id,
            "url": format!("https://example.zendesk.com/api/v2/brands/{}.json", id),
            "name": name,
            "brand_url": format!("https://{}.example.com", name.to_lowercase()),
            "subdomain": name.to_lowercase(),
            "has_help_center": true,
            "help_center_state": "enabled",
            "active": true,
            "default": id == 1,
            "is_deleted": false,
            "host_mapping": null,
            "created_at": "2021-01-01T00:00:00Z",
            "updated_at": "2021-03-04T05:06:07+01:00",
            "signature_template": "{{agent.signature}}"
        })
    }

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 5, 1, 12, 0, 0).unwrap()
    }

    #[test]
    fn test_projects_renamed_columns() {
        let entity = brands();
        let page = project_page(&entity, &[brand(1, "A")], now()).unwrap();
        let row = &page.rows[0];
        let tables = &entity.tables;

        assert_eq!(row.len(), tables.columns.len());
        assert_eq!(row.get(tables, "BrandID"), Some(&Cell::Integer(1)));
        assert_eq!(row.get(tables, "BrandName"), Some(&Cell::Text("A".to_string())));
        assert_eq!(row.get(tables, "DefaultBrand"), Some(&Cell::Boolean(true)));
        assert_eq!(row.get(tables, "HostMapping"), Some(&Cell::Null));
        assert_eq!(
            row.get(tables, "UpdatedAt"),
            Some(&Cell::Timestamp(Utc.with_ymd_and_hms(2021, 3, 4, 4, 6, 7).unwrap()))
        );
        assert!(page.associations.is_empty());
    }

    #[test]
    fn test_audit_stamps_share_projection_time() {
        let entity = brands();
        let page = project_page(&entity, &[brand(1, "A"), brand(2, "B")], now()).unwrap();

        for row in &page.rows {
            assert_eq!(row.get(&entity.tables, DWH_INSERT_COLUMN), Some(&Cell::Timestamp(now())));
            assert_eq!(row.get(&entity.tables, DWH_UPDATE_COLUMN), Some(&Cell::Timestamp(now())));
        }
    }

    #[test]
    fn test_preserves_page_order() {
        let entity = brands();
        let records: Vec<Value> = [5, 3, 9, 1].iter().map(|&id| brand(id, "X")).collect();
        let page = project_page(&entity, &records, now()).unwrap();
        let ids: Vec<_> = page.rows.iter().map(|r| r.cells[0].as_i64().unwrap()).collect();
        assert_eq!(ids, vec![5, 3, 9, 1]);
    }

    #[test]
    fn test_missing_field_fails() {
        let mut record = brand(1, "A");
        record.as_object_mut().unwrap().remove("subdomain");
        let err = project_page(&brands(), &[brand(2, "B"), record], now()).unwrap_err();
        match err {
            ProjectionError::MissingField { field, index } => {
                assert_eq!(field, "subdomain");
                assert_eq!(index, 1);
            },
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn test_malformed_timestamp_fails() {
        let mut record = brand(1, "A");
        record["created_at"] = json!("01/02/2021");
        let err = project_page(&brands(), &[record], now()).unwrap_err();
        assert!(matches!(err, ProjectionError::InvalidTimestamp { ref field, .. } if field == "created_at"));
    }

    #[test]
    fn test_null_timestamp_is_null_cell() {
        let users = EntityConfig::build(EntityKind::Users, "dbo", &[]).unwrap();
        let record = json!({
            "id": 42, "name": "Agent", "alias": null, "email": "agent@example.com",
            "phone": null, "time_zone": "Eastern Time (US & Canada)", "role": "agent",
            "role_type": null, "default_group_id": 7, "organization_id": null,
            "active": true, "suspended": false, "ticket_restriction": "groups",
            "chat_only": false, "last_login_at": null,
            "created_at": "2020-02-02T02:02:02Z", "updated_at": "2020-02-03T02:02:02Z"
        });
        let page = project_page(&users, &[record], now()).unwrap();
        assert_eq!(page.rows[0].get(&users.tables, "LastLoginAt"), Some(&Cell::Null));
        assert_eq!(page.rows[0].get(&users.tables, "DefaultGroupID"), Some(&Cell::Integer(7)));
    }

    #[test]
    fn test_type_mismatch() {
        let mut record = brand(1, "A");
        record["active"] = json!("yes");
        let err = project_page(&brands(), &[record], now()).unwrap_err();
        assert!(matches!(err, ProjectionError::TypeMismatch { expected: "boolean", .. }));

        assert!(matches!(
            project_page(&brands(), &[json!(17)], now()).unwrap_err(),
            ProjectionError::NotAnObject { index: 0 }
        ));
    }

    #[test]
    fn test_ticket_form_associations() {
        let forms = EntityConfig::build(EntityKind::TicketForms, "dbo", &[]).unwrap();
        let form = |id: i64, fields: Value| {
            json!({
                "id": id, "name": "Default", "display_name": "Default form",
                "end_user_visible": true, "position": 0, "active": true, "default": true,
                "in_all_brands": true, "ticket_field_ids": fields,
                "created_at": "2021-01-01T00:00:00Z", "updated_at": "2021-01-01T00:00:00Z"
            })
        };

        let page = project_page(
            &forms,
            &[form(10, json!([100, 101])), form(11, json!(null)), form(12, json!([102]))],
            now(),
        )
        .unwrap();

        assert_eq!(page.rows.len(), 3);
        let pairs: Vec<_> = page
            .associations
            .iter()
            .map(|r| (r.cells[0].as_i64().unwrap(), r.cells[1].as_i64().unwrap()))
            .collect();
        assert_eq!(pairs, vec![(100, 10), (101, 10), (102, 12)]);
        assert!(page.associations.iter().all(|r| r.cells[2] == Cell::Timestamp(now())));

        let mut missing = form(13, json!([]));
        missing.as_object_mut().unwrap().remove("ticket_field_ids");
        assert!(matches!(
            project_page(&forms, &[missing], now()).unwrap_err(),
            ProjectionError::MissingField { ref field, .. } if field == "ticket_field_ids"
        ));
    }
}
