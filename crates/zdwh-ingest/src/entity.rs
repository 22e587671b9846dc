//! Entity descriptors
//!
//! Every synced resource follows the same shape: a flat paginated list in the
//! helpdesk API, a staging table that holds one run's rows, and a reporting
//! table that keeps history. What differs per resource is captured here as
//! data: the API path, the column projection and the warehouse object names.
//!
//! Descriptors are built once at startup from [`EntityKind`] and validated
//! (identifier syntax, key columns) before any request is made.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use zdwh_common::QualifiedName;

use crate::error::{Result, SyncError};

// ============================================================================
// Column Constants
// ============================================================================

/// Audit column stamped when a row is first staged.
pub const DWH_INSERT_COLUMN: &str = "DwhInsert";

/// Audit column stamped on staging and rewritten when reporting rows are updated.
pub const DWH_UPDATE_COLUMN: &str = "DwhUpdate";

/// Warehouse type of a projected column
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ColumnKind {
    Integer,
    Text,
    Boolean,
    /// ISO-8601 with offset in the API, `timestamptz` in the warehouse.
    Timestamp,
}

impl ColumnKind {
    pub fn as_str(self) -> &'static str {
        match self {
            ColumnKind::Integer => "integer",
            ColumnKind::Text => "text",
            ColumnKind::Boolean => "boolean",
            ColumnKind::Timestamp => "timestamp",
        }
    }
}

/// One `source field -> warehouse column` rename with its type
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FieldMapping {
    pub source: &'static str,
    pub column: &'static str,
    pub kind: ColumnKind,
}

impl FieldMapping {
    const fn new(source: &'static str, column: &'static str, kind: ColumnKind) -> Self {
        Self {
            source,
            column,
            kind,
        }
    }

    const fn int(source: &'static str, column: &'static str) -> Self {
        Self::new(source, column, ColumnKind::Integer)
    }

    const fn text(source: &'static str, column: &'static str) -> Self {
        Self::new(source, column, ColumnKind::Text)
    }

    const fn flag(source: &'static str, column: &'static str) -> Self {
        Self::new(source, column, ColumnKind::Boolean)
    }

    const fn ts(source: &'static str, column: &'static str) -> Self {
        Self::new(source, column, ColumnKind::Timestamp)
    }
}

/// A warehouse column in staging/reporting order
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Column {
    pub name: &'static str,
    pub kind: ColumnKind,
}

/// The three no-argument procedures driving reconciliation
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Procedures {
    pub clear_staging: QualifiedName,
    pub update_reporting: QualifiedName,
    pub insert_new: QualifiedName,
}

/// Staging table, reporting table and the procedures that merge them
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TableSet {
    pub staging: QualifiedName,
    pub reporting: QualifiedName,
    /// Columns identifying a row across runs
    pub key_columns: Vec<&'static str>,
    /// Staging column order, audit columns last
    pub columns: Vec<Column>,
    pub procedures: Procedures,
}

impl TableSet {
    fn build(
        schema: &str,
        staging: &str,
        reporting: &str,
        procedures: [&str; 3],
        key_columns: Vec<&'static str>,
        mut columns: Vec<Column>,
    ) -> Result<Self> {
        columns.push(Column {
            name: DWH_INSERT_COLUMN,
            kind: ColumnKind::Timestamp,
        });
        columns.push(Column {
            name: DWH_UPDATE_COLUMN,
            kind: ColumnKind::Timestamp,
        });

        let [clear_staging, update_reporting, insert_new] = procedures;
        let tables = Self {
            staging: QualifiedName::qualified(schema, staging)?,
            reporting: QualifiedName::qualified(schema, reporting)?,
            key_columns,
            columns,
            procedures: Procedures {
                clear_staging: QualifiedName::qualified(schema, clear_staging)?,
                update_reporting: QualifiedName::qualified(schema, update_reporting)?,
                insert_new: QualifiedName::qualified(schema, insert_new)?,
            },
        };
        tables.validate()?;
        Ok(tables)
    }

    fn validate(&self) -> Result<()> {
        if self.key_columns.is_empty() {
            return Err(SyncError::config(format!("{} has no key columns", self.staging)));
        }
        for key in &self.key_columns {
            if self.column_index(key).is_none() {
                return Err(SyncError::config(format!(
                    "Key column '{}' is not a column of {}",
                    key, self.staging
                )));
            }
        }
        for (i, column) in self.columns.iter().enumerate() {
            QualifiedName::parse(column.name)?;
            if self.columns[..i].iter().any(|c| c.name == column.name) {
                return Err(SyncError::config(format!(
                    "Column '{}' appears twice in {}",
                    column.name, self.staging
                )));
            }
        }
        Ok(())
    }

    /// Position of `name` in staging column order
    pub fn column_index(&self, name: &str) -> Option<usize> {
        self.columns.iter().position(|c| c.name == name)
    }

    /// Positions of the key columns
    pub fn key_indices(&self) -> Vec<usize> {
        self.key_columns
            .iter()
            .filter_map(|k| self.column_index(k))
            .collect()
    }
}

/// Parent/child rows extracted from a nested id list (ticket form -> fields)
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AssociationConfig {
    /// Array field on the parent record holding child ids
    pub source_list: &'static str,
    /// Column receiving each element of the list
    pub child_column: &'static str,
    /// Column receiving the parent's key
    pub parent_column: &'static str,
    pub tables: TableSet,
}

/// Synced resource types
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EntityKind {
    Brands,
    TicketFields,
    TicketForms,
    Users,
}

impl EntityKind {
    /// Every entity, in the order `all` runs them
    pub const ALL: [EntityKind; 4] = [
        EntityKind::Brands,
        EntityKind::TicketFields,
        EntityKind::TicketForms,
        EntityKind::Users,
    ];

    /// API path segment, also the response envelope key
    pub fn resource(self) -> &'static str {
        match self {
            EntityKind::Brands => "brands",
            EntityKind::TicketFields => "ticket_fields",
            EntityKind::TicketForms => "ticket_forms",
            EntityKind::Users => "users",
        }
    }
}

impl fmt::Display for EntityKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.resource())
    }
}

impl FromStr for EntityKind {
    type Err = SyncError;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_lowercase().replace('-', "_").as_str() {
            "brands" => Ok(EntityKind::Brands),
            "ticket_fields" => Ok(EntityKind::TicketFields),
            "ticket_forms" => Ok(EntityKind::TicketForms),
            "users" => Ok(EntityKind::Users),
            _ => Err(SyncError::config(format!("Unknown entity '{}'", s))),
        }
    }
}

const BRAND_FIELDS: &[FieldMapping] = &[
    FieldMapping::int("id", "BrandID"),
    FieldMapping::text("name", "BrandName"),
    FieldMapping::text("brand_url", "BrandURL"),
    FieldMapping::text("subdomain", "Subdomain"),
    FieldMapping::flag("has_help_center", "HasHelpCenter"),
    FieldMapping::text("help_center_state", "HelpCenterState"),
    FieldMapping::flag("active", "Active"),
    FieldMapping::flag("default", "DefaultBrand"),
    FieldMapping::flag("is_deleted", "IsDeleted"),
    FieldMapping::text("host_mapping", "HostMapping"),
    FieldMapping::ts("created_at", "CreatedAt"),
    FieldMapping::ts("updated_at", "UpdatedAt"),
];

const TICKET_FIELD_FIELDS: &[FieldMapping] = &[
    FieldMapping::int("id", "TicketFieldID"),
    FieldMapping::text("type", "FieldType"),
    FieldMapping::flag("active", "Active"),
    FieldMapping::text("title", "Title"),
    FieldMapping::text("title_in_portal", "TitleInPortal"),
    FieldMapping::flag("required", "FieldRequired"),
    FieldMapping::flag("removable", "Removable"),
    FieldMapping::flag("visible_in_portal", "VisibleInPortal"),
    FieldMapping::flag("editable_in_portal", "EditableInPortal"),
    FieldMapping::flag("required_in_portal", "RequiredInPortal"),
    FieldMapping::ts("created_at", "CreatedAt"),
    FieldMapping::ts("updated_at", "UpdatedAt"),
];

const TICKET_FORM_FIELDS: &[FieldMapping] = &[
    FieldMapping::int("id", "TicketFormID"),
    FieldMapping::text("name", "FormName"),
    FieldMapping::text("display_name", "DisplayName"),
    FieldMapping::flag("end_user_visible", "EndUserVisible"),
    FieldMapping::int("position", "Position"),
    FieldMapping::flag("active", "Active"),
    FieldMapping::flag("default", "FormDefault"),
    FieldMapping::flag("in_all_brands", "InAllBrands"),
    FieldMapping::ts("created_at", "CreatedAt"),
    FieldMapping::ts("updated_at", "UpdatedAt"),
];

const USER_FIELDS: &[FieldMapping] = &[
    FieldMapping::int("id", "UserID"),
    FieldMapping::text("name", "DisplayName"),
    FieldMapping::text("alias", "UserAlias"),
    FieldMapping::text("email", "UserEmail"),
    FieldMapping::text("phone", "PhoneNumber"),
    FieldMapping::text("time_zone", "UserTimezone"),
    FieldMapping::text("role", "UserRole"),
    FieldMapping::int("role_type", "RoleType"),
    FieldMapping::int("default_group_id", "DefaultGroupID"),
    FieldMapping::int("organization_id", "OrganizationID"),
    FieldMapping::flag("active", "Active"),
    FieldMapping::flag("suspended", "Suspended"),
    FieldMapping::text("ticket_restriction", "TicketRestriction"),
    FieldMapping::flag("chat_only", "ChatOnly"),
    FieldMapping::ts("last_login_at", "LastLoginAt"),
    FieldMapping::ts("created_at", "CreatedAt"),
    FieldMapping::ts("updated_at", "UpdatedAt"),
];

/// Full descriptor for one synced resource
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EntityConfig {
    pub kind: EntityKind,
    /// Path segment under `/api/v2/`, without `.json`
    pub resource: &'static str,
    /// Key of the record array in each response
    pub envelope: &'static str,
    /// Fixed query parameters on the first request
    pub query: Vec<(String, String)>,
    /// Projection; the first mapping is the key
    pub fields: &'static [FieldMapping],
    pub tables: TableSet,
    pub association: Option<AssociationConfig>,
}

impl EntityConfig {
    /// Build and validate the descriptor for `kind`
    ///
    /// `schema` qualifies every table and procedure; `user_roles` becomes the
    /// `role[]` filter of the users endpoint.
    pub fn build(kind: EntityKind, schema: &str, user_roles: &[String]) -> Result<Self> {
        let (fields, staging, reporting, procedures): (_, _, _, [&str; 3]) = match kind {
            EntityKind::Brands => (
                BRAND_FIELDS,
                "StageZDBrands",
                "ZDBrands",
                ["usp_DeleteZDBrandsTable", "usp_UpdateZDBrandsTable", "usp_LoadZDBrandsTable"],
            ),
            EntityKind::TicketFields => (
                TICKET_FIELD_FIELDS,
                "StageZDTicketFields",
                "ZDTicketFields",
                [
                    "usp_DeleteZDTicketFieldsTable",
                    "usp_UpdateZDTicketFieldsTable",
                    "usp_LoadZDTicketFieldsTable",
                ],
            ),
            EntityKind::TicketForms => (
                TICKET_FORM_FIELDS,
                "StageZDTicketForms",
                "ZDTicketForms",
                [
                    "usp_DeleteZDTicketFormsTable",
                    "usp_UpdateZDTicketFormsTable",
                    "usp_LoadZDTicketFormsTable",
                ],
            ),
            EntityKind::Users => (
                USER_FIELDS,
                "StageZDUsers",
                "ZDUsers",
                ["usp_DeleteZDUsersTable", "usp_UpdateZDUsersTable", "usp_LoadZDUsersTable"],
            ),
        };

        let columns = fields
            .iter()
            .map(|f| Column {
                name: f.column,
                kind: f.kind,
            })
            .collect();
        let key = fields
            .first()
            .ok_or_else(|| SyncError::config(format!("{} has no fields", kind)))?;
        let tables = TableSet::build(schema, staging, reporting, procedures, vec![key.column], columns)?;

        let association = match kind {
            EntityKind::TicketForms => Some(AssociationConfig {
                source_list: "ticket_field_ids",
                child_column: "TicketFieldID",
                parent_column: "TicketFormID",
                tables: TableSet::build(
                    schema,
                    "StageZDTicketFormsFields",
                    "ZDTicketFormsFields",
                    [
                        "usp_DeleteZDTicketFormsFieldsStageTable",
                        "usp_UpdateZDTicketFormsFieldsTable",
                        "usp_LoadZDTicketFormsFieldsTable",
                    ],
                    vec!["TicketFormID", "TicketFieldID"],
                    vec![
                        Column {
                            name: "TicketFieldID",
                            kind: ColumnKind::Integer,
                        },
                        Column {
                            name: "TicketFormID",
                            kind: ColumnKind::Integer,
                        },
                    ],
                )?,
            }),
            _ => None,
        };

        let query = match kind {
            EntityKind::Users => user_roles
                .iter()
                .map(|role| ("role[]".to_string(), role.clone()))
                .collect(),
            _ => Vec::new(),
        };

        Ok(Self {
            kind,
            resource: kind.resource(),
            envelope: kind.resource(),
            query,
            fields,
            tables,
            association,
        })
    }

    /// The source field holding the record key
    pub fn key_field(&self) -> &FieldMapping {
        // `build` rejects empty field lists
        &self.fields[0]
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    fn roles() -> Vec<String> {
        vec!["admin".to_string(), "agent".to_string()]
    }

    #[test]
    fn test_every_entity_builds() {
        for kind in EntityKind::ALL {
            let entity = EntityConfig::build(kind, "dbo", &roles()).unwrap();
            assert_eq!(entity.envelope, kind.resource());
            // mapped columns plus the two audit columns
            assert_eq!(entity.tables.columns.len(), entity.fields.len() + 2);
            assert_eq!(entity.tables.key_indices(), vec![0]);
        }
    }

    #[test]
    fn test_audit_columns_trail() {
        let entity = EntityConfig::build(EntityKind::Brands, "dbo", &[]).unwrap();
        let names: Vec<_> = entity.tables.columns.iter().map(|c| c.name).collect();
        assert_eq!(&names[names.len() - 2..], &[DWH_INSERT_COLUMN, DWH_UPDATE_COLUMN]);
        assert_eq!(entity.tables.staging.quoted(), "\"dbo\".\"StageZDBrands\"");
        assert_eq!(
            entity.tables.procedures.update_reporting.to_string(),
            "dbo.usp_UpdateZDBrandsTable"
        );
    }

    #[test]
    fn test_only_ticket_forms_have_associations() {
        for kind in EntityKind::ALL {
            let entity = EntityConfig::build(kind, "dbo", &[]).unwrap();
            assert_eq!(entity.association.is_some(), kind == EntityKind::TicketForms);
        }

        let forms = EntityConfig::build(EntityKind::TicketForms, "dbo", &[]).unwrap();
        let assoc = forms.association.unwrap();
        let names: Vec<_> = assoc.tables.columns.iter().map(|c| c.name).collect();
        assert_eq!(names, vec!["TicketFieldID", "TicketFormID", "DwhInsert", "DwhUpdate"]);
        assert_eq!(assoc.tables.key_indices(), vec![1, 0]);
        assert_eq!(
            assoc.tables.procedures.clear_staging.name,
            "usp_DeleteZDTicketFormsFieldsStageTable"
        );
    }

    #[test]
    fn test_users_carry_role_filter() {
        let users = EntityConfig::build(EntityKind::Users, "dbo", &roles()).unwrap();
        assert_eq!(
            users.query,
            vec![
                ("role[]".to_string(), "admin".to_string()),
                ("role[]".to_string(), "agent".to_string()),
            ]
        );

        let brands = EntityConfig::build(EntityKind::Brands, "dbo", &roles()).unwrap();
        assert!(brands.query.is_empty());
    }

    #[test]
    fn test_bad_schema_rejected() {
        let err = EntityConfig::build(EntityKind::Brands, "dbo; drop", &[]).unwrap_err();
        assert!(matches!(err, SyncError::Common(_)));
    }

    #[test]
    fn test_entity_kind_parse() {
        assert_eq!("ticket-forms".parse::<EntityKind>().unwrap(), EntityKind::TicketForms);
        assert_eq!("USERS".parse::<EntityKind>().unwrap(), EntityKind::Users);
        assert!("tickets".parse::<EntityKind>().is_err());
    }
}
