//! Record normalizer: fixed-arity decoding of the inventory export.
//!
//! The export has no header row and no quoting. Column order is the only
//! thing tying a value to its meaning:
//!
//! `id, resource_type, category, resource_id, parent_id, display_name, name`
//!
//! A comma inside a name shifts every later column. That is a limitation of
//! the upstream export and is surfaced here as a field-count mismatch.

use std::fmt;
use tracing::debug;

use crate::error::{InventoryError, Result, RowError};

/// Number of positional fields in an export row.
pub const FIELD_COUNT: usize = 7;

/// Resource type tag carried by each record.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum ResourceType {
    Organization,
    Folder,
    Project,
    AppengineApp,
    KubernetesCluster,
    Cloudsqlinstance,
    Bucket,
    Disk,
    Instance,
    InstanceGroup,
    Instancetemplate,
    /// Anything the export emits that we don't know by name.
    Other(String),
}

impl ResourceType {
    /// Parse the raw export tag. Never fails; unknown tags are kept verbatim.
    pub fn parse(raw: &str) -> Self {
        match raw {
            "organization" => Self::Organization,
            "folder" => Self::Folder,
            "project" => Self::Project,
            "appengine_app" => Self::AppengineApp,
            "kubernetes_cluster" => Self::KubernetesCluster,
            "cloudsqlinstance" => Self::Cloudsqlinstance,
            "bucket" => Self::Bucket,
            "disk" => Self::Disk,
            "instance" => Self::Instance,
            "instance_group" => Self::InstanceGroup,
            "instancetemplate" => Self::Instancetemplate,
            other => Self::Other(other.to_string()),
        }
    }

    pub fn as_str(&self) -> &str {
        match self {
            Self::Organization => "organization",
            Self::Folder => "folder",
            Self::Project => "project",
            Self::AppengineApp => "appengine_app",
            Self::KubernetesCluster => "kubernetes_cluster",
            Self::Cloudsqlinstance => "cloudsqlinstance",
            Self::Bucket => "bucket",
            Self::Disk => "disk",
            Self::Instance => "instance",
            Self::InstanceGroup => "instance_group",
            Self::Instancetemplate => "instancetemplate",
            Self::Other(s) => s,
        }
    }

    /// Icon path (relative to the icon base URL) for this resource type.
    pub fn icon_key(&self) -> &'static str {
        match self {
            Self::Organization => "cloud_logo.png",
            Self::Folder => "folder_logo.png",
            Self::Project => "project_logo.png",
            Self::AppengineApp => "compute/app_engine.png",
            Self::KubernetesCluster => "compute/container_engine.png",
            Self::Cloudsqlinstance => "storage___databases/cloud_sql.png",
            Self::Bucket => "storage___databases/cloud_storage.png",
            Self::Disk => "storage___databases/persistent_disk.png",
            Self::Instance => "compute/compute_engine.png",
            _ => "extras/generic_gcp.png",
        }
    }
}

impl fmt::Display for ResourceType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One inventory item as exported by the data source.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FlatRecord {
    pub id: i64,
    pub resource_type: ResourceType,
    pub category: String,
    pub resource_id: String,
    /// `None` only for the organization record.
    pub parent_id: Option<i64>,
    pub display_name: String,
    pub name: String,
}

impl FlatRecord {
    /// Label shown for this record: display name, falling back to name.
    pub fn effective_name(&self) -> &str {
        if self.display_name.is_empty() {
            &self.name
        } else {
            &self.display_name
        }
    }

    /// Format the record back into an export line (no trailing newline).
    pub fn to_row(&self) -> String {
        format!(
            "{},{},{},{},{},{},{}",
            self.id,
            self.resource_type,
            self.category,
            self.resource_id,
            self.parent_id.unwrap_or(0),
            self.display_name,
            self.name,
        )
    }
}

/// Decode one row of exactly [`FIELD_COUNT`] positional fields.
pub fn normalize<S: AsRef<str>>(fields: &[S]) -> Result<FlatRecord> {
    if fields.len() != FIELD_COUNT {
        return Err(InventoryError::MalformedRow(format!(
            "expected {} fields, got {}",
            FIELD_COUNT,
            fields.len()
        )));
    }
    let field: Vec<&str> = fields.iter().map(|f| f.as_ref()).collect();

    let id = parse_int("id", field[0])?;
    let resource_type = ResourceType::parse(field[1]);

    let parent_id = if resource_type == ResourceType::Organization {
        None
    } else {
        let raw = field[4].trim();
        let parent = if raw.is_empty() {
            0
        } else {
            parse_int("parent_id", raw)?
        };
        // Only the organization may be parentless.
        if parent == 0 {
            return Err(InventoryError::DanglingParent {
                id,
                parent_id: None,
            });
        }
        Some(parent)
    };

    Ok(FlatRecord {
        id,
        resource_type,
        category: field[2].to_string(),
        resource_id: field[3].to_string(),
        parent_id,
        display_name: field[5].to_string(),
        name: field[6].to_string(),
    })
}

fn parse_int(column: &str, raw: &str) -> Result<i64> {
    raw.trim().parse::<i64>().map_err(|e| {
        InventoryError::MalformedRow(format!("{} {:?} is not an integer: {}", column, raw, e))
    })
}

/// Split a raw export into rows and normalize each one.
///
/// Blank lines are skipped. The first bad row aborts the whole snapshot.
pub fn parse_rows(text: &str) -> std::result::Result<Vec<FlatRecord>, RowError> {
    let mut reader = csv::ReaderBuilder::new()
        .has_headers(false)
        .flexible(true)
        .quoting(false)
        .from_reader(text.as_bytes());

    let mut records = Vec::new();
    for result in reader.records() {
        let row = result.map_err(|e| RowError {
            line: e.position().map(|p| p.line() as usize).unwrap_or(0),
            source: InventoryError::MalformedRow(e.to_string()),
        })?;
        let line = row.position().map(|p| p.line() as usize).unwrap_or(0);

        // The csv reader already drops empty lines; a lone whitespace field is
        // the only other shape of a blank line.
        if row.len() == 1 && row[0].trim().is_empty() {
            continue;
        }

        let fields: Vec<&str> = row.iter().collect();
        let record = normalize(&fields).map_err(|source| RowError { line, source })?;
        records.push(record);
    }

    debug!("Normalized {} inventory records", records.len());
    Ok(records)
}

/// Render records as the newline-terminated export format.
pub fn export_rows<'a>(records: impl IntoIterator<Item = &'a FlatRecord>) -> String {
    let mut out = String::new();
    for record in records {
        out.push_str(&record.to_row());
        out.push('\n');
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    fn row(fields: [&str; 7]) -> Vec<String> {
        fields.iter().map(|f| f.to_string()).collect()
    }

    #[test]
    fn test_normalize_basic() {
        let rec = normalize(&row(["2", "project", "resource", "proj/2", "1", "", "proj-a"])).unwrap();
        assert_eq!(rec.id, 2);
        assert_eq!(rec.resource_type, ResourceType::Project);
        assert_eq!(rec.parent_id, Some(1));
        assert_eq!(rec.resource_id, "proj/2");
    }

    #[test]
    fn test_organization_has_no_parent() {
        let rec = normalize(&row(["1", "organization", "resource", "org/1", "1", "Acme", ""])).unwrap();
        assert_eq!(rec.parent_id, None);

        let rec = normalize(&row(["1", "organization", "resource", "org/1", "0", "Acme", ""])).unwrap();
        assert_eq!(rec.parent_id, None);
    }

    #[test]
    fn test_zero_parent_on_non_root_is_dangling() {
        let err = normalize(&row(["5", "bucket", "resource", "b/5", "0", "", "b"])).unwrap_err();
        assert_eq!(
            err,
            InventoryError::DanglingParent {
                id: 5,
                parent_id: None
            }
        );
    }

    #[test]
    fn test_name_fallback() {
        let rec = normalize(&row(["3", "bucket", "resource", "b/3", "2", "", "X"])).unwrap();
        assert_eq!(rec.effective_name(), "X");

        let rec = normalize(&row(["3", "bucket", "resource", "b/3", "2", "Y", "X"])).unwrap();
        assert_eq!(rec.effective_name(), "Y");

        let rec = normalize(&row(["3", "bucket", "resource", "b/3", "2", "", ""])).unwrap();
        assert_eq!(rec.effective_name(), "");
    }

    #[test]
    fn test_wrong_field_count_is_malformed() {
        let fields = vec!["1", "organization", "resource", "org/1", "0", "Acme"];
        let err = normalize(&fields).unwrap_err();
        assert!(matches!(err, InventoryError::MalformedRow(_)));
    }

    #[test]
    fn test_non_numeric_id_is_malformed() {
        let err = normalize(&row(["abc", "folder", "resource", "f/1", "1", "", "f"])).unwrap_err();
        assert!(matches!(err, InventoryError::MalformedRow(msg) if msg.contains("id")));
    }

    #[test]
    fn test_icon_key_mapping() {
        assert_eq!(ResourceType::Organization.icon_key(), "cloud_logo.png");
        assert_eq!(ResourceType::Disk.icon_key(), "storage___databases/persistent_disk.png");
        assert_eq!(ResourceType::InstanceGroup.icon_key(), "extras/generic_gcp.png");
        assert_eq!(
            ResourceType::parse("dataset").icon_key(),
            "extras/generic_gcp.png"
        );
    }

    #[test]
    fn test_resource_type_tags_survive_display() {
        for tag in [
            "organization",
            "appengine_app",
            "kubernetes_cluster",
            "instance_group",
            "instancetemplate",
            "dataset",
        ] {
            assert_eq!(ResourceType::parse(tag).to_string(), tag);
        }
        assert_eq!(
            ResourceType::parse("dataset"),
            ResourceType::Other("dataset".to_string())
        );
    }

    #[test]
    fn test_parse_rows_skips_blank_lines() {
        let text = "1,organization,resource,org/1,0,Acme,\n\n2,project,resource,proj/2,1,,proj-a\n";
        let records = parse_rows(text).unwrap();
        assert_eq!(records.len(), 2);
        assert_eq!(records[1].effective_name(), "proj-a");
    }

    #[test]
    fn test_parse_rows_reports_line() {
        let text = "1,organization,resource,org/1,0,Acme,\n2,project,resource,proj/2,1,proj-a\n";
        let err = parse_rows(text).unwrap_err();
        assert_eq!(err.line, 2);
        assert!(matches!(err.source, InventoryError::MalformedRow(_)));
    }

    #[test]
    fn test_embedded_comma_misaligns_row() {
        let text = "1,organization,resource,org/1,0,Acme, Inc.,acme\n";
        let err = parse_rows(text).unwrap_err();
        assert!(matches!(err.source, InventoryError::MalformedRow(_)));
    }

    #[test]
    fn test_export_rows_format() {
        let text = "1,organization,resource,org/1,0,Acme,\n3,bucket,resource,buck/3,1,,my-bucket\n";
        let records = parse_rows(text).unwrap();
        assert_eq!(export_rows(&records), text);
    }
}
