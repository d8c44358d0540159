// dtbackuptool/src/inventory/parser.rs
//! Parsing for the `key : value` block format printed by `rac`.
//!
//! `rac` prints one object per block, blocks separated by blank lines:
//!
//! ```text
//! infobase : 5a8c3e44-...
//! name     : buh
//! descr    : "Accounting"
//! ```

use tracing::warn;

use crate::errors::{BackupError, Result};

/// One `key : value` line, key and value trimmed.
pub type Field = (String, String);

/// Splits output into blocks of fields. Each line is split on its first `:`
/// only, so values may themselves contain colons. A non-blank line without a
/// colon is an error rather than silently dropped.
pub fn parse_blocks(output: &str) -> Result<Vec<Vec<Field>>> {
    let mut blocks = Vec::new();
    let mut current: Vec<Field> = Vec::new();

    for (index, raw_line) in output.lines().enumerate() {
        let line = raw_line.trim();
        if line.is_empty() {
            if !current.is_empty() {
                blocks.push(std::mem::take(&mut current));
            }
            continue;
        }

        let (key, value) = line.split_once(':').ok_or_else(|| BackupError::InventoryParse {
            line: index + 1,
            content: line.to_string(),
        })?;
        current.push((key.trim().to_string(), value.trim().to_string()));
    }

    if !current.is_empty() {
        blocks.push(current);
    }
    Ok(blocks)
}

/// An infobase as listed by `rac infobase summary list`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DatabaseRecord {
    pub name: String,
    pub description: Option<String>,
}

impl DatabaseRecord {
    /// `rac` can print blocks without a name field; such records are kept
    /// but cannot be backed up.
    pub fn has_name(&self) -> bool {
        !self.name.is_empty()
    }
}

/// Maps blocks to records: a key containing `name` sets the name, otherwise
/// a key containing `descr` sets the description. Keys are compared
/// case-insensitively; anything else is ignored.
pub fn parse_infobase_list(output: &str) -> Result<Vec<DatabaseRecord>> {
    let records: Vec<DatabaseRecord> = parse_blocks(output)?
        .into_iter()
        .map(|block| {
            let mut record = DatabaseRecord {
                name: String::new(),
                description: None,
            };
            for (key, value) in block {
                let key = key.to_lowercase();
                if key.contains("name") {
                    record.name = value;
                } else if key.contains("descr") {
                    record.description = Some(value);
                }
            }
            record
        })
        .collect();

    let unnamed = records.iter().filter(|r| !r.has_name()).count();
    if unnamed > 0 {
        warn!(count = unnamed, "Infobase list contains records without a name");
    }
    Ok(records)
}

/// Cluster ids from `rac cluster list`, in output order. The id is the
/// value of the `cluster` key, or the first value of a block without one.
pub fn parse_cluster_list(output: &str) -> Result<Vec<String>> {
    Ok(parse_blocks(output)?
        .into_iter()
        .filter_map(|block| {
            let id = block
                .iter()
                .find(|(key, _)| key.eq_ignore_ascii_case("cluster"))
                .or_else(|| block.first())
                .map(|(_, value)| value.clone())?;
            (!id.is_empty()).then_some(id)
        })
        .collect())
}
