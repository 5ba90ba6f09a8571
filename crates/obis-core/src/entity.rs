// ── Raw entity records ──
//
// `IpadEntity` is the immutable value the facade hands back for each row
// of an ipad-access listing. Construction validates field presence only;
// `children` and `properties` stay serialized (see `decode`).

use std::collections::HashMap;

use obis_api::TableModel;
use serde::Serialize;

use crate::error::IpadError;

/// Column titles produced by the ipad-access module.
pub mod columns {
    pub const SUMMARY_HEADER: &str = "SUMMARY_HEADER";
    pub const SUMMARY: &str = "SUMMARY";
    pub const IDENTIFIER: &str = "IDENTIFIER";
    pub const PERM_ID: &str = "PERM_ID";
    pub const REFCON: &str = "REFCON";
    pub const CATEGORY: &str = "CATEGORY";
    pub const IMAGE_URL: &str = "IMAGE_URL";
    pub const CHILDREN: &str = "CHILDREN";
    pub const PROPERTIES: &str = "PROPERTIES";
}

/// One decoded server row, keyed by column title. `None` is a null cell.
pub type RawRecord = HashMap<String, Option<String>>;

/// A single entity (sample, experiment, data set, ...) as listed by the
/// ipad-access module.
///
/// `perm_id` is the identity key within a listing; `identifier` is a
/// display path and may repeat.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
pub struct IpadEntity {
    summary_header: String,
    summary: String,
    identifier: String,
    perm_id: String,
    refcon: String,
    group: String,
    image_url: String,
    children: String,
    properties: String,
}

impl IpadEntity {
    /// Build an entity from a decoded record.
    ///
    /// `PERM_ID` must be present and non-empty; every other column
    /// defaults to an empty string.
    pub fn from_record(record: &RawRecord) -> Result<Self, IpadError> {
        let field = |name: &str| {
            record
                .get(name)
                .and_then(Option::as_deref)
                .unwrap_or_default()
                .to_owned()
        };

        let perm_id = field(columns::PERM_ID);
        if perm_id.is_empty() {
            let identifier = field(columns::IDENTIFIER);
            return Err(IpadError::malformed(if identifier.is_empty() {
                "record without PERM_ID".to_owned()
            } else {
                format!("record '{identifier}' has no PERM_ID")
            }));
        }

        Ok(Self {
            summary_header: field(columns::SUMMARY_HEADER),
            summary: field(columns::SUMMARY),
            identifier: field(columns::IDENTIFIER),
            perm_id,
            refcon: field(columns::REFCON),
            group: field(columns::CATEGORY),
            image_url: field(columns::IMAGE_URL),
            children: field(columns::CHILDREN),
            properties: field(columns::PROPERTIES),
        })
    }

    pub fn summary_header(&self) -> &str {
        &self.summary_header
    }

    pub fn summary(&self) -> &str {
        &self.summary
    }

    pub fn identifier(&self) -> &str {
        &self.identifier
    }

    pub fn perm_id(&self) -> &str {
        &self.perm_id
    }

    /// Opaque token the server wants back when this entity is referenced.
    pub fn refcon(&self) -> &str {
        &self.refcon
    }

    pub fn group(&self) -> &str {
        &self.group
    }

    pub fn image_url(&self) -> &str {
        &self.image_url
    }

    /// Serialized list of child permIds.
    pub fn children(&self) -> &str {
        &self.children
    }

    /// Serialized property map.
    pub fn properties(&self) -> &str {
        &self.properties
    }
}

/// Turn an ipad-access table into entities, preserving row order.
///
/// Fails on the first malformed row; no partial listing is returned.
pub fn decode_listing(table: &TableModel) -> Result<Vec<IpadEntity>, IpadError> {
    let titles: Vec<&str> = table.column_titles().collect();

    table
        .rows
        .iter()
        .enumerate()
        .map(|(index, row)| {
            if row.len() != titles.len() {
                return Err(IpadError::malformed(format!(
                    "row {index} has {} cells, expected {}",
                    row.len(),
                    titles.len()
                )));
            }
            let record: RawRecord = titles
                .iter()
                .zip(row)
                .map(|(title, cell)| ((*title).to_owned(), cell.0.clone()))
                .collect();
            IpadEntity::from_record(&record)
        })
        .collect()
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used)]

    use pretty_assertions::assert_eq;

    use super::*;

    fn cells(values: &[Option<&str>]) -> Vec<Option<String>> {
        values.iter().map(|v| v.map(str::to_owned)).collect()
    }

    fn full_table() -> TableModel {
        TableModel::from_rows(
            [
                columns::SUMMARY_HEADER,
                columns::SUMMARY,
                columns::IDENTIFIER,
                columns::PERM_ID,
                columns::REFCON,
                columns::CATEGORY,
                columns::IMAGE_URL,
                columns::CHILDREN,
                columns::PROPERTIES,
            ],
            [
                cells(&[
                    Some("Plasmid B"),
                    Some("pBR322 backbone"),
                    Some("/A/B"),
                    Some("P1"),
                    Some(r#"{"code":"B"}"#),
                    Some("PLASMID"),
                    Some("https://images.example.org/b.png"),
                    Some(r#"["P2"]"#),
                    Some(r#"[{"key":"LENGTH","label":"Length","value":"4361"}]"#),
                ]),
                cells(&[
                    Some("Plasmid C"),
                    None,
                    Some("/A/C"),
                    Some("P2"),
                    None,
                    Some("PLASMID"),
                    None,
                    Some("[]"),
                    None,
                ]),
            ],
        )
    }

    #[test]
    fn decodes_rows_in_server_order_verbatim() {
        let entities = decode_listing(&full_table()).unwrap();

        assert_eq!(entities.len(), 2);
        let first = &entities[0];
        assert_eq!(first.perm_id(), "P1");
        assert_eq!(first.identifier(), "/A/B");
        assert_eq!(first.summary_header(), "Plasmid B");
        assert_eq!(first.summary(), "pBR322 backbone");
        assert_eq!(first.refcon(), r#"{"code":"B"}"#);
        assert_eq!(first.group(), "PLASMID");
        assert_eq!(first.image_url(), "https://images.example.org/b.png");
        assert_eq!(first.children(), r#"["P2"]"#);
        assert_eq!(
            first.properties(),
            r#"[{"key":"LENGTH","label":"Length","value":"4361"}]"#
        );

        let second = &entities[1];
        assert_eq!(second.perm_id(), "P2");
        assert_eq!(second.summary(), "");
        assert_eq!(second.refcon(), "");
    }

    #[test]
    fn missing_perm_id_fails_the_whole_listing() {
        let table = TableModel::from_rows(
            [columns::PERM_ID, columns::IDENTIFIER],
            [
                cells(&[Some("P1"), Some("/A/B")]),
                cells(&[None, Some("/A/C")]),
            ],
        );

        let err = decode_listing(&table).unwrap_err();
        match err {
            IpadError::MalformedResponse { message } => assert!(message.contains("/A/C")),
            other => panic!("expected MalformedResponse, got: {other:?}"),
        }
    }

    #[test]
    fn table_without_perm_id_column_is_malformed() {
        let table = TableModel::from_rows([columns::IDENTIFIER], [cells(&[Some("/A/B")])]);
        assert!(matches!(
            decode_listing(&table),
            Err(IpadError::MalformedResponse { .. })
        ));
    }

    #[test]
    fn ragged_rows_are_malformed() {
        let table = TableModel::from_rows(
            [columns::PERM_ID, columns::IDENTIFIER],
            [cells(&[Some("P1")])],
        );
        assert!(matches!(
            decode_listing(&table),
            Err(IpadError::MalformedResponse { .. })
        ));
    }

    #[test]
    fn empty_table_is_an_empty_listing() {
        assert_eq!(decode_listing(&TableModel::default()).unwrap(), Vec::new());
    }
}
