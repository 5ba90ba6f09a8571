// ── Upstream payload decoding ──
//
// The facade keeps `children` and `properties` serialized. These helpers
// are for consumers that build hierarchies or detail views on top.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::entity::IpadEntity;
use crate::error::IpadError;

/// One entry of an entity's property list.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EntityProperty {
    pub key: String,
    #[serde(default)]
    pub label: String,
    #[serde(default)]
    pub value: String,
}

/// Parse the permIds listed in `entity.children()`.
///
/// An empty payload means no children.
pub fn parse_children(entity: &IpadEntity) -> Result<Vec<String>, IpadError> {
    let raw = entity.children().trim();
    if raw.is_empty() {
        return Ok(Vec::new());
    }
    serde_json::from_str(raw).map_err(|e| {
        IpadError::malformed(format!("children of {}: {e}", entity.perm_id()))
    })
}

/// Parse `entity.properties()`.
///
/// Accepts either a list of `{key, label, value}` objects (order kept)
/// or a plain object map (ordered by key). Non-string map values are
/// rendered as JSON.
pub fn parse_properties(entity: &IpadEntity) -> Result<Vec<EntityProperty>, IpadError> {
    let raw = entity.properties().trim();
    if raw.is_empty() {
        return Ok(Vec::new());
    }

    let malformed = |detail: String| {
        IpadError::malformed(format!("properties of {}: {detail}", entity.perm_id()))
    };

    match serde_json::from_str::<Value>(raw).map_err(|e| malformed(e.to_string()))? {
        list @ Value::Array(_) => {
            serde_json::from_value(list).map_err(|e| malformed(e.to_string()))
        }
        Value::Object(map) => Ok(map
            .into_iter()
            .map(|(key, value)| EntityProperty {
                label: key.clone(),
                key,
                value: match value {
                    Value::String(s) => s,
                    Value::Null => String::new(),
                    other => other.to_string(),
                },
            })
            .collect()),
        other => Err(malformed(format!("expected list or object, got {other}"))),
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used)]

    use std::collections::HashMap;

    use pretty_assertions::assert_eq;

    use super::*;
    use crate::entity::{RawRecord, columns};

    fn entity(children: &str, properties: &str) -> IpadEntity {
        let record: RawRecord = HashMap::from([
            (columns::PERM_ID.to_owned(), Some("20240101-7".to_owned())),
            (columns::CHILDREN.to_owned(), Some(children.to_owned())),
            (columns::PROPERTIES.to_owned(), Some(properties.to_owned())),
        ]);
        IpadEntity::from_record(&record).unwrap()
    }

    #[test]
    fn children_parse_as_perm_id_list() {
        let e = entity(r#"["P1", "P2"]"#, "");
        assert_eq!(parse_children(&e).unwrap(), vec!["P1", "P2"]);
        assert_eq!(parse_children(&entity("", "")).unwrap(), Vec::<String>::new());
    }

    #[test]
    fn garbage_children_are_malformed() {
        let err = parse_children(&entity("P1,P2", "")).unwrap_err();
        assert!(matches!(err, IpadError::MalformedResponse { .. }));
    }

    #[test]
    fn property_lists_keep_server_order() {
        let e = entity(
            "",
            r#"[{"key":"NAME","label":"Name","value":"pUC19"},{"key":"LENGTH","label":"Length","value":"2686"}]"#,
        );
        let props = parse_properties(&e).unwrap();
        assert_eq!(
            props,
            vec![
                EntityProperty {
                    key: "NAME".into(),
                    label: "Name".into(),
                    value: "pUC19".into(),
                },
                EntityProperty {
                    key: "LENGTH".into(),
                    label: "Length".into(),
                    value: "2686".into(),
                },
            ]
        );
    }

    #[test]
    fn property_maps_render_scalar_values() {
        let e = entity("", r#"{"LENGTH": 2686, "NAME": "pUC19", "NOTE": null}"#);
        let props = parse_properties(&e).unwrap();
        let pairs: Vec<(&str, &str)> = props
            .iter()
            .map(|p| (p.key.as_str(), p.value.as_str()))
            .collect();
        assert_eq!(pairs, vec![("LENGTH", "2686"), ("NAME", "pUC19"), ("NOTE", "")]);
    }

    #[test]
    fn scalar_properties_are_malformed() {
        assert!(parse_properties(&entity("", "42")).is_err());
    }
}
