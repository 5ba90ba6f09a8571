// openBIS v3 wire types
//
// Only the shapes the ipad-access client touches are modelled: the
// JSON-RPC envelope, aggregation-service search results, and the
// `TableModel` an aggregation service returns. Fields use
// `#[serde(default)]` because v3 omits empty collections.

use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;

// ── JSON-RPC envelope ────────────────────────────────────────────────

/// JSON-RPC 2.0 response envelope.
///
/// ```json
/// { "jsonrpc": "2.0", "id": "...", "result": ... }
/// { "jsonrpc": "2.0", "id": "...", "error": { "code": -32603, "message": "..." } }
/// ```
#[derive(Debug, Deserialize)]
pub struct RpcResponse {
    #[serde(default)]
    pub result: Value,
    #[serde(default)]
    pub error: Option<RpcFault>,
}

/// The `error` member of a JSON-RPC response.
#[derive(Debug, Deserialize)]
pub struct RpcFault {
    #[serde(default)]
    pub code: Option<i64>,
    #[serde(default)]
    pub message: String,
    /// jsonrpc4j puts `{ exceptionTypeName, message }` here.
    #[serde(default)]
    pub data: Option<Value>,
}

impl RpcFault {
    /// Whether the server rejected the call because the session token
    /// is unknown, expired, or was logged out.
    pub fn is_invalid_session(&self) -> bool {
        let exception = self
            .data
            .as_ref()
            .and_then(|d| d.get("exceptionTypeName"))
            .and_then(Value::as_str)
            .unwrap_or_default();
        if exception.contains("InvalidSession") {
            return true;
        }
        let msg = self.message.to_ascii_lowercase();
        msg.contains("session")
            && (msg.contains("invalid") || msg.contains("expired") || msg.contains("no longer"))
    }
}

// ── Aggregation services ─────────────────────────────────────────────

/// A discovered server-side module (an openBIS aggregation service)
/// and the data store that hosts it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ModuleDescriptor {
    /// Service key, e.g. `ipad-read-service-v1`.
    pub name: String,
    /// Code of the data store server hosting the service.
    pub data_store: String,
}

/// `SearchResult<AggregationService>` as returned by `searchAggregationServices`.
#[derive(Debug, Default, Deserialize)]
pub(crate) struct AggregationServiceSearch {
    #[serde(default)]
    pub objects: Vec<AggregationService>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct AggregationService {
    #[serde(default)]
    pub name: Option<String>,
    pub perm_id: DssServicePermId,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct DssServicePermId {
    pub perm_id: String,
    pub data_store_id: DataStorePermId,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct DataStorePermId {
    pub perm_id: String,
}

impl AggregationService {
    pub(crate) fn into_descriptor(self) -> ModuleDescriptor {
        ModuleDescriptor {
            name: self.name.unwrap_or(self.perm_id.perm_id),
            data_store: self.perm_id.data_store_id.perm_id,
        }
    }
}

// ── Table model ──────────────────────────────────────────────────────

/// Tabular result of an aggregation service.
///
/// ```json
/// { "columns": [{ "title": "PERM_ID" }], "rows": [[{ "value": "P1" }]] }
/// ```
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct TableModel {
    #[serde(default)]
    pub columns: Vec<TableColumn>,
    #[serde(default)]
    pub rows: Vec<Vec<TableCell>>,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct TableColumn {
    pub title: String,
}

/// One cell, flattened to its textual value.
///
/// v3 cells are typed (`TableStringCell`, `TableLongCell`,
/// `TableDoubleCell`); every variant carries a `value` member. Numbers are
/// rendered with their JSON representation and `null` becomes `None`.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct TableCell(pub Option<String>);

impl TableCell {
    pub fn as_str(&self) -> Option<&str> {
        self.0.as_deref()
    }
}

impl<'de> Deserialize<'de> for TableCell {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = Value::deserialize(deserializer)?;
        let value = match raw {
            Value::Object(mut map) => map.remove("value").unwrap_or(Value::Null),
            other => other,
        };
        Ok(Self(match value {
            Value::Null => None,
            Value::String(s) => Some(s),
            other => Some(other.to_string()),
        }))
    }
}

impl TableModel {
    /// Build a table from column titles and string rows.
    pub fn from_rows<C, R>(columns: C, rows: R) -> Self
    where
        C: IntoIterator,
        C::Item: Into<String>,
        R: IntoIterator<Item = Vec<Option<String>>>,
    {
        Self {
            columns: columns
                .into_iter()
                .map(|title| TableColumn {
                    title: title.into(),
                })
                .collect(),
            rows: rows
                .into_iter()
                .map(|row| row.into_iter().map(TableCell).collect())
                .collect(),
        }
    }

    pub fn column_titles(&self) -> impl Iterator<Item = &str> {
        self.columns.iter().map(|c| c.title.as_str())
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used)]

    use serde_json::json;

    use super::*;

    #[test]
    fn table_cells_flatten_typed_values() {
        let table: TableModel = serde_json::from_value(json!({
            "@type": "as.dto.common.TableModel",
            "columns": [{ "@type": "as.dto.common.TableColumn", "title": "PERM_ID" },
                        { "title": "COUNT" },
                        { "title": "NOTE" }],
            "rows": [[
                { "@type": "as.dto.common.TableStringCell", "value": "20240101-1" },
                { "@type": "as.dto.common.TableLongCell", "value": 42 },
                { "@type": "as.dto.common.TableStringCell", "value": null }
            ]]
        }))
        .unwrap();

        assert_eq!(table.column_titles().collect::<Vec<_>>(), ["PERM_ID", "COUNT", "NOTE"]);
        assert_eq!(table.rows[0][0].as_str(), Some("20240101-1"));
        assert_eq!(table.rows[0][1].as_str(), Some("42"));
        assert_eq!(table.rows[0][2].as_str(), None);
    }

    #[test]
    fn invalid_session_detected_from_exception_type() {
        let fault: RpcFault = serde_json::from_value(json!({
            "code": 0,
            "message": "Session token 'admin-123' is invalid: user is not logged in.",
            "data": { "exceptionTypeName": "ch.systemsx.cisd.common.exceptions.InvalidSessionException" }
        }))
        .unwrap();
        assert!(fault.is_invalid_session());

        let other = RpcFault {
            code: Some(-32603),
            message: "Unknown service 'foo'".into(),
            data: None,
        };
        assert!(!other.is_invalid_session());
    }

    #[test]
    fn service_name_falls_back_to_perm_id() {
        let service: AggregationService = serde_json::from_value(json!({
            "permId": { "permId": "ipad-read-service-v1", "dataStoreId": { "permId": "DSS1" } }
        }))
        .unwrap();
        let desc = service.into_descriptor();
        assert_eq!(desc.name, "ipad-read-service-v1");
        assert_eq!(desc.data_store, "DSS1");
    }
}
