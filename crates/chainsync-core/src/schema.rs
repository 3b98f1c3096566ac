//! Declarative index schemas for `esblock`, `estx` and `escontract`.

use serde_json::{json, Map, Value};

use crate::document::DocumentKind;
use crate::error::SyncError;

/// Field types used by the three indices.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldType {
    Keyword,
    Long,
    Text,
    Double,
}

impl FieldType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Keyword => "keyword",
            Self::Long => "long",
            Self::Text => "text",
            Self::Double => "double",
        }
    }
}

/// Field name → type for one index.
#[derive(Debug, Clone, PartialEq)]
pub struct IndexSchema {
    pub kind: DocumentKind,
    pub fields: Vec<(&'static str, FieldType)>,
    pub shards: u32,
    pub replicas: u32,
}

impl IndexSchema {
    pub fn name(&self) -> &'static str {
        self.kind.index()
    }

    pub fn field(&self, name: &str) -> Option<FieldType> {
        self.fields.iter().find(|(f, _)| *f == name).map(|(_, t)| *t)
    }

    /// The `properties` object of the mapping.
    pub fn properties(&self) -> Value {
        let mut props = Map::new();
        for (name, ty) in &self.fields {
            props.insert((*name).to_string(), json!({ "type": ty.as_str() }));
        }
        Value::Object(props)
    }

    /// Full create-index body. With `legacy_types` the properties are nested
    /// under the mapping type name, as Elasticsearch 6.x expects.
    pub fn create_body(&self, legacy_types: bool) -> Value {
        let mappings = if legacy_types {
            json!({ self.kind.type_name(): { "properties": self.properties() } })
        } else {
            json!({ "properties": self.properties() })
        };
        json!({
            "settings": {
                "number_of_shards": self.shards,
                "number_of_replicas": self.replicas,
            },
            "mappings": mappings,
        })
    }

    /// Compare against the `properties` object of an existing index.
    ///
    /// Every declared field must exist with the same type. Extra fields in the
    /// existing mapping are ignored.
    pub fn check_compatible(&self, existing: &Value) -> Result<(), SyncError> {
        let mut problems = Vec::new();
        for (name, ty) in &self.fields {
            match existing.get(*name).and_then(|f| f.get("type")).and_then(Value::as_str) {
                Some(t) if t == ty.as_str() => {}
                Some(t) => problems.push(format!("{name}: expected {}, found {t}", ty.as_str())),
                None => problems.push(format!("{name}: missing")),
            }
        }
        if problems.is_empty() {
            Ok(())
        } else {
            Err(SyncError::SchemaMismatch {
                index: self.name().to_string(),
                detail: problems.join("; "),
            })
        }
    }
}

fn schema(kind: DocumentKind, fields: Vec<(&'static str, FieldType)>) -> IndexSchema {
    IndexSchema {
        kind,
        fields,
        shards: 1,
        replicas: 0,
    }
}

/// `esblock` / `block`.
pub fn block_schema() -> IndexSchema {
    use FieldType::*;
    schema(
        DocumentKind::Block,
        vec![
            ("hash", Keyword),
            ("height", Long),
            ("parenthash", Keyword),
            ("sha3uncles", Text),
            ("time", Long),
            ("miner", Text),
            ("nonce", Long),
            ("difficulty", Long),
            ("size", Double),
            ("gaslimit", Long),
            ("gasused", Long),
            ("txs", Keyword),
        ],
    )
}

/// `estx` / `tx`. `value` is a keyword holding the exact decimal wei amount.
pub fn transaction_schema() -> IndexSchema {
    use FieldType::*;
    schema(
        DocumentKind::Transaction,
        vec![
            ("thash", Keyword),
            ("bhash", Keyword),
            ("from", Keyword),
            ("to", Keyword),
            ("value", Keyword),
        ],
    )
}

/// `escontract` / `contract`.
pub fn contract_schema() -> IndexSchema {
    use FieldType::*;
    schema(
        DocumentKind::Contract,
        vec![("owner", Keyword), ("tx", Text), ("abi", Text)],
    )
}

/// All schemas the sync engine writes to.
pub fn all_schemas() -> Vec<IndexSchema> {
    vec![block_schema(), transaction_schema(), contract_schema()]
}

pub fn schema_for(kind: DocumentKind) -> IndexSchema {
    match kind {
        DocumentKind::Block => block_schema(),
        DocumentKind::Transaction => transaction_schema(),
        DocumentKind::Contract => contract_schema(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn block_schema_fields() {
        let s = block_schema();
        assert_eq!(s.name(), "esblock");
        assert_eq!(s.field("height"), Some(FieldType::Long));
        assert_eq!(s.field("size"), Some(FieldType::Double));
        assert_eq!(s.field("txs"), Some(FieldType::Keyword));
        assert_eq!(s.field("nope"), None);
    }

    #[test]
    fn value_is_not_floating_point() {
        assert_eq!(transaction_schema().field("value"), Some(FieldType::Keyword));
    }

    #[test]
    fn create_body_shapes() {
        let modern = contract_schema().create_body(false);
        assert_eq!(modern["settings"]["number_of_shards"], 1);
        assert_eq!(modern["settings"]["number_of_replicas"], 0);
        assert_eq!(modern["mappings"]["properties"]["owner"]["type"], "keyword");

        let legacy = contract_schema().create_body(true);
        assert_eq!(legacy["mappings"]["contract"]["properties"]["abi"]["type"], "text");
    }

    #[test]
    fn compatible_mapping_passes() {
        let s = transaction_schema();
        let mut existing = s.properties();
        existing["extra"] = json!({"type": "text"});
        assert!(s.check_compatible(&existing).is_ok());
    }

    #[test]
    fn incompatible_mapping_is_reported() {
        let s = transaction_schema();
        let mut existing = s.properties();
        existing["value"] = json!({"type": "double"});
        existing.as_object_mut().unwrap().remove("to");
        let err = s.check_compatible(&existing).unwrap_err();
        match err {
            SyncError::SchemaMismatch { index, detail } => {
                assert_eq!(index, "estx");
                assert!(detail.contains("value: expected keyword, found double"));
                assert!(detail.contains("to: missing"));
            }
            other => panic!("unexpected {other:?}"),
        }
    }
}
