use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Parsed variable bindings handed to the engine.
pub type Inputs = Map<String, Value>;

/// Body of a `POST` to the query endpoint.
///
/// A missing `query` deserialises to an empty string so that the
/// orchestrator, not the decoder, reports it as a validation failure.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QueryRequest {
    #[serde(default)]
    pub query: String,
    #[serde(default)]
    pub variables: Option<Variables>,
    #[serde(default)]
    pub operation_name: Option<String>,
}

impl QueryRequest {
    pub fn new(query: impl Into<String>) -> Self {
        Self {
            query: query.into(),
            ..Default::default()
        }
    }
}

/// Clients send variables either as a JSON object or as a string holding one.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Variables {
    Object(Inputs),
    Text(String),
}

impl Variables {
    /// Resolve into engine inputs. A blank string or `"null"` means no variables.
    pub fn into_inputs(self) -> Result<Option<Inputs>, serde_json::Error> {
        match self {
            Variables::Object(map) => Ok(Some(map)),
            Variables::Text(text) => {
                let text = text.trim();
                if text.is_empty() {
                    return Ok(None);
                }
                serde_json::from_str::<Option<Inputs>>(text)
            }
        }
    }
}
