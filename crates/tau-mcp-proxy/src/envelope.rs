use serde_json::{json, Map, Value};

pub const JSONRPC_VERSION: &str = "2.0";
pub const JSONRPC_ERROR_INVALID_REQUEST: i64 = -32600;
pub const JSONRPC_ERROR_INTERNAL: i64 = -32603;
pub const MCP_METHOD_TOOLS_CALL: &str = "tools/call";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
/// Enumerates supported `MessageKind` values.
pub enum MessageKind {
    Request,
    Response,
    Notification,
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
/// Correlation key for a JSON-RPC id.
///
/// Holds the canonical JSON text of the id, so the string `"1"` and the integer
/// `1` stay distinct.
pub struct RequestId(String);

impl RequestId {
    /// Only string and integer ids are accepted; anything else is treated as
    /// an absent id.
    pub fn from_value(value: &Value) -> Option<Self> {
        match value {
            Value::String(_) => Some(Self(value.to_string())),
            Value::Number(number) if number.is_i64() || number.is_u64() => {
                Some(Self(number.to_string()))
            }
            _ => None,
        }
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for RequestId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

#[derive(Debug, Clone, PartialEq)]
/// One decoded line of the line-delimited JSON-RPC stream.
pub struct McpMessage {
    object: Map<String, Value>,
}

impl McpMessage {
    /// Decode one raw line. Returns `None` for anything that is not a JSON
    /// object, including invalid UTF-8 and blank lines.
    pub fn parse(line: &[u8]) -> Option<Self> {
        let trimmed = trim_line_ending(line);
        if trimmed.iter().all(u8::is_ascii_whitespace) {
            return None;
        }
        match serde_json::from_slice::<Value>(trimmed).ok()? {
            Value::Object(object) => Some(Self { object }),
            _ => None,
        }
    }

    pub fn id(&self) -> Option<&Value> {
        self.object
            .get("id")
            .filter(|id| RequestId::from_value(id).is_some())
    }

    pub fn request_id(&self) -> Option<RequestId> {
        self.object.get("id").and_then(RequestId::from_value)
    }

    pub fn method(&self) -> Option<&str> {
        self.object.get("method").and_then(Value::as_str)
    }

    pub fn kind(&self) -> MessageKind {
        match (self.id(), self.method()) {
            (Some(_), Some(_)) => MessageKind::Request,
            (Some(_), None) => MessageKind::Response,
            (None, _) => MessageKind::Notification,
        }
    }

    pub fn params(&self) -> Option<&Value> {
        self.object.get("params")
    }

    pub fn params_mut(&mut self) -> Option<&mut Value> {
        self.object.get_mut("params")
    }

    pub fn result(&self) -> Option<&Value> {
        self.object.get("result")
    }

    pub fn set_result(&mut self, result: Value) {
        self.object.insert("result".to_string(), result);
    }

    pub fn result_mut(&mut self) -> Option<&mut Value> {
        self.object.get_mut("result")
    }

    pub fn is_error(&self) -> bool {
        self.object.contains_key("error")
    }

    /// `params.name` of a `tools/call` request.
    pub fn tool_call_name(&self) -> Option<&str> {
        if self.method() != Some(MCP_METHOD_TOOLS_CALL) {
            return None;
        }
        self.params()?.get("name")?.as_str()
    }

    pub fn to_line(&self) -> Result<Vec<u8>, serde_json::Error> {
        let mut encoded = serde_json::to_vec(&self.object)?;
        encoded.push(b'\n');
        Ok(encoded)
    }
}

fn trim_line_ending(line: &[u8]) -> &[u8] {
    let line = line.strip_suffix(b"\n").unwrap_or(line);
    line.strip_suffix(b"\r").unwrap_or(line)
}

pub fn jsonrpc_error_frame(id: Value, code: i64, message: impl Into<String>) -> Value {
    json!({
        "jsonrpc": JSONRPC_VERSION,
        "id": id,
        "error": {
            "code": code,
            "message": message.into(),
        }
    })
}

/// Encode a JSON value as one newline-terminated protocol line.
pub fn encode_line(value: &Value) -> Result<Vec<u8>, serde_json::Error> {
    let mut encoded = serde_json::to_vec(value)?;
    encoded.push(b'\n');
    Ok(encoded)
}
