use crate::types::{Hand, PoseMessage};
use crate::{BridgeError, Result};
use serde_json::{Map, Value};

// -- Wire keys --
pub const KEY_ID: &str = "id";
pub const KEY_TRACKPAD: &str = "trackpad";
pub const KEY_CLICKED: &str = "clicked";
pub const KEY_TRANSLATION: &str = "translation";
pub const KEY_ROTATION: &str = "rotation";
pub const KEY_TRIGGER: &str = "trigger";

/// Extract the text before the first NUL from a raw byte buffer.
pub fn extract_text(data: &[u8]) -> String {
    let end = data.iter().position(|&b| b == 0).unwrap_or(data.len());
    String::from_utf8_lossy(&data[..end]).into_owned()
}

/// Decode one pose message.
///
/// Every key is looked up on its own. A key that is missing, or present with
/// the wrong type, decodes as zero/false so older or partial senders still
/// drive partial updates. Arrays shorter than expected fill the leading
/// components and leave the rest at zero; extra elements and unknown keys are
/// ignored. Only text that is not a JSON object is rejected.
///
/// Document shape:
/// ```text
/// {"id":0,"trackpad":[x,y],"clicked":false,
///  "translation":[x,y,z],"rotation":[yaw,pitch,roll],"trigger":0.3}
/// ```
pub fn decode(text: &str) -> Result<PoseMessage> {
    let text = text.trim_end_matches('\0');
    let doc: Value =
        serde_json::from_str(text).map_err(|e| BridgeError::MalformedMessage(e.to_string()))?;
    let fields = doc.as_object().ok_or_else(|| {
        BridgeError::MalformedMessage(format!("expected a JSON object, got {}", kind(&doc)))
    })?;

    Ok(PoseMessage {
        controller: Hand::from_wire(number(fields, KEY_ID)),
        translation: numbers(fields, KEY_TRANSLATION),
        rotation: numbers(fields, KEY_ROTATION),
        trackpad: numbers(fields, KEY_TRACKPAD),
        trackpad_clicked: flag(fields, KEY_CLICKED),
        trigger: number(fields, KEY_TRIGGER),
    })
}

fn number(fields: &Map<String, Value>, key: &str) -> f64 {
    fields.get(key).and_then(Value::as_f64).unwrap_or(0.0)
}

fn numbers<const N: usize>(fields: &Map<String, Value>, key: &str) -> [f64; N] {
    let mut out = [0.0; N];
    if let Some(items) = fields.get(key).and_then(Value::as_array) {
        for (slot, item) in out.iter_mut().zip(items) {
            *slot = item.as_f64().unwrap_or(0.0);
        }
    }
    out
}

fn flag(fields: &Map<String, Value>, key: &str) -> bool {
    fields.get(key).and_then(Value::as_bool).unwrap_or(false)
}

fn kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "an array",
        Value::Object(_) => "an object",
    }
}
