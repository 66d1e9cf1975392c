//! Document rendering.

use serde::Serialize;
use serde_json::ser::{PrettyFormatter, Serializer};

use crate::error::McpError;

/// Serialize `value` as JSON indented by one space per level, with a
/// trailing newline.
pub fn indented_json<T: Serialize + ?Sized>(value: &T) -> Result<String, McpError> {
    let mut buf = Vec::new();
    let mut ser = Serializer::with_formatter(&mut buf, PrettyFormatter::with_indent(b" "));
    value.serialize(&mut ser)?;
    buf.push(b'\n');
    // serde_json only ever writes UTF-8
    String::from_utf8(buf).map_err(|e| McpError::Internal(e.into()))
}
