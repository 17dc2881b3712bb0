//! JSON-patch operation builders.
//!
//! Thin wrappers over `json_patch` so callers deal in path tokens instead of
//! hand-escaped pointer strings (`/` inside a key becomes `~1`).

use json_patch::jsonptr::PointerBuf;
use json_patch::{AddOperation, PatchOperation, ReplaceOperation};
use serde_json::Value;

/// Path of a pod's container list
pub const CONTAINERS_PATH: [&str; 2] = ["spec", "containers"];
/// Path of a pod's annotation map
pub const ANNOTATIONS_PATH: [&str; 2] = ["metadata", "annotations"];

/// Build a JSON pointer from unescaped path tokens
pub fn pointer<'a>(tokens: impl IntoIterator<Item = &'a str>) -> PointerBuf {
    PointerBuf::from_tokens(tokens)
}

/// `replace` operation at `path`
pub fn replace_op(path: PointerBuf, value: Value) -> PatchOperation {
    PatchOperation::Replace(ReplaceOperation { path, value })
}

/// `add` operation at `path`
pub fn add_op(path: PointerBuf, value: Value) -> PatchOperation {
    PatchOperation::Add(AddOperation { path, value })
}
