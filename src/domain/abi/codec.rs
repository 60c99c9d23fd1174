//! Argument coercion and result formatting on top of alloy-dyn-abi

use alloy_dyn_abi::{DynSolType, DynSolValue, Specifier};
use alloy_json_abi::Function;
use alloy_primitives::B256;
use thiserror::Error;

/// Width of the fixed-size identifiers the registry contract works with
pub const IDENTIFIER_WIDTH: usize = 32;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CodecError {
    #[error("identifier '{identifier}' is {len} bytes, longer than the {width} byte field")]
    IdentifierTooLong {
        identifier: String,
        len: usize,
        width: usize,
    },
    #[error("expected {expected} arguments, got {got}")]
    ArgumentCount { expected: usize, got: usize },
    #[error("argument {index} ('{value}') is not a valid {kind}: {reason}")]
    Coerce {
        index: usize,
        value: String,
        kind: String,
        reason: String,
    },
    #[error("failed to encode call: {0}")]
    Encode(String),
}

/// Right-pad an identifier with NUL bytes up to `width`.
///
/// Identifiers already at `width` are returned unchanged; longer ones are
/// rejected rather than truncated.
pub fn pad_identifier(identifier: &str, width: usize) -> Result<Vec<u8>, CodecError> {
    let bytes = identifier.as_bytes();
    if bytes.len() > width {
        return Err(CodecError::IdentifierTooLong {
            identifier: identifier.to_string(),
            len: bytes.len(),
            width,
        });
    }
    let mut padded = bytes.to_vec();
    padded.resize(width, 0);
    Ok(padded)
}

/// Coerce textual arguments to the input types of `function`
pub fn coerce_args(function: &Function, raw: &[&str]) -> Result<Vec<DynSolValue>, CodecError> {
    if function.inputs.len() != raw.len() {
        return Err(CodecError::ArgumentCount {
            expected: function.inputs.len(),
            got: raw.len(),
        });
    }

    function
        .inputs
        .iter()
        .zip(raw)
        .enumerate()
        .map(|(index, (param, value))| {
            let ty = param.resolve().map_err(|err| CodecError::Coerce {
                index,
                value: value.to_string(),
                kind: param.ty.clone(),
                reason: err.to_string(),
            })?;
            coerce_arg(&ty, value).map_err(|reason| CodecError::Coerce {
                index,
                value: value.to_string(),
                kind: param.ty.clone(),
                reason,
            })
        })
        .collect()
}

/// Coerce a single textual argument.
///
/// `bytesN` accepts either exact-width hex or text that is NUL padded to N
/// bytes. `bytes` accepts hex or raw UTF-8 text. Everything else goes
/// through alloy's string coercion.
pub fn coerce_arg(ty: &DynSolType, raw: &str) -> Result<DynSolValue, String> {
    match ty {
        DynSolType::FixedBytes(size) => {
            if let Some(bytes) = exact_hex(raw, *size) {
                return Ok(DynSolValue::FixedBytes(B256::right_padding_from(&bytes), *size));
            }
            let padded = pad_identifier(raw, *size).map_err(|err| err.to_string())?;
            Ok(DynSolValue::FixedBytes(
                B256::right_padding_from(&padded),
                *size,
            ))
        }
        DynSolType::Bytes => match strip_hex_prefix(raw).and_then(|h| hex::decode(h).ok()) {
            Some(bytes) => Ok(DynSolValue::Bytes(bytes)),
            None => Ok(DynSolValue::Bytes(raw.as_bytes().to_vec())),
        },
        _ => ty.coerce_str(raw).map_err(|err| err.to_string()),
    }
}

fn strip_hex_prefix(raw: &str) -> Option<&str> {
    raw.strip_prefix("0x").or_else(|| raw.strip_prefix("0X"))
}

fn exact_hex(raw: &str, size: usize) -> Option<Vec<u8>> {
    let digits = strip_hex_prefix(raw)?;
    if digits.len() != size * 2 {
        return None;
    }
    hex::decode(digits).ok()
}

/// Text carried by a fixed-width identifier, trailing NULs removed
pub fn identifier_text(word: &B256, size: usize) -> Option<String> {
    let bytes = &word.as_slice()[..size.min(32)];
    let end = bytes.iter().rposition(|b| *b != 0).map_or(0, |pos| pos + 1);
    let text = std::str::from_utf8(&bytes[..end]).ok()?;
    if text.chars().any(|c| c.is_control()) {
        return None;
    }
    Some(text.to_string())
}

/// Plain text form of a returned value, as a caller would want to show or
/// compare it. Identifiers are returned without their padding.
pub fn value_text(value: &DynSolValue) -> String {
    match value {
        DynSolValue::String(s) => s.clone(),
        DynSolValue::FixedBytes(word, size) => identifier_text(word, *size)
            .unwrap_or_else(|| format!("0x{}", hex::encode(&word.as_slice()[..*size]))),
        DynSolValue::Bytes(bytes) => match std::str::from_utf8(bytes) {
            Ok(text) => text.to_string(),
            Err(_) => format!("0x{}", hex::encode(bytes)),
        },
        DynSolValue::Address(addr) => addr.to_checksum(None),
        DynSolValue::Bool(b) => b.to_string(),
        DynSolValue::Uint(u, _) => u.to_string(),
        DynSolValue::Int(i, _) => i.to_string(),
        other => format_value(other),
    }
}

/// Whether a method result counts as "nothing there": no values, an empty
/// string or byte string, an all-zero word, zero, or false.
pub fn is_falsy(values: &[DynSolValue]) -> bool {
    match values.first() {
        None => true,
        Some(value) => is_falsy_value(value),
    }
}

fn is_falsy_value(value: &DynSolValue) -> bool {
    match value {
        DynSolValue::String(s) => s.is_empty(),
        DynSolValue::Bytes(bytes) => bytes.is_empty(),
        DynSolValue::FixedBytes(word, _) => word.is_zero(),
        DynSolValue::Bool(b) => !b,
        DynSolValue::Uint(u, _) => u.is_zero(),
        DynSolValue::Int(i, _) => i.is_zero(),
        DynSolValue::Address(addr) => addr.is_zero(),
        DynSolValue::Array(items) | DynSolValue::FixedArray(items) => items.is_empty(),
        DynSolValue::Tuple(fields) => fields.is_empty(),
        DynSolValue::Function(_) => false,
    }
}

/// Format a DynSolValue for display
pub fn format_value(value: &DynSolValue) -> String {
    match value {
        DynSolValue::Bool(b) => b.to_string(),
        DynSolValue::Int(i, _) => i.to_string(),
        DynSolValue::Uint(u, _) => u.to_string(),
        DynSolValue::FixedBytes(word, size) => match identifier_text(word, *size) {
            Some(text) if !text.is_empty() => format!("\"{}\"", text),
            _ => format!("0x{}", hex::encode(&word.as_slice()[..(*size).min(32)])),
        },
        DynSolValue::Address(addr) => addr.to_checksum(None),
        DynSolValue::Function(func) => format!("0x{}", hex::encode(func.as_slice())),
        DynSolValue::Bytes(bytes) => match std::str::from_utf8(bytes) {
            Ok(text) if !text.is_empty() => format!("\"{}\"", text),
            _ => format!("0x{}", hex::encode(bytes)),
        },
        DynSolValue::String(s) => format!("\"{}\"", s),
        DynSolValue::Array(arr) | DynSolValue::FixedArray(arr) => {
            let items: Vec<String> = arr.iter().map(format_value).collect();
            format!("[{}]", items.join(", "))
        }
        DynSolValue::Tuple(fields) => {
            let items: Vec<String> = fields.iter().map(format_value).collect();
            format!("({})", items.join(", "))
        }
    }
}
