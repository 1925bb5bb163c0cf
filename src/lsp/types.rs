//! Conversions between filesystem paths and LSP types.

use std::path::Path;

use lsp_types::Url;

use crate::error::LspError;

use super::LspResult;

/// Language id for OneScript scripts.
pub const ONESCRIPT_LANGUAGE_ID: &str = "os";

/// Language id for 1C:Enterprise modules.
pub const BSL_LANGUAGE_ID: &str = "bsl";

/// Converts a module path, relative to the current directory or absolute,
/// into a canonical `file://` URI.
///
/// ## Errors
/// [`LspError::DocumentNotFound`] if the file does not exist.
pub fn path_to_url(path: &Path) -> LspResult<Url> {
    let canonical = std::path::absolute(path)
        .and_then(|absolute| absolute.canonicalize())
        .map_err(|e| LspError::DocumentNotFound(format!("'{}': {e}", path.display())))?;

    Url::from_file_path(&canonical)
        .map_err(|()| LspError::DocumentNotFound(format!("invalid path: {}", canonical.display())))
}

/// Language id sent in `didOpen`: `os` for `.os` scripts, `bsl` otherwise.
pub fn language_id_for(path: &Path) -> &'static str {
    match path.extension().and_then(|ext| ext.to_str()) {
        Some(ext) if ext.eq_ignore_ascii_case("os") => ONESCRIPT_LANGUAGE_ID,
        _ => BSL_LANGUAGE_ID,
    }
}

/// Converts an LSP symbol kind to a human-readable string.
pub fn symbol_kind_to_string(kind: lsp_types::SymbolKind) -> &'static str {
    use lsp_types::SymbolKind;
    match kind {
        SymbolKind::FILE => "file",
        SymbolKind::MODULE => "module",
        SymbolKind::NAMESPACE => "namespace",
        SymbolKind::PACKAGE => "package",
        SymbolKind::CLASS => "class",
        SymbolKind::METHOD => "method",
        SymbolKind::PROPERTY => "property",
        SymbolKind::FIELD => "field",
        SymbolKind::CONSTRUCTOR => "constructor",
        SymbolKind::ENUM => "enum",
        SymbolKind::INTERFACE => "interface",
        SymbolKind::FUNCTION => "function",
        SymbolKind::VARIABLE => "variable",
        SymbolKind::CONSTANT => "constant",
        SymbolKind::STRING => "string",
        SymbolKind::NUMBER => "number",
        SymbolKind::BOOLEAN => "boolean",
        SymbolKind::ARRAY => "array",
        SymbolKind::OBJECT => "object",
        SymbolKind::KEY => "key",
        SymbolKind::NULL => "null",
        SymbolKind::ENUM_MEMBER => "enum_member",
        SymbolKind::STRUCT => "struct",
        SymbolKind::EVENT => "event",
        SymbolKind::OPERATOR => "operator",
        SymbolKind::TYPE_PARAMETER => "type_parameter",
        _ => "unknown",
    }
}
