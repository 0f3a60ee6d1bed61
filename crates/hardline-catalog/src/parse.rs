use camino::Utf8Path;
use hardline_types::PolicyDefinition;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum DocumentFormat {
    Yaml,
    Json,
    Toml,
}

impl DocumentFormat {
    pub fn from_path(path: &Utf8Path) -> Option<DocumentFormat> {
        let ext = path.extension()?.to_ascii_lowercase();
        match ext.as_str() {
            "yaml" | "yml" => Some(DocumentFormat::Yaml),
            "json" => Some(DocumentFormat::Json),
            "toml" => Some(DocumentFormat::Toml),
            _ => None,
        }
    }
}

/// Parse one policy document. The error is a display string; the loader records it as a
/// validation issue rather than failing the load.
pub fn parse_policy_document(
    format: DocumentFormat,
    text: &str,
) -> Result<PolicyDefinition, String> {
    match format {
        DocumentFormat::Yaml => serde_yaml::from_str(text).map_err(|e| e.to_string()),
        DocumentFormat::Json => serde_json::from_str(text).map_err(|e| e.to_string()),
        DocumentFormat::Toml => toml::from_str(text).map_err(|e| e.to_string()),
    }
}
