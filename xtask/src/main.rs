//! Developer tasks (schema generation, fixture conformance, explain coverage).
//!
//! Keeping this separate avoids bloating the engine crates.

use anyhow::{Context, bail};
use schemars::schema_for;
use std::fs;
use std::path::{Path, PathBuf};

/// Project root (parent of the xtask directory).
fn project_root() -> anyhow::Result<PathBuf> {
    let manifest_dir = match std::env::var("CARGO_MANIFEST_DIR") {
        Ok(dir) => PathBuf::from(dir),
        Err(_) => std::env::current_dir().context("determine current directory")?,
    };

    if manifest_dir.ends_with("xtask") {
        manifest_dir
            .parent()
            .map(Path::to_path_buf)
            .context("xtask has no parent directory")
    } else {
        Ok(manifest_dir)
    }
}

fn schemas_dir() -> anyhow::Result<PathBuf> {
    Ok(project_root()?.join("schemas"))
}

fn policy_fixtures_dir() -> anyhow::Result<PathBuf> {
    Ok(project_root()?.join("tests").join("fixtures").join("policies"))
}

/// Generated schema and the file it lands in.
struct SchemaTarget {
    filename: &'static str,
    generate: fn() -> schemars::Schema,
}

fn schema_targets() -> Vec<SchemaTarget> {
    vec![
        SchemaTarget {
            filename: "hardline.policy.v1.json",
            generate: || schema_for!(hardline_types::PolicyDefinition),
        },
        SchemaTarget {
            filename: "hardline.config.v1.json",
            generate: || schema_for!(hardline_settings::HardlineConfigV1),
        },
        SchemaTarget {
            filename: "hardline.apply-response.v1.json",
            generate: || schema_for!(hardline_types::ApplyResponse),
        },
        SchemaTarget {
            filename: "hardline.revert-response.v1.json",
            generate: || schema_for!(hardline_types::RevertResponse),
        },
        SchemaTarget {
            filename: "hardline.audit-response.v1.json",
            generate: || schema_for!(hardline_types::AuditResponse),
        },
        SchemaTarget {
            filename: "hardline.drift-response.v1.json",
            generate: || schema_for!(hardline_types::DriftResponse),
        },
        SchemaTarget {
            filename: "hardline.state-response.v1.json",
            generate: || schema_for!(hardline_types::StateResponse),
        },
    ]
}

/// Pretty-printed JSON with a trailing newline.
fn serialize_schema(schema: &schemars::Schema) -> anyhow::Result<String> {
    let mut json = serde_json::to_string_pretty(schema).context("serialize schema")?;
    json.push('\n');
    Ok(json)
}

fn emit_schemas() -> anyhow::Result<()> {
    let dir = schemas_dir()?;
    fs::create_dir_all(&dir).context("create schemas directory")?;

    for target in schema_targets() {
        let json = serialize_schema(&(target.generate)())?;
        let path = dir.join(target.filename);
        fs::write(&path, &json).with_context(|| format!("write schema {}", path.display()))?;
        println!("Wrote {}", path.display());
    }

    println!("\nSchemas emitted successfully.");
    Ok(())
}

/// Check that schemas/ matches what would be generated.
fn validate_schemas() -> anyhow::Result<()> {
    let dir = schemas_dir()?;
    let mut missing = Vec::new();
    let mut mismatched = Vec::new();

    for target in schema_targets() {
        let path = dir.join(target.filename);
        if !path.exists() {
            missing.push(target.filename);
            continue;
        }
        let expected = serialize_schema(&(target.generate)())?;
        let actual =
            fs::read_to_string(&path).with_context(|| format!("read {}", path.display()))?;
        if expected != actual {
            mismatched.push(target.filename);
        }
    }

    if missing.is_empty() && mismatched.is_empty() {
        println!("All schemas are up to date.");
        return Ok(());
    }
    for name in &missing {
        eprintln!("  - missing: {name}");
    }
    for name in &mismatched {
        eprintln!("  - out of date: {name}");
    }
    eprintln!("\nRun `cargo xtask emit-schemas` to regenerate.");
    bail!("schema validation failed")
}

fn print_help() {
    eprintln!("xtask commands:");
    eprintln!("  help              Show this message");
    eprintln!("  emit-schemas      Generate JSON schemas from Rust types to schemas/");
    eprintln!("  validate-schemas  Check if schemas/ matches generated output (for CI)");
    eprintln!("  print-schema-ids  Print known schema IDs");
    eprintln!("  conform           Validate tests/fixtures/policies against the policy schema");
    eprintln!("  explain-coverage  Validate all codes have explanations");
}

/// Parse a policy document into JSON, whatever its on-disk format.
fn document_as_json(path: &Path) -> anyhow::Result<Option<serde_json::Value>> {
    let Some(ext) = path.extension().and_then(|e| e.to_str()) else {
        return Ok(None);
    };
    let text = fs::read_to_string(path).with_context(|| format!("read {}", path.display()))?;
    let value = match ext.to_ascii_lowercase().as_str() {
        "json" => serde_json::from_str(&text).context("parse JSON")?,
        "yaml" | "yml" => serde_yaml::from_str(&text).context("parse YAML")?,
        "toml" => {
            let table: toml::Table = toml::from_str(&text).context("parse TOML")?;
            serde_json::to_value(table).context("convert TOML")?
        }
        _ => return Ok(None),
    };
    Ok(Some(value))
}

/// Validate every policy fixture against the generated policy schema, then check that the
/// typed model accepts it too.
fn conform() -> anyhow::Result<()> {
    let schema = serde_json::to_value(schema_for!(hardline_types::PolicyDefinition))
        .context("serialize policy schema")?;
    let validator = jsonschema::validator_for(&schema)
        .map_err(|e| anyhow::anyhow!("compile policy schema: {e}"))?;
    println!("✓ policy schema compiles");

    let root = policy_fixtures_dir()?;
    if !root.exists() {
        bail!("policy fixtures not found at {}", root.display());
    }

    let mut count = 0;
    let mut errors = Vec::new();
    for entry in walkdir::WalkDir::new(&root).sort_by_file_name() {
        let entry = entry.context("walk policy fixtures")?;
        if !entry.file_type().is_file() {
            continue;
        }
        let path = entry.path();
        let rel = path
            .strip_prefix(&root)
            .unwrap_or(path)
            .to_string_lossy()
            .replace('\\', "/");

        let value = match document_as_json(path) {
            Ok(Some(value)) => value,
            Ok(None) => continue,
            Err(e) => {
                errors.push(format!("{rel}: {e:#}"));
                continue;
            }
        };

        for err in validator.iter_errors(&value) {
            errors.push(format!("{rel}: schema validation: {err}"));
        }
        if let Err(e) = serde_json::from_value::<hardline_types::PolicyDefinition>(value) {
            errors.push(format!("{rel}: model rejects document: {e}"));
        }

        count += 1;
        println!("  ✓ {rel}");
    }

    if count == 0 {
        bail!("no policy documents found in {}", root.display());
    }
    if !errors.is_empty() {
        eprintln!("\nConformance errors:");
        for err in &errors {
            eprintln!("  - {err}");
        }
        bail!("conformance failed with {} errors", errors.len());
    }

    println!("\n✓ All {count} policy fixtures conform.");
    Ok(())
}

fn explain_coverage() -> anyhow::Result<()> {
    let codes = hardline_types::explain::all_codes();
    let mut errors = Vec::new();

    for code in codes {
        match hardline_types::lookup_explanation(code) {
            Some(exp) => {
                for (field, text) in [
                    ("title", exp.title),
                    ("description", exp.description),
                    ("remediation", exp.remediation),
                ] {
                    if text.is_empty() {
                        errors.push(format!("code '{code}' has empty {field}"));
                    }
                }
            }
            None => errors.push(format!("code '{code}' has no explanation")),
        }
    }

    if errors.is_empty() {
        println!("✓ {} codes have explanations", codes.len());
        return Ok(());
    }
    for error in &errors {
        eprintln!("  - {error}");
    }
    bail!("explain coverage failed with {} errors", errors.len())
}

fn main() -> anyhow::Result<()> {
    let args: Vec<String> = std::env::args().collect();
    let cmd = args.get(1).map(String::as_str).unwrap_or("help");

    match cmd {
        "help" | "--help" | "-h" => {
            print_help();
            Ok(())
        }
        "emit-schemas" => emit_schemas(),
        "validate-schemas" => validate_schemas(),
        "conform" => conform(),
        "explain-coverage" => explain_coverage(),
        "print-schema-ids" => {
            for target in schema_targets() {
                println!("{}", target.filename.trim_end_matches(".json"));
            }
            Ok(())
        }
        other => bail!("unknown xtask command: {other}\n\nRun `cargo xtask help` for usage."),
    }
    .context("xtask failed")
}
