//! Command-line surface and bundle file loading.

use anyhow::{Context, Result};
use clap::Parser;
use std::fs;
use std::path::{Path, PathBuf};

use crate::bundle::BundleSpec;

#[derive(Parser, Debug, Clone)]
#[command(name = "ontobundle", about = "Ontology release bundler", version)]
pub struct CliArgs {
    /// Path to the bundle definition (YAML or JSON)
    #[arg(value_name = "BUNDLE")]
    pub bundle: PathBuf,

    /// Override a bundle variable (repeatable)
    #[arg(
        short = 'v',
        long = "variable",
        value_names = ["NAME", "VALUE"],
        num_args = 2,
        action = clap::ArgAction::Append
    )]
    pub variables: Vec<String>,

    /// Emit verbose debug output
    #[arg(long, env = "ONTOBUNDLE_DEBUG")]
    pub debug: bool,
}

impl CliArgs {
    /// The `-v NAME VALUE` pairs in declaration order.
    pub fn variable_overrides(&self) -> Vec<(String, String)> {
        self.variables
            .chunks_exact(2)
            .map(|pair| (pair[0].clone(), pair[1].clone()))
            .collect()
    }
}

/// Load and deserialize a bundle definition.
///
/// `.yaml`/`.yml` parse as YAML; anything else is treated as JSON. Schema
/// problems surface here, before any action runs.
pub fn load_bundle_file(path: &Path) -> Result<BundleSpec> {
    anyhow::ensure!(path.exists(), "bundle file {:?} does not exist", path);
    let contents = fs::read_to_string(path)
        .with_context(|| format!("failed to read bundle file {:?}", path))?;
    let ext = path
        .extension()
        .and_then(|os| os.to_str())
        .unwrap_or("")
        .to_ascii_lowercase();

    let parsed = match ext.as_str() {
        "yaml" | "yml" => serde_yaml::from_str(&contents)
            .with_context(|| format!("failed to parse YAML bundle {:?}", path))?,
        _ => serde_json::from_str(&contents)
            .with_context(|| format!("failed to parse JSON bundle {:?}", path))?,
    };
    Ok(parsed)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_variable_overrides_pairing() {
        let args = CliArgs {
            bundle: PathBuf::from("bundle.yaml"),
            variables: vec![
                "output".to_string(),
                "dist".to_string(),
                "version".to_string(),
                "1.2.3".to_string(),
            ],
            debug: false,
        };
        assert_eq!(
            args.variable_overrides(),
            vec![
                ("output".to_string(), "dist".to_string()),
                ("version".to_string(), "1.2.3".to_string()),
            ]
        );
    }

    #[test]
    fn test_load_yaml_bundle() {
        let tmp = tempfile::tempdir().unwrap();
        let path = tmp.path().join("bundle.yaml");
        fs::write(
            &path,
            "bundle: demo\nvariables:\n  out: dist\nactions:\n  - action: mkdir\n    directory: '{out}'\n",
        )
        .unwrap();
        let spec = load_bundle_file(&path).unwrap();
        assert_eq!(spec.bundle, "demo");
        assert_eq!(spec.actions.len(), 1);
    }

    #[test]
    fn test_load_json_bundle() {
        let tmp = tempfile::tempdir().unwrap();
        let path = tmp.path().join("bundle.json");
        fs::write(
            &path,
            r#"{"bundle": "demo", "actions": [{"action": "mkdir", "directory": "out"}]}"#,
        )
        .unwrap();
        let spec = load_bundle_file(&path).unwrap();
        assert_eq!(spec.bundle, "demo");
    }

    #[test]
    fn test_schema_violation_is_reported_at_load() {
        let tmp = tempfile::tempdir().unwrap();
        let path = tmp.path().join("bundle.yaml");
        fs::write(&path, "bundle: demo\nactions:\n  - action: explode\n").unwrap();
        assert!(load_bundle_file(&path).is_err());
    }
}
