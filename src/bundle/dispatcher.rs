//! The action dispatcher: one loop, strict declaration order.
//!
//! Each action resolves its own file set and dispatches to the matching
//! component; the `match` is exhaustive over the closed action set. The
//! first error of any kind halts the loop — a failing `verify` verdict is
//! the expected, modeled way to stop, everything else is a defect in the
//! bundle or its inputs.

use std::fs;
use std::path::Path;

use super::fileset::{self, Replacement};
use super::variables::VariableContext;
use super::{ActionSpec, BundleSpec, CopyAction, MkdirAction, MoveAction};
use crate::error::{BundleError, Result};
use crate::{graph, query, render, verify};

/// Execute a bundle specification with CLI variable overrides.
pub fn run(spec: &BundleSpec, overrides: &[(String, String)]) -> Result<()> {
    spec.validate()?;
    let context = VariableContext::resolve(&spec.variables, overrides)?;

    tracing::info!(
        bundle = %spec.bundle,
        actions = spec.actions.len(),
        "starting bundle"
    );
    for (index, action) in spec.actions.iter().enumerate() {
        if let Some(message) = action.message() {
            tracing::info!("{}", context.resolve_str(message)?);
        }
        tracing::debug!(step = index + 1, kind = action.kind(), "dispatching action");

        match action {
            ActionSpec::Mkdir(a) => run_mkdir(a, &context)?,
            ActionSpec::Copy(a) => run_copy(a, &context)?,
            ActionSpec::Move(a) => run_move(a, &context)?,
            ActionSpec::Transform(a) => super::transform::run(a, &spec.tools, &context)?,
            ActionSpec::DefinedBy(a) => graph::defined_by::run(a, &context)?,
            ActionSpec::Export(a) => graph::export::run(a, &context)?,
            ActionSpec::Sparql(a) => query::sparql_action::run(a, &context)?,
            ActionSpec::Verify(a) => verify::run(a, &context)?,
            ActionSpec::Markdown(a) => render::markdown::run(a, &context)?,
            ActionSpec::Graph(a) => render::graphic::run(a, &context)?,
        }
    }
    tracing::info!(bundle = %spec.bundle, "bundle complete");
    Ok(())
}

fn run_mkdir(action: &MkdirAction, context: &VariableContext) -> Result<()> {
    let directory = context.resolve_str(&action.directory)?;
    fs::create_dir_all(&directory).map_err(|e| BundleError::io(&directory, e))?;
    Ok(())
}

fn run_copy(action: &CopyAction, context: &VariableContext) -> Result<()> {
    for pair in fileset::resolve(&action.files, context, false)? {
        let output = pair.output.as_ref().ok_or_else(|| {
            BundleError::Configuration("copy requires a target".to_string())
        })?;
        if pair.input.is_file() {
            fs::copy(&pair.input, output).map_err(|e| BundleError::io(output, e))?;
            if let Some(replace) = &action.files.replace {
                Replacement::compile(replace, context)?.apply_to_file(output)?;
            }
        } else if pair.input.is_dir() {
            copy_tree(&pair.input, output)?;
        } else {
            tracing::warn!(input = %pair.input.display(), "copy source missing, skipping");
        }
    }
    Ok(())
}

fn run_move(action: &MoveAction, context: &VariableContext) -> Result<()> {
    for pair in fileset::resolve(&action.files, context, false)? {
        let output = pair.output.as_ref().ok_or_else(|| {
            BundleError::Configuration("move requires a target".to_string())
        })?;
        if pair.input.is_file() {
            move_file(&pair.input, output)?;
            if let Some(replace) = &action.files.replace {
                Replacement::compile(replace, context)?.apply_to_file(output)?;
            }
        } else if pair.input.is_dir() {
            fs::rename(&pair.input, output).map_err(|e| BundleError::io(output, e))?;
        } else {
            tracing::warn!(input = %pair.input.display(), "move source missing, skipping");
        }
    }
    Ok(())
}

fn move_file(input: &Path, output: &Path) -> Result<()> {
    // rename does not cross filesystems; fall back to copy + delete.
    if fs::rename(input, output).is_err() {
        fs::copy(input, output).map_err(|e| BundleError::io(output, e))?;
        fs::remove_file(input).map_err(|e| BundleError::io(input, e))?;
    }
    Ok(())
}

fn copy_tree(input: &Path, output: &Path) -> Result<()> {
    fs::create_dir_all(output).map_err(|e| BundleError::io(output, e))?;
    for entry in fs::read_dir(input).map_err(|e| BundleError::io(input, e))? {
        let entry = entry.map_err(|e| BundleError::io(input, e))?;
        let destination = output.join(entry.file_name());
        let path = entry.path();
        if path.is_dir() {
            copy_tree(&path, &destination)?;
        } else {
            fs::copy(&path, &destination).map_err(|e| BundleError::io(&destination, e))?;
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    fn run_yaml(yaml: &str) -> Result<()> {
        let spec: BundleSpec = serde_yaml::from_str(yaml).expect("bundle parses");
        run(&spec, &[])
    }

    #[test]
    fn test_mkdir_copy_pipeline() {
        let tmp = tempfile::tempdir().unwrap();
        let src = tmp.path().join("src");
        fs::create_dir(&src).unwrap();
        fs::write(src.join("gist.ttl"), "<urn:a> <urn:b> \"X.x.x\" .").unwrap();

        let yaml = format!(
            r#"
bundle: release
variables:
  src: {src}
  out: {out}
  version: 9.9.9
actions:
  - action: mkdir
    directory: "{{out}}"
    message: "preparing {{out}}"
  - action: copy
    source: "{{src}}"
    target: "{{out}}"
    includes: ["*.ttl"]
    replace:
      from: "X\\.x\\.x"
      to: "{{version}}"
"#,
            src = src.display(),
            out = tmp.path().join("out").display()
        );
        run_yaml(&yaml).unwrap();
        let copied = fs::read_to_string(tmp.path().join("out/gist.ttl")).unwrap();
        assert!(copied.contains("9.9.9"));
    }

    #[test]
    fn test_move_action() {
        let tmp = tempfile::tempdir().unwrap();
        let input = tmp.path().join("a.txt");
        fs::write(&input, "content").unwrap();
        let output = tmp.path().join("b.txt");

        let yaml = format!(
            "bundle: test\nactions:\n  - action: move\n    source: {}\n    target: {}\n",
            input.display(),
            output.display()
        );
        run_yaml(&yaml).unwrap();
        assert!(!input.exists());
        assert_eq!(fs::read_to_string(&output).unwrap(), "content");
    }

    #[test]
    fn test_validation_failure_stops_following_actions() {
        let tmp = tempfile::tempdir().unwrap();
        fs::write(
            tmp.path().join("data.ttl"),
            "<urn:a> <urn:b> <urn:c> .",
        )
        .unwrap();
        let marker = tmp.path().join("after-verify");

        let yaml = format!(
            r#"
bundle: test
actions:
  - action: verify
    type: select
    source: {dir}
    includes: ["*.ttl"]
    query: "SELECT ?s WHERE {{{{ ?s ?p ?o }}}}"
  - action: mkdir
    directory: {marker}
"#,
            dir = tmp.path().display(),
            marker = marker.display()
        );
        let err = run_yaml(&yaml).expect_err("verification must fail");
        assert!(err.is_validation_failure());
        assert!(!marker.exists(), "actions after a failed verify must not run");
    }

    #[test]
    fn test_unresolved_variable_is_template_error() {
        let err = run_yaml(
            "bundle: test\nactions:\n  - action: mkdir\n    directory: '{missing}'\n",
        )
        .expect_err("must fail");
        assert!(matches!(err, BundleError::Template(_)));
    }
}
