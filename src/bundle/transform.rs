//! The `transform` action: apply a named tool to each file of a set.
//!
//! Process and shell tools run as external commands with
//! `{inputFile}`/`{outputFile}` available in their argument templates;
//! SPARQL tools apply an UPDATE to each input graph and re-serialize it.
//! Tool invocation mechanics stay behind this module.

use indexmap::IndexMap;
use std::path::Path;
use std::process::Command;

use super::fileset::{self, FilePair, Replacement};
use super::variables::VariableContext;
use super::{ToolSpec, TransformAction};
use crate::error::{BundleError, Result};
use crate::graph::{GraphModel, OutputFormat, guess_format, output_format_for};
use crate::query::{NamedQuery, QueryForm, detect_form};

pub fn run(action: &TransformAction, tools: &[ToolSpec], context: &VariableContext) -> Result<()> {
    let tool = tools
        .iter()
        .find(|tool| tool.name() == action.tool)
        .ok_or_else(|| {
            BundleError::Configuration(format!("unknown tool reference '{}'", action.tool))
        })?;

    match tool {
        ToolSpec::Process {
            command, arguments, ..
        } => {
            let mut argv = vec![command.clone()];
            argv.extend(arguments.iter().cloned());
            run_command_tool(&argv, action, context)
        }
        ToolSpec::Shell { arguments, .. } => run_command_tool(arguments, action, context),
        ToolSpec::Sparql { query, .. } => run_sparql_tool(query, action, context),
    }
}

fn invocation_vars(pair: &FilePair) -> IndexMap<String, String> {
    let mut vars = IndexMap::new();
    vars.insert(
        "inputFile".to_string(),
        pair.input.display().to_string(),
    );
    if let Some(output) = &pair.output {
        vars.insert("outputFile".to_string(), output.display().to_string());
    }
    vars
}

fn run_command_tool(
    argv_templates: &[String],
    action: &TransformAction,
    context: &VariableContext,
) -> Result<()> {
    if argv_templates.is_empty() {
        return Err(BundleError::Configuration(format!(
            "tool '{}' has no command to run",
            action.tool
        )));
    }

    for pair in fileset::resolve(&action.files, context, false)? {
        let extra = invocation_vars(&pair);
        let argv: Vec<String> = argv_templates
            .iter()
            .map(|template| context.resolve_with(template, &extra))
            .collect::<std::result::Result<_, _>>()?;

        tracing::debug!(command = ?argv, "running external tool");
        let output = Command::new(&argv[0])
            .args(&argv[1..])
            .output()
            .map_err(|e| BundleError::io(&argv[0], e))?;
        if !output.stdout.is_empty() {
            tracing::debug!(tool = %action.tool, "stdout: {}", String::from_utf8_lossy(&output.stdout));
        }
        if !output.stderr.is_empty() {
            tracing::debug!(tool = %action.tool, "stderr: {}", String::from_utf8_lossy(&output.stderr));
        }
        if !output.status.success() {
            return Err(BundleError::Configuration(format!(
                "tool '{}' exited with {}: {}",
                action.tool,
                output.status,
                String::from_utf8_lossy(&output.stderr).trim()
            )));
        }

        apply_replace(action, context, &extra, &pair)?;
    }
    Ok(())
}

fn run_sparql_tool(
    query_reference: &str,
    action: &TransformAction,
    context: &VariableContext,
) -> Result<()> {
    let resolved = context.resolve_str(query_reference)?;
    let (label, text) = if Path::new(&resolved).is_file() {
        let text = std::fs::read_to_string(&resolved)
            .map_err(|e| BundleError::io(&resolved, e))?;
        (resolved.clone(), text)
    } else {
        ("inline".to_string(), resolved)
    };
    let query = NamedQuery { label, text };
    if detect_form(&query.label, &query.text)? != QueryForm::Update {
        return Err(BundleError::Configuration(format!(
            "tool '{}' must carry a SPARQL UPDATE",
            action.tool
        )));
    }

    let format_name = action
        .format
        .as_ref()
        .map(|format| context.resolve_str(format))
        .transpose()?;

    for pair in fileset::resolve(&action.files, context, false)? {
        let output = pair.output.as_ref().ok_or_else(|| {
            BundleError::Configuration("transform requires a target".to_string())
        })?;
        let mut model = GraphModel::new()?;
        model.load_file(&pair.input)?;
        model
            .update(&query.text)
            .map_err(|e| BundleError::query(&query.label, "local graph", e))?;

        let format = match &format_name {
            Some(name) => OutputFormat::from_option(Some(name.as_str()))?,
            None => guess_format(&pair.input)
                .map(output_format_for)
                .unwrap_or(OutputFormat::Turtle),
        };
        model.write_file(output, format, false)?;

        let extra = invocation_vars(&pair);
        apply_replace(action, context, &extra, &pair)?;
    }
    Ok(())
}

fn apply_replace(
    action: &TransformAction,
    context: &VariableContext,
    extra: &IndexMap<String, String>,
    pair: &FilePair,
) -> Result<()> {
    if let (Some(replace), Some(output)) = (&action.files.replace, &pair.output) {
        Replacement::compile_with(replace, context, extra)?.apply_to_file(output)?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bundle::FileSetSpec;
    use std::fs;

    fn context() -> VariableContext {
        VariableContext::resolve(&IndexMap::new(), &[]).unwrap()
    }

    fn transform_action(source: &Path, target: &Path, tool: &str) -> TransformAction {
        TransformAction {
            tool: tool.to_string(),
            files: FileSetSpec {
                source: source.display().to_string(),
                target: Some(target.display().to_string()),
                ..FileSetSpec::default()
            },
            format: None,
            message: None,
        }
    }

    #[test]
    fn test_unknown_tool_is_configuration_error() {
        let tmp = tempfile::tempdir().unwrap();
        let action = transform_action(&tmp.path().join("a"), &tmp.path().join("b"), "missing");
        let err = run(&action, &[], &context()).expect_err("must fail");
        assert!(matches!(err, BundleError::Configuration(_)));
    }

    #[test]
    fn test_sparql_tool_rewrites_graph() {
        let tmp = tempfile::tempdir().unwrap();
        let input = tmp.path().join("in.ttl");
        fs::write(
            &input,
            r#"@prefix rdfs: <http://www.w3.org/2000/01/rdf-schema#> .
               <http://example.com/a> rdfs:label "draft" ."#,
        )
        .unwrap();
        let output = tmp.path().join("out.ttl");

        let tools = [ToolSpec::Sparql {
            name: "strip-labels".to_string(),
            query: "PREFIX rdfs: <http://www.w3.org/2000/01/rdf-schema#> \
                    DELETE {{ ?s rdfs:label ?l }} WHERE {{ ?s rdfs:label ?l }}"
                .to_string(),
        }];
        let action = transform_action(&input, &output, "strip-labels");
        run(&action, &tools, &context()).unwrap();

        let text = fs::read_to_string(&output).unwrap();
        assert!(!text.contains("draft"));
    }

    #[test]
    fn test_sparql_tool_rejects_select() {
        let tmp = tempfile::tempdir().unwrap();
        let input = tmp.path().join("in.ttl");
        fs::write(&input, "<urn:a> <urn:b> <urn:c> .").unwrap();

        let tools = [ToolSpec::Sparql {
            name: "bad".to_string(),
            query: "SELECT ?s WHERE {{ ?s ?p ?o }}".to_string(),
        }];
        let action = transform_action(&input, &tmp.path().join("out.ttl"), "bad");
        assert!(matches!(
            run(&action, &tools, &context()),
            Err(BundleError::Configuration(_))
        ));
    }

    #[test]
    fn test_shell_tool_receives_file_variables() {
        let tmp = tempfile::tempdir().unwrap();
        let input = tmp.path().join("in.txt");
        fs::write(&input, "payload").unwrap();
        let output = tmp.path().join("out.txt");

        let tools = [ToolSpec::Shell {
            name: "copier".to_string(),
            arguments: vec![
                "cp".to_string(),
                "{inputFile}".to_string(),
                "{outputFile}".to_string(),
            ],
        }];
        let action = transform_action(&input, &output, "copier");
        run(&action, &tools, &context()).unwrap();
        assert_eq!(fs::read_to_string(&output).unwrap(), "payload");
    }
}
