//! The `markdown` action: CommonMark to standalone HTML5 documents.

use pulldown_cmark::{Options, Parser, html};
use std::fs;

use crate::bundle::variables::VariableContext;
use crate::bundle::{MarkdownAction, PatternPair, fileset};
use crate::error::{BundleError, Result};

const PAGE_HEAD: &str = "<!DOCTYPE html>\n<html>\n<head>\n<meta charset=\"utf-8\">\n<style>\n\
    body { font-family: sans-serif; margin: 2em auto; max-width: 50em; }\n\
    code, pre { font-family: monospace; }\n\
    h1 code, h2 code, h3 code { font-size: inherit; }\n\
    table { border-collapse: collapse; }\n\
    td, th { border: 1px solid #999; padding: 0.3em 0.6em; }\n\
</style>\n</head>\n<body>\n";
const PAGE_FOOT: &str = "</body>\n</html>\n";

/// Convert markdown text into a full HTML page.
pub fn md_to_html(markdown: &str) -> String {
    let mut options = Options::empty();
    options.insert(Options::ENABLE_TABLES);
    options.insert(Options::ENABLE_STRIKETHROUGH);
    options.insert(Options::ENABLE_FOOTNOTES);

    let parser = Parser::new_ext(markdown, options);
    let mut body = String::new();
    html::push_html(&mut body, parser);

    let mut page = String::with_capacity(PAGE_HEAD.len() + body.len() + PAGE_FOOT.len());
    page.push_str(PAGE_HEAD);
    page.push_str(&body);
    page.push_str(PAGE_FOOT);
    page
}

pub fn run(action: &MarkdownAction, context: &VariableContext) -> Result<()> {
    let mut files = action.files.clone();
    if files.rename.is_none() {
        files.rename = Some(PatternPair {
            from: "(.*)\\.md".to_string(),
            to: "\\1.html".to_string(),
        });
    }

    for pair in fileset::resolve(&files, context, false)? {
        let output = pair.output.as_ref().ok_or_else(|| {
            BundleError::Configuration("markdown requires a target".to_string())
        })?;
        let markdown =
            fs::read_to_string(&pair.input).map_err(|e| BundleError::io(&pair.input, e))?;
        fs::write(output, md_to_html(&markdown)).map_err(|e| BundleError::io(output, e))?;
        tracing::debug!(
            input = %pair.input.display(),
            output = %output.display(),
            "converted markdown"
        );
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bundle::FileSetSpec;
    use indexmap::IndexMap;

    #[test]
    fn test_markdown_conversion_includes_tables() {
        let html = md_to_html("# Release\n\n| a | b |\n|---|---|\n| 1 | 2 |\n");
        assert!(html.contains("<h1>Release</h1>"));
        assert!(html.contains("<table>"));
        assert!(html.starts_with("<!DOCTYPE html>"));
    }

    #[test]
    fn test_default_rename_produces_html_files() {
        let tmp = tempfile::tempdir().unwrap();
        let src = tmp.path().join("docs");
        fs::create_dir(&src).unwrap();
        fs::write(src.join("index.md"), "# Hello\n").unwrap();
        let out = tmp.path().join("site");

        let action = MarkdownAction {
            files: FileSetSpec {
                source: src.display().to_string(),
                target: Some(out.display().to_string()),
                includes: Some(vec!["*.md".to_string()]),
                ..FileSetSpec::default()
            },
            message: None,
        };
        let context = VariableContext::resolve(&IndexMap::new(), &[]).unwrap();
        run(&action, &context).unwrap();

        let html = fs::read_to_string(out.join("index.html")).unwrap();
        assert!(html.contains("<h1>Hello</h1>"));
    }
}
