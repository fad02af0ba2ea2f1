use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use serde::Deserialize;

use interpreter::GenerateOptions;
use pdstemplate::Template;

use crate::variables;

const FIXTURE_SUFFIX: &str = ".test.tmpl";

#[derive(Debug, Deserialize)]
pub struct TestConfig {
    /// Human-readable test description.
    #[serde(default)]
    pub description: Option<String>,

    /// Template name; a `.xml` suffix turns markup escaping on.
    #[serde(default = "default_name")]
    pub name: String,

    /// Variables passed to the template.
    #[serde(default)]
    pub variables: toml::Table,

    /// Expected generated text, compared exactly.
    #[serde(default)]
    pub expect_output: Option<String>,

    /// Expected evaluation failure; its Display string must contain this substring.
    /// Only reachable with `raise = true`.
    #[serde(default)]
    pub expect_error: Option<String>,

    /// Expected structural error; its Display string must contain this substring.
    #[serde(default)]
    pub expect_template_error: Option<String>,

    /// Expected number of error markers written into the output.
    #[serde(default)]
    pub expect_error_count: Option<usize>,

    /// Stop at the first failing expression.
    #[serde(default)]
    pub raise: bool,
}

fn default_name() -> String {
    "test.tmpl".to_string()
}

/// Parse a `.test.tmpl` file into its TOML config and template source.
fn parse_test_file(content: &str) -> Result<(TestConfig, &str), String> {
    let content = content.trim_start_matches('\u{feff}');

    if !content.starts_with("---") {
        return Err("missing opening --- frontmatter delimiter".into());
    }

    let after_open = &content[3..];
    let after_open = after_open
        .strip_prefix('\n')
        .or_else(|| after_open.strip_prefix("\r\n"))
        .unwrap_or(after_open);

    // An empty frontmatter closes on the very next line.
    let (toml_str, rest) = match after_open.strip_prefix("---") {
        Some(rest) => ("", rest),
        None => {
            let close_pos = after_open
                .find("\n---")
                .ok_or("missing closing --- frontmatter delimiter")?;
            (
                after_open[..close_pos].trim_end_matches('\r'),
                &after_open[close_pos + 4..],
            )
        }
    };
    let source = rest
        .strip_prefix("\r\n")
        .or_else(|| rest.strip_prefix('\n'))
        .unwrap_or(rest);

    let config: TestConfig =
        toml::from_str(toml_str).map_err(|e| format!("TOML parse error: {}", e))?;

    Ok((config, source))
}

pub enum TestOutcome {
    Pass,
    Fail(String),
}

pub struct TestResult {
    pub path: PathBuf,
    pub description: Option<String>,
    pub outcome: TestOutcome,
}

impl TestResult {
    fn label(&self) -> &str {
        self.description.as_deref().unwrap_or_else(|| {
            self.path
                .file_name()
                .and_then(|s| s.to_str())
                .and_then(|s| s.strip_suffix(FIXTURE_SUFFIX))
                .unwrap_or("?")
        })
    }
}

fn run_single_test(path: &Path) -> TestResult {
    let content = match std::fs::read_to_string(path) {
        Ok(c) => c,
        Err(e) => {
            return TestResult {
                path: path.to_path_buf(),
                description: None,
                outcome: TestOutcome::Fail(format!("cannot read file: {}", e)),
            };
        }
    };

    let (config, source) = match parse_test_file(&content) {
        Ok(pair) => pair,
        Err(e) => {
            return TestResult {
                path: path.to_path_buf(),
                description: None,
                outcome: TestOutcome::Fail(format!("frontmatter error: {}", e)),
            };
        }
    };

    let outcome = match check(&config, source) {
        None => TestOutcome::Pass,
        Some(reason) => TestOutcome::Fail(reason),
    };
    TestResult {
        path: path.to_path_buf(),
        description: config.description,
        outcome,
    }
}

/// Compile and generate `source` as `config` describes. Returns `Some(reason)` on mismatch.
fn check(config: &TestConfig, source: &str) -> Option<String> {
    let compiled = Template::compile(config.name.clone(), source);

    let template = match (&config.expect_template_error, compiled) {
        (Some(expected), Err(err)) => {
            let err_str = err.to_string();
            return (!err_str.contains(expected.as_str())).then(|| {
                format!("expected template error containing \"{}\", got: {}", expected, err_str)
            });
        }
        (Some(expected), Ok(_)) => {
            return Some(format!(
                "expected template error containing \"{}\", but compilation succeeded",
                expected
            ));
        }
        (None, Err(err)) => return Some(format!("unexpected template error: {}", err)),
        (None, Ok(template)) => template,
    };

    let variables = match variables::scope_from_table(&config.variables) {
        Ok(v) => v,
        Err(e) => return Some(format!("variables: {}", e)),
    };
    let options = GenerateOptions {
        fail_fast: config.raise,
        ..GenerateOptions::default()
    };

    let generated = match (&config.expect_error, interpreter::generate(&template, variables, &options)) {
        (Some(expected), Err(failure)) => {
            let err_str = failure.to_string();
            return (!err_str.contains(expected.as_str())).then(|| {
                format!("expected error containing \"{}\", got: {}", expected, err_str)
            });
        }
        (Some(expected), Ok(_)) => {
            return Some(format!(
                "expected error containing \"{}\", but generation succeeded",
                expected
            ));
        }
        (None, Err(failure)) => return Some(format!("unexpected runtime error: {}", failure)),
        (None, Ok(generated)) => generated,
    };

    if let Some(expected) = &config.expect_output {
        if generated.content != *expected {
            return Some(format!(
                "output mismatch\n  expected: {:?}\n  actual:   {:?}",
                expected, generated.content
            ));
        }
    }

    if let Some(expected) = config.expect_error_count {
        if generated.error_count != expected {
            return Some(format!(
                "expected {} error marker(s), got {}\n  output: {:?}",
                expected, generated.error_count, generated.content
            ));
        }
    }

    None
}

/// Discover fixture files grouped by category (subfolder relative to root).
/// Files directly in `root` get category "" (uncategorized).
fn discover_categorized(root: &Path) -> BTreeMap<String, Vec<PathBuf>> {
    let mut categories: BTreeMap<String, Vec<PathBuf>> = BTreeMap::new();
    collect_tests(root, root, &mut categories);
    for files in categories.values_mut() {
        files.sort();
    }
    categories
}

fn collect_tests(dir: &Path, root: &Path, out: &mut BTreeMap<String, Vec<PathBuf>>) {
    let Ok(entries) = std::fs::read_dir(dir) else {
        return;
    };
    for entry in entries.flatten() {
        let path = entry.path();
        if path.is_dir() {
            collect_tests(&path, root, out);
        } else if path
            .file_name()
            .and_then(|n| n.to_str())
            .is_some_and(|name| name.ends_with(FIXTURE_SUFFIX))
        {
            let category = path
                .parent()
                .and_then(|p| p.strip_prefix(root).ok())
                .map(|p| p.to_string_lossy().replace('\\', "/"))
                .unwrap_or_default();
            out.entry(category).or_default().push(path);
        }
    }
}

/// List available categories for the given test path.
pub fn list_categories(path: &Path) {
    if path.is_file() {
        eprintln!("(single file, no categories)");
        return;
    }

    let categories = discover_categorized(path);
    if categories.is_empty() {
        eprintln!("no {} files found in {}", FIXTURE_SUFFIX, path.display());
        return;
    }

    eprintln!("available categories:");
    for (cat, files) in &categories {
        let label = if cat.is_empty() { "(root)" } else { cat.as_str() };
        eprintln!("  {} ({} tests)", label, files.len());
    }
}

fn paint(text: &str, code: &str, no_color: bool) -> String {
    if no_color {
        text.to_string()
    } else {
        format!("\x1b[{}m{}\x1b[0m", code, text)
    }
}

/// Select the categories to run; an empty request selects all of them.
fn select<'a>(
    all: &'a BTreeMap<String, Vec<PathBuf>>,
    requested: &[String],
) -> BTreeMap<&'a str, &'a Vec<PathBuf>> {
    if requested.is_empty() {
        return all.iter().map(|(k, v)| (k.as_str(), v)).collect();
    }

    let mut filtered = BTreeMap::new();
    for request in requested {
        let req = request.trim_matches('/');
        let prefix = format!("{}/", req);
        let before = filtered.len();
        for (cat, files) in all {
            if cat == req || cat.starts_with(&prefix) {
                filtered.insert(cat.as_str(), files);
            }
        }
        if filtered.len() == before {
            eprintln!(
                "warning: category '{}' not found (available: {})",
                req,
                all.keys()
                    .map(|k| if k.is_empty() { "(root)" } else { k.as_str() })
                    .collect::<Vec<_>>()
                    .join(", ")
            );
        }
    }
    filtered
}

/// Run all fixture files under `path` (or a single file).
/// If `categories` is non-empty, only run tests in those categories.
/// Returns exit code: 0 = all pass, 1 = any failure.
pub fn run_tests(path: &Path, no_color: bool, categories: &[String]) -> i32 {
    let run: BTreeMap<String, Vec<PathBuf>> = if path.is_file() {
        BTreeMap::from([(String::new(), vec![path.to_path_buf()])])
    } else {
        let all = discover_categorized(path);
        if all.is_empty() {
            eprintln!("no {} files found in {}", FIXTURE_SUFFIX, path.display());
            return 1;
        }
        let selected: BTreeMap<String, Vec<PathBuf>> = select(&all, categories)
            .into_iter()
            .map(|(k, v)| (k.to_string(), v.clone()))
            .collect();
        selected
    };

    if run.is_empty() {
        eprintln!("no matching categories found");
        return 1;
    }

    let mut passed = 0usize;
    let mut failures: Vec<TestResult> = Vec::new();

    for (cat, files) in &run {
        if !path.is_file() {
            let header = if cat.is_empty() { "(root)" } else { cat.as_str() };
            eprintln!();
            eprintln!("{}", paint(header, "1", no_color));
        }

        for file in files {
            let result = run_single_test(file);
            match &result.outcome {
                TestOutcome::Pass => {
                    passed += 1;
                    eprintln!("  {}  {}", paint("PASS", "32", no_color), result.label());
                }
                TestOutcome::Fail(_) => {
                    eprintln!("  {}  {}", paint("FAIL", "31", no_color), result.label());
                    failures.push(result);
                }
            }
        }
    }

    if !failures.is_empty() {
        eprintln!();
        eprintln!("failures:");
        for f in &failures {
            eprintln!();
            eprintln!("  --- {} ---", f.path.display());
            if let TestOutcome::Fail(reason) = &f.outcome {
                for line in reason.lines() {
                    eprintln!("  {}", line);
                }
            }
        }
    }

    eprintln!();
    if failures.is_empty() {
        eprintln!("test result: {}. {} passed, 0 failed", paint("ok", "32", no_color), passed);
        0
    } else {
        let failed = failures.len();
        eprintln!(
            "test result: {}. {} passed, {} failed (of {})",
            paint("FAILED", "31", no_color),
            passed,
            failed,
            passed + failed
        );
        1
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn fixtures() -> PathBuf {
        Path::new(env!("CARGO_MANIFEST_DIR")).join("fixtures")
    }

    #[test]
    fn frontmatter_splits_config_from_source() {
        let (config, source) = parse_test_file(
            "---\ndescription = \"d\"\nname = \"a.xml\"\nraise = true\n---\n$x$\n",
        )
        .unwrap();
        assert_eq!(config.description.as_deref(), Some("d"));
        assert_eq!(config.name, "a.xml");
        assert!(config.raise);
        assert_eq!(source, "$x$\n");
    }

    #[test]
    fn frontmatter_defaults() {
        let (config, source) = parse_test_file("---\n---\ntext").unwrap();
        assert_eq!(config.name, "test.tmpl");
        assert!(config.variables.is_empty());
        assert!(!config.raise);
        assert_eq!(source, "text");

        let (config, source) = parse_test_file("---\r\n---\r\n$x$\r\n").unwrap();
        assert!(config.expect_output.is_none());
        assert_eq!(source, "$x$\r\n");
    }

    #[test]
    fn missing_frontmatter_is_rejected() {
        assert!(parse_test_file("text\n").is_err());
        assert!(parse_test_file("---\nname = \"x\"\n").is_err());
    }

    #[test]
    fn check_reports_output_mismatch() {
        let (config, source) =
            parse_test_file("---\nexpect_output = \"b\\n\"\n---\na\n").unwrap();
        let reason = check(&config, source).unwrap();
        assert!(reason.starts_with("output mismatch"), "{reason}");
    }

    #[test]
    fn every_fixture_passes() {
        assert_eq!(run_tests(&fixtures(), true, &[]), 0);
    }

    #[test]
    fn categories_are_subfolders() {
        let all = discover_categorized(&fixtures());
        assert!(all.contains_key("blocks"));
        let selected = select(&all, &["errors".to_string()]);
        assert_eq!(selected.keys().copied().collect::<Vec<_>>(), vec!["errors"]);
    }
}
