mod test_runner;
mod variables;

use std::io::Write;
use std::path::Path;
use std::process;

use clap::{Parser, Subcommand, ValueEnum};
use codespan_reporting::diagnostic::{Diagnostic, Label};
use codespan_reporting::files::{Files, SimpleFiles};
use codespan_reporting::term;
use codespan_reporting::term::termcolor::{ColorChoice, StandardStream};

use interpreter::{GenerateOptions, Scope};
use pdstemplate::{Template, TemplateError};

const SUBCOMMANDS: &[&str] = &["run", "test", "help"];

/// Flags that are complete without a subcommand.
const STANDALONE_FLAGS: &[&str] = &["-h", "--help", "-V", "--version"];

#[derive(Parser)]
#[command(name = "pdstemplate", version, about = "PDS label template processor")]
struct Cli {
    /// Disable colored error output
    #[arg(long, global = true)]
    no_color: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Generate a document from a template
    Run(RunArgs),

    /// Run .test.tmpl fixture files
    Test(TestArgs),
}

#[derive(Clone, Copy, ValueEnum)]
enum Terminator {
    Lf,
    Crlf,
}

impl Terminator {
    fn as_str(self) -> &'static str {
        match self {
            Terminator::Lf => "\n",
            Terminator::Crlf => "\r\n",
        }
    }
}

#[derive(clap::Args)]
struct RunArgs {
    /// Template file to generate from
    file: String,

    /// TOML file whose top-level keys become template variables
    #[arg(short, long)]
    data: Option<String>,

    /// Write the document here instead of stdout
    #[arg(short, long)]
    output: Option<String>,

    /// Stop at the first failing expression instead of writing an error marker
    #[arg(long)]
    raise: bool,

    /// Escape markup in substituted values (default: only for .xml templates)
    #[arg(long, conflicts_with = "no_escape")]
    escape: bool,

    /// Never escape markup in substituted values
    #[arg(long)]
    no_escape: bool,

    /// Rewrite every line ending of the output
    #[arg(long, value_enum)]
    terminator: Option<Terminator>,

    /// Compile only, don't generate (exit 0 if the template is well formed)
    #[arg(long)]
    check: bool,
}

#[derive(clap::Args)]
struct TestArgs {
    /// Path to a .test.tmpl file or directory containing them
    path: String,

    /// Run only tests in these categories (subfolder names). Repeatable.
    #[arg(short, long)]
    category: Vec<String>,

    /// List available categories and exit
    #[arg(long)]
    list_categories: bool,
}

fn main() {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("warn")).init();

    let cli = Cli::parse_from(with_default_subcommand(std::env::args().collect()));

    match cli.command {
        Command::Run(run_args) => do_run(run_args, cli.no_color),
        Command::Test(test_args) => {
            let path = Path::new(&test_args.path);
            if test_args.list_categories {
                test_runner::list_categories(path);
                return;
            }
            let exit_code = test_runner::run_tests(path, cli.no_color, &test_args.category);
            process::exit(exit_code);
        }
    }
}

fn do_run(args: RunArgs, no_color: bool) {
    let color_choice = if no_color {
        ColorChoice::Never
    } else {
        ColorChoice::Auto
    };

    let source = match std::fs::read_to_string(&args.file) {
        Ok(s) => s,
        Err(e) => {
            eprintln!("error: cannot read '{}': {}", args.file, e);
            process::exit(1);
        }
    };

    let mut files = SimpleFiles::new();
    let file_id = files.add(args.file.clone(), source.clone());

    let template = match Template::compile(args.file.clone(), &source) {
        Ok(t) => t,
        Err(error) => {
            let writer = StandardStream::stderr(color_choice);
            let config = term::Config::default();
            let diagnostic = template_diagnostic(&files, file_id, &error);
            let _ = term::emit_to_write_style(&mut writer.lock(), &config, &files, &diagnostic);
            process::exit(1);
        }
    };

    if args.check {
        eprintln!("ok: {} compiled successfully", args.file);
        return;
    }

    let variables = match &args.data {
        Some(path) => variables::load(path).unwrap_or_else(|e| {
            eprintln!("error: {}", e);
            process::exit(1);
        }),
        None => Scope::new(),
    };

    let escape_markup = match (args.escape, args.no_escape) {
        (true, _) => Some(true),
        (_, true) => Some(false),
        _ => None,
    };
    let options = GenerateOptions {
        escape_markup,
        fail_fast: args.raise,
        terminator: args.terminator.map(|t| t.as_str().to_string()),
        ..GenerateOptions::default()
    };

    let generated = match interpreter::generate(&template, variables, &options) {
        Ok(g) => g,
        Err(failure) => {
            eprintln!("runtime error: {}", failure);
            process::exit(1);
        }
    };

    let written = match &args.output {
        Some(path) => std::fs::write(path, &generated.content),
        None => std::io::stdout().write_all(generated.content.as_bytes()),
    };
    if let Err(e) = written {
        eprintln!("error: cannot write output: {}", e);
        process::exit(1);
    }
}

/// `pdstemplate label.xml` works like `pdstemplate run label.xml`: without a
/// subcommand, `run` goes in front of the first argument that is not `--no-color`.
fn with_default_subcommand(mut args: Vec<String>) -> Vec<String> {
    let first = args.iter().skip(1).position(|a| a != "--no-color").map(|i| i + 1);
    if let Some(pos) = first {
        let arg = args[pos].as_str();
        if !SUBCOMMANDS.contains(&arg) && !STANDALONE_FLAGS.contains(&arg) {
            args.insert(pos, "run".to_string());
        }
    }
    args
}

/// A diagnostic labelling the whole source line a structural error refers to.
fn template_diagnostic(
    files: &SimpleFiles<String, String>,
    file_id: usize,
    error: &TemplateError,
) -> Diagnostic<usize> {
    let diagnostic = Diagnostic::error().with_message(error.to_string());
    match error
        .line()
        .checked_sub(1)
        .and_then(|index| files.line_range(file_id, index).ok())
    {
        Some(span) => diagnostic.with_labels(vec![Label::primary(file_id, span)]),
        None => diagnostic,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn diagnostic_labels_the_offending_line() {
        let source = "<a>\n$END_FOR\n<b>\n";
        let mut files = SimpleFiles::new();
        let file_id = files.add("t.xml".to_string(), source.to_string());
        let error = Template::compile("t.xml", source).unwrap_err();

        let diagnostic = template_diagnostic(&files, file_id, &error);
        assert_eq!(diagnostic.message, "$END_FOR without matching $FOR at line 2");
        assert_eq!(diagnostic.labels.len(), 1);
        assert_eq!(&source[diagnostic.labels[0].range.clone()], "$END_FOR\n");
    }

    fn argv(args: &[&str]) -> Vec<String> {
        args.iter().map(|a| a.to_string()).collect()
    }

    #[test]
    fn run_is_the_default_subcommand() {
        let rewrite = |args: &[&str]| with_default_subcommand(argv(args));

        assert_eq!(rewrite(&["pdstemplate", "label.xml"]), argv(&["pdstemplate", "run", "label.xml"]));
        assert_eq!(
            rewrite(&["pdstemplate", "-d", "vars.toml", "label.xml"]),
            argv(&["pdstemplate", "run", "-d", "vars.toml", "label.xml"])
        );
        assert_eq!(
            rewrite(&["pdstemplate", "--no-color", "--raise", "label.xml"]),
            argv(&["pdstemplate", "--no-color", "run", "--raise", "label.xml"])
        );
        assert_eq!(
            rewrite(&["pdstemplate", "test", "cli/fixtures"]),
            argv(&["pdstemplate", "test", "cli/fixtures"])
        );
        assert_eq!(rewrite(&["pdstemplate", "--version"]), argv(&["pdstemplate", "--version"]));
        assert_eq!(rewrite(&["pdstemplate"]), argv(&["pdstemplate"]));
    }

    #[test]
    fn data_flag_reaches_run_arguments() {
        let cli = Cli::try_parse_from(with_default_subcommand(argv(&[
            "pdstemplate",
            "-d",
            "vars.toml",
            "label.xml",
        ])))
        .unwrap();
        let Command::Run(run) = cli.command else { panic!("expected run") };
        assert_eq!(run.file, "label.xml");
        assert_eq!(run.data.as_deref(), Some("vars.toml"));
    }
}
