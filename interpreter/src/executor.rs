use std::sync::LazyLock;

use pdstemplate::Template;
use pdstemplate::block::{Block, Contents, IfBlock};
use pdstemplate::body::Fragment;
use pdstemplate::section::{Directive, ScopeAction};
use regex::{NoExpand, Regex};

use crate::counters::Counters;
use crate::environment::{Environment, Scope};
use crate::error::EvaluationFailure;
use crate::evaluator::{Evaluate, ExpressionEvaluator};
use crate::number::canonical_float;
use crate::runtime_value::RuntimeValue;
use crate::state::RuntimeState;

static LINE_ENDING: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\r?\n").expect("invalid line ending pattern"));

/// Per-call settings for [`generate`].
#[derive(Debug, Clone, Default)]
pub struct GenerateOptions {
    /// `None` escapes markup only for templates whose name ends in `.xml`.
    pub escape_markup: Option<bool>,
    /// Return the first evaluation failure instead of writing a marker.
    pub fail_fast: bool,
    /// Rewrite every line ending of the output to this string.
    pub terminator: Option<String>,
    /// Name used in log messages; defaults to the template name.
    pub label: Option<String>,
    /// Registry for `COUNTER`; `None` starts every generation from zero.
    pub counters: Option<Counters>,
}

/// The text of one generated document.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GeneratedLabel {
    pub content: String,
    /// Expressions that failed and were replaced by error markers.
    pub error_count: usize,
}

/// Generate a document with the built-in expression language.
pub fn generate(
    template: &Template,
    variables: Scope,
    options: &GenerateOptions,
) -> Result<GeneratedLabel, EvaluationFailure> {
    generate_with(template, variables, options, &ExpressionEvaluator)
}

/// Generate a document, evaluating expressions with `evaluator`.
///
/// Each call starts from a fresh global namespace and an empty local scope, so
/// a template can be generated any number of times, from any number of threads.
pub fn generate_with(
    template: &Template,
    variables: Scope,
    options: &GenerateOptions,
    evaluator: &dyn Evaluate,
) -> Result<GeneratedLabel, EvaluationFailure> {
    let label = options.label.clone().unwrap_or_else(|| template.name.clone());
    let escape_markup = options.escape_markup.unwrap_or_else(|| template.is_xml());
    let mut env = Environment::new(variables);
    if let Some(counters) = &options.counters {
        env = env.with_counters(counters.clone());
    }
    let mut state = RuntimeState::new(env, escape_markup, options.fail_fast, label);

    let mut output = Vec::new();
    for block in &template.blocks {
        execute(block, &mut state, evaluator, &mut output)?;
    }

    let mut content = output.concat();
    if let Some(terminator) = &options.terminator {
        content = LINE_ENDING.replace_all(&content, NoExpand(terminator)).into_owned();
    }

    if state.error_count > 0 {
        log::warn!("{}: {} expression(s) failed", state.label, state.error_count);
    } else {
        log::debug!("{}: generated {} bytes", state.label, content.len());
    }
    Ok(GeneratedLabel {
        content,
        error_count: state.error_count,
    })
}

/// Run one block, appending its text to `output`.
pub fn execute(
    block: &Block,
    state: &mut RuntimeState,
    evaluator: &dyn Evaluate,
    output: &mut Vec<String>,
) -> Result<(), EvaluationFailure> {
    match block {
        Block::Once(once) => {
            if once.scope == ScopeAction::Pop {
                state.env.pop_scope();
            }
            if let Some(expression) = &once.expression {
                match evaluator.evaluate(expression, &state.env) {
                    Ok(value) => {
                        if let Some(name) = &once.bind_name {
                            state.env.set_variable(name, value);
                        }
                    }
                    Err(error) => {
                        let failure = EvaluationFailure::new(error, once.contents.line);
                        output.push(state.contain(failure)?);
                        return Ok(());
                    }
                }
            }
            execute_contents(&once.contents, state, evaluator, output)
        }

        Block::Note(_) => Ok(()),

        Block::For(for_block) => {
            // Pushed before the guard runs: the sibling $END_FOR pops either way
            state.env.push_scope();
            let items = evaluator
                .evaluate(&for_block.expression, &state.env)
                .and_then(RuntimeValue::into_items);
            let items = match items {
                Ok(items) => items,
                Err(error) => {
                    let failure = EvaluationFailure::new(error, for_block.contents.line);
                    output.push(state.contain(failure)?);
                    return Ok(());
                }
            };

            log::trace!("{} at line {}: {} iteration(s)", Directive::For, for_block.contents.line, items.len());
            state
                .env
                .set_variable(&for_block.length_name, RuntimeValue::Integer(items.len() as i64));
            for (index, item) in items.into_iter().enumerate() {
                state.env.set_variable(&for_block.value_name, item);
                state.env.set_variable(&for_block.index_name, RuntimeValue::Integer(index as i64));
                execute_contents(&for_block.contents, state, evaluator, output)?;
            }
            Ok(())
        }

        Block::If(if_block) => execute_if(if_block, state, evaluator, output),
    }
}

fn execute_if(
    block: &IfBlock,
    state: &mut RuntimeState,
    evaluator: &dyn Evaluate,
    output: &mut Vec<String>,
) -> Result<(), EvaluationFailure> {
    // Only the chain head opens a scope; $ELSE_IF links share it
    if block.directive == Directive::If {
        state.env.push_scope();
    }

    let status = match evaluator.evaluate(&block.expression, &state.env) {
        Ok(status) => status,
        Err(error) => {
            let failure = EvaluationFailure::new(error, block.contents.line);
            output.push(state.contain(failure)?);
            return Ok(());
        }
    };

    let truthy = status.is_truthy();
    if let Some(name) = &block.bind_name {
        state.env.set_variable(name, status);
    }

    if truthy {
        execute_contents(&block.contents, state, evaluator, output)
    } else if let Some(next) = &block.else_if {
        execute_if(next, state, evaluator, output)
    } else if let Some(else_block) = &block.else_branch {
        execute_contents(&else_block.contents, state, evaluator, output)
    } else {
        Ok(())
    }
}

/// The default procedure: the body once, then every child in order.
fn execute_contents(
    contents: &Contents,
    state: &mut RuntimeState,
    evaluator: &dyn Evaluate,
    output: &mut Vec<String>,
) -> Result<(), EvaluationFailure> {
    for fragment in &contents.body.fragments {
        match fragment {
            Fragment::Literal(text) => output.push(text.clone()),
            Fragment::Expression(expr) => {
                let text = match evaluator.evaluate(&expr.expression, &state.env) {
                    Ok(value) => {
                        let text = render(&value);
                        if let Some(name) = &expr.bind_name {
                            state.env.set_variable(name, value);
                        }
                        text
                    }
                    Err(error) => state.contain(EvaluationFailure::new(error, expr.line))?,
                };
                output.push(state.escape(text));
            }
        }
    }

    for child in &contents.children {
        execute(child, state, evaluator, output)?;
    }
    Ok(())
}

fn render(value: &RuntimeValue) -> String {
    match value {
        RuntimeValue::Float(n) => canonical_float(*n),
        other => other.to_string(),
    }
}
