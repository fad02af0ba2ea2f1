pub mod builtins;
pub mod counters;
pub mod dates;
pub mod environment;
pub mod error;
pub mod evaluator;
pub mod evaluator_helpers;
pub mod executor;
pub mod number;
pub mod runtime_value;
pub mod state;

pub use counters::Counters;
pub use environment::{Environment, Scope};
pub use error::{EvaluationFailure, RuntimeError};
pub use evaluator::{Evaluate, ExpressionEvaluator};
pub use executor::{GenerateOptions, GeneratedLabel, execute, generate, generate_with};
pub use runtime_value::RuntimeValue;
pub use state::RuntimeState;
