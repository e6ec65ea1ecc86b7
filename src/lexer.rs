//! Lexical analysis of a command line into pipeline stages.
//!
//! The grammar is deliberately flat: stages are separated by `|` and tokens by
//! runs of whitespace. There is no quoting or escaping, so a `|` is always a
//! stage separator and a quote character is an ordinary token character.

use crate::command::{Pipeline, Stage};

/// The pipe delimiter separating stages.
pub const PIPE: char = '|';

/// Split `line` into stages, preserving order.
///
/// A line without pipes yields exactly one stage. Empty stages (e.g. the right
/// side of `ls |`) are kept so positions stay meaningful; the executor skips them.
pub fn split_into_stages(line: &str) -> Pipeline {
    Pipeline::new(line.split(PIPE).map(split_stage).collect())
}

/// Split one stage substring into whitespace-delimited tokens.
pub fn split_stage(stage: &str) -> Stage {
    Stage::new(stage.split_whitespace().map(str::to_owned).collect())
}
