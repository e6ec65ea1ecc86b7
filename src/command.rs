//! Data model for one interpretation cycle: assignments, stages and pipelines.

/// Delimiter separating a variable name from its value on the fast path.
pub const ASSIGNMENT_DELIMITER: char = '=';

/// A `NAME=VALUE` line, recognized purely syntactically.
///
/// Any line that contains `=` and no whitespace is an assignment, even when it
/// was meant as a command with a `key=value` argument (`a|b=c` assigns to `a|b`).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Assignment<'a> {
    pub name: &'a str,
    pub value: &'a str,
}

impl<'a> Assignment<'a> {
    /// Detect an assignment. Splits on the first `=`, so the value may contain more.
    pub fn parse(line: &'a str) -> Option<Self> {
        if line.chars().any(char::is_whitespace) {
            return None;
        }
        let (name, value) = line.split_once(ASSIGNMENT_DELIMITER)?;
        Some(Self { name, value })
    }
}

/// One command within a pipeline: `tokens[0]` is the command name.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Stage {
    pub tokens: Vec<String>,
}

impl Stage {
    pub fn new(tokens: Vec<String>) -> Self {
        Self { tokens }
    }

    /// Empty stages are skipped by the executor.
    pub fn is_empty(&self) -> bool {
        self.tokens.is_empty()
    }

    pub fn name(&self) -> Option<&str> {
        self.tokens.first().map(String::as_str)
    }

    /// Everything after the command name.
    pub fn args(&self) -> &[String] {
        self.tokens.get(1..).unwrap_or_default()
    }
}

/// Stages connected stdout to stdin, in order. Always holds at least one stage.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Pipeline {
    stages: Vec<Stage>,
}

impl Pipeline {
    pub(crate) fn new(stages: Vec<Stage>) -> Self {
        debug_assert!(!stages.is_empty());
        Self { stages }
    }

    pub fn stages(&self) -> &[Stage] {
        &self.stages
    }

    pub fn len(&self) -> usize {
        self.stages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.stages.is_empty()
    }

    /// Whether `index` is the terminal position, the only one where built-ins dispatch.
    pub fn is_last(&self, index: usize) -> bool {
        index + 1 == self.stages.len()
    }
}
