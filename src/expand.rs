use crate::env::Environment;

/// Prefix marking a token as a variable reference.
pub const VARIABLE_PREFIX: char = '$';

/// Expand `$NAME` arguments against `env`.
///
/// A token that starts with `$` is replaced as a whole by the variable's value,
/// or by the empty string when it is unset. Other tokens are copied unchanged.
/// The caller's slice is never modified; pass only the arguments, since the
/// command name is not subject to expansion.
pub fn expand_variables(args: &[String], env: &Environment) -> Vec<String> {
    args.iter()
        .map(|arg| match arg.strip_prefix(VARIABLE_PREFIX) {
            Some(name) => env.get_var(name).unwrap_or_default().to_owned(),
            None => arg.clone(),
        })
        .collect()
}
