/// Interprets the usual truthy/falsy spellings of an environment flag (`1`/`true`/`yes`/`on` and
/// their opposites, any casing, surrounding whitespace ignored). Anything else, including an
/// absent value, falls back to `default`.
pub fn parse_boolean_flag(value: Option<String>, default: bool) -> bool {
    const TRUTHY: [&str; 4] = ["1", "true", "yes", "on"];
    const FALSY: [&str; 4] = ["0", "false", "no", "off"];
    match value.as_deref().map(str::trim) {
        Some(v) if TRUTHY.iter().any(|t| v.eq_ignore_ascii_case(t)) => true,
        Some(v) if FALSY.iter().any(|t| v.eq_ignore_ascii_case(t)) => false,
        _ => default,
    }
}
