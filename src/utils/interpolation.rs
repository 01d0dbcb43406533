use std::collections::HashMap;

use crate::error::TemplateError;

/// Runtime parameters bound to template placeholders.
pub type Params = HashMap<String, String>;

/// Name bound to the whole "extra" text when it carries no `key=value` pair.
pub const DEFAULT_PARAM: &str = "value";

/// Build the parameter map from the free-text extra argument of a trigger.
///
/// - Whitespace-separated `key=value` tokens become entries (split on the first `=`).
/// - Tokens without `=` are ignored as long as at least one pair parsed.
/// - If nothing parses, the entire trimmed text is bound to [`DEFAULT_PARAM`].
/// - Empty extra text yields an empty map.
pub fn parse_params(extra: &str) -> Params {
    let extra = extra.trim();
    let mut params = Params::new();
    if extra.is_empty() {
        return params;
    }
    for part in extra.split_whitespace() {
        if let Some((key, value)) = part.split_once('=')
            && !key.is_empty()
        {
            params.insert(key.to_string(), value.to_string());
        }
    }
    if params.is_empty() {
        params.insert(DEFAULT_PARAM.to_string(), extra.to_string());
    }
    params
}

/// Substitute `{name}` placeholders with values from `params`.
///
/// Supported token formats:
/// - `{name}` where `name` is an identifier (`[A-Za-z_][A-Za-z0-9_]*`) -> `params["name"]`
/// - `{{` and `}}` -> literal `{` and `}`
///
/// Any other brace (e.g. `{}` in `find -exec`, or `{print $1}` in awk) is kept
/// as written. A placeholder without a bound value is an error naming it.
pub fn substitute(template: &str, params: &Params) -> Result<String, TemplateError> {
    render(template, |name| params.get(name).cloned())
}

/// Substitute every placeholder with its own name. Used to validate a
/// template's shape at registration time, before any runtime value exists.
pub fn render_sentinel(template: &str) -> String {
    // The lookup never fails, so neither does rendering.
    render(template, |name| Some(name.to_string())).unwrap_or_else(|_| template.to_string())
}

fn render<F>(template: &str, mut lookup: F) -> Result<String, TemplateError>
where
    F: FnMut(&str) -> Option<String>,
{
    let mut out = String::with_capacity(template.len());
    let bytes = template.as_bytes();
    let mut idx = 0;
    let mut literal_from = 0;

    while idx < bytes.len() {
        match bytes[idx] {
            b'{' if bytes.get(idx + 1) == Some(&b'{') => {
                out.push_str(&template[literal_from..idx]);
                out.push('{');
                idx += 2;
                literal_from = idx;
            }
            b'}' if bytes.get(idx + 1) == Some(&b'}') => {
                out.push_str(&template[literal_from..idx]);
                out.push('}');
                idx += 2;
                literal_from = idx;
            }
            b'{' => match placeholder_at(template, idx) {
                Some((name, end)) => {
                    out.push_str(&template[literal_from..idx]);
                    let value =
                        lookup(name).ok_or_else(|| TemplateError::Missing(name.to_string()))?;
                    out.push_str(&value);
                    idx = end + 1;
                    literal_from = idx;
                }
                None => idx += 1,
            },
            _ => idx += 1,
        }
    }

    out.push_str(&template[literal_from..]);
    Ok(out)
}

/// If an identifier placeholder opens at `start`, return its name and the
/// index of the closing brace.
fn placeholder_at(template: &str, start: usize) -> Option<(&str, usize)> {
    let rest = &template[start + 1..];
    let close = rest.find('}')?;
    let name = &rest[..close];
    let mut chars = name.chars();
    let first = chars.next()?;
    if !(first.is_ascii_alphabetic() || first == '_') {
        return None;
    }
    if !chars.all(|c| c.is_ascii_alphanumeric() || c == '_') {
        return None;
    }
    Some((name, start + 1 + close))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn params(pairs: &[(&str, &str)]) -> Params {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    #[test]
    fn test_parse_key_value_pairs() {
        let p = parse_params("  temp=40 unit=c stray ");
        assert_eq!(p, params(&[("temp", "40"), ("unit", "c")]));
    }

    #[test]
    fn test_parse_falls_back_to_default_param() {
        let p = parse_params("hello world");
        assert_eq!(p, params(&[(DEFAULT_PARAM, "hello world")]));
        assert!(parse_params("   ").is_empty());
    }

    #[test]
    fn test_value_keeps_later_equals_signs() {
        let p = parse_params("q=a=b");
        assert_eq!(p.get("q").map(String::as_str), Some("a=b"));
    }

    #[test]
    fn test_substitute_named_placeholders() {
        let p = params(&[("degrees", "21"), ("room", "lab")]);
        let out = substitute("POST http://hvac/{room}?t={degrees}", &p).unwrap();
        assert_eq!(out, "POST http://hvac/lab?t=21");
    }

    #[test]
    fn test_missing_placeholder_is_named() {
        let err = substitute("echo {name} {value}", &params(&[("value", "x")])).unwrap_err();
        assert_eq!(err, TemplateError::Missing("name".into()));
    }

    #[test]
    fn test_escaped_and_non_identifier_braces_are_literal() {
        let p = params(&[("dir", "/tmp")]);
        let out = substitute("find {dir} -exec ls {} \\; && echo {{dir}} '{print $1}'", &p).unwrap();
        assert_eq!(out, "find /tmp -exec ls {} \\; && echo {dir} '{print $1}'");
    }

    #[test]
    fn test_sentinel_names_each_placeholder() {
        assert_eq!(render_sentinel("GET http://x/{a}/{b}"), "GET http://x/a/b");
        assert_eq!(render_sentinel("{a} {{b}} {c} {a}"), "a {b} c a");
    }

    #[test]
    fn test_unicode_text_survives() {
        let out = substitute("é {v} ü", &params(&[("v", "ß")])).unwrap();
        assert_eq!(out, "é ß ü");
    }
}
