//! Parsing of command-line style tool arguments.
//!
//! Arguments are whitespace separated; a backslash before a space keeps the
//! space inside the current token. Tool arguments take the form
//! `key=value` (a string) or `key:number=value` (an integer, or a float when
//! the value contains a `.`).

use serde_json::{Map, Number, Value};

use crate::{Error, Result};

/// Split `input` on unescaped whitespace.
pub fn split_escaped(input: &str) -> Vec<String> {
    let mut tokens = Vec::new();
    let mut current = String::new();
    let mut in_token = false;
    let mut chars = input.chars().peekable();

    while let Some(c) = chars.next() {
        match c {
            '\\' => {
                match chars.peek() {
                    Some(&next) if next.is_whitespace() || next == '\\' => {
                        current.push(next);
                        chars.next();
                    }
                    _ => current.push('\\'),
                }
                in_token = true;
            }
            c if c.is_whitespace() => {
                if in_token {
                    tokens.push(std::mem::take(&mut current));
                    in_token = false;
                }
            }
            c => {
                current.push(c);
                in_token = true;
            }
        }
    }

    if in_token {
        tokens.push(current);
    }
    tokens
}

/// Parse one `key[:number]=value` token.
pub fn parse_argument(token: &str) -> Result<(String, Value)> {
    let invalid = |reason: String| Error::ArgumentParse {
        arg: token.to_string(),
        reason,
    };

    let (key, raw) = token
        .split_once('=')
        .ok_or_else(|| invalid("expected key=value".to_string()))?;

    let (name, kind) = match key.split_once(':') {
        Some((name, kind)) => (name, Some(kind)),
        None => (key, None),
    };
    if name.is_empty() {
        return Err(invalid("missing key".to_string()));
    }

    let value = match kind {
        None => Value::String(raw.to_string()),
        Some("number") => parse_number(raw).map_err(invalid)?,
        Some(other) => {
            return Err(invalid(format!(
                "unknown type `{other}`, only `number` is supported"
            )));
        }
    };

    Ok((name.to_string(), value))
}

/// Parse every token, collecting failures instead of stopping at the first.
pub fn parse_arguments<S: AsRef<str>>(tokens: &[S]) -> (Map<String, Value>, Vec<Error>) {
    let mut arguments = Map::new();
    let mut errors = Vec::new();

    for token in tokens {
        match parse_argument(token.as_ref()) {
            Ok((key, value)) => {
                arguments.insert(key, value);
            }
            Err(e) => errors.push(e),
        }
    }

    (arguments, errors)
}

fn parse_number(raw: &str) -> std::result::Result<Value, String> {
    if raw.contains('.') {
        let float: f64 = raw
            .parse()
            .map_err(|_| format!("`{raw}` is not a number"))?;
        Number::from_f64(float)
            .map(Value::Number)
            .ok_or_else(|| format!("`{raw}` is not a finite number"))
    } else {
        raw.parse::<i64>()
            .map(Value::from)
            .map_err(|_| format!("`{raw}` is not an integer"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn split_on_runs_of_whitespace() {
        assert_eq!(split_escaped("  a  b\tc "), ["a", "b", "c"]);
        assert!(split_escaped("   ").is_empty());
    }

    #[test]
    fn escaped_spaces_stay_in_token() {
        assert_eq!(
            split_escaped(r"/tmp/my\ dir server\ bin --flag"),
            ["/tmp/my dir", "server bin", "--flag"]
        );
    }

    #[test]
    fn other_backslashes_are_kept() {
        assert_eq!(split_escaped(r"C:\tools a\\b"), [r"C:\tools", r"a\b"]);
    }

    #[test]
    fn integer_and_string_arguments() {
        let tokens = split_escaped("a:number=2 b:number=3");
        let (args, errors) = parse_arguments(&tokens);
        assert!(errors.is_empty());
        assert_eq!(args["a"], json!(2));
        assert_eq!(args["b"], json!(3));
        assert!(args["a"].is_i64());
    }

    #[test]
    fn float_when_value_has_a_dot() {
        let tokens = split_escaped("a:number=2.5 b=x");
        let (args, errors) = parse_arguments(&tokens);
        assert!(errors.is_empty());
        assert_eq!(args["a"], json!(2.5));
        assert!(args["a"].is_f64());
        assert_eq!(args["b"], json!("x"));
    }

    #[test]
    fn escaped_space_inside_value() {
        let tokens = split_escaped(r"greeting=hello\ world");
        let (args, _) = parse_arguments(&tokens);
        assert_eq!(args["greeting"], json!("hello world"));
    }

    #[test]
    fn bad_pairs_are_reported_and_skipped() {
        let tokens = split_escaped("a:number=abc novalue c=ok d:bool=1 =x e:number=1.2.3");
        let (args, errors) = parse_arguments(&tokens);

        assert_eq!(args.len(), 1);
        assert_eq!(args["c"], json!("ok"));

        let failed: Vec<_> = errors
            .iter()
            .map(|e| match e {
                Error::ArgumentParse { arg, .. } => arg.as_str(),
                other => panic!("unexpected error: {other}"),
            })
            .collect();
        assert_eq!(
            failed,
            ["a:number=abc", "novalue", "d:bool=1", "=x", "e:number=1.2.3"]
        );
    }

    #[test]
    fn value_may_contain_equals() {
        let (key, value) = parse_argument("expr=a=b").unwrap();
        assert_eq!(key, "expr");
        assert_eq!(value, json!("a=b"));
    }
}
