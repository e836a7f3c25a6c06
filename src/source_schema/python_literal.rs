//! The text2cypher schema export stores `structured_schema` as a Python dict
//! literal (`{'node_props': {...}, 'rel_props': {}, ...}`). This rewrites it
//! into JSON text so serde can take over.

use super::errors::SourceSchemaError;

/// Convert single-quoted strings to JSON strings and `True`/`False`/`None`
/// to `true`/`false`/`null`. Tuples are rewritten as arrays.
pub fn python_literal_to_json(input: &str) -> Result<String, SourceSchemaError> {
    let mut out = String::with_capacity(input.len());
    let chars: Vec<(usize, char)> = input.char_indices().collect();
    let mut i = 0;

    while i < chars.len() {
        let (offset, c) = chars[i];
        match c {
            '\'' | '"' => {
                let quote = c;
                out.push('"');
                i += 1;
                let mut closed = false;
                while i < chars.len() {
                    let (_, ch) = chars[i];
                    if ch == '\\' {
                        let escaped = chars.get(i + 1).map(|(_, e)| *e);
                        match escaped {
                            // JSON has no \' escape
                            Some('\'') => out.push('\''),
                            Some(e) => {
                                out.push('\\');
                                out.push(e);
                            }
                            None => return Err(SourceSchemaError::UnterminatedLiteral(offset)),
                        }
                        i += 2;
                        continue;
                    }
                    if ch == quote {
                        closed = true;
                        i += 1;
                        break;
                    }
                    if ch == '"' {
                        out.push_str("\\\"");
                    } else {
                        out.push(ch);
                    }
                    i += 1;
                }
                if !closed {
                    return Err(SourceSchemaError::UnterminatedLiteral(offset));
                }
                out.push('"');
                continue;
            }
            '(' => out.push('['),
            ')' => out.push(']'),
            c if c.is_ascii_alphabetic() => {
                while i < chars.len() && (chars[i].1.is_ascii_alphanumeric() || chars[i].1 == '_') {
                    i += 1;
                }
                let end = chars.get(i).map(|(o, _)| *o).unwrap_or(input.len());
                let word = &input[offset..end];
                out.push_str(match word {
                    "True" => "true",
                    "False" => "false",
                    "None" => "null",
                    other => other,
                });
                continue;
            }
            other => out.push(other),
        }
        i += 1;
    }

    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_dict_literal() {
        let json =
            python_literal_to_json("{'a': 'x', 'b': True, 'c': None, 'd': [1, 2.5], 'e': False}")
                .unwrap();
        let value: serde_json::Value = serde_json::from_str(&json).unwrap();
        assert_eq!(value["a"], "x");
        assert_eq!(value["b"], true);
        assert!(value["c"].is_null());
        assert_eq!(value["d"][1], 2.5);
        assert_eq!(value["e"], false);
    }

    #[test]
    fn test_quotes_inside_strings() {
        let json = python_literal_to_json(r#"{'q': "it's", 'r': 'say "hi"', 's': 'don\'t'}"#)
            .unwrap();
        let value: serde_json::Value = serde_json::from_str(&json).unwrap();
        assert_eq!(value["q"], "it's");
        assert_eq!(value["r"], "say \"hi\"");
        assert_eq!(value["s"], "don't");
    }

    #[test]
    fn test_tuple_becomes_array() {
        let json = python_literal_to_json("{'t': ('a', 'b')}").unwrap();
        let value: serde_json::Value = serde_json::from_str(&json).unwrap();
        assert_eq!(value["t"][0], "a");
    }

    #[test]
    fn test_unterminated() {
        assert!(matches!(
            python_literal_to_json("{'a': 'x"),
            Err(SourceSchemaError::UnterminatedLiteral(6))
        ));
    }
}
