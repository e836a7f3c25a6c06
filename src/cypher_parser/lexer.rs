//! Lexical scanning shared by the clause splitter and the sub-parsers.
//!
//! Cypher keywords only count when they appear outside string literals,
//! outside backtick-quoted names and at bracket depth zero, so every split
//! in this crate goes through the scanner below instead of plain `str::find`.

use super::errors::CypherParseError;

/// A run of `[A-Za-z0-9_]` characters found outside quotes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct Word<'a> {
    pub text: &'a str,
    pub start: usize,
    pub end: usize,
    pub depth: usize,
    /// Character immediately before the word, if any.
    pub prev: Option<char>,
    /// Character immediately after the word, if any.
    pub next: Option<char>,
}

impl Word<'_> {
    pub fn is_keyword(&self, keyword: &str) -> bool {
        self.text.eq_ignore_ascii_case(keyword)
            && !matches!(self.prev, Some('.') | Some('$') | Some(':'))
            && self.next != Some('.')
    }
}

fn is_word_char(c: char) -> bool {
    c.is_ascii_alphanumeric() || c == '_'
}

fn is_quote(c: char) -> bool {
    c == '\'' || c == '"' || c == '`'
}

/// Remove `//` line comments and `/* */` block comments, leaving string
/// contents untouched.
pub(crate) fn strip_comments(input: &str) -> Result<String, CypherParseError> {
    let mut out = String::with_capacity(input.len());
    let mut chars = input.char_indices().peekable();
    let mut quote: Option<(char, usize)> = None;

    while let Some((idx, c)) = chars.next() {
        if let Some((q, _)) = quote {
            out.push(c);
            if c == '\\' && q != '`' {
                if let Some((_, escaped)) = chars.next() {
                    out.push(escaped);
                }
            } else if c == q {
                quote = None;
            }
            continue;
        }

        if is_quote(c) {
            quote = Some((c, idx));
            out.push(c);
        } else if c == '/' && matches!(chars.peek(), Some((_, '/'))) {
            for (_, skipped) in chars.by_ref() {
                if skipped == '\n' {
                    out.push('\n');
                    break;
                }
            }
        } else if c == '/' && matches!(chars.peek(), Some((_, '*'))) {
            chars.next();
            let mut prev = ' ';
            for (_, skipped) in chars.by_ref() {
                if prev == '*' && skipped == '/' {
                    break;
                }
                prev = skipped;
            }
            out.push(' ');
        } else {
            out.push(c);
        }
    }

    match quote {
        Some((_, start)) => Err(CypherParseError::UnterminatedString(start)),
        None => Ok(out),
    }
}

/// Every word in `input` together with its bracket depth.
pub(crate) fn words(input: &str) -> Result<Vec<Word<'_>>, CypherParseError> {
    let mut result = Vec::new();
    let mut quote: Option<(char, usize)> = None;
    let mut depth: usize = 0;
    let mut word_start: Option<usize> = None;
    let mut escaped = false;

    let chars: Vec<(usize, char)> = input.char_indices().collect();
    for (pos, &(idx, c)) in chars.iter().enumerate() {
        if let Some((q, _)) = quote {
            if escaped {
                escaped = false;
            } else if c == '\\' && q != '`' {
                escaped = true;
            } else if c == q {
                quote = None;
            }
            continue;
        }

        if is_word_char(c) {
            if word_start.is_none() {
                word_start = Some(pos);
            }
            continue;
        }

        if let Some(start_pos) = word_start.take() {
            result.push(make_word(input, &chars, start_pos, pos, depth));
        }

        match c {
            '(' | '[' | '{' => depth += 1,
            ')' | ']' | '}' => {
                depth = depth
                    .checked_sub(1)
                    .ok_or_else(|| CypherParseError::UnbalancedBrackets(input.trim().to_string()))?;
            }
            c if is_quote(c) => quote = Some((c, idx)),
            _ => {}
        }
    }

    if let Some(start_pos) = word_start {
        result.push(make_word(input, &chars, start_pos, chars.len(), depth));
    }
    if let Some((_, start)) = quote {
        return Err(CypherParseError::UnterminatedString(start));
    }
    if depth != 0 {
        return Err(CypherParseError::UnbalancedBrackets(input.trim().to_string()));
    }
    Ok(result)
}

fn make_word<'a>(
    input: &'a str,
    chars: &[(usize, char)],
    start_pos: usize,
    end_pos: usize,
    depth: usize,
) -> Word<'a> {
    let start = chars[start_pos].0;
    let end = chars.get(end_pos).map(|(i, _)| *i).unwrap_or(input.len());
    let prev = start_pos.checked_sub(1).map(|p| chars[p].1);
    let next = chars.get(end_pos).map(|(_, c)| *c);
    Word {
        text: &input[start..end],
        start,
        end,
        depth,
        prev,
        next,
    }
}

/// Words at bracket depth zero only.
pub(crate) fn top_level_words(input: &str) -> Result<Vec<Word<'_>>, CypherParseError> {
    Ok(words(input)?.into_iter().filter(|w| w.depth == 0).collect())
}

/// Split `input` on `separator` where it occurs at depth zero outside quotes.
pub(crate) fn split_top_level(input: &str, separator: char) -> Result<Vec<&str>, CypherParseError> {
    let mut parts = Vec::new();
    let mut quote: Option<char> = None;
    let mut depth: usize = 0;
    let mut escaped = false;
    let mut last = 0;

    for (idx, c) in input.char_indices() {
        if let Some(q) = quote {
            if escaped {
                escaped = false;
            } else if c == '\\' && q != '`' {
                escaped = true;
            } else if c == q {
                quote = None;
            }
            continue;
        }
        match c {
            c if is_quote(c) => quote = Some(c),
            '(' | '[' | '{' => depth += 1,
            ')' | ']' | '}' => {
                depth = depth
                    .checked_sub(1)
                    .ok_or_else(|| CypherParseError::UnbalancedBrackets(input.trim().to_string()))?;
            }
            c if c == separator && depth == 0 => {
                parts.push(&input[last..idx]);
                last = idx + c.len_utf8();
            }
            _ => {}
        }
    }
    parts.push(&input[last..]);
    Ok(parts)
}

/// Split on a keyword (e.g. `AND`, `OR`) appearing at depth zero.
pub(crate) fn split_on_keyword<'a>(
    input: &'a str,
    keyword: &str,
) -> Result<Vec<&'a str>, CypherParseError> {
    let mut parts = Vec::new();
    let mut last = 0;
    for word in top_level_words(input)? {
        if word.is_keyword(keyword) {
            parts.push(&input[last..word.start]);
            last = word.end;
        }
    }
    parts.push(&input[last..]);
    Ok(parts)
}

/// `(var, property)` pairs written as `var.property`, at any depth.
pub(crate) fn property_refs(input: &str) -> Result<Vec<(String, String)>, CypherParseError> {
    let all = words(input)?;
    let mut refs = Vec::new();
    for pair in all.windows(2) {
        let (owner, prop) = (&pair[0], &pair[1]);
        if owner.next == Some('.')
            && prop.start == owner.end + 1
            && owner.prev != Some('.')
            && owner.prev != Some('$')
            && !owner.text.starts_with(|c: char| c.is_ascii_digit())
        {
            refs.push((owner.text.to_string(), prop.text.to_string()));
        }
    }
    Ok(refs)
}

/// True when `var` is mentioned on its own (not as `var.prop`, a label, a
/// function name or a parameter).
pub(crate) fn mentions_bare_variable(input: &str, var: &str) -> Result<bool, CypherParseError> {
    Ok(words(input)?.iter().any(|w| {
        w.text == var
            && !matches!(w.prev, Some('.') | Some('$') | Some(':'))
            && !matches!(w.next, Some('.') | Some('(') | Some(':'))
    }))
}

/// True when the whole of `input` is wrapped in one matching pair of brackets.
pub(crate) fn is_fully_wrapped(input: &str, open: char, close: char) -> bool {
    let trimmed = input.trim();
    if !(trimmed.starts_with(open) && trimmed.ends_with(close)) {
        return false;
    }
    let mut depth = 0usize;
    let mut quote: Option<char> = None;
    let mut escaped = false;
    let last = trimmed.len() - close.len_utf8();
    for (idx, c) in trimmed.char_indices() {
        if let Some(q) = quote {
            if escaped {
                escaped = false;
            } else if c == '\\' && q != '`' {
                escaped = true;
            } else if c == q {
                quote = None;
            }
            continue;
        }
        if is_quote(c) {
            quote = Some(c);
        } else if c == open {
            depth += 1;
        } else if c == close {
            depth = depth.saturating_sub(1);
            if depth == 0 && idx != last {
                return false;
            }
        }
    }
    depth == 0
}
