//! Streaming tokenizer for the small HTML subset highlights are written in.

/// A lexical unit of an HTML fragment.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum Token {
    Start {
        name: String,
        attrs: Vec<(String, String)>,
        self_closing: bool,
    },
    End {
        name: String,
    },
    /// Text with entities already decoded
    Text(String),
}

/// The fragment contains a tag that never closes (`<b class="x` at EOF).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct Unterminated;

pub(crate) fn tokenize(input: &str) -> Result<Vec<Token>, Unterminated> {
    let bytes = input.as_bytes();
    let mut tokens = Vec::new();
    let mut text_start = 0;
    let mut pos = 0;

    while pos < bytes.len() {
        if bytes[pos] != b'<' {
            pos += 1;
            continue;
        }

        let next = bytes.get(pos + 1).copied();
        let tag_end = match next {
            Some(b'!') if input[pos..].starts_with("<!--") => {
                let close = input[pos + 4..].find("-->").ok_or(Unterminated)?;
                Some((pos + 4 + close + 3, None))
            }
            Some(b'!' | b'?') => {
                let close = find_tag_close(bytes, pos + 2).ok_or(Unterminated)?;
                Some((close + 1, None))
            }
            Some(b'/') if bytes.get(pos + 2).is_some_and(u8::is_ascii_alphabetic) => {
                let close = find_tag_close(bytes, pos + 2).ok_or(Unterminated)?;
                let name = tag_name(&input[pos + 2..close]);
                Some((close + 1, Some(Token::End { name })))
            }
            Some(byte) if byte.is_ascii_alphabetic() => {
                let close = find_tag_close(bytes, pos + 1).ok_or(Unterminated)?;
                Some((close + 1, Some(parse_start_tag(&input[pos + 1..close]))))
            }
            // A bare `<` is literal text.
            _ => None,
        };

        let Some((end, token)) = tag_end else {
            pos += 1;
            continue;
        };

        push_text(&mut tokens, &input[text_start..pos]);
        if let Some(token) = token {
            tokens.push(token);
        }
        pos = end;
        text_start = end;
    }

    push_text(&mut tokens, &input[text_start..]);
    Ok(tokens)
}

fn push_text(tokens: &mut Vec<Token>, raw: &str) {
    if raw.is_empty() {
        return;
    }
    let text = decode_entities(raw);
    if let Some(Token::Text(previous)) = tokens.last_mut() {
        previous.push_str(&text);
    } else {
        tokens.push(Token::Text(text));
    }
}

/// Index of the `>` closing a tag, skipping over quoted attribute values.
fn find_tag_close(bytes: &[u8], from: usize) -> Option<usize> {
    let mut quote: Option<u8> = None;
    for (offset, &byte) in bytes[from..].iter().enumerate() {
        match (quote, byte) {
            (Some(open), b) if b == open => quote = None,
            (Some(_), _) => {}
            (None, b'"' | b'\'') => quote = Some(byte),
            (None, b'>') => return Some(from + offset),
            (None, _) => {}
        }
    }
    None
}

fn tag_name(body: &str) -> String {
    body.split(|c: char| c.is_ascii_whitespace() || c == '/')
        .next()
        .unwrap_or("")
        .to_ascii_lowercase()
}

fn parse_start_tag(body: &str) -> Token {
    let body = body.trim_end();
    let (body, self_closing) = body
        .strip_suffix('/')
        .map_or((body, false), |stripped| (stripped, true));

    let name_len = body
        .find(|c: char| c.is_ascii_whitespace() || c == '/')
        .unwrap_or(body.len());
    let name = body[..name_len].to_ascii_lowercase();

    Token::Start {
        name,
        attrs: parse_attributes(&body[name_len..]),
        self_closing,
    }
}

fn parse_attributes(mut rest: &str) -> Vec<(String, String)> {
    let mut attrs = Vec::new();

    loop {
        rest = rest.trim_start_matches(|c: char| c.is_ascii_whitespace() || c == '/');
        if rest.is_empty() {
            break;
        }

        let name_len = rest
            .find(|c: char| c.is_ascii_whitespace() || c == '=' || c == '/')
            .unwrap_or(rest.len());
        let name = rest[..name_len].to_ascii_lowercase();
        rest = rest[name_len..].trim_start();

        let value = if let Some(after_eq) = rest.strip_prefix('=') {
            let after_eq = after_eq.trim_start();
            let (value, remainder) = match after_eq.chars().next() {
                Some(quote @ ('"' | '\'')) => {
                    let inner = &after_eq[1..];
                    let close = inner.find(quote).unwrap_or(inner.len());
                    let remainder = inner.get(close + 1..).unwrap_or("");
                    (&inner[..close], remainder)
                }
                _ => {
                    let close = after_eq
                        .find(|c: char| c.is_ascii_whitespace())
                        .unwrap_or(after_eq.len());
                    (&after_eq[..close], &after_eq[close..])
                }
            };
            rest = remainder;
            decode_entities(value)
        } else {
            String::new()
        };

        if !name.is_empty() {
            attrs.push((name, value));
        }
    }

    attrs
}

/// Decode named and numeric character references; unknown ones stay literal.
pub(crate) fn decode_entities(raw: &str) -> String {
    if !raw.contains('&') {
        return raw.to_string();
    }

    let mut out = String::with_capacity(raw.len());
    let mut rest = raw;

    while let Some(amp) = rest.find('&') {
        out.push_str(&rest[..amp]);
        rest = &rest[amp..];

        let decoded = rest
            .get(1..rest.len().min(12))
            .and_then(|window| window.find(';'))
            .and_then(|semi| {
                let entity = &rest[1..=semi];
                decode_entity(entity).map(|c| (c, semi + 2))
            });

        match decoded {
            Some((c, consumed)) => {
                out.push(c);
                rest = &rest[consumed..];
            }
            None => {
                out.push('&');
                rest = &rest[1..];
            }
        }
    }

    out.push_str(rest);
    out
}

fn decode_entity(entity: &str) -> Option<char> {
    if let Some(numeric) = entity.strip_prefix('#') {
        let code = if let Some(hex) = numeric.strip_prefix(['x', 'X']) {
            u32::from_str_radix(hex, 16).ok()?
        } else {
            numeric.parse::<u32>().ok()?
        };
        return char::from_u32(code);
    }

    let c = match entity {
        "amp" => '&',
        "lt" => '<',
        "gt" => '>',
        "quot" => '"',
        "apos" => '\'',
        "nbsp" => '\u{a0}',
        "ndash" => '\u{2013}',
        "mdash" => '\u{2014}',
        "hellip" => '\u{2026}',
        "lsquo" => '\u{2018}',
        "rsquo" => '\u{2019}',
        "ldquo" => '\u{201c}',
        "rdquo" => '\u{201d}',
        "copy" => '\u{a9}',
        _ => return None,
    };
    Some(c)
}

/// Escape text for element content.
pub(crate) fn escape_text(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            _ => out.push(c),
        }
    }
    out
}

/// Escape text for a double-quoted attribute value.
pub(crate) fn escape_attr(text: &str) -> String {
    escape_text(text).replace('"', "&quot;")
}
