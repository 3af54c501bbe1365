//! Source-level preprocessing of statements.
//!
//! Parameters are written `~name` and are not part of the SPARQL grammar. Before parsing, every
//! parameter is turned into a reserved variable that the evaluator pre-binds with the parameter
//! value. Ground data blocks (`INSERT DATA`, `DELETE DATA`) cannot hold variables, so statements
//! with parameters rewrite them into their templated form with an empty `WHERE` clause.
//! `INSERT { ... }` and `DELETE { ... }` templates written without a `WHERE` clause get an empty
//! one as well.
//!
//! The preprocessing also declares the prefixes of the namespace manager that the statement uses
//! without declaring them.

use sparqlite_model::NamespaceManager;

/// Prefix of the variables standing in for `~name` parameters.
pub const PARAMETER_VARIABLE_PREFIX: &str = "__param_";

/// Returns the parameter name if `variable` stands in for a parameter.
pub fn parameter_name(variable: &str) -> Option<&str> {
    variable.strip_prefix(PARAMETER_VARIABLE_PREFIX)
}

/// The result of [`preprocess`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PreprocessedStatement {
    /// Plain SPARQL text.
    pub text: String,
    /// The parameter names, in order of first appearance.
    pub parameters: Vec<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum TokenKind {
    Whitespace,
    Comment,
    String,
    Iri,
    Word,
    Parameter,
    Punctuation,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum BlockKind {
    /// A ground data block rewritten into a template.
    Data,
    /// A template that may lack its `WHERE` clause.
    Template,
}

#[derive(Debug, Clone, Copy)]
struct Token<'a> {
    kind: TokenKind,
    text: &'a str,
}

impl Token<'_> {
    fn is_trivia(&self) -> bool {
        matches!(self.kind, TokenKind::Whitespace | TokenKind::Comment)
    }

    fn is_keyword(&self, keyword: &str) -> bool {
        self.kind == TokenKind::Word && self.text.eq_ignore_ascii_case(keyword)
    }

    fn is_punctuation(&self, punctuation: &str) -> bool {
        self.kind == TokenKind::Punctuation && self.text == punctuation
    }
}

/// Rewrites parameters and declares missing prefixes.
pub fn preprocess(text: &str, namespaces: &NamespaceManager) -> PreprocessedStatement {
    let tokens = tokenize(text);
    let has_parameters = tokens.iter().any(|t| t.kind == TokenKind::Parameter);

    let mut parameters = Vec::new();
    let mut body = String::with_capacity(text.len());
    // The update block being tracked and its brace depth.
    let mut block: Option<(BlockKind, usize)> = None;
    let mut i = 0;
    while i < tokens.len() {
        let token = tokens[i];
        match token.kind {
            TokenKind::Parameter => {
                let name = &token.text[1..];
                if !parameters.iter().any(|p| p == name) {
                    parameters.push(name.to_owned());
                }
                body.push('?');
                body.push_str(PARAMETER_VARIABLE_PREFIX);
                body.push_str(name);
            }
            TokenKind::Word
                if block.is_none()
                    && (is_keyword_at(&tokens, i, "INSERT")
                        || is_keyword_at(&tokens, i, "DELETE")) =>
            {
                body.push_str(token.text);
                if let Some(next) = next_significant(&tokens, i + 1) {
                    if is_keyword_at(&tokens, next, "DATA") {
                        if has_parameters {
                            for trivia in &tokens[i + 1..next] {
                                body.push_str(trivia.text);
                            }
                            block = Some((BlockKind::Data, 0));
                            i = next;
                        }
                    } else if tokens[next].is_punctuation("{") {
                        block = Some((BlockKind::Template, 0));
                    }
                }
            }
            TokenKind::Punctuation if token.text == "{" => {
                if let Some((_, depth)) = &mut block {
                    *depth += 1;
                }
                body.push('{');
            }
            TokenKind::Punctuation if token.text == "}" => {
                body.push('}');
                if let Some((kind, depth)) = &mut block {
                    *depth = depth.saturating_sub(1);
                    if *depth == 0 {
                        let needs_where = match kind {
                            BlockKind::Data => true,
                            BlockKind::Template => {
                                next_significant(&tokens, i + 1).map_or(true, |next| {
                                    !["WHERE", "INSERT", "USING"]
                                        .iter()
                                        .any(|keyword| is_keyword_at(&tokens, next, keyword))
                                })
                            }
                        };
                        if needs_where {
                            body.push_str(" WHERE {}");
                        }
                        block = None;
                    }
                }
            }
            _ => body.push_str(token.text),
        }
        i += 1;
    }

    let declared = declared_prefixes(&tokens);
    let mut prologue = String::new();
    for (prefix, namespace) in namespaces.iter() {
        if !declared.iter().any(|d| *d == prefix) {
            prologue.push_str("PREFIX ");
            prologue.push_str(prefix);
            prologue.push_str(": <");
            prologue.push_str(namespace);
            prologue.push_str(">\n");
        }
    }
    prologue.push_str(&body);

    PreprocessedStatement {
        text: prologue,
        parameters,
    }
}

/// Whether the word at `i` is `keyword` rather than part of a variable or a prefixed name.
fn is_keyword_at(tokens: &[Token<'_>], i: usize, keyword: &str) -> bool {
    if !tokens[i].is_keyword(keyword) {
        return false;
    }
    let glued_before = i.checked_sub(1).is_some_and(|before| {
        ["?", "$", ":", "@", "-"]
            .iter()
            .any(|p| tokens[before].is_punctuation(p))
    });
    let glued_after = tokens.get(i + 1).is_some_and(|after| after.is_punctuation(":"));
    !glued_before && !glued_after
}

fn next_significant(tokens: &[Token<'_>], from: usize) -> Option<usize> {
    (from..tokens.len()).find(|i| !tokens[*i].is_trivia())
}

/// Collects the prefixes declared with `PREFIX name: <iri>`.
fn declared_prefixes<'a>(tokens: &[Token<'a>]) -> Vec<&'a str> {
    let mut declared = Vec::new();
    for (i, token) in tokens.iter().enumerate() {
        if !token.is_keyword("PREFIX") {
            continue;
        }
        let Some(next) = next_significant(tokens, i + 1) else {
            continue;
        };
        if tokens[next].is_punctuation(":") {
            declared.push("");
        } else if tokens[next].kind == TokenKind::Word
            && tokens.get(next + 1).is_some_and(|t| t.is_punctuation(":"))
        {
            declared.push(tokens[next].text);
        }
    }
    declared
}

fn tokenize(text: &str) -> Vec<Token<'_>> {
    let mut tokens = Vec::new();
    let mut position = 0;
    while let Some(c) = text[position..].chars().next() {
        let rest = &text[position..];
        let (kind, len) = if c.is_whitespace() {
            let len = rest
                .find(|c: char| !c.is_whitespace())
                .unwrap_or(rest.len());
            (TokenKind::Whitespace, len)
        } else if c == '#' {
            (TokenKind::Comment, rest.find('\n').unwrap_or(rest.len()))
        } else if c == '"' || c == '\'' {
            (TokenKind::String, string_len(rest, c))
        } else if c == '<' {
            match iri_len(rest) {
                Some(len) => (TokenKind::Iri, len),
                None => (TokenKind::Punctuation, 1),
            }
        } else if c == '~' && name_len(&rest[1..]) > 0 {
            (TokenKind::Parameter, 1 + name_len(&rest[1..]))
        } else if is_name_char(c) {
            (TokenKind::Word, name_len(rest))
        } else {
            (TokenKind::Punctuation, c.len_utf8())
        };
        tokens.push(Token {
            kind,
            text: &rest[..len],
        });
        position += len;
    }
    tokens
}

fn is_name_char(c: char) -> bool {
    c.is_alphanumeric() || c == '_'
}

fn name_len(text: &str) -> usize {
    text.find(|c: char| !is_name_char(c)).unwrap_or(text.len())
}

/// Length of the string literal at the start of `text`, including its quotes.
///
/// An unterminated literal extends to the end of the text (or line for short literals) and is
/// left for the parser to report.
fn string_len(text: &str, quote: char) -> usize {
    let long_quote: String = [quote; 3].iter().collect();
    let (is_long, start) = if text.starts_with(&long_quote) {
        (true, 3)
    } else {
        (false, 1)
    };
    let mut chars = text[start..].char_indices();
    while let Some((i, c)) = chars.next() {
        match c {
            '\\' => {
                chars.next();
            }
            '\n' | '\r' if !is_long => return start + i,
            c if c == quote => {
                if !is_long {
                    return start + i + 1;
                }
                if text[start + i..].starts_with(&long_quote) {
                    return start + i + 3;
                }
            }
            _ => (),
        }
    }
    text.len()
}

/// Length of the IRI reference at the start of `text`, or `None` if `<` is an operator.
fn iri_len(text: &str) -> Option<usize> {
    for (i, c) in text.char_indices().skip(1) {
        match c {
            '>' => return Some(i + 1),
            '<' | '"' | '{' | '}' | '|' | '^' | '`' | '\\' => return None,
            c if c.is_whitespace() || c.is_control() => return None,
            _ => (),
        }
    }
    None
}
