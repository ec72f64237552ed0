//! Template lexer and parser
//!
//! Turns template text into a tree of [`Node`]s. Function names are resolved
//! against the [`Builtin`] table and their arity is checked here, so an
//! unknown or misused function is a parse error rather than a failure at
//! first call.

use serde_json::Number;

use super::funcs::Builtin;

/// A parsed template body.
#[derive(Debug, Clone, PartialEq)]
pub enum Node {
    Text(String),
    /// `{{ pipeline }}`: evaluate and print
    Action(Pipeline),
    If {
        cond: Pipeline,
        then: Vec<Node>,
        otherwise: Vec<Node>,
    },
    Range {
        pipe: Pipeline,
        body: Vec<Node>,
        otherwise: Vec<Node>,
    },
    With {
        pipe: Pipeline,
        body: Vec<Node>,
        otherwise: Vec<Node>,
    },
    /// `{{template "name" pipeline}}`
    Template { name: String, pipe: Option<Pipeline> },
}

/// Commands joined by `|`; each result is passed as the last argument of the next.
#[derive(Debug, Clone, PartialEq)]
pub struct Pipeline {
    pub commands: Vec<Command>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Command {
    Call { func: Builtin, args: Vec<Operand> },
    Operand(Operand),
}

#[derive(Debug, Clone, PartialEq)]
pub enum Operand {
    Str(String),
    Number(Number),
    Bool(bool),
    Nil,
    /// `.a.b` relative to dot; empty path is dot itself
    Field(Vec<String>),
    /// `$.a.b` relative to the execution root
    Root(Vec<String>),
    Nested(Box<Pipeline>),
}

/// Result of parsing one template source.
#[derive(Debug, Default)]
pub struct Parsed {
    pub root: Vec<Node>,
    /// `{{define}}` blocks, in source order
    pub defines: Vec<(String, Vec<Node>)>,
}

/// Parse template source text.
pub fn parse(src: &str) -> Result<Parsed, String> {
    let items = lex(src)?;
    let mut parser = Parser {
        items,
        pos: 0,
        defines: Vec::new(),
    };
    let (root, end) = parser.parse_list(true)?;
    match end {
        Terminator::Eof => Ok(Parsed {
            root,
            defines: parser.defines,
        }),
        Terminator::End(line) => Err(format!("line {}: unexpected {{{{end}}}}", line)),
        Terminator::Else(line, _) => Err(format!("line {}: unexpected {{{{else}}}}", line)),
    }
}

// ---------------------------------------------------------------------------
// Lexer
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq)]
enum Token {
    Ident(String),
    Str(String),
    Number(Number),
    Bool(bool),
    Nil,
    Field(Vec<String>),
    Root(Vec<String>),
    LParen,
    RParen,
    Pipe,
}

#[derive(Debug)]
enum Item {
    Text(String),
    Action { tokens: Vec<Token>, line: usize },
}

fn lex(src: &str) -> Result<Vec<Item>, String> {
    let bytes = src.as_bytes();
    let mut items = Vec::new();
    let mut pos = 0;
    let mut trim_next = false;

    loop {
        let Some(offset) = src[pos..].find("{{") else {
            push_text(&mut items, &src[pos..], trim_next, false);
            return Ok(items);
        };
        let start = pos + offset;
        let line = src[..start].matches('\n').count() + 1;

        let mut i = start + 2;
        let trim_left = bytes.get(i) == Some(&b'-')
            && bytes.get(i + 1).is_some_and(|b| b.is_ascii_whitespace());
        if trim_left {
            i += 1;
        }
        push_text(&mut items, &src[pos..start], trim_next, trim_left);

        i = skip_ws(bytes, i);
        let (tokens, end, trim_right) = if src[i..].starts_with("/*") {
            let close = src[i + 2..]
                .find("*/")
                .ok_or_else(|| format!("line {}: unclosed comment", line))?;
            let after = skip_ws(bytes, i + 2 + close + 2);
            let (end, trim_right) = close_delim(src, after)
                .ok_or_else(|| format!("line {}: comment not followed by }}}}", line))?;
            (None, end, trim_right)
        } else {
            let (tokens, end, trim_right) = lex_action(src, i, line)?;
            (Some(tokens), end, trim_right)
        };

        if let Some(tokens) = tokens {
            if tokens.is_empty() {
                return Err(format!("line {}: empty action", line));
            }
            items.push(Item::Action { tokens, line });
        }
        trim_next = trim_right;
        pos = end;
    }
}

fn push_text(items: &mut Vec<Item>, text: &str, trim_start: bool, trim_end: bool) {
    let mut text = text;
    if trim_start {
        text = text.trim_start();
    }
    if trim_end {
        text = text.trim_end();
    }
    if !text.is_empty() {
        items.push(Item::Text(text.to_string()));
    }
}

fn skip_ws(bytes: &[u8], mut i: usize) -> usize {
    while bytes.get(i).is_some_and(|b| b.is_ascii_whitespace()) {
        i += 1;
    }
    i
}

/// If `i` sits on `}}` or `-}}`, return the index after it and whether it trims.
fn close_delim(src: &str, i: usize) -> Option<(usize, bool)> {
    let rest = &src[i..];
    if rest.starts_with("-}}") {
        Some((i + 3, true))
    } else if rest.starts_with("}}") {
        Some((i + 2, false))
    } else {
        None
    }
}

fn lex_action(src: &str, mut i: usize, line: usize) -> Result<(Vec<Token>, usize, bool), String> {
    let bytes = src.as_bytes();
    let mut tokens = Vec::new();

    loop {
        let before = i;
        i = skip_ws(bytes, i);
        let spaced = i > before;
        let Some(&b) = bytes.get(i) else {
            return Err(format!("line {}: unclosed action", line));
        };

        // "-}}" only trims when separated from the previous token
        if b == b'-' && src[i..].starts_with("-}}") && (spaced || tokens.is_empty()) {
            return Ok((tokens, i + 3, true));
        }
        if src[i..].starts_with("}}") {
            return Ok((tokens, i + 2, false));
        }

        match b {
            b'(' => {
                tokens.push(Token::LParen);
                i += 1;
            }
            b')' => {
                tokens.push(Token::RParen);
                i += 1;
            }
            b'|' => {
                tokens.push(Token::Pipe);
                i += 1;
            }
            b'"' => {
                let (s, next) = lex_quoted(src, i + 1, line)?;
                tokens.push(Token::Str(s));
                i = next;
            }
            b'`' => {
                let close = src[i + 1..]
                    .find('`')
                    .ok_or_else(|| format!("line {}: unterminated raw string", line))?;
                tokens.push(Token::Str(src[i + 1..i + 1 + close].to_string()));
                i += close + 2;
            }
            b'.' => {
                let (path, next) = lex_path(src, i);
                tokens.push(Token::Field(path));
                i = next;
            }
            b'$' => {
                let (path, next) = if bytes.get(i + 1) == Some(&b'.') {
                    lex_path(src, i + 1)
                } else {
                    (Vec::new(), i + 1)
                };
                tokens.push(Token::Root(path));
                i = next;
            }
            b'-' | b'0'..=b'9' => {
                let end = scan_while(bytes, i + 1, |c| c.is_ascii_digit() || c == b'.');
                let literal = &src[i..end];
                tokens.push(Token::Number(parse_number(literal).ok_or_else(|| {
                    format!("line {}: bad number syntax: {}", line, literal)
                })?));
                i = end;
            }
            c if c.is_ascii_alphabetic() || c == b'_' => {
                let end = scan_while(bytes, i, |c| c.is_ascii_alphanumeric() || c == b'_');
                let word = &src[i..end];
                tokens.push(match word {
                    "true" => Token::Bool(true),
                    "false" => Token::Bool(false),
                    "nil" => Token::Nil,
                    _ => Token::Ident(word.to_string()),
                });
                i = end;
            }
            _ => {
                let ch = src[i..].chars().next().unwrap_or('?');
                return Err(format!("line {}: unexpected character '{}' in action", line, ch));
            }
        }
    }
}

fn scan_while(bytes: &[u8], mut i: usize, accept: impl Fn(u8) -> bool) -> usize {
    while bytes.get(i).is_some_and(|&c| accept(c)) {
        i += 1;
    }
    i
}

fn lex_quoted(src: &str, start: usize, line: usize) -> Result<(String, usize), String> {
    let mut out = String::new();
    let mut chars = src[start..].char_indices();
    while let Some((offset, ch)) = chars.next() {
        match ch {
            '"' => return Ok((out, start + offset + 1)),
            '\\' => match chars.next() {
                Some((_, 'n')) => out.push('\n'),
                Some((_, 't')) => out.push('\t'),
                Some((_, '"')) => out.push('"'),
                Some((_, '\\')) => out.push('\\'),
                Some((_, other)) => {
                    return Err(format!("line {}: unknown escape '\\{}'", line, other))
                }
                None => break,
            },
            '\n' => break,
            _ => out.push(ch),
        }
    }
    Err(format!("line {}: unterminated quoted string", line))
}

/// Lex `.a.b.c` starting at the first dot.
fn lex_path(src: &str, mut i: usize) -> (Vec<String>, usize) {
    let bytes = src.as_bytes();
    let mut path = Vec::new();
    while bytes.get(i) == Some(&b'.') {
        let end = scan_while(bytes, i + 1, |c| c.is_ascii_alphanumeric() || c == b'_');
        if end == i + 1 {
            // a lone dot
            i += 1;
            break;
        }
        path.push(src[i + 1..end].to_string());
        i = end;
    }
    (path, i)
}

fn parse_number(literal: &str) -> Option<Number> {
    if literal.contains('.') {
        literal.parse::<f64>().ok().and_then(Number::from_f64)
    } else {
        literal.parse::<i64>().ok().map(Number::from)
    }
}

// ---------------------------------------------------------------------------
// Parser
// ---------------------------------------------------------------------------

enum Terminator {
    Eof,
    End(usize),
    Else(usize, Vec<Token>),
}

struct Parser {
    items: Vec<Item>,
    pos: usize,
    defines: Vec<(String, Vec<Node>)>,
}

impl Parser {
    fn next_item(&mut self) -> Option<Item> {
        if self.pos < self.items.len() {
            let item = std::mem::replace(&mut self.items[self.pos], Item::Text(String::new()));
            self.pos += 1;
            Some(item)
        } else {
            None
        }
    }

    fn parse_list(&mut self, top: bool) -> Result<(Vec<Node>, Terminator), String> {
        let mut nodes = Vec::new();
        while let Some(item) = self.next_item() {
            let (tokens, line) = match item {
                Item::Text(text) => {
                    nodes.push(Node::Text(text));
                    continue;
                }
                Item::Action { tokens, line } => (tokens, line),
            };

            let keyword = match tokens.first() {
                Some(Token::Ident(word)) => word.as_str(),
                _ => "",
            };
            let rest = &tokens[1..];
            match keyword {
                "end" => {
                    expect_empty(rest, "end", line)?;
                    return Ok((nodes, Terminator::End(line)));
                }
                "else" => return Ok((nodes, Terminator::Else(line, rest.to_vec()))),
                "if" => nodes.push(self.parse_if(rest, line)?),
                "range" | "with" => nodes.push(self.parse_block(keyword, rest, line)?),
                "define" => {
                    if !top {
                        return Err(format!("line {}: define must be at top level", line));
                    }
                    let name = match rest {
                        [Token::Str(name)] => name.clone(),
                        _ => return Err(format!("line {}: define needs one quoted name", line)),
                    };
                    let (body, end) = self.parse_list(false)?;
                    self.expect_end(end, "define", line)?;
                    self.defines.push((name, body));
                }
                "template" => {
                    let (name, pipe_tokens) = match rest {
                        [Token::Str(name), pipe @ ..] => (name.clone(), pipe),
                        _ => return Err(format!("line {}: template needs a quoted name", line)),
                    };
                    let pipe = if pipe_tokens.is_empty() {
                        None
                    } else {
                        Some(parse_pipeline(pipe_tokens, line)?)
                    };
                    nodes.push(Node::Template { name, pipe });
                }
                _ => nodes.push(Node::Action(parse_pipeline(&tokens, line)?)),
            }
        }
        Ok((nodes, Terminator::Eof))
    }

    fn parse_if(&mut self, cond_tokens: &[Token], line: usize) -> Result<Node, String> {
        let cond = parse_pipeline(cond_tokens, line)?;
        let (then, end) = self.parse_list(false)?;
        let otherwise = match end {
            Terminator::End(_) => Vec::new(),
            Terminator::Else(else_line, tokens) => match tokens.split_first() {
                None => {
                    let (otherwise, end) = self.parse_list(false)?;
                    self.expect_end(end, "if", line)?;
                    otherwise
                }
                // {{else if ...}} shares the closing {{end}}
                Some((Token::Ident(word), cond)) if word == "if" => {
                    vec![self.parse_if(cond, else_line)?]
                }
                Some(_) => return Err(format!("line {}: unexpected tokens after else", else_line)),
            },
            Terminator::Eof => return Err(format!("line {}: unclosed if", line)),
        };
        Ok(Node::If {
            cond,
            then,
            otherwise,
        })
    }

    fn parse_block(&mut self, keyword: &str, tokens: &[Token], line: usize) -> Result<Node, String> {
        let pipe = parse_pipeline(tokens, line)?;
        let (body, end) = self.parse_list(false)?;
        let otherwise = match end {
            Terminator::End(_) => Vec::new(),
            Terminator::Else(else_line, tokens) => {
                expect_empty(&tokens, "else", else_line)?;
                let (otherwise, end) = self.parse_list(false)?;
                self.expect_end(end, keyword, line)?;
                otherwise
            }
            Terminator::Eof => return Err(format!("line {}: unclosed {}", line, keyword)),
        };
        Ok(if keyword == "range" {
            Node::Range {
                pipe,
                body,
                otherwise,
            }
        } else {
            Node::With {
                pipe,
                body,
                otherwise,
            }
        })
    }

    fn expect_end(&self, end: Terminator, keyword: &str, line: usize) -> Result<(), String> {
        match end {
            Terminator::End(_) => Ok(()),
            Terminator::Else(else_line, _) => {
                Err(format!("line {}: unexpected else in {}", else_line, keyword))
            }
            Terminator::Eof => Err(format!("line {}: unclosed {}", line, keyword)),
        }
    }
}

fn expect_empty(tokens: &[Token], keyword: &str, line: usize) -> Result<(), String> {
    if tokens.is_empty() {
        Ok(())
    } else {
        Err(format!("line {}: unexpected arguments to {}", line, keyword))
    }
}

fn parse_pipeline(tokens: &[Token], line: usize) -> Result<Pipeline, String> {
    if tokens.is_empty() {
        return Err(format!("line {}: missing value", line));
    }

    let mut segments: Vec<&[Token]> = Vec::new();
    let mut depth = 0usize;
    let mut start = 0;
    for (i, token) in tokens.iter().enumerate() {
        match token {
            Token::LParen => depth += 1,
            Token::RParen => {
                depth = depth
                    .checked_sub(1)
                    .ok_or_else(|| format!("line {}: unexpected )", line))?
            }
            Token::Pipe if depth == 0 => {
                segments.push(&tokens[start..i]);
                start = i + 1;
            }
            _ => {}
        }
    }
    if depth != 0 {
        return Err(format!("line {}: unclosed (", line));
    }
    segments.push(&tokens[start..]);

    let mut commands = Vec::with_capacity(segments.len());
    for (idx, segment) in segments.into_iter().enumerate() {
        let piped = idx > 0;
        commands.push(parse_command(segment, piped, line)?);
    }
    Ok(Pipeline { commands })
}

fn parse_command(tokens: &[Token], piped: bool, line: usize) -> Result<Command, String> {
    match tokens.split_first() {
        None => Err(format!("line {}: empty command in pipeline", line)),
        Some((Token::Ident(name), rest)) => {
            let func = Builtin::lookup(name)
                .ok_or_else(|| format!("line {}: function \"{}\" not defined", line, name))?;
            let args = parse_operands(rest, line)?;
            let given = args.len() + usize::from(piped);
            if given != func.arity() {
                return Err(format!(
                    "line {}: wrong number of args for {}: want {} got {}",
                    line,
                    func.name(),
                    func.arity(),
                    given
                ));
            }
            Ok(Command::Call { func, args })
        }
        Some(_) => {
            if piped {
                return Err(format!("line {}: non-function in pipeline", line));
            }
            let mut operands = parse_operands(tokens, line)?;
            if operands.len() != 1 {
                return Err(format!("line {}: can't give argument to non-function", line));
            }
            Ok(Command::Operand(operands.remove(0)))
        }
    }
}

fn parse_operands(tokens: &[Token], line: usize) -> Result<Vec<Operand>, String> {
    let mut operands = Vec::new();
    let mut i = 0;
    while i < tokens.len() {
        let operand = match &tokens[i] {
            Token::Str(s) => Operand::Str(s.clone()),
            Token::Number(n) => Operand::Number(n.clone()),
            Token::Bool(b) => Operand::Bool(*b),
            Token::Nil => Operand::Nil,
            Token::Field(path) => Operand::Field(path.clone()),
            Token::Root(path) => Operand::Root(path.clone()),
            Token::LParen => {
                let close = matching_paren(tokens, i)
                    .ok_or_else(|| format!("line {}: unclosed (", line))?;
                let inner = parse_pipeline(&tokens[i + 1..close], line)?;
                i = close;
                Operand::Nested(Box::new(inner))
            }
            Token::Ident(name) => {
                // niladic functions may appear as arguments
                let func = Builtin::lookup(name)
                    .ok_or_else(|| format!("line {}: function \"{}\" not defined", line, name))?;
                if func.arity() != 0 {
                    return Err(format!(
                        "line {}: {} needs arguments; wrap the call in parentheses",
                        line, name
                    ));
                }
                Operand::Nested(Box::new(Pipeline {
                    commands: vec![Command::Call {
                        func,
                        args: Vec::new(),
                    }],
                }))
            }
            Token::RParen => return Err(format!("line {}: unexpected )", line)),
            Token::Pipe => return Err(format!("line {}: unexpected |", line)),
        };
        operands.push(operand);
        i += 1;
    }
    Ok(operands)
}

fn matching_paren(tokens: &[Token], open: usize) -> Option<usize> {
    let mut depth = 0usize;
    for (i, token) in tokens.iter().enumerate().skip(open) {
        match token {
            Token::LParen => depth += 1,
            Token::RParen => {
                depth -= 1;
                if depth == 0 {
                    return Some(i);
                }
            }
            _ => {}
        }
    }
    None
}
