//! Michelson concrete syntax parser.
//!
//! # Syntax
//!
//! ```text
//! parameter (or (nat %add) (unit %reset)) ;   # line comment
//! storage nat ;
//! code { UNPAIR ; /* block comment */ IF_LEFT { ADD } { DROP 2 ; PUSH nat 0 } ;
//!        NIL operation ; PAIR }
//! ```
//!
//! - Integers are decimal, optionally negative (`-42`)
//! - Strings are double-quoted with `\"`, `\\`, `\n`, `\r` and `\t` escapes
//! - Byte literals are `0x` followed by an even number of hex digits
//! - Annotations (`@var`, `:type`, `%field`) directly follow a primitive
//! - `{ ... ; ... }` builds a sequence, `( ... )` groups an application
//! - A top-level text of `;`-separated items parses to a sequence
//! - Names outside the primitive table are expanded as standard macros
//!   (`CMPEQ`, `IF_SOME`, `DIIP`, `PAPAIR`, ...), see [`macros`]

use crate::micheline::{MAX_NESTING, macros};
use crate::micheline::node::Node;
use crate::utils;
use crate::virtual_machine::errors::VMError;
use crate::virtual_machine::isa::Prim;
use num_bigint::BigInt;
use std::fmt::Write;

const LINE_COMMENT: char = '#';

#[derive(Clone, Debug, PartialEq)]
enum TokenKind {
    LBrace,
    RBrace,
    LParen,
    RParen,
    Semi,
    Int(BigInt),
    Str(String),
    Bytes(Vec<u8>),
    Ident(String),
    Annot(String),
}

#[derive(Clone, Debug)]
struct Token {
    kind: TokenKind,
    line: usize,
    column: usize,
}

fn syntax_error(line: usize, column: usize, message: impl Into<String>) -> VMError {
    VMError::SyntaxError {
        line,
        column,
        message: message.into(),
    }
}

fn is_annot_char(c: char) -> bool {
    c.is_ascii_alphanumeric() || matches!(c, '_' | '.' | '%' | '@')
}

/// Splits source text into tokens, tracking 1-based line and column.
struct Lexer<'a> {
    chars: std::iter::Peekable<std::str::Chars<'a>>,
    line: usize,
    column: usize,
}

impl<'a> Lexer<'a> {
    fn new(source: &'a str) -> Self {
        Self {
            chars: source.chars().peekable(),
            line: 1,
            column: 1,
        }
    }

    fn bump(&mut self) -> Option<char> {
        let c = self.chars.next()?;
        if c == '\n' {
            self.line += 1;
            self.column = 1;
        } else {
            self.column += 1;
        }
        Some(c)
    }

    fn peek(&mut self) -> Option<char> {
        self.chars.peek().copied()
    }

    fn take_while(&mut self, out: &mut String, pred: impl Fn(char) -> bool) {
        while let Some(c) = self.peek() {
            if !pred(c) {
                break;
            }
            out.push(c);
            self.bump();
        }
    }

    fn skip_trivia(&mut self) -> Result<(), VMError> {
        loop {
            match self.peek() {
                Some(c) if c.is_whitespace() => {
                    self.bump();
                }
                Some(LINE_COMMENT) => {
                    while let Some(c) = self.bump() {
                        if c == '\n' {
                            break;
                        }
                    }
                }
                Some('/') => {
                    let (line, column) = (self.line, self.column);
                    self.bump();
                    if self.peek() != Some('*') {
                        return Err(syntax_error(line, column, "unexpected character '/'"));
                    }
                    self.bump();
                    let mut prev = '\0';
                    loop {
                        match self.bump() {
                            Some('/') if prev == '*' => break,
                            Some(c) => prev = c,
                            None => {
                                return Err(syntax_error(line, column, "unterminated comment"));
                            }
                        }
                    }
                }
                _ => return Ok(()),
            }
        }
    }

    fn tokenize(mut self) -> Result<Vec<Token>, VMError> {
        let mut out = Vec::new();
        loop {
            self.skip_trivia()?;
            let (line, column) = (self.line, self.column);
            let Some(c) = self.peek() else {
                return Ok(out);
            };
            let kind = match c {
                '{' | '}' | '(' | ')' | ';' => {
                    self.bump();
                    match c {
                        '{' => TokenKind::LBrace,
                        '}' => TokenKind::RBrace,
                        '(' => TokenKind::LParen,
                        ')' => TokenKind::RParen,
                        _ => TokenKind::Semi,
                    }
                }
                '"' => self.string(line, column)?,
                '@' | ':' | '%' => {
                    let mut text = String::new();
                    text.push(c);
                    self.bump();
                    self.take_while(&mut text, is_annot_char);
                    TokenKind::Annot(text)
                }
                '-' | '0'..='9' => self.number(line, column)?,
                c if c.is_ascii_alphabetic() || c == '_' => {
                    let mut text = String::new();
                    self.take_while(&mut text, |c| c.is_ascii_alphanumeric() || c == '_');
                    TokenKind::Ident(text)
                }
                other => {
                    return Err(syntax_error(
                        line,
                        column,
                        format!("unexpected character '{}'", other.escape_default()),
                    ));
                }
            };
            out.push(Token { kind, line, column });
        }
    }

    fn string(&mut self, line: usize, column: usize) -> Result<TokenKind, VMError> {
        self.bump();
        let mut text = String::new();
        loop {
            match self.bump() {
                Some('"') => return Ok(TokenKind::Str(text)),
                Some('\\') => {
                    let escaped = match self.bump() {
                        Some('"') => '"',
                        Some('\\') => '\\',
                        Some('n') => '\n',
                        Some('r') => '\r',
                        Some('t') => '\t',
                        Some(other) => {
                            return Err(syntax_error(
                                self.line,
                                self.column - 1,
                                format!("invalid escape sequence '\\{}'", other.escape_default()),
                            ));
                        }
                        None => break,
                    };
                    text.push(escaped);
                }
                Some('\n') => {
                    return Err(syntax_error(line, column, "newline in string literal"));
                }
                Some(c) => text.push(c),
                None => break,
            }
        }
        Err(syntax_error(
            line,
            column,
            "unterminated string literal (missing closing quote)",
        ))
    }

    fn number(&mut self, line: usize, column: usize) -> Result<TokenKind, VMError> {
        let mut text = String::new();
        if self.peek() == Some('-') {
            text.push('-');
            self.bump();
        }
        self.take_while(&mut text, |c| c.is_ascii_alphanumeric() || c == '_');

        if let Some(hex) = text.strip_prefix("0x") {
            if hex.len() % 2 != 0 {
                return Err(syntax_error(line, column, "odd number of hex digits in bytes"));
            }
            let bytes = (0..hex.len())
                .step_by(2)
                .map(|i| u8::from_str_radix(&hex[i..i + 2], 16))
                .collect::<Result<Vec<u8>, _>>()
                .map_err(|_| syntax_error(line, column, format!("invalid bytes literal {}", text)))?;
            return Ok(TokenKind::Bytes(bytes));
        }

        let digits = text.strip_prefix('-').unwrap_or(&text);
        if digits.is_empty() || !digits.bytes().all(|b| b.is_ascii_digit()) {
            return Err(syntax_error(line, column, format!("invalid number {}", text)));
        }
        text.parse::<BigInt>()
            .map(TokenKind::Int)
            .map_err(|_| syntax_error(line, column, format!("invalid number {}", text)))
    }
}

/// Recursive-descent parser over the token list.
struct Parser {
    tokens: Vec<Token>,
    pos: usize,
    /// Sequence or primitive ancestors of the node being parsed.
    depth: usize,
    /// Open parentheses, which group without adding a level.
    groups: usize,
    end: (usize, usize),
}

impl Parser {
    fn peek(&self) -> Option<&Token> {
        self.tokens.get(self.pos)
    }

    fn next(&mut self) -> Option<Token> {
        let tok = self.tokens.get(self.pos).cloned();
        self.pos += 1;
        tok
    }

    fn position(&self) -> (usize, usize) {
        self.peek().map(|t| (t.line, t.column)).unwrap_or(self.end)
    }

    fn error_here(&self, message: impl Into<String>) -> VMError {
        let (line, column) = self.position();
        syntax_error(line, column, message)
    }

    /// Parses the children of the current node one level down.
    fn nested<T>(&mut self, f: impl FnOnce(&mut Self) -> Result<T, VMError>) -> Result<T, VMError> {
        self.depth += 1;
        let result = utils::stack::grow(|| f(self));
        self.depth -= 1;
        result
    }

    /// Rejects a node that would sit deeper than [`MAX_NESTING`].
    fn check_depth(&self) -> Result<(), VMError> {
        if self.depth > MAX_NESTING {
            return Err(self.error_here("nesting too deep"));
        }
        Ok(())
    }

    fn expect(&mut self, kind: TokenKind, what: &str) -> Result<(), VMError> {
        match self.peek() {
            Some(tok) if tok.kind == kind => {
                self.pos += 1;
                Ok(())
            }
            _ => Err(self.error_here(format!("expected {}", what))),
        }
    }

    fn resolve_prim(name: &str) -> Result<Prim, VMError> {
        name.parse()
    }

    /// `;`-separated applications up to `close` (or end of input), trailing `;` allowed.
    fn items(&mut self, close: Option<TokenKind>) -> Result<(Vec<Node>, bool), VMError> {
        let mut items = Vec::new();
        let mut saw_semi = false;
        loop {
            match self.peek().map(|t| &t.kind) {
                None => break,
                Some(kind) if Some(kind) == close.as_ref() => break,
                Some(TokenKind::Semi) => {
                    return Err(self.error_here("unexpected ';'"));
                }
                _ => {}
            }
            items.push(self.application()?);
            match self.peek().map(|t| &t.kind) {
                Some(TokenKind::Semi) => {
                    saw_semi = true;
                    self.pos += 1;
                }
                None => break,
                Some(kind) if Some(kind) == close.as_ref() => break,
                Some(_) => return Err(self.error_here("expected ';'")),
            }
        }
        Ok((items, saw_semi))
    }

    /// A primitive with annotations and arguments, or a single atom.
    fn application(&mut self) -> Result<Node, VMError> {
        self.check_depth()?;
        let Some(tok) = self.peek().cloned() else {
            return Err(self.error_here("unexpected end of input"));
        };
        let TokenKind::Ident(name) = tok.kind else {
            return self.atom();
        };
        self.pos += 1;
        let prim = Prim::from_name(&name);

        let mut annots = Vec::new();
        while let Some(Token {
            kind: TokenKind::Annot(a),
            ..
        }) = self.peek()
        {
            annots.push(a.clone());
            self.pos += 1;
        }

        let args = self.nested(Self::arguments)?;
        if let Some(prim) = prim {
            return Ok(Node::Prim { prim, args, annots });
        }
        match macros::expand(&name, args, annots) {
            Some(Ok(node)) => Ok(node),
            Some(Err(message)) => Err(syntax_error(tok.line, tok.column, message)),
            None => Err(VMError::UnknownPrimitive(name)),
        }
    }

    fn arguments(&mut self) -> Result<Vec<Node>, VMError> {
        let mut args = Vec::new();
        loop {
            match self.peek().map(|t| &t.kind) {
                Some(TokenKind::Ident(arg)) => {
                    self.check_depth()?;
                    let arg = Self::resolve_prim(&arg.clone())?;
                    self.pos += 1;
                    if let Some(Token {
                        kind: TokenKind::Annot(_),
                        ..
                    }) = self.peek()
                    {
                        return Err(self.error_here(
                            "annotations on an argument require parentheses",
                        ));
                    }
                    args.push(Node::prim(arg));
                }
                Some(TokenKind::Int(_))
                | Some(TokenKind::Str(_))
                | Some(TokenKind::Bytes(_))
                | Some(TokenKind::LBrace)
                | Some(TokenKind::LParen) => args.push(self.atom()?),
                Some(TokenKind::Annot(_)) => {
                    return Err(self.error_here("annotations must directly follow the primitive"));
                }
                _ => break,
            }
        }
        Ok(args)
    }

    fn atom(&mut self) -> Result<Node, VMError> {
        self.check_depth()?;
        let Some(tok) = self.next() else {
            return Err(syntax_error(self.end.0, self.end.1, "unexpected end of input"));
        };
        match tok.kind {
            TokenKind::Int(i) => Ok(Node::Int(i)),
            TokenKind::Str(s) => Ok(Node::String(s)),
            TokenKind::Bytes(b) => Ok(Node::Bytes(b)),
            TokenKind::Ident(name) => Ok(Node::prim(Self::resolve_prim(&name)?)),
            TokenKind::LBrace => {
                let (items, _) = self.nested(|p| p.items(Some(TokenKind::RBrace)))?;
                self.expect(TokenKind::RBrace, "'}'")?;
                Ok(Node::Seq(items))
            }
            TokenKind::LParen => {
                self.groups += 1;
                if self.groups > MAX_NESTING {
                    return Err(syntax_error(tok.line, tok.column, "too many nested parentheses"));
                }
                let node = utils::stack::grow(|| self.application());
                self.groups -= 1;
                let node = node?;
                self.expect(TokenKind::RParen, "')'")?;
                Ok(node)
            }
            other => Err(syntax_error(
                tok.line,
                tok.column,
                format!("unexpected {}", describe(&other)),
            )),
        }
    }
}

fn describe(kind: &TokenKind) -> &'static str {
    match kind {
        TokenKind::RBrace => "'}'",
        TokenKind::RParen => "')'",
        TokenKind::Semi => "';'",
        TokenKind::Annot(_) => "annotation",
        _ => "token",
    }
}

fn end_position(source: &str) -> (usize, usize) {
    let line = source.lines().count().max(1);
    let column = source.lines().last().map(|l| l.chars().count() + 1).unwrap_or(1);
    if source.ends_with('\n') {
        (line + 1, 1)
    } else {
        (line, column)
    }
}

/// Parses Michelson source text into a Micheline tree.
///
/// A single application without a trailing `;` parses to that node; several
/// `;`-separated items (a script's sections, or bare instructions) parse to a
/// sequence.
pub fn parse(source: &str) -> Result<Node, VMError> {
    let tokens = Lexer::new(source).tokenize()?;
    let mut parser = Parser {
        tokens,
        pos: 0,
        depth: 0,
        groups: 0,
        end: end_position(source),
    };
    let (mut items, saw_semi) = parser.items(None)?;
    if let Some(tok) = parser.peek() {
        return Err(syntax_error(
            tok.line,
            tok.column,
            format!("unexpected {}", describe(&tok.kind)),
        ));
    }
    let node = match items.pop() {
        Some(node) if items.is_empty() && !saw_semi => node,
        Some(last) => {
            items.push(last);
            Node::Seq(items)
        }
        None => Node::Seq(items),
    };
    // Top-level sequences and macro expansions add levels the parser did not see.
    if node.depth() > MAX_NESTING {
        return Err(syntax_error(parser.end.0, parser.end.1, "nesting too deep"));
    }
    Ok(node)
}

/// Formats a compiler-style diagnostic for a syntax error.
///
/// Other errors are rendered as a single `error:` line.
pub fn render_diagnostic(file: &str, source: &str, err: &VMError) -> String {
    let mut diag = String::new();
    let VMError::SyntaxError {
        line,
        column,
        message,
    } = err
    else {
        let _ = writeln!(diag, "error: {err}");
        return diag;
    };

    let _ = writeln!(diag, "error: {message}");
    let _ = writeln!(diag, " --> {file}:{line}:{column}");
    if let Some(raw_line) = source.lines().nth(line.saturating_sub(1)) {
        let line_text = raw_line.trim_end_matches('\r');
        let underline = " ".repeat(column.saturating_sub(1));
        let _ = writeln!(diag, "  |");
        let _ = writeln!(diag, "{:>4} | {}", line, line_text);
        let _ = writeln!(diag, "  | {}^", underline);
    }
    diag
}

#[cfg(test)]
mod tests {
    use super::*;

    fn p(prim: Prim) -> Node {
        Node::prim(prim)
    }

    fn pa(prim: Prim, args: Vec<Node>) -> Node {
        Node::prim_args(prim, args)
    }

    #[test]
    fn parse_int_and_negative() {
        assert_eq!(parse("42").unwrap(), Node::int(42));
        assert_eq!(parse("-7").unwrap(), Node::int(-7));
    }

    #[test]
    fn parse_string_escapes() {
        assert_eq!(
            parse(r#""a\"b\\c\nd""#).unwrap(),
            Node::string("a\"b\\c\nd")
        );
    }

    #[test]
    fn parse_bytes_literal() {
        assert_eq!(parse("0x00ff").unwrap(), Node::Bytes(vec![0, 255]));
        assert_eq!(parse("0x").unwrap(), Node::Bytes(vec![]));
    }

    #[test]
    fn parse_application_with_annotations() {
        let node = parse("pair (nat %a) (string :s %b)").unwrap();
        assert_eq!(
            node,
            pa(
                Prim::pair,
                vec![
                    p(Prim::nat).with_annots(vec!["%a".into()]),
                    p(Prim::string).with_annots(vec![":s".into(), "%b".into()]),
                ]
            )
        );
    }

    #[test]
    fn parse_sequence_with_trailing_semicolon() {
        let node = parse("{ DROP ; PUSH nat 1 ; }").unwrap();
        assert_eq!(
            node,
            Node::Seq(vec![p(Prim::DROP), pa(Prim::PUSH, vec![p(Prim::nat), Node::int(1)])])
        );
    }

    #[test]
    fn parse_script_sections() {
        let src = "parameter unit;\nstorage unit; # comment\ncode { CDR ; NIL operation ; PAIR };";
        let Node::Seq(sections) = parse(src).unwrap() else {
            panic!("expected a sequence");
        };
        assert_eq!(sections.len(), 3);
        assert_eq!(sections[0], pa(Prim::parameter, vec![p(Prim::unit)]));
        assert_eq!(sections[2].prim_of(), Some(Prim::code));
    }

    #[test]
    fn parse_block_comment() {
        assert_eq!(parse("{ /* skip */ UNIT }").unwrap(), Node::Seq(vec![p(Prim::UNIT)]));
    }

    #[test]
    fn unknown_primitive() {
        assert_eq!(
            parse("{ FROB }"),
            Err(VMError::UnknownPrimitive("FROB".to_string()))
        );
    }

    #[test]
    fn unterminated_string_position() {
        let err = parse("{\n  PUSH string \"abc }").unwrap_err();
        assert_eq!(
            err,
            VMError::SyntaxError {
                line: 2,
                column: 15,
                message: "unterminated string literal (missing closing quote)".to_string()
            }
        );
    }

    #[test]
    fn unbalanced_braces() {
        assert!(matches!(parse("{ UNIT"), Err(VMError::SyntaxError { .. })));
        assert!(matches!(parse("UNIT }"), Err(VMError::SyntaxError { .. })));
    }

    #[test]
    fn odd_hex_rejected() {
        assert!(matches!(parse("0x123"), Err(VMError::SyntaxError { .. })));
    }

    #[test]
    fn diagnostic_points_at_column() {
        let src = "{ PUSH nat 1 ;\n  ADD $ }";
        let err = parse(src).unwrap_err();
        let diag = render_diagnostic("test.tz", src, &err);
        assert!(diag.starts_with("error: unexpected character '$'"));
        assert!(diag.contains(" --> test.tz:2:7"));
        assert!(diag.contains("   2 |   ADD $ }"));
        assert!(diag.contains("  |       ^"));
    }
}
