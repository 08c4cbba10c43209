/*
Copyright 2025 The zedc Authors

Licensed under the Apache License, Version 2.0 (the "License");
you may not use this file except in compliance with the License.
You may obtain a copy of the License at

    http://www.apache.org/licenses/LICENSE-2.0

Unless required by applicable law or agreed to in writing, software
distributed under the License is distributed on an "AS IS" BASIS,
WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
See the License for the specific language governing permissions and
limitations under the License.
*/

/// Source span of a token, byte offsets plus 1-based line/column of the
/// first character.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Span {
    pub start: usize,
    pub end: usize,
    pub line: usize,
    pub col: usize,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TokenKind {
    // punctuation
    LParen,
    RParen,
    LBrace,
    RBrace,
    LBracket,
    RBracket,
    Comma,
    Semicolon,
    Colon,
    Question,
    Ellipsis,
    Dot,
    Arrow,
    // operators
    Plus,
    Minus,
    Star,
    Slash,
    Percent,
    Inc,
    Dec,
    Amp,
    Pipe,
    Caret,
    Tilde,
    Not,
    AndAnd,
    OrOr,
    Shl,
    Shr,
    Lt,
    LtEq,
    Gt,
    GtEq,
    EqEq,
    NotEq,
    Assign,
    PlusAssign,
    MinusAssign,
    StarAssign,
    SlashAssign,
    PercentAssign,
    ShlAssign,
    ShrAssign,
    AmpAssign,
    PipeAssign,
    CaretAssign,
    // keywords
    KwAuto,
    KwBreak,
    KwCase,
    KwChar,
    KwConst,
    KwContinue,
    KwDefault,
    KwDo,
    KwDouble,
    KwElse,
    KwEnum,
    KwExtern,
    KwFloat,
    KwFor,
    KwGoto,
    KwIf,
    KwInline,
    KwInt,
    KwInt128,
    KwLong,
    KwRegister,
    KwRestrict,
    KwReturn,
    KwShort,
    KwSigned,
    KwSizeof,
    KwStatic,
    KwStruct,
    KwSwitch,
    KwTypedef,
    KwUnion,
    KwUnsigned,
    KwVoid,
    KwVolatile,
    KwWhile,
    KwAttribute,
    KwAsm,
    // literals and names
    Ident,
    Number,
    StrLit,
    CharLit,
    // ignored by the parser
    Whitespace,
    Tab,
    Newline,
    Comment,
    DocComment,
    Preproc,
    // terminal
    Eof,
    Invalid,
}

impl TokenKind {
    /// Token kinds the parser skips over when reading the next token.
    pub fn is_ignored(&self) -> bool {
        matches!(
            self,
            TokenKind::Whitespace
                | TokenKind::Tab
                | TokenKind::Newline
                | TokenKind::Comment
                | TokenKind::DocComment
                | TokenKind::Preproc
        )
    }

}

/// A single lexed token. The lexeme text travels with the token so that AST
/// leaf nodes can carry it into the later passes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Token {
    pub kind: TokenKind,
    pub text: String,
    pub span: Span,
}

impl Token {
    fn new(kind: TokenKind, text: &str, span: Span) -> Self {
        Token {
            kind,
            text: text.to_string(),
            span,
        }
    }
}

fn keyword_kind(word: &str) -> Option<TokenKind> {
    let kind = match word {
        "auto" => TokenKind::KwAuto,
        "break" => TokenKind::KwBreak,
        "case" => TokenKind::KwCase,
        "char" => TokenKind::KwChar,
        "const" => TokenKind::KwConst,
        "continue" => TokenKind::KwContinue,
        "default" => TokenKind::KwDefault,
        "do" => TokenKind::KwDo,
        "double" => TokenKind::KwDouble,
        "else" => TokenKind::KwElse,
        "enum" => TokenKind::KwEnum,
        "extern" => TokenKind::KwExtern,
        "float" => TokenKind::KwFloat,
        "for" => TokenKind::KwFor,
        "goto" => TokenKind::KwGoto,
        "if" => TokenKind::KwIf,
        "inline" => TokenKind::KwInline,
        "int" => TokenKind::KwInt,
        "__int128" => TokenKind::KwInt128,
        "long" => TokenKind::KwLong,
        "register" => TokenKind::KwRegister,
        "restrict" => TokenKind::KwRestrict,
        "return" => TokenKind::KwReturn,
        "short" => TokenKind::KwShort,
        "signed" => TokenKind::KwSigned,
        "sizeof" => TokenKind::KwSizeof,
        "static" => TokenKind::KwStatic,
        "struct" => TokenKind::KwStruct,
        "switch" => TokenKind::KwSwitch,
        "typedef" => TokenKind::KwTypedef,
        "union" => TokenKind::KwUnion,
        "unsigned" => TokenKind::KwUnsigned,
        "void" => TokenKind::KwVoid,
        "volatile" => TokenKind::KwVolatile,
        "while" => TokenKind::KwWhile,
        "__attribute__" => TokenKind::KwAttribute,
        "asm" => TokenKind::KwAsm,
        _ => return None,
    };
    Some(kind)
}

struct Scanner<'src> {
    src: &'src str,
    bytes: &'src [u8],
    pos: usize,
    line: usize,
    col: usize,
}

impl<'src> Scanner<'src> {
    fn new(src: &'src str) -> Self {
        Scanner {
            src,
            bytes: src.as_bytes(),
            pos: 0,
            line: 1,
            col: 1,
        }
    }

    fn peek(&self) -> Option<u8> {
        self.bytes.get(self.pos).copied()
    }

    fn peek_at(&self, off: usize) -> Option<u8> {
        self.bytes.get(self.pos + off).copied()
    }

    fn advance(&mut self) -> Option<u8> {
        let b = self.peek()?;
        self.pos += 1;
        if b == b'\n' {
            self.line += 1;
            self.col = 1;
        } else {
            self.col += 1;
        }
        Some(b)
    }

    fn advance_by(&mut self, n: usize) {
        for _ in 0..n {
            self.advance();
        }
    }

    fn starts_with(&self, pat: &str) -> bool {
        self.src[self.pos..].starts_with(pat)
    }

    fn token(&mut self, kind: TokenKind, start: usize, line: usize, col: usize) -> Token {
        Token::new(
            kind,
            &self.src[start..self.pos],
            Span {
                start,
                end: self.pos,
                line,
                col,
            },
        )
    }
}

/// Lex a complete source text into a token sequence terminated by an `Eof`
/// token. Unknown characters become `Invalid` tokens; the parser reports
/// them when it reaches them, so lexing itself cannot fail.
pub fn lex(source: &str) -> Vec<Token> {
    let mut sc = Scanner::new(source);
    let mut tokens = Vec::new();

    while let Some(b) = sc.peek() {
        let start = sc.pos;
        let (line, col) = (sc.line, sc.col);

        let kind = match b {
            b'\n' => {
                sc.advance();
                TokenKind::Newline
            }
            b'\t' => {
                sc.advance();
                TokenKind::Tab
            }
            b' ' | b'\r' | 0x0b | 0x0c => {
                while matches!(sc.peek(), Some(b' ') | Some(b'\r') | Some(0x0b) | Some(0x0c)) {
                    sc.advance();
                }
                TokenKind::Whitespace
            }
            b'#' if sc.col == 1 => {
                while let Some(c) = sc.peek() {
                    if c == b'\n' {
                        break;
                    }
                    sc.advance();
                }
                TokenKind::Preproc
            }
            b'/' if sc.peek_at(1) == Some(b'/') => {
                let doc = sc.starts_with("///");
                while let Some(c) = sc.peek() {
                    if c == b'\n' {
                        break;
                    }
                    sc.advance();
                }
                if doc {
                    TokenKind::DocComment
                } else {
                    TokenKind::Comment
                }
            }
            b'/' if sc.peek_at(1) == Some(b'*') => {
                let doc = sc.starts_with("/**") && !sc.starts_with("/**/");
                sc.advance_by(2);
                loop {
                    match sc.peek() {
                        None => break,
                        Some(b'*') if sc.peek_at(1) == Some(b'/') => {
                            sc.advance_by(2);
                            break;
                        }
                        _ => {
                            sc.advance();
                        }
                    }
                }
                if doc {
                    TokenKind::DocComment
                } else {
                    TokenKind::Comment
                }
            }
            b'0'..=b'9' => {
                if b == b'0' && matches!(sc.peek_at(1), Some(b'x') | Some(b'X')) {
                    sc.advance_by(2);
                }
                while matches!(sc.peek(), Some(c) if c.is_ascii_alphanumeric()) {
                    sc.advance();
                }
                TokenKind::Number
            }
            b'a'..=b'z' | b'A'..=b'Z' | b'_' => {
                while matches!(sc.peek(), Some(c) if c.is_ascii_alphanumeric() || c == b'_') {
                    sc.advance();
                }
                keyword_kind(&sc.src[start..sc.pos]).unwrap_or(TokenKind::Ident)
            }
            b'"' => {
                sc.advance();
                loop {
                    match sc.peek() {
                        None | Some(b'\n') => break,
                        Some(b'\\') => sc.advance_by(2),
                        Some(b'"') => {
                            sc.advance();
                            break;
                        }
                        _ => {
                            sc.advance();
                        }
                    }
                }
                TokenKind::StrLit
            }
            b'\'' => {
                sc.advance();
                loop {
                    match sc.peek() {
                        None | Some(b'\n') => break,
                        Some(b'\\') => sc.advance_by(2),
                        Some(b'\'') => {
                            sc.advance();
                            break;
                        }
                        _ => {
                            sc.advance();
                        }
                    }
                }
                TokenKind::CharLit
            }
            _ => {
                let kind = match_operator(&mut sc);
                match kind {
                    Some(k) => k,
                    None => {
                        sc.advance();
                        TokenKind::Invalid
                    }
                }
            }
        };

        tokens.push(sc.token(kind, start, line, col));
    }

    let eof_span = Span {
        start: sc.pos,
        end: sc.pos,
        line: sc.line,
        col: sc.col,
    };
    tokens.push(Token::new(TokenKind::Eof, "", eof_span));
    tokens
}

/// Longest-match operator and punctuation recognition.
fn match_operator(sc: &mut Scanner) -> Option<TokenKind> {
    const TABLE: &[(&str, TokenKind)] = &[
        ("...", TokenKind::Ellipsis),
        ("<<=", TokenKind::ShlAssign),
        (">>=", TokenKind::ShrAssign),
        ("++", TokenKind::Inc),
        ("--", TokenKind::Dec),
        ("->", TokenKind::Arrow),
        ("<<", TokenKind::Shl),
        (">>", TokenKind::Shr),
        ("<=", TokenKind::LtEq),
        (">=", TokenKind::GtEq),
        ("==", TokenKind::EqEq),
        ("!=", TokenKind::NotEq),
        ("&&", TokenKind::AndAnd),
        ("||", TokenKind::OrOr),
        ("+=", TokenKind::PlusAssign),
        ("-=", TokenKind::MinusAssign),
        ("*=", TokenKind::StarAssign),
        ("/=", TokenKind::SlashAssign),
        ("%=", TokenKind::PercentAssign),
        ("&=", TokenKind::AmpAssign),
        ("|=", TokenKind::PipeAssign),
        ("^=", TokenKind::CaretAssign),
        ("(", TokenKind::LParen),
        (")", TokenKind::RParen),
        ("{", TokenKind::LBrace),
        ("}", TokenKind::RBrace),
        ("[", TokenKind::LBracket),
        ("]", TokenKind::RBracket),
        (",", TokenKind::Comma),
        (";", TokenKind::Semicolon),
        (":", TokenKind::Colon),
        ("?", TokenKind::Question),
        (".", TokenKind::Dot),
        ("+", TokenKind::Plus),
        ("-", TokenKind::Minus),
        ("*", TokenKind::Star),
        ("/", TokenKind::Slash),
        ("%", TokenKind::Percent),
        ("&", TokenKind::Amp),
        ("|", TokenKind::Pipe),
        ("^", TokenKind::Caret),
        ("~", TokenKind::Tilde),
        ("!", TokenKind::Not),
        ("<", TokenKind::Lt),
        (">", TokenKind::Gt),
        ("=", TokenKind::Assign),
    ];

    for (pat, kind) in TABLE {
        if sc.starts_with(pat) {
            sc.advance_by(pat.len());
            return Some(*kind);
        }
    }
    None
}

/// A restartable cursor over a lexed token sequence. `read` yields the next
/// token the parser should see (skipping ignored kinds) without advancing;
/// `next` does the same and advances past it.
#[derive(Clone, Copy)]
pub struct TokenSource<'t> {
    toks: &'t [Token],
    pos: usize,
}

impl<'t> TokenSource<'t> {
    pub fn new(toks: &'t [Token]) -> Self {
        TokenSource { toks, pos: 0 }
    }

    /// The token at the cursor, ignored kinds included.
    pub fn current(&self) -> &'t Token {
        &self.toks[self.pos.min(self.toks.len() - 1)]
    }

    fn skip_from(&self, mut pos: usize) -> usize {
        while pos < self.toks.len() - 1 && self.toks[pos].kind.is_ignored() {
            pos += 1;
        }
        pos.min(self.toks.len() - 1)
    }

    /// Read the next significant token without advancing.
    pub fn read(&self) -> &'t Token {
        &self.toks[self.skip_from(self.pos)]
    }

    /// Read the significant token after the next one without advancing.
    pub fn read_second(&self) -> &'t Token {
        let first = self.skip_from(self.pos);
        if first >= self.toks.len() - 1 {
            return &self.toks[self.toks.len() - 1];
        }
        &self.toks[self.skip_from(first + 1)]
    }

    /// Advance past the next significant token and return it.
    pub fn next(&mut self) -> &'t Token {
        let at = self.skip_from(self.pos);
        self.pos = (at + 1).min(self.toks.len() - 1);
        &self.toks[at]
    }
}

// ------------- unit tests -------------

#[cfg(test)]
mod tests {
    use super::*;

    fn kinds(source: &str) -> Vec<TokenKind> {
        lex(source)
            .into_iter()
            .map(|t| t.kind)
            .filter(|k| !k.is_ignored() && *k != TokenKind::Eof)
            .collect()
    }

    #[test]
    fn test_lex_keywords_and_idents() {
        assert_eq!(
            kinds("int foo; return bar;"),
            vec![
                TokenKind::KwInt,
                TokenKind::Ident,
                TokenKind::Semicolon,
                TokenKind::KwReturn,
                TokenKind::Ident,
                TokenKind::Semicolon,
            ]
        );
    }

    #[test]
    fn test_lex_longest_match_operators() {
        assert_eq!(
            kinds("a <<= b >> c >= d"),
            vec![
                TokenKind::Ident,
                TokenKind::ShlAssign,
                TokenKind::Ident,
                TokenKind::Shr,
                TokenKind::Ident,
                TokenKind::GtEq,
                TokenKind::Ident,
            ]
        );
    }

    #[test]
    fn test_lex_numbers() {
        let toks = lex("0x1F 42");
        assert_eq!(toks[0].kind, TokenKind::Number);
        assert_eq!(toks[0].text, "0x1F");
        assert_eq!(toks[2].kind, TokenKind::Number);
        assert_eq!(toks[2].text, "42");
    }

    #[test]
    fn test_lex_comments_and_preproc() {
        let toks = lex("#include <x.h>\n// line\n/* block */ /** doc */ int");
        let all: Vec<TokenKind> = toks.iter().map(|t| t.kind).collect();
        assert!(all.contains(&TokenKind::Preproc));
        assert!(all.contains(&TokenKind::Comment));
        assert!(all.contains(&TokenKind::DocComment));
        assert!(all.contains(&TokenKind::KwInt));
    }

    #[test]
    fn test_lex_string_and_char() {
        let toks = lex("\"ab\\\"c\" 'x'");
        assert_eq!(toks[0].kind, TokenKind::StrLit);
        assert_eq!(toks[0].text, "\"ab\\\"c\"");
        assert_eq!(toks[2].kind, TokenKind::CharLit);
    }

    #[test]
    fn test_lex_invalid_char() {
        let toks = lex("int `");
        assert!(toks.iter().any(|t| t.kind == TokenKind::Invalid));
    }

    #[test]
    fn test_cursor_skips_ignored() {
        let toks = lex("int /* c */ x");
        let mut src = TokenSource::new(&toks);
        assert_eq!(src.read().kind, TokenKind::KwInt);
        assert_eq!(src.read_second().kind, TokenKind::Ident);
        assert_eq!(src.next().kind, TokenKind::KwInt);
        // `current` sees the raw cursor position, ignored kinds included
        assert_eq!(src.current().kind, TokenKind::Whitespace);
        assert_eq!(src.next().kind, TokenKind::Ident);
        assert_eq!(src.next().kind, TokenKind::Eof);
    }

    #[test]
    fn test_attribute_and_int128_spellings() {
        assert_eq!(
            kinds("__attribute__ __int128"),
            vec![TokenKind::KwAttribute, TokenKind::KwInt128]
        );
    }
}
