use super::ExpressionError;

#[derive(Debug, Clone, PartialEq)]
pub enum TokenKind {
    Number(f64),
    String(String),
    Template(Vec<TemplateChunk>),
    Identifier(String),
    Punct(&'static str),
    Eof,
}

/// Raw piece of a back-tick template; embedded code is parsed separately.
#[derive(Debug, Clone, PartialEq)]
pub enum TemplateChunk {
    Text(String),
    Code { source: String, offset: usize },
}

#[derive(Debug, Clone, PartialEq)]
pub struct Token {
    pub kind: TokenKind,
    /// Byte offset of the token in the source text.
    pub offset: usize,
}

/// Longest first so that `===` is not read as `==` followed by `=`.
const PUNCTUATORS: [&str; 34] = [
    "===", "!==", "=>", "==", "!=", "<=", ">=", "&&", "||", "??", "?.", "**", "+=", "-=", "+", "-", "*", "/", "%", "<", ">", "!",
    "=", "?", ":", ".", ",", ";", "(", ")", "[", "]", "{", "}",
];

pub fn tokenize(source: &str) -> Result<Vec<Token>, ExpressionError> {
    Lexer::new(source, 0).run()
}

/// Tokenizes a fragment that starts at `base_offset` inside a larger source.
pub fn tokenize_at(source: &str, base_offset: usize) -> Result<Vec<Token>, ExpressionError> {
    Lexer::new(source, base_offset).run()
}

struct Lexer<'a> {
    source: &'a str,
    base_offset: usize,
    position: usize,
    tokens: Vec<Token>,
}

impl<'a> Lexer<'a> {
    fn new(source: &'a str, base_offset: usize) -> Self {
        Self {
            source,
            base_offset,
            position: 0,
            tokens: Vec::new(),
        }
    }

    fn run(mut self) -> Result<Vec<Token>, ExpressionError> {
        loop {
            self.skip_trivia()?;
            let start = self.position;
            let Some(current) = self.peek() else {
                self.push(TokenKind::Eof, start);
                return Ok(self.tokens);
            };

            let kind = match current {
                '0'..='9' => self.number()?,
                '.' if self.peek_at(1).is_some_and(|next| next.is_ascii_digit()) => self.number()?,
                '"' | '\'' => self.string(current)?,
                '`' => self.template()?,
                c if is_identifier_start(c) => self.identifier(),
                _ => self.punctuator()?,
            };
            self.push(kind, start);
        }
    }

    fn push(&mut self, kind: TokenKind, start: usize) {
        self.tokens.push(Token {
            kind,
            offset: self.base_offset + start,
        });
    }

    fn rest(&self) -> &'a str {
        &self.source[self.position..]
    }

    fn peek(&self) -> Option<char> {
        self.rest().chars().next()
    }

    fn peek_at(&self, n: usize) -> Option<char> {
        self.rest().chars().nth(n)
    }

    fn bump(&mut self) -> Option<char> {
        let current = self.peek()?;
        self.position += current.len_utf8();
        Some(current)
    }

    fn error(&self, at: usize, message: impl Into<String>) -> ExpressionError {
        ExpressionError::Syntax {
            offset: self.base_offset + at,
            message: message.into(),
        }
    }

    fn skip_trivia(&mut self) -> Result<(), ExpressionError> {
        loop {
            let rest = self.rest();
            if rest.starts_with("//") {
                let end = rest.find('\n').unwrap_or(rest.len());
                self.position += end;
            } else if rest.starts_with("/*") {
                let Some(end) = rest[2..].find("*/") else {
                    return Err(self.error(self.position, "unterminated comment"));
                };
                self.position += end + 4;
            } else if let Some(current) = self.peek()
                && current.is_whitespace()
            {
                self.position += current.len_utf8();
            } else {
                return Ok(());
            }
        }
    }

    fn number(&mut self) -> Result<TokenKind, ExpressionError> {
        let start = self.position;
        if self.rest().starts_with("0x") || self.rest().starts_with("0X") {
            self.position += 2;
            let digits_start = self.position;
            while self.peek().is_some_and(|c| c.is_ascii_hexdigit()) {
                self.position += 1;
            }
            let digits = &self.source[digits_start..self.position];
            return u64::from_str_radix(digits, 16)
                .map(|parsed| TokenKind::Number(parsed as f64))
                .map_err(|_| self.error(start, "invalid hexadecimal literal"));
        }

        while self.peek().is_some_and(|c| c.is_ascii_digit()) {
            self.position += 1;
        }
        if self.peek() == Some('.') && self.peek_at(1).is_none_or(|c| c.is_ascii_digit() || !is_identifier_start(c)) {
            self.position += 1;
            while self.peek().is_some_and(|c| c.is_ascii_digit()) {
                self.position += 1;
            }
        }
        if matches!(self.peek(), Some('e' | 'E')) {
            let mut lookahead = 1;
            if matches!(self.peek_at(1), Some('+' | '-')) {
                lookahead = 2;
            }
            if self.peek_at(lookahead).is_some_and(|c| c.is_ascii_digit()) {
                self.position += lookahead;
                while self.peek().is_some_and(|c| c.is_ascii_digit()) {
                    self.position += 1;
                }
            }
        }
        if self.peek().is_some_and(is_identifier_start) {
            return Err(self.error(self.position, "identifier directly after number"));
        }
        self.source[start..self.position]
            .parse::<f64>()
            .map(TokenKind::Number)
            .map_err(|_| self.error(start, "invalid number literal"))
    }

    fn string(&mut self, quote: char) -> Result<TokenKind, ExpressionError> {
        let start = self.position;
        self.bump();
        let mut text = String::new();
        loop {
            match self.bump() {
                None | Some('\n') => return Err(self.error(start, "unterminated string literal")),
                Some(c) if c == quote => return Ok(TokenKind::String(text)),
                Some('\\') => text.push(self.escape(start)?),
                Some(c) => text.push(c),
            }
        }
    }

    fn escape(&mut self, literal_start: usize) -> Result<char, ExpressionError> {
        let Some(escaped) = self.bump() else {
            return Err(self.error(literal_start, "unterminated escape sequence"));
        };
        Ok(match escaped {
            'n' => '\n',
            't' => '\t',
            'r' => '\r',
            '0' => '\0',
            'b' => '\u{8}',
            'f' => '\u{c}',
            'v' => '\u{b}',
            'u' => {
                let digits: String = self.rest().chars().take(4).collect();
                let decoded = (digits.len() == 4)
                    .then(|| u32::from_str_radix(&digits, 16).ok())
                    .flatten()
                    .and_then(char::from_u32)
                    .ok_or_else(|| self.error(self.position, "invalid unicode escape"))?;
                self.position += 4;
                decoded
            }
            other => other,
        })
    }

    fn template(&mut self) -> Result<TokenKind, ExpressionError> {
        let start = self.position;
        self.bump();
        let mut chunks = Vec::new();
        let mut text = String::new();
        loop {
            match self.bump() {
                None => return Err(self.error(start, "unterminated template literal")),
                Some('`') => break,
                Some('\\') => text.push(self.escape(start)?),
                Some('$') if self.peek() == Some('{') => {
                    self.bump();
                    if !text.is_empty() {
                        chunks.push(TemplateChunk::Text(std::mem::take(&mut text)));
                    }
                    let code_start = self.position;
                    self.skip_embedded_code(start)?;
                    chunks.push(TemplateChunk::Code {
                        source: self.source[code_start..self.position - 1].to_string(),
                        offset: self.base_offset + code_start,
                    });
                }
                Some(c) => text.push(c),
            }
        }
        if !text.is_empty() {
            chunks.push(TemplateChunk::Text(text));
        }
        Ok(TokenKind::Template(chunks))
    }

    /// Advances past the `}` closing an embedded template expression.
    fn skip_embedded_code(&mut self, template_start: usize) -> Result<(), ExpressionError> {
        let mut depth = 1usize;
        while let Some(current) = self.bump() {
            match current {
                '{' => depth += 1,
                '}' => {
                    depth -= 1;
                    if depth == 0 {
                        return Ok(());
                    }
                }
                '"' | '\'' | '`' => {
                    while let Some(inner) = self.bump() {
                        if inner == '\\' {
                            self.bump();
                        } else if inner == current {
                            break;
                        }
                    }
                }
                _ => {}
            }
        }
        Err(self.error(template_start, "unterminated template expression"))
    }

    fn identifier(&mut self) -> TokenKind {
        let start = self.position;
        while self.peek().is_some_and(is_identifier_part) {
            self.bump();
        }
        TokenKind::Identifier(self.source[start..self.position].to_string())
    }

    fn punctuator(&mut self) -> Result<TokenKind, ExpressionError> {
        let rest = self.rest();
        let Some(punct) = PUNCTUATORS.iter().find(|candidate| rest.starts_with(**candidate)) else {
            let found = self.peek().unwrap_or_default();
            return Err(self.error(self.position, format!("unexpected character '{found}'")));
        };
        // `a?.5:1` is a conditional, not optional chaining.
        if *punct == "?." && rest[2..].starts_with(|c: char| c.is_ascii_digit()) {
            self.position += 1;
            return Ok(TokenKind::Punct("?"));
        }
        self.position += punct.len();
        Ok(TokenKind::Punct(*punct))
    }
}

fn is_identifier_start(c: char) -> bool {
    c.is_alphabetic() || c == '_' || c == '$'
}

fn is_identifier_part(c: char) -> bool {
    c.is_alphanumeric() || c == '_' || c == '$'
}

#[cfg(test)]
mod tests {
    use super::*;

    fn kinds(source: &str) -> Vec<TokenKind> {
        tokenize(source).unwrap().into_iter().map(|token| token.kind).collect()
    }

    #[test]
    fn reads_longest_punctuators() {
        assert_eq!(
            kinds("a === b ?? c"),
            vec![
                TokenKind::Identifier("a".into()),
                TokenKind::Punct("==="),
                TokenKind::Identifier("b".into()),
                TokenKind::Punct("??"),
                TokenKind::Identifier("c".into()),
                TokenKind::Eof,
            ]
        );
    }

    #[test]
    fn numbers_strings_and_comments() {
        assert_eq!(
            kinds("1.5e2 'it\\'s' // trailing\n0x10 .5"),
            vec![
                TokenKind::Number(150.0),
                TokenKind::String("it's".into()),
                TokenKind::Number(16.0),
                TokenKind::Number(0.5),
                TokenKind::Eof,
            ]
        );
    }

    #[test]
    fn templates_split_text_and_code() {
        assert_eq!(
            kinds("`Hi ${user.name}, {${ {a: 1}.a }}`"),
            vec![
                TokenKind::Template(vec![
                    TemplateChunk::Text("Hi ".into()),
                    TemplateChunk::Code {
                        source: "user.name".into(),
                        offset: 6,
                    },
                    TemplateChunk::Text(", {".into()),
                    TemplateChunk::Code {
                        source: " {a: 1}.a ".into(),
                        offset: 21,
                    },
                    TemplateChunk::Text("}".into()),
                ]),
                TokenKind::Eof,
            ]
        );
    }

    #[test]
    fn conditional_before_fraction_is_not_optional_chaining() {
        assert_eq!(kinds("a?.5:1")[1], TokenKind::Punct("?"));
        assert_eq!(kinds("a?.b")[1], TokenKind::Punct("?."));
    }

    #[test]
    fn unterminated_string_reports_offset() {
        assert_eq!(
            tokenize("x + 'open").unwrap_err(),
            ExpressionError::Syntax {
                offset: 4,
                message: "unterminated string literal".into()
            }
        );
    }
}
