//! Recursive-descent parser producing [`Expr`] and [`Stmt`] trees.
//!
//! Binary operators are parsed by precedence climbing. Arrow functions are recognized by
//! looking ahead for `=>` after an identifier or a balanced parameter list.

use super::{
    ExpressionError,
    ast::{ArrowBody, ArrowFunction, AssignOp, BinaryOp, Expr, LogicalOp, MemberKey, Stmt, TemplatePart, UnaryOp},
    lexer::{TemplateChunk, Token, TokenKind, tokenize, tokenize_at},
};
use crate::value::{Value, format_number};

/// Keywords that may not be used as plain identifiers.
const RESERVED: [&str; 13] = [
    "const", "let", "var", "if", "else", "for", "return", "function", "while", "new", "class", "throw", "typeof",
];
/// Keywords recognized at statement position but outside the supported language.
const UNSUPPORTED_STATEMENTS: [&str; 8] = ["function", "while", "do", "class", "throw", "try", "break", "continue"];

/// Parses a single expression; the whole input must be consumed.
pub fn parse_expression(source: &str) -> Result<Expr, ExpressionError> {
    parse_expression_at(source, 0)
}

/// Parses a statement list.
pub fn parse_program(source: &str) -> Result<Vec<Stmt>, ExpressionError> {
    let mut parser = Parser::new(tokenize(source)?);
    let mut statements = Vec::new();
    while !parser.at_end() {
        parser.statement(&mut statements)?;
    }
    Ok(statements)
}

fn parse_expression_at(source: &str, offset: usize) -> Result<Expr, ExpressionError> {
    let mut parser = Parser::new(tokenize_at(source, offset)?);
    let expression = parser.expression()?;
    parser.eat_punct(";");
    if !parser.at_end() {
        return Err(parser.unexpected());
    }
    Ok(expression)
}

#[derive(Clone, Copy)]
enum Operator {
    Binary(BinaryOp),
    Logical(LogicalOp),
}

struct Parser {
    tokens: Vec<Token>,
    position: usize,
}

impl Parser {
    fn new(tokens: Vec<Token>) -> Self {
        Self { tokens, position: 0 }
    }

    fn peek(&self) -> &Token {
        let last = self.tokens.len().saturating_sub(1);
        &self.tokens[self.position.min(last)]
    }

    fn peek_kind_at(&self, ahead: usize) -> Option<&TokenKind> {
        self.tokens.get(self.position + ahead).map(|token| &token.kind)
    }

    fn advance(&mut self) -> Token {
        let token = self.peek().clone();
        if self.position < self.tokens.len() {
            self.position += 1;
        }
        token
    }

    fn at_end(&self) -> bool {
        matches!(self.peek().kind, TokenKind::Eof)
    }

    fn is_punct(&self, punct: &str) -> bool {
        matches!(&self.peek().kind, TokenKind::Punct(found) if *found == punct)
    }

    fn is_keyword(&self, keyword: &str) -> bool {
        matches!(&self.peek().kind, TokenKind::Identifier(found) if found == keyword)
    }

    fn eat_punct(&mut self, punct: &str) -> bool {
        if self.is_punct(punct) {
            self.position += 1;
            true
        } else {
            false
        }
    }

    fn expect_punct(&mut self, punct: &str) -> Result<(), ExpressionError> {
        if self.eat_punct(punct) {
            Ok(())
        } else {
            Err(self.error(format!("expected '{punct}' but found {}", describe(&self.peek().kind))))
        }
    }

    fn expect_identifier(&mut self) -> Result<String, ExpressionError> {
        match &self.peek().kind {
            TokenKind::Identifier(name) if !RESERVED.contains(&name.as_str()) => {
                let name = name.clone();
                self.position += 1;
                Ok(name)
            }
            other => Err(self.error(format!("expected identifier but found {}", describe(other)))),
        }
    }

    fn error(&self, message: impl Into<String>) -> ExpressionError {
        ExpressionError::Syntax {
            offset: self.peek().offset,
            message: message.into(),
        }
    }

    fn unexpected(&self) -> ExpressionError {
        self.error(format!("unexpected {}", describe(&self.peek().kind)))
    }

    // Statements

    fn statement(&mut self, out: &mut Vec<Stmt>) -> Result<(), ExpressionError> {
        let keyword = match &self.peek().kind {
            TokenKind::Identifier(name) => Some(name.clone()),
            _ => None,
        };
        if let Some(keyword) = keyword.as_deref() {
            match keyword {
                "const" | "let" | "var" => {
                    let mutable = keyword != "const";
                    self.position += 1;
                    self.declarations(mutable, out)?;
                    self.eat_punct(";");
                    return Ok(());
                }
                "if" => {
                    self.position += 1;
                    out.push(self.if_statement()?);
                    return Ok(());
                }
                "for" => {
                    self.position += 1;
                    out.push(self.for_of_statement()?);
                    return Ok(());
                }
                "return" => {
                    self.position += 1;
                    let value = if self.is_punct(";") || self.is_punct("}") || self.at_end() {
                        None
                    } else {
                        Some(self.expression()?)
                    };
                    self.eat_punct(";");
                    out.push(Stmt::Return(value));
                    return Ok(());
                }
                other if UNSUPPORTED_STATEMENTS.contains(&other) => {
                    return Err(ExpressionError::Unsupported {
                        message: format!("'{other}' statements are not supported"),
                    });
                }
                _ => {}
            }
        }

        if self.eat_punct("{") {
            out.push(Stmt::Block(self.block_rest()?));
            return Ok(());
        }
        if self.eat_punct(";") {
            return Ok(());
        }

        let expression = self.expression()?;
        let assign = if self.is_punct("=") {
            Some(AssignOp::Assign)
        } else if self.is_punct("+=") {
            Some(AssignOp::AddAssign)
        } else if self.is_punct("-=") {
            Some(AssignOp::SubtractAssign)
        } else {
            None
        };

        let statement = match (assign, expression) {
            (Some(op), Expr::Identifier(target)) => {
                self.position += 1;
                Stmt::Assign {
                    target,
                    op,
                    value: self.expression()?,
                }
            }
            (Some(_), _) => {
                return Err(ExpressionError::Unsupported {
                    message: "only local variables can be assigned".to_string(),
                });
            }
            (None, expression) => Stmt::Expr(expression),
        };
        self.eat_punct(";");
        out.push(statement);
        Ok(())
    }

    fn declarations(&mut self, mutable: bool, out: &mut Vec<Stmt>) -> Result<(), ExpressionError> {
        loop {
            let name = self.expect_identifier()?;
            let init = if self.eat_punct("=") { Some(self.expression()?) } else { None };
            if init.is_none() && !mutable {
                return Err(self.error(format!("missing initializer in const declaration of '{name}'")));
            }
            out.push(Stmt::Declare { name, init, mutable });
            if !self.eat_punct(",") {
                return Ok(());
            }
        }
    }

    fn if_statement(&mut self) -> Result<Stmt, ExpressionError> {
        self.expect_punct("(")?;
        let test = self.expression()?;
        self.expect_punct(")")?;
        let consequent = self.body()?;
        let alternate = if self.is_keyword("else") {
            self.position += 1;
            Some(self.body()?)
        } else {
            None
        };
        Ok(Stmt::If {
            test,
            consequent,
            alternate,
        })
    }

    fn for_of_statement(&mut self) -> Result<Stmt, ExpressionError> {
        self.expect_punct("(")?;
        if !(self.is_keyword("const") || self.is_keyword("let") || self.is_keyword("var")) {
            return Err(ExpressionError::Unsupported {
                message: "only 'for (const item of items)' loops are supported".to_string(),
            });
        }
        self.position += 1;
        let binding = self.expect_identifier()?;
        if !self.is_keyword("of") {
            return Err(ExpressionError::Unsupported {
                message: "only 'for (const item of items)' loops are supported".to_string(),
            });
        }
        self.position += 1;
        let iterable = self.expression()?;
        self.expect_punct(")")?;
        let body = self.body()?;
        Ok(Stmt::ForOf { binding, iterable, body })
    }

    /// Body of an `if`/`else`/`for`: a braced block or a single statement.
    fn body(&mut self) -> Result<Vec<Stmt>, ExpressionError> {
        if self.eat_punct("{") {
            return self.block_rest();
        }
        let mut statements = Vec::new();
        self.statement(&mut statements)?;
        Ok(statements)
    }

    /// Statements up to and including the closing `}`.
    fn block_rest(&mut self) -> Result<Vec<Stmt>, ExpressionError> {
        let mut statements = Vec::new();
        while !self.eat_punct("}") {
            if self.at_end() {
                return Err(self.error("missing '}' before end of input"));
            }
            self.statement(&mut statements)?;
        }
        Ok(statements)
    }

    // Expressions

    fn expression(&mut self) -> Result<Expr, ExpressionError> {
        if let Some(arrow) = self.arrow()? {
            return Ok(Expr::Arrow(arrow));
        }
        self.conditional()
    }

    fn arrow(&mut self) -> Result<Option<ArrowFunction>, ExpressionError> {
        let single_param = match (&self.peek().kind, self.peek_kind_at(1)) {
            (TokenKind::Identifier(name), Some(TokenKind::Punct("=>"))) => Some(name.clone()),
            _ => None,
        };
        let params = match single_param {
            Some(name) => {
                self.position += 2;
                vec![name]
            }
            None if self.is_punct("(") => {
                let Some(close) = self.matching_paren() else {
                    return Ok(None);
                };
                if !matches!(self.tokens.get(close + 1).map(|token| &token.kind), Some(TokenKind::Punct("=>"))) {
                    return Ok(None);
                }
                self.position += 1;
                let mut params = Vec::new();
                while !self.eat_punct(")") {
                    params.push(self.expect_identifier()?);
                    if !self.eat_punct(",") {
                        self.expect_punct(")")?;
                        break;
                    }
                }
                self.expect_punct("=>")?;
                params
            }
            _ => return Ok(None),
        };

        let body = if self.eat_punct("{") {
            ArrowBody::Block(self.block_rest()?)
        } else {
            ArrowBody::Expr(Box::new(self.expression()?))
        };
        Ok(Some(ArrowFunction { params, body }))
    }

    fn matching_paren(&self) -> Option<usize> {
        let mut depth = 0usize;
        for (index, token) in self.tokens.iter().enumerate().skip(self.position) {
            match token.kind {
                TokenKind::Punct("(") => depth += 1,
                TokenKind::Punct(")") => {
                    depth -= 1;
                    if depth == 0 {
                        return Some(index);
                    }
                }
                TokenKind::Eof => return None,
                _ => {}
            }
        }
        None
    }

    fn conditional(&mut self) -> Result<Expr, ExpressionError> {
        let test = self.binary(1)?;
        if !self.eat_punct("?") {
            return Ok(test);
        }
        let consequent = self.expression()?;
        self.expect_punct(":")?;
        let alternate = self.expression()?;
        Ok(Expr::Conditional {
            test: Box::new(test),
            consequent: Box::new(consequent),
            alternate: Box::new(alternate),
        })
    }

    fn binary_operator(&self) -> Option<(u8, Operator)> {
        let TokenKind::Punct(punct) = self.peek().kind else {
            return None;
        };
        let operator = match punct {
            "??" => (1, Operator::Logical(LogicalOp::Coalesce)),
            "||" => (2, Operator::Logical(LogicalOp::Or)),
            "&&" => (3, Operator::Logical(LogicalOp::And)),
            "==" => (4, Operator::Binary(BinaryOp::Equal)),
            "!=" => (4, Operator::Binary(BinaryOp::NotEqual)),
            "===" => (4, Operator::Binary(BinaryOp::StrictEqual)),
            "!==" => (4, Operator::Binary(BinaryOp::StrictNotEqual)),
            "<" => (5, Operator::Binary(BinaryOp::Less)),
            "<=" => (5, Operator::Binary(BinaryOp::LessEqual)),
            ">" => (5, Operator::Binary(BinaryOp::Greater)),
            ">=" => (5, Operator::Binary(BinaryOp::GreaterEqual)),
            "+" => (6, Operator::Binary(BinaryOp::Add)),
            "-" => (6, Operator::Binary(BinaryOp::Subtract)),
            "*" => (7, Operator::Binary(BinaryOp::Multiply)),
            "/" => (7, Operator::Binary(BinaryOp::Divide)),
            "%" => (7, Operator::Binary(BinaryOp::Remainder)),
            "**" => (8, Operator::Binary(BinaryOp::Power)),
            _ => return None,
        };
        Some(operator)
    }

    fn binary(&mut self, min_precedence: u8) -> Result<Expr, ExpressionError> {
        let mut left = self.unary()?;
        while let Some((precedence, operator)) = self.binary_operator() {
            if precedence < min_precedence {
                break;
            }
            self.position += 1;
            let right_associative = matches!(operator, Operator::Binary(BinaryOp::Power));
            let right = self.binary(if right_associative { precedence } else { precedence + 1 })?;
            left = match operator {
                Operator::Binary(op) => Expr::Binary {
                    op,
                    left: Box::new(left),
                    right: Box::new(right),
                },
                Operator::Logical(op) => Expr::Logical {
                    op,
                    left: Box::new(left),
                    right: Box::new(right),
                },
            };
        }
        Ok(left)
    }

    fn unary(&mut self) -> Result<Expr, ExpressionError> {
        let op = match &self.peek().kind {
            TokenKind::Punct("!") => UnaryOp::Not,
            TokenKind::Punct("-") => UnaryOp::Negate,
            TokenKind::Punct("+") => UnaryOp::Plus,
            TokenKind::Identifier(keyword) if keyword == "typeof" => UnaryOp::TypeOf,
            _ => return self.postfix(),
        };
        self.position += 1;
        Ok(Expr::Unary {
            op,
            operand: Box::new(self.unary()?),
        })
    }

    fn postfix(&mut self) -> Result<Expr, ExpressionError> {
        let mut expression = self.primary()?;
        loop {
            if self.eat_punct(".") {
                let key = self.property_name()?;
                expression = Expr::Member {
                    object: Box::new(expression),
                    key: MemberKey::Named(key),
                    optional: false,
                };
            } else if self.eat_punct("?.") {
                let key = if self.eat_punct("[") {
                    let index = self.expression()?;
                    self.expect_punct("]")?;
                    MemberKey::Computed(Box::new(index))
                } else if self.is_punct("(") {
                    return Err(ExpressionError::Unsupported {
                        message: "optional calls are not supported".to_string(),
                    });
                } else {
                    MemberKey::Named(self.property_name()?)
                };
                expression = Expr::Member {
                    object: Box::new(expression),
                    key,
                    optional: true,
                };
            } else if self.eat_punct("[") {
                let index = self.expression()?;
                self.expect_punct("]")?;
                expression = Expr::Member {
                    object: Box::new(expression),
                    key: MemberKey::Computed(Box::new(index)),
                    optional: false,
                };
            } else if self.eat_punct("(") {
                let args = self.comma_list(")")?;
                expression = Expr::Call {
                    callee: Box::new(expression),
                    args,
                };
            } else {
                return Ok(expression);
            }
        }
    }

    /// Any identifier, reserved words included, is valid after `.`.
    fn property_name(&mut self) -> Result<String, ExpressionError> {
        match self.advance().kind {
            TokenKind::Identifier(name) => Ok(name),
            other => Err(self.error(format!("expected property name but found {}", describe(&other)))),
        }
    }

    fn comma_list(&mut self, close: &str) -> Result<Vec<Expr>, ExpressionError> {
        let mut items = Vec::new();
        while !self.eat_punct(close) {
            items.push(self.expression()?);
            if !self.eat_punct(",") {
                self.expect_punct(close)?;
                break;
            }
        }
        Ok(items)
    }

    fn primary(&mut self) -> Result<Expr, ExpressionError> {
        let token = self.advance();
        match token.kind {
            TokenKind::Number(number) => Ok(Expr::Literal(Value::Number(number))),
            TokenKind::String(text) => Ok(Expr::Literal(Value::String(text))),
            TokenKind::Template(chunks) => chunks
                .into_iter()
                .map(|chunk| match chunk {
                    TemplateChunk::Text(text) => Ok(TemplatePart::Text(text)),
                    TemplateChunk::Code { source, offset } => parse_expression_at(&source, offset).map(TemplatePart::Expr),
                })
                .collect::<Result<Vec<_>, _>>()
                .map(Expr::Template),
            TokenKind::Identifier(name) => match name.as_str() {
                "true" => Ok(Expr::Literal(Value::Bool(true))),
                "false" => Ok(Expr::Literal(Value::Bool(false))),
                "null" | "undefined" => Ok(Expr::Literal(Value::Null)),
                "NaN" => Ok(Expr::Literal(Value::Number(f64::NAN))),
                "Infinity" => Ok(Expr::Literal(Value::Number(f64::INFINITY))),
                reserved if RESERVED.contains(&reserved) => Err(ExpressionError::Syntax {
                    offset: token.offset,
                    message: format!("unexpected keyword '{reserved}'"),
                }),
                _ => Ok(Expr::Identifier(name)),
            },
            TokenKind::Punct("(") => {
                let inner = self.expression()?;
                self.expect_punct(")")?;
                Ok(inner)
            }
            TokenKind::Punct("[") => self.comma_list("]").map(Expr::Array),
            TokenKind::Punct("{") => self.object_literal(),
            other => Err(ExpressionError::Syntax {
                offset: token.offset,
                message: format!("unexpected {}", describe(&other)),
            }),
        }
    }

    fn object_literal(&mut self) -> Result<Expr, ExpressionError> {
        let mut entries = Vec::new();
        while !self.eat_punct("}") {
            let key_token = self.advance();
            let (key, shorthand) = match key_token.kind {
                TokenKind::Identifier(name) => (name, true),
                TokenKind::String(text) => (text, false),
                TokenKind::Number(number) => (format_number(number), false),
                TokenKind::Punct("[") => {
                    return Err(ExpressionError::Unsupported {
                        message: "computed object keys are not supported".to_string(),
                    });
                }
                other => {
                    return Err(ExpressionError::Syntax {
                        offset: key_token.offset,
                        message: format!("expected object key but found {}", describe(&other)),
                    });
                }
            };

            let value = if self.eat_punct(":") {
                self.expression()?
            } else if shorthand && (self.is_punct(",") || self.is_punct("}")) {
                Expr::Identifier(key.clone())
            } else {
                return Err(self.error(format!("expected ':' after object key '{key}'")));
            };
            entries.push((key, value));

            if !self.eat_punct(",") {
                self.expect_punct("}")?;
                break;
            }
        }
        Ok(Expr::Object(entries))
    }
}

fn describe(kind: &TokenKind) -> String {
    match kind {
        TokenKind::Number(number) => format!("number {}", format_number(*number)),
        TokenKind::String(_) => "string".to_string(),
        TokenKind::Template(_) => "template literal".to_string(),
        TokenKind::Identifier(name) => format!("identifier '{name}'"),
        TokenKind::Punct(punct) => format!("'{punct}'"),
        TokenKind::Eof => "end of input".to_string(),
    }
}
