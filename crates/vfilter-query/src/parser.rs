//! Recursive descent parser for VQL
//!
//! Builds the AST from the token stream with classic precedence climbing.
//! Failures surface a single diagnostic with line/column; no partial AST is
//! ever exposed.

use crate::ast::{
    Arg, BinOp, Column, Columns, Expr, FnCall, Let, LetBody, Literal, OrderBy, Select, VQL,
};
use crate::lexer::{line_col, tokenize, SpannedToken, Token};
use vfilter_core::{Error, Result};

/// Parse exactly one statement.
pub fn parse(input: &str) -> Result<VQL> {
    let mut statements = parse_multi(input)?;
    match statements.len() {
        1 => Ok(statements.remove(0)),
        0 => Err(Error::parse("empty query", 1, 1)),
        n => Err(Error::parse(
            format!("expected one statement, found {n}"),
            1,
            1,
        )),
    }
}

/// Parse a sequence of statements. LET statements take effect for everything
/// that follows them when the sequence is evaluated in order.
pub fn parse_multi(input: &str) -> Result<Vec<VQL>> {
    let tokens = tokenize(input)?;
    let mut parser = Parser {
        input,
        tokens: &tokens,
        pos: 0,
    };
    let mut statements = Vec::new();
    while !parser.at_end() {
        statements.push(parser.parse_statement()?);
    }
    Ok(statements)
}

struct Parser<'a> {
    input: &'a str,
    tokens: &'a [SpannedToken],
    pos: usize,
}

impl<'a> Parser<'a> {
    fn at_end(&self) -> bool {
        self.pos >= self.tokens.len()
    }

    fn peek(&self) -> Option<&Token> {
        self.tokens.get(self.pos).map(|(t, _)| t)
    }

    fn advance(&mut self) -> Option<&Token> {
        let tok = self.tokens.get(self.pos).map(|(t, _)| t);
        if tok.is_some() {
            self.pos += 1;
        }
        tok
    }

    fn consume(&mut self, expected: &Token) -> bool {
        if self.peek() == Some(expected) {
            self.pos += 1;
            true
        } else {
            false
        }
    }

    fn expect(&mut self, expected: &Token, what: &str) -> Result<()> {
        if self.consume(expected) {
            Ok(())
        } else {
            Err(self.error(format!("expected {what}")))
        }
    }

    fn error(&self, message: String) -> Error {
        let offset = self
            .tokens
            .get(self.pos)
            .or_else(|| self.tokens.last())
            .map(|(_, span)| span.start)
            .unwrap_or(self.input.len());
        let (line, column) = line_col(self.input, offset);
        Error::parse(message, line, column)
    }

    fn parse_statement(&mut self) -> Result<VQL> {
        match self.peek() {
            Some(Token::Select) => Ok(VQL::Select(self.parse_select()?)),
            Some(Token::Let) => Ok(VQL::Let(self.parse_let()?)),
            _ => Err(self.error("expected SELECT or LET".to_string())),
        }
    }

    fn parse_select(&mut self) -> Result<Select> {
        self.expect(&Token::Select, "SELECT")?;

        let columns = if self.consume(&Token::Star) {
            Columns::Star
        } else {
            let mut cols = Vec::new();
            loop {
                let expr = self.parse_or()?;
                let alias = if self.consume(&Token::As) {
                    Some(self.parse_ident("alias after AS")?)
                } else {
                    None
                };
                cols.push(Column { expr, alias });
                if !self.consume(&Token::Comma) {
                    break;
                }
            }
            Columns::List(cols)
        };

        self.expect(&Token::From, "FROM")?;
        let from = self.parse_plugin_call()?;

        let where_clause = if self.consume(&Token::Where) {
            Some(self.parse_comma_expr()?)
        } else {
            None
        };

        let group_by = if self.consume(&Token::Group) {
            self.expect(&Token::By, "BY after GROUP")?;
            Some(self.parse_or()?)
        } else {
            None
        };

        let order_by = if self.consume(&Token::Order) {
            self.expect(&Token::By, "BY after ORDER")?;
            let expr = self.parse_or()?;
            let descending = if self.consume(&Token::Desc) {
                true
            } else {
                self.consume(&Token::Asc);
                false
            };
            Some(OrderBy { expr, descending })
        } else {
            None
        };

        let limit = if self.consume(&Token::Limit) {
            match self.advance() {
                Some(Token::Integer(n)) => Some(*n),
                _ => return Err(self.error("expected integer after LIMIT".to_string())),
            }
        } else {
            None
        };

        Ok(Select {
            columns,
            from,
            where_clause,
            group_by,
            order_by,
            limit,
        })
    }

    fn parse_let(&mut self) -> Result<Let> {
        self.expect(&Token::Let, "LET")?;
        let name = self.parse_ident("binding name after LET")?;

        let mut parameters = Vec::new();
        if self.consume(&Token::LParen) {
            if !self.consume(&Token::RParen) {
                loop {
                    parameters.push(self.parse_ident("parameter name")?);
                    if !self.consume(&Token::Comma) {
                        break;
                    }
                }
                self.expect(&Token::RParen, "')' after parameters")?;
            }
        }

        let materialized = if self.consume(&Token::Le) {
            true
        } else {
            self.expect(&Token::Eq, "'=' or '<=' in LET")?;
            false
        };

        let body = if self.peek() == Some(&Token::Select) {
            LetBody::Query(Box::new(self.parse_select()?))
        } else {
            LetBody::Expr(self.parse_comma_expr()?)
        };

        Ok(Let {
            name,
            parameters,
            materialized,
            body,
        })
    }

    fn parse_ident(&mut self, what: &str) -> Result<String> {
        match self.peek() {
            Some(Token::Ident(name)) => {
                let name = name.clone();
                self.pos += 1;
                Ok(name)
            }
            _ => Err(self.error(format!("expected {what}"))),
        }
    }

    // Plugin names in FROM position may be dotted: Artifact.Linux.Sys().
    fn parse_plugin_call(&mut self) -> Result<FnCall> {
        let mut name = self.parse_ident("plugin name after FROM")?;
        while self.peek() == Some(&Token::Dot) {
            self.pos += 1;
            name.push('.');
            name.push_str(&self.parse_ident("name segment after '.'")?);
        }

        let args = if self.peek() == Some(&Token::LParen) {
            self.parse_call_args()?
        } else {
            Vec::new()
        };
        Ok(FnCall { name, args })
    }

    fn parse_call_args(&mut self) -> Result<Vec<Arg>> {
        self.expect(&Token::LParen, "'('")?;
        let mut args = Vec::new();
        if self.consume(&Token::RParen) {
            return Ok(args);
        }
        loop {
            let name = self.parse_ident("argument name")?;
            self.expect(&Token::Eq, "'=' after argument name")?;
            let value = self.parse_or()?;
            args.push(Arg { name, value });
            if !self.consume(&Token::Comma) {
                break;
            }
        }
        self.expect(&Token::RParen, "')' after arguments")?;
        Ok(args)
    }

    // A bare comma builds an array at the lowest precedence: `1, 2` is the
    // sequence (1, 2). Columns and argument lists parse below this level, so
    // their commas stay separators.
    fn parse_comma_expr(&mut self) -> Result<Expr> {
        let first = self.parse_or()?;
        if self.peek() != Some(&Token::Comma) {
            return Ok(first);
        }
        let mut items = vec![first];
        while self.consume(&Token::Comma) {
            items.push(self.parse_or()?);
        }
        Ok(Expr::Array(items))
    }

    fn parse_or(&mut self) -> Result<Expr> {
        let mut left = self.parse_and()?;
        while self.consume(&Token::Or) {
            let right = self.parse_and()?;
            left = Expr::Binary {
                op: BinOp::Or,
                left: Box::new(left),
                right: Box::new(right),
            };
        }
        Ok(left)
    }

    fn parse_and(&mut self) -> Result<Expr> {
        let mut left = self.parse_not()?;
        while self.consume(&Token::And) {
            let right = self.parse_not()?;
            left = Expr::Binary {
                op: BinOp::And,
                left: Box::new(left),
                right: Box::new(right),
            };
        }
        Ok(left)
    }

    fn parse_not(&mut self) -> Result<Expr> {
        if self.consume(&Token::Not) {
            Ok(Expr::Not(Box::new(self.parse_not()?)))
        } else {
            self.parse_comparison()
        }
    }

    fn comparison_op(&self) -> Option<BinOp> {
        match self.peek() {
            Some(Token::Eq) => Some(BinOp::Eq),
            Some(Token::Ne) => Some(BinOp::Ne),
            Some(Token::Lt) => Some(BinOp::Lt),
            Some(Token::Le) => Some(BinOp::Le),
            Some(Token::Gt) => Some(BinOp::Gt),
            Some(Token::Ge) => Some(BinOp::Ge),
            Some(Token::In) => Some(BinOp::In),
            Some(Token::Match) => Some(BinOp::Match),
            _ => None,
        }
    }

    fn parse_comparison(&mut self) -> Result<Expr> {
        let mut left = self.parse_additive()?;
        while let Some(op) = self.comparison_op() {
            self.pos += 1;
            let right = self.parse_additive()?;
            left = Expr::Binary {
                op,
                left: Box::new(left),
                right: Box::new(right),
            };
        }
        Ok(left)
    }

    fn parse_additive(&mut self) -> Result<Expr> {
        let mut left = self.parse_multiplicative()?;
        loop {
            let op = match self.peek() {
                Some(Token::Plus) => BinOp::Add,
                Some(Token::Minus) => BinOp::Sub,
                _ => break,
            };
            self.pos += 1;
            let right = self.parse_multiplicative()?;
            left = Expr::Binary {
                op,
                left: Box::new(left),
                right: Box::new(right),
            };
        }
        Ok(left)
    }

    fn parse_multiplicative(&mut self) -> Result<Expr> {
        let mut left = self.parse_unary()?;
        loop {
            let op = match self.peek() {
                Some(Token::Star) => BinOp::Mul,
                Some(Token::Slash) => BinOp::Div,
                _ => break,
            };
            self.pos += 1;
            let right = self.parse_unary()?;
            left = Expr::Binary {
                op,
                left: Box::new(left),
                right: Box::new(right),
            };
        }
        Ok(left)
    }

    fn parse_unary(&mut self) -> Result<Expr> {
        if self.consume(&Token::Minus) {
            Ok(Expr::Neg(Box::new(self.parse_unary()?)))
        } else {
            self.parse_postfix()
        }
    }

    fn parse_postfix(&mut self) -> Result<Expr> {
        let mut expr = self.parse_atom()?;
        loop {
            if self.consume(&Token::Dot) {
                let field = self.parse_ident("member name after '.'")?;
                expr = Expr::Member {
                    base: Box::new(expr),
                    field,
                };
            } else if self.consume(&Token::LBracket) {
                let index = self.parse_or()?;
                self.expect(&Token::RBracket, "']' after index")?;
                expr = Expr::Index {
                    base: Box::new(expr),
                    index: Box::new(index),
                };
            } else {
                break;
            }
        }
        Ok(expr)
    }

    fn parse_atom(&mut self) -> Result<Expr> {
        match self.peek() {
            Some(Token::Integer(n)) => {
                let n = *n;
                self.pos += 1;
                Ok(Expr::Literal(Literal::Int(n)))
            }
            Some(Token::Float(v)) => {
                let v = *v;
                self.pos += 1;
                Ok(Expr::Literal(Literal::Float(v)))
            }
            Some(Token::String(s)) => {
                let s = s.clone();
                self.pos += 1;
                Ok(Expr::Literal(Literal::String(s)))
            }
            Some(Token::True) => {
                self.pos += 1;
                Ok(Expr::Literal(Literal::Bool(true)))
            }
            Some(Token::False) => {
                self.pos += 1;
                Ok(Expr::Literal(Literal::Bool(false)))
            }
            Some(Token::Null) => {
                self.pos += 1;
                Ok(Expr::Literal(Literal::Null))
            }
            Some(Token::Ident(name)) => {
                let name = name.clone();
                self.pos += 1;
                if self.peek() == Some(&Token::LParen) {
                    let args = self.parse_call_args()?;
                    Ok(Expr::Call(FnCall { name, args }))
                } else {
                    Ok(Expr::Ident(name))
                }
            }
            Some(Token::LParen) => {
                self.pos += 1;
                if self.consume(&Token::RParen) {
                    return Ok(Expr::Array(Vec::new()));
                }
                let first = self.parse_or()?;
                if self.peek() != Some(&Token::Comma) {
                    self.expect(&Token::RParen, "')'")?;
                    return Ok(first);
                }
                let mut items = vec![first];
                while self.consume(&Token::Comma) {
                    if self.peek() == Some(&Token::RParen) {
                        break;
                    }
                    items.push(self.parse_or()?);
                }
                self.expect(&Token::RParen, "')' after sequence")?;
                Ok(Expr::Array(items))
            }
            Some(Token::LBracket) => {
                self.pos += 1;
                let mut items = Vec::new();
                if !self.consume(&Token::RBracket) {
                    loop {
                        items.push(self.parse_or()?);
                        if !self.consume(&Token::Comma) {
                            break;
                        }
                        if self.peek() == Some(&Token::RBracket) {
                            break;
                        }
                    }
                    self.expect(&Token::RBracket, "']' after sequence")?;
                }
                Ok(Expr::Array(items))
            }
            Some(Token::LBrace) => {
                self.pos += 1;
                let select = self.parse_select()?;
                self.expect(&Token::RBrace, "'}' after subquery")?;
                Ok(Expr::Subquery(Box::new(select)))
            }
            _ => Err(self.error("expected an expression".to_string())),
        }
    }
}
