use crate::{ParseError, lexer::Token};
use icftl_core::{
    CmpOp, RawArg, RawFormula, RawOperand, RawQuantifier, RawSpecification, Scope, Type, Val,
};
use logos::Logos;
use std::ops::Range;

/// Parses the specifications in a source written in the textual format.
pub fn parse(source: &str) -> Result<Vec<RawSpecification>, ParseError> {
    let mut tokens = Vec::new();
    for (token, span) in Token::lexer(source).spanned() {
        let token = token.map_err(|()| ParseError::Lex(span.start))?;
        tokens.push((token, span));
    }
    let mut parser = Parser {
        source,
        tokens,
        pos: 0,
    };
    let mut specifications = Vec::new();
    while parser.peek().is_some() {
        specifications.push(parser.specification()?);
    }
    Ok(specifications)
}

struct Parser<'a> {
    source: &'a str,
    tokens: Vec<(Token<'a>, Range<usize>)>,
    pos: usize,
}

impl<'a> Parser<'a> {
    fn peek(&self) -> Option<Token<'a>> {
        self.peek_at(0)
    }

    fn peek_at(&self, ahead: usize) -> Option<Token<'a>> {
        self.tokens.get(self.pos + ahead).map(|(token, _)| *token)
    }

    fn next(&mut self) -> Option<Token<'a>> {
        let token = self.peek();
        self.pos += 1;
        token
    }

    fn error(&self, expected: &'static str) -> ParseError {
        match self.tokens.get(self.pos) {
            Some((_, span)) => ParseError::Unexpected {
                offset: span.start,
                found: self.source[span.clone()].to_owned(),
                expected,
            },
            None => ParseError::Eof(expected),
        }
    }

    fn expect(&mut self, token: Token<'static>, expected: &'static str) -> Result<(), ParseError> {
        if self.peek() == Some(token) {
            self.pos += 1;
            Ok(())
        } else {
            Err(self.error(expected))
        }
    }

    fn eat(&mut self, token: Token<'static>) -> bool {
        let found = self.peek() == Some(token);
        if found {
            self.pos += 1;
        }
        found
    }

    fn ident(&mut self, expected: &'static str) -> Result<&'a str, ParseError> {
        match self.peek() {
            Some(Token::Ident(name)) => {
                self.pos += 1;
                Ok(name)
            }
            _ => Err(self.error(expected)),
        }
    }

    fn specification(&mut self) -> Result<RawSpecification, ParseError> {
        self.expect(Token::Spec, "'spec'")?;
        let name = self.ident("a specification name")?;
        self.expect(Token::LBrace, "'{'")?;
        let mut raw = RawSpecification::new(name);
        loop {
            match self.peek() {
                Some(Token::Forall) => raw = raw.forall(self.quantifier()?),
                Some(Token::Check) if raw.check.is_none() => {
                    self.pos += 1;
                    raw = raw.check(self.formula()?);
                    self.eat(Token::Semicolon);
                }
                Some(Token::RBrace) => {
                    self.pos += 1;
                    return Ok(raw);
                }
                _ if raw.check.is_none() => return Err(self.error("'forall', 'check' or '}'")),
                _ => return Err(self.error("'forall' or '}'")),
            }
        }
    }

    fn quantifier(&mut self) -> Result<RawQuantifier, ParseError> {
        self.expect(Token::Forall, "'forall'")?;
        let variable = self.ident("a variable name")?;
        self.expect(Token::In, "'in'")?;
        let point = self.point()?;
        let mut quantifier = RawQuantifier::new(variable, point);
        if let Some(Token::Ident(name)) = self.peek() {
            let scope = Scope::from_name(name)
                .ok_or_else(|| self.error("a scope (global, per-context, per-occurrence)"))?;
            self.pos += 1;
            quantifier = quantifier.scope(scope);
        }
        if self.eat(Token::LBrace) && !self.eat(Token::RBrace) {
            loop {
                let field = self.ident("a field name")?;
                self.expect(Token::Colon, "':'")?;
                let ty = match self.peek() {
                    Some(Token::Ident(name)) => Type::from_name(name),
                    _ => None,
                }
                .ok_or_else(|| self.error("a type (bool, int, float, str, ref)"))?;
                self.pos += 1;
                quantifier = quantifier.field(field, ty);
                if !self.eat(Token::Comma) {
                    break;
                }
            }
            self.expect(Token::RBrace, "',' or '}'")?;
        }
        if self.eat(Token::Until) {
            quantifier = quantifier.until(self.point()?);
        }
        self.expect(Token::Semicolon, "';'")?;
        Ok(quantifier)
    }

    // Program points like `enter(f)` or `calls(module.g)`.
    fn point(&mut self) -> Result<String, ParseError> {
        let mut point = self.ident("a program point")?.to_owned();
        if self.eat(Token::LParen) {
            point.push('(');
            point.push_str(self.ident("an identifier")?);
            while self.eat(Token::Dot) {
                point.push('.');
                point.push_str(self.ident("an identifier")?);
            }
            self.expect(Token::RParen, "')'")?;
            point.push(')');
        }
        Ok(point)
    }

    fn formula(&mut self) -> Result<RawFormula, ParseError> {
        let mut disjuncts = vec![self.conjunction()?];
        while self.eat(Token::Or) {
            disjuncts.push(self.conjunction()?);
        }
        Ok(if disjuncts.len() == 1 {
            disjuncts.remove(0)
        } else {
            RawFormula::Or(disjuncts)
        })
    }

    fn conjunction(&mut self) -> Result<RawFormula, ParseError> {
        let mut conjuncts = vec![self.unary()?];
        while self.eat(Token::And) {
            conjuncts.push(self.unary()?);
        }
        Ok(if conjuncts.len() == 1 {
            conjuncts.remove(0)
        } else {
            RawFormula::And(conjuncts)
        })
    }

    fn unary(&mut self) -> Result<RawFormula, ParseError> {
        if self.eat(Token::Not) {
            Ok(RawFormula::Not(Box::new(self.unary()?)))
        } else {
            self.primary()
        }
    }

    fn primary(&mut self) -> Result<RawFormula, ParseError> {
        match (self.peek(), self.peek_at(1)) {
            (Some(Token::LParen), _) => {
                self.pos += 1;
                let formula = self.formula()?;
                self.expect(Token::RParen, "')'")?;
                Ok(formula)
            }
            (Some(Token::True), next) | (Some(Token::False), next)
                if !matches!(next, Some(Token::Cmp(_))) =>
            {
                Ok(RawFormula::Bool(self.next() == Some(Token::True)))
            }
            (Some(Token::Ident(name)), Some(Token::LParen)) if !is_timing(name) => self.apply(),
            (Some(_), _) => self.comparison(),
            (None, _) => Err(self.error("a formula")),
        }
    }

    fn comparison(&mut self) -> Result<RawFormula, ParseError> {
        let lhs = self.operand()?;
        let op = match self.peek() {
            Some(Token::Cmp(symbol)) => CmpOp::from_symbol(symbol),
            _ => None,
        }
        .ok_or_else(|| self.error("a comparison operator"))?;
        self.pos += 1;
        let rhs = self.operand()?;
        Ok(RawFormula::Compare(op, lhs, rhs))
    }

    fn operand(&mut self) -> Result<RawOperand, ParseError> {
        match self.peek() {
            Some(Token::Ident("time")) if self.peek_at(1) == Some(Token::LParen) => {
                self.pos += 2;
                let var = self.ident("a variable name")?;
                self.expect(Token::RParen, "')'")?;
                Ok(RawOperand::Time(var.to_owned()))
            }
            Some(Token::Ident("duration")) if self.peek_at(1) == Some(Token::LParen) => {
                self.pos += 2;
                let from = self.ident("a variable name")?;
                self.expect(Token::Comma, "','")?;
                let to = self.ident("a variable name")?;
                self.expect(Token::RParen, "')'")?;
                Ok(RawOperand::Duration(from.to_owned(), to.to_owned()))
            }
            Some(Token::Ident(var)) => {
                self.pos += 1;
                self.expect(Token::Dot, "'.' (operands are written 'variable.field')")?;
                let field = self.ident("a field name")?;
                Ok(RawOperand::Field(var.to_owned(), field.to_owned()))
            }
            _ => Ok(RawOperand::Literal(self.literal()?)),
        }
    }

    fn literal(&mut self) -> Result<Val, ParseError> {
        let Some((token, span)) = self.tokens.get(self.pos).cloned() else {
            return Err(ParseError::Eof("an operand"));
        };
        let invalid = || ParseError::Literal {
            offset: span.start,
            literal: self.source[span.clone()].to_owned(),
        };
        let val = match token {
            Token::True => Val::Boolean(true),
            Token::False => Val::Boolean(false),
            Token::Int(digits) => Val::Integer(digits.parse().map_err(|_| invalid())?),
            Token::Float(digits) => Val::Float(digits.parse().map_err(|_| invalid())?),
            Token::Ref(digits) => Val::Ref(digits.parse().map_err(|_| invalid())?),
            Token::Str(quoted) => Val::from(unescape(&quoted[1..quoted.len() - 1])),
            _ => return Err(self.error("an operand")),
        };
        self.pos += 1;
        Ok(val)
    }

    fn apply(&mut self) -> Result<RawFormula, ParseError> {
        let op = self.ident("an operator")?;
        self.expect(Token::LParen, "'('")?;
        let mut args = Vec::new();
        if !self.eat(Token::RParen) {
            loop {
                args.push(self.arg()?);
                if !self.eat(Token::Comma) {
                    break;
                }
            }
            self.expect(Token::RParen, "',' or ')'")?;
        }
        Ok(RawFormula::Apply(op.to_owned(), args))
    }

    // Operator arguments: variables, operands, or whole formulae.
    fn arg(&mut self) -> Result<RawArg, ParseError> {
        let start = self.pos;
        if let Some(arg) = self.simple_arg() {
            if matches!(self.peek(), Some(Token::Comma | Token::RParen)) {
                return Ok(arg);
            }
        }
        self.pos = start;
        Ok(RawArg::Formula(self.formula()?))
    }

    fn simple_arg(&mut self) -> Option<RawArg> {
        match (self.peek()?, self.peek_at(1)) {
            (Token::Ident("time"), Some(Token::LParen)) => {
                self.pos += 2;
                let var = self.ident("").ok()?;
                self.eat(Token::RParen).then(|| RawArg::Time(var.to_owned()))
            }
            (Token::Ident("duration"), Some(Token::LParen)) => {
                self.pos += 2;
                let from = self.ident("").ok()?;
                if !self.eat(Token::Comma) {
                    return None;
                }
                let to = self.ident("").ok()?;
                self.eat(Token::RParen)
                    .then(|| RawArg::Duration(from.to_owned(), to.to_owned()))
            }
            (Token::Ident(var), Some(Token::Dot)) => {
                self.pos += 2;
                let field = self.ident("").ok()?;
                Some(RawArg::Field(var.to_owned(), field.to_owned()))
            }
            (Token::Ident(var), _) => {
                self.pos += 1;
                Some(RawArg::Variable(var.to_owned()))
            }
            _ => self.literal().ok().map(RawArg::Literal),
        }
    }
}

// `time(x)` and `duration(x, y)` are operands, not operators.
fn is_timing(name: &str) -> bool {
    matches!(name, "time" | "duration")
}

fn unescape(content: &str) -> String {
    let mut unescaped = String::with_capacity(content.len());
    let mut chars = content.chars();
    while let Some(c) = chars.next() {
        if c != '\\' {
            unescaped.push(c);
            continue;
        }
        match chars.next() {
            Some('n') => unescaped.push('\n'),
            Some('t') => unescaped.push('\t'),
            Some(other) => unescaped.push(other),
            None => {}
        }
    }
    unescaped
}
