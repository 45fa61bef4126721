//! Query compiler
//!
//! Compiles WQL text (`SELECT ... FROM ... [WHERE ...]`) into a [`Query`]
//! value, or builds the same value structurally. Compilation never consults
//! the provider: unknown classes and properties are reported when the query
//! executes.

use std::fmt;

use crate::error::MiError;
use crate::predicate::{CompareOp, Predicate};
use crate::value::Value;

/// Query language accepted by the provider
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Dialect {
    #[default]
    Wql,
    Cql,
}

impl Dialect {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Dialect::Wql => "WQL",
            Dialect::Cql => "CQL",
        }
    }
}

impl fmt::Display for Dialect {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Compiled query
#[derive(Debug, Clone, PartialEq)]
pub struct Query {
    /// Target class
    class: String,
    /// Projected properties; `None` selects all
    properties: Option<Vec<String>>,
    /// WHERE clause
    predicate: Option<Predicate>,
    dialect: Dialect,
}

impl Query {
    /// Create a `SELECT *` query for a class
    pub fn new(class: impl Into<String>) -> Self {
        Self {
            class: class.into(),
            properties: None,
            predicate: None,
            dialect: Dialect::Wql,
        }
    }

    /// Compile WQL text
    ///
    /// # Errors
    /// Returns [`MiError::Compile`] for malformed text.
    pub fn parse(text: &str) -> Result<Self, MiError> {
        Self::parse_with_dialect(text, Dialect::Wql)
    }

    /// Compile query text in the given dialect
    ///
    /// # Errors
    /// Returns [`MiError::Compile`] for malformed text or a dialect the
    /// compiler does not understand.
    pub fn parse_with_dialect(text: &str, dialect: Dialect) -> Result<Self, MiError> {
        if dialect != Dialect::Wql {
            return Err(MiError::compile(0, format!("dialect {dialect} is not supported")));
        }
        let tokens = tokenize(text)?;
        Parser { tokens, pos: 0 }.query()
    }

    /// Select specific properties
    #[must_use]
    pub fn select(mut self, properties: &[&str]) -> Self {
        self.properties = Some(properties.iter().map(|p| (*p).to_string()).collect());
        self
    }

    /// Set the WHERE clause, AND-ing with any existing one
    #[must_use]
    pub fn filter(mut self, predicate: Predicate) -> Self {
        self.predicate = Some(match self.predicate.take() {
            Some(existing) => existing.and(predicate),
            None => predicate,
        });
        self
    }

    #[must_use]
    pub fn class(&self) -> &str {
        &self.class
    }

    #[must_use]
    pub fn properties(&self) -> Option<&[String]> {
        self.properties.as_deref()
    }

    #[must_use]
    pub fn predicate(&self) -> Option<&Predicate> {
        self.predicate.as_ref()
    }

    #[must_use]
    pub fn dialect(&self) -> Dialect {
        self.dialect
    }

    /// Canonical query text
    #[must_use]
    pub fn build(&self) -> String {
        let columns = match &self.properties {
            Some(properties) => properties.join(", "),
            None => "*".to_string(),
        };
        let mut text = format!("SELECT {columns} FROM {}", self.class);
        if let Some(predicate) = &self.predicate {
            text.push_str(" WHERE ");
            text.push_str(&predicate.to_string());
        }
        text
    }
}

impl fmt::Display for Query {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.build())
    }
}

#[derive(Debug, Clone, PartialEq)]
enum Token {
    Ident(String),
    Str(String),
    Number(String),
    Symbol(&'static str),
    End,
}

impl Token {
    fn describe(&self) -> String {
        match self {
            Token::Ident(s) => format!("'{s}'"),
            Token::Str(s) => format!("string '{s}'"),
            Token::Number(s) => format!("number {s}"),
            Token::Symbol(s) => format!("'{s}'"),
            Token::End => "end of query".to_string(),
        }
    }

    fn is_keyword(&self, keyword: &str) -> bool {
        matches!(self, Token::Ident(s) if s.eq_ignore_ascii_case(keyword))
    }
}

const KEYWORDS: &[&str] = &[
    "SELECT", "FROM", "WHERE", "AND", "OR", "NOT", "LIKE", "IS", "NULL", "TRUE", "FALSE",
];

fn tokenize(text: &str) -> Result<Vec<(usize, Token)>, MiError> {
    let mut tokens = Vec::new();
    let mut chars = text.char_indices().peekable();

    while let Some(&(start, c)) = chars.peek() {
        if c.is_whitespace() {
            chars.next();
        } else if c.is_ascii_alphabetic() || c == '_' {
            let mut ident = String::new();
            while let Some(&(_, c)) = chars.peek() {
                if !(c.is_ascii_alphanumeric() || c == '_') {
                    break;
                }
                ident.push(c);
                chars.next();
            }
            tokens.push((start, Token::Ident(ident)));
        } else if c.is_ascii_digit() || c == '-' {
            let mut number = String::from(c);
            chars.next();
            while let Some(&(_, c)) = chars.peek() {
                let exponent_sign =
                    matches!(c, '+' | '-') && number.ends_with(['e', 'E']);
                if !(c.is_ascii_digit() || matches!(c, '.' | 'e' | 'E') || exponent_sign) {
                    break;
                }
                number.push(c);
                chars.next();
            }
            if number == "-" {
                return Err(MiError::compile(start, "expected digits after '-'"));
            }
            tokens.push((start, Token::Number(number)));
        } else if c == '\'' || c == '"' {
            let quote = c;
            chars.next();
            let mut literal = String::new();
            loop {
                match chars.next() {
                    Some((_, c)) if c == quote => break,
                    // backslash escapes itself and either quote; any other
                    // character after it is kept as written
                    Some((_, '\\')) => match chars.peek() {
                        Some(&(_, next)) if matches!(next, '\\' | '\'' | '"') => {
                            literal.push(next);
                            chars.next();
                        }
                        _ => literal.push('\\'),
                    },
                    Some((_, c)) => literal.push(c),
                    None => return Err(MiError::compile(start, "unterminated string literal")),
                }
            }
            tokens.push((start, Token::Str(literal)));
        } else {
            chars.next();
            let next = chars.peek().map(|&(_, c)| c);
            let symbol = match (c, next) {
                ('<', Some('>')) => "<>",
                ('<', Some('=')) => "<=",
                ('>', Some('=')) => ">=",
                ('!', Some('=')) => "!=",
                ('<', _) => "<",
                ('>', _) => ">",
                ('=', _) => "=",
                ('*', _) => "*",
                (',', _) => ",",
                ('(', _) => "(",
                (')', _) => ")",
                _ => return Err(MiError::compile(start, format!("unexpected character '{c}'"))),
            };
            if symbol.len() == 2 {
                chars.next();
            }
            tokens.push((start, Token::Symbol(symbol)));
        }
    }

    tokens.push((text.len(), Token::End));
    Ok(tokens)
}

struct Parser {
    tokens: Vec<(usize, Token)>,
    pos: usize,
}

impl Parser {
    fn peek(&self) -> &Token {
        &self.tokens[self.pos].1
    }

    fn offset(&self) -> usize {
        self.tokens[self.pos].0
    }

    fn advance(&mut self) -> Token {
        let token = self.tokens[self.pos].1.clone();
        if token != Token::End {
            self.pos += 1;
        }
        token
    }

    fn error(&self, expected: &str) -> MiError {
        MiError::compile(
            self.offset(),
            format!("expected {expected}, found {}", self.peek().describe()),
        )
    }

    fn eat_keyword(&mut self, keyword: &str) -> bool {
        if self.peek().is_keyword(keyword) {
            self.advance();
            true
        } else {
            false
        }
    }

    fn expect_keyword(&mut self, keyword: &str) -> Result<(), MiError> {
        if self.eat_keyword(keyword) {
            Ok(())
        } else {
            Err(self.error(keyword))
        }
    }

    fn eat_symbol(&mut self, symbol: &str) -> bool {
        if matches!(self.peek(), Token::Symbol(s) if *s == symbol) {
            self.advance();
            true
        } else {
            false
        }
    }

    fn identifier(&mut self, what: &str) -> Result<String, MiError> {
        match self.peek() {
            Token::Ident(name) if !KEYWORDS.iter().any(|k| name.eq_ignore_ascii_case(k)) => {
                let name = name.clone();
                self.advance();
                Ok(name)
            }
            _ => Err(self.error(what)),
        }
    }

    fn query(mut self) -> Result<Query, MiError> {
        self.expect_keyword("SELECT")?;

        let properties = if self.eat_symbol("*") {
            None
        } else {
            let mut properties = vec![self.identifier("property name or '*'")?];
            while self.eat_symbol(",") {
                properties.push(self.identifier("property name")?);
            }
            Some(properties)
        };

        self.expect_keyword("FROM")?;
        let class = self.identifier("class name")?;

        let predicate = if self.eat_keyword("WHERE") {
            Some(self.or_expr()?)
        } else {
            None
        };

        if *self.peek() != Token::End {
            return Err(self.error("end of query"));
        }

        Ok(Query {
            class,
            properties,
            predicate,
            dialect: Dialect::Wql,
        })
    }

    fn or_expr(&mut self) -> Result<Predicate, MiError> {
        let mut left = self.and_expr()?;
        while self.eat_keyword("OR") {
            left = left.or(self.and_expr()?);
        }
        Ok(left)
    }

    fn and_expr(&mut self) -> Result<Predicate, MiError> {
        let mut left = self.not_expr()?;
        while self.eat_keyword("AND") {
            left = left.and(self.not_expr()?);
        }
        Ok(left)
    }

    fn not_expr(&mut self) -> Result<Predicate, MiError> {
        if self.eat_keyword("NOT") {
            return Ok(self.not_expr()?.not());
        }
        if self.eat_symbol("(") {
            let inner = self.or_expr()?;
            if !self.eat_symbol(")") {
                return Err(self.error("')'"));
            }
            return Ok(inner);
        }
        self.comparison()
    }

    fn comparison(&mut self) -> Result<Predicate, MiError> {
        let property = self.identifier("property name")?;

        if self.eat_keyword("IS") {
            let negated = self.eat_keyword("NOT");
            self.expect_keyword("NULL")?;
            return Ok(Predicate::IsNull { property, negated });
        }

        let op = if self.eat_keyword("LIKE") {
            CompareOp::Like
        } else {
            match self.peek() {
                Token::Symbol("=") => CompareOp::Eq,
                Token::Symbol("<>" | "!=") => CompareOp::Ne,
                Token::Symbol("<") => CompareOp::Lt,
                Token::Symbol("<=") => CompareOp::Le,
                Token::Symbol(">") => CompareOp::Gt,
                Token::Symbol(">=") => CompareOp::Ge,
                _ => return Err(self.error("comparison operator")),
            }
        };
        if op != CompareOp::Like {
            self.advance();
        }

        let value = self.literal()?;
        if op == CompareOp::Like && value.as_str().is_none() {
            return Err(self.error("string pattern after LIKE"));
        }

        Ok(Predicate::Compare {
            property,
            op,
            value,
        })
    }

    fn literal(&mut self) -> Result<Value, MiError> {
        let offset = self.offset();
        match self.peek().clone() {
            Token::Str(s) => {
                self.advance();
                Ok(Value::String(s))
            }
            Token::Number(n) => {
                self.advance();
                parse_number(&n).ok_or_else(|| MiError::compile(offset, format!("invalid number {n}")))
            }
            token if token.is_keyword("TRUE") => {
                self.advance();
                Ok(Value::Bool(true))
            }
            token if token.is_keyword("FALSE") => {
                self.advance();
                Ok(Value::Bool(false))
            }
            token if token.is_keyword("NULL") => {
                self.advance();
                Ok(Value::Null)
            }
            _ => Err(self.error("literal")),
        }
    }
}

fn parse_number(text: &str) -> Option<Value> {
    if text.contains(['.', 'e', 'E']) {
        text.parse().ok().map(Value::F64)
    } else if text.starts_with('-') {
        text.parse().ok().map(Value::I64)
    } else {
        text.parse().ok().map(Value::U64)
    }
}

/// Queries issued by the bundled collectors
pub mod queries {
    use super::Query;

    /// Installed printers
    #[must_use]
    pub fn printers() -> Query {
        Query::new("win32_Printer").select(&[
            "Name",
            "Default",
            "PrinterStatus",
            "JobCountSinceLastReset",
        ])
    }

    /// Queued print jobs
    #[must_use]
    pub fn print_jobs() -> Query {
        Query::new("win32_PrintJob").select(&["Name", "Status"])
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_projection_and_filter() {
        let query = Query::parse("select Name from win32_process where handle = 0").unwrap();
        assert_eq!(query.class(), "win32_process");
        assert_eq!(query.properties(), Some(&["Name".to_string()][..]));
        assert_eq!(query.predicate(), Some(&Predicate::eq("handle", 0u64)));
        assert_eq!(query.dialect(), Dialect::Wql);
    }

    #[test]
    fn test_parse_star_and_precedence() {
        let query =
            Query::parse("SELECT * FROM Win32_Process WHERE Handle = 0 OR Handle = 4 AND NOT Name LIKE 'x%'")
                .unwrap();
        assert_eq!(query.properties(), None);
        let expected = Predicate::eq("Handle", 0u64).or(Predicate::eq("Handle", 4u64)
            .and(Predicate::like("Name", "x%").not()));
        assert_eq!(query.predicate(), Some(&expected));
    }

    #[test]
    fn test_parse_literals() {
        let query = Query::parse(
            r#"SELECT A FROM C WHERE (A = 'it\'s' OR A = "q") AND B <> -2 AND D >= 1.5 AND E = TRUE AND F IS NOT NULL"#,
        )
        .unwrap();
        let text = query.to_string();
        assert_eq!(
            text,
            r"SELECT A FROM C WHERE (((((A = 'it\'s' OR A = 'q') AND B <> -2) AND D >= 1.5) AND E = TRUE) AND F IS NOT NULL)"
        );
        // canonical text compiles back to the same query
        assert_eq!(Query::parse(&text).unwrap(), query);
    }

    #[test]
    fn test_backslash_escapes() {
        let query = Query::parse(
            r#"SELECT Name FROM Win32_Directory WHERE Name = 'C:\\Windows' OR Name = "say \"hi\"" OR Name = 'a\b'"#,
        )
        .unwrap();
        let expected = Predicate::eq("Name", r"C:\Windows")
            .or(Predicate::eq("Name", r#"say "hi""#))
            .or(Predicate::eq("Name", r"a\b"));
        assert_eq!(query.predicate(), Some(&expected));
    }

    #[test]
    fn test_build_escapes_literals() {
        let query = Query::new("Win32_Directory")
            .select(&["Name"])
            .filter(Predicate::eq("Name", r"C:\Program Files\it's"));
        let text = query.build();
        assert_eq!(
            text,
            r"SELECT Name FROM Win32_Directory WHERE Name = 'C:\\Program Files\\it\'s'"
        );
        assert_eq!(Query::parse(&text).unwrap(), query);
    }

    #[test]
    fn test_build_floats_recompile() {
        for value in [1e21, 2.0, -0.25, 1.5e-7, f64::MAX] {
            let query = Query::new("C").filter(Predicate::eq("A", value));
            assert_eq!(Query::parse(&query.build()).unwrap(), query, "{value}");
        }
        let query = Query::new("C").filter(Predicate::eq("A", f64::INFINITY));
        assert_eq!(Query::parse(&query.build()).unwrap(), query);

        let query = Query::new("C").filter(Predicate::eq("A", f64::NAN));
        assert_eq!(query.build(), "SELECT * FROM C WHERE A = NULL");
        assert!(Query::parse(&query.build()).is_ok());
    }

    #[test]
    fn test_malformed_queries_fail() {
        for text in [
            "",
            "SELECT",
            "SELECT Name",
            "SELECT Name FROM",
            "SELECT Name, FROM C",
            "SELECT Name FROM C WHERE",
            "SELECT Name FROM C WHERE A =",
            "SELECT Name FROM C WHERE A = 'open",
            r"SELECT Name FROM C WHERE A = 'open\'",
            "SELECT Name FROM C WHERE A = 'it''s'",
            "SELECT Name FROM C WHERE A = 1e",
            "SELECT Name FROM C extra",
            "SELECT Name FROM C WHERE (A = 1",
            "SELECT Name FROM C WHERE A LIKE 3",
            "SELECT FROM FROM C",
            "SELECT Name FROM C WHERE A # 1",
        ] {
            let err = Query::parse(text).unwrap_err();
            assert!(matches!(err, MiError::Compile { .. }), "{text}: {err}");
        }
    }

    #[test]
    fn test_error_offset() {
        let err = Query::parse("SELECT Name FROM C WHERE A ? 1").unwrap_err();
        assert_eq!(
            err,
            MiError::Compile {
                offset: 27,
                message: "unexpected character '?'".to_string()
            }
        );
    }

    #[test]
    fn test_cql_not_supported() {
        let err = Query::parse_with_dialect("SELECT * FROM C", Dialect::Cql).unwrap_err();
        assert!(matches!(err, MiError::Compile { .. }));
    }

    #[test]
    fn test_builder() {
        let query = Query::new("Win32_Process")
            .select(&["Name"])
            .filter(Predicate::eq("Handle", 0u64))
            .filter(Predicate::is_null("Parent"));
        assert_eq!(
            query.build(),
            "SELECT Name FROM Win32_Process WHERE (Handle = 0 AND Parent IS NULL)"
        );
    }

    #[test]
    fn test_predefined_queries() {
        let sql = queries::printers().build();
        assert!(sql.starts_with("SELECT Name, Default, PrinterStatus"));
        assert!(sql.ends_with("FROM win32_Printer"));
    }
}
