//! Parser for the query language accepted by the gateway.
//!
//! Only the subset needed to address flat operations is understood: one
//! `query` operation (keyword optional) with an optional name and variable
//! definitions, and a selection set of root fields with optional aliases and
//! scalar or variable arguments. Anything else either fails to parse or is
//! refused with a validation error naming the unsupported construct.

use std::fmt;

use super::errors::QueryError;

/// Deepest list nesting accepted in a variable type such as `[[String]]`.
const MAX_LIST_DEPTH: usize = 32;

/// A parsed query operation.
#[derive(Debug, Clone, PartialEq)]
pub struct QueryDocument {
    operation_name: Option<String>,
    variables: Vec<VariableDefinition>,
    fields: Vec<Field>,
}

impl QueryDocument {
    /// Name given after the `query` keyword.
    #[must_use]
    pub fn operation_name(&self) -> Option<&str> {
        self.operation_name.as_deref()
    }

    /// Declared variables, in source order.
    #[must_use]
    pub fn variables(&self) -> &[VariableDefinition] {
        &self.variables
    }

    /// Root fields, in source order.
    #[must_use]
    pub fn fields(&self) -> &[Field] {
        &self.fields
    }
}

/// `$name: Type = default`
#[derive(Debug, Clone, PartialEq)]
pub struct VariableDefinition {
    name: String,
    type_ref: TypeRef,
    default: Option<InputValue>,
}

impl VariableDefinition {
    /// Variable name without the `$`.
    #[must_use]
    pub fn name(&self) -> &str {
        self.name.as_str()
    }

    /// Declared type.
    #[must_use]
    pub fn type_ref(&self) -> &TypeRef {
        &self.type_ref
    }

    /// Default value, if one was declared.
    #[must_use]
    pub fn default_value(&self) -> Option<&InputValue> {
        self.default.as_ref()
    }
}

/// A variable's declared type.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TypeRef {
    /// A named type such as `String`.
    Named(String),
    /// `[T]`
    List(Box<TypeRef>),
    /// `T!`
    NonNull(Box<TypeRef>),
}

impl TypeRef {
    /// Whether a value must be supplied.
    #[must_use]
    pub const fn is_non_null(&self) -> bool {
        matches!(self, Self::NonNull(_))
    }
}

impl fmt::Display for TypeRef {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Named(name) => formatter.write_str(name),
            Self::List(inner) => write!(formatter, "[{inner}]"),
            Self::NonNull(inner) => write!(formatter, "{inner}!"),
        }
    }
}

/// A root field selection.
#[derive(Debug, Clone, PartialEq)]
pub struct Field {
    alias: Option<String>,
    name: String,
    arguments: Vec<(String, InputValue)>,
}

impl Field {
    /// Field (operation) name.
    #[must_use]
    pub fn name(&self) -> &str {
        self.name.as_str()
    }

    /// Alias, if given.
    #[must_use]
    pub fn alias(&self) -> Option<&str> {
        self.alias.as_deref()
    }

    /// Key under which the result appears in `data`.
    #[must_use]
    pub fn response_key(&self) -> &str {
        self.alias.as_deref().unwrap_or(self.name.as_str())
    }

    /// Arguments in source order.
    #[must_use]
    pub fn arguments(&self) -> &[(String, InputValue)] {
        &self.arguments
    }
}

/// An argument or default value as written in the document.
#[derive(Debug, Clone, PartialEq)]
pub enum InputValue {
    /// `null`
    Null,
    /// `true` or `false`
    Boolean(bool),
    /// Integer literal.
    Int(i64),
    /// Float literal.
    Float(f64),
    /// String literal, escapes resolved.
    String(String),
    /// `$name` reference.
    Variable(String),
}

/// Parses `source` into a [`QueryDocument`].
///
/// # Errors
///
/// Returns [`QueryError::Syntax`] for malformed input and
/// [`QueryError::Validation`] for well-formed constructs the gateway does not
/// serve (mutations, subscriptions, fragments, directives, nested
/// selections, list or object values).
pub fn parse(source: &str) -> Result<QueryDocument, QueryError> {
    let tokens = Lexer::new(source).tokenize()?;
    Parser {
        source,
        tokens,
        index: 0,
    }
    .document()
}

#[derive(Debug, Clone, PartialEq)]
enum Token {
    Punct(char),
    Spread,
    Name(String),
    Int(i64),
    Float(f64),
    Str(String),
    End,
}

impl fmt::Display for Token {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Punct(ch) => write!(formatter, "\"{ch}\""),
            Self::Spread => formatter.write_str("\"...\""),
            Self::Name(name) => write!(formatter, "Name \"{name}\""),
            Self::Int(value) => write!(formatter, "Int \"{value}\""),
            Self::Float(value) => write!(formatter, "Float \"{value}\""),
            Self::Str(value) => write!(formatter, "String {value:?}"),
            Self::End => formatter.write_str("<EOF>"),
        }
    }
}

#[derive(Debug)]
struct Spanned {
    token: Token,
    offset: usize,
}

fn syntax_error(source: &str, offset: usize, message: impl Into<String>) -> QueryError {
    let before = source.get(..offset).unwrap_or(source);
    let line = before.matches('\n').count() + 1;
    let column = before
        .rsplit('\n')
        .next()
        .map_or(0, |tail| tail.chars().count())
        + 1;
    QueryError::Syntax {
        message: message.into(),
        line,
        column,
    }
}

struct Lexer<'a> {
    source: &'a str,
    offset: usize,
}

impl<'a> Lexer<'a> {
    const fn new(source: &'a str) -> Self {
        Self { source, offset: 0 }
    }

    fn tokenize(mut self) -> Result<Vec<Spanned>, QueryError> {
        let mut tokens = Vec::new();
        loop {
            let spanned = self.next_token()?;
            let done = spanned.token == Token::End;
            tokens.push(spanned);
            if done {
                return Ok(tokens);
            }
        }
    }

    fn rest(&self) -> &'a str {
        self.source.get(self.offset..).unwrap_or_default()
    }

    fn peek(&self) -> Option<char> {
        self.rest().chars().next()
    }

    fn bump(&mut self) -> Option<char> {
        let ch = self.peek()?;
        self.offset += ch.len_utf8();
        Some(ch)
    }

    fn error_at(&self, offset: usize, message: impl Into<String>) -> QueryError {
        syntax_error(self.source, offset, message)
    }

    fn skip_ignored(&mut self) {
        while let Some(ch) = self.peek() {
            match ch {
                ' ' | '\t' | '\n' | '\r' | ',' | '\u{feff}' => {
                    self.bump();
                }
                '#' => {
                    while self.peek().is_some_and(|c| c != '\n' && c != '\r') {
                        self.bump();
                    }
                }
                _ => break,
            }
        }
    }

    fn next_token(&mut self) -> Result<Spanned, QueryError> {
        self.skip_ignored();
        let offset = self.offset;
        let Some(ch) = self.peek() else {
            return Ok(Spanned {
                token: Token::End,
                offset,
            });
        };
        let token = match ch {
            '{' | '}' | '(' | ')' | '[' | ']' | ':' | '$' | '!' | '=' | '@' => {
                self.bump();
                Token::Punct(ch)
            }
            '.' if self.rest().starts_with("...") => {
                self.offset += 3;
                Token::Spread
            }
            '"' => self.string()?,
            '-' | '0'..='9' => self.number()?,
            c if c == '_' || c.is_ascii_alphabetic() => self.name(),
            other => return Err(self.error_at(offset, format!("Unexpected character {other:?}"))),
        };
        Ok(Spanned { token, offset })
    }

    fn name(&mut self) -> Token {
        let start = self.offset;
        while self
            .peek()
            .is_some_and(|c| c == '_' || c.is_ascii_alphanumeric())
        {
            self.bump();
        }
        Token::Name(self.source.get(start..self.offset).unwrap_or_default().to_owned())
    }

    fn digits(&mut self) -> bool {
        let start = self.offset;
        while self.peek().is_some_and(|c| c.is_ascii_digit()) {
            self.bump();
        }
        self.offset > start
    }

    fn number(&mut self) -> Result<Token, QueryError> {
        let start = self.offset;
        if self.peek() == Some('-') {
            self.bump();
        }
        let integer_start = self.offset;
        if !self.digits() {
            return Err(self.error_at(self.offset, "Invalid number, expected digit"));
        }
        if self.offset - integer_start > 1 && self.source.get(integer_start..=integer_start) == Some("0") {
            return Err(self.error_at(integer_start, "Invalid number, unexpected digit after 0"));
        }
        let mut is_float = false;
        if self.peek() == Some('.') {
            self.bump();
            is_float = true;
            if !self.digits() {
                return Err(self.error_at(self.offset, "Invalid number, expected digit after \".\""));
            }
        }
        if matches!(self.peek(), Some('e' | 'E')) {
            self.bump();
            is_float = true;
            if matches!(self.peek(), Some('+' | '-')) {
                self.bump();
            }
            if !self.digits() {
                return Err(self.error_at(self.offset, "Invalid number, expected digit in exponent"));
            }
        }
        if self
            .peek()
            .is_some_and(|c| c == '_' || c == '.' || c.is_ascii_alphabetic())
        {
            return Err(self.error_at(self.offset, "Invalid number, unexpected character"));
        }

        let text = self.source.get(start..self.offset).unwrap_or_default();
        if is_float {
            text.parse()
                .map(Token::Float)
                .map_err(|_| self.error_at(start, format!("Float cannot represent value {text}")))
        } else {
            text.parse()
                .map(Token::Int)
                .map_err(|_| self.error_at(start, format!("Int cannot represent value {text}")))
        }
    }

    fn string(&mut self) -> Result<Token, QueryError> {
        let start = self.offset;
        if self.rest().starts_with("\"\"\"") {
            return Err(self.error_at(start, "Block strings are not supported"));
        }
        self.bump();
        let mut value = String::new();
        loop {
            let at = self.offset;
            match self.bump() {
                None | Some('\n' | '\r') => {
                    return Err(self.error_at(at, "Unterminated string"));
                }
                Some('"') => return Ok(Token::Str(value)),
                Some('\\') => value.push(self.escape(at)?),
                Some(ch) => value.push(ch),
            }
        }
    }

    fn escape(&mut self, at: usize) -> Result<char, QueryError> {
        match self.bump() {
            Some('"') => Ok('"'),
            Some('\\') => Ok('\\'),
            Some('/') => Ok('/'),
            Some('b') => Ok('\u{8}'),
            Some('f') => Ok('\u{c}'),
            Some('n') => Ok('\n'),
            Some('r') => Ok('\r'),
            Some('t') => Ok('\t'),
            Some('u') => {
                let source = self.source;
                let decoded = source
                    .get(self.offset..self.offset + 4)
                    .filter(|hex| hex.bytes().all(|b| b.is_ascii_hexdigit()))
                    .and_then(|hex| u32::from_str_radix(hex, 16).ok())
                    .and_then(char::from_u32)
                    .ok_or_else(|| self.error_at(at, "Invalid Unicode escape sequence"))?;
                self.offset += 4;
                Ok(decoded)
            }
            _ => Err(self.error_at(at, "Invalid character escape sequence")),
        }
    }
}

struct Parser<'a> {
    source: &'a str,
    tokens: Vec<Spanned>,
    index: usize,
}

impl Parser<'_> {
    fn current(&self) -> Option<&Spanned> {
        self.tokens.get(self.index).or_else(|| self.tokens.last())
    }

    fn peek(&self) -> Token {
        self.current()
            .map_or(Token::End, |spanned| spanned.token.clone())
    }

    fn at(&self, ch: char) -> bool {
        self.current()
            .is_some_and(|spanned| spanned.token == Token::Punct(ch))
    }

    fn advance(&mut self) {
        if self.index + 1 < self.tokens.len() {
            self.index += 1;
        }
    }

    fn error(&self, message: impl Into<String>) -> QueryError {
        let offset = self.current().map_or(self.source.len(), |spanned| spanned.offset);
        syntax_error(self.source, offset, message)
    }

    fn unexpected(&self) -> QueryError {
        self.error(format!("Unexpected {}", self.peek()))
    }

    fn expect(&mut self, ch: char) -> Result<(), QueryError> {
        if self.at(ch) {
            self.advance();
            Ok(())
        } else {
            Err(self.error(format!("Expected \"{ch}\", found {}", self.peek())))
        }
    }

    fn expect_name(&mut self) -> Result<String, QueryError> {
        match self.peek() {
            Token::Name(name) => {
                self.advance();
                Ok(name)
            }
            other => Err(self.error(format!("Expected Name, found {other}"))),
        }
    }

    fn document(mut self) -> Result<QueryDocument, QueryError> {
        let document = self.definition()?;
        match self.peek() {
            Token::End => Ok(document),
            Token::Punct('{') | Token::Name(_) => Err(QueryError::validation(
                "documents with more than one operation are not supported",
            )),
            _ => Err(self.unexpected()),
        }
    }

    fn definition(&mut self) -> Result<QueryDocument, QueryError> {
        match self.peek() {
            Token::Punct('{') => Ok(QueryDocument {
                operation_name: None,
                variables: Vec::new(),
                fields: self.selection_set()?,
            }),
            Token::Name(keyword) if keyword == "query" => {
                self.advance();
                self.operation()
            }
            Token::Name(keyword) if keyword == "mutation" || keyword == "subscription" => Err(
                QueryError::validation(format!("{keyword} operations are not supported")),
            ),
            Token::Name(keyword) if keyword == "fragment" => {
                Err(QueryError::validation("fragments are not supported"))
            }
            _ => Err(self.unexpected()),
        }
    }

    fn operation(&mut self) -> Result<QueryDocument, QueryError> {
        let operation_name = match self.peek() {
            Token::Name(name) => {
                self.advance();
                Some(name)
            }
            _ => None,
        };
        let variables = if self.at('(') {
            self.variable_definitions()?
        } else {
            Vec::new()
        };
        if self.at('@') {
            return Err(QueryError::validation("directives are not supported"));
        }
        let fields = self.selection_set()?;
        Ok(QueryDocument {
            operation_name,
            variables,
            fields,
        })
    }

    fn variable_definitions(&mut self) -> Result<Vec<VariableDefinition>, QueryError> {
        self.expect('(')?;
        let mut definitions: Vec<VariableDefinition> = Vec::new();
        loop {
            self.expect('$')?;
            let name = self.expect_name()?;
            self.expect(':')?;
            let type_ref = self.type_ref(0)?;
            let default = if self.at('=') {
                self.advance();
                Some(self.value(true)?)
            } else {
                None
            };
            if definitions.iter().any(|existing| existing.name == name) {
                return Err(QueryError::validation(format!(
                    "There can be only one variable named \"${name}\"."
                )));
            }
            definitions.push(VariableDefinition {
                name,
                type_ref,
                default,
            });
            if self.at(')') {
                self.advance();
                return Ok(definitions);
            }
        }
    }

    fn type_ref(&mut self, depth: usize) -> Result<TypeRef, QueryError> {
        let base = if self.at('[') {
            if depth >= MAX_LIST_DEPTH {
                return Err(QueryError::validation(format!(
                    "variable types may nest lists at most {MAX_LIST_DEPTH} levels deep"
                )));
            }
            self.advance();
            let inner = self.type_ref(depth + 1)?;
            self.expect(']')?;
            TypeRef::List(Box::new(inner))
        } else {
            TypeRef::Named(self.expect_name()?)
        };
        if self.at('!') {
            self.advance();
            Ok(TypeRef::NonNull(Box::new(base)))
        } else {
            Ok(base)
        }
    }

    fn selection_set(&mut self) -> Result<Vec<Field>, QueryError> {
        self.expect('{')?;
        let mut fields = Vec::new();
        loop {
            if self.peek() == Token::Spread {
                return Err(QueryError::validation("fragments are not supported"));
            }
            fields.push(self.field()?);
            if self.at('}') {
                self.advance();
                return Ok(fields);
            }
        }
    }

    fn field(&mut self) -> Result<Field, QueryError> {
        let first = self.expect_name()?;
        let (alias, name) = if self.at(':') {
            self.advance();
            (Some(first), self.expect_name()?)
        } else {
            (None, first)
        };
        let arguments = if self.at('(') {
            self.arguments()?
        } else {
            Vec::new()
        };
        if self.at('@') {
            return Err(QueryError::validation("directives are not supported"));
        }
        if self.at('{') {
            return Err(QueryError::validation(format!(
                "Field \"{name}\" must not have a selection since it returns a scalar."
            )));
        }
        Ok(Field {
            alias,
            name,
            arguments,
        })
    }

    fn arguments(&mut self) -> Result<Vec<(String, InputValue)>, QueryError> {
        self.expect('(')?;
        let mut arguments: Vec<(String, InputValue)> = Vec::new();
        loop {
            let name = self.expect_name()?;
            self.expect(':')?;
            let value = self.value(false)?;
            if arguments.iter().any(|(existing, _)| *existing == name) {
                return Err(QueryError::validation(format!(
                    "There can be only one argument named \"{name}\"."
                )));
            }
            arguments.push((name, value));
            if self.at(')') {
                self.advance();
                return Ok(arguments);
            }
        }
    }

    fn value(&mut self, constant: bool) -> Result<InputValue, QueryError> {
        let value = match self.peek() {
            Token::Punct('$') if !constant => {
                self.advance();
                return Ok(InputValue::Variable(self.expect_name()?));
            }
            Token::Int(value) => InputValue::Int(value),
            Token::Float(value) => InputValue::Float(value),
            Token::Str(value) => InputValue::String(value),
            Token::Name(name) => match name.as_str() {
                "true" => InputValue::Boolean(true),
                "false" => InputValue::Boolean(false),
                "null" => InputValue::Null,
                _ => return Err(QueryError::validation("enum values are not supported")),
            },
            Token::Punct('[' | '{') => {
                return Err(QueryError::validation(
                    "list and object values are not supported",
                ));
            }
            _ => return Err(self.unexpected()),
        };
        self.advance();
        Ok(value)
    }
}
