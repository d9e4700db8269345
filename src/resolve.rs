//! Default-expression resolution.
//!
//! Formal defaults are stored as source expressions. [`ExprResolver`] is a
//! sandboxed evaluator for the literal subset those defaults use in practice:
//! constants, `c()`, `list()`, empty-vector constructors, `getOption()` and
//! names bound in the function's defining namespace. It never calls into user
//! code; anything outside that subset is reported as unsupported.

use crate::docdb::Bindings;
use crate::model::RValue;
use std::collections::BTreeMap;
use thiserror::Error;

/// Evaluation options visible to `getOption()`.
pub type Options = BTreeMap<String, RValue>;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum ResolveError {
    #[error("syntax error at offset {offset}: {message}")]
    Syntax { offset: usize, message: String },

    #[error("object `{0}` not found")]
    UnknownSymbol(String),

    #[error("unsupported expression: {0}")]
    Unsupported(String),

    #[error("invalid argument: {0}")]
    InvalidArgument(String),
}

/// Capability for turning a default expression into a value.
pub trait DefaultResolver {
    fn resolve_default(&self, expr: &str, namespace: &Bindings) -> Result<RValue, ResolveError>;
}

/// Evaluator for literal default expressions.
pub struct ExprResolver<'a> {
    options: &'a Options,
}

impl<'a> ExprResolver<'a> {
    pub fn new(options: &'a Options) -> Self {
        ExprResolver { options }
    }
}

impl DefaultResolver for ExprResolver<'_> {
    fn resolve_default(&self, expr: &str, namespace: &Bindings) -> Result<RValue, ResolveError> {
        let source = expr.trim();
        if is_closure(source) {
            return Ok(RValue::Function(source.to_string()));
        }
        let tokens = tokenize(source)?;
        let mut eval = Evaluator {
            tokens,
            pos: 0,
            options: self.options,
            namespace,
        };
        let value = eval.expr()?;
        match eval.next() {
            None => Ok(value),
            Some((offset, tok)) => Err(ResolveError::Syntax {
                offset,
                message: format!("unexpected {:?}", tok),
            }),
        }
    }
}

fn is_closure(source: &str) -> bool {
    source
        .strip_prefix("function")
        .is_some_and(|rest| rest.trim_start().starts_with('('))
        || source.starts_with("\\(")
}

#[derive(Debug, Clone, PartialEq)]
enum Token {
    Num(RValue),
    Str(String),
    Ident(String),
    LParen,
    RParen,
    Comma,
    Assign,
    Minus,
    Plus,
}

fn tokenize(src: &str) -> Result<Vec<(usize, Token)>, ResolveError> {
    let chars: Vec<char> = src.chars().collect();
    let mut tokens = Vec::new();
    let mut i = 0;
    while i < chars.len() {
        let c = chars[i];
        let start = i;
        match c {
            _ if c.is_whitespace() => {
                i += 1;
                continue;
            }
            '(' => tokens.push((start, Token::LParen)),
            ')' => tokens.push((start, Token::RParen)),
            ',' => tokens.push((start, Token::Comma)),
            '=' => tokens.push((start, Token::Assign)),
            '-' => tokens.push((start, Token::Minus)),
            '+' => tokens.push((start, Token::Plus)),
            '"' | '\'' => {
                let (text, end) = read_string(&chars, i)?;
                tokens.push((start, Token::Str(text)));
                i = end;
                continue;
            }
            '`' => {
                let end = chars[i + 1..]
                    .iter()
                    .position(|&ch| ch == '`')
                    .map(|p| p + i + 1)
                    .ok_or_else(|| syntax(start, "unterminated backtick name"))?;
                tokens.push((start, Token::Ident(chars[i + 1..end].iter().collect())));
                i = end + 1;
                continue;
            }
            _ if c.is_ascii_digit() || (c == '.' && next_is_digit(&chars, i)) => {
                let (value, end) = read_number(&chars, i)?;
                tokens.push((start, Token::Num(value)));
                i = end;
                continue;
            }
            _ if c.is_alphabetic() || c == '.' => {
                let end = chars[i..]
                    .iter()
                    .position(|&ch| !(ch.is_alphanumeric() || ch == '.' || ch == '_'))
                    .map_or(chars.len(), |p| p + i);
                tokens.push((start, Token::Ident(chars[i..end].iter().collect())));
                i = end;
                continue;
            }
            _ => {
                return Err(ResolveError::Unsupported(format!(
                    "operator `{}` in `{}`",
                    c, src
                )))
            }
        }
        i += 1;
    }
    Ok(tokens)
}

fn syntax(offset: usize, message: &str) -> ResolveError {
    ResolveError::Syntax {
        offset,
        message: message.to_string(),
    }
}

fn next_is_digit(chars: &[char], i: usize) -> bool {
    chars.get(i + 1).is_some_and(|c| c.is_ascii_digit())
}

fn read_string(chars: &[char], start: usize) -> Result<(String, usize), ResolveError> {
    let quote = chars[start];
    let mut out = String::new();
    let mut i = start + 1;
    while i < chars.len() {
        match chars[i] {
            c if c == quote => return Ok((out, i + 1)),
            '\\' => {
                let escaped = chars
                    .get(i + 1)
                    .ok_or_else(|| syntax(i, "dangling escape"))?;
                out.push(match escaped {
                    'n' => '\n',
                    't' => '\t',
                    'r' => '\r',
                    '0' => '\0',
                    other => *other,
                });
                i += 2;
            }
            c => {
                out.push(c);
                i += 1;
            }
        }
    }
    Err(syntax(start, "unterminated string"))
}

fn read_number(chars: &[char], start: usize) -> Result<(RValue, usize), ResolveError> {
    let mut i = start;
    let is_hex = chars[i] == '0' && matches!(chars.get(i + 1), Some('x' | 'X'));
    let text: String;
    if is_hex {
        i += 2;
        while i < chars.len() && chars[i].is_ascii_hexdigit() {
            i += 1;
        }
        text = chars[start + 2..i].iter().collect();
    } else {
        while i < chars.len() && (chars[i].is_ascii_digit() || chars[i] == '.') {
            i += 1;
        }
        if i < chars.len() && matches!(chars[i], 'e' | 'E') {
            i += 1;
            if i < chars.len() && matches!(chars[i], '+' | '-') {
                i += 1;
            }
            while i < chars.len() && chars[i].is_ascii_digit() {
                i += 1;
            }
        }
        text = chars[start..i].iter().collect();
    }

    let integer_suffix = chars.get(i) == Some(&'L');
    let value = if is_hex {
        i64::from_str_radix(&text, 16)
            .map_err(|_| syntax(start, "malformed hex literal"))? as f64
    } else {
        text.parse::<f64>()
            .map_err(|_| syntax(start, "malformed number"))?
    };
    if integer_suffix {
        i += 1;
        if value.fract() != 0.0 {
            return Err(syntax(start, "integer literal with fractional part"));
        }
        return Ok((RValue::integer(value as i64), i));
    }
    Ok((RValue::double(value), i))
}

struct Evaluator<'a> {
    tokens: Vec<(usize, Token)>,
    pos: usize,
    options: &'a Options,
    namespace: &'a Bindings,
}

/// A call argument, possibly named.
type Arg = (Option<String>, RValue);

impl Evaluator<'_> {
    fn peek(&self) -> Option<&Token> {
        self.tokens.get(self.pos).map(|(_, t)| t)
    }

    fn next(&mut self) -> Option<(usize, Token)> {
        let tok = self.tokens.get(self.pos).cloned();
        if tok.is_some() {
            self.pos += 1;
        }
        tok
    }

    fn offset(&self) -> usize {
        self.tokens.get(self.pos).map_or(usize::MAX, |(o, _)| *o)
    }

    fn expect(&mut self, want: Token) -> Result<(), ResolveError> {
        let offset = self.offset();
        match self.next() {
            Some((_, tok)) if tok == want => Ok(()),
            other => Err(syntax(
                offset,
                &format!("expected {:?}, found {:?}", want, other.map(|(_, t)| t)),
            )),
        }
    }

    fn expr(&mut self) -> Result<RValue, ResolveError> {
        match self.peek() {
            Some(Token::Minus) => {
                self.pos += 1;
                negate(self.expr()?)
            }
            Some(Token::Plus) => {
                self.pos += 1;
                self.expr()
            }
            _ => self.primary(),
        }
    }

    fn primary(&mut self) -> Result<RValue, ResolveError> {
        let offset = self.offset();
        match self.next() {
            Some((_, Token::Num(v))) => Ok(v),
            Some((_, Token::Str(s))) => Ok(RValue::string(s)),
            Some((_, Token::LParen)) => {
                let value = self.expr()?;
                self.expect(Token::RParen)?;
                Ok(value)
            }
            Some((_, Token::Ident(name))) => {
                if self.peek() == Some(&Token::LParen) {
                    self.pos += 1;
                    let args = self.args()?;
                    self.call(&name, args)
                } else {
                    self.symbol(&name)
                }
            }
            Some((_, tok)) => Err(syntax(offset, &format!("unexpected {:?}", tok))),
            None => Err(syntax(offset, "unexpected end of expression")),
        }
    }

    fn args(&mut self) -> Result<Vec<Arg>, ResolveError> {
        let mut args = Vec::new();
        if self.peek() == Some(&Token::RParen) {
            self.pos += 1;
            return Ok(args);
        }
        loop {
            let named = matches!(
                (self.peek(), self.tokens.get(self.pos + 1).map(|(_, t)| t)),
                (Some(Token::Ident(_) | Token::Str(_)), Some(Token::Assign))
            );
            let name = if named {
                let name = match self.next() {
                    Some((_, Token::Ident(n) | Token::Str(n))) => Some(n),
                    _ => None,
                };
                self.pos += 1;
                name
            } else {
                None
            };
            args.push((name, self.expr()?));
            match self.next() {
                Some((_, Token::Comma)) => continue,
                Some((_, Token::RParen)) => return Ok(args),
                other => {
                    return Err(syntax(
                        self.offset(),
                        &format!("expected `,` or `)`, found {:?}", other.map(|(_, t)| t)),
                    ))
                }
            }
        }
    }

    fn symbol(&self, name: &str) -> Result<RValue, ResolveError> {
        Ok(match name {
            "TRUE" | "T" => RValue::logical(true),
            "FALSE" | "F" => RValue::logical(false),
            "NULL" => RValue::Null,
            "NA" => RValue::Logical(vec![None]),
            "NA_integer_" => RValue::Integer(vec![None]),
            "NA_real_" => RValue::Double(vec![None]),
            "NA_character_" => RValue::Character(vec![None]),
            "Inf" => RValue::double(f64::INFINITY),
            "NaN" => RValue::double(f64::NAN),
            _ => match self.namespace.get(name) {
                Some(bound) => RValue::from_json(bound),
                None => return Err(ResolveError::UnknownSymbol(name.to_string())),
            },
        })
    }

    fn call(&self, name: &str, args: Vec<Arg>) -> Result<RValue, ResolveError> {
        match name {
            "c" => combine(args.into_iter().map(|(_, v)| v).collect()),
            "list" => Ok(RValue::List(args)),
            "getOption" => self.get_option(args),
            "character" | "numeric" | "double" | "integer" | "logical" => {
                empty_vector(name, args)
            }
            _ => Err(ResolveError::Unsupported(format!("call to `{}()`", name))),
        }
    }

    fn get_option(&self, args: Vec<Arg>) -> Result<RValue, ResolveError> {
        let mut args = args.into_iter();
        let key = match args.next() {
            Some((_, RValue::Character(v))) if v.len() == 1 && v[0].is_some() => {
                v.into_iter().flatten().next().unwrap_or_default()
            }
            _ => {
                return Err(ResolveError::InvalidArgument(
                    "getOption() needs a single option name".to_string(),
                ))
            }
        };
        let fallback = args.next().map_or(RValue::Null, |(_, v)| v);
        Ok(self.options.get(&key).cloned().unwrap_or(fallback))
    }
}

fn negate(value: RValue) -> Result<RValue, ResolveError> {
    match value {
        RValue::Integer(v) => v
            .into_iter()
            .map(|x| match x {
                None => Ok(None),
                Some(i) => i.checked_neg().map(Some).ok_or_else(|| {
                    ResolveError::InvalidArgument(format!("cannot negate {}: integer overflow", i))
                }),
            })
            .collect::<Result<Vec<_>, ResolveError>>()
            .map(RValue::Integer),
        RValue::Double(v) => Ok(RValue::Double(v.into_iter().map(|x| x.map(|d| -d)).collect())),
        RValue::Logical(v) => Ok(RValue::Integer(
            v.into_iter().map(|x| x.map(|b| -i64::from(b))).collect(),
        )),
        other => Err(ResolveError::InvalidArgument(format!(
            "invalid argument to unary operator: {:?}",
            other
        ))),
    }
}

/// Longest vector the empty-vector constructors will build.
const MAX_VECTOR_LEN: usize = 1_000_000;

fn empty_vector(kind: &str, args: Vec<Arg>) -> Result<RValue, ResolveError> {
    let invalid = |what: String| ResolveError::InvalidArgument(format!("{}() length {}", kind, what));
    let len = match args.first() {
        None => 0.0,
        Some((_, RValue::Double(v))) if v.len() == 1 => v[0].ok_or_else(|| invalid("is NA".into()))?,
        Some((_, RValue::Integer(v))) if v.len() == 1 => {
            v[0].ok_or_else(|| invalid("is NA".into()))? as f64
        }
        Some(_) => return Err(invalid("must be a single number".into())),
    };
    if !len.is_finite() || len < 0.0 || len.fract() != 0.0 {
        return Err(invalid(format!("`{}` is not a non-negative whole number", len)));
    }
    if len > MAX_VECTOR_LEN as f64 {
        return Err(invalid(format!("{} exceeds {}", len, MAX_VECTOR_LEN)));
    }
    let len = len as usize;
    Ok(match kind {
        "character" => RValue::Character(vec![Some(String::new()); len]),
        "integer" => RValue::Integer(vec![Some(0); len]),
        "logical" => RValue::Logical(vec![Some(false); len]),
        _ => RValue::Double(vec![Some(0.0); len]),
    })
}

/// Coercion rank of atomic vectors, lowest first.
fn rank(value: &RValue) -> u8 {
    match value {
        RValue::Null => 0,
        RValue::Logical(_) => 1,
        RValue::Integer(_) => 2,
        RValue::Double(_) => 3,
        RValue::Character(_) => 4,
        RValue::List(_) => 5,
        RValue::Function(_) => 6,
    }
}

/// `c(...)`: concatenate, coercing to the highest-ranked element type.
fn combine(values: Vec<RValue>) -> Result<RValue, ResolveError> {
    let top = values.iter().map(rank).max().unwrap_or(0);
    match top {
        0 => Ok(RValue::Null),
        6 => Err(ResolveError::Unsupported("c() of a function".to_string())),
        5 => {
            let mut items = Vec::new();
            for value in values {
                match value {
                    RValue::List(inner) => items.extend(inner),
                    RValue::Null => {}
                    atomic => items.extend(split_atomic(atomic).into_iter().map(|v| (None, v))),
                }
            }
            Ok(RValue::List(items))
        }
        1 => Ok(RValue::Logical(
            values.into_iter().flat_map(as_logical).collect(),
        )),
        2 => Ok(RValue::Integer(
            values.into_iter().flat_map(as_integer).collect(),
        )),
        3 => Ok(RValue::Double(values.into_iter().flat_map(as_double).collect())),
        _ => Ok(RValue::Character(
            values.into_iter().flat_map(as_character).collect(),
        )),
    }
}

fn split_atomic(value: RValue) -> Vec<RValue> {
    match value {
        RValue::Logical(v) => v.into_iter().map(|x| RValue::Logical(vec![x])).collect(),
        RValue::Integer(v) => v.into_iter().map(|x| RValue::Integer(vec![x])).collect(),
        RValue::Double(v) => v.into_iter().map(|x| RValue::Double(vec![x])).collect(),
        RValue::Character(v) => v.into_iter().map(|x| RValue::Character(vec![x])).collect(),
        other => vec![other],
    }
}

fn as_logical(value: RValue) -> Vec<Option<bool>> {
    match value {
        RValue::Logical(v) => v,
        _ => Vec::new(),
    }
}

fn as_integer(value: RValue) -> Vec<Option<i64>> {
    match value {
        RValue::Integer(v) => v,
        RValue::Logical(v) => v.into_iter().map(|x| x.map(i64::from)).collect(),
        _ => Vec::new(),
    }
}

fn as_double(value: RValue) -> Vec<Option<f64>> {
    match value {
        RValue::Double(v) => v,
        other => as_integer(other)
            .into_iter()
            .map(|x| x.map(|i| i as f64))
            .collect(),
    }
}

fn as_character(value: RValue) -> Vec<Option<String>> {
    match value {
        RValue::Character(v) => v,
        RValue::Logical(v) => v
            .into_iter()
            .map(|x| x.map(|b| if b { "TRUE" } else { "FALSE" }.to_string()))
            .collect(),
        RValue::Integer(v) => v.into_iter().map(|x| x.map(|i| i.to_string())).collect(),
        RValue::Double(v) => v.into_iter().map(|x| x.map(|d| d.to_string())).collect(),
        _ => Vec::new(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn eval(expr: &str) -> Result<RValue, ResolveError> {
        let options = Options::new();
        ExprResolver::new(&options).resolve_default(expr, &Bindings::new())
    }

    #[test]
    fn scalar_literals() {
        assert_eq!(eval("5").unwrap(), RValue::double(5.0));
        assert_eq!(eval("2L").unwrap(), RValue::integer(2));
        assert_eq!(eval("-0.5").unwrap(), RValue::double(-0.5));
        assert_eq!(eval("1e-3").unwrap(), RValue::double(0.001));
        assert_eq!(eval("0x10").unwrap(), RValue::double(16.0));
        assert_eq!(eval("'foo'").unwrap(), RValue::string("foo"));
        assert_eq!(eval(r#""a\"b""#).unwrap(), RValue::string("a\"b"));
        assert_eq!(eval("TRUE").unwrap(), RValue::logical(true));
        assert_eq!(eval("F").unwrap(), RValue::logical(false));
        assert_eq!(eval("NULL").unwrap(), RValue::Null);
        assert_eq!(eval("NA").unwrap(), RValue::Logical(vec![None]));
    }

    #[test]
    fn combine_coerces_upwards() {
        assert_eq!(
            eval(r#"c("a", "b")"#).unwrap(),
            RValue::Character(vec![Some("a".into()), Some("b".into())])
        );
        assert_eq!(
            eval("c(1L, 2.5)").unwrap(),
            RValue::Double(vec![Some(1.0), Some(2.5)])
        );
        assert_eq!(
            eval("c(TRUE, 'x')").unwrap(),
            RValue::Character(vec![Some("TRUE".into()), Some("x".into())])
        );
        assert_eq!(eval("c()").unwrap(), RValue::Null);
        assert_eq!(eval("c(NULL, 3L)").unwrap(), RValue::Integer(vec![Some(3)]));
    }

    #[test]
    fn combine_drops_names() {
        assert_eq!(
            eval("c(a = 1, b = 2)").unwrap(),
            RValue::Double(vec![Some(1.0), Some(2.0)])
        );
    }

    #[test]
    fn named_list() {
        let value = eval("list(low = 0.1, method = 'fdr')").unwrap();
        assert_eq!(
            serde_json::to_value(&value).unwrap(),
            json!({"low": 0.1, "method": "fdr"})
        );
    }

    #[test]
    fn empty_constructors() {
        assert_eq!(eval("character(0)").unwrap(), RValue::Character(vec![]));
        assert_eq!(eval("numeric()").unwrap(), RValue::Double(vec![]));
        assert_eq!(eval("logical(2L)").unwrap(), RValue::Logical(vec![Some(false); 2]));
    }

    #[test]
    fn empty_constructors_reject_unusable_lengths() {
        for expr in ["numeric(Inf)", "character(1e18)", "integer(-1)", "logical(1.5)", "double(NaN)", "character(NA_integer_)"] {
            assert!(
                matches!(eval(expr), Err(ResolveError::InvalidArgument(_))),
                "{} should be rejected",
                expr
            );
        }
    }

    #[test]
    fn negating_the_smallest_integer_is_an_error() {
        let options = Options::new();
        let mut ns = Bindings::new();
        ns.insert("LOWEST".into(), json!(i64::MIN));
        ns.insert("OFFSET".into(), json!(-3));
        let resolver = ExprResolver::new(&options);
        assert!(matches!(
            resolver.resolve_default("-LOWEST", &ns),
            Err(ResolveError::InvalidArgument(_))
        ));
        assert_eq!(resolver.resolve_default("-OFFSET", &ns).unwrap(), RValue::integer(3));
    }

    #[test]
    fn get_option_uses_configured_value() {
        let mut options = Options::new();
        options.insert("moo_save_plots".into(), RValue::logical(true));
        let resolver = ExprResolver::new(&options);
        let ns = Bindings::new();
        assert_eq!(
            resolver
                .resolve_default(r#"getOption("moo_save_plots")"#, &ns)
                .unwrap(),
            RValue::logical(true)
        );
        assert_eq!(
            resolver
                .resolve_default(r#"getOption("unset", "fallback")"#, &ns)
                .unwrap(),
            RValue::string("fallback")
        );
        assert_eq!(
            resolver.resolve_default(r#"getOption("unset")"#, &ns).unwrap(),
            RValue::Null
        );
    }

    #[test]
    fn namespace_bindings() {
        let options = Options::new();
        let mut ns = Bindings::new();
        ns.insert("DEFAULT_METHODS".into(), json!(["a", "b"]));
        let value = ExprResolver::new(&options)
            .resolve_default("DEFAULT_METHODS", &ns)
            .unwrap();
        assert_eq!(value, RValue::Character(vec![Some("a".into()), Some("b".into())]));
    }

    #[test]
    fn closures_are_kept_as_source() {
        assert_eq!(
            eval("function(x) x + 1").unwrap(),
            RValue::Function("function(x) x + 1".into())
        );
    }

    #[test]
    fn unsupported_and_unknown() {
        assert!(matches!(eval("a + b"), Err(ResolveError::UnknownSymbol(_))));
        assert!(matches!(eval("1 * 2"), Err(ResolveError::Unsupported(_))));
        assert!(matches!(eval("seq(1, 3)"), Err(ResolveError::Unsupported(_))));
        assert!(matches!(eval("c(1, "), Err(ResolveError::Syntax { .. })));
    }
}
