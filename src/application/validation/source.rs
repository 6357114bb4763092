use regex::Regex;
use std::collections::BTreeMap;
use std::sync::LazyLock;

static ASSIGNMENT: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^([A-Za-z_][\w.]*)\s*(?::\s*[A-Za-z_][\w\[\], .]*)?=\s*([^=].*)$")
        .expect("assignment pattern is valid")
});

const MAX_RESOLVE_DEPTH: usize = 8;

/// One logical source line: continuation lines inside open brackets are
/// joined onto the line that opened them.
#[derive(Debug, Clone, PartialEq)]
pub struct LogicalLine {
    /// 1-based number of the first physical line
    pub number: usize,
    pub indent: usize,
    /// Comment-stripped, trimmed text
    pub text: String,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Binding {
    pub line: usize,
    pub expr: String,
}

/// Read-only view of artifact source shared by all validation rules.
///
/// Built once per validation; never executes or imports anything.
#[derive(Debug, Clone)]
pub struct SourceModel {
    lines: Vec<LogicalLine>,
    bindings: BTreeMap<String, Vec<Binding>>,
}

impl SourceModel {
    pub fn parse(source: &str) -> Self {
        let lines = logical_lines(source);
        let mut bindings: BTreeMap<String, Vec<Binding>> = BTreeMap::new();

        for line in &lines {
            if let Some(caps) = ASSIGNMENT.captures(&line.text) {
                let key = binding_key(&caps[1]).to_string();
                bindings.entry(key).or_default().push(Binding {
                    line: line.number,
                    expr: caps[2].trim().to_string(),
                });
            }
        }

        Self { lines, bindings }
    }

    pub fn lines(&self) -> &[LogicalLine] {
        &self.lines
    }

    /// Every assignment to `name` (matched on the last dotted segment)
    pub fn assignments(&self, name: &str) -> &[Binding] {
        self.bindings
            .get(binding_key(name))
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }

    /// Nearest assignment before `line`, falling back to the first one in the file
    pub fn binding_before(&self, name: &str, line: usize) -> Option<&Binding> {
        let all = self.assignments(name);
        all.iter()
            .rev()
            .find(|b| b.line < line)
            .or_else(|| all.iter().find(|b| b.line != line))
    }

    /// Evaluates a numeric expression made of literals, bound names and
    /// `+ - * /` with parentheses. Anything else yields `None`.
    pub fn evaluate(&self, expr: &str, line: usize) -> Option<f64> {
        self.evaluate_depth(expr, line, 0)
    }

    fn evaluate_depth(&self, expr: &str, line: usize, depth: usize) -> Option<f64> {
        if depth > MAX_RESOLVE_DEPTH {
            return None;
        }
        let tokens = tokenize(expr)?;
        let mut parser = ExprParser {
            tokens: &tokens,
            pos: 0,
            resolve: &|name: &str| {
                let binding = self.binding_before(name, line)?;
                self.evaluate_depth(&binding.expr, binding.line, depth + 1)
            },
        };
        let value = parser.expression()?;
        if parser.pos != tokens.len() || !value.is_finite() {
            return None;
        }
        Some(value)
    }
}

/// `self.position_size` and `position_size` refer to the same binding
pub fn binding_key(name: &str) -> &str {
    name.rsplit('.').next().unwrap_or(name)
}

fn logical_lines(source: &str) -> Vec<LogicalLine> {
    let mut lines = Vec::new();
    let mut in_docstring: Option<&'static str> = None;
    let mut pending: Option<LogicalLine> = None;
    let mut depth: i32 = 0;

    for (idx, raw) in source.lines().enumerate() {
        let number = idx + 1;

        if let Some(delim) = in_docstring {
            if raw.contains(delim) {
                in_docstring = None;
            }
            continue;
        }
        let trimmed = raw.trim_start();
        if let Some(delim) = ["\"\"\"", "'''"].into_iter().find(|d| trimmed.starts_with(d)) {
            if trimmed[3..].find(delim).is_none() {
                in_docstring = Some(delim);
            }
            continue;
        }

        let text = strip_comment(raw);
        let body = text.trim();
        if body.is_empty() && pending.is_none() {
            continue;
        }

        depth += bracket_delta(body);
        match pending.as_mut() {
            Some(open) => {
                open.text.push(' ');
                open.text.push_str(body);
            }
            None => {
                pending = Some(LogicalLine {
                    number,
                    indent: raw.len() - trimmed.len(),
                    text: body.to_string(),
                });
            }
        }

        if depth <= 0 {
            depth = 0;
            if let Some(done) = pending.take() {
                lines.push(done);
            }
        }
    }

    if let Some(done) = pending {
        lines.push(done);
    }
    lines
}

fn strip_comment(line: &str) -> &str {
    let mut quote: Option<char> = None;
    for (i, ch) in line.char_indices() {
        match (quote, ch) {
            (None, '#') => return &line[..i],
            (None, '"' | '\'') => quote = Some(ch),
            (Some(q), c) if c == q => quote = None,
            _ => {}
        }
    }
    line
}

fn bracket_delta(text: &str) -> i32 {
    let mut quote: Option<char> = None;
    let mut delta = 0;
    for ch in text.chars() {
        match (quote, ch) {
            (None, '"' | '\'') => quote = Some(ch),
            (Some(q), c) if c == q => quote = None,
            (None, '(' | '[' | '{') => delta += 1,
            (None, ')' | ']' | '}') => delta -= 1,
            _ => {}
        }
    }
    delta
}

#[derive(Debug, Clone, PartialEq)]
enum Token {
    Number(f64),
    Name(String),
    Op(char),
}

fn tokenize(expr: &str) -> Option<Vec<Token>> {
    let chars: Vec<char> = expr.chars().collect();
    let mut tokens = Vec::new();
    let mut i = 0;

    while i < chars.len() {
        let ch = chars[i];
        if ch.is_whitespace() {
            i += 1;
        } else if ch.is_ascii_digit() || (ch == '.' && chars.get(i + 1).is_some_and(|c| c.is_ascii_digit())) {
            let start = i;
            while i < chars.len() && (chars[i].is_ascii_digit() || chars[i] == '.' || chars[i] == '_') {
                i += 1;
            }
            if i < chars.len() && (chars[i] == 'e' || chars[i] == 'E') {
                i += 1;
                if i < chars.len() && (chars[i] == '+' || chars[i] == '-') {
                    i += 1;
                }
                while i < chars.len() && chars[i].is_ascii_digit() {
                    i += 1;
                }
            }
            let literal: String = chars[start..i].iter().filter(|c| **c != '_').collect();
            tokens.push(Token::Number(literal.parse().ok()?));
        } else if ch.is_ascii_alphabetic() || ch == '_' {
            let start = i;
            while i < chars.len() && (chars[i].is_ascii_alphanumeric() || chars[i] == '_' || chars[i] == '.') {
                i += 1;
            }
            let name: String = chars[start..i].iter().collect();
            // Calls and subscripts are never resolved
            if matches!(chars.get(i), Some('(') | Some('[')) {
                return None;
            }
            tokens.push(Token::Name(name));
        } else if "+-*/()".contains(ch) {
            // `//` and `**` are outside the supported grammar
            if (ch == '/' || ch == '*') && chars.get(i + 1) == Some(&ch) {
                return None;
            }
            tokens.push(Token::Op(ch));
            i += 1;
        } else {
            return None;
        }
    }
    Some(tokens)
}

struct ExprParser<'a> {
    tokens: &'a [Token],
    pos: usize,
    resolve: &'a dyn Fn(&str) -> Option<f64>,
}

impl ExprParser<'_> {
    fn peek_op(&self) -> Option<char> {
        match self.tokens.get(self.pos) {
            Some(Token::Op(op)) => Some(*op),
            _ => None,
        }
    }

    fn expression(&mut self) -> Option<f64> {
        let mut value = self.term()?;
        while let Some(op @ ('+' | '-')) = self.peek_op() {
            self.pos += 1;
            let rhs = self.term()?;
            value = if op == '+' { value + rhs } else { value - rhs };
        }
        Some(value)
    }

    fn term(&mut self) -> Option<f64> {
        let mut value = self.factor()?;
        while let Some(op @ ('*' | '/')) = self.peek_op() {
            self.pos += 1;
            let rhs = self.factor()?;
            value = if op == '*' { value * rhs } else { value / rhs };
        }
        Some(value)
    }

    fn factor(&mut self) -> Option<f64> {
        let token = self.tokens.get(self.pos)?.clone();
        self.pos += 1;
        match token {
            Token::Number(n) => Some(n),
            Token::Name(name) => match name.as_str() {
                "True" => Some(1.0),
                "False" => Some(0.0),
                _ => (self.resolve)(&name),
            },
            Token::Op('-') => self.factor().map(|v| -v),
            Token::Op('+') => self.factor(),
            Token::Op('(') => {
                let value = self.expression()?;
                if self.peek_op() != Some(')') {
                    return None;
                }
                self.pos += 1;
                Some(value)
            }
            Token::Op(_) => None,
        }
    }
}

/// Splits the argument list of a call at top-level commas
pub fn split_arguments(args: &str) -> Vec<&str> {
    let mut parts = Vec::new();
    let mut depth = 0i32;
    let mut quote: Option<char> = None;
    let mut start = 0;
    for (i, ch) in args.char_indices() {
        match (quote, ch) {
            (None, '"' | '\'') => quote = Some(ch),
            (Some(q), c) if c == q => quote = None,
            (None, '(' | '[' | '{') => depth += 1,
            (None, ')' | ']' | '}') => depth -= 1,
            (None, ',') if depth == 0 => {
                parts.push(args[start..i].trim());
                start = i + 1;
            }
            _ => {}
        }
    }
    let last = args[start..].trim();
    if !last.is_empty() {
        parts.push(last);
    }
    parts
}

/// Text between the parenthesis opening at `open` and its matching close
pub fn call_arguments(text: &str, open: usize) -> Option<&str> {
    let mut depth = 0i32;
    let mut quote: Option<char> = None;
    for (i, ch) in text[open..].char_indices() {
        match (quote, ch) {
            (None, '"' | '\'') => quote = Some(ch),
            (Some(q), c) if c == q => quote = None,
            (None, '(') => depth += 1,
            (None, ')') => {
                depth -= 1;
                if depth == 0 {
                    return Some(&text[open + 1..open + i]);
                }
            }
            _ => {}
        }
    }
    None
}

/// `name=value` keyword arguments of a call, in order
pub fn keyword_arguments(args: &str) -> Vec<(&str, &str)> {
    split_arguments(args)
        .into_iter()
        .filter_map(|arg| {
            let eq = arg.find('=')?;
            let (name, rest) = arg.split_at(eq);
            let value = &rest[1..];
            let name = name.trim();
            if value.starts_with('=') || name.is_empty() || !name.chars().all(|c| c.is_alphanumeric() || c == '_') {
                return None;
            }
            Some((name, value.trim()))
        })
        .collect()
}
