//! Constrained arithmetic evaluation for value tags.
//!
//! Expressions combine numbers, identifiers bound to numeric JSON items, the
//! operators `+ - * / ^ %`, parentheses, and comma lists. Precedence is
//! standard, `^` is right-associative, `%` is floating remainder. A small set
//! of builtin functions and the constants `pi` and `e` round out the dialect;
//! identifiers resolved from data shadow the constants. Any lexical, parse,
//! or resolution failure yields NaN, which the renderer turns into empty
//! output.

/// Resolves an identifier to a numeric value.
///
/// `None` means unknown (a hard failure); `Some(NAN)` marks an identifier
/// that exists but is not numeric.
pub type Lookup<'a> = dyn Fn(&str) -> Option<f64> + 'a;

/// Evaluate `expression`, resolving identifiers through `lookup`.
pub fn eval(expression: &str, lookup: &Lookup<'_>) -> f64 {
    let Some(tokens) = tokenize(expression) else {
        return f64::NAN;
    };
    let mut parser = Parser {
        tokens,
        pos: 0,
        lookup,
    };
    match parser.list() {
        Some(value) if parser.at_end() => value,
        _ => f64::NAN,
    }
}

#[derive(Debug, Clone, PartialEq)]
enum Token {
    Number(f64),
    Ident(String),
    Plus,
    Minus,
    Star,
    Slash,
    Caret,
    Percent,
    Open,
    Close,
    Comma,
}

const DELIMITERS: &str = "+-*/^%(),";

fn tokenize(expression: &str) -> Option<Vec<Token>> {
    let mut tokens = Vec::new();
    let bytes = expression.as_bytes();
    let mut pos = 0;

    while pos < bytes.len() {
        let c = bytes[pos] as char;
        if c.is_ascii_whitespace() {
            pos += 1;
            continue;
        }
        match c {
            '+' => tokens.push(Token::Plus),
            '-' => tokens.push(Token::Minus),
            '*' => tokens.push(Token::Star),
            '/' => tokens.push(Token::Slash),
            '^' => tokens.push(Token::Caret),
            '%' => tokens.push(Token::Percent),
            '(' => tokens.push(Token::Open),
            ')' => tokens.push(Token::Close),
            ',' => tokens.push(Token::Comma),
            _ if c.is_ascii_digit() => {
                let end = scan_number(expression, pos);
                let number = expression[pos..end].parse::<f64>().ok()?;
                tokens.push(Token::Number(number));
                pos = end;
                continue;
            }
            _ => {
                let end = scan_ident(expression, pos);
                tokens.push(Token::Ident(expression[pos..end].to_string()));
                pos = end;
                continue;
            }
        }
        pos += 1;
    }

    Some(tokens)
}

fn scan_number(expression: &str, start: usize) -> usize {
    let bytes = expression.as_bytes();
    let mut pos = start;
    while pos < bytes.len() && (bytes[pos].is_ascii_digit() || bytes[pos] == b'.') {
        pos += 1;
    }
    // exponent part: e / E, optional sign, at least one digit
    if pos < bytes.len() && (bytes[pos] == b'e' || bytes[pos] == b'E') {
        let mut ahead = pos + 1;
        if ahead < bytes.len() && (bytes[ahead] == b'+' || bytes[ahead] == b'-') {
            ahead += 1;
        }
        if ahead < bytes.len() && bytes[ahead].is_ascii_digit() {
            pos = ahead;
            while pos < bytes.len() && bytes[pos].is_ascii_digit() {
                pos += 1;
            }
        }
    }
    pos
}

fn scan_ident(expression: &str, start: usize) -> usize {
    expression[start..]
        .char_indices()
        .find(|(_, c)| c.is_ascii_whitespace() || DELIMITERS.contains(*c))
        .map(|(offset, _)| start + offset)
        .unwrap_or(expression.len())
}

struct Parser<'a> {
    tokens: Vec<Token>,
    pos: usize,
    lookup: &'a Lookup<'a>,
}

impl Parser<'_> {
    fn at_end(&self) -> bool {
        self.pos == self.tokens.len()
    }

    fn peek(&self) -> Option<&Token> {
        self.tokens.get(self.pos)
    }

    fn advance(&mut self) -> Option<Token> {
        let token = self.tokens.get(self.pos).cloned();
        if token.is_some() {
            self.pos += 1;
        }
        token
    }

    fn accept(&mut self, token: &Token) -> bool {
        if self.peek() == Some(token) {
            self.pos += 1;
            true
        } else {
            false
        }
    }

    /// list := expr { "," expr }; the comma operator keeps the last value.
    fn list(&mut self) -> Option<f64> {
        let mut value = self.expr()?;
        while self.accept(&Token::Comma) {
            value = self.expr()?;
        }
        Some(value)
    }

    fn expr(&mut self) -> Option<f64> {
        let mut value = self.term()?;
        loop {
            if self.accept(&Token::Plus) {
                value += self.term()?;
            } else if self.accept(&Token::Minus) {
                value -= self.term()?;
            } else {
                return Some(value);
            }
        }
    }

    fn term(&mut self) -> Option<f64> {
        let mut value = self.factor()?;
        loop {
            if self.accept(&Token::Star) {
                value *= self.factor()?;
            } else if self.accept(&Token::Slash) {
                value /= self.factor()?;
            } else if self.accept(&Token::Percent) {
                value %= self.factor()?;
            } else {
                return Some(value);
            }
        }
    }

    /// factor := power [ "^" factor ], right-associative.
    fn factor(&mut self) -> Option<f64> {
        let base = self.power()?;
        if self.accept(&Token::Caret) {
            let exponent = self.factor()?;
            return Some(base.powf(exponent));
        }
        Some(base)
    }

    fn power(&mut self) -> Option<f64> {
        let mut sign = 1.0;
        loop {
            if self.accept(&Token::Minus) {
                sign = -sign;
            } else if !self.accept(&Token::Plus) {
                break;
            }
        }
        Some(sign * self.base()?)
    }

    fn base(&mut self) -> Option<f64> {
        match self.advance()? {
            Token::Number(value) => Some(value),
            Token::Open => {
                let value = self.list()?;
                self.accept(&Token::Close).then_some(value)
            }
            Token::Ident(name) => {
                if self.peek() == Some(&Token::Open) {
                    return self.call(&name);
                }
                if let Some(value) = (self.lookup)(&name) {
                    return Some(value);
                }
                constant(&name)
            }
            _ => None,
        }
    }

    fn call(&mut self, name: &str) -> Option<f64> {
        self.accept(&Token::Open);
        let mut args = Vec::new();
        if !self.accept(&Token::Close) {
            loop {
                args.push(self.expr()?);
                if self.accept(&Token::Close) {
                    break;
                }
                if !self.accept(&Token::Comma) {
                    return None;
                }
            }
        }
        apply(name, &args)
    }
}

fn constant(name: &str) -> Option<f64> {
    match name {
        "pi" => Some(std::f64::consts::PI),
        "e" => Some(std::f64::consts::E),
        _ => None,
    }
}

fn apply(name: &str, args: &[f64]) -> Option<f64> {
    let unary = |f: fn(f64) -> f64| (args.len() == 1).then(|| f(args[0]));
    match name {
        "abs" => unary(f64::abs),
        "ceil" => unary(f64::ceil),
        "floor" => unary(f64::floor),
        "sqrt" => unary(f64::sqrt),
        "exp" => unary(f64::exp),
        "ln" => unary(f64::ln),
        "log10" => unary(f64::log10),
        "sin" => unary(f64::sin),
        "cos" => unary(f64::cos),
        "tan" => unary(f64::tan),
        "pow" => (args.len() == 2).then(|| args[0].powf(args[1])),
        _ => None,
    }
}
