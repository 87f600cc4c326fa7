// Lexer and parser for rule expressions. Pure; runs once at rule
// authoring time, so operator writes reject malformed programs before
// anything is persisted.

use std::fmt;

#[derive(Clone, Debug, PartialEq)]
pub enum Expr {
    Int(i64),
    Float(f64),
    Str(String),
    Bool(bool),
    Sym(String),
    List(Vec<Expr>),
}

impl fmt::Display for Expr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Expr::Int(i) => write!(f, "{}", i),
            Expr::Float(x) => write!(f, "{}", x),
            Expr::Str(s) => write!(f, "{:?}", s),
            Expr::Bool(b) => write!(f, "{}", b),
            Expr::Sym(s) => write!(f, "{}", s),
            Expr::List(items) => {
                write!(f, "(")?;
                for (ix, item) in items.iter().enumerate() {
                    if ix > 0 {
                        write!(f, " ")?;
                    }
                    write!(f, "{}", item)?;
                }
                write!(f, ")")
            }
        }
    }
}

#[derive(thiserror::Error, Debug, PartialEq)]
pub enum ParseError {
    #[error("unexpected end of input")]
    UnexpectedEof,
    #[error("unexpected ')' at offset {0}")]
    UnmatchedClose(usize),
    #[error("unterminated string starting at offset {0}")]
    UnterminatedString(usize),
    #[error("bad escape '\\{0}'")]
    BadEscape(char),
    #[error("empty program")]
    Empty,
}

#[derive(Clone, Debug, PartialEq)]
enum Token {
    Open(usize),
    Close(usize),
    Atom(String),
    Text(String),
}

fn tokenize(source: &str) -> Result<Vec<Token>, ParseError> {
    let mut tokens = Vec::new();
    let chars: Vec<char> = source.chars().collect();
    let mut ix = 0;

    while ix < chars.len() {
        let c = chars[ix];
        match c {
            '(' => {
                tokens.push(Token::Open(ix));
                ix += 1;
            }
            ')' => {
                tokens.push(Token::Close(ix));
                ix += 1;
            }
            '"' => {
                let start = ix;
                ix += 1;
                let mut text = String::new();
                loop {
                    if ix >= chars.len() {
                        return Err(ParseError::UnterminatedString(start));
                    }
                    match chars[ix] {
                        '"' => {
                            ix += 1;
                            break;
                        }
                        '\\' => {
                            ix += 1;
                            if ix >= chars.len() {
                                return Err(ParseError::UnterminatedString(start));
                            }
                            match chars[ix] {
                                '"' => text.push('"'),
                                '\\' => text.push('\\'),
                                'n' => text.push('\n'),
                                't' => text.push('\t'),
                                other => return Err(ParseError::BadEscape(other)),
                            }
                            ix += 1;
                        }
                        other => {
                            text.push(other);
                            ix += 1;
                        }
                    }
                }
                tokens.push(Token::Text(text));
            }
            ';' => {
                // Comment to end of line.
                while ix < chars.len() && chars[ix] != '\n' {
                    ix += 1;
                }
            }
            c if c.is_whitespace() => {
                ix += 1;
            }
            _ => {
                let mut atom = String::new();
                while ix < chars.len() {
                    let c = chars[ix];
                    if c.is_whitespace() || c == '(' || c == ')' || c == '"' || c == ';' {
                        break;
                    }
                    atom.push(c);
                    ix += 1;
                }
                tokens.push(Token::Atom(atom));
            }
        }
    }

    Ok(tokens)
}

fn atom_expr(atom: String) -> Expr {
    match atom.as_str() {
        "true" => return Expr::Bool(true),
        "false" => return Expr::Bool(false),
        _ => {}
    }

    if let Ok(i) = atom.parse::<i64>() {
        return Expr::Int(i);
    }
    // Only atoms that look numeric become floats; a bare symbol like
    // `os-version` must not be swallowed by the float parser.
    if atom
        .chars()
        .next()
        .map(|c| c.is_ascii_digit() || c == '-' || c == '+' || c == '.')
        .unwrap_or(false)
    {
        if let Ok(x) = atom.parse::<f64>() {
            return Expr::Float(x);
        }
    }

    Expr::Sym(atom)
}

fn parse_form(tokens: &[Token], ix: &mut usize) -> Result<Expr, ParseError> {
    match tokens.get(*ix) {
        None => Err(ParseError::UnexpectedEof),
        Some(Token::Close(pos)) => Err(ParseError::UnmatchedClose(*pos)),
        Some(Token::Atom(atom)) => {
            *ix += 1;
            Ok(atom_expr(atom.clone()))
        }
        Some(Token::Text(text)) => {
            *ix += 1;
            Ok(Expr::Str(text.clone()))
        }
        Some(Token::Open(_)) => {
            *ix += 1;
            let mut items = Vec::new();
            loop {
                match tokens.get(*ix) {
                    None => return Err(ParseError::UnexpectedEof),
                    Some(Token::Close(_)) => {
                        *ix += 1;
                        return Ok(Expr::List(items));
                    }
                    Some(_) => items.push(parse_form(tokens, ix)?),
                }
            }
        }
    }
}

// Parses a whole program: one or more top-level forms.
pub fn parse_program(source: &str) -> Result<Vec<Expr>, ParseError> {
    let tokens = tokenize(source)?;
    let mut forms = Vec::new();
    let mut ix = 0;

    while ix < tokens.len() {
        forms.push(parse_form(&tokens, &mut ix)?);
    }

    if forms.is_empty() {
        return Err(ParseError::Empty);
    }

    Ok(forms)
}
