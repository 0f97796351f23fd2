//! List-directed input: whitespace/comma separated records, one per line,
//! with `'...'` quoted strings, `/` terminating a record early, and `!`
//! starting a comment. The shape of the classic environment files.

use crate::error::SetupError;
use crate::types::Real;

/// One tokenized record.
#[derive(Clone, Debug, Default)]
pub struct Record {
    toks: Vec<String>,
    /// Whether the record was cut short by `/`.
    pub terminated: bool,
    next: usize,
}

impl Record {
    pub fn parse(line: &str) -> Self {
        let mut toks = Vec::new();
        let mut terminated = false;
        let mut chars = line.chars().peekable();
        while let Some(&ch) = chars.peek() {
            match ch {
                '!' => break,
                '/' => {
                    terminated = true;
                    break;
                }
                '\'' | '"' => {
                    let quote = ch;
                    chars.next();
                    let mut s = String::new();
                    for c in chars.by_ref() {
                        if c == quote {
                            break;
                        }
                        s.push(c);
                    }
                    toks.push(s);
                }
                c if c.is_whitespace() || c == ',' => {
                    chars.next();
                }
                _ => {
                    let mut s = String::new();
                    while let Some(&c) = chars.peek() {
                        if c.is_whitespace() || c == ',' || c == '/' || c == '!' {
                            break;
                        }
                        s.push(c);
                        chars.next();
                    }
                    toks.push(s);
                }
            }
        }
        Self { toks, terminated, next: 0 }
    }

    pub fn len(&self) -> usize {
        self.toks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.toks.is_empty()
    }

    pub fn remaining(&self) -> usize {
        self.toks.len() - self.next
    }

    fn take(&mut self) -> Option<&str> {
        let t = self.toks.get(self.next)?;
        self.next += 1;
        Some(t)
    }

    pub fn str(&mut self, file: &str, what: &str) -> Result<String, SetupError> {
        self.take()
            .map(str::to_string)
            .ok_or_else(|| parse_err(file, &format!("missing {what}")))
    }

    pub fn real(&mut self, file: &str, what: &str) -> Result<Real, SetupError> {
        let t = self
            .take()
            .ok_or_else(|| parse_err(file, &format!("missing {what}")))?;
        t.parse::<Real>()
            .map_err(|_| parse_err(file, &format!("bad {what}: {t:?}")))
    }

    pub fn usize(&mut self, file: &str, what: &str) -> Result<usize, SetupError> {
        let t = self
            .take()
            .ok_or_else(|| parse_err(file, &format!("missing {what}")))?;
        t.parse::<usize>()
            .map_err(|_| parse_err(file, &format!("bad {what}: {t:?}")))
    }

    /// A real value if present, `default` if the record ended.
    pub fn real_or(&mut self, file: &str, what: &str, default: Real) -> Result<Real, SetupError> {
        match self.take() {
            None => Ok(default),
            Some(t) => t
                .parse::<Real>()
                .map_err(|_| parse_err(file, &format!("bad {what}: {t:?}"))),
        }
    }
}

pub fn parse_err(file: &str, msg: &str) -> SetupError {
    SetupError::Parse { file: file.to_string(), msg: msg.to_string() }
}

/// Record stream over the non-blank lines of a file.
pub struct LdiFile {
    pub name: String,
    lines: Vec<String>,
    next: usize,
}

impl LdiFile {
    pub fn open(path: &std::path::Path) -> Result<Self, SetupError> {
        let text = std::fs::read_to_string(path)?;
        Ok(Self::from_text(&path.display().to_string(), &text))
    }

    pub fn from_text(name: &str, text: &str) -> Self {
        let lines = text
            .lines()
            .map(str::to_string)
            .filter(|l| !l.trim().is_empty())
            .collect();
        Self { name: name.to_string(), lines, next: 0 }
    }

    pub fn record(&mut self) -> Result<Record, SetupError> {
        let line = self
            .lines
            .get(self.next)
            .ok_or_else(|| parse_err(&self.name, "unexpected end of file"))?;
        self.next += 1;
        Ok(Record::parse(line))
    }

    pub fn peek_more(&self) -> bool {
        self.next < self.lines.len()
    }

    /// Read `n` reals, spanning lines as needed and honoring the two-value
    /// `/` shorthand: when fewer values than `n` are given before a
    /// terminator, the first two are linearly interpolated to `n` entries
    /// (a single value is broadcast).
    pub fn real_vector(&mut self, n: usize, what: &str) -> Result<Vec<Real>, SetupError> {
        if n == 0 {
            return Err(SetupError::EmptyVector("input vector"));
        }
        let name = self.name.clone();
        let mut vals = Vec::new();
        loop {
            let mut rec = self.record()?;
            while rec.remaining() > 0 && vals.len() < n {
                vals.push(rec.real(&name, what)?);
            }
            if vals.len() == n {
                return Ok(vals);
            }
            if rec.terminated {
                break;
            }
            if !self.peek_more() {
                break;
            }
        }
        if vals.len() >= 2 {
            let (a, b) = (vals[0], vals[1]);
            let step = (b - a) / (n as Real - 1.0);
            return Ok((0..n).map(|i| a + step * i as Real).collect());
        }
        if vals.len() == 1 {
            return Ok(vec![vals[0]; n]);
        }
        Err(parse_err(&name, &format!("expected {n} values for {what}, got {}", vals.len())))
    }
}
