// SPDX-License-Identifier: MIT

//! The textual derivation format.
//!
//! Derivation files describe how an artifact was produced:
//!
//! ```text
//! Derive([(outputs)],[(input_drvs)],[(input_srcs)],"system","builder",[(args)],[(env)])
//! ```
//!
//! The parser is a single-pass predictive parser; serialization via
//! [`Derivation::unparse`] round-trips character for character with the
//! files the store tool writes.

use std::collections::BTreeMap;
use std::path::PathBuf;

use thiserror::Error;

use crate::hash::FileHash;
use crate::store_path::{FullStorePath, StoreDir, StorePath};

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ParseDerivationError {
    #[error("unexpected end of input at position {0}")]
    UnexpectedEof(usize),

    #[error("at position {pos}: expected {expected}, got {got:?}")]
    Expected {
        pos: usize,
        expected: String,
        got: String,
    },

    #[error("invalid store path: {0}")]
    InvalidStorePath(String),

    #[error("invalid derivation output: {0}")]
    InvalidOutput(String),

    #[error("derivation has no outputs")]
    EmptyOutputs,

    #[error("duplicate output name '{0}'")]
    DuplicateOutput(String),

    #[error("trailing input at position {0}")]
    TrailingInput(usize),
}

/// One output of a derivation: where it lands in the store and, for
/// fixed-output derivations, the digest the build result must have.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DerivationOutput {
    pub path: StorePath,
    pub hash: Option<FileHash>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Derivation {
    /// Output name to output, non-empty, names unique.
    pub outputs: BTreeMap<String, DerivationOutput>,
    /// Derivation file to the output names drawn from it.
    pub input_derivations: BTreeMap<StorePath, Vec<String>>,
    /// Non-derivation inputs, in file order.
    pub input_sources: Vec<StorePath>,
    pub system: String,
    pub builder: PathBuf,
    pub args: Vec<String>,
    pub env: BTreeMap<String, String>,
}

impl Derivation {
    /// Parse a derivation file. `store_dir` validates every quoted store
    /// path in the file.
    pub fn parse(store_dir: &StoreDir, input: &str) -> Result<Self, ParseDerivationError> {
        let mut p = Parser::new(input, store_dir);

        p.expect_str("Derive(")?;
        let outputs = p.parse_outputs()?;
        p.expect_char(',')?;
        let input_derivations = p.parse_input_derivations()?;
        p.expect_char(',')?;
        let input_sources = p.parse_list(|p| p.parse_store_path())?;
        p.expect_char(',')?;
        let system = p.parse_string()?;
        p.expect_char(',')?;
        let builder = PathBuf::from(p.parse_string()?);
        p.expect_char(',')?;
        let args = p.parse_string_list()?;
        p.expect_char(',')?;
        let env = p.parse_env()?;
        p.expect_char(')')?;
        p.expect_end()?;

        Ok(Derivation {
            outputs,
            input_derivations,
            input_sources,
            system,
            builder,
            args,
            env,
        })
    }

    /// Serialize back to the textual format.
    pub fn unparse(&self, store_dir: &StoreDir) -> String {
        let mut s = String::with_capacity(4096);
        s.push_str("Derive(");

        write_list(&mut s, self.outputs.iter(), |s, (name, output)| {
            s.push('(');
            write_string(s, name);
            s.push(',');
            write_string(s, &store_dir.full(output.path.clone()).to_string());
            s.push(',');
            match &output.hash {
                Some(hash) => {
                    write_string(s, "sha256");
                    s.push(',');
                    write_string(s, hash.digest());
                }
                None => {
                    write_string(s, "");
                    s.push(',');
                    write_string(s, "");
                }
            }
            s.push(')');
        });

        s.push(',');
        write_list(&mut s, self.input_derivations.iter(), |s, (drv, outs)| {
            s.push('(');
            write_string(s, &store_dir.full(drv.clone()).to_string());
            s.push(',');
            write_list(s, outs.iter(), |s, out| write_string(s, out));
            s.push(')');
        });

        s.push(',');
        write_list(&mut s, self.input_sources.iter(), |s, src| {
            write_string(s, &store_dir.full(src.clone()).to_string());
        });

        s.push(',');
        write_string(&mut s, &self.system);
        s.push(',');
        write_string(&mut s, &self.builder.to_string_lossy());

        s.push(',');
        write_list(&mut s, self.args.iter(), |s, arg| write_string(s, arg));

        s.push(',');
        write_list(&mut s, self.env.iter(), |s, (key, value)| {
            s.push('(');
            write_string(s, key);
            s.push(',');
            write_string(s, value);
            s.push(')');
        });

        s.push(')');
        s
    }
}

fn write_string(out: &mut String, s: &str) {
    out.push('"');
    for c in s.chars() {
        match c {
            '"' | '\\' => {
                out.push('\\');
                out.push(c);
            }
            '\n' => out.push_str("\\n"),
            '\r' => out.push_str("\\r"),
            '\t' => out.push_str("\\t"),
            _ => out.push(c),
        }
    }
    out.push('"');
}

fn write_list<I, F>(out: &mut String, iter: I, mut write_item: F)
where
    I: Iterator,
    F: FnMut(&mut String, I::Item),
{
    out.push('[');
    let mut first = true;
    for item in iter {
        if !first {
            out.push(',');
        }
        first = false;
        write_item(out, item);
    }
    out.push(']');
}

struct Parser<'a> {
    input: &'a str,
    pos: usize,
    store_dir: &'a StoreDir,
}

impl<'a> Parser<'a> {
    fn new(input: &'a str, store_dir: &'a StoreDir) -> Self {
        Self {
            input,
            pos: 0,
            store_dir,
        }
    }

    fn remaining(&self) -> &'a str {
        &self.input[self.pos..]
    }

    fn peek(&self) -> Result<char, ParseDerivationError> {
        self.remaining()
            .chars()
            .next()
            .ok_or(ParseDerivationError::UnexpectedEof(self.pos))
    }

    fn advance(&mut self, n: usize) {
        self.pos += n;
    }

    fn expect_char(&mut self, expected: char) -> Result<(), ParseDerivationError> {
        let got = self.peek()?;
        if got == expected {
            self.advance(expected.len_utf8());
            Ok(())
        } else {
            Err(ParseDerivationError::Expected {
                pos: self.pos,
                expected: format!("'{expected}'"),
                got: got.to_string(),
            })
        }
    }

    fn expect_str(&mut self, expected: &str) -> Result<(), ParseDerivationError> {
        if self.remaining().starts_with(expected) {
            self.advance(expected.len());
            Ok(())
        } else {
            let got_len = expected.len().min(self.remaining().len());
            Err(ParseDerivationError::Expected {
                pos: self.pos,
                expected: format!("{expected:?}"),
                got: self.remaining()[..got_len].to_string(),
            })
        }
    }

    /// Trailing whitespace after the closing paren is tolerated; anything
    /// else is an error.
    fn expect_end(&mut self) -> Result<(), ParseDerivationError> {
        if self.remaining().chars().all(|c| c.is_ascii_whitespace()) {
            Ok(())
        } else {
            Err(ParseDerivationError::TrailingInput(self.pos))
        }
    }

    fn parse_string(&mut self) -> Result<String, ParseDerivationError> {
        self.expect_char('"')?;
        let mut result = String::new();
        loop {
            let c = self.peek()?;
            self.advance(c.len_utf8());
            match c {
                '"' => return Ok(result),
                '\\' => {
                    let escaped = self.peek()?;
                    self.advance(escaped.len_utf8());
                    match escaped {
                        'n' => result.push('\n'),
                        'r' => result.push('\r'),
                        't' => result.push('\t'),
                        'b' => result.push('\u{8}'),
                        other => result.push(other),
                    }
                }
                other => result.push(other),
            }
        }
    }

    fn parse_list<T>(
        &mut self,
        mut parse_item: impl FnMut(&mut Self) -> Result<T, ParseDerivationError>,
    ) -> Result<Vec<T>, ParseDerivationError> {
        self.expect_char('[')?;
        let mut result = Vec::new();
        if self.peek()? == ']' {
            self.advance(1);
            return Ok(result);
        }
        loop {
            result.push(parse_item(self)?);
            match self.peek()? {
                ',' => self.advance(1),
                ']' => {
                    self.advance(1);
                    return Ok(result);
                }
                c => {
                    return Err(ParseDerivationError::Expected {
                        pos: self.pos,
                        expected: "',' or ']'".to_string(),
                        got: c.to_string(),
                    });
                }
            }
        }
    }

    fn parse_string_list(&mut self) -> Result<Vec<String>, ParseDerivationError> {
        self.parse_list(|p| p.parse_string())
    }

    fn parse_store_path(&mut self) -> Result<StorePath, ParseDerivationError> {
        let path_str = self.parse_string()?;
        let full = FullStorePath::parse(&path_str)
            .map_err(|e| ParseDerivationError::InvalidStorePath(format!("{path_str}: {e}")))?;
        if full.store_dir() != self.store_dir {
            return Err(ParseDerivationError::InvalidStorePath(format!(
                "{path_str}: not under store directory {}",
                self.store_dir
            )));
        }
        Ok(full.into_store_path())
    }

    fn parse_outputs(
        &mut self,
    ) -> Result<BTreeMap<String, DerivationOutput>, ParseDerivationError> {
        let items = self.parse_list(|p| {
            p.expect_char('(')?;
            let name = p.parse_string()?;
            p.expect_char(',')?;
            let path = p.parse_store_path()?;
            p.expect_char(',')?;
            let algo = p.parse_string()?;
            p.expect_char(',')?;
            let digest = p.parse_string()?;
            p.expect_char(')')?;
            let hash = decode_output_hash(&algo, &digest)?;
            Ok((name, DerivationOutput { path, hash }))
        })?;
        if items.is_empty() {
            return Err(ParseDerivationError::EmptyOutputs);
        }
        let mut outputs = BTreeMap::new();
        for (name, output) in items {
            if outputs.insert(name.clone(), output).is_some() {
                return Err(ParseDerivationError::DuplicateOutput(name));
            }
        }
        Ok(outputs)
    }

    fn parse_input_derivations(
        &mut self,
    ) -> Result<BTreeMap<StorePath, Vec<String>>, ParseDerivationError> {
        let items = self.parse_list(|p| {
            p.expect_char('(')?;
            let drv_path = p.parse_store_path()?;
            p.expect_char(',')?;
            let outputs = p.parse_string_list()?;
            p.expect_char(')')?;
            Ok((drv_path, outputs))
        })?;
        Ok(items.into_iter().collect())
    }

    fn parse_env(&mut self) -> Result<BTreeMap<String, String>, ParseDerivationError> {
        let pairs = self.parse_list(|p| {
            p.expect_char('(')?;
            let key = p.parse_string()?;
            p.expect_char(',')?;
            let value = p.parse_string()?;
            p.expect_char(')')?;
            Ok((key, value))
        })?;
        Ok(pairs.into_iter().collect())
    }
}

/// Decode the `(algo, digest)` tail of an output tuple. An empty algo
/// requires an empty digest and attaches no hash.
fn decode_output_hash(
    algo: &str,
    digest: &str,
) -> Result<Option<FileHash>, ParseDerivationError> {
    match algo {
        "" => {
            if digest.is_empty() {
                Ok(None)
            } else {
                Err(ParseDerivationError::InvalidOutput(format!(
                    "digest '{digest}' given without a hash algorithm"
                )))
            }
        }
        "sha256" => FileHash::sha256(digest)
            .map(Some)
            .map_err(|e| ParseDerivationError::InvalidOutput(e.to_string())),
        other => Err(ParseDerivationError::InvalidOutput(format!(
            "unknown hash algorithm '{other}'"
        ))),
    }
}
