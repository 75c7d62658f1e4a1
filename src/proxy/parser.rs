//! Proxy parser module for turning raw list lines into proxy records

use crate::error::{InputError, ParseFailure};
use crate::proxy::models::{ProxyAddress, ProxyRecord, ProxyType, TypeSelection};
use once_cell::sync::Lazy;
use regex::{Captures, Regex};
use std::fs;
use std::path::Path;
use tracing::debug;

/// Optional scheme prefix, stripped before structural matching
static SCHEME_PREFIX: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)^(https?|socks[45]?)://").expect("Invalid scheme regex"));

/// HOST:PORT:USER:PASS
static HOST_PORT_USER_PASS: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^(\d{1,3}\.\d{1,3}\.\d{1,3}\.\d{1,3}):(\d{1,5}):([^:]+):(.+)$")
        .expect("Invalid HOST:PORT:USER:PASS regex")
});

/// HOST:PORT
static HOST_PORT: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^(\d{1,3}\.\d{1,3}\.\d{1,3}\.\d{1,3}):(\d{1,5})$")
        .expect("Invalid HOST:PORT regex")
});

/// USER:PASS@HOST:PORT
static USER_PASS_AT_HOST_PORT: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^([^:@]+):([^@]+)@(\d{1,3}\.\d{1,3}\.\d{1,3}\.\d{1,3}):(\d{1,5})$")
        .expect("Invalid USER:PASS@HOST:PORT regex")
});

/// A structural form a proxy line may take
struct Grammar {
    name: &'static str,
    pattern: &'static Lazy<Regex>,
    build: fn(&Captures<'_>) -> Option<ProxyAddress>,
}

/// Tried in order; the first match wins
static GRAMMARS: [Grammar; 3] = [
    Grammar {
        name: "host:port:user:pass",
        pattern: &HOST_PORT_USER_PASS,
        build: |caps| {
            Some(ProxyAddress::with_auth(
                caps[1].to_string(),
                caps[2].parse().ok()?,
                caps[3].to_string(),
                caps[4].to_string(),
            ))
        },
    },
    Grammar {
        name: "host:port",
        pattern: &HOST_PORT,
        build: |caps| Some(ProxyAddress::new(caps[1].to_string(), caps[2].parse().ok()?)),
    },
    Grammar {
        name: "user:pass@host:port",
        pattern: &USER_PASS_AT_HOST_PORT,
        build: |caps| {
            Some(ProxyAddress::with_auth(
                caps[3].to_string(),
                caps[4].parse().ok()?,
                caps[1].to_string(),
                caps[2].to_string(),
            ))
        },
    },
];

/// A successfully parsed line, not yet placed in a list
#[derive(Debug, Clone, PartialEq)]
pub struct ParsedLine {
    pub address: ProxyAddress,
    pub proxy_type: ProxyType,
    pub original_text: String,
}

impl ParsedLine {
    /// Turn the line into a pending record at list position `id`
    pub fn into_record(self, id: usize) -> ProxyRecord {
        ProxyRecord::new(id, self.address, self.proxy_type, self.original_text)
    }
}

/// Records parsed from a list plus the number of lines that matched no grammar
#[derive(Debug, Clone, Default)]
pub struct ParseReport {
    pub records: Vec<ProxyRecord>,
    pub skipped: usize,
}

/// Proxy parser for parsing proxies from strings and files
pub struct ProxyParser;

impl ProxyParser {
    /// Parse a single proxy line
    ///
    /// Supports formats, each with an optional `http://`, `https://`,
    /// `socks4://`, `socks5://` or `socks://` prefix:
    /// - IP:PORT:USER:PASS
    /// - IP:PORT
    /// - USER:PASS@IP:PORT
    pub fn parse_line(line: &str, selection: TypeSelection) -> Result<ParsedLine, ParseFailure> {
        let line = line.trim();
        if line.is_empty() {
            return Err(ParseFailure::Blank);
        }
        if line.starts_with('#') {
            return Err(ParseFailure::Comment);
        }

        let body = SCHEME_PREFIX.replace(line, "");

        for grammar in &GRAMMARS {
            let Some(caps) = grammar.pattern.captures(&body) else {
                continue;
            };
            if let Some(address) = (grammar.build)(&caps) {
                debug!(grammar = grammar.name, line, "matched proxy line");
                return Ok(ParsedLine {
                    address,
                    proxy_type: selection.resolve(line),
                    original_text: line.to_string(),
                });
            }
        }

        Err(ParseFailure::Unrecognized)
    }

    /// Parse proxies from a string (multiple lines)
    ///
    /// Record ids are assigned by position among successfully parsed lines.
    pub fn parse_string(content: &str, selection: TypeSelection) -> ParseReport {
        let mut report = ParseReport::default();

        for line in content.lines() {
            match Self::parse_line(line, selection) {
                Ok(parsed) => {
                    let id = report.records.len();
                    report.records.push(parsed.into_record(id));
                }
                Err(ParseFailure::Unrecognized) => report.skipped += 1,
                Err(ParseFailure::Blank | ParseFailure::Comment) => {}
            }
        }

        report
    }

    /// Parse proxies from a `.txt` file
    pub fn parse_file<P: AsRef<Path>>(
        path: P,
        selection: TypeSelection,
    ) -> Result<ParseReport, InputError> {
        let path = path.as_ref();
        let is_txt = path
            .extension()
            .and_then(|ext| ext.to_str())
            .is_some_and(|ext| ext.eq_ignore_ascii_case("txt"));
        if !is_txt {
            return Err(InputError::WrongExtension(path.to_path_buf()));
        }

        let content = fs::read_to_string(path).map_err(|source| InputError::Unreadable {
            path: path.to_path_buf(),
            source,
        })?;

        Ok(Self::parse_string(&content, selection))
    }
}
