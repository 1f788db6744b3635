//! Pageview line parser
//!
//! Line format: `domain_code page_title views bytes`, single spaces.
//! `bytes` has been 0 in dumps since 2016 but is still present.

use pvsync_core::{FileIdentity, ParseError, Row, RowParser};

use crate::domain;

#[derive(Debug, Clone, Copy, Default)]
pub struct PageviewParser;

impl PageviewParser {
    pub fn new() -> Self {
        Self
    }
}

fn number(field: &str, name: &str, line: &str) -> Result<u64, ParseError> {
    field
        .parse()
        .map_err(|_| ParseError::line(format!("bad {name} {field:?} in {line:?}")))
}

impl RowParser for PageviewParser {
    fn parse_line(&self, file: &FileIdentity, line: &str) -> Result<Row, ParseError> {
        let mut fields = line.split(' ');
        let (Some(code), Some(title), Some(views), Some(bytes), None) = (
            fields.next(),
            fields.next(),
            fields.next(),
            fields.next(),
            fields.next(),
        ) else {
            return Err(ParseError::line(format!("expected 4 fields: {line:?}")));
        };
        if title.is_empty() {
            return Err(ParseError::line(format!("empty page title: {line:?}")));
        }
        let code_parts = domain::decompose(code)?;
        Ok(Row {
            date: file.date,
            hour: file.hour,
            domain_code: code.to_string(),
            language: code_parts.language.to_string(),
            domain: code_parts.domain.to_string(),
            page_title: title.to_string(),
            mobile: code_parts.mobile,
            views: number(views, "views", line)?,
            bytes: number(bytes, "bytes", line)?,
        })
    }
}
