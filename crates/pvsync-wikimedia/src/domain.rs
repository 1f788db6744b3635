//! Domain code decomposition
//!
//! A domain code is `language[.m][.suffix]`, e.g. `en`, `de.m`, `en.m.voy`,
//! `fr.d`. Sites hosted on wikimedia.org carry the project suffix `m` right
//! after the site name (`commons.m`), so their mobile marker comes second
//! (`commons.m.m`).

use pvsync_core::ParseError;

/// Sites whose domain is `{site}.wikimedia.org`
const WIKIMEDIA_SITES: &[&str] = &[
    "commons",
    "meta",
    "incubator",
    "species",
    "strategy",
    "outreach",
    "usability",
    "quality",
    "foundation",
    "wikimania",
    "wikitech",
    "login",
];

const WIKIMEDIA_PROJECT: &str = "m";
const MOBILE: &str = "m";

fn domain_for(suffix: &str) -> Option<&'static str> {
    Some(match suffix {
        "" => "wikipedia.org",
        "b" => "wikibooks.org",
        "d" => "wiktionary.org",
        "f" => "wikimediafoundation.org",
        "m" => "wikimedia.org",
        "n" => "wikinews.org",
        "q" => "wikiquote.org",
        "s" => "wikisource.org",
        "v" => "wikiversity.org",
        "voy" => "wikivoyage.org",
        "w" => "mediawiki.org",
        "wd" => "wikidata.org",
        _ => return None,
    })
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DomainCode<'a> {
    pub language: &'a str,
    pub domain: &'a str,
    pub mobile: bool,
}

/// Split a domain code into language, domain and mobile flag.
///
/// Unknown project suffixes pass through verbatim as the domain.
pub fn decompose(code: &str) -> Result<DomainCode<'_>, ParseError> {
    let mut parts = code.split('.');
    let language = match parts.next() {
        Some(l) if !l.is_empty() => l,
        _ => return Err(ParseError::line(format!("empty domain code: {code:?}"))),
    };
    let mut rest = parts.peekable();

    let mut suffix = None;
    if WIKIMEDIA_SITES.contains(&language) && rest.peek() == Some(&WIKIMEDIA_PROJECT) {
        rest.next();
        suffix = Some(WIKIMEDIA_PROJECT);
    }
    let mobile = rest.next_if_eq(&MOBILE).is_some();
    if suffix.is_none() {
        suffix = rest.next();
    }
    if let Some(extra) = rest.next() {
        return Err(ParseError::line(format!(
            "unexpected segment {extra:?} in domain code {code:?}"
        )));
    }

    let suffix = suffix.unwrap_or_default();
    if suffix.is_empty() && code.ends_with('.') {
        return Err(ParseError::line(format!("trailing dot in domain code {code:?}")));
    }
    let domain = domain_for(suffix).unwrap_or(suffix);
    Ok(DomainCode {
        language,
        domain,
        mobile,
    })
}
