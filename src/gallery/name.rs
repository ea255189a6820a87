use serde::Serialize;

/// Maximum slug length in characters (not bytes; slugs may be Arabic).
pub const SLUG_MAX_CHARS: usize = 60;

/// Substituted when a requested slug normalizes to nothing.
pub const SLUG_PLACEHOLDER: &str = "photo";

/// The (year, month) grouping that shares one rank sequence.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct BucketKey {
    pub year: u16,
    pub month: u8,
}

impl BucketKey {
    pub fn new(year: u16, month: u8) -> Result<Self, NameError> {
        if !(2000..=2099).contains(&year) {
            return Err(NameError::YearRange(year));
        }
        if !(1..=12).contains(&month) {
            return Err(NameError::MonthRange(month));
        }
        Ok(BucketKey { year, month })
    }

    /// The six leading digits shared by every name in the bucket, e.g. "202510".
    pub fn prefix(&self) -> String {
        format!("{:04}{:02}", self.year, self.month)
    }
}

/// Which of the two coexisting name grammars a call works under.
///
/// A name is valid under exactly the grammar the caller selects; there is
/// deliberately no auto-detecting decode.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Grammar {
    /// `yyyymm-rr-slug.ext`
    Slugged,
    /// `yyyymm-rr.ext`
    Unslugged,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ImageExt {
    Png,
    Jpg,
    Jpeg,
}

impl ImageExt {
    pub fn as_str(&self) -> &'static str {
        match self {
            ImageExt::Png => "png",
            ImageExt::Jpg => "jpg",
            ImageExt::Jpeg => "jpeg",
        }
    }

    /// Exact (lowercase) match only; `JPG` is not a valid extension.
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "png" => Some(ImageExt::Png),
            "jpg" => Some(ImageExt::Jpg),
            "jpeg" => Some(ImageExt::Jpeg),
            _ => None,
        }
    }
}

/// Decoded form of a canonical gallery name.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ParsedName {
    pub year: u16,
    pub month: u8,
    pub rank: u8,
    pub slug: Option<String>,
    pub extension: ImageExt,
}

impl ParsedName {
    pub fn bucket(&self) -> BucketKey {
        BucketKey {
            year: self.year,
            month: self.month,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NameError {
    YearRange(u16),
    MonthRange(u8),
    /// Ranks live in a fixed two-digit field; values outside 1..=99 are
    /// rejected rather than truncated onto another rank.
    RankRange(u32),
}

impl std::fmt::Display for NameError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            NameError::YearRange(y) => write!(f, "year {} outside 2000..=2099", y),
            NameError::MonthRange(m) => write!(f, "month {} outside 1..=12", m),
            NameError::RankRange(r) => write!(f, "rank {} outside 1..=99", r),
        }
    }
}

impl std::error::Error for NameError {}

fn is_slug_char(c: char) -> bool {
    c.is_ascii_alphanumeric() || c == '_' || c == '-' || ('\u{0600}'..='\u{06FF}').contains(&c)
}

/// Slug normalization: trim, collapse whitespace/underscore runs to a single
/// hyphen, drop everything outside {ASCII word chars, hyphen, Arabic letters},
/// collapse hyphen runs, strip edge hyphens, cap at 60 chars, and fall back to
/// a placeholder when nothing survives.
pub fn normalize_slug(raw: &str) -> String {
    let mut mapped = String::with_capacity(raw.len());
    let mut pending_sep = false;
    for c in raw.trim().chars() {
        if c.is_whitespace() || c == '_' {
            pending_sep = true;
            continue;
        }
        if pending_sep {
            mapped.push('-');
            pending_sep = false;
        }
        if is_slug_char(c) {
            mapped.push(c);
        }
    }

    let mut slug = String::with_capacity(mapped.len());
    let mut at_hyphen = true; // swallows leading hyphens
    for c in mapped.chars() {
        if c == '-' {
            if !at_hyphen {
                slug.push('-');
            }
            at_hyphen = true;
        } else {
            slug.push(c);
            at_hyphen = false;
        }
    }
    while slug.ends_with('-') {
        slug.pop();
    }

    let slug: String = slug.chars().take(SLUG_MAX_CHARS).collect();
    if slug.is_empty() {
        SLUG_PLACEHOLDER.to_string()
    } else {
        slug
    }
}

/// Encode a bucket + rank (+ optional slug) into the canonical name.
///
/// The given slug is normalized first. Ranks outside the two-digit field are
/// a hard error, never a silent wrap.
pub fn encode(
    bucket: BucketKey,
    rank: u32,
    slug: Option<&str>,
    extension: ImageExt,
) -> Result<String, NameError> {
    if !(1..=99).contains(&rank) {
        return Err(NameError::RankRange(rank));
    }
    match slug {
        None => Ok(format!(
            "{}-{:02}.{}",
            bucket.prefix(),
            rank,
            extension.as_str()
        )),
        Some(raw) => Ok(format!(
            "{}-{:02}-{}.{}",
            bucket.prefix(),
            rank,
            normalize_slug(raw),
            extension.as_str()
        )),
    }
}

fn two_digits(b: &[u8]) -> Option<u8> {
    if b.len() == 2 && b[0].is_ascii_digit() && b[1].is_ascii_digit() {
        Some((b[0] - b'0') * 10 + (b[1] - b'0'))
    } else {
        None
    }
}

/// Decode `name` under the selected grammar. Requires a full match; returns
/// `None` on any deviation, including out-of-range year/month/rank.
pub fn decode(name: &str, grammar: Grammar) -> Option<ParsedName> {
    let bytes = name.as_bytes();
    // "yyyymm-rr" head, then at least ".png".
    if bytes.len() < 13 {
        return None;
    }
    if !bytes[..6].iter().all(u8::is_ascii_digit) || bytes[6] != b'-' {
        return None;
    }
    let year: u16 = name[..4].parse().ok()?;
    let month = two_digits(&bytes[4..6])?;
    let rank = two_digits(&bytes[7..9])?;
    if !(2000..=2099).contains(&year) || !(1..=12).contains(&month) || !(1..=99).contains(&rank) {
        return None;
    }

    let rest = &name[9..];
    let (slug, ext) = match grammar {
        Grammar::Unslugged => {
            let ext = rest.strip_prefix('.')?;
            (None, ext)
        }
        Grammar::Slugged => {
            let rest = rest.strip_prefix('-')?;
            let dot = rest.rfind('.')?;
            let slug = &rest[..dot];
            let len = slug.chars().count();
            if len == 0 || len > SLUG_MAX_CHARS || !slug.chars().all(is_slug_char) {
                return None;
            }
            (Some(slug.to_string()), &rest[dot + 1..])
        }
    };

    Some(ParsedName {
        year,
        month,
        rank,
        slug,
        extension: ImageExt::parse(ext)?,
    })
}

#[allow(dead_code)]
pub fn validate(name: &str, grammar: Grammar) -> bool {
    decode(name, grammar).is_some()
}
