pub mod cache;
pub mod name;
pub mod overlay;
pub mod resequence;
pub mod resolve;
pub mod upload;
pub mod view;

use name::{decode, Grammar, ParsedName};

/// Bucket membership rule, the one place both grammars are consulted:
/// slugged first, then unslugged, as two explicit ordered decodes. Names
/// matching neither grammar belong to no bucket (still displayable, excluded
/// from every rank feature).
pub fn parse_member(file_name: &str) -> Option<ParsedName> {
    decode(file_name, Grammar::Slugged).or_else(|| decode(file_name, Grammar::Unslugged))
}
