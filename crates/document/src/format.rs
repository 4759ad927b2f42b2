use quire_syntax::FormatConfig;

use crate::store::GLOBAL_PREFIX;

/// Decides the format configuration a page is parsed with.
pub trait FormatResolver: Send + Sync {
	/// `properties` are the page's committed properties, `globals` the
	/// document-wide `global.*` properties.
	fn resolve(&self, page: &str, properties: &[(String, String)], globals: &[(String, String)]) -> FormatConfig;
}

/// Resolves formats from the `camelCaseWordsEnabled` property (page value
/// first, then `global.camelCaseWordsEnabled`, default on).
#[derive(Debug, Default, Clone, Copy)]
pub struct PropertyFormatResolver;

pub const CAMEL_CASE_KEY: &str = "camelCaseWordsEnabled";

impl FormatResolver for PropertyFormatResolver {
	fn resolve(&self, _page: &str, properties: &[(String, String)], globals: &[(String, String)]) -> FormatConfig {
		let camel = property_or_global(properties, globals, CAMEL_CASE_KEY)
			.map(parse_bool)
			.unwrap_or(true);
		FormatConfig {
			camel_case_links: camel,
			..FormatConfig::default()
		}
	}
}

/// Last page value of `key`, else the last `global.<key>` value.
pub fn property_or_global<'a>(properties: &'a [(String, String)], globals: &'a [(String, String)], key: &str) -> Option<&'a str> {
	last_value(properties, key).or_else(|| last_value(globals, &format!("{GLOBAL_PREFIX}{key}")))
}

fn last_value<'a>(properties: &'a [(String, String)], key: &str) -> Option<&'a str> {
	properties.iter().rev().find(|(k, _)| k == key).map(|(_, v)| v.as_str())
}

fn parse_bool(value: &str) -> bool {
	matches!(value.trim().to_ascii_lowercase().as_str(), "true" | "yes" | "on" | "1")
}
