/// Settings that change how a page's text is parsed.
///
/// Two configurations are equivalent iff they compare equal. A cached tree
/// built under one configuration is stale under any non-equivalent one.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct FormatConfig {
	/// Treat bare CamelCase words as page links.
	pub camel_case_links: bool,
	/// Skip all markup recognition; the tree is a single plain-text node.
	pub no_format: bool,
}

impl FormatConfig {
	/// Configuration for pages that carry raw text only (functional pages).
	pub const fn plain() -> Self {
		Self {
			camel_case_links: false,
			no_format: true,
		}
	}

	/// Deep equivalence check used by cache validation.
	pub fn is_equivalent(&self, other: &Self) -> bool {
		self == other
	}
}

impl Default for FormatConfig {
	fn default() -> Self {
		Self {
			camel_case_links: true,
			no_format: false,
		}
	}
}
