use crate::error::{PageError, Result};

const FORBIDDEN: &[char] = &['[', ']', '|', '\n', '\r', '\t'];

/// Whether `name` may name a page.
///
/// Rejects empty names, names with surrounding whitespace, link syntax
/// characters and control whitespace, and names starting with `+` (heading
/// markup).
pub fn is_valid_page_name(name: &str) -> bool {
	!name.is_empty() && name.trim() == name && !name.starts_with('+') && !name.contains(FORBIDDEN)
}

pub fn validate_page_name(name: &str) -> Result<()> {
	if is_valid_page_name(name) {
		Ok(())
	} else {
		Err(PageError::InvalidPageName(name.to_string()))
	}
}
