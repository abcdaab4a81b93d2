//! Slug normalization

use crate::error::LedgerError;

/// Lowercase alphanumerics joined by single hyphens
///
/// `"John  Doe (the Elder)"` becomes `"john-doe-the-elder"`. Letters and
/// digits outside ASCII are kept, so `"Zoë"` and `"Zoé"` stay distinct.
#[must_use]
pub fn slugify(text: &str) -> String {
    let mut slug = String::with_capacity(text.len());
    let mut pending_hyphen = false;
    for ch in text.chars() {
        if ch.is_alphanumeric() {
            if pending_hyphen && !slug.is_empty() {
                slug.push('-');
            }
            pending_hyphen = false;
            slug.extend(ch.to_lowercase());
        } else {
            pending_hyphen = true;
        }
    }
    slug
}

/// Category-namespaced entry slug, e.g. `characters:john-doe`
///
/// # Errors
///
/// Fails when the category is blank or the name has no alphanumerics.
pub fn entry_slug(category: &str, name: &str) -> Result<String, LedgerError> {
    let category = slugify(category);
    if category.is_empty() {
        return Err(LedgerError::EmptyCategory);
    }
    let slug = slugify(name);
    if slug.is_empty() {
        return Err(LedgerError::EmptySlug {
            category,
            name: name.to_string(),
        });
    }
    Ok(format!("{category}:{slug}"))
}
