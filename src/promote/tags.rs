//! Tag selection

use crate::error::PromoteError;
use regex::Regex;

/// Keep the tags matching `pattern`, in their original order.
///
/// Without a pattern every tag is kept. A pattern that selects nothing is an
/// error, as is one that does not compile.
pub fn select_tags(tags: Vec<String>, pattern: Option<&str>) -> Result<Vec<String>, PromoteError> {
    let Some(pattern) = pattern.filter(|p| !p.is_empty()) else {
        return Ok(tags);
    };

    let regex = Regex::new(pattern)?;
    let selected: Vec<String> = tags.into_iter().filter(|tag| regex.is_match(tag)).collect();

    if selected.is_empty() {
        return Err(PromoteError::NoMatchingTags {
            pattern: pattern.to_string(),
        });
    }
    Ok(selected)
}
