//! Masking of source text embedded in target markup.
//!
//! A closing bracket in source text would end a directive early, so it is
//! written as `&#93;`. Attribute values additionally mask the double quote.

/// Mask text content.
pub fn text(raw: &str) -> String {
    raw.replace(']', "&#93;")
}

/// Mask an attribute value.
pub fn attr(raw: &str) -> String {
    raw.replace(']', "&#93;").replace('"', "&quot;")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn masks_closing_brackets() {
        assert_eq!(text("a[1] b"), "a[1&#93; b");
    }

    #[test]
    fn masks_quotes_in_attributes() {
        assert_eq!(attr(r#"say "x]""#), "say &quot;x&#93;&quot;");
    }
}
