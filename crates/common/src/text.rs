//! Newline normalization for multi-line comparisons
//!
//! Parameter passing checks compare the text a tool received with the
//! text that was sent. Some checks collapse blank lines, some only trim,
//! so both rules are exposed and each caller picks one.

/// Trim the ends and collapse runs of newlines into one
pub fn shrink_space(data: &str) -> String {
    let mut out = String::with_capacity(data.len());
    let mut last_was_newline = false;
    for c in data.trim().chars() {
        if c == '\n' {
            if last_was_newline {
                continue;
            }
            last_was_newline = true;
        } else {
            last_was_newline = false;
        }
        out.push(c);
    }
    out
}

/// Trim the ends, leave interior blank lines alone
pub fn strip_only(data: &str) -> String {
    data.trim().to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use test_case::test_case;

    #[test_case("  a\n\n\nb \n", "a\nb" ; "collapses blank lines")]
    #[test_case("a\nb", "a\nb" ; "already normal")]
    #[test_case("\n\n", "" ; "only newlines")]
    #[test_case("a \n \nb", "a \n \nb" ; "whitespace lines are not empty")]
    fn test_shrink_space(input: &str, expected: &str) {
        assert_eq!(shrink_space(input), expected);
    }

    #[test]
    fn test_strip_only_keeps_interior() {
        assert_eq!(strip_only("\n a\n\n\nb\n"), "a\n\n\nb");
    }
}
