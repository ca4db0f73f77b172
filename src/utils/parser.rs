//! Text extraction primitives.
//!
//! Version markers, log tails and CLI output parsing are built on these.

use regex::Regex;

/// Extract the first capture group of the first match.
pub fn extract_first(content: &str, re: &Regex) -> Option<String> {
    re.captures(content)
        .and_then(|caps| caps.get(1))
        .map(|m| m.as_str().to_string())
}

/// Replace capture group 1 of the first match with `replacement`, leaving
/// every other byte of `content` untouched. Returns None when nothing matches.
pub fn replace_first_capture(content: &str, re: &Regex, replacement: &str) -> Option<String> {
    let caps = re.captures(content)?;
    let group = caps.get(1)?;

    let mut out = String::with_capacity(content.len() + replacement.len());
    out.push_str(&content[..group.start()]);
    out.push_str(replacement);
    out.push_str(&content[group.end()..]);
    Some(out)
}

/// Last `n` lines of `text`, joined with newlines.
pub fn tail_lines(text: &str, n: usize) -> String {
    let lines: Vec<&str> = text.lines().collect();
    let start = lines.len().saturating_sub(n);
    lines[start..].join("\n")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn replace_first_capture_only_touches_group() {
        let re = Regex::new(r#"v = "([^"]*)""#).unwrap();
        let content = "a\nv = \"1\"\nv = \"1\"\n";
        let out = replace_first_capture(content, &re, "2").unwrap();
        assert_eq!(out, "a\nv = \"2\"\nv = \"1\"\n");
    }

    #[test]
    fn replace_first_capture_none_without_match() {
        let re = Regex::new(r"x=(\d)").unwrap();
        assert!(replace_first_capture("nothing", &re, "1").is_none());
    }

    #[test]
    fn tail_lines_handles_short_input() {
        assert_eq!(tail_lines("a\nb\nc", 2), "b\nc");
        assert_eq!(tail_lines("a\nb", 50), "a\nb");
        assert_eq!(tail_lines("", 5), "");
    }
}
