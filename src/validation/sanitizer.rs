//! Code-fence stripping for model-generated queries.
//!
//! Accepted shape (all parts optional):
//!
//! ````text
//! ```<tag>          opening fence, <tag> = [A-Za-z0-9_+-]*
//! <content>         returned unchanged
//! ```               closing fence
//! ````
//!
//! An opening fence that shares its line with content (```` ```sql SELECT 1 ````)
//! loses only the fence and a known language tag. Any other word glued to the
//! fence is content (```` ```SELECT Name ````). A closing fence glued to the
//! last content line is cut off as well.

const FENCE: &str = "```";

const LANGUAGE_TAGS: &[&str] = &[
    "sql", "postgresql", "postgres", "psql", "pgsql", "plpgsql", "mysql", "mariadb", "tsql",
    "t-sql", "plsql", "sqlite", "text",
];

/// Statement keywords that can open a query on the fence line
const LEADING_KEYWORDS: &[&str] = &["select", "with"];

fn is_language_tag(word: &str) -> bool {
    LANGUAGE_TAGS.iter().any(|t| t.eq_ignore_ascii_case(word))
}

fn is_leading_keyword(word: &str) -> bool {
    LEADING_KEYWORDS.iter().any(|k| k.eq_ignore_ascii_case(word))
}

pub fn strip_code_fences(raw: &str) -> String {
    let trimmed = raw.trim();
    let mut lines: Vec<&str> = trimmed.lines().collect();

    if let Some(first) = lines.first().copied() {
        if let Some(rest) = first.trim_start().strip_prefix(FENCE) {
            let tag_len = rest
                .chars()
                .take_while(|c| c.is_ascii_alphanumeric() || matches!(c, '_' | '+' | '-'))
                .count();
            let (tag, after_tag) = rest.split_at(tag_len);
            if after_tag.trim().is_empty() && !is_leading_keyword(tag) {
                lines.remove(0);
            } else if after_tag.starts_with(char::is_whitespace) && is_language_tag(tag) {
                lines[0] = after_tag.trim_start();
            } else {
                lines[0] = rest;
            }
        }
    }

    if let Some(last) = lines.last().copied() {
        let last_trimmed = last.trim_end();
        if last_trimmed == FENCE {
            lines.pop();
        } else if let Some(content) = last_trimmed.strip_suffix(FENCE) {
            let idx = lines.len() - 1;
            lines[idx] = content.trim_end();
        }
    }

    lines.join("\n").trim().to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_strip_tagged_fence() {
        let raw = "```sql\nSELECT COUNT(*)\nFROM HumanResources.Department\n```";
        assert_eq!(
            strip_code_fences(raw),
            "SELECT COUNT(*)\nFROM HumanResources.Department"
        );
    }

    #[test]
    fn test_strip_untagged_and_uppercase_tag() {
        assert_eq!(strip_code_fences("```\nSELECT 1\n```"), "SELECT 1");
        assert_eq!(strip_code_fences("```SQL\nSELECT 1\n```\n"), "SELECT 1");
        assert_eq!(strip_code_fences("```t-sql\nSELECT 1\n```"), "SELECT 1");
    }

    #[test]
    fn test_no_fence_is_unchanged() {
        let sql = "SELECT Name\nFROM Production.Product\nWHERE ProductID IN (1,2)";
        assert_eq!(strip_code_fences(sql), sql);
    }

    #[test]
    fn test_inner_content_preserved() {
        let raw = "```sql\nSELECT a,\n\n    b -- keep ``` inside\nFROM t\n```";
        let out = strip_code_fences(raw);
        assert_eq!(out, "SELECT a,\n\n    b -- keep ``` inside\nFROM t");
        assert!(!out.lines().any(|l| l.trim() == "```"));
    }

    #[test]
    fn test_inline_fences() {
        assert_eq!(strip_code_fences("```sql SELECT 1```"), "SELECT 1");
        assert_eq!(strip_code_fences("SELECT 1;```"), "SELECT 1;");
    }

    #[test]
    fn test_only_trailing_fence() {
        assert_eq!(strip_code_fences("SELECT 1\n```"), "SELECT 1");
    }

    #[test]
    fn test_fence_glued_to_query_keeps_keyword() {
        assert_eq!(
            strip_code_fences("```SELECT Name\nFROM Production.Product\n```"),
            "SELECT Name\nFROM Production.Product"
        );
        assert_eq!(
            strip_code_fences("```SELECT\nName FROM Production.Product```"),
            "SELECT\nName FROM Production.Product"
        );
        assert_eq!(
            strip_code_fences("```postgresql SELECT 1\n```"),
            "SELECT 1"
        );
    }
}
