/// Case-insensitive keyword filter over raw log lines.
///
/// An empty filter matches nothing.
#[derive(Debug, Clone, Default)]
pub struct LevelFilter {
    levels: Vec<String>,
}

impl LevelFilter {
    pub fn new<S: AsRef<str>>(levels: &[S]) -> Self {
        let mut levels: Vec<String> = levels
            .iter()
            .map(|l| l.as_ref().trim().to_uppercase())
            .filter(|l| !l.is_empty())
            .collect();
        levels.sort();
        levels.dedup();
        Self { levels }
    }

    pub fn is_empty(&self) -> bool {
        self.levels.is_empty()
    }

    pub fn matches(&self, line: &str) -> bool {
        if self.levels.is_empty() {
            return false;
        }
        let upper = line.to_uppercase();
        self.levels.iter().any(|lvl| upper.contains(lvl.as_str()))
    }

    /// Split `text` into lines and keep the matching ones, in order.
    pub fn matching_lines(&self, text: &str) -> Vec<String> {
        text.lines()
            .filter(|line| self.matches(line))
            .map(str::to_string)
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_matches_case_insensitively() {
        let f = LevelFilter::new(&["error"]);
        assert!(f.matches("2025-01-01 ERROR disk full"));
        assert!(f.matches("Error: retrying"));
        assert!(!f.matches("WARN slow request"));
    }

    #[test]
    fn test_empty_filter_matches_nothing() {
        let f = LevelFilter::new::<&str>(&[]);
        assert!(f.is_empty());
        assert!(!f.matches("ERROR"));
        assert!(LevelFilter::new(&["  "]).is_empty());
    }

    #[test]
    fn test_line_matching_several_levels_kept_once() {
        let f = LevelFilter::new(&["ERROR", "WARN", "error"]);
        let text = "INFO boot\nWARN then ERROR\nERROR disk full\n\n";
        assert_eq!(
            f.matching_lines(text),
            vec!["WARN then ERROR".to_string(), "ERROR disk full".to_string()]
        );
    }
}
