/// Ordered caption constraints applied to every request in a batch.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RuleSet(Vec<String>);

impl RuleSet {
    /// Split free text into one rule per line.
    ///
    /// Blank and whitespace-only lines are skipped. Other lines are kept
    /// verbatim, in order, minus a trailing `\r`.
    pub fn parse(text: &str) -> Self {
        let rules = text
            .split('\n')
            .map(|line| line.strip_suffix('\r').unwrap_or(line))
            .filter(|line| !line.trim().is_empty())
            .map(str::to_string)
            .collect();
        Self(rules)
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn iter(&self) -> impl Iterator<Item = &str> {
        self.0.iter().map(String::as_str)
    }

    /// Rules rendered as a system prompt, or `None` when there are no rules.
    pub fn system_prompt(&self) -> Option<String> {
        if self.is_empty() {
            return None;
        }
        let mut out = String::from("Follow these rules when describing the image:\n");
        for (i, rule) in self.0.iter().enumerate() {
            out.push_str(&format!("Rule #{}\n{}\n", i + 1, rule));
        }
        out.pop();
        Some(out)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn splits_on_newlines_in_order() {
        let rules = RuleSet::parse("Mention color\nMention pose");
        assert_eq!(rules.iter().collect::<Vec<_>>(), ["Mention color", "Mention pose"]);
    }

    #[test]
    fn empty_text_is_empty_ruleset() {
        assert!(RuleSet::parse("").is_empty());
        assert!(RuleSet::parse("\n \r\n\t\n").is_empty());
    }

    #[test]
    fn crlf_and_blank_lines() {
        let rules = RuleSet::parse("  first \r\n\r\nsecond\n");
        assert_eq!(rules.iter().collect::<Vec<_>>(), ["  first ", "second"]);
    }

    #[test]
    fn parse_is_idempotent() {
        let text = "a\n\nb\nc";
        assert_eq!(RuleSet::parse(text), RuleSet::parse(text));
    }

    #[test]
    fn system_prompt_lists_rules() {
        assert_eq!(RuleSet::parse("").system_prompt(), None);
        let prompt = RuleSet::parse("Mention color\nMention pose").system_prompt().unwrap();
        assert_eq!(
            prompt,
            "Follow these rules when describing the image:\nRule #1\nMention color\nRule #2\nMention pose"
        );
    }
}
