//! Clutter-list extraction from the stage 1 analysis text.

/// Section label the scene analysis prompt asks the model to emit.
pub const CLUTTER_LABEL: &str = "【杂乱物品清单】";

const SECTION_OPEN: char = '【';

/// One way of locating the clutter section. Strategies are tried in order
/// and the first label found wins.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LabelStrategy {
    pub name: &'static str,
    pub label: &'static str,
}

pub const EXTRACTION_STRATEGIES: [LabelStrategy; 3] = [
    LabelStrategy {
        name: "bracketed-label",
        label: CLUTTER_LABEL,
    },
    LabelStrategy {
        name: "bare-label",
        label: "杂乱物品清单",
    },
    LabelStrategy {
        name: "keyword",
        label: "杂乱物品",
    },
];

impl LabelStrategy {
    /// Text after the first occurrence of the label up to the next section
    /// opener or the end of the analysis, label and separators removed.
    pub fn extract(&self, analysis: &str) -> Option<String> {
        let start = analysis.find(self.label)? + self.label.len();
        let rest = &analysis[start..];
        let end = rest.find(SECTION_OPEN).unwrap_or(rest.len());
        let section = rest[..end]
            .trim_start_matches(|c: char| c.is_whitespace() || matches!(c, ':' | '：' | '】'))
            .trim();
        Some(section.to_string())
    }
}

/// Empty when no strategy finds a label; never fails.
pub fn extract_clutter_list(analysis: &str) -> String {
    EXTRACTION_STRATEGIES
        .iter()
        .find_map(|strategy| {
            let section = strategy.extract(analysis)?;
            tracing::debug!(
                strategy = strategy.name,
                chars = section.chars().count(),
                "clutter list located"
            );
            Some(section)
        })
        .unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bracketed_label_runs_to_next_section() {
        let analysis = "【场景概述】A small bedroom.\n【杂乱物品清单】 bottles, cups \n【整理建议】Tidy the desk.";
        assert_eq!(extract_clutter_list(analysis), "bottles, cups");
    }

    #[test]
    fn bracketed_label_runs_to_end_of_text() {
        assert_eq!(
            extract_clutter_list("【杂乱物品清单】bottles, cups"),
            "bottles, cups"
        );
    }

    #[test]
    fn bare_label_strips_separator() {
        let analysis = "Overview first.\n杂乱物品清单：socks, cables\n【整理建议】Fold clothes.";
        assert_eq!(extract_clutter_list(analysis), "socks, cables");
    }

    #[test]
    fn keyword_match_is_the_last_resort() {
        let analysis = "The room has some 杂乱物品: pizza box, laundry";
        assert_eq!(extract_clutter_list(analysis), "pizza box, laundry");
    }

    #[test]
    fn bracketed_label_beats_an_earlier_bare_mention() {
        let analysis = "杂乱物品清单 follows below.\n【杂乱物品清单】mugs\n【整理建议】x";
        assert_eq!(extract_clutter_list(analysis), "mugs");
    }

    #[test]
    fn unlabeled_analysis_yields_empty_string() {
        assert_eq!(extract_clutter_list(""), "");
        assert_eq!(
            extract_clutter_list("A tidy living room with a sofa and a lamp."),
            ""
        );
    }

    #[test]
    fn each_strategy_is_independent() {
        let [bracketed, bare, keyword] = EXTRACTION_STRATEGIES;
        assert_eq!(bracketed.extract("杂乱物品清单: a"), None);
        assert_eq!(bare.extract("杂乱物品清单: a").as_deref(), Some("a"));
        assert_eq!(keyword.extract("杂乱物品清单: a").as_deref(), Some("清单: a"));
    }
}
