//! 信頼度スコアの区分と利用者向け説明文。
use serde::Serialize;

/// 信頼度スコア（0〜100、負値あり）の区分。
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum ConfidenceBand {
    VeryHigh,
    High,
    Moderate,
    Low,
    VeryLow,
}

impl ConfidenceBand {
    /// 負値や NaN は `VeryLow` に落ちる。
    #[must_use]
    pub fn from_score(score: f64) -> Self {
        if score >= 80.0 {
            Self::VeryHigh
        } else if score >= 60.0 {
            Self::High
        } else if score >= 40.0 {
            Self::Moderate
        } else if score >= 20.0 {
            Self::Low
        } else {
            Self::VeryLow
        }
    }

    #[must_use]
    pub fn label(self) -> &'static str {
        match self {
            Self::VeryHigh => "Very High",
            Self::High => "High",
            Self::Moderate => "Moderate",
            Self::Low => "Low",
            Self::VeryLow => "Very Low",
        }
    }

    #[must_use]
    pub fn explanation(self, category: &str) -> String {
        let detail = match self {
            Self::VeryHigh => format!(
                "Very high confidence means the content is very similar to typical {category} content."
            ),
            Self::High => format!(
                "High confidence means the content is quite similar to typical {category} content."
            ),
            Self::Moderate => format!(
                "Moderate confidence means the content has reasonable similarity to typical {category} content."
            ),
            Self::Low => format!(
                "Low confidence means the content is somewhat different from typical {category} content, but still classified in this category."
            ),
            Self::VeryLow => format!(
                "Very low confidence means the content is quite different from typical {category} content, but was still classified in this category."
            ),
        };
        format!(
            "This score indicates how similar the content is to typical {category} news. {detail}"
        )
    }
}

#[cfg(test)]
mod tests {
    use rstest::rstest;

    use super::*;

    #[rstest]
    #[case(85.0, ConfidenceBand::VeryHigh)]
    #[case(80.0, ConfidenceBand::VeryHigh)]
    #[case(79.99, ConfidenceBand::High)]
    #[case(60.0, ConfidenceBand::High)]
    #[case(45.5, ConfidenceBand::Moderate)]
    #[case(20.0, ConfidenceBand::Low)]
    #[case(19.99, ConfidenceBand::VeryLow)]
    #[case(-35.0, ConfidenceBand::VeryLow)]
    #[case(f64::NAN, ConfidenceBand::VeryLow)]
    fn bands_follow_thresholds(#[case] score: f64, #[case] expected: ConfidenceBand) {
        assert_eq!(ConfidenceBand::from_score(score), expected);
    }

    #[test]
    fn explanation_mentions_category() {
        let text = ConfidenceBand::Low.explanation("politics");
        assert!(text.starts_with("This score indicates how similar the content is to typical politics news."));
        assert!(text.contains("still classified"));
        assert_eq!(ConfidenceBand::VeryHigh.label(), "Very High");
    }
}
