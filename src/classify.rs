//! Page classification: is this a product page, and how should it be read?
//!
//! Two independent, pure decisions are made from a page's native text:
//!
//! * a **product verdict** — keyword scoring plus table and part-number
//!   signals decide whether the page carries catalog listings or
//!   introductory boilerplate;
//! * a **method recommendation** — text length alone decides whether the
//!   native text is trustworthy (`text`), needs help (`hybrid`) or is
//!   missing entirely (`vision`).
//!
//! Both are exposed to the orchestrator through [`PageAnalysis`].

use serde::{Deserialize, Serialize};
use std::fmt;

/// Coarse categorical trust in a classifier decision.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Confidence {
    Low,
    Medium,
    High,
}

impl fmt::Display for Confidence {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Confidence::Low => "low",
            Confidence::Medium => "medium",
            Confidence::High => "high",
        })
    }
}

/// Recommended way to read a page.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ExtractionMethod {
    /// Native text is substantial.
    Text,
    /// Some native text; combine with OCR.
    Hybrid,
    /// Little or no native text; the page is probably an image.
    Vision,
}

impl fmt::Display for ExtractionMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            ExtractionMethod::Text => "text",
            ExtractionMethod::Hybrid => "hybrid",
            ExtractionMethod::Vision => "vision",
        })
    }
}

/// Outcome of the product-page decision policy.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProductVerdict {
    pub is_product_page: bool,
    pub confidence: Confidence,
    pub product_score: usize,
    pub intro_score: usize,
    pub has_tabular_data: bool,
    pub has_part_numbers: bool,
    /// Character count of the page text.
    pub text_length: usize,
}

/// Extraction-method recommendation for one page.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StrategyDecision {
    pub page_number: usize,
    pub method: ExtractionMethod,
    pub confidence: Confidence,
    pub reason: String,
}

/// Both classifier decisions for one page.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PageAnalysis {
    pub page_number: usize,
    pub product: ProductVerdict,
    pub strategy: StrategyDecision,
}

/// Keyword lists driving the product verdict.
///
/// All keywords are matched case-insensitively as substrings of the page
/// text. A keyword counts once per page no matter how often it appears.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClassifierRules {
    /// Model names, fitment terms, makes.
    pub product_keywords: Vec<String>,
    /// Table of contents, warnings, index and similar boilerplate.
    pub intro_keywords: Vec<String>,
    /// Prefixes that start a catalog part number, e.g. `86-`.
    pub part_number_prefixes: Vec<String>,
    /// Words that make a long page an extraction candidate in streaming mode.
    pub candidate_keywords: Vec<String>,
}

const PRODUCT_KEYWORDS: &[&str] = &[
    "model", "years", "specification", "part", "inner", "outer", "side", "left", "right", "front",
    "rear", "fitment", "86-", "87-", "88-", "89-", "toyota", "honda", "ford", "chevrolet",
    "nissan", "acura", "lexus", "mazda", "subaru", "volkswagen",
];

const INTRO_KEYWORDS: &[&str] = &[
    "table of contents",
    "introduction",
    "warning",
    "copyright",
    "how to use",
    "installation",
    "technical information",
    "about this catalog",
    "index",
    "notes",
];

const PART_NUMBER_PREFIXES: &[&str] = &["86-", "87-"];

const CANDIDATE_KEYWORDS: &[&str] = &["model", "years", "part"];

impl ClassifierRules {
    fn lowercased(self) -> Self {
        let lower = |words: Vec<String>| words.into_iter().map(|w| w.to_lowercase()).collect();
        Self {
            product_keywords: lower(self.product_keywords),
            intro_keywords: lower(self.intro_keywords),
            part_number_prefixes: lower(self.part_number_prefixes),
            candidate_keywords: lower(self.candidate_keywords),
        }
    }
}

fn owned(words: &[&str]) -> Vec<String> {
    words.iter().map(|w| w.to_string()).collect()
}

impl Default for ClassifierRules {
    fn default() -> Self {
        Self {
            product_keywords: owned(PRODUCT_KEYWORDS),
            intro_keywords: owned(INTRO_KEYWORDS),
            part_number_prefixes: owned(PART_NUMBER_PREFIXES),
            candidate_keywords: owned(CANDIDATE_KEYWORDS),
        }
    }
}

/// Table signals needed before a page counts as tabular.
const TABULAR_SIGNAL_THRESHOLD: usize = 5;
/// A page has part numbers when strictly more lines than this carry a prefix.
const PART_NUMBER_LINE_THRESHOLD: usize = 2;
/// Length tie-breaker for pages the keyword scores cannot decide.
const UNDECIDED_PRODUCT_MIN_CHARS: usize = 500;
/// Method thresholds on trimmed native text length.
const TEXT_METHOD_MIN_CHARS: usize = 100;
const HYBRID_METHOD_MIN_CHARS: usize = 20;
/// Streaming candidates must be longer than this to qualify by keyword.
const CANDIDATE_MIN_CHARS: usize = 100;

/// Stateless page classifier over a set of [`ClassifierRules`].
#[derive(Debug, Clone, Default)]
pub struct PageClassifier {
    rules: ClassifierRules,
}

impl PageClassifier {
    /// Keywords and prefixes are lowercased here, once, to match the
    /// lowercased page text.
    pub fn new(rules: ClassifierRules) -> Self {
        Self {
            rules: rules.lowercased(),
        }
    }

    pub fn rules(&self) -> &ClassifierRules {
        &self.rules
    }

    /// Run both decisions for one page.
    pub fn analyze(&self, page_number: usize, text: &str) -> PageAnalysis {
        PageAnalysis {
            page_number,
            product: self.classify(text),
            strategy: self.recommend(page_number, text),
        }
    }

    /// Decide whether `text` belongs to a product page.
    ///
    /// Rules are evaluated in order; the first match wins:
    /// 1. tabular and has part numbers → product, high
    /// 2. product score beats intro score and is at least 3 → product, medium
    /// 3. intro score beats product score → not product, high
    /// 4. otherwise product iff the trimmed text exceeds 500 chars, low
    pub fn classify(&self, text: &str) -> ProductVerdict {
        let lower = text.to_lowercase();

        let product_score = count_hits(&lower, &self.rules.product_keywords);
        let intro_score = count_hits(&lower, &self.rules.intro_keywords);
        let has_tabular_data = self.has_tabular_structure(&lower);
        let has_part_numbers = lower
            .lines()
            .filter(|line| self.has_part_number(line))
            .count()
            > PART_NUMBER_LINE_THRESHOLD;

        let (is_product_page, confidence) = if has_tabular_data && has_part_numbers {
            (true, Confidence::High)
        } else if product_score > intro_score && product_score >= 3 {
            (true, Confidence::Medium)
        } else if intro_score > product_score {
            (false, Confidence::High)
        } else {
            (
                lower.trim().chars().count() > UNDECIDED_PRODUCT_MIN_CHARS,
                Confidence::Low,
            )
        };

        ProductVerdict {
            is_product_page,
            confidence,
            product_score,
            intro_score,
            has_tabular_data,
            has_part_numbers,
            text_length: lower.chars().count(),
        }
    }

    /// Recommend an extraction method from native text length alone.
    pub fn recommend(&self, page_number: usize, text: &str) -> StrategyDecision {
        let len = text.trim().chars().count();
        let (method, confidence, reason) = if len > TEXT_METHOD_MIN_CHARS {
            (
                ExtractionMethod::Text,
                Confidence::High,
                format!("Substantial text content ({len} chars)"),
            )
        } else if len > HYBRID_METHOD_MIN_CHARS {
            (
                ExtractionMethod::Hybrid,
                Confidence::Medium,
                format!("Some text content ({len} chars), may benefit from vision"),
            )
        } else {
            (
                ExtractionMethod::Vision,
                Confidence::High,
                format!("Minimal text content ({len} chars), likely image-based"),
            )
        };
        StrategyDecision {
            page_number,
            method,
            confidence,
            reason,
        }
    }

    /// Lightweight check used to decide lazy rendering in
    /// memory-conservative mode: a part-number prefix anywhere, or a long
    /// page mentioning a candidate keyword.
    pub fn is_extraction_candidate(&self, text: &str) -> bool {
        let lower = text.to_lowercase();
        self.has_part_number(&lower)
            || (lower.chars().count() > CANDIDATE_MIN_CHARS
                && self
                    .rules
                    .candidate_keywords
                    .iter()
                    .any(|k| lower.contains(k.as_str())))
    }

    fn has_part_number(&self, lower: &str) -> bool {
        self.rules
            .part_number_prefixes
            .iter()
            .any(|p| lower.contains(p.as_str()))
    }

    /// Count per-line table signals: a dot leader, three or more numeric
    /// tokens, and a part-number prefix each add one.
    fn has_tabular_structure(&self, lower: &str) -> bool {
        let mut signals = 0;
        for line in lower.lines().map(str::trim).filter(|l| !l.is_empty()) {
            if line.contains("...") {
                signals += 1;
            }
            if line.split_whitespace().filter(|w| is_numeric_token(w)).count() >= 3 {
                signals += 1;
            }
            if self.has_part_number(line) {
                signals += 1;
            }
        }
        signals >= TABULAR_SIGNAL_THRESHOLD
    }
}

fn count_hits(lower: &str, keywords: &[String]) -> usize {
    keywords
        .iter()
        .filter(|k| lower.contains(k.as_str()))
        .count()
}

/// Digits with optional hyphens, e.g. `1998`, `86-1234`.
fn is_numeric_token(word: &str) -> bool {
    let mut digits = word.chars().filter(|&c| c != '-').peekable();
    digits.peek().is_some() && digits.all(|c| c.is_ascii_digit())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn listing_page() -> String {
        let mut s = String::from("Toyota Camry fitment chart\nModel Years Part Position\n");
        for i in 0..8 {
            s.push_str(&format!(
                "Camry 1992 1996 86-{:04} front left inner ........ 12\n",
                1000 + i
            ));
        }
        s
    }

    #[test]
    fn tabular_with_part_numbers_is_high_confidence_product() {
        let v = PageClassifier::default().classify(&listing_page());
        assert!(v.has_tabular_data);
        assert!(v.has_part_numbers);
        assert!(v.is_product_page);
        assert_eq!(v.confidence, Confidence::High);
    }

    #[test]
    fn keyword_majority_is_medium_confidence_product() {
        let text = "Honda Civic model years, front and rear fitment.";
        let v = PageClassifier::default().classify(text);
        assert!(!v.has_part_numbers);
        assert!(v.product_score >= 3);
        assert!(v.is_product_page);
        assert_eq!(v.confidence, Confidence::Medium);
    }

    #[test]
    fn intro_majority_is_high_confidence_non_product_regardless_of_length() {
        let mut text = String::from("Table of Contents\nIntroduction\nWarning\nCopyright 2020\n");
        text.push_str(&"lorem ipsum dolor sit amet ".repeat(100));
        let v = PageClassifier::default().classify(&text);
        assert!(v.intro_score > v.product_score);
        assert!(!v.is_product_page);
        assert_eq!(v.confidence, Confidence::High);
    }

    #[test]
    fn undecided_pages_fall_back_to_length() {
        let c = PageClassifier::default();
        let short = c.classify("hello world");
        assert!(!short.is_product_page);
        assert_eq!(short.confidence, Confidence::Low);

        let long = c.classify(&"lorem ipsum ".repeat(60));
        assert!(long.is_product_page);
        assert_eq!(long.confidence, Confidence::Low);
    }

    #[test]
    fn part_numbers_need_more_than_two_lines() {
        let c = PageClassifier::default();
        assert!(!c.classify("86-1000\n87-2000\n").has_part_numbers);
        assert!(c.classify("86-1000\n87-2000\n86-3000\n").has_part_numbers);
    }

    #[test]
    fn numeric_tokens() {
        assert!(is_numeric_token("1998"));
        assert!(is_numeric_token("86-1234"));
        assert!(!is_numeric_token("-"));
        assert!(!is_numeric_token(""));
        assert!(!is_numeric_token("12a"));
    }

    #[test]
    fn dot_leaders_count_as_table_signals() {
        let text = "Brakes ..... 4\nFilters ..... 9\nLamps ..... 12\nMirrors ..... 20\nSeals ..... 31\n";
        assert!(PageClassifier::default().classify(text).has_tabular_data);
    }

    #[test]
    fn method_thresholds() {
        let c = PageClassifier::default();
        assert_eq!(c.recommend(1, &"a".repeat(101)).method, ExtractionMethod::Text);
        assert_eq!(c.recommend(1, &"a".repeat(100)).method, ExtractionMethod::Hybrid);
        assert_eq!(c.recommend(1, &"a".repeat(21)).method, ExtractionMethod::Hybrid);
        assert_eq!(c.recommend(1, &"a".repeat(20)).method, ExtractionMethod::Vision);
        assert_eq!(c.recommend(1, "").confidence, Confidence::High);
        assert_eq!(c.recommend(1, &"a".repeat(50)).confidence, Confidence::Medium);
    }

    #[test]
    fn method_ignores_surrounding_whitespace() {
        let text = format!("   {}   \n\n", "a".repeat(20));
        let d = PageClassifier::default().recommend(4, &text);
        assert_eq!(d.method, ExtractionMethod::Vision);
        assert_eq!(d.page_number, 4);
    }

    #[test]
    fn classification_is_idempotent() {
        let c = PageClassifier::default();
        let text = listing_page();
        assert_eq!(c.analyze(1, &text), c.analyze(1, &text));
    }

    #[test]
    fn candidate_heuristic() {
        let c = PageClassifier::default();
        assert!(c.is_extraction_candidate("see 87-1000"));
        assert!(!c.is_extraction_candidate("model"));
        assert!(c.is_extraction_candidate(&format!("model {}", "x".repeat(120))));
        assert!(!c.is_extraction_candidate(&"x".repeat(200)));
    }

    #[test]
    fn custom_rules() {
        let rules = ClassifierRules {
            part_number_prefixes: vec!["zx-".into()],
            ..ClassifierRules::default()
        };
        let c = PageClassifier::new(rules);
        assert!(c.classify("ZX-1\nzx-2\nzx-3\n").has_part_numbers);
        assert!(!c.classify("86-1\n86-2\n86-3\n").has_part_numbers);
    }

    #[test]
    fn custom_rules_match_regardless_of_case() {
        let rules = ClassifierRules {
            product_keywords: vec!["Toyota".into(), "Camry".into(), "Fitment".into()],
            part_number_prefixes: vec!["ZX-".into()],
            candidate_keywords: vec!["Hull".into()],
            ..ClassifierRules::default()
        };
        let c = PageClassifier::new(rules);

        let v = c.classify("ZX-1 Toyota\nZX-2 Camry\nZX-3 Fitment\n");
        assert!(v.has_part_numbers);
        assert_eq!(v.product_score, 3);
        assert!(v.is_product_page);
        assert!(c.is_extraction_candidate(&format!("HULL {}", "x".repeat(120))));
        assert_eq!(c.rules().part_number_prefixes, vec!["zx-".to_string()]);
    }
}
