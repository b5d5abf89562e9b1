//! Result aggregation: ordered items plus run counters.
//!
//! The aggregator is the only mutable state of a run. Pages are appended in
//! the order the orchestrator visits them; items are neither deduplicated
//! nor validated. [`ResultAggregator::finalize`] consumes it, so a
//! [`RunResult`] cannot change once built.

use crate::classify::PageAnalysis;
use crate::config::ExtractionMode;
use crate::error::PageError;
use crate::output::{DocumentMetadata, ExtractedItem, ExtractionStep, PageOutcome, RunResult, RunStats};
use std::time::Duration;
use tracing::debug;

#[derive(Debug, Default)]
pub struct ResultAggregator {
    items: Vec<ExtractedItem>,
    analysis: Vec<PageAnalysis>,
    stats: RunStats,
}

impl ResultAggregator {
    pub fn new(mode: ExtractionMode) -> Self {
        Self {
            stats: RunStats {
                mode: Some(mode),
                ..Default::default()
            },
            ..Default::default()
        }
    }

    /// Record a classifier decision for one page.
    pub fn record_analysis(&mut self, analysis: PageAnalysis) {
        self.stats.analyzed_pages += 1;
        if analysis.product.is_product_page {
            self.stats.product_pages += 1;
        }
        self.analysis.push(analysis);
    }

    /// Count a failure on a page that is not processed further.
    pub fn record_error(&mut self, error: &PageError) {
        debug!("Recorded failure outside the working set: {}", error);
        self.stats.failed_steps += 1;
    }

    /// Append the outcome of one processed page.
    pub fn append(&mut self, outcome: PageOutcome) {
        let stats = &mut self.stats;
        stats.processed_pages += 1;
        stats.llm_calls += outcome.llm_calls;
        stats.failed_steps += outcome.errors.len();
        if outcome.image_rendered {
            stats.images_rendered += 1;
        }
        if !outcome.items.is_empty() {
            stats.pages_with_items += 1;
            stats.items_extracted += outcome.items.len();
        }
        match outcome.step {
            Some(ExtractionStep::Multimodal) => stats.multimodal_hits += 1,
            Some(ExtractionStep::Text) => stats.text_hits += 1,
            Some(ExtractionStep::Vision) => stats.vision_hits += 1,
            None => {}
        }
        self.items.extend(outcome.items);
    }

    pub fn items(&self) -> &[ExtractedItem] {
        &self.items
    }

    pub fn stats(&self) -> &RunStats {
        &self.stats
    }

    /// Package everything into a successful [`RunResult`].
    pub fn finalize(mut self, metadata: DocumentMetadata, elapsed: Duration) -> RunResult {
        self.stats.total_pages = metadata.page_count;
        self.stats.duration_ms = elapsed.as_millis() as u64;
        RunResult {
            success: true,
            error: None,
            pages: metadata.page_count,
            pdf_info: Some(metadata),
            items: self.items,
            analysis: self.analysis,
            stats: self.stats,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::classify::PageClassifier;
    use serde_json::json;

    fn item(part: &str) -> ExtractedItem {
        match json!({ "part_number": part }) {
            serde_json::Value::Object(map) => map,
            _ => unreachable!(),
        }
    }

    #[test]
    fn append_preserves_visit_order() {
        let mut agg = ResultAggregator::new(ExtractionMode::Batch);

        let mut p3 = PageOutcome::new(3);
        p3.items = vec![item("86-3000")];
        p3.step = Some(ExtractionStep::Vision);
        let mut p1 = PageOutcome::new(1);
        p1.items = vec![item("86-1000"), item("86-1001")];
        p1.step = Some(ExtractionStep::Text);

        agg.append(p1);
        agg.append(p3);

        let parts: Vec<_> = agg.items().iter().map(|i| i["part_number"].clone()).collect();
        assert_eq!(parts, vec![json!("86-1000"), json!("86-1001"), json!("86-3000")]);
        assert_eq!(agg.stats().text_hits, 1);
        assert_eq!(agg.stats().vision_hits, 1);
    }

    #[test]
    fn duplicates_are_kept() {
        let mut agg = ResultAggregator::new(ExtractionMode::Streaming);
        for n in 1..=2 {
            let mut p = PageOutcome::new(n);
            p.items = vec![item("86-1000")];
            agg.append(p);
        }
        assert_eq!(agg.items().len(), 2);
    }

    #[test]
    fn counters_and_finalize() {
        let classifier = PageClassifier::default();
        let mut agg = ResultAggregator::new(ExtractionMode::Batch);
        agg.record_analysis(classifier.analyze(1, "Table of Contents\nIndex\nWarning"));
        agg.record_analysis(classifier.analyze(2, "Honda Civic model years, front and rear fitment."));

        let mut p = PageOutcome::new(2);
        p.image_rendered = true;
        p.llm_calls = 2;
        p.errors.push(PageError::LlmFailed {
            detail: "503".into(),
        });
        agg.append(p);

        let meta = DocumentMetadata {
            filename: "catalog.pdf".into(),
            page_count: 7,
            ..Default::default()
        };
        let result = agg.finalize(meta, Duration::from_millis(1500));

        assert!(result.success);
        assert_eq!(result.pages, 7);
        assert_eq!(result.analysis.len(), 2);
        assert_eq!(result.stats.analyzed_pages, 2);
        assert_eq!(result.stats.product_pages, 1);
        assert_eq!(result.stats.processed_pages, 1);
        assert_eq!(result.stats.pages_with_items, 0);
        assert_eq!(result.stats.images_rendered, 1);
        assert_eq!(result.stats.llm_calls, 2);
        assert_eq!(result.stats.failed_steps, 1);
        assert_eq!(result.stats.total_pages, 7);
        assert_eq!(result.stats.duration_ms, 1500);
        assert_eq!(result.stats.mode, Some(ExtractionMode::Batch));
    }

    #[test]
    fn errors_outside_working_set_are_counted() {
        let mut agg = ResultAggregator::new(ExtractionMode::Batch);
        agg.record_error(&PageError::ReadFailed {
            page: 4,
            detail: "bad stream".into(),
        });
        assert_eq!(agg.stats().failed_steps, 1);
        assert_eq!(agg.stats().processed_pages, 0);
    }
}
