use kismet_llm::{Citation, ResponseFragment};
use kismet_store::{GroundingSource, MessagePatch};

/// Folds a delivery-ordered fragment sequence into monotonic updates for one
/// in-flight assistant message.
///
/// Text parts concatenate onto a running accumulator; citations append to a
/// running source list exactly as delivered, repeats included. Each applied
/// fragment yields a patch that replaces the target message's text and
/// source list wholesale, with the source list staying absent until the
/// first citation arrives so "no sources" and "not applicable" stay
/// distinguishable.
///
/// The reconciler holds no reference to the target message; the caller owns
/// routing each patch to the store, and must not reuse a reconciler across
/// turns.
#[derive(Debug, Default)]
pub struct StreamReconciler {
    text: String,
    sources: Vec<GroundingSource>,
}

impl StreamReconciler {
    pub fn new() -> Self {
        Self::default()
    }

    /// Applies one fragment and returns the replacement patch.
    pub fn apply(&mut self, fragment: &ResponseFragment) -> MessagePatch {
        for citation in &fragment.citations {
            self.sources.push(to_grounding_source(citation));
        }
        for part in &fragment.text_parts {
            self.text.push_str(part);
        }

        MessagePatch {
            text: Some(self.text.clone()),
            sources: (!self.sources.is_empty()).then(|| self.sources.clone()),
        }
    }

    pub fn text(&self) -> &str {
        &self.text
    }

    pub fn source_count(&self) -> usize {
        self.sources.len()
    }
}

fn to_grounding_source(citation: &Citation) -> GroundingSource {
    GroundingSource {
        title: citation.title.clone(),
        uri: citation.uri.clone(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn text_fragment(parts: &[&str]) -> ResponseFragment {
        ResponseFragment {
            text_parts: parts.iter().map(|part| part.to_string()).collect(),
            citations: Vec::new(),
        }
    }

    fn citation(uri: &str) -> Citation {
        Citation {
            title: None,
            uri: uri.to_string(),
        }
    }

    #[test]
    fn final_text_is_concatenation_in_delivery_order() {
        let mut reconciler = StreamReconciler::new();
        let mut last = MessagePatch::default();
        for fragment in [
            text_fragment(&["Use ", "the "]),
            text_fragment(&[]),
            text_fragment(&["Replicated ", "specifier."]),
        ] {
            last = reconciler.apply(&fragment);
        }

        assert_eq!(
            last.text.as_deref(),
            Some("Use the Replicated specifier.")
        );
        assert_eq!(reconciler.text(), "Use the Replicated specifier.");
    }

    #[test]
    fn sources_stay_absent_until_the_first_citation() {
        let mut reconciler = StreamReconciler::new();

        let patch = reconciler.apply(&text_fragment(&["hello"]));
        assert_eq!(patch.sources, None);

        let patch = reconciler.apply(&ResponseFragment {
            text_parts: vec![" world".to_string()],
            citations: vec![citation("https://docs.unrealengine.com")],
        });
        assert_eq!(patch.sources.as_ref().map(Vec::len), Some(1));

        // Once present, later citation-free fragments keep the snapshot.
        let patch = reconciler.apply(&text_fragment(&["!"]));
        assert_eq!(patch.sources.as_ref().map(Vec::len), Some(1));
    }

    #[test]
    fn repeated_sources_are_kept_as_delivered() {
        let mut reconciler = StreamReconciler::new();
        let fragment = ResponseFragment {
            text_parts: Vec::new(),
            citations: vec![
                citation("https://docs.unrealengine.com/actors"),
                citation("https://docs.unrealengine.com/actors"),
            ],
        };

        reconciler.apply(&fragment);
        let patch = reconciler.apply(&fragment);

        assert_eq!(reconciler.source_count(), 4);
        assert_eq!(patch.sources.as_ref().map(Vec::len), Some(4));
    }

    #[test]
    fn citation_count_matches_total_across_fragments() {
        let mut reconciler = StreamReconciler::new();
        let fragments = [
            ResponseFragment {
                text_parts: vec!["a".to_string()],
                citations: vec![citation("https://one")],
            },
            ResponseFragment {
                text_parts: Vec::new(),
                citations: vec![citation("https://two"), citation("https://three")],
            },
        ];

        let mut last = MessagePatch::default();
        for fragment in &fragments {
            last = reconciler.apply(fragment);
        }

        let sources = last.sources.unwrap();
        assert_eq!(sources.len(), 3);
        assert_eq!(sources[2].uri, "https://three");
    }
}
