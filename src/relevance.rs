//! Context relevance pipeline: normalizes the backend's retrieved passages,
//! extracts the question-relevant excerpt of each one, computes highlight
//! spans, and groups everything for progressive disclosure. Pure functions,
//! no I/O.

use regex::RegexBuilder;
use serde::Serialize;

use crate::conversations::repo::ContextItem;
use crate::rag::AskResponse;

/// Articles, conjunctions, question words and auxiliaries, French and
/// English; the question language depends on the user.
const STOP_WORDS: &[&str] = &[
    // French
    "le", "la", "les", "un", "une", "des", "de", "du", "au", "aux", "ce", "cet", "cette", "ces",
    "et", "ou", "mais", "donc", "or", "ni", "car", "que", "qui", "quoi", "dont", "quel", "quelle",
    "quels", "quelles", "quand", "comment", "pourquoi", "combien", "est", "sont", "suis", "etre",
    "avoir", "ont", "avez", "dans", "par", "pour", "sur", "avec", "sans", "sous", "entre", "vers",
    "chez", "son", "ses", "mon", "mes", "ton", "tes", "nos", "vos", "leur", "leurs", "pas",
    // English
    "the", "and", "but", "for", "nor", "yet", "what", "which", "who", "whom", "whose", "when",
    "where", "why", "how", "are", "was", "were", "been", "does", "did", "can", "could", "will",
    "would", "should", "this", "that", "these", "those", "with", "from", "into", "about", "not",
];

/// Keywords for sentence scoring keep tokens of length ≥ 3.
const SEGMENT_MIN_CHARS: usize = 3;
/// Keywords for highlighting keep tokens of length > 3.
const HIGHLIGHT_MIN_CHARS: usize = 4;

const MAX_SEGMENT_SENTENCES: usize = 3;
const FALLBACK_SENTENCES: usize = 2;
const BLOB_SEGMENT_CHARS: usize = 200;
const BLOB_SCORE: i32 = 100;

/// One run of output text; `highlight` marks a keyword match. Concatenating
/// the spans of a list reproduces the input text exactly.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TextSpan {
    pub text: String,
    pub highlight: bool,
}

/// Badge tier, purely presentational.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum RelevanceTier {
    High,
    Relevant,
    Moderate,
    Low,
}

impl RelevanceTier {
    pub fn from_score(score: i32) -> Self {
        match score {
            s if s >= 80 => RelevanceTier::High,
            s if s >= 60 => RelevanceTier::Relevant,
            s if s >= 40 => RelevanceTier::Moderate,
            _ => RelevanceTier::Low,
        }
    }
}

/// One excerpt ready to render. `index` is its rank (0 = primary) and, with
/// the view's `message_id`, the key under which the client holds this
/// excerpt's expand/collapse state.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ExcerptView {
    pub index: usize,
    pub score: i32,
    pub tier: RelevanceTier,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub source: Option<String>,
    /// Segment view: the relevant excerpt, default display state.
    pub segment: String,
    pub segment_spans: Vec<TextSpan>,
    /// Full view: the entire passage, shown when the excerpt is expanded.
    pub content: String,
    pub content_spans: Vec<TextSpan>,
}

/// Ranked context for one assistant message: the primary excerpt expanded by
/// default, the rest behind a "show N more excerpts" toggle.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ContextView {
    pub message_id: String,
    pub primary: ExcerptView,
    pub more: Vec<ExcerptView>,
    pub hidden_count: usize,
}

fn tokenize(text: &str) -> impl Iterator<Item = String> + '_ {
    text.split(|c: char| !c.is_alphanumeric())
        .filter(|t| !t.is_empty())
        .map(|t| t.to_lowercase())
}

fn question_keywords(question: &str, min_chars: usize) -> Vec<String> {
    let mut keywords = Vec::new();
    for token in tokenize(question) {
        if token.chars().count() < min_chars {
            continue;
        }
        if STOP_WORDS.contains(&token.as_str()) {
            continue;
        }
        if !keywords.contains(&token) {
            keywords.push(token);
        }
    }
    keywords
}

/// Sentence boundary: `.`, `!` or `?` followed by whitespace. A period inside
/// "3.14" or a trailing abbreviation dot therefore does not split.
fn split_sentences(content: &str) -> Vec<String> {
    let mut sentences = Vec::new();
    let mut current = String::new();
    let mut chars = content.chars().peekable();

    while let Some(c) = chars.next() {
        current.push(c);
        if matches!(c, '.' | '!' | '?') {
            if matches!(chars.peek(), Some(next) if next.is_whitespace()) {
                while matches!(chars.peek(), Some(next) if next.is_whitespace()) {
                    chars.next();
                }
                let sentence = current.trim().to_string();
                if !sentence.is_empty() {
                    sentences.push(sentence);
                }
                current.clear();
            }
        }
    }
    let tail = current.trim().to_string();
    if !tail.is_empty() {
        sentences.push(tail);
    }
    sentences
}

/// Excerpt of `content` most relevant to `question`: the top 3 sentences by
/// keyword-hit count (score > 0), concatenated in descending-score order.
/// The selection is NOT re-sorted back to its original order. Falls back to
/// the first two sentences when no sentence matches.
pub fn extract_relevant_segment(content: &str, question: &str) -> String {
    let sentences = split_sentences(content);
    if sentences.is_empty() {
        return String::new();
    }

    let keywords = question_keywords(question, SEGMENT_MIN_CHARS);

    let mut scored: Vec<(usize, &String)> = sentences
        .iter()
        .map(|sentence| {
            let lower = sentence.to_lowercase();
            let hits = keywords.iter().filter(|k| lower.contains(k.as_str())).count();
            (hits, sentence)
        })
        .filter(|(hits, _)| *hits > 0)
        .collect();

    if scored.is_empty() {
        return sentences
            .iter()
            .take(FALLBACK_SENTENCES)
            .cloned()
            .collect::<Vec<_>>()
            .join(" ");
    }

    // Stable sort: equal scores keep their original relative order.
    scored.sort_by_key(|(hits, _)| std::cmp::Reverse(*hits));
    scored
        .into_iter()
        .take(MAX_SEGMENT_SENTENCES)
        .map(|(_, sentence)| sentence.clone())
        .collect::<Vec<_>>()
        .join(" ")
}

/// Splits `text` into spans, marking every case-insensitive occurrence of a
/// question keyword (stop-words removed, length > 3). No-op when no keyword
/// remains.
pub fn highlight_keywords(text: &str, question: &str) -> Vec<TextSpan> {
    let plain = vec![TextSpan {
        text: text.to_string(),
        highlight: false,
    }];

    let keywords = question_keywords(question, HIGHLIGHT_MIN_CHARS);
    if keywords.is_empty() || text.is_empty() {
        return plain;
    }

    let pattern = keywords
        .iter()
        .map(|k| regex::escape(k))
        .collect::<Vec<_>>()
        .join("|");
    let Ok(re) = RegexBuilder::new(&pattern).case_insensitive(true).build() else {
        return plain;
    };

    let mut spans = Vec::new();
    let mut last = 0;
    for m in re.find_iter(text) {
        if m.start() > last {
            spans.push(TextSpan {
                text: text[last..m.start()].to_string(),
                highlight: false,
            });
        }
        spans.push(TextSpan {
            text: m.as_str().to_string(),
            highlight: true,
        });
        last = m.end();
    }
    if spans.is_empty() {
        return plain;
    }
    if last < text.len() {
        spans.push(TextSpan {
            text: text[last..].to_string(),
            highlight: false,
        });
    }
    spans
}

/// Normalizes whatever context shape the backend produced into ranked
/// `ContextItem`s. A single opaque blob becomes one synthetic item
/// (score 100, segment = first 200 chars) so the rendering pipeline stays
/// uniform regardless of backend response shape.
pub fn normalize_context(response: &AskResponse) -> Vec<ContextItem> {
    if !response.context.is_empty() {
        let mut items: Vec<ContextItem> = response
            .context
            .iter()
            .map(|c| ContextItem {
                content: c.content.clone(),
                score: c.score.clamp(0, 100),
                relevant_segment: None,
                source: c.source.clone(),
            })
            .collect();
        items.sort_by_key(|item| std::cmp::Reverse(item.score));
        return items;
    }

    if let Some(blob) = response.context_used.as_deref() {
        if !blob.trim().is_empty() {
            let segment: String = blob.chars().take(BLOB_SEGMENT_CHARS).collect();
            return vec![ContextItem {
                content: blob.to_string(),
                score: BLOB_SCORE,
                relevant_segment: Some(segment),
                source: None,
            }];
        }
    }

    Vec::new()
}

/// Fills in each item's cached `relevant_segment` against the question that
/// produced the reply. Already-cached segments (e.g. the blob case) are kept.
pub fn attach_segments(items: &mut [ContextItem], question: &str) {
    for item in items.iter_mut() {
        if item.relevant_segment.is_none() {
            item.relevant_segment = Some(extract_relevant_segment(&item.content, question));
        }
    }
}

/// Builds the progressive-disclosure view: excerpts ranked descending by
/// score, index 0 expanded by default, the rest behind the toggle.
pub fn render_context(message_id: &str, items: &[ContextItem], question: &str) -> Option<ContextView> {
    if items.is_empty() {
        return None;
    }

    let mut ranked: Vec<&ContextItem> = items.iter().collect();
    ranked.sort_by_key(|item| std::cmp::Reverse(item.score));

    let mut excerpts = ranked.into_iter().enumerate().map(|(index, item)| {
        let segment = item
            .relevant_segment
            .clone()
            .unwrap_or_else(|| extract_relevant_segment(&item.content, question));
        ExcerptView {
            index,
            score: item.score,
            tier: RelevanceTier::from_score(item.score),
            source: item.source.clone(),
            segment_spans: highlight_keywords(&segment, question),
            segment,
            content_spans: highlight_keywords(&item.content, question),
            content: item.content.clone(),
        }
    });

    let primary = excerpts.next()?;
    let more: Vec<ExcerptView> = excerpts.collect();
    let hidden_count = more.len();

    Some(ContextView {
        message_id: message_id.to_string(),
        primary,
        more,
        hidden_count,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::rag::ScoredContext;

    #[test]
    fn splits_on_punctuation_followed_by_whitespace() {
        let sentences = split_sentences("Première phrase. Deuxième phrase! Troisième? Fin");
        assert_eq!(
            sentences,
            vec!["Première phrase.", "Deuxième phrase!", "Troisième?", "Fin"]
        );
    }

    #[test]
    fn decimal_point_is_not_a_boundary() {
        let sentences = split_sentences("Le taux est de 3.14 pour cent. Il augmente.");
        assert_eq!(sentences.len(), 2);
        assert_eq!(sentences[0], "Le taux est de 3.14 pour cent.");
    }

    #[test]
    fn keywords_drop_stop_words_and_short_tokens() {
        let kws = question_keywords("Quelle est la météo à Paris et en mer ?", SEGMENT_MIN_CHARS);
        assert_eq!(kws, vec!["météo", "paris", "mer"]);

        let kws = question_keywords("Quelle est la météo à Paris et en mer ?", HIGHLIGHT_MIN_CHARS);
        assert_eq!(kws, vec!["météo", "paris"]);
    }

    #[test]
    fn segment_falls_back_to_first_two_sentences() {
        let content = "Alpha une. Beta deux. Gamma trois.";
        let segment = extract_relevant_segment(content, "question sans rapport aucun");
        assert_eq!(segment, "Alpha une. Beta deux.");
    }

    #[test]
    fn segment_selects_top_sentences_in_descending_score_order() {
        // Sentence scores: first 1 hit, second 0, third 2 hits, fourth 0.
        let content = "Le climat change vite. Rien ici. Le climat de Paris est doux. Autre chose.";
        let segment = extract_relevant_segment(content, "Comment évolue le climat à Paris ?");
        // Two hits first, then one hit: selection order is by score, not
        // re-sorted to document order.
        assert_eq!(segment, "Le climat de Paris est doux. Le climat change vite.");
    }

    #[test]
    fn segment_keeps_at_most_three_sentences() {
        let content = "Paris un. Paris deux. Paris trois. Paris quatre.";
        let segment = extract_relevant_segment(content, "Parlez-moi de Paris");
        assert_eq!(segment.matches("Paris").count(), 3);
    }

    #[test]
    fn segment_of_boundaryless_content_is_the_content() {
        let content = "un seul bloc sans ponctuation finale";
        assert_eq!(
            extract_relevant_segment(content, "rien de commun"),
            content
        );
    }

    #[test]
    fn highlight_without_keywords_returns_text_unchanged() {
        let spans = highlight_keywords("Un texte quelconque.", "");
        assert_eq!(
            spans,
            vec![TextSpan {
                text: "Un texte quelconque.".into(),
                highlight: false
            }]
        );
        // Stop-words-only questions behave the same.
        let spans = highlight_keywords("Un texte quelconque.", "est que la");
        assert_eq!(spans.len(), 1);
        assert!(!spans[0].highlight);
    }

    #[test]
    fn highlight_marks_case_insensitive_matches() {
        let spans = highlight_keywords("La Météo de demain, puis la météo de Paris.", "météo Paris");
        let marked: Vec<&str> = spans
            .iter()
            .filter(|s| s.highlight)
            .map(|s| s.text.as_str())
            .collect();
        assert_eq!(marked, vec!["Météo", "météo", "Paris"]);

        // Concatenation reproduces the input exactly.
        let rebuilt: String = spans.iter().map(|s| s.text.as_str()).collect();
        assert_eq!(rebuilt, "La Météo de demain, puis la météo de Paris.");
    }

    #[test]
    fn tier_boundaries() {
        assert_eq!(RelevanceTier::from_score(95), RelevanceTier::High);
        assert_eq!(RelevanceTier::from_score(80), RelevanceTier::High);
        assert_eq!(RelevanceTier::from_score(79), RelevanceTier::Relevant);
        assert_eq!(RelevanceTier::from_score(60), RelevanceTier::Relevant);
        assert_eq!(RelevanceTier::from_score(59), RelevanceTier::Moderate);
        assert_eq!(RelevanceTier::from_score(40), RelevanceTier::Moderate);
        assert_eq!(RelevanceTier::from_score(39), RelevanceTier::Low);
        assert_eq!(RelevanceTier::from_score(0), RelevanceTier::Low);
    }

    fn scored(content: &str, score: i32) -> ScoredContext {
        ScoredContext {
            content: content.into(),
            score,
            source: None,
        }
    }

    #[test]
    fn normalize_sorts_scored_context_descending() {
        let response = AskResponse {
            response: Some("ok".into()),
            context: vec![scored("b", 50), scored("a", 95), scored("c", 10)],
            context_used: None,
        };
        let items = normalize_context(&response);
        let scores: Vec<i32> = items.iter().map(|i| i.score).collect();
        assert_eq!(scores, vec![95, 50, 10]);
    }

    #[test]
    fn normalize_synthesizes_item_from_opaque_blob() {
        let blob = "x".repeat(500);
        let response = AskResponse {
            response: Some("ok".into()),
            context: vec![],
            context_used: Some(blob.clone()),
        };
        let items = normalize_context(&response);
        assert_eq!(items.len(), 1);
        assert_eq!(items[0].score, 100);
        assert_eq!(items[0].content, blob);
        assert_eq!(
            items[0].relevant_segment.as_deref().map(|s| s.chars().count()),
            Some(200)
        );
    }

    #[test]
    fn normalize_empty_response_yields_no_items() {
        assert!(normalize_context(&AskResponse::default()).is_empty());
    }

    #[test]
    fn attach_segments_caches_without_overwriting() {
        let mut items = vec![
            ContextItem {
                content: "Paris est belle. Rien d'autre.".into(),
                score: 90,
                relevant_segment: None,
                source: None,
            },
            ContextItem {
                content: "peu importe".into(),
                score: 80,
                relevant_segment: Some("déjà calculé".into()),
                source: None,
            },
        ];
        attach_segments(&mut items, "Parlez-moi de Paris");
        assert_eq!(items[0].relevant_segment.as_deref(), Some("Paris est belle."));
        assert_eq!(items[1].relevant_segment.as_deref(), Some("déjà calculé"));
    }

    #[test]
    fn render_ranks_primary_and_hides_the_rest() {
        let items = vec![
            ContextItem {
                content: "moyen".into(),
                score: 50,
                relevant_segment: Some("moyen".into()),
                source: None,
            },
            ContextItem {
                content: "meilleur".into(),
                score: 95,
                relevant_segment: Some("meilleur".into()),
                source: Some("doc.pdf".into()),
            },
            ContextItem {
                content: "faible".into(),
                score: 10,
                relevant_segment: Some("faible".into()),
                source: None,
            },
        ];
        let view = render_context("msg-1", &items, "question").expect("some context");
        assert_eq!(view.message_id, "msg-1");
        assert_eq!(view.primary.score, 95);
        assert_eq!(view.primary.index, 0);
        assert_eq!(view.primary.tier, RelevanceTier::High);
        assert_eq!(view.primary.source.as_deref(), Some("doc.pdf"));
        assert_eq!(view.hidden_count, 2);
        assert_eq!(view.more[0].score, 50);
        assert_eq!(view.more[1].score, 10);
        assert_eq!(view.more[1].index, 2);
    }

    #[test]
    fn render_of_empty_context_is_none() {
        assert!(render_context("msg-1", &[], "q").is_none());
    }
}
