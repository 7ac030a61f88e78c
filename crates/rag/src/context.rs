//! Instruction context assembly
//!
//! Snippets are ranked by similarity, individually length-capped, and the
//! assembled string is bounded by a hard character budget. If the first
//! pass lands above the reduction trigger, a second, more aggressive pass
//! runs with fewer and shorter snippets. Truncation is idempotent.

use std::cmp::Ordering;

use opsvoice_core::InstructionMatch;

/// First-pass snippet count cap
pub const MAX_INSTRUCTIONS: usize = 30;
/// First-pass per-snippet character cap
pub const MAX_CONTENT_LENGTH: usize = 80_000;
/// Hard budget for the assembled context string
pub const MAX_TOTAL_CONTEXT: usize = 900_000;

/// Above this, the aggressive second pass kicks in
const REDUCTION_TRIGGER: usize = 800_000;
const REDUCED_INSTRUCTIONS: usize = 20;
const REDUCED_CONTENT_LENGTH: usize = 40_000;

/// Format ranked instruction matches into a bounded context block
pub fn format_instruction_context(matches: &[InstructionMatch]) -> String {
    if matches.is_empty() {
        return String::new();
    }

    let mut ranked: Vec<&InstructionMatch> = matches.iter().collect();
    ranked.sort_by(|a, b| {
        b.similarity
            .partial_cmp(&a.similarity)
            .unwrap_or(Ordering::Equal)
    });

    let assembled = assemble(&ranked, MAX_INSTRUCTIONS, MAX_CONTENT_LENGTH);
    let assembled = if assembled.chars().count() > REDUCTION_TRIGGER {
        assemble(&ranked, REDUCED_INSTRUCTIONS, REDUCED_CONTENT_LENGTH)
    } else {
        assembled
    };

    truncate_chars(assembled, MAX_TOTAL_CONTEXT)
}

fn assemble(ranked: &[&InstructionMatch], max_snippets: usize, max_content: usize) -> String {
    let mut sections = Vec::with_capacity(max_snippets.min(ranked.len()));
    for snippet in ranked.iter().take(max_snippets) {
        let content = truncate_chars(snippet.content.clone(), max_content);
        let mut section = format!("### {}\n{}", snippet.title, content);
        if let Some(url) = &snippet.url {
            section.push_str(&format!("\n(source: {url})"));
        }
        sections.push(section);
    }
    sections.join("\n\n")
}

/// Cap a string at `max` characters, respecting char boundaries
fn truncate_chars(text: String, max: usize) -> String {
    match text.char_indices().nth(max) {
        Some((byte_index, _)) => text[..byte_index].to_string(),
        None => text,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn snippet(title: &str, content: String, similarity: f32) -> InstructionMatch {
        InstructionMatch {
            title: title.to_string(),
            content,
            instruction_type: None,
            role_access: "all".to_string(),
            similarity,
            url: None,
            priority: None,
        }
    }

    #[test]
    fn test_empty_input_is_empty_context() {
        assert_eq!(format_instruction_context(&[]), "");
    }

    #[test]
    fn test_highest_similarity_comes_first() {
        let matches = vec![
            snippet("low", "low body".to_string(), 0.2),
            snippet("high", "high body".to_string(), 0.9),
        ];
        let context = format_instruction_context(&matches);
        let high_pos = context.find("### high").unwrap();
        let low_pos = context.find("### low").unwrap();
        assert!(high_pos < low_pos);
    }

    #[test]
    fn test_context_never_exceeds_hard_budget() {
        // collectively an order of magnitude over budget
        let matches: Vec<InstructionMatch> = (0..40)
            .map(|i| snippet(&format!("s{i}"), "x".repeat(300_000), 0.9))
            .collect();
        let context = format_instruction_context(&matches);
        assert!(context.chars().count() <= MAX_TOTAL_CONTEXT);
    }

    #[test]
    fn test_snippet_count_capped() {
        let matches: Vec<InstructionMatch> = (0..100)
            .map(|i| snippet(&format!("s{i}"), "body".to_string(), 0.9))
            .collect();
        let context = format_instruction_context(&matches);
        assert_eq!(context.matches("### ").count(), MAX_INSTRUCTIONS);
    }

    #[test]
    fn test_truncation_is_idempotent() {
        let text = "y".repeat(2_000_000);
        let once = truncate_chars(text, MAX_TOTAL_CONTEXT);
        let twice = truncate_chars(once.clone(), MAX_TOTAL_CONTEXT);
        assert_eq!(once, twice);
    }

    #[test]
    fn test_truncation_respects_multibyte_boundaries() {
        let text = "héllo wörld".repeat(10);
        let truncated = truncate_chars(text, 7);
        assert_eq!(truncated.chars().count(), 7);
        assert_eq!(truncated, "héllo w");
    }

    #[test]
    fn test_source_url_is_included() {
        let mut matched = snippet("titled", "body".to_string(), 0.9);
        matched.url = Some("https://example.com/doc".to_string());
        let context = format_instruction_context(&[matched]);
        assert!(context.contains("(source: https://example.com/doc)"));
    }
}
