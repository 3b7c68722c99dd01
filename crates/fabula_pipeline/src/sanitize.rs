//! Draft sanitization: strips generation artifacts before evaluation.

use fabula_core::StoryDraft;

/// Mojibake repairs for UTF-8 text decoded as Latin-1 somewhere upstream.
const MOJIBAKE: [(&str, &str); 8] = [
    ("\u{00c3}\u{00a4}", "ä"),
    ("\u{00c3}\u{00b6}", "ö"),
    ("\u{00c3}\u{00bc}", "ü"),
    ("\u{00c3}\u{0084}", "Ä"),
    ("\u{00c3}\u{0096}", "Ö"),
    ("\u{00c3}\u{009c}", "Ü"),
    ("\u{00c3}\u{009f}", "ß"),
    ("\u{00e2}\u{20ac}\u{201c}", "–"),
];

/// Line prefixes that mark leaked meta-instructions rather than prose.
const META_PREFIXES: [&str; 6] = [
    "system:",
    "assistant:",
    "user:",
    "note:",
    "hinweis:",
    "instruction:",
];

/// Sanitize a freshly parsed draft: remove control characters, repair
/// common mojibake, and drop leaked meta-instruction lines.
///
/// Applied once between parsing and evaluation; the quality gates then see
/// only prose.
pub fn sanitize_draft(mut draft: StoryDraft) -> StoryDraft {
    draft.title = sanitize_text(&draft.title);
    draft.description = sanitize_text(&draft.description);
    for chapter in &mut draft.chapters {
        chapter.text = sanitize_text(&chapter.text);
    }
    draft
}

fn sanitize_text(text: &str) -> String {
    let mut cleaned: String = text
        .chars()
        .filter(|c| !c.is_control() || *c == '\n' || *c == '\t')
        .collect();

    for (broken, fixed) in MOJIBAKE {
        if cleaned.contains(broken) {
            cleaned = cleaned.replace(broken, fixed);
        }
    }

    cleaned
        .lines()
        .filter(|line| {
            let lower = line.trim().to_lowercase();
            !META_PREFIXES.iter().any(|p| lower.starts_with(p))
        })
        .collect::<Vec<_>>()
        .join("\n")
        .trim()
        .to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use fabula_core::Chapter;

    fn draft_with(text: &str) -> StoryDraft {
        StoryDraft {
            title: "T".to_string(),
            description: "D".to_string(),
            chapters: vec![Chapter {
                chapter: 1,
                text: text.to_string(),
            }],
        }
    }

    #[test]
    fn test_strips_control_characters() {
        let draft = sanitize_draft(draft_with("Lena\u{0000} lief\u{0007} los.\nNeue Zeile."));
        assert_eq!(draft.chapters[0].text, "Lena lief los.\nNeue Zeile.");
    }

    #[test]
    fn test_repairs_mojibake() {
        let draft = sanitize_draft(draft_with("Der B\u{00c3}\u{00a4}r brummte."));
        assert_eq!(draft.chapters[0].text, "Der Bär brummte.");
    }

    #[test]
    fn test_drops_meta_instruction_lines() {
        let draft = sanitize_draft(draft_with(
            "Assistant: here is chapter one\nLena lief in den Wald.\nNote: word count ok",
        ));
        assert_eq!(draft.chapters[0].text, "Lena lief in den Wald.");
    }
}
