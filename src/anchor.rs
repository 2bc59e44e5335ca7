use log::debug;
use regex::{Regex, RegexBuilder};

use crate::docx::Docx;
use crate::error::Error;
use crate::model::{AnchorResolution, PictureSlotSpec};

fn literal_pattern(text: &str) -> Result<Regex, Error> {
    RegexBuilder::new(&regex::escape(text))
        .case_insensitive(true)
        .build()
        .map_err(|e| Error::Config(format!("bad anchor text {text:?}: {e}")))
}

/// Index of the paragraph a picture goes into: the one after the first match,
/// or the match itself when it is the last paragraph.
fn anchor_index<S: AsRef<str>>(texts: &[S], pattern: &Regex) -> Option<usize> {
    let matched = texts.iter().position(|t| pattern.is_match(t.as_ref()))?;
    if matched + 1 < texts.len() { Some(matched + 1) } else { Some(matched) }
}

pub fn locate(doc: &Docx, slot: &PictureSlotSpec) -> Result<AnchorResolution, Error> {
    let Some(anchor_text) = slot.anchor_text.as_deref() else {
        return Ok(AnchorResolution::Absolute);
    };
    let pattern = literal_pattern(anchor_text)?;
    let paragraphs = doc.paragraphs();
    let texts: Vec<String> = paragraphs.iter().map(|&p| doc.paragraph_text(p)).collect();

    let index = anchor_index(&texts, &pattern)
        .ok_or_else(|| Error::AnchorNotFound(anchor_text.to_string()))?;
    debug!("Slot {:?} anchored to paragraph {index} ({:?})", slot.stem, texts[index]);
    Ok(AnchorResolution::ParagraphAnchor(paragraphs[index]))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn texts() -> Vec<&'static str> {
        vec!["NOM: ", "SECTION A", "Body of A", "Section (B)?", "tail"]
    }

    #[test]
    fn picks_paragraph_after_heading() {
        let pattern = literal_pattern("section a").unwrap();
        assert_eq!(anchor_index(&texts(), &pattern), Some(2));
    }

    #[test]
    fn last_paragraph_anchors_to_itself() {
        let pattern = literal_pattern("TAIL").unwrap();
        assert_eq!(anchor_index(&texts(), &pattern), Some(4));
    }

    #[test]
    fn punctuation_is_matched_literally() {
        let pattern = literal_pattern("(B)?").unwrap();
        assert_eq!(anchor_index(&texts(), &pattern), Some(4));
        let pattern = literal_pattern("B.dy").unwrap();
        assert_eq!(anchor_index(&texts(), &pattern), None);
    }

    #[test]
    fn only_first_match_counts() {
        let pattern = literal_pattern("section").unwrap();
        assert_eq!(anchor_index(&texts(), &pattern), Some(2));
    }
}
