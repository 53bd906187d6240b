use citeweaver_core::TextModel;

/// Ask the model to reformat `block` into one citation per line.
///
/// Never fails: if the model errors or returns nothing, the original block is
/// returned unchanged.
pub async fn normalize_references(block: &str, model: &dyn TextModel) -> String {
    if block.trim().is_empty() {
        return String::new();
    }
    match model.normalize_references(block).await {
        Ok(text) if !text.trim().is_empty() => text,
        Ok(_) => {
            tracing::warn!(model = model.name(), "normalizer returned empty text, using raw block");
            block.to_string()
        }
        Err(e) => {
            tracing::warn!(model = model.name(), error = %e, "normalizer failed, using raw block");
            block.to_string()
        }
    }
}

/// Split on line breaks, trimming each line and dropping blank ones.
pub fn split_citations(text: &str) -> Vec<String> {
    text.lines()
        .map(str::trim)
        .filter(|l| !l.is_empty())
        .map(String::from)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn split_trims_and_drops_blank_lines() {
        let text = "  [1] A. Author. Title one.  \n\n\r\n[2] B. Author. Title two.\r\n   \n";
        assert_eq!(
            split_citations(text),
            vec!["[1] A. Author. Title one.", "[2] B. Author. Title two."]
        );
    }

    #[test]
    fn split_empty() {
        assert!(split_citations("").is_empty());
        assert!(split_citations("\n \n").is_empty());
    }
}
