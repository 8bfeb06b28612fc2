//! Prompts and fixed marker strings.
//!
//! Callers can override the prompt via [`crate::config::ConversionConfig::prompt`];
//! the constant here is used only when no override is provided.

/// Text substituted at an image's position when its description could not be
/// generated.
pub const FALLBACK_DESCRIPTION: &str = "[Image description unavailable]";

/// Default prompt sent with every image.
///
/// Tuned for scientific documents: charts, pathways and dense diagrams are
/// described element by element so a text-only reader loses as little as
/// possible.
pub const DEFAULT_IMAGE_PROMPT: &str = r#"You are describing a figure taken from a scientific document for a reader who cannot see it. Your description replaces the image in a plain-text version of the document.

Describe the image completely and precisely:

1. TYPE AND OVERVIEW
   - State what kind of image it is (bar chart, scatter plot, heatmap, molecular pathway, schematic, photograph, table, equation, ...)
   - Give a one-sentence summary of what it shows

2. TEXT
   - Transcribe every visible label, title, legend entry, axis label, tick value, unit and annotation exactly
   - If text is unreadable, write "text unclear" instead of guessing

3. CHARTS AND GRAPHS
   - Axes, scales and units
   - Every data series and its values or trend
   - Error bars, confidence intervals, regression lines, reported statistics (R², p-values)

4. PATHWAYS AND DIAGRAMS
   - Every node (molecule, protein, gene, component) by its exact name
   - Every connection: direction, activation or inhibition, solid or dashed, and any label on it
   - Feedback loops, groupings and compartments

5. LAYOUT
   - How the elements are arranged (panels, rows, insets) and which panel shows what

6. INTERPRETATION
   - The scientific point the figure makes, clearly separated from what is literally shown

Rules:
- Do not invent data that is not visible
- Use precise technical terminology
- Output only the description, with no preamble"#;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fallback_is_bracketed_marker() {
        assert!(FALLBACK_DESCRIPTION.starts_with('['));
        assert!(FALLBACK_DESCRIPTION.ends_with(']'));
    }

    #[test]
    fn default_prompt_covers_figure_kinds() {
        for needle in ["chart", "pathway", "text unclear"] {
            assert!(
                DEFAULT_IMAGE_PROMPT.contains(needle),
                "prompt should mention {needle}"
            );
        }
    }
}
