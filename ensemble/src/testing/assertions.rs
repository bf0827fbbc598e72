//! Assertions over accumulated workflow output.

use crate::generation::GenerationRequest;
use crate::state::step_section;

/// Asserts that `context` is exactly the concatenation of one step section per output.
pub fn assert_step_sections(context: &str, outputs: &[&str]) {
    let expected: String = outputs
        .iter()
        .enumerate()
        .map(|(i, output)| step_section(i + 1, output))
        .collect();
    assert_eq!(
        context, expected,
        "Accumulated context does not match the {} expected step sections",
        outputs.len()
    );
}

/// Asserts that every marker appears in `text`, in the given order.
pub fn assert_section_order(text: &str, markers: &[&str]) {
    let mut from = 0;
    for marker in markers {
        match text[from..].find(marker) {
            Some(pos) => from += pos + marker.len(),
            None => panic!("Expected '{marker}' after byte {from} in:\n{text}"),
        }
    }
}

/// Asserts that the request at `index` carries a prompt containing `needle`.
pub fn assert_prompt_contains(requests: &[GenerationRequest], index: usize, needle: &str) {
    let request = requests
        .get(index)
        .unwrap_or_else(|| panic!("No request at index {index}; {} recorded", requests.len()));
    assert!(
        request.prompt.contains(needle),
        "Prompt {index} does not contain '{needle}':\n{}",
        request.prompt
    );
}
