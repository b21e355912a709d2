//! Prompt templates for the four analyzer stages.
//!
//! Each stage consumes the previous stage's structured output as prompt
//! context rather than re-analyzing the raw pages. All prompts demand a
//! single JSON object; the parser tolerates surrounding prose.

/// System prompt shared by all analyzer stages.
pub const ANALYZER_SYSTEM: &str = "You are a document analysis engine. You examine scanned \
document images and answer with a single JSON object, no markdown fences, no commentary. \
Confidence values are decimals between 0.0 and 1.0. When you cannot read something, report \
low confidence instead of guessing.";

/// Stage 1 — classify the document type with ranked alternatives.
pub fn type_detection_prompt(document_type_hint: Option<&str>) -> String {
    let hint = match document_type_hint {
        Some(h) => format!(
            "\nThe caller suggests this may be a \"{h}\" document. Verify against the image \
             rather than assuming."
        ),
        None => String::new(),
    };
    format!(
        "Classify this document.{hint}\n\n\
         Respond with JSON:\n\
         {{\n\
           \"document_type\": \"invoice|receipt|id_card|form|letter|...\",\n\
           \"confidence\": 0.0,\n\
           \"alternatives\": [{{\"document_type\": \"...\", \"confidence\": 0.0}}]\n\
         }}\n\
         List up to 3 alternatives in descending confidence."
    )
}

/// Stage 2 — discover every identifiable field.
pub fn field_discovery_prompt(document_type: &str) -> String {
    format!(
        "This is a \"{document_type}\" document. Extract every labeled or implied data field \
         you can identify. Include the verbatim source text each value came from.\n\n\
         Respond with JSON:\n\
         {{\n\
           \"fields\": [\n\
             {{\n\
               \"name\": \"invoice_number\",\n\
               \"value\": \"INV-0001\",\n\
               \"source_text\": \"Invoice #: INV-0001\",\n\
               \"field_type\": \"string|number|date|boolean|array|object\",\n\
               \"confidence\": 0.0,\n\
               \"legibility\": 0.0,\n\
               \"group\": null\n\
             }}\n\
           ]\n\
         }}\n\
         \"legibility\" rates how clearly the source region is printed. \"group\" clusters \
         related fields (\"address\", \"totals\") or is null."
    )
}

/// Stage 3 — refine names and types using document-wide context.
pub fn field_enhancement_prompt(document_type: &str, discovered_fields_json: &str) -> String {
    format!(
        "You previously extracted these fields from a \"{document_type}\" document:\n\
         {discovered_fields_json}\n\n\
         Refine each field: resolve ambiguous labels using the whole document as context, \
         propose a human-readable display name, confirm or correct the type, and rank \
         alternative interpretations.\n\n\
         Respond with JSON:\n\
         {{\n\
           \"fields\": [\n\
             {{\n\
               \"name\": \"invoice_number\",\n\
               \"display_name\": \"Invoice Number\",\n\
               \"field_type\": \"string\",\n\
               \"type_agreement\": 0.0,\n\
               \"description\": \"...\",\n\
               \"alternative_names\": [{{\"name\": \"...\", \"confidence\": 0.0}}],\n\
               \"alternative_types\": [{{\"field_type\": \"...\", \"confidence\": 0.0}}]\n\
             }}\n\
           ]\n\
         }}\n\
         \"type_agreement\" is your confidence that the original type was correct. Keep the \
         same \"name\" keys so fields can be matched."
    )
}

/// Stage 4 — extraction hints and sample values for rule inference.
pub fn hint_generation_prompt(fields_json: &str) -> String {
    format!(
        "For each of these fields:\n{fields_json}\n\n\
         Produce extraction hints (visual cues locating the field: position, styling, \
         nearby labels) and any additional example values visible in the document.\n\n\
         Respond with JSON:\n\
         {{\n\
           \"fields\": [\n\
             {{\n\
               \"name\": \"invoice_number\",\n\
               \"hints\": [\"top-right corner\", \"preceded by label 'Invoice #'\"],\n\
               \"sample_values\": [\"INV-0001\"]\n\
             }}\n\
           ]\n\
         }}"
    )
}
