use crate::generation::GenerationRequest;
use crate::record::ProductRecord;

/// System prompt for description copywriting
pub fn get_system_prompt() -> String {
    include_str!("../prompt.txt").to_string()
}

/// Create a user prompt from the product name and its source text
pub fn create_user_prompt(name: &str, source_description: &str) -> String {
    let mut user_prompt = format!("Produktname: {}\n", name.trim());

    user_prompt.push_str("\nProduktinformationen aus dem Katalog:\n");
    if source_description.trim().is_empty() {
        user_prompt.push_str("(keine)\n");
    } else {
        user_prompt.push_str(source_description.trim());
        user_prompt.push('\n');
    }

    user_prompt
}

/// Append editor-supplied additions to a user prompt
pub fn with_additions(user_prompt: &str, additions: &str) -> String {
    if additions.is_empty() {
        user_prompt.to_string()
    } else {
        format!("{}\n\nZusatzinfos:\n{}", user_prompt, additions)
    }
}

impl GenerationRequest {
    /// Build the generation request for a record's current content.
    pub fn for_record(record: &ProductRecord) -> Self {
        Self {
            user_prompt: create_user_prompt(&record.name, &record.source_description),
            system_prompt: get_system_prompt(),
            additions: record.prompt_additions.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::record::ArtNr;
    use chrono::Utc;

    #[test]
    fn test_user_prompt_names_product_and_source() {
        let prompt = create_user_prompt(" Farbenfreude ", "Zwölf Farben.");
        assert!(prompt.starts_with("Produktname: Farbenfreude\n"));
        assert!(prompt.contains("Zwölf Farben.\n"));
    }

    #[test]
    fn test_empty_source_is_marked() {
        assert!(create_user_prompt("X", "  ").contains("(keine)"));
    }

    #[test]
    fn test_additions_are_appended_only_when_present() {
        assert_eq!(with_additions("P", ""), "P");
        assert_eq!(with_additions("P", "Mit Etui"), "P\n\nZusatzinfos:\nMit Etui");
    }

    #[test]
    fn test_request_for_record() {
        let mut record = ProductRecord::new(ArtNr::from("6381"), Utc::now());
        record.name = "Farbenfreude".to_string();
        record.prompt_additions = "Mit Etui".to_string();
        let request = GenerationRequest::for_record(&record);
        assert_eq!(request.additions, "Mit Etui");
        assert!(request.system_prompt.contains("Produktbeschreibung"));
        assert!(request.user_prompt.contains("Farbenfreude"));
    }
}
