//! Small helpers shared by the server and configuration code.

/// Local inference servers that run without an API key
/// (Ollama, LM Studio, vLLM default ports).
pub const LOCAL_ENDPOINTS: [&str; 3] = [
    "http://localhost:11434/v1",
    "http://localhost:1234/v1",
    "http://localhost:8000/v1",
];

/// Whether `base_url` is one of the known keyless local endpoints.
pub fn is_local_endpoint(base_url: &str) -> bool {
    LOCAL_ENDPOINTS.contains(&base_url)
}

/// Mask an API key for logging: a fixed run of asterisks followed by the
/// last eight characters, or `NONE` when no key is set.
pub fn mask_api_key(key: &str) -> String {
    if key.is_empty() {
        return "*".repeat(20) + "NONE";
    }
    let count = key.chars().count();
    let tail: String = key.chars().skip(count.saturating_sub(8)).collect();
    "*".repeat(20) + &tail
}

/// `code_reviewer` -> `Code Reviewer`
pub fn title_case(snake: &str) -> String {
    snake
        .split('_')
        .filter(|w| !w.is_empty())
        .map(|word| {
            let mut chars = word.chars();
            match chars.next() {
                Some(first) => first.to_uppercase().chain(chars.flat_map(char::to_lowercase)).collect(),
                None => String::new(),
            }
        })
        .collect::<Vec<String>>()
        .join(" ")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn local_endpoints_are_exact_matches() {
        assert!(is_local_endpoint("http://localhost:11434/v1"));
        assert!(is_local_endpoint("http://localhost:8000/v1"));
        assert!(!is_local_endpoint("http://localhost:11434/v1/"));
        assert!(!is_local_endpoint("https://api.openai.com/v1"));
    }

    #[test]
    fn masks_all_but_last_eight() {
        assert_eq!(mask_api_key("sk-abcdefghijklmnop"), "********************ijklmnop");
        assert_eq!(mask_api_key("short"), "********************short");
        assert_eq!(mask_api_key(""), "********************NONE");
    }

    #[test]
    fn title_cases_expert_names() {
        assert_eq!(title_case("code_reviewer"), "Code Reviewer");
        assert_eq!(title_case("architect"), "Architect");
        assert_eq!(title_case("scope_analyst"), "Scope Analyst");
    }
}
