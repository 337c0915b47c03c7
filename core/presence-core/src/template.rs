//! Placeholder expansion for presence text.
//!
//! Templates are literal text with `{{token}}` markers. Expansion is a single
//! pass: substituted values are never re-scanned, so a file literally named
//! `{{vault}}` stays as written.
//!
//! | Token | Value |
//! |---|---|
//! | `{{vault}}` | Vault name |
//! | `{{fileName}}` | Open file name without extension |
//! | `{{fileExtension}}` | Open file extension |
//! | `{{filePath}}` | Open file path |
//! | `{{folder}}` | Parent folder of the open file |
//! | `{{created}}` | Creation date of the open file (`YYYY-MM-DD`) |

use chrono::{DateTime, Utc};
use once_cell::sync::Lazy;
use regex::{Captures, Regex};

use crate::context::{FileContext, PresenceContext};

/// Substituted for file-scoped tokens when no file is open.
pub const NO_FILE_FALLBACK: &str = "no file";
/// Substituted for `{{vault}}` before the host has reported a vault.
pub const NO_VAULT_FALLBACK: &str = "a vault";
/// Substituted for `{{created}}` when the host did not report a creation time.
pub const UNKNOWN_DATE_FALLBACK: &str = "unknown date";

static RE_TOKEN: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\{\{([A-Za-z][A-Za-z0-9_]*)\}\}").unwrap());

/// Expands every recognized `{{token}}` in `template`. Unrecognized tokens are
/// left exactly as written.
pub fn expand(template: &str, context: &PresenceContext) -> String {
    RE_TOKEN
        .replace_all(template, |caps: &Captures| {
            resolve_token(&caps[1], context).unwrap_or_else(|| caps[0].to_string())
        })
        .into_owned()
}

fn is_file_token(token: &str) -> bool {
    matches!(
        token,
        "fileName" | "fileExtension" | "filePath" | "folder" | "created"
    )
}

fn resolve_token(token: &str, context: &PresenceContext) -> Option<String> {
    if token == "vault" {
        return Some(
            context
                .vault
                .clone()
                .filter(|name| !name.trim().is_empty())
                .unwrap_or_else(|| NO_VAULT_FALLBACK.to_string()),
        );
    }

    if !is_file_token(token) {
        return None;
    }

    let file = match context.file.as_ref() {
        Some(file) => file,
        None => return Some(NO_FILE_FALLBACK.to_string()),
    };

    Some(file_token_value(token, file))
}

fn file_token_value(token: &str, file: &FileContext) -> String {
    match token {
        "fileName" => file.name.clone(),
        "fileExtension" => file.extension.clone(),
        "filePath" => file.path.clone(),
        "folder" => file.folder.clone(),
        "created" => file
            .created
            .and_then(DateTime::<Utc>::from_timestamp_millis)
            .map(|created| created.format("%Y-%m-%d").to_string())
            .unwrap_or_else(|| UNKNOWN_DATE_FALLBACK.to_string()),
        _ => String::new(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn context_with_file(path: &str) -> PresenceContext {
        PresenceContext {
            vault: Some("Notes".to_string()),
            file: FileContext::from_path(path, Some(1_704_067_200_000)),
        }
    }

    #[test]
    fn template_without_tokens_is_unchanged() {
        let context = context_with_file("Daily/today.md");
        assert_eq!(expand("Just writing", &context), "Just writing");
        assert_eq!(expand("", &context), "");
        assert_eq!(expand("{single} braces", &context), "{single} braces");
    }

    #[test]
    fn repeated_tokens_are_all_replaced() {
        let context = PresenceContext {
            vault: Some("a".to_string()),
            file: None,
        };
        assert_eq!(expand("{{vault}}-{{vault}}", &context), "a-a");
    }

    #[test]
    fn expands_vault_token() {
        let context = PresenceContext {
            vault: Some("Notes".to_string()),
            file: None,
        };
        assert_eq!(expand("Vault: {{vault}}", &context), "Vault: Notes");
    }

    #[test]
    fn expands_file_tokens() {
        let context = context_with_file("Projects/Rust/ownership.md");
        assert_eq!(
            expand(
                "{{fileName}}.{{fileExtension}} in {{folder}} ({{filePath}})",
                &context
            ),
            "ownership.md in Rust (Projects/Rust/ownership.md)"
        );
        assert_eq!(expand("{{created}}", &context), "2024-01-01");
    }

    #[test]
    fn unknown_tokens_pass_through() {
        let context = context_with_file("a.md");
        assert_eq!(
            expand("{{nope}} {{fileName}} {{ vault }}", &context),
            "{{nope}} a {{ vault }}"
        );
    }

    #[test]
    fn file_tokens_without_file_use_fallback() {
        let context = PresenceContext {
            vault: Some("Notes".to_string()),
            file: None,
        };
        assert_eq!(
            expand("Editing: {{fileName}}", &context),
            format!("Editing: {}", NO_FILE_FALLBACK)
        );
    }

    #[test]
    fn missing_vault_uses_fallback() {
        assert_eq!(
            expand("{{vault}}", &PresenceContext::default()),
            NO_VAULT_FALLBACK
        );
    }

    #[test]
    fn substituted_values_are_not_rescanned() {
        let context = PresenceContext {
            vault: Some("Secret".to_string()),
            file: FileContext::from_path("{{vault}}.md", None),
        };
        assert_eq!(expand("{{fileName}}", &context), "{{vault}}");
    }

    #[test]
    fn missing_creation_time_uses_fallback() {
        let context = PresenceContext {
            vault: None,
            file: FileContext::from_path("a.md", None),
        };
        assert_eq!(expand("{{created}}", &context), UNKNOWN_DATE_FALLBACK);
    }
}
