const PLACEHOLDER: char = '_';

/// Replaces filesystem-reserved and control characters, then trims whitespace.
pub fn sanitize(name: &str) -> String {
    let replaced: String = name
        .chars()
        .map(|character| {
            if is_reserved(character) {
                PLACEHOLDER
            } else {
                character
            }
        })
        .collect();

    replaced.trim().to_string()
}

fn is_reserved(character: char) -> bool {
    matches!(
        character,
        '<' | '>' | ':' | '"' | '/' | '\\' | '|' | '?' | '*' | '\u{0}'..='\u{1f}'
    )
}

pub fn build_content_disposition(filename: &str) -> String {
    format!(
        "attachment; filename=\"{}\"",
        urlencoding::encode(filename)
    )
}
