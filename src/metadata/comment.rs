/// Separates the logical name from the description in a catalog comment.
pub const COMMENT_DELIMITER: char = '|';

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct ParsedComment {
    pub logical_name: String,
    pub description: String,
}

/// Splits a raw catalog comment such as `"User Name|Display name"` into its
/// logical name and description. Without a delimiter the whole comment is the
/// logical name.
pub fn parse_comment(comment: Option<&str>) -> ParsedComment {
    let comment = match comment {
        Some(comment) if !comment.is_empty() => comment,
        _ => return ParsedComment::default(),
    };

    match comment.split_once(COMMENT_DELIMITER) {
        Some((logical_name, description)) => ParsedComment {
            logical_name: logical_name.trim().to_string(),
            description: description.trim().to_string(),
        },
        None => ParsedComment {
            logical_name: comment.trim().to_string(),
            description: String::new(),
        },
    }
}
