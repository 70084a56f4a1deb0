//! Button actions.
//!
//! Buttons carry opaque string tokens across the transport; [`Action::parse`]
//! decodes a token back into a typed event so dispatch is one `match`
//! instead of scattered prefix checks, and [`Action::token`] is the inverse
//! used when building keyboards.

/// A decoded button press.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Action {
    /// Toggle one rule-set in the selection.
    Toggle(String),
    /// Bulk-toggle a stored group's members (all-or-nothing).
    ToggleGroup(String),
    /// Advance the catalog page.
    NextPage,
    /// Step the catalog page back.
    PrevPage,
    /// Advance the stored-group page.
    NextGroupPage,
    /// Step the stored-group page back.
    PrevGroupPage,
    /// A–Z shortcut: prefix-filter the catalog.
    Letter(char),
    /// Ask for free-text search input.
    Search,
    /// Drop the active filter.
    ClearFilter,
    /// Run the generate pipeline.
    Generate,
    /// Toggle one rule-set in the edit working set.
    EditToggle(String),
    /// Advance the edit-view page.
    EditNextPage,
    /// Step the edit-view page back.
    EditPrevPage,
    /// Ask for free-text search input in the edit view.
    EditSearch,
    /// Drop the edit-view filter.
    EditClearFilter,
    /// Persist the edit working set and end the session.
    EditSave,
    /// Discard the edit working set and end the session.
    EditCancel,
}

impl Action {
    /// Decodes an action token. Unknown tokens yield `None`.
    pub fn parse(token: &str) -> Option<Action> {
        // Longest prefixes first: TOGGLE_GROUP_ would otherwise match as
        // TOGGLE_ with a mangled name.
        if let Some(name) = token.strip_prefix("TOGGLE_GROUP_") {
            return Some(Action::ToggleGroup(name.to_string()));
        }
        if let Some(name) = token.strip_prefix("EG_TOGGLE_") {
            return Some(Action::EditToggle(name.to_string()));
        }
        if let Some(name) = token.strip_prefix("TOGGLE_") {
            return Some(Action::Toggle(name.to_string()));
        }
        if let Some(rest) = token.strip_prefix("LETTER_") {
            let mut chars = rest.chars();
            return match (chars.next(), chars.next()) {
                (Some(ch), None) if ch.is_ascii_uppercase() => Some(Action::Letter(ch)),
                _ => None,
            };
        }
        match token {
            "NEXT" => Some(Action::NextPage),
            "PREV" => Some(Action::PrevPage),
            "GNEXT" => Some(Action::NextGroupPage),
            "GPREV" => Some(Action::PrevGroupPage),
            "SEARCH" => Some(Action::Search),
            "CLEAR_FILTER" => Some(Action::ClearFilter),
            "GENERATE" => Some(Action::Generate),
            "EG_NEXT" => Some(Action::EditNextPage),
            "EG_PREV" => Some(Action::EditPrevPage),
            "EG_SEARCH" => Some(Action::EditSearch),
            "EG_CLEAR_FILTER" => Some(Action::EditClearFilter),
            "EG_SAVE" => Some(Action::EditSave),
            "EG_CANCEL" => Some(Action::EditCancel),
            _ => None,
        }
    }

    /// Encodes this action as a button token.
    pub fn token(&self) -> String {
        match self {
            Action::Toggle(name) => format!("TOGGLE_{name}"),
            Action::ToggleGroup(name) => format!("TOGGLE_GROUP_{name}"),
            Action::NextPage => "NEXT".to_string(),
            Action::PrevPage => "PREV".to_string(),
            Action::NextGroupPage => "GNEXT".to_string(),
            Action::PrevGroupPage => "GPREV".to_string(),
            Action::Letter(ch) => format!("LETTER_{ch}"),
            Action::Search => "SEARCH".to_string(),
            Action::ClearFilter => "CLEAR_FILTER".to_string(),
            Action::Generate => "GENERATE".to_string(),
            Action::EditToggle(name) => format!("EG_TOGGLE_{name}"),
            Action::EditNextPage => "EG_NEXT".to_string(),
            Action::EditPrevPage => "EG_PREV".to_string(),
            Action::EditSearch => "EG_SEARCH".to_string(),
            Action::EditClearFilter => "EG_CLEAR_FILTER".to_string(),
            Action::EditSave => "EG_SAVE".to_string(),
            Action::EditCancel => "EG_CANCEL".to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_toggle_variants() {
        assert_eq!(
            Action::parse("TOGGLE_Netflix"),
            Some(Action::Toggle("Netflix".to_string()))
        );
        assert_eq!(
            Action::parse("TOGGLE_GROUP_streaming"),
            Some(Action::ToggleGroup("streaming".to_string()))
        );
        assert_eq!(
            Action::parse("EG_TOGGLE_Netflix"),
            Some(Action::EditToggle("Netflix".to_string()))
        );
    }

    #[test]
    fn test_parse_letter() {
        assert_eq!(Action::parse("LETTER_N"), Some(Action::Letter('N')));
        assert_eq!(Action::parse("LETTER_"), None);
        assert_eq!(Action::parse("LETTER_NO"), None);
        assert_eq!(Action::parse("LETTER_n"), None);
    }

    #[test]
    fn test_parse_unknown_token() {
        assert_eq!(Action::parse("BOGUS"), None);
        assert_eq!(Action::parse(""), None);
    }

    #[test]
    fn test_token_round_trip() {
        let actions = [
            Action::Toggle("OpenAI".to_string()),
            Action::ToggleGroup("media".to_string()),
            Action::NextPage,
            Action::PrevPage,
            Action::NextGroupPage,
            Action::PrevGroupPage,
            Action::Letter('Q'),
            Action::Search,
            Action::ClearFilter,
            Action::Generate,
            Action::EditToggle("OpenAI".to_string()),
            Action::EditNextPage,
            Action::EditPrevPage,
            Action::EditSearch,
            Action::EditClearFilter,
            Action::EditSave,
            Action::EditCancel,
        ];
        for action in actions {
            assert_eq!(Action::parse(&action.token()), Some(action));
        }
    }
}
