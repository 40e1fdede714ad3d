use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum AnchorError {
    #[error("anchor {anchor} not found{}", hint_suffix(.hint))]
    NotFound {
        anchor: String,
        hint: Option<String>,
    },

    #[error("anchor {anchor} matched {count} locations; an occurrence selector is required")]
    AmbiguousMatch { anchor: String, count: usize },

    #[error("invalid pattern for anchor {anchor}: {message}")]
    InvalidPattern { anchor: String, message: String },
}

fn hint_suffix(hint: &Option<String>) -> String {
    match hint {
        Some(hint) => format!(" ({hint})"),
        None => String::new(),
    }
}
