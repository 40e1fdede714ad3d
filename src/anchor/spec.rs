use crate::scope::Delimiter;
use serde::Deserialize;
use std::fmt;

/// Description of where an edit attaches in a buffer.
///
/// Strategies are tried in order: the exact `text`, then (when `flexible`)
/// the same text with every whitespace run relaxed, then the `structural`
/// marker. The first strategy that yields any match wins.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct AnchorSpec {
    /// Literal text to search for.
    #[serde(default)]
    pub text: String,
    /// Allow the literal to match with different whitespace.
    #[serde(default = "default_flexible")]
    pub flexible: bool,
    /// Declaration-style marker whose match must open a block.
    #[serde(default)]
    pub structural: Option<StructuralMarker>,
    /// Which match to use when several exist.
    #[serde(default)]
    pub occurrence: Option<Occurrence>,
    /// Only search after the end of this preceding anchor.
    #[serde(default)]
    pub after: Option<Box<AnchorSpec>>,
}

fn default_flexible() -> bool {
    true
}

/// A declaration token plus the delimiter its body opens with.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct StructuralMarker {
    pub token: String,
    #[serde(default)]
    pub delimiter: Delimiter,
}

/// Occurrence selector. `Nth` is 1-based.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Occurrence {
    First,
    Last,
    Nth(usize),
}

impl AnchorSpec {
    /// Anchor on literal text, with the whitespace-flexible fallback enabled.
    pub fn literal(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            flexible: true,
            structural: None,
            occurrence: None,
            after: None,
        }
    }

    /// Anchor on a declaration token that must open a brace block.
    pub fn structural(token: impl Into<String>) -> Self {
        Self {
            text: String::new(),
            flexible: false,
            structural: Some(StructuralMarker {
                token: token.into(),
                delimiter: Delimiter::Brace,
            }),
            occurrence: None,
            after: None,
        }
    }

    /// Disable the whitespace-flexible fallback.
    pub fn exact(mut self) -> Self {
        self.flexible = false;
        self
    }

    /// Add a structural fallback after the literal strategies.
    pub fn or_structural(mut self, token: impl Into<String>, delimiter: Delimiter) -> Self {
        self.structural = Some(StructuralMarker {
            token: token.into(),
            delimiter,
        });
        self
    }

    pub fn occurrence(mut self, occurrence: Occurrence) -> Self {
        self.occurrence = Some(occurrence);
        self
    }

    pub fn first(self) -> Self {
        self.occurrence(Occurrence::First)
    }

    pub fn last(self) -> Self {
        self.occurrence(Occurrence::Last)
    }

    pub fn nth(self, n: usize) -> Self {
        self.occurrence(Occurrence::Nth(n))
    }

    /// Restrict the search to text after `preceding`.
    pub fn after(mut self, preceding: impl Into<AnchorSpec>) -> Self {
        self.after = Some(Box::new(preceding.into()));
        self
    }

    /// Short label used in logs and error messages.
    pub fn label(&self) -> String {
        if !self.text.is_empty() {
            return format!("{:?}", self.text);
        }
        match &self.structural {
            Some(marker) => format!("structural {:?}", marker.token),
            None => "<empty anchor>".to_string(),
        }
    }

    /// Whether any locator strategy can run for this spec.
    pub fn is_empty(&self) -> bool {
        self.text.trim().is_empty()
            && self
                .structural
                .as_ref()
                .map_or(true, |marker| marker.token.trim().is_empty())
    }
}

impl From<&str> for AnchorSpec {
    fn from(text: &str) -> Self {
        AnchorSpec::literal(text)
    }
}

impl From<String> for AnchorSpec {
    fn from(text: String) -> Self {
        AnchorSpec::literal(text)
    }
}

impl fmt::Display for AnchorSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.label())?;
        if let Some(after) = &self.after {
            write!(f, " after {after}")?;
        }
        Ok(())
    }
}
