//! Clause value selections
//!
//! A clause either matches every value of its field ([`Selection::All`]) or
//! one of a list of concrete values. The two are never mixed: the ALL choice
//! is exclusive, which is why it is a variant and not a magic value inside
//! the list.
//!
//! Value widgets in the browser only speak strings, so at that boundary the
//! ALL choice travels as [`ALL_TOKEN`] through [`ValueToken`].

use serde::{Deserialize, Serialize};

/// Option id used for the ALL choice inside value widgets.
pub const ALL_TOKEN: &str = "__all__";

/// Label shown for the ALL choice.
pub const ALL_LABEL: &str = "All";

/// One entry of a raw widget selection.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum ValueToken {
    All,
    Value(String),
}

impl ValueToken {
    pub fn value(value: impl Into<String>) -> Self {
        ValueToken::Value(value.into())
    }

    pub fn is_all(&self) -> bool {
        matches!(self, ValueToken::All)
    }
}

impl From<String> for ValueToken {
    fn from(raw: String) -> Self {
        if raw == ALL_TOKEN {
            ValueToken::All
        } else {
            ValueToken::Value(raw)
        }
    }
}

impl From<&str> for ValueToken {
    fn from(raw: &str) -> Self {
        ValueToken::from(raw.to_string())
    }
}

impl From<ValueToken> for String {
    fn from(token: ValueToken) -> Self {
        match token {
            ValueToken::All => ALL_TOKEN.to_string(),
            ValueToken::Value(v) => v,
        }
    }
}

/// The values selected on a clause.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Selection {
    /// Every value of the field.
    All,
    /// Any of these values, in selection order and without duplicates.
    /// An empty list means nothing is selected yet.
    Values(Vec<String>),
}

impl Default for Selection {
    fn default() -> Self {
        Selection::Values(Vec::new())
    }
}

/// Outcome of [`Selection::apply`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Applied {
    pub selection: Selection,
    /// The widget shows something other than `selection` and must be synced
    /// back to it.
    pub resync_widget: bool,
}

impl Selection {
    /// Build a concrete selection, dropping duplicates while keeping the
    /// first-seen order.
    pub fn values<I, S>(values: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Selection::Values(dedup(values.into_iter().map(Into::into)))
    }

    pub fn is_all(&self) -> bool {
        matches!(self, Selection::All)
    }

    /// True when the clause contributes nothing to the filter.
    pub fn is_empty(&self) -> bool {
        match self {
            Selection::All => false,
            Selection::Values(v) => v.is_empty(),
        }
    }

    /// Concrete values; empty for [`Selection::All`].
    pub fn concrete(&self) -> &[String] {
        match self {
            Selection::All => &[],
            Selection::Values(v) => v,
        }
    }

    /// The selection as widget tokens.
    pub fn tokens(&self) -> Vec<ValueToken> {
        match self {
            Selection::All => vec![ValueToken::All],
            Selection::Values(v) => v.iter().cloned().map(ValueToken::Value).collect(),
        }
    }

    /// Fold a raw widget selection into this one.
    ///
    /// Picking ALL collapses the selection to ALL alone. Picking a concrete
    /// value while ALL was selected (the widget keeps the old ALL token
    /// around) drops ALL and keeps the concrete values. Anything else is
    /// taken verbatim, minus duplicates.
    pub fn apply(&self, raw: &[ValueToken]) -> Applied {
        let has_all = raw.iter().any(ValueToken::is_all);
        let concrete = dedup(raw.iter().filter_map(|t| match t {
            ValueToken::All => None,
            ValueToken::Value(v) => Some(v.clone()),
        }));

        let selection = match (self, has_all) {
            (Selection::All, true) if !concrete.is_empty() => Selection::Values(concrete),
            (_, true) => Selection::All,
            (_, false) => Selection::Values(concrete),
        };

        let resync_widget = selection.tokens() != raw;
        Applied {
            selection,
            resync_widget,
        }
    }
}

fn dedup(values: impl Iterator<Item = String>) -> Vec<String> {
    let mut out: Vec<String> = Vec::new();
    for v in values {
        if !out.contains(&v) {
            out.push(v);
        }
    }
    out
}
