//! Output shape of a materialized view.

use std::collections::BTreeMap;

/// Describes whether a level of the view is rendered as a single entry or a
/// list, and the format of each relationship below it.
///
/// Relationships a node carries but the format does not name are not
/// materialized.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Format {
    pub singular: bool,
    pub relationships: BTreeMap<String, Format>,
}

impl Format {
    /// A list level with no relationships.
    pub fn list() -> Self {
        Self::default()
    }

    /// A single-entry level with no relationships.
    pub fn singular() -> Self {
        Self {
            singular: true,
            relationships: BTreeMap::new(),
        }
    }

    /// Adds (or replaces) the format of relationship `name`.
    pub fn with_relationship(mut self, name: impl Into<String>, format: Format) -> Self {
        self.relationships.insert(name.into(), format);
        self
    }

    #[inline]
    pub fn relationship(&self, name: &str) -> Option<&Format> {
        self.relationships.get(name)
    }
}
