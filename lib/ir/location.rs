//! Aliasable locations: reference-typed locals and fields.
//!
//! Locations are compared by identity. Every registration in a
//! [`Locations`] table yields a fresh dense index, and two locals with the
//! same name are still two different locations. The one exception is
//! fields: registering the same program-wide field twice in one procedure
//! returns the same location, since the analyses are field-insensitive
//! with respect to the receiver object and track one alias set per
//! declared field.

use serde::{Deserialize, Serialize};
use std::fmt;

/// A dense per-procedure location index. `Copy`, cheap to pass around, and
/// only meaningful together with the [`Locations`] table that issued it.
#[derive(
    Clone, Copy, Debug, Deserialize, Eq, Hash, Ord, PartialEq, PartialOrd, Serialize,
)]
pub struct Location(pub(crate) usize);

impl Location {
    pub fn index(&self) -> usize {
        self.0
    }
}

impl fmt::Display for Location {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "loc_{}", self.0)
    }
}

#[derive(Clone, Debug, Deserialize, Eq, Hash, PartialEq, Serialize)]
pub enum LocationKind {
    /// A local variable, scoped to one procedure.
    Local { name: String },
    /// A declared field, identified program-wide by `field`. Tracked per
    /// field name, not per receiver object.
    Field {
        field: usize,
        name: String,
        private: bool,
    },
}

#[derive(Clone, Debug, Deserialize, Eq, Hash, PartialEq, Serialize)]
struct LocationEntry {
    kind: LocationKind,
    reference: bool,
}

/// The table of aliasable locations for one procedure.
#[derive(Clone, Debug, Default, Deserialize, Eq, Hash, PartialEq, Serialize)]
pub struct Locations {
    entries: Vec<LocationEntry>,
}

impl Locations {
    pub fn new() -> Locations {
        Locations {
            entries: Vec::new(),
        }
    }

    /// Registers a reference-typed local variable and returns its location.
    /// Every call returns a fresh location, regardless of name.
    pub fn local<S: Into<String>>(&mut self, name: S) -> Location {
        self.push(
            LocationKind::Local { name: name.into() },
            true,
        )
    }

    /// Registers a local of non-reference type. Such locations exist so
    /// statements can mention them, but assignments through them carry no
    /// alias information.
    pub fn scalar<S: Into<String>>(&mut self, name: S) -> Location {
        self.push(
            LocationKind::Local { name: name.into() },
            false,
        )
    }

    /// Registers a reference-typed field by its program-wide index. If the
    /// field was already registered in this procedure, the existing
    /// location is returned.
    pub fn field<S: Into<String>>(&mut self, field: usize, name: S, private: bool) -> Location {
        for (index, entry) in self.entries.iter().enumerate() {
            if let LocationKind::Field { field: f, .. } = entry.kind {
                if f == field {
                    return Location(index);
                }
            }
        }
        self.push(
            LocationKind::Field {
                field,
                name: name.into(),
                private,
            },
            true,
        )
    }

    fn push(&mut self, kind: LocationKind, reference: bool) -> Location {
        let location = Location(self.entries.len());
        self.entries.push(LocationEntry { kind, reference });
        location
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn contains(&self, location: Location) -> bool {
        location.0 < self.entries.len()
    }

    pub fn kind(&self, location: Location) -> Option<&LocationKind> {
        self.entries.get(location.0).map(|entry| &entry.kind)
    }

    pub fn name(&self, location: Location) -> Option<&str> {
        self.kind(location).map(|kind| match kind {
            LocationKind::Local { name } => name.as_str(),
            LocationKind::Field { name, .. } => name.as_str(),
        })
    }

    /// True if the location denotes a reference (object or array) type.
    pub fn is_reference(&self, location: Location) -> bool {
        self.entries
            .get(location.0)
            .map(|entry| entry.reference)
            .unwrap_or(false)
    }

    pub fn is_field(&self, location: Location) -> bool {
        matches!(self.kind(location), Some(LocationKind::Field { .. }))
    }

    /// The program-wide field index for a field location.
    pub fn field_index(&self, location: Location) -> Option<usize> {
        match self.kind(location) {
            Some(LocationKind::Field { field, .. }) => Some(*field),
            _ => None,
        }
    }

    pub fn is_private_field(&self, location: Location) -> bool {
        matches!(
            self.kind(location),
            Some(LocationKind::Field { private: true, .. })
        )
    }

    /// All locations in this table.
    pub fn iter(&self) -> impl Iterator<Item = Location> {
        (0..self.entries.len()).map(Location)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn locals_are_distinct_by_identity() {
        let mut locations = Locations::new();
        let a = locations.local("x");
        let b = locations.local("x");
        assert_ne!(a, b);
        assert_eq!(locations.name(a), Some("x"));
        assert_eq!(locations.name(b), Some("x"));
    }

    #[test]
    fn fields_are_shared_per_declared_field() {
        let mut locations = Locations::new();
        let f0 = locations.field(7, "f", false);
        let f1 = locations.field(7, "f", false);
        let g = locations.field(8, "g", true);
        assert_eq!(f0, f1);
        assert_ne!(f0, g);
        assert!(locations.is_field(f0));
        assert!(!locations.is_private_field(f0));
        assert!(locations.is_private_field(g));
        assert_eq!(locations.field_index(g), Some(8));
    }

    #[test]
    fn scalars_are_not_references() {
        let mut locations = Locations::new();
        let i = locations.scalar("i");
        let a = locations.local("a");
        assert!(!locations.is_reference(i));
        assert!(locations.is_reference(a));
        assert_eq!(locations.field_index(i), None);
    }
}
