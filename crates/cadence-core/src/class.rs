// SPDX-License-Identifier: Apache-2.0
// © James Ross Ω FLYING•ROBOTS <https://github.com/flyingrobots>
//! Explicit class tags for holders.
//!
//! Templates are declared against a holder class and apply to every subclass,
//! so the engine needs a type hierarchy it can walk at runtime. Classes are
//! `'static` descriptors declared with the `const` constructors below:
//!
//! ```
//! use cadence_core::HolderClass;
//!
//! static ENTITY: HolderClass = HolderClass::root("Entity");
//! static PROCESS: HolderClass = HolderClass::extends("Process", &ENTITY);
//!
//! assert!(PROCESS.is_a(&ENTITY));
//! assert!(!ENTITY.is_a(&PROCESS));
//! ```
//!
//! Class names are the identity of a class for equality and `is_a`, so names
//! must be unique within one world. Template caches key on the descriptor
//! itself, so a duplicated name never leaks another class's resolution.

use std::fmt;

/// Static descriptor of a holder class in a single-inheritance hierarchy.
pub struct HolderClass {
    name: &'static str,
    parent: Option<&'static HolderClass>,
}

impl HolderClass {
    /// Declares a class with no superclass.
    pub const fn root(name: &'static str) -> Self {
        Self { name, parent: None }
    }

    /// Declares a class deriving from `parent`.
    pub const fn extends(name: &'static str, parent: &'static HolderClass) -> Self {
        Self {
            name,
            parent: Some(parent),
        }
    }

    /// Unique class name.
    pub fn name(&self) -> &'static str {
        self.name
    }

    /// Direct superclass, if any.
    pub fn parent(&self) -> Option<&'static HolderClass> {
        self.parent
    }

    /// Returns `true` when `self` is `ancestor` or derives from it.
    pub fn is_a(&self, ancestor: &HolderClass) -> bool {
        if self == ancestor {
            return true;
        }
        let mut cursor = self.parent;
        while let Some(class) = cursor {
            if class == ancestor {
                return true;
            }
            cursor = class.parent;
        }
        false
    }
}

impl PartialEq for HolderClass {
    fn eq(&self, other: &Self) -> bool {
        self.name == other.name
    }
}

impl Eq for HolderClass {}

impl fmt::Debug for HolderClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HolderClass")
            .field("name", &self.name)
            .field("parent", &self.parent.map(HolderClass::name))
            .finish()
    }
}

impl fmt::Display for HolderClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    static BASE: HolderClass = HolderClass::root("Base");
    static MID: HolderClass = HolderClass::extends("Mid", &BASE);
    static LEAF: HolderClass = HolderClass::extends("Leaf", &MID);
    static OTHER: HolderClass = HolderClass::root("Other");

    #[test]
    fn class_is_a_itself() {
        assert!(BASE.is_a(&BASE));
        assert!(LEAF.is_a(&LEAF));
    }

    #[test]
    fn subclass_is_a_every_ancestor() {
        assert!(LEAF.is_a(&MID));
        assert!(LEAF.is_a(&BASE));
        assert!(MID.is_a(&BASE));
    }

    #[test]
    fn ancestor_is_not_a_subclass() {
        assert!(!BASE.is_a(&MID));
        assert!(!MID.is_a(&LEAF));
    }

    #[test]
    fn unrelated_roots_do_not_match() {
        assert!(!OTHER.is_a(&BASE));
        assert!(!LEAF.is_a(&OTHER));
    }

    #[test]
    fn identity_is_by_name() {
        let twin = HolderClass::root("Base");
        assert_eq!(twin, BASE);
        assert!(MID.is_a(&twin));
    }
}
