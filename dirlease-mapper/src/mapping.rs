// SPDX-License-Identifier: EUPL-1.2 OR MIT

//! Per-type mapping descriptors.
//!
//! A type takes part in attribute mapping by implementing [`DirectoryEntry`],
//! which hands out a table of `(attribute, getter, setter)` members built once
//! per type. The [`directory_entry!`](crate::directory_entry) macro generates
//! that implementation from a short declaration:
//!
//! ```
//! use dirlease_mapper::directory_entry;
//!
//! #[derive(Default)]
//! struct Person {
//!     uid: Option<String>,
//!     uid_number: Option<u32>,
//!     display: String,
//! }
//!
//! impl Person {
//!     fn set_common_name(&mut self, value: String) {
//!         self.display = value;
//!     }
//!
//!     fn common_name(&self) -> &str {
//!         &self.display
//!     }
//! }
//!
//! directory_entry!(Person {
//!     field uid => "uid",
//!     field uid_number => "uidNumber",
//!     setter set_common_name => "cn",
//!     getter common_name => "cn",
//! });
//! ```

use std::collections::BTreeSet;

use crate::error::{MappingError, MemberError};

/// Reads a member as an attribute value, `Ok(None)` when it is unset.
pub type Getter<T> = fn(&T) -> Result<Option<String>, MemberError>;

/// Writes one attribute value into a member.
pub type Setter<T> = fn(&mut T, &str) -> Result<(), MemberError>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum MemberKind {
    /// A struct field, read and written directly.
    Field,
    /// A one-argument method receiving the value.
    Mutator,
    /// A zero-argument method returning the value.
    Accessor,
}

/// One tagged member of a type.
pub struct Member<T> {
    name: &'static str,
    attribute: &'static str,
    kind: MemberKind,
    getter: Option<Getter<T>>,
    setter: Option<Setter<T>>,
}

impl<T> Member<T> {
    pub fn field(
        name: &'static str,
        attribute: &'static str,
        getter: Getter<T>,
        setter: Setter<T>,
    ) -> Self {
        Self {
            name,
            attribute,
            kind: MemberKind::Field,
            getter: Some(getter),
            setter: Some(setter),
        }
    }

    pub fn mutator(name: &'static str, attribute: &'static str, setter: Setter<T>) -> Self {
        Self {
            name,
            attribute,
            kind: MemberKind::Mutator,
            getter: None,
            setter: Some(setter),
        }
    }

    pub fn accessor(name: &'static str, attribute: &'static str, getter: Getter<T>) -> Self {
        Self {
            name,
            attribute,
            kind: MemberKind::Accessor,
            getter: Some(getter),
            setter: None,
        }
    }

    /// Name of the field or method.
    pub fn name(&self) -> &'static str {
        self.name
    }

    /// Directory attribute the member corresponds to.
    pub fn attribute(&self) -> &'static str {
        self.attribute
    }

    pub fn kind(&self) -> MemberKind {
        self.kind
    }

    pub(crate) fn getter(&self) -> Option<Getter<T>> {
        self.getter
    }

    pub(crate) fn setter(&self) -> Option<Setter<T>> {
        self.setter
    }
}

impl<T> std::fmt::Debug for Member<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Member")
            .field("name", &self.name)
            .field("attribute", &self.attribute)
            .field("kind", &self.kind)
            .finish()
    }
}

/// The mapping table of a type.
///
/// Fields always come before mutators and accessors, so in the search
/// direction a field tagged with the same attribute as a mutator is written
/// first.
#[derive(Debug)]
pub struct EntryMapping<T> {
    type_name: &'static str,
    members: Vec<Member<T>>,
}

impl<T> EntryMapping<T> {
    pub fn builder() -> EntryMappingBuilder<T> {
        EntryMappingBuilder {
            members: Vec::new(),
        }
    }

    pub fn type_name(&self) -> &'static str {
        self.type_name
    }

    pub fn members(&self) -> &[Member<T>] {
        &self.members
    }

    /// Deduplicated attribute names across fields, mutators and accessors.
    ///
    /// Members tagged with an empty name are left out; mapping such a type
    /// fails with [`MappingError::UnnamedAttribute`].
    pub fn attribute_names(&self) -> BTreeSet<&'static str> {
        self.members
            .iter()
            .map(Member::attribute)
            .filter(|name| !name.is_empty())
            .collect()
    }

    pub(crate) fn check_names(&self) -> Result<(), MappingError> {
        match self.members.iter().find(|m| m.attribute.is_empty()) {
            Some(member) => Err(MappingError::UnnamedAttribute {
                type_name: self.type_name,
                member: member.name,
            }),
            None => Ok(()),
        }
    }
}

pub struct EntryMappingBuilder<T> {
    members: Vec<Member<T>>,
}

impl<T> EntryMappingBuilder<T> {
    pub fn member(mut self, member: Member<T>) -> Self {
        self.members.push(member);
        self
    }

    pub fn build(mut self) -> EntryMapping<T> {
        // stable: declaration order is kept within each group
        self.members.sort_by_key(|m| m.kind != MemberKind::Field);
        EntryMapping {
            type_name: std::any::type_name::<T>(),
            members: self.members,
        }
    }
}

/// A type that can be mapped to and from directory attributes.
pub trait DirectoryEntry: Sized + 'static {
    /// Create the empty instance that search results are written into.
    fn instantiate() -> Result<Self, MappingError>;

    fn mapping() -> &'static EntryMapping<Self>;
}

/// Implement [`DirectoryEntry`] for a `Default` type.
///
/// Each line is `field <name> => "<attribute>"`, `setter <method> =>
/// "<attribute>"` or `getter <method> => "<attribute>"`. Members not listed
/// are never touched.
#[macro_export]
macro_rules! directory_entry {
    (@member $ty:ty, field $member:ident => $attribute:expr) => {
        $crate::Member::field(
            ::std::stringify!($member),
            $attribute,
            |entry: &$ty| {
                ::std::result::Result::Ok($crate::ToAttribute::to_attribute(&entry.$member))
            },
            |entry: &mut $ty, value: &str| {
                entry.$member = $crate::FromAttribute::from_attribute(value)?;
                ::std::result::Result::Ok(())
            },
        )
    };
    (@member $ty:ty, setter $member:ident => $attribute:expr) => {
        $crate::Member::mutator(
            ::std::stringify!($member),
            $attribute,
            |entry: &mut $ty, value: &str| {
                entry.$member($crate::FromAttribute::from_attribute(value)?);
                ::std::result::Result::Ok(())
            },
        )
    };
    (@member $ty:ty, getter $member:ident => $attribute:expr) => {
        $crate::Member::accessor(
            ::std::stringify!($member),
            $attribute,
            |entry: &$ty| {
                ::std::result::Result::Ok($crate::ToAttribute::to_attribute(&entry.$member()))
            },
        )
    };
    ($ty:ty { $($kind:ident $member:ident => $attribute:expr),* $(,)? }) => {
        impl $crate::DirectoryEntry for $ty {
            fn instantiate() -> ::std::result::Result<Self, $crate::MappingError> {
                ::std::result::Result::Ok(<$ty as ::std::default::Default>::default())
            }

            fn mapping() -> &'static $crate::EntryMapping<Self> {
                static MAPPING: ::std::sync::OnceLock<$crate::EntryMapping<$ty>> =
                    ::std::sync::OnceLock::new();
                MAPPING.get_or_init(|| {
                    $crate::EntryMapping::builder()
                        $(.member($crate::directory_entry!(@member $ty, $kind $member => $attribute)))*
                        .build()
                })
            }
        }
    };
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::directory_entry;

    #[derive(Default)]
    struct Account {
        login: Option<String>,
        shell: Option<String>,
    }

    impl Account {
        fn set_home(&mut self, _home: String) {}

        fn home(&self) -> Option<String> {
            None
        }
    }

    directory_entry!(Account {
        setter set_home => "homeDirectory",
        field login => "uid",
        getter home => "homeDirectory",
        field shell => "loginShell",
    });

    #[test]
    fn test_fields_sorted_before_methods() {
        let kinds: Vec<_> = Account::mapping().members().iter().map(Member::kind).collect();
        assert_eq!(
            kinds,
            vec![
                MemberKind::Field,
                MemberKind::Field,
                MemberKind::Mutator,
                MemberKind::Accessor
            ]
        );
        let names: Vec<_> = Account::mapping().members().iter().map(Member::name).collect();
        assert_eq!(names, vec!["login", "shell", "set_home", "home"]);
    }

    #[test]
    fn test_attribute_names_deduplicated() {
        let names = Account::mapping().attribute_names();
        assert_eq!(
            names.into_iter().collect::<Vec<_>>(),
            vec!["homeDirectory", "loginShell", "uid"]
        );
    }

    #[test]
    fn test_mapping_built_once() {
        assert!(std::ptr::eq(Account::mapping(), Account::mapping()));
        assert!(Account::mapping().type_name().ends_with("Account"));
    }

    #[test]
    fn test_unnamed_member_detected() {
        let mapping = EntryMapping::<Account>::builder()
            .member(Member::mutator("set_home", "", |_, _| Ok(())))
            .build();
        assert!(mapping.attribute_names().is_empty());
        assert!(matches!(
            mapping.check_names(),
            Err(MappingError::UnnamedAttribute { member: "set_home", .. })
        ));
    }
}
