// SPDX-License-Identifier: EUPL-1.2 OR MIT

//! Attribute mapping in both directions.
//!
//! Mapping is best effort per member: a member that cannot be read or written
//! is recorded as [`MemberStatus::Failed`] and the remaining members are still
//! mapped. Only a failure to create the instance, or an unnamed member, fails
//! the whole mapping.
//!
//! When an attribute carries several values, the first value is used and the
//! others are dropped. The number of dropped values is reported in
//! [`MemberStatus::Applied`].

use std::collections::BTreeSet;
use std::marker::PhantomData;

use tracing::debug;

use crate::attributes::{AttributeDelta, AttributeSet};
use crate::error::{MappingError, MemberError};
use crate::mapping::{DirectoryEntry, EntryMapping, MemberKind};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MemberStatus {
    /// The value was written (search) or emitted (modify).
    Applied { dropped: usize },
    /// Nothing to map: the attribute was missing or the member was unset.
    Absent,
    Failed(MemberError),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MemberOutcome {
    pub attribute: &'static str,
    pub member: &'static str,
    pub kind: MemberKind,
    pub status: MemberStatus,
}

/// A mapping result together with what happened to each member.
#[derive(Debug, Clone)]
pub struct Mapped<T> {
    pub value: T,
    pub outcomes: Vec<MemberOutcome>,
}

impl<T> Mapped<T> {
    pub fn into_inner(self) -> T {
        self.value
    }

    /// Members whose value could not be mapped.
    pub fn failures(&self) -> impl Iterator<Item = &MemberOutcome> {
        self.outcomes
            .iter()
            .filter(|o| matches!(o.status, MemberStatus::Failed(_)))
    }

    pub fn is_complete(&self) -> bool {
        self.failures().next().is_none()
    }
}

/// Maps between [`AttributeSet`]s and instances of `T`.
pub struct AttributeMapper<T: 'static> {
    mapping: &'static EntryMapping<T>,
    _marker: PhantomData<fn() -> T>,
}

impl<T: DirectoryEntry> AttributeMapper<T> {
    pub fn new() -> Self {
        Self {
            mapping: T::mapping(),
            _marker: PhantomData,
        }
    }

    /// Deduplicated names of every attribute `T` declares.
    pub fn attribute_names(&self) -> BTreeSet<&'static str> {
        self.mapping.attribute_names()
    }

    /// Build a new `T` from the attributes of one entry.
    pub fn map_from_attributes(&self, attributes: &AttributeSet) -> Result<Mapped<T>, MappingError> {
        self.mapping.check_names()?;
        let mut instance = T::instantiate()?;
        let mut outcomes = Vec::with_capacity(self.mapping.members().len());

        for member in self.mapping.members() {
            let Some(setter) = member.setter() else {
                continue;
            };

            let status = match attributes.get(member.attribute()) {
                Some([first, rest @ ..]) => match setter(&mut instance, first) {
                    Ok(()) => MemberStatus::Applied {
                        dropped: rest.len(),
                    },
                    Err(e) => {
                        debug!(
                            entry = self.mapping.type_name(),
                            member = member.name(),
                            attribute = member.attribute(),
                            "Skipping member: {e}"
                        );
                        MemberStatus::Failed(e)
                    }
                },
                _ => MemberStatus::Absent,
            };

            outcomes.push(MemberOutcome {
                attribute: member.attribute(),
                member: member.name(),
                kind: member.kind(),
                status,
            });
        }

        Ok(Mapped {
            value: instance,
            outcomes,
        })
    }

    /// Collect the set members of `instance` as values to write.
    pub fn map_from_instance(&self, instance: &T) -> Result<Mapped<AttributeDelta>, MappingError> {
        self.mapping.check_names()?;
        let mut delta = AttributeDelta::new();
        let mut outcomes = Vec::with_capacity(self.mapping.members().len());

        for member in self.mapping.members() {
            let Some(getter) = member.getter() else {
                continue;
            };

            let status = match getter(instance) {
                Ok(Some(value)) => {
                    delta.push(member.attribute(), value);
                    MemberStatus::Applied { dropped: 0 }
                }
                Ok(None) => MemberStatus::Absent,
                Err(e) => {
                    debug!(
                        entry = self.mapping.type_name(),
                        member = member.name(),
                        attribute = member.attribute(),
                        "Omitting member: {e}"
                    );
                    MemberStatus::Failed(e)
                }
            };

            outcomes.push(MemberOutcome {
                attribute: member.attribute(),
                member: member.name(),
                kind: member.kind(),
                status,
            });
        }

        Ok(Mapped {
            value: delta,
            outcomes,
        })
    }
}

impl<T: DirectoryEntry> Default for AttributeMapper<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T: DirectoryEntry> Clone for AttributeMapper<T> {
    fn clone(&self) -> Self {
        *self
    }
}

impl<T: DirectoryEntry> Copy for AttributeMapper<T> {}

/// Shorthand for `AttributeMapper::<T>::new().attribute_names()`.
pub fn attribute_names<T: DirectoryEntry>() -> BTreeSet<&'static str> {
    AttributeMapper::<T>::new().attribute_names()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::directory_entry;
    use crate::mapping::Member;
    use proptest::prelude::*;
    use std::sync::OnceLock;

    #[derive(Debug, Default, Clone, PartialEq)]
    struct Person {
        uid: Option<String>,
        mail: Option<String>,
        uid_number: Option<u32>,
        enabled: Option<bool>,
        common_name: Option<String>,
    }

    impl Person {
        fn set_common_name(&mut self, value: String) {
            self.common_name = Some(value);
        }

        fn common_name(&self) -> Option<&str> {
            self.common_name.as_deref()
        }
    }

    directory_entry!(Person {
        field uid => "uid",
        field mail => "mail",
        field uid_number => "uidNumber",
        field enabled => "enabled",
        setter set_common_name => "cn",
        getter common_name => "cn",
    });

    /// Records whether the field was already written when the setter ran.
    #[derive(Debug, Default)]
    struct Ordered {
        raw: Option<String>,
        field_seen_by_setter: Option<bool>,
    }

    impl Ordered {
        fn set_raw(&mut self, _value: String) {
            self.field_seen_by_setter = Some(self.raw.is_some());
        }
    }

    directory_entry!(Ordered {
        setter set_raw => "description",
        field raw => "description",
    });

    #[derive(Debug)]
    struct Unbuildable;

    impl DirectoryEntry for Unbuildable {
        fn instantiate() -> Result<Self, MappingError> {
            Err(MappingError::instantiation::<Self>("no default constructor"))
        }

        fn mapping() -> &'static EntryMapping<Self> {
            static MAPPING: OnceLock<EntryMapping<Unbuildable>> = OnceLock::new();
            MAPPING.get_or_init(|| EntryMapping::builder().build())
        }
    }

    #[derive(Debug, Default, Clone, PartialEq)]
    struct Note {
        text: Option<String>,
        initial: Option<char>,
    }

    directory_entry!(Note {
        field text => "description",
        field initial => "initials",
    });

    #[derive(Debug, Default)]
    struct Unnamed {
        value: Option<String>,
    }

    directory_entry!(Unnamed {
        field value => "",
    });

    #[derive(Debug, Default)]
    struct Picky {
        code: Option<String>,
    }

    impl DirectoryEntry for Picky {
        fn instantiate() -> Result<Self, MappingError> {
            Ok(Picky::default())
        }

        fn mapping() -> &'static EntryMapping<Self> {
            static MAPPING: OnceLock<EntryMapping<Picky>> = OnceLock::new();
            MAPPING.get_or_init(|| {
                EntryMapping::builder()
                    .member(Member::field(
                        "code",
                        "employeeNumber",
                        |p: &Picky| match p.code.as_deref() {
                            Some("secret") => Err(MemberError::rejected("not readable")),
                            other => Ok(other.map(str::to_owned)),
                        },
                        |p: &mut Picky, v: &str| {
                            p.code = Some(v.to_owned());
                            Ok(())
                        },
                    ))
                    .build()
            })
        }
    }

    fn status_of<'a, T>(mapped: &'a Mapped<T>, member: &str) -> &'a MemberStatus {
        &mapped
            .outcomes
            .iter()
            .find(|o| o.member == member)
            .unwrap()
            .status
    }

    #[test]
    fn test_single_entry_maps_uid() {
        let attributes = AttributeSet::new().with("uid", ["jdoe"]);
        let mapped = AttributeMapper::<Person>::new()
            .map_from_attributes(&attributes)
            .unwrap();
        assert_eq!(mapped.value.uid.as_deref(), Some("jdoe"));
        assert_eq!(mapped.value.mail, None);
        assert_eq!(status_of(&mapped, "mail"), &MemberStatus::Absent);
        assert!(mapped.is_complete());
    }

    #[test]
    fn test_type_mismatch_does_not_abort_other_members() {
        let attributes = AttributeSet::new()
            .with("uidNumber", ["not-a-number"])
            .with("uid", ["jdoe"])
            .with("cn", ["John Doe"]);
        let mapped = AttributeMapper::<Person>::new()
            .map_from_attributes(&attributes)
            .unwrap();

        assert_eq!(mapped.value.uid.as_deref(), Some("jdoe"));
        assert_eq!(mapped.value.common_name.as_deref(), Some("John Doe"));
        assert_eq!(mapped.value.uid_number, None);

        let failures: Vec<_> = mapped.failures().map(|o| o.member).collect();
        assert_eq!(failures, vec!["uid_number"]);
    }

    #[test]
    fn test_first_value_wins() {
        let attributes = AttributeSet::new().with("mail", ["first@example.com", "second@example.com"]);
        let mapped = AttributeMapper::<Person>::new()
            .map_from_attributes(&attributes)
            .unwrap();
        assert_eq!(mapped.value.mail.as_deref(), Some("first@example.com"));
        assert_eq!(
            status_of(&mapped, "mail"),
            &MemberStatus::Applied { dropped: 1 }
        );
    }

    #[test]
    fn test_empty_value_list_is_absent() {
        let attributes = AttributeSet::new().with("mail", Vec::<String>::new());
        let mapped = AttributeMapper::<Person>::new()
            .map_from_attributes(&attributes)
            .unwrap();
        assert_eq!(mapped.value.mail, None);
        assert_eq!(status_of(&mapped, "mail"), &MemberStatus::Absent);
    }

    #[test]
    fn test_field_written_before_setter() {
        let attributes = AttributeSet::new().with("description", ["x"]);
        let mapped = AttributeMapper::<Ordered>::new()
            .map_from_attributes(&attributes)
            .unwrap();
        assert_eq!(mapped.value.raw.as_deref(), Some("x"));
        assert_eq!(mapped.value.field_seen_by_setter, Some(true));
    }

    #[test]
    fn test_instantiation_failure_is_fatal() {
        let err = AttributeMapper::<Unbuildable>::new()
            .map_from_attributes(&AttributeSet::new())
            .unwrap_err();
        assert!(matches!(err, MappingError::Instantiation { .. }));
    }

    #[test]
    fn test_unnamed_attribute_fails_at_mapping_time() {
        let mapper = AttributeMapper::<Unnamed>::new();
        assert!(mapper.attribute_names().is_empty());
        assert!(matches!(
            mapper.map_from_attributes(&AttributeSet::new()),
            Err(MappingError::UnnamedAttribute { member: "value", .. })
        ));
        assert!(matches!(
            mapper.map_from_instance(&Unnamed::default()),
            Err(MappingError::UnnamedAttribute { .. })
        ));
    }

    #[test]
    fn test_all_unset_yields_empty_delta() {
        let mapped = AttributeMapper::<Person>::new()
            .map_from_instance(&Person::default())
            .unwrap();
        assert!(mapped.value.is_empty());
        assert!(mapped
            .outcomes
            .iter()
            .all(|o| o.status == MemberStatus::Absent));
    }

    #[test]
    fn test_reverse_mapping_emits_set_members() {
        let person = Person {
            uid: Some("jdoe".into()),
            uid_number: Some(1000),
            enabled: Some(true),
            common_name: Some("John Doe".into()),
            ..Default::default()
        };
        let delta = AttributeMapper::<Person>::new()
            .map_from_instance(&person)
            .unwrap()
            .into_inner();
        let grouped = delta.grouped();
        assert_eq!(grouped["uid"], vec!["jdoe"]);
        assert_eq!(grouped["uidNumber"], vec!["1000"]);
        assert_eq!(grouped["enabled"], vec!["TRUE"]);
        assert_eq!(grouped["cn"], vec!["John Doe"]);
        assert!(!grouped.contains_key("mail"));
    }

    #[test]
    fn test_read_failure_omits_attribute() {
        let mapper = AttributeMapper::<Picky>::new();
        let mapped = mapper
            .map_from_instance(&Picky {
                code: Some("secret".into()),
            })
            .unwrap();
        assert!(mapped.value.is_empty());
        assert_eq!(mapped.failures().count(), 1);
    }

    #[test]
    fn test_attribute_names_cover_fields_and_methods() {
        let names = attribute_names::<Person>();
        assert_eq!(
            names.into_iter().collect::<Vec<_>>(),
            vec!["cn", "enabled", "mail", "uid", "uidNumber"]
        );
        assert_eq!(attribute_names::<Person>(), attribute_names::<Person>());
    }

    #[test]
    fn test_round_trip_keeps_empty_text_and_blank_char() {
        let note = Note {
            text: Some(String::new()),
            initial: Some(' '),
        };
        let mapper = AttributeMapper::<Note>::new();
        let delta = mapper.map_from_instance(&note).unwrap().into_inner();
        assert_eq!(delta.len(), 2);

        let restored = mapper
            .map_from_attributes(&AttributeSet::from(delta))
            .unwrap()
            .into_inner();
        assert_eq!(restored, note);
    }

    fn arb_person() -> impl Strategy<Value = Person> {
        (
            proptest::option::of("[a-z0-9 ]{0,12}"),
            proptest::option::of("([a-z]{1,8}@example\\.com)?"),
            proptest::option::of(any::<u32>()),
            proptest::option::of(any::<bool>()),
            proptest::option::of("[A-Za-z \t]{0,12}"),
        )
            .prop_map(|(uid, mail, uid_number, enabled, common_name)| Person {
                uid,
                mail,
                uid_number,
                enabled,
                common_name,
            })
    }

    proptest! {
        #[test]
        fn prop_round_trip_preserves_notes(
            text in proptest::option::of(".{0,8}"),
            initial in proptest::option::of(any::<char>()),
        ) {
            let note = Note { text, initial };
            let mapper = AttributeMapper::<Note>::new();
            let delta = mapper.map_from_instance(&note).unwrap().into_inner();
            let restored = mapper
                .map_from_attributes(&AttributeSet::from(delta))
                .unwrap()
                .into_inner();
            prop_assert_eq!(restored, note);
        }

        #[test]
        fn prop_round_trip_preserves_set_members(person in arb_person()) {
            let mapper = AttributeMapper::<Person>::new();
            let delta = mapper.map_from_instance(&person).unwrap().into_inner();
            let restored = mapper
                .map_from_attributes(&AttributeSet::from(delta))
                .unwrap()
                .into_inner();
            prop_assert_eq!(restored, person);
        }

        #[test]
        fn prop_only_present_attributes_are_set(
            uid in proptest::option::of("[a-z]{1,8}"),
            mail in proptest::option::of("[a-z]{1,8}@example\\.org"),
        ) {
            let mut attributes = AttributeSet::new();
            if let Some(uid) = &uid {
                attributes.push("uid", uid.clone());
            }
            if let Some(mail) = &mail {
                attributes.push("mail", mail.clone());
            }
            let person = AttributeMapper::<Person>::new()
                .map_from_attributes(&attributes)
                .unwrap()
                .into_inner();
            prop_assert_eq!(person, Person { uid, mail, ..Default::default() });
        }
    }
}
