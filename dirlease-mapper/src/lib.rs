// SPDX-License-Identifier: EUPL-1.2 OR MIT

//! Declarative mapping between directory entry attributes and typed records.
//!
//! Types register the attributes they care about once, through
//! [`directory_entry!`] or a hand-written [`DirectoryEntry`] impl. The
//! [`AttributeMapper`] then converts search results into instances and
//! instances back into the values to write.
//!
//! ```
//! use dirlease_mapper::{AttributeMapper, AttributeSet, directory_entry};
//!
//! #[derive(Default)]
//! struct User {
//!     uid: Option<String>,
//!     mail: Option<String>,
//! }
//!
//! directory_entry!(User {
//!     field uid => "uid",
//!     field mail => "mail",
//! });
//!
//! let attributes = AttributeSet::new().with("uid", ["jdoe"]);
//! let user = AttributeMapper::<User>::new()
//!     .map_from_attributes(&attributes)?
//!     .into_inner();
//! assert_eq!(user.uid.as_deref(), Some("jdoe"));
//! assert_eq!(user.mail, None);
//! # Ok::<(), dirlease_mapper::MappingError>(())
//! ```

mod attributes;
mod error;
mod mapper;
mod mapping;
mod value;

pub use attributes::{AttributeChange, AttributeDelta, AttributeSet};
pub use error::{MappingError, MemberError};
pub use mapper::{AttributeMapper, Mapped, MemberOutcome, MemberStatus, attribute_names};
pub use mapping::{DirectoryEntry, EntryMapping, EntryMappingBuilder, Getter, Member, MemberKind, Setter};
pub use value::{FromAttribute, ToAttribute};
