//! Catalog data model
//!
//! A crawl produces one [`CollectionRecord`] per release page. Each record
//! nests its [`TrackRecord`]s, and each track its [`Contributor`]s. Field
//! names serialize in camelCase so records round-trip through the exported
//! JSON document unchanged.

mod collection;
mod track;

pub use collection::{collection_id_from_url, CollectionRecord, ItemLink};
pub use track::{Contributor, TrackKey, TrackList, TrackRecord, RIGHTS_HOLDER_ROLE};
