//! Locality dimension: canonical city/state identity, surrogate keys and
//! the incremental merge that keeps issued keys stable across runs.
//!
//! ```
//! use light_etl::locality::{KeyWidth, Locality, build, merge};
//!
//! let (first, _) = build([("Rio de Janeiro", "RJ"), ("Sao Paulo", "SP")], KeyWidth::DEFAULT_CITY)?;
//! let (second, report) = merge(first.clone(), [Locality::new("Campinas", "SP")])?;
//!
//! assert_eq!(report.new_localities, 1);
//! for (locality, key) in first.iter() {
//!     assert_eq!(second.get(locality), Some(key));
//! }
//! # Ok::<(), light_etl::error::EtlError>(())
//! ```

pub mod dimension;
pub mod enrich;
pub mod keys;
pub mod normalize;
pub mod storage;

pub use dimension::{
    BuildReport, DimensionOrigin, DimensionRow, LoadedDimension, Locality, LocalityDimension,
    MergeOutcome, MergeReport, build, merge, merge_or_build,
};
pub use enrich::{
    CITY_COLUMN, CITY_KEY_COLUMN, COMPOSITE_KEY_COLUMN, EnrichReport, JoinKeys, STATE_COLUMN,
    STATE_KEY_COLUMN, enrich,
};
pub use keys::{KeyAllocator, KeySpace, KeyWidth, LocalityKey};
pub use normalize::{normalize_city, normalize_person_name, normalize_state, strip_diacritics};
pub use storage::{DIMENSION_FILE, DimensionLock, load_dimension, save_dimension};
