//! The locality dimension and the two ways of producing one.
//!
//! [`build`] derives a fresh dimension from raw `(city, state)` records.
//! [`merge`] extends an existing dimension with newly observed localities
//! and never touches a key it has already issued. [`merge_or_build`] is the
//! entry point of an incremental run: it falls back to [`build`] when no
//! dimension has been persisted yet and says so in its outcome.
//!
//! Key allocation order:
//!
//! - states are keyed in lexicographic order of their canonical name;
//! - cities are keyed per locality, in `(city, state)` order, so the same
//!   city name in two states gets two different `id_city` values;
//! - a merge keys only the new values, continuing after the current
//!   maximum, so keys follow first appearance across runs.

use super::keys::{KeyAllocator, KeyWidth, LocalityKey};
use super::normalize::{normalize_city, normalize_state};
use crate::error::{EtlError, Result};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet, HashSet};

/// Canonical city/state identity. Orders by `(state, city)`, which is also
/// the persisted row order.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Locality {
    state: String,
    city: String,
}

impl Locality {
    /// Normalizes both parts. Already-canonical input is returned unchanged.
    pub fn new(city: &str, state: &str) -> Self {
        Self {
            state: normalize_state(state),
            city: normalize_city(city),
        }
    }

    pub fn city(&self) -> &str {
        &self.city
    }

    pub fn state(&self) -> &str {
        &self.state
    }

    /// Localities with an empty city or state never receive a key.
    pub fn is_complete(&self) -> bool {
        !self.city.is_empty() && !self.state.is_empty()
    }
}

/// One persisted row of the dimension.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DimensionRow {
    pub locality: Locality,
    pub key: LocalityKey,
}

/// The persisted lookup table from canonical localities to surrogate keys.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LocalityDimension {
    city_width: KeyWidth,
    rows: BTreeMap<Locality, LocalityKey>,
}

impl LocalityDimension {
    /// Creates an empty dimension whose city keys use `city_width` digits.
    pub fn new(city_width: KeyWidth) -> Self {
        Self {
            city_width,
            rows: BTreeMap::new(),
        }
    }

    /// Rebuilds a dimension from persisted rows, checking every invariant
    /// a merge relies on.
    ///
    /// # Errors
    ///
    /// Returns [`EtlError::CorruptDimension`] for empty or duplicate
    /// localities and for malformed or reused keys. Keys of a different width than
    /// `city_width` are reported as [`EtlError::Config`], since the width
    /// of a dimension cannot change over its lifetime.
    pub fn from_rows<I>(city_width: KeyWidth, rows: I) -> Result<Self>
    where
        I: IntoIterator<Item = DimensionRow>,
    {
        let mut dimension = Self::new(city_width);
        let mut city_ids = HashSet::new();
        let mut state_ids: BTreeMap<String, String> = BTreeMap::new();

        for DimensionRow { locality, key } in rows {
            if !locality.is_complete() {
                return Err(EtlError::CorruptDimension(format!(
                    "row with empty city or state (city '{}', state '{}')",
                    locality.city, locality.state
                )));
            }
            if key.id_city().len() != city_width.digits() {
                return Err(EtlError::Config(format!(
                    "persisted city keys have {} digits but {} are configured",
                    key.id_city().len(),
                    city_width.digits()
                )));
            }
            if city_width.parse(key.id_city()).is_none()
                || KeyWidth::STATE.parse(key.id_state()).is_none()
            {
                return Err(EtlError::CorruptDimension(format!(
                    "malformed key '{}'/'{}' for {}/{}",
                    key.id_city(),
                    key.id_state(),
                    locality.city,
                    locality.state
                )));
            }
            if !city_ids.insert(key.id_city().to_owned()) {
                return Err(EtlError::CorruptDimension(format!(
                    "city key {} is assigned twice",
                    key.id_city()
                )));
            }
            match state_ids.get(locality.state()) {
                Some(id) if id != key.id_state() => {
                    return Err(EtlError::CorruptDimension(format!(
                        "state {} has keys {} and {}",
                        locality.state,
                        id,
                        key.id_state()
                    )));
                }
                Some(_) => {}
                None => {
                    if state_ids.values().any(|id| id == key.id_state()) {
                        return Err(EtlError::CorruptDimension(format!(
                            "state key {} is shared by different states",
                            key.id_state()
                        )));
                    }
                    state_ids.insert(locality.state.clone(), key.id_state().to_owned());
                }
            }
            if dimension.rows.contains_key(&locality) {
                return Err(EtlError::CorruptDimension(format!(
                    "locality {}/{} appears twice",
                    locality.city, locality.state
                )));
            }
            dimension.rows.insert(locality, key);
        }

        Ok(dimension)
    }

    pub fn city_width(&self) -> KeyWidth {
        self.city_width
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn get(&self, locality: &Locality) -> Option<&LocalityKey> {
        self.rows.get(locality)
    }

    pub fn contains(&self, locality: &Locality) -> bool {
        self.rows.contains_key(locality)
    }

    /// Rows in persisted order, `(state, city)`.
    pub fn iter(&self) -> impl Iterator<Item = (&Locality, &LocalityKey)> {
        self.rows.iter()
    }

    /// Key of every canonical state present in the dimension.
    pub fn state_keys(&self) -> BTreeMap<&str, &str> {
        self.rows
            .iter()
            .map(|(locality, key)| (locality.state(), key.id_state()))
            .collect()
    }

    pub fn state_key(&self, canonical_state: &str) -> Option<&str> {
        self.rows
            .iter()
            .find(|(locality, _)| locality.state() == canonical_state)
            .map(|(_, key)| key.id_state())
    }

    pub fn state_count(&self) -> usize {
        self.state_keys().len()
    }

    pub fn max_city_id(&self) -> u32 {
        self.rows
            .values()
            .filter_map(|key| self.city_width.parse(key.id_city()))
            .max()
            .unwrap_or(0)
    }

    pub fn max_state_id(&self) -> u32 {
        self.rows
            .values()
            .filter_map(|key| KeyWidth::STATE.parse(key.id_state()))
            .max()
            .unwrap_or(0)
    }

    /// Keys `fresh` localities after the current maxima, leaving every
    /// existing row as it is. Returns the new dimension and how many states
    /// were new.
    fn append(&self, fresh: &BTreeSet<Locality>) -> Result<(Self, usize)> {
        let known_states = self.state_keys();

        let new_states: BTreeSet<&str> = fresh
            .iter()
            .map(Locality::state)
            .filter(|state| !known_states.contains_key(state))
            .collect();
        let new_state_count = new_states.len();

        let state_ids = KeyAllocator::states().allocate(self.max_state_id(), new_states)?;
        let city_ids = KeyAllocator::cities(self.city_width).allocate(
            self.max_city_id(),
            fresh.iter().map(|locality| (locality.city(), locality.state())),
        )?;

        let mut rows = self.rows.clone();
        for ((city, state), id_city) in city_ids {
            let id_state = known_states
                .get(state)
                .copied()
                .or_else(|| state_ids.get(state).map(String::as_str))
                .ok_or_else(|| EtlError::Other(format!("no key allocated for state {state}")))?;
            rows.insert(
                Locality {
                    state: state.to_owned(),
                    city: city.to_owned(),
                },
                LocalityKey::new(id_city, id_state),
            );
        }

        Ok((
            Self {
                city_width: self.city_width,
                rows,
            },
            new_state_count,
        ))
    }
}

/// Counters from a fresh build.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BuildReport {
    pub records_seen: usize,
    /// Records whose canonical city or state was empty.
    pub skipped_rows: usize,
    pub localities: usize,
    pub states: usize,
}

/// Counters from an incremental merge.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MergeReport {
    pub rows_before: usize,
    pub rows_after: usize,
    /// Distinct incoming localities that were already keyed.
    pub already_known: usize,
    pub new_localities: usize,
    pub new_states: usize,
    pub skipped_rows: usize,
}

impl From<BuildReport> for MergeReport {
    fn from(report: BuildReport) -> Self {
        Self {
            rows_before: 0,
            rows_after: report.localities,
            already_known: 0,
            new_localities: report.localities,
            new_states: report.states,
            skipped_rows: report.skipped_rows,
        }
    }
}

/// Builds a dimension from scratch.
///
/// ```
/// use light_etl::locality::{build, KeyWidth, Locality};
///
/// let records = [("Sao Paulo", "SP"), ("Rio de Janeiro", "RJ"), ("sao paulo", "sp")];
/// let (dimension, report) = build(records, KeyWidth::DEFAULT_CITY)?;
///
/// assert_eq!(dimension.len(), 2);
/// let key = dimension.get(&Locality::new("São Paulo", "SP")).unwrap();
/// assert_eq!(key.id_composite(), "000202");
/// assert_eq!(report.skipped_rows, 0);
/// # Ok::<(), light_etl::error::EtlError>(())
/// ```
///
/// # Errors
///
/// Returns `KeyWidthExceeded` if there are more distinct localities or
/// states than the key widths can hold.
pub fn build<I, C, S>(records: I, city_width: KeyWidth) -> Result<(LocalityDimension, BuildReport)>
where
    I: IntoIterator<Item = (C, S)>,
    C: AsRef<str>,
    S: AsRef<str>,
{
    let mut report = BuildReport::default();
    let mut localities = BTreeSet::new();

    for (city, state) in records {
        report.records_seen += 1;
        let locality = Locality::new(city.as_ref(), state.as_ref());
        if locality.is_complete() {
            localities.insert(locality);
        } else {
            report.skipped_rows += 1;
        }
    }

    let (dimension, states) = LocalityDimension::new(city_width).append(&localities)?;
    report.localities = dimension.len();
    report.states = states;

    if report.skipped_rows > 0 {
        tracing::warn!(
            skipped = report.skipped_rows,
            "Records without city or state were left out of the dimension"
        );
    }
    tracing::debug!(
        localities = report.localities,
        states = report.states,
        "Built locality dimension"
    );

    Ok((dimension, report))
}

/// Extends `existing` with the localities it does not know yet.
///
/// Existing rows keep their keys byte for byte. When nothing is new the
/// dimension is returned unchanged.
///
/// # Errors
///
/// Returns `KeyWidthExceeded` if the new localities do not fit the
/// remaining key space; `existing` is not modified in that case.
pub fn merge<I>(existing: LocalityDimension, incoming: I) -> Result<(LocalityDimension, MergeReport)>
where
    I: IntoIterator<Item = Locality>,
{
    let mut report = MergeReport {
        rows_before: existing.len(),
        ..MergeReport::default()
    };

    let mut known = BTreeSet::new();
    let mut fresh = BTreeSet::new();
    for locality in incoming {
        // Re-normalizing is a no-op for canonical input.
        let locality = Locality::new(locality.city(), locality.state());
        if !locality.is_complete() {
            report.skipped_rows += 1;
        } else if existing.contains(&locality) {
            known.insert(locality);
        } else {
            fresh.insert(locality);
        }
    }
    report.already_known = known.len();

    if report.skipped_rows > 0 {
        tracing::warn!(
            skipped = report.skipped_rows,
            "Localities without city or state were left out of the merge"
        );
    }

    if fresh.is_empty() {
        report.rows_after = existing.len();
        return Ok((existing, report));
    }

    let (merged, new_states) = existing.append(&fresh)?;
    report.new_localities = fresh.len();
    report.new_states = new_states;
    report.rows_after = merged.len();

    tracing::info!(
        new_localities = report.new_localities,
        new_states = report.new_states,
        rows = report.rows_after,
        "Merged new localities into dimension"
    );

    Ok((merged, report))
}

/// A dimension as found in persisted storage at the start of a run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LoadedDimension {
    Present(LocalityDimension),
    Absent,
}

/// How the dimension of a run came to be.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DimensionOrigin {
    /// Fresh build requested explicitly.
    Built,
    /// Existing dimension extended in place.
    Merged,
    /// No persisted dimension was found, so the merge ran as a build.
    BuiltFromMissing,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct MergeOutcome {
    pub origin: DimensionOrigin,
    pub report: MergeReport,
}

/// Incremental entry point: merge into the loaded dimension, or build from
/// `incoming` alone when there is none.
///
/// # Errors
///
/// Propagates `KeyWidthExceeded` from allocation.
pub fn merge_or_build<I>(
    loaded: LoadedDimension,
    incoming: I,
    city_width: KeyWidth,
) -> Result<(LocalityDimension, MergeOutcome)>
where
    I: IntoIterator<Item = Locality>,
{
    match loaded {
        LoadedDimension::Present(existing) => {
            let (dimension, report) = merge(existing, incoming)?;
            Ok((
                dimension,
                MergeOutcome {
                    origin: DimensionOrigin::Merged,
                    report,
                },
            ))
        }
        LoadedDimension::Absent => {
            tracing::warn!("No persisted locality dimension found, building a new one");
            let records = incoming
                .into_iter()
                .map(|locality| (locality.city, locality.state));
            let (dimension, report) = build(records, city_width)?;
            Ok((
                dimension,
                MergeOutcome {
                    origin: DimensionOrigin::BuiltFromMissing,
                    report: report.into(),
                },
            ))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use anyhow::Result;
    use std::sync::{Arc, Mutex};

    /// Collects formatted log output in memory.
    #[derive(Clone, Default)]
    struct CapturedLogs(Arc<Mutex<Vec<u8>>>);

    impl CapturedLogs {
        fn text(&self) -> String {
            String::from_utf8_lossy(&self.0.lock().unwrap()).into_owned()
        }
    }

    impl std::io::Write for CapturedLogs {
        fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
            self.0.lock().unwrap().extend_from_slice(buf);
            Ok(buf.len())
        }

        fn flush(&mut self) -> std::io::Result<()> {
            Ok(())
        }
    }

    fn key_of<'a>(dimension: &'a LocalityDimension, city: &str, state: &str) -> &'a LocalityKey {
        dimension
            .get(&Locality::new(city, state))
            .unwrap_or_else(|| panic!("{city}/{state} should be in the dimension"))
    }

    fn sao_paulo_only() -> Result<LocalityDimension> {
        Ok(LocalityDimension::from_rows(
            KeyWidth::DEFAULT_CITY,
            [DimensionRow {
                locality: Locality::new("SAO PAULO", "SP"),
                key: LocalityKey::new("0001", "01"),
            }],
        )?)
    }

    fn assert_dense(dimension: &LocalityDimension) {
        let mut city_ids: Vec<u32> = dimension
            .iter()
            .filter_map(|(_, key)| dimension.city_width().parse(key.id_city()))
            .collect();
        city_ids.sort_unstable();
        let expected: Vec<u32> = (1..=u32::try_from(dimension.len()).unwrap_or(0)).collect();
        assert_eq!(city_ids, expected, "city ids must be exactly 1..=N");

        let mut state_ids: Vec<u32> = dimension
            .state_keys()
            .values()
            .filter_map(|id| KeyWidth::STATE.parse(id))
            .collect();
        state_ids.sort_unstable();
        let expected: Vec<u32> = (1..=u32::try_from(dimension.state_count()).unwrap_or(0)).collect();
        assert_eq!(state_ids, expected, "state ids must be exactly 1..=S");
    }

    #[test]
    fn test_build_scenario_dedupes_and_sorts() -> Result<()> {
        let records = [
            ("Sao Paulo", "SP"),
            ("Rio de Janeiro", "RJ"),
            ("sao paulo", "sp"),
        ];
        let (dimension, report) = build(records, KeyWidth::DEFAULT_CITY)?;

        assert_eq!(dimension.len(), 2);
        assert_eq!(report.records_seen, 3);
        assert_eq!(report.states, 2);

        let rio = key_of(&dimension, "Rio de Janeiro", "RJ");
        let sp = key_of(&dimension, "Sao Paulo", "SP");
        assert_eq!((rio.id_city(), rio.id_state()), ("0001", "01"));
        assert_eq!((sp.id_city(), sp.id_state()), ("0002", "02"));
        for (_, key) in dimension.iter() {
            assert_eq!(key.id_composite().len(), 6);
            assert_eq!(key.id_composite(), format!("{}{}", key.id_city(), key.id_state()));
        }
        Ok(())
    }

    #[test]
    fn test_build_skips_incomplete_records() -> Result<()> {
        let records = [("Recife", "PE"), ("", "PE"), ("Olinda", "  "), (" ", "")];
        let (dimension, report) = build(records, KeyWidth::DEFAULT_CITY)?;
        assert_eq!(dimension.len(), 1);
        assert_eq!(report.skipped_rows, 3);
        Ok(())
    }

    #[test]
    fn test_build_rows_sorted_by_state_then_city() -> Result<()> {
        let records = [("Santos", "SP"), ("Betim", "MG"), ("Campinas", "SP"), ("Angra", "RJ")];
        let (dimension, _) = build(records, KeyWidth::DEFAULT_CITY)?;
        let order: Vec<(&str, &str)> = dimension
            .iter()
            .map(|(locality, _)| (locality.state(), locality.city()))
            .collect();
        assert_eq!(
            order,
            vec![("MG", "BETIM"), ("RJ", "ANGRA"), ("SP", "CAMPINAS"), ("SP", "SANTOS")]
        );
        Ok(())
    }

    #[test]
    fn test_homonymous_cities_get_distinct_city_keys() -> Result<()> {
        let records = [("Bom Jesus", "PI"), ("Bom Jesus", "RS"), ("Bom Jesus", "SC")];
        let (dimension, _) = build(records, KeyWidth::DEFAULT_CITY)?;
        assert_eq!(key_of(&dimension, "Bom Jesus", "PI").id_city(), "0001");
        assert_eq!(key_of(&dimension, "Bom Jesus", "RS").id_city(), "0002");
        assert_eq!(key_of(&dimension, "Bom Jesus", "SC").id_city(), "0003");
        assert_dense(&dimension);
        Ok(())
    }

    #[test]
    fn test_merge_scenario_reuses_state_key() -> Result<()> {
        let existing = sao_paulo_only()?;
        let before = key_of(&existing, "SAO PAULO", "SP").clone();

        let (merged, report) = merge(existing, [Locality::new("Campinas", "SP")])?;

        let campinas = key_of(&merged, "Campinas", "SP");
        assert_eq!(campinas.id_city(), "0002");
        assert_eq!(campinas.id_state(), "01");
        assert_eq!(campinas.id_composite(), "000201");
        assert_eq!(key_of(&merged, "SAO PAULO", "SP"), &before);
        assert_eq!(report.new_localities, 1);
        assert_eq!(report.new_states, 0);
        Ok(())
    }

    #[test]
    fn test_merge_known_locality_is_a_no_op() -> Result<()> {
        let (dimension, _) = build(
            [("Recife", "PE"), ("Natal", "RN"), ("Olinda", "PE")],
            KeyWidth::DEFAULT_CITY,
        )?;

        for (locality, _) in dimension.clone().iter() {
            let (merged, report) = merge(dimension.clone(), [locality.clone()])?;
            assert_eq!(merged, dimension);
            assert_eq!(report.already_known, 1);
            assert_eq!(report.new_localities, 0);
        }

        let (merged, _) = merge(dimension.clone(), [Locality::new(" recife ", "pe")])?;
        assert_eq!(merged, dimension);
        Ok(())
    }

    #[test]
    fn test_merge_appends_in_arrival_order_not_alphabetical() -> Result<()> {
        let (first, _) = build([("Zortea", "SC")], KeyWidth::DEFAULT_CITY)?;
        let (second, _) = merge(first, [Locality::new("Abelardo Luz", "SC")])?;
        assert_eq!(key_of(&second, "Zortea", "SC").id_city(), "0001");
        assert_eq!(key_of(&second, "Abelardo Luz", "SC").id_city(), "0002");
        Ok(())
    }

    #[test]
    fn test_merge_new_state_continues_state_keys() -> Result<()> {
        let (first, _) = build([("Recife", "PE"), ("Salvador", "BA")], KeyWidth::DEFAULT_CITY)?;
        assert_eq!(first.state_key("BA"), Some("01"));
        assert_eq!(first.state_key("PE"), Some("02"));

        let incoming = [
            Locality::new("Aracaju", "SE"),
            Locality::new("Maceio", "AL"),
            Locality::new("Feira de Santana", "BA"),
        ];
        let (merged, report) = merge(first, incoming)?;

        assert_eq!(report.new_states, 2);
        assert_eq!(merged.state_key("AL"), Some("03"));
        assert_eq!(merged.state_key("SE"), Some("04"));
        assert_eq!(key_of(&merged, "Feira de Santana", "BA").id_state(), "01");
        // New cities are keyed in (city, state) order after the old maximum.
        assert_eq!(key_of(&merged, "Aracaju", "SE").id_city(), "0003");
        assert_eq!(key_of(&merged, "Feira de Santana", "BA").id_city(), "0004");
        assert_eq!(key_of(&merged, "Maceio", "AL").id_city(), "0005");
        assert_dense(&merged);
        Ok(())
    }

    #[test]
    fn test_merge_keeps_every_existing_row() -> Result<()> {
        let (first, _) = build(
            [("Cuiaba", "MT"), ("Goiania", "GO"), ("Palmas", "TO")],
            KeyWidth::DEFAULT_CITY,
        )?;
        let (second, _) = merge(
            first.clone(),
            [Locality::new("Anapolis", "GO"), Locality::new("Sinop", "MT")],
        )?;
        for (locality, key) in first.iter() {
            assert_eq!(second.get(locality), Some(key));
        }
        assert_eq!(second.len(), 5);
        assert_dense(&second);
        Ok(())
    }

    #[test]
    fn test_merge_counts_skipped_localities() -> Result<()> {
        let existing = sao_paulo_only()?;
        let (merged, report) = merge(existing.clone(), [Locality::new("", "SP")])?;
        assert_eq!(merged, existing);
        assert_eq!(report.skipped_rows, 1);
        Ok(())
    }

    #[test]
    fn test_merge_warns_about_skipped_localities() -> Result<()> {
        let logs = CapturedLogs::default();
        let writer = logs.clone();
        let subscriber = tracing_subscriber::fmt()
            .with_ansi(false)
            .with_max_level(tracing::Level::WARN)
            .with_writer(move || writer.clone())
            .finish();

        let existing = sao_paulo_only()?;
        let incoming = [
            Locality::new("Campinas", ""),
            Locality::new("", "RJ"),
            Locality::new("Santos", "SP"),
        ];
        let (merged, report) =
            tracing::subscriber::with_default(subscriber, || merge(existing, incoming))?;

        assert_eq!(report.skipped_rows, 2);
        assert_eq!(report.new_localities, 1);
        assert_eq!(merged.len(), 2);
        let text = logs.text();
        assert!(text.contains("WARN"), "{text}");
        assert!(text.contains("skipped=2"), "{text}");
        Ok(())
    }

    #[test]
    fn test_merge_overflow_leaves_input_untouched() -> Result<()> {
        let width = KeyWidth::new(1)?;
        let (full, _) = build(
            ["A", "B", "C", "D", "E", "F", "G", "H", "I"].map(|city| (city, "XX")),
            width,
        )?;
        let result = merge(full.clone(), [Locality::new("J", "XX")]);
        assert!(matches!(result, Err(EtlError::KeyWidthExceeded { .. })));
        assert_eq!(full.len(), 9);
        Ok(())
    }

    #[test]
    fn test_missing_dimension_falls_back_to_build() -> Result<()> {
        let incoming = [Locality::new("Belo Horizonte", "MG")];
        let (dimension, outcome) =
            merge_or_build(LoadedDimension::Absent, incoming, KeyWidth::DEFAULT_CITY)?;

        let (expected, _) = build([("Belo Horizonte", "MG")], KeyWidth::DEFAULT_CITY)?;
        assert_eq!(dimension, expected);
        assert_eq!(dimension.len(), 1);
        assert_eq!(outcome.origin, DimensionOrigin::BuiltFromMissing);
        assert_eq!(outcome.report.new_localities, 1);
        Ok(())
    }

    #[test]
    fn test_present_dimension_is_merged() -> Result<()> {
        let existing = sao_paulo_only()?;
        let (dimension, outcome) = merge_or_build(
            LoadedDimension::Present(existing),
            [Locality::new("Sao Paulo", "SP")],
            KeyWidth::DEFAULT_CITY,
        )?;
        assert_eq!(outcome.origin, DimensionOrigin::Merged);
        assert_eq!(outcome.report.already_known, 1);
        assert_eq!(dimension.len(), 1);
        Ok(())
    }

    #[test]
    fn test_from_rows_rejects_conflicting_state_keys() {
        let rows = [
            DimensionRow {
                locality: Locality::new("Recife", "PE"),
                key: LocalityKey::new("0001", "01"),
            },
            DimensionRow {
                locality: Locality::new("Olinda", "PE"),
                key: LocalityKey::new("0002", "02"),
            },
        ];
        assert!(matches!(
            LocalityDimension::from_rows(KeyWidth::DEFAULT_CITY, rows),
            Err(EtlError::CorruptDimension(_))
        ));
    }

    #[test]
    fn test_from_rows_rejects_reused_city_key() {
        let rows = [
            DimensionRow {
                locality: Locality::new("Recife", "PE"),
                key: LocalityKey::new("0001", "01"),
            },
            DimensionRow {
                locality: Locality::new("Natal", "RN"),
                key: LocalityKey::new("0001", "02"),
            },
        ];
        assert!(matches!(
            LocalityDimension::from_rows(KeyWidth::DEFAULT_CITY, rows),
            Err(EtlError::CorruptDimension(_))
        ));
    }

    #[test]
    fn test_from_rows_rejects_other_width() -> Result<()> {
        let rows = [DimensionRow {
            locality: Locality::new("Recife", "PE"),
            key: LocalityKey::new("001", "01"),
        }];
        assert!(matches!(
            LocalityDimension::from_rows(KeyWidth::DEFAULT_CITY, rows.clone()),
            Err(EtlError::Config(_))
        ));
        assert!(LocalityDimension::from_rows(KeyWidth::new(3)?, rows).is_ok());
        Ok(())
    }
}
