//! Left join of fact tables against the locality dimension.

use super::dimension::{Locality, LocalityDimension};
use super::normalize::normalize_state;
use crate::error::Result;
use crate::tables::io::{put_text_column, text_column};
use polars::prelude::DataFrame;
use serde::{Deserialize, Serialize};

pub const CITY_COLUMN: &str = "cidade";
pub const STATE_COLUMN: &str = "estado";
pub const CITY_KEY_COLUMN: &str = "id_cidade";
pub const STATE_KEY_COLUMN: &str = "id_estado";
pub const COMPOSITE_KEY_COLUMN: &str = "id_cidade_estado";

/// Which columns a fact table is joined on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JoinKeys {
    /// `cidade` + `estado`; attaches all three key columns.
    CityState,
    /// `estado` only; attaches `id_estado`.
    State,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct EnrichReport {
    pub rows: usize,
    pub matched: usize,
    /// Rows left with null keys because their locality is not in the dimension.
    pub unmatched: usize,
}

/// Attaches surrogate key columns to `facts`.
///
/// Rows keep their order and original columns; a row without a matching
/// locality gets null keys and is counted as unmatched.
///
/// # Errors
///
/// Returns [`crate::error::EtlError::MissingColumn`] when a join column is absent.
pub fn enrich(
    mut facts: DataFrame,
    table: &str,
    dimension: &LocalityDimension,
    join: JoinKeys,
) -> Result<(DataFrame, EnrichReport)> {
    let mut report = EnrichReport {
        rows: facts.height(),
        ..EnrichReport::default()
    };

    match join {
        JoinKeys::CityState => {
            let cities = text_column(&facts, table, CITY_COLUMN)?;
            let states = text_column(&facts, table, STATE_COLUMN)?;

            let mut city_ids = Vec::with_capacity(report.rows);
            let mut state_ids = Vec::with_capacity(report.rows);
            let mut composite_ids = Vec::with_capacity(report.rows);
            for (city, state) in cities.iter().zip(&states) {
                let locality = Locality::new(
                    city.as_deref().unwrap_or_default(),
                    state.as_deref().unwrap_or_default(),
                );
                let key = dimension.get(&locality);
                if key.is_some() {
                    report.matched += 1;
                }
                city_ids.push(key.map(|k| k.id_city().to_owned()));
                state_ids.push(key.map(|k| k.id_state().to_owned()));
                composite_ids.push(key.map(|k| k.id_composite().to_owned()));
            }

            put_text_column(&mut facts, CITY_KEY_COLUMN, city_ids)?;
            put_text_column(&mut facts, STATE_KEY_COLUMN, state_ids)?;
            put_text_column(&mut facts, COMPOSITE_KEY_COLUMN, composite_ids)?;
        }
        JoinKeys::State => {
            let state_keys = dimension.state_keys();
            let state_ids: Vec<Option<String>> = text_column(&facts, table, STATE_COLUMN)?
                .iter()
                .map(|state| {
                    let canonical = normalize_state(state.as_deref().unwrap_or_default());
                    state_keys.get(canonical.as_str()).map(|id| (*id).to_owned())
                })
                .collect();
            report.matched = state_ids.iter().filter(|id| id.is_some()).count();
            put_text_column(&mut facts, STATE_KEY_COLUMN, state_ids)?;
        }
    }

    report.unmatched = report.rows - report.matched;
    if report.unmatched > 0 {
        tracing::warn!(
            table,
            unmatched = report.unmatched,
            rows = report.rows,
            "Rows without a matching locality keep null keys"
        );
    }

    Ok((facts, report))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::EtlError;
    use crate::locality::{KeyWidth, build};
    use anyhow::Result;
    use polars::prelude::*;

    fn dimension() -> Result<LocalityDimension> {
        let (dimension, _) = build(
            [("Rio de Janeiro", "RJ"), ("Niteroi", "RJ"), ("Sao Paulo", "SP")],
            KeyWidth::DEFAULT_CITY,
        )?;
        Ok(dimension)
    }

    fn occurrences() -> Result<DataFrame> {
        let df = DataFrame::new(vec![
            Column::from(Series::new(
                "tipo_ocorrencia".into(),
                vec!["queda", "curto", "poste", "queda"],
            )),
            Column::from(Series::new(
                "cidade".into(),
                vec![Some("niterói"), Some("Campinas"), None, Some(" SAO PAULO")],
            )),
            Column::from(Series::new(
                "estado".into(),
                vec![Some("rj"), Some("SP"), Some("RJ"), Some("sp")],
            )),
        ])?;
        Ok(df)
    }

    #[test]
    fn test_city_state_join_is_a_left_join() -> Result<()> {
        let (enriched, report) =
            enrich(occurrences()?, "ocorrencias", &dimension()?, JoinKeys::CityState)?;

        assert_eq!(enriched.height(), 4);
        assert_eq!(report.matched, 2);
        assert_eq!(report.unmatched, 2);
        assert_eq!(
            text_column(&enriched, "o", COMPOSITE_KEY_COLUMN)?,
            vec![Some("000101".to_owned()), None, None, Some("000302".to_owned())]
        );
        assert_eq!(
            text_column(&enriched, "o", "tipo_ocorrencia")?,
            vec![
                Some("queda".to_owned()),
                Some("curto".to_owned()),
                Some("poste".to_owned()),
                Some("queda".to_owned())
            ]
        );
        Ok(())
    }

    #[test]
    fn test_state_join_attaches_state_key_only() -> Result<()> {
        let losses = DataFrame::new(vec![Column::from(Series::new(
            "estado".into(),
            vec!["RJ", "sp", "MG"],
        ))])?;
        let (enriched, report) = enrich(losses, "perdas", &dimension()?, JoinKeys::State)?;

        assert_eq!(report.unmatched, 1);
        assert_eq!(
            text_column(&enriched, "p", STATE_KEY_COLUMN)?,
            vec![Some("01".to_owned()), Some("02".to_owned()), None]
        );
        assert!(!crate::tables::has_column(&enriched, CITY_KEY_COLUMN));
        Ok(())
    }

    #[test]
    fn test_existing_key_columns_are_replaced() -> Result<()> {
        let mut facts = occurrences()?;
        put_text_column(&mut facts, CITY_KEY_COLUMN, vec![Some("9999".to_owned()); 4])?;
        let (enriched, _) = enrich(facts, "o", &dimension()?, JoinKeys::CityState)?;
        assert_eq!(enriched.width(), 6);
        assert_eq!(
            text_column(&enriched, "o", CITY_KEY_COLUMN)?.first().cloned().flatten(),
            Some("0001".to_owned())
        );
        Ok(())
    }

    #[test]
    fn test_missing_join_column_is_an_error() -> Result<()> {
        let facts = DataFrame::new(vec![Column::from(Series::new("valor".into(), vec!["1"]))])?;
        let result = enrich(facts, "medicoes", &dimension()?, JoinKeys::State);
        assert!(matches!(result, Err(EtlError::MissingColumn { .. })));
        Ok(())
    }
}
