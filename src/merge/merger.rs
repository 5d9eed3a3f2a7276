use crate::merge::error::MergeError;
use log::debug;
use polars::prelude::*;

fn require_keys(frame: &mut LazyFrame, keys: &[&str], index: usize) -> Result<(), MergeError> {
    let schema = frame.collect_schema()?;
    match keys.iter().find(|key| schema.get(key).is_none()) {
        Some(key) => Err(MergeError::MissingKey {
            key: key.to_string(),
            index,
        }),
        None => Ok(()),
    }
}

/// Full outer join of `sources` on `keys`, left to right.
///
/// Key columns are coalesced so every key appears once. Afterwards rows with
/// a null in any key are dropped and rows sharing a key collapse into one,
/// each column taking its first non-null value.
pub fn merge(sources: Vec<LazyFrame>, keys: &[&str]) -> Result<LazyFrame, MergeError> {
    if keys.is_empty() {
        return Err(MergeError::NoKeys);
    }
    let mut sources = sources.into_iter().enumerate();
    let (_, mut merged) = sources.next().ok_or(MergeError::NoSources)?;
    require_keys(&mut merged, keys, 0)?;

    let on: Vec<Expr> = keys.iter().map(|key| col(*key)).collect();
    for (index, mut source) in sources {
        require_keys(&mut source, keys, index)?;
        debug!("Joining source #{} on {:?}", index, keys);
        merged = merged.join(
            source,
            on.clone(),
            on.clone(),
            JoinArgs::new(JoinType::Full).with_coalesce(JoinCoalesce::CoalesceColumns),
        );
    }

    let complete_keys = keys
        .iter()
        .map(|key| col(*key).is_not_null())
        .reduce(|all, next| all.and(next))
        .unwrap_or_else(|| lit(true));
    Ok(merged
        .filter(complete_keys)
        .group_by_stable(on)
        .agg([all().drop_nulls().first()]))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn literacy() -> LazyFrame {
        df! {
            "Country" => ["Spain", "Spain", "France"],
            "Code" => ["ESP", "ESP", "FRA"],
            "Year" => [2000i16, 2001, 2000],
            "Literacy" => [97.5, 97.9, 99.0],
        }
        .unwrap()
        .lazy()
    }

    fn gdp() -> LazyFrame {
        df! {
            "Country" => [Some("Spain"), Some("Chile"), None],
            "Code" => [Some("ESP"), Some("CHL"), Some("XXX")],
            "Year" => [2000i16, 2000, 2000],
            "GDP" => [24_000.0, 9_000.0, 1.0],
        }
        .unwrap()
        .lazy()
    }

    #[test]
    fn test_full_join_keeps_rows_from_both_sides() -> Result<(), MergeError> {
        let merged = merge(vec![literacy(), gdp()], &["Country", "Code", "Year"])?
            .sort(["Country", "Year"], SortMultipleOptions::default())
            .collect()?;

        let names: Vec<&str> = merged.get_column_names().iter().map(|n| n.as_str()).collect();
        assert_eq!(names, vec!["Country", "Code", "Year", "Literacy", "GDP"]);
        // Chile, France, Spain 2000, Spain 2001; the null-country row is gone
        assert_eq!(merged.height(), 4);

        let countries = merged.column("Country")?.str()?;
        assert_eq!(countries.get(0), Some("Chile"));
        let literacy = merged.column("Literacy")?.f64()?;
        assert_eq!(literacy.get(0), None);
        let gdp = merged.column("GDP")?.f64()?;
        assert_eq!(gdp.get(2), Some(24_000.0));
        assert_eq!(gdp.get(3), None);
        Ok(())
    }

    #[test]
    fn test_duplicate_keys_collapse_to_one_row() -> Result<(), MergeError> {
        let doubled = df! {
            "NATCODE" => ["28079", "28079", "08019"],
            "FBUY1900" => [Some(1900.0), Some(1901.0), None],
        }?
        .lazy();
        let merged = merge(vec![doubled], &["NATCODE"])?.collect()?;
        assert_eq!(merged.height(), 2);
        Ok(())
    }

    #[test]
    fn test_rows_sharing_a_key_keep_every_value() -> Result<(), MergeError> {
        // Two stacked layers: each row only fills its own layer's column.
        let layers = df! {
            "NATCODE" => [28079i64, 28079],
            "BUPR1900" => [Some(12.5), None],
            "BUPL1900" => [None, Some(7.0)],
        }?
        .lazy();
        let merged = merge(vec![layers], &["NATCODE"])?.collect()?;

        assert_eq!(merged.height(), 1);
        assert_eq!(merged.column("BUPR1900")?.f64()?.get(0), Some(12.5));
        assert_eq!(merged.column("BUPL1900")?.f64()?.get(0), Some(7.0));
        Ok(())
    }

    #[test]
    fn test_missing_key_is_a_schema_error() {
        let no_year = df! { "Country" => ["Spain"], "Code" => ["ESP"] }.unwrap().lazy();
        let result = merge(vec![literacy(), no_year], &["Country", "Code", "Year"]);
        match result {
            Err(MergeError::MissingKey { key, index }) => {
                assert_eq!(key, "Year");
                assert_eq!(index, 1);
            }
            other => panic!("expected MissingKey, got {:?}", other.map(|_| ())),
        }
    }

    #[test]
    fn test_nothing_to_merge() {
        assert!(matches!(merge(vec![], &["Code"]), Err(MergeError::NoSources)));
        assert!(matches!(merge(vec![literacy()], &[]), Err(MergeError::NoKeys)));
    }
}
