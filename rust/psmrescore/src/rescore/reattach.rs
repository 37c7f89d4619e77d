//! Restores the features the classifier drops from its output.

use super::method::MethodProfile;
use crate::columns;
use crate::config::PipelineConfig;
use crate::errors::{
    RescoreError,
    Result,
};
use crate::identifiers::MatchIdentifier;
use crate::table::Table;
use std::collections::HashMap;
use tracing::debug;

pub const UNKNOWN_STRATUM: &str = "unknown";

fn is_set(cell: &str) -> bool {
    cell.trim().parse::<f64>().is_ok_and(|v| v == 1.0)
}

/// Recovers the stratum name of every row from its `accession_<name>`
/// one-hot columns.
///
/// The first column (in table order) holding a 1 wins; rows with no bit set
/// get [`UNKNOWN_STRATUM`].
pub fn decode_accession_strata(table: &Table) -> Vec<String> {
    let one_hot: Vec<(usize, &str)> = table
        .columns()
        .iter()
        .enumerate()
        .filter_map(|(i, c)| {
            c.strip_prefix(columns::ACCESSION_ONE_HOT_PREFIX)
                .map(|name| (i, name))
        })
        .collect();

    table
        .rows()
        .iter()
        .map(|row| {
            one_hot
                .iter()
                .find(|(i, _)| is_set(&row[*i]))
                .map_or(UNKNOWN_STRATUM, |(_, name)| *name)
                .to_string()
        })
        .collect()
}

/// One-hot encodes the integer `accessionGroup` column into
/// `accession_<hierarchy[code]>` columns.
///
/// Codes outside the hierarchy (or missing) set no bit.
pub fn encode_accession_strata(table: &mut Table, hierarchy: &[String]) -> Result<()> {
    let codes = table
        .parse_optional_column::<i64>(columns::ACCESSION_STRATUM)?
        .ok_or_else(|| RescoreError::missing_column(columns::ACCESSION_STRATUM, "encoding accession strata"))?;

    for (i, name) in hierarchy.iter().enumerate() {
        let bits = codes
            .iter()
            .map(|code| if *code == Some(i as i64) { "1" } else { "0" }.to_string())
            .collect();
        table.set_column(&format!("{}{}", columns::ACCESSION_ONE_HOT_PREFIX, name), bits)?;
    }
    Ok(())
}

/// Replaces the identifier column by `source`, `scan` and `modifiedSequence`.
///
/// Fails on the first identifier that does not decompose.
pub fn split_identifier_columns(table: &mut Table, identifier_column: &str) -> Result<()> {
    let identifiers = table
        .column(identifier_column)?
        .into_iter()
        .map(MatchIdentifier::parse)
        .collect::<Result<Vec<_>>>()?;

    let mut sources = Vec::with_capacity(identifiers.len());
    let mut scans = Vec::with_capacity(identifiers.len());
    let mut sequences = Vec::with_capacity(identifiers.len());
    for id in identifiers {
        sources.push(id.source);
        scans.push(id.scan.to_string());
        sequences.push(id.modified_sequence);
    }

    table.set_column(columns::MODIFIED_SEQUENCE, sequences)?;
    table.set_column(columns::SCAN, scans)?;
    table.set_column(columns::SOURCE, sources)?;
    table.drop_column(identifier_column)
}

/// Names of the features reattached under `config`, in output order.
pub fn key_features(config: &PipelineConfig) -> Vec<String> {
    let mut features: Vec<String> = columns::KEY_FEATURES.iter().map(|f| f.to_string()).collect();
    if config.use_accession_stratum {
        features.push(columns::ACCESSION_STRATUM.to_string());
    }
    if config.uses_multiple_collision_energies() {
        features.push(columns::COLLISION_ENERGY.to_string());
    }
    features
}

/// Inner joins the classifier output with the full feature table on
/// (identifier, peptide) and decomposes the identifier.
///
/// Classifier rows with no matching features are dropped; the output never
/// has more rows than `classifier_output` and keeps its row order. Returns
/// the enriched table and the names of the reattached features.
#[tracing::instrument(skip_all, level = "debug")]
pub fn reattach(
    classifier_output: &Table,
    all_features: &Table,
    config: &PipelineConfig,
    profile: &MethodProfile,
) -> Result<(Table, Vec<String>)> {
    let id_column = profile.identifier;
    let mut features = all_features.clone();
    let removed = features.dedup_by_columns(&[id_column, columns::PEPTIDE])?;
    if removed > 0 {
        debug!("Dropped {} duplicated feature rows", removed);
    }

    if config.use_accession_stratum {
        let strata = decode_accession_strata(&features);
        features.set_column(columns::ACCESSION_STRATUM, strata)?;
    }

    let key_features = key_features(config);
    let context = "reattaching features";
    let feature_idx = key_features
        .iter()
        .map(|f| features.require_column(f, context))
        .collect::<Result<Vec<_>>>()?;

    let f_id = features.require_column(id_column, context)?;
    let f_pep = features.require_column(columns::PEPTIDE, context)?;
    let lookup: HashMap<(&str, &str), usize> = features
        .rows()
        .iter()
        .enumerate()
        .map(|(i, row)| ((row[f_id].as_str(), row[f_pep].as_str()), i))
        .collect();

    let c_id = classifier_output.require_column(id_column, context)?;
    let c_pep = classifier_output.require_column(columns::PEPTIDE, context)?;

    // Reattached values win over same-named classifier columns.
    let kept: Vec<usize> = classifier_output
        .columns()
        .iter()
        .enumerate()
        .filter(|(_, c)| !key_features.contains(*c))
        .map(|(i, _)| i)
        .collect();

    let mut joined = Table::new(
        kept.iter()
            .map(|&i| classifier_output.columns()[i].clone())
            .chain(key_features.iter().cloned()),
    );
    let mut missed = 0;
    for row in classifier_output.rows() {
        let Some(&f_row) = lookup.get(&(row[c_id].as_str(), row[c_pep].as_str())) else {
            missed += 1;
            continue;
        };
        let f_row = &features.rows()[f_row];
        joined.push_row(
            kept.iter()
                .map(|&i| row[i].clone())
                .chain(feature_idx.iter().map(|&i| f_row[i].clone()))
                .collect(),
        )?;
    }
    if missed > 0 {
        debug!("{} classifier rows had no matching features", missed);
    }

    split_identifier_columns(&mut joined, id_column)?;
    Ok((joined, key_features))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::rescore::RescoreMethod;

    fn table(columns: &[&str], rows: &[&[&str]]) -> Table {
        let mut t = Table::new(columns.iter().copied());
        for r in rows {
            t.push_row(r.iter().map(|s| s.to_string()).collect()).unwrap();
        }
        t
    }

    #[test]
    fn test_decode_accession() {
        let t = table(
            &["accession_A", "accession_B", "accession_C"],
            &[&["0", "1", "0"], &["0", "0", "0"], &["1.0", "0", "1"]],
        );
        assert_eq!(decode_accession_strata(&t), vec!["B", "unknown", "A"]);
    }

    #[test]
    fn test_encode_then_decode_accession() {
        let mut t = table(&["accessionGroup"], &[&["0"], &["2"], &[""], &["7"]]);
        let hierarchy = vec!["canonical".to_string(), "spliced".to_string(), "cryptic".to_string()];
        encode_accession_strata(&mut t, &hierarchy).unwrap();
        assert_eq!(
            t.columns(),
            &[
                "accessionGroup",
                "accession_canonical",
                "accession_spliced",
                "accession_cryptic"
            ]
        );
        assert_eq!(
            decode_accession_strata(&t),
            vec!["canonical", "cryptic", "unknown", "unknown"]
        );
    }

    #[test]
    fn test_split_identifier_columns() {
        let mut t = table(
            &["SpecId", "score"],
            &[&["SampleA_17_PEPTIDE", "1.0"], &["Sample_A_17_PEPTIDE", "0.5"]],
        );
        split_identifier_columns(&mut t, "SpecId").unwrap();
        assert!(!t.has_column("SpecId"));
        assert_eq!(t.column("source").unwrap(), vec!["SampleA", "Sample_A"]);
        assert_eq!(t.column("scan").unwrap(), vec!["17", "17"]);
        assert_eq!(t.column("modifiedSequence").unwrap(), vec!["PEPTIDE", "PEPTIDE"]);

        let mut bad = table(&["SpecId"], &[&["nounderscore"]]);
        assert!(matches!(
            split_identifier_columns(&mut bad, "SpecId"),
            Err(RescoreError::MalformedIdentifier(_))
        ));
    }

    fn features_table() -> Table {
        let mut names = vec!["SpecId", "peptide", "Label", "accession_A", "accession_B"];
        names.extend(columns::KEY_FEATURES);
        let row = |id: &'static str, pep: &'static str, a: &'static str, b: &'static str, sa: &'static str| {
            vec![id, pep, "1", a, b, sa, "10.0", "0.8", "0.5", "1.2", "30", "2"]
        };
        let rows = [
            row("run1_1_PEPTIDE", "PEPTIDE", "1", "0", "0.9"),
            row("run1_1_PEPTIDE", "PEPTIDE", "1", "0", "0.1"),
            row("run_x_2_SIINFEKL", "SIINFEKL", "0", "1", "0.7"),
            row("run1_3_KLVVVGAG", "KLVVVGAG", "0", "0", "0.6"),
        ];
        let rows: Vec<&[&str]> = rows.iter().map(|r| r.as_slice()).collect();
        table(&names, &rows)
    }

    #[test]
    fn test_reattach_is_inner_join() {
        let classifier = table(
            &["SpecId", "score", "q-value", "posterior_error_prob", "peptide", "proteinIds"],
            &[
                &["run_x_2_SIINFEKL", "3.0", "0.001", "0.01", "SIINFEKL", "P2"],
                &["run1_9_MISSING", "2.5", "0.002", "0.02", "MISSING", "P9"],
                &["run1_1_PEPTIDE", "2.0", "0.003", "0.03", "PEPTIDE", "P1"],
            ],
        );
        let mut config = PipelineConfig::new("out");
        config.use_accession_stratum = true;
        let profile = RescoreMethod::Percolator.profile();

        let (joined, features) = reattach(&classifier, &features_table(), &config, &profile).unwrap();

        assert_eq!(joined.len(), 2);
        assert!(joined.len() <= classifier.len());
        assert_eq!(features.last().unwrap(), "accessionGroup");
        assert_eq!(joined.column("accessionGroup").unwrap(), vec!["B", "A"]);
        assert_eq!(joined.column("source").unwrap(), vec!["run_x", "run1"]);
        // First duplicate wins.
        assert_eq!(joined.column("spectralAngle").unwrap(), vec!["0.7", "0.9"]);
        assert!(!joined.has_column("SpecId"));
    }

    #[test]
    fn test_reattach_collision_energy_when_multiple() {
        let mut config = PipelineConfig::new("out");
        assert!(!key_features(&config).contains(&"collisionEnergy".to_string()));
        config.collision_energy = Some(crate::CollisionEnergy::Multiple(vec![28.0, 34.0]));
        assert_eq!(key_features(&config).last().unwrap(), "collisionEnergy");
    }
}
