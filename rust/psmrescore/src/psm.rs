use crate::columns;
use crate::errors::Result;
use crate::ml::TargetDecoy;
use crate::table::Table;

/// The fields of a PSM row that retention time calibration reads and writes.
#[derive(Debug, Clone, PartialEq)]
pub struct PsmRecord {
    pub source: Option<String>,
    pub peptide: String,
    pub label: TargetDecoy,
    pub spectral_angle: f64,
    /// Observed retention time.
    pub retention_time: f64,
    /// Library indexed retention time, when the library provides one.
    pub irt: Option<f64>,
    /// Accession stratum code, `None` when the table carries no stratum column.
    pub accession_stratum: Option<i64>,
    pub predicted_rt: Option<f64>,
    pub delta_rt: Option<f64>,
}

impl PsmRecord {
    pub fn is_target(&self) -> bool {
        self.label.is_target()
    }

    /// Extracts records from a combined feature table, one per row.
    pub fn from_table(table: &Table) -> Result<Vec<Self>> {
        let context = "extracting PSMs for retention time calibration";
        table.require_column(columns::PEPTIDE, context)?;

        let peptides = table.column(columns::PEPTIDE)?;
        let labels = table.parse_column::<i64>(columns::LABEL)?;
        let spectral_angles = table.parse_column::<f64>(columns::SPECTRAL_ANGLE)?;
        let rts = table.parse_column::<f64>(columns::RETENTION_TIME)?;
        let irts = table.parse_optional_column::<f64>(columns::IRT)?;
        let strata = table.parse_optional_column::<i64>(columns::ACCESSION_STRATUM)?;
        let sources = table.column(columns::SOURCE).ok();

        Ok((0..table.len())
            .map(|i| PsmRecord {
                source: sources.as_ref().map(|s| s[i].to_string()),
                peptide: peptides[i].to_string(),
                label: TargetDecoy::from_label(labels[i]),
                spectral_angle: spectral_angles[i],
                retention_time: rts[i],
                irt: irts.as_ref().and_then(|v| v[i]),
                accession_stratum: strata.as_ref().and_then(|v| v[i]),
                predicted_rt: None,
                delta_rt: None,
            })
            .collect())
    }

    /// Writes `predRT` and `deltaRT` back onto the table the records came from.
    ///
    /// Missing predictions are written as empty cells.
    pub fn write_to_table(records: &[Self], table: &mut Table) -> Result<()> {
        let fmt = |v: Option<f64>| v.map(|x| x.to_string()).unwrap_or_default();
        table.set_column(
            columns::PREDICTED_RT,
            records.iter().map(|r| fmt(r.predicted_rt)).collect(),
        )?;
        table.set_column(
            columns::DELTA_RT,
            records.iter().map(|r| fmt(r.delta_rt)).collect(),
        )?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_from_table_optional_columns() {
        let text = "peptide\tLabel\tspectralAngle\tretentionTime\tiRT\n\
                    PEPTIDE\t1\t0.9\t12.5\t30.1\n\
                    SIINFEKL\t-1\t0.2\t20.0\t\n";
        let table = Table::from_reader(text.as_bytes(), b'\t').unwrap();
        let records = PsmRecord::from_table(&table).unwrap();
        assert_eq!(records.len(), 2);
        assert!(records[0].is_target());
        assert!(!records[1].is_target());
        assert_eq!(records[0].irt, Some(30.1));
        assert_eq!(records[1].irt, None);
        assert_eq!(records[0].accession_stratum, None);
        assert_eq!(records[0].source, None);
    }

    #[test]
    fn test_missing_required_column() {
        let text = "peptide\tLabel\n PEPTIDE\t1\n";
        let table = Table::from_reader(text.as_bytes(), b'\t').unwrap();
        assert!(PsmRecord::from_table(&table).is_err());
    }
}
