//! The match identifier is the only key that survives the round trip
//! through the external classifier.
//!
//! It is built upstream as `<source>_<scan>_<modifiedSequence>`. The source
//! name may itself contain underscores, the scan and sequence never do, so
//! decomposition always splits on the last two underscores.

use crate::errors::{
    RescoreError,
    Result,
};

const DELIMITER: char = '_';

/// Width of the cleavage context the classifier wraps around peptides,
/// e.g. `K.PEPTIDE.R`.
const FLANK_WIDTH: usize = 2;

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct MatchIdentifier {
    pub source: String,
    pub scan: i64,
    pub modified_sequence: String,
}

impl MatchIdentifier {
    pub fn parse(identifier: &str) -> Result<Self> {
        let malformed = || RescoreError::MalformedIdentifier(identifier.to_string());
        let mut parts = identifier.rsplitn(3, DELIMITER);
        let modified_sequence = parts.next().ok_or_else(malformed)?;
        let scan = parts.next().ok_or_else(malformed)?;
        let source = parts.next().ok_or_else(malformed)?;
        let scan = scan.trim().parse::<i64>().map_err(|_| malformed())?;

        Ok(Self {
            source: source.to_string(),
            scan,
            modified_sequence: modified_sequence.to_string(),
        })
    }

    pub fn encode(&self) -> String {
        encode_match_identifier(&self.source, self.scan, &self.modified_sequence)
    }
}

impl std::fmt::Display for MatchIdentifier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{}{}{}{}{}",
            self.source, DELIMITER, self.scan, DELIMITER, self.modified_sequence
        )
    }
}

impl std::str::FromStr for MatchIdentifier {
    type Err = RescoreError;

    fn from_str(s: &str) -> Result<Self> {
        Self::parse(s)
    }
}

pub fn encode_match_identifier(source: &str, scan: i64, modified_sequence: &str) -> String {
    format!(
        "{}{}{}{}{}",
        source, DELIMITER, scan, DELIMITER, modified_sequence
    )
}

/// Removes the fixed-width cleavage context from a classifier peptide.
///
/// Exactly two characters are removed from each end, whatever they are.
/// Strings shorter than four characters become empty.
pub fn strip_flanking_residues(peptide: &str) -> String {
    let n_chars = peptide.chars().count();
    if n_chars <= 2 * FLANK_WIDTH {
        return String::new();
    }
    peptide
        .chars()
        .skip(FLANK_WIDTH)
        .take(n_chars - 2 * FLANK_WIDTH)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_simple_identifier() {
        let id = MatchIdentifier::parse("SampleA_17_PEPTIDE").unwrap();
        assert_eq!(id.source, "SampleA");
        assert_eq!(id.scan, 17);
        assert_eq!(id.modified_sequence, "PEPTIDE");
    }

    #[test]
    fn test_parse_keeps_underscores_in_source() {
        let id = MatchIdentifier::parse("Sample_A_17_PEPTIDE").unwrap();
        assert_eq!(id.source, "Sample_A");
        assert_eq!(id.scan, 17);
        assert_eq!(id.modified_sequence, "PEPTIDE");

        let id = MatchIdentifier::parse("run_01_b_2_3004_PEPTIoxMDE").unwrap();
        assert_eq!(id.source, "run_01_b_2");
        assert_eq!(id.scan, 3004);
        assert_eq!(id.modified_sequence, "PEPTIoxMDE");
    }

    #[test]
    fn test_parse_is_left_inverse_of_encode() {
        for (source, scan, seq) in [
            ("SampleA", 17, "PEPTIDE"),
            ("a_b_c", 0, "K"),
            ("20240101_HLA_rep1", 123456, "SIINFEKL"),
        ] {
            let encoded = encode_match_identifier(source, scan, seq);
            let id: MatchIdentifier = encoded.parse().unwrap();
            assert_eq!(id.source, source);
            assert_eq!(id.scan, scan);
            assert_eq!(id.modified_sequence, seq);
            assert_eq!(id.encode(), encoded);
        }
    }

    #[test]
    fn test_parse_rejects_malformed() {
        assert!(MatchIdentifier::parse("PEPTIDE").is_err());
        assert!(MatchIdentifier::parse("17_PEPTIDE").is_err());
        assert!(MatchIdentifier::parse("SampleA_x17_PEPTIDE").is_err());
    }

    #[test]
    fn test_strip_flanks_is_fixed_width() {
        assert_eq!(strip_flanking_residues("K.PEPTIDE.R"), "PEPTIDE");
        assert_eq!(strip_flanking_residues("-.PEPTIDE.-"), "PEPTIDE");
        // Not a trim: inner characters that look like flanks are kept.
        assert_eq!(strip_flanking_residues("..K.PEP.R.."), "K.PEP.R");
        assert_eq!(strip_flanking_residues("K.R"), "");
    }
}
