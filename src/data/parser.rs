use std::num::ParseFloatError;

use crate::error::ParseError;

use super::model::ParsedExample;

/// Field separator of the raw input.
pub const DELIMITER: char = ',';

/// Parse one raw line `id,label,feat_0,...,feat_n` into an example.
///
/// The id is kept verbatim. The label and every feature must parse as `f64`
/// (surrounding whitespace is ignored); any failure rejects the whole line.
/// A line with only `id,label` yields an empty `feat`.
pub fn parse_line(line: &str) -> Result<ParsedExample, ParseError> {
    let mut fields = line.split(DELIMITER);

    // `split` always yields at least one item.
    let id = fields.next().unwrap_or_default();
    let raw_label = fields
        .next()
        .ok_or(ParseError::TooFewFields { found: 1 })?;

    let label = parse_number(raw_label).map_err(|source| ParseError::InvalidLabel {
        value: raw_label.to_string(),
        source,
    })?;

    let feat = fields
        .enumerate()
        .map(|(index, raw)| {
            parse_number(raw).map_err(|source| ParseError::InvalidFeature {
                index,
                value: raw.to_string(),
                source,
            })
        })
        .collect::<Result<Vec<f64>, ParseError>>()?;

    Ok(ParsedExample {
        id: id.to_string(),
        label,
        feat,
    })
}

fn parse_number(raw: &str) -> Result<f64, ParseFloatError> {
    raw.trim().parse::<f64>()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_id_label_and_features() {
        let example = parse_line("42,1.0,3.5,2.1").unwrap();
        assert_eq!(
            example,
            ParsedExample {
                id: "42".into(),
                label: 1.0,
                feat: vec![3.5, 2.1],
            }
        );
    }

    #[test]
    fn label_only_yields_empty_features() {
        let example = parse_line("9,1.0").unwrap();
        assert_eq!(example.id, "9");
        assert_eq!(example.label, 1.0);
        assert!(example.feat.is_empty());
    }

    #[test]
    fn feature_count_is_field_count_minus_two() {
        for n in 0..20 {
            let mut line = String::from("row,0.5");
            for i in 0..n {
                line.push_str(&format!(",{i}.25"));
            }
            let example = parse_line(&line).unwrap();
            assert_eq!(example.feat.len(), n);
            assert_eq!(example.feat.last().copied(), n.checked_sub(1).map(|i| i as f64 + 0.25));
        }
    }

    #[test]
    fn non_numeric_label_is_rejected() {
        let err = parse_line("7,abc,1.0").unwrap_err();
        assert!(matches!(err, ParseError::InvalidLabel { ref value, .. } if value == "abc"));
    }

    #[test]
    fn non_numeric_feature_reports_its_position() {
        let err = parse_line("7,1.0,2.0,x,3.0").unwrap_err();
        assert!(matches!(err, ParseError::InvalidFeature { index: 1, ref value, .. } if value == "x"));
    }

    #[test]
    fn missing_label_is_rejected() {
        assert_eq!(
            parse_line("lonely").unwrap_err(),
            ParseError::TooFewFields { found: 1 }
        );
        assert_eq!(parse_line("").unwrap_err(), ParseError::TooFewFields { found: 1 });
    }

    #[test]
    fn trailing_comma_is_an_empty_feature() {
        let err = parse_line("3,1.0,2.0,").unwrap_err();
        assert!(matches!(err, ParseError::InvalidFeature { index: 1, .. }));
    }

    #[test]
    fn whitespace_around_numbers_is_ignored_but_id_is_verbatim() {
        let example = parse_line(" a b , 2.5 , -1e3").unwrap();
        assert_eq!(example.id, " a b ");
        assert_eq!(example.label, 2.5);
        assert_eq!(example.feat, vec![-1000.0]);
    }

    #[test]
    fn empty_id_is_accepted() {
        let example = parse_line(",0").unwrap();
        assert_eq!(example.id, "");
        assert_eq!(example.label, 0.0);
    }
}
