//! Joins boundary records onto the countries they describe.

use crate::types::{BoundaryFeed, Country};
use std::collections::HashMap;
use std::fmt;
use tracing::{debug, warn};

/// A country-type boundary whose (name, isoCode) matched no country.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JoinMismatch {
    pub boundary_id: String,
    pub name: String,
    pub iso_code: String,
}

impl fmt::Display for JoinMismatch {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "boundary {} ({}, {}) matches no country",
            self.boundary_id, self.name, self.iso_code
        )
    }
}

/// Attach every country-type boundary in `feed` to the first country with the
/// same name and ISO code, in feed order. Unmatched boundaries are logged and
/// returned; they never fail the merge.
pub fn merge_boundaries(countries: &mut [Country], feed: &BoundaryFeed) -> Vec<JoinMismatch> {
    let mut mismatches = Vec::new();
    let mut matched = Vec::new();

    {
        // First country wins when the feed repeats a (name, iso) pair.
        let mut index: HashMap<(&str, &str), usize> = HashMap::with_capacity(countries.len());
        for (i, country) in countries.iter().enumerate() {
            index
                .entry((country.name.as_str(), country.iso_code.as_str()))
                .or_insert(i);
        }

        for (id, record) in feed.iter() {
            if !record.is_country() {
                continue;
            }

            match index.get(&(record.name.as_str(), record.iso_code.as_str())) {
                Some(&i) => matched.push((i, &record.polygon)),
                None => {
                    let mismatch = JoinMismatch {
                        boundary_id: id.to_string(),
                        name: record.name.clone(),
                        iso_code: record.iso_code.clone(),
                    };
                    warn!("{}", mismatch);
                    mismatches.push(mismatch);
                }
            }
        }
    }

    let attached = matched.len();
    for (i, polygon) in matched {
        countries[i].push_boundary(polygon.clone());
    }

    debug!(
        "Attached {} boundaries to {} countries ({} unmatched)",
        attached,
        countries.len(),
        mismatches.len()
    );

    mismatches
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{BoundaryRecord, LatLng, Polygon};
    use serde_json::json;

    fn ring(points: &[(f64, f64)]) -> Polygon {
        points.iter().map(|&(lat, lng)| LatLng(lat, lng)).collect()
    }

    fn record(area_type: &str, name: &str, iso: &str, polygon: Polygon) -> BoundaryRecord {
        BoundaryRecord {
            area_type: area_type.to_string(),
            name: name.to_string(),
            iso_code: iso.to_string(),
            polygon,
            division: None,
        }
    }

    #[test]
    fn no_boundaries_leaves_countries_untouched() {
        let mut countries = vec![Country::new("X", "X1")];
        let mismatches = merge_boundaries(&mut countries, &BoundaryFeed::new());

        assert!(mismatches.is_empty());
        assert_eq!(countries, vec![Country::new("X", "X1")]);
        assert_eq!(
            serde_json::to_value(&countries).unwrap(),
            json!([{ "name": "X", "isoCode": "X1" }])
        );
    }

    #[test]
    fn single_match_attaches_polygon() {
        let mut countries: Vec<Country> =
            serde_json::from_value(json!([{ "name": "Y", "isoCode": "Y1" }])).unwrap();
        let feed: BoundaryFeed = serde_json::from_value(json!({
            "1": { "type": "country", "name": "Y", "isoCode": "Y1", "boundaries": [[[0, 0], [1, 1]]] }
        }))
        .unwrap();

        let mismatches = merge_boundaries(&mut countries, &feed);

        assert!(mismatches.is_empty());
        assert_eq!(
            serde_json::to_value(&countries).unwrap(),
            json!([{ "name": "Y", "isoCode": "Y1", "boundaries": [[[0.0, 0.0], [1.0, 1.0]]] }])
        );
    }

    #[test]
    fn unmatched_boundary_is_reported_not_fatal() {
        let mut countries = vec![Country::new("Y", "Y1")];
        let mut feed = BoundaryFeed::new();
        feed.insert("7", record("country", "Z", "Z1", ring(&[(0.0, 0.0)])));

        let mismatches = merge_boundaries(&mut countries, &feed);

        assert_eq!(
            mismatches,
            vec![JoinMismatch {
                boundary_id: "7".to_string(),
                name: "Z".to_string(),
                iso_code: "Z1".to_string(),
            }]
        );
        assert_eq!(countries, vec![Country::new("Y", "Y1")]);
    }

    #[test]
    fn repeated_matches_append_in_feed_order() {
        let mut countries = vec![Country::new("Y", "Y1"), Country::new("W", "W1")];
        let mut feed = BoundaryFeed::new();
        feed.insert("b", record("country", "Y", "Y1", ring(&[(2.0, 2.0)])));
        feed.insert("c", record("country", "W", "W1", ring(&[(5.0, 5.0)])));
        feed.insert("a", record("country", "Y", "Y1", ring(&[(1.0, 1.0)])));

        merge_boundaries(&mut countries, &feed);

        assert_eq!(
            countries[0].boundaries,
            Some(vec![ring(&[(2.0, 2.0)]), ring(&[(1.0, 1.0)])])
        );
        assert_eq!(countries[1].boundary_count(), 1);
    }

    #[test]
    fn non_country_types_are_skipped_silently() {
        let mut countries = vec![Country::new("Y", "Y1")];
        let mut feed = BoundaryFeed::new();
        feed.insert("1", record("province", "Y", "Y1", ring(&[(0.0, 0.0)])));
        feed.insert("2", record("province", "Nowhere", "N1", ring(&[(0.0, 0.0)])));

        let mismatches = merge_boundaries(&mut countries, &feed);

        assert!(mismatches.is_empty());
        assert_eq!(countries[0].boundaries, None);
    }

    #[test]
    fn match_requires_both_name_and_iso() {
        let mut countries = vec![Country::new("Y", "Y1")];
        let mut feed = BoundaryFeed::new();
        feed.insert("1", record("country", "Y", "Y2", ring(&[(0.0, 0.0)])));
        feed.insert("2", record("country", "y", "Y1", ring(&[(0.0, 0.0)])));

        let mismatches = merge_boundaries(&mut countries, &feed);

        assert_eq!(mismatches.len(), 2);
        assert_eq!(countries[0].boundaries, None);
    }

    #[test]
    fn duplicate_countries_only_first_receives_boundaries() {
        let mut countries = vec![Country::new("Y", "Y1"), Country::new("Y", "Y1")];
        let mut feed = BoundaryFeed::new();
        feed.insert("1", record("country", "Y", "Y1", ring(&[(0.0, 0.0)])));

        merge_boundaries(&mut countries, &feed);

        assert_eq!(countries[0].boundary_count(), 1);
        assert_eq!(countries[1].boundary_count(), 0);
    }

    #[test]
    fn boundary_counts_match_eligible_records() {
        let base = vec![
            Country::new("A", "A1"),
            Country::new("B", "B1"),
            Country::new("C", "C1"),
        ];
        let mut feed = BoundaryFeed::new();
        let rows = [
            ("country", "A", "A1"),
            ("country", "B", "B1"),
            ("lake", "A", "A1"),
            ("country", "A", "A1"),
            ("country", "Q", "Q1"),
            ("country", "A", "A1"),
        ];
        for (i, (kind, name, iso)) in rows.iter().enumerate() {
            feed.insert(i.to_string(), record(kind, name, iso, ring(&[(i as f64, 0.0)])));
        }

        let mut countries = base.clone();
        merge_boundaries(&mut countries, &feed);

        for country in &countries {
            let expected = feed
                .iter()
                .filter(|(_, r)| {
                    r.is_country() && r.name == country.name && r.iso_code == country.iso_code
                })
                .count();
            assert_eq!(country.boundary_count(), expected, "{}", country.name);
        }
        assert_eq!(countries[2].boundaries, None);
    }

    #[test]
    fn merge_is_repeatable() {
        let base = vec![Country::new("Y", "Y1")];
        let mut feed = BoundaryFeed::new();
        feed.insert("1", record("country", "Y", "Y1", ring(&[(0.0, 0.0), (1.0, 1.0)])));
        feed.insert("2", record("country", "Z", "Z1", ring(&[(0.0, 0.0)])));

        let mut first = base.clone();
        let first_mismatches = merge_boundaries(&mut first, &feed);
        let mut second = base.clone();
        let second_mismatches = merge_boundaries(&mut second, &feed);

        assert_eq!(first, second);
        assert_eq!(first_mismatches, second_mismatches);
    }
}
