//! COVID-19 case counts from the CSSE time-series CSVs, attached to countries
//! as attributes so `/api/countries` serves them.

use crate::config::CasesConfig;
use crate::types::Country;
use anyhow::{anyhow, bail, Context, Result};
use chrono::NaiveDate;
use csv::ReaderBuilder;
use serde_json::{json, Value};
use std::collections::{BTreeMap, HashSet};
use std::path::Path;
use std::time::Duration;
use tracing::{debug, info, warn};

const COUNTRY_COLUMN: &str = "Country/Region";
const DATE_HEADER_FORMAT: &str = "%m/%d/%y";

// CSSE spellings mapped onto the names the countries CSV uses.
const COUNTRY_ALIASES: &[(&str, &str)] = &[
    ("Viet Nam", "Vietnam"),
    ("Republic of the Congo", "Congo"),
    ("Congo (Brazzaville)", "Congo"),
    ("Congo (Kinshasa)", "Congo"),
    ("Czech Republic", "Czechia"),
    ("Hong Kong SAR", "Hong Kong"),
    ("Iran (Islamic Republic of)", "Iran"),
    ("Macao SAR", "Macau"),
    ("Mainland China", "China"),
    ("Republic of Moldova", "Moldova"),
    ("Republic of Ireland", "Ireland"),
    ("Korea, South", "South Korea"),
    ("Republic of Korea", "South Korea"),
    ("Russian Federation", "Russia"),
    ("Gambia, The", "The Gambia"),
    ("UK", "United Kingdom"),
    ("Holy See", "Vatican City"),
];

pub fn normalize_country_name(raw: &str) -> String {
    let name = raw.trim_matches(|c| c == ' ' || c == '*');
    if name.is_empty() {
        return "Unknown".to_string();
    }
    COUNTRY_ALIASES
        .iter()
        .find(|(from, _)| *from == name)
        .map(|&(_, to)| to)
        .unwrap_or(name)
        .to_string()
}

/// Daily cumulative totals per country, summed over provinces.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CaseSeries {
    pub dates: Vec<NaiveDate>,
    pub counts: BTreeMap<String, Vec<i64>>,
}

impl CaseSeries {
    pub fn latest(&self, country: &str) -> Option<i64> {
        self.counts.get(country)?.last().copied()
    }
}

pub fn load_case_series(path: &Path) -> Result<CaseSeries> {
    let mut rdr = ReaderBuilder::new()
        .flexible(true)
        .from_path(path)
        .with_context(|| format!("Failed to open case series: {:?}", path))?;
    let headers = rdr.headers()?.clone();

    let country_idx = headers
        .iter()
        .position(|h| h.trim() == COUNTRY_COLUMN)
        .ok_or_else(|| anyhow!("Column '{}' not found in {:?}", COUNTRY_COLUMN, path))?;
    let date_columns: Vec<(usize, NaiveDate)> = headers
        .iter()
        .enumerate()
        .filter_map(|(i, h)| {
            NaiveDate::parse_from_str(h.trim(), DATE_HEADER_FORMAT)
                .ok()
                .map(|date| (i, date))
        })
        .collect();
    if date_columns.is_empty() {
        bail!("No date columns in case series {:?}", path);
    }

    let mut counts: BTreeMap<String, Vec<i64>> = BTreeMap::new();
    for result in rdr.records() {
        let record = result?;
        let country = normalize_country_name(record.get(country_idx).unwrap_or(""));
        let totals = counts
            .entry(country)
            .or_insert_with(|| vec![0; date_columns.len()]);
        for (total, (i, _)) in totals.iter_mut().zip(&date_columns) {
            *total += record.get(*i).map_or(0, parse_count);
        }
    }

    debug!(
        "Read {} countries over {} days from {:?}",
        counts.len(),
        date_columns.len(),
        path
    );

    Ok(CaseSeries {
        dates: date_columns.into_iter().map(|(_, date)| date).collect(),
        counts,
    })
}

// Blank or unreadable cells count as zero; fractional ones are floored.
fn parse_count(raw: &str) -> i64 {
    match raw.trim().parse::<f64>() {
        Ok(n) if n.is_finite() => n.floor() as i64,
        _ => 0,
    }
}

/// Sets `{name}` to the latest total and `{name}_series` to the dated totals on
/// each country the series covers. Returns the series names that matched no
/// country.
pub fn attach_case_counts(
    countries: &mut [Country],
    name: &str,
    series: &CaseSeries,
) -> Vec<String> {
    let mut matched: HashSet<&str> = HashSet::new();

    for country in countries.iter_mut() {
        let Some((key, totals)) = series.counts.get_key_value(country.name.as_str()) else {
            continue;
        };
        matched.insert(key.as_str());

        let history: Vec<Value> = series
            .dates
            .iter()
            .zip(totals)
            .map(|(date, count)| {
                json!({ "date": date.format("%Y-%m-%d").to_string(), "count": count })
            })
            .collect();
        country
            .attributes
            .insert(name.to_string(), json!(totals.last().copied().unwrap_or(0)));
        country
            .attributes
            .insert(format!("{}_series", name), Value::Array(history));
    }

    let unmatched: Vec<String> = series
        .counts
        .keys()
        .filter(|key| !matched.contains(key.as_str()))
        .cloned()
        .collect();
    for country in &unmatched {
        warn!("{} series: no country named {}", name, country);
    }
    unmatched
}

/// Attach every configured series whose CSV is present. Missing files are
/// skipped with a warning.
pub fn attach_configured_series(config: &CasesConfig, countries: &mut [Country]) -> Result<()> {
    for series in &config.series {
        if !series.csv.exists() {
            warn!(
                "Case series {} not found at {:?}; run `country-map retrieve` first",
                series.name, series.csv
            );
            continue;
        }

        let data = load_case_series(&series.csv)?;
        let unmatched = attach_case_counts(countries, &series.name, &data);
        info!(
            "Attached {} series ({} days, {} unmatched names)",
            series.name,
            data.dates.len(),
            unmatched.len()
        );
    }
    Ok(())
}

/// Download each configured series from `source_root` into its local CSV.
pub async fn retrieve_case_series(config: &CasesConfig, timeout_secs: u64) -> Result<usize> {
    let root = reqwest::Url::parse(&config.source_root)
        .with_context(|| format!("Invalid case source root: {}", config.source_root))?;
    let client = reqwest::Client::builder()
        .user_agent(concat!("country-map/", env!("CARGO_PKG_VERSION")))
        .timeout(Duration::from_secs(timeout_secs))
        .build()?;

    for series in &config.series {
        let url = root
            .join(&series.remote)
            .with_context(|| format!("Invalid remote path: {}", series.remote))?;
        info!("Downloading {} series from {}", series.name, url);

        let body = client
            .get(url.clone())
            .send()
            .await
            .and_then(|response| response.error_for_status())
            .with_context(|| format!("Failed to fetch {}", url))?
            .text()
            .await
            .with_context(|| format!("Failed to read {}", url))?;

        if let Some(parent) = series.csv.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        tokio::fs::write(&series.csv, body.replace('\r', ""))
            .await
            .with_context(|| format!("Failed to write {:?}", series.csv))?;
    }

    Ok(config.series.len())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::CaseSeriesConfig;
    use axum::{http::StatusCode, routing::get, Router};
    use std::fs;

    const SERIES_CSV: &str = "Province/State,Country/Region,Lat,Long,1/22/20,1/23/20,1/24/20\n\
        Hubei,Mainland China,30.97,112.27,444,444,549\n\
        Beijing,Mainland China,40.18,116.41,14,22,\n\
        ,Viet Nam,16.0,108.0,0,2,2.0\n\
        ,Iceland *,64.96,-19.02,0,0,1\n\
        ,Atlantis,0,0,1,1,1\n";

    fn write_series(dir: &Path) -> std::path::PathBuf {
        let path = dir.join("covid_confirmed.csv");
        fs::write(&path, SERIES_CSV).unwrap();
        path
    }

    #[test]
    fn normalizes_csse_country_names() {
        assert_eq!(normalize_country_name("Mainland China"), "China");
        assert_eq!(normalize_country_name(" Iran (Islamic Republic of) *"), "Iran");
        assert_eq!(normalize_country_name("Congo (Kinshasa)"), "Congo");
        assert_eq!(normalize_country_name("Korea, South"), "South Korea");
        assert_eq!(normalize_country_name("UK"), "United Kingdom");
        assert_eq!(normalize_country_name(" * "), "Unknown");
        assert_eq!(normalize_country_name("Ireland"), "Ireland");
    }

    #[test]
    fn sums_provinces_per_country() {
        let dir = tempfile::tempdir().unwrap();
        let series = load_case_series(&write_series(dir.path())).unwrap();

        assert_eq!(
            series.dates,
            vec![
                NaiveDate::from_ymd_opt(2020, 1, 22).unwrap(),
                NaiveDate::from_ymd_opt(2020, 1, 23).unwrap(),
                NaiveDate::from_ymd_opt(2020, 1, 24).unwrap(),
            ]
        );
        assert_eq!(series.counts["China"], vec![458, 466, 549]);
        assert_eq!(series.counts["Vietnam"], vec![0, 2, 2]);
        assert_eq!(series.latest("Iceland"), Some(1));
        assert_eq!(series.latest("Mainland China"), None);
    }

    #[test]
    fn series_without_dates_or_country_column_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("bad.csv");

        fs::write(&path, "Province/State,Country/Region,Lat,Long\n,Chad,0,0\n").unwrap();
        assert!(load_case_series(&path).is_err());

        fs::write(&path, "State,Lat,1/22/20\n,0,1\n").unwrap();
        assert!(load_case_series(&path).is_err());
    }

    #[test]
    fn attaches_counts_as_country_attributes() {
        let dir = tempfile::tempdir().unwrap();
        let series = load_case_series(&write_series(dir.path())).unwrap();
        let mut countries = vec![
            Country::new("China", "CN"),
            Country::new("Iceland", "IS"),
            Country::new("Chad", "TD"),
        ];

        let unmatched = attach_case_counts(&mut countries, "confirmed", &series);

        assert_eq!(unmatched, vec!["Atlantis".to_string(), "Vietnam".to_string()]);
        assert_eq!(
            serde_json::to_value(&countries[1]).unwrap(),
            json!({
                "name": "Iceland",
                "isoCode": "IS",
                "confirmed": 1,
                "confirmed_series": [
                    { "date": "2020-01-22", "count": 0 },
                    { "date": "2020-01-23", "count": 0 },
                    { "date": "2020-01-24", "count": 1 }
                ]
            })
        );
        assert_eq!(countries[0].attributes["confirmed"], json!(549));
        assert!(countries[2].attributes.is_empty());
    }

    #[test]
    fn configured_series_skip_missing_files() {
        let dir = tempfile::tempdir().unwrap();
        let config = CasesConfig {
            series: vec![
                CaseSeriesConfig {
                    name: "confirmed".to_string(),
                    remote: "confirmed.csv".to_string(),
                    csv: write_series(dir.path()),
                },
                CaseSeriesConfig {
                    name: "deaths".to_string(),
                    remote: "deaths.csv".to_string(),
                    csv: dir.path().join("covid_deaths.csv"),
                },
            ],
            ..CasesConfig::default()
        };
        let mut countries = vec![Country::new("Iceland", "IS")];

        attach_configured_series(&config, &mut countries).unwrap();

        assert_eq!(countries[0].attributes["confirmed"], json!(1));
        assert!(countries[0].attributes.get("deaths").is_none());
    }

    #[tokio::test]
    async fn retrieves_series_relative_to_source_root() {
        let app = Router::new()
            .route(
                "/COVID-19/master/series/confirmed.csv",
                get(|| async {
                    "Province/State,Country/Region,Lat,Long,1/22/20\r\n,Chad,0,0,3\r\n"
                }),
            )
            .fallback(|| async { StatusCode::NOT_FOUND });
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move { axum::serve(listener, app).await.unwrap() });

        let dir = tempfile::tempdir().unwrap();
        let target = dir.path().join("nested").join("covid_confirmed.csv");
        let mut config = CasesConfig {
            source_root: format!("http://{}/COVID-19/master/", addr),
            series: vec![CaseSeriesConfig {
                name: "confirmed".to_string(),
                remote: "series/confirmed.csv".to_string(),
                csv: target.clone(),
            }],
        };

        assert_eq!(retrieve_case_series(&config, 5).await.unwrap(), 1);
        let written = fs::read_to_string(&target).unwrap();
        assert!(!written.contains('\r'));
        assert_eq!(load_case_series(&target).unwrap().latest("Chad"), Some(3));

        config.series[0].remote = "series/missing.csv".to_string();
        assert!(retrieve_case_series(&config, 5).await.is_err());
    }
}
