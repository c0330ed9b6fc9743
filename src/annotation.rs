//! Peak annotation against metabolite databases.
//!
//! A database is a CSV file with rows `exact_mass,name,formula`. An optional
//! header row is recognised by a non-numeric first field.

use std::io::Read;
use std::path::Path;

use anyhow::{Context, Result};
use log::{debug, info};

use crate::data::model::Spectrum;

pub const TEMPLATE_HEADER: [&str; 3] = ["M/Z value", "Name", "Description"];

#[derive(Debug, Clone, PartialEq)]
pub struct DatabaseEntry {
    pub exact_mass: f64,
    pub name: String,
    pub formula: String,
}

/// One database hit for one spectrum peak.
#[derive(Debug, Clone, PartialEq)]
pub struct Annotation {
    pub peak_mz: f64,
    pub intensity: f64,
    pub entry: DatabaseEntry,
    /// `peak_mz - exact_mass`
    pub error: f64,
}

/// Entries sorted by ascending mass.
#[derive(Debug, Clone, Default)]
pub struct Database {
    entries: Vec<DatabaseEntry>,
}

impl Database {
    pub fn from_reader<R: Read>(reader: R) -> Result<Self> {
        let mut csv = csv::ReaderBuilder::new()
            .has_headers(false)
            .flexible(true)
            .trim(csv::Trim::All)
            .from_reader(reader);

        let mut entries = Vec::new();
        for (row_no, record) in csv.records().enumerate() {
            let record = record.with_context(|| format!("database row {row_no}"))?;
            let Some(first) = record.get(0).filter(|s| !s.is_empty()) else {
                continue;
            };
            let exact_mass = match first.parse::<f64>() {
                Ok(m) => m,
                Err(_) if row_no == 0 => continue,
                Err(e) => {
                    return Err(e).with_context(|| {
                        format!("database row {row_no}: '{first}' is not a mass")
                    })
                }
            };
            entries.push(DatabaseEntry {
                exact_mass,
                name: record.get(1).unwrap_or("").to_string(),
                formula: record.get(2).unwrap_or("").to_string(),
            });
        }
        let mut db = Database { entries };
        db.sort();
        Ok(db)
    }

    pub fn from_csv(path: &Path) -> Result<Self> {
        let file = std::fs::File::open(path)
            .with_context(|| format!("opening database {}", path.display()))?;
        let db = Self::from_reader(file)
            .with_context(|| format!("reading database {}", path.display()))?;
        info!("Loaded {} database entries from {}", db.len(), path.display());
        Ok(db)
    }

    /// Load and merge several database files.
    pub fn from_csv_files<P: AsRef<Path>>(paths: &[P]) -> Result<Self> {
        let mut db = Database::default();
        for path in paths {
            db.merge(Self::from_csv(path.as_ref())?);
        }
        Ok(db)
    }

    pub fn merge(&mut self, other: Database) {
        self.entries.extend(other.entries);
        self.sort();
    }

    fn sort(&mut self) {
        self.entries.sort_by(|a, b| a.exact_mass.total_cmp(&b.exact_mass));
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn entries(&self) -> &[DatabaseEntry] {
        &self.entries
    }

    /// Entries with `|exact_mass - mz| <= tolerance`, nearest first.
    pub fn lookup(&self, mz: f64, tolerance: f64) -> Vec<&DatabaseEntry> {
        let start = self.entries.partition_point(|e| e.exact_mass < mz - tolerance);
        let end = self.entries.partition_point(|e| e.exact_mass <= mz + tolerance);
        let mut hits: Vec<&DatabaseEntry> = self.entries[start..end.max(start)].iter().collect();
        hits.sort_by(|a, b| {
            (a.exact_mass - mz)
                .abs()
                .total_cmp(&(b.exact_mass - mz).abs())
        });
        hits
    }

    /// Match every peak of `spectrum` against the database.
    pub fn annotate(&self, spectrum: &Spectrum, tolerance: f64) -> Vec<Annotation> {
        let annotations: Vec<Annotation> = spectrum
            .pairs()
            .flat_map(|(mz, intensity)| {
                self.lookup(mz, tolerance)
                    .into_iter()
                    .map(move |entry| Annotation {
                        peak_mz: mz,
                        intensity,
                        error: mz - entry.exact_mass,
                        entry: entry.clone(),
                    })
            })
            .collect();
        debug!(
            "Annotated {} of {} peaks (tolerance {tolerance})",
            annotations.len(),
            spectrum.len()
        );
        annotations
    }

    /// Case-insensitive substring search over mass, name and formula.
    pub fn search(&self, text: &str) -> Vec<&DatabaseEntry> {
        let needle = text.to_lowercase();
        self.entries
            .iter()
            .filter(|e| {
                e.exact_mass.to_string().contains(&needle)
                    || e.name.to_lowercase().contains(&needle)
                    || e.formula.to_lowercase().contains(&needle)
            })
            .collect()
    }
}

/// Write an empty database containing only the header row.
pub fn write_template(path: &Path) -> Result<()> {
    let mut csv = csv::Writer::from_path(path)
        .with_context(|| format!("creating {}", path.display()))?;
    csv.write_record(TEMPLATE_HEADER)?;
    csv.flush()?;
    info!("Created database template {}", path.display());
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    const DB: &str = "M/Z value,Name,Description\n\
                      760.5851,PC 34:1,C42H82NO8P\n\
                      104.1075,Choline,C5H14NO\n\
                      760.5900,decoy,X\n\
                      \n\
                      184.0733,Phosphocholine,C5H15NO4P\n";

    #[test]
    fn parses_and_sorts() {
        let db = Database::from_reader(DB.as_bytes()).unwrap();
        let masses: Vec<f64> = db.entries().iter().map(|e| e.exact_mass).collect();
        assert_eq!(masses, vec![104.1075, 184.0733, 760.5851, 760.59]);
    }

    #[test]
    fn rejects_bad_mass_after_header() {
        let err = Database::from_reader("1.0,a,b\nfoo,c,d\n".as_bytes());
        assert!(err.is_err());
    }

    #[test]
    fn lookup_orders_by_distance() {
        let db = Database::from_reader(DB.as_bytes()).unwrap();
        let hits = db.lookup(760.589, 0.01);
        let names: Vec<&str> = hits.iter().map(|e| e.name.as_str()).collect();
        assert_eq!(names, vec!["decoy", "PC 34:1"]);
        assert!(db.lookup(500.0, 0.01).is_empty());
    }

    #[test]
    fn annotate_mean_spectrum() {
        let db = Database::from_reader(DB.as_bytes()).unwrap();
        let sp = Spectrum::from_pairs(&[(104.108, 5.0), (300.0, 1.0), (760.585, 9.0)]).unwrap();
        let hits = db.annotate(&sp, 0.002);
        assert_eq!(hits.len(), 2);
        assert_eq!(hits[0].entry.name, "Choline");
        assert_eq!(hits[1].entry.name, "PC 34:1");
        assert_eq!(hits[1].intensity, 9.0);
    }

    #[test]
    fn search_is_case_insensitive() {
        let db = Database::from_reader(DB.as_bytes()).unwrap();
        assert_eq!(db.search("choline").len(), 2);
        assert_eq!(db.search("c42h").len(), 1);
        assert_eq!(db.search("184.07").len(), 1);
    }
}
