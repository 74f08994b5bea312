use std::fs::{self, File};
use std::io::Write;
use std::path::{Path, PathBuf};

use serde::Serialize;
use tracing::info;

use crate::core::processing::cover::CoverTable;

#[derive(Serialize)]
struct Row<'a> {
    date: String,
    plot_id: &'a str,
    cover: String,
    valid_pixels: Option<u64>,
    vegetation_pixels: Option<u64>,
    status: &'static str,
}

/// Write the table as CSV: `date,plot_id,cover,valid_pixels,vegetation_pixels,status`.
pub fn write_table_to<W: Write>(writer: W, table: &CoverTable) -> Result<(), csv::Error> {
    let mut csv = csv::Writer::from_writer(writer);
    for record in &table.records {
        csv.serialize(Row {
            date: record.date.format("%Y-%m-%d").to_string(),
            plot_id: &record.plot_id,
            cover: record.value.to_string(),
            valid_pixels: record.valid_pixels,
            vegetation_pixels: record.vegetation_pixels,
            status: record.status.as_str(),
        })?;
    }
    csv.flush()?;
    Ok(())
}

pub fn write_table(path: &Path, table: &CoverTable) -> Result<(), csv::Error> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent)?;
    }
    let file = File::create(path)?;
    write_table_to(file, table)?;
    info!("Wrote {} rows to {:?}", table.len(), path);
    Ok(())
}

/// `<stem>.partial.csv` next to the requested output
pub fn partial_path(csv_path: &Path) -> PathBuf {
    csv_path.with_extension("partial.csv")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::processing::cover::{CoverMeasurement, CoverRecord};
    use crate::types::{CoverStatus, CoverValue};
    use chrono::NaiveDate;

    #[test]
    fn writes_header_fractions_and_no_data() {
        let d = NaiveDate::from_ymd_opt(2022, 1, 1).unwrap();
        let table = CoverTable {
            records: vec![
                CoverRecord::measured(
                    d,
                    "P1",
                    CoverMeasurement {
                        vegetation_pixels: 4,
                        valid_pixels: 4,
                        value: CoverValue::Fraction(1.0),
                    },
                ),
                CoverRecord::no_data(d, "P2", CoverStatus::NoCoverage),
            ],
            ..Default::default()
        };
        let mut out = Vec::new();
        write_table_to(&mut out, &table).unwrap();
        let text = String::from_utf8(out).unwrap();
        assert_eq!(
            text,
            "date,plot_id,cover,valid_pixels,vegetation_pixels,status\n\
             2022-01-01,P1,1.0,4,4,measured\n\
             2022-01-01,P2,NoData,,,no_coverage\n"
        );
    }

    #[test]
    fn partial_path_keeps_directory() {
        assert_eq!(
            partial_path(Path::new("/out/cover.csv")),
            PathBuf::from("/out/cover.partial.csv")
        );
    }
}
