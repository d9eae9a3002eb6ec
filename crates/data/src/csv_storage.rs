use anyhow::{Context, Result};
use bar_signal_core::Bar;
use chrono::{DateTime, Utc};
use csv::Writer;
use std::fs::File;

pub struct CsvStorage;

impl CsvStorage {
    /// Reads bars from a CSV file, sorted by timestamp.
    ///
    /// Format: timestamp,symbol,open,high,low,close,volume
    ///
    /// # Errors
    /// Returns error if the file cannot be opened or a row fails to parse
    pub fn read_bars(path: &str) -> Result<Vec<Bar>> {
        let mut reader = csv::Reader::from_path(path)
            .with_context(|| format!("Failed to open CSV file: {path}"))?;
        let mut bars = Vec::new();

        for (line, result) in reader.records().enumerate() {
            let record = result?;
            let field = |idx: usize| {
                record
                    .get(idx)
                    .with_context(|| format!("{path}:{}: missing column {idx}", line + 2))
            };
            let price = |idx: usize| -> Result<f64> {
                let raw = field(idx)?;
                raw.trim()
                    .parse()
                    .with_context(|| format!("{path}:{}: bad number {raw:?}", line + 2))
            };

            let timestamp: DateTime<Utc> = field(0)?
                .parse()
                .with_context(|| format!("{path}:{}: bad timestamp", line + 2))?;
            bars.push(Bar::new(
                field(1)?,
                timestamp,
                price(2)?,
                price(3)?,
                price(4)?,
                price(5)?,
                price(6)?,
            ));
        }

        bars.sort_by_key(|b| b.timestamp);
        tracing::debug!(path, count = bars.len(), "Loaded bars from CSV");
        Ok(bars)
    }

    /// Writes bars to a CSV file readable by [`CsvStorage::read_bars`].
    ///
    /// # Errors
    /// Returns error if file cannot be created or writing fails
    pub fn write_bars(path: &str, bars: &[Bar]) -> Result<()> {
        let file =
            File::create(path).with_context(|| format!("Failed to create CSV file: {path}"))?;
        let mut writer = Writer::from_writer(file);

        writer.write_record(["timestamp", "symbol", "open", "high", "low", "close", "volume"])?;

        let mut sorted: Vec<&Bar> = bars.iter().collect();
        sorted.sort_by_key(|b| b.timestamp);

        for bar in sorted {
            writer.write_record(&[
                bar.timestamp.to_rfc3339(),
                bar.instrument.clone(),
                bar.open.to_string(),
                bar.high.to_string(),
                bar.low.to_string(),
                bar.close.to_string(),
                bar.volume.to_string(),
            ])?;
        }

        writer.flush()?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use std::io::Write;

    #[test]
    fn reads_unsorted_rows_in_order() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "timestamp,symbol,open,high,low,close,volume").unwrap();
        writeln!(
            file,
            "2025-03-04T14:31:00Z,EURUSD-OTC,1.0842,1.0846,1.0840,1.0845,12"
        )
        .unwrap();
        writeln!(
            file,
            "2025-03-04T14:30:00Z,EURUSD-OTC,1.0840,1.0843,1.0839,1.0842,9"
        )
        .unwrap();

        let bars = CsvStorage::read_bars(file.path().to_str().unwrap()).unwrap();
        assert_eq!(bars.len(), 2);
        assert_eq!(
            bars[0].timestamp,
            Utc.with_ymd_and_hms(2025, 3, 4, 14, 30, 0).unwrap()
        );
        assert!((bars[1].close - 1.0845).abs() < 1e-12);
    }

    #[test]
    fn bad_number_reports_line() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "timestamp,symbol,open,high,low,close,volume").unwrap();
        writeln!(file, "2025-03-04T14:30:00Z,EURUSD-OTC,abc,1,1,1,1").unwrap();

        let err = CsvStorage::read_bars(file.path().to_str().unwrap()).unwrap_err();
        assert!(format!("{err:#}").contains(":2:"));
    }

    #[test]
    fn written_file_reads_back() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("bars.csv");
        let path = path.to_str().unwrap();
        let ts = Utc.with_ymd_and_hms(2025, 3, 4, 14, 30, 0).unwrap();
        let bars = vec![Bar::new("GBPUSD", ts, 1.25, 1.26, 1.24, 1.255, 3.0)];

        CsvStorage::write_bars(path, &bars).unwrap();
        assert_eq!(CsvStorage::read_bars(path).unwrap(), bars);
    }
}
