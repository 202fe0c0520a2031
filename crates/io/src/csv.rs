// CSV/TSV import into raw engine rows

use std::io::Read;
use std::path::Path;

use pulse_engine::RawRow;
use serde_json::Value;

use crate::error::IoError;

/// Read a delimited file into raw rows keyed by header. The delimiter is
/// sniffed; empty cells are left out of the row.
pub fn read_csv_rows(path: &Path) -> Result<Vec<RawRow>, IoError> {
    let content = read_file_as_utf8(path)?;
    let rows = parse_csv_rows(&content)?;
    log::debug!("{}: read {} row(s)", path.display(), rows.len());
    Ok(rows)
}

pub fn parse_csv_rows(content: &str) -> Result<Vec<RawRow>, IoError> {
    let content = content.strip_prefix('\u{feff}').unwrap_or(content);
    let delimiter = sniff_delimiter(content);

    let mut reader = csv::ReaderBuilder::new()
        .delimiter(delimiter)
        .has_headers(true)
        .flexible(true)
        .trim(csv::Trim::All)
        .from_reader(content.as_bytes());

    let headers: Vec<String> = reader.headers()?.iter().map(str::to_string).collect();
    let mut rows = Vec::new();

    for result in reader.records() {
        let record = result?;
        let mut row = RawRow::new();
        for (header, field) in headers.iter().zip(record.iter()) {
            if header.is_empty() || field.is_empty() {
                continue;
            }
            row.insert(header.clone(), Value::String(field.to_string()));
        }
        // fully blank lines carry nothing to normalize
        if !row.is_empty() {
            rows.push(row);
        }
    }

    Ok(rows)
}

/// Delimiters a desk export might use, in tie-break order.
const DELIMITERS: [u8; 4] = [b',', b';', b'\t', b'|'];

/// Pick the delimiter that splits the first lines into the same number of
/// fields most often. Comma wins when nothing splits the header.
fn sniff_delimiter(content: &str) -> u8 {
    let sample: Vec<&str> = content.lines().take(10).collect();
    let Some(header) = sample.first() else {
        return b',';
    };

    DELIMITERS
        .iter()
        .filter_map(|&delim| {
            let width = field_count(header, delim);
            if width < 2 {
                return None;
            }
            let agreeing = sample
                .iter()
                .filter(|line| field_count(line, delim) == width)
                .count();
            Some((agreeing * width, delim))
        })
        // max_by_key keeps the last maximum; reversed, that is the first candidate
        .rev()
        .max_by_key(|&(score, _)| score)
        .map_or(b',', |(_, delim)| delim)
}

/// Fields on one line, honoring quotes.
fn field_count(line: &str, delim: u8) -> usize {
    csv::ReaderBuilder::new()
        .delimiter(delim)
        .has_headers(false)
        .flexible(true)
        .from_reader(line.as_bytes())
        .records()
        .next()
        .and_then(Result::ok)
        .map_or(1, |record| record.len())
}

/// Read file and convert to UTF-8 if needed (Excel exports are often Windows-1252).
pub fn read_file_as_utf8(path: &Path) -> Result<String, IoError> {
    let mut file = std::fs::File::open(path).map_err(|e| IoError::file(path, e))?;
    let mut bytes = Vec::new();
    file.read_to_end(&mut bytes)
        .map_err(|e| IoError::file(path, e))?;

    match String::from_utf8(bytes) {
        Ok(s) => Ok(s),
        Err(e) => {
            log::debug!("{}: not UTF-8, decoding as Windows-1252", path.display());
            let bytes = e.into_bytes();
            let (decoded, _, _) = encoding_rs::WINDOWS_1252.decode(&bytes);
            Ok(decoded.into_owned())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::tempdir;

    #[test]
    fn rows_keyed_by_header() {
        let content = "MESSAGE_ID,CUSIP,PX,TICKER\n101,97988RBL5,101.5,\n102, 12345ABC7 ,95,OCT 2020-4A E\n";
        let rows = parse_csv_rows(content).unwrap();
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0]["MESSAGE_ID"], "101");
        assert_eq!(rows[0]["PX"], "101.5");
        // empty cells are omitted
        assert!(rows[0].get("TICKER").is_none());
        assert_eq!(rows[1]["CUSIP"], "12345ABC7");
        assert_eq!(rows[1]["TICKER"], "OCT 2020-4A E");
    }

    #[test]
    fn short_rows_and_blank_lines() {
        let content = "A,B,C\n1,2\n,,\n4,5,6\n";
        let rows = parse_csv_rows(content).unwrap();
        assert_eq!(rows.len(), 2);
        assert!(rows[0].get("C").is_none());
        assert_eq!(rows[1]["C"], "6");
    }

    #[test]
    fn bom_is_stripped() {
        let rows = parse_csv_rows("\u{feff}MESSAGE_ID;PX\n1;2\n").unwrap();
        assert_eq!(rows[0]["MESSAGE_ID"], "1");
    }

    #[test]
    fn header_only_file() {
        assert!(parse_csv_rows("A,B\n").unwrap().is_empty());
        assert!(parse_csv_rows("").unwrap().is_empty());
    }

    #[test]
    fn semicolon_export_detected() {
        let content = "MESSAGE_ID;CUSIP;PX\n101;97988RBL5;101.5\n102;97988RBL5;101\n";
        assert_eq!(sniff_delimiter(content), b';');
    }

    #[test]
    fn tab_export_detected() {
        let content = "CUSIP\tPX\tRANK\nA\t1\t1\nB\t2\t2\n";
        assert_eq!(sniff_delimiter(content), b'\t');
    }

    #[test]
    fn quoted_commas_do_not_outvote_semicolons() {
        let content = "TICKER;PX;SOURCE\n\"Doe, Jane\";\"1,000.5\";TRACE\nBob;99;MANUAL\n";
        assert_eq!(sniff_delimiter(content), b';');
    }

    #[test]
    fn single_column_falls_back_to_comma() {
        assert_eq!(sniff_delimiter("MESSAGE_ID\n101\n102\n"), b',');
        assert_eq!(sniff_delimiter(""), b',');
    }

    #[test]
    fn windows_1252_file() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("colors.csv");
        // 0xE9 is 'é' in Windows-1252 and invalid as a lone UTF-8 byte
        fs::write(&path, b"TICKER,PX\nCaf\xe9 2020-1,99\n").unwrap();

        let rows = read_csv_rows(&path).unwrap();
        assert_eq!(rows[0]["TICKER"], "Café 2020-1");
    }

    #[test]
    fn missing_file_names_path() {
        let err = read_csv_rows(Path::new("/nonexistent/colors.csv")).unwrap_err();
        assert!(err.to_string().contains("/nonexistent/colors.csv"));
    }
}
