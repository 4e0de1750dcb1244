// src/load/csv_file.rs
use anyhow::{anyhow, bail, Context, Result};
use csv::ReaderBuilder;
use std::{fs, path::Path};
use tracing::{debug, warn};

use crate::load::utils::{unique_headers, DecimalSeparator};

#[derive(Debug)]
pub struct RawTable {
    /// Column names from the header row, made unique.
    pub headers: Vec<String>,
    /// Each data row, padded or truncated to `headers.len()`.
    pub rows: Vec<Vec<String>>,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum TextEncoding {
    Latin1,
    /// UTF-8 with invalid sequences dropped.
    Utf8Lossy,
}

/// One way of reading a CSV file.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ParseStrategy {
    pub name: &'static str,
    pub delimiter: u8,
    pub decimal: DecimalSeparator,
    pub encoding: TextEncoding,
    /// Accept records with more fields than the header, dropping the extras.
    /// Short records are always padded.
    pub lenient: bool,
    /// Reject a single-column header containing this byte.
    pub foreign_delimiter: Option<u8>,
}

/// How CVM publishes the quarterly files.
pub const PRIMARY: ParseStrategy = ParseStrategy {
    name: "primary",
    delimiter: b';',
    decimal: DecimalSeparator::Comma,
    encoding: TextEncoding::Latin1,
    lenient: false,
    foreign_delimiter: Some(b','),
};

pub const FALLBACK: ParseStrategy = ParseStrategy {
    name: "fallback",
    delimiter: b',',
    decimal: DecimalSeparator::Dot,
    encoding: TextEncoding::Utf8Lossy,
    lenient: true,
    foreign_delimiter: None,
};

pub const STRATEGIES: [ParseStrategy; 2] = [PRIMARY, FALLBACK];

pub fn decode(bytes: &[u8], encoding: TextEncoding) -> String {
    match encoding {
        TextEncoding::Latin1 => bytes.iter().map(|&b| char::from(b)).collect(),
        TextEncoding::Utf8Lossy => {
            let mut out = String::with_capacity(bytes.len());
            for chunk in bytes.utf8_chunks() {
                out.push_str(chunk.valid());
            }
            match out.strip_prefix('\u{feff}') {
                Some(rest) => rest.to_string(),
                None => out,
            }
        }
    }
}

/// Parse `bytes` under a single strategy.
pub fn parse_raw(bytes: &[u8], strategy: &ParseStrategy) -> Result<RawTable> {
    let text = decode(bytes, strategy.encoding);
    let mut rdr = ReaderBuilder::new()
        .delimiter(strategy.delimiter)
        .has_headers(true)
        .flexible(true)
        .from_reader(text.as_bytes());

    let raw_headers: Vec<String> = rdr
        .headers()
        .context("reading header row")?
        .iter()
        .map(str::to_string)
        .collect();
    if raw_headers.iter().all(|h| h.trim().is_empty()) {
        bail!("no header row");
    }

    // A whole comma-separated header in one field means the delimiter is wrong.
    if let Some(other) = strategy.foreign_delimiter {
        if raw_headers.len() == 1 && raw_headers[0].contains(char::from(other)) {
            bail!(
                "single column header looks delimited by {:?}",
                char::from(other)
            );
        }
    }

    let headers = unique_headers(&raw_headers);
    let width = headers.len();
    let mut rows = Vec::new();
    for (idx, result) in rdr.records().enumerate() {
        let record = result.with_context(|| format!("CSV parse error at record {}", idx + 1))?;
        if !strategy.lenient && record.len() > width {
            bail!(
                "record {} has {} fields, header has {}",
                idx + 1,
                record.len(),
                width
            );
        }
        let mut row: Vec<String> = record.iter().take(width).map(str::to_string).collect();
        row.resize(width, String::new());
        rows.push(row);
    }

    Ok(RawTable { headers, rows })
}

/// Read and parse one file, trying the primary strategy and then the fallback.
/// Errors only when every strategy failed; the message carries each reason.
pub fn parse_file(path: &Path) -> Result<(RawTable, ParseStrategy)> {
    let bytes = fs::read(path).with_context(|| format!("reading {}", path.display()))?;
    parse_bytes(&bytes, &path.display().to_string())
}

pub fn parse_bytes(bytes: &[u8], label: &str) -> Result<(RawTable, ParseStrategy)> {
    let mut reasons = Vec::with_capacity(STRATEGIES.len());
    for strategy in STRATEGIES {
        match parse_raw(bytes, &strategy) {
            Ok(table) => {
                debug!(
                    file = label,
                    strategy = strategy.name,
                    columns = table.headers.len(),
                    rows = table.rows.len(),
                    "parsed"
                );
                return Ok((table, strategy));
            }
            Err(e) => {
                warn!(file = label, strategy = strategy.name, error = %format!("{:#}", e), "parse failed");
                reasons.push(format!("{}: {:#}", strategy.name, e));
            }
        }
    }
    Err(anyhow!(reasons.join("; ")))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::{init_test_logging, latin1};

    #[test]
    fn primary_reads_latin1_semicolon_files() -> Result<()> {
        init_test_logging();
        let bytes = latin1(
            "CNPJ_Fundo;Nome_Fundo;Valor_Ativo\n\
             11.111.111/0001-11;Fundo Imobiliário Açaí;1234,5\n",
        );
        let (table, strategy) = parse_bytes(&bytes, "inline")?;
        assert_eq!(strategy, PRIMARY);
        assert_eq!(table.headers, vec!["CNPJ_Fundo", "Nome_Fundo", "Valor_Ativo"]);
        assert_eq!(table.rows.len(), 1);
        assert_eq!(table.rows[0][1], "Fundo Imobiliário Açaí");
        assert_eq!(table.rows[0][2], "1234,5");
        Ok(())
    }

    #[test]
    fn short_rows_stay_on_the_primary_parse() -> Result<()> {
        init_test_logging();
        let content = "CNPJ_Fundo;Data_Referencia;Valor_CRI\n11;2023-03-31;1,5\n22;2023-03-31\n";
        let (table, strategy) = parse_bytes(content.as_bytes(), "inline")?;
        assert_eq!(strategy, PRIMARY);
        assert_eq!(table.headers, vec!["CNPJ_Fundo", "Data_Referencia", "Valor_CRI"]);
        assert_eq!(table.rows[0], vec!["11", "2023-03-31", "1,5"]);
        assert_eq!(table.rows[1], vec!["22", "2023-03-31", ""]);
        Ok(())
    }

    #[test]
    fn long_rows_fall_back_to_lenient_parse() -> Result<()> {
        init_test_logging();
        let content = "a;b;c\n1;2;3\n4;5;6;7\n";
        assert!(parse_raw(content.as_bytes(), &PRIMARY).is_err());

        let (table, strategy) = parse_bytes(content.as_bytes(), "inline")?;
        assert_eq!(strategy, FALLBACK);
        assert_eq!(table.headers, vec!["a;b;c"]);
        assert_eq!(table.rows.len(), 2);
        Ok(())
    }

    #[test]
    fn comma_files_are_detected_and_read_as_utf8() -> Result<()> {
        let content = "CNPJ_Fundo,Valor\n22.222.222/0001-22,10.5\n33.333.333/0001-33,7\n";
        let (table, strategy) = parse_bytes(content.as_bytes(), "inline")?;
        assert_eq!(strategy, FALLBACK);
        assert_eq!(table.headers, vec!["CNPJ_Fundo", "Valor"]);
        assert_eq!(table.rows[1], vec!["33.333.333/0001-33", "7"]);
        Ok(())
    }

    #[test]
    fn lenient_rows_are_padded_and_truncated() -> Result<()> {
        let content = "x,y,z\n1\n1,2,3,4\n";
        let table = parse_raw(content.as_bytes(), &FALLBACK)?;
        assert_eq!(table.rows[0], vec!["1", "", ""]);
        assert_eq!(table.rows[1], vec!["1", "2", "3"]);
        Ok(())
    }

    #[test]
    fn empty_file_fails_every_strategy() {
        init_test_logging();
        let err = parse_bytes(b"", "empty.csv").unwrap_err().to_string();
        assert!(err.contains("primary"), "{}", err);
        assert!(err.contains("fallback"), "{}", err);
    }

    #[test]
    fn invalid_utf8_is_dropped() {
        let decoded = decode(b"\xef\xbb\xbfab\xffcd", TextEncoding::Utf8Lossy);
        assert_eq!(decoded, "abcd");
        assert_eq!(decode(b"caf\xe9", TextEncoding::Latin1), "café");
    }
}
