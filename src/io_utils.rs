//! CSV reader construction, delimiter resolution and input decoding.
//!
//! The transaction source is read once, so everything here is read-side:
//! extension-based delimiter detection (`.tsv` → tab), `encoding_rs` label
//! resolution defaulting to UTF-8, and the `-` path convention for stdin.

use std::{
    fs::File,
    io::{BufReader, Read},
    path::Path,
};

use encoding_rs::{Encoding, UTF_8};

use crate::error::{AnalyticsError, Result};

pub const DEFAULT_CSV_DELIMITER: u8 = b',';
pub const DEFAULT_TSV_DELIMITER: u8 = b'\t';

pub fn is_dash(path: &Path) -> bool {
    path == Path::new("-")
}

pub fn resolve_encoding(label: Option<&str>) -> Result<&'static Encoding> {
    match label {
        Some(value) => Encoding::for_label(value.trim().as_bytes())
            .ok_or_else(|| AnalyticsError::data_load(format!("unknown encoding '{value}'"))),
        None => Ok(UTF_8),
    }
}

pub fn resolve_input_delimiter(path: &Path, provided: Option<u8>) -> u8 {
    provided.unwrap_or_else(|| match path.extension().and_then(|ext| ext.to_str()) {
        Some(ext) if ext.eq_ignore_ascii_case("tsv") => DEFAULT_TSV_DELIMITER,
        _ => DEFAULT_CSV_DELIMITER,
    })
}

/// Short rows are tolerated here; the loader drops them and counts the drop.
pub fn open_csv_reader<R: Read>(reader: R, delimiter: u8) -> csv::Reader<R> {
    csv::ReaderBuilder::new()
        .has_headers(true)
        .delimiter(delimiter)
        .double_quote(true)
        .flexible(true)
        .trim(csv::Trim::None)
        .from_reader(reader)
}

pub fn open_csv_reader_from_path(path: &Path, delimiter: u8) -> Result<csv::Reader<Box<dyn Read>>> {
    let reader: Box<dyn Read> = if is_dash(path) {
        Box::new(std::io::stdin().lock())
    } else {
        let file = File::open(path).map_err(|err| {
            AnalyticsError::data_load(format!("cannot open {}: {err}", path.display()))
        })?;
        Box::new(BufReader::new(file))
    };
    Ok(open_csv_reader(reader, delimiter))
}

pub fn decode_bytes(bytes: &[u8], encoding: &'static Encoding) -> Option<String> {
    let (text, _, had_errors) = encoding.decode(bytes);
    (!had_errors).then(|| text.into_owned())
}

pub fn decode_record(record: &csv::ByteRecord, encoding: &'static Encoding) -> Option<Vec<String>> {
    record
        .iter()
        .map(|field| decode_bytes(field, encoding))
        .collect()
}

pub fn reader_headers<R: Read>(
    reader: &mut csv::Reader<R>,
    encoding: &'static Encoding,
) -> Result<Vec<String>> {
    let headers = reader
        .byte_headers()
        .map_err(|err| AnalyticsError::data_load(format!("cannot read header row: {err}")))?
        .clone();
    decode_record(&headers, encoding).ok_or_else(|| {
        AnalyticsError::data_load(format!(
            "header row is not valid {} text",
            encoding.name()
        ))
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tsv_extension_selects_tab_delimiter() {
        assert_eq!(resolve_input_delimiter(Path::new("sales.tsv"), None), b'\t');
        assert_eq!(resolve_input_delimiter(Path::new("sales.csv"), None), b',');
        assert_eq!(resolve_input_delimiter(Path::new("sales.tsv"), Some(b';')), b';');
    }

    #[test]
    fn unknown_encoding_is_a_load_error() {
        assert!(resolve_encoding(Some("latin1")).is_ok());
        let err = resolve_encoding(Some("klingon")).unwrap_err();
        assert!(matches!(err, AnalyticsError::DataLoad(_)));
    }

    #[test]
    fn headers_decode_with_requested_encoding() {
        let bytes: &[u8] = b"caf\xe9,qty\n1,2\n";
        let mut reader = open_csv_reader(bytes, b',');
        let latin1 = resolve_encoding(Some("latin1")).unwrap();
        let headers = reader_headers(&mut reader, latin1).unwrap();
        assert_eq!(headers, vec!["café".to_string(), "qty".to_string()]);
    }
}
