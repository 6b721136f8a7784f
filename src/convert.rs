//! Conversion of SUMO's XML output logs into CSV.

use crate::{Error, Result};
use log::info;
use quick_xml::events::{BytesStart, Event};
use quick_xml::Reader;
use std::fs::File;
use std::io::{BufRead, BufReader, Write};
use std::path::Path;

/// The columns of a converted queue log.
pub const QUEUE_HEADER: [&str; 5] = [
    "timestep",
    "lane_id",
    "queueing_time",
    "queueing_length",
    "queueing_length_experimental",
];

/// Converts a queue output log into CSV, with one row per lane per timestep.
/// Returns the number of data rows written.
pub fn convert_queue_log(xml: impl AsRef<Path>, csv: impl AsRef<Path>) -> Result<usize> {
    let (xml, csv) = (xml.as_ref(), csv.as_ref());
    info!("Converting {} to {}...", xml.display(), csv.display());
    let input = open_input(xml)?;
    let rows = queue_log_to_csv(input, File::create(csv)?)?;
    info!("Success! Wrote {} rows to {}", rows, csv.display());
    Ok(rows)
}

/// Converts a log whose records are the root's children, such as a trip
/// info log, into CSV. Returns the number of data rows written.
pub fn convert_flat_log(xml: impl AsRef<Path>, csv: impl AsRef<Path>) -> Result<usize> {
    let (xml, csv) = (xml.as_ref(), csv.as_ref());
    let input = open_input(xml)?;
    let rows = flat_log_to_csv(input, File::create(csv)?)?;
    info!("Success! Converted {} -> {}", xml.display(), csv.display());
    Ok(rows)
}

/// Writes the `<lane>` elements of a queue log as CSV.
///
/// Only `<lane>` elements inside the first `<lanes>` of each top-level
/// `<data>` element are written. Attribute values are copied verbatim and
/// missing attributes become empty fields.
pub fn queue_log_to_csv<R: BufRead, W: Write>(input: R, output: W) -> Result<usize> {
    let mut reader = Reader::from_reader(input);
    let mut writer = csv::Writer::from_writer(output);
    writer.write_record(QUEUE_HEADER)?;

    let mut buf = Vec::new();
    // Names of the currently open elements, outermost first.
    let mut path: Vec<Vec<u8>> = Vec::new();
    let mut timestep = String::new();
    // Whether the current <data> block's first <lanes> has been seen yet.
    let mut seen_lanes = false;
    let mut in_lanes = false;
    let mut rows = 0;

    loop {
        let event = match reader.read_event_into(&mut buf)? {
            Event::Start(e) => Some((e.into_owned(), false)),
            Event::Empty(e) => Some((e.into_owned(), true)),
            Event::End(_) => {
                if path.pop().as_deref() == Some(b"lanes".as_slice()) && path.len() == 2 {
                    in_lanes = false;
                }
                None
            }
            Event::Eof => break,
            _ => None,
        };
        buf.clear();
        let Some((element, is_empty)) = event else {
            continue;
        };

        let name = element.name().as_ref().to_vec();
        match (path.len(), name.as_slice()) {
            (1, b"data") => {
                timestep = attribute(&element, "timestep")?.unwrap_or_default();
                seen_lanes = false;
            }
            (2, b"lanes") if path[1] == b"data" => {
                in_lanes = !seen_lanes && !is_empty;
                seen_lanes = true;
            }
            (3, b"lane") if in_lanes => {
                let mut record = vec![timestep.clone()];
                for key in &QUEUE_HEADER[1..] {
                    let key = if *key == "lane_id" { "id" } else { *key };
                    record.push(attribute(&element, key)?.unwrap_or_default());
                }
                writer.write_record(&record)?;
                rows += 1;
            }
            _ => {}
        }

        if !is_empty {
            path.push(name);
        }
    }

    writer.flush()?;
    Ok(rows)
}

/// Writes each child of the root element as a CSV row.
///
/// The first record's attribute names, in document order, form the header.
/// Later records are written in header order; attributes they lack become
/// empty fields and attributes not in the header are dropped.
pub fn flat_log_to_csv<R: BufRead, W: Write>(input: R, output: W) -> Result<usize> {
    let mut reader = Reader::from_reader(input);
    let mut writer = csv::Writer::from_writer(output);

    let mut buf = Vec::new();
    let mut depth = 0usize;
    let mut header: Option<Vec<String>> = None;
    let mut rows = 0;

    loop {
        let event = match reader.read_event_into(&mut buf)? {
            Event::Start(e) => Some((e.into_owned(), false)),
            Event::Empty(e) => Some((e.into_owned(), true)),
            Event::End(_) => {
                depth = depth.saturating_sub(1);
                None
            }
            Event::Eof => break,
            _ => None,
        };
        buf.clear();
        let Some((element, is_empty)) = event else {
            continue;
        };

        if depth == 1 {
            let attributes = attributes(&element)?;
            let header = header.get_or_insert_with(|| {
                attributes.iter().map(|(key, _)| key.clone()).collect()
            });
            if rows == 0 {
                writer.write_record(header.iter())?;
            }
            let record = header.iter().map(|column| {
                attributes
                    .iter()
                    .find(|(key, _)| key == column)
                    .map_or("", |(_, value)| value.as_str())
            });
            writer.write_record(record)?;
            rows += 1;
        }

        if !is_empty {
            depth += 1;
        }
    }

    writer.flush()?;
    Ok(rows)
}

fn open_input(path: &Path) -> Result<BufReader<File>> {
    match File::open(path) {
        Ok(file) => Ok(BufReader::new(file)),
        Err(err) if err.kind() == std::io::ErrorKind::NotFound => {
            Err(Error::InputNotFound(path.to_path_buf()))
        }
        Err(err) => Err(err.into()),
    }
}

/// Gets an element's attributes as unescaped key/value pairs, in document order.
fn attributes(element: &BytesStart) -> Result<Vec<(String, String)>> {
    element
        .attributes()
        .map(|attr| {
            let attr = attr.map_err(quick_xml::Error::from)?;
            let key = String::from_utf8_lossy(attr.key.as_ref()).into_owned();
            let value = attr.unescape_value()?.into_owned();
            Ok((key, value))
        })
        .collect()
}

fn attribute(element: &BytesStart, key: &str) -> Result<Option<String>> {
    Ok(attributes(element)?
        .into_iter()
        .find(|(name, _)| name == key)
        .map(|(_, value)| value))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn queue_csv(xml: &str) -> (usize, String) {
        let mut out = Vec::new();
        let rows = queue_log_to_csv(xml.as_bytes(), &mut out).unwrap();
        (rows, String::from_utf8(out).unwrap())
    }

    fn flat_csv(xml: &str) -> (usize, String) {
        let mut out = Vec::new();
        let rows = flat_log_to_csv(xml.as_bytes(), &mut out).unwrap();
        (rows, String::from_utf8(out).unwrap())
    }

    #[test]
    fn queue_log_rows_per_lane() {
        let (rows, csv) = queue_csv(
            r#"<?xml version="1.0" encoding="UTF-8"?>
            <queue-export>
                <data timestep="1.00">
                    <lanes>
                        <lane id="N_0" queueing_time="3.00" queueing_length="7.50" queueing_length_experimental="0.00"/>
                        <lane id="S_0" queueing_time="0.00" queueing_length="0.00" queueing_length_experimental="0.00"/>
                    </lanes>
                </data>
                <data timestep="2.00">
                    <lanes>
                        <lane id="N_0" queueing_time="4.00" queueing_length="15.00" queueing_length_experimental="7.10"/>
                    </lanes>
                </data>
            </queue-export>"#,
        );
        assert_eq!(rows, 3);
        assert_eq!(
            csv,
            "timestep,lane_id,queueing_time,queueing_length,queueing_length_experimental\n\
             1.00,N_0,3.00,7.50,0.00\n\
             1.00,S_0,0.00,0.00,0.00\n\
             2.00,N_0,4.00,15.00,7.10\n"
        );
    }

    #[test]
    fn queue_log_without_lanes_has_only_header() {
        let (rows, csv) = queue_csv(r#"<queue-export><data timestep="0.00"/><data timestep="1.00"><lanes/></data></queue-export>"#);
        assert_eq!(rows, 0);
        assert_eq!(
            csv,
            "timestep,lane_id,queueing_time,queueing_length,queueing_length_experimental\n"
        );
    }

    #[test]
    fn queue_log_missing_attribute_is_empty() {
        let (_, csv) = queue_csv(
            r#"<queue-export><data timestep="5"><lanes><lane id="E_1" queueing_time="1"/></lanes></data></queue-export>"#,
        );
        assert!(csv.ends_with("5,E_1,1,,\n"));
    }

    #[test]
    fn queue_log_reads_only_first_lanes_block() {
        let (rows, _) = queue_csv(
            r#"<q><data timestep="1"><lanes><lane id="a"/></lanes><lanes><lane id="b"/></lanes></data></q>"#,
        );
        assert_eq!(rows, 1);
    }

    #[test]
    fn flat_log_uses_first_record_for_header() {
        let (rows, csv) = flat_csv(
            r#"<tripinfos>
                <tripinfo id="veh0" depart="0.00" duration="41.00"/>
                <tripinfo duration="37.00" id="veh1" depart="3.00" vType="car"/>
                <tripinfo id="veh2"><stop/></tripinfo>
            </tripinfos>"#,
        );
        assert_eq!(rows, 3);
        assert_eq!(
            csv,
            "id,depart,duration\nveh0,0.00,41.00\nveh1,3.00,37.00\nveh2,,\n"
        );
    }

    #[test]
    fn flat_log_unescapes_values() {
        let (_, csv) = flat_csv(r#"<r><e name="a &amp; b"/></r>"#);
        assert_eq!(csv, "name\na & b\n");
    }

    #[test]
    fn flat_log_with_no_records_is_empty() {
        let (rows, csv) = flat_csv("<tripinfos></tripinfos>");
        assert_eq!(rows, 0);
        assert!(csv.is_empty());
    }

    #[test]
    fn missing_input_is_reported() {
        let dir = tempfile::tempdir().unwrap();
        let err = convert_queue_log(dir.path().join("nope.xml"), dir.path().join("out.csv"))
            .unwrap_err();
        assert!(matches!(err, Error::InputNotFound(_)));
        assert!(!dir.path().join("out.csv").exists());
    }
}
