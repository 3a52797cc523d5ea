// src/fetch/sheet.rs
use std::io::Cursor;

use calamine::{Data, Reader, Xlsx};
use tracing::debug;

use crate::error::{Error, Result};
use crate::process::raw_table::RawTable;

/// Render a cell the way the upstream sheet readers do: numbers always carry
/// a fractional part (`11000058.0`), empty cells are `None`.
fn render_cell(cell: &Data) -> Option<String> {
    match cell {
        Data::Empty => None,
        Data::String(s) => Some(s.clone()),
        Data::Float(f) => Some(format!("{:?}", f)),
        Data::Int(i) => Some(format!("{:?}", *i as f64)),
        other => Some(other.to_string()),
    }
}

/// Parse the first worksheet of an `.xlsx` workbook. `skip_rows` sheet rows
/// are skipped, the next row is the header row, everything below is data.
pub fn parse_sheet(bytes: Vec<u8>, entry: &str, skip_rows: usize) -> Result<RawTable> {
    let sheet_err = |source| Error::Sheet {
        entry: entry.to_string(),
        source,
    };
    let mut workbook: Xlsx<_> = Xlsx::new(Cursor::new(bytes)).map_err(sheet_err)?;
    let range = workbook
        .worksheet_range_at(0)
        .ok_or_else(|| Error::Parse(format!("`{}` has no worksheet", entry)))?
        .map_err(sheet_err)?;

    // calamine trims leading empty rows/columns; put them back so positions
    // and `skip_rows` refer to the sheet as displayed.
    let (first_row, first_col) = range
        .start()
        .map(|(r, c)| (r as usize, c as usize))
        .unwrap_or((0, 0));
    let width = first_col + range.width();

    let mut rows = (0..first_row)
        .map(|_| Vec::new())
        .chain(range.rows().map(|r| {
            let mut out: Vec<Option<String>> = vec![None; first_col];
            out.extend(r.iter().map(render_cell));
            out
        }))
        .skip(skip_rows);

    let header_row = rows.next().ok_or_else(|| {
        Error::Parse(format!(
            "`{}` has no header row after skipping {} rows",
            entry, skip_rows
        ))
    })?;
    let headers: Vec<String> = (0..width)
        .map(|i| match header_row.get(i).cloned().flatten() {
            Some(h) if !h.trim().is_empty() => h,
            _ => format!("Unnamed: {}", i),
        })
        .collect();

    let data: Vec<Vec<Option<String>>> = rows.collect();
    debug!(entry, columns = headers.len(), rows = data.len(), "sheet parsed");
    Ok(RawTable::new(headers, data))
}

#[cfg(test)]
pub(crate) mod fixtures {
    use std::io::{Cursor, Write};

    use zip::{write::SimpleFileOptions, CompressionMethod, ZipWriter};

    /// One sheet cell for [`xlsx`].
    pub enum Cell<'a> {
        Text(&'a str),
        Number(f64),
        Empty,
    }

    fn column_name(mut i: usize) -> String {
        let mut name = Vec::new();
        loop {
            name.push(b'A' + (i % 26) as u8);
            if i < 26 {
                break;
            }
            i = i / 26 - 1;
        }
        name.reverse();
        String::from_utf8(name).unwrap()
    }

    fn escape(s: &str) -> String {
        s.replace('&', "&amp;").replace('<', "&lt;").replace('>', "&gt;")
    }

    /// A minimal single-sheet workbook using inline strings.
    pub fn xlsx(rows: &[Vec<Cell<'_>>]) -> Vec<u8> {
        let mut sheet = String::from(
            r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?><worksheet xmlns="http://schemas.openxmlformats.org/spreadsheetml/2006/main"><sheetData>"#,
        );
        for (r, row) in rows.iter().enumerate() {
            sheet.push_str(&format!(r#"<row r="{}">"#, r + 1));
            for (c, cell) in row.iter().enumerate() {
                let at = format!("{}{}", column_name(c), r + 1);
                match cell {
                    Cell::Text(t) => sheet.push_str(&format!(
                        r#"<c r="{}" t="inlineStr"><is><t>{}</t></is></c>"#,
                        at,
                        escape(t)
                    )),
                    Cell::Number(n) => {
                        sheet.push_str(&format!(r#"<c r="{}"><v>{}</v></c>"#, at, n))
                    }
                    Cell::Empty => {}
                }
            }
            sheet.push_str("</row>");
        }
        sheet.push_str("</sheetData></worksheet>");

        let parts = [
            (
                "[Content_Types].xml",
                r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?><Types xmlns="http://schemas.openxmlformats.org/package/2006/content-types"><Default Extension="rels" ContentType="application/vnd.openxmlformats-package.relationships+xml"/><Default Extension="xml" ContentType="application/xml"/><Override PartName="/xl/workbook.xml" ContentType="application/vnd.openxmlformats-officedocument.spreadsheetml.sheet.main+xml"/><Override PartName="/xl/worksheets/sheet1.xml" ContentType="application/vnd.openxmlformats-officedocument.spreadsheetml.worksheet+xml"/></Types>"#.to_string(),
            ),
            (
                "_rels/.rels",
                r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?><Relationships xmlns="http://schemas.openxmlformats.org/package/2006/relationships"><Relationship Id="rId1" Type="http://schemas.openxmlformats.org/officeDocument/2006/relationships/officeDocument" Target="xl/workbook.xml"/></Relationships>"#.to_string(),
            ),
            (
                "xl/workbook.xml",
                r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?><workbook xmlns="http://schemas.openxmlformats.org/spreadsheetml/2006/main" xmlns:r="http://schemas.openxmlformats.org/officeDocument/2006/relationships"><sheets><sheet name="Escolas" sheetId="1" r:id="rId1"/></sheets></workbook>"#.to_string(),
            ),
            (
                "xl/_rels/workbook.xml.rels",
                r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?><Relationships xmlns="http://schemas.openxmlformats.org/package/2006/relationships"><Relationship Id="rId1" Type="http://schemas.openxmlformats.org/officeDocument/2006/relationships/worksheet" Target="worksheets/sheet1.xml"/></Relationships>"#.to_string(),
            ),
            ("xl/worksheets/sheet1.xml", sheet),
        ];

        zip_entries(parts.iter().map(|(n, d)| (*n, d.as_bytes())))
    }

    /// Pack `(name, bytes)` pairs into an in-memory ZIP.
    pub fn zip_entries<'a>(entries: impl IntoIterator<Item = (&'a str, &'a [u8])>) -> Vec<u8> {
        let mut buf = Vec::new();
        {
            let mut zip = ZipWriter::new(Cursor::new(&mut buf));
            let options =
                SimpleFileOptions::default().compression_method(CompressionMethod::Stored);
            for (name, data) in entries {
                zip.start_file(name, options).unwrap();
                zip.write_all(data).unwrap();
            }
            zip.finish().unwrap();
        }
        buf
    }

    /// The top of an IDEB school sheet: title rows, header row, data.
    pub fn ideb_sheet() -> Vec<u8> {
        use Cell::*;
        let mut rows: Vec<Vec<Cell<'static>>> = vec![
            vec![Text("Ministério da Educação")],
            vec![],
            vec![Text("IDEB - Resultados e Metas")],
            vec![],
            vec![],
            vec![],
            vec![
                Text("Sigla da UF"),
                Text("Código da Escola"),
                Text("Taxa de Aprovação"),
                Empty,
                Text("IDEB 2017"),
            ],
        ];
        rows.push(vec![Text("RO"), Number(11000058.0), Number(0.9), Number(4.8), Number(4.3)]);
        rows.push(vec![Text("RO"), Number(11000171.0), Text("-"), Text("-"), Text("-")]);
        rows.push(vec![Text("RO"), Empty, Number(0.8)]);
        rows.push(vec![Text("AC"), Number(12000011.0), Number(0.7), Number(3.9), Number(3.6)]);
        xlsx(&rows)
    }
}

#[cfg(test)]
mod tests {
    use super::fixtures::{ideb_sheet, xlsx, Cell};
    use super::*;

    #[test]
    fn skips_title_rows_and_names_blank_headers() -> anyhow::Result<()> {
        let table = parse_sheet(ideb_sheet(), "escolas.xlsx", 6)?;
        assert_eq!(
            table.headers,
            [
                "Sigla da UF",
                "Código da Escola",
                "Taxa de Aprovação",
                "Unnamed: 3",
                "IDEB 2017"
            ]
        );
        assert_eq!(table.rows.len(), 4);
        assert_eq!(table.cell(0, 1), Some("11000058.0"));
        assert_eq!(table.cell(0, 2), Some("0.9"));
        assert_eq!(table.cell(1, 4), Some("-"));
        assert_eq!(table.cell(2, 1), None);
        Ok(())
    }

    #[test]
    fn leading_empty_columns_keep_their_positions() -> anyhow::Result<()> {
        let bytes = xlsx(&[
            vec![Cell::Empty, Cell::Text("code")],
            vec![Cell::Empty, Cell::Number(7.0)],
        ]);
        let table = parse_sheet(bytes, "x.xlsx", 0)?;
        assert_eq!(table.headers, ["Unnamed: 0", "code"]);
        assert_eq!(table.cell(0, 1), Some("7.0"));
        Ok(())
    }

    #[test]
    fn too_many_skipped_rows_is_a_parse_error() {
        let err = parse_sheet(ideb_sheet(), "escolas.xlsx", 50).unwrap_err();
        assert!(matches!(err, Error::Parse(_)));
    }

    #[test]
    fn garbage_is_a_sheet_error() {
        let err = parse_sheet(b"not a workbook".to_vec(), "escolas.xlsx", 6).unwrap_err();
        assert!(matches!(err, Error::Sheet { .. }));
    }
}
