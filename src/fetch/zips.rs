use std::io::{Cursor, Read};

use tracing::debug;
use zip::ZipArchive;

use crate::config::FetchConfig;
use crate::error::{Error, Result};
use crate::fetch::sheet::parse_sheet;
use crate::process::raw_table::RawTable;

/// Read one named entry out of an in-memory ZIP archive.
pub fn read_zip_entry(bytes: &[u8], entry: &str) -> Result<Vec<u8>> {
    let archive_err = |source| Error::Archive {
        entry: entry.to_string(),
        source,
    };
    let mut archive = ZipArchive::new(Cursor::new(bytes)).map_err(archive_err)?;
    let mut file = archive.by_name(entry).map_err(archive_err)?;

    let mut buf = Vec::with_capacity(file.size() as usize);
    file.read_to_end(&mut buf)?;
    debug!(entry, bytes = buf.len(), "extracted archive entry");
    Ok(buf)
}

/// Extract the configured spreadsheet from the archive and parse it.
pub fn read_sheet_from_zip(bytes: &[u8], cfg: &FetchConfig) -> Result<RawTable> {
    let sheet = read_zip_entry(bytes, &cfg.entry)?;
    parse_sheet(sheet, &cfg.entry, cfg.skip_rows)
}
