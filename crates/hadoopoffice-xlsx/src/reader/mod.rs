//! XLSX reader

mod sheet;
mod stream;

use std::fs::File;
use std::io::{BufReader, Read, Seek, SeekFrom};
use std::path::Path;
use std::sync::Arc;

use zip::ZipArchive;

use crate::error::{XlsxError, XlsxResult};
use crate::external::read_external_link;
use crate::package::{read_comments, read_package, read_shared_strings, PackageInfo};
use crate::props::{read_app_properties, read_core_properties, read_custom_properties};
use crate::styles::read_styles_xml;
use crate::xml::open_part;
use hadoopoffice_core::{DocumentProperties, ExternalLink, Workbook};

pub(crate) use sheet::{CellTables, SheetRows};
pub use stream::{StreamRow, XlsxStreamReader};

/// OLE compound file signature. Encrypted packages are wrapped in one.
const CFB_SIGNATURE: [u8; 8] = [0xD0, 0xCF, 0x11, 0xE0, 0xA1, 0xB1, 0x1A, 0xE1];

/// XLSX file reader
pub struct XlsxReader;

impl XlsxReader {
    /// Read a workbook from a file path
    pub fn read_file<P: AsRef<Path>>(path: P) -> XlsxResult<Workbook> {
        let file = File::open(path)?;
        Self::read(BufReader::new(file))
    }

    /// Read a whole workbook into memory, cells, comments, document
    /// properties and external links included
    pub fn read<R: Read + Seek>(reader: R) -> XlsxResult<Workbook> {
        let mut archive = open_archive(reader)?;
        let info = read_package(&mut archive)?;
        let links = read_links(&mut archive, &info)?;
        let tables = Arc::new(read_tables(&mut archive, &info, &links)?);

        let mut workbook = Workbook::empty();
        workbook.set_date_1904(info.date_1904);
        read_properties(&mut archive, &info, workbook.properties_mut())?;
        for link in links {
            workbook.add_external_link(link);
        }

        for entry in &info.sheets {
            let sheet_idx = workbook.add_worksheet_with_name(&entry.name)?;
            let worksheet = workbook
                .worksheet_mut(sheet_idx)
                .ok_or_else(|| XlsxError::Parse(format!("sheet {} vanished", entry.name)))?;

            let xml_reader = open_part(&mut archive, &entry.path)?
                .ok_or_else(|| XlsxError::MissingPart(entry.path.clone()))?;
            let mut rows = SheetRows::new(xml_reader, Arc::clone(&tables));
            while let Some((row, cells)) = rows.next_row()? {
                for (col, cell) in cells {
                    worksheet.set_cell_at(row, col, cell)?;
                }
            }
            drop(rows);

            if let Some(path) = &entry.comments {
                if let Some(xml_reader) = open_part(&mut archive, path)? {
                    for (addr, comment) in read_comments(xml_reader)? {
                        worksheet.set_comment_at(addr.row, addr.col, comment)?;
                    }
                }
            }
            log::debug!("read sheet {} ({} cells)", entry.name, worksheet.cell_count());
        }

        Ok(workbook)
    }
}

/// Open the zip package, recognizing encrypted containers
pub(crate) fn open_archive<R: Read + Seek>(mut reader: R) -> XlsxResult<ZipArchive<R>> {
    let mut signature = [0u8; 8];
    let read = reader.read(&mut signature)?;
    reader.seek(SeekFrom::Start(0))?;
    if read == signature.len() && signature == CFB_SIGNATURE {
        return Err(XlsxError::Encrypted);
    }

    let mut archive = ZipArchive::new(reader)?;
    if archive.by_name("[Content_Types].xml").is_err() {
        return Err(XlsxError::InvalidFormat(
            "Missing [Content_Types].xml".into(),
        ));
    }
    Ok(archive)
}

pub(crate) fn read_links<R: Read + Seek>(
    archive: &mut ZipArchive<R>,
    info: &PackageInfo,
) -> XlsxResult<Vec<ExternalLink>> {
    info.external_links
        .iter()
        .map(|path| read_external_link(archive, path))
        .collect()
}

pub(crate) fn read_tables<R: Read + Seek>(
    archive: &mut ZipArchive<R>,
    info: &PackageInfo,
    links: &[ExternalLink],
) -> XlsxResult<CellTables> {
    let shared_strings = match &info.shared_strings {
        Some(path) => match open_part(archive, path)? {
            Some(xml_reader) => read_shared_strings(xml_reader)?,
            None => Vec::new(),
        },
        None => Vec::new(),
    };
    let formats = match &info.styles {
        Some(path) => match open_part(archive, path)? {
            Some(xml_reader) => read_styles_xml(xml_reader)?,
            None => Vec::new(),
        },
        None => Vec::new(),
    };
    Ok(CellTables {
        shared_strings,
        formats,
        link_names: links.iter().map(|l| l.file_name.clone()).collect(),
        date_1904: info.date_1904,
    })
}

pub(crate) fn read_properties<R: Read + Seek>(
    archive: &mut ZipArchive<R>,
    info: &PackageInfo,
    props: &mut DocumentProperties,
) -> XlsxResult<()> {
    if let Some(path) = &info.core_properties {
        if let Some(xml_reader) = open_part(archive, path)? {
            read_core_properties(xml_reader, props)?;
        }
    }
    if let Some(path) = &info.app_properties {
        if let Some(xml_reader) = open_part(archive, path)? {
            read_app_properties(xml_reader, props)?;
        }
    }
    if let Some(path) = &info.custom_properties {
        if let Some(xml_reader) = open_part(archive, path)? {
            read_custom_properties(xml_reader, props)?;
        }
    }
    Ok(())
}
