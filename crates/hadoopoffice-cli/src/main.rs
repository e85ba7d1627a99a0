//! hadoopoffice CLI - read and write Excel files row by row

use std::fs::File;
use std::io::{self, Write};
use std::path::{Path, PathBuf};

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use hadoopoffice::codec::read_input;
use hadoopoffice::document::Document;
use hadoopoffice::prelude::*;
use hadoopoffice::{CellAddress, CompressionCodec, Locale, PropertySet};
use serde::Serialize;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "hadoopoffice")]
#[command(author, version, about = "Read and write Excel files as rows of cells")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Convert a workbook to CSV, one line per non-empty row
    #[command(alias = "csv")]
    ToCsv {
        /// Input workbook (xlsx, xls, optionally .gz/.bz2/.deflate)
        input: PathBuf,

        /// Output CSV file (default: stdout)
        #[arg(short, long)]
        output: Option<PathBuf>,

        /// Sheets to convert (default: all)
        #[arg(short, long)]
        sheet: Vec<String>,

        /// BCP-47 locale used to format values
        #[arg(short, long, default_value = "en")]
        locale: String,

        /// Password of an encrypted workbook
        #[arg(short, long)]
        password: Option<String>,

        /// Stream rows with cached formula values instead of loading the workbook
        #[arg(long)]
        low_footprint: bool,
    },

    /// Build a workbook from a CSV file, one cell per field
    FromCsv {
        /// Input CSV file; fields starting with `=` become formulas
        input: PathBuf,

        /// Output workbook (.xlsx or .xls, optionally .gz/.bz2/.deflate)
        output: PathBuf,

        /// Sheet to write into
        #[arg(short, long, default_value = "Sheet1")]
        sheet: String,

        /// Encrypt the workbook with this password
        #[arg(short, long)]
        password: Option<String>,
    },

    /// Show sheets, row counts and metadata of a workbook
    Info {
        /// Input workbook
        input: PathBuf,

        /// Password of an encrypted workbook
        #[arg(short, long)]
        password: Option<String>,

        /// Print JSON instead of text
        #[arg(long)]
        json: bool,
    },

    /// List all sheets in a workbook
    Sheets {
        /// Input workbook
        input: PathBuf,

        /// Password of an encrypted workbook
        #[arg(short, long)]
        password: Option<String>,
    },
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_writer(io::stderr)
        .init();

    let cli = Cli::parse();
    match cli.command {
        Commands::ToCsv {
            input,
            output,
            sheet,
            locale,
            password,
            low_footprint,
        } => {
            let config = HadoopOfficeReadConfiguration {
                locale: Locale::parse(&locale),
                sheets: (!sheet.is_empty()).then_some(sheet),
                low_footprint,
                password,
                ..HadoopOfficeReadConfiguration::default()
            };
            to_csv(&input, output.as_deref(), &config)
        }
        Commands::FromCsv {
            input,
            output,
            sheet,
            password,
        } => from_csv(&input, &output, &sheet, password),
        Commands::Info {
            input,
            password,
            json,
        } => show_info(&input, password.as_deref(), json),
        Commands::Sheets { input, password } => list_sheets(&input, password.as_deref()),
    }
}

fn to_csv(input: &Path, output: Option<&Path>, config: &HadoopOfficeReadConfiguration) -> Result<()> {
    let split = FileSplit::for_file(input)
        .with_context(|| format!("Failed to open '{}'", input.display()))?;
    let reader = ExcelRecordReader::new(&split, config)
        .with_context(|| format!("Failed to read '{}'", input.display()))?;

    let sink: Box<dyn Write> = match output {
        Some(path) => Box::new(
            File::create(path).with_context(|| format!("Failed to create '{}'", path.display()))?,
        ),
        None => Box::new(io::stdout().lock()),
    };
    let mut writer = csv::WriterBuilder::new().flexible(true).from_writer(sink);

    let mut rows = 0usize;
    for record in reader {
        let (key, row) = record.with_context(|| format!("Failed to read '{}'", input.display()))?;
        if row.is_empty() {
            tracing::debug!("skipping empty row {key}");
            continue;
        }
        let fields = row
            .iter()
            .map(|cell| cell.as_ref().map_or("", |c| c.formatted_value()));
        writer
            .write_record(fields)
            .context("Failed to write CSV record")?;
        rows += 1;
    }
    writer.flush().context("Failed to flush CSV output")?;

    if let Some(path) = output {
        tracing::info!("wrote {rows} rows to '{}'", path.display());
    }
    Ok(())
}

fn from_csv(input: &Path, output: &Path, sheet: &str, password: Option<String>) -> Result<()> {
    let Some(format) = SpreadsheetFormat::from_path(output) else {
        bail!(
            "Cannot tell the workbook format of '{}', use .xlsx or .xls",
            output.display()
        );
    };
    let config = HadoopOfficeWriteConfiguration {
        format,
        password,
        ..HadoopOfficeWriteConfiguration::default()
    };
    let mut writer = ExcelRecordWriter::new(output, config, CompressionCodec::from_path(output))
        .with_context(|| format!("Failed to create '{}'", output.display()))?;

    let mut reader = csv::ReaderBuilder::new()
        .has_headers(false)
        .flexible(true)
        .from_path(input)
        .with_context(|| format!("Failed to open '{}'", input.display()))?;
    for (row, record) in reader.records().enumerate() {
        let record = record.with_context(|| format!("Failed to read '{}'", input.display()))?;
        let row = u32::try_from(row).context("Too many rows")?;
        for (col, field) in record.iter().enumerate() {
            if field.is_empty() {
                continue;
            }
            let (value, formula) = match field.strip_prefix('=') {
                Some(formula) => ("", formula),
                None => (field, ""),
            };
            let col = u16::try_from(col).context("Too many columns")?;
            let address = CellAddress::new(row, col).to_string();
            writer
                .write(&SpreadSheetCellDAO::new(value, "", formula, address, sheet))
                .with_context(|| format!("Failed to write cell {field:?}"))?;
        }
    }

    let path = writer
        .close()
        .with_context(|| format!("Failed to write '{}'", output.display()))?;
    tracing::info!("wrote '{}'", path.display());
    Ok(())
}

#[derive(Serialize)]
struct WorkbookInfo {
    file: String,
    format: &'static str,
    sheets: Vec<SheetInfo>,
    metadata: Vec<(String, String)>,
}

#[derive(Serialize)]
struct SheetInfo {
    name: String,
    rows: u32,
    cells: usize,
    formulas: usize,
}

fn open_workbook(input: &Path, password: Option<&str>) -> Result<(SpreadsheetFormat, Workbook)> {
    let bytes = read_input(input).with_context(|| format!("Failed to open '{}'", input.display()))?;
    let document = Document::open(bytes, password)
        .with_context(|| format!("Failed to open '{}'", input.display()))?;
    let format = document.format();
    let workbook = document
        .into_workbook(password)
        .with_context(|| format!("Failed to read '{}'", input.display()))?;
    Ok((format, workbook))
}

fn show_info(input: &Path, password: Option<&str>, json: bool) -> Result<()> {
    let (format, workbook) = open_workbook(input, password)?;
    let set = match format {
        SpreadsheetFormat::Xlsx => PropertySet::Ooxml,
        SpreadsheetFormat::Xls => PropertySet::Biff8,
    };
    let properties = workbook.properties();
    let mut metadata: Vec<(String, String)> = set
        .field_names()
        .iter()
        .filter_map(|name| properties.get(set, name).map(|v| (name.to_string(), v)))
        .collect();
    metadata.extend(
        properties
            .custom
            .iter()
            .map(|p| (format!("custom.{}", p.name), p.value.clone())),
    );

    let info = WorkbookInfo {
        file: input.display().to_string(),
        format: format.extension(),
        sheets: workbook
            .worksheets()
            .map(|sheet| SheetInfo {
                name: sheet.name().to_string(),
                rows: sheet.last_row().map_or(1, |r| r + 1),
                cells: sheet.cell_count(),
                formulas: sheet
                    .iter_cells()
                    .filter(|(_, _, cell)| cell.value.formula_text().is_some())
                    .count(),
            })
            .collect(),
        metadata,
    };

    if json {
        println!("{}", serde_json::to_string_pretty(&info)?);
        return Ok(());
    }

    println!("File: {}", info.file);
    println!("Format: {}", info.format);
    println!("Sheets: {}", info.sheets.len());
    for (i, sheet) in info.sheets.iter().enumerate() {
        println!();
        println!("  Sheet {}: \"{}\"", i, sheet.name);
        println!("    Rows: {}", sheet.rows);
        println!("    Cells: {}", sheet.cells);
        println!("    Formulas: {}", sheet.formulas);
    }
    if !info.metadata.is_empty() {
        println!();
        println!("Metadata:");
        for (name, value) in &info.metadata {
            println!("  {name}: {value}");
        }
    }
    Ok(())
}

fn list_sheets(input: &Path, password: Option<&str>) -> Result<()> {
    let (_, workbook) = open_workbook(input, password)?;
    for (i, name) in workbook.sheet_names().iter().enumerate() {
        println!("{}\t{}", i, name);
    }
    Ok(())
}
