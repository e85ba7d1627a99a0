//! Input and output formats
//!
//! The entry points a job uses: [`ExcelFileInputFormat`] lists and splits
//! the inputs and opens a reader per split, [`ExcelFileOutputFormat`] opens
//! a writer per task output file.

use std::path::{Path, PathBuf};

use crate::codec::CompressionCodec;
use crate::config::{
    HadoopOfficeReadConfiguration, HadoopOfficeWriteConfiguration, JobConf, CONF_OUTPUT_COMPRESS,
    CONF_OUTPUT_COMPRESS_CODEC, CONF_OUTPUT_DIR, CONF_TASK_ATTEMPT_ID,
};
use crate::error::{Error, Result};
use crate::reader::ExcelRecordReader;
use crate::split::{self, FileSplit};
use crate::writer::ExcelRecordWriter;

/// Reads workbooks as `(key, row)` records
#[derive(Debug, Clone, Copy, Default)]
pub struct ExcelFileInputFormat;

impl ExcelFileInputFormat {
    pub fn new() -> Self {
        Self
    }

    /// Workbooks are read as a whole
    pub fn is_splitable(&self, _path: &Path) -> bool {
        false
    }

    pub fn get_splits(&self, conf: &JobConf, num_splits_hint: usize) -> Result<Vec<FileSplit>> {
        split::get_splits(conf, num_splits_hint)
    }

    pub fn get_record_reader(&self, split: &FileSplit, conf: &JobConf) -> Result<ExcelRecordReader> {
        let config = HadoopOfficeReadConfiguration::from_conf(conf);
        ExcelRecordReader::new(split, &config)
    }
}

/// Writes cells into one workbook per task
#[derive(Debug, Clone, Copy, Default)]
pub struct ExcelFileOutputFormat;

impl ExcelFileOutputFormat {
    pub fn new() -> Self {
        Self
    }

    /// Writer for the task output `name`, placed under the attempt's
    /// temporary directory
    pub fn get_record_writer(&self, conf: &JobConf, name: &str) -> Result<ExcelRecordWriter> {
        let config = HadoopOfficeWriteConfiguration::from_conf(conf)?;
        let codec = output_codec(conf)?;
        let path = output_path(conf, name, &config, codec)?;
        log::info!("writing {}", path.display());
        ExcelRecordWriter::new(path, config, codec)
    }
}

/// Codec for the output, when compression is enabled
pub fn output_codec(conf: &JobConf) -> Result<Option<CompressionCodec>> {
    if !conf.get_bool(CONF_OUTPUT_COMPRESS, false) {
        return Ok(None);
    }
    let class = conf.get_or(
        CONF_OUTPUT_COMPRESS_CODEC,
        CompressionCodec::DEFAULT_CODEC_CLASS,
    );
    CompressionCodec::from_class_name(class)
        .map(Some)
        .ok_or_else(|| Error::Configuration(format!("unsupported compression codec {class}")))
}

/// `<outdir>/_temporary/0/_temporary/<attempt>/<name>.<ext>[<codec ext>]`
pub fn output_path(
    conf: &JobConf,
    name: &str,
    config: &HadoopOfficeWriteConfiguration,
    codec: Option<CompressionCodec>,
) -> Result<PathBuf> {
    let out_dir = conf
        .get_non_empty(CONF_OUTPUT_DIR)
        .ok_or_else(|| Error::Configuration(format!("{CONF_OUTPUT_DIR} is not set")))?;
    let attempt = conf
        .get_non_empty(CONF_TASK_ATTEMPT_ID)
        .ok_or_else(|| Error::Configuration(format!("{CONF_TASK_ATTEMPT_ID} is not set")))?;
    let mut file_name = format!("{name}.{}", config.format.extension());
    if let Some(codec) = codec {
        file_name.push_str(codec.extension());
    }
    Ok(PathBuf::from(out_dir)
        .join("_temporary")
        .join("0")
        .join("_temporary")
        .join(attempt)
        .join(file_name))
}
