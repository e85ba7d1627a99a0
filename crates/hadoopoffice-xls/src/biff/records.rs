//! BIFF8 record type constants.
//!
//! Reference: [MS-XLS] §2.3 — Record Enumeration

// ── Stream structure ────────────────────────────────────────────────────
pub const BOF: u16 = 0x0809;
pub const EOF: u16 = 0x000A;
pub const CONTINUE: u16 = 0x003C;

// ── Workbook globals ────────────────────────────────────────────────────
pub const FILEPASS: u16 = 0x002F; // Encryption header, right after the globals BOF
pub const BOUNDSHEET: u16 = 0x0085; // Sheet name, type, visibility, stream offset
pub const SST: u16 = 0x00FC; // Shared String Table
pub const EXTSST: u16 = 0x00FF; // Offsets into the SST
pub const DATEMODE: u16 = 0x0022; // 1900 vs 1904 date system (a.k.a. DATE1904)
pub const CODEPAGE: u16 = 0x0042; // Code page (1200 = UTF-16 for BIFF8)
pub const WINDOW1: u16 = 0x003D; // Workbook window
pub const FONT: u16 = 0x0031; // Font definition
pub const FORMAT: u16 = 0x041E; // Number format string
pub const XF: u16 = 0x00E0; // Extended Format (cell format record)
pub const STYLE: u16 = 0x0293; // Named cell style
pub const NAME: u16 = 0x0018; // Defined name

// ── Link table ──────────────────────────────────────────────────────────
pub const SUPBOOK: u16 = 0x01AE; // Supporting workbook (self, add-in or external file)
pub const EXTERNSHEET: u16 = 0x0017; // XTI list referenced by 3D tokens
pub const EXTERNNAME: u16 = 0x0023; // Name in a supporting workbook
pub const XCT: u16 = 0x0059; // Start of a cached external sheet
pub const CRN: u16 = 0x005A; // Cached external cell values

// ── Cell records ────────────────────────────────────────────────────────
pub const DIMENSION: u16 = 0x0200; // Used range (first/last row/col)
pub const LABELSST: u16 = 0x00FD; // Cell containing SST string index
pub const LABEL: u16 = 0x0204; // Cell with inline string (rare in BIFF8)
pub const NUMBER: u16 = 0x0203; // Cell with IEEE 754 double
pub const RK: u16 = 0x027E; // Cell with compressed number (RK encoding)
pub const MULRK: u16 = 0x00BD; // Multiple RK values in one row
pub const BLANK: u16 = 0x0201; // Empty cell with formatting
pub const MULBLANK: u16 = 0x00BE; // Multiple blanks with formatting
pub const BOOLERR: u16 = 0x0205; // Boolean or error cell
pub const FORMULA: u16 = 0x0006; // Formula cell with cached result
pub const STRING: u16 = 0x0207; // Cached string result for preceding FORMULA
pub const RSTRING: u16 = 0x00D6; // Rich-text inline string (rare)
pub const ARRAY: u16 = 0x0221; // Array formula
pub const SHRFMLA: u16 = 0x04BC; // Shared formula

// ── Sheet structure ─────────────────────────────────────────────────────
pub const WINDOW2: u16 = 0x023E; // Sheet view settings

// ── Comments ────────────────────────────────────────────────────────────
pub const NOTE: u16 = 0x001C; // Comment anchor and author
pub const OBJ: u16 = 0x005D; // Drawing object, carries the object id
pub const TXO: u16 = 0x01B6; // Text of the preceding object

// ── Records left in clear text in an encrypted stream ───────────────────
pub const INTERFACEHDR: u16 = 0x00E1;
pub const USREXCL: u16 = 0x0194;
pub const FILELOCK: u16 = 0x0195;
pub const RRDINFO: u16 = 0x0196;
pub const RRDHEAD: u16 = 0x0138;

// ── BOF subtypes (the `dt` field) ───────────────────────────────────────
pub const BOF_WORKBOOK_GLOBALS: u16 = 0x0005;
pub const BOF_WORKSHEET: u16 = 0x0010;

/// BIFF version we support.
pub const BIFF8_VERSION: u16 = 0x0600;

/// Largest record body; longer data goes into CONTINUE records.
pub const MAX_RECORD_LEN: usize = 8224;

/// Rows and columns a BIFF8 worksheet can address
pub const MAX_ROWS: u32 = 65_536;
pub const MAX_COLS: u16 = 256;

/// Record name for diagnostics
pub fn name(record_type: u16) -> &'static str {
    match record_type {
        BOF => "BOF",
        EOF => "EOF",
        CONTINUE => "CONTINUE",
        FILEPASS => "FILEPASS",
        BOUNDSHEET => "BOUNDSHEET",
        SST => "SST",
        EXTSST => "EXTSST",
        DATEMODE => "DATEMODE",
        CODEPAGE => "CODEPAGE",
        WINDOW1 => "WINDOW1",
        FONT => "FONT",
        FORMAT => "FORMAT",
        XF => "XF",
        STYLE => "STYLE",
        NAME => "NAME",
        SUPBOOK => "SUPBOOK",
        EXTERNSHEET => "EXTERNSHEET",
        EXTERNNAME => "EXTERNNAME",
        XCT => "XCT",
        CRN => "CRN",
        DIMENSION => "DIMENSION",
        LABELSST => "LABELSST",
        LABEL => "LABEL",
        NUMBER => "NUMBER",
        RK => "RK",
        MULRK => "MULRK",
        BLANK => "BLANK",
        MULBLANK => "MULBLANK",
        BOOLERR => "BOOLERR",
        FORMULA => "FORMULA",
        STRING => "STRING",
        RSTRING => "RSTRING",
        ARRAY => "ARRAY",
        SHRFMLA => "SHRFMLA",
        WINDOW2 => "WINDOW2",
        NOTE => "NOTE",
        OBJ => "OBJ",
        TXO => "TXO",
        INTERFACEHDR => "INTERFACEHDR",
        USREXCL => "USREXCL",
        FILELOCK => "FILELOCK",
        RRDINFO => "RRDINFO",
        RRDHEAD => "RRDHEAD",
        _ => "unknown",
    }
}
