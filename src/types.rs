use std::time::Duration;

use crate::error::{Error, Result};
use crate::proto;

/// Default port of the table service gateway.
pub const DEFAULT_PORT: u16 = 15867;

/// Number of results a future buffers when it is opened with capacity 0.
pub const DEFAULT_FUTURE_CAPACITY: usize = 1024;

/// Operation carried by a cell key.
///
/// The discriminants are the values used on the wire.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub enum KeyFlag {
    /// Delete every cell in the row.
    DeleteRow = 0,
    /// Delete every cell in the row's column family.
    DeleteColumnFamily = 1,
    /// Delete every version of the cell.
    DeleteCell = 2,
    /// Delete the single version named by the key timestamp.
    DeleteCellVersion = 3,
    /// Insert the cell.
    #[default]
    Insert = 255,
}

impl KeyFlag {
    /// Maps a wire value back to a flag. Unknown values are treated as inserts.
    pub fn from_wire(value: i32) -> Self {
        match value {
            0 => KeyFlag::DeleteRow,
            1 => KeyFlag::DeleteColumnFamily,
            2 => KeyFlag::DeleteCell,
            3 => KeyFlag::DeleteCellVersion,
            _ => KeyFlag::Insert,
        }
    }

    pub fn is_delete(self) -> bool {
        self != KeyFlag::Insert
    }
}

/// Address of a cell: row, column family, column qualifier and version.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Key {
    pub row: String,
    pub column_family: String,
    /// Empty when the column family is unqualified.
    pub column_qualifier: String,
    /// Version timestamp in nanoseconds. Assigned by the service when `None`.
    pub timestamp: Option<i64>,
    pub revision: Option<i64>,
    pub flag: KeyFlag,
}

impl Key {
    /// Creates an insert key for `row` in `column_family`.
    pub fn new(row: impl Into<String>, column_family: impl Into<String>) -> Self {
        Self {
            row: row.into(),
            column_family: column_family.into(),
            ..Self::default()
        }
    }

    pub fn with_qualifier(mut self, column_qualifier: impl Into<String>) -> Self {
        self.column_qualifier = column_qualifier.into();
        self
    }

    pub fn with_timestamp(mut self, timestamp: i64) -> Self {
        self.timestamp = Some(timestamp);
        self
    }

    pub fn with_revision(mut self, revision: i64) -> Self {
        self.revision = Some(revision);
        self
    }

    pub fn with_flag(mut self, flag: KeyFlag) -> Self {
        self.flag = flag;
        self
    }
}

impl From<Key> for proto::Key {
    fn from(val: Key) -> Self {
        proto::Key {
            row: val.row,
            column_family: val.column_family,
            column_qualifier: val.column_qualifier,
            timestamp: val.timestamp,
            revision: val.revision,
            flag: val.flag as i32,
        }
    }
}

impl From<proto::Key> for Key {
    fn from(val: proto::Key) -> Self {
        Key {
            row: val.row,
            column_family: val.column_family,
            column_qualifier: val.column_qualifier,
            timestamp: val.timestamp,
            revision: val.revision,
            flag: KeyFlag::from_wire(val.flag),
        }
    }
}

/// A single cell: a key and an optional value.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Cell {
    pub key: Key,
    pub value: Option<Vec<u8>>,
}

/// A cell flattened to strings: `[row, family, qualifier, value, timestamp]`.
pub type CellAsArray = Vec<String>;

impl Cell {
    /// Creates a cell with no value, as used for deletes and marker columns.
    pub fn new(key: Key) -> Self {
        Self { key, value: None }
    }

    pub fn with_value(mut self, value: impl Into<Vec<u8>>) -> Self {
        self.value = Some(value.into());
        self
    }

    /// Flattens the cell to its string array form.
    ///
    /// Non UTF-8 values are converted lossily.
    pub fn to_array(&self) -> CellAsArray {
        vec![
            self.key.row.clone(),
            self.key.column_family.clone(),
            self.key.column_qualifier.clone(),
            self.value
                .as_deref()
                .map(|v| String::from_utf8_lossy(v).into_owned())
                .unwrap_or_default(),
            self.key.timestamp.map(|ts| ts.to_string()).unwrap_or_default(),
        ]
    }
}

impl Cell {
    /// Builds a cell from its array form, the inverse of [`to_array`](Self::to_array).
    ///
    /// Row and column family are required. Missing or empty qualifier, value
    /// and timestamp entries are left unset.
    pub fn from_array(array: &[String]) -> Result<Cell> {
        let [row, column_family, rest @ ..] = array else {
            return Err(Error::MalformedCell(format!(
                "expected at least row and column family, got {} element(s)",
                array.len()
            )));
        };
        let mut key = Key::new(row.as_str(), column_family.as_str());
        if let Some(qualifier) = rest.first() {
            key.column_qualifier = qualifier.clone();
        }
        if let Some(ts) = rest.get(2).filter(|ts| !ts.is_empty()) {
            let ts = ts
                .parse::<i64>()
                .map_err(|e| Error::MalformedCell(format!("bad timestamp '{ts}': {e}")))?;
            key.timestamp = Some(ts);
        }
        let value = rest
            .get(1)
            .filter(|value| !value.is_empty())
            .map(|value| value.clone().into_bytes());
        Ok(Cell { key, value })
    }
}

impl From<Cell> for proto::Cell {
    fn from(val: Cell) -> Self {
        proto::Cell {
            key: Some(val.key.into()),
            value: val.value,
        }
    }
}

impl From<proto::Cell> for Cell {
    fn from(val: proto::Cell) -> Self {
        Cell {
            key: val.key.map(Key::from).unwrap_or_default(),
            value: val.value,
        }
    }
}

/// A contiguous range of rows.
///
/// An empty `start_row` means "from the first row" and an empty `end_row`
/// means "to the last row".
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RowInterval {
    pub start_row: String,
    pub start_inclusive: bool,
    pub end_row: String,
    pub end_inclusive: bool,
}

impl Default for RowInterval {
    fn default() -> Self {
        Self {
            start_row: String::new(),
            start_inclusive: true,
            end_row: String::new(),
            end_inclusive: true,
        }
    }
}

impl RowInterval {
    /// Interval covering `start_row..=end_row`.
    pub fn new(start_row: impl Into<String>, end_row: impl Into<String>) -> Self {
        Self {
            start_row: start_row.into(),
            end_row: end_row.into(),
            ..Self::default()
        }
    }

    /// Interval covering exactly one row.
    pub fn single(row: impl Into<String>) -> Self {
        let row = row.into();
        Self::new(row.clone(), row)
    }

    pub fn with_start_inclusive(mut self, inclusive: bool) -> Self {
        self.start_inclusive = inclusive;
        self
    }

    pub fn with_end_inclusive(mut self, inclusive: bool) -> Self {
        self.end_inclusive = inclusive;
        self
    }

    pub fn contains(&self, row: &str) -> bool {
        let after_start = self.start_row.is_empty()
            || if self.start_inclusive {
                row >= self.start_row.as_str()
            } else {
                row > self.start_row.as_str()
            };
        let before_end = self.end_row.is_empty()
            || if self.end_inclusive {
                row <= self.end_row.as_str()
            } else {
                row < self.end_row.as_str()
            };
        after_start && before_end
    }
}

impl From<RowInterval> for proto::RowInterval {
    fn from(val: RowInterval) -> Self {
        proto::RowInterval {
            start_row: val.start_row,
            start_inclusive: val.start_inclusive,
            end_row: val.end_row,
            end_inclusive: val.end_inclusive,
        }
    }
}

impl From<proto::RowInterval> for RowInterval {
    fn from(val: proto::RowInterval) -> Self {
        RowInterval {
            start_row: val.start_row,
            start_inclusive: val.start_inclusive,
            end_row: val.end_row,
            end_inclusive: val.end_inclusive,
        }
    }
}

/// Matching operation of a [`ColumnPredicate`].
///
/// Value operations and qualifier operations occupy separate bit ranges on
/// the wire; [`VALUE_MATCH_MASK`](Self::VALUE_MATCH_MASK) and
/// [`QUALIFIER_MATCH_MASK`](Self::QUALIFIER_MATCH_MASK) select them.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum ColumnPredicateOperation {
    ExactMatch = 1,
    PrefixMatch = 2,
    RegexMatch = 4,
    QualifierExactMatch = 256,
    QualifierPrefixMatch = 512,
    QualifierRegexMatch = 1024,
}

impl ColumnPredicateOperation {
    pub const VALUE_MATCH_MASK: i32 = 7;
    pub const QUALIFIER_MATCH_MASK: i32 = 1792;

    pub fn bits(self) -> i32 {
        self as i32
    }

    pub fn from_bits(bits: i32) -> Option<Self> {
        match bits {
            1 => Some(Self::ExactMatch),
            2 => Some(Self::PrefixMatch),
            4 => Some(Self::RegexMatch),
            256 => Some(Self::QualifierExactMatch),
            512 => Some(Self::QualifierPrefixMatch),
            1024 => Some(Self::QualifierRegexMatch),
            _ => None,
        }
    }

    pub fn is_value_match(self) -> bool {
        self.bits() & Self::VALUE_MATCH_MASK != 0
    }

    pub fn is_qualifier_match(self) -> bool {
        self.bits() & Self::QUALIFIER_MATCH_MASK != 0
    }
}

/// Filters cells of one column family by value or by qualifier.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ColumnPredicate {
    pub column_family: String,
    /// Pattern for qualifier operations.
    pub column_qualifier: Option<String>,
    pub operation: ColumnPredicateOperation,
    /// Pattern for value operations.
    pub value: Option<Vec<u8>>,
}

impl ColumnPredicate {
    /// Predicate matching values of `column_family` with `operation`.
    pub fn value(
        column_family: impl Into<String>,
        operation: ColumnPredicateOperation,
        value: impl Into<Vec<u8>>,
    ) -> Self {
        Self {
            column_family: column_family.into(),
            column_qualifier: None,
            operation,
            value: Some(value.into()),
        }
    }

    /// Predicate matching qualifiers of `column_family` with `operation`.
    pub fn qualifier(
        column_family: impl Into<String>,
        operation: ColumnPredicateOperation,
        qualifier: impl Into<String>,
    ) -> Self {
        Self {
            column_family: column_family.into(),
            column_qualifier: Some(qualifier.into()),
            operation,
            value: None,
        }
    }
}

impl From<ColumnPredicate> for proto::ColumnPredicate {
    fn from(val: ColumnPredicate) -> Self {
        proto::ColumnPredicate {
            column_family: val.column_family,
            column_qualifier: val.column_qualifier,
            operation: val.operation.bits(),
            value: val.value,
        }
    }
}

impl TryFrom<proto::ColumnPredicate> for ColumnPredicate {
    type Error = i32;

    /// Fails with the raw operation bits when they name no known operation.
    fn try_from(val: proto::ColumnPredicate) -> std::result::Result<Self, i32> {
        let operation = ColumnPredicateOperation::from_bits(val.operation).ok_or(val.operation)?;
        Ok(ColumnPredicate {
            column_family: val.column_family,
            column_qualifier: val.column_qualifier,
            operation,
            value: val.value,
        })
    }
}

/// Describes which cells a scanner returns.
///
/// The default spec selects every cell of every version.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct ScanSpec {
    /// Rows to include. Empty selects every row.
    pub row_intervals: Vec<RowInterval>,
    /// Column families, or `family:qualifier` pairs. Empty selects every column.
    pub columns: Vec<String>,
    pub column_predicates: Vec<ColumnPredicate>,
    /// When set, a cell must satisfy every predicate of its family instead of any.
    pub and_column_predicates: bool,
    /// Maximum versions per cell. 0 returns every version.
    pub versions: u32,
    /// Maximum distinct rows. 0 is unlimited.
    pub row_limit: u32,
    /// Maximum cells. 0 is unlimited.
    pub cell_limit: u32,
    /// Inclusive lower bound on cell timestamps.
    pub start_time: Option<i64>,
    /// Exclusive upper bound on cell timestamps.
    pub end_time: Option<i64>,
    /// Return keys without values.
    pub keys_only: bool,
}

impl ScanSpec {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_row_interval(mut self, interval: RowInterval) -> Self {
        self.row_intervals.push(interval);
        self
    }

    /// Restricts the scan to `start_row..=end_row`.
    pub fn with_row_range(self, start_row: impl Into<String>, end_row: impl Into<String>) -> Self {
        self.with_row_interval(RowInterval::new(start_row, end_row))
    }

    pub fn with_column(mut self, column: impl Into<String>) -> Self {
        self.columns.push(column.into());
        self
    }

    pub fn with_column_predicate(mut self, predicate: ColumnPredicate) -> Self {
        self.column_predicates.push(predicate);
        self
    }

    pub fn with_and_column_predicates(mut self, and: bool) -> Self {
        self.and_column_predicates = and;
        self
    }

    pub fn with_versions(mut self, versions: u32) -> Self {
        self.versions = versions;
        self
    }

    pub fn with_row_limit(mut self, row_limit: u32) -> Self {
        self.row_limit = row_limit;
        self
    }

    pub fn with_cell_limit(mut self, cell_limit: u32) -> Self {
        self.cell_limit = cell_limit;
        self
    }

    pub fn with_time_range(mut self, start_time: Option<i64>, end_time: Option<i64>) -> Self {
        self.start_time = start_time;
        self.end_time = end_time;
        self
    }

    pub fn with_keys_only(mut self, keys_only: bool) -> Self {
        self.keys_only = keys_only;
        self
    }
}

impl From<ScanSpec> for proto::ScanSpec {
    fn from(val: ScanSpec) -> Self {
        proto::ScanSpec {
            row_intervals: val.row_intervals.into_iter().map(Into::into).collect(),
            columns: val.columns,
            column_predicates: val.column_predicates.into_iter().map(Into::into).collect(),
            and_column_predicates: val.and_column_predicates,
            versions: val.versions,
            row_limit: val.row_limit,
            cell_limit: val.cell_limit,
            start_time: val.start_time,
            end_time: val.end_time,
            keys_only: val.keys_only,
        }
    }
}

impl From<proto::ScanSpec> for ScanSpec {
    fn from(val: proto::ScanSpec) -> Self {
        ScanSpec {
            row_intervals: val.row_intervals.into_iter().map(Into::into).collect(),
            columns: val.columns,
            column_predicates: val
                .column_predicates
                .into_iter()
                .filter_map(|p| ColumnPredicate::try_from(p).ok())
                .collect(),
            and_column_predicates: val.and_column_predicates,
            versions: val.versions,
            row_limit: val.row_limit,
            cell_limit: val.cell_limit,
            start_time: val.start_time,
            end_time: val.end_time,
            keys_only: val.keys_only,
        }
    }
}

/// An open namespace on the service.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct Namespace(u64);

impl Namespace {
    pub fn new(id: u64) -> Self {
        Self(id)
    }

    pub fn id(self) -> u64 {
        self.0
    }
}

/// An entry returned by a namespace listing.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct NamespaceListing {
    pub name: String,
    /// `true` for a sub-namespace, `false` for a table.
    pub is_namespace: bool,
}

impl From<proto::NamespaceListing> for NamespaceListing {
    fn from(val: proto::NamespaceListing) -> Self {
        NamespaceListing {
            name: val.name,
            is_namespace: val.is_namespace,
        }
    }
}

impl From<NamespaceListing> for proto::NamespaceListing {
    fn from(val: NamespaceListing) -> Self {
        proto::NamespaceListing {
            name: val.name,
            is_namespace: val.is_namespace,
        }
    }
}

/// Connection settings for [`HypertableClient`](crate::HypertableClient).
#[derive(Clone, Debug)]
pub struct ClientConfig {
    /// Host name or address of the service gateway.
    pub host: String,
    pub port: u16,
    /// Per-request timeout. `None` waits indefinitely.
    pub timeout: Option<Duration>,
    /// Timeout for establishing the connection.
    pub connect_timeout: Duration,
    /// Queue capacity used for futures opened with capacity 0.
    pub future_capacity: usize,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            host: "localhost".to_string(),
            port: DEFAULT_PORT,
            timeout: None,
            connect_timeout: Duration::from_secs(5),
            future_capacity: DEFAULT_FUTURE_CAPACITY,
        }
    }
}

impl ClientConfig {
    pub fn new(host: impl Into<String>, port: u16) -> Self {
        Self {
            host: host.into(),
            port,
            ..Self::default()
        }
    }

    /// Builds a config from `HYPERTABLE_HOST`, `HYPERTABLE_PORT` and
    /// `HYPERTABLE_TIMEOUT_MS`, falling back to defaults for unset or
    /// unparsable variables.
    pub fn from_env() -> Self {
        let mut config = Self::default();
        if let Ok(host) = std::env::var("HYPERTABLE_HOST") {
            config.host = host;
        }
        if let Some(port) = std::env::var("HYPERTABLE_PORT").ok().and_then(|p| p.parse().ok()) {
            config.port = port;
        }
        if let Some(ms) = std::env::var("HYPERTABLE_TIMEOUT_MS")
            .ok()
            .and_then(|t| t.parse::<u64>().ok())
        {
            config.timeout = Some(Duration::from_millis(ms));
        }
        config
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    pub fn with_connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = timeout;
        self
    }

    pub fn with_future_capacity(mut self, capacity: usize) -> Self {
        self.future_capacity = capacity;
        self
    }

    /// The gRPC endpoint URI for this config.
    pub fn endpoint_uri(&self) -> String {
        format!("http://{}:{}", self.host, self.port)
    }

    /// Resolves a requested future capacity, mapping 0 to the configured default.
    pub(crate) fn resolve_capacity(&self, requested: usize) -> usize {
        match requested {
            0 if self.future_capacity == 0 => DEFAULT_FUTURE_CAPACITY,
            0 => self.future_capacity,
            n => n,
        }
    }
}
