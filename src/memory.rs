//! An in-process [`TableService`] backed by sorted cell vectors.
//!
//! Used by the test suite and the demos in place of a running cluster. It
//! implements the cell and scan semantics the client relies on and can
//! inject latency and failures.

use std::cmp::Reverse;
use std::collections::{BTreeMap, HashMap, VecDeque};
use std::sync::{Mutex, MutexGuard};
use std::time::Duration;

use async_trait::async_trait;
use regex::Regex;
use tracing::debug;

use crate::service::{RemoteScanner, ServiceError, TableService};
use crate::types::{
    Cell, ColumnPredicate, ColumnPredicateOperation, KeyFlag, Namespace, NamespaceListing, ScanSpec,
};

/// Tuning for [`MemoryService`].
#[derive(Clone, Debug)]
pub struct MemoryServiceOptions {
    /// Maximum cells returned by one scanner fetch.
    pub batch_size: usize,
    /// Delay applied to every write.
    pub write_latency: Duration,
    /// Delay applied to every scanner fetch.
    pub scan_latency: Duration,
}

impl Default for MemoryServiceOptions {
    fn default() -> Self {
        Self {
            batch_size: 1000,
            write_latency: Duration::ZERO,
            scan_latency: Duration::ZERO,
        }
    }
}

type Table = Vec<Cell>;

struct Cursor {
    namespace: String,
    table: String,
    cells: VecDeque<Cell>,
}

struct MemoryState {
    options: MemoryServiceOptions,
    namespaces: BTreeMap<String, BTreeMap<String, Table>>,
    open_namespaces: HashMap<u64, String>,
    scanners: HashMap<u64, Cursor>,
    failing_tables: HashMap<String, String>,
    next_id: u64,
    clock: i64,
}

/// In-memory table service.
pub struct MemoryService {
    state: Mutex<MemoryState>,
}

impl Default for MemoryService {
    fn default() -> Self {
        Self::new(MemoryServiceOptions::default())
    }
}

fn normalize(name: &str) -> String {
    name.trim_matches('/').to_string()
}

fn sort_key(cell: &Cell) -> (&str, &str, &str, Reverse<i64>) {
    (
        &cell.key.row,
        &cell.key.column_family,
        &cell.key.column_qualifier,
        Reverse(cell.key.timestamp.unwrap_or_default()),
    )
}

impl MemoryService {
    pub fn new(options: MemoryServiceOptions) -> Self {
        let mut namespaces = BTreeMap::new();
        namespaces.insert(String::new(), BTreeMap::new());
        Self {
            state: Mutex::new(MemoryState {
                options,
                namespaces,
                open_namespaces: HashMap::new(),
                scanners: HashMap::new(),
                failing_tables: HashMap::new(),
                next_id: 1,
                clock: 0,
            }),
        }
    }

    fn lock(&self) -> MutexGuard<'_, MemoryState> {
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Creates an empty table. The namespace must exist.
    pub fn create_table(&self, namespace: &str, table: &str) -> Result<(), ServiceError> {
        let mut state = self.lock();
        let tables = state
            .namespaces
            .get_mut(&normalize(namespace))
            .ok_or_else(|| ServiceError::remote(format!("namespace '{namespace}' does not exist")))?;
        if tables.contains_key(table) {
            return Err(ServiceError::remote(format!("table '{table}' already exists")));
        }
        tables.insert(table.to_string(), Vec::new());
        Ok(())
    }

    /// Makes every write to, and every scan fetch from, `table` fail with `message`.
    pub fn fail_table(&self, table: &str, message: &str) {
        self.lock()
            .failing_tables
            .insert(table.to_string(), message.to_string());
    }

    pub fn clear_failures(&self) {
        self.lock().failing_tables.clear();
    }

    pub fn set_write_latency(&self, latency: Duration) {
        self.lock().options.write_latency = latency;
    }

    pub fn set_scan_latency(&self, latency: Duration) {
        self.lock().options.scan_latency = latency;
    }

    /// Number of cells currently stored in `table`.
    pub fn cell_count(&self, namespace: &str, table: &str) -> usize {
        self.lock()
            .namespaces
            .get(&normalize(namespace))
            .and_then(|tables| tables.get(table))
            .map_or(0, Vec::len)
    }

    /// Number of scanners opened and not yet closed.
    pub fn open_scanners(&self) -> usize {
        self.lock().scanners.len()
    }

    fn namespace_name(state: &MemoryState, namespace: Namespace) -> Result<String, ServiceError> {
        state
            .open_namespaces
            .get(&namespace.id())
            .cloned()
            .ok_or_else(|| ServiceError::remote(format!("namespace id {} is not open", namespace.id())))
    }

    fn check_failure(state: &MemoryState, table: &str) -> Result<(), ServiceError> {
        match state.failing_tables.get(table) {
            Some(message) => Err(ServiceError::remote(message.clone())),
            None => Ok(()),
        }
    }
}

fn apply(table: &mut Table, mut cell: Cell, clock: &mut i64) {
    match cell.key.flag {
        KeyFlag::Insert => {
            let timestamp = match cell.key.timestamp {
                Some(ts) => ts,
                None => {
                    *clock += 1;
                    *clock
                }
            };
            cell.key.timestamp = Some(timestamp);
            match table.binary_search_by(|c| sort_key(c).cmp(&sort_key(&cell))) {
                Ok(pos) => table[pos] = cell,
                Err(pos) => table.insert(pos, cell),
            }
        }
        KeyFlag::DeleteRow => table.retain(|c| c.key.row != cell.key.row),
        KeyFlag::DeleteColumnFamily => table.retain(|c| {
            c.key.row != cell.key.row || c.key.column_family != cell.key.column_family
        }),
        KeyFlag::DeleteCell => table.retain(|c| {
            c.key.row != cell.key.row
                || c.key.column_family != cell.key.column_family
                || c.key.column_qualifier != cell.key.column_qualifier
        }),
        KeyFlag::DeleteCellVersion => table.retain(|c| {
            c.key.row != cell.key.row
                || c.key.column_family != cell.key.column_family
                || c.key.column_qualifier != cell.key.column_qualifier
                || c.key.timestamp != cell.key.timestamp
        }),
    }
}

enum Pattern {
    Exact(Vec<u8>),
    Prefix(Vec<u8>),
    Regex(Regex),
}

impl Pattern {
    fn matches(&self, subject: &[u8]) -> bool {
        match self {
            Pattern::Exact(p) => subject == p.as_slice(),
            Pattern::Prefix(p) => subject.starts_with(p),
            Pattern::Regex(re) => re.is_match(&String::from_utf8_lossy(subject)),
        }
    }
}

struct CompiledPredicate {
    column_family: String,
    on_qualifier: bool,
    pattern: Pattern,
}

impl CompiledPredicate {
    fn compile(predicate: &ColumnPredicate) -> Result<Self, ServiceError> {
        use ColumnPredicateOperation::*;

        let on_qualifier = predicate.operation.is_qualifier_match();
        let raw = if on_qualifier {
            predicate.column_qualifier.clone().unwrap_or_default().into_bytes()
        } else {
            predicate.value.clone().unwrap_or_default()
        };
        let pattern = match predicate.operation {
            ExactMatch | QualifierExactMatch => Pattern::Exact(raw),
            PrefixMatch | QualifierPrefixMatch => Pattern::Prefix(raw),
            RegexMatch | QualifierRegexMatch => {
                let source = String::from_utf8_lossy(&raw);
                let re = Regex::new(&source)
                    .map_err(|e| ServiceError::remote(format!("bad predicate regex: {e}")))?;
                Pattern::Regex(re)
            }
        };
        Ok(Self {
            column_family: predicate.column_family.clone(),
            on_qualifier,
            pattern,
        })
    }

    fn matches(&self, cell: &Cell) -> bool {
        if self.on_qualifier {
            self.pattern.matches(cell.key.column_qualifier.as_bytes())
        } else {
            self.pattern.matches(cell.value.as_deref().unwrap_or_default())
        }
    }
}

fn column_selected(columns: &[String], cell: &Cell) -> bool {
    columns.is_empty()
        || columns.iter().any(|column| match column.split_once(':') {
            Some((family, qualifier)) => {
                family == cell.key.column_family && qualifier == cell.key.column_qualifier
            }
            None => *column == cell.key.column_family,
        })
}

fn select(table: &Table, spec: &ScanSpec) -> Result<VecDeque<Cell>, ServiceError> {
    let predicates = spec
        .column_predicates
        .iter()
        .map(CompiledPredicate::compile)
        .collect::<Result<Vec<_>, _>>()?;

    let mut selected = VecDeque::new();
    let mut versions_seen = 0u32;
    let mut last_column: Option<(&str, &str, &str)> = None;
    let mut rows = 0u32;
    let mut last_row: Option<&str> = None;

    for cell in table {
        let ts = cell.key.timestamp.unwrap_or_default();
        if spec.start_time.is_some_and(|start| ts < start) || spec.end_time.is_some_and(|end| ts >= end) {
            continue;
        }
        if !spec.row_intervals.is_empty()
            && !spec.row_intervals.iter().any(|interval| interval.contains(&cell.key.row))
        {
            continue;
        }
        if !column_selected(&spec.columns, cell) {
            continue;
        }
        let mut family_predicates = predicates
            .iter()
            .filter(|p| p.column_family == cell.key.column_family)
            .peekable();
        if family_predicates.peek().is_some() {
            let passed = if spec.and_column_predicates {
                family_predicates.all(|p| p.matches(cell))
            } else {
                family_predicates.any(|p| p.matches(cell))
            };
            if !passed {
                continue;
            }
        }

        let column = (
            cell.key.row.as_str(),
            cell.key.column_family.as_str(),
            cell.key.column_qualifier.as_str(),
        );
        if last_column == Some(column) {
            versions_seen += 1;
        } else {
            last_column = Some(column);
            versions_seen = 1;
        }
        if spec.versions > 0 && versions_seen > spec.versions {
            continue;
        }

        if last_row != Some(cell.key.row.as_str()) {
            if spec.row_limit > 0 && rows == spec.row_limit {
                break;
            }
            rows += 1;
            last_row = Some(cell.key.row.as_str());
        }
        if spec.cell_limit > 0 && selected.len() as u32 == spec.cell_limit {
            break;
        }

        let mut cell = cell.clone();
        if spec.keys_only {
            cell.value = None;
        }
        selected.push_back(cell);
    }
    Ok(selected)
}

#[async_trait]
impl TableService for MemoryService {
    async fn namespace_exists(&self, name: &str) -> Result<bool, ServiceError> {
        Ok(self.lock().namespaces.contains_key(&normalize(name)))
    }

    async fn namespace_create(&self, name: &str) -> Result<(), ServiceError> {
        let name = normalize(name);
        let mut state = self.lock();
        if state.namespaces.contains_key(&name) {
            return Err(ServiceError::remote(format!("namespace '{name}' already exists")));
        }
        let parent = name.rsplit_once('/').map_or("", |(parent, _)| parent);
        if !state.namespaces.contains_key(parent) {
            return Err(ServiceError::remote(format!("parent namespace '{parent}' does not exist")));
        }
        state.namespaces.insert(name, BTreeMap::new());
        Ok(())
    }

    async fn namespace_open(&self, name: &str) -> Result<Namespace, ServiceError> {
        let name = normalize(name);
        let mut state = self.lock();
        if !state.namespaces.contains_key(&name) {
            return Err(ServiceError::remote(format!("namespace '{name}' does not exist")));
        }
        let id = state.next_id;
        state.next_id += 1;
        state.open_namespaces.insert(id, name);
        Ok(Namespace::new(id))
    }

    async fn namespace_close(&self, namespace: Namespace) -> Result<(), ServiceError> {
        self.lock()
            .open_namespaces
            .remove(&namespace.id())
            .map(|_| ())
            .ok_or_else(|| ServiceError::remote(format!("namespace id {} is not open", namespace.id())))
    }

    async fn namespace_get_listing(
        &self,
        namespace: Namespace,
    ) -> Result<Vec<NamespaceListing>, ServiceError> {
        let state = self.lock();
        let name = Self::namespace_name(&state, namespace)?;
        let prefix = if name.is_empty() { String::new() } else { format!("{name}/") };

        let mut listing: Vec<NamespaceListing> = state
            .namespaces
            .keys()
            .filter_map(|child| child.strip_prefix(&prefix))
            .filter(|rest| !rest.is_empty() && !rest.contains('/'))
            .map(|rest| NamespaceListing {
                name: rest.to_string(),
                is_namespace: true,
            })
            .collect();
        if let Some(tables) = state.namespaces.get(&name) {
            listing.extend(tables.keys().map(|table| NamespaceListing {
                name: table.clone(),
                is_namespace: false,
            }));
        }
        Ok(listing)
    }

    async fn write_cells(
        &self,
        namespace: Namespace,
        table: &str,
        cells: Vec<Cell>,
    ) -> Result<(), ServiceError> {
        let latency = self.lock().options.write_latency;
        if !latency.is_zero() {
            tokio::time::sleep(latency).await;
        }

        let mut state = self.lock();
        let ns = Self::namespace_name(&state, namespace)?;
        Self::check_failure(&state, table)?;
        let MemoryState { namespaces, clock, .. } = &mut *state;
        let rows = namespaces
            .get_mut(&ns)
            .and_then(|tables| tables.get_mut(table))
            .ok_or_else(|| ServiceError::remote(format!("table '{table}' does not exist")))?;
        let count = cells.len();
        for cell in cells {
            apply(rows, cell, clock);
        }
        debug!(namespace = %ns, table, cells = count, "applied cells");
        Ok(())
    }

    async fn scanner_open(
        &self,
        namespace: Namespace,
        table: &str,
        spec: ScanSpec,
    ) -> Result<RemoteScanner, ServiceError> {
        let mut state = self.lock();
        let ns = Self::namespace_name(&state, namespace)?;
        let rows = state
            .namespaces
            .get(&ns)
            .and_then(|tables| tables.get(table))
            .ok_or_else(|| ServiceError::remote(format!("table '{table}' does not exist")))?;
        let cells = select(rows, &spec)?;
        let id = state.next_id;
        state.next_id += 1;
        state.scanners.insert(
            id,
            Cursor {
                namespace: ns,
                table: table.to_string(),
                cells,
            },
        );
        Ok(RemoteScanner::new(id))
    }

    async fn scanner_get_cells(&self, scanner: RemoteScanner) -> Result<Vec<Cell>, ServiceError> {
        let latency = self.lock().options.scan_latency;
        if !latency.is_zero() {
            tokio::time::sleep(latency).await;
        }

        let mut state = self.lock();
        let batch_size = state.options.batch_size.max(1);
        let table = state
            .scanners
            .get(&scanner.id())
            .map(|cursor| cursor.table.clone())
            .ok_or_else(|| ServiceError::remote(format!("scanner id {} is not open", scanner.id())))?;
        Self::check_failure(&state, &table)?;
        let cursor = state
            .scanners
            .get_mut(&scanner.id())
            .ok_or_else(|| ServiceError::remote(format!("scanner id {} is not open", scanner.id())))?;
        let take = batch_size.min(cursor.cells.len());
        Ok(cursor.cells.drain(..take).collect())
    }

    async fn scanner_close(&self, scanner: RemoteScanner) -> Result<(), ServiceError> {
        let cursor = self
            .lock()
            .scanners
            .remove(&scanner.id())
            .ok_or_else(|| ServiceError::remote(format!("scanner id {} is not open", scanner.id())))?;
        debug!(namespace = %cursor.namespace, table = %cursor.table, "scanner closed");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{Key, RowInterval};

    fn cell(row: &str, family: &str, value: &str) -> Cell {
        Cell::new(Key::new(row, family)).with_value(value)
    }

    fn table_with(cells: Vec<Cell>) -> Table {
        let mut table = Vec::new();
        let mut clock = 0;
        for c in cells {
            apply(&mut table, c, &mut clock);
        }
        table
    }

    #[test]
    fn versions_keep_newest_first() {
        let table = table_with(vec![
            cell("r1", "cf", "old"),
            cell("r1", "cf", "new"),
            cell("r2", "cf", "only"),
        ]);
        let latest = select(&table, &ScanSpec::new().with_versions(1)).unwrap();
        let values: Vec<_> = latest.iter().map(|c| c.value.clone().unwrap()).collect();
        assert_eq!(values, vec![b"new".to_vec(), b"only".to_vec()]);
    }

    #[test]
    fn delete_row_removes_all_columns() {
        let table = table_with(vec![
            cell("r1", "a", "1"),
            cell("r1", "b", "2"),
            cell("r2", "a", "3"),
            Cell::new(Key::new("r1", "").with_flag(KeyFlag::DeleteRow)),
        ]);
        assert_eq!(table.len(), 1);
        assert_eq!(table[0].key.row, "r2");
    }

    #[test]
    fn row_interval_columns_and_limits() {
        let table = table_with(
            (0..10)
                .flat_map(|i| {
                    let row = format!("row{i:02}");
                    [cell(&row, "a", "x"), cell(&row, "b", "y")]
                })
                .collect(),
        );
        let spec = ScanSpec::new()
            .with_row_interval(RowInterval::new("row02", "row05").with_end_inclusive(false))
            .with_column("a");
        assert_eq!(select(&table, &spec).unwrap().len(), 3);

        let limited = select(&table, &ScanSpec::new().with_row_limit(2)).unwrap();
        assert_eq!(limited.len(), 4);
        let capped = select(&table, &ScanSpec::new().with_cell_limit(5)).unwrap();
        assert_eq!(capped.len(), 5);
    }

    #[test]
    fn predicates_filter_values_and_qualifiers() {
        let table = table_with(vec![
            cell("k1", "col", "v1"),
            cell("k2", "col", "v2"),
            cell("k4", "col", "v4"),
            Cell::new(Key::new("k5", "tag").with_qualifier("blue")).with_value("x"),
            Cell::new(Key::new("k6", "tag").with_qualifier("green")).with_value("x"),
        ]);
        let regex = ScanSpec::new().with_column_predicate(ColumnPredicate::value(
            "col",
            ColumnPredicateOperation::RegexMatch,
            "v[24]",
        ));
        let rows: Vec<_> = select(&table, &regex)
            .unwrap()
            .into_iter()
            .filter(|c| c.key.column_family == "col")
            .map(|c| c.key.row)
            .collect();
        assert_eq!(rows, vec!["k2", "k4"]);

        let qualifier = ScanSpec::new().with_column("tag").with_column_predicate(
            ColumnPredicate::qualifier("tag", ColumnPredicateOperation::QualifierPrefixMatch, "gr"),
        );
        let tagged = select(&table, &qualifier).unwrap();
        assert_eq!(tagged.len(), 1);
        assert_eq!(tagged[0].key.row, "k6");
    }
}
