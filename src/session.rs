//! Session state: the loaded records, their schema, and the active filters.
//!
//! Records and schema sit behind `Arc`s and every mutation goes through
//! [`Arc::make_mut`], so a [`Snapshot`] taken before a mutation keeps seeing
//! the data as it was. Ingestion replaces both wholesale; filters survive it
//! and any whose column disappeared are skipped at evaluation time.
//!
//! Ingestions are sequenced with tickets. [`Session::begin_ingest`] issues a
//! ticket carrying a fresh generation, and [`Session::finish_ingest`] installs
//! a result only when its ticket is the latest issued, so the most recently
//! started ingestion wins regardless of completion order.

use std::sync::Arc;

use log::debug;

use crate::{
    config::DetectionConfig,
    export::ExportTable,
    filter::{self, Filter, FilterColumn, FilterSet, Predicate},
    ingest::{self, Dataset, FileFormat, IngestError, IngestOptions},
    record::{Record, Status},
    schema::Schema,
    stats::Overview,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct IngestTicket {
    generation: u64,
}

impl IngestTicket {
    pub fn generation(&self) -> u64 {
        self.generation
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IngestOutcome {
    Installed,
    /// A later ingestion was started before this one finished.
    Superseded,
}

/// Read-only view of a session at one point in time.
#[derive(Debug, Clone)]
pub struct Snapshot {
    records: Arc<Vec<Record>>,
    schema: Arc<Schema>,
    filters: FilterSet,
}

impl Snapshot {
    pub fn records(&self) -> &[Record] {
        &self.records
    }

    pub fn schema(&self) -> &Schema {
        &self.schema
    }

    pub fn filters(&self) -> &FilterSet {
        &self.filters
    }

    pub fn filtered(&self) -> Vec<&Record> {
        self.filters.evaluate(&self.records, &self.schema)
    }
}

#[derive(Debug, Clone, Default)]
pub struct Session {
    records: Arc<Vec<Record>>,
    schema: Arc<Schema>,
    filters: FilterSet,
    issued: u64,
}

impl Session {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_dataset(dataset: Dataset) -> Self {
        let mut session = Self::new();
        session.install(dataset);
        session
    }

    pub fn records(&self) -> &[Record] {
        &self.records
    }

    pub fn schema(&self) -> &Schema {
        &self.schema
    }

    pub fn record(&self, id: &str) -> Option<&Record> {
        self.records.iter().find(|record| record.id() == id)
    }

    pub fn snapshot(&self) -> Snapshot {
        Snapshot {
            records: Arc::clone(&self.records),
            schema: Arc::clone(&self.schema),
            filters: self.filters.clone(),
        }
    }

    pub fn begin_ingest(&mut self) -> IngestTicket {
        self.issued += 1;
        IngestTicket {
            generation: self.issued,
        }
    }

    /// Installs `result` if `ticket` is the most recently issued one. Errors
    /// are returned for the latest ticket and leave the state untouched;
    /// anything from a superseded ticket is discarded.
    pub fn finish_ingest(
        &mut self,
        ticket: IngestTicket,
        result: Result<Dataset, IngestError>,
    ) -> Result<IngestOutcome, IngestError> {
        if ticket.generation != self.issued {
            debug!(
                "Discarding ingestion #{} superseded by #{}",
                ticket.generation, self.issued
            );
            return Ok(IngestOutcome::Superseded);
        }
        self.install(result?);
        Ok(IngestOutcome::Installed)
    }

    pub fn ingest_bytes(
        &mut self,
        bytes: &[u8],
        format: FileFormat,
        detection: &DetectionConfig,
    ) -> Result<IngestOutcome, IngestError> {
        let ticket = self.begin_ingest();
        let result = ingest::load_dataset(bytes, format, IngestOptions::new(detection));
        self.finish_ingest(ticket, result)
    }

    fn install(&mut self, dataset: Dataset) {
        self.records = Arc::new(dataset.records);
        self.schema = Arc::new(dataset.schema);
    }

    fn update_record<F>(&mut self, id: &str, apply: F) -> bool
    where
        F: FnOnce(&mut Record) -> bool,
    {
        let Some(position) = self.records.iter().position(|record| record.id() == id) else {
            debug!("Ignoring annotation for unknown record '{id}'");
            return false;
        };
        apply(&mut Arc::make_mut(&mut self.records)[position])
    }

    pub fn set_status(&mut self, id: &str, status: Status) -> bool {
        self.update_record(id, |record| {
            record.status = status;
            true
        })
    }

    pub fn add_note(&mut self, id: &str, text: &str) -> bool {
        if text.trim().is_empty() {
            return false;
        }
        self.update_record(id, |record| record.add_note(text).is_some())
    }

    // No-op tag changes return before `make_mut`.
    pub fn add_tag(&mut self, id: &str, tag: &str) -> bool {
        if tag.trim().is_empty() || self.record(id).is_some_and(|record| record.has_tag(tag)) {
            return false;
        }
        self.update_record(id, |record| record.add_tag(tag))
    }

    pub fn remove_tag(&mut self, id: &str, tag: &str) -> bool {
        if self.record(id).is_some_and(|record| !record.has_tag(tag)) {
            return false;
        }
        self.update_record(id, |record| record.remove_tag(tag))
    }

    pub fn set_column_visibility(&mut self, name: &str, visible: bool) -> bool {
        if !self.schema.contains(name) {
            return false;
        }
        Arc::make_mut(&mut self.schema).set_visibility(name, visible)
    }

    pub fn set_column_primary(&mut self, name: &str, primary: bool) -> bool {
        if !self.schema.contains(name) {
            return false;
        }
        Arc::make_mut(&mut self.schema).set_primary(name, primary)
    }

    pub fn filters(&self) -> &FilterSet {
        &self.filters
    }

    pub fn add_filter(&mut self, filter: Filter) {
        self.filters.add(filter);
    }

    pub fn remove_filter(&mut self, column: &FilterColumn) -> bool {
        self.filters.remove(column)
    }

    pub fn update_filter(&mut self, column: &FilterColumn, predicate: Predicate) -> bool {
        self.filters.update(column, predicate)
    }

    pub fn clear_filters(&mut self) {
        self.filters.clear();
    }

    pub fn filtered(&self) -> Vec<&Record> {
        self.filters.evaluate(&self.records, &self.schema)
    }

    /// Free-text search over the filtered view.
    pub fn search(&self, query: &str) -> Vec<&Record> {
        filter::search(self.filtered(), &self.schema, query)
    }

    pub fn overview(&self) -> Overview {
        Overview::new(self.records.len(), &self.filtered())
    }

    pub fn export(&self) -> ExportTable {
        ExportTable::build(self.filtered(), &self.schema)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const CSV: &[u8] = b"Name,Years\nAna,3\nBen,7\n";

    fn session() -> Session {
        let mut session = Session::new();
        session
            .ingest_bytes(CSV, FileFormat::Csv, &DetectionConfig::default())
            .unwrap();
        session
    }

    #[test]
    fn snapshots_do_not_observe_later_mutations() {
        let mut session = session();
        let before = session.snapshot();
        assert!(session.set_status("record-1", Status::Hired));
        assert!(session.add_tag("record-1", "rust"));
        assert_eq!(before.records()[0].status, Status::Pending);
        assert!(before.records()[0].tags.is_empty());
        assert_eq!(session.records()[0].status, Status::Hired);
    }

    #[test]
    fn unknown_ids_are_a_no_op() {
        let mut session = session();
        let before = session.records().to_vec();
        assert!(!session.set_status("record-99", Status::Hired));
        assert!(!session.add_note("record-99", "hello"));
        assert!(!session.add_tag("record-99", "x"));
        assert!(!session.remove_tag("record-99", "x"));
        assert_eq!(session.records(), before.as_slice());
    }

    #[test]
    fn duplicate_tags_and_blank_notes_are_rejected() {
        let mut session = session();
        assert!(session.add_tag("record-2", "senior"));
        assert!(!session.add_tag("record-2", "senior"));
        assert!(!session.add_tag("record-2", "   "));
        assert!(!session.add_note("record-2", " \t"));
        assert!(session.add_note("record-2", "Strong call"));
        let record = session.record("record-2").unwrap();
        assert_eq!(record.tags, vec!["senior"]);
        assert_eq!(record.notes.len(), 1);
        assert!(session.remove_tag("record-2", "senior"));
        assert!(!session.remove_tag("record-2", "senior"));
    }

    #[test]
    fn latest_started_ingestion_wins() {
        let mut session = Session::new();
        let detection = DetectionConfig::default();
        let first = session.begin_ingest();
        let second = session.begin_ingest();
        let second_result =
            ingest::load_dataset(b"Role\nEngineer\n", FileFormat::Csv, IngestOptions::new(&detection));
        let first_result = ingest::load_dataset(CSV, FileFormat::Csv, IngestOptions::new(&detection));

        assert_eq!(
            session.finish_ingest(second, second_result).unwrap(),
            IngestOutcome::Installed
        );
        assert_eq!(
            session.finish_ingest(first, first_result).unwrap(),
            IngestOutcome::Superseded
        );
        assert_eq!(session.schema().names(), vec!["Role"]);
    }

    #[test]
    fn failed_ingestion_keeps_existing_state() {
        let mut session = session();
        let err = session
            .ingest_bytes(b"{not json", FileFormat::Json, &DetectionConfig::default())
            .unwrap_err();
        assert!(matches!(err, IngestError::Parse { .. }));
        assert_eq!(session.records().len(), 2);
    }

    #[test]
    fn filters_survive_reingestion_and_stale_ones_are_skipped() {
        let mut session = session();
        let filter = Filter::parse("Name=an", session.schema()).unwrap();
        session.add_filter(filter);
        assert_eq!(session.filtered().len(), 1);

        session
            .ingest_bytes(b"Role\nEngineer\nDesigner\n", FileFormat::Csv, &DetectionConfig::default())
            .unwrap();
        assert_eq!(session.filters().len(), 1);
        assert_eq!(session.filtered().len(), 2);
    }

    #[test]
    fn column_toggles_reject_unknown_names() {
        let mut session = session();
        assert!(session.set_column_visibility("Years", false));
        assert!(!session.set_column_visibility("Salary", false));
        assert!(session.set_column_primary("Name", false));
        assert_eq!(session.export().headers, vec!["Name", "Status"]);
    }

    #[test]
    fn search_runs_over_the_filtered_view() {
        let mut session = session();
        session.add_filter(Filter::status(Status::Hired));
        assert!(session.search("ana").is_empty());
        session.clear_filters();
        assert_eq!(session.search("ANA").len(), 1);
    }
}
